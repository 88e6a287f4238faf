use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::completion::CompletionClient;

// app's shared state

pub struct AppState {
    pub admission: AdmissionController,
    pub completion: Arc<dyn CompletionClient>,
}
