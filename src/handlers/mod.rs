mod health;
mod metrics;
mod tools;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use tools::{list_tools_handler, run_tool_handler};
