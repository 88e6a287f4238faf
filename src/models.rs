use serde::{Deserialize, Serialize};

// Query string accepted by tool endpoints
#[derive(Deserialize, Debug, Default)]
pub struct ToolQuery {
    #[serde(default)]
    pub api_key: Option<String>,
}

// Successful tool response - model output plus what is left of today's quota
#[derive(Deserialize, Serialize, Debug)]
pub struct ToolResponse {
    pub result: serde_json::Value,
    pub remaining: u32,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}
