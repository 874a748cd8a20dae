use serde::{Deserialize, Serialize};

fn default_temperature() -> Option<f32> {
    Some(0.4)
}

fn default_max_output_tokens() -> Option<u32> {
    Some(2048)
}

/// Request body for one streaming chat turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// The session whose history this turn extends.
    pub session_id: String,

    /// The user's message for this turn.
    pub message: String,

    /// Sampling temperature forwarded to the backend.
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,

    /// Cap on generated tokens forwarded to the backend.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: Option<u32>,
}

impl ChatRequest {
    /// Create a new `ChatRequest` with default generation parameters.
    pub fn new(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the generated-token cap.
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }
}
