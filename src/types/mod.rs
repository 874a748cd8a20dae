// Public modules
pub mod artifact;
pub mod chat_request;
pub mod message;
pub mod turn_event;

// Re-exports
pub use artifact::Artifact;
pub use chat_request::ChatRequest;
pub use message::{Message, Role, RoleParseError};
pub use turn_event::TurnEvent;
