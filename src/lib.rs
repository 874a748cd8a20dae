// Public modules
pub mod aggregator;
pub mod config;
pub mod error;
pub mod observability;
pub mod server;
pub mod source;
pub mod store;
pub mod turn;
pub mod types;

// Re-exports
pub use aggregator::ArtifactAggregator;
pub use error::{Error, Result};
pub use server::{AppState, cors_layer, router};
pub use source::{Gemini, GenerationOptions, ModelStreamSource, PieceStream};
pub use store::ConversationStore;
pub use turn::TurnStream;
pub use types::*;
