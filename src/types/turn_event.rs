use serde::{Deserialize, Serialize};

use crate::types::Artifact;

/// One event on the outbound stream of a chat turn.
///
/// A turn emits zero or more `Chunk` events interleaved with `Artifact`
/// events, then exactly one terminal event: `Done` on a clean finish or
/// `Error` when the backend fails.  The JSON form carries a `"type"` tag
/// so callers can dispatch without inspecting SSE event names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TurnEvent {
    /// An incremental piece of model text, exactly as received.
    Chunk {
        /// The text of this piece.
        text: String,
    },

    /// A code block whose closing fence was just seen.
    Artifact {
        /// The completed artifact.
        artifact: Artifact,
    },

    /// The model stream ended and the turn was finalized.
    Done,

    /// The backend failed; the turn ends without finalization.
    Error {
        /// Human-readable description of the failure.
        message: String,
    },
}

impl TurnEvent {
    /// The SSE event name this event is framed under.  `artifact` and
    /// `error` are named events so EventSource listeners can subscribe to
    /// them directly; chunks and `done` ride the default event name.
    pub fn sse_event_name(&self) -> Option<&'static str> {
        match self {
            TurnEvent::Chunk { .. } => None,
            TurnEvent::Artifact { .. } => Some("artifact"),
            TurnEvent::Done => None,
            TurnEvent::Error { .. } => Some("error"),
        }
    }

    /// Whether this event terminates the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnEvent::Done | TurnEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn chunk_serialization() {
        let event = TurnEvent::Chunk {
            text: "hello".to_string(),
        };
        let json = to_value(&event).unwrap();

        assert_eq!(
            json,
            json!({
                "type": "chunk",
                "text": "hello"
            })
        );
    }

    #[test]
    fn artifact_serialization() {
        let event = TurnEvent::Artifact {
            artifact: Artifact::new("rust", "fn main() {}\n"),
        };
        let json = to_value(&event).unwrap();

        assert_eq!(
            json,
            json!({
                "type": "artifact",
                "artifact": {
                    "language": "rust",
                    "content": "fn main() {}\n"
                }
            })
        );
    }

    #[test]
    fn done_serialization() {
        let json = to_value(&TurnEvent::Done).unwrap();
        assert_eq!(json, json!({ "type": "done" }));
    }

    #[test]
    fn error_serialization() {
        let event = TurnEvent::Error {
            message: "backend unreachable".to_string(),
        };
        let json = to_value(&event).unwrap();

        assert_eq!(
            json,
            json!({
                "type": "error",
                "message": "backend unreachable"
            })
        );
    }

    #[test]
    fn event_names() {
        assert_eq!(
            TurnEvent::Chunk {
                text: String::new()
            }
            .sse_event_name(),
            None
        );
        assert_eq!(TurnEvent::Done.sse_event_name(), None);
        assert_eq!(
            TurnEvent::Artifact {
                artifact: Artifact::new("", "")
            }
            .sse_event_name(),
            Some("artifact")
        );
        assert_eq!(
            TurnEvent::Error {
                message: String::new()
            }
            .sse_event_name(),
            Some("error")
        );
    }

    #[test]
    fn terminal_events() {
        assert!(TurnEvent::Done.is_terminal());
        assert!(
            TurnEvent::Error {
                message: "x".to_string()
            }
            .is_terminal()
        );
        assert!(
            !TurnEvent::Chunk {
                text: "x".to_string()
            }
            .is_terminal()
        );
    }
}
