use serde::{Deserialize, Serialize};

/// A fenced code block extracted from a model reply.
///
/// Artifacts are produced by the aggregator the moment a block's closing
/// fence is seen.  The language tag is whatever followed the opening fence
/// on its own line, trimmed; an untagged fence yields an empty string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artifact {
    /// The language tag from the opening fence, possibly empty.
    pub language: String,

    /// The verbatim text between the fences.
    pub content: String,
}

impl Artifact {
    /// Create a new `Artifact` with the given language tag and content.
    pub fn new(language: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn serialization() {
        let artifact = Artifact::new("python", "print(42)\n");
        let json = to_value(&artifact).unwrap();

        assert_eq!(
            json,
            json!({
                "language": "python",
                "content": "print(42)\n"
            })
        );
    }

    #[test]
    fn empty_language() {
        let json = json!({
            "language": "",
            "content": "plain text"
        });

        let artifact: Artifact = serde_json::from_value(json).unwrap();
        assert_eq!(artifact.language, "");
        assert_eq!(artifact.content, "plain text");
    }
}
