#![deny(missing_docs)]

//! Streaming extraction of fenced code blocks from model output.
//!
//! The aggregator consumes a model reply one piece at a time, in whatever
//! sizes the backend happens to deliver, and recognizes triple-backtick
//! fenced blocks as they stream past.  A fence marker, its language tag, or
//! the closing fence may be split across any number of pieces; the machine
//! reassembles them without ever re-scanning text it has already consumed.
//!
//! All scan positions are byte offsets.  The needles ("```" and '\n') are
//! ASCII, so every offset `str::find` produces lands on a character
//! boundary and slicing is UTF-8 safe.

use crate::types::Artifact;

/// The fence marker that opens and closes a code block.
const FENCE: &str = "```";

/// Where the scanner is relative to a fenced block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    /// Outside any block, scanning for an opening marker.
    #[default]
    Prose,
    /// Saw an opening marker, accumulating the language tag line.
    TagLine,
    /// Inside a block, scanning for the closing marker.
    Code,
}

/// Incremental recognizer for fenced code blocks in a streamed reply.
///
/// One aggregator serves exactly one turn.  Feed it every piece of model
/// text via [`ingest`](ArtifactAggregator::ingest); it reports a completed
/// [`Artifact`] the moment a block's closing fence arrives.  The full
/// concatenated reply is available from
/// [`full_text`](ArtifactAggregator::full_text) at any time, and the most
/// recent completed block from
/// [`last_artifact`](ArtifactAggregator::last_artifact).
///
/// Work is O(1) amortized per ingested byte.  Consumed prose is dropped
/// from the working buffer (it lives on in the full text); the only bytes
/// carried between calls are an incomplete tag line and up to two trailing
/// backticks that could be the start of a marker split across pieces.
#[derive(Debug, Default)]
pub struct ArtifactAggregator {
    buffer: String,
    scan_from: usize,
    state: State,
    language: String,
    code: String,
    full_text: String,
    last_artifact: Option<Artifact>,
}

impl ArtifactAggregator {
    /// Create an aggregator with no text ingested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one piece of model text and advance the machine as far as the
    /// text allows.
    ///
    /// Returns the last block closed during this call, if any.  When a
    /// single piece closes several blocks, earlier ones are superseded;
    /// each still updates [`last_artifact`](ArtifactAggregator::last_artifact)
    /// in turn.
    pub fn ingest(&mut self, piece: &str) -> Option<Artifact> {
        self.full_text.push_str(piece);
        self.buffer.push_str(piece);
        let mut closed = None;
        loop {
            match self.state {
                State::Prose => {
                    if let Some(idx) = self.buffer.find(FENCE) {
                        self.buffer.drain(..idx + FENCE.len());
                        self.state = State::TagLine;
                        self.scan_from = 0;
                    } else {
                        // No marker, so no run of three backticks exists
                        // anywhere in the buffer; the trailing run is at
                        // most two and only it could extend into one.
                        let cut = self.buffer.len() - trailing_backticks(&self.buffer);
                        self.buffer.drain(..cut);
                        break;
                    }
                }
                State::TagLine => {
                    if let Some(nl) = self.buffer[self.scan_from..].find('\n') {
                        let nl = self.scan_from + nl;
                        self.language = self.buffer[..nl].trim().to_string();
                        self.buffer.drain(..=nl);
                        self.state = State::Code;
                        self.scan_from = 0;
                    } else {
                        self.scan_from = self.buffer.len();
                        break;
                    }
                }
                State::Code => {
                    if let Some(idx) = self.buffer.find(FENCE) {
                        self.code.push_str(&self.buffer[..idx]);
                        self.buffer.drain(..idx + FENCE.len());
                        let artifact = Artifact {
                            language: std::mem::take(&mut self.language),
                            content: std::mem::take(&mut self.code),
                        };
                        self.last_artifact = Some(artifact.clone());
                        closed = Some(artifact);
                        self.state = State::Prose;
                    } else {
                        let cut = self.buffer.len() - trailing_backticks(&self.buffer);
                        self.code.push_str(&self.buffer[..cut]);
                        self.buffer.drain(..cut);
                        break;
                    }
                }
            }
        }
        closed
    }

    /// The concatenation of every piece ingested so far, fences included.
    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// The most recently completed artifact, across the whole turn.
    ///
    /// An unterminated block never becomes an artifact; if the stream ends
    /// mid-block this still reports the last block that closed cleanly.
    pub fn last_artifact(&self) -> Option<&Artifact> {
        self.last_artifact.as_ref()
    }
}

fn trailing_backticks(s: &str) -> usize {
    s.bytes().rev().take_while(|&b| b == b'`').count()
}
