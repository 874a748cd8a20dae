//! One chat turn as a multiplexed event stream.
//!
//! A [`TurnStream`] drives a single reply end to end: it starts the backend
//! call, relays every piece of model text as a chunk event, runs the
//! aggregator over the same pieces to surface artifact events the moment a
//! block closes, and finalizes the session when the backend stream drains.
//! Consumers see one flat stream of [`TurnEvent`]s ending in `done` or
//! `error`; dropping the stream mid-turn abandons the reply without
//! finalizing anything.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::Stream;

use crate::aggregator::ArtifactAggregator;
use crate::error::{Error, Result};
use crate::observability::{
    ARTIFACTS_EXTRACTED, STREAM_PIECES, TURN_DURATION, TURNS_CANCELLED, TURNS_COMPLETED,
    TURNS_FAILED, TURNS_STARTED,
};
use crate::source::{GenerationOptions, ModelStreamSource, PieceStream};
use crate::store::ConversationStore;
use crate::types::{Message, TurnEvent};

enum Phase {
    Connecting(Pin<Box<dyn Future<Output = Result<PieceStream>> + Send>>),
    Streaming(PieceStream),
    Finished,
}

/// A stream of [`TurnEvent`]s for one reply.
///
/// Events come in protocol order: zero or more chunks, an artifact event
/// immediately after the chunk whose text closed its block, and exactly one
/// terminal event.  On a clean finish the turn appends the assistant
/// message to the session's history and records the last artifact before
/// emitting `done`.  A backend failure, at start or mid-stream, emits one
/// `error` event instead and skips finalization.
pub struct TurnStream {
    session_id: String,
    history: Vec<Message>,
    store: Arc<ConversationStore>,
    aggregator: ArtifactAggregator,
    pending: VecDeque<TurnEvent>,
    phase: Phase,
    started: Instant,
}

impl TurnStream {
    /// Start one turn.
    ///
    /// `history` is the conversation to send, newest user message last; the
    /// caller persists it before constructing the turn so the user message
    /// survives even when the stream is abandoned.  The backend call is
    /// issued lazily on first poll.
    pub fn new(
        session_id: impl Into<String>,
        history: Vec<Message>,
        options: GenerationOptions,
        store: Arc<ConversationStore>,
        source: Arc<dyn ModelStreamSource>,
    ) -> Self {
        TURNS_STARTED.click();
        let connect = {
            let history = history.clone();
            async move { source.stream_reply(history, options).await }
        };
        Self {
            session_id: session_id.into(),
            history,
            store,
            aggregator: ArtifactAggregator::new(),
            pending: VecDeque::new(),
            phase: Phase::Connecting(Box::pin(connect)),
            started: Instant::now(),
        }
    }

    fn ingest(&mut self, piece: String) {
        STREAM_PIECES.click();
        let artifact = self.aggregator.ingest(&piece);
        self.pending.push_back(TurnEvent::Chunk { text: piece });
        if let Some(artifact) = artifact {
            ARTIFACTS_EXTRACTED.click();
            self.pending.push_back(TurnEvent::Artifact { artifact });
        }
    }

    fn finalize(&mut self) {
        let mut history = std::mem::take(&mut self.history);
        history.push(Message::assistant(self.aggregator.full_text()));
        self.store.set_history(&self.session_id, history);
        if let Some(artifact) = self.aggregator.last_artifact() {
            self.store.set_last_artifact(&self.session_id, artifact.clone());
        }
        TURNS_COMPLETED.click();
        TURN_DURATION.add(self.started.elapsed().as_secs_f64());
        self.pending.push_back(TurnEvent::Done);
        self.phase = Phase::Finished;
    }

    fn fail(&mut self, err: Error) {
        tracing::warn!(session_id = %self.session_id, error = %err, "turn failed");
        TURNS_FAILED.click();
        self.pending.push_back(TurnEvent::Error {
            message: err.to_string(),
        });
        self.phase = Phase::Finished;
    }
}

impl Stream for TurnStream {
    type Item = TurnEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(event));
            }
            match &mut this.phase {
                Phase::Connecting(connect) => match connect.as_mut().poll(cx) {
                    Poll::Ready(Ok(stream)) => {
                        this.phase = Phase::Streaming(stream);
                    }
                    Poll::Ready(Err(err)) => {
                        this.fail(err);
                    }
                    Poll::Pending => return Poll::Pending,
                },
                Phase::Streaming(stream) => match stream.as_mut().poll_next(cx) {
                    Poll::Ready(Some(Ok(piece))) => {
                        this.ingest(piece);
                    }
                    Poll::Ready(Some(Err(err))) => {
                        this.fail(err);
                    }
                    Poll::Ready(None) => {
                        this.finalize();
                    }
                    Poll::Pending => return Poll::Pending,
                },
                Phase::Finished => return Poll::Ready(None),
            }
        }
    }
}

impl Drop for TurnStream {
    fn drop(&mut self) {
        if !matches!(self.phase, Phase::Finished) {
            TURNS_CANCELLED.click();
        }
    }
}
