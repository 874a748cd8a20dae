use biometrics::{Collector, Counter, Moments};

pub(crate) static TURNS_STARTED: Counter = Counter::new("geminus.turn.started");
pub(crate) static TURNS_COMPLETED: Counter = Counter::new("geminus.turn.completed");
pub(crate) static TURNS_FAILED: Counter = Counter::new("geminus.turn.failed");
pub(crate) static TURNS_CANCELLED: Counter = Counter::new("geminus.turn.cancelled");
pub(crate) static TURN_DURATION: Moments = Moments::new("geminus.turn.duration_seconds");

pub(crate) static STREAM_PIECES: Counter = Counter::new("geminus.stream.pieces");
pub(crate) static ARTIFACTS_EXTRACTED: Counter = Counter::new("geminus.stream.artifacts");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&TURNS_STARTED);
    collector.register_counter(&TURNS_COMPLETED);
    collector.register_counter(&TURNS_FAILED);
    collector.register_counter(&TURNS_CANCELLED);
    collector.register_moments(&TURN_DURATION);

    collector.register_counter(&STREAM_PIECES);
    collector.register_counter(&ARTIFACTS_EXTRACTED);
}
