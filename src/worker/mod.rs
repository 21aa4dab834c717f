//! Background job queue and its caller-facing seams.

pub mod events;
mod queue;
pub mod scratch;

pub use events::{EventSink, NullSink};
pub use queue::{Job, JobError, JobOptions, TranscriptionWorker, WorkerHandle};
