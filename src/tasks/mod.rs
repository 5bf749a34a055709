//! Upload pipeline: one producer, a fixed pool of workers

mod processor;
mod worker;

pub use processor::{ItemError, ItemProcessor, MediaOptions, UploadProcessor};
pub use worker::{RunSummary, WorkerPool};
