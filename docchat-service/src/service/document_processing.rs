//! Upload intake and the background indexing pipeline.
//!
//! An upload is validated synchronously (size, format), gets a task and a
//! reserved collection name, then one spawned job drives the task through
//! `uploading -> processing -> completed | failed`.

mod processing;
mod progress;
mod upload;

pub(crate) use processing::UploadJob;
