//! Queueing of catalog granules for download.

mod queuer;

pub use queuer::{QueueError, QueueRequest, QueueSummary, Queuer};
