//! Bounded background execution for index, rebuild and reflection passes.

pub mod background;

pub use background::{BackgroundQueue, ReportReceiver, TaskOutcome, TaskReport};
