#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod compaction;
pub mod concept;
pub mod config;
pub mod error;
pub mod eventlog;
pub mod process;
pub mod reflection;
pub mod search;
pub mod session;
pub mod utils;

pub use config::Config;
pub use error::{Result, TailmemError};
pub use session::{MemorySession, MemoryStores};
