//! Data model and processing pipeline for the Global AI Dialogues dataset.

pub mod cleanup;
pub mod embed;
pub mod graph;
pub mod logging;
pub mod participants;
pub mod pipeline;
pub mod source;
pub mod workspace;

pub use logging::init_logging;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
