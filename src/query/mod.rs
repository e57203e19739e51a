// Read-only queries over the index

pub mod engine;
pub mod format;

pub use engine::{QueryEngine, StatusReport, SymbolContent};
