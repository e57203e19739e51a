//! Incremental symbol index for a source repository, served to coding
//! assistants over MCP.
//!
//! Indexing runs in a supervised child process that commits one atomic
//! snapshot per run; queries read the last committed snapshot.

pub mod config;
pub mod error;
pub mod index;
pub mod indexer;
pub mod mcp;
pub mod pattern;
pub mod query;
pub mod supervisor;

pub use error::{IndexError, Result};
