//! Input/output helpers.
//!
//! - history CSV ingest (`ingest`)
//! - forecast CSV and summary JSON exports (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
