//! Output-facing layer: turns domain data into the things a human or a CLI
//! consumes — rendered DDL and coloured terminal summaries.

pub mod renderer;

#[cfg(feature = "cli")]
pub mod cli_summary;
