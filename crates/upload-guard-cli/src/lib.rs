//! Command-line front end for the `upload-guard` sanitizer.

pub mod audit;
pub mod cli;
