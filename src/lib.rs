//! Build-driven repair loop for machine-migrated Java projects.
//!
//! The migrated tree is built, failing files are traced back to their legacy
//! sources through the mapping index, and each one is repaired (local
//! heuristics, then a full-file rewrite by a text-generation oracle) until the
//! build passes or the retry budget runs out.

pub mod config;
pub mod context;
pub mod deps;
pub mod embedder;
pub mod error;
pub mod heuristics;
pub mod history;
pub mod mapping;
pub mod oracle;
pub mod packages;
pub mod repair;
pub mod retry;
pub mod sanitize;
pub mod scanner;
pub mod stitch;
pub mod validator;
pub mod vector_store;
