//! Compiles agentic-workflow Markdown sources into deterministic CI lock
//! files, and reconstructs structured audit reports from a completed
//! run's downloaded artifacts.
//!
//! The compile side ([`compiler`]) walks Front-Matter Parser -> Import
//! Resolver -> Permission & Tool Validator -> Safe-Output Configurator ->
//! Lock-File Emitter for each source file; the audit side ([`audit`])
//! walks Artifact Flattener -> Log Metric Extractor -> Audit Report
//! Builder over one run's downloaded files. Both halves share the pure
//! domain types in `aw_types`.

pub mod artifacts;
pub mod audit;
pub mod auth;
pub mod compiler;
pub mod config;
pub mod emit;
pub mod front_matter;
pub mod imports;
pub mod logs;
pub mod packages;
pub mod pins;
pub mod safeoutputs;
pub mod sanitizer;
pub mod schema;
pub mod validate;

pub use compiler::{CompileOptions, compile_batch, compile_one, watch};
