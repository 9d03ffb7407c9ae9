// src/errors/mod.rs
//! Errors reported by the vtidx command line.
//!
//! Library errors keep their own codes (E40xx for passes, E41xx for configuration);
//! failures that only the CLI can hit use E42xx.

#![allow(unused_assignments)] // False positives from thiserror derive

pub mod report;

use miette::Diagnostic;
use thiserror::Error;
use vtidx_ir::Trap;
use vtidx_passes::{ConfigError, PassError};

pub use report::{render_to_stderr, render_to_string, render_to_writer};

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Pass(#[from] PassError),

    #[error("sample program trapped: {0}")]
    #[diagnostic(code(E4201), help("set VTIDX_LOG=debug to see the pass decisions"))]
    Trap(#[from] Trap),

    #[error("failed to write output: {0}")]
    #[diagnostic(code(E4202))]
    Io(#[from] std::io::Error),
}
