// src/cli/args.rs

use clap::{Parser, Subcommand, ValueEnum};

use vtidx_passes::Parallelism;

use crate::commands::version::version_string;

/// Color output mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect based on terminal
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorMode {
    pub fn enabled(self, is_terminal: bool) -> bool {
        match self {
            ColorMode::Auto => is_terminal,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

/// Vtable field to dispatch table index rewriter
#[derive(Parser, Debug)]
#[command(name = "vtidx")]
#[command(version = version_string())]
#[command(about = "Rewrite function-reference vtable fields into table indexes", long_about = None)]
pub struct Cli {
    /// Color output: auto, always, never
    #[arg(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transform the built-in Animal/Dog sample and show each step
    Demo {
        /// Worker threads for function rewriting: auto, 0/1 for sequential, or a count
        #[arg(long, value_name = "N")]
        threads: Option<Parallelism>,

        /// Name prefix for synthesized dispatch tables
        #[arg(long, value_name = "PREFIX")]
        table_prefix: Option<String>,

        /// Skip evaluating the sample before and after
        #[arg(long)]
        no_run: bool,
    },
    /// Show version information
    Version,
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;

    #[test]
    fn parses_demo_flags() {
        let cli = Cli::try_parse_from([
            "vtidx",
            "demo",
            "--threads",
            "2",
            "--table-prefix",
            "dispatch",
            "--no-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Demo {
                threads,
                table_prefix,
                no_run,
            } => {
                assert_eq!(threads, Some(Parallelism::Threads(NonZeroUsize::new(2).unwrap())));
                assert_eq!(table_prefix.as_deref(), Some("dispatch"));
                assert!(no_run);
            }
            other => panic!("expected demo, got {other:?}"),
        }
        assert_eq!(cli.color, ColorMode::Auto);
    }

    #[test]
    fn rejects_bad_thread_count() {
        assert!(Cli::try_parse_from(["vtidx", "demo", "--threads", "lots"]).is_err());
    }

    #[test]
    fn color_mode_follows_terminal_only_on_auto() {
        assert!(ColorMode::Auto.enabled(true));
        assert!(!ColorMode::Auto.enabled(false));
        assert!(ColorMode::Always.enabled(false));
        assert!(!ColorMode::Never.enabled(true));
    }
}
