// src/bin/vtidx.rs

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{CommandFactory, FromArgMatches};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::FormatTime;

use vtidx::cli::{Cli, Commands};
use vtidx::commands::demo::{DemoOptions, run_demo};
use vtidx::commands::version::print_version;

/// A timer that outputs nothing but still enables span timing calculation
struct NoTimestamp;

impl FormatTime for NoTimestamp {
    fn format_time(
        &self,
        _w: &mut tracing_subscriber::fmt::format::Writer<'_>,
    ) -> std::fmt::Result {
        Ok(())
    }
}

fn main() -> ExitCode {
    // Initialize tracing if VTIDX_LOG is set
    // VTIDX_LOG_STYLE: "compact" (default) or "full" (with timestamps)
    if let Ok(filter) = EnvFilter::try_from_env("VTIDX_LOG") {
        let style = std::env::var("VTIDX_LOG_STYLE").unwrap_or_default();
        if style == "full" {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_level(true)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_writer(std::io::stderr)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_level(true)
                .with_timer(NoTimestamp)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(std::io::stderr)
                .init();
        }
        tracing::debug!("tracing initialized");
    }

    let styles = Styles::styled()
        .header(AnsiColor::Green.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default());

    let cli = match Cli::from_arg_matches(&Cli::command().styles(styles).get_matches()) {
        Ok(cli) => cli,
        Err(err) => err.exit(),
    };

    match cli.command {
        Commands::Demo {
            threads,
            table_prefix,
            no_run,
        } => run_demo(
            &DemoOptions {
                threads,
                table_prefix,
                run: !no_run,
            },
            cli.color,
        ),
        Commands::Version => print_version(),
    }
}
