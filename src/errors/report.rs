// src/errors/report.rs
//! Rendering utilities for miette diagnostics.

use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme, ThemeCharacters, ThemeStyles};
use std::io::Write as IoWrite;

/// Create a handler for terminal output (unicode + colors).
pub fn terminal_handler() -> GraphicalReportHandler {
    let theme = GraphicalTheme {
        characters: ThemeCharacters::unicode(),
        styles: ThemeStyles::ansi(),
    };
    GraphicalReportHandler::new_themed(theme)
}

/// Create a handler for plain output (ascii + no colors).
pub fn plain_handler() -> GraphicalReportHandler {
    let theme = GraphicalTheme {
        characters: ThemeCharacters::ascii(),
        styles: ThemeStyles::none(),
    };
    GraphicalReportHandler::new_themed(theme)
}

/// Render to stderr, with unicode and colors when `color` is set.
pub fn render_to_stderr(report: &dyn Diagnostic, color: bool) {
    let handler = if color {
        terminal_handler()
    } else {
        plain_handler()
    };
    let mut output = String::new();
    if handler.render_report(&mut output, report).is_ok() {
        eprint!("{}", output);
    }
}

/// Render to a buffer without colors.
pub fn render_to_string(report: &dyn Diagnostic) -> String {
    let mut output = String::new();
    let _ = plain_handler().render_report(&mut output, report);
    output
}

/// Render to any Write impl.
pub fn render_to_writer<W: IoWrite>(report: &dyn Diagnostic, mut writer: W) -> std::io::Result<()> {
    let output = render_to_string(report);
    writer.write_all(output.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CliError;
    use vtidx_passes::{ConfigError, PassError, VtableError};

    #[test]
    fn render_pass_error_with_code_and_help() {
        let err = CliError::from(PassError::from(VtableError::NonConstantWrite {
            type_name: "Animal".into(),
            field: "speak".into(),
            location: "function make".into(),
            position: 2,
            operand: 0,
        }));

        let output = render_to_string(&err);
        assert!(output.contains("E4002"), "should contain error code");
        assert!(output.contains("function make"), "should contain location");
        assert!(output.contains("help"), "should contain help text");
    }

    #[test]
    fn render_config_error_to_writer() {
        let err = CliError::from(ConfigError::InvalidThreads {
            value: "many".into(),
        });
        let mut buffer = Vec::new();
        render_to_writer(&err, &mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("E4101"));
        assert!(output.contains("invalid thread count 'many'"));
    }
}
