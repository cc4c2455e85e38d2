//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use skyctl_core::PropertyState;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Property state, colored like an INDI status light.
pub fn paint_state(state: PropertyState, color: bool) -> String {
    let text = state.to_string();
    if !color {
        return text;
    }
    match state {
        PropertyState::Idle => text.dimmed().to_string(),
        PropertyState::Ok => text.green().to_string(),
        PropertyState::Busy => text.yellow().to_string(),
        PropertyState::Alert => text.red().bold().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => data.iter().map(&id_fn).collect::<Vec<_>>().join("\n"),
    }
}

/// Render a single item. Table format uses `detail_fn`, since single-item
/// views are key/value listings rather than tables.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => id_fn(data),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> String {
    let rendered = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    rendered.unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}"))
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).unwrap_or_else(|e| format!("error: serialization failed: {e}"))
}

/// Format decimal hours or degrees as `±dd:mm:ss.s`.
pub fn sexagesimal(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let total = (value.abs() * 36_000.0).round();
    let tenths = total % 10.0;
    let seconds = (total / 10.0).floor() % 60.0;
    let minutes = (total / 600.0).floor() % 60.0;
    let whole = (total / 36_000.0).floor();
    format!("{sign}{whole:02}:{minutes:02}:{seconds:02}.{tenths}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sexagesimal_rounds_to_tenths() {
        assert_eq!(sexagesimal(5.5), "05:30:00.0");
        assert_eq!(sexagesimal(-0.25), "-00:15:00.0");
        assert_eq!(sexagesimal(23.999_999_9), "24:00:00.0");
        assert_eq!(sexagesimal(12.345_678), "12:20:44.4");
    }

    #[test]
    fn plain_state_has_no_escape_codes() {
        assert_eq!(paint_state(PropertyState::Alert, false), "Alert");
        assert!(paint_state(PropertyState::Ok, true).contains('\u{1b}'));
    }
}
