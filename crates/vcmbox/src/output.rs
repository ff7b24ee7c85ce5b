use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A command result that can be rendered in every output format.
pub trait Report: Serialize {
    /// Heading for table output.
    fn title(&self) -> &'static str;
    /// Ordered `(field, value)` pairs for table and pretty output.
    fn fields(&self) -> Vec<(&'static str, String)>;
    /// Single value for raw output.
    fn raw(&self) -> String;
}

pub fn print_report<R: Report>(report: &R, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![report.title(), ""]);
            for (name, value) in report.fields() {
                table.add_row(vec![name.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line: Vec<String> = report
                .fields()
                .into_iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            println!("{}", line.join(" "));
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout();
            let _ = writeln!(out, "{}", report.raw());
            let _ = out.flush();
        }
    }
}

/// Hex rendering used for handles' bus addresses and flag words in reports.
pub fn hex(value: u32) -> String {
    format!("{value:#010x}")
}
