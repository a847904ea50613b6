use std::io::{self, Write};

use serde_json::json;

use crate::cli::OutputFormat;
use crate::commands::{CommandResult, Table};
use crate::error::CliError;

pub fn render(result: &CommandResult, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match format {
        OutputFormat::Json => {
            let document = json!({
                "data": result.data,
                "warnings": result.warnings,
            });
            let payload = if pretty {
                serde_json::to_string_pretty(&document)?
            } else {
                serde_json::to_string(&document)?
            };
            writeln!(out, "{payload}")?;
        }
        OutputFormat::Table => {
            out.write_all(render_table(&result.table).as_bytes())?;
            if !result.warnings.is_empty() {
                writeln!(out, "warnings:")?;
                for warning in &result.warnings {
                    writeln!(out, "  - {warning}")?;
                }
            }
        }
    }

    Ok(())
}

/// Left-aligned columns padded to the widest cell.
fn render_table(table: &Table) -> String {
    let mut widths: Vec<usize> = table.headers.iter().map(|header| header.len()).collect();
    for row in &table.rows {
        for (index, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(index) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let mut rendered = String::new();
    let headers: Vec<String> = table.headers.iter().map(|h| (*h).to_owned()).collect();
    push_row(&mut rendered, &headers, &widths);
    for row in &table.rows {
        push_row(&mut rendered, row, &widths);
    }
    rendered
}

fn push_row(rendered: &mut String, cells: &[String], widths: &[usize]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    rendered.push_str(line.trim_end());
    rendered.push('\n');
}
