//! Table and CSV rendering.
//!
//! Output is rendered fully in memory and written in one go, so a destination
//! that cannot be opened never ends up holding a partial table.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::record::{
    CANCEL_DATE_FIELD, MATCH_PERCENT_FIELD, NAME_FIELD, REG_DATE_FIELD, Record, STATE_FIELD,
    STATUS_FIELD,
};

/// Errors writing rendered output.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write output file {}: {source}", .path.display())]
    File { path: PathBuf, source: io::Error },

    #[error("failed to write to stdout: {0}")]
    Stdout(#[source] io::Error),
}

/// A rendered column: upstream field plus its display header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub field: &'static str,
    pub header: &'static str,
}

/// Columns shown for every result set.
pub const BASE_COLUMNS: [Column; 5] = [
    Column {
        field: NAME_FIELD,
        header: "Business Name",
    },
    Column {
        field: STATE_FIELD,
        header: "State of Registration",
    },
    Column {
        field: STATUS_FIELD,
        header: "Status",
    },
    Column {
        field: REG_DATE_FIELD,
        header: "Registration Date",
    },
    Column {
        field: CANCEL_DATE_FIELD,
        header: "Cancellation Date",
    },
];

/// Extra column appended for ranked result sets.
pub const MATCH_PERCENT_COLUMN: Column = Column {
    field: MATCH_PERCENT_FIELD,
    header: "Match Percent",
};

/// Column layout for a result set.
pub fn columns(ranked: bool) -> Vec<Column> {
    let mut columns = BASE_COLUMNS.to_vec();
    if ranked {
        columns.push(MATCH_PERCENT_COLUMN);
    }
    columns
}

/// File format chosen from the `--output` path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Table,
}

impl OutputFormat {
    /// `.csv` selects CSV; anything else gets the aligned table.
    pub fn from_path(path: &Path) -> Self {
        if path.to_string_lossy().ends_with(".csv") {
            Self::Csv
        } else {
            Self::Table
        }
    }

    pub fn render(self, records: &[Record], columns: &[Column]) -> String {
        match self {
            Self::Csv => render_csv(records, columns),
            Self::Table => render_table(records, columns),
        }
    }
}

// ============================================================================
// Renderers
// ============================================================================

/// Render records as CSV with a header row of display names.
pub fn render_csv(records: &[Record], columns: &[Column]) -> String {
    let mut out = String::new();
    push_csv_row(&mut out, columns.iter().map(|c| c.header.to_string()));
    for record in records {
        push_csv_row(&mut out, columns.iter().map(|c| record.field_text(c.field)));
    }
    out
}

fn push_csv_row(out: &mut String, fields: impl Iterator<Item = String>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&csv_escape(&field));
    }
    out.push('\n');
}

fn csv_escape(field: &str) -> String {
    let needs_quotes = field.contains([',', '"', '\n', '\r'])
        || field.starts_with(char::is_whitespace);
    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render records as a left-aligned text table.
///
/// ```text
/// Business Name | Status
/// --------------+-----------
/// Acme          | Registered
/// ```
pub fn render_table(records: &[Record], columns: &[Column]) -> String {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| columns.iter().map(|c| record.field_text(c.field)).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.header.chars().count()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_table_row(&mut out, columns.iter().map(|c| c.header), &widths);

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&separator.join("-+-"));
    out.push('\n');

    for row in &rows {
        push_table_row(&mut out, row.iter().map(String::as_str), &widths);
    }
    out
}

fn push_table_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect();
    out.push_str(&padded.join(" | "));
    out.push('\n');
}

// ============================================================================
// Writers
// ============================================================================

/// Render to `path`, picking the format from its suffix.
pub fn write_file(path: &Path, records: &[Record], columns: &[Column]) -> Result<(), OutputError> {
    let rendered = OutputFormat::from_path(path).render(records, columns);
    fs::write(path, rendered).map_err(|source| OutputError::File {
        path: path.to_path_buf(),
        source,
    })
}

/// Print the aligned table to an already-open writer (normally stdout).
pub fn print_table(
    out: &mut dyn Write,
    records: &[Record],
    columns: &[Column],
) -> Result<(), OutputError> {
    out.write_all(render_table(records, columns).as_bytes())
        .map_err(OutputError::Stdout)
}
