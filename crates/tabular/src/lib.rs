//! Comma-separated data to an in-memory table, and back out as HTML.

mod error;
mod html;
mod parser;

pub use error::TableError;
pub use html::{escape_html, render_html};
pub use parser::{read_csv, CsvParser};

use shared::protocol::TableView;

/// A missing value: an empty field, or a field past the end of a short row.
pub type Cell = Option<String>;

/// Text shown for a missing cell.
pub const MISSING_CELL: &str = "NaN";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl ParsedTable {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn to_view(&self) -> TableView {
        TableView {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .map(|row| row.iter().map(|cell| display_cell(cell).to_string()).collect())
                .collect(),
        }
    }
}

pub fn display_cell(cell: &Cell) -> &str {
    cell.as_deref().unwrap_or(MISSING_CELL)
}
