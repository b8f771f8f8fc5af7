use std::{
    collections::HashSet,
    fs,
    path::Path,
};

use csv::{ReaderBuilder, StringRecord};

use crate::{Cell, ParsedTable, TableError};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Field values read as missing, the same set pandas treats as NA by default.
const NA_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// CSV reader settings. Only the header flag is exposed to users; the
/// delimiter is here so the scanner and the reader agree on it.
#[derive(Debug, Clone, Copy)]
pub struct CsvParser {
    delimiter: u8,
    header: bool,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self {
            delimiter: b',',
            header: true,
        }
    }
}

impl CsvParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// When false, columns are named by position (`0`, `1`, ...).
    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn parse_file(&self, path: &Path) -> Result<ParsedTable, TableError> {
        let bytes = fs::read(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_bytes(&bytes)
    }

    pub fn parse_bytes(&self, data: &[u8]) -> Result<ParsedTable, TableError> {
        let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
        if let Some(line) = unterminated_quote_line(data, self.delimiter) {
            return Err(TableError::UnterminatedQuote { line });
        }

        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(data);

        let mut records = reader.records();
        let Some(first) = records.next().transpose()? else {
            return Err(TableError::NoColumns);
        };

        let (columns, mut rows) = if self.header {
            (header_names(&first), Vec::new())
        } else {
            let columns = (0..first.len()).map(|i| i.to_string()).collect();
            (columns, vec![to_cells(&first, first.len())])
        };
        let width = columns.len();

        for record in records {
            let record = record?;
            if record.len() > width {
                return Err(TableError::FieldCount {
                    line: record_line(data, &record),
                    expected: width,
                    found: record.len(),
                });
            }
            rows.push(to_cells(&record, width));
        }

        tracing::debug!(columns = width, rows = rows.len(), "parsed csv");
        Ok(ParsedTable { columns, rows })
    }
}

/// Reads `path` as CSV, treating the first row as column names when `header`
/// is set.
pub fn read_csv(path: &Path, header: bool) -> Result<ParsedTable, TableError> {
    CsvParser::new().with_header(header).parse_file(path)
}

fn to_cells(record: &StringRecord, width: usize) -> Vec<Cell> {
    let mut cells: Vec<Cell> = record
        .iter()
        .map(|field| (!is_missing(field)).then(|| field.to_string()))
        .collect();
    cells.resize(width, None);
    cells
}

fn is_missing(field: &str) -> bool {
    field.is_empty() || NA_TOKENS.contains(&field)
}

/// Physical line a record starts on. The reader's own position sits before
/// any blank lines it skipped, so walk past those.
fn record_line(data: &[u8], record: &StringRecord) -> u64 {
    let Some(start) = record.position().map(|p| p.byte() as usize) else {
        return 0;
    };
    let start = start.min(data.len());
    let mut line = 1 + data[..start].iter().filter(|&&b| b == b'\n').count() as u64;
    for &b in data[start..].iter().take_while(|&&b| b == b'\n' || b == b'\r') {
        if b == b'\n' {
            line += 1;
        }
    }
    line
}

/// Blank names become `Unnamed: {i}`; repeats get a `.{n}` suffix.
fn header_names(record: &StringRecord) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(record.len());
    for (idx, raw) in record.iter().enumerate() {
        let base = if raw.is_empty() {
            format!("Unnamed: {idx}")
        } else {
            raw.to_string()
        };
        let mut name = base.clone();
        let mut suffix = 1;
        while seen.contains(&name) {
            name = format!("{base}.{suffix}");
            suffix += 1;
        }
        seen.insert(name.clone());
        names.push(name);
    }
    names
}

/// The csv reader closes an open quote at end of input without complaint, so
/// scan for it up front. Returns the line the dangling quote opened on.
fn unterminated_quote_line(data: &[u8], delimiter: u8) -> Option<u64> {
    let mut line = 1;
    let mut field_start = true;
    let mut open_at = None;
    let mut bytes = data.iter().copied().peekable();

    while let Some(b) = bytes.next() {
        if open_at.is_some() {
            match b {
                b'"' if bytes.peek() == Some(&b'"') => {
                    bytes.next();
                }
                b'"' => open_at = None,
                b'\n' => line += 1,
                _ => {}
            }
            field_start = false;
            continue;
        }

        if b == b'"' && field_start {
            open_at = Some(line);
        }
        if b == b'\n' {
            line += 1;
        }
        field_start = b == delimiter || b == b'\n' || b == b'\r';
    }

    open_at
}

#[cfg(test)]
#[path = "tests/parser_tests.rs"]
mod tests;
