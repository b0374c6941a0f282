//! In-memory tables of text cells, plus the CSV text codec.

use std::collections::HashMap;

use crate::error::ReconError;
use crate::normalize::normalize_header;

/// Rectangular table: every row has exactly `headers.len()` cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut table = Self::new(headers);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Append a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// Overwrite the column named `name` (header-normalized match) or append it.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) {
        let wanted = normalize_header(name);
        let col = match self.headers.iter().position(|h| normalize_header(h) == wanted) {
            Some(col) => col,
            None => {
                self.headers.push(name.to_string());
                for row in &mut self.rows {
                    row.push(String::new());
                }
                self.headers.len() - 1
            }
        };
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[col] = value;
        }
    }

    /// Decode CSV text; the first record is the header row.
    ///
    /// The delimiter is sniffed (tab, semicolon, comma, pipe) and a UTF-8 BOM
    /// is ignored.
    pub fn from_csv_str(data: &str) -> Result<Self, ReconError> {
        let data = data.strip_prefix('\u{feff}').unwrap_or(data);
        let delimiter = sniff_delimiter(data);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(data.as_bytes());

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut table = Self::new(headers);
        for record in reader.records() {
            let record = record?;
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            table.push_row(record.iter().map(str::to_string).collect());
        }
        Ok(table)
    }

    pub fn to_csv_string(&self) -> Result<String, ReconError> {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ReconError::Table(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| ReconError::Table(e.to_string()))
    }
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        // lines agreeing with the header width, weighted by that width
        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

// ---------------------------------------------------------------------------
// Column lookup
// ---------------------------------------------------------------------------

/// Name -> position lookup over a header row.
///
/// Exact names win; otherwise the header-normalized form is tried. For
/// repeated headers the leftmost column wins.
#[derive(Debug, Clone)]
pub struct ColumnIndex {
    exact: HashMap<String, usize>,
    folded: HashMap<String, usize>,
}

impl ColumnIndex {
    pub fn new(headers: &[String]) -> Self {
        let mut exact = HashMap::new();
        let mut folded = HashMap::new();
        for (i, h) in headers.iter().enumerate() {
            exact.entry(h.clone()).or_insert(i);
            folded.entry(normalize_header(h)).or_insert(i);
        }
        Self { exact, folded }
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.exact
            .get(name)
            .or_else(|| self.folded.get(&normalize_header(name)))
            .copied()
    }
}

/// One row of a table, addressable by column name.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    index: &'a ColumnIndex,
    cells: &'a [String],
}

impl<'a> RecordView<'a> {
    pub fn new(index: &'a ColumnIndex, cells: &'a [String]) -> Self {
        Self { index, cells }
    }

    /// Cell value, or `None` when the column does not exist.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let col = self.index.get(column)?;
        self.cells.get(col).map(String::as_str)
    }
}
