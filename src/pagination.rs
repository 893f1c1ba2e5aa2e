//! Row-window pagination over CSV datasets.
//!
//! A page is addressed by `(index, size)` and selects the rows whose
//! integer identifier column `v` satisfies `index < v < index + size`.
//! The S3 backend pushes this predicate down as an S3 Select expression;
//! the memory backend evaluates it with [`select_csv_rows`].  Both return
//! raw CSV lines in the order the store yields them.

/// An identifier range selecting one page of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowWindow {
    /// Exclusive lower bound on the identifier.
    pub index: u64,
    /// Width of the window.
    pub size: u64,
}

impl RowWindow {
    pub fn new(index: u64, size: u64) -> Self {
        Self { index, size }
    }

    /// Exclusive upper bound on the identifier.
    pub fn end(&self) -> u64 {
        self.index.saturating_add(self.size)
    }

    /// Whether a row with identifier `id` falls inside the window.
    pub fn contains(&self, id: i64) -> bool {
        // Negative identifiers never match a window that starts at >= 0.
        match u64::try_from(id) {
            Ok(id) => id > self.index && id < self.end(),
            Err(_) => false,
        }
    }

    /// Render the S3 Select SQL expression for this window.
    ///
    /// `id_column` is quoted as an identifier; callers must reject names
    /// containing `"` (see `Config::validate`).
    pub fn select_expression(&self, id_column: &str) -> String {
        format!(
            "SELECT * FROM S3Object s WHERE CAST(s.\"{id_column}\" AS INT) > {} AND CAST(s.\"{id_column}\" AS INT) < {}",
            self.index,
            self.end()
        )
    }
}

/// Reassembles streamed record fragments into complete CSV lines.
///
/// Select responses arrive as arbitrary byte chunks; a row may be split
/// across two chunks and a multi-byte character across two more.
#[derive(Debug, Default)]
pub struct RecordAssembler {
    pending: Vec<u8>,
    rows: Vec<String>,
}

impl RecordAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment of the record stream.
    pub fn push(&mut self, fragment: &[u8]) {
        self.pending.extend_from_slice(fragment);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(&line[..line.len() - 1]);
        }
    }

    /// Flush any trailing row without a newline and return all rows.
    pub fn finish(mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.pending);
        self.emit(&rest);
        self.rows
    }

    fn emit(&mut self, line: &[u8]) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if !line.is_empty() {
            self.rows.push(String::from_utf8_lossy(line).into_owned());
        }
    }
}

/// Evaluate a window against CSV `content` whose first record is a header.
///
/// Rows whose identifier is missing or not an integer are skipped, as is
/// every row when the header lacks `id_column`.  Quoted fields may span
/// lines; such a row is returned with its embedded newlines intact.
pub fn select_csv_rows(content: &str, window: RowWindow, id_column: &str) -> Vec<String> {
    let mut records = split_records(content).into_iter();
    let header = match records.next() {
        Some(h) => h,
        None => return Vec::new(),
    };
    let column = match split_fields(header)
        .iter()
        .position(|name| name.trim() == id_column)
    {
        Some(c) => c,
        None => return Vec::new(),
    };

    records
        .filter(|record| !record.trim().is_empty())
        .filter(|record| {
            split_fields(record)
                .get(column)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .is_some_and(|id| window.contains(id))
        })
        .map(|record| record.trim_end_matches('\r').to_string())
        .collect()
}

/// Split CSV `content` into records on newlines outside double quotes.
///
/// A doubled `""` inside a quoted field toggles the quote state twice.
fn split_records(content: &str) -> Vec<&str> {
    let mut records = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, b) in content.bytes().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'\n' if !in_quotes => {
                records.push(&content[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < content.len() {
        records.push(&content[start..]);
    }
    records
}

/// Split one CSV line into fields, honoring double-quoted fields.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
