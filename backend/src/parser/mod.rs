//! Raw input loading with encoding and delimiter auto-detection.
//!
//! Accepts either a JSON array of objects or a CSV file and turns it into
//! [`RawSubscriptionRecord`]s. No casting happens here: values keep their
//! JSON type (JSON input) or stay strings (CSV input).

use serde_json::Value;
use std::path::Path;

use crate::error::{ParseError, ParseResult};
use crate::models::RawSubscriptionRecord;

/// Parsed raw input with metadata
#[derive(Debug, Clone)]
pub struct RawInput {
    /// Parsed records
    pub records: Vec<RawSubscriptionRecord>,
    /// Input format ("json" or "csv")
    pub format: &'static str,
    /// Detected encoding (CSV only)
    pub encoding: Option<String>,
    /// Detected delimiter (CSV only)
    pub delimiter: Option<char>,
    /// Column headers (CSV only)
    pub headers: Vec<String>,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        // UTF-8 and unknown charsets: lossy UTF-8
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse a JSON array of raw subscription objects.
///
/// Unknown keys are ignored, missing keys are null.
pub fn parse_json(content: &str) -> ParseResult<Vec<RawSubscriptionRecord>> {
    if content.trim().is_empty() {
        return Err(ParseError::EmptyFile);
    }

    let values: Vec<Value> = serde_json::from_str(content)?;
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            value
                .as_object()
                .map(RawSubscriptionRecord::from_object)
                .ok_or(ParseError::NotAnObject { index: i })
        })
        .collect()
}

/// Parse CSV text with an explicit delimiter.
///
/// The first line holds the headers. Empty cells are loaded as null.
pub fn parse_csv(content: &str, delimiter: char) -> ParseResult<(Vec<String>, Vec<RawSubscriptionRecord>)> {
    if content.trim().is_empty() {
        return Err(ParseError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ParseError::Csv { line: 1, message: e.to_string() })?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(ParseError::NoHeaders);
    }

    let mut records = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row.map_err(|e| ParseError::Csv {
            line: e.position().map(|p| p.line() as usize).unwrap_or(idx + 2),
            message: e.to_string(),
        })?;

        if row.iter().all(|cell| cell.is_empty()) {
            continue;
        }

        let obj: serde_json::Map<String, Value> = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let cell = row.get(i).unwrap_or("");
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                (header.clone(), value)
            })
            .collect();

        records.push(RawSubscriptionRecord::from_object(&obj));
    }

    Ok((headers, records))
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> ParseResult<RawInput> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    let (headers, records) = parse_csv(&content, delimiter)?;

    Ok(RawInput {
        records,
        format: "csv",
        encoding: Some(encoding),
        delimiter: Some(delimiter),
        headers,
    })
}

/// Load a raw input file. `.json` files are parsed as JSON, anything else as CSV.
pub fn load_raw_file<P: AsRef<Path>>(path: P) -> ParseResult<RawInput> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        let content = decode_content(&bytes, "utf-8");
        let records = parse_json(&content)?;
        Ok(RawInput {
            records,
            format: "json",
            encoding: None,
            delimiter: None,
            headers: Vec::new(),
        })
    } else {
        parse_bytes_auto(&bytes)
    }
}
