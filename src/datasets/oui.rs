//! IEEE MAC vendor registry feed
//!
//! Only lines carrying the `(base 16)` marker are entries:
//!
//! ```text
//! 00000C     (base 16)		Cisco Systems, Inc
//! ```
//!
//! Each entry line is split into at most three fields on runs of two or more
//! whitespace characters. Field one is the OUI in the registry's uppercase hex
//! form, field three the company name. Entry lines that do not yield exactly
//! three fields are logged and skipped.

use crate::datasets::fetcher::next_line;
use crate::datasets::range::OUI_KEY_LEN;
use crate::error::FetchError;
use std::io::BufRead;
use tracing::warn;

/// Marker identifying entry lines in the registry feed
pub const BASE16_MARKER: &str = "(base 16)";

/// A vendor entry from the registry feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorLine {
    pub prefix: String,
    pub company: String,
}

/// Outcome of looking at a single feed line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedVendorLine {
    Entry(VendorLine),
    /// Entry line with the wrong shape, carrying the number of fields found
    Malformed(usize),
    /// Not an entry line at all
    Other,
}

/// Split into at most `limit` fields on runs of two or more whitespace chars
///
/// The last field is the unsplit remainder of the line.
fn split_on_whitespace_runs(line: &str, limit: usize) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut chars = line.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if fields.len() + 1 >= limit {
            break;
        }
        if !c.is_whitespace() {
            continue;
        }

        let mut end = idx + c.len_utf8();
        let mut run = 1;
        while let Some(&(next_idx, next)) = chars.peek() {
            if !next.is_whitespace() {
                break;
            }
            end = next_idx + next.len_utf8();
            run += 1;
            chars.next();
        }

        if run >= 2 {
            fields.push(&line[start..idx]);
            start = end;
        }
    }

    fields.push(&line[start..]);
    fields
}

pub fn parse_vendor_line(line: &str) -> ParsedVendorLine {
    if !line.contains(BASE16_MARKER) {
        return ParsedVendorLine::Other;
    }

    let fields = split_on_whitespace_runs(line.trim_end(), 3);
    if fields.len() != 3 {
        return ParsedVendorLine::Malformed(fields.len());
    }

    let prefix = fields[0].trim();
    if prefix.len() != OUI_KEY_LEN || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
        return ParsedVendorLine::Malformed(fields.len());
    }

    ParsedVendorLine::Entry(VendorLine {
        prefix: prefix.to_uppercase(),
        company: fields[2].trim().to_string(),
    })
}

/// Lazy iterator over the entries of a vendor registry feed
pub struct VendorLines<R: BufRead> {
    reader: R,
    buf: Vec<u8>,
    line_no: usize,
    skipped: usize,
    done: bool,
}

impl<R: BufRead> VendorLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
            skipped: 0,
            done: false,
        }
    }

    /// Number of malformed entry lines skipped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for VendorLines<R> {
    type Item = Result<VendorLine, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.line_no += 1;
            let line = match next_line(&mut self.reader, &mut self.buf, self.line_no) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            match parse_vendor_line(&line) {
                ParsedVendorLine::Entry(entry) => return Some(Ok(entry)),
                ParsedVendorLine::Malformed(fields) => {
                    self.skipped += 1;
                    warn!(
                        "Vendor line {} not in expected format ({} fields): {}",
                        self.line_no, fields, line
                    );
                }
                ParsedVendorLine::Other => {}
            }
        }
    }
}
