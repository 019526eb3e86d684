//! Text canonicalization applied before hashing.
//!
//! The pipeline compares content by hash, so the exact normalization
//! here defines what counts as "changed". The steps are applied in a
//! fixed order and the whole transform is idempotent.

use sha2::{Digest, Sha256};

/// Normalize extracted text:
///
/// 1. CRLF/CR become LF.
/// 2. Trailing whitespace is stripped per line.
/// 3. Runs of spaces/tabs collapse to one space.
/// 4. Runs of three or more LFs collapse to exactly two.
/// 5. The whole string is trimmed.
pub fn normalize(input: &str) -> String {
    let unified = input.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines: Vec<String> = Vec::new();
    for line in unified.split('\n') {
        let mut collapsed = String::with_capacity(line.len());
        let mut space_run = false;
        for ch in line.chars() {
            if ch == ' ' || ch == '\t' {
                if !space_run {
                    collapsed.push(' ');
                    space_run = true;
                }
            } else {
                space_run = false;
                collapsed.push(ch);
            }
        }
        lines.push(collapsed.trim_end().to_owned());
    }

    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0usize;
    for line in &lines {
        if line.is_empty() {
            blank_run += 1;
            // A second consecutive blank line is kept (paragraph
            // break); further ones are dropped.
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }

    out.trim().to_owned()
}

/// Lowercase hex SHA-256 of the UTF-8 bytes.
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
