//! FASTA records

use fleet_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// One sequence read from a FASTA input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastaRecord {
    /// Position in the input, starting at 0
    pub id: usize,

    /// Header text without the leading `>`
    pub header: String,

    /// Residues with line breaks removed
    pub residues: String,
}

impl FastaRecord {
    /// Render as `>header\nresidues\n`
    pub fn write_to(&self, out: &mut String) {
        out.push('>');
        out.push_str(&self.header);
        out.push('\n');
        out.push_str(&self.residues);
        out.push('\n');
    }
}

/// Parse FASTA text into records in input order
///
/// Headers are trimmed, sequence lines are trimmed and joined, blank lines are
/// ignored. Sequence data before the first header is rejected.
pub fn parse_fasta(text: &str) -> Result<Vec<FastaRecord>> {
    let mut records: Vec<FastaRecord> = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(header) = line.strip_prefix('>') {
            records.push(FastaRecord {
                id: records.len(),
                header: header.trim().to_string(),
                residues: String::new(),
            });
            continue;
        }

        match records.last_mut() {
            Some(record) => record.residues.push_str(line),
            None => {
                return Err(Error::InvalidFasta {
                    message: format!("line {}: sequence data before first header", line_no + 1),
                })
            }
        }
    }

    tracing::debug!(sequences = records.len(), "Parsed FASTA input");
    Ok(records)
}

/// Render records back to FASTA text
pub fn write_fasta<'a>(records: impl IntoIterator<Item = &'a FastaRecord>) -> String {
    let mut out = String::new();
    for record in records {
        record.write_to(&mut out);
    }
    out
}
