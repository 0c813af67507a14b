//! FASTA entity input.
//!
//! Each record header carries the entity id followed by optional
//! `key=value` fields, for example `>P12345|class=membrane|exp=1`. The
//! fields naming the label and the priority flag are chosen by the caller.
//! Fields are separated by `|`; headers whose first field contains ` - ` or
//! `:` are split on that separator instead.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use graphpart_core::{EntityInput, PartitionError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Header keys holding the label and the priority flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderFields {
    pub label: Option<String>,
    pub priority: Option<String>,
}

/// One FASTA record.
#[derive(Debug, Clone, PartialEq)]
pub struct FastaEntry {
    pub entity: EntityInput,
    pub sequence: String,
}

impl FastaEntry {
    pub fn id(&self) -> &str {
        &self.entity.id
    }
}

/// Parses a header line (with or without the leading `>`).
pub fn parse_header(line: &str, fields: &HeaderFields, line_nr: usize) -> Result<EntityInput, PartitionError> {
    let line = line.trim();
    let line = line.strip_prefix('>').unwrap_or(line);

    let mut parts: Vec<&str> = line.split('|').collect();
    if parts[0].contains(" - ") {
        parts = line.split(" - ").collect();
    }
    if parts[0].contains(':') {
        parts = line.split(':').collect();
    }

    let id = parts[0].trim();
    if id.is_empty() {
        return Err(PartitionError::Parse {
            line: line_nr,
            reason: "empty entity id in FASTA header".to_string(),
        });
    }

    let mut entity = EntityInput::new(id);
    for part in &parts[1..] {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if fields.priority.as_deref() == Some(key) {
            let flag: i64 = value.parse().map_err(|_| PartitionError::Parse {
                line: line_nr,
                reason: format!("priority value '{}' is not an integer", value),
            })?;
            entity.priority = flag == 1;
        } else if fields.label.as_deref() == Some(key) {
            entity.label = Some(value.to_string());
        }
    }
    Ok(entity)
}

/// Reads all records. Sequences may span several lines; blank lines are
/// ignored.
pub fn read_fasta<R: BufRead>(reader: R, fields: &HeaderFields) -> Result<Vec<FastaEntry>, PartitionError> {
    let mut entries: Vec<FastaEntry> = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_nr = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('>') {
            entries.push(FastaEntry {
                entity: parse_header(trimmed, fields, line_nr)?,
                sequence: String::new(),
            });
        } else {
            match entries.last_mut() {
                Some(entry) => entry.sequence.push_str(trimmed),
                None => {
                    return Err(PartitionError::Parse {
                        line: line_nr,
                        reason: "sequence data before the first FASTA header".to_string(),
                    })
                }
            }
        }
    }
    debug!(entries = entries.len(), "read FASTA entities");
    Ok(entries)
}

pub fn read_fasta_file(path: impl AsRef<Path>, fields: &HeaderFields) -> Result<Vec<FastaEntry>, PartitionError> {
    read_fasta(BufReader::new(File::open(path)?), fields)
}

/// Writes entries with bare-id headers, one sequence line each.
pub fn write_fasta<'a, W, I>(entries: I, mut out: W) -> Result<(), PartitionError>
where
    W: Write,
    I: IntoIterator<Item = &'a FastaEntry>,
{
    for entry in entries {
        writeln!(out, ">{}", entry.id())?;
        writeln!(out, "{}", entry.sequence)?;
    }
    out.flush()?;
    Ok(())
}
