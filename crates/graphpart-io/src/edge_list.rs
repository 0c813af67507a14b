//! Precomputed edge lists and checkpoints.
//!
//! Comma-separated rows with the two entity ids in columns 0 and 1 and the
//! raw score in a configurable column. Checkpoints written by
//! `graphpart_core::checkpoint` use column 2 and read back with the default
//! settings.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use graphpart_core::{EdgeRecord, PartitionError};

pub const DEFAULT_METRIC_COLUMN: usize = 2;

/// Streams [`EdgeRecord`]s from a delimited reader.
///
/// Blank lines are skipped. Rows with fewer than three columns, a missing
/// metric column or an unparsable score yield a [`PartitionError::Parse`]
/// naming the 1-based line number.
pub struct EdgeListReader<R> {
    lines: Lines<R>,
    metric_column: usize,
    line_nr: usize,
}

impl<R: BufRead> EdgeListReader<R> {
    pub fn new(reader: R, metric_column: usize) -> Self {
        EdgeListReader {
            lines: reader.lines(),
            metric_column,
            line_nr: 0,
        }
    }

    fn parse(&self, line: &str) -> Result<EdgeRecord, PartitionError> {
        let columns: Vec<&str> = line.split(',').map(str::trim).collect();
        if columns.len() < 3 {
            return Err(PartitionError::Parse {
                line: self.line_nr,
                reason: format!(
                    "expected at least three comma separated columns, found {}",
                    columns.len()
                ),
            });
        }
        let raw = columns.get(self.metric_column).ok_or_else(|| PartitionError::Parse {
            line: self.line_nr,
            reason: format!("metric column {} is missing", self.metric_column),
        })?;
        let score: f64 = raw.parse().map_err(|_| PartitionError::Parse {
            line: self.line_nr,
            reason: format!("cannot read metric value '{}'", raw),
        })?;
        Ok(EdgeRecord::new(columns[0], columns[1], score))
    }
}

impl EdgeListReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>, metric_column: usize) -> Result<Self, PartitionError> {
        Ok(EdgeListReader::new(BufReader::new(File::open(path)?), metric_column))
    }
}

impl<R: BufRead> Iterator for EdgeListReader<R> {
    type Item = Result<EdgeRecord, PartitionError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(err.into())),
            };
            self.line_nr += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(self.parse(&line));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_metric_from_chosen_column() {
        let text = "a,b,0.5,0.9\n\nb,c,0.1,0.2\n";
        let records: Vec<EdgeRecord> = EdgeListReader::new(text.as_bytes(), 3)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records, vec![EdgeRecord::new("a", "b", 0.9), EdgeRecord::new("b", "c", 0.2)]);
    }

    #[test]
    fn short_rows_name_their_line() {
        let mut reader = EdgeListReader::new("a,b,0.5\na,b\n".as_bytes(), DEFAULT_METRIC_COLUMN);
        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err();
        assert!(matches!(err, PartitionError::Parse { line: 2, .. }));
        assert!(reader.next().is_none());
    }

    #[test]
    fn bad_metric_is_a_parse_error() {
        let err = EdgeListReader::new("a,b,high\n".as_bytes(), 2)
            .next()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, PartitionError::Parse { line: 1, .. }));

        let err = EdgeListReader::new("a,b,0.1\n".as_bytes(), 5)
            .next()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, PartitionError::Parse { line: 1, .. }));
    }
}
