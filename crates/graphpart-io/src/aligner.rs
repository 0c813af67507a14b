//! External aligner worker pool.
//!
//! The entity list is split into chunk files. For every chunk pair an
//! aligner process is started from a command template whose arguments may
//! contain the `{query}` and `{library}` placeholders. Each process prints
//! one delimited row per aligned pair; the rows are parsed and offered to a
//! shared [`ConcurrentEdgeSink`]. Jobs run on a bounded rayon pool. A failed
//! job never stops the others: failures are collected and reported together
//! once every job has finished.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::Command;

use graphpart_core::{ConcurrentEdgeSink, EdgeRecord, PartitionError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::fasta::{write_fasta, FastaEntry};

pub const QUERY_PLACEHOLDER: &str = "{query}";
pub const LIBRARY_PLACEHOLDER: &str = "{library}";

/// Where the fields of an aligner output row live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFormat {
    /// Column separator; `None` splits on whitespace.
    pub delimiter: Option<char>,
    pub query_column: usize,
    pub library_column: usize,
    pub score_column: usize,
    /// Ids are cut at this character, dropping any trailing header fields.
    pub id_separator: Option<char>,
    /// Raw scores are multiplied by this factor (0.01 for percentages).
    pub score_scale: f64,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat {
            delimiter: None,
            query_column: 0,
            library_column: 1,
            score_column: 2,
            id_separator: Some('|'),
            score_scale: 1.0,
        }
    }
}

impl OutputFormat {
    /// Parses one output row. Empty rows and `#` comments yield `None`.
    pub fn parse_row(&self, line: &str) -> Option<Result<EdgeRecord, String>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let columns: Vec<&str> = match self.delimiter {
            Some(delimiter) => line.split(delimiter).map(str::trim).collect(),
            None => line.split_whitespace().collect(),
        };
        Some(self.record_from(line, &columns))
    }

    fn record_from(&self, line: &str, columns: &[&str]) -> Result<EdgeRecord, String> {
        let column = |idx: usize| {
            columns
                .get(idx)
                .copied()
                .ok_or_else(|| format!("row '{}' has no column {}", line, idx))
        };
        let query = self.strip_id(column(self.query_column)?);
        let library = self.strip_id(column(self.library_column)?);
        let raw = column(self.score_column)?;
        let score: f64 = raw
            .parse()
            .map_err(|_| format!("cannot read score '{}' in row '{}'", raw, line))?;
        Ok(EdgeRecord::new(query, library, score * self.score_scale))
    }

    fn strip_id<'a>(&self, raw: &'a str) -> &'a str {
        match self.id_separator {
            Some(sep) => raw.split(sep).next().unwrap_or(raw),
            None => raw,
        }
    }
}

/// The aligner program and its argument template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignerCommand {
    pub program: String,
    pub args: Vec<String>,
    #[serde(default)]
    pub output: OutputFormat,
}

impl AlignerCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        AlignerCommand {
            program: program.into(),
            args,
            output: OutputFormat::default(),
        }
    }

    /// Arguments with both placeholders substituted.
    pub fn render_args(&self, query: &Path, library: &Path) -> Vec<String> {
        let query = query.to_string_lossy();
        let library = library.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(QUERY_PLACEHOLDER, &query)
                    .replace(LIBRARY_PLACEHOLDER, &library)
            })
            .collect()
    }
}

/// Pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolOptions {
    pub chunks: usize,
    pub threads: usize,
    /// Only align chunk pairs `(i, j)` with `i <= j`.
    pub triangular: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            chunks: 10,
            threads: 1,
            triangular: false,
        }
    }
}

/// Counters for one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub chunks: usize,
    pub jobs: usize,
    pub rows: usize,
}

/// Splits `n` entries into at most `chunks` contiguous ranges of
/// `ceil(n / chunks)` entries. Empty ranges are dropped.
pub fn chunk_ranges(n: usize, chunks: usize) -> Vec<std::ops::Range<usize>> {
    if n == 0 {
        return Vec::new();
    }
    let size = n.div_ceil(chunks.max(1));
    (0..n).step_by(size).map(|start| start..(start + size).min(n)).collect()
}

/// Chunk index pairs to align.
pub fn chunk_pairs(chunks: usize, triangular: bool) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for i in 0..chunks {
        for j in 0..chunks {
            if !triangular || i <= j {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

pub struct AlignerPool {
    command: AlignerCommand,
    options: PoolOptions,
}

impl AlignerPool {
    pub fn new(command: AlignerCommand, options: PoolOptions) -> Self {
        AlignerPool { command, options }
    }

    /// Aligns all chunk pairs of `entries` and offers every row to `sink`.
    pub fn run(&self, entries: &[FastaEntry], sink: &ConcurrentEdgeSink) -> Result<PoolStats, PartitionError> {
        let workdir = tempfile::tempdir()?;
        let mut chunk_files: Vec<PathBuf> = Vec::new();
        for (nr, range) in chunk_ranges(entries.len(), self.options.chunks).into_iter().enumerate() {
            let path = workdir.path().join(format!("graphpart_{}.fasta", nr));
            write_fasta(&entries[range], BufWriter::new(File::create(&path)?))?;
            chunk_files.push(path);
        }

        let jobs = chunk_pairs(chunk_files.len(), self.options.triangular);
        info!(
            chunks = chunk_files.len(),
            jobs = jobs.len(),
            threads = self.options.threads,
            program = %self.command.program,
            "starting aligner pool"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.threads.max(1))
            .build()
            .map_err(|e| PartitionError::EdgeSource {
                failed: jobs.len(),
                reason: format!("rayon pool: {e}"),
            })?;

        let results: Vec<Result<usize, String>> = pool.install(|| {
            jobs.par_iter()
                .map(|&(q, l)| self.run_job(&chunk_files[q], &chunk_files[l], sink))
                .collect()
        });

        let mut stats = PoolStats {
            chunks: chunk_files.len(),
            jobs: jobs.len(),
            rows: 0,
        };
        let mut failures = Vec::new();
        for ((q, l), result) in jobs.iter().zip(results) {
            match result {
                Ok(rows) => stats.rows += rows,
                Err(reason) => {
                    warn!(query_chunk = q, library_chunk = l, %reason, "aligner job failed");
                    failures.push(reason);
                }
            }
        }
        if let Some(first) = failures.first() {
            return Err(PartitionError::EdgeSource {
                failed: failures.len(),
                reason: first.clone(),
            });
        }
        info!(rows = stats.rows, edges = sink.len(), "aligner pool finished");
        Ok(stats)
    }

    fn run_job(&self, query: &Path, library: &Path, sink: &ConcurrentEdgeSink) -> Result<usize, String> {
        let args = self.command.render_args(query, library);
        let output = Command::new(&self.command.program)
            .args(&args)
            .output()
            .map_err(|err| format!("failed to start '{}': {}", self.command.program, err))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(format!(
                "'{}' exited with {}: {}",
                self.command.program, output.status, stderr
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut rows = 0;
        for line in stdout.lines() {
            let Some(record) = self.command.output.parse_row(line) else {
                continue;
            };
            let record = record?;
            sink.offer(&record).map_err(|err| err.to_string())?;
            rows += 1;
        }
        debug!(query = %query.display(), library = %library.display(), rows, "aligner job done");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_follow_ceiling_size() {
        assert_eq!(chunk_ranges(10, 3), vec![0..4, 4..8, 8..10]);
        assert_eq!(chunk_ranges(4, 10), vec![0..1, 1..2, 2..3, 3..4]);
        assert_eq!(chunk_ranges(9, 4), vec![0..3, 3..6, 6..9]);
        assert!(chunk_ranges(0, 4).is_empty());
    }

    #[test]
    fn triangular_pairs() {
        assert_eq!(chunk_pairs(2, false), vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
        assert_eq!(chunk_pairs(2, true), vec![(0, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn placeholders_are_substituted() {
        let cmd = AlignerCommand::new(
            "aligner",
            vec!["-q".into(), "{query}".into(), "--lib={library}".into()],
        );
        let args = cmd.render_args(Path::new("/tmp/q.fa"), Path::new("/tmp/l.fa"));
        assert_eq!(args, vec!["-q", "/tmp/q.fa", "--lib=/tmp/l.fa"]);
    }

    #[test]
    fn rows_and_comments() {
        let format = OutputFormat {
            delimiter: Some('\t'),
            score_column: 3,
            score_scale: 0.01,
            ..OutputFormat::default()
        };
        assert!(format.parse_row("# header").is_none());
        assert!(format.parse_row("   ").is_none());

        let record = format.parse_row("a|x=1\tb\t120\t85.0").unwrap().unwrap();
        assert_eq!(record.id_a, "a");
        assert_eq!(record.id_b, "b");
        assert!((record.raw_score - 0.85).abs() < 1e-12);

        assert!(format.parse_row("a\tb").unwrap().is_err());
        assert!(format.parse_row("a\tb\t1\tnan%").unwrap().is_err());
    }
}
