//! Fingerprint similarity edge source.
//!
//! Entities are given as precomputed bit-vector fingerprints (hex encoded,
//! most significant nibble first). Every unordered pair is scored with the
//! Tanimoto similarity `|a & b| / |a | b|` and offered to a
//! [`ConcurrentEdgeSink`]. Use with the `one-minus` transform.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use graphpart_core::{ConcurrentEdgeSink, EdgeRecord, EntityInput, PartitionError};
use rayon::prelude::*;
use tracing::info;

/// Packed fingerprint bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    words: Vec<u64>,
}

impl Fingerprint {
    /// Decodes a hex string. Whitespace is not allowed.
    pub fn from_hex(hex: &str) -> Result<Self, String> {
        let mut words = Vec::with_capacity(hex.len().div_ceil(16));
        let bytes = hex.as_bytes();
        if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_hexdigit) {
            return Err(format!("invalid hex fingerprint '{}'", hex));
        }
        for chunk in bytes.rchunks(16) {
            let text = std::str::from_utf8(chunk).map_err(|_| "fingerprint is not ASCII".to_string())?;
            let word = u64::from_str_radix(text, 16)
                .map_err(|_| format!("invalid hex fingerprint '{}'", hex))?;
            words.push(word);
        }
        Ok(Fingerprint { words })
    }

    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Tanimoto similarity. Two empty fingerprints are identical.
    pub fn tanimoto(&self, other: &Fingerprint) -> f64 {
        let len = self.words.len().max(other.words.len());
        let (mut both, mut either) = (0u32, 0u32);
        for idx in 0..len {
            let a = self.words.get(idx).copied().unwrap_or(0);
            let b = other.words.get(idx).copied().unwrap_or(0);
            both += (a & b).count_ones();
            either += (a | b).count_ones();
        }
        if either == 0 {
            1.0
        } else {
            both as f64 / either as f64
        }
    }
}

/// An entity with its fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintEntry {
    pub entity: EntityInput,
    pub fingerprint: Fingerprint,
}

/// Reads `id,fingerprint[,label[,priority]]` rows. Blank lines and `#`
/// comments are skipped; a priority of `1` marks a priority entity.
pub fn read_fingerprints<R: BufRead>(reader: R) -> Result<Vec<FingerprintEntry>, PartitionError> {
    let mut entries = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_nr = idx + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let columns: Vec<&str> = line.split(',').map(str::trim).collect();
        if columns.len() < 2 {
            return Err(PartitionError::Parse {
                line: line_nr,
                reason: "expected 'id,fingerprint[,label[,priority]]'".to_string(),
            });
        }
        let fingerprint = Fingerprint::from_hex(columns[1])
            .map_err(|reason| PartitionError::Parse { line: line_nr, reason })?;
        let mut entity = EntityInput::new(columns[0]);
        if let Some(label) = columns.get(2).filter(|l| !l.is_empty()) {
            entity.label = Some(label.to_string());
        }
        if let Some(priority) = columns.get(3) {
            entity.priority = *priority == "1";
        }
        entries.push(FingerprintEntry { entity, fingerprint });
    }
    Ok(entries)
}

pub fn read_fingerprint_file(path: impl AsRef<Path>) -> Result<Vec<FingerprintEntry>, PartitionError> {
    read_fingerprints(BufReader::new(File::open(path)?))
}

/// Scores all unordered pairs on a pool of `threads` workers.
///
/// Returns the number of pairs compared.
pub fn compare_all(
    entries: &[FingerprintEntry],
    sink: &ConcurrentEdgeSink,
    threads: usize,
) -> Result<usize, PartitionError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| PartitionError::EdgeSource {
            failed: 1,
            reason: format!("rayon pool: {e}"),
        })?;

    pool.install(|| {
        entries.par_iter().enumerate().try_for_each(|(i, query)| {
            for library in &entries[i + 1..] {
                let similarity = query.fingerprint.tanimoto(&library.fingerprint);
                sink.offer(&EdgeRecord::new(
                    query.entity.id.as_str(),
                    library.entity.id.as_str(),
                    similarity,
                ))?;
            }
            Ok::<(), PartitionError>(())
        })
    })?;

    let pairs = entries.len() * entries.len().saturating_sub(1) / 2;
    info!(pairs, edges = sink.len(), "fingerprint comparison finished");
    Ok(pairs)
}
