pub mod aligner;
pub mod edge_list;
pub mod fasta;
pub mod fingerprint;
pub mod output;

// Re-export commonly used types
pub use aligner::{AlignerCommand, AlignerPool, OutputFormat, PoolOptions, PoolStats};
pub use edge_list::{EdgeListReader, DEFAULT_METRIC_COLUMN};
pub use fasta::{read_fasta, read_fasta_file, FastaEntry, HeaderFields};
pub use fingerprint::{compare_all, read_fingerprint_file, read_fingerprints, Fingerprint, FingerprintEntry};
pub use output::{report_path_for, write_assignment, write_assignment_file, write_report};
