//! Assignment tables and JSON reports.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use graphpart_core::{Assignment, PartitionError, RunReport};

/// Writes `id,label,partition` rows with a header line.
pub fn write_assignment<W: Write>(assignment: &Assignment, mut out: W) -> Result<(), PartitionError> {
    writeln!(out, "id,label,partition")?;
    for row in assignment.iter() {
        writeln!(out, "{},{},{}", row.id, row.label, row.partition_name())?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_assignment_file(assignment: &Assignment, path: impl AsRef<Path>) -> Result<(), PartitionError> {
    write_assignment(assignment, BufWriter::new(File::create(path)?))
}

/// Report path next to an output file: `out.csv` becomes `out_report.json`.
pub fn report_path_for(out_file: &Path) -> PathBuf {
    let stem = out_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "graphpart_result".to_string());
    out_file.with_file_name(format!("{}_report.json", stem))
}

pub fn write_report(report: &RunReport, path: impl AsRef<Path>) -> Result<(), PartitionError> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, report)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphpart_core::{AssignmentRow, Bucket, PartitionId};

    #[test]
    fn rows_print_numbers_or_bucket_names() {
        let assignment = Assignment {
            rows: vec![
                AssignmentRow {
                    id: "a".into(),
                    label: "0".into(),
                    partition: PartitionId(3),
                    bucket: None,
                },
                AssignmentRow {
                    id: "b".into(),
                    label: "pos".into(),
                    partition: PartitionId(2),
                    bucket: Some(Bucket::Val),
                },
            ],
        };
        let mut buf = Vec::new();
        write_assignment(&assignment, &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "id,label,partition\na,0,3\nb,pos,val\n"
        );
    }

    #[test]
    fn report_sits_next_to_output() {
        assert_eq!(
            report_path_for(Path::new("runs/result.csv")),
            PathBuf::from("runs/result_report.json")
        );
    }

    #[test]
    fn report_is_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_report(&RunReport::default(), &path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["removal_needed_end"], serde_json::Value::Bool(false));
        assert_eq!(value["config"]["partitions"], 5);
    }
}
