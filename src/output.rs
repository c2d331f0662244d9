//! Persistence of per-recompute congestion summaries.
//!
//! One CSV row per classification recompute, appended to a session file for
//! offline inspection.

use anyhow::Result;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::debug;

use crate::congestion::{CongestionSnapshot, CountLevel, RatioLevel};

/// Flattened summary of one [`CongestionSnapshot`]. Count and ratio columns
/// are both present so a session can switch policy without breaking the
/// header; the unused family stays zero.
#[derive(Debug, Default, Serialize)]
pub struct CongestionRecord {
    pub timestamp: DateTime<Utc>,
    pub step: Option<u64>,
    pub vehicles: usize,
    pub edges_classified: usize,

    pub open: usize,
    pub light: usize,
    pub moderate: usize,
    pub heavy: usize,

    pub green: usize,
    pub orange: usize,
    pub red: usize,
}

impl CongestionRecord {
    pub fn from_snapshot(snapshot: &CongestionSnapshot, vehicles: usize, step: Option<u64>) -> Self {
        let mut record = CongestionRecord {
            timestamp: Utc::now(),
            step,
            vehicles,
            edges_classified: snapshot.len(),
            ..Default::default()
        };

        match snapshot {
            CongestionSnapshot::Count(levels) => {
                for level in levels.values() {
                    match level {
                        CountLevel::Open => record.open += 1,
                        CountLevel::Light => record.light += 1,
                        CountLevel::Moderate => record.moderate += 1,
                        CountLevel::Heavy => record.heavy += 1,
                    }
                }
            }
            CongestionSnapshot::Ratio(levels) => {
                for level in levels.values() {
                    match level {
                        RatioLevel::Green => record.green += 1,
                        RatioLevel::Orange => record.orange += 1,
                        RatioLevel::Red => record.red += 1,
                    }
                }
            }
        }

        record
    }
}

/// Appends a [`CongestionRecord`] as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &str, record: &CongestionRecord) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    #[test]
    fn test_record_from_count_snapshot() {
        let mut levels = HashMap::new();
        levels.insert("E1".to_string(), CountLevel::Heavy);
        levels.insert("E2".to_string(), CountLevel::Open);
        levels.insert("E3".to_string(), CountLevel::Heavy);

        let record =
            CongestionRecord::from_snapshot(&CongestionSnapshot::Count(levels), 14, Some(3));
        assert_eq!(record.edges_classified, 3);
        assert_eq!(record.heavy, 2);
        assert_eq!(record.open, 1);
        assert_eq!(record.green, 0);
        assert_eq!(record.vehicles, 14);
    }

    #[test]
    fn test_append_record_creates_file() {
        let path = temp_path("sumo_viz_test_create.csv");
        let _ = fs::remove_file(&path); // clean up any prior run

        let record = CongestionRecord::default();
        append_record(&path, &record).unwrap();

        assert!(Path::new(&path).exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.is_empty());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let path = temp_path("sumo_viz_test_header.csv");
        let _ = fs::remove_file(&path);

        let record = CongestionRecord::default();
        append_record(&path, &record).unwrap();
        append_record(&path, &record).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("timestamp")).count();
        assert_eq!(header_count, 1);

        fs::remove_file(&path).unwrap();
    }
}
