//! File-backed data sinks.
//!
//! Sinks are selected by the `default_format` storage setting; each format
//! is compiled in behind its own Cargo feature, so [`create_sink`] only
//! dispatches to backends the build actually carries.

#[cfg(feature = "storage_csv")]
use anyhow::{Context, Result};
#[cfg(feature = "storage_csv")]
use async_trait::async_trait;
#[cfg(feature = "storage_csv")]
use std::fs::File;
#[cfg(feature = "storage_csv")]
use std::path::{Path, PathBuf};
#[cfg(feature = "storage_csv")]
use tracing::info;

use crate::config::StorageSettings;
use crate::error::{PipelineError, PipelineResult};
#[cfg(feature = "storage_csv")]
use crate::point::{ResolvedPoint, ScanValue};
use crate::publish::DataSink;

/// Create the sink named by the storage settings for one scan's collection.
///
/// Formats are registered by Cargo feature; asking for a format whose
/// feature is disabled names the feature to rebuild with.
pub fn create_sink(
    settings: &StorageSettings,
    scan_name: &str,
) -> PipelineResult<Box<dyn DataSink>> {
    match settings.default_format.as_str() {
        #[cfg(feature = "storage_csv")]
        "csv" => {
            let sink = CsvSink::create(&settings.default_path, scan_name)
                .map_err(|e| PipelineError::Sink(format!("{e:#}")))?;
            Ok(Box::new(sink))
        }
        #[cfg(not(feature = "storage_csv"))]
        "csv" => Err(PipelineError::FeatureNotEnabled("storage_csv".to_string())),
        other => Err(PipelineError::Config(format!(
            "unknown storage format '{other}'"
        ))),
    }
}

/// A sink appending resolved points to a CSV collection file.
///
/// The header row is derived from the first appended point's slot names;
/// every point of one scan carries the same slots in the same order, so the
/// header is stable. Arrays are written as JSON cells.
#[cfg(feature = "storage_csv")]
pub struct CsvSink {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    wrote_header: bool,
}

#[cfg(feature = "storage_csv")]
impl std::fmt::Debug for CsvSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSink")
            .field("path", &self.path)
            .field("wrote_header", &self.wrote_header)
            .finish()
    }
}

#[cfg(feature = "storage_csv")]
impl CsvSink {
    /// Create the collection file `<scan_name>_<timestamp>.csv` under `dir`.
    pub fn create(dir: impl AsRef<Path>, scan_name: &str) -> Result<Self> {
        let file_name = format!(
            "{}_{}.csv",
            scan_name,
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        );
        let dir = dir.as_ref();
        if !dir.exists() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating storage directory {}", dir.display()))?;
        }
        let path = dir.join(file_name);
        let writer = csv::Writer::from_path(&path)
            .with_context(|| format!("creating collection file {}", path.display()))?;
        info!("CSV sink writing collection to '{}'", path.display());
        Ok(Self {
            path,
            writer: Some(writer),
            wrote_header: false,
        })
    }

    /// Path of the collection file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cell(value: &ScanValue) -> String {
        match value {
            ScanValue::Scalar(v) => v.to_string(),
            ScanValue::Array(values) => {
                serde_json::to_string(values).unwrap_or_else(|_| String::from("[]"))
            }
            ScanValue::Text(text) => text.clone(),
        }
    }
}

#[cfg(feature = "storage_csv")]
#[async_trait]
impl DataSink for CsvSink {
    async fn append(&mut self, point: &ResolvedPoint) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .context("collection already completed")?;

        if !self.wrote_header {
            let mut header = vec!["timestamp".to_string(), "point".to_string()];
            header.extend(point.all_values().map(|nv| nv.name.clone()));
            writer.write_record(&header).context("writing CSV header")?;
            self.wrote_header = true;
        }

        let mut record = vec![point.resolved_at.to_rfc3339(), point.index.to_string()];
        record.extend(point.all_values().map(|nv| Self::cell(&nv.value)));
        writer
            .write_record(&record)
            .with_context(|| format!("writing CSV record for {point}"))
    }

    async fn complete_collection(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().context("flushing collection file")?;
            info!("CSV sink completed collection '{}'", self.path.display());
        }
        Ok(())
    }
}

#[cfg(all(test, feature = "storage_csv"))]
mod tests {
    use super::*;
    use crate::point::NamedValue;
    use chrono::Utc;

    fn resolved_point(index: u64) -> ResolvedPoint {
        ResolvedPoint {
            index,
            scan_name: "csv-scan".to_string(),
            unique_name: None,
            total_points: Some(2),
            metadata: None,
            resolved_at: Utc::now(),
            positions: vec![NamedValue {
                name: "stage_x".to_string(),
                value: ScanValue::Scalar(index as f64 * 0.5),
            }],
            detector_data: vec![NamedValue {
                name: "det".to_string(),
                value: ScanValue::Array(vec![1.0, 2.0]),
            }],
        }
    }

    #[tokio::test]
    async fn test_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::create(dir.path(), "csv-scan").unwrap();

        sink.append(&resolved_point(0)).await.unwrap();
        sink.append(&resolved_point(1)).await.unwrap();
        sink.complete_collection().await.unwrap();

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,point,stage_x,det"));
        assert!(lines[1].contains(",0,0,"));
        assert!(lines[2].contains(",1,0.5,"));
    }

    #[tokio::test]
    async fn test_append_after_completion_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::create(dir.path(), "csv-scan").unwrap();
        sink.complete_collection().await.unwrap();
        assert!(sink.append(&resolved_point(0)).await.is_err());
    }

    #[tokio::test]
    async fn test_complete_collection_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::create(dir.path(), "csv-scan").unwrap();
        sink.complete_collection().await.unwrap();
        sink.complete_collection().await.unwrap();
    }

    #[test]
    fn test_create_sink_dispatches_on_format() {
        let dir = tempfile::tempdir().unwrap();
        let settings = StorageSettings {
            default_path: dir.path().to_string_lossy().into_owned(),
            default_format: "csv".to_string(),
        };
        assert!(create_sink(&settings, "factory-scan").is_ok());

        let unknown = StorageSettings {
            default_format: "hdf5".to_string(),
            ..settings
        };
        let err = create_sink(&unknown, "factory-scan").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
