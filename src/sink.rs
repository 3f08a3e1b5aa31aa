//! Data sinks and live-plot handles.
//!
//! The controller owns one [`DataSink`] for the duration of a traversal. It
//! declares one coordinate column per axis and one value column per measurand
//! channel, creates the file, streams rows, marks block ends, and finally
//! closes the file and writes companion metadata.
//!
//! Two sinks ship with the crate:
//!
//! - [`MemorySink`] keeps everything in a shared [`MemoryRecord`]
//! - [`DatFileSink`] (feature `storage_csv`) writes a tab-separated,
//!   gnuplot-style `.dat` file with a blank line between blocks, a SpyView
//!   `.meta.txt` companion and a JSON [`RunMetadata`] record

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Header entry for one coordinate column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// `"label (unit)"`
    pub label: String,
    /// Number of points along the axis
    pub size: usize,
    /// First value
    pub start: f64,
    /// Last value
    pub end: f64,
}

/// Identity of the run a sink is recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    /// Unique id of this traversal
    pub run_uid: Uuid,
    /// Measurement name
    pub name: String,
    /// Traversal strategy description
    pub strategy: String,
    /// Wall-clock start
    pub started: DateTime<Local>,
}

/// Run record written next to a data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Run identity, if the controller supplied one
    pub run: Option<RunInfo>,
    /// User passed to `create_file`
    pub user: Option<String>,
    /// Host that recorded the data
    pub host: Option<String>,
    /// Coordinate columns
    pub coordinates: Vec<ColumnSpec>,
    /// Value columns
    pub values: Vec<String>,
    /// Rows written
    pub rows: usize,
    /// Blocks closed
    pub blocks: usize,
    /// Version of this crate
    pub software_version: String,
}

/// Destination of traversal rows.
///
/// Call order within one run: `set_run_info`, `add_coordinate`* and
/// `add_value`*, `create_file`, then `add_data_point` / `new_block` any number
/// of times, then `close_file` and `write_metadata` exactly once each. A sink
/// may be reused for several runs.
#[async_trait]
pub trait DataSink: Send {
    /// Receive the run identity before the file is created.
    ///
    /// Starts a new run: sinks that keep column declarations drop the ones
    /// of the previous run here.
    ///
    /// # Default Implementation
    /// Ignored.
    fn set_run_info(&mut self, info: &RunInfo) {
        let _ = info;
    }

    /// Declare a coordinate column.
    fn add_coordinate(&mut self, label: &str, size: usize, start: f64, end: f64);

    /// Declare a value column.
    fn add_value(&mut self, label: &str);

    /// Open the destination on behalf of `user`.
    async fn create_file(&mut self, user: &str) -> Result<()>;

    /// Append one row: coordinates then values.
    async fn add_data_point(&mut self, values: &[f64]) -> Result<()>;

    /// End the current block.
    async fn new_block(&mut self) -> Result<()>;

    /// Flush and close the destination.
    async fn close_file(&mut self) -> Result<()>;

    /// Write companion metadata, after `close_file`.
    async fn write_metadata(&mut self) -> Result<()>;

    /// Where the data went, if it is on disk.
    fn location(&self) -> Option<PathBuf> {
        None
    }
}

/// Live-plot handle refreshed at the start and on every block boundary.
pub trait LivePlot: Send {
    /// Redraw from the sink's current data.
    fn update(&mut self) -> Result<()>;
}

/// Everything a [`MemorySink`] was told.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryRecord {
    /// Run identity, if given
    pub run: Option<RunInfo>,
    /// Coordinate columns
    pub coordinates: Vec<ColumnSpec>,
    /// Value columns
    pub values: Vec<String>,
    /// User passed to `create_file`
    pub user: Option<String>,
    /// Rows in arrival order
    pub rows: Vec<Vec<f64>>,
    /// Row count at every `new_block`
    pub block_ends: Vec<usize>,
    /// `create_file` calls
    pub files_created: usize,
    /// `close_file` calls
    pub closed: usize,
    /// `write_metadata` calls
    pub metadata_written: usize,
}

impl MemoryRecord {
    /// Rows split into blocks; rows after the last block end form a final block.
    pub fn blocks(&self) -> Vec<&[Vec<f64>]> {
        let mut blocks = Vec::new();
        let mut start = 0;
        for &end in &self.block_ends {
            blocks.push(&self.rows[start..end]);
            start = end;
        }
        if start < self.rows.len() {
            blocks.push(&self.rows[start..]);
        }
        blocks
    }
}

/// In-memory sink; clones share one record.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    record: Arc<Mutex<MemoryRecord>>,
    row_limit: Option<usize>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `add_data_point` once `limit` rows are stored.
    pub fn with_row_limit(mut self, limit: usize) -> Self {
        self.row_limit = Some(limit);
        self
    }

    /// Copy of the record.
    pub fn snapshot(&self) -> MemoryRecord {
        self.lock().clone()
    }

    /// Shared record handle.
    pub fn record(&self) -> Arc<Mutex<MemoryRecord>> {
        self.record.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryRecord> {
        self.record
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl DataSink for MemorySink {
    fn set_run_info(&mut self, info: &RunInfo) {
        let mut record = self.lock();
        record.run = Some(info.clone());
        record.coordinates.clear();
        record.values.clear();
    }

    fn add_coordinate(&mut self, label: &str, size: usize, start: f64, end: f64) {
        self.lock().coordinates.push(ColumnSpec {
            label: label.to_string(),
            size,
            start,
            end,
        });
    }

    fn add_value(&mut self, label: &str) {
        self.lock().values.push(label.to_string());
    }

    async fn create_file(&mut self, user: &str) -> Result<()> {
        let mut record = self.lock();
        record.user = Some(user.to_string());
        record.files_created += 1;
        Ok(())
    }

    async fn add_data_point(&mut self, values: &[f64]) -> Result<()> {
        let limit = self.row_limit;
        let mut record = self.lock();
        if limit.is_some_and(|limit| record.rows.len() >= limit) {
            return Err(anyhow!("memory sink full after {} rows", record.rows.len()));
        }
        record.rows.push(values.to_vec());
        Ok(())
    }

    async fn new_block(&mut self) -> Result<()> {
        let mut record = self.lock();
        let rows = record.rows.len();
        record.block_ends.push(rows);
        Ok(())
    }

    async fn close_file(&mut self) -> Result<()> {
        self.lock().closed += 1;
        Ok(())
    }

    async fn write_metadata(&mut self) -> Result<()> {
        self.lock().metadata_written += 1;
        Ok(())
    }
}

#[cfg(feature = "storage_csv")]
pub use dat::DatFileSink;

#[cfg(feature = "storage_csv")]
mod dat {
    use super::{ColumnSpec, DataSink, RunInfo, RunMetadata};
    use anyhow::{anyhow, Context, Result};
    use async_trait::async_trait;
    use chrono::Local;
    use std::fs::{File, OpenOptions};
    use std::io::{ErrorKind, Write};
    use std::path::{Path, PathBuf};

    /// Numbered variants tried before `create_file` gives up.
    const MAX_SUFFIX: usize = 1000;

    /// Gnuplot-style data file with SpyView and JSON companions.
    ///
    /// Files land in `<data_dir>/<YYYYMMDD>/<HHMMSS>_<name>/<HHMMSS>_<name>.dat`;
    /// `write_metadata` adds `<stem>.meta.txt` and `<stem>.json` beside it.
    /// Existing files are never replaced: a second run in the same second
    /// gets `<HHMMSS>_<name>_1.dat`, then `_2`, and so on.
    pub struct DatFileSink {
        data_dir: PathBuf,
        name: String,
        run: Option<RunInfo>,
        coordinates: Vec<ColumnSpec>,
        values: Vec<String>,
        path: Option<PathBuf>,
        writer: Option<csv::Writer<File>>,
        user: Option<String>,
        rows: usize,
        blocks: usize,
    }

    impl DatFileSink {
        /// Sink writing below `data_dir`, naming files after `name`.
        pub fn new(data_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
            Self {
                data_dir: data_dir.into(),
                name: name.into(),
                run: None,
                coordinates: Vec::new(),
                values: Vec::new(),
                path: None,
                writer: None,
                user: None,
                rows: 0,
                blocks: 0,
            }
        }

        /// Path of the `.dat` file once created.
        pub fn path(&self) -> Option<&Path> {
            self.path.as_deref()
        }

        fn header(&self, user: &str, path: &Path) -> String {
            let mut header = String::new();
            header.push_str(&format!("# Filename: {}\n", path.display()));
            header.push_str(&format!(
                "# Timestamp: {}\n",
                Local::now().format("%a %b %e %H:%M:%S %Y")
            ));
            header.push_str(&format!("# User: {user}\n"));
            if let Ok(host) = hostname::get() {
                header.push_str(&format!("# Host: {}\n", host.to_string_lossy()));
            }
            if let Some(run) = &self.run {
                header.push_str(&format!("# Run: {}\n", run.run_uid));
                header.push_str(&format!("# Strategy: {}\n", run.strategy));
            }
            header.push('\n');
            let mut column = 1;
            for spec in &self.coordinates {
                header.push_str(&format!(
                    "# Column {column}:\n#\tend: {}\n#\tname: {}\n#\tsize: {}\n#\tstart: {}\n#\ttype: coordinate\n",
                    spec.end, spec.label, spec.size, spec.start
                ));
                column += 1;
            }
            for label in &self.values {
                header.push_str(&format!(
                    "# Column {column}:\n#\tname: {label}\n#\ttype: value\n"
                ));
                column += 1;
            }
            header.push('\n');
            header
        }

        /// Create `<stem>.dat` in `dir`, or the first free numbered variant.
        fn create_unique(dir: &Path, stem: &str) -> Result<(PathBuf, File)> {
            for suffix in 0..=MAX_SUFFIX {
                let name = match suffix {
                    0 => format!("{stem}.dat"),
                    n => format!("{stem}_{n}.dat"),
                };
                let path = dir.join(name);
                match OpenOptions::new().write(true).create_new(true).open(&path) {
                    Ok(file) => return Ok((path, file)),
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                    Err(e) => {
                        return Err(e).with_context(|| {
                            format!("Failed to create data file {}", path.display())
                        })
                    }
                }
            }
            Err(anyhow!(
                "no free data file name for {stem} in {}",
                dir.display()
            ))
        }

        fn companion(&self, extension: &str) -> Option<PathBuf> {
            let path = self.path.as_ref()?;
            let stem = path.file_stem()?.to_string_lossy().into_owned();
            Some(path.with_file_name(format!("{stem}.{extension}")))
        }

        fn run_metadata(&self) -> RunMetadata {
            RunMetadata {
                run: self.run.clone(),
                user: self.user.clone(),
                host: hostname::get()
                    .ok()
                    .map(|host| host.to_string_lossy().into_owned()),
                coordinates: self.coordinates.clone(),
                values: self.values.clone(),
                rows: self.rows,
                blocks: self.blocks,
                software_version: env!("CARGO_PKG_VERSION").to_string(),
            }
        }

        /// SpyView loop description: innermost (fastest) coordinate first.
        fn meta_contents(&self) -> String {
            let mut meta = String::new();
            let titles = ["#inner loop", "#outer loop", "#outer most loop"];
            let mut loops = self.coordinates.iter().rev();
            for (depth, title) in titles.iter().enumerate() {
                meta.push_str(title);
                meta.push('\n');
                match loops.next() {
                    Some(spec) if depth == 0 => meta.push_str(&format!(
                        "{}\n{}\n{}\n{}\n",
                        spec.size, spec.start, spec.end, spec.label
                    )),
                    Some(spec) => meta.push_str(&format!(
                        "{}\n{}\n{}\n{}\n",
                        spec.size, spec.end, spec.start, spec.label
                    )),
                    None => meta.push_str("1\n0\n1\nNone\n"),
                }
            }
            for (i, label) in self.values.iter().enumerate() {
                meta.push_str(&format!(
                    "#for each of the values\n{}\n{}\n",
                    self.coordinates.len() + i + 1,
                    label
                ));
            }
            meta
        }
    }

    #[async_trait]
    impl DataSink for DatFileSink {
        fn set_run_info(&mut self, info: &RunInfo) {
            self.run = Some(info.clone());
            self.coordinates.clear();
            self.values.clear();
        }

        fn add_coordinate(&mut self, label: &str, size: usize, start: f64, end: f64) {
            self.coordinates.push(ColumnSpec {
                label: label.to_string(),
                size,
                start,
                end,
            });
        }

        fn add_value(&mut self, label: &str) {
            self.values.push(label.to_string());
        }

        async fn create_file(&mut self, user: &str) -> Result<()> {
            let now = self.run.as_ref().map_or_else(Local::now, |run| run.started);
            let stem = format!("{}_{}", now.format("%H%M%S"), self.name);
            let dir = self
                .data_dir
                .join(now.format("%Y%m%d").to_string())
                .join(&stem);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
            let (path, mut file) = Self::create_unique(&dir, &stem)?;
            file.write_all(self.header(user, &path).as_bytes())?;

            let writer = csv::WriterBuilder::new()
                .delimiter(b'\t')
                .terminator(csv::Terminator::Any(b'\n'))
                .has_headers(false)
                .from_writer(file);
            tracing::info!(path = %path.display(), "Data file created");
            self.writer = Some(writer);
            self.path = Some(path);
            self.user = Some(user.to_string());
            self.rows = 0;
            self.blocks = 0;
            Ok(())
        }

        async fn add_data_point(&mut self, values: &[f64]) -> Result<()> {
            let writer = self
                .writer
                .as_mut()
                .ok_or_else(|| anyhow!("data file is not open"))?;
            writer.write_record(values.iter().map(|v| format!("{v:e}")))?;
            self.rows += 1;
            Ok(())
        }

        async fn new_block(&mut self) -> Result<()> {
            let writer = self
                .writer
                .as_mut()
                .ok_or_else(|| anyhow!("data file is not open"))?;
            writer.flush()?;
            let mut file: &File = writer.get_ref();
            file.write_all(b"\n")?;
            self.blocks += 1;
            Ok(())
        }

        async fn close_file(&mut self) -> Result<()> {
            if let Some(mut writer) = self.writer.take() {
                writer.flush()?;
                tracing::debug!(path = ?self.path, "Data file closed");
            }
            Ok(())
        }

        async fn write_metadata(&mut self) -> Result<()> {
            let meta = self
                .companion("meta.txt")
                .ok_or_else(|| anyhow!("no data file was created"))?;
            std::fs::write(&meta, self.meta_contents())
                .with_context(|| format!("Failed to write {}", meta.display()))?;

            let record = self
                .companion("json")
                .ok_or_else(|| anyhow!("no data file was created"))?;
            let json = serde_json::to_string_pretty(&self.run_metadata())?;
            std::fs::write(&record, json)
                .with_context(|| format!("Failed to write {}", record.display()))?;
            Ok(())
        }

        fn location(&self) -> Option<PathBuf> {
            self.path
                .as_ref()
                .and_then(|path| path.parent())
                .map(Path::to_path_buf)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_blocks_are_blank_line_separated() {
            let dir = tempfile::tempdir().unwrap();
            let mut sink = DatFileSink::new(dir.path(), "iv");
            sink.add_coordinate("V (V)", 2, 0.0, 1.0);
            sink.add_value("I (A)");
            sink.create_file("alice").await.unwrap();
            sink.add_data_point(&[0.0, 1.0]).await.unwrap();
            sink.add_data_point(&[1.0, 2.0]).await.unwrap();
            sink.new_block().await.unwrap();
            sink.close_file().await.unwrap();
            sink.write_metadata().await.unwrap();

            let path = sink.path().unwrap().to_path_buf();
            assert!(path.file_name().unwrap().to_string_lossy().ends_with("_iv.dat"));
            let text = std::fs::read_to_string(&path).unwrap();
            assert!(text.contains("# User: alice"));
            assert!(text.contains("#\tname: V (V)"));
            assert!(text.contains("0e0\t1e0\n1e0\t2e0\n\n"));

            let meta = std::fs::read_to_string(path.with_file_name(format!(
                "{}.meta.txt",
                path.file_stem().unwrap().to_string_lossy()
            )))
            .unwrap();
            assert!(meta.starts_with("#inner loop\n2\n0\n1\nV (V)\n"));
            assert!(meta.contains("#outer loop\n1\n0\n1\nNone\n"));
            assert!(meta.ends_with("#for each of the values\n2\nI (A)\n"));

            let json = std::fs::read_to_string(path.with_extension("json")).unwrap();
            let record: RunMetadata = serde_json::from_str(&json).unwrap();
            assert_eq!(record.user.as_deref(), Some("alice"));
            assert_eq!(record.rows, 2);
            assert_eq!(record.blocks, 1);
            assert_eq!(record.values, vec!["I (A)".to_string()]);
        }

        fn run_info(started: chrono::DateTime<Local>) -> RunInfo {
            RunInfo {
                run_uid: uuid::Uuid::new_v4(),
                name: "iv".into(),
                strategy: "sweep(sweepback=false)".into(),
                started,
            }
        }

        #[tokio::test]
        async fn test_same_second_runs_get_numbered_files() {
            let dir = tempfile::tempdir().unwrap();
            let started = Local::now();
            let mut paths = Vec::new();
            for row in 0..3 {
                let mut sink = DatFileSink::new(dir.path(), "iv");
                sink.set_run_info(&run_info(started));
                sink.add_coordinate("V (V)", 1, 0.0, 0.0);
                sink.create_file("alice").await.unwrap();
                sink.add_data_point(&[f64::from(row)]).await.unwrap();
                sink.close_file().await.unwrap();
                sink.write_metadata().await.unwrap();
                paths.push(sink.path().unwrap().to_path_buf());
            }

            let names: Vec<String> = paths
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect();
            let stem = format!("{}_iv", started.format("%H%M%S"));
            assert_eq!(
                names,
                vec![
                    format!("{stem}.dat"),
                    format!("{stem}_1.dat"),
                    format!("{stem}_2.dat")
                ]
            );
            // the first data set is untouched
            let first = std::fs::read_to_string(&paths[0]).unwrap();
            assert!(first.ends_with("\n0e0\n"));
            assert!(paths[1].with_extension("json").exists());
            assert!(paths[2]
                .with_file_name(format!("{stem}_2.meta.txt"))
                .exists());
        }

        #[tokio::test]
        async fn test_reused_sink_redeclares_columns() {
            let dir = tempfile::tempdir().unwrap();
            let mut sink = DatFileSink::new(dir.path(), "iv");
            for _ in 0..2 {
                sink.set_run_info(&run_info(Local::now()));
                sink.add_coordinate("V (V)", 2, 0.0, 1.0);
                sink.add_value("I (A)");
                sink.create_file("alice").await.unwrap();
                sink.add_data_point(&[0.0, 1.0]).await.unwrap();
                sink.close_file().await.unwrap();
            }
            let text = std::fs::read_to_string(sink.path().unwrap()).unwrap();
            assert_eq!(text.matches("# Column ").count(), 2);
            assert!(!text.contains("# Column 3:"));
        }

        #[tokio::test]
        async fn test_write_before_create_fails() {
            let dir = tempfile::tempdir().unwrap();
            let mut sink = DatFileSink::new(dir.path(), "iv");
            assert!(sink.add_data_point(&[1.0]).await.is_err());
            assert!(sink.close_file().await.is_ok());
            assert!(sink.write_metadata().await.is_err());
        }
    }
}
