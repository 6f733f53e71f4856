//! Rotating CSV output.
//!
//! Every window gets its own [`CsvSink`]. Files are named after the window and a
//! running index starting at 1:
//!
//! ```text
//! <output_dir>/<prefix><from:YYYYMMDD>-<until:YYYYMMDD>_<index>.csv
//! ```
//!
//! so running the same window twice overwrites the same files. Rows are `$`
//! separated and `"` quoted, and each file starts with the schema's header row.
//!
//! # Examples
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use harvester::{
//!   record::FieldSchema,
//!   sink::{CsvSink, RecordSink},
//!   window::Window,
//! };
//!
//! # async fn example(records: Vec<harvester::record::FlatRecord>) -> Result<(), Box<dyn std::error::Error>> {
//! let window = Window::day(NaiveDate::from_ymd_opt(2022, 5, 1).unwrap());
//! let mut sink = CsvSink::new(&window, FieldSchema::default(), 40_000, "harvest");
//! for record in &records {
//!   sink.accept(record).await?;
//! }
//! sink.close().await?;
//! println!("wrote {:?}", sink.files());
//! # Ok(())
//! # }
//! ```

use std::fs::File;

use ::csv::{Writer, WriterBuilder};

use super::*;

/// Field delimiter of harvest files.
pub const DELIMITER: u8 = b'$';

/// Quote character of harvest files.
pub const QUOTE: u8 = b'"';

/// Writes one window's records into size-bounded CSV files.
#[derive(Debug)]
pub struct CsvSink {
  /// Window the files are named after
  window:       Window,
  /// Columns written, in order
  schema:       FieldSchema,
  /// Rows per file before rotating
  max_rows:     usize,
  /// Directory the files are created in; must exist
  output_dir:   PathBuf,
  /// Prepended to every file name
  prefix:       String,
  /// Index of the open (or last) file, 0 before the first
  file_index:   usize,
  /// Rows in the open file
  rows_in_file: usize,
  /// Rows across all files
  rows_written: usize,
  /// The open file, if any
  writer:       Option<Writer<File>>,
  /// Every file created so far
  files:        Vec<PathBuf>,
}

impl CsvSink {
  /// Creates a sink for `window`. Nothing touches the disk until the first record.
  ///
  /// A `max_rows` of zero is treated as one row per file.
  pub fn new(
    window: &Window,
    schema: FieldSchema,
    max_rows: usize,
    output_dir: impl Into<PathBuf>,
  ) -> Self {
    Self {
      window: *window,
      schema,
      max_rows: max_rows.max(1),
      output_dir: output_dir.into(),
      prefix: String::new(),
      file_index: 0,
      rows_in_file: 0,
      rows_written: 0,
      writer: None,
      files: Vec::new(),
    }
  }

  /// Prepends `prefix` to every file name, e.g. `deleted_`.
  pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.prefix = prefix.into();
    self
  }

  /// Path of the file with the given index.
  pub fn file_path(&self, index: usize) -> PathBuf {
    self.output_dir.join(format!(
      "{}{}-{}_{index}.csv",
      self.prefix,
      self.window.from.format("%Y%m%d"),
      self.window.until.format("%Y%m%d"),
    ))
  }

  /// Files created so far, in creation order.
  pub fn files(&self) -> &[PathBuf] { &self.files }

  /// Rows written across all files.
  pub fn rows_written(&self) -> usize { self.rows_written }

  /// Whether a file is currently open.
  pub fn is_open(&self) -> bool { self.writer.is_some() }

  /// Creates the next file and writes its header.
  fn open_next(&mut self) -> Result<Writer<File>, HarvestError> {
    self.file_index += 1;
    let path = self.file_path(self.file_index);
    if self.rows_written > 0 {
      info!("Written {} records", self.rows_written);
    }
    info!("Creating file {}", path.display());

    let mut writer = WriterBuilder::new().delimiter(DELIMITER).quote(QUOTE).from_path(&path)?;
    writer.write_record(self.schema.header())?;
    self.rows_in_file = 0;
    self.files.push(path);
    Ok(writer)
  }
}

impl RecordSink for CsvSink {
  async fn accept(&mut self, record: &FlatRecord) -> Result<(), HarvestError> {
    let mut writer = match self.writer.take() {
      Some(writer) if self.rows_in_file < self.max_rows => writer,
      Some(mut full) => {
        full.flush()?;
        self.open_next()?
      },
      None => self.open_next()?,
    };

    let row = self.schema.row(record);
    writer.write_record(row.iter().map(|value| value.as_bytes()))?;
    self.writer = Some(writer);
    self.rows_in_file += 1;
    self.rows_written += 1;
    Ok(())
  }

  async fn close(&mut self) -> Result<(), HarvestError> {
    if let Some(mut writer) = self.writer.take() {
      writer.flush()?;
      debug!(files = self.files.len(), rows = self.rows_written, "Closed CSV output for {}", self.window);
    }
    Ok(())
  }
}

/// Hands out a [`CsvSink`] per window with shared settings.
#[derive(Debug, Clone)]
pub struct CsvSinkFactory {
  /// Directory files are created in
  pub output_dir: PathBuf,
  /// Columns written
  pub schema:     FieldSchema,
  /// Rows per file
  pub max_rows:   usize,
  /// File name prefix
  pub prefix:     String,
}

impl CsvSinkFactory {
  /// A factory writing the default schema without a prefix.
  pub fn new(output_dir: impl Into<PathBuf>, max_rows: usize) -> Self {
    Self {
      output_dir: output_dir.into(),
      schema: FieldSchema::default(),
      max_rows,
      prefix: String::new(),
    }
  }

  /// A factory using the configured output directory, row limit and schema.
  pub fn from_config(config: &Config) -> Self {
    Self {
      output_dir: config.output_dir.clone(),
      schema:     config.fields.clone(),
      max_rows:   config.max_csv_rows,
      prefix:     String::new(),
    }
  }

  /// Prepends `prefix` to every file name.
  pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.prefix = prefix.into();
    self
  }
}

impl SinkFactory for CsvSinkFactory {
  type Sink = CsvSink;

  async fn open(&self, window: &Window) -> Result<CsvSink, HarvestError> {
    Ok(
      CsvSink::new(window, self.schema.clone(), self.max_rows, self.output_dir.clone())
        .with_prefix(self.prefix.clone()),
    )
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::*;

  fn window() -> Window {
    Window::from_dates(
      NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
      NaiveDate::from_ymd_opt(2020, 2, 1).unwrap(),
    )
  }

  fn record(n: usize) -> FlatRecord {
    let header = RecordHeader {
      identifier: format!("oai:repo:{n}"),
      datestamp:  Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap(),
      deleted:    false,
    };
    let mut record = FlatRecord::from_header(&header);
    record.title = format!("Title {n}");
    record
  }

  fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = ::csv::ReaderBuilder::new()
      .delimiter(DELIMITER)
      .has_headers(false)
      .from_path(path)
      .unwrap();
    reader.records().map(|row| row.unwrap().iter().map(String::from).collect()).collect()
  }

  #[tokio::test]
  async fn test_rotation_by_row_count() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mut sink = CsvSink::new(&window(), FieldSchema::default(), 2, dir.path());

    for n in 0..5 {
      sink.accept(&record(n)).await?;
    }
    sink.close().await?;

    let expected: Vec<PathBuf> =
      (1..=3).map(|i| dir.path().join(format!("20200101-20200201_{i}.csv"))).collect();
    assert_eq!(sink.files(), expected.as_slice());
    assert_eq!(sink.rows_written(), 5);

    let header: Vec<String> = FieldSchema::default().header().into_iter().map(String::from).collect();
    for (path, data_rows) in expected.iter().zip([2, 2, 1]) {
      let rows = read_rows(path);
      assert_eq!(rows.len(), data_rows + 1);
      assert_eq!(rows[0], header);
      assert_eq!(rows.iter().filter(|row| **row == header).count(), 1);
    }
    assert_eq!(read_rows(&expected[2])[1][1], "oai:repo:4");
    Ok(())
  }

  #[tokio::test]
  async fn test_close_is_idempotent_and_lazy() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mut sink = CsvSink::new(&window(), FieldSchema::default(), 10, dir.path());
    sink.close().await?;
    sink.close().await?;
    assert!(sink.files().is_empty());
    assert_eq!(fs::read_dir(dir.path())?.count(), 0);

    sink.accept(&record(1)).await?;
    assert!(sink.is_open());
    sink.close().await?;
    sink.close().await?;
    assert!(!sink.is_open());
    assert_eq!(read_rows(&sink.files()[0]).len(), 2);
    Ok(())
  }

  #[tokio::test]
  async fn test_quoting_and_prefix() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let schema = FieldSchema::new(vec![Field::Identifier, Field::Creator]);
    let mut sink = CsvSink::new(&window(), schema, 10, dir.path()).with_prefix("deleted_");

    let mut flat = record(1);
    flat.creator = "\"Doe, J.\",\"A $ sign\"".to_string();
    sink.accept(&flat).await?;
    sink.close().await?;

    let path = dir.path().join("deleted_20200101-20200201_1.csv");
    assert_eq!(sink.files(), [path.clone()]);
    let text = fs::read_to_string(&path)?;
    assert!(text.starts_with("identifier$creator\n"));
    assert_eq!(read_rows(&path)[1], ["oai:repo:1", "\"Doe, J.\",\"A $ sign\""]);
    Ok(())
  }

  #[tokio::test]
  async fn test_missing_output_dir_is_an_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("not-created");
    let mut sink = CsvSink::new(&window(), FieldSchema::default(), 10, &missing);
    assert!(sink.accept(&record(1)).await.is_err());
    assert!(!missing.exists());
  }
}
