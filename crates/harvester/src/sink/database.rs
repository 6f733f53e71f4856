use rusqlite::params;
use tokio_rusqlite::Connection;

use super::*;

/// Database handle for harvested records
#[derive(Clone)]
pub struct Database {
  conn: Connection,
}

impl Database {
  /// Open or create a database at the specified path
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, HarvestError> {
    let conn = Connection::open(path.as_ref()).await?;

    // Initialize schema
    conn
      .call(|conn| {
        conn.execute_batch(include_str!(concat!(
          env!("CARGO_MANIFEST_DIR"),
          "/migrations/init.sql"
        )))?;
        Ok(())
      })
      .await?;

    Ok(Self { conn })
  }

  /// Get default database path in user's data directory
  pub fn default_path() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("harvester").join("harvest.db")
  }

  /// Insert one record, returning its row id
  pub async fn insert_record(&self, record: &FlatRecord) -> Result<i64, HarvestError> {
    let record = record.clone();
    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "INSERT INTO harvested_records (doi, type, datestamp, identifiers, date, title)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        stmt.execute(params![
          &record.doi,
          &record.record_type,
          &record.datestamp,
          &record.identifiers,
          &record.date,
          &record.title,
        ])?;
        Ok(conn.last_insert_rowid())
      })
      .await
      .map_err(HarvestError::from)
  }

  /// Number of stored records
  pub async fn count_records(&self) -> Result<i64, HarvestError> {
    self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM harvested_records", [], |row| row.get(0))?)
      })
      .await
      .map_err(HarvestError::from)
  }
}

/// Sink inserting every record as its own row, without a surrounding transaction
#[derive(Clone)]
pub struct DatabaseSink {
  db: Database,
}

impl DatabaseSink {
  /// Sink writing into `db`
  pub fn new(db: Database) -> Self { Self { db } }
}

impl RecordSink for DatabaseSink {
  async fn accept(&mut self, record: &FlatRecord) -> Result<(), HarvestError> {
    let id = self.db.insert_record(record).await?;
    trace!("Inserted {} as row {id}", record.identifier);
    Ok(())
  }

  async fn close(&mut self) -> Result<(), HarvestError> { Ok(()) }
}

/// Hands every window a sink on the same connection
#[derive(Clone)]
pub struct DatabaseSinkFactory {
  db: Database,
}

impl DatabaseSinkFactory {
  /// Factory for sinks writing into `db`
  pub fn new(db: Database) -> Self { Self { db } }
}

impl SinkFactory for DatabaseSinkFactory {
  type Sink = DatabaseSink;

  async fn open(&self, _window: &Window) -> Result<DatabaseSink, HarvestError> {
    Ok(DatabaseSink::new(self.db.clone()))
  }
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;

  /// Helper function to create a test record
  fn create_test_record(doi: &str) -> FlatRecord {
    let header = RecordHeader {
      identifier: "oai:narcis.nl:42".to_string(),
      datestamp:  Utc.with_ymd_and_hms(2022, 3, 1, 0, 0, 0).unwrap(),
      deleted:    false,
    };
    let mut record = FlatRecord::from_header(&header);
    record.doi = doi.to_string();
    record.record_type = "info:eu-repo/semantics/article".to_string();
    record.date = "2021-01-01".to_string();
    record.title = "Test Record".to_string();
    record
  }

  /// Helper function to set up a test database
  async fn setup_test_db() -> (Database, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let db = Database::open(&db_path).await.unwrap();
    (db, dir)
  }

  #[tokio::test]
  async fn test_database_creation() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test.db");

    let _db = Database::open(&db_path).await.unwrap();

    assert!(db_path.exists());
  }

  #[tokio::test]
  async fn test_insert_and_read_back() -> Result<(), HarvestError> {
    let (db, _dir) = setup_test_db().await;

    let id = db.insert_record(&create_test_record("10.1000/a")).await?;
    assert!(id > 0);

    let stored = db
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT doi, type, date, title FROM harvested_records WHERE id = ?1",
          [id],
          |row| {
            Ok((
              row.get::<_, String>(0)?,
              row.get::<_, String>(1)?,
              row.get::<_, String>(2)?,
              row.get::<_, String>(3)?,
            ))
          },
        )?)
      })
      .await?;
    assert_eq!(stored.0, "10.1000/a");
    assert_eq!(stored.1, "info:eu-repo/semantics/article");
    assert_eq!(stored.2, "2021-01-01");
    assert_eq!(stored.3, "Test Record");
    Ok(())
  }

  #[tokio::test]
  async fn test_sink_inserts_one_row_per_record() -> Result<(), HarvestError> {
    let (db, _dir) = setup_test_db().await;
    let factory = DatabaseSinkFactory::new(db.clone());
    let window = Window::day(NaiveDate::from_ymd_opt(2022, 3, 1).unwrap());

    let mut sink = factory.open(&window).await?;
    sink.accept(&create_test_record("10.1000/a")).await?;
    sink.accept(&create_test_record("")).await?;
    sink.close().await?;
    sink.close().await?;

    let mut sink = factory.open(&window).await?;
    sink.accept(&create_test_record("10.1000/a")).await?;
    sink.close().await?;

    assert_eq!(db.count_records().await?, 3);
    Ok(())
  }
}
