//! Harvester configuration.
//!
//! Settings come from, lowest to highest precedence:
//! 1. Built-in defaults (see [`Config::default`])
//! 2. A TOML file, either given explicitly or `harvest.toml` in the working directory
//! 3. Overrides applied by the caller, e.g. command line flags
//!
//! Every key is optional in the file:
//!
//! ```toml
//! base_url      = "http://oai.narcis.nl/oai"
//! set_spec      = "publication"
//! output_dir    = "harvest"
//! max_csv_rows  = 40000
//! logfile_dir   = "logs"
//! log_level     = "info"
//! tracked_years = ["2020", "2021", "2022"]
//! ```

use super::*;

/// Everything a harvest run can be configured with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Base URL of the OAI-PMH endpoint
  pub base_url:             String,
  /// Metadata format requested from the endpoint
  pub metadata_prefix:      String,
  /// Record set to harvest; `None` harvests the whole repository
  #[serde(skip_serializing_if = "Option::is_none")]
  pub set_spec:             Option<String>,
  /// Seconds before a single request is given up
  pub request_timeout_secs: u64,
  /// Directory the CSV files are written to
  pub output_dir:           PathBuf,
  /// Rows per CSV file before rotating to the next file
  pub max_csv_rows:         usize,
  /// Columns written to CSV files, in order
  pub fields:               FieldSchema,
  /// Directory of the log file
  pub logfile_dir:          PathBuf,
  /// Log file name after the `YYYY-MM-DD_` date prefix
  pub logfile_suffix:       String,
  /// Default log filter, e.g. `debug` or `harvester=info`
  pub log_level:            String,
  /// Publication years counted in count-only runs
  pub tracked_years:        Vec<String>,
  /// Totals file of count-only runs; defaults to a dated file in `output_dir`
  #[serde(skip_serializing_if = "Option::is_none")]
  pub totals_file:          Option<PathBuf>,
  /// SQLite database for the database sink; defaults to the user's data directory
  #[serde(skip_serializing_if = "Option::is_none")]
  pub database_path:        Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      base_url:             "http://oai.narcis.nl/oai".to_string(),
      metadata_prefix:      "oai_dc".to_string(),
      set_spec:             Some("publication".to_string()),
      request_timeout_secs: 120,
      output_dir:           PathBuf::from("harvest"),
      max_csv_rows:         40_000,
      fields:               FieldSchema::default(),
      logfile_dir:          PathBuf::from("."),
      logfile_suffix:       "harvest.log".to_string(),
      log_level:            "debug".to_string(),
      tracked_years:        stats::DEFAULT_TRACKED_YEARS.map(String::from).to_vec(),
      totals_file:          None,
      database_path:        None,
    }
  }
}

impl Config {
  /// File picked up from the working directory when no path is given.
  pub const DEFAULT_FILE: &'static str = "harvest.toml";

  /// Reads and validates the TOML file at `path`.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, HarvestError> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());
    let config: Config = toml::from_str(&std::fs::read_to_string(path)?)?;
    config.validate()?;
    Ok(config)
  }

  /// Loads `path` if given, else [`Config::DEFAULT_FILE`] if it exists, else the
  /// defaults.
  pub fn load_or_default(path: Option<&Path>) -> Result<Self, HarvestError> {
    match path {
      Some(path) => Self::load(path),
      None if Path::new(Self::DEFAULT_FILE).exists() => Self::load(Self::DEFAULT_FILE),
      None => Ok(Self::default()),
    }
  }

  /// Renders the configuration as TOML.
  pub fn to_toml(&self) -> Result<String, HarvestError> { Ok(toml::to_string_pretty(self)?) }

  /// Checks the settings that would otherwise fail halfway through a run.
  pub fn validate(&self) -> Result<(), HarvestError> {
    url::Url::parse(&self.base_url)?;
    if self.max_csv_rows == 0 {
      return Err(HarvestError::InvalidConfig("max_csv_rows must be at least 1".into()));
    }
    if self.fields.fields().is_empty() {
      return Err(HarvestError::InvalidConfig("fields must name at least one column".into()));
    }
    if self.tracked_years.is_empty() {
      return Err(HarvestError::InvalidConfig("tracked_years must not be empty".into()));
    }
    if let Some(year) =
      self.tracked_years.iter().find(|y| y.len() != 4 || !y.chars().all(|c| c.is_ascii_digit()))
    {
      return Err(HarvestError::InvalidConfig(format!("`{year}` is not a four digit year")));
    }
    Ok(())
  }

  /// Totals file for count-only runs started on `today`.
  pub fn totals_path_on(&self, today: NaiveDate) -> PathBuf {
    self
      .totals_file
      .clone()
      .unwrap_or_else(|| self.output_dir.join(format!("{}_count.csv", today.format("%Y-%m-%d"))))
  }

  /// Totals file for count-only runs started today.
  pub fn totals_path(&self) -> PathBuf { self.totals_path_on(Utc::now().date_naive()) }

  /// SQLite database for the database sink.
  pub fn database_path(&self) -> PathBuf {
    self.database_path.clone().unwrap_or_else(sink::Database::default_path)
  }

  /// Log file for runs started on `today`: `<logfile_dir>/<YYYY-MM-DD>_<logfile_suffix>`.
  pub fn logfile_name(&self, today: NaiveDate) -> String {
    format!("{}_{}", today.format("%Y-%m-%d"), self.logfile_suffix)
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::*;

  #[test]
  fn test_defaults_are_valid() {
    let config = Config::default();
    config.validate().unwrap();
    assert_eq!(config.max_csv_rows, 40_000);
    assert_eq!(config.output_dir, PathBuf::from("harvest"));
    assert_eq!(config.set_spec.as_deref(), Some("publication"));
    assert_eq!(config.tracked_years.len(), 5);
  }

  #[test]
  fn test_partial_file_keeps_defaults() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("harvest.toml");
    fs::write(
      &path,
      r#"
max_csv_rows  = 10
output_dir    = "out"
fields        = ["doi", "identifier", "partof"]
tracked_years = ["2021"]
"#,
    )?;

    let config = Config::load(&path)?;
    assert_eq!(config.max_csv_rows, 10);
    assert_eq!(config.output_dir, PathBuf::from("out"));
    assert_eq!(config.fields.fields(), [Field::Doi, Field::Identifier, Field::PartOf]);
    assert_eq!(config.tracked_years, ["2021"]);
    assert_eq!(config.base_url, Config::default().base_url);
    Ok(())
  }

  #[test]
  fn test_validation_failures() {
    let config = Config { max_csv_rows: 0, ..Config::default() };
    assert!(matches!(config.validate(), Err(HarvestError::InvalidConfig(_))));

    let config = Config { tracked_years: vec!["21".to_string()], ..Config::default() };
    assert!(matches!(config.validate(), Err(HarvestError::InvalidConfig(_))));

    let config = Config { base_url: "not a url".to_string(), ..Config::default() };
    assert!(matches!(config.validate(), Err(HarvestError::InvalidUrl(_))));
  }

  #[test]
  fn test_unknown_column_is_rejected() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("harvest.toml");
    fs::write(&path, "fields = [\"doi\", \"publisher\"]\n")?;
    assert!(matches!(Config::load(&path), Err(HarvestError::ConfigParse(_))));
    Ok(())
  }

  #[test]
  fn test_toml_round_trip() -> anyhow::Result<()> {
    let config = Config { totals_file: Some(PathBuf::from("totals.csv")), ..Config::default() };
    let parsed: Config = toml::from_str(&config.to_toml()?)?;
    assert_eq!(parsed, config);
    Ok(())
  }

  #[test]
  fn test_derived_paths() {
    let today = NaiveDate::from_ymd_opt(2022, 10, 3).unwrap();
    let config = Config::default();
    assert_eq!(config.totals_path_on(today), PathBuf::from("harvest/2022-10-03_count.csv"));
    assert_eq!(config.logfile_name(today), "2022-10-03_harvest.log");

    let config = Config { totals_file: Some(PathBuf::from("t.csv")), ..Config::default() };
    assert_eq!(config.totals_path_on(today), PathBuf::from("t.csv"));
  }
}
