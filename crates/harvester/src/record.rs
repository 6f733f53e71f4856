//! Record types flowing through a harvest.
//!
//! A harvest turns each [`RawRecord`] produced by a record source into exactly one
//! [`FlatRecord`], which is the row shape every sink writes. Raw records keep the
//! Dublin Core metadata as ordered lists of strings; flat records only ever hold
//! scalars.
//!
//! # Examples
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use harvester::record::{DcField, Metadata, RawRecord, RecordHeader};
//!
//! let header = RecordHeader {
//!   identifier: "oai:repo:1".to_string(),
//!   datestamp:  Utc.with_ymd_and_hms(2021, 3, 4, 0, 0, 0).unwrap(),
//!   deleted:    false,
//! };
//! let metadata = Metadata::new().with(DcField::Title, ["A title"]);
//! let record = RawRecord::new(header, Some(metadata));
//!
//! assert_eq!(record.metadata().unwrap().values(DcField::Title), ["A title"]);
//! assert!(record.metadata().unwrap().values(DcField::Creator).is_empty());
//! ```

use std::{borrow::Cow, collections::BTreeMap};

use super::*;

/// The fifteen Dublin Core elements plus `isPartOf`, as harvested from `oai_dc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DcField {
  /// `dc:title`
  Title,
  /// `dc:creator`
  Creator,
  /// `dc:subject`
  Subject,
  /// `dc:description`
  Description,
  /// `dc:publisher`
  Publisher,
  /// `dc:contributor`
  Contributor,
  /// `dc:date`
  Date,
  /// `dc:type`
  Type,
  /// `dc:format`
  Format,
  /// `dc:identifier`
  Identifier,
  /// `dc:source`
  Source,
  /// `dc:language`
  Language,
  /// `dc:relation`
  Relation,
  /// `dc:coverage`
  Coverage,
  /// `dc:rights`
  Rights,
  /// `dc:isPartOf`
  IsPartOf,
}

impl DcField {
  /// Every field, in declaration order.
  pub const ALL: [DcField; 16] = [
    DcField::Title,
    DcField::Creator,
    DcField::Subject,
    DcField::Description,
    DcField::Publisher,
    DcField::Contributor,
    DcField::Date,
    DcField::Type,
    DcField::Format,
    DcField::Identifier,
    DcField::Source,
    DcField::Language,
    DcField::Relation,
    DcField::Coverage,
    DcField::Rights,
    DcField::IsPartOf,
  ];

  /// The metadata key for this field.
  pub fn name(&self) -> &'static str {
    match self {
      DcField::Title => "title",
      DcField::Creator => "creator",
      DcField::Subject => "subject",
      DcField::Description => "description",
      DcField::Publisher => "publisher",
      DcField::Contributor => "contributor",
      DcField::Date => "date",
      DcField::Type => "type",
      DcField::Format => "format",
      DcField::Identifier => "identifier",
      DcField::Source => "source",
      DcField::Language => "language",
      DcField::Relation => "relation",
      DcField::Coverage => "coverage",
      DcField::Rights => "rights",
      DcField::IsPartOf => "ispartof",
    }
  }
}

impl fmt::Display for DcField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// Dublin Core metadata of a live record.
///
/// Every field maps to an ordered list of values. A field the repository did not
/// send reads as an empty list, so callers never have to tell "absent" apart from
/// "present but empty".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
  /// Values per field, in document order
  values: BTreeMap<DcField, Vec<String>>,
}

impl Metadata {
  /// Creates metadata with no values for any field.
  pub fn new() -> Self { Self::default() }

  /// Builder-style setter replacing all values of `field`.
  pub fn with<I, S>(mut self, field: DcField, values: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>, {
    self.values.insert(field, values.into_iter().map(Into::into).collect());
    self
  }

  /// Appends one value to `field`.
  pub fn push(&mut self, field: DcField, value: impl Into<String>) {
    self.values.entry(field).or_default().push(value.into());
  }

  /// All values of `field`, empty when the repository sent none.
  pub fn values(&self, field: DcField) -> &[String] {
    self.values.get(&field).map(Vec::as_slice).unwrap_or_default()
  }
}

impl FromIterator<(DcField, Vec<String>)> for Metadata {
  fn from_iter<T: IntoIterator<Item = (DcField, Vec<String>)>>(iter: T) -> Self {
    let mut metadata = Metadata::new();
    for (field, values) in iter {
      metadata.values.entry(field).or_default().extend(values);
    }
    metadata
  }
}

/// The OAI-PMH record header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
  /// Repository-unique OAI identifier, e.g. `oai:repo:1234`
  pub identifier: String,
  /// Last modification of the record in the repository
  pub datestamp:  DateTime<Utc>,
  /// Whether the header carries `status="deleted"`
  pub deleted:    bool,
}

impl RecordHeader {
  /// Parses an OAI-PMH datestamp in either second (`2021-03-04T10:00:00Z`) or day
  /// (`2021-03-04`) granularity. Day granularity maps to midnight UTC.
  pub fn parse_datestamp(value: &str) -> Result<DateTime<Utc>, HarvestError> {
    let value = value.trim();
    if let Ok(datestamp) = DateTime::parse_from_rfc3339(value) {
      return Ok(datestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
      .ok()
      .and_then(|date| date.and_hms_opt(0, 0, 0))
      .map(|datetime| datetime.and_utc())
      .ok_or_else(|| HarvestError::InvalidDatestamp(value.to_string()))
  }
}

/// One record as delivered by a record source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
  /// The record header
  pub header: RecordHeader,
  /// Dublin Core metadata; only meaningful for live records
  metadata:   Option<Metadata>,
}

impl RawRecord {
  /// Creates a record. Metadata passed for a deleted header is dropped.
  pub fn new(header: RecordHeader, metadata: Option<Metadata>) -> Self {
    let metadata = if header.deleted { None } else { metadata };
    Self { header, metadata }
  }

  /// Whether the record is a delete marker.
  pub fn is_deleted(&self) -> bool { self.header.deleted }

  /// The metadata of a live record. Always `None` for delete markers.
  pub fn metadata(&self) -> Option<&Metadata> { self.metadata.as_ref() }
}

/// A column of a [`FlatRecord`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
  /// Selected DOI
  Doi,
  /// OAI identifier from the header
  Identifier,
  /// Header datestamp
  Datestamp,
  /// Delete marker flag
  Deleted,
  /// First `dc:type` value
  Type,
  /// All `dc:identifier` values, joined
  Identifiers,
  /// Normalized first `dc:date`
  Date,
  /// Joined `dc:source`
  Source,
  /// Joined `dc:rights`
  Rights,
  /// Joined `dc:isPartOf`
  PartOf,
  /// Joined `dc:creator`
  Creator,
  /// Joined `dc:title`
  Title,
}

impl Field {
  /// Every column, in the default output order.
  pub const ALL: [Field; 12] = [
    Field::Doi,
    Field::Identifier,
    Field::Datestamp,
    Field::Deleted,
    Field::Type,
    Field::Identifiers,
    Field::Date,
    Field::Source,
    Field::Rights,
    Field::PartOf,
    Field::Creator,
    Field::Title,
  ];

  /// Column name used in CSV headers.
  pub fn name(&self) -> &'static str {
    match self {
      Field::Doi => "doi",
      Field::Identifier => "identifier",
      Field::Datestamp => "datestamp",
      Field::Deleted => "deleted",
      Field::Type => "type",
      Field::Identifiers => "identifiers",
      Field::Date => "date",
      Field::Source => "source",
      Field::Rights => "rights",
      Field::PartOf => "partof",
      Field::Creator => "creator",
      Field::Title => "title",
    }
  }
}

/// Ordered set of columns a sink writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSchema(Vec<Field>);

impl FieldSchema {
  /// A schema writing `fields` in the given order.
  pub fn new(fields: Vec<Field>) -> Self { Self(fields) }

  /// Columns in output order.
  pub fn fields(&self) -> &[Field] { &self.0 }

  /// The header row.
  pub fn header(&self) -> Vec<&'static str> { self.0.iter().map(Field::name).collect() }

  /// The row `record` contributes under this schema.
  pub fn row<'a>(&self, record: &'a FlatRecord) -> Vec<Cow<'a, str>> {
    self.0.iter().map(|field| record.value(*field)).collect()
  }
}

impl Default for FieldSchema {
  fn default() -> Self { Self(Field::ALL.to_vec()) }
}

/// Format used when a datestamp is written out as text.
pub const DATESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A normalized record: the CSV and database row shape.
///
/// Every field is a scalar. Produce these with
/// [`normalize`](crate::normalize::normalize).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatRecord {
  /// Last `dc:identifier` starting with `10.`, at most 254 characters
  pub doi:         String,
  /// OAI identifier from the header
  pub identifier:  String,
  /// Header datestamp
  pub datestamp:   DateTime<Utc>,
  /// Delete marker flag
  pub deleted:     bool,
  /// First `dc:type` value
  #[serde(rename = "type")]
  pub record_type: String,
  /// All `dc:identifier` values, joined
  pub identifiers: String,
  /// `YYYY-MM-DD` from the first `dc:date`, or empty
  pub date:        String,
  /// Joined `dc:source`
  pub source:      String,
  /// Joined `dc:rights`
  pub rights:      String,
  /// Joined `dc:isPartOf`
  pub partof:      String,
  /// Joined `dc:creator`
  pub creator:     String,
  /// Joined `dc:title`
  pub title:       String,
}

impl FlatRecord {
  /// A record with only header information and every content field empty.
  pub fn from_header(header: &RecordHeader) -> Self {
    Self {
      doi:         String::new(),
      identifier:  header.identifier.clone(),
      datestamp:   header.datestamp,
      deleted:     header.deleted,
      record_type: String::new(),
      identifiers: String::new(),
      date:        String::new(),
      source:      String::new(),
      rights:      String::new(),
      partof:      String::new(),
      creator:     String::new(),
      title:       String::new(),
    }
  }

  /// Text value of one column.
  pub fn value(&self, field: Field) -> Cow<'_, str> {
    match field {
      Field::Doi => Cow::Borrowed(&self.doi),
      Field::Identifier => Cow::Borrowed(&self.identifier),
      Field::Datestamp => Cow::Owned(self.datestamp.format(DATESTAMP_FORMAT).to_string()),
      Field::Deleted => Cow::Borrowed(if self.deleted { "true" } else { "false" }),
      Field::Type => Cow::Borrowed(&self.record_type),
      Field::Identifiers => Cow::Borrowed(&self.identifiers),
      Field::Date => Cow::Borrowed(&self.date),
      Field::Source => Cow::Borrowed(&self.source),
      Field::Rights => Cow::Borrowed(&self.rights),
      Field::PartOf => Cow::Borrowed(&self.partof),
      Field::Creator => Cow::Borrowed(&self.creator),
      Field::Title => Cow::Borrowed(&self.title),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_datestamp_granularities() {
    let seconds = RecordHeader::parse_datestamp("2021-03-04T10:11:12Z").unwrap();
    assert_eq!(seconds, Utc.with_ymd_and_hms(2021, 3, 4, 10, 11, 12).unwrap());

    let day = RecordHeader::parse_datestamp("2021-03-04").unwrap();
    assert_eq!(day, Utc.with_ymd_and_hms(2021, 3, 4, 0, 0, 0).unwrap());

    assert!(matches!(
      RecordHeader::parse_datestamp("04/03/2021"),
      Err(HarvestError::InvalidDatestamp(_))
    ));
  }

  #[test]
  fn test_deleted_record_drops_metadata() {
    let header = RecordHeader {
      identifier: "oai:repo:1".to_string(),
      datestamp:  Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
      deleted:    true,
    };
    let record = RawRecord::new(header, Some(Metadata::new().with(DcField::Title, ["gone"])));
    assert!(record.is_deleted());
    assert!(record.metadata().is_none());
  }

  #[test]
  fn test_metadata_collects_repeated_fields() {
    let metadata: Metadata = vec![
      (DcField::Creator, vec!["Doe, J.".to_string()]),
      (DcField::Creator, vec!["Roe, R.".to_string()]),
    ]
    .into_iter()
    .collect();
    assert_eq!(metadata.values(DcField::Creator), ["Doe, J.", "Roe, R."]);
    assert!(metadata.values(DcField::Rights).is_empty());
  }

  #[test]
  fn test_schema_row_follows_column_order() {
    let header = RecordHeader {
      identifier: "oai:repo:7".to_string(),
      datestamp:  Utc.with_ymd_and_hms(2020, 5, 6, 7, 8, 9).unwrap(),
      deleted:    false,
    };
    let mut record = FlatRecord::from_header(&header);
    record.title = "Title".to_string();

    let schema = FieldSchema::new(vec![Field::Title, Field::Datestamp, Field::Deleted]);
    assert_eq!(schema.header(), ["title", "datestamp", "deleted"]);
    assert_eq!(schema.row(&record), ["Title", "2020-05-06T07:08:09Z", "false"]);
    assert_eq!(FieldSchema::default().fields().len(), 12);
  }
}
