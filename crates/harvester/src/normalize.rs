//! Flattening of harvested records into scalar rows.
//!
//! [`normalize`] is total: any [`RawRecord`], including delete markers and records
//! with missing fields, produces a well-formed [`FlatRecord`].
//!
//! # Examples
//!
//! ```
//! use harvester::normalize::{fix_date, join_values};
//!
//! assert_eq!(join_values(&["one".to_string()]), "one");
//! assert_eq!(join_values(&["a".to_string(), "b".to_string()]), "\"a\",\"b\"");
//! assert_eq!(fix_date(&["2020-3-4".to_string()]), "2020-03-04");
//! ```

use super::*;

/// Prefix every DOI starts with.
pub const DOI_PREFIX: &str = "10.";

/// Longest DOI stored; longer candidates are cut to this many characters.
pub const MAX_DOI_LEN: usize = 254;

/// Converts one harvested record into its flat row.
///
/// Delete markers keep their identifier and datestamp; every content field stays
/// empty. Live records take the first `dc:type`, the DOI from
/// [`extract_doi`], the date from [`fix_date`], and every other field through
/// [`join_values`].
pub fn normalize(raw: &RawRecord) -> FlatRecord {
  let mut flat = FlatRecord::from_header(&raw.header);
  let Some(metadata) = raw.metadata() else {
    return flat;
  };

  let identifiers = metadata.values(DcField::Identifier);
  flat.doi = extract_doi(&raw.header.identifier, identifiers);
  flat.record_type = metadata.values(DcField::Type).first().cloned().unwrap_or_default();
  flat.identifiers = join_values(identifiers);
  flat.date = fix_date(metadata.values(DcField::Date));
  flat.source = join_values(metadata.values(DcField::Source));
  flat.rights = join_values(metadata.values(DcField::Rights));
  flat.partof = join_values(metadata.values(DcField::IsPartOf));
  flat.creator = join_values(metadata.values(DcField::Creator));
  flat.title = join_values(metadata.values(DcField::Title));
  flat
}

/// Picks the DOI out of a record's identifiers.
///
/// The last identifier starting with [`DOI_PREFIX`] wins. A winner longer than
/// [`MAX_DOI_LEN`] characters is truncated and logged at warn level with the
/// record's OAI identifier.
pub fn extract_doi(record_identifier: &str, identifiers: &[String]) -> String {
  let Some(doi) = identifiers.iter().rev().find(|id| id.starts_with(DOI_PREFIX)) else {
    return String::new();
  };

  match doi.char_indices().nth(MAX_DOI_LEN) {
    Some((cut, _)) => {
      warn!(
        record = record_identifier,
        length = doi.chars().count(),
        "DOI longer than {MAX_DOI_LEN} characters, truncating"
      );
      doi[..cut].to_string()
    },
    None => doi.clone(),
  }
}

/// Collapses a multi-valued field into one scalar.
///
/// A single value is returned as is. Several values are each wrapped in double
/// quotes and joined with commas. No values give an empty string.
pub fn join_values(values: &[String]) -> String {
  match values {
    [] => String::new(),
    [single] => single.clone(),
    many => many.iter().map(|value| format!("\"{value}\"")).collect::<Vec<_>>().join(","),
  }
}

/// Normalizes the first `dc:date` value to `YYYY-MM-DD`.
///
/// Missing month or day components default to `01`; present ones are zero-padded
/// to two digits. Nothing is validated against the calendar, so `0000-13-40`
/// passes through. No values, or an empty first value, give an empty string.
pub fn fix_date(values: &[String]) -> String {
  let Some(first) = values.first().filter(|value| !value.is_empty()) else {
    return String::new();
  };

  let mut parts = first.split('-');
  let year = parts.next().unwrap_or_default();
  let month = parts.next().unwrap_or("01");
  let day = parts.next().unwrap_or("01");
  format!("{year}-{month:0>2}-{day:0>2}")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn strings(values: &[&str]) -> Vec<String> { values.iter().map(|v| v.to_string()).collect() }

  fn header(deleted: bool) -> RecordHeader {
    RecordHeader {
      identifier: "oai:narcis.nl:1".to_string(),
      datestamp: Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap(),
      deleted,
    }
  }

  #[test]
  fn test_join_values() {
    assert_eq!(join_values(&[]), "");
    assert_eq!(join_values(&strings(&["x"])), "x");
    assert_eq!(join_values(&strings(&["x", "y"])), "\"x\",\"y\"");
    assert_eq!(join_values(&strings(&["a", "b", "c"])), "\"a\",\"b\",\"c\"");
  }

  #[test]
  fn test_fix_date() {
    assert_eq!(fix_date(&strings(&["2020"])), "2020-01-01");
    assert_eq!(fix_date(&strings(&["2020-03"])), "2020-03-01");
    assert_eq!(fix_date(&strings(&["2020-3-4"])), "2020-03-04");
    assert_eq!(fix_date(&[]), "");
    assert_eq!(fix_date(&strings(&[""])), "");
    assert_eq!(fix_date(&strings(&["0000-13-40"])), "0000-13-40");
    assert_eq!(fix_date(&strings(&["2019-12-31", "2020"])), "2019-12-31");
  }

  #[test]
  fn test_extract_doi_takes_last_match() {
    let ids = strings(&["10.1000/first", "https://hdl.handle.net/1", "10.1000/second", "urn:x"]);
    assert_eq!(extract_doi("oai:1", &ids), "10.1000/second");
    assert_eq!(extract_doi("oai:1", &strings(&["urn:nbn:1", "http://x/10.1"])), "");
  }

  #[traced_test]
  #[test]
  fn test_extract_doi_truncates_long_values() {
    let long = format!("10.{}", "a".repeat(297));
    assert_eq!(long.chars().count(), 300);

    let doi = extract_doi("oai:long", &[long.clone()]);
    assert_eq!(doi.chars().count(), MAX_DOI_LEN);
    assert!(long.starts_with(&doi));
    assert!(logs_contain("truncating"));
  }

  #[test]
  fn test_extract_doi_truncates_on_char_boundary() {
    let long = format!("10.{}", "é".repeat(300));
    let doi = extract_doi("oai:utf8", &[long]);
    assert_eq!(doi.chars().count(), MAX_DOI_LEN);
  }

  #[test]
  fn test_normalize_live_record() {
    let metadata = Metadata::new()
      .with(DcField::Identifier, ["https://repo/1", "10.1234/abc"])
      .with(DcField::Type, ["info:eu-repo/semantics/article", "info:eu-repo/semantics/other"])
      .with(DcField::Date, ["2021-5"])
      .with(DcField::Creator, ["Doe, J.", "Roe, R."])
      .with(DcField::Title, ["Only title"])
      .with(DcField::IsPartOf, ["Journal"]);
    let flat = normalize(&RawRecord::new(header(false), Some(metadata)));

    assert!(!flat.deleted);
    assert_eq!(flat.identifier, "oai:narcis.nl:1");
    assert_eq!(flat.doi, "10.1234/abc");
    assert_eq!(flat.record_type, "info:eu-repo/semantics/article");
    assert_eq!(flat.identifiers, "\"https://repo/1\",\"10.1234/abc\"");
    assert_eq!(flat.date, "2021-05-01");
    assert_eq!(flat.creator, "\"Doe, J.\",\"Roe, R.\"");
    assert_eq!(flat.title, "Only title");
    assert_eq!(flat.partof, "Journal");
    assert_eq!(flat.source, "");
    assert_eq!(flat.rights, "");
  }

  #[test]
  fn test_normalize_missing_fields() {
    let flat = normalize(&RawRecord::new(header(false), Some(Metadata::new())));
    assert!(!flat.deleted);
    assert_eq!(flat.doi, "");
    assert_eq!(flat.record_type, "");
    assert_eq!(flat.date, "");
    assert_eq!(flat.title, "");
  }

  #[test]
  fn test_normalize_deleted_record() {
    let metadata = Metadata::new().with(DcField::Identifier, ["10.1/ignored"]);
    let flat = normalize(&RawRecord::new(header(true), Some(metadata)));

    assert!(flat.deleted);
    assert_eq!(flat.identifier, "oai:narcis.nl:1");
    assert_eq!(flat.datestamp, Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap());
    assert_eq!(flat.doi, "");
    assert_eq!(flat.record_type, "");
    assert_eq!(flat.date, "");
    assert_eq!(flat.identifiers, "");
  }
}
