//! Record source backed by an OAI-PMH repository.
//!
//! Issues `ListRecords` requests for `oai_dc` metadata and follows resumption
//! tokens. Responses are parsed with `quick-xml`'s serde support; the
//! `oai_dc:`/`dc:` element prefixes are stripped first so the Dublin Core
//! elements deserialize by their local names.
//!
//! The default endpoint is the NARCIS repository (`http://oai.narcis.nl/oai`).
//!
//! # Examples
//!
//! ```
//! use harvester::source::oai::parse_list_records;
//!
//! let xml = r#"<OAI-PMH><error code="noRecordsMatch">nothing here</error></OAI-PMH>"#;
//! assert!(parse_list_records(xml).unwrap_err().is_no_records_match());
//! ```

use std::time::Duration as StdDuration;

use quick_xml::de::from_str;
use url::Url;

use super::*;

/// OAI-PMH error code for an empty result.
const NO_RECORDS_MATCH: &str = "noRecordsMatch";

/// Header status marking a delete marker.
const STATUS_DELETED: &str = "deleted";

/// Root of an OAI-PMH response.
#[derive(Debug, Deserialize)]
#[serde(rename = "OAI-PMH")]
struct OaiPmhResponse {
  /// Present on successful `ListRecords` responses
  #[serde(rename = "ListRecords")]
  list_records: Option<ListRecords>,
  /// Error details, if the request failed
  #[serde(rename = "error", default)]
  errors:       Vec<OaiError>,
}

/// Error information from the OAI-PMH response.
#[derive(Debug, Deserialize)]
struct OaiError {
  /// Standard OAI-PMH error code
  #[serde(rename = "@code")]
  code:    String,
  /// Human-readable error message
  #[serde(rename = "$text", default)]
  message: String,
}

/// The `ListRecords` element.
#[derive(Debug, Deserialize)]
struct ListRecords {
  /// Records on this page
  #[serde(rename = "record", default)]
  records:          Vec<Record>,
  /// Flow control for the next page
  #[serde(rename = "resumptionToken")]
  resumption_token: Option<ResumptionToken>,
}

/// The `resumptionToken` element; empty on the last page.
#[derive(Debug, Deserialize)]
struct ResumptionToken {
  /// Token text
  #[serde(rename = "$text", default)]
  value: Option<String>,
}

/// One `record` element.
#[derive(Debug, Deserialize)]
struct Record {
  /// Record header
  header:   Header,
  /// Dublin Core payload; absent for delete markers
  metadata: Option<MetadataElement>,
}

/// The `header` element.
#[derive(Debug, Deserialize)]
struct Header {
  /// `deleted` for delete markers
  #[serde(rename = "@status")]
  status:     Option<String>,
  /// OAI identifier
  identifier: String,
  /// Modification datestamp
  datestamp:  String,
}

/// The `metadata` element.
#[derive(Debug, Deserialize)]
struct MetadataElement {
  /// The `oai_dc:dc` container
  dc: DublinCore,
}

/// Dublin Core elements of one record, every element repeatable.
#[derive(Debug, Default, Deserialize)]
struct DublinCore {
  /// `dc:title`
  #[serde(default)]
  title:       Vec<String>,
  /// `dc:creator`
  #[serde(default)]
  creator:     Vec<String>,
  /// `dc:subject`
  #[serde(default)]
  subject:     Vec<String>,
  /// `dc:description`
  #[serde(default)]
  description: Vec<String>,
  /// `dc:publisher`
  #[serde(default)]
  publisher:   Vec<String>,
  /// `dc:contributor`
  #[serde(default)]
  contributor: Vec<String>,
  /// `dc:date`
  #[serde(default)]
  date:        Vec<String>,
  /// `dc:type`
  #[serde(default, rename = "type")]
  kind:        Vec<String>,
  /// `dc:format`
  #[serde(default)]
  format:      Vec<String>,
  /// `dc:identifier`
  #[serde(default)]
  identifier:  Vec<String>,
  /// `dc:source`
  #[serde(default)]
  source:      Vec<String>,
  /// `dc:language`
  #[serde(default)]
  language:    Vec<String>,
  /// `dc:relation`
  #[serde(default)]
  relation:    Vec<String>,
  /// `dc:coverage`
  #[serde(default)]
  coverage:    Vec<String>,
  /// `dc:rights`
  #[serde(default)]
  rights:      Vec<String>,
  /// `dc:isPartOf`
  #[serde(default, rename = "isPartOf")]
  is_part_of:  Vec<String>,
}

impl From<DublinCore> for Metadata {
  fn from(dc: DublinCore) -> Self {
    [
      (DcField::Title, dc.title),
      (DcField::Creator, dc.creator),
      (DcField::Subject, dc.subject),
      (DcField::Description, dc.description),
      (DcField::Publisher, dc.publisher),
      (DcField::Contributor, dc.contributor),
      (DcField::Date, dc.date),
      (DcField::Type, dc.kind),
      (DcField::Format, dc.format),
      (DcField::Identifier, dc.identifier),
      (DcField::Source, dc.source),
      (DcField::Language, dc.language),
      (DcField::Relation, dc.relation),
      (DcField::Coverage, dc.coverage),
      (DcField::Rights, dc.rights),
      (DcField::IsPartOf, dc.is_part_of),
    ]
    .into_iter()
    .filter(|(_, values)| !values.is_empty())
    .collect()
  }
}

impl TryFrom<Record> for RawRecord {
  type Error = HarvestError;

  fn try_from(record: Record) -> Result<Self, Self::Error> {
    let header = RecordHeader {
      datestamp:  RecordHeader::parse_datestamp(&record.header.datestamp)?,
      identifier: record.header.identifier,
      deleted:    record.header.status.as_deref() == Some(STATUS_DELETED),
    };
    Ok(RawRecord::new(header, record.metadata.map(|m| m.dc.into())))
  }
}

/// Removes the Dublin Core namespace prefixes from element names.
fn strip_dc_prefixes(xml: &str) -> String {
  xml
    .replace("<oai_dc:", "<")
    .replace("</oai_dc:", "</")
    .replace("<dc:", "<")
    .replace("</dc:", "</")
}

/// Parses a `ListRecords` response body into a page.
///
/// An OAI-PMH `noRecordsMatch` error becomes [`HarvestError::NoRecordsMatch`];
/// any other error code becomes [`HarvestError::Oai`].
pub fn parse_list_records(xml: &str) -> Result<RecordPage, HarvestError> {
  let response: OaiPmhResponse =
    from_str(&strip_dc_prefixes(xml)).map_err(|e| HarvestError::Xml(e.to_string()))?;

  if response.errors.iter().any(|error| error.code == NO_RECORDS_MATCH) {
    return Err(HarvestError::NoRecordsMatch);
  }
  if let Some(error) = response.errors.into_iter().next() {
    return Err(HarvestError::Oai { code: error.code, message: error.message.trim().to_string() });
  }

  let list = response
    .list_records
    .ok_or_else(|| HarvestError::Xml("response holds neither ListRecords nor error".into()))?;

  let records = list.records.into_iter().map(RawRecord::try_from).collect::<Result<_, _>>()?;
  let resumption_token = list
    .resumption_token
    .and_then(|token| token.value)
    .map(|token| token.trim().to_string())
    .filter(|token| !token.is_empty());

  Ok(RecordPage { records, resumption_token })
}

/// Client for an OAI-PMH repository.
#[derive(Debug, Clone)]
pub struct OaiClient {
  /// Internal web client used to connect to the repository.
  client:   reqwest::Client,
  /// The repository's base URL.
  base_url: Url,
}

impl OaiClient {
  /// Creates a client for the repository at `base_url` with reqwest's default
  /// settings.
  pub fn new(base_url: &str) -> Result<Self, HarvestError> {
    Ok(Self { client: reqwest::Client::new(), base_url: Url::parse(base_url)? })
  }

  /// Creates a client whose requests give up after `timeout`.
  pub fn with_timeout(base_url: &str, timeout: StdDuration) -> Result<Self, HarvestError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client, base_url: Url::parse(base_url)? })
  }

  /// Creates a client from the `base_url` and `request_timeout_secs` settings.
  pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
    Self::with_timeout(&config.base_url, StdDuration::from_secs(config.request_timeout_secs))
  }

  /// The `ListRecords` URL for `request`.
  pub fn list_records_url(&self, request: &PageRequest<'_>) -> Url {
    let mut url = self.base_url.clone();
    {
      let mut query = url.query_pairs_mut();
      query.append_pair("verb", "ListRecords");
      match request {
        PageRequest::Initial { metadata_prefix, set_spec, window } => {
          query.append_pair("metadataPrefix", metadata_prefix);
          query.append_pair("from", &window.from.format(record::DATESTAMP_FORMAT).to_string());
          query.append_pair("until", &window.until.format(record::DATESTAMP_FORMAT).to_string());
          if let Some(set_spec) = set_spec {
            query.append_pair("set", set_spec);
          }
        },
        PageRequest::Resume { token } => {
          query.append_pair("resumptionToken", token);
        },
      }
    }
    url
  }
}

impl RecordSource for OaiClient {
  async fn fetch_page(&self, request: PageRequest<'_>) -> Result<RecordPage, HarvestError> {
    let url = self.list_records_url(&request);
    debug!("Fetching records via OAI-PMH: {url}");

    let response = self.client.get(url).send().await?;
    let status = response.status();
    let text = response.text().await?;
    trace!("OAI-PMH response: {text}");

    let page = parse_list_records(&text);
    if status.is_success() {
      return page;
    }
    match page {
      Err(e @ (HarvestError::NoRecordsMatch | HarvestError::Oai { .. })) => Err(e),
      _ => Err(HarvestError::Oai {
        code:    status.as_str().to_string(),
        message: status.canonical_reason().unwrap_or("unexpected HTTP status").to_string(),
      }),
    }
  }
}
