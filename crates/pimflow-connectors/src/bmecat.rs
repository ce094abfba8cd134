//! BMEcat catalog connector.
//!
//! Streams the XML with `quick-xml` and collects, per product block, the
//! first non-empty value of each tag plus the repeating FEATURE, price and
//! MIME groups. Parsing never fails: a malformed document yields whatever
//! was complete before the damage. Both BMEcat 2005 (`PRODUCT` /
//! `SUPPLIER_PID`) and 1.2 (`ARTICLE` / `SUPPLIER_AID`) layouts are read.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use pimflow_core::{
    infer_schema_from_first, ConnectorError, ConnectorKind, ConnectorResult, FieldMapping, Record,
    RecordSink, Schema, SyncResult,
};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};
use tracing::{info, warn};

use crate::records::{preview_records, sync_records};
use crate::{parse_config, Connector};

const DEFAULT_CURRENCY: &str = "EUR";
const DEFAULT_MIME_TYPE: &str = "image/jpeg";
const PRICE_TYPE: &str = "net";

/// Product-level tags and the record keys they land in.
const PRODUCT_FIELDS: &[(&str, &str)] = &[
    ("DESCRIPTION_SHORT", "description_short"),
    ("DESCRIPTION_LONG", "description_long"),
    ("EAN", "ean"),
    ("MANUFACTURER_PID", "manufacturer_pid"),
    ("MANUFACTURER_AID", "manufacturer_pid"),
    ("MANUFACTURER_NAME", "manufacturer_name"),
    ("ORDER_UNIT", "order_unit"),
    ("CONTENT_UNIT", "content_unit"),
    ("DELIVERY_TIME", "delivery_time"),
];

/// Catalog-level header values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_name: Option<String>,
}

#[derive(Debug, Default)]
pub struct ParsedCatalog {
    pub info: CatalogInfo,
    pub products: Vec<Record>,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// First-match tag values of one element scope.
#[derive(Debug, Default)]
struct TagValues(HashMap<String, String>);

impl TagValues {
    fn set(&mut self, tag: &str, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.0.entry(tag.to_string()).or_insert_with(|| text.to_string());
        }
    }

    fn get(&self, tag: &str) -> Option<&str> {
        self.0.get(tag).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    Feature,
    Price,
    Mime,
}

impl GroupKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "FEATURE" => Some(GroupKind::Feature),
            "PRODUCT_PRICE" | "ARTICLE_PRICE" => Some(GroupKind::Price),
            "MIME" => Some(GroupKind::Mime),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct ProductBuilder {
    tag: String,
    fields: TagValues,
    features: Vec<TagValues>,
    prices: Vec<TagValues>,
    mimes: Vec<TagValues>,
    open_group: Option<(GroupKind, TagValues)>,
}

impl ProductBuilder {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            fields: TagValues::default(),
            features: Vec::new(),
            prices: Vec::new(),
            mimes: Vec::new(),
            open_group: None,
        }
    }

    fn open(&mut self, kind: GroupKind) {
        self.close_group();
        self.open_group = Some((kind, TagValues::default()));
    }

    fn close_group(&mut self) {
        if let Some((kind, values)) = self.open_group.take() {
            match kind {
                GroupKind::Feature => self.features.push(values),
                GroupKind::Price => self.prices.push(values),
                GroupKind::Mime => self.mimes.push(values),
            }
        }
    }

    fn set(&mut self, tag: &str, text: &str) {
        match &mut self.open_group {
            Some((_, values)) => values.set(tag, text),
            None => self.fields.set(tag, text),
        }
    }

    /// `None` when the block has no supplier id.
    fn finish(mut self) -> Option<Record> {
        self.close_group();
        let id_tag = if self.tag == "ARTICLE" { "SUPPLIER_AID" } else { "SUPPLIER_PID" };
        let supplier_pid = self.fields.get(id_tag)?;

        let mut record = Record::new();
        record.insert("supplier_pid".to_string(), json!(supplier_pid));
        for (tag, key) in PRODUCT_FIELDS {
            if let Some(value) = self.fields.get(tag) {
                record.entry(key.to_string()).or_insert_with(|| json!(value));
            }
        }

        let features = self
            .features
            .iter()
            .map(|f| {
                let mut feature = Record::new();
                insert_opt(&mut feature, "name", f.get("FNAME"));
                insert_opt(&mut feature, "value", f.get("FVALUE"));
                insert_opt(&mut feature, "unit", f.get("FUNIT"));
                Value::Object(feature)
            })
            .collect();

        let prices = self
            .prices
            .iter()
            .map(|p| {
                let mut price = Record::new();
                if let Some(amount) = p.get("PRICE_AMOUNT") {
                    price.insert("amount".to_string(), parse_amount(amount));
                }
                price.insert(
                    "currency".to_string(),
                    json!(p.get("PRICE_CURRENCY").unwrap_or(DEFAULT_CURRENCY)),
                );
                price.insert("type".to_string(), json!(PRICE_TYPE));
                Value::Object(price)
            })
            .collect();

        let mimes = self
            .mimes
            .iter()
            .map(|m| {
                let mut mime = Record::new();
                mime.insert(
                    "type".to_string(),
                    json!(m.get("MIME_TYPE").unwrap_or(DEFAULT_MIME_TYPE)),
                );
                insert_opt(&mut mime, "source", m.get("MIME_SOURCE"));
                insert_opt(&mut mime, "description", m.get("MIME_DESCR"));
                Value::Object(mime)
            })
            .collect();

        record.insert("features".to_string(), Value::Array(features));
        record.insert("prices".to_string(), Value::Array(prices));
        record.insert("mimes".to_string(), Value::Array(mimes));
        Some(record)
    }
}

fn insert_opt(record: &mut Record, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        record.insert(key.to_string(), json!(value));
    }
}

fn parse_amount(text: &str) -> Value {
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| json!(text))
}

/// Byte offset of the next `<PRODUCT` or `<ARTICLE` start tag at or after `from`.
fn next_product_start(xml: &str, from: usize) -> Option<usize> {
    let bytes = xml.as_bytes();
    let mut at = from;
    while at < bytes.len() {
        let start = at + bytes[at..].iter().position(|b| *b == b'<')?;
        let rest = &bytes[start + 1..];
        for tag in [b"PRODUCT".as_slice(), b"ARTICLE".as_slice()] {
            if rest.starts_with(tag)
                && matches!(rest.get(tag.len()), Some(b' ' | b'\t' | b'\r' | b'\n' | b'>'))
            {
                return Some(start);
            }
        }
        at = start + 1;
    }
    None
}

/// Parse state that survives restarts after a syntax error.
#[derive(Debug, Default)]
struct CatalogParser {
    header: TagValues,
    products: Vec<Record>,
    current: Option<ProductBuilder>,
    /// Byte offset of the open product's start tag.
    current_start: usize,
    dropped: usize,
}

impl CatalogParser {
    /// Parse `xml[base..]` to the end. On a syntax error, returns the offset
    /// of the markup being read (or of the open product) with the error.
    fn run(&mut self, xml: &str, base: usize) -> Result<(), (usize, quick_xml::Error)> {
        let mut reader = Reader::from_str(&xml[base..]);
        let config = reader.config_mut();
        config.trim_text(true);
        config.check_end_names = false;

        let mut text = String::new();
        loop {
            let before = base + reader.buffer_position() as usize;
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    text.clear();
                    if let Some(product) = self.current.as_mut() {
                        if let Some(kind) = GroupKind::from_tag(&tag) {
                            product.open(kind);
                        }
                    } else if tag == "PRODUCT" || tag == "ARTICLE" {
                        self.current = Some(ProductBuilder::new(&tag));
                        self.current_start = xml[before..].find('<').map_or(before, |i| before + i);
                    }
                }
                Ok(Event::Text(e)) => match e.unescape() {
                    Ok(t) => text.push_str(&t),
                    Err(_) => text.push_str(&String::from_utf8_lossy(&e)),
                },
                Ok(Event::CData(e)) => text.push_str(&String::from_utf8_lossy(&e.into_inner())),
                Ok(Event::End(e)) => {
                    let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    let closes_product = self.current.as_ref().is_some_and(|p| p.tag == tag);
                    if closes_product {
                        self.close_product();
                    } else if let Some(product) = self.current.as_mut() {
                        if GroupKind::from_tag(&tag).is_some() {
                            product.close_group();
                        } else {
                            product.set(&tag, &text);
                        }
                    } else {
                        self.header.set(&tag, &text);
                    }
                    text.clear();
                }
                Ok(Event::Eof) => return Ok(()),
                Err(e) => {
                    let at = match self.current {
                        Some(_) => self.current_start,
                        None => before,
                    };
                    return Err((at, e));
                }
                _ => {}
            }
        }
    }

    fn close_product(&mut self) {
        if let Some(product) = self.current.take() {
            match product.finish() {
                Some(record) => self.products.push(record),
                None => self.dropped += 1,
            }
        }
    }
}

/// Parse a catalog document. Products without a supplier id are dropped.
///
/// A syntax error closes the product being read with whatever it had so far;
/// parsing resumes at the next product start tag after the damage.
pub fn parse_catalog(xml: &str) -> ParsedCatalog {
    let mut parser = CatalogParser::default();
    let mut base = 0;

    while let Err((damaged, e)) = parser.run(xml, base) {
        warn!("BMEcat syntax error near byte {}: {}", damaged, e);
        parser.close_product();
        match next_product_start(xml, damaged + 1) {
            Some(next) => base = next,
            None => break,
        }
    }

    if parser.dropped > 0 {
        info!("Dropped {} product blocks without a supplier id", parser.dropped);
    }

    let header = &parser.header;
    ParsedCatalog {
        info: CatalogInfo {
            catalog_id: header.get("CATALOG_ID").map(str::to_string),
            catalog_version: header.get("CATALOG_VERSION").map(str::to_string),
            catalog_name: header.get("CATALOG_NAME").map(str::to_string),
            supplier_name: header.get("SUPPLIER_NAME").map(str::to_string),
        },
        products: parser.products,
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BmecatConfig {
    pub file_path: PathBuf,
}

pub struct BmecatConnector {
    id: String,
    name: String,
    config: Option<BmecatConfig>,
    catalog: ParsedCatalog,
    connected: bool,
}

impl BmecatConnector {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            config: None,
            catalog: ParsedCatalog::default(),
            connected: false,
        }
    }

    pub fn catalog_info(&self) -> ConnectorResult<&CatalogInfo> {
        self.ensure_connected()?;
        Ok(&self.catalog.info)
    }

    pub fn product_count(&self) -> usize {
        self.catalog.products.len()
    }
}

#[async_trait]
impl Connector for BmecatConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Bmecat
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self, config: &Value) -> ConnectorResult<()> {
        self.connected = false;
        let config: BmecatConfig = parse_config(ConnectorKind::Bmecat, config)?;
        self.config = Some(config.clone());

        let path = config.file_path.display();
        let data = tokio::fs::read(&config.file_path)
            .await
            .map_err(|e| ConnectorError::connection(format!("failed to read {}: {}", path, e)))?;
        let xml = String::from_utf8_lossy(&data);
        let catalog = parse_catalog(&xml);

        info!(
            "BmecatConnector '{}': loaded {} products from catalog {:?} ({})",
            self.name,
            catalog.products.len(),
            catalog.info.catalog_id,
            path
        );

        self.catalog = catalog;
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.catalog = ParsedCatalog::default();
        self.connected = false;
    }

    async fn test_connection(&self) -> bool {
        match &self.config {
            Some(config) => tokio::fs::metadata(&config.file_path)
                .await
                .is_ok_and(|m| m.is_file()),
            None => false,
        }
    }

    async fn get_schema(&self) -> ConnectorResult<Schema> {
        self.ensure_connected()?;
        Ok(infer_schema_from_first(&self.catalog.products))
    }

    async fn preview(&self, limit: usize) -> ConnectorResult<Vec<Record>> {
        self.ensure_connected()?;
        Ok(preview_records(&self.catalog.products, limit))
    }

    async fn sync_into(
        &self,
        mapping: &[FieldMapping],
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<SyncResult> {
        self.ensure_connected()?;
        Ok(sync_records(&self.name, &self.catalog.products, mapping, sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pimflow_core::FieldType;

    const CATALOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<BMECAT version="2005">
  <HEADER>
    <CATALOG>
      <LANGUAGE>deu</LANGUAGE>
      <CATALOG_ID>CAT-42</CATALOG_ID>
      <CATALOG_VERSION>1.3</CATALOG_VERSION>
      <CATALOG_NAME>Spring &amp; Summer</CATALOG_NAME>
    </CATALOG>
    <SUPPLIER>
      <SUPPLIER_NAME>ACME GmbH</SUPPLIER_NAME>
    </SUPPLIER>
  </HEADER>
  <T_NEW_CATALOG>
    <PRODUCT mode="new">
      <SUPPLIER_PID>P-100</SUPPLIER_PID>
      <PRODUCT_DETAILS>
        <DESCRIPTION_SHORT>Cordless drill</DESCRIPTION_SHORT>
        <DESCRIPTION_SHORT>Ignored second match</DESCRIPTION_SHORT>
        <DESCRIPTION_LONG><![CDATA[18V <b>brushless</b>]]></DESCRIPTION_LONG>
        <EAN></EAN>
        <MANUFACTURER_NAME>Bosch</MANUFACTURER_NAME>
      </PRODUCT_DETAILS>
      <PRODUCT_FEATURES>
        <FEATURE><FNAME>Voltage</FNAME><FVALUE>18</FVALUE><FUNIT>V</FUNIT></FEATURE>
        <FEATURE><FNAME>Colour</FNAME><FVALUE>blue</FVALUE></FEATURE>
      </PRODUCT_FEATURES>
      <PRODUCT_ORDER_DETAILS><ORDER_UNIT>C62</ORDER_UNIT></PRODUCT_ORDER_DETAILS>
      <PRODUCT_PRICE_DETAILS>
        <PRODUCT_PRICE price_type="net_list">
          <PRICE_AMOUNT>129.90</PRICE_AMOUNT>
          <PRICE_CURRENCY>CHF</PRICE_CURRENCY>
        </PRODUCT_PRICE>
        <PRODUCT_PRICE price_type="net_customer">
          <PRICE_AMOUNT>119.00</PRICE_AMOUNT>
        </PRODUCT_PRICE>
      </PRODUCT_PRICE_DETAILS>
      <MIME_INFO>
        <MIME><MIME_SOURCE>drill.jpg</MIME_SOURCE><MIME_DESCR>Front</MIME_DESCR></MIME>
        <MIME><MIME_TYPE>application/pdf</MIME_TYPE><MIME_SOURCE>manual.pdf</MIME_SOURCE></MIME>
      </MIME_INFO>
    </PRODUCT>
    <PRODUCT mode="new">
      <PRODUCT_DETAILS><DESCRIPTION_SHORT>No id, dropped</DESCRIPTION_SHORT></PRODUCT_DETAILS>
    </PRODUCT>
    <PRODUCT mode="new">
      <SUPPLIER_PID>   </SUPPLIER_PID>
    </PRODUCT>
    <PRODUCT mode="new">
      <SUPPLIER_PID>P-200</SUPPLIER_PID>
    </PRODUCT>
  </T_NEW_CATALOG>
</BMECAT>"#;

    #[test]
    fn test_parse_catalog_header() {
        let parsed = parse_catalog(CATALOG);
        assert_eq!(
            parsed.info,
            CatalogInfo {
                catalog_id: Some("CAT-42".to_string()),
                catalog_version: Some("1.3".to_string()),
                catalog_name: Some("Spring & Summer".to_string()),
                supplier_name: Some("ACME GmbH".to_string()),
            }
        );
    }

    #[test]
    fn test_products_without_pid_are_dropped() {
        let parsed = parse_catalog(CATALOG);
        let ids: Vec<&str> = parsed
            .products
            .iter()
            .map(|p| p["supplier_pid"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["P-100", "P-200"]);
    }

    #[test]
    fn test_product_fields_first_match_and_missing() {
        let parsed = parse_catalog(CATALOG);
        let product = &parsed.products[0];
        assert_eq!(product["description_short"], "Cordless drill");
        assert_eq!(product["description_long"], "18V <b>brushless</b>");
        assert_eq!(product["manufacturer_name"], "Bosch");
        assert_eq!(product["order_unit"], "C62");
        assert!(product.get("ean").is_none(), "empty tag is absent, not empty");
    }

    #[test]
    fn test_repeating_groups() {
        let parsed = parse_catalog(CATALOG);
        let product = &parsed.products[0];

        assert_eq!(
            product["features"],
            json!([
                { "name": "Voltage", "value": "18", "unit": "V" },
                { "name": "Colour", "value": "blue" }
            ])
        );
        assert_eq!(
            product["prices"],
            json!([
                { "amount": 129.9, "currency": "CHF", "type": "net" },
                { "amount": 119.0, "currency": "EUR", "type": "net" }
            ])
        );
        assert_eq!(
            product["mimes"],
            json!([
                { "type": "image/jpeg", "source": "drill.jpg", "description": "Front" },
                { "type": "application/pdf", "source": "manual.pdf" }
            ])
        );

        let bare = &parsed.products[1];
        assert_eq!(bare["features"], json!([]));
    }

    #[test]
    fn test_bmecat_12_articles() {
        let xml = r#"<BMECAT version="1.2"><T_NEW_CATALOG>
            <ARTICLE><SUPPLIER_AID>A-1</SUPPLIER_AID>
              <ARTICLE_DETAILS>
                <DESCRIPTION_SHORT>Screw</DESCRIPTION_SHORT>
                <MANUFACTURER_AID>M-9</MANUFACTURER_AID>
              </ARTICLE_DETAILS>
              <ARTICLE_PRICE_DETAILS>
                <ARTICLE_PRICE price_type="net_list">
                  <PRICE_AMOUNT>0.05</PRICE_AMOUNT>
                </ARTICLE_PRICE>
              </ARTICLE_PRICE_DETAILS>
            </ARTICLE>
        </T_NEW_CATALOG></BMECAT>"#;
        let parsed = parse_catalog(xml);
        assert_eq!(parsed.products.len(), 1);
        assert_eq!(parsed.products[0]["supplier_pid"], "A-1");
        assert_eq!(parsed.products[0]["manufacturer_pid"], "M-9");
        assert_eq!(parsed.products[0]["prices"][0]["amount"], json!(0.05));
    }

    #[test]
    fn test_malformed_input_does_not_panic() {
        let xml = "<BMECAT><HEADER><CATALOG><CATALOG_ID>X</CATALOG_ID></CATALOG></HEADER>\
                   <T_NEW_CATALOG><PRODUCT><SUPPLIER_PID>OK-1</SUPPLIER_PID></PRODUCT>\
                   <PRODUCT><SUPPLIER_PID>CUT-2</SUPPLIER_PID><DESCRIPTION_SHORT>trunc";
        let parsed = parse_catalog(xml);
        assert_eq!(parsed.info.catalog_id.as_deref(), Some("X"));
        assert_eq!(parsed.products.len(), 1);
        assert_eq!(parsed.products[0]["supplier_pid"], "OK-1");

        let garbage = parse_catalog("not xml at all <<<>>>");
        assert!(garbage.products.is_empty());
    }

    #[test]
    fn test_damaged_product_does_not_hide_later_products() {
        let damage = [
            "<!-- never closed",
            "<!BOGUS>",
            "<![CDATA[ never closed",
            "<?pi never closed",
            "<FNAME broken=\"quote>",
        ];
        for bad in damage {
            let xml = format!(
                "<BMECAT><T_NEW_CATALOG>\
                 <PRODUCT mode=\"new\"><SUPPLIER_PID>A</SUPPLIER_PID>{bad}</PRODUCT>\
                 <PRODUCT><SUPPLIER_PID>B</SUPPLIER_PID>\
                 <PRODUCT_DETAILS><DESCRIPTION_SHORT>Bee</DESCRIPTION_SHORT></PRODUCT_DETAILS>\
                 </PRODUCT></T_NEW_CATALOG></BMECAT>"
            );
            let parsed = parse_catalog(&xml);
            let last = parsed.products.last().unwrap_or_else(|| panic!("no products for {bad}"));
            assert_eq!(last["supplier_pid"], "B", "damage: {bad}");
            assert_eq!(last["description_short"], "Bee", "damage: {bad}");
        }
    }

    #[test]
    fn test_next_product_start() {
        let xml = "<X><PRODUCTS/><ARTICLE_DETAILS/><PRODUCT>a</PRODUCT><ARTICLE mode=\"x\">";
        let first = next_product_start(xml, 0).unwrap();
        assert!(xml[first..].starts_with("<PRODUCT>"));
        let second = next_product_start(xml, first + 1).unwrap();
        assert!(xml[second..].starts_with("<ARTICLE "));
        assert_eq!(next_product_start(xml, second + 1), None);
    }

    #[tokio::test]
    async fn test_connector_preview_schema_and_sync() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("catalog.xml");
        std::fs::write(&path, CATALOG).unwrap();

        let mut connector = BmecatConnector::new("b1", "Supplier feed");
        assert!(connector.catalog_info().is_err());
        connector.connect(&json!({ "filePath": path })).await.unwrap();

        assert_eq!(connector.catalog_info().unwrap().catalog_id.as_deref(), Some("CAT-42"));
        assert_eq!(connector.preview(1).await.unwrap().len(), 1);
        assert_eq!(connector.preview(10).await.unwrap().len(), 2);

        let schema = connector.get_schema().await.unwrap();
        assert_eq!(schema.field("supplier_pid").unwrap().field_type, FieldType::String);
        assert_eq!(schema.field("features").unwrap().field_type, FieldType::Array);

        let mapping = vec![
            FieldMapping::new("supplier_pid", "sku"),
            FieldMapping::new("prices.0.amount", "price"),
        ];
        let mut out: Vec<Record> = Vec::new();
        let result = connector.sync_into(&mapping, &mut out).await.unwrap();
        assert!(result.success);
        assert_eq!(result.records_processed, 2);
        assert_eq!(out[0]["price"], json!(129.9));
        assert_eq!(out[1]["price"], Value::Null);
    }
}
