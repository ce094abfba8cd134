//! Paginated REST collection connector.
//!
//! `connect()` walks the list endpoint page by page until the collection is
//! exhausted or `maxPages` is reached, and keeps every record in memory.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use pimflow_core::{
    infer_schema_from_first, ConnectorError, ConnectorKind, ConnectorResult, FieldMapping, Record,
    RecordSink, Schema, SyncResult,
};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::records::{preview_records, sync_records};
use crate::{parse_config, Connector};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const ID_PLACEHOLDER: &str = "{id}";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestConfig {
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    pub endpoints: EndpointConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub response_mapping: ResponseMapping,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub list: String,
    /// May contain an `{id}` placeholder.
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMapping {
    /// Dot path to the record array, e.g. `data.items`.
    #[serde(default)]
    pub data_path: Option<String>,
}

#[derive(Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum AuthConfig {
    #[default]
    None,
    ApiKey {
        api_key: String,
        #[serde(default = "default_api_key_header")]
        header_name: String,
    },
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        #[serde(default)]
        password: String,
    },
    Oauth2 {
        #[serde(default)]
        client_id: Option<String>,
        #[serde(default)]
        client_secret: Option<String>,
        #[serde(default)]
        token_url: Option<String>,
    },
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::None => f.write_str("None"),
            AuthConfig::ApiKey { header_name, .. } => f
                .debug_struct("ApiKey")
                .field("api_key", &"[REDACTED]")
                .field("header_name", header_name)
                .finish(),
            AuthConfig::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"[REDACTED]")
                .finish(),
            AuthConfig::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            AuthConfig::Oauth2 {
                client_id,
                token_url,
                ..
            } => f
                .debug_struct("Oauth2")
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .field("token_url", token_url)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginationStyle {
    #[default]
    None,
    Offset,
    Page,
    Cursor,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationConfig {
    #[serde(default, rename = "type", alias = "style")]
    pub style: PaginationStyle,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_page_param")]
    pub page_param: String,
    #[serde(default = "default_size_param")]
    pub size_param: String,
    #[serde(default = "default_offset_param")]
    pub offset_param: String,
    #[serde(default = "default_cursor_param")]
    pub cursor_param: String,
    /// Dot path to the next-page cursor in the response body.
    #[serde(default)]
    pub cursor_path: Option<String>,
    /// Dot path to the total record count in the response body.
    #[serde(default)]
    pub total_path: Option<String>,
    #[serde(default = "default_start_page")]
    pub start_page: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_page_size() -> u32 {
    100
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_size_param() -> String {
    "limit".to_string()
}

fn default_offset_param() -> String {
    "offset".to_string()
}

fn default_cursor_param() -> String {
    "cursor".to_string()
}

fn default_start_page() -> u32 {
    1
}

fn default_max_pages() -> u32 {
    100
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            style: PaginationStyle::None,
            page_size: default_page_size(),
            page_param: default_page_param(),
            size_param: default_size_param(),
            offset_param: default_offset_param(),
            cursor_param: default_cursor_param(),
            cursor_path: None,
            total_path: None,
            start_page: default_start_page(),
            max_pages: default_max_pages(),
        }
    }
}

impl PaginationConfig {
    /// Query parameters for the page after `fetched` records and `page_index`
    /// completed requests.
    pub fn params(
        &self,
        page_index: u32,
        fetched: usize,
        cursor: Option<&str>,
    ) -> Vec<(String, String)> {
        let size = (self.size_param.clone(), self.page_size.to_string());
        match self.style {
            PaginationStyle::None => Vec::new(),
            PaginationStyle::Page => vec![
                (self.page_param.clone(), (self.start_page + page_index).to_string()),
                size,
            ],
            PaginationStyle::Offset => vec![(self.offset_param.clone(), fetched.to_string()), size],
            PaginationStyle::Cursor => {
                let mut params = vec![size];
                if let Some(cursor) = cursor {
                    params.push((self.cursor_param.clone(), cursor.to_string()));
                }
                params
            }
        }
    }
}

impl RestConfig {
    /// Reject configurations that cannot work before any request is made.
    pub fn validate(&self) -> ConnectorResult<()> {
        let base = Url::parse(&self.base_url).map_err(|e| {
            ConnectorError::connection(format!("invalid baseUrl '{}': {}", self.base_url, e))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConnectorError::connection(format!(
                "baseUrl must use http or https, got '{}'",
                base.scheme()
            )));
        }
        if self.endpoints.list.trim().is_empty() {
            return Err(ConnectorError::connection("endpoints.list must not be empty"));
        }
        if matches!(self.auth, AuthConfig::Oauth2 { .. }) {
            return Err(ConnectorError::Unsupported("oauth2 authentication".to_string()));
        }
        if self.pagination.style != PaginationStyle::None && self.pagination.page_size == 0 {
            return Err(ConnectorError::connection("pagination.pageSize must be greater than 0"));
        }
        Ok(())
    }

    /// Join an endpoint onto the base URL. Absolute endpoints are used as is.
    pub fn url(&self, endpoint: &str) -> ConnectorResult<Url> {
        let joined = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                endpoint.trim_start_matches('/')
            )
        };
        Url::parse(&joined).map_err(|e| {
            ConnectorError::connection(format!("invalid endpoint URL '{}': {}", joined, e))
        })
    }

    /// Resolve a detail endpoint template for `id`.
    ///
    /// The id is escaped as a single path segment (or as a query value when
    /// the placeholder sits in the query), so `/`, `?` and `#` in ids stay
    /// inside the id.
    pub fn detail_url(&self, template: &str, id: &str) -> ConnectorResult<Url> {
        let Some((head, tail)) = template.split_once(ID_PLACEHOLDER) else {
            return self.url(template);
        };
        if head.contains('?') {
            let encoded: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
            return self.url(&format!("{}{}{}", head, encoded, tail));
        }

        let (tail_path, query) = match tail.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (tail, None),
        };
        let mut url = self.url(head.trim_end_matches('/'))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ConnectorError::connection(format!("detail URL '{}' cannot take a path", template))
            })?;
            segments.pop_if_empty().push(id);
            segments.extend(tail_path.split('/').filter(|s| !s.is_empty()));
        }
        if query.is_some() {
            url.set_query(query);
        }
        Ok(url)
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Turn a dot path into a JSON pointer.
fn json_pointer(path: &str) -> String {
    path.split('.')
        .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
        .collect()
}

fn lookup<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    body.pointer(&json_pointer(path))
}

/// Pull the record list out of a response body.
///
/// Without a data path the body itself is the list (or a single record).
pub fn extract_items(body: &Value, data_path: Option<&str>) -> Vec<Value> {
    let target = match data_path.filter(|p| !p.is_empty()) {
        Some(path) => match lookup(body, path) {
            Some(value) => value,
            None => {
                warn!("dataPath '{}' not found in response", path);
                return Vec::new();
            }
        },
        None => body,
    };
    match target {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn into_record(item: Value) -> Record {
    match item {
        Value::Object(map) => map,
        other => {
            let mut record = Record::new();
            record.insert("value".to_string(), other);
            record
        }
    }
}

fn next_cursor(body: &Value, cursor_path: Option<&str>) -> Option<String> {
    match lookup(body, cursor_path?)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn total_count(body: &Value, total_path: Option<&str>) -> Option<u64> {
    let value = lookup(body, total_path?)?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn base64_encode(data: impl AsRef<[u8]>) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD.encode(data)
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

pub struct RestConnector {
    id: String,
    name: String,
    config: Option<RestConfig>,
    client: Option<Client>,
    records: Vec<Record>,
    connected: bool,
}

impl RestConnector {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            config: None,
            client: None,
            records: Vec::new(),
            connected: false,
        }
    }

    fn session(&self) -> ConnectorResult<(&RestConfig, &Client)> {
        match (&self.config, &self.client) {
            (Some(config), Some(client)) => Ok((config, client)),
            _ => Err(ConnectorError::NotConnected(self.name.clone())),
        }
    }

    fn authorize(config: &RestConfig, mut request: RequestBuilder) -> RequestBuilder {
        for (name, value) in &config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        match &config.auth {
            AuthConfig::None | AuthConfig::Oauth2 { .. } => request,
            AuthConfig::ApiKey {
                api_key,
                header_name,
            } => request.header(header_name.as_str(), api_key.as_str()),
            AuthConfig::Bearer { token } => {
                request.header(AUTHORIZATION, format!("Bearer {}", token))
            }
            AuthConfig::Basic { username, password } => request.header(
                AUTHORIZATION,
                format!("Basic {}", base64_encode(format!("{}:{}", username, password))),
            ),
        }
    }

    /// GET one URL and decode the JSON body. Non-2xx statuses become
    /// [`ConnectorError::Http`].
    async fn get_json(&self, url: Url, params: &[(String, String)]) -> ConnectorResult<Value> {
        let (config, client) = self.session()?;
        debug!("GET {} {:?}", url, params);

        let request = Self::authorize(config, client.get(url.clone()).query(params));
        let response = request
            .send()
            .await
            .map_err(|e| ConnectorError::connection(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("{} answered {}: {}", url, status, body);
            return Err(ConnectorError::Http {
                status: status.as_u16(),
                text: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ConnectorError::connection(format!("invalid JSON from {}: {}", url, e)))
    }

    /// Fetch one page of the list endpoint.
    pub async fn fetch_page(
        &self,
        page_index: u32,
        fetched: usize,
        cursor: Option<&str>,
    ) -> ConnectorResult<Value> {
        let (config, _) = self.session()?;
        let url = config.url(&config.endpoints.list)?;
        let params = config.pagination.params(page_index, fetched, cursor);
        self.get_json(url, &params).await
    }

    /// Walk every page of the list endpoint.
    pub async fn fetch_all(&self) -> ConnectorResult<Vec<Record>> {
        let (config, _) = self.session()?;
        let pagination = &config.pagination;
        let data_path = config.response_mapping.data_path.as_deref();

        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page_index = 0u32;

        loop {
            let body = self.fetch_page(page_index, records.len(), cursor.as_deref()).await?;
            let items = extract_items(&body, data_path);
            let count = items.len();
            records.extend(items.into_iter().map(into_record));
            page_index += 1;

            if pagination.style == PaginationStyle::None || count == 0 {
                break;
            }
            if page_index >= pagination.max_pages {
                warn!(
                    "RestConnector '{}': stopped after maxPages={} with {} records",
                    self.name, pagination.max_pages, records.len()
                );
                break;
            }
            if let Some(total) = total_count(&body, pagination.total_path.as_deref()) {
                if records.len() as u64 >= total {
                    break;
                }
            }
            match pagination.style {
                PaginationStyle::Cursor => {
                    cursor = next_cursor(&body, pagination.cursor_path.as_deref());
                    if cursor.is_none() {
                        break;
                    }
                }
                _ => {
                    if count < pagination.page_size as usize {
                        break;
                    }
                }
            }
        }

        debug!("RestConnector '{}': fetched {} pages", self.name, page_index);
        Ok(records)
    }

    /// Fetch a single record through `endpoints.detail`.
    pub async fn fetch_one(&self, id: &str) -> ConnectorResult<Record> {
        self.ensure_connected()?;
        let (config, _) = self.session()?;
        let template = config.endpoints.detail.as_deref().ok_or_else(|| {
            ConnectorError::connection(format!("connector '{}' has no detail endpoint", self.name))
        })?;
        let url = config.detail_url(template, id)?;
        let body = self.get_json(url, &[]).await?;
        Ok(into_record(body))
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl Connector for RestConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Rest
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self, config: &Value) -> ConnectorResult<()> {
        self.connected = false;
        self.records.clear();

        let config: RestConfig = parse_config(ConnectorKind::Rest, config)?;
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                ConnectorError::connection(format!("failed to build HTTP client: {}", e))
            })?;

        info!(
            "RestConnector '{}': connecting to {} (auth: {:?}, pagination: {:?})",
            self.name, config.base_url, config.auth, config.pagination.style
        );
        self.config = Some(config);
        self.client = Some(client);

        let records = self.fetch_all().await?;
        info!("RestConnector '{}': loaded {} records", self.name, records.len());

        self.records = records;
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.records.clear();
        self.client = None;
        self.connected = false;
    }

    async fn test_connection(&self) -> bool {
        match self.fetch_page(0, 0, None).await {
            Ok(_) => true,
            Err(e) => {
                debug!("RestConnector '{}': test failed: {}", self.name, e);
                false
            }
        }
    }

    async fn get_schema(&self) -> ConnectorResult<Schema> {
        self.ensure_connected()?;
        Ok(infer_schema_from_first(&self.records))
    }

    async fn preview(&self, limit: usize) -> ConnectorResult<Vec<Record>> {
        self.ensure_connected()?;
        Ok(preview_records(&self.records, limit))
    }

    async fn sync_into(
        &self,
        mapping: &[FieldMapping],
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<SyncResult> {
        self.ensure_connected()?;
        Ok(sync_records(&self.name, &self.records, mapping, sink))
    }
}
