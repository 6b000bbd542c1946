//! Backend settings.
//!
//! Settings are a JSON document mapping backend names to their configuration:
//!
//! ```json
//! {
//!   "backends": {
//!     "default": {"backend": "database"},
//!     "es": {"backend": "elasticsearch8", "urls": ["https://search.local/es"], "index_prefix": "prod_"}
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SearchGateError};
use crate::mapping::{Dialect, EngineKind};

/// Name of the backend used when none is given.
pub const DEFAULT_BACKEND: &str = "default";

lazy_static! {
    static ref URL_PATTERN: Regex = Regex::new(
        r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.-]*)://(?:(?P<user>[^:@/]*)(?::(?P<password>[^@/]*))?@)?(?P<host>[^:/?#]+)(?::(?P<port>\d+))?(?P<prefix>/[^?#]*)?$"
    )
    .unwrap();
}

/// Which implementation serves a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Evaluate searches in process against the object store.
    Database,
    Elasticsearch7,
    Elasticsearch8,
    Elasticsearch9,
    Opensearch1,
    Opensearch2,
    Opensearch3,
}

impl BackendKind {
    /// The engine family this backend talks to; `None` for the database backend.
    pub fn engine_kind(&self) -> Option<EngineKind> {
        match self {
            BackendKind::Database => None,
            BackendKind::Elasticsearch7 => Some(EngineKind::Elasticsearch7),
            BackendKind::Elasticsearch8 => Some(EngineKind::Elasticsearch8),
            BackendKind::Elasticsearch9 => Some(EngineKind::Elasticsearch9),
            BackendKind::Opensearch1 => Some(EngineKind::Opensearch1),
            BackendKind::Opensearch2 => Some(EngineKind::Opensearch2),
            BackendKind::Opensearch3 => Some(EngineKind::Opensearch3),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.engine_kind() {
            Some(kind) => write!(f, "{kind}"),
            None => write!(f, "database"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = SearchGateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "database" | "db" => Ok(BackendKind::Database),
            other => Ok(match EngineKind::from_str(other)? {
                EngineKind::Elasticsearch7 => BackendKind::Elasticsearch7,
                EngineKind::Elasticsearch8 => BackendKind::Elasticsearch8,
                EngineKind::Elasticsearch9 => BackendKind::Elasticsearch9,
                EngineKind::Opensearch1 => BackendKind::Opensearch1,
                EngineKind::Opensearch2 => BackendKind::Opensearch2,
                EngineKind::Opensearch3 => BackendKind::Opensearch3,
            }),
        }
    }
}

/// Connection parameters handed to the engine client factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub hosts: Vec<HostConfig>,
    /// Applies to every request; an expired request fails as a transient error.
    pub timeout: Duration,
}

/// Connection parameters of one engine node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub url_prefix: String,
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default)]
    pub verify_certs: bool,
    /// Basic auth `(username, password)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_auth: Option<(String, String)>,
}

fn default_port() -> u16 {
    9200
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            host: "localhost".to_string(),
            port: default_port(),
            url_prefix: String::new(),
            use_ssl: false,
            verify_certs: false,
            http_auth: None,
        }
    }
}

impl HostConfig {
    /// Parse `scheme://[user:pass@]host[:port][/prefix]`.
    ///
    /// Without an explicit port, `https` uses 443 and anything else 80.
    /// Certificates are verified exactly when the connection uses TLS.
    pub fn parse(url: &str) -> Result<Self> {
        let captures = URL_PATTERN
            .captures(url.trim())
            .ok_or_else(|| SearchGateError::config(format!("Invalid engine URL \"{url}\"")))?;

        let use_ssl = captures
            .name("scheme")
            .is_some_and(|s| s.as_str().eq_ignore_ascii_case("https"));
        let port = match captures.name("port") {
            Some(port) => port.as_str().parse::<u16>().map_err(|_| {
                SearchGateError::config(format!("Invalid port in engine URL \"{url}\""))
            })?,
            None if use_ssl => 443,
            None => 80,
        };
        let http_auth = captures.name("user").map(|user| {
            (
                user.as_str().to_string(),
                captures
                    .name("password")
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default(),
            )
        });
        let url_prefix = captures
            .name("prefix")
            .map(|p| p.as_str().trim_end_matches('/').to_string())
            .unwrap_or_default();

        Ok(HostConfig {
            host: captures
                .name("host")
                .map(|h| h.as_str().to_string())
                .unwrap_or_default(),
            port,
            url_prefix,
            use_ssl,
            verify_certs: use_ssl,
            http_auth,
        })
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.url_prefix)
    }
}

/// Configuration of one named backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub backend: BackendKind,

    /// Engine node URLs, used when `hosts` is empty.
    #[serde(default)]
    pub urls: Vec<String>,

    /// Explicit engine nodes.
    #[serde(default)]
    pub hosts: Vec<HostConfig>,

    /// Prepended to every index name.
    #[serde(default)]
    pub index_prefix: String,

    /// Timeout of every engine request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Rebuild into a shadow index and swap an alias, instead of resetting in place.
    #[serde(default = "default_true")]
    pub atomic_rebuild: bool,

    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,

    /// Hits requested per page and per cursor call.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Merged over the dialect's default index settings.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub index_settings: Map<String, Value>,

    /// Whether cursor-opening requests may carry a start offset. Unset keeps
    /// the dialect's capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_supports_offset: Option<bool>,

    /// Whether object writes in the host application are mirrored to this backend.
    #[serde(default = "default_true")]
    pub auto_update: bool,
}

fn default_timeout_secs() -> u64 {
    10
}
fn default_true() -> bool {
    true
}
fn default_scroll_keep_alive() -> String {
    "2m".to_string()
}
fn default_page_size() -> usize {
    100
}

impl BackendConfig {
    pub fn new(backend: BackendKind) -> Self {
        BackendConfig {
            backend,
            urls: Vec::new(),
            hosts: Vec::new(),
            index_prefix: String::new(),
            timeout_secs: default_timeout_secs(),
            atomic_rebuild: true,
            scroll_keep_alive: default_scroll_keep_alive(),
            page_size: default_page_size(),
            index_settings: Map::new(),
            scroll_supports_offset: None,
            auto_update: true,
        }
    }

    pub fn index_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.index_prefix = prefix.into();
        self
    }

    pub fn atomic_rebuild(mut self, atomic_rebuild: bool) -> Self {
        self.atomic_rebuild = atomic_rebuild;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn index_settings(mut self, settings: Map<String, Value>) -> Self {
        self.index_settings = settings;
        self
    }

    pub fn scroll_supports_offset(mut self, supported: bool) -> Self {
        self.scroll_supports_offset = Some(supported);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// What an engine client needs to connect, validated.
    pub fn client_settings(&self) -> Result<ClientSettings> {
        self.validate()?;
        Ok(ClientSettings {
            hosts: self.hosts()?,
            timeout: self.timeout(),
        })
    }

    /// Engine nodes: explicit hosts, else parsed URLs, else `localhost:9200`.
    pub fn hosts(&self) -> Result<Vec<HostConfig>> {
        if !self.hosts.is_empty() {
            return Ok(self.hosts.clone());
        }
        if self.urls.is_empty() {
            return Ok(vec![HostConfig::default()]);
        }
        self.urls.iter().map(|url| HostConfig::parse(url)).collect()
    }

    /// The dialect's default settings with the configured overrides merged in.
    pub fn merged_index_settings(&self, dialect: &dyn Dialect) -> Value {
        let mut settings = dialect.index_settings();
        deep_merge(&mut settings, &Value::Object(self.index_settings.clone()));
        settings
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(SearchGateError::config("page_size must be at least 1"));
        }
        if self.timeout_secs == 0 {
            return Err(SearchGateError::config("timeout_secs must be at least 1"));
        }
        self.hosts().map(|_| ())
    }
}

/// Recursively merge `overrides` into `base`. Objects merge key by key; any
/// other value replaces what was there.
pub fn deep_merge(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value)
                    }
                    _ => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overrides) => *base = overrides.clone(),
    }
}

/// All configured backends by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_backends")]
    pub backends: BTreeMap<String, BackendConfig>,
}

fn default_backends() -> BTreeMap<String, BackendConfig> {
    let mut backends = BTreeMap::new();
    backends.insert(
        DEFAULT_BACKEND.to_string(),
        BackendConfig::new(BackendKind::Database),
    );
    backends
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            backends: default_backends(),
        }
    }
}

impl SearchSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: SearchSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let settings: SearchSettings = serde_json::from_reader(reader)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(SearchGateError::config("No search backends configured"));
        }
        for (name, config) in &self.backends {
            config
                .validate()
                .map_err(|e| SearchGateError::config(format!("Backend \"{name}\": {e}")))?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&BackendConfig> {
        self.backends
            .get(name)
            .ok_or_else(|| SearchGateError::config(format!("Unknown search backend \"{name}\"")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    /// Names of the backends that mirror object writes.
    pub fn auto_update_names(&self) -> Vec<&str> {
        self.backends
            .iter()
            .filter(|(_, config)| config.auto_update)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// What the database backend may rely on, decided once when it is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatabaseCapabilities {
    /// Whole-token matching is available; otherwise text is matched as substrings.
    #[serde(default)]
    pub full_text: bool,
}

impl DatabaseCapabilities {
    pub fn full_text(full_text: bool) -> Self {
        DatabaseCapabilities { full_text }
    }
}
