//! Host settings loaded from a TOML file.
//!
//! Every section is optional; missing keys take their defaults. The file is
//! read once at startup and converted into the core [`SearchConfig`] and an
//! [`EngineRegistry`] with one adapter per configured engine.
//!
//! ```toml
//! categories = ["general", "news"]
//!
//! [search]
//! max_results = 30
//!
//! [search.bans.suspended_times]
//! too_many_requests = 600
//!
//! [[engines]]
//! name = "upstream"
//! shortcut = "up"
//! base_url = "https://searx.example.org/search"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use metasearch_core::http::{HttpOptions, build_client};
use metasearch_core::{
    BanPolicy, BanReason, ConfigError, DEFAULT_CATEGORY, Engine, EngineAdapter, EngineRegistry,
    JsonApiEngine, Metasearch, PoolConfig, SafeSearch, SearchConfig,
};
use serde::{Deserialize, Serialize};

use crate::error::{MetasearchError, Result};
use crate::output::OutputFormat;

/// Adapter kind for SearXNG-compatible JSON upstreams.
pub const JSON_API_KIND: &str = "json_api";

/// Root of the settings file.
///
/// `categories` comes first so that it serialises ahead of the tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Categories engines may declare.
    pub categories: Vec<String>,
    pub general: GeneralSettings,
    pub search: SearchSettings,
    pub outgoing: OutgoingSettings,
    pub logging: LoggingSettings,
    pub engines: Vec<EngineSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            categories: [
                "general",
                "images",
                "news",
                "videos",
                "music",
                "it",
                "science",
                "files",
                "social media",
                "map",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            general: GeneralSettings::default(),
            search: SearchSettings::default(),
            outgoing: OutgoingSettings::default(),
            logging: LoggingSettings::default(),
            engines: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Shown in text output and `host.ping` replies.
    pub instance_name: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            instance_name: "metasearch".to_owned(),
        }
    }
}

/// Query defaults and aggregation tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// 0 = off, 1 = moderate, 2 = strict.
    pub safe_search: u8,
    pub default_lang: String,
    /// Output formats callers may request.
    pub formats: Vec<String>,
    pub max_results: usize,
    pub title_similarity_threshold: f64,
    /// Categories searched when a query selects none.
    pub default_categories: Vec<String>,
    /// Results from these domains are dropped. `example.com` also covers
    /// its subdomains; a bare label such as `reddit` matches any domain
    /// containing it.
    pub blocked_domains: Vec<String>,
    /// Most results one domain may place in a response; `0` is unlimited.
    pub max_results_per_domain: usize,
    pub bans: BanSettings,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            safe_search: 1,
            default_lang: "all".to_owned(),
            formats: vec!["json".to_owned(), "text".to_owned()],
            max_results: 50,
            title_similarity_threshold: 0.9,
            default_categories: vec![DEFAULT_CATEGORY.to_owned()],
            blocked_domains: Vec::new(),
            max_results_per_domain: 0,
            bans: BanSettings::default(),
        }
    }
}

impl SearchSettings {
    #[must_use]
    pub fn safe_search(&self) -> SafeSearch {
        SafeSearch::from_level(self.safe_search)
    }

    /// Whether `format` is listed in `formats`.
    #[must_use]
    pub fn allows_format(&self, format: OutputFormat) -> bool {
        self.formats
            .iter()
            .any(|f| OutputFormat::parse(f) == Some(format))
    }
}

/// Suspension policy. All durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BanSettings {
    pub escalation_factor: f64,
    pub max_suspension: f64,
    pub lookback: f64,
    pub failure_threshold: u32,
    pub ban_time_on_fail: f64,
    pub max_ban_time_on_fail: f64,
    /// Reason name to base suspension, for reasons that suspend at once.
    pub suspended_times: BTreeMap<String, f64>,
}

impl Default for BanSettings {
    fn default() -> Self {
        let policy = BanPolicy::default();
        Self {
            escalation_factor: policy.escalation_factor,
            max_suspension: policy.max_suspension.as_secs_f64(),
            lookback: policy.lookback.as_secs_f64(),
            failure_threshold: policy.failure_threshold,
            ban_time_on_fail: policy.ban_time_on_fail.as_secs_f64(),
            max_ban_time_on_fail: policy.max_ban_time_on_fail.as_secs_f64(),
            suspended_times: policy
                .suspended_times
                .iter()
                .map(|(reason, d)| (reason.as_str().to_owned(), d.as_secs_f64()))
                .collect(),
        }
    }
}

impl BanSettings {
    /// Convert to the core policy.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for unknown reasons or invalid durations.
    pub fn to_policy(&self) -> std::result::Result<BanPolicy, ConfigError> {
        let mut suspended_times = BTreeMap::new();
        for (name, secs) in &self.suspended_times {
            let reason = BanReason::parse(name).ok_or_else(|| {
                ConfigError::Invalid(format!("search.bans.suspended_times: unknown reason {name:?}"))
            })?;
            suspended_times.insert(
                reason,
                seconds(&format!("search.bans.suspended_times.{name}"), *secs)?,
            );
        }
        let policy = BanPolicy {
            suspended_times,
            escalation_factor: self.escalation_factor,
            max_suspension: seconds("search.bans.max_suspension", self.max_suspension)?,
            lookback: seconds("search.bans.lookback", self.lookback)?,
            failure_threshold: self.failure_threshold,
            ban_time_on_fail: seconds("search.bans.ban_time_on_fail", self.ban_time_on_fail)?,
            max_ban_time_on_fail: seconds(
                "search.bans.max_ban_time_on_fail",
                self.max_ban_time_on_fail,
            )?,
        };
        policy.validate()?;
        Ok(policy)
    }
}

/// Outbound request settings. Timeouts are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingSettings {
    pub request_timeout: f64,
    /// Cap on a query's global deadline; `0` disables the cap.
    pub max_request_timeout: f64,
    /// Concurrent in-flight calls per engine.
    pub pool_maxsize: usize,
    /// Callers allowed to wait for a slot per engine.
    pub pool_queue: usize,
    /// Fixed User-Agent; a rotating browser one is used when unset.
    pub useragent: Option<String>,
}

impl Default for OutgoingSettings {
    fn default() -> Self {
        Self {
            request_timeout: 3.0,
            max_request_timeout: 10.0,
            pool_maxsize: 10,
            pool_queue: 20,
            useragent: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: String,
    /// Directory for daily-rolling log files. Stderr only when unset.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "metasearch=info,metasearch_core=info".to_owned(),
            file: None,
        }
    }
}

/// One `[[engines]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub name: String,
    /// Adapter kind; only [`JSON_API_KIND`] is built in.
    pub engine: String,
    pub shortcut: String,
    pub categories: Vec<String>,
    /// Seconds; falls back to `outgoing.request_timeout`.
    pub timeout: Option<f64>,
    pub disabled: bool,
    pub weight: f64,
    pub base_url: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            engine: JSON_API_KIND.to_owned(),
            shortcut: String::new(),
            categories: vec![DEFAULT_CATEGORY.to_owned()],
            timeout: None,
            disabled: false,
            weight: 1.0,
            base_url: None,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`MetasearchError::Config`] if the text is not valid settings TOML.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MetasearchError::Config(e.to_string()))
    }

    /// Save settings to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the settings cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MetasearchError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default settings path: `<config_dir>/metasearch/settings.toml`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        crate::paths::settings_file()
    }

    /// Load `path` if given, else the default path if it exists, else defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit path, or an existing default file,
    /// cannot be loaded.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Self::default_config_path();
                if default.exists() {
                    Self::from_file(&default)
                } else {
                    tracing::debug!(path = %default.display(), "no settings file; using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Defaults plus one disabled example engine, for `init-config`.
    #[must_use]
    pub fn example() -> Self {
        Self {
            engines: vec![EngineSettings {
                name: "example".to_owned(),
                shortcut: "ex".to_owned(),
                base_url: Some("https://searx.example.org/search".to_owned()),
                disabled: true,
                ..EngineSettings::default()
            }],
            ..Self::default()
        }
    }

    /// Pipeline tunables derived from `[search]` and `[outgoing]`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a value is out of range.
    pub fn to_search_config(&self) -> std::result::Result<SearchConfig, ConfigError> {
        let max_request_timeout = if self.outgoing.max_request_timeout == 0.0 {
            None
        } else {
            Some(seconds(
                "outgoing.max_request_timeout",
                self.outgoing.max_request_timeout,
            )?)
        };
        let config = SearchConfig {
            request_timeout: seconds("outgoing.request_timeout", self.outgoing.request_timeout)?,
            max_request_timeout,
            max_results: self.search.max_results,
            title_similarity_threshold: self.search.title_similarity_threshold,
            blocked_domains: self.search.blocked_domains.clone(),
            max_results_per_domain: (self.search.max_results_per_domain > 0)
                .then_some(self.search.max_results_per_domain),
            pool: PoolConfig {
                max_size: self.outgoing.pool_maxsize,
                max_queue: self.outgoing.pool_queue,
            },
            bans: self.search.bans.to_policy()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check everything [`Settings::build`] checks, without building clients.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        for format in &self.search.formats {
            if OutputFormat::parse(format).is_none() {
                return Err(MetasearchError::Config(format!(
                    "search.formats: unknown format {format:?}"
                )));
            }
        }
        if self.search.safe_search > 2 {
            return Err(MetasearchError::Config(
                "search.safe_search must be 0, 1 or 2".to_owned(),
            ));
        }
        for category in &self.search.default_categories {
            if !self.categories.contains(category) {
                return Err(MetasearchError::Config(format!(
                    "search.default_categories: undeclared category {category:?}"
                )));
            }
        }
        let config = self.to_search_config()?;
        for engine in &self.engines {
            adapter_kind(engine)?;
        }
        // Registry validation runs against placeholder adapters.
        self.registry_with(config.request_timeout, config.pool, |_| {
            Ok(Arc::new(Unbuilt) as Arc<dyn EngineAdapter>)
        })?;
        Ok(())
    }

    /// Build the engine registry with one adapter per `[[engines]]` entry.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for unknown adapter kinds, missing
    /// `base_url`s or anything the registry rejects.
    pub fn registry(
        &self,
        client: &reqwest::Client,
    ) -> std::result::Result<EngineRegistry, ConfigError> {
        let config = self.to_search_config()?;
        self.registry_with(config.request_timeout, config.pool, |engine| {
            build_adapter(engine, client)
        })
    }

    /// Validate and assemble the whole pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`MetasearchError::Config`] if any part of the settings is invalid.
    pub fn build(&self) -> Result<Metasearch> {
        self.validate()?;
        let config = self.to_search_config()?;
        let client = build_client(&HttpOptions {
            user_agent: self.outgoing.useragent.clone(),
            timeout: config.max_request_timeout,
            pool_max_idle_per_host: Some(self.outgoing.pool_maxsize),
        })?;
        let registry = self.registry(&client)?;
        tracing::info!(
            engines = registry.len(),
            categories = registry.categories().len(),
            "engine registry built"
        );
        Ok(Metasearch::new(registry, config)?)
    }

    fn registry_with<F>(
        &self,
        default_timeout: Duration,
        pool: PoolConfig,
        mut adapter: F,
    ) -> std::result::Result<EngineRegistry, ConfigError>
    where
        F: FnMut(&EngineSettings) -> std::result::Result<Arc<dyn EngineAdapter>, ConfigError>,
    {
        let mut builder = EngineRegistry::builder()
            .categories(&self.categories)
            .default_timeout(default_timeout)
            .pool(pool);
        for entry in &self.engines {
            let mut engine = Engine::new(&entry.name, &entry.shortcut)
                .with_categories(&entry.categories)
                .with_weight(entry.weight);
            if let Some(timeout) = entry.timeout {
                engine = engine.with_timeout(seconds(
                    &format!("engines.{}.timeout", entry.name),
                    timeout,
                )?);
            }
            if entry.disabled {
                engine = engine.disabled();
            }
            builder = builder.register(engine, adapter(entry)?);
        }
        builder.build()
    }
}

/// Adapter kinds the host knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdapterKind {
    JsonApi,
}

fn adapter_kind(engine: &EngineSettings) -> std::result::Result<AdapterKind, ConfigError> {
    match engine.engine.as_str() {
        JSON_API_KIND => {
            if engine.base_url.as_deref().is_none_or(|u| u.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "engine {:?}: json_api requires base_url",
                    engine.name
                )));
            }
            Ok(AdapterKind::JsonApi)
        }
        other => Err(ConfigError::Invalid(format!(
            "engine {:?}: unknown adapter kind {other:?}",
            engine.name
        ))),
    }
}

fn build_adapter(
    engine: &EngineSettings,
    client: &reqwest::Client,
) -> std::result::Result<Arc<dyn EngineAdapter>, ConfigError> {
    match adapter_kind(engine)? {
        AdapterKind::JsonApi => {
            let base_url = engine.base_url.as_deref().unwrap_or_default();
            Ok(Arc::new(JsonApiEngine::new(base_url, client.clone())?))
        }
    }
}

/// Seconds from a settings value; must be finite and positive.
fn seconds(field: &str, value: f64) -> std::result::Result<Duration, ConfigError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::Invalid(format!(
            "{field} must be a positive number of seconds"
        )));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|e| ConfigError::Invalid(format!("{field}: {e}")))
}

/// Stand-in adapter used only to validate registry settings.
struct Unbuilt;

#[async_trait::async_trait]
impl EngineAdapter for Unbuilt {
    async fn fetch(
        &self,
        _query: &metasearch_core::Query,
        _timeout: Duration,
    ) -> std::result::Result<Vec<metasearch_core::ResultItem>, metasearch_core::EngineFailure>
    {
        Err(metasearch_core::EngineFailure::network("adapter not built"))
    }
}
