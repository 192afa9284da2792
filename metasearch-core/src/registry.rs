//! Static catalog of configured engines.
//!
//! The registry is built once at startup through [`EngineRegistryBuilder`],
//! which validates the definitions and pairs each engine with its adapter
//! and call pool. It is read-only afterwards and shared without locking.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::EngineAdapter;
use crate::error::ConfigError;
use crate::pool::{EnginePool, PoolConfig};
use crate::types::Query;

/// Definition of one upstream engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Engine {
    /// Unique engine name.
    pub name: String,
    /// Unique short name used in `!bang` selectors.
    pub shortcut: String,
    /// Categories this engine serves.
    pub categories: BTreeSet<String>,
    /// Per-engine call timeout. `None` falls back to the registry default.
    pub timeout: Option<Duration>,
    pub enabled: bool,
    /// Ranking weight applied to this engine's contributions.
    pub weight: f64,
}

impl Engine {
    pub fn new(name: impl Into<String>, shortcut: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shortcut: shortcut.into(),
            categories: BTreeSet::new(),
            timeout: None,
            enabled: true,
            weight: 1.0,
        }
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn serves_any(&self, categories: &[String]) -> bool {
        categories.iter().any(|c| self.categories.contains(c))
    }
}

/// An engine paired with its adapter and call pool.
pub struct RegisteredEngine {
    pub engine: Engine,
    /// Effective timeout (the engine's own, or the registry default).
    pub timeout: Duration,
    /// Position in configuration order.
    pub index: usize,
    pub adapter: Arc<dyn EngineAdapter>,
    pub pool: EnginePool,
}

impl RegisteredEngine {
    pub fn name(&self) -> &str {
        &self.engine.name
    }

    pub fn weight(&self) -> f64 {
        self.engine.weight
    }
}

impl fmt::Debug for RegisteredEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredEngine")
            .field("engine", &self.engine)
            .field("timeout", &self.timeout)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Collects engine definitions and adapters, then validates them.
pub struct EngineRegistryBuilder {
    categories: Vec<String>,
    entries: Vec<(Engine, Arc<dyn EngineAdapter>)>,
    default_timeout: Duration,
    pool: PoolConfig,
}

impl Default for EngineRegistryBuilder {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            entries: Vec::new(),
            default_timeout: Duration::from_secs(3),
            pool: PoolConfig::default(),
        }
    }
}

impl EngineRegistryBuilder {
    /// Declare a category. Declaration order is kept for display.
    pub fn category(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.categories.contains(&name) {
            self.categories.push(name);
        }
        self
    }

    pub fn categories<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(self, |builder, name| builder.category(name))
    }

    /// Timeout for engines that do not set one.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Register an engine with the adapter that serves it.
    pub fn register(mut self, engine: Engine, adapter: Arc<dyn EngineAdapter>) -> Self {
        self.entries.push((engine, adapter));
        self
    }

    /// Validate every definition and freeze the registry.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for empty or duplicate names, duplicate
    /// shortcuts, undeclared categories, zero timeouts or invalid weights.
    pub fn build(self) -> Result<EngineRegistry, ConfigError> {
        self.pool.validate()?;
        if self.default_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "default engine timeout must be greater than 0".into(),
            ));
        }

        let declared: BTreeSet<&str> = self.categories.iter().map(String::as_str).collect();
        let mut by_name: HashMap<String, usize> = HashMap::new();
        let mut by_shortcut: HashMap<String, usize> = HashMap::new();
        let mut engines = Vec::with_capacity(self.entries.len());

        for (index, (engine, adapter)) in self.entries.into_iter().enumerate() {
            if engine.name.trim().is_empty() {
                return Err(ConfigError::EmptyEngineName(index));
            }
            if by_name.contains_key(&engine.name) {
                return Err(ConfigError::DuplicateEngine(engine.name));
            }
            if !engine.shortcut.is_empty() {
                if let Some(&existing) = by_shortcut.get(&engine.shortcut) {
                    let existing: &RegisteredEngine = &engines[existing];
                    return Err(ConfigError::DuplicateShortcut {
                        shortcut: engine.shortcut.clone(),
                        engine: engine.name.clone(),
                        existing: existing.engine.name.clone(),
                    });
                }
            }
            if let Some(category) = engine
                .categories
                .iter()
                .find(|c| !declared.contains(c.as_str()))
            {
                return Err(ConfigError::UnknownCategory {
                    engine: engine.name.clone(),
                    category: category.clone(),
                });
            }
            if engine.timeout.is_some_and(|t| t.is_zero()) {
                return Err(ConfigError::Invalid(format!(
                    "engine {} has a zero timeout",
                    engine.name
                )));
            }
            if !(engine.weight.is_finite() && engine.weight >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "engine {} has invalid weight {}",
                    engine.name, engine.weight
                )));
            }

            by_name.insert(engine.name.clone(), index);
            if !engine.shortcut.is_empty() {
                by_shortcut.insert(engine.shortcut.clone(), index);
            }
            engines.push(RegisteredEngine {
                timeout: engine.timeout.unwrap_or(self.default_timeout),
                index,
                adapter,
                pool: EnginePool::new(self.pool),
                engine,
            });
        }

        Ok(EngineRegistry {
            categories: self.categories,
            engines: engines.into_iter().map(Arc::new).collect(),
            by_name,
            by_shortcut,
        })
    }
}

/// Read-only catalog of registered engines.
#[derive(Debug)]
pub struct EngineRegistry {
    categories: Vec<String>,
    engines: Vec<Arc<RegisteredEngine>>,
    by_name: HashMap<String, usize>,
    by_shortcut: HashMap<String, usize>,
}

impl EngineRegistry {
    pub fn builder() -> EngineRegistryBuilder {
        EngineRegistryBuilder::default()
    }

    /// Declared categories, in declaration order.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.categories.iter().any(|c| c == name)
    }

    /// All engines, enabled or not, in configuration order.
    pub fn engines(&self) -> &[Arc<RegisteredEngine>] {
        &self.engines
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RegisteredEngine>> {
        self.by_name.get(name).map(|&i| &self.engines[i])
    }

    pub fn by_shortcut(&self, shortcut: &str) -> Option<&Arc<RegisteredEngine>> {
        self.by_shortcut.get(shortcut).map(|&i| &self.engines[i])
    }

    /// Look an engine up by name, falling back to its shortcut.
    pub fn lookup(&self, name_or_shortcut: &str) -> Option<&Arc<RegisteredEngine>> {
        self.get(name_or_shortcut)
            .or_else(|| self.by_shortcut(name_or_shortcut))
    }

    /// Enabled engines serving any of `categories`, in configuration order.
    pub fn eligible_engines(&self, categories: &[String]) -> Vec<Arc<RegisteredEngine>> {
        self.engines
            .iter()
            .filter(|e| e.engine.enabled && e.engine.serves_any(categories))
            .cloned()
            .collect()
    }

    /// Engines a query should be dispatched to, before suspension checks.
    ///
    /// Explicitly named engines take precedence over categories; unknown
    /// or disabled names are skipped.
    pub fn select(&self, query: &Query) -> Vec<Arc<RegisteredEngine>> {
        if query.engines.is_empty() {
            return self.eligible_engines(&query.categories);
        }
        let wanted: BTreeSet<usize> = query
            .engines
            .iter()
            .filter_map(|name| self.lookup(name).map(|e| e.index))
            .collect();
        wanted
            .into_iter()
            .map(|i| Arc::clone(&self.engines[i]))
            .filter(|e| e.engine.enabled)
            .collect()
    }

    /// Ranking weight of `engine`, or 1.0 for unknown names.
    pub fn weight_of(&self, engine: &str) -> f64 {
        self.get(engine).map_or(1.0, |e| e.weight())
    }

    /// Configuration index of `engine`, or `usize::MAX` for unknown names.
    pub fn index_of(&self, engine: &str) -> usize {
        self.by_name.get(engine).copied().unwrap_or(usize::MAX)
    }
}
