//! Routing of bead prefixes to executor pools.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// The routing table and pool registry contract.
///
/// An id prefix resolves to at most one pool name. Pools may be parked
/// (temporarily ineligible for dispatch) and may declare a capacity.
pub trait RoutingTable: Send + Sync {
    /// Resolve a bead id prefix to a pool name.
    fn resolve_pool(&self, prefix: &str) -> Option<String>;

    /// Whether the pool currently refuses new dispatches.
    fn pool_is_parked(&self, pool: &str) -> bool;

    /// `(current, max)` load of the pool, if the registry tracks it.
    fn pool_capacity(&self, pool: &str) -> Option<(usize, usize)>;
}

/// Declared configuration of one pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum workers this pool will run in parallel
    #[serde(default)]
    pub capacity: Option<usize>,
    /// Parked pools stay routed but receive no dispatches
    #[serde(default)]
    pub parked: bool,
}

/// A routing table loaded from a TOML file.
///
/// ```toml
/// [routes]
/// gt = "polecats"
/// fuel = "refinery"
///
/// [pools.refinery]
/// capacity = 3
/// parked = false
/// ```
///
/// A static table has no view of live pool load, so `pool_capacity`
/// reports zero current workers; callers that dispatch keep their own
/// in-flight ledger on top.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticRoutes {
    #[serde(default)]
    routes: BTreeMap<String, String>,
    #[serde(default)]
    pools: BTreeMap<String, PoolConfig>,
}

impl StaticRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RoutesError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| RoutesError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(toml::from_str(&raw)?)
    }

    /// Map a prefix onto a pool, declaring the pool on the way if needed.
    pub fn with_route(mut self, prefix: impl Into<String>, pool: impl Into<String>) -> Self {
        let pool = pool.into();
        self.pools.entry(pool.clone()).or_default();
        self.routes.insert(prefix.into(), pool);
        self
    }

    pub fn with_pool(mut self, pool: impl Into<String>, config: PoolConfig) -> Self {
        self.pools.insert(pool.into(), config);
        self
    }

    pub fn park(mut self, pool: &str) -> Self {
        self.pools.entry(pool.to_string()).or_default().parked = true;
        self
    }
}

impl RoutingTable for StaticRoutes {
    fn resolve_pool(&self, prefix: &str) -> Option<String> {
        self.routes.get(prefix).cloned()
    }

    fn pool_is_parked(&self, pool: &str) -> bool {
        self.pools.get(pool).map(|p| p.parked).unwrap_or(false)
    }

    fn pool_capacity(&self, pool: &str) -> Option<(usize, usize)> {
        self.pools
            .get(pool)
            .and_then(|p| p.capacity)
            .map(|max| (0, max))
    }
}

/// An error loading a routing table
#[derive(Debug, thiserror::Error)]
pub enum RoutesError {
    #[error("could not read routes file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml() {
        let routes: StaticRoutes = toml::from_str(
            r#"
            [routes]
            gt = "polecats"
            fuel = "refinery"

            [pools.refinery]
            capacity = 3

            [pools.polecats]
            parked = true
            "#,
        )
        .unwrap();

        assert_eq!(routes.resolve_pool("gt"), Some("polecats".to_string()));
        assert_eq!(routes.resolve_pool("war"), None);
        assert!(routes.pool_is_parked("polecats"));
        assert!(!routes.pool_is_parked("refinery"));
        assert_eq!(routes.pool_capacity("refinery"), Some((0, 3)));
        assert_eq!(routes.pool_capacity("polecats"), None);
    }

    #[test]
    fn builder_declares_pools() {
        let routes = StaticRoutes::new()
            .with_route("gt", "polecats")
            .park("polecats");
        assert_eq!(routes.resolve_pool("gt"), Some("polecats".to_string()));
        assert!(routes.pool_is_parked("polecats"));
    }
}
