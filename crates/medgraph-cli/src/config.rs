//! Environment configuration.
//!
//! Precedence: process environment, then `.env` (loaded by [`load_dotenv`]
//! without overriding), then defaults.

use anyhow::{anyhow, Context, Result};
use medgraph_llm::LlmConfig;
use medgraph_storage::{GraphDialect, Neo4jConfig};
use std::path::PathBuf;
use std::time::Duration;

pub(crate) const MEDGRAPH_GRAPH_URI_ENV: &str = "MEDGRAPH_GRAPH_URI";
pub(crate) const MEDGRAPH_GRAPH_USER_ENV: &str = "MEDGRAPH_GRAPH_USER";
pub(crate) const MEDGRAPH_GRAPH_PASSWORD_ENV: &str = "MEDGRAPH_GRAPH_PASSWORD";
pub(crate) const MEDGRAPH_GRAPH_DATABASE_ENV: &str = "MEDGRAPH_GRAPH_DATABASE";
pub(crate) const MEDGRAPH_GRAPH_DIALECT_ENV: &str = "MEDGRAPH_GRAPH_DIALECT";
pub(crate) const MEDGRAPH_GRAPH_TIMEOUT_SECS_ENV: &str = "MEDGRAPH_GRAPH_TIMEOUT_SECS";

pub(crate) const DEFAULT_GRAPH_TIMEOUT_SECS: u64 = 30;

/// Load `.env` from the working directory or a parent, if there is one.
///
/// Runs before logging is installed so `RUST_LOG` may come from the file.
pub(crate) fn load_dotenv() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => Some(path),
        Err(e) if e.not_found() => None,
        Err(e) => {
            eprintln!("warning: ignoring unreadable .env: {e}");
            None
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AppConfig {
    pub graph: Neo4jConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Neo4jConfig::default();

        let dialect = match get(MEDGRAPH_GRAPH_DIALECT_ENV) {
            Some(v) => v
                .parse::<GraphDialect>()
                .map_err(|e| anyhow!("invalid {MEDGRAPH_GRAPH_DIALECT_ENV}: {e}"))?,
            None => defaults.dialect,
        };
        let timeout_secs = match get(MEDGRAPH_GRAPH_TIMEOUT_SECS_ENV) {
            Some(v) => v.parse::<u64>().map_err(|_| {
                anyhow!(
                    "invalid {MEDGRAPH_GRAPH_TIMEOUT_SECS_ENV}={v:?} (expected integer seconds; 0 disables)"
                )
            })?,
            None => DEFAULT_GRAPH_TIMEOUT_SECS,
        };

        let graph = Neo4jConfig {
            uri: get(MEDGRAPH_GRAPH_URI_ENV).unwrap_or(defaults.uri),
            user: get(MEDGRAPH_GRAPH_USER_ENV).unwrap_or(defaults.user),
            // Blank is a valid password.
            password: lookup(MEDGRAPH_GRAPH_PASSWORD_ENV).unwrap_or(defaults.password),
            database: get(MEDGRAPH_GRAPH_DATABASE_ENV).unwrap_or(defaults.database),
            dialect,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            max_connections: defaults.max_connections,
        };
        Ok(Self { graph })
    }

    pub fn llm_from_env() -> Result<LlmConfig> {
        LlmConfig::from_env().context("LLM configuration")
    }
}

/// Apply `ask` command-line overrides on top of the environment.
/// A timeout of `0` disables it, as in the environment variable.
pub(crate) fn with_llm_overrides(
    config: LlmConfig,
    timeout_secs: Option<u64>,
    retries: Option<u32>,
) -> LlmConfig {
    let config = match timeout_secs {
        Some(secs) => config.with_timeout((secs > 0).then(|| Duration::from_secs(secs))),
        None => config,
    };
    match retries {
        Some(n) => config.with_max_retries(n),
        None => config,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.graph.uri, "bolt://localhost:7687");
        assert_eq!(config.graph.user, "neo4j");
        assert_eq!(config.graph.password, "");
        assert_eq!(config.graph.database, "neo4j");
        assert_eq!(config.graph.dialect, GraphDialect::Neo4j);
        assert_eq!(config.graph.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn overrides_apply() {
        let config = AppConfig::from_lookup(lookup(&[
            (MEDGRAPH_GRAPH_URI_ENV, "bolt://graph:7687"),
            (MEDGRAPH_GRAPH_USER_ENV, "admin"),
            (MEDGRAPH_GRAPH_PASSWORD_ENV, "73@TuGraph"),
            (MEDGRAPH_GRAPH_DATABASE_ENV, "default"),
            (MEDGRAPH_GRAPH_DIALECT_ENV, " TuGraph "),
            (MEDGRAPH_GRAPH_TIMEOUT_SECS_ENV, "0"),
        ]))
        .unwrap();
        assert_eq!(config.graph.uri, "bolt://graph:7687");
        assert_eq!(config.graph.user, "admin");
        assert_eq!(config.graph.password, "73@TuGraph");
        assert_eq!(config.graph.database, "default");
        assert_eq!(config.graph.dialect, GraphDialect::TuGraph);
        assert_eq!(config.graph.timeout, None);
    }

    #[test]
    fn llm_overrides_replace_environment_values() {
        let base = LlmConfig::new("sk-test", "https://llm.example/v1", "qwen-plus")
            .with_timeout(Some(Duration::from_secs(120)))
            .with_max_retries(2);

        let unchanged = with_llm_overrides(base.clone(), None, None);
        assert_eq!(unchanged.timeout, Some(Duration::from_secs(120)));
        assert_eq!(unchanged.max_retries, 2);

        let overridden = with_llm_overrides(base.clone(), Some(5), Some(0));
        assert_eq!(overridden.timeout, Some(Duration::from_secs(5)));
        assert_eq!(overridden.max_retries, 0);

        assert_eq!(with_llm_overrides(base, Some(0), None).timeout, None);
    }

    #[test]
    fn invalid_values_are_errors() {
        let err = AppConfig::from_lookup(lookup(&[(MEDGRAPH_GRAPH_TIMEOUT_SECS_ENV, "ten")])).unwrap_err();
        assert!(err.to_string().contains(MEDGRAPH_GRAPH_TIMEOUT_SECS_ENV));

        let err = AppConfig::from_lookup(lookup(&[(MEDGRAPH_GRAPH_DIALECT_ENV, "sqlite")])).unwrap_err();
        assert!(err.to_string().contains("sqlite"));
    }
}
