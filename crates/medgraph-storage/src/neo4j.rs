//! Bolt-backed graph store.
//!
//! `neo4rs` is async, the rest of medgraph is not. The store owns a
//! current-thread runtime and blocks on every call; each call checks a
//! connection out of the driver pool and hands it back when its future
//! completes, fails or times out.

use crate::{
    GraphCounts, GraphStore, LabelSet, NodeAttributes, NodeKind, Record, SchemaReport,
    StoreError, LABEL_DISEASE, LABEL_SYMPTOM, REL_HAS_SYMPTOM,
};
use neo4rs::{query, ConfigBuilder, Graph, Query};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Which server family the bolt endpoint speaks for schema and introspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphDialect {
    #[default]
    Neo4j,
    TuGraph,
}

impl FromStr for GraphDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neo4j" => Ok(GraphDialect::Neo4j),
            "tugraph" => Ok(GraphDialect::TuGraph),
            other => Err(format!("unknown graph dialect `{other}` (expected neo4j|tugraph)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub dialect: GraphDialect,
    /// Per-call timeout. `None` waits forever.
    pub timeout: Option<Duration>,
    pub max_connections: usize,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
            dialect: GraphDialect::Neo4j,
            timeout: Some(Duration::from_secs(30)),
            max_connections: 4,
        }
    }
}

pub struct Neo4jStore {
    graph: Graph,
    runtime: Runtime,
    dialect: GraphDialect,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for Neo4jStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jStore")
            .field("dialect", &self.dialect)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Neo4jStore {
    /// Connect and verify the endpoint answers a trivial statement.
    ///
    /// Any failure here is fatal for the caller: nothing downstream can run
    /// without a reachable store.
    pub fn connect(config: &Neo4jConfig) -> Result<Self, StoreError> {
        let connect_err = |message: String| StoreError::Connect {
            uri: config.uri.clone(),
            message,
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StoreError::Runtime(e.to_string()))?;

        let driver_config = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .db(config.database.as_str())
            .max_connections(config.max_connections)
            .build()
            .map_err(|e| connect_err(e.to_string()))?;

        let graph = runtime
            .block_on(Graph::connect(driver_config))
            .map_err(|e| connect_err(e.to_string()))?;

        let store = Self {
            graph,
            runtime,
            dialect: config.dialect,
            timeout: config.timeout,
        };

        store
            .execute("connectivity check", query("RETURN 1 AS ok"))
            .map_err(|e| connect_err(e.to_string()))?;
        info!(uri = %config.uri, dialect = ?config.dialect, "connected to graph store");

        Ok(store)
    }

    pub fn dialect(&self) -> GraphDialect {
        self.dialect
    }

    /// Drive one store call to completion on the owned runtime.
    fn block_on<T, F>(&self, op: &str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, neo4rs::Error>>,
    {
        debug!(op, "graph session acquired");
        let result = match self.timeout {
            Some(limit) => self
                .runtime
                .block_on(async { tokio::time::timeout(limit, fut).await })
                .map_err(|_| StoreError::Timeout(limit))
                .and_then(|r| r.map_err(classify)),
            None => self.runtime.block_on(fut).map_err(classify),
        };
        debug!(op, ok = result.is_ok(), "graph session released");
        result
    }

    fn run(&self, op: &str, q: Query) -> Result<(), StoreError> {
        self.block_on(op, self.graph.run(q))
    }

    fn execute(&self, op: &str, q: Query) -> Result<Vec<neo4rs::Row>, StoreError> {
        self.block_on(op, async {
            let mut stream = self.graph.execute(q).await?;
            let mut rows = Vec::new();
            while let Some(row) = stream.next().await? {
                rows.push(row);
            }
            Ok(rows)
        })
    }

    fn count(&self, op: &str, statement: &str) -> Result<u64, StoreError> {
        let rows = self.execute(op, query(statement))?;
        let Some(row) = rows.first() else {
            return Ok(0);
        };
        let n: i64 = row
            .get("n")
            .map_err(|e| StoreError::Statement(format!("{op}: {e}")))?;
        Ok(n.max(0) as u64)
    }

    /// First string column of every row.
    fn string_column(&self, op: &str, statement: &str) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        for row in self.execute(op, query(statement))? {
            let record = row_to_record(&row)?;
            if let Some(s) = record.values().find_map(|v| v.as_str()) {
                out.push(s.to_string());
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    fn schema_statements(&self) -> Vec<(String, String)> {
        match self.dialect {
            GraphDialect::Neo4j => [LABEL_DISEASE, LABEL_SYMPTOM]
                .into_iter()
                .map(|label| {
                    let name = format!("{}_name_unique", label.to_ascii_lowercase());
                    let stmt = format!(
                        "CREATE CONSTRAINT {name} IF NOT EXISTS FOR (n:{label}) REQUIRE n.name IS UNIQUE"
                    );
                    (label.to_string(), stmt)
                })
                .collect(),
            GraphDialect::TuGraph => {
                let mut stmts: Vec<(String, String)> = [LABEL_DISEASE, LABEL_SYMPTOM]
                    .into_iter()
                    .map(|label| {
                        let stmt = format!(
                            "CALL db.createVertexLabel('{label}', 'name', 'name', 'STRING', false, \
                             'aliases', 'STRING', true, 'description', 'STRING', true, 'website', 'STRING', true)"
                        );
                        (label.to_string(), stmt)
                    })
                    .collect();
                stmts.push((
                    REL_HAS_SYMPTOM.to_string(),
                    format!(
                        "CALL db.createEdgeLabel('{REL_HAS_SYMPTOM}', '[[\"{LABEL_DISEASE}\",\"{LABEL_SYMPTOM}\"]]')"
                    ),
                ));
                stmts
            }
        }
    }
}

/// Schema statements that fail only because the object exists are successes.
fn is_already_exists(err: &StoreError) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("already exists") || msg.contains("equivalentschemarule")
}

fn classify(err: neo4rs::Error) -> StoreError {
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();
    let transient = ["transient", "deadlock", "connection", "broken pipe", "io error"]
        .iter()
        .any(|needle| lower.contains(needle));
    if transient {
        StoreError::Transient(msg)
    } else {
        StoreError::Statement(msg)
    }
}

fn row_to_record(row: &neo4rs::Row) -> Result<Record, StoreError> {
    row.to::<Record>()
        .map_err(|e| StoreError::Statement(format!("unreadable row: {e}")))
}

impl GraphStore for Neo4jStore {
    fn ensure_schema(&self) -> Result<SchemaReport, StoreError> {
        let mut report = SchemaReport::default();
        for (label, stmt) in self.schema_statements() {
            match self.run("ensure schema", query(&stmt)) {
                Ok(()) => report.created.push(label),
                Err(e) if is_already_exists(&e) => {
                    debug!(%label, "schema object already present");
                    report.existing.push(label);
                }
                Err(e) => return Err(e),
            }
        }
        if self.dialect == GraphDialect::Neo4j {
            // Relationship types are created on first use.
            report.existing.push(REL_HAS_SYMPTOM.to_string());
        }
        Ok(report)
    }

    fn reset(&self) -> Result<(), StoreError> {
        warn!("deleting every node and relationship");
        self.run("reset", query("MATCH (n) DETACH DELETE n"))
    }

    fn merge_node(
        &self,
        kind: NodeKind,
        name: &str,
        attributes: &NodeAttributes,
    ) -> Result<(), StoreError> {
        let present = attributes.present();
        let mut stmt = format!("MERGE (n:{} {{name: $name}})", kind.label());
        if !present.is_empty() {
            let sets: Vec<String> = present
                .iter()
                .map(|(key, _)| format!("n.{key} = ${key}"))
                .collect();
            stmt.push_str(" SET ");
            stmt.push_str(&sets.join(", "));
        }

        let mut q = query(&stmt).param("name", name);
        for (key, value) in present {
            q = q.param(key, value);
        }
        self.run("merge node", q)
    }

    fn merge_has_symptom(&self, disease: &str, symptom: &str) -> Result<(), StoreError> {
        let stmt = format!(
            "MERGE (d:{LABEL_DISEASE} {{name: $disease}}) \
             MERGE (s:{LABEL_SYMPTOM} {{name: $symptom}}) \
             MERGE (d)-[:{REL_HAS_SYMPTOM}]->(s)"
        );
        self.run(
            "merge edge",
            query(&stmt).param("disease", disease).param("symptom", symptom),
        )
    }

    fn counts(&self) -> Result<GraphCounts, StoreError> {
        Ok(GraphCounts {
            diseases: self.count(
                "count diseases",
                &format!("MATCH (n:{LABEL_DISEASE}) RETURN count(n) AS n"),
            )?,
            symptoms: self.count(
                "count symptoms",
                &format!("MATCH (n:{LABEL_SYMPTOM}) RETURN count(n) AS n"),
            )?,
            has_symptom: self.count(
                "count edges",
                &format!("MATCH ()-[r:{REL_HAS_SYMPTOM}]->() RETURN count(r) AS n"),
            )?,
        })
    }

    fn sample_pairs(&self, limit: usize) -> Result<Vec<(String, String)>, StoreError> {
        let stmt = format!(
            "MATCH (d:{LABEL_DISEASE})-[:{REL_HAS_SYMPTOM}]->(s:{LABEL_SYMPTOM}) \
             RETURN d.name AS disease, s.name AS symptom LIMIT $limit"
        );
        let rows = self.execute("sample pairs", query(&stmt).param("limit", limit as i64))?;
        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            let disease: String = row
                .get("disease")
                .map_err(|e| StoreError::Statement(e.to_string()))?;
            let symptom: String = row
                .get("symptom")
                .map_err(|e| StoreError::Statement(e.to_string()))?;
            pairs.push((disease, symptom));
        }
        Ok(pairs)
    }

    fn labels(&self) -> Result<LabelSet, StoreError> {
        let (nodes, rels) = match self.dialect {
            GraphDialect::Neo4j => (
                "CALL db.labels() YIELD label RETURN label",
                "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType",
            ),
            GraphDialect::TuGraph => ("CALL db.vertexLabels()", "CALL db.edgeLabels()"),
        };
        Ok(LabelSet {
            node_labels: self.string_column("node labels", nodes)?,
            relationship_types: self.string_column("relationship types", rels)?,
        })
    }

    fn run_query(&self, statement: &str) -> Result<Vec<Record>, StoreError> {
        self.execute("read query", query(statement))?
            .iter()
            .map(row_to_record)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_parses_case_insensitively() {
        assert_eq!("Neo4j".parse::<GraphDialect>().unwrap(), GraphDialect::Neo4j);
        assert_eq!(" TUGRAPH ".parse::<GraphDialect>().unwrap(), GraphDialect::TuGraph);
        assert!("memgraph".parse::<GraphDialect>().is_err());
    }

    #[test]
    fn classifies_existing_schema_objects_as_success() {
        let err = StoreError::Statement(
            "Neo.ClientError.Schema.EquivalentSchemaRuleAlreadyExists".to_string(),
        );
        assert!(is_already_exists(&err));
        let err = StoreError::Statement("label Disease already exists".to_string());
        assert!(is_already_exists(&err));
        let err = StoreError::Statement("syntax error".to_string());
        assert!(!is_already_exists(&err));
    }

    #[test]
    fn default_config_points_at_local_bolt() {
        let config = Neo4jConfig::default();
        assert_eq!(config.uri, "bolt://localhost:7687");
        assert_eq!(config.dialect, GraphDialect::Neo4j);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
    }
}
