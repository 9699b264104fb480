use medgraph_storage::{GraphStore, Record, StoreError};
use tracing::debug;

/// Upper bound on records handed to answer synthesis.
pub const DEFAULT_MAX_RECORDS: usize = 20;

/// Runs translated statements. Session lifetime is the store's concern.
pub struct QueryExecutor<'s, S: GraphStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: GraphStore + ?Sized> QueryExecutor<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    pub fn execute(&self, query: &str) -> Result<Vec<Record>, StoreError> {
        let records = self.store.run_query(query)?;
        debug!(records = records.len(), "query executed");
        Ok(records)
    }
}

/// Keep at most `max` records; the flag reports whether any were dropped.
pub fn truncate_records(mut records: Vec<Record>, max: usize) -> (Vec<Record>, bool) {
    let truncated = records.len() > max;
    records.truncate(max);
    (records, truncated)
}
