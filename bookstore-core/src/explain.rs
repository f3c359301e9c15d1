// bookstore-core/src/explain.rs
//! Query plan returned by `explain`
//!
//! The store's explain document is kept exactly as returned. The accessors
//! only read from it, walking nested `inputStage`/`queryPlan` nodes so they
//! work with both the classic and the slot-based plan layouts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Winning-plan stage names of interest
pub const COLLSCAN: &str = "COLLSCAN";
pub const IXSCAN: &str = "IXSCAN";
pub const FETCH: &str = "FETCH";

/// Store-provided execution plan and statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionPlan(Value);

impl ExecutionPlan {
    pub fn new(raw: Value) -> Self {
        ExecutionPlan(raw)
    }

    /// The untouched explain document
    pub fn raw(&self) -> &Value {
        &self.0
    }

    pub fn into_raw(self) -> Value {
        self.0
    }

    fn winning_plan(&self) -> Option<&Value> {
        let plan = self.0.get("queryPlanner")?.get("winningPlan")?;
        Some(plan.get("queryPlan").unwrap_or(plan))
    }

    /// Stage names of the winning plan, outermost first
    pub fn stages(&self) -> Vec<String> {
        let mut stages = Vec::new();
        let mut node = self.winning_plan();
        while let Some(current) = node {
            if let Some(stage) = current.get("stage").and_then(Value::as_str) {
                stages.push(stage.to_string());
            }
            node = current.get("inputStage");
        }
        stages
    }

    /// Leaf stage of the winning plan (`IXSCAN`, `COLLSCAN`, ...)
    pub fn winning_stage(&self) -> Option<String> {
        self.stages().pop()
    }

    /// Name of the index the winning plan scans, if any
    pub fn index_name(&self) -> Option<String> {
        let mut node = self.winning_plan();
        while let Some(current) = node {
            if current.get("stage").and_then(Value::as_str) == Some(IXSCAN) {
                return current
                    .get("indexName")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            node = current.get("inputStage");
        }
        None
    }

    pub fn uses_index(&self) -> bool {
        self.index_name().is_some()
    }

    fn stat(&self, key: &str) -> Option<u64> {
        self.0.get("executionStats")?.get(key)?.as_u64()
    }

    pub fn docs_examined(&self) -> Option<u64> {
        self.stat("totalDocsExamined")
    }

    pub fn keys_examined(&self) -> Option<u64> {
        self.stat("totalKeysExamined")
    }

    pub fn returned(&self) -> Option<u64> {
        self.stat("nReturned")
    }
}
