//! The database connector boundary (external collaborator)
//!
//! The advisor never talks to a real database. Everything it needs —
//! plan/cost estimation, hypothetical-index simulation, size estimation — is
//! expressed as the [`DatabaseConnector`] trait, generalizing the
//! one-capability-per-trait pattern the engine uses for metrics collection
//! and export. Tests and the CLI drive the advisor against
//! [`InMemoryWhatIfConnector`], a deterministic fixture-backed fake; a real
//! connector (EXPLAIN execution, HypoPG-backed simulation, ...) is out of
//! scope for this crate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{IndexAdvisorError, Result};
use crate::model::{Index, Query};

/// A node in a query execution plan
///
/// Mirrors the shape of a real `EXPLAIN` plan closely enough to exercise the
/// evaluator's plan-substring matching: a node type, a cost, and (if this
/// node scans via a hypothetical index) the index's `hypopg_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanNode {
    pub node_type: String,
    pub total_cost: f64,
    pub relation_name: Option<String>,
    pub index_name: Option<String>,
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    pub fn scan(node_type: impl Into<String>, total_cost: f64, relation_name: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            total_cost,
            relation_name: Some(relation_name.into()),
            index_name: None,
            children: Vec::new(),
        }
    }

    pub fn with_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    pub fn with_child(mut self, child: PlanNode) -> Self {
        self.children.push(child);
        self
    }
}

impl std::fmt::Display for PlanNode {
    /// Renders the plan tree textually, same spirit as PostgreSQL's `EXPLAIN` text
    /// output. Callers match on this text to discover which hypothetical indexes
    /// were used; see [`crate::cost_evaluation::CostEvaluation::which_indexes_utilized_and_cost`].
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (cost={:.2})", self.node_type, self.total_cost)?;
        if let Some(relation) = &self.relation_name {
            write!(f, " on {}", relation)?;
        }
        if let Some(index) = &self.index_name {
            write!(f, " using {}", index)?;
        }
        for child in &self.children {
            write!(f, " -> {}", child)?;
        }
        Ok(())
    }
}

/// The what-if / connector capability surface the evaluator drives
///
/// Every method may fail (network, optimizer, or catalog errors); failures
/// propagate to the caller and abort the run, per the evaluator's failure
/// semantics.
pub trait DatabaseConnector {
    /// Planned cost and shape for `query` under the currently simulated indexes
    fn get_plan(&mut self, query: &Query) -> Result<PlanNode>;

    /// Planned cost only, when the full plan tree isn't needed
    fn get_cost(&mut self, query: &Query) -> Result<f64>;

    /// Simulate `index` as a hypothetical (what-if) index, returning its catalog identity
    fn simulate_index(&mut self, index: &Index) -> Result<(i64, String)>;

    /// Estimated on-disk size of a simulated index, in bytes
    fn estimate_index_size(&mut self, hypopg_oid: i64) -> Result<u64>;

    /// Drop a previously simulated hypothetical index
    fn drop_simulated_index(&mut self, index: &Index) -> Result<()>;

    /// Build a real, physical index (used only in `actual_runtimes` mode)
    fn create_index(&mut self, index: &Index) -> Result<()>;

    /// Drop a real, physical index (used only in `actual_runtimes` mode)
    fn drop_index(&mut self, index: &Index) -> Result<()>;

    /// Execute `query` for real and report its wall-clock runtime and plan
    fn exec_query(&mut self, query: &Query) -> Result<(f64, PlanNode)>;
}

fn index_signature(index: &Index) -> String {
    let columns: Vec<&str> = index.columns().iter().map(|c| c.name.as_str()).collect();
    format!("{}({})", index.table(), columns.join(","))
}

/// A deterministic, table-driven fake connector used by tests and the CLI
///
/// Costs are looked up by `(query.id, sorted simulated index signatures)`; a
/// missing entry falls back to `default_cost`. Sizes are looked up by index
/// signature; a missing entry falls back to `default_size_bytes`. This is
/// exactly the shape of the canned `db_connector` test doubles the original
/// selection algorithm is tested against.
#[derive(Debug)]
pub struct InMemoryWhatIfConnector {
    costs: HashMap<(String, Vec<String>), f64>,
    sizes: HashMap<String, u64>,
    default_cost: f64,
    default_size_bytes: u64,
    next_oid: i64,
    simulated: HashMap<String, (i64, String)>,
}

impl InMemoryWhatIfConnector {
    pub fn new() -> Self {
        Self {
            costs: HashMap::new(),
            sizes: HashMap::new(),
            default_cost: 100.0,
            default_size_bytes: 1_000_000,
            next_oid: 1,
            simulated: HashMap::new(),
        }
    }

    pub fn with_default_cost(mut self, cost: f64) -> Self {
        self.default_cost = cost;
        self
    }

    /// Fallback size (in bytes) for an index with no `set_size` entry
    pub fn with_default_size_bytes(mut self, size_bytes: u64) -> Self {
        self.default_size_bytes = size_bytes;
        self
    }

    /// Register the cost for `query` when exactly `indexes` are simulated
    pub fn set_cost(&mut self, query_id: &str, indexes: &[&Index], cost: f64) {
        let mut signatures: Vec<String> = indexes.iter().map(|i| index_signature(i)).collect();
        signatures.sort();
        self.costs.insert((query_id.to_string(), signatures), cost);
    }

    /// Register the simulated size of `index`
    pub fn set_size(&mut self, index: &Index, size_bytes: u64) {
        self.sizes.insert(index_signature(index), size_bytes);
    }

    fn simulated_signatures(&self) -> Vec<String> {
        let mut signatures: Vec<String> = self.simulated.keys().cloned().collect();
        signatures.sort();
        signatures
    }

    fn cost_for(&self, query: &Query) -> f64 {
        let key = (query.id.clone(), self.simulated_signatures());
        *self.costs.get(&key).unwrap_or(&self.default_cost)
    }

    fn plan_for(&self, query: &Query) -> PlanNode {
        let cost = self.cost_for(query);
        let mut root = PlanNode {
            node_type: "Result".to_string(),
            total_cost: cost,
            relation_name: None,
            index_name: None,
            children: Vec::new(),
        };
        for (signature, (_, name)) in &self.simulated {
            let table = signature.split('(').next().unwrap_or_default();
            let relevant = query.columns.iter().any(|c| c.table == table);
            if relevant {
                root = root.with_child(PlanNode::scan("Index Scan", cost, table).with_index(name.clone()));
            }
        }
        if root.children.is_empty() {
            let table = query
                .columns
                .first()
                .map(|c| c.table.clone())
                .unwrap_or_default();
            root = root.with_child(PlanNode::scan("Seq Scan", cost, table));
        }
        root
    }
}

impl Default for InMemoryWhatIfConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseConnector for InMemoryWhatIfConnector {
    fn get_plan(&mut self, query: &Query) -> Result<PlanNode> {
        Ok(self.plan_for(query))
    }

    fn get_cost(&mut self, query: &Query) -> Result<f64> {
        Ok(self.cost_for(query))
    }

    fn simulate_index(&mut self, index: &Index) -> Result<(i64, String)> {
        let signature = index_signature(index);
        if let Some(existing) = self.simulated.get(&signature) {
            return Ok(existing.clone());
        }
        let oid = self.next_oid;
        self.next_oid += 1;
        let name = format!("<{}>whatif_{}", oid, signature.replace(['(', ')', ','], "_"));
        self.simulated.insert(signature, (oid, name.clone()));
        Ok((oid, name))
    }

    fn estimate_index_size(&mut self, hypopg_oid: i64) -> Result<u64> {
        let signature = self
            .simulated
            .iter()
            .find(|(_, (oid, _))| *oid == hypopg_oid)
            .map(|(sig, _)| sig.clone())
            .ok_or_else(|| {
                IndexAdvisorError::ConnectorFailure(format!("unknown hypothetical oid {}", hypopg_oid).into())
            })?;
        Ok(*self.sizes.get(&signature).unwrap_or(&self.default_size_bytes))
    }

    fn drop_simulated_index(&mut self, index: &Index) -> Result<()> {
        self.simulated.remove(&index_signature(index));
        Ok(())
    }

    fn create_index(&mut self, _index: &Index) -> Result<()> {
        Ok(())
    }

    fn drop_index(&mut self, _index: &Index) -> Result<()> {
        Ok(())
    }

    fn exec_query(&mut self, query: &Query) -> Result<(f64, PlanNode)> {
        Ok((self.cost_for(query), self.plan_for(query)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;

    #[test]
    fn fixture_falls_back_to_default_cost() {
        let mut connector = InMemoryWhatIfConnector::new().with_default_cost(42.0);
        let query = Query::new("q1", "select * from orders", vec![], 1.0);
        assert_eq!(connector.get_cost(&query).unwrap(), 42.0);
    }

    #[test]
    fn fixture_falls_back_to_default_size() {
        let mut connector = InMemoryWhatIfConnector::new().with_default_size_bytes(2_000_000);
        let index = Index::single(Column::new("orders", "customer_id"));
        let (oid, _) = connector.simulate_index(&index).unwrap();
        assert_eq!(connector.estimate_index_size(oid).unwrap(), 2_000_000);
    }

    #[test]
    fn simulate_is_idempotent_per_signature() {
        let mut connector = InMemoryWhatIfConnector::new();
        let index = Index::single(Column::new("orders", "customer_id"));
        let (oid1, name1) = connector.simulate_index(&index).unwrap();
        let (oid2, name2) = connector.simulate_index(&index).unwrap();
        assert_eq!(oid1, oid2);
        assert_eq!(name1, name2);
    }

    #[test]
    fn plan_names_simulated_index_used_by_relevant_query() {
        let mut connector = InMemoryWhatIfConnector::new();
        let index = Index::single(Column::new("orders", "customer_id"));
        let (_, name) = connector.simulate_index(&index).unwrap();
        let query = Query::new(
            "q1",
            "select * from orders where customer_id = 1",
            vec![Column::new("orders", "customer_id")],
            1.0,
        );
        let plan = connector.get_plan(&query).unwrap();
        assert!(plan.to_string().contains(&name));
    }
}
