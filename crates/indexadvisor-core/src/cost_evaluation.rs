//! Caching proxy over the what-if index simulator
//!
//! `CostEvaluation` owns the connector for the lifetime of one search run. It
//! keeps the simulator's simulated-index set synchronized with whatever
//! combination the caller is currently asking about, memoizes per-query costs
//! keyed by the *relevant* subset of that combination, and tallies request/hit
//! counters the same way the engine's `CostOptimizer` tracks
//! `plans_considered`/`indexes_used`.

use std::collections::{HashMap, HashSet};

use crate::connector::DatabaseConnector;
use crate::errors::{IndexAdvisorError, Result};
use crate::estimators::EstimationMode;
use crate::model::{FrozenIndexSet, Index, IndexCombination, Query, Workload};

type CacheKey = (String, FrozenIndexSet);

/// Caches plan costs keyed by `(query text, relevant indexes)` and drives the
/// what-if index lifecycle for one search run.
///
/// Not `Send`/`Sync` by design: the evaluator's `current_indexes`, caches, and
/// counters are ordinary fields, not lock-protected, because exactly one
/// logical agent (the selection algorithm) drives one evaluator at a time. A
/// new evaluator must be constructed for each independent run.
pub struct CostEvaluation<C: DatabaseConnector> {
    connector: C,
    mode: EstimationMode,
    current_indexes: HashSet<Index>,
    cache: HashMap<CacheKey, f64>,
    relevant_indexes_cache: HashMap<CacheKey, FrozenIndexSet>,
    cost_requests: u64,
    cache_hits: u64,
    completed: bool,
}

impl<C: DatabaseConnector> CostEvaluation<C> {
    /// A new evaluator using the default (`what-if`) estimation mode
    pub fn new(connector: C) -> Self {
        Self::with_mode(connector, EstimationMode::default())
    }

    pub fn with_mode(connector: C, mode: EstimationMode) -> Self {
        Self {
            connector,
            mode,
            current_indexes: HashSet::new(),
            cache: HashMap::new(),
            relevant_indexes_cache: HashMap::new(),
            cost_requests: 0,
            cache_hits: 0,
            completed: false,
        }
    }

    pub fn cost_requests(&self) -> u64 {
        self.cost_requests
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    pub fn current_indexes(&self) -> &HashSet<Index> {
        &self.current_indexes
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Total weighted estimated cost of `workload` under `combination`
    ///
    /// Reconciles the simulated-index set to match `combination`, then sums
    /// `cost(query) * query.frequency` over the workload, serving cached
    /// per-query costs whenever the relevant subset of `combination` has been
    /// seen before under that query's text.
    pub fn calculate_cost(&mut self, workload: &Workload, combination: &IndexCombination) -> Result<f64> {
        self.ensure_not_completed()?;
        self.reconcile(combination)?;

        let frozen_combination = combination.frozen();
        let mut total_cost = 0.0;
        for query in &workload.queries {
            self.cost_requests += 1;
            let relevant = self.relevant_indexes(query, &frozen_combination);
            let key = (query.text.clone(), relevant);
            let cost = match self.cache.get(&key) {
                Some(cached) => {
                    self.cache_hits += 1;
                    *cached
                }
                None => {
                    let cost = self.mode.cost(&mut self.connector, query)?;
                    tracing::debug!(query = %query.text, cost, "cost cache miss");
                    self.cache.insert(key, cost);
                    cost
                }
            };
            total_cost += cost * query.frequency;
        }
        Ok(total_cost)
    }

    /// Read (or lazily compute) the size estimate for `index`
    ///
    /// If `index` is already simulated its size is fetched from the
    /// simulator; otherwise it is simulated with size capture and left
    /// behind in `current_indexes` for the caller to eventually reconcile away.
    pub fn estimate_size(&mut self, index: &Index) -> Result<()> {
        self.ensure_not_completed()?;
        match self.current_indexes.get(index).cloned() {
            Some(existing) => {
                if existing.estimated_size().is_none() {
                    if let Some(oid) = existing.hypopg_oid() {
                        let size = self.connector.estimate_index_size(oid)?;
                        existing.set_estimated_size(coerce_size(index, size));
                    }
                }
                if index.estimated_size().is_none() {
                    if let Some(size) = existing.estimated_size() {
                        index.set_estimated_size(size);
                    }
                }
                Ok(())
            }
            None => {
                self.simulate_with_size(index)?;
                self.current_indexes.insert(index.clone());
                Ok(())
            }
        }
    }

    /// Which of `combination`'s simulated indexes the plan for `query` actually used, plus its cost
    ///
    /// Reconciles to `combination`, obtains the plan, and scans its textual form
    /// for each simulated index's `hypopg_name`. Preserved as a substring match
    /// for compatibility even though structured plan traversal would be more
    /// robust, per the connector's plan-text contract.
    pub fn which_indexes_utilized_and_cost(
        &mut self,
        query: &Query,
        combination: &IndexCombination,
    ) -> Result<(FrozenIndexSet, f64)> {
        self.ensure_not_completed()?;
        self.reconcile(combination)?;

        let plan = self.connector.get_plan(query)?;
        let plan_text = plan.to_string();

        let single_query_workload = Workload::new(vec![query.clone()]);
        let cost = self.calculate_cost(&single_query_workload, combination)?;

        let mut used = Vec::new();
        for index in &self.current_indexes {
            if !combination.contains(index) {
                return Err(IndexAdvisorError::Internal(
                    "current_indexes contains an index outside the requested combination".into(),
                ));
            }
            if let Some(name) = index.hypopg_name() {
                if plan_text.contains(&name) {
                    used.push(index.clone());
                }
            }
        }
        Ok((FrozenIndexSet::from_iter(used), cost))
    }

    /// Drop every simulated index and seal the evaluator against further use
    ///
    /// Idempotent: calling `complete()` again is a no-op. A failure while
    /// dropping a simulated index is fatal and propagates to the caller.
    pub fn complete(&mut self) -> Result<()> {
        if self.completed {
            return Ok(());
        }
        let indexes: Vec<Index> = self.current_indexes.iter().cloned().collect();
        for index in indexes {
            self.drop_by_mode(&index)?;
            self.current_indexes.remove(&index);
        }
        self.completed = true;
        tracing::info!(
            cost_requests = self.cost_requests,
            cache_hits = self.cache_hits,
            "cost evaluation completed"
        );
        Ok(())
    }

    fn ensure_not_completed(&self) -> Result<()> {
        if self.completed {
            Err(IndexAdvisorError::EvaluatorSealed)
        } else {
            Ok(())
        }
    }

    /// Synchronize the simulated-index set with `combination`
    ///
    /// Drops indexes no longer present first, then simulates newly-requested
    /// ones, so that by return `current_indexes == set(combination)`.
    fn reconcile(&mut self, combination: &IndexCombination) -> Result<()> {
        let target: HashSet<Index> = combination.iter().cloned().collect();

        let to_remove: Vec<Index> = self
            .current_indexes
            .iter()
            .filter(|index| !target.contains(*index))
            .cloned()
            .collect();
        for index in to_remove {
            self.drop_by_mode(&index)?;
            self.current_indexes.remove(&index);
        }

        let to_add: Vec<Index> = target
            .iter()
            .filter(|index| !self.current_indexes.contains(*index))
            .cloned()
            .collect();
        for index in to_add {
            self.simulate_with_size(&index)?;
            self.current_indexes.insert(index);
        }

        if self.current_indexes.len() != target.len() || !target.iter().all(|i| self.current_indexes.contains(i)) {
            return Err(IndexAdvisorError::Internal(
                "current_indexes failed to converge with the requested combination".into(),
            ));
        }
        Ok(())
    }

    /// Bring `index` into existence under whichever lifecycle `self.mode` calls for
    ///
    /// `WhatIf`/`Learned` simulate a hypothetical index and capture its size via
    /// `hypopg_oid`. `ActualRuntimes` builds a real physical index instead; there is
    /// no hypothetical identity to query a size through, so `estimated_size` is left
    /// unset, same as the what-if/learned path leaves it unset until simulation.
    fn simulate_with_size(&mut self, index: &Index) -> Result<()> {
        match &self.mode {
            EstimationMode::ActualRuntimes => {
                self.connector.create_index(index)?;
            }
            EstimationMode::WhatIf | EstimationMode::Learned(_) => {
                let (oid, name) = self.connector.simulate_index(index)?;
                index.set_hypothetical_identity(oid, name);
                let size = self.connector.estimate_index_size(oid)?;
                index.set_estimated_size(coerce_size(index, size));
            }
        }
        Ok(())
    }

    /// Retire `index` under whichever lifecycle `self.mode` calls for
    fn drop_by_mode(&mut self, index: &Index) -> Result<()> {
        match &self.mode {
            EstimationMode::ActualRuntimes => self.connector.drop_index(index)?,
            EstimationMode::WhatIf | EstimationMode::Learned(_) => self.connector.drop_simulated_index(index)?,
        }
        index.clear_hypothetical_identity();
        Ok(())
    }

    fn relevant_indexes(&mut self, query: &Query, combination: &FrozenIndexSet) -> FrozenIndexSet {
        let key = (query.text.clone(), combination.clone());
        if let Some(cached) = self.relevant_indexes_cache.get(&key) {
            return cached.clone();
        }
        let relevant = FrozenIndexSet::from_iter(
            combination
                .iter()
                .filter(|index| index.columns().iter().any(|c| query.columns.contains(c)))
                .cloned(),
        );
        self.relevant_indexes_cache.insert(key, relevant.clone());
        relevant
    }
}

/// A zero-byte size estimate is treated as a data error: log it and float a 1-byte floor
/// so ratio computations never divide by zero.
fn coerce_size(index: &Index, size: u64) -> u64 {
    if size == 0 {
        tracing::warn!(index = %index, "index size estimation reported 0 bytes; coercing to 1-byte floor");
        1
    } else {
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::InMemoryWhatIfConnector;
    use crate::model::Column;

    fn col(table: &str, name: &str) -> Column {
        Column::new(table, name)
    }

    fn workload() -> Workload {
        Workload::new(vec![
            Query::new("q1", "select * from orders where x = ?", vec![col("orders", "x")], 1.0),
            Query::new(
                "q2",
                "select * from orders where x = ? and y = ?",
                vec![col("orders", "x"), col("orders", "y")],
                2.0,
            ),
        ])
    }

    #[test]
    fn reconciliation_converges_current_indexes_to_the_combination() {
        let connector = InMemoryWhatIfConnector::new();
        let mut eval = CostEvaluation::new(connector);
        let idx = Index::single(col("orders", "x"));
        let combo = IndexCombination::from_vec(vec![idx.clone()]);
        eval.calculate_cost(&workload(), &combo).unwrap();
        assert_eq!(eval.current_indexes().len(), 1);
        assert!(eval.current_indexes().contains(&idx));

        let empty = IndexCombination::new();
        eval.calculate_cost(&workload(), &empty).unwrap();
        assert!(eval.current_indexes().is_empty());
    }

    #[test]
    fn identical_combination_hits_cache_on_second_call() {
        let connector = InMemoryWhatIfConnector::new();
        let mut eval = CostEvaluation::new(connector);
        let idx = Index::single(col("orders", "x"));
        let combo = IndexCombination::from_vec(vec![idx]);
        let w = workload();

        let first = eval.calculate_cost(&w, &combo).unwrap();
        let hits_before = eval.cache_hits();
        let second = eval.calculate_cost(&w, &combo).unwrap();

        assert_eq!(first, second);
        assert_eq!(eval.cache_hits(), hits_before + w.queries.len() as u64);
    }

    #[test]
    fn relevant_indexes_are_always_a_subset_that_intersects_query_columns() {
        let connector = InMemoryWhatIfConnector::new();
        let mut eval = CostEvaluation::new(connector);
        let idx_x = Index::single(col("orders", "x"));
        let idx_unrelated = Index::single(col("orders", "z"));
        let combo = IndexCombination::from_vec(vec![idx_x.clone(), idx_unrelated.clone()]);
        let w = workload();
        eval.calculate_cost(&w, &combo).unwrap();

        let frozen = combo.frozen();
        let relevant = eval.relevant_indexes(&w.queries[0], &frozen);
        assert!(relevant.contains(&idx_x));
        assert!(!relevant.contains(&idx_unrelated));
    }

    #[test]
    fn calculate_cost_after_complete_is_sealed() {
        let connector = InMemoryWhatIfConnector::new();
        let mut eval = CostEvaluation::new(connector);
        eval.complete().unwrap();
        assert!(eval.complete().is_ok(), "complete() must be idempotent");
        let err = eval.calculate_cost(&workload(), &IndexCombination::new()).unwrap_err();
        assert!(matches!(err, IndexAdvisorError::EvaluatorSealed));
    }

    #[test]
    fn zero_byte_size_estimate_is_coerced_to_one() {
        let mut connector = InMemoryWhatIfConnector::new();
        let idx = Index::single(col("orders", "x"));
        connector.set_size(&idx, 0);
        let mut eval = CostEvaluation::new(connector);
        let combo = IndexCombination::from_vec(vec![idx.clone()]);
        eval.calculate_cost(&workload(), &combo).unwrap();
        assert_eq!(idx.estimated_size(), Some(1));
    }

    #[test]
    fn which_indexes_utilized_reports_only_indexes_named_in_the_plan() {
        let connector = InMemoryWhatIfConnector::new();
        let mut eval = CostEvaluation::new(connector);
        let idx = Index::single(col("orders", "x"));
        let combo = IndexCombination::from_vec(vec![idx.clone()]);
        let query = workload().queries[0].clone();
        let (used, _cost) = eval.which_indexes_utilized_and_cost(&query, &combo).unwrap();
        assert!(used.contains(&idx));
    }

    #[test]
    fn estimate_size_simulates_a_not_yet_known_index() {
        let connector = InMemoryWhatIfConnector::new();
        let mut eval = CostEvaluation::new(connector);
        let idx = Index::single(col("orders", "x"));
        assert!(eval.current_indexes().is_empty());

        eval.estimate_size(&idx).unwrap();

        assert!(eval.current_indexes().contains(&idx));
        assert!(idx.estimated_size().is_some());
    }

    #[test]
    fn estimate_size_propagates_a_known_index_size_onto_a_separate_handle() {
        let mut connector = InMemoryWhatIfConnector::new();
        let idx = Index::single(col("orders", "x"));
        connector.set_size(&idx, 4_000_000);
        let mut eval = CostEvaluation::new(connector);
        let combo = IndexCombination::from_vec(vec![idx.clone()]);
        eval.calculate_cost(&workload(), &combo).unwrap();
        assert_eq!(idx.estimated_size(), Some(4_000_000));

        // A distinct `Index` handle naming the same column starts with no
        // evaluator-assigned state of its own; estimate_size must look it up
        // via the canonical handle already tracked in `current_indexes`.
        let other_handle = Index::single(col("orders", "x"));
        assert!(other_handle.estimated_size().is_none());

        eval.estimate_size(&other_handle).unwrap();

        assert_eq!(other_handle.estimated_size(), Some(4_000_000));
    }

    #[test]
    fn actual_runtimes_mode_never_assigns_a_hypothetical_identity() {
        let connector = InMemoryWhatIfConnector::new();
        let mut eval = CostEvaluation::with_mode(connector, EstimationMode::ActualRuntimes);
        let idx = Index::single(col("orders", "x"));
        let combo = IndexCombination::from_vec(vec![idx.clone()]);

        eval.calculate_cost(&workload(), &combo).unwrap();
        assert!(idx.hypopg_name().is_none());
        assert!(idx.estimated_size().is_none());

        eval.complete().unwrap();
        assert!(eval.current_indexes().is_empty());
    }

    proptest::proptest! {
        /// `current_indexes` converges to exactly the requested combination,
        /// for any subset of a fixed column pool.
        #[test]
        fn reconciliation_converges_for_any_requested_subset(
            picked in proptest::collection::hash_set(0usize..5, 0..=5)
        ) {
            let pool: Vec<Column> = ["a", "b", "c", "d", "e"].iter().map(|n| col("orders", n)).collect();
            let indexes: Vec<Index> = picked.iter().map(|&i| Index::single(pool[i].clone())).collect();
            let combo = IndexCombination::from_vec(indexes.clone());

            let connector = InMemoryWhatIfConnector::new();
            let mut eval = CostEvaluation::new(connector);
            let w = Workload::new(vec![Query::new("q", "select 1", pool.clone(), 1.0)]);
            eval.calculate_cost(&w, &combo).unwrap();

            let expected: HashSet<Index> = indexes.into_iter().collect();
            proptest::prop_assert_eq!(eval.current_indexes().clone(), expected);
        }
    }
}
