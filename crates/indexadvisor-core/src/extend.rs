//! Greedy layered index selection: one round over single-column candidates,
//! one round over column-append extensions, best-ratio tracking, terminate
//! when nothing beats a ratio of zero.

use crate::config::{AdvisorConfig, Constraint};
use crate::connector::DatabaseConnector;
use crate::cost_evaluation::CostEvaluation;
use crate::errors::Result;
use crate::estimators::EstimationMode;
use crate::model::{Index, IndexCombination, Workload};
use crate::units;

/// The running best candidate found in one layer of the search
struct Best {
    combination: Option<IndexCombination>,
    ratio: f64,
    cost: f64,
}

impl Default for Best {
    fn default() -> Self {
        Self {
            combination: None,
            ratio: 0.0,
            cost: f64::INFINITY,
        }
    }
}

/// Greedy layered index selection driven by one [`CostEvaluation`]
///
/// Owns the evaluator (and, through it, the connector) for the lifetime of
/// one `recommend` run. Does not call `complete()` automatically: whichever
/// caller holds the algorithm decides when to release the simulated indexes,
/// since doing so clears `estimated_size`/hypothetical identity from the
/// indexes in the returned combination.
pub struct ExtendAlgorithm<C: DatabaseConnector> {
    config: AdvisorConfig,
    evaluator: CostEvaluation<C>,
}

impl<C: DatabaseConnector> ExtendAlgorithm<C> {
    pub fn new(connector: C, config: AdvisorConfig) -> Self {
        Self::with_mode(connector, config, EstimationMode::default())
    }

    pub fn with_mode(connector: C, config: AdvisorConfig, mode: EstimationMode) -> Self {
        Self {
            config,
            evaluator: CostEvaluation::with_mode(connector, mode),
        }
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Drop every index this run simulated and seal the evaluator
    pub fn complete(&mut self) -> Result<()> {
        self.evaluator.complete()
    }

    /// Search for the index combination minimizing `workload`'s estimated cost
    pub fn recommend(&mut self, workload: &Workload) -> Result<IndexCombination> {
        if self.is_degenerate() {
            return Ok(IndexCombination::new());
        }

        let single_candidates = workload.potential_indexes();
        if single_candidates.is_empty() {
            return Ok(IndexCombination::new());
        }
        let extension_candidates = single_candidates.clone();

        let mut combination = IndexCombination::new();
        let mut current_cost = self.evaluator.calculate_cost(workload, &combination)?;
        let initial_cost = current_cost;
        let budget_bytes = units::mb_to_bytes(self.config.budget_mb);

        loop {
            let mut best = Best::default();

            // Under `Constraint::Number`, once the combination already holds
            // `max_indexes` entries no *new* single-column index may be added —
            // but widening an index already in the combination doesn't change
            // its count, so the append layer below still runs.
            let at_count_cap =
                self.config.constraint == Constraint::Number && combination.len() >= self.config.max_indexes;

            if !at_count_cap {
                let size_so_far = combination.total_size();
                let filtered = self.prune(&single_candidates, budget_bytes, size_so_far);
                for candidate_index in &filtered {
                    if combination.contains(candidate_index) {
                        continue;
                    }
                    let candidate = combination.with_pushed(candidate_index.clone());
                    self.evaluate(workload, &candidate, &mut best, current_cost, 0)?;
                }
            }

            for attribute in &extension_candidates {
                let column = &attribute.columns()[0];
                for (position, idx) in combination.iter().enumerate() {
                    if idx.columns().len() >= self.config.max_index_width {
                        continue;
                    }
                    if !idx.appendable_by(column) {
                        continue;
                    }
                    let widened = idx.extended_with(column)?;
                    if combination.contains(&widened) {
                        continue;
                    }
                    let old_size = idx.estimated_size().unwrap_or(0);
                    let candidate = combination.with_extended(position, widened);
                    self.evaluate(workload, &candidate, &mut best, current_cost, old_size)?;
                }
            }

            if best.ratio <= 0.0 {
                tracing::debug!(current_cost, "no candidate cleared a positive ratio; stopping");
                break;
            }
            combination = best
                .combination
                .take()
                .expect("a positive ratio always accompanies a recorded combination");
            current_cost = best.cost;
            tracing::debug!(indexes = combination.len(), current_cost, "accepted a new layer");
        }

        tracing::info!(
            initial_cost,
            final_cost = current_cost,
            indexes = combination.len(),
            "extend search complete"
        );
        Ok(combination)
    }

    /// `true` when the configured resource limit is exhausted before the search even starts
    fn is_degenerate(&self) -> bool {
        match self.config.constraint {
            Constraint::Number => self.config.max_indexes == 0,
            Constraint::Storage => self.config.budget_mb == 0,
        }
    }

    /// Evaluate one candidate combination, updating `best` if it is the new leader
    ///
    /// Returns the candidate's ratio (negative/zero when rejected).
    fn evaluate(
        &mut self,
        workload: &Workload,
        candidate: &IndexCombination,
        best: &mut Best,
        current_cost: f64,
        old_size: u64,
    ) -> Result<f64> {
        let cost = self.evaluator.calculate_cost(workload, candidate)?;
        if cost * self.config.min_cost_improvement >= current_cost {
            return Ok(-1.0);
        }

        let benefit = current_cost - cost;
        let last = candidate
            .indexes()
            .last()
            .expect("candidate always gains an index via push or extend before evaluation");
        let new_size = last.estimated_size().unwrap_or(0);
        let mut size_delta = new_size.saturating_sub(old_size);
        if size_delta == 0 {
            size_delta = 1;
        }
        let ratio = self
            .config
            .sel_oracle
            .score(cost, benefit, units::bytes_to_mb(size_delta));

        let within_budget = match self.config.constraint {
            Constraint::Storage => candidate.total_size() <= units::mb_to_bytes(self.config.budget_mb),
            Constraint::Number => true,
        };

        if ratio > best.ratio && within_budget {
            best.ratio = ratio;
            best.cost = cost;
            best.combination = Some(candidate.clone());
        }
        Ok(ratio)
    }

    /// Single-column candidates that could still fit the remaining budget
    ///
    /// An unknown `estimated_size` is kept (optimistic: better to evaluate and let
    /// the improvement/budget gate reject it than prune it blindly). Under
    /// `Constraint::Number` no pruning happens at all; the budget is unused.
    fn prune(&self, candidates: &[Index], budget_bytes: u64, size_so_far: u64) -> Vec<Index> {
        if self.config.constraint == Constraint::Number {
            return candidates.to_vec();
        }
        let remaining = budget_bytes.saturating_sub(size_so_far);
        candidates
            .iter()
            .filter(|c| c.estimated_size().map_or(true, |size| size <= remaining))
            .cloned()
            .collect()
    }
}
