//! Cost-estimator plug-ins
//!
//! `CostEvaluation` delegates the actual cost/plan lookup to an
//! [`EstimationMode`], chosen once at construction and immutable thereafter.
//! The three modes share the evaluator's caching layer; only the cache-miss
//! path differs. `Learned` recovers the tree/library/transformer cost-model
//! backends from the original implementation, generalized to a single
//! one-method trait so any learned backend can plug in without the
//! evaluator knowing which one it is — the same shape as the engine's
//! `MetricExporter` trait, which lets Prometheus/Grafana/etc. share one
//! collection pipeline.

use crate::connector::{DatabaseConnector, PlanNode};
use crate::errors::Result;
use crate::model::Query;

/// A learned cost model: scores a what-if plan without re-running the optimizer
///
/// Tree-based, library-based, and transformer-based backends are all
/// out of scope for this crate (they are themselves pluggable inference
/// services) — `ConstantMultiplierModel` is the one concrete implementation,
/// standing in for "combine the plan's `total_cost` with a learned
/// multiplier" the way the original tree/lib/former backends do.
pub trait LearnedCostModel {
    fn score(&self, plan: &PlanNode) -> f64;
}

/// A trivial learned model: scales the what-if plan's total cost by a constant
#[derive(Debug, Clone, Copy)]
pub struct ConstantMultiplierModel {
    pub multiplier: f64,
}

impl LearnedCostModel for ConstantMultiplierModel {
    fn score(&self, plan: &PlanNode) -> f64 {
        plan.total_cost * self.multiplier
    }
}

/// Which backend `CostEvaluation` asks for cost/plan estimates
pub enum EstimationMode {
    /// Ask the what-if simulator's optimizer directly (the default)
    WhatIf,
    /// Execute the query for real and use its wall-clock runtime
    ActualRuntimes,
    /// Combine a what-if plan with a learned model's score
    Learned(Box<dyn LearnedCostModel>),
}

impl EstimationMode {
    /// Cost for `query` under whatever indexes `connector` currently has simulated
    pub fn cost(&self, connector: &mut dyn DatabaseConnector, query: &Query) -> Result<f64> {
        match self {
            EstimationMode::WhatIf => connector.get_cost(query),
            EstimationMode::ActualRuntimes => connector.exec_query(query).map(|(runtime, _)| runtime),
            EstimationMode::Learned(model) => {
                let plan = connector.get_plan(query)?;
                Ok(model.score(&plan))
            }
        }
    }

    /// Cost and plan for `query`, for callers that need to inspect which indexes were used
    pub fn plan(&self, connector: &mut dyn DatabaseConnector, query: &Query) -> Result<(f64, PlanNode)> {
        match self {
            EstimationMode::WhatIf => {
                let plan = connector.get_plan(query)?;
                Ok((plan.total_cost, plan))
            }
            EstimationMode::ActualRuntimes => connector.exec_query(query),
            EstimationMode::Learned(model) => {
                let plan = connector.get_plan(query)?;
                let cost = model.score(&plan);
                Ok((cost, plan))
            }
        }
    }
}

impl Default for EstimationMode {
    fn default() -> Self {
        EstimationMode::WhatIf
    }
}
