//! Heuristic automated index advisor: greedy index selection over a
//! what-if cost oracle.
//!
//! [`extend::ExtendAlgorithm`] drives [`cost_evaluation::CostEvaluation`]
//! against a [`connector::DatabaseConnector`] to pick the set of single- and
//! multi-column indexes that minimizes a workload's estimated cost within a
//! storage or count budget.

pub mod config;
pub mod connector;
pub mod cost_evaluation;
pub mod errors;
pub mod estimators;
pub mod extend;
pub mod model;
pub mod units;

pub use config::{AdvisorConfig, Constraint, SelectionOracle};
pub use connector::{DatabaseConnector, InMemoryWhatIfConnector, PlanNode};
pub use cost_evaluation::CostEvaluation;
pub use errors::{IndexAdvisorError, Result};
pub use estimators::{ConstantMultiplierModel, EstimationMode, LearnedCostModel};
pub use extend::ExtendAlgorithm;
pub use model::{Column, FrozenIndexSet, Index, IndexCombination, Query, Workload};
