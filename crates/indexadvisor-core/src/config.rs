//! Advisor configuration
//!
//! Plain struct with a `Default` impl, validated once at construction, the
//! same shape as other flat service configs in this codebase. `from_map`
//! adds the one extra seam this advisor needs: a flat `key -> value` mapping
//! where an unrecognized key is a hard error rather than a silently ignored
//! typo.

use std::collections::HashMap;

use serde_json::Value;

use crate::errors::{IndexAdvisorError, Result};

/// Which resource the search loop is bounded by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// `budget_mb` applies; index count is unlimited.
    Storage,
    /// `max_indexes` applies; storage budget is unused.
    Number,
}

/// The scoring function the search loop uses to rank candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOracle {
    /// `(current_cost - new_cost) / mb(size_delta)` — the default.
    BenefitPerStorage,
    /// `current_cost - new_cost`, ignoring size entirely.
    BenefitPure,
    /// `-new_cost * mb(size_delta)`.
    CostPerStorage,
    /// `-new_cost`, ignoring size entirely.
    CostPure,
}

impl SelectionOracle {
    /// Score a candidate step, given its absolute cost, the benefit over the
    /// current cost, and the size delta already converted to megabytes
    pub fn score(&self, new_cost: f64, benefit: f64, size_delta_mb: f64) -> f64 {
        match self {
            SelectionOracle::BenefitPerStorage => benefit / size_delta_mb,
            SelectionOracle::BenefitPure => benefit,
            SelectionOracle::CostPerStorage => -new_cost * size_delta_mb,
            SelectionOracle::CostPure => -new_cost,
        }
    }
}

/// Tunable parameters for [`crate::extend::ExtendAlgorithm`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvisorConfig {
    /// Storage budget for the final combination, in megabytes. Only consulted
    /// under `Constraint::Storage`.
    pub budget_mb: u64,
    /// Maximum number of columns in any one index.
    pub max_index_width: usize,
    /// A candidate must satisfy `new_cost * min_cost_improvement < current_cost`.
    pub min_cost_improvement: f64,
    /// Maximum number of indexes in the combination. Only consulted under
    /// `Constraint::Number`.
    pub max_indexes: usize,
    pub constraint: Constraint,
    pub sel_oracle: SelectionOracle,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            budget_mb: 100,
            max_index_width: 2,
            min_cost_improvement: 1.003,
            max_indexes: 5,
            constraint: Constraint::Storage,
            sel_oracle: SelectionOracle::BenefitPerStorage,
        }
    }
}

const KNOWN_KEYS: &[&str] = &[
    "budget_mb",
    "max_index_width",
    "min_cost_improvement",
    "max_indexes",
    "constraint",
    "sel_oracle",
];

impl AdvisorConfig {
    /// Build a config from a flat JSON-value map, filling missing keys from
    /// [`AdvisorConfig::default`] and rejecting any key this advisor doesn't
    /// recognize.
    pub fn from_map(map: &HashMap<String, Value>) -> Result<Self> {
        if let Some(unknown) = map.keys().find(|k| !KNOWN_KEYS.contains(&k.as_str())) {
            return Err(IndexAdvisorError::ConfigUnknownKey(unknown.clone()));
        }

        let mut config = Self::default();

        if let Some(v) = map.get("budget_mb") {
            config.budget_mb = as_u64(v, "budget_mb")?;
        }
        if let Some(v) = map.get("max_index_width") {
            config.max_index_width = as_u64(v, "max_index_width")? as usize;
        }
        if let Some(v) = map.get("min_cost_improvement") {
            config.min_cost_improvement = v.as_f64().ok_or_else(|| config_invalid("min_cost_improvement", v))?;
        }
        if let Some(v) = map.get("max_indexes") {
            config.max_indexes = as_u64(v, "max_indexes")? as usize;
        }
        if let Some(v) = map.get("constraint") {
            config.constraint = match v.as_str() {
                Some("storage") => Constraint::Storage,
                Some("number") => Constraint::Number,
                _ => return Err(config_invalid("constraint", v)),
            };
        }
        if let Some(v) = map.get("sel_oracle") {
            config.sel_oracle = match v.as_str() {
                Some("benefit_per_sto") => SelectionOracle::BenefitPerStorage,
                Some("benefit_pure") => SelectionOracle::BenefitPure,
                Some("cost_per_sto") => SelectionOracle::CostPerStorage,
                Some("cost_pure") => SelectionOracle::CostPure,
                _ => return Err(config_invalid("sel_oracle", v)),
            };
        }

        if config.min_cost_improvement <= 0.0 {
            return Err(IndexAdvisorError::ConfigInvalid {
                key: "min_cost_improvement".into(),
                message: "must be positive".into(),
            });
        }

        Ok(config)
    }
}

fn as_u64(value: &Value, key: &str) -> Result<u64> {
    value.as_u64().ok_or_else(|| config_invalid(key, value))
}

fn config_invalid(key: &str, value: &Value) -> IndexAdvisorError {
    IndexAdvisorError::ConfigInvalid {
        key: key.to_string(),
        message: format!("unexpected value {value}"),
    }
}
