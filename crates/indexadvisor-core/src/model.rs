//! Domain value types: columns, indexes, queries, workloads
//!
//! Columns, queries and workloads are plain immutable values. `Index` is the
//! one type in this module with mutable state: once a candidate index is
//! simulated by the evaluator it gains a size estimate and a hypothetical
//! identity, and every outstanding clone of that `Index` must observe the
//! update without the caller re-fetching anything. `Index` is therefore a
//! cheap `Arc` handle around an immutable column list and a side table of
//! `parking_lot::RwLock`-guarded evaluator state, the same sharing idiom the
//! engine uses for its own long-lived maps.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::errors::{IndexAdvisorError, Result};

/// A single column, identified by the table it belongs to and its name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Column {
    pub table: String,
    pub name: String,
}

impl Column {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.name)
    }
}

struct IndexState {
    columns: Vec<Column>,
    estimated_size: RwLock<Option<u64>>,
    hypopg_oid: RwLock<Option<i64>>,
    hypopg_name: RwLock<Option<String>>,
}

/// An ordered, non-empty sequence of columns from one table
///
/// Cloning an `Index` is an `Arc` bump, not a deep copy: the evaluator's
/// `estimated_size`/`hypopg_*` writes are visible through every clone. Equality,
/// hashing and ordering are defined over `columns` alone, so two `Index` values
/// with different evaluator-assigned state still compare equal as long as they
/// name the same columns in the same order.
#[derive(Clone)]
pub struct Index(Arc<IndexState>);

impl Index {
    /// Build a new index handle. Fails if `columns` is empty or spans more than one table.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let first = columns
            .first()
            .ok_or_else(|| IndexAdvisorError::Internal("index must have at least one column".into()))?;
        let table = first.table.clone();
        if columns.iter().any(|c| c.table != table) {
            return Err(IndexAdvisorError::Internal(
                "index columns must all belong to the same table".into(),
            ));
        }
        Ok(Self(Arc::new(IndexState {
            columns,
            estimated_size: RwLock::new(None),
            hypopg_oid: RwLock::new(None),
            hypopg_name: RwLock::new(None),
        })))
    }

    /// Convenience constructor for a single-column index
    pub fn single(column: Column) -> Self {
        Self::new(vec![column]).expect("a single column always forms a valid index")
    }

    pub fn columns(&self) -> &[Column] {
        &self.0.columns
    }

    pub fn table(&self) -> &str {
        &self.0.columns[0].table
    }

    pub fn is_single_column(&self) -> bool {
        self.0.columns.len() == 1
    }

    /// True if `col` belongs to this index's table and is not already part of it
    pub fn appendable_by(&self, col: &Column) -> bool {
        col.table == self.table() && !self.0.columns.contains(col)
    }

    /// Build the multi-column index formed by appending `col` to this one
    pub fn extended_with(&self, col: &Column) -> Result<Index> {
        let mut columns = self.0.columns.clone();
        columns.push(col.clone());
        Index::new(columns)
    }

    pub fn estimated_size(&self) -> Option<u64> {
        *self.0.estimated_size.read()
    }

    pub fn set_estimated_size(&self, size: u64) {
        *self.0.estimated_size.write() = Some(size);
    }

    pub fn hypopg_oid(&self) -> Option<i64> {
        *self.0.hypopg_oid.read()
    }

    pub fn hypopg_name(&self) -> Option<String> {
        self.0.hypopg_name.read().clone()
    }

    pub fn set_hypothetical_identity(&self, oid: i64, name: String) {
        *self.0.hypopg_oid.write() = Some(oid);
        *self.0.hypopg_name.write() = Some(name);
    }

    /// Clear size and hypothetical-index identity, e.g. after a drop
    pub fn clear_hypothetical_identity(&self) {
        *self.0.hypopg_oid.write() = None;
        *self.0.hypopg_name.write() = None;
        *self.0.estimated_size.write() = None;
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("columns", &self.0.columns)
            .field("estimated_size", &self.estimated_size())
            .field("hypopg_name", &self.hypopg_name())
            .finish()
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.table())?;
        for (i, col) in self.0.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", col.name)?;
        }
        write!(f, ")")
    }
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.0.columns == other.0.columns
    }
}

impl Eq for Index {}

impl Hash for Index {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.columns.hash(state);
    }
}

impl PartialOrd for Index {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Index {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.columns.cmp(&other.0.columns)
    }
}

/// A query from the workload, along with the columns it references and its relative weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    pub text: String,
    pub columns: Vec<Column>,
    pub frequency: f64,
}

impl Query {
    pub fn new(id: impl Into<String>, text: impl Into<String>, columns: Vec<Column>, frequency: f64) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            columns,
            frequency,
        }
    }
}

/// An ordered list of queries, each with its execution frequency
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workload {
    pub queries: Vec<Query>,
}

impl Workload {
    pub fn new(queries: Vec<Query>) -> Self {
        Self { queries }
    }

    /// All single-column indexes over columns referenced by any query in the workload
    ///
    /// Returned in first-seen order (deduplicated) rather than as a `HashSet` so that
    /// the selection algorithm's layer-by-layer evaluation order is deterministic.
    pub fn potential_indexes(&self) -> Vec<Index> {
        let mut seen = std::collections::HashSet::new();
        let mut indexes = Vec::new();
        for query in &self.queries {
            for column in &query.columns {
                if seen.insert(column.clone()) {
                    indexes.push(Index::single(column.clone()));
                }
            }
        }
        indexes
    }
}

/// A sorted, deduplicated, hashable set of indexes
///
/// Used wherever a combination needs a frozen, order-independent identity:
/// evaluator cache keys and the `current_indexes == set(combination)`
/// reconciliation check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FrozenIndexSet(Vec<Index>);

impl FrozenIndexSet {
    pub fn from_iter<I: IntoIterator<Item = Index>>(iter: I) -> Self {
        let mut indexes: Vec<Index> = iter.into_iter().collect();
        indexes.sort();
        indexes.dedup();
        Self(indexes)
    }

    pub fn contains(&self, index: &Index) -> bool {
        self.0.binary_search(index).is_ok()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Index> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a FrozenIndexSet {
    type Item = &'a Index;
    type IntoIter = std::slice::Iter<'a, Index>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// An ordered sequence of indexes, recording insertion order for debuggability
///
/// Identity for caching and budget checks always goes through [`FrozenIndexSet`]
/// via [`IndexCombination::frozen`]; the `Vec` order itself only matters for
/// explaining how the algorithm arrived at a combination.
#[derive(Debug, Clone, Default)]
pub struct IndexCombination(Vec<Index>);

impl IndexCombination {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_vec(indexes: Vec<Index>) -> Self {
        Self(indexes)
    }

    pub fn indexes(&self) -> &[Index] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, index: &Index) -> bool {
        self.0.contains(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Index> {
        self.0.iter()
    }

    pub fn total_size(&self) -> u64 {
        self.0.iter().map(|i| i.estimated_size().unwrap_or(0)).sum()
    }

    pub fn frozen(&self) -> FrozenIndexSet {
        FrozenIndexSet::from_iter(self.0.iter().cloned())
    }

    /// A copy with `index` appended at the end
    pub fn with_pushed(&self, index: Index) -> IndexCombination {
        let mut indexes = self.0.clone();
        indexes.push(index);
        IndexCombination(indexes)
    }

    /// A copy with the index at `position` removed and `replacement` appended at the end
    ///
    /// This is the "extend" move: widening an existing index moves it to the end of the
    /// insertion-order history rather than replacing it in place.
    pub fn with_extended(&self, position: usize, replacement: Index) -> IndexCombination {
        let mut indexes = self.0.clone();
        indexes.remove(position);
        indexes.push(replacement);
        IndexCombination(indexes)
    }
}

impl IntoIterator for IndexCombination {
    type Item = Index;
    type IntoIter = std::vec::IntoIter<Index>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(table: &str, name: &str) -> Column {
        Column::new(table, name)
    }

    #[test]
    fn index_equality_ignores_mutable_state() {
        let idx_a = Index::single(col("orders", "customer_id"));
        let idx_b = Index::single(col("orders", "customer_id"));
        idx_a.set_estimated_size(4096);
        idx_a.set_hypothetical_identity(7, "<77>btree_orders_customer_id".to_string());
        assert_eq!(idx_a, idx_b);
        assert_eq!(idx_b.estimated_size(), None);
    }

    #[test]
    fn clones_share_mutable_state() {
        let idx = Index::single(col("orders", "customer_id"));
        let clone = idx.clone();
        idx.set_estimated_size(1024);
        assert_eq!(clone.estimated_size(), Some(1024));
    }

    #[test]
    fn appendable_by_rejects_other_table_and_duplicate_column() {
        let idx = Index::single(col("orders", "customer_id"));
        assert!(idx.appendable_by(&col("orders", "order_date")));
        assert!(!idx.appendable_by(&col("customers", "id")));
        assert!(!idx.appendable_by(&col("orders", "customer_id")));
    }

    #[test]
    fn rejects_empty_and_cross_table_indexes() {
        assert!(Index::new(Vec::new()).is_err());
        assert!(Index::new(vec![col("orders", "id"), col("customers", "id")]).is_err());
    }

    #[test]
    fn potential_indexes_deduplicates_in_first_seen_order() {
        let workload = Workload::new(vec![
            Query::new("q1", "...", vec![col("orders", "x")], 1.0),
            Query::new("q2", "...", vec![col("orders", "x"), col("orders", "y")], 1.0),
        ]);
        let potentials = workload.potential_indexes();
        assert_eq!(potentials.len(), 2);
        assert_eq!(potentials[0].columns(), &[col("orders", "x")]);
        assert_eq!(potentials[1].columns(), &[col("orders", "y")]);
    }

    #[test]
    fn frozen_set_is_order_independent() {
        let a = Index::single(col("orders", "x"));
        let b = Index::single(col("orders", "y"));
        let s1 = FrozenIndexSet::from_iter(vec![a.clone(), b.clone()]);
        let s2 = FrozenIndexSet::from_iter(vec![b, a]);
        assert_eq!(s1, s2);
    }

    #[test]
    fn extend_moves_widened_index_to_the_end() {
        let a = Index::single(col("orders", "x"));
        let b = Index::single(col("orders", "y"));
        let combo = IndexCombination::from_vec(vec![a.clone(), b.clone()]);
        let wide = a.extended_with(&col("orders", "z")).unwrap();
        let extended = combo.with_extended(0, wide.clone());
        assert_eq!(extended.indexes(), &[b, wide]);
    }
}
