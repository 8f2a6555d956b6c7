use crate::types::DocumentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A sparse term -> weight vector.
///
/// Absent terms have weight 0. Terms are kept ordered so that sums over a
/// vector are evaluated in the same order on every rank and every run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TermVector {
    weights: BTreeMap<String, f64>,
}

impl TermVector {
    /// Create an empty (all-zero) vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a vector from `(term, weight)` pairs. Later duplicates win.
    pub fn from_pairs<I, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, f64)>,
        T: Into<String>,
    {
        Self {
            weights: pairs.into_iter().map(|(t, w)| (t.into(), w)).collect(),
        }
    }

    /// Weight of `term`, 0 when absent.
    #[inline]
    pub fn get(&self, term: &str) -> f64 {
        self.weights.get(term).copied().unwrap_or(0.0)
    }

    /// Set the weight of a term.
    pub fn insert(&mut self, term: impl Into<String>, weight: f64) {
        self.weights.insert(term.into(), weight);
    }

    /// Number of stored (non-implicit) terms.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.weights.len()
    }

    /// True when no term is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Iterate `(term, weight)` in term order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.weights.iter().map(|(t, &w)| (t.as_str(), w))
    }

    /// Return the `n` heaviest terms, heaviest first. Ties keep term order.
    pub fn top_terms(&self, n: usize) -> Vec<(&str, f64)> {
        let mut terms: Vec<(&str, f64)> = self.iter().collect();
        terms.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        terms.truncate(n);
        terms
    }

    pub(crate) fn entry_mut(&mut self, term: &str) -> &mut f64 {
        self.weights.entry(term.to_owned()).or_insert(0.0)
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut f64> + '_ {
        self.weights.values_mut()
    }
}

impl<T: Into<String>> FromIterator<(T, f64)> for TermVector {
    fn from_iter<I: IntoIterator<Item = (T, f64)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

/// A document: its identifier plus its TF-IDF vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub vector: TermVector,
}

impl Document {
    /// Create a new document.
    pub fn new(id: impl Into<DocumentId>, vector: TermVector) -> Self {
        Self {
            id: id.into(),
            vector,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_term_is_zero() {
        let v = TermVector::from_pairs([("love", 0.5)]);
        assert_eq!(v.get("love"), 0.5);
        assert_eq!(v.get("hate"), 0.0);
        assert_eq!(v.nnz(), 1);
    }

    #[test]
    fn test_top_terms() {
        let v = TermVector::from_pairs([("a", 0.1), ("b", 0.9), ("c", 0.5), ("d", 0.5)]);
        let top = v.top_terms(3);
        assert_eq!(top, vec![("b", 0.9), ("c", 0.5), ("d", 0.5)]);
        assert_eq!(v.top_terms(10).len(), 4);
    }

    #[test]
    fn test_entry_mut() {
        let mut v = TermVector::new();
        *v.entry_mut("x") += 2.0;
        *v.entry_mut("x") += 1.0;
        assert_eq!(v.get("x"), 3.0);
    }
}
