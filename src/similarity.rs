//! Sparse vector algebra over [`TermVector`]s.
//!
//! Pure functions with no I/O. Every function treats an absent term as a
//! weight of 0.

use crate::vector::TermVector;
use std::cmp::Ordering;

/// Compute the dot product of two sparse vectors.
///
/// Returns sum(a[k] * b[k]) over the terms present in both vectors.
#[inline]
pub fn dot(a: &TermVector, b: &TermVector) -> f64 {
    // Merge walk over both term-ordered vectors; the summation order is the
    // same for dot(a, b) and dot(b, a).
    let mut a_it = a.iter();
    let mut b_it = b.iter();
    let mut a_next = a_it.next();
    let mut b_next = b_it.next();
    let mut result = 0.0f64;

    while let (Some((ta, wa)), Some((tb, wb))) = (a_next, b_next) {
        match ta.cmp(tb) {
            Ordering::Equal => {
                result += wa * wb;
                a_next = a_it.next();
                b_next = b_it.next();
            }
            Ordering::Less => a_next = a_it.next(),
            Ordering::Greater => b_next = b_it.next(),
        }
    }
    result
}

/// Compute the Euclidean norm of a sparse vector.
///
/// Returns sqrt(sum(v[k]^2))
#[inline]
pub fn magnitude(v: &TermVector) -> f64 {
    v.iter().map(|(_, w)| w * w).sum::<f64>().sqrt()
}

/// Compute the cosine similarity between two sparse vectors.
///
/// Returns dot(a, b) / (||a|| * ||b||)
///
/// If either vector has zero magnitude the similarity is defined as `0.0`,
/// so an empty document or centroid never produces NaN.
#[inline]
pub fn cosine(a: &TermVector, b: &TermVector) -> f64 {
    let denom = magnitude(a) * magnitude(b);
    if denom == 0.0 {
        0.0
    } else {
        dot(a, b) / denom
    }
}

/// Element-wise mean of a sequence of sparse vectors.
///
/// Each term's weight is summed over every input and divided by the number
/// of inputs; a vector lacking the term contributes 0 but still counts in the
/// denominator. `mean([])` is the empty vector.
pub fn mean<'a, I>(vectors: I) -> TermVector
where
    I: IntoIterator<Item = &'a TermVector>,
{
    let mut totals = TermVector::new();
    let mut count = 0usize;

    for v in vectors {
        for (term, w) in v.iter() {
            *totals.entry_mut(term) += w;
        }
        count += 1;
    }

    if count > 0 {
        let n = count as f64;
        for w in totals.values_mut() {
            *w /= n;
        }
    }
    totals
}

/// Weighted element-wise mean: sum(w_i * v_i) / sum(w_i).
///
/// Inputs with weight 0 are skipped. Returns the empty vector when the total
/// weight is 0.
pub fn weighted_mean<'a, I>(vectors: I) -> TermVector
where
    I: IntoIterator<Item = (&'a TermVector, f64)>,
{
    let mut totals = TermVector::new();
    let mut weight_sum = 0.0f64;

    for (v, weight) in vectors {
        if weight == 0.0 {
            continue;
        }
        for (term, w) in v.iter() {
            *totals.entry_mut(term) += w * weight;
        }
        weight_sum += weight;
    }

    if weight_sum > 0.0 {
        for w in totals.values_mut() {
            *w /= weight_sum;
        }
    }
    totals
}
