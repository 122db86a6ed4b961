//! Shared statistical helpers.
//!
//! Free functions over `&[f64]` used across the partitioners and the fold
//! evaluator: descriptive moments, the coefficient of variation scoring
//! random block assignments, column-wise standardization for environmental
//! clustering, and the two-sample Kolmogorov–Smirnov distance driving the
//! distribution-matched search.

use crate::error::{ParcelarError, Result};

/// Arithmetic mean. Returns 0.0 for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation. Returns 0.0 for an empty slice.
#[must_use]
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Coefficient of variation (std / mean).
///
/// Returns +inf when the mean is zero, which makes assignments with empty
/// folds sort after every balanced assignment in the block search.
#[must_use]
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m == 0.0 {
        return f64::INFINITY;
    }
    std_dev(values) / m
}

/// Standardizes rows column-wise to zero mean and unit variance.
///
/// Constant columns are centered but left unscaled. All rows must share one
/// length.
///
/// # Errors
///
/// Returns [`ParcelarError::EmptyInput`] for zero rows and
/// [`ParcelarError::InvalidConfig`] for ragged rows.
pub fn standardize(rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    if rows.is_empty() {
        return Err(ParcelarError::empty_input("standardize"));
    }
    let width = rows[0].len();
    if rows.iter().any(|r| r.len() != width) {
        return Err(ParcelarError::invalid_config(
            "rows",
            "ragged",
            "equal-length rows",
        ));
    }
    let n = rows.len() as f64;
    let mut means = vec![0.0; width];
    let mut stds = vec![0.0; width];
    for row in rows {
        for (j, v) in row.iter().enumerate() {
            means[j] += v;
        }
    }
    for m in &mut means {
        *m /= n;
    }
    for row in rows {
        for (j, v) in row.iter().enumerate() {
            stds[j] += (v - means[j]).powi(2);
        }
    }
    for s in &mut stds {
        *s = (*s / n).sqrt();
        if *s == 0.0 {
            *s = 1.0;
        }
    }
    Ok(rows
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(j, v)| (v - means[j]) / stds[j])
                .collect()
        })
        .collect())
}

/// Two-sample Kolmogorov–Smirnov statistic: the maximum absolute difference
/// between the empirical CDFs of `a` and `b`.
///
/// # Errors
///
/// Returns [`ParcelarError::EmptyInput`] when either sample is empty.
pub fn ks_statistic(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.is_empty() || b.is_empty() {
        return Err(ParcelarError::empty_input("ks samples"));
    }
    let mut sa = a.to_vec();
    let mut sb = b.to_vec();
    sa.sort_by(f64::total_cmp);
    sb.sort_by(f64::total_cmp);

    let (na, nb) = (sa.len() as f64, sb.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;
    while i < sa.len() && j < sb.len() {
        // Consume the whole run of the smallest pending value on both sides
        // before comparing: evaluating mid-run would record a supremum
        // neither ECDF attains when the samples tie with unequal counts.
        let v = if sa[i] <= sb[j] { sa[i] } else { sb[j] };
        while i < sa.len() && sa[i] == v {
            i += 1;
        }
        while j < sb.len() && sb[j] == v {
            j += 1;
        }
        d = d.max((i as f64 / na - j as f64 / nb).abs());
    }
    Ok(d)
}
