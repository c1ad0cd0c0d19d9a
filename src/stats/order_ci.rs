//! Distribution-free confidence intervals for a percentile, expressed as
//! rank indices into a sorted sample.
//!
//! The rank of the true percentile among `n` i.i.d. draws follows
//! Binomial(n, p). A one-sided bound is the largest rank `k` for which the
//! survival `1 - CDF(k)` still reaches the requested confidence.

use serde::{Deserialize, Serialize};
use statrs::distribution::{Binomial, Discrete};

use crate::error::StatsError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CiSide {
    Lower,
    Upper,
}

fn validate(percentile: f64, confidence: f64) -> Result<(), StatsError> {
    if !(confidence > 0.0 && confidence < 100.0) {
        return Err(StatsError::InvalidConfidence(confidence));
    }
    if !(percentile > 0.0 && percentile < 100.0) {
        return Err(StatsError::InvalidPercentile(percentile));
    }
    Ok(())
}

/// 0-based index into a sorted sample of `n_samples` values that bounds
/// `percentile` from the requested `side` with `confidence` (both in percent,
/// exclusive of 0 and 100).
///
/// `Ok(None)` means the sample is too small to reach the confidence; that is
/// expected at small sizes and callers carry it as an undefined bound.
pub fn one_sided_bound(
    n_samples: usize,
    percentile: f64,
    confidence: f64,
    side: CiSide,
) -> Result<Option<usize>, StatsError> {
    validate(percentile, confidence)?;

    if n_samples == 0 {
        return Ok(None);
    }

    // An upper bound is a lower bound on the complementary percentile,
    // mirrored back at the end.
    let p_work = match side {
        CiSide::Lower => percentile,
        CiSide::Upper => 100.0 - percentile,
    };
    let threshold = confidence / 100.0;

    let binomial = Binomial::new(p_work / 100.0, n_samples as u64)
        .map_err(|err| StatsError::Distribution(err.to_string()))?;

    let survival: Vec<f64> = (0..n_samples as u64)
        .scan(0.0_f64, |cdf, k| {
            *cdf += binomial.pmf(k);
            Some((1.0 - *cdf).max(0.0))
        })
        .collect();

    let index = match survival.iter().position(|&s| s < threshold) {
        Some(0) => return Ok(None),
        Some(first_below) => first_below - 1,
        // Survival never drops below the threshold inside the sample.
        None => n_samples - 1,
    };

    Ok(Some(match side {
        CiSide::Lower => index,
        CiSide::Upper => (n_samples - 1) - index,
    }))
}

/// Two-sided interval built from two symmetric one-sided bounds, each at
/// confidence `(confidence + 100) / 2`.
///
/// This is the simplest two-sided construction, not the unique or tightest
/// one. Every trace file is produced with it.
pub fn two_sided_bound(
    n_samples: usize,
    percentile: f64,
    confidence: f64,
) -> Result<(Option<usize>, Option<usize>), StatsError> {
    validate(percentile, confidence)?;

    let one_sided = (confidence + 100.0) / 2.0;
    let lower = one_sided_bound(n_samples, percentile, one_sided, CiSide::Lower)?;
    let upper = one_sided_bound(n_samples, percentile, one_sided, CiSide::Upper)?;

    Ok((lower, upper))
}
