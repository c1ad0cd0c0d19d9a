pub mod order_ci;

pub use order_ci::{one_sided_bound, two_sided_bound, CiSide};

/// Median of an already-sorted sample; the mean of the two middle values
/// when the length is even. `None` on an empty sample.
pub fn sorted_median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    if n % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}
