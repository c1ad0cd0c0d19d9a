use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use prr_traces_lib::stats::{one_sided_bound, sorted_median, two_sided_bound, CiSide};

fn sorted_sample(rng: &mut StdRng, n: usize) -> Vec<f64> {
    let mut sample: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
    sample.sort_by(f64::total_cmp);
    sample
}

#[test]
fn twenty_samples_median_at_75_percent() {
    assert_eq!(two_sided_bound(20, 50.0, 75.0).unwrap(), (Some(6), Some(13)));

    let mut rng = StdRng::seed_from_u64(20);
    let sample = sorted_sample(&mut rng, 20);
    let median = sorted_median(&sample).unwrap();
    assert_relative_eq!(median, (sample[9] + sample[10]) / 2.0);
    assert!(sample[6] <= median && median <= sample[13]);
}

#[test]
fn two_sided_band_covers_the_true_median() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let (lower, upper) = two_sided_bound(20, 50.0, 75.0).unwrap();
    let (lower, upper) = (lower.unwrap(), upper.unwrap());

    let trials = 2000;
    let covered = (0..trials)
        .filter(|_| {
            let sample = sorted_sample(&mut rng, 20);
            sample[lower] <= 0.5 && 0.5 <= sample[upper]
        })
        .count();
    // Exact coverage for these indices is about 0.885.
    assert!(covered as f64 / trials as f64 > 0.8, "covered {covered}/{trials}");
}

#[test]
fn bounds_tighten_as_confidence_drops() {
    for n in [10, 25, 60, 200] {
        let mut previous: Option<usize> = None;
        for confidence in [99.0, 95.0, 90.0, 75.0, 60.0] {
            let Some(bound) = one_sided_bound(n, 50.0, confidence, CiSide::Lower).unwrap() else {
                continue;
            };
            if let Some(previous) = previous {
                assert!(bound >= previous, "n={n} confidence={confidence}");
            }
            previous = Some(bound);
        }
    }
}

#[test]
fn invalid_arguments_are_rejected() {
    assert!(two_sided_bound(20, 0.0, 75.0).is_err());
    assert!(two_sided_bound(20, 50.0, 100.0).is_err());
    assert!(one_sided_bound(20, 150.0, 75.0, CiSide::Upper).is_err());
}
