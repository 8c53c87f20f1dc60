use approx::assert_abs_diff_eq;
use sarfit::core::robust_trend::robust_weight;
use sarfit::{robust_trend2d, RobustTrendFitter, RobustTrendParams, SarError, ScatterPoint};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic zero-mean jitter in [-amp/2, amp/2]
fn jitter(i: usize, amp: f64) -> f64 {
    amp * (((i * 7919 + 13) % 97) as f64 / 96.0 - 0.5)
}

fn line_points(n: usize, intercept: f64, slope: f64, noise: f64) -> Vec<ScatterPoint> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            ScatterPoint::new(x, 0.0, intercept + slope * x + jitter(i, noise))
        })
        .collect()
}

#[test]
fn test_constant_trend_noiseless() {
    init_logging();
    let points: Vec<ScatterPoint> = (0..12)
        .map(|i| ScatterPoint::new(i as f64 * 3.0, i as f64 * 7.0, 5.0))
        .collect();

    let coef = robust_trend2d(&points, 1).expect("constant fit failed");
    assert_eq!(coef.len(), 1);
    assert_abs_diff_eq!(coef[0], 5.0, epsilon = 1e-6);

    // An exact fit stops right away and counts as converged
    let fit = RobustTrendFitter::standard().fit(&points, 1).unwrap();
    assert!(fit.converged);
    assert!(fit.iterations <= 2, "exact fit took {} iterations", fit.iterations);
    assert_eq!(fit.chisq, 0.0);
}

#[test]
fn test_linear_trend_noisy() {
    init_logging();
    // z = 3 + 0.02 x over x in [0, 99]; normalized x = (x - 49.5) / 49.5
    let points = line_points(100, 3.0, 0.02, 0.01);

    let coef = robust_trend2d(&points, 2).expect("linear fit failed");
    assert_eq!(coef.len(), 2);
    assert_abs_diff_eq!(coef[0], 3.0 + 0.02 * 49.5, epsilon = 1e-2);
    assert_abs_diff_eq!(coef[1], 0.02 * 49.5, epsilon = 1e-2);
}

#[test]
fn test_planar_trend_noisy() {
    init_logging();
    // x in [0, 90], y in [0, 80]
    let mut points = Vec::new();
    for j in 0..5 {
        for i in 0..10 {
            let x = i as f64 * 10.0;
            let y = j as f64 * 20.0;
            let z = 1.0 + 0.1 * x - 0.05 * y + jitter(points.len(), 0.01);
            points.push(ScatterPoint::new(x, y, z));
        }
    }

    let fit = RobustTrendFitter::standard().fit(&points, 3).expect("planar fit failed");
    assert_eq!(fit.coefficients.len(), 3);
    assert_abs_diff_eq!(fit.coefficients[0], 1.0 + 4.5 - 2.0, epsilon = 1e-2);
    assert_abs_diff_eq!(fit.coefficients[1], 4.5, epsilon = 1e-2);
    assert_abs_diff_eq!(fit.coefficients[2], -2.0, epsilon = 1e-2);

    // Predictions are in original coordinates
    assert_abs_diff_eq!(fit.predict(50.0, 40.0), 1.0 + 5.0 - 2.0, epsilon = 1e-2);
    assert!(fit.mse(&points) < 1e-4);
}

#[test]
fn test_invalid_rank_rejected() {
    let points = line_points(10, 1.0, 1.0, 0.0);
    for rank in [0, 4, 7] {
        match robust_trend2d(&points, rank) {
            Err(SarError::InvalidArgument(_)) => {}
            other => panic!("rank {} should be rejected, got {:?}", rank, other),
        }
    }
}

#[test]
fn test_outlier_barely_moves_robust_fit() {
    init_logging();
    let clean = line_points(50, 2.0, 0.1, 0.02);
    let mut points = clean.clone();
    points[25].z *= 10.0;

    let robust = RobustTrendFitter::standard();
    let ordinary = RobustTrendFitter::new(RobustTrendParams {
        max_iterations: 1,
        ..RobustTrendParams::default()
    });

    let reference = robust.fit(&clean, 2).unwrap();
    let robust_fit = robust.fit(&points, 2).unwrap();
    let ordinary_fit = ordinary.fit(&points, 2).unwrap();

    let robust_shift = (robust_fit.coefficients[0] - reference.coefficients[0]).abs();
    let ordinary_shift = (ordinary_fit.coefficients[0] - reference.coefficients[0]).abs();

    assert!(robust_shift < 0.05, "robust intercept moved by {}", robust_shift);
    assert!(ordinary_shift > 0.5, "ordinary intercept moved by only {}", ordinary_shift);
    assert!(robust_fit.converged);
    assert!(robust_fit.iterations >= 2);

    // The outlier ends up with the smallest weight
    let min_index = robust_fit
        .weights
        .iter()
        .enumerate()
        .fold(0, |best, (i, w)| if *w < robust_fit.weights[best] { i } else { best });
    assert_eq!(min_index, 25);
    assert!(robust_fit.weights[25] < 0.2);
}

#[test]
fn test_weights_monotone_above_threshold() {
    let k = 0.8;
    assert_eq!(robust_weight(k, k), 1.0);
    assert_eq!(robust_weight(0.1, k), 1.0);

    let mut previous = 1.0;
    for step in 1..200 {
        let r = k + step as f64 * 0.05;
        let w = robust_weight(r, k);
        assert!(w <= previous, "weight increased at r={}", r);
        assert!(w > 0.0 && w < 1.0);
        previous = w;
    }
}

#[test]
fn test_iteration_bound_is_respected() {
    let params = RobustTrendParams {
        max_iterations: 3,
        significance_threshold: 0.0,
        ..RobustTrendParams::default()
    };
    let points = line_points(30, 1.0, 0.5, 0.1);
    let fit = RobustTrendFitter::new(params).fit(&points, 2).unwrap();
    assert_eq!(fit.iterations, 3);
    assert!(!fit.converged);
}

#[test]
fn test_too_few_points() {
    let points = line_points(3, 1.0, 0.5, 0.0);
    assert!(matches!(
        robust_trend2d(&points, 2),
        Err(SarError::InsufficientData { found: 3, .. })
    ));
}
