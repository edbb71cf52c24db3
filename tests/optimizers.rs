use mfcore::algorithms::{newton_residual, solve_newton_direction};
use mfcore::prelude::*;
use mfcore::routines::linalg::{frobenius_inner, is_positive_definite, matrix_sqrt};
use ndarray::{array, Array1, Array2};

fn quiet_settings() -> Settings {
    let mut settings = Settings::new();
    settings.log.write = false;
    settings.output.write = false;
    settings
}

fn max_diagonal_error(x: &Array2<f64>) -> f64 {
    x.diag().iter().map(|d| (d - 1.0).abs()).fold(0.0, f64::max)
}

#[test]
fn matrix_sqrt_squares_back_to_clamped_input() {
    // eigenvalues 3 and 1
    let m = array![[2.0, 1.0], [1.0, 2.0]];
    for floor in [0.0, 0.5, 2.0] {
        let s = matrix_sqrt(&m, floor).unwrap();
        let expected = if floor <= 1.0 {
            m.clone()
        } else {
            // eigenvalue 1 raised to 2, eigenvalue 3 kept
            array![[2.5, 0.5], [0.5, 2.5]]
        };
        let squared = s.dot(&s);
        for ((i, j), value) in squared.indexed_iter() {
            assert!((value - expected[(i, j)]).abs() < 1e-10);
            assert_eq!(s[(i, j)], s[(j, i)]);
        }
    }
}

#[test]
fn identity_loss_is_gram_trace() {
    let workload = Workload::prefix_sum(4).unwrap();
    assert_eq!(workload.gram().diag().sum(), 10.0);
    assert!((loss(workload.gram(), &Array2::eye(4)).unwrap() - 10.0).abs() < 1e-12);

    let workload = Workload::prefix_sum(7).unwrap();
    let trace: f64 = workload.gram().diag().sum();
    assert!((loss(workload.gram(), &Array2::eye(7)).unwrap() - trace).abs() < 1e-10);
}

#[test]
fn gradient_descent_one_step_below_identity_loss() {
    let workload = Workload::prefix_sum(4).unwrap();
    let options = GradientDescentConfig {
        iterations: 1,
        step_size: 1.0,
        armijo: true,
    };
    let mut gd =
        GradientDescent::new(&workload, Array2::eye(4), options, LineSearch::default()).unwrap();
    let result = gd.fit().unwrap();
    assert!(result.loss() < 10.0);
    assert_eq!(result.status(), &Status::MaxIterations);
}

#[test]
fn gradient_descent_trace_is_non_increasing_from_phi_start() {
    let workload = Workload::prefix_sum(5).unwrap();
    let v0 = array![0.5, 1.7, 0.9, 2.3, 1.1];
    let initial = phi(&workload, &v0, None, 0.0).unwrap();
    let options = GradientDescentConfig {
        iterations: 30,
        step_size: 1.0,
        armijo: true,
    };
    let mut gd = GradientDescent::new(&workload, initial, options, LineSearch::default()).unwrap();
    let result = gd.fit().unwrap();
    let losses = result.trace().losses();
    for w in losses.windows(2) {
        assert!(w[1] <= w[0] + 1e-12);
    }
}

#[test]
fn fixed_point_with_unit_tolerance_runs_once() {
    let workload = Workload::prefix_sum(8).unwrap();
    let options = FixedPointConfig {
        tolerance: 1.0,
        max_iterations: None,
        record_loss: false,
    };
    let mut fp = FixedPoint::new(&workload, Array1::ones(8), options, Numerics::default()).unwrap();
    let result = fp.fit().unwrap();
    assert_eq!(result.iterations(), 1);
    assert_eq!(result.status(), &Status::Converged);
}

#[test]
fn phi_is_unit_diagonal_and_positive_definite() {
    let workload = Workload::prefix_sum(6).unwrap();
    for v in [
        Array1::ones(6),
        array![0.5, 1.7, 0.9, 2.3, 1.1, 0.2],
        array![10.0, 0.01, 3.0, 0.5, 7.0, 1.0],
    ] {
        let x = phi(&workload, &v, None, 0.0).unwrap();
        assert!(max_diagonal_error(&x) < 1e-8);
        assert!(is_positive_definite(&x));
    }
}

#[test]
fn first_fixed_point_update_is_unit_diagonal_and_positive_definite() {
    let workload = Workload::prefix_sum(5).unwrap();
    let v0 = array![0.5, 1.7, 0.9, 2.3, 1.1];
    let x0 = phi(&workload, &v0, None, 0.0).unwrap();
    assert!(max_diagonal_error(&x0) < 1e-8);

    let cache = SqrtCache::new(&workload, &v0, 0.0).unwrap();
    let v1 = cache.next_vector();
    let next = SqrtCache::new(&workload, &v1, 0.0).unwrap();
    let x1 = phi(&workload, &v1, Some(&next), 0.0).unwrap();
    assert!(max_diagonal_error(&x1) < 1e-8);
    assert!(is_positive_definite(&x1));
}

#[test]
fn stale_cache_is_rejected() {
    let workload = Workload::prefix_sum(3).unwrap();
    let cache = SqrtCache::new(&workload, &Array1::ones(3), 0.0).unwrap();
    let err = phi(&workload, &array![1.0, 2.0, 1.0], Some(&cache), 0.0).unwrap_err();
    assert!(matches!(err, FactorizationError::CacheMismatch));
}

#[test]
fn unprojected_inner_solve_is_exact() {
    let z = array![
        [2.0, 0.3, 0.1, 0.0],
        [0.3, 1.5, 0.2, 0.1],
        [0.1, 0.2, 1.0, 0.3],
        [0.0, 0.1, 0.3, 1.2]
    ];
    let grad = -array![
        [3.0, 0.5, 0.2, 0.1],
        [0.5, 2.0, 0.4, 0.0],
        [0.2, 0.4, 1.5, 0.3],
        [0.1, 0.0, 0.3, 1.0]
    ];
    // symmetric 4×4 matrices span ten dimensions
    let d = solve_newton_direction(&z, &grad, 10, false);
    let residual = newton_residual(&z, &grad, &d);
    let relative = (frobenius_inner(&residual, &residual) / frobenius_inner(&grad, &grad)).sqrt();
    assert!(relative < 1e-8, "relative residual {}", relative);
}

#[test]
fn optimizers_agree_on_prefix_sum_optimum() {
    let workload = Workload::prefix_sum(4).unwrap();
    let mut settings = quiet_settings();
    settings.gradient_descent.iterations = 200;
    settings.newton.iterations = 6;
    settings.fixed_point.tolerance = 1e-10;

    let results = compare_internal(&settings, &workload).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].algorithm(), Algorithm::GradientDescent);
    assert_eq!(results[1].algorithm(), Algorithm::FixedPoint);
    assert_eq!(results[2].algorithm(), Algorithm::Newton);

    let optimum = 6.874144;
    assert!((results[1].loss() - optimum).abs() < 1e-4);
    assert!((results[2].loss() - optimum).abs() < 1e-4);
    // gradient descent is slower but must make clear progress
    assert!(results[0].loss() < 7.0);
    for result in &results {
        assert!(result.loss() >= optimum - 1e-4);
        assert!(is_positive_definite(result.x()));
    }
}

#[test]
fn fit_internal_uses_configured_algorithm() {
    let workload = Workload::prefix_sum(4).unwrap();
    let mut settings = quiet_settings();
    settings.config.algorithm = Algorithm::Newton;
    settings.newton.iterations = 3;

    let result = fit_internal(&settings, &workload).unwrap();
    assert_eq!(result.algorithm(), Algorithm::Newton);
    assert_eq!(result.iterations(), 3);
    assert_eq!(result.trace().len(), 3);
    assert!(result.v().is_none());
}

#[test]
fn fit_writes_outputs() {
    let folder = std::env::temp_dir().join(format!("mfcore-fit-{}", std::process::id()));
    let mut settings = quiet_settings();
    settings.workload.size = 4;
    settings.output.write = true;
    settings.output.path = folder.to_string_lossy().to_string();

    let result = fit(settings).unwrap();
    assert_eq!(result.algorithm(), Algorithm::FixedPoint);
    for file in ["trace.csv", "x.csv", "v.csv", "result.json"] {
        assert!(folder.join(file).exists(), "missing {}", file);
    }
    std::fs::remove_dir_all(&folder).unwrap();
}

#[test]
fn unvalidated_line_search_is_rejected_before_running() {
    let workload = Workload::prefix_sum(4).unwrap();
    let mut settings = quiet_settings();
    settings.config.algorithm = Algorithm::GradientDescent;
    settings.line_search.shrink = 1.0;
    assert!(fit_internal(&settings, &workload).is_err());
    assert!(compare_internal(&settings, &workload).is_err());

    let mut settings = quiet_settings();
    settings.line_search.min_step = 0.0;
    assert!(fit_internal(&settings, &workload).is_err());
}
