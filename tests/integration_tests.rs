//! End-to-end scenarios over synthetic two-view data.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nalgebra::{Matrix3, Vector2, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use stereoglue::estimators::{Estimator, FundamentalEstimator, HomographyEstimator};
use stereoglue::local_optimization::IrlsOptimizer;
use stereoglue::scoring::{MatchContext, MsacScoring, ScoringChoice};
use stereoglue::{
    estimate, estimate_fundamental_matrix, estimate_homography, DataMatrix, EstimationError,
    MatchMatrix, Model, ProblemType, RansacSettings, SamplerType, TerminationReason,
};

fn ground_truth_homography() -> Matrix3<f64> {
    Matrix3::new(
        1.1, 0.02, 0.05, //
        -0.03, 0.95, 0.1, //
        0.05, -0.04, 1.0,
    )
}

fn apply_homography(h: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let p = h * Vector3::new(x, y, 1.0);
    (p.x / p.z, p.y / p.z)
}

/// 200 inlier correspondences under `H*` plus 100 uniform outliers,
/// matched 1-to-1.
fn homography_scene(rng_seed: u64) -> (DataMatrix, DataMatrix, Matrix3<f64>) {
    let truth = ground_truth_homography();
    let mut rng = StdRng::seed_from_u64(rng_seed);

    let total = 300;
    let mut source = DataMatrix::zeros(total, 2);
    let mut destination = DataMatrix::zeros(total, 2);
    for i in 0..total {
        let x = rng.gen_range(0.0..1.0);
        let y = rng.gen_range(0.0..1.0);
        source[(i, 0)] = x;
        source[(i, 1)] = y;
        if i < 200 {
            let (dx, dy) = apply_homography(&truth, x, y);
            destination[(i, 0)] = dx;
            destination[(i, 1)] = dy;
        } else {
            destination[(i, 0)] = rng.gen_range(0.0..1.0);
            destination[(i, 1)] = rng.gen_range(0.0..1.0);
        }
    }
    (source, destination, truth)
}

fn normalized_frobenius_distance(a: &Matrix3<f64>, b: &Matrix3<f64>) -> f64 {
    let a = a / a.norm();
    let b = b / b.norm();
    ((a - b).norm()).min((a + b).norm())
}

#[test]
fn pure_homography_recovers_the_transform() {
    let (source, destination, truth) = homography_scene(42);

    let mut settings = RansacSettings::default();
    settings.inlier_threshold = 0.01;
    settings.seed = 42;
    settings.core_number = 1;

    let result =
        estimate_homography(&source, &destination, None, None, &settings).expect("estimation");

    assert!(
        result.inliers.len() >= 190,
        "only {} inliers",
        result.inliers.len()
    );
    assert!(result.iterations >= settings.min_iterations);
    assert!(result.iterations <= settings.max_iterations);

    let distance = normalized_frobenius_distance(&result.model.matrix, &truth);
    assert!(distance < 1e-3, "model distance {distance}");

    // Every returned inlier satisfies the residual bound under the model.
    let estimator = HomographyEstimator::new();
    for &(src, dst) in &result.inliers {
        let s = Vector2::new(source[(src, 0)], source[(src, 1)]);
        let d = Vector2::new(destination[(dst, 0)], destination[(dst, 1)]);
        assert!(estimator.residual(&result.model, &s, &d) <= settings.inlier_threshold);
    }
}

/// The S1 scene widened to five scored candidates per source row: the
/// correct destination sits at a random column and scores best, with four
/// decoy points behind it.
#[test]
fn multi_match_homography_picks_the_right_candidates() {
    let (source, correct_destination, truth) = homography_scene(42);
    let total = source.nrows();
    let candidates = 5;
    let mut rng = StdRng::seed_from_u64(7);

    let mut destination_rows: Vec<(f64, f64)> = (0..total)
        .map(|i| (correct_destination[(i, 0)], correct_destination[(i, 1)]))
        .collect();
    let mut matches = MatchMatrix::from_element(total, candidates, -1);
    let mut match_scores = DataMatrix::zeros(total, candidates);

    for row in 0..total {
        let correct_col = rng.gen_range(0..candidates);
        for col in 0..candidates {
            if col == correct_col {
                matches[(row, col)] = row as i64;
                match_scores[(row, col)] = rng.gen_range(0.0..0.2);
            } else {
                destination_rows.push((rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)));
                matches[(row, col)] = (destination_rows.len() - 1) as i64;
                match_scores[(row, col)] = rng.gen_range(0.4..1.0);
            }
        }
    }

    let mut destination = DataMatrix::zeros(destination_rows.len(), 2);
    for (i, &(x, y)) in destination_rows.iter().enumerate() {
        destination[(i, 0)] = x;
        destination[(i, 1)] = y;
    }

    let mut settings = RansacSettings::default();
    settings.inlier_threshold = 0.01;
    settings.seed = 42;
    settings.core_number = 1;
    settings.sampler = SamplerType::Prosac;

    let result = estimate(
        &source,
        &destination,
        Some(&matches),
        Some(&match_scores),
        ProblemType::Homography,
        None,
        &settings,
        None,
    )
    .expect("estimation");

    assert!(
        result.inliers.len() >= 185,
        "only {} inliers",
        result.inliers.len()
    );
    assert_eq!(result.score.inlier_count, result.inliers.len());

    // Multi-match collapses to at most one destination per source.
    let mut sources_seen: Vec<usize> = result.inliers.iter().map(|&(s, _)| s).collect();
    sources_seen.sort_unstable();
    sources_seen.dedup();
    assert_eq!(sources_seen.len(), result.inliers.len());

    let distance = normalized_frobenius_distance(&result.model.matrix, &truth);
    assert!(distance < 1e-3, "model distance {distance}");
}

/// A smaller multi-match run under the uniform candidate policy; the
/// decoys carry no score information at all.
#[test]
fn multi_match_uniform_policy_converges_on_clean_data() {
    let truth = ground_truth_homography();
    let total = 50;
    let candidates = 3;
    let mut rng = StdRng::seed_from_u64(21);

    let mut source = DataMatrix::zeros(total, 2);
    let mut destination_rows: Vec<(f64, f64)> = Vec::new();
    let mut matches = MatchMatrix::from_element(total, candidates, -1);
    let match_scores = DataMatrix::zeros(total, candidates);

    for row in 0..total {
        let x = rng.gen_range(0.0..1.0);
        let y = rng.gen_range(0.0..1.0);
        source[(row, 0)] = x;
        source[(row, 1)] = y;

        let correct_col = rng.gen_range(0..candidates);
        for col in 0..candidates {
            if col == correct_col {
                destination_rows.push(apply_homography(&truth, x, y));
            } else {
                destination_rows.push((rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)));
            }
            matches[(row, col)] = (destination_rows.len() - 1) as i64;
        }
    }
    let mut destination = DataMatrix::zeros(destination_rows.len(), 2);
    for (i, &(x, y)) in destination_rows.iter().enumerate() {
        destination[(i, 0)] = x;
        destination[(i, 1)] = y;
    }

    let mut settings = RansacSettings::default();
    settings.inlier_threshold = 0.01;
    settings.seed = 5;
    settings.core_number = 1;

    let result = estimate(
        &source,
        &destination,
        Some(&matches),
        Some(&match_scores),
        ProblemType::Homography,
        None,
        &settings,
        None,
    )
    .expect("estimation");

    assert!(
        result.inliers.len() >= 45,
        "only {} inliers",
        result.inliers.len()
    );
    let distance = normalized_frobenius_distance(&result.model.matrix, &truth);
    assert!(distance < 1e-3, "model distance {distance}");
}

#[test]
fn planar_scene_fundamental_never_crashes() {
    // All correspondences consistent with a homography: the classical
    // degenerate configuration for fundamental-matrix estimation.
    let (source, _, truth) = homography_scene(13);
    let mut destination = DataMatrix::zeros(source.nrows(), 2);
    for i in 0..source.nrows() {
        let (x, y) = apply_homography(&truth, source[(i, 0)], source[(i, 1)]);
        destination[(i, 0)] = x;
        destination[(i, 1)] = y;
    }

    let mut settings = RansacSettings::default();
    settings.inlier_threshold = 0.01;
    settings.seed = 99;
    settings.core_number = 1;
    settings.min_iterations = 200;
    settings.max_iterations = 1000;

    match estimate_fundamental_matrix(&source, &destination, None, None, &settings) {
        Ok(result) => {
            let estimator = FundamentalEstimator::new();
            for &(src, dst) in &result.inliers {
                let s = Vector2::new(source[(src, 0)], source[(src, 1)]);
                let d = Vector2::new(destination[(dst, 0)], destination[(dst, 1)]);
                assert!(
                    estimator.residual(&result.model, &s, &d) <= settings.inlier_threshold
                );
            }
        }
        Err(EstimationError::Degenerate) => {}
        Err(other) => panic!("unexpected error: {other}"),
    }
}

#[test]
fn identical_runs_are_bitwise_identical() {
    let (source, destination, _) = homography_scene(42);

    let run = |core_number: usize| {
        let mut settings = RansacSettings::default();
        settings.inlier_threshold = 0.01;
        settings.seed = 7;
        settings.core_number = core_number;
        estimate_homography(&source, &destination, None, None, &settings).expect("estimation")
    };

    let a = run(1);
    let b = run(1);
    assert_eq!(a.model.matrix, b.model.matrix);
    assert_eq!(a.inliers, b.inliers);
    assert_eq!(a.iterations, b.iterations);

    let c = run(4);
    let d = run(4);
    assert_eq!(c.model.matrix, d.model.matrix);
    assert_eq!(c.inliers, d.inliers);
    assert_eq!(c.iterations, d.iterations);
}

#[test]
fn cancellation_returns_the_partial_best() {
    let (source, destination, _) = homography_scene(42);

    let mut settings = RansacSettings::default();
    settings.inlier_threshold = 0.01;
    settings.seed = 7;
    settings.core_number = 1;
    settings.min_iterations = 1_000_000;
    settings.max_iterations = 1_000_000;

    let cancel = AtomicBool::new(false);
    let result = std::thread::scope(|scope| {
        scope.spawn(|| {
            std::thread::sleep(Duration::from_millis(50));
            cancel.store(true, Ordering::Relaxed);
        });
        estimate(
            &source,
            &destination,
            None,
            None,
            ProblemType::Homography,
            None,
            &settings,
            Some(&cancel),
        )
    });

    match result {
        Ok(result) => {
            assert_eq!(result.reason, TerminationReason::Cancelled);
            assert!(!result.inliers.is_empty());
            assert!(result.iterations < settings.max_iterations);
        }
        // Only acceptable when not even one model was scored in time.
        Err(EstimationError::Cancelled) => {}
        Err(other) => panic!("unexpected error: {other}"),
    }
}

#[test]
fn all_inlier_data_terminates_at_the_minimum_iteration_count() {
    let truth = ground_truth_homography();
    let mut rng = StdRng::seed_from_u64(8);
    let total = 100;
    let mut source = DataMatrix::zeros(total, 2);
    let mut destination = DataMatrix::zeros(total, 2);
    for i in 0..total {
        let x = rng.gen_range(0.0..1.0);
        let y = rng.gen_range(0.0..1.0);
        let (dx, dy) = apply_homography(&truth, x, y);
        source[(i, 0)] = x;
        source[(i, 1)] = y;
        destination[(i, 0)] = dx;
        destination[(i, 1)] = dy;
    }

    let mut settings = RansacSettings::default();
    settings.inlier_threshold = 0.01;
    settings.seed = 1;
    settings.core_number = 1;
    settings.min_iterations = 50;

    let result =
        estimate_homography(&source, &destination, None, None, &settings).expect("estimation");
    assert_eq!(result.inliers.len(), total);
    assert_eq!(result.iterations, settings.min_iterations);
    assert_eq!(result.reason, TerminationReason::Converged);
}

#[test]
fn final_irls_never_degrades_the_seeded_score() {
    let (source, destination, truth) = homography_scene(42);
    let matches = MatchMatrix::from_fn(source.nrows(), 1, |row, _| row as i64);
    let match_scores = DataMatrix::zeros(source.nrows(), 1);
    let ctx = MatchContext {
        source: &source,
        destination: &destination,
        matches: &matches,
        match_scores: &match_scores,
    };

    let estimator = HomographyEstimator::new();
    let scoring = ScoringChoice::Msac(MsacScoring::new(0.01));

    // Seed with a slightly perturbed version of the true model.
    let mut perturbed = truth;
    perturbed[(0, 2)] += 0.003;
    let model = Model::homography(perturbed);
    let mut inliers = Vec::new();
    let seeded_score = scoring.score(&ctx, &model, &estimator, None, &mut inliers);
    assert!(seeded_score.inlier_count > 0);

    let optimizer = IrlsOptimizer::new(50);
    match optimizer.run(&ctx, &estimator, &scoring, None, &model, &seeded_score, &inliers) {
        Some((_, refined_score, _)) => assert!(refined_score >= seeded_score),
        None => {} // input kept, score unchanged
    }
}

#[test]
fn essential_estimation_recovers_the_relative_pose() {
    // Calibrated scene: known rotation and translation, projected through
    // a shared pinhole intrinsic matrix.
    let rotation = nalgebra::Rotation3::from_euler_angles(0.06, -0.09, 0.03);
    let translation = Vector3::new(0.4, 0.05, -0.15);
    let t_cross = Matrix3::new(
        0.0,
        -translation.z,
        translation.y,
        translation.z,
        0.0,
        -translation.x,
        -translation.y,
        translation.x,
        0.0,
    );
    let truth = t_cross * rotation.matrix();

    let focal = 600.0;
    let k = Matrix3::new(focal, 0.0, 320.0, 0.0, focal, 240.0, 0.0, 0.0, 1.0);

    let total = 100;
    let mut rng = StdRng::seed_from_u64(3);
    let mut source = DataMatrix::zeros(total, 2);
    let mut destination = DataMatrix::zeros(total, 2);
    for i in 0..total {
        let world = Vector3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-0.8..0.8),
            rng.gen_range(3.0..6.0),
        );
        let p1 = k * world;
        let cam2 = rotation * world + translation;
        let p2 = k * cam2;
        source[(i, 0)] = p1.x / p1.z;
        source[(i, 1)] = p1.y / p1.z;
        destination[(i, 0)] = p2.x / p2.z;
        destination[(i, 1)] = p2.y / p2.z;
    }

    let mut settings = RansacSettings::default();
    // Generous pixel threshold: minimal essential hypotheses are rough and
    // rely on the non-minimal refit to sharpen.
    settings.inlier_threshold = 30.0;
    settings.seed = 3;
    settings.core_number = 1;
    settings.min_iterations = 100;
    settings.max_iterations = 2000;

    let result = estimate(
        &source,
        &destination,
        None,
        None,
        ProblemType::Essential,
        Some((&k, &k)),
        &settings,
        None,
    )
    .expect("estimation");

    assert!(
        result.inliers.len() >= 95,
        "only {} inliers",
        result.inliers.len()
    );
    let distance = normalized_frobenius_distance(&result.model.matrix, &truth);
    assert!(distance < 1e-4, "model distance {distance}");
}
