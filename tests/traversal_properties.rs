//! Properties of the coordinate streams and the time estimator over a range
//! of axis shapes.

use parspace::prelude::*;
use parspace::traversal::hilbert::HilbertCurve;
use std::collections::HashSet;

fn axes(shape: &[usize]) -> Vec<Axis> {
    shape
        .iter()
        .enumerate()
        .map(|(i, &points)| Axis::new(format!("a{i}"), 0.0, (points - 1) as f64, 1.0))
        .collect()
}

fn key(values: &[f64]) -> Vec<u64> {
    values.iter().map(|v| v.to_bits()).collect()
}

#[test]
fn test_sweep_visits_every_grid_point_once() {
    for shape in [vec![1], vec![4], vec![2, 3], vec![3, 1, 2], vec![2, 2, 2, 2]] {
        for sweepback in [false, true] {
            let axes = axes(&shape);
            let strategy = Strategy::Sweep { sweepback };
            let points: Vec<Coordinate> = strategy.coordinates(&axes).unwrap().collect();
            let expected: usize = shape.iter().product();
            assert_eq!(points.len(), expected, "{shape:?} sweepback={sweepback}");
            assert_eq!(strategy.point_count(&axes).unwrap(), expected);

            let unique: HashSet<Vec<u64>> = points.iter().map(|c| key(&c.values)).collect();
            assert_eq!(unique.len(), expected);

            let inner = *shape.last().unwrap();
            let boundaries = points.iter().filter(|c| c.block_boundary).count();
            assert_eq!(boundaries, expected / inner);
            assert!(points.last().unwrap().block_boundary);
        }
    }
}

#[test]
fn test_sweepback_moves_one_step_at_a_time() {
    let axes = axes(&[3, 4, 5]);
    let points: Vec<Coordinate> = Strategy::Sweep { sweepback: true }
        .coordinates(&axes)
        .unwrap()
        .collect();
    for pair in points.windows(2) {
        let moved: f64 = pair[0]
            .values
            .iter()
            .zip(&pair[1].values)
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert_eq!(moved, 1.0, "{:?} -> {:?}", pair[0].values, pair[1].values);
    }
}

#[test]
fn test_star_holds_other_axes_at_begin() {
    let axes = vec![
        Axis::new("x", 1.0, 3.0, 1.0),
        Axis::new("y", -1.0, 1.0, 0.5),
        Axis::new("z", 7.0, 7.0, 1.0),
    ];
    let points: Vec<Coordinate> = Strategy::Star.coordinates(&axes).unwrap().collect();
    assert_eq!(points.len(), 3 + 5 + 1);
    for point in &points {
        let off_begin = point
            .values
            .iter()
            .zip(&axes)
            .filter(|(value, axis)| **value != axis.begin)
            .count();
        assert!(off_begin <= 1);
    }
    assert_eq!(points.iter().filter(|c| c.block_boundary).count(), 3);
}

#[test]
fn test_hilbert_cells_are_unique_and_adjacent() {
    for n in 1..=4 {
        let cells: Vec<(f64, f64)> = HilbertCurve::new((0.0, 1.0), (0.0, 1.0), n).collect();
        assert_eq!(cells.len(), 4usize.pow(n));

        let unique: HashSet<(u64, u64)> =
            cells.iter().map(|(x, y)| (x.to_bits(), y.to_bits())).collect();
        assert_eq!(unique.len(), cells.len());

        let cell = 1.0 / f64::from(2u32.pow(n));
        for pair in cells.windows(2) {
            let dx = ((pair[1].0 - pair[0].0) / cell).round().abs();
            let dy = ((pair[1].1 - pair[0].1) / cell).round().abs();
            assert_eq!(dx + dy, 1.0, "depth {n}: {:?} -> {:?}", pair[0], pair[1]);
        }
    }
}

#[test]
fn test_hilbert_sweep_repeats_curve_per_outer_point() {
    let mut axes = axes(&[3]);
    axes.push(Axis::new("x", 0.0, 1.0, 0.1));
    axes.push(Axis::new("y", 0.0, 1.0, 0.1));
    let strategy = Strategy::Hilbert { n: 2, sweepback: false };

    let points: Vec<Coordinate> = strategy.coordinates(&axes).unwrap().collect();
    assert_eq!(points.len(), 3 * 16);
    assert_eq!(strategy.point_count(&axes).unwrap(), points.len());
    assert_eq!(points.iter().filter(|c| c.block_boundary).count(), 3);
    assert_eq!(points[0].values[0], 0.0);
    assert_eq!(points[16].values[0], 1.0);
    assert_eq!(points[0].values[1..], points[16].values[1..]);
}

#[test]
fn test_regenerated_streams_are_identical() {
    let axes = vec![
        Axis::new("a", 0.0, 1.0, 0.5),
        Axis::new("b", 2.0, -1.0, 0.7),
        Axis::new("c", 0.0, 1.0, 0.25),
    ];
    for strategy in [
        Strategy::Sweep { sweepback: false },
        Strategy::Sweep { sweepback: true },
        Strategy::Star,
        Strategy::Hilbert { n: 2, sweepback: false },
        Strategy::Hilbert { n: 3, sweepback: true },
    ] {
        let first: Vec<Coordinate> = strategy.coordinates(&axes).unwrap().collect();
        let second: Vec<Coordinate> = strategy.coordinates(&axes).unwrap().collect();
        assert!(!first.is_empty());
        // Coordinate equality covers both the values and block_boundary
        assert_eq!(first, second, "{strategy}");
    }

    let mut space = ParameterSpace::new("repeat", InstrumentRegistry::new());
    for axis in &axes {
        space.add_axis(axis.clone());
    }
    space.set_strategy(Strategy::Sweep { sweepback: true });
    let first: Vec<Coordinate> = space.coordinates().unwrap().collect();
    let second: Vec<Coordinate> = space.coordinates().unwrap().collect();
    assert_eq!(first, second);
}

#[test]
fn test_estimate_scales_with_grid() {
    let config = EstimatorConfig::default();
    let ramp = RampRate::new(0.5, 10.0);
    let inner = Axis::new("v", 0.0, 10.0, 1.0).with_ramp(ramp);
    let outer = Axis::new("b", 0.0, 2.0, 1.0).with_ramp(ramp);

    let single = estimate(
        std::slice::from_ref(&inner),
        &Strategy::Sweep { sweepback: false },
        &config,
    );
    // ten steps of one increment each: 10 * (10 ms + 4 ms)
    assert!((single.seconds - 0.14).abs() < 1e-9);
    assert!(single.flagged().is_empty());

    let grid = vec![outer, inner];
    let plain = estimate(&grid, &Strategy::Sweep { sweepback: false }, &config);
    let back = estimate(&grid, &Strategy::Sweep { sweepback: true }, &config);
    assert!(back.seconds < plain.seconds);
    assert!(plain.to_string().ends_with("Total estimated time: 0d 0h 0m 0s"));
}

#[test]
fn test_controller_estimate_matches_free_function() {
    let mut space = ParameterSpace::new("estimate", InstrumentRegistry::new());
    assert!(matches!(space.estimate_time(), Err(ParspaceError::NoStrategy)));

    let axis = Axis::new("v", 0.0, 10.0, 1.0).with_ramp(RampRate::new(0.5, 10.0));
    space.add_axis(axis.clone());
    space.add_axis(Axis::new("untimed", 0.0, 1.0, 1.0));
    space.set_strategy(Strategy::Star);

    let predicted = space.estimate_time().unwrap();
    assert_eq!(
        predicted,
        estimate(
            &[axis, Axis::new("untimed", 0.0, 1.0, 1.0)],
            &Strategy::Star,
            &space.settings().estimator()
        )
    );
    assert_eq!(predicted.flagged(), vec!["untimed"]);
    assert!(matches!(
        predicted.check(),
        Err(ParspaceError::MissingRampMetadata { .. })
    ));
}
