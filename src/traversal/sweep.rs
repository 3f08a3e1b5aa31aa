//! Nested (odometer) and star sweeps.

use super::Coordinate;
use crate::axis::{Axis, AxisLine};

/// Odometer traversal over any number of axes.
///
/// `axes[0]` varies slowest. The block boundary is set on the last point of
/// every pass of the innermost axis. With sweepback, a depth reverses its
/// direction each time it wraps, so every inner axis starts where it stopped.
#[derive(Debug, Clone)]
pub struct NestedSweep {
    lines: Vec<AxisLine>,
    pos: Vec<usize>,
    reversed: Vec<bool>,
    sweepback: bool,
    done: bool,
}

impl NestedSweep {
    /// Start a sweep over `axes`. No axes yields nothing.
    pub fn new(axes: &[Axis], sweepback: bool) -> Self {
        let lines: Vec<AxisLine> = axes.iter().map(Axis::line).collect();
        let depth = lines.len();
        Self {
            done: lines.is_empty(),
            lines,
            pos: vec![0; depth],
            reversed: vec![false; depth],
            sweepback,
        }
    }

    fn current(&self) -> Vec<f64> {
        self.lines
            .iter()
            .zip(self.pos.iter().zip(&self.reversed))
            .map(|(line, (&pos, &reversed))| {
                let index = if reversed { line.len() - 1 - pos } else { pos };
                line.get(index)
            })
            .collect()
    }

    fn advance(&mut self) {
        let mut depth = self.lines.len();
        while depth > 0 {
            depth -= 1;
            self.pos[depth] += 1;
            if self.pos[depth] < self.lines[depth].len() {
                return;
            }
            self.pos[depth] = 0;
            if self.sweepback {
                self.reversed[depth] = !self.reversed[depth];
            }
        }
        self.done = true;
    }
}

impl Iterator for NestedSweep {
    type Item = Coordinate;

    fn next(&mut self) -> Option<Coordinate> {
        if self.done {
            return None;
        }
        let values = self.current();
        let inner = self.lines.len() - 1;
        let block_boundary = self.pos[inner] + 1 == self.lines[inner].len();
        self.advance();
        Some(Coordinate::new(values, block_boundary))
    }
}

/// Sweeps each axis in turn while all others sit at their `begin`.
///
/// Every axis pass is one block.
#[derive(Debug, Clone)]
pub struct StarSweep {
    begins: Vec<f64>,
    lines: Vec<AxisLine>,
    axis: usize,
    pos: usize,
}

impl StarSweep {
    /// Start a star sweep over `axes`.
    pub fn new(axes: &[Axis]) -> Self {
        Self {
            begins: axes.iter().map(|axis| axis.begin).collect(),
            lines: axes.iter().map(Axis::line).collect(),
            axis: 0,
            pos: 0,
        }
    }
}

impl Iterator for StarSweep {
    type Item = Coordinate;

    fn next(&mut self) -> Option<Coordinate> {
        let line = *self.lines.get(self.axis)?;
        let mut values = self.begins.clone();
        values[self.axis] = line.get(self.pos);
        let block_boundary = self.pos + 1 == line.len();
        if block_boundary {
            self.axis += 1;
            self.pos = 0;
        } else {
            self.pos += 1;
        }
        Some(Coordinate::new(values, block_boundary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(sweepback: bool) -> Vec<Coordinate> {
        let axes = vec![Axis::new("x", 0.0, 2.0, 1.0), Axis::new("y", 0.0, 2.0, 1.0)];
        NestedSweep::new(&axes, sweepback).collect()
    }

    #[test]
    fn test_row_major_order() {
        let points = grid(false);
        let values: Vec<Vec<f64>> = points.iter().map(|c| c.values.clone()).collect();
        assert_eq!(
            values,
            vec![
                vec![0.0, 0.0],
                vec![0.0, 1.0],
                vec![0.0, 2.0],
                vec![1.0, 0.0],
                vec![1.0, 1.0],
                vec![1.0, 2.0],
                vec![2.0, 0.0],
                vec![2.0, 1.0],
                vec![2.0, 2.0],
            ]
        );
        let boundaries: Vec<bool> = points.iter().map(|c| c.block_boundary).collect();
        assert_eq!(
            boundaries,
            vec![false, false, true, false, false, true, false, false, true]
        );
    }

    #[test]
    fn test_sweepback_serpentine() {
        let inner: Vec<f64> = grid(true).iter().map(|c| c.values[1]).collect();
        assert_eq!(inner, vec![0.0, 1.0, 2.0, 2.0, 1.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_sweepback_three_axes_never_jumps() {
        let axes = vec![
            Axis::new("a", 0.0, 1.0, 1.0),
            Axis::new("b", 0.0, 2.0, 1.0),
            Axis::new("c", 0.0, 3.0, 1.0),
        ];
        let points: Vec<Coordinate> = NestedSweep::new(&axes, true).collect();
        assert_eq!(points.len(), 2 * 3 * 4);
        for pair in points.windows(2) {
            // exactly one axis moves by one step between neighbours
            let moved: f64 = pair[0]
                .values
                .iter()
                .zip(&pair[1].values)
                .map(|(a, b)| (a - b).abs())
                .sum();
            assert_eq!(moved, 1.0, "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_single_point_axis() {
        let axes = vec![Axis::new("x", 3.0, 3.0, 1.0)];
        let points: Vec<Coordinate> = NestedSweep::new(&axes, false).collect();
        assert_eq!(points, vec![Coordinate::new(vec![3.0], true)]);
    }

    #[test]
    fn test_huge_axis_is_walked_lazily() {
        // far past any sensible allocation; only the first few points are taken
        let axes = vec![Axis::new("a", 0.0, 1.0, 1.0), Axis::new("b", 0.0, 1.0, 1e-300)];
        let first: Vec<Coordinate> = NestedSweep::new(&axes, false).take(3).collect();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].values, vec![0.0, 0.0]);
        assert!(first.iter().all(|c| !c.block_boundary));
        assert_eq!(StarSweep::new(&axes).take(3).count(), 3);
    }

    #[test]
    fn test_no_axes_yields_nothing() {
        assert_eq!(NestedSweep::new(&[], true).count(), 0);
        assert_eq!(StarSweep::new(&[]).count(), 0);
    }

    #[test]
    fn test_star_sweep() {
        let axes = vec![Axis::new("x", 0.0, 1.0, 0.5), Axis::new("y", 5.0, 4.0, 1.0)];
        let points: Vec<Coordinate> = StarSweep::new(&axes).collect();
        assert_eq!(
            points,
            vec![
                Coordinate::new(vec![0.0, 5.0], false),
                Coordinate::new(vec![0.5, 5.0], false),
                Coordinate::new(vec![1.0, 5.0], true),
                Coordinate::new(vec![0.0, 5.0], false),
                Coordinate::new(vec![0.0, 4.0], true),
            ]
        );
    }
}
