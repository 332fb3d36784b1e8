use std::{collections::VecDeque, path::Path};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::ExportError;

/// Camera position recorded after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub frame: u64,
    pub position: [f64; 3],
}

impl TrajectoryPoint {
    pub fn new(frame: u64, position: &Vector3<f64>) -> Self {
        Self {
            frame,
            position: [position.x, position.y, position.z],
        }
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::from(self.position)
    }
}

/// Bounded history of camera positions; the oldest point is dropped when full.
#[derive(Debug, Clone)]
pub struct TrajectoryBuffer {
    points: VecDeque<TrajectoryPoint>,
    capacity: usize,
}

impl TrajectoryBuffer {
    /// Create a buffer seeded with the origin at frame 0. A zero capacity is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut buffer = Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        };
        buffer.points.push_back(TrajectoryPoint::new(0, &Vector3::zeros()));
        buffer
    }

    pub fn push(&mut self, point: TrajectoryPoint) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    /// Clear the history and re-seed it with the origin at `frame`.
    pub fn reset(&mut self, frame: u64) {
        self.points.clear();
        self.points.push_back(TrajectoryPoint::new(frame, &Vector3::zeros()));
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<TrajectoryPoint> {
        self.points.iter().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrajectoryPoint> {
        self.points.iter()
    }

    pub fn latest(&self) -> Option<&TrajectoryPoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Path length over the retained points
    pub fn total_distance(&self) -> f64 {
        self.points
            .iter()
            .zip(self.points.iter().skip(1))
            .map(|(a, b)| (b.position() - a.position()).norm())
            .sum()
    }

    /// Export trajectory to JSON
    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(&self.points)?)
    }

    /// Save trajectory to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let path = path.as_ref();
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(frame: u64, x: f64) -> TrajectoryPoint {
        TrajectoryPoint::new(frame, &Vector3::new(x, 0.0, 0.0))
    }

    #[test]
    fn starts_at_origin() {
        let buffer = TrajectoryBuffer::new(10);
        assert_eq!(buffer.snapshot(), vec![point(0, 0.0)]);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut buffer = TrajectoryBuffer::new(3);
        for frame in 1..=5 {
            buffer.push(point(frame, frame as f64));
            assert!(buffer.len() <= 3);
        }
        let frames: Vec<_> = buffer.iter().map(|p| p.frame).collect();
        assert_eq!(frames, vec![3, 4, 5]);
        assert_eq!(buffer.latest(), Some(&point(5, 5.0)));
    }

    #[test]
    fn repeated_resets_leave_one_point() {
        let mut buffer = TrajectoryBuffer::new(100);
        for frame in 1..=4 {
            buffer.push(point(frame, 1.0));
        }
        for frame in [5, 6, 7] {
            buffer.reset(frame);
            assert_eq!(buffer.snapshot(), vec![point(frame, 0.0)]);
        }
    }

    #[test]
    fn total_distance() {
        let mut buffer = TrajectoryBuffer::new(10);
        buffer.push(TrajectoryPoint::new(1, &Vector3::new(3.0, 0.0, 0.0)));
        buffer.push(TrajectoryPoint::new(2, &Vector3::new(3.0, 4.0, 0.0)));
        assert!((buffer.total_distance() - 7.0).abs() < 1e-12);
    }

    #[test]
    fn json_export() {
        let mut buffer = TrajectoryBuffer::new(10);
        buffer.push(point(1, 1.5));

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("trajectory.json");
        buffer.save_to_file(&path).expect("written");

        let read: Vec<TrajectoryPoint> =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("readable")).expect("valid json");
        assert_eq!(read, buffer.snapshot());
    }
}
