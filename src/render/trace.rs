//! Trace geometry: sample-to-screen mapping, point history and beam intensity

use tiny_skia::Point;

use crate::audio::StereoFrame;

/// Map a stereo frame to canvas coordinates.
///
/// Left drives x, right drives y, both spanning [-1, 1] across the canvas.
/// An all-zero (or non-finite) frame carries no new position, so the
/// previous point is kept instead of snapping to the centre. The result is
/// always clamped to `[0, width] x [0, height]`.
pub fn map_frame(frame: StereoFrame, previous: Point, width: f32, height: f32) -> Point {
    let silent = frame.left == 0.0 && frame.right == 0.0;
    let finite = frame.left.is_finite() && frame.right.is_finite();

    let point = if silent || !finite {
        previous
    } else {
        Point::from_xy(
            (frame.left + 1.0) / 2.0 * width,
            (frame.right + 1.0) / 2.0 * height,
        )
    };

    Point::from_xy(point.x.clamp(0.0, width), point.y.clamp(0.0, height))
}

/// Brightness of a segment whose length is `distance`, as a fraction of the
/// canvas diagonal.
///
/// Falls off with the inverse square of the distance, so slow parts of the
/// trace glow and fast jumps fade, the way a phosphor beam does. Saturates
/// at 1.0.
pub fn beam_intensity(distance: f32, gain: f32) -> f32 {
    if distance <= f32::EPSILON {
        return 1.0;
    }
    (gain / (distance * distance)).clamp(0.0, 1.0)
}

/// The last four trace points, newest first
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointHistory {
    points: [Point; 4],
}

impl PointHistory {
    /// Shift every point back one slot and put `point` in front
    pub fn push(&mut self, point: Point) {
        self.points.rotate_right(1);
        self.points[0] = point;
    }

    pub fn newest(&self) -> Point {
        self.points[0]
    }

    /// `[p0, p1, p2, p3]`, p0 being the newest
    pub fn points(&self) -> [Point; 4] {
        self.points
    }

    /// Distance between the two newest points over the canvas diagonal
    pub fn normalized_step(&self, width: f32, height: f32) -> f32 {
        let diagonal = width.hypot(height);
        if diagonal <= 0.0 {
            return 0.0;
        }
        self.points[0].distance(self.points[1]) / diagonal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_unit_square_to_canvas() {
        let origin = Point::zero();
        let p = map_frame(StereoFrame::new(-1.0, 1.0), origin, 800.0, 600.0);
        assert_eq!(p, Point::from_xy(0.0, 600.0));

        let p = map_frame(StereoFrame::new(0.5, -0.5), origin, 800.0, 600.0);
        assert_eq!(p, Point::from_xy(600.0, 150.0));
    }

    #[test]
    fn test_silence_reuses_previous_point() {
        let first = map_frame(StereoFrame::new(0.5, 0.25), Point::zero(), 800.0, 800.0);
        let mut current = first;
        for _ in 0..5 {
            current = map_frame(StereoFrame::new(0.0, 0.0), current, 800.0, 800.0);
            assert_eq!(current, first);
        }

        // A single zero channel is still a real position
        let p = map_frame(StereoFrame::new(0.0, 1.0), first, 800.0, 800.0);
        assert_eq!(p, Point::from_xy(400.0, 800.0));
    }

    #[test]
    fn test_non_finite_reuses_previous_point() {
        let previous = Point::from_xy(10.0, 20.0);
        let p = map_frame(StereoFrame::new(f32::NAN, 0.5), previous, 800.0, 800.0);
        assert_eq!(p, previous);
        let p = map_frame(StereoFrame::new(0.5, f32::INFINITY), previous, 800.0, 800.0);
        assert_eq!(p, previous);
    }

    #[test]
    fn test_clamps_out_of_range() {
        let p = map_frame(StereoFrame::new(1.5, -2.0), Point::zero(), 800.0, 600.0);
        assert_eq!(p, Point::from_xy(800.0, 0.0));

        let p = map_frame(StereoFrame::new(-3.0, 7.0), Point::zero(), 800.0, 600.0);
        assert_eq!(p, Point::from_xy(0.0, 600.0));
    }

    #[test]
    fn test_clamps_reused_point_after_shrink() {
        let previous = Point::from_xy(1000.0, 900.0);
        let p = map_frame(StereoFrame::default(), previous, 400.0, 300.0);
        assert_eq!(p, Point::from_xy(400.0, 300.0));
    }

    #[test]
    fn test_intensity_falls_with_distance() {
        let gain = 1.0e-4;
        assert_eq!(beam_intensity(0.0, gain), 1.0);
        assert_eq!(beam_intensity(1.0e-6, gain), 1.0);

        let mut last = beam_intensity(1.0e-3, gain);
        for step in 1..=100 {
            let intensity = beam_intensity(step as f32 * 0.01, gain);
            assert!(intensity <= last);
            assert!((0.0..=1.0).contains(&intensity));
            last = intensity;
        }
        assert!(beam_intensity(1.0, gain) < 0.001);
    }

    #[test]
    fn test_history_shifts_newest_first() {
        let mut history = PointHistory::default();
        for i in 1..=5 {
            history.push(Point::from_xy(i as f32, 0.0));
        }

        let xs: Vec<f32> = history.points().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![5.0, 4.0, 3.0, 2.0]);
        assert_eq!(history.newest(), Point::from_xy(5.0, 0.0));
    }

    #[test]
    fn test_normalized_step() {
        let mut history = PointHistory::default();
        history.push(Point::from_xy(0.0, 0.0));
        history.push(Point::from_xy(300.0, 400.0));
        assert!((history.normalized_step(300.0, 400.0) - 1.0).abs() < 1e-6);
        assert_eq!(history.normalized_step(0.0, 0.0), 0.0);
    }
}
