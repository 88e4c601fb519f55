use serde::{Deserialize, Serialize};

/// A 2D point in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean pixel distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Arithmetic mean of a non-empty point set.
    fn centroid(points: &[Point]) -> Point {
        let n = points.len() as f64;
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / n, sy / n)
    }
}

/// Axis-aligned face rectangle with the detector's confidence in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
}

impl DetectionBox {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Facial landmarks for one frame, grouped from the 68-point layout.
///
/// Eye points run corner, upper, upper, corner, lower, lower. `nose[3]`
/// is the nose tip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmarks {
    pub left_eye: [Point; 6],
    pub right_eye: [Point; 6],
    pub nose: [Point; 9],
    pub mouth: [Point; 20],
}

impl Landmarks {
    pub fn nose_tip(&self) -> Point {
        self.nose[3]
    }

    pub fn left_eye_center(&self) -> Point {
        Point::centroid(&self.left_eye)
    }

    pub fn right_eye_center(&self) -> Point {
        Point::centroid(&self.right_eye)
    }

    pub fn mouth_center(&self) -> Point {
        Point::centroid(&self.mouth)
    }
}

/// Result of searching a probe descriptor against known descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Smallest distance seen during the scan (`f64::INFINITY` for an empty gallery).
    pub distance: f64,
    /// Position of the matched descriptor (if any).
    pub index: Option<usize>,
}

impl MatchResult {
    pub fn no_match(distance: f64) -> Self {
        Self {
            matched: false,
            distance,
            index: None,
        }
    }
}
