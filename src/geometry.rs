/// Coincidence tolerance: two coordinates closer than this are considered equal.
///
/// Every numerically sensitive decision in the crate goes through [`Point`] and
/// [`Segment`] predicates, so this is the only place the tolerance appears.
pub(crate) const EPS: f64 = 1e-6;

/// A point of the 2D plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns `true` if this point is strictly to the left of `p`.
    pub fn is_left(&self, p: Point) -> bool {
        self.x < p.x
    }

    /// Returns `true` if both coordinates differ from `p`'s by less than the tolerance.
    pub fn is_same(&self, p: Point) -> bool {
        (self.x - p.x).abs() < EPS && (self.y - p.y).abs() < EPS
    }
}

impl From<[f64; 2]> for Point {
    fn from(value: [f64; 2]) -> Self {
        Self {
            x: value[0],
            y: value[1],
        }
    }
}

/// A non-vertical line segment with its left endpoint first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub(crate) pl: Point,
    pub(crate) pr: Point,
}

impl Segment {
    /// Creates a segment from two endpoints, swapping them if needed so that
    /// `pl` is the left one.
    pub fn new(a: Point, b: Point) -> Self {
        if b.is_left(a) {
            Self { pl: b, pr: a }
        } else {
            Self { pl: a, pr: b }
        }
    }

    /// The left endpoint.
    pub fn pl(&self) -> Point {
        self.pl
    }

    /// The right endpoint.
    pub fn pr(&self) -> Point {
        self.pr
    }

    /// Returns `true` if the segment's supporting line passes above `p`.
    ///
    /// Decided by the sign of the cross product of `pr - pl` and `p - pl`.
    /// Points within the tolerance band of the line count as below it.
    pub fn is_upper(&self, p: Point) -> bool {
        let (dx, dy) = (self.pr.x - self.pl.x, self.pr.y - self.pl.y);
        dx * (p.y - self.pl.y) - dy * (p.x - self.pl.x) < EPS
    }

    /// Returns `true` if `p` coincides with either endpoint.
    pub fn is_endpoint(&self, p: Point) -> bool {
        self.pl.is_same(p) || self.pr.is_same(p)
    }
}
