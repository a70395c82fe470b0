//! Labeled points of interest

/// A labeled location in unpadded image coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    /// Opaque label, e.g. a cell type
    pub label: String,
    /// Column coordinate
    pub x: i64,
    /// Row coordinate
    pub y: i64,
}

impl Point {
    /// Create a new labeled point
    pub fn new(label: impl Into<String>, x: i64, y: i64) -> Self {
        Point { label: label.into(), x, y }
    }
}

/// Ordered collection of points driving point-centered extraction
///
/// Order is preserved; extraction emits patches point by point in the
/// order points were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointSet {
    points: Vec<Point>,
}

impl PointSet {
    /// Create an empty point set
    pub fn new() -> Self {
        PointSet { points: Vec::new() }
    }

    /// Append a point
    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point> {
        self.points.iter()
    }

    /// Distinct labels in first-seen order
    pub fn labels(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for point in &self.points {
            if !seen.contains(&point.label.as_str()) {
                seen.push(&point.label);
            }
        }
        seen
    }
}

impl From<Vec<Point>> for PointSet {
    fn from(points: Vec<Point>) -> Self {
        PointSet { points }
    }
}

impl FromIterator<Point> for PointSet {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        PointSet { points: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a PointSet {
    type Item = &'a Point;
    type IntoIter = std::slice::Iter<'a, Point>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}
