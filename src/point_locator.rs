use rayon::prelude::*;

/// A trait to locate one or several query points within a planar subdivision.
pub trait PointLocator {
    /// Locates one query point.
    ///
    /// Returns [`None`] if the query point lies outside the area covered by
    /// the locator.
    fn locate_one(&self, point: &[f64; 2]) -> Option<usize>;

    /// Locates several query points.
    fn locate_many(&self, points: &[[f64; 2]]) -> Vec<Option<usize>> {
        points.iter().map(|point| self.locate_one(point)).collect()
    }

    /// Locates several query points in parallel.
    ///
    /// This is sound because locating is a pure read of a frozen structure.
    fn par_locate_many(&self, points: &[[f64; 2]]) -> Vec<Option<usize>>
    where
        Self: std::marker::Sync,
    {
        points
            .par_iter()
            .map(|point| self.locate_one(point))
            .collect()
    }
}
