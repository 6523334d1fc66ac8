//! Axis-aligned bounding boxes used for the candidate-rank collision test.

/// Axis-aligned box. A freshly created box is *empty* and intersects nothing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    pub fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a [f64; 3]>,
    {
        let mut b = Self::empty();
        for p in points {
            b.add_point(p);
        }
        b
    }

    pub fn add_point(&mut self, p: &[f64; 3]) {
        for d in 0..3 {
            self.min[d] = self.min[d].min(p[d]);
            self.max[d] = self.max[d].max(p[d]);
        }
    }

    /// True once at least one point has been added.
    pub fn is_valid(&self) -> bool {
        (0..3).all(|d| self.min[d] <= self.max[d])
    }

    /// Grow every side by `tol`.
    pub fn inflate(&mut self, tol: f64) {
        if !self.is_valid() {
            return;
        }
        for d in 0..3 {
            self.min[d] -= tol;
            self.max[d] += tol;
        }
    }

    /// Inclusive overlap test; touching boxes intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        if !self.is_valid() || !other.is_valid() {
            return false;
        }
        (0..3).all(|d| self.min[d] <= other.max[d] && other.min[d] <= self.max[d])
    }

    /// `[xmin, xmax, ymin, ymax, zmin, zmax]`.
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.min[0], self.max[0], self.min[1], self.max[1], self.min[2], self.max[2],
        ]
    }

    pub fn from_array(b: &[f64; 6]) -> Self {
        Self {
            min: [b[0], b[2], b[4]],
            max: [b[1], b[3], b[5]],
        }
    }
}
