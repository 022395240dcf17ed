// bounds.rs
use glam::{Mat4, Vec3};

use crate::uniforms::UniformMatrixArray;

/// Axis aligned bounding box. An inverted box (min > max) is the empty box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::INFINITY,
        max: Vec3::NEG_INFINITY,
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, Self::expanded_by)
    }

    /// False for the empty box. Hosts treat an invalid bound as "nothing to draw".
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    pub fn expanded_by(self, point: Vec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    pub fn union(self, other: Self) -> Self {
        if !other.is_valid() {
            return self;
        }
        if !self.is_valid() {
            return other;
        }
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Box enclosing the eight transformed corners.
    pub fn transformed(&self, matrix: Mat4) -> Self {
        if !self.is_valid() {
            return Self::EMPTY;
        }
        Self::from_points(self.corners().map(|c| matrix.transform_point3(c)))
    }

    /// Union of `base` placed by every matrix. Both estimator variants go
    /// through here so they agree bit for bit.
    pub fn union_of_transformed(base: &Aabb, matrices: impl IntoIterator<Item = Mat4>) -> Self {
        matrices
            .into_iter()
            .fold(Self::EMPTY, |acc, m| acc.union(base.transformed(m)))
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Computes a batch's bound from its instance matrices.
#[derive(Debug, Clone)]
pub enum BoundingVolumeEstimator {
    /// Re-reads the live uniform array on every query, limited to its
    /// populated count.
    Live {
        base: Aabb,
        array: UniformMatrixArray,
    },
    /// Matrices copied when the batch was built.
    Snapshot { base: Aabb, matrices: Vec<Mat4> },
}

impl BoundingVolumeEstimator {
    pub fn live(base: Aabb, array: UniformMatrixArray) -> Self {
        Self::Live { base, array }
    }

    pub fn snapshot(base: Aabb, matrices: &[Mat4]) -> Self {
        Self::Snapshot {
            base,
            matrices: matrices.to_vec(),
        }
    }

    pub fn compute(&self) -> Aabb {
        match self {
            Self::Live { base, array } => {
                array.with_populated(|m| Aabb::union_of_transformed(base, m.iter().copied()))
            }
            Self::Snapshot { base, matrices } => {
                Aabb::union_of_transformed(base, matrices.iter().copied())
            }
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live { .. })
    }
}
