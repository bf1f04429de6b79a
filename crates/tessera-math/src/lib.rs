//! Geometric primitives shared by voxel culling and cluster construction.

pub mod aabb;
pub mod frustum;

pub use aabb::{Aabb, BoundingSphere};
pub use frustum::{Frustum, FrustumPlane, Plane};
