//! Plane and bounding-box geometry for slice extraction.
//!
//! All positions are in world (patient) millimeter coordinates. The cutting
//! plane is intersected against the finite edges of the volume's world-space
//! bounding box; the resulting points are projected into the plane's local
//! X/Y axes to obtain the 2D footprint of the volume on the plane.

use nalgebra::{Point2, Point3, Vector3};

/// Distance below which two intersection points count as the same point,
/// in world millimeters. A plane passing through a box vertex is found by
/// up to three edges at once.
pub const MERGE_EPSILON: f32 = 1e-4;

/// A cutting surface: a point on the plane plus a unit normal.
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub origin: Point3<f32>,
    pub normal: Vector3<f32>,
}

impl Plane {
    /// Create a plane from an origin point and a (not necessarily unit)
    /// normal direction. The normal is normalized here.
    ///
    /// A zero-length or non-finite normal is replaced by the zero vector:
    /// such a plane intersects no edge, so degenerate input surfaces as a
    /// missing-intersection error downstream instead of propagating NaNs.
    pub fn new(origin: Point3<f32>, normal: Vector3<f32>) -> Self {
        // `try_normalize` alone lets NaN components through; its norm
        // comparison is false for NaN.
        let normal = if normal.iter().all(|c| c.is_finite()) {
            normal
                .try_normalize(f32::EPSILON)
                .unwrap_or_else(Vector3::zeros)
        } else {
            Vector3::zeros()
        };
        Self { origin, normal }
    }

    /// Signed distance from `point` to the plane along the normal.
    pub fn signed_distance(&self, point: &Point3<f32>) -> f32 {
        (point - self.origin).dot(&self.normal)
    }
}

/// One finite edge of a box: an origin corner plus a direction vector that
/// spans the edge exactly, so `origin + t * direction` with `t` in `[0, 1]`
/// covers the whole edge and nothing beyond it.
#[derive(Clone, Copy, Debug)]
pub struct Edge {
    pub origin: Point3<f32>,
    pub direction: Vector3<f32>,
}

/// The 12 edges of the axis-aligned box spanned by `min` and `max`,
/// 4 per axis, positioned at the min/max combinations of the other two.
pub fn box_edges(min: &Point3<f32>, max: &Point3<f32>) -> [Edge; 12] {
    let dx = Vector3::new(max.x - min.x, 0.0, 0.0);
    let dy = Vector3::new(0.0, max.y - min.y, 0.0);
    let dz = Vector3::new(0.0, 0.0, max.z - min.z);

    [
        Edge { origin: Point3::new(min.x, min.y, min.z), direction: dx },
        Edge { origin: Point3::new(min.x, max.y, min.z), direction: dx },
        Edge { origin: Point3::new(min.x, min.y, max.z), direction: dx },
        Edge { origin: Point3::new(min.x, max.y, max.z), direction: dx },
        Edge { origin: Point3::new(min.x, min.y, min.z), direction: dy },
        Edge { origin: Point3::new(max.x, min.y, min.z), direction: dy },
        Edge { origin: Point3::new(min.x, min.y, max.z), direction: dy },
        Edge { origin: Point3::new(max.x, min.y, max.z), direction: dy },
        Edge { origin: Point3::new(min.x, min.y, min.z), direction: dz },
        Edge { origin: Point3::new(max.x, min.y, min.z), direction: dz },
        Edge { origin: Point3::new(min.x, max.y, min.z), direction: dz },
        Edge { origin: Point3::new(max.x, max.y, min.z), direction: dz },
    ]
}

/// Intersect one finite edge with a plane.
///
/// Solves `dot((origin + t * direction) - plane.origin, plane.normal) = 0`
/// and accepts the solution only when `t` lies within the edge segment.
/// A plane that crosses the edge's carrier line outside the segment, or an
/// edge parallel to the plane, yields `None`.
pub fn edge_plane_intersection(edge: &Edge, plane: &Plane) -> Option<Point3<f32>> {
    let denom = edge.direction.dot(&plane.normal);
    if denom.abs() < f32::EPSILON {
        return None;
    }
    let t = (plane.origin - edge.origin).dot(&plane.normal) / denom;
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    Some(edge.origin + edge.direction * t)
}

/// Intersect a plane against a set of box edges and return the distinct
/// intersection points. Points closer than [`MERGE_EPSILON`] are merged so
/// a vertex hit by several edges is counted once.
pub fn intersect_edges(edges: &[Edge], plane: &Plane) -> Vec<Point3<f32>> {
    let mut points: Vec<Point3<f32>> = Vec::new();
    for edge in edges {
        if let Some(point) = edge_plane_intersection(edge, plane) {
            if !points.iter().any(|p| (p - point).norm() < MERGE_EPSILON) {
                points.push(point);
            }
        }
    }
    points
}

/// Project a world point into the plane's local 2D coordinates: subtract
/// the plane origin, then take dot products with the plane's unit X and Y
/// axes.
pub fn to_plane_uv(
    point: &Point3<f32>,
    plane: &Plane,
    basis_x: &Vector3<f32>,
    basis_y: &Vector3<f32>,
) -> Point2<f32> {
    let on_plane = point - plane.origin;
    Point2::new(on_plane.dot(basis_x), on_plane.dot(basis_y))
}

/// Axis-aligned rectangle in plane-local millimeter coordinates.
#[derive(Clone, Copy, Debug)]
pub struct Rect2 {
    pub min: Point2<f32>,
    pub max: Point2<f32>,
}

impl Rect2 {
    /// Componentwise bounding rectangle of a non-empty point set.
    pub fn from_points(points: &[Point2<f32>]) -> Option<Self> {
        let first = points.first()?;
        let mut min = *first;
        let mut max = *first;
        for p in &points[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Some(Self { min, max })
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }
}
