//! Slice frames: the oriented cutting plane, the plane-local extent of the
//! volume silhouette and the output pixel grid for one reconstruction
//! request.

use std::f32::consts::FRAC_PI_2;

use log::debug;
use nalgebra::{Matrix3, Matrix4, Point2, Point3, Rotation3, Vector3};
use thiserror::Error;

use crate::enums::Orientation;
use crate::geometry::{Edge, Plane, Rect2, box_edges, intersect_edges, to_plane_uv};
use crate::volume::{Aabb, Volume};

/// Fixed output image width in pixels. The height follows from the extent's
/// aspect ratio so pixels stay square.
pub const IMAGE_WIDTH: u32 = 256;

#[derive(Debug, Error)]
pub enum SliceError {
    #[error("slice index {index} out of range for {orientation:?} axis of length {len}")]
    IndexOutOfRange {
        orientation: Orientation,
        index: usize,
        len: usize,
    },

    #[error("cutting plane does not intersect the volume")]
    NoIntersection,

    #[error("plane-local extent of the volume silhouette has zero area")]
    EmptyExtent,
}

/// Geometry of one reconstructed slice.
///
/// `basis` places the slice's local X/Y/Z axes in world space, translated to
/// the plane origin; the renderer uses it together with `image_mm` to
/// position and size the textured quad. `extent` is the plane-local
/// bounding rectangle of the volume silhouette, in millimeters. The
/// intersection points and the tested box edges are kept for debug
/// overlays.
#[derive(Clone, Debug)]
pub struct SliceFrame {
    pub basis: Matrix4<f32>,
    pub plane: Plane,
    pub aabb: Aabb,
    pub extent: Rect2,
    pub intersections: Vec<Point3<f32>>,
    pub edges: [Edge; 12],
    /// Output image size in pixels (width, height).
    pub image_px: (u32, u32),
    /// Physical size of the output image in millimeters (width, height).
    pub image_mm: (f32, f32),
    /// Physical size of one square output pixel in millimeters.
    pub pixel_mm: f32,
}

impl SliceFrame {
    /// Slice along the volume's native through-plane axis at `index`.
    pub fn axial(volume: &Volume, index: usize) -> Result<Self, SliceError> {
        Self::orthogonal(volume, Orientation::Axial, index)
    }

    /// Slice at row `index`, with the basis rotated 90 degrees about X.
    pub fn coronal(volume: &Volume, index: usize) -> Result<Self, SliceError> {
        Self::orthogonal(volume, Orientation::Coronal, index)
    }

    /// Slice at column `index`, with the basis rotated 90 degrees about Y.
    pub fn sagittal(volume: &Volume, index: usize) -> Result<Self, SliceError> {
        Self::orthogonal(volume, Orientation::Sagittal, index)
    }

    /// Slice along one of the three orthogonal viewing axes.
    ///
    /// The basis starts from the volume's orientation and, for coronal and
    /// sagittal cuts, is rotated a quarter turn about the local X or Y axis
    /// before placement. The plane passes through the world position of the
    /// voxel at `index` along the chosen axis.
    pub fn orthogonal(
        volume: &Volume,
        orientation: Orientation,
        index: usize,
    ) -> Result<Self, SliceError> {
        let (depth, rows, cols) = volume.dim();
        let len = match orientation {
            Orientation::Axial => depth,
            Orientation::Coronal => rows,
            Orientation::Sagittal => cols,
        };
        if index >= len {
            return Err(SliceError::IndexOutOfRange {
                orientation,
                index,
                len,
            });
        }

        let oriented = volume.orientation_basis();
        let k = index as f32;
        let (rotation, voxel_origin) = match orientation {
            Orientation::Axial => (oriented, Point3::new(0.0, 0.0, k)),
            Orientation::Coronal => (
                oriented * Rotation3::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2).into_inner(),
                Point3::new(0.0, k, 0.0),
            ),
            Orientation::Sagittal => (
                oriented * Rotation3::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2).into_inner(),
                Point3::new(k, 0.0, 0.0),
            ),
        };
        let origin = volume.voxel_to_world(voxel_origin);
        let normal = rotation * Vector3::z();
        Self::from_plane(volume, rotation, Plane::new(origin, normal))
    }

    /// Slice with a caller-supplied orthonormal basis, through the center
    /// of the volume's world-space bounding box. The cutting plane's normal
    /// is the basis's local -Z axis.
    pub fn free(volume: &Volume, basis: Matrix3<f32>) -> Result<Self, SliceError> {
        Self::free_at(volume, basis, volume.world_center())
    }

    /// Like [`SliceFrame::free`], but with an explicit plane origin.
    pub fn free_at(
        volume: &Volume,
        basis: Matrix3<f32>,
        origin: Point3<f32>,
    ) -> Result<Self, SliceError> {
        let normal = basis * -Vector3::z();
        Self::from_plane(volume, basis, Plane::new(origin, normal))
    }

    /// Common tail of every mode: intersect the plane against the bounding
    /// box, project the intersection points into plane-local coordinates,
    /// take their bounding rectangle and size the output image from it.
    fn from_plane(
        volume: &Volume,
        rotation: Matrix3<f32>,
        plane: Plane,
    ) -> Result<Self, SliceError> {
        let aabb = volume.corners();
        let edges = box_edges(&aabb.min, &aabb.max);
        let intersections = intersect_edges(&edges, &plane);
        if intersections.len() < 3 {
            return Err(SliceError::NoIntersection);
        }

        let basis_x: Vector3<f32> = rotation.column(0).into_owned();
        let basis_y: Vector3<f32> = rotation.column(1).into_owned();
        let projected: Vec<Point2<f32>> = intersections
            .iter()
            .map(|point| to_plane_uv(point, &plane, &basis_x, &basis_y))
            .collect();
        let extent = Rect2::from_points(&projected).ok_or(SliceError::EmptyExtent)?;
        if extent.width() <= f32::EPSILON || extent.height() <= f32::EPSILON {
            return Err(SliceError::EmptyExtent);
        }

        let pixel_mm = extent.width() / IMAGE_WIDTH as f32;
        let height_px = (extent.height() / pixel_mm).round() as u32;
        if height_px == 0 {
            return Err(SliceError::EmptyExtent);
        }
        debug!(
            "slice extent {:.2}x{:.2} mm from {} intersection points, {}x{} px",
            extent.width(),
            extent.height(),
            intersections.len(),
            IMAGE_WIDTH,
            height_px
        );

        let mut basis = rotation.to_homogeneous();
        basis
            .fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&plane.origin.coords);

        Ok(Self {
            basis,
            plane,
            aabb,
            image_mm: (extent.width(), extent.height()),
            image_px: (IMAGE_WIDTH, height_px),
            pixel_mm,
            extent,
            intersections,
            edges,
        })
    }

    /// Unit X axis of the slice's local coordinate system, in world space.
    pub fn basis_x(&self) -> Vector3<f32> {
        self.basis.fixed_view::<3, 1>(0, 0).into_owned()
    }

    /// Unit Y axis of the slice's local coordinate system, in world space.
    pub fn basis_y(&self) -> Vector3<f32> {
        self.basis.fixed_view::<3, 1>(0, 1).into_owned()
    }

    /// Unit Z axis of the slice's local coordinate system, in world space.
    pub fn basis_z(&self) -> Vector3<f32> {
        self.basis.fixed_view::<3, 1>(0, 2).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::WindowLevel;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    fn identity_volume(depth: usize, rows: usize, cols: usize) -> Volume {
        let voxels = Array3::zeros((depth, rows, cols));
        let windowing = WindowLevel {
            window: 128.0,
            level: 256.0,
        };
        Volume::new(voxels, 1.0, 0.0, windowing, Matrix4::identity()).unwrap()
    }

    #[test]
    fn axial_extent_covers_unit_spacing_footprint() {
        let volume = identity_volume(10, 10, 10);
        let frame = SliceFrame::axial(&volume, 5).unwrap();
        assert_relative_eq!(frame.extent.min.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(frame.extent.min.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(frame.extent.max.x, 10.0, epsilon = 1e-5);
        assert_relative_eq!(frame.extent.max.y, 10.0, epsilon = 1e-5);
        assert_relative_eq!(frame.plane.origin.z, 5.0, epsilon = 1e-5);
        assert_eq!(frame.image_px, (256, 256));
        assert_relative_eq!(frame.pixel_mm, 10.0 / 256.0, epsilon = 1e-6);
    }

    #[test]
    fn axial_midplane_cuts_four_box_edges() {
        let volume = identity_volume(4, 6, 8);
        let frame = SliceFrame::axial(&volume, 2).unwrap();
        assert_eq!(frame.intersections.len(), 4);
        // Silhouette of the XY face: cols wide, rows high.
        assert_relative_eq!(frame.image_mm.0, 8.0, epsilon = 1e-5);
        assert_relative_eq!(frame.image_mm.1, 6.0, epsilon = 1e-5);
        assert_eq!(frame.image_px.1, 192);
    }

    #[test]
    fn coronal_plane_normal_and_extent() {
        let volume = identity_volume(4, 6, 8);
        let frame = SliceFrame::coronal(&volume, 3).unwrap();
        // Quarter turn about X maps local Z onto -Y.
        assert_relative_eq!((frame.basis_z() - Vector3::new(0.0, -1.0, 0.0)).norm(), 0.0, epsilon = 1e-5);
        assert_relative_eq!(frame.plane.origin.y, 3.0, epsilon = 1e-5);
        assert_relative_eq!(frame.image_mm.0, 8.0, epsilon = 1e-4);
        assert_relative_eq!(frame.image_mm.1, 4.0, epsilon = 1e-4);
    }

    #[test]
    fn sagittal_plane_normal_and_extent() {
        let volume = identity_volume(4, 6, 8);
        let frame = SliceFrame::sagittal(&volume, 7).unwrap();
        // Quarter turn about Y maps local Z onto +X.
        assert_relative_eq!((frame.basis_z() - Vector3::x()).norm(), 0.0, epsilon = 1e-5);
        assert_relative_eq!(frame.plane.origin.x, 7.0, epsilon = 1e-5);
        assert_relative_eq!(frame.image_mm.0, 4.0, epsilon = 1e-4);
        assert_relative_eq!(frame.image_mm.1, 6.0, epsilon = 1e-4);
    }

    #[test]
    fn free_slice_passes_through_box_center() {
        let volume = identity_volume(4, 6, 8);
        let frame = SliceFrame::free(&volume, Matrix3::identity()).unwrap();
        assert_relative_eq!((frame.basis_z() - Vector3::z()).norm(), 0.0, epsilon = 1e-6);
        assert_relative_eq!((frame.plane.normal + Vector3::z()).norm(), 0.0, epsilon = 1e-6);
        assert_relative_eq!(frame.plane.origin.z, 2.0, epsilon = 1e-5);
        // Extent is centered on the plane origin.
        assert_relative_eq!(frame.extent.min.x, -4.0, epsilon = 1e-5);
        assert_relative_eq!(frame.extent.max.x, 4.0, epsilon = 1e-5);
        assert_relative_eq!(frame.extent.min.y, -3.0, epsilon = 1e-5);
        assert_relative_eq!(frame.extent.max.y, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn oblique_free_slice_intersects_more_than_four_edges() {
        let volume = identity_volume(10, 10, 10);
        let basis =
            Rotation3::from_axis_angle(&Vector3::x_axis(), std::f32::consts::FRAC_PI_4)
                .into_inner();
        let frame = SliceFrame::free(&volume, basis).unwrap();
        assert!(frame.intersections.len() >= 4);
        assert!(frame.extent.width() > 0.0);
    }

    #[test]
    fn rejects_out_of_range_index() {
        let volume = identity_volume(4, 6, 8);
        assert!(matches!(
            SliceFrame::axial(&volume, 4),
            Err(SliceError::IndexOutOfRange { len: 4, .. })
        ));
        assert!(matches!(
            SliceFrame::coronal(&volume, 6),
            Err(SliceError::IndexOutOfRange { len: 6, .. })
        ));
        assert!(matches!(
            SliceFrame::sagittal(&volume, 8),
            Err(SliceError::IndexOutOfRange { len: 8, .. })
        ));
    }

    #[test]
    fn rejects_degenerate_free_basis() {
        // A zero basis yields a zero-length plane normal; the request must
        // fail cleanly instead of producing NaN geometry.
        let volume = identity_volume(4, 6, 8);
        let result = SliceFrame::free(&volume, Matrix3::zeros());
        assert!(matches!(result, Err(SliceError::NoIntersection)));
    }

    #[test]
    fn rejects_plane_outside_volume() {
        let volume = identity_volume(4, 6, 8);
        let result = SliceFrame::free_at(
            &volume,
            Matrix3::identity(),
            Point3::new(0.0, 0.0, 100.0),
        );
        assert!(matches!(result, Err(SliceError::NoIntersection)));
    }
}
