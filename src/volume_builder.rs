//! Assembly of a [`Volume`] from decoded frames and header metadata.
//!
//! Decoding the imaging file format is the loader collaborator's job; this
//! module consumes its output: an ordered stack of per-slice intensity
//! frames plus the header tags needed to calibrate the voxel grid into
//! world (patient) millimeter coordinates.

use log::warn;
use nalgebra::{Matrix4, Vector3};
use ndarray::{Array2, Array3, s};

use crate::volume::{Volume, VolumeError, WindowLevel};

/// Spatial calibration tags of an acquisition.
#[derive(Clone, Copy, Debug)]
pub struct GeometryMeta {
    /// Direction cosines of a pixel row.
    pub row_cosines: [f32; 3],
    /// Direction cosines of a pixel column.
    pub col_cosines: [f32; 3],
    /// World position of the first frame's first voxel.
    pub origin: [f32; 3],
    /// World position of the second frame; fixes the slice spacing.
    pub neighbor_origin: [f32; 3],
    /// In-plane pixel spacing (x, y) in millimeters.
    pub pixel_spacing: [f32; 2],
}

/// Header metadata accompanying the decoded frames.
#[derive(Clone, Copy, Debug)]
pub struct VolumeMeta {
    pub slope: f32,
    pub intercept: f32,
    pub windowing: WindowLevel,
    /// Spatial calibration; `None` when the source header lacked the tags.
    pub geometry: Option<GeometryMeta>,
}

pub struct VolumeBuilder;

impl VolumeBuilder {
    /// Build a volume from an ordered stack of decoded frames.
    ///
    /// Frames arrive already sorted by the loader. When the geometry tags
    /// are missing the volume is still built, calibrated with the identity
    /// transform; slice positions are then voxel indices rather than
    /// millimeters.
    ///
    /// # Errors
    ///
    /// Returns an error if no frames are given, the frames disagree on
    /// dimensions, or the geometry tags are degenerate.
    pub fn from_frames(frames: &[Array2<u8>], meta: &VolumeMeta) -> Result<Volume, VolumeError> {
        if frames.is_empty() {
            return Err(VolumeError::Empty);
        }
        Self::validate_dimensions(frames)?;

        let calibration = match &meta.geometry {
            Some(geometry) => compute_calibration(geometry)?,
            None => {
                warn!("missing spatial calibration tags, falling back to identity");
                Matrix4::identity()
            }
        };

        let voxels = Self::stack_frames(frames);
        Volume::new(
            voxels,
            meta.slope,
            meta.intercept,
            meta.windowing,
            calibration,
        )
    }

    fn validate_dimensions(frames: &[Array2<u8>]) -> Result<(), VolumeError> {
        let first_dim = frames[0].dim();
        if frames.iter().any(|frame| frame.dim() != first_dim) {
            return Err(VolumeError::InconsistentDimensions);
        }
        Ok(())
    }

    fn stack_frames(frames: &[Array2<u8>]) -> Array3<u8> {
        let (rows, cols) = frames[0].dim();
        let depth = frames.len();
        let mut voxels = Array3::<u8>::zeros((depth, rows, cols));

        for (i, frame) in frames.iter().enumerate() {
            voxels.slice_mut(s![i, .., ..]).assign(frame);
        }

        voxels
    }
}

/// Assemble the affine voxel-to-world calibration from the acquisition tags.
///
/// The two in-plane direction cosines are normalized and the through-plane
/// axis derived as their cross product. The slice spacing is the distance
/// between the first two frame origins projected onto that axis, assumed
/// constant across the whole stack; non-uniformly spaced acquisitions are
/// not corrected for.
///
/// The result maps voxel indices through rotation, then the voxel-spacing
/// scale, then the translation to the first frame's origin.
///
/// # Errors
///
/// Returns [`VolumeError::DegenerateOrientation`] when a cosine vector has
/// (near-)zero length, contains non-finite components, or the two vectors
/// are parallel.
pub fn compute_calibration(geometry: &GeometryMeta) -> Result<Matrix4<f32>, VolumeError> {
    let dir_x = unit_direction(geometry.row_cosines)?;
    let dir_y = unit_direction(geometry.col_cosines)?;
    let dir_z = dir_x
        .cross(&dir_y)
        .try_normalize(1e-6)
        .ok_or(VolumeError::DegenerateOrientation)?;

    let origin = Vector3::from(geometry.origin);
    let neighbor = Vector3::from(geometry.neighbor_origin);
    let slice_spacing = (neighbor - origin).dot(&dir_z).abs();
    if slice_spacing < 1e-6 {
        warn!("frame origins coincide along the slice normal, spacing is {slice_spacing}");
    }

    let mut calibration = Matrix4::identity();
    calibration
        .fixed_view_mut::<3, 1>(0, 0)
        .copy_from(&(dir_x * geometry.pixel_spacing[0]));
    calibration
        .fixed_view_mut::<3, 1>(0, 1)
        .copy_from(&(dir_y * geometry.pixel_spacing[1]));
    calibration
        .fixed_view_mut::<3, 1>(0, 2)
        .copy_from(&(dir_z * slice_spacing));
    calibration.fixed_view_mut::<3, 1>(0, 3).copy_from(&origin);
    Ok(calibration)
}

// `try_normalize` alone does not flag NaN components; its norm comparison
// is false for NaN and would let the vector through.
fn unit_direction(cosines: [f32; 3]) -> Result<Vector3<f32>, VolumeError> {
    if !cosines.iter().all(|c| c.is_finite()) {
        return Err(VolumeError::DegenerateOrientation);
    }
    Vector3::from(cosines)
        .try_normalize(1e-6)
        .ok_or(VolumeError::DegenerateOrientation)
}
