//! Calibrated volume: the voxel grid plus the voxel-to-world transform.

use image::ImageBuffer;
use image::Luma;
use nalgebra::{Matrix3, Matrix4, Point3};
use ndarray::{Array3, s};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("volume contains no voxels")]
    Empty,

    #[error("inconsistent frame dimensions")]
    InconsistentDimensions,

    #[error("calibration matrix is not invertible")]
    SingularCalibration,

    #[error("orientation direction cosines are degenerate")]
    DegenerateOrientation,
}

/// Display intensity mapping parameters.
///
/// Naming follows the source imaging convention used throughout this crate:
/// `window` is the *center* of the displayed intensity range and `level` is
/// its *width*.
#[derive(Clone, Copy, Debug)]
pub struct WindowLevel {
    /// Center of the displayed intensity range.
    pub window: f32,
    /// Width of the displayed intensity range.
    pub level: f32,
}

impl WindowLevel {
    /// Map a rescaled (physical) intensity to an 8-bit display value.
    ///
    /// Values at or below the lower window bound map to 0, values above the
    /// upper bound to 255, and values in between are spread linearly. The
    /// mapping is monotonically non-decreasing in the input.
    ///
    /// A width of 1 (or less) would make the linear ramp degenerate, so it
    /// is treated as a hard threshold at `window - 0.5`.
    pub fn map(&self, physical: f32) -> u8 {
        // Unreachable from u8 samples, but keeps the mapping monotonic for
        // any float input: +inf saturates high, NaN and -inf low.
        if !physical.is_finite() {
            return if physical == f32::INFINITY { 255 } else { 0 };
        }
        let half_range = (self.level - 1.0) / 2.0;
        let shifted_center = self.window - 0.5;
        if self.level <= 1.0 {
            return if physical <= shifted_center { 0 } else { 255 };
        }
        if physical <= shifted_center - half_range {
            0
        } else if physical > shifted_center + half_range {
            255
        } else {
            (((physical - shifted_center) / (self.level - 1.0) + 0.5) * 255.0).round() as u8
        }
    }
}

/// World-space bounding box of a volume: the 8 voxel-box corners mapped
/// through the calibration transform, plus their componentwise min/max.
#[derive(Clone, Debug)]
pub struct Aabb {
    pub calibrated_corners: [Point3<f32>; 8],
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }
}

/// A calibrated medical-imaging volume.
///
/// Holds the dense intensity grid, the rescale parameters, the display
/// window and the affine voxel-to-world calibration. The calibration is
/// required to be invertible; its inverse is computed once here so every
/// later resampling call can map world points back into voxel indices.
/// The volume is immutable after construction and safe to read from any
/// number of threads.
pub struct Volume {
    voxels: Array3<u8>,
    slope: f32,
    intercept: f32,
    windowing: WindowLevel,
    calibration: Matrix4<f32>,
    calibration_inv: Matrix4<f32>,
}

impl Volume {
    /// Build a volume from a voxel grid indexed `[z][y][x]` and its
    /// voxel-to-world calibration.
    ///
    /// # Errors
    ///
    /// Returns an error if the grid is empty or the calibration matrix is
    /// singular; resampling is undefined without an inverse transform.
    pub fn new(
        voxels: Array3<u8>,
        slope: f32,
        intercept: f32,
        windowing: WindowLevel,
        calibration: Matrix4<f32>,
    ) -> Result<Self, VolumeError> {
        if voxels.is_empty() {
            return Err(VolumeError::Empty);
        }
        let calibration_inv = calibration
            .try_inverse()
            .ok_or(VolumeError::SingularCalibration)?;
        Ok(Self {
            voxels,
            slope,
            intercept,
            windowing,
            calibration,
            calibration_inv,
        })
    }

    /// Grid dimensions as (depth, rows, cols).
    pub fn dim(&self) -> (usize, usize, usize) {
        self.voxels.dim()
    }

    pub fn depth(&self) -> usize {
        self.voxels.dim().0
    }

    pub fn rows(&self) -> usize {
        self.voxels.dim().1
    }

    pub fn cols(&self) -> usize {
        self.voxels.dim().2
    }

    pub fn voxels(&self) -> &Array3<u8> {
        &self.voxels
    }

    pub fn windowing(&self) -> WindowLevel {
        self.windowing
    }

    pub fn calibration(&self) -> &Matrix4<f32> {
        &self.calibration
    }

    pub fn calibration_inv(&self) -> &Matrix4<f32> {
        &self.calibration_inv
    }

    /// Rescale a raw stored intensity to a physical value.
    pub fn rescale(&self, raw: u8) -> f32 {
        raw as f32 * self.slope + self.intercept
    }

    /// Map a voxel-index coordinate to world millimeters.
    pub fn voxel_to_world(&self, voxel: Point3<f32>) -> Point3<f32> {
        self.calibration.transform_point(&voxel)
    }

    /// The rotation part of the calibration with unit-length columns: the
    /// volume's orientation basis without the voxel-spacing scale.
    pub fn orientation_basis(&self) -> Matrix3<f32> {
        let linear = self.calibration.fixed_view::<3, 3>(0, 0);
        Matrix3::from_columns(&[
            linear.column(0).normalize(),
            linear.column(1).normalize(),
            linear.column(2).normalize(),
        ])
    }

    /// Map the 8 corners of the voxel box `[0,cols]x[0,rows]x[0,depth]`
    /// through the calibration and take their componentwise min/max.
    pub fn corners(&self) -> Aabb {
        let (depth, rows, cols) = self.dim();
        let (cx, cy, cz) = (cols as f32, rows as f32, depth as f32);
        let voxel_corners = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(cx, 0.0, 0.0),
            Point3::new(0.0, cy, 0.0),
            Point3::new(cx, cy, 0.0),
            Point3::new(0.0, 0.0, cz),
            Point3::new(cx, 0.0, cz),
            Point3::new(0.0, cy, cz),
            Point3::new(cx, cy, cz),
        ];
        let calibrated_corners = voxel_corners.map(|c| self.calibration.transform_point(&c));
        let mut min = calibrated_corners[0];
        let mut max = calibrated_corners[0];
        for corner in &calibrated_corners[1..] {
            min = Point3::new(min.x.min(corner.x), min.y.min(corner.y), min.z.min(corner.z));
            max = Point3::new(max.x.max(corner.x), max.y.max(corner.y), max.z.max(corner.z));
        }
        Aabb {
            calibrated_corners,
            min,
            max,
        }
    }

    /// Center of the world-space bounding box.
    pub fn world_center(&self) -> Point3<f32> {
        self.corners().center()
    }

    /// Render the native axial frame at `index` to a grayscale image, with
    /// rescale and window/level applied once here at display time.
    ///
    /// Returns `None` when `index` is out of range.
    pub fn slice_image(&self, index: usize) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        if index >= self.depth() {
            return None;
        }
        let slice = self.voxels.slice(s![index, .., ..]);
        let pixel_data: Vec<u8> = slice
            .into_par_iter()
            .map(|&raw| self.windowing.map(self.rescale(raw)))
            .collect();
        ImageBuffer::from_raw(self.cols() as u32, self.rows() as u32, pixel_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn wide_open() -> WindowLevel {
        WindowLevel {
            window: 128.0,
            level: 256.0,
        }
    }

    fn gradient_volume(calibration: Matrix4<f32>) -> Volume {
        let voxels = Array3::from_shape_fn((4, 5, 6), |(z, y, x)| (z * 30 + y * 6 + x) as u8);
        Volume::new(voxels, 1.0, 0.0, wide_open(), calibration).unwrap()
    }

    #[test]
    fn rejects_singular_calibration() {
        let voxels = Array3::zeros((2, 2, 2));
        let result = Volume::new(voxels, 1.0, 0.0, wide_open(), Matrix4::zeros());
        assert!(matches!(result, Err(VolumeError::SingularCalibration)));
    }

    #[test]
    fn rejects_empty_grid() {
        let voxels = Array3::zeros((0, 2, 2));
        let result = Volume::new(voxels, 1.0, 0.0, wide_open(), Matrix4::identity());
        assert!(matches!(result, Err(VolumeError::Empty)));
    }

    #[test]
    fn corner_round_trip_through_inverse() {
        // Anisotropic spacing plus a translation: the inverse must restore
        // the voxel-space corners within 1e-4 mm.
        let calibration = Matrix4::new_nonuniform_scaling(&Vector3::new(0.7, 1.3, 2.5))
            .append_translation(&Vector3::new(-12.0, 4.0, 33.0));
        let volume = gradient_volume(calibration);
        let aabb = volume.corners();
        let voxel_corners = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(6.0, 0.0, 0.0),
            Point3::new(0.0, 5.0, 0.0),
            Point3::new(6.0, 5.0, 0.0),
            Point3::new(0.0, 0.0, 4.0),
            Point3::new(6.0, 0.0, 4.0),
            Point3::new(0.0, 5.0, 4.0),
            Point3::new(6.0, 5.0, 4.0),
        ];
        for (world, voxel) in aabb.calibrated_corners.iter().zip(voxel_corners) {
            let back = volume.calibration_inv().transform_point(world);
            assert_relative_eq!((back - voxel).norm(), 0.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn aabb_covers_scaled_box() {
        let calibration = Matrix4::new_nonuniform_scaling(&Vector3::new(2.0, 1.0, 0.5));
        let volume = gradient_volume(calibration);
        let aabb = volume.corners();
        assert_relative_eq!(aabb.min.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(aabb.max.x, 12.0, epsilon = 1e-6);
        assert_relative_eq!(aabb.max.y, 5.0, epsilon = 1e-6);
        assert_relative_eq!(aabb.max.z, 2.0, epsilon = 1e-6);
        assert_relative_eq!(aabb.center().x, 6.0, epsilon = 1e-6);
    }

    #[test]
    fn windowing_saturates_and_is_monotonic() {
        let wl = WindowLevel {
            window: 50.0,
            level: 100.0,
        };
        // Lower bound sits at 0.0, upper at 99.0 for this window.
        assert_eq!(wl.map(-10.0), 0);
        assert_eq!(wl.map(0.0), 0);
        assert_eq!(wl.map(49.5), 128);
        assert_eq!(wl.map(99.0), 255);
        assert_eq!(wl.map(1000.0), 255);

        let mut previous = 0u8;
        for step in -200..400 {
            let mapped = wl.map(step as f32 * 0.5);
            assert!(mapped >= previous);
            previous = mapped;
        }
    }

    #[test]
    fn windowing_guards_unit_width() {
        let wl = WindowLevel {
            window: 40.0,
            level: 1.0,
        };
        assert_eq!(wl.map(39.0), 0);
        assert_eq!(wl.map(39.5), 0);
        assert_eq!(wl.map(39.6), 255);
        assert_eq!(wl.map(40.0), 255);
    }

    #[test]
    fn windowing_saturates_non_finite() {
        let wl = wide_open();
        assert_eq!(wl.map(f32::NAN), 0);
        assert_eq!(wl.map(f32::NEG_INFINITY), 0);
        assert_eq!(wl.map(f32::INFINITY), 255);
    }

    #[test]
    fn slice_image_windows_native_frame() {
        let volume = gradient_volume(Matrix4::identity());
        let image = volume.slice_image(2).unwrap();
        assert_eq!(image.width(), 6);
        assert_eq!(image.height(), 5);
        let repeat = volume.slice_image(2).unwrap();
        assert_eq!(image.as_raw(), repeat.as_raw());
        assert!(volume.slice_image(4).is_none());
    }
}
