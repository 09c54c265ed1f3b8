//! Inverse resampling of one slice image from the volume.

use image::ImageBuffer;
use image::Luma;
use nalgebra::Point3;
use rayon::prelude::*;

use crate::slice_frame::SliceFrame;
use crate::volume::Volume;

/// Render the slice described by `frame` from `volume` into a grayscale
/// image.
///
/// Every output pixel is mapped from plane-local millimeters into world
/// space, then through the inverse calibration into voxel coordinates,
/// rounded to the nearest voxel and clamped into the grid, so pixels just
/// outside the true volume footprint repeat the nearest boundary voxel
/// instead of leaving a gap. Rescale and window/level are applied exactly
/// once, here.
///
/// Rows are rendered in parallel; the volume is only read, and identical
/// inputs produce byte-identical buffers.
pub fn cut(frame: &SliceFrame, volume: &Volume) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
    let (width, height) = frame.image_px;
    let calibration_inv = volume.calibration_inv();
    let basis_x = frame.basis_x();
    let basis_y = frame.basis_y();
    let origin = frame.plane.origin;
    let (depth, rows, cols) = volume.dim();
    let windowing = volume.windowing();

    let mut data = vec![0u8; width as usize * height as usize];
    data.par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(j, row)| {
            let v = frame.extent.min.y + j as f32 * frame.pixel_mm;
            for (i, pixel) in row.iter_mut().enumerate() {
                let u = frame.extent.min.x + i as f32 * frame.pixel_mm;
                let world: Point3<f32> = origin + basis_x * u + basis_y * v;
                let voxel = calibration_inv.transform_point(&world);
                let x = clamp_index(voxel.x, cols);
                let y = clamp_index(voxel.y, rows);
                let z = clamp_index(voxel.z, depth);
                let raw = volume.voxels()[[z, y, x]];
                *pixel = windowing.map(volume.rescale(raw));
            }
        });

    ImageBuffer::from_raw(width, height, data)
}

/// Round to the nearest voxel index and clamp into `[0, len - 1]`.
/// Non-finite coordinates clamp to 0.
pub(crate) fn clamp_index(coordinate: f32, len: usize) -> usize {
    let max = len - 1;
    let rounded = coordinate.round();
    if !(rounded > 0.0) {
        0
    } else if rounded >= max as f32 {
        max
    } else {
        rounded as usize
    }
}
