//! # MPR-volume library
//!
//! Multi-planar reconstruction (MPR) for calibrated 3D medical-imaging
//! volumes: derive axial, coronal, sagittal and freely rotated 2D
//! cross-sections from a stack of decoded intensity frames.
//!
//! The crate owns the geometric slicing core only. Decoding the imaging
//! file format is a collaborator's job; it hands over the per-slice pixel
//! buffers and the header tags ([`VolumeMeta`]) from which the
//! voxel-to-world calibration is assembled. Rendering is the other
//! collaborator: per slice request it receives a [`SliceFrame`] (basis
//! transform and physical image size, for placing a textured quad) plus
//! the resampled grayscale image.
//!
//! A slice request runs in three steps:
//!  - intersect the cutting plane against the volume's world-space
//!    bounding box,
//!  - project the intersection points into the plane's local axes to get
//!    the slice extent and pixel grid,
//!  - inverse-map every output pixel into voxel space, sample, and apply
//!    the display window once.
//!
//! Volumes are immutable after construction, so independent slice requests
//! can run concurrently; each resampling call parallelizes over image rows
//! internally using rayon.
//!
//! # Examples
//!
//! Build a volume from decoded frames and cut the middle axial slice:
//!
//! ```
//! use mpr_volume::{cut, SliceFrame, VolumeBuilder, VolumeMeta, WindowLevel};
//! use ndarray::Array2;
//!
//! let frames: Vec<Array2<u8>> = (0..8)
//!     .map(|z| Array2::from_elem((16, 16), z as u8 * 30))
//!     .collect();
//! let meta = VolumeMeta {
//!     slope: 1.0,
//!     intercept: 0.0,
//!     windowing: WindowLevel { window: 128.0, level: 256.0 },
//!     geometry: None,
//! };
//! let volume = VolumeBuilder::from_frames(&frames, &meta)?;
//! let frame = SliceFrame::axial(&volume, 4)?;
//! let image = cut(&frame, &volume).expect("buffer matches the frame's pixel grid");
//! assert_eq!(image.width(), 256);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod enums;
pub mod geometry;
pub mod resampler;
pub mod slice_frame;
pub mod volume;
pub mod volume_builder;

pub use enums::Orientation;
pub use geometry::{Edge, Plane, Rect2};
pub use resampler::cut;
pub use slice_frame::{IMAGE_WIDTH, SliceError, SliceFrame};
pub use volume::{Aabb, Volume, VolumeError, WindowLevel};
pub use volume_builder::{GeometryMeta, VolumeBuilder, VolumeMeta, compute_calibration};
