//! Orientation helpers
//!
//! Root-state rows store orientation as `(x, y, z, w)`. [`Quaternion`] keeps
//! that layout and converts to nalgebra when rotation math is needed.

mod quaternion;

pub use quaternion::Quaternion;
