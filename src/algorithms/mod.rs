//! Collection of general or specifc algorithms which may be useful
//! to any kind of odometry or pose tracking implementations

pub mod brief;
pub mod camera;
pub mod epipolar;
pub mod ransac;
pub mod triangulation;

pub use camera::{disambiguate_camera_pose, Intrinsics};
