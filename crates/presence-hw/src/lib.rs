//! presence-hw — Camera capture for the attendance kiosk.
//!
//! Grabs grayscale frames from a V4L2 device and encodes them as PNG for
//! the embedding provider.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, FrameStream, PixelFormat};
pub use frame::{Frame, FrameError};
