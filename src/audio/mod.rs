//! Audio module - handles audio input and capture buffering
//!
//! This module provides:
//! - Dual capture buffer handing frames from the audio thread to the render loop
//! - Audio input capture

mod buffer;
mod input;

pub use buffer::{CaptureReader, DualCaptureBuffer, StereoFrame, DEFAULT_CAPACITY};
pub use input::{AudioInput, CaptureError};
