//! Render module - turns captured frames into the XY trace

mod curve;
mod trace;

pub use curve::{CurveRenderer, RenderSettings};
