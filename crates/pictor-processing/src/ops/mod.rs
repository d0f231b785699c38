//! Individual pipeline operations over decoded images.

pub mod filters;
pub mod orientation;
pub mod resize;
pub mod watermark;
