//! Overlay window module

pub mod overlay_app;
pub mod surface;

pub use overlay_app::{native_options, OverlayApp};
pub use surface::EguiSurface;
