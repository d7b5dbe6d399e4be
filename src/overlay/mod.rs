//! Overlay positioning, image display and animation
//!
//! Everything here runs on the UI thread. The window itself is reached only
//! through the [`Surface`] capability trait, and images through
//! [`ImageLoader`], so the controller logic is independent of the toolkit.

pub mod animation;
pub mod controller;
pub mod picture;
pub mod timer;

pub use animation::{AnimationScheduler, MIN_FRAME_DELAY};
pub use controller::OverlayController;
pub use picture::{scale_to_fit, ImageFileLoader, Picture, PictureFrame};
pub use timer::{TimerId, TimerQueue};

use image::RgbaImage;
use std::ops::Add;
use std::path::Path;

use crate::error::RenderError;

/// Screen position in window-system coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Signed displacement from the anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Offset {
    pub dx: i32,
    pub dy: i32,
}

impl Add<Offset> for Point {
    type Output = Point;

    fn add(self, offset: Offset) -> Point {
        Point::new(
            self.x.saturating_add(offset.dx),
            self.y.saturating_add(offset.dy),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Available display area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    pub fn right(&self) -> i32 {
        self.origin.x.saturating_add_unsigned(self.size.width)
    }

    pub fn bottom(&self) -> i32 {
        self.origin.y.saturating_add_unsigned(self.size.height)
    }
}

/// Window capabilities the overlay needs
///
/// Implementations must only be driven from the UI thread.
pub trait Surface {
    /// Display area the overlay lives in, once the toolkit knows it
    fn work_area(&self) -> Option<Rect>;

    fn move_to(&mut self, position: Point);

    fn resize(&mut self, size: Size);

    /// Show a still image
    fn show_image(&mut self, image: &RgbaImage);

    /// Show frame `index` of an animation
    fn show_frame(&mut self, image: &RgbaImage, index: usize);
}

/// Decodes image files into pictures
pub trait ImageLoader {
    fn load(&self, path: &Path) -> Result<Picture, RenderError>;
}

impl<L: ImageLoader + ?Sized> ImageLoader for &L {
    fn load(&self, path: &Path) -> Result<Picture, RenderError> {
        (**self).load(path)
    }
}
