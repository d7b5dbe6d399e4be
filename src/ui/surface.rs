//! eframe-backed [`Surface`]
//!
//! The controller works in physical pixels, the unit of image sizes and
//! profile offsets; egui works in logical points. Conversion happens here
//! using the current `pixels_per_point`. Images are uploaded as a single
//! texture that is replaced in place for every new frame.

use eframe::egui;
use image::RgbaImage;

use crate::overlay::{Point, Rect, Size, Surface};

pub struct EguiSurface {
    ctx: egui::Context,
    texture: Option<egui::TextureHandle>,
    size: Size,
}

impl EguiSurface {
    pub fn new(ctx: egui::Context) -> Self {
        Self {
            ctx,
            texture: None,
            size: Size::default(),
        }
    }

    /// Texture currently on screen
    pub fn texture(&self) -> Option<&egui::TextureHandle> {
        self.texture.as_ref()
    }

    /// Window size last requested, in pixels
    pub fn size(&self) -> Size {
        self.size
    }

    /// Convert a window-system position in points to pixels
    pub fn point_to_pixels(&self, pos: egui::Pos2) -> Point {
        position_in_pixels(pos, self.ctx.pixels_per_point())
    }

    /// On-screen size of the current texture, in points
    pub fn texture_size_points(&self) -> Option<egui::Vec2> {
        let ppp = self.ctx.pixels_per_point();
        self.texture.as_ref().map(|t| {
            let [w, h] = t.size();
            size_in_points(Size::new(w as u32, h as u32), ppp)
        })
    }

    fn upload(&mut self, image: &RgbaImage) {
        let size = [image.width() as usize, image.height() as usize];
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, image.as_raw());

        match self.texture.as_mut() {
            Some(texture) => texture.set(color_image, egui::TextureOptions::LINEAR),
            None => {
                self.texture = Some(self.ctx.load_texture(
                    "overlay",
                    color_image,
                    egui::TextureOptions::LINEAR,
                ));
            }
        }
        self.ctx.request_repaint();
    }
}

impl Surface for EguiSurface {
    fn work_area(&self) -> Option<Rect> {
        let ppp = self.ctx.pixels_per_point();
        self.ctx
            .input(|i| i.viewport().monitor_size)
            .filter(|size| size.x > 0.0 && size.y > 0.0)
            .map(|size| area_in_pixels(size, ppp))
    }

    fn move_to(&mut self, position: Point) {
        let ppp = self.ctx.pixels_per_point();
        self.ctx
            .send_viewport_cmd(egui::ViewportCommand::OuterPosition(position_in_points(
                position, ppp,
            )));
    }

    fn resize(&mut self, size: Size) {
        self.size = size;
        let ppp = self.ctx.pixels_per_point();
        self.ctx
            .send_viewport_cmd(egui::ViewportCommand::InnerSize(size_in_points(size, ppp)));
    }

    fn show_image(&mut self, image: &RgbaImage) {
        self.upload(image);
    }

    fn show_frame(&mut self, image: &RgbaImage, index: usize) {
        tracing::trace!("Animation frame {}", index);
        self.upload(image);
    }
}

fn area_in_pixels(size: egui::Vec2, ppp: f32) -> Rect {
    Rect::new(0, 0, (size.x * ppp).round() as u32, (size.y * ppp).round() as u32)
}

fn position_in_points(position: Point, ppp: f32) -> egui::Pos2 {
    egui::pos2(position.x as f32 / ppp, position.y as f32 / ppp)
}

fn position_in_pixels(pos: egui::Pos2, ppp: f32) -> Point {
    Point::new((pos.x * ppp).round() as i32, (pos.y * ppp).round() as i32)
}

fn size_in_points(size: Size, ppp: f32) -> egui::Vec2 {
    egui::vec2(size.width as f32 / ppp, size.height as f32 / ppp)
}
