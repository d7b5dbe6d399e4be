//! Still and animated pictures
//!
//! GIF files are decoded frame by frame; every other format is decoded as a
//! single still frame.

use image::codecs::gif::GifDecoder;
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use super::{ImageLoader, Size};
use crate::error::RenderError;

#[derive(Debug, Clone, PartialEq)]
pub struct PictureFrame {
    pub image: RgbaImage,
    /// How long this frame stays on screen; zero for stills
    pub delay: Duration,
}

/// Decoded image, one or more frames
#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    frames: Vec<PictureFrame>,
}

impl Picture {
    pub fn still(image: RgbaImage) -> Self {
        Self {
            frames: vec![PictureFrame {
                image,
                delay: Duration::ZERO,
            }],
        }
    }

    /// Build a picture from frames; `None` if there are none
    pub fn animated(frames: Vec<PictureFrame>) -> Option<Self> {
        (!frames.is_empty()).then_some(Self { frames })
    }

    pub fn frames(&self) -> &[PictureFrame] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }

    /// Size of the first frame
    pub fn size(&self) -> Size {
        let (width, height) = self.frames[0].image.dimensions();
        Size::new(width, height)
    }

    /// Shrink every frame to fit within the given bounds
    pub fn scaled_to_fit(self, max_width: u32, max_height: u32) -> Self {
        let target = scale_to_fit(self.size(), max_width, max_height);
        if target == self.size() {
            return self;
        }

        let frames = self
            .frames
            .into_iter()
            .map(|frame| PictureFrame {
                image: imageops::resize(&frame.image, target.width, target.height, FilterType::Triangle),
                delay: frame.delay,
            })
            .collect();

        Self { frames }
    }
}

/// Largest size within the bounds that keeps the aspect ratio.
///
/// Never upscales: an image already inside the bounds keeps its size.
pub fn scale_to_fit(size: Size, max_width: u32, max_height: u32) -> Size {
    if size.width == 0 || size.height == 0 {
        return size;
    }

    let scale = f64::min(
        max_width as f64 / size.width as f64,
        max_height as f64 / size.height as f64,
    );
    if scale >= 1.0 {
        return size;
    }

    Size::new(
        ((size.width as f64 * scale) as u32).max(1),
        ((size.height as f64 * scale) as u32).max(1),
    )
}

/// Loads pictures from disk with the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileLoader;

impl ImageFileLoader {
    fn load_gif(path: &Path) -> Result<Picture, RenderError> {
        let file = File::open(path).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let decode_err = |source| RenderError::Decode {
            path: path.to_path_buf(),
            source,
        };

        let decoder = GifDecoder::new(BufReader::new(file)).map_err(decode_err)?;
        let frames = decoder
            .into_frames()
            .collect_frames()
            .map_err(decode_err)?
            .into_iter()
            .map(|frame| {
                let (numer, denom) = frame.delay().numer_denom_ms();
                let delay_ms = if denom == 0 { 0 } else { numer / denom };
                PictureFrame {
                    delay: Duration::from_millis(delay_ms as u64),
                    image: frame.into_buffer(),
                }
            })
            .collect();

        Picture::animated(frames).ok_or_else(|| RenderError::Empty(path.to_path_buf()))
    }
}

impl ImageLoader for ImageFileLoader {
    fn load(&self, path: &Path) -> Result<Picture, RenderError> {
        if !path.exists() {
            return Err(RenderError::NotFound(path.to_path_buf()));
        }

        let is_gif = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("gif"))
            .unwrap_or(false);

        if is_gif {
            return Self::load_gif(path);
        }

        let image = image::open(path).map_err(|source| RenderError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Picture::still(image.to_rgba8()))
    }
}
