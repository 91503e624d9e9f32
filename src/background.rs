use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{ImageReader, RgbaImage};
use tiny_skia::{Color, IntSize, Pixmap};
use tracing::warn;

use crate::decoding::FfmpegInput;
use crate::media::Visual;
use crate::style::Rgba8;
use crate::timeline::VisualCut;

/// Full-frame, opaque picture behind the captions for one visual cut.
pub trait BackgroundSource {
    /// Frame `t` seconds into the cut. Calls arrive in increasing `t`.
    fn frame(&mut self, t: f64) -> Result<Pixmap>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub fn solid_pixmap(width: u32, height: u32, color: Rgba8) -> Result<Pixmap> {
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| anyhow!("failed to allocate background {width}x{height}"))?;
    pixmap.fill(Color::from_rgba8(color.r, color.g, color.b, 255));
    Ok(pixmap)
}

pub struct SolidBackground {
    width: u32,
    height: u32,
    color: Rgba8,
}

impl SolidBackground {
    pub fn new(width: u32, height: u32, color: Rgba8) -> Self {
        Self {
            width,
            height,
            color,
        }
    }
}

impl BackgroundSource for SolidBackground {
    fn frame(&mut self, _t: f64) -> Result<Pixmap> {
        solid_pixmap(self.width, self.height, self.color)
    }
}

/// A still image scaled to cover the frame, slowly zooming toward its
/// center: scale grows linearly from 1 to `1 + zoom` over the cut.
pub struct StillBackground {
    image: RgbaImage,
    width: u32,
    height: u32,
    zoom: f32,
    duration: f64,
    matte: Rgba8,
}

impl StillBackground {
    pub fn open(
        path: &Path,
        width: u32,
        height: u32,
        zoom: f32,
        duration: f64,
        matte: Rgba8,
    ) -> Result<Self> {
        let image = ImageReader::open(path)
            .with_context(|| format!("failed opening {}", path.display()))?
            .decode()
            .with_context(|| format!("failed decoding {}", path.display()))?
            .to_rgba8();
        Ok(Self::from_image(image, width, height, zoom, duration, matte))
    }

    pub fn from_image(
        image: RgbaImage,
        width: u32,
        height: u32,
        zoom: f32,
        duration: f64,
        matte: Rgba8,
    ) -> Self {
        Self {
            image,
            width,
            height,
            zoom,
            duration,
            matte,
        }
    }

    pub fn scale_at(&self, t: f64) -> f32 {
        let progress = if self.duration > 0.0 {
            (t / self.duration).clamp(0.0, 1.0) as f32
        } else {
            0.0
        };
        1.0 + self.zoom * progress
    }
}

impl BackgroundSource for StillBackground {
    fn frame(&mut self, t: f64) -> Result<Pixmap> {
        let (src_w, src_h) = self.image.dimensions();
        if src_w == 0 || src_h == 0 {
            return solid_pixmap(self.width, self.height, self.matte);
        }

        let cover = (self.width as f32 / src_w as f32).max(self.height as f32 / src_h as f32);
        let scale = cover * self.scale_at(t);
        let half_out_w = self.width as f32 * 0.5;
        let half_out_h = self.height as f32 * 0.5;
        let center_x = src_w as f32 * 0.5;
        let center_y = src_h as f32 * 0.5;

        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            let sy = center_y + (y as f32 + 0.5 - half_out_h) / scale - 0.5;
            for x in 0..self.width {
                let sx = center_x + (x as f32 + 0.5 - half_out_w) / scale - 0.5;
                let [r, g, b, a] = sample_bilinear(&self.image, sx, sy);
                data.extend_from_slice(&over_matte([r, g, b, a], self.matte));
            }
        }

        let size = IntSize::from_wh(self.width, self.height)
            .ok_or_else(|| anyhow!("invalid frame size {}x{}", self.width, self.height))?;
        Pixmap::from_vec(data, size).ok_or_else(|| anyhow!("failed to build background pixmap"))
    }
}

fn sample_bilinear(image: &RgbaImage, x: f32, y: f32) -> [u8; 4] {
    let max_x = image.width() - 1;
    let max_y = image.height() - 1;
    let x = x.clamp(0.0, max_x as f32);
    let y = y.clamp(0.0, max_y as f32);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(max_x);
    let y1 = (y0 + 1).min(max_y);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = image.get_pixel(x0, y0).0;
    let p10 = image.get_pixel(x1, y0).0;
    let p01 = image.get_pixel(x0, y1).0;
    let p11 = image.get_pixel(x1, y1).0;

    let mut out = [0u8; 4];
    for channel in 0..4 {
        let top = p00[channel] as f32 * (1.0 - fx) + p10[channel] as f32 * fx;
        let bottom = p01[channel] as f32 * (1.0 - fx) + p11[channel] as f32 * fx;
        out[channel] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Flatten a straight-alpha pixel onto an opaque matte.
fn over_matte([r, g, b, a]: [u8; 4], matte: Rgba8) -> [u8; 4] {
    if a == 255 {
        return [r, g, b, 255];
    }
    let alpha = u32::from(a);
    let inv = 255 - alpha;
    let mix =
        |src: u8, dst: u8| ((u32::from(src) * alpha + u32::from(dst) * inv + 127) / 255) as u8;
    [mix(r, matte.r), mix(g, matte.g), mix(b, matte.b), 255]
}

/// A clip decoded by ffmpeg, looped to the cut length. When the decoder runs
/// dry the last frame is held.
pub struct VideoBackground {
    input: Option<FfmpegInput>,
    last: Option<Pixmap>,
    width: u32,
    height: u32,
    matte: Rgba8,
}

impl VideoBackground {
    pub fn spawn(
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        duration: f64,
        matte: Rgba8,
    ) -> Result<Self> {
        let input = FfmpegInput::spawn(path, width, height, fps, duration)?;
        Ok(Self {
            input: Some(input),
            last: None,
            width,
            height,
            matte,
        })
    }
}

impl BackgroundSource for VideoBackground {
    fn frame(&mut self, _t: f64) -> Result<Pixmap> {
        let next = self.input.as_ref().and_then(FfmpegInput::read_frame);
        if let Some(rgba) = next {
            let size = IntSize::from_wh(self.width, self.height)
                .ok_or_else(|| anyhow!("invalid frame size {}x{}", self.width, self.height))?;
            let pixmap = Pixmap::from_vec(rgba, size).ok_or_else(|| {
                anyhow!("decoded frame does not match {}x{}", self.width, self.height)
            })?;
            self.last = Some(pixmap);
        }
        match &self.last {
            Some(pixmap) => Ok(pixmap.clone()),
            None => solid_pixmap(self.width, self.height, self.matte),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self.input.take() {
            Some(input) => input.finish(),
            None => Ok(()),
        }
    }
}

/// Background for one cut. Media that cannot be opened is logged and
/// replaced by the matte color.
pub fn open_background(
    cut: &VisualCut,
    width: u32,
    height: u32,
    fps: u32,
    matte: Rgba8,
) -> Box<dyn BackgroundSource> {
    let opened: Result<Box<dyn BackgroundSource>> = match &cut.visual {
        Visual::Solid(color) => Ok(Box::new(SolidBackground::new(width, height, *color))),
        Visual::Image(path) => {
            StillBackground::open(path, width, height, cut.zoom, cut.duration, matte)
                .map(|still| Box::new(still) as Box<dyn BackgroundSource>)
        }
        Visual::Video(path) => {
            VideoBackground::spawn(path, width, height, fps, cut.duration, matte)
                .map(|video| Box::new(video) as Box<dyn BackgroundSource>)
        }
    };
    opened.unwrap_or_else(|error| {
        warn!("background {} unavailable, using solid color: {error:#}", cut.visual.label());
        Box::new(SolidBackground::new(width, height, matte))
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use image::{Rgba, RgbaImage};

    use super::{open_background, BackgroundSource, StillBackground};
    use crate::media::Visual;
    use crate::style::Rgba8;
    use crate::timeline::VisualCut;

    fn split_image() -> RgbaImage {
        RgbaImage::from_fn(8, 8, |x, _| {
            if x < 4 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        })
    }

    #[test]
    fn still_covers_frame_and_keeps_center() {
        let mut still = StillBackground::from_image(split_image(), 16, 8, 0.0, 1.0, Rgba8::BLACK);
        let pixmap = still.frame(0.0).expect("frame");
        assert_eq!((pixmap.width(), pixmap.height()), (16, 8));
        let left = pixmap.pixel(1, 4).expect("pixel");
        let right = pixmap.pixel(14, 4).expect("pixel");
        assert_eq!((left.red(), left.blue(), left.alpha()), (255, 0, 255));
        assert_eq!((right.red(), right.blue(), right.alpha()), (0, 255, 255));
    }

    #[test]
    fn zoom_grows_linearly_over_the_cut() {
        let still = StillBackground::from_image(split_image(), 8, 8, 0.1, 4.0, Rgba8::BLACK);
        assert!((still.scale_at(0.0) - 1.0).abs() < 1e-6);
        assert!((still.scale_at(2.0) - 1.05).abs() < 1e-6);
        assert!((still.scale_at(9.0) - 1.1).abs() < 1e-6);
    }

    #[test]
    fn transparent_pixels_land_on_the_matte() {
        let image = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 0]));
        let mut still = StillBackground::from_image(image, 4, 4, 0.0, 1.0, Rgba8::rgb(0, 10, 20));
        let pixel = still.frame(0.0).expect("frame").pixel(2, 2).expect("pixel");
        assert_eq!((pixel.red(), pixel.green(), pixel.blue()), (0, 10, 20));
    }

    #[test]
    fn missing_media_falls_back_to_solid() {
        let cut = VisualCut {
            visual: Visual::Image(PathBuf::from("/nonexistent/reelcast/missing.png")),
            offset: 0.0,
            duration: 2.0,
            zoom: 0.04,
        };
        let mut background = open_background(&cut, 4, 4, 30, Rgba8::rgb(9, 9, 9));
        let pixel = background.frame(0.0).expect("frame").pixel(0, 0).expect("pixel");
        assert_eq!((pixel.red(), pixel.alpha()), (9, 255));
    }
}
