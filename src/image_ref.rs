use std::io::Cursor;

use anyhow::Context;
use image::{DynamicImage, ImageFormat};

/// A decoded image plus the container format it was sniffed as.
#[derive(Clone, Debug)]
pub struct ImageRef {
    format: Option<&'static str>,
    image: DynamicImage,
}

impl ImageRef {
    pub fn new(image: DynamicImage, format: Option<ImageFormat>) -> Self {
        Self {
            format: format.and_then(format_label),
            image,
        }
    }

    pub fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .context("sniff image format")?;
        let format = reader.format();
        let image = reader.decode().context("decode image from memory")?;
        Ok(Self::new(image, format))
    }

    /// Upper-case format label (`"PNG"`, `"JPEG"`, ...), if the container was recognised.
    pub fn format(&self) -> Option<&str> {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn color_type(&self) -> image::ColorType {
        self.image.color()
    }

    pub fn to_rgba8(&self) -> image::RgbaImage {
        self.image.to_rgba8()
    }
}

pub fn format_label(format: ImageFormat) -> Option<&'static str> {
    let label = match format {
        ImageFormat::Png => "PNG",
        ImageFormat::Jpeg => "JPEG",
        ImageFormat::Gif => "GIF",
        ImageFormat::WebP => "WEBP",
        ImageFormat::Pnm => "PPM",
        ImageFormat::Tiff => "TIFF",
        ImageFormat::Tga => "TGA",
        ImageFormat::Dds => "DDS",
        ImageFormat::Bmp => "BMP",
        ImageFormat::Ico => "ICO",
        ImageFormat::Hdr => "HDR",
        ImageFormat::OpenExr => "EXR",
        ImageFormat::Farbfeld => "FARBFELD",
        ImageFormat::Avif => "AVIF",
        ImageFormat::Qoi => "QOI",
        _ => return None,
    };
    Some(label)
}
