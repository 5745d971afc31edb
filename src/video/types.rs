use std::io::Cursor;

use image::{
    codecs::png::PngEncoder, imageops::FilterType, ColorType, ImageBuffer, ImageEncoder, Rgb,
    RgbImage,
};

/// A single decoded video frame
///
/// Thin wrapper around an 8-bit RGB buffer. Frames carry no identity beyond
/// their position in a [`FrameSequence`].
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_fn(width, height, |_, _| Rgb(color));
        Self { buffer }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        self.buffer.put_pixel(x, y, Rgb(color));
    }

    /// Packed RGB24 bytes, row-major
    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer })
    }

    /// Stretch the frame to exactly `width` x `height`
    ///
    /// Returns `self` untouched when it already has that geometry.
    pub fn resized(self, width: u32, height: u32) -> Self {
        if self.dimensions() == (width, height) {
            return self;
        }
        let buffer = image::imageops::resize(&self.buffer, width, height, FilterType::Triangle);
        Self { buffer }
    }

    /// Lossless PNG encoding of the frame
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes).write_image(
            self.buffer.as_raw(),
            self.width(),
            self.height(),
            ColorType::Rgb8,
        )?;
        Ok(bytes)
    }

    /// Decode an encoded still image (PNG or JPEG) into a 3-channel frame
    pub fn from_encoded_bytes(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let image = image::io::Reader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(image::ImageError::IoError)?
            .decode()?;

        let rgb_image = match image {
            image::DynamicImage::ImageRgb8(img) => img,
            _ => image.to_rgb8(),
        };
        Ok(Self::new(rgb_image))
    }
}

/// Ordered frames of one pipeline run
///
/// Insertion order is temporal order; nothing in the pipeline reorders it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSequence {
    frames: Vec<Frame>,
}

impl FrameSequence {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { frames: Vec::with_capacity(capacity) }
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Geometry of the first frame, which the merger applies to all others
    pub fn canonical_dimensions(&self) -> Option<(u32, u32)> {
        self.frames.first().map(Frame::dimensions)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }
}

impl FromIterator<Frame> for FrameSequence {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self { frames: iter.into_iter().collect() }
    }
}

impl IntoIterator for FrameSequence {
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

impl From<Vec<Frame>> for FrameSequence {
    fn from(frames: Vec<Frame>) -> Self {
        Self { frames }
    }
}

/// Stream properties of a source container
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    /// Native frame rate; `None` when the container reports none or zero
    pub fps: Option<f64>,
    /// Display width, after applying `rotation`
    pub width: u32,
    /// Display height, after applying `rotation`
    pub height: u32,
    /// Display rotation in degrees (`0..360`)
    pub rotation: u32,
    pub codec: String,
}
