// Image payloads — bytes + media type, data URLs, placeholder rendering

use anyhow::{bail, Context, Result};
use base64::Engine;
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// An encoded image as exchanged with providers and written to disk.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

impl std::fmt::Debug for ImageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageData")
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImageData {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
        }
    }

    /// Wrap raw bytes, detecting the format from the file signature.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let media_type = sniff_media_type(&bytes)
            .context("Unrecognized image format (expected PNG, JPEG, GIF or WebP)")?;
        Ok(Self::new(bytes, media_type))
    }

    /// Read an image file. Unknown formats are an error.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read image: {}", path.display()))?;
        Self::from_bytes(bytes).with_context(|| format!("Unusable image: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::write(path, &self.bytes)
            .with_context(|| format!("Failed to write image: {}", path.display()))
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .context("Invalid base64 image payload")?;
        Self::from_bytes(bytes)
    }

    /// `data:<media>;base64,<payload>` form used by OpenAI-compatible APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.to_base64())
    }

    pub fn from_data_url(url: &str) -> Result<Self> {
        let Some(rest) = url.strip_prefix("data:") else {
            bail!("Not a data URL");
        };
        let Some((header, payload)) = rest.split_once(',') else {
            bail!("Malformed data URL: missing payload");
        };
        if !header.ends_with(";base64") {
            bail!("Unsupported data URL encoding: {}", header);
        }
        Self::from_base64(payload)
    }

    /// Width and height, when the payload is a PNG.
    pub fn png_dimensions(&self) -> Option<(u32, u32)> {
        let decoder = png::Decoder::new(Cursor::new(&self.bytes));
        let reader = decoder.read_info().ok()?;
        let info = reader.info();
        Some((info.width, info.height))
    }
}

/// Detect an image media type from its magic bytes.
pub fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Encode a solid white RGB PNG.
pub fn blank_png(width: u32, height: u32) -> Result<ImageData> {
    let pixels = vec![0xFFu8; width as usize * height as usize * 3];
    let mut buf = Vec::new();
    {
        let mut encoder = png::Encoder::new(Cursor::new(&mut buf), width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .context("Failed to write PNG header")?;
        writer
            .write_image_data(&pixels)
            .context("Failed to encode PNG data")?;
    }
    Ok(ImageData::new(buf, "image/png"))
}
