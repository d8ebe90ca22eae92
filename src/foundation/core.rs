use crate::foundation::error::{FrameloomError, FrameloomResult};

/// Zero-based frame index within a scene's timeline.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Output pixel/container format for a rendered frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossless PNG.
    Png,
    /// Lossy JPEG.
    Jpeg,
    /// WebP.
    Webp,
    /// Raw premultiplied RGBA8 bytes.
    Raw,
}

impl OutputFormat {
    /// Stable lowercase tag used in cache keys and export metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
            Self::Raw => "raw",
        }
    }
}

/// Parameters describing how a single frame should be rendered.
///
/// Only `width`, `height`, `format` and `quality` participate in the cache
/// key; `bg_rgba` and `transparent` affect flattening, which renderers apply
/// after cache identity is established.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RenderParams {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Encoder quality in `[0, 100]`.
    pub quality: u8,
    /// Output format.
    pub format: OutputFormat,
    /// Background color to flatten alpha over (RGBA8, straight alpha).
    pub bg_rgba: [u8; 4],
    /// Preserve transparency instead of flattening over `bg_rgba`.
    pub transparent: bool,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            quality: 90,
            format: OutputFormat::Png,
            bg_rgba: [0, 0, 0, 255],
            transparent: false,
        }
    }
}

impl RenderParams {
    /// Validate dimensional and quality bounds.
    pub fn validate(&self) -> FrameloomResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameloomError::validation(
                "render params width/height must be >= 1",
            ));
        }
        if self.quality > 100 {
            return Err(FrameloomError::validation(
                "render params quality must be in [0, 100]",
            ));
        }
        Ok(())
    }
}

/// Milliseconds since the unix epoch.
///
/// Used for cache entry timestamps so TTL and LRU ordering survive process
/// restarts via the disk tier.
pub(crate) fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
