use serde::{Deserialize, Serialize};

/// Sub-rectangle of a sprite sheet, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// A preview image covering `[start, end)` seconds of the media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailCue {
    pub start: f64,
    pub end: f64,
    pub image_url: String,
    pub region: Option<Region>,
}

impl ThumbnailCue {
    pub fn contains(&self, seconds: f64) -> bool {
        self.start <= seconds && seconds < self.end
    }
}
