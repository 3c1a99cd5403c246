//! Hover-preview thumbnails from a WebVTT sprite track.
//!
//! Each cue maps a time range to an image URL, optionally with a `#xywh=x,y,w,h` fragment
//! selecting a tile of a sprite sheet.

use crate::config::ThumbnailConfig;
use crate::models::{Region, ThumbnailCue};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const HEADER: &str = "WEBVTT";
const REGION_FRAGMENT: &str = "#xywh=";

/// Immutable, start-ordered sequence of preview cues.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThumbnailIndex {
    cues: Vec<ThumbnailCue>,
}

impl ThumbnailIndex {
    pub fn new(mut cues: Vec<ThumbnailCue>) -> Self {
        cues.sort_by(|a, b| a.start.total_cmp(&b.start));
        Self { cues }
    }

    /// Parse a cue sheet. A missing header or any malformed cue yields an empty index.
    ///
    /// Relative image URLs are resolved against `base` when given.
    pub fn parse(text: &str, base: Option<&Url>) -> Self {
        match parse_cues(text, base) {
            Ok(cues) => {
                debug!("Parsed {} thumbnail cues", cues.len());
                Self::new(cues)
            }
            Err(reason) => {
                warn!("Ignoring malformed thumbnail track: {}", reason);
                Self::default()
            }
        }
    }

    pub fn cues(&self) -> &[ThumbnailCue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Cue whose `[start, end)` holds `seconds`, falling back to the last cue.
    pub fn lookup(&self, seconds: f64) -> Option<&ThumbnailCue> {
        self.cues
            .iter()
            .find(|cue| cue.contains(seconds))
            .or_else(|| self.cues.last())
    }
}

fn parse_cues(text: &str, base: Option<&Url>) -> Result<Vec<ThumbnailCue>, String> {
    let text = text.trim_start_matches('\u{feff}');
    let mut lines = text.lines();

    let header = lines
        .by_ref()
        .find(|line| !line.trim().is_empty())
        .ok_or("empty document")?;
    if !header.trim_start().starts_with(HEADER) {
        return Err(format!("missing {} header", HEADER));
    }

    let mut cues = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    for line in lines.chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if !block.is_empty() {
                if let Some(cue) = parse_block(&block, base)? {
                    cues.push(cue);
                }
                block.clear();
            }
        } else {
            block.push(line.trim());
        }
    }
    Ok(cues)
}

/// One blank-line separated block. Blocks without a timing line (NOTE, STYLE) are skipped.
fn parse_block(block: &[&str], base: Option<&Url>) -> Result<Option<ThumbnailCue>, String> {
    let Some(timing_at) = block.iter().position(|line| line.contains("-->")) else {
        return Ok(None);
    };
    // Only an identifier line may precede the timing
    if timing_at > 1 {
        return Err(format!("unexpected text before timing: {}", block[0]));
    }

    let (start, end) = parse_timing(block[timing_at])?;
    let payload = block
        .get(timing_at + 1)
        .ok_or_else(|| format!("cue at {} has no image", block[timing_at]))?;
    let (image_url, region) = parse_payload(payload, base)?;

    Ok(Some(ThumbnailCue {
        start,
        end,
        image_url,
        region,
    }))
}

fn parse_timing(line: &str) -> Result<(f64, f64), String> {
    let (start, rest) = line
        .split_once("-->")
        .ok_or_else(|| format!("bad timing line: {}", line))?;
    // Cue settings may follow the end time
    let end = rest
        .split_whitespace()
        .next()
        .ok_or_else(|| format!("missing end time: {}", line))?;

    let start = parse_timestamp(start.trim())?;
    let end = parse_timestamp(end)?;
    if end < start {
        return Err(format!("cue ends before it starts: {}", line));
    }
    Ok((start, end))
}

/// `hh:mm:ss.mmm` or `mm:ss.mmm`.
fn parse_timestamp(value: &str) -> Result<f64, String> {
    let invalid = || format!("bad timestamp: {}", value);
    let parts: Vec<&str> = value.split(':').collect();

    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (h.parse::<u64>().map_err(|_| invalid())?, *m, *s),
        [m, s] => (0, *m, *s),
        _ => return Err(invalid()),
    };
    let minutes = minutes.parse::<u64>().map_err(|_| invalid())?;
    let seconds = seconds
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|_| invalid())?;
    if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return Err(invalid());
    }

    let whole = hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes * 60))
        .ok_or_else(invalid)?;
    Ok(whole as f64 + seconds)
}

fn parse_payload(payload: &str, base: Option<&Url>) -> Result<(String, Option<Region>), String> {
    let (location, region) = match payload.split_once(REGION_FRAGMENT) {
        Some((location, fragment)) => (location, Some(parse_region(fragment)?)),
        None => (payload, None),
    };

    let image_url = match base {
        Some(base) => base
            .join(location)
            .map(String::from)
            .map_err(|e| format!("bad image url {}: {}", location, e))?,
        None => location.to_string(),
    };
    Ok((image_url, region))
}

fn parse_region(fragment: &str) -> Result<Region, String> {
    let values = fragment
        .split(',')
        .map(|v| v.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| format!("bad region: {}", fragment))?;

    match values.as_slice() {
        [x, y, w, h] => Ok(Region {
            x: *x,
            y: *y,
            w: *w,
            h: *h,
        }),
        _ => Err(format!("bad region: {}", fragment)),
    }
}

/// Fetches and parses thumbnail tracks.
#[derive(Debug, Clone)]
pub struct ThumbnailLoader {
    client: Client,
}

impl ThumbnailLoader {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build thumbnail HTTP client, using defaults: {}", e);
                Client::new()
            });
        Self { client }
    }

    pub fn from_config(config: &ThumbnailConfig) -> Self {
        Self::new(Duration::from_secs(config.fetch_timeout_seconds))
    }

    /// Never fails: an unreachable or malformed track gives an empty index.
    pub async fn load(&self, track_url: &str) -> ThumbnailIndex {
        let url = match Url::parse(track_url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Invalid thumbnail track URL {}: {}", track_url, e);
                return ThumbnailIndex::default();
            }
        };

        match self.fetch(&url).await {
            Ok(text) => ThumbnailIndex::parse(&text, Some(&url)),
            Err(e) => {
                warn!("Failed to fetch thumbnail track {}: {}", url, e);
                ThumbnailIndex::default()
            }
        }
    }

    async fn fetch(&self, url: &Url) -> Result<String, reqwest::Error> {
        self.client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}
