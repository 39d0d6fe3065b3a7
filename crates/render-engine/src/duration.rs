//! Natural playback duration of animated overlays.
//!
//! A GIF's duration is the sum of its frame delays. Failures resolve to `0.0`
//! ("unknown"); callers that need a duration treat zero as unavailable.

use std::io::Cursor;
use std::sync::Arc;

use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;

use gifmix_common::error::{GifmixError, GifmixResult};

use crate::fetch::AssetFetcher;

/// Duration in seconds of the GIF in `bytes`, or `0.0` if it cannot be parsed.
pub fn gif_duration_secs(bytes: &[u8]) -> f64 {
    match try_gif_duration_secs(bytes) {
        Ok(secs) => secs,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read GIF frame timing");
            0.0
        }
    }
}

fn try_gif_duration_secs(bytes: &[u8]) -> GifmixResult<f64> {
    let decoder = GifDecoder::new(Cursor::new(bytes))
        .map_err(|e| GifmixError::decode(format!("not a GIF: {e}")))?;

    let mut total_ms = 0.0f64;
    for frame in decoder.into_frames() {
        let frame = frame.map_err(|e| GifmixError::decode(format!("bad GIF frame: {e}")))?;
        // Delays are stored in centiseconds; the decoder reports milliseconds.
        let (numer, denom) = frame.delay().numer_denom_ms();
        if denom > 0 {
            total_ms += numer as f64 / denom as f64;
        }
    }
    Ok(total_ms / 1000.0)
}

/// Fetches overlay assets and reports their duration.
#[derive(Clone)]
pub struct DurationResolver {
    fetcher: Arc<dyn AssetFetcher>,
}

impl DurationResolver {
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self { fetcher }
    }

    /// Duration of the asset at `uri` in seconds; `0.0` when unknown.
    pub async fn resolve(&self, uri: &str) -> f64 {
        match self.fetcher.fetch(uri).await {
            Ok(bytes) => gif_duration_secs(&bytes),
            Err(e) => {
                tracing::warn!(uri, error = %e, "Failed to fetch overlay for duration");
                0.0
            }
        }
    }
}
