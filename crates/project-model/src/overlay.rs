//! Overlay types: identity, visibility window, and transform.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::session::ProjectError;

/// Rotation limit in degrees, applied symmetrically.
pub const MAX_ROTATE_DEGREES: f64 = 360.0;

static NEXT_OVERLAY_ID: AtomicU64 = AtomicU64::new(1);

/// Unique overlay identifier, stable for the overlay's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlayId(u64);

impl OverlayId {
    /// Allocate the next identifier from the process-wide counter.
    pub fn next() -> Self {
        Self(NEXT_OVERLAY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for OverlayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Spatial transform of an overlay on the host frame.
///
/// `x`/`y` are pixel offsets of the overlay's top-left corner. `scale` may be
/// negative, which mirrors the image rather than collapsing it. Every
/// component is finite and `rotate` stays within `[-360, 360]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTransform")]
pub struct Transform {
    x: f64,
    y: f64,
    scale: f64,
    rotate: f64,
}

#[derive(Deserialize)]
struct RawTransform {
    x: f64,
    y: f64,
    scale: f64,
    rotate: f64,
}

impl TryFrom<RawTransform> for Transform {
    type Error = ProjectError;

    fn try_from(raw: RawTransform) -> Result<Self, Self::Error> {
        Self::new(raw.x, raw.y, raw.scale, raw.rotate)
    }
}

impl Transform {
    /// Placement given to freshly added overlays.
    pub const DEFAULT_PLACEMENT: Transform = Transform {
        x: 100.0,
        y: 100.0,
        scale: 1.0,
        rotate: 0.0,
    };

    /// Create a transform, rejecting non-finite components and rotations
    /// outside `[-360, 360]`.
    pub fn new(x: f64, y: f64, scale: f64, rotate: f64) -> Result<Self, ProjectError> {
        let finite = [x, y, scale, rotate].iter().all(|v| v.is_finite());
        if !finite {
            return Err(ProjectError::InvalidTransform {
                message: "transform components must be finite".to_string(),
            });
        }
        if rotate.abs() > MAX_ROTATE_DEGREES {
            return Err(ProjectError::InvalidTransform {
                message: format!(
                    "rotate {rotate} outside [-{MAX_ROTATE_DEGREES}, {MAX_ROTATE_DEGREES}]"
                ),
            });
        }
        Ok(Self {
            x,
            y,
            scale,
            rotate,
        })
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Degrees in `[-360, 360]`.
    pub fn rotate(&self) -> f64 {
        self.rotate
    }

    /// Offset the position, as a drag does.
    pub fn translate(self, dx: f64, dy: f64) -> Result<Self, ProjectError> {
        Self::new(self.x + dx, self.y + dy, self.scale, self.rotate)
    }

    pub fn with_scale(self, scale: f64) -> Result<Self, ProjectError> {
        Self::new(self.x, self.y, scale, self.rotate)
    }

    pub fn with_rotate(self, rotate: f64) -> Result<Self, ProjectError> {
        Self::new(self.x, self.y, self.scale, rotate)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::DEFAULT_PLACEMENT
    }
}

/// Closed interval `[start_secs, end_secs]` on the host timeline, with
/// `0 <= start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTimeWindow")]
pub struct TimeWindow {
    start_secs: f64,
    end_secs: f64,
}

#[derive(Deserialize)]
struct RawTimeWindow {
    start_secs: f64,
    end_secs: f64,
}

impl TryFrom<RawTimeWindow> for TimeWindow {
    type Error = ProjectError;

    // The host duration is unknown here; the end bounds itself.
    fn try_from(raw: RawTimeWindow) -> Result<Self, Self::Error> {
        Self::new(raw.start_secs, raw.end_secs, raw.end_secs)
    }
}

impl TimeWindow {
    /// Create a window inside `[0, host_duration]` with `start <= end`.
    pub fn new(start_secs: f64, end_secs: f64, host_duration: f64) -> Result<Self, ProjectError> {
        if !start_secs.is_finite() || !end_secs.is_finite() {
            return Err(ProjectError::InvalidWindow {
                message: "window bounds must be finite".to_string(),
            });
        }
        if start_secs < 0.0 || end_secs > host_duration {
            return Err(ProjectError::InvalidWindow {
                message: format!(
                    "window [{start_secs}, {end_secs}] outside [0, {host_duration}]"
                ),
            });
        }
        if start_secs > end_secs {
            return Err(ProjectError::InvalidWindow {
                message: format!("start {start_secs} is after end {end_secs}"),
            });
        }
        Ok(Self {
            start_secs,
            end_secs,
        })
    }

    /// Window covering the whole host video.
    pub fn full(host_duration: f64) -> Self {
        let end_secs = if host_duration.is_finite() {
            host_duration.max(0.0)
        } else {
            0.0
        };
        Self {
            start_secs: 0.0,
            end_secs,
        }
    }

    pub fn start_secs(&self) -> f64 {
        self.start_secs
    }

    pub fn end_secs(&self) -> f64 {
        self.end_secs
    }

    /// Shrink the window to fit a host of `host_duration` seconds.
    pub fn clamped_to(self, host_duration: f64) -> Self {
        let end_secs = self.end_secs.min(host_duration.max(0.0));
        Self {
            start_secs: self.start_secs.min(end_secs),
            end_secs,
        }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, t: f64) -> bool {
        self.start_secs <= t && t <= self.end_secs
    }

    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }
}

/// One animated image composited onto the host video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    id: OverlayId,

    /// Source asset; fixed for the overlay's lifetime.
    source_uri: String,

    /// When the overlay is shown, in host seconds.
    window: TimeWindow,

    /// Where and how it is drawn.
    transform: Transform,
}

impl Overlay {
    /// Create an overlay with a fresh id.
    pub fn new(source_uri: impl Into<String>, window: TimeWindow, transform: Transform) -> Self {
        Self {
            id: OverlayId::next(),
            source_uri: source_uri.into(),
            window,
            transform,
        }
    }

    pub fn id(&self) -> OverlayId {
        self.id
    }

    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn start_secs(&self) -> f64 {
        self.window.start_secs
    }

    pub fn end_secs(&self) -> f64 {
        self.window.end_secs
    }

    /// Whether the overlay is shown at host time `t`.
    pub fn is_visible_at(&self, t: f64) -> bool {
        self.window.contains(t)
    }

    pub(crate) fn set_window(&mut self, window: TimeWindow) {
        self.window = window;
    }

    pub(crate) fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }
}
