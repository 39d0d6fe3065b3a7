//! Edit session: one host video and the overlays attached to it.
//!
//! The session owns overlay lifetimes. Removing the host video drops every
//! overlay and clears the selection.

use serde::{Deserialize, Serialize};

use crate::overlay::{Overlay, OverlayId, TimeWindow, Transform};

/// The primary video being edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostVideo {
    /// Source reference (path or URL).
    pub uri: String,

    /// Total duration in seconds; zero until the player reports it.
    pub duration_secs: f64,
}

/// Notifications emitted by the host video player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostVideoEvent {
    /// Metadata loaded; carries the total duration in seconds.
    DurationLoaded(f64),
    /// Playback position changed, in seconds.
    TimeUpdate(f64),
}

/// Visibility window of one overlay, as shown on a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowView {
    pub id: OverlayId,
    pub start_secs: f64,
    pub end_secs: f64,
}

/// Everything the export pipeline needs from a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub host_uri: String,
    pub host_duration_secs: f64,
    /// Overlays in insertion order.
    pub overlays: Vec<Overlay>,
}

/// In-memory state of one editing session.
#[derive(Debug, Clone, Default)]
pub struct EditSession {
    host: Option<HostVideo>,
    overlays: Vec<Overlay>,
    selected: Option<OverlayId>,
    current_time_secs: f64,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the host video. Existing overlays are discarded.
    pub fn load_host(&mut self, uri: impl Into<String>) {
        self.remove_host();
        self.host = Some(HostVideo {
            uri: uri.into(),
            duration_secs: 0.0,
        });
    }

    /// Drop the host video along with all overlays.
    pub fn remove_host(&mut self) {
        self.host = None;
        self.overlays.clear();
        self.selected = None;
        self.current_time_secs = 0.0;
    }

    pub fn host(&self) -> Option<&HostVideo> {
        self.host.as_ref()
    }

    /// Host duration in seconds, zero when unknown.
    pub fn host_duration(&self) -> f64 {
        self.host.as_ref().map_or(0.0, |h| h.duration_secs)
    }

    pub fn current_time(&self) -> f64 {
        self.current_time_secs
    }

    /// Feed a player notification into the session.
    pub fn apply(&mut self, event: HostVideoEvent) {
        match event {
            HostVideoEvent::DurationLoaded(duration) => {
                let Some(host) = self.host.as_mut() else {
                    return;
                };
                host.duration_secs = if duration.is_finite() {
                    duration.max(0.0)
                } else {
                    0.0
                };
                let host_duration = host.duration_secs;
                for overlay in &mut self.overlays {
                    overlay.set_window(overlay.window().clamped_to(host_duration));
                }
            }
            HostVideoEvent::TimeUpdate(t) => {
                if t.is_finite() {
                    self.current_time_secs = t.max(0.0);
                }
            }
        }
    }

    /// Add an overlay spanning the whole host video at the default placement,
    /// and select it.
    pub fn add_overlay(&mut self, source_uri: impl Into<String>) -> Result<OverlayId, ProjectError> {
        if self.host.is_none() {
            return Err(ProjectError::NoHostVideo);
        }
        let overlay = Overlay::new(
            source_uri,
            TimeWindow::full(self.host_duration()),
            Transform::DEFAULT_PLACEMENT,
        );
        let id = overlay.id();
        self.overlays.push(overlay);
        self.selected = Some(id);
        Ok(id)
    }

    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    pub fn overlay(&self, id: OverlayId) -> Option<&Overlay> {
        self.overlays.iter().find(|o| o.id() == id)
    }

    fn overlay_mut(&mut self, id: OverlayId) -> Result<&mut Overlay, ProjectError> {
        self.overlays
            .iter_mut()
            .find(|o| o.id() == id)
            .ok_or(ProjectError::UnknownOverlay { id })
    }

    pub fn remove_overlay(&mut self, id: OverlayId) -> Result<Overlay, ProjectError> {
        let index = self
            .overlays
            .iter()
            .position(|o| o.id() == id)
            .ok_or(ProjectError::UnknownOverlay { id })?;
        if self.selected == Some(id) {
            self.selected = None;
        }
        Ok(self.overlays.remove(index))
    }

    /// Select an overlay for transform editing. At most one is selected.
    pub fn select(&mut self, id: OverlayId) -> Result<(), ProjectError> {
        if self.overlay(id).is_none() {
            return Err(ProjectError::UnknownOverlay { id });
        }
        self.selected = Some(id);
        Ok(())
    }

    pub fn selected(&self) -> Option<&Overlay> {
        self.selected.and_then(|id| self.overlay(id))
    }

    /// Set the window start from an independent input. The value is clamped
    /// to `[0, end]`.
    pub fn set_start(&mut self, id: OverlayId, start_secs: f64) -> Result<TimeWindow, ProjectError> {
        let host_duration = self.host_duration();
        let overlay = self.overlay_mut(id)?;
        let current = overlay.window();
        let start = if start_secs.is_finite() {
            start_secs.clamp(0.0, current.end_secs())
        } else {
            current.start_secs()
        };
        let window = TimeWindow::new(start, current.end_secs(), host_duration)?;
        overlay.set_window(window);
        Ok(window)
    }

    /// Set the window end from an independent input. The value is clamped to
    /// `[start, host_duration]`.
    pub fn set_end(&mut self, id: OverlayId, end_secs: f64) -> Result<TimeWindow, ProjectError> {
        let host_duration = self.host_duration();
        let overlay = self.overlay_mut(id)?;
        let current = overlay.window();
        let start = current.start_secs();
        let end = if end_secs.is_finite() {
            end_secs.clamp(start, host_duration.max(start))
        } else {
            current.end_secs()
        };
        let window = TimeWindow::new(start, end, host_duration)?;
        overlay.set_window(window);
        Ok(window)
    }

    /// Replace the window, rejecting anything invalid.
    pub fn set_window(
        &mut self,
        id: OverlayId,
        start_secs: f64,
        end_secs: f64,
    ) -> Result<(), ProjectError> {
        let window = TimeWindow::new(start_secs, end_secs, self.host_duration())?;
        self.overlay_mut(id)?.set_window(window);
        Ok(())
    }

    pub fn set_transform(&mut self, id: OverlayId, transform: Transform) -> Result<(), ProjectError> {
        self.overlay_mut(id)?.set_transform(transform);
        Ok(())
    }

    /// Drag an overlay by a pixel delta.
    pub fn move_overlay(&mut self, id: OverlayId, dx: f64, dy: f64) -> Result<Transform, ProjectError> {
        let overlay = self.overlay_mut(id)?;
        let transform = overlay.transform().translate(dx, dy)?;
        overlay.set_transform(transform);
        Ok(transform)
    }

    /// Overlays shown at the current playback position.
    pub fn visible_overlays(&self) -> impl Iterator<Item = &Overlay> {
        let t = self.current_time_secs;
        self.overlays.iter().filter(move |o| o.is_visible_at(t))
    }

    /// Timeline view of every overlay's window.
    pub fn windows(&self) -> Vec<WindowView> {
        self.overlays
            .iter()
            .map(|o| WindowView {
                id: o.id(),
                start_secs: o.start_secs(),
                end_secs: o.end_secs(),
            })
            .collect()
    }

    /// Snapshot the session for export.
    pub fn export_request(&self) -> Result<ExportRequest, ProjectError> {
        let host = self.host.as_ref().ok_or(ProjectError::NoHostVideo)?;
        Ok(ExportRequest {
            host_uri: host.uri.clone(),
            host_duration_secs: host.duration_secs,
            overlays: self.overlays.clone(),
        })
    }
}

/// Errors raised while editing a session.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("No host video loaded")]
    NoHostVideo,

    #[error("Unknown overlay: {id}")]
    UnknownOverlay { id: OverlayId },

    #[error("Invalid time window: {message}")]
    InvalidWindow { message: String },

    #[error("Invalid transform: {message}")]
    InvalidTransform { message: String },
}
