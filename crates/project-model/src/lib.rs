//! gifmix Project Model
//!
//! Defines the core data contracts for an overlay edit:
//! - **Overlay:** An animated image shown over the host video during a
//!   visibility window, with a spatial transform
//! - **Session:** The host video, its overlays, the selection, and the
//!   playback position reported by the host video player
//!
//! All times are seconds on the host video's own timeline.

pub mod overlay;
pub mod session;

pub use overlay::*;
pub use session::*;
