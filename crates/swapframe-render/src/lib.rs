// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic frame protocol: the per-frame fence/acquire/submit/present
//! loop and the swapchain rebuild path, written against the [`FrameBackend`]
//! and [`FramebufferSource`] seams.

mod backend;
mod error;
mod outcome;
mod scheduler;

pub use backend::{FrameBackend, FramebufferSource};
pub use error::{BoxError, FrameError, FrameStage};
pub use outcome::{AcquireOutcome, PresentOutcome, RebuildReason};
pub use scheduler::{FrameScheduler, FrameState, FrameStats, FrameStatus};

/// Framebuffer size in physical pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True while either side is zero, e.g. when the window is minimized.
    pub const fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<(u32, u32)> for RenderSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for RenderSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::RenderSize;

    #[test]
    fn any_zero_side_counts_as_zero() {
        assert!(RenderSize::new(0, 0).is_zero());
        assert!(RenderSize::new(0, 600).is_zero());
        assert!(RenderSize::new(800, 0).is_zero());
        assert!(!RenderSize::new(800, 600).is_zero());
    }

    #[test]
    fn displays_as_width_by_height() {
        assert_eq!(RenderSize::from((1366, 768)).to_string(), "1366x768");
    }
}
