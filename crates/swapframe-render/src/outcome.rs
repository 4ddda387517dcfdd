// SPDX-License-Identifier: CEPL-1.0
use bitflags::bitflags;

/// Result of asking the swapchain for the next presentable image.
///
/// Fatal failures are never represented here; backends report them through
/// `Err` so they cannot be handled as a stale swapchain by accident.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready to be rendered into. `suboptimal` images are still
    /// usable; the swapchain gets rebuilt once the frame is presented.
    Acquired { image_index: u32, suboptimal: bool },

    /// The swapchain no longer matches the surface. Nothing was acquired and
    /// no semaphore will be signaled.
    OutOfDate,
}

/// Result of queueing an image for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    /// True when the image actually reached the presentation engine.
    pub fn was_presented(self) -> bool {
        !matches!(self, PresentOutcome::OutOfDate)
    }
}

bitflags! {
    /// Everything that contributed to a swapchain rebuild.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RebuildReason: u8 {
        const ACQUIRE_OUT_OF_DATE = 1 << 0;
        const ACQUIRE_SUBOPTIMAL = 1 << 1;
        const PRESENT_OUT_OF_DATE = 1 << 2;
        const PRESENT_SUBOPTIMAL = 1 << 3;
        const RESIZED = 1 << 4;
        const REQUESTED = 1 << 5;
    }
}

impl From<PresentOutcome> for RebuildReason {
    fn from(outcome: PresentOutcome) -> Self {
        match outcome {
            PresentOutcome::Presented => RebuildReason::empty(),
            PresentOutcome::Suboptimal => RebuildReason::PRESENT_SUBOPTIMAL,
            PresentOutcome::OutOfDate => RebuildReason::PRESENT_OUT_OF_DATE,
        }
    }
}
