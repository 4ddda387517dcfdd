// SPDX-License-Identifier: CEPL-1.0
use tracing::{debug, trace};

use crate::{
    AcquireOutcome, FrameBackend, FrameError, FrameStage, FramebufferSource, RebuildReason,
    RenderSize,
};

/// Where the scheduler is inside an iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameState {
    #[default]
    Idle,
    WaitingOnFence,
    Acquiring,
    Recording,
    Submitting,
    Presenting,
    RebuildingSwapchain,
}

/// What one call to [`FrameScheduler::draw_frame`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented { slot: usize, image_index: u32 },

    /// The swapchain was rebuilt during this iteration. `image_index` is
    /// `None` when acquisition failed and nothing was drawn.
    Rebuilt {
        slot: usize,
        image_index: Option<u32>,
        reasons: RebuildReason,
    },

    /// A rebuild was due but the window closed while it had no area. The
    /// stale swapchain is kept and nothing else was done.
    Closing {
        slot: usize,
        image_index: Option<u32>,
        reasons: RebuildReason,
    },
}

impl FrameStatus {
    pub fn slot(&self) -> usize {
        match *self {
            FrameStatus::Presented { slot, .. }
            | FrameStatus::Rebuilt { slot, .. }
            | FrameStatus::Closing { slot, .. } => slot,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Completed calls to `draw_frame`, rebuild iterations included.
    pub iterations: u64,
    /// Images handed to the presentation engine.
    pub presented: u64,
    pub rebuilds: u64,
}

/// Drives a [`FrameBackend`] through the per-frame protocol with N frames in
/// flight.
///
/// Slot `k % N` is used on iteration `k`. A slot's resources are only touched
/// after its fence has been waited on, so no host-side locking is needed.
pub struct FrameScheduler<B: FrameBackend> {
    backend: B,
    frames_in_flight: usize,
    current_frame: usize,
    state: FrameState,
    stats: FrameStats,
}

impl<B: FrameBackend> FrameScheduler<B> {
    pub fn new(backend: B) -> Result<Self, FrameError> {
        let frames_in_flight = backend.frames_in_flight();
        if frames_in_flight == 0 {
            return Err(FrameError::NoFrameSlots);
        }
        debug!(frames_in_flight, "frame scheduler ready");
        Ok(Self {
            backend,
            frames_in_flight,
            current_frame: 0,
            state: FrameState::Idle,
            stats: FrameStats::default(),
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Slot the next call to `draw_frame` will use.
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// `Idle` between iterations; after a fatal error, the state that failed.
    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Run one iteration: wait, acquire, record, submit, present, advance.
    ///
    /// A stale swapchain is rebuilt in place and reported as
    /// [`FrameStatus::Rebuilt`]. Errors are fatal; the frame index is not
    /// advanced past a failed iteration.
    pub fn draw_frame<S>(&mut self, surface: &mut S) -> Result<FrameStatus, FrameError>
    where
        S: FramebufferSource + ?Sized,
    {
        let slot = self.current_frame;
        let status = self.run_iteration(slot, surface)?;
        self.current_frame = (slot + 1) % self.frames_in_flight;
        self.stats.iterations += 1;
        Ok(status)
    }

    /// Tear down and rebuild the swapchain outside of the normal triggers,
    /// e.g. after a present mode change. Returns false when the window closed
    /// before it had any area again.
    pub fn rebuild_swapchain<S>(&mut self, surface: &mut S) -> Result<bool, FrameError>
    where
        S: FramebufferSource + ?Sized,
    {
        self.rebuild(surface, RebuildReason::REQUESTED)
    }

    /// Wait for all submitted work and hand the backend back for teardown.
    pub fn finish(mut self) -> Result<B, FrameError> {
        self.backend
            .wait_idle()
            .map_err(|e| FrameError::device(FrameStage::DeviceIdle, e))?;
        debug!(
            iterations = self.stats.iterations,
            presented = self.stats.presented,
            rebuilds = self.stats.rebuilds,
            "frame scheduler finished"
        );
        Ok(self.backend)
    }

    fn run_iteration<S>(&mut self, slot: usize, surface: &mut S) -> Result<FrameStatus, FrameError>
    where
        S: FramebufferSource + ?Sized,
    {
        self.state = FrameState::WaitingOnFence;
        trace!(slot, "waiting on in-flight fence");
        self.backend
            .wait_for_fence(slot)
            .map_err(|e| FrameError::frame(FrameStage::FenceWait, slot, e))?;

        self.state = FrameState::Acquiring;
        let acquired = self
            .backend
            .acquire_next_image(slot)
            .map_err(|e| FrameError::frame(FrameStage::Acquire, slot, e))?;
        let (image_index, acquire_suboptimal) = match acquired {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                // The fence stays signaled: nothing will be submitted for this
                // slot, so the next wait on it must not block.
                let mut reasons = RebuildReason::ACQUIRE_OUT_OF_DATE;
                if surface.take_resized() {
                    reasons |= RebuildReason::RESIZED;
                }
                let rebuilt = self.rebuild(surface, reasons)?;
                return Ok(rebuild_status(rebuilt, slot, None, reasons));
            }
        };
        trace!(slot, image_index, acquire_suboptimal, "image acquired");

        self.backend
            .reset_fence(slot)
            .map_err(|e| FrameError::frame(FrameStage::FenceReset, slot, e))?;

        self.state = FrameState::Recording;
        self.backend
            .record_commands(slot, image_index)
            .map_err(|e| FrameError::frame(FrameStage::Record, slot, e))?;

        self.state = FrameState::Submitting;
        self.backend
            .submit(slot)
            .map_err(|e| FrameError::frame(FrameStage::Submit, slot, e))?;

        self.state = FrameState::Presenting;
        let presented = self
            .backend
            .present(slot, image_index)
            .map_err(|e| FrameError::frame(FrameStage::Present, slot, e))?;
        if presented.was_presented() {
            self.stats.presented += 1;
        }

        let mut reasons = RebuildReason::from(presented);
        if acquire_suboptimal {
            reasons |= RebuildReason::ACQUIRE_SUBOPTIMAL;
        }
        if surface.take_resized() {
            reasons |= RebuildReason::RESIZED;
        }

        if reasons.is_empty() {
            self.state = FrameState::Idle;
            return Ok(FrameStatus::Presented { slot, image_index });
        }

        let rebuilt = self.rebuild(surface, reasons)?;
        Ok(rebuild_status(rebuilt, slot, Some(image_index), reasons))
    }

    fn rebuild<S>(&mut self, surface: &mut S, reasons: RebuildReason) -> Result<bool, FrameError>
    where
        S: FramebufferSource + ?Sized,
    {
        self.state = FrameState::RebuildingSwapchain;
        let Some(size) = wait_for_nonzero_size(surface) else {
            debug!(?reasons, "window closed while empty, swapchain left as is");
            self.state = FrameState::Idle;
            return Ok(false);
        };
        debug!(?reasons, %size, "rebuilding swapchain");

        self.backend
            .wait_idle()
            .map_err(|e| FrameError::device(FrameStage::DeviceIdle, e))?;
        self.backend.destroy_swapchain();
        self.backend
            .create_swapchain(size)
            .map_err(|e| FrameError::device(FrameStage::SwapchainCreate, e))?;

        self.stats.rebuilds += 1;
        self.state = FrameState::Idle;
        Ok(true)
    }
}

fn rebuild_status(
    rebuilt: bool,
    slot: usize,
    image_index: Option<u32>,
    reasons: RebuildReason,
) -> FrameStatus {
    if rebuilt {
        FrameStatus::Rebuilt {
            slot,
            image_index,
            reasons,
        }
    } else {
        FrameStatus::Closing {
            slot,
            image_index,
            reasons,
        }
    }
}

/// Poll the framebuffer size, waiting for window events between polls, until
/// both sides are nonzero. `None` if the window closes first.
fn wait_for_nonzero_size<S>(surface: &mut S) -> Option<RenderSize>
where
    S: FramebufferSource + ?Sized,
{
    let mut size = surface.framebuffer_size();
    if size.is_zero() {
        debug!("framebuffer is empty, waiting for the window to come back");
    }
    while size.is_zero() {
        if surface.close_requested() {
            return None;
        }
        surface.wait_events();
        size = surface.framebuffer_size();
    }
    Some(size)
}
