// SPDX-License-Identifier: CEPL-1.0
use crate::{AcquireOutcome, PresentOutcome, RenderSize};

/// GPU-side operations the frame scheduler drives.
///
/// A backend owns one set of sync objects and one command buffer per frame
/// slot, plus the current swapchain. Slots are addressed by index in
/// `0..frames_in_flight()`; swapchain images by the index returned from
/// [`FrameBackend::acquire_next_image`]. The two index spaces are unrelated.
pub trait FrameBackend {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Number of frame slots. Must stay constant for the backend's lifetime.
    fn frames_in_flight(&self) -> usize;

    /// Block until the slot's in-flight fence is signaled.
    fn wait_for_fence(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Return the slot's in-flight fence to the unsignaled state.
    fn reset_fence(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Acquire the next swapchain image, signaling the slot's image-available
    /// semaphore once the image is ready on the GPU.
    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome, Self::Error>;

    /// Reset the slot's command buffer and record the whole frame targeting
    /// `image_index`. Previous contents are discarded.
    fn record_commands(&mut self, slot: usize, image_index: u32) -> Result<(), Self::Error>;

    /// Submit the slot's command buffer: wait on image-available at the color
    /// output stage, signal render-finished and the in-flight fence.
    fn submit(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Queue `image_index` for presentation after render-finished signals.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome, Self::Error>;

    /// Block until the device has no outstanding work.
    fn wait_idle(&mut self) -> Result<(), Self::Error>;

    /// Release every swapchain-derived resource. Only called after
    /// [`FrameBackend::wait_idle`].
    fn destroy_swapchain(&mut self);

    /// Build a fresh swapchain for a nonzero framebuffer size.
    fn create_swapchain(&mut self, size: RenderSize) -> Result<(), Self::Error>;
}

/// The window side of a swapchain rebuild.
pub trait FramebufferSource {
    /// Current framebuffer size in pixels.
    fn framebuffer_size(&mut self) -> RenderSize;

    /// Block until the window system has delivered more events.
    fn wait_events(&mut self);

    /// Report whether a resize happened since the last call, clearing it.
    fn take_resized(&mut self) -> bool;

    /// Whether the window is going away. A rebuild waiting on an empty
    /// framebuffer gives up once this is set.
    fn close_requested(&self) -> bool {
        false
    }
}
