// SPDX-License-Identifier: CEPL-1.0
//! ash backend for the frame scheduler.

mod context;
mod error;
mod frame_slot;
mod geometry;
mod outcome;
mod pipeline;
mod recorder;
mod swapchain;

use std::time::Instant;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use swapframe_math::UniformBlock;
use swapframe_render::{AcquireOutcome, FrameBackend, PresentOutcome, RenderSize};
use tracing::{debug, info};

pub use context::{find_queue_families, DeviceContext, QueueFamilies};
pub use error::VkError;
pub use frame_slot::{FrameSlot, FrameSlots};
pub use geometry::{find_memory_type, Vertex, QUAD_INDICES, QUAD_VERTICES};
pub use outcome::{classify_acquire, classify_present};
pub use recorder::{full_scissor, full_viewport, FrameRecording};
pub use swapchain::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format, sharing_mode,
    usable_extent, SwapchainBundle, VsyncMode,
};

use error::VkResultExt;
use geometry::{FrameUniforms, QuadMesh};
use pipeline::QuadPipeline;

/// Startup options for [`VkRenderer`].
#[derive(Clone, Debug)]
pub struct VkSettings {
    pub app_name: String,
    pub frames_in_flight: usize,
    pub vsync: VsyncMode,
    pub clear_color: [f32; 4],
    pub spin_degrees_per_second: f32,
    pub validation: bool,
}

impl Default for VkSettings {
    fn default() -> Self {
        Self {
            app_name: "swapframe".into(),
            frames_in_flight: 2,
            vsync: VsyncMode::Mailbox,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            spin_degrees_per_second: 90.0,
            validation: cfg!(debug_assertions),
        }
    }
}

/// Draws the spinning quad. Owns every Vulkan object; the swapchain is the
/// only part replaced after construction.
pub struct VkRenderer {
    settings: VkSettings,
    started: Instant,
    surface_format: vk::SurfaceFormatKHR,
    render_pass: vk::RenderPass,
    set_layout: vk::DescriptorSetLayout,
    pipeline: Option<QuadPipeline>,
    mesh: Option<QuadMesh>,
    uniforms: Option<FrameUniforms>,
    slots: Option<FrameSlots>,
    swapchain: Option<SwapchainBundle>,
    // Dropped last.
    ctx: DeviceContext,
}

impl VkRenderer {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: VkSettings,
    ) -> Result<Self, VkError> {
        let frames_in_flight = settings.frames_in_flight.max(1);
        let ctx = DeviceContext::new(window, display, &settings.app_name, settings.validation)?;
        let surface_format =
            swapchain::choose_surface_format(&ctx.surface_formats()?).ok_or(VkError::NoSurfaceFormat)?;

        // Handles start null; Drop skips whatever was never created.
        let mut renderer = VkRenderer {
            settings: VkSettings {
                frames_in_flight,
                ..settings
            },
            started: Instant::now(),
            surface_format,
            render_pass: vk::RenderPass::null(),
            set_layout: vk::DescriptorSetLayout::null(),
            pipeline: None,
            mesh: None,
            uniforms: None,
            slots: None,
            swapchain: None,
            ctx,
        };
        unsafe { renderer.init(size)? };

        info!(
            "vk renderer ready: {} frames in flight, {} swapchain images",
            frames_in_flight,
            renderer.image_count()
        );
        Ok(renderer)
    }

    unsafe fn init(&mut self, size: RenderSize) -> Result<(), VkError> {
        let count = self.settings.frames_in_flight;
        let device = &self.ctx.device;

        self.render_pass = pipeline::create_render_pass(device, self.surface_format.format)?;
        self.set_layout = geometry::create_uniform_set_layout(device)?;
        self.pipeline = Some(QuadPipeline::create(device, self.render_pass, self.set_layout)?);

        let slots = FrameSlots::create(device, self.ctx.families.graphics, count)?;
        let pool = slots.pool;
        self.slots = Some(slots);
        self.mesh = Some(QuadMesh::upload(&self.ctx, pool)?);
        self.uniforms = Some(FrameUniforms::create(&self.ctx, self.set_layout, count)?);

        self.swapchain = Some(SwapchainBundle::create(
            &self.ctx,
            self.render_pass,
            self.surface_format,
            size,
            self.settings.vsync,
        )?);
        Ok(())
    }

    pub fn image_count(&self) -> usize {
        self.swapchain.as_ref().map_or(0, SwapchainBundle::image_count)
    }

    pub fn vsync(&self) -> VsyncMode {
        self.settings.vsync
    }

    /// Takes effect on the next swapchain rebuild.
    pub fn set_vsync(&mut self, vsync: VsyncMode) {
        if self.settings.vsync != vsync {
            debug!(?vsync, "vsync mode changed");
            self.settings.vsync = vsync;
        }
    }

    fn slot(&self, slot: usize) -> Result<FrameSlot, VkError> {
        self.slots
            .as_ref()
            .ok_or(VkError::Missing("frame slots"))?
            .get(slot)
    }

    fn current_swapchain(&self, action: &'static str) -> Result<&SwapchainBundle, VkError> {
        self.swapchain.as_ref().ok_or(VkError::NoSwapchain(action))
    }

    fn recording(&self, slot: usize, image_index: u32) -> Result<FrameRecording, VkError> {
        let sc = self.current_swapchain("record")?;
        let framebuffer = *sc
            .framebuffers
            .get(image_index as usize)
            .ok_or(VkError::NoSuchImage(image_index))?;
        let (pipeline, mesh, uniforms) = match (&self.pipeline, &self.mesh, &self.uniforms) {
            (Some(p), Some(m), Some(u)) => (p, m, u),
            _ => return Err(VkError::Missing("drawing resources")),
        };
        Ok(FrameRecording {
            render_pass: self.render_pass,
            framebuffer,
            extent: sc.extent,
            clear_color: self.settings.clear_color,
            pipeline: pipeline.pipeline,
            pipeline_layout: pipeline.layout,
            vertex_buffer: mesh.vertices.buffer,
            index_buffer: mesh.indices.buffer,
            index_count: mesh.index_count,
            descriptor_set: uniforms.set(slot)?,
        })
    }
}

impl FrameBackend for VkRenderer {
    type Error = VkError;

    fn frames_in_flight(&self) -> usize {
        self.settings.frames_in_flight
    }

    fn wait_for_fence(&mut self, slot: usize) -> Result<(), VkError> {
        let fence = self.slot(slot)?.in_flight;
        unsafe {
            self.ctx
                .device
                .wait_for_fences(&[fence], true, u64::MAX)
                .during("vkWaitForFences")
        }
    }

    fn reset_fence(&mut self, slot: usize) -> Result<(), VkError> {
        let fence = self.slot(slot)?.in_flight;
        unsafe {
            self.ctx
                .device
                .reset_fences(&[fence])
                .during("vkResetFences")
        }
    }

    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome, VkError> {
        let semaphore = self.slot(slot)?.image_available;
        let swapchain = self.current_swapchain("acquire from")?.swapchain;
        let result = unsafe {
            self.ctx.swapchain_loader.acquire_next_image(
                swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        classify_acquire(result).map_err(|result| VkError::Call {
            call: "vkAcquireNextImageKHR",
            result,
        })
    }

    fn record_commands(&mut self, slot: usize, image_index: u32) -> Result<(), VkError> {
        let cmd = self.slot(slot)?.command_buffer;
        let recording = self.recording(slot, image_index)?;

        let extent = recording.extent;
        let block = UniformBlock::spinning(
            self.started.elapsed().as_secs_f32(),
            self.settings.spin_degrees_per_second,
            (extent.width, extent.height),
        );
        if let Some(uniforms) = self.uniforms.as_mut() {
            uniforms.write(slot, &block)?;
        }

        unsafe { recording.record(&self.ctx.device, cmd) }
    }

    fn submit(&mut self, slot: usize) -> Result<(), VkError> {
        let frame = self.slot(slot)?;
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            wait_semaphore_count: 1,
            p_wait_semaphores: &frame.image_available,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &frame.command_buffer,
            signal_semaphore_count: 1,
            p_signal_semaphores: &frame.render_finished,
            ..Default::default()
        };
        unsafe {
            self.ctx
                .device
                .queue_submit(
                    self.ctx.graphics_queue,
                    std::slice::from_ref(&submit),
                    frame.in_flight,
                )
                .during("vkQueueSubmit")
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome, VkError> {
        let frame = self.slot(slot)?;
        let swapchain = self.current_swapchain("present")?.swapchain;
        let present = vk::PresentInfoKHR {
            wait_semaphore_count: 1,
            p_wait_semaphores: &frame.render_finished,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let result = unsafe {
            self.ctx
                .swapchain_loader
                .queue_present(self.ctx.present_queue, &present)
        };
        classify_present(result).map_err(|result| VkError::Call {
            call: "vkQueuePresentKHR",
            result,
        })
    }

    fn wait_idle(&mut self) -> Result<(), VkError> {
        unsafe { self.ctx.device.device_wait_idle().during("vkDeviceWaitIdle") }
    }

    fn destroy_swapchain(&mut self) {
        if let Some(sc) = self.swapchain.take() {
            unsafe { sc.destroy(&self.ctx.device, &self.ctx.swapchain_loader) };
        }
    }

    fn create_swapchain(&mut self, size: RenderSize) -> Result<(), VkError> {
        let bundle = unsafe {
            SwapchainBundle::create(
                &self.ctx,
                self.render_pass,
                self.surface_format,
                size,
                self.settings.vsync,
            )?
        };
        debug!(
            "swapchain rebuilt for {}: {}x{}, {} images",
            size,
            bundle.extent.width,
            bundle.extent.height,
            bundle.image_count()
        );
        self.swapchain = Some(bundle);
        Ok(())
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        unsafe {
            let device = &self.ctx.device;
            device.device_wait_idle().ok();

            if let Some(sc) = self.swapchain.take() {
                sc.destroy(device, &self.ctx.swapchain_loader);
            }
            if let Some(uniforms) = self.uniforms.take() {
                uniforms.destroy(device);
            }
            if let Some(mesh) = self.mesh.take() {
                mesh.destroy(device);
            }
            if let Some(slots) = self.slots.take() {
                slots.destroy(device);
            }
            if let Some(pipeline) = self.pipeline.take() {
                pipeline.destroy(device);
            }
            if self.set_layout != vk::DescriptorSetLayout::null() {
                device.destroy_descriptor_set_layout(self.set_layout, None);
            }
            if self.render_pass != vk::RenderPass::null() {
                device.destroy_render_pass(self.render_pass, None);
            }
        }
        debug!("vk renderer destroyed");
    }
}
