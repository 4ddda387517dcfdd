// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::error::{VkError, VkResultExt};

/// Everything one frame's commands depend on. Recording keeps no state
/// between calls.
#[derive(Clone, Copy, Debug)]
pub struct FrameRecording {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    pub descriptor_set: vk::DescriptorSet,
}

pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

impl FrameRecording {
    /// Reset `cmd` and record the whole frame into it.
    ///
    /// # Safety
    /// `cmd` must come from a pool created with `RESET_COMMAND_BUFFER` and
    /// must not be pending on the GPU.
    pub unsafe fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<(), VkError> {
        device
            .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
            .during("vkResetCommandBuffer")?;
        let begin = vk::CommandBufferBeginInfo::default();
        device
            .begin_command_buffer(cmd, &begin)
            .during("vkBeginCommandBuffer")?;

        let clear = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        };
        let rp_begin = vk::RenderPassBeginInfo {
            render_pass: self.render_pass,
            framebuffer: self.framebuffer,
            render_area: full_scissor(self.extent),
            clear_value_count: 1,
            p_clear_values: &clear,
            ..Default::default()
        };
        device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
        device.cmd_set_viewport(cmd, 0, &[full_viewport(self.extent)]);
        device.cmd_set_scissor(cmd, 0, &[full_scissor(self.extent)]);
        device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer], &[0]);
        device.cmd_bind_index_buffer(cmd, self.index_buffer, 0, vk::IndexType::UINT16);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline_layout,
            0,
            &[self.descriptor_set],
            &[],
        );
        device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
        device.cmd_end_render_pass(cmd);

        device
            .end_command_buffer(cmd)
            .during("vkEndCommandBuffer")
    }
}
