// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::error::{VkError, VkResultExt};

/// Sync objects and command buffer for one frame in flight.
#[derive(Clone, Copy, Debug)]
pub struct FrameSlot {
    pub command_buffer: vk::CommandBuffer,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

/// All frame slots and the pool their command buffers come from. Created once
/// and kept across swapchain rebuilds.
pub struct FrameSlots {
    pub pool: vk::CommandPool,
    slots: Vec<FrameSlot>,
}

impl FrameSlots {
    pub unsafe fn create(
        device: &ash::Device,
        graphics_family: u32,
        count: usize,
    ) -> Result<Self, VkError> {
        let pool_info = vk::CommandPoolCreateInfo {
            queue_family_index: graphics_family,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let pool = device
            .create_command_pool(&pool_info, None)
            .during("vkCreateCommandPool")?;
        let mut slots = FrameSlots {
            pool,
            slots: Vec::with_capacity(count),
        };
        if let Err(e) = slots.populate(device, count) {
            slots.destroy(device);
            return Err(e);
        }
        Ok(slots)
    }

    unsafe fn populate(&mut self, device: &ash::Device, count: usize) -> Result<(), VkError> {
        let alloc_info = vk::CommandBufferAllocateInfo {
            command_pool: self.pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count as u32,
            ..Default::default()
        };
        let buffers = device
            .allocate_command_buffers(&alloc_info)
            .during("vkAllocateCommandBuffers")?;

        let sem_info = vk::SemaphoreCreateInfo::default();
        // Signaled so the first wait on each slot returns at once.
        let fence_info = vk::FenceCreateInfo {
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        for command_buffer in buffers {
            let image_available = device
                .create_semaphore(&sem_info, None)
                .during("vkCreateSemaphore")?;
            let render_finished = match device.create_semaphore(&sem_info, None) {
                Ok(s) => s,
                Err(result) => {
                    device.destroy_semaphore(image_available, None);
                    return Err(VkError::Call {
                        call: "vkCreateSemaphore",
                        result,
                    });
                }
            };
            let in_flight = match device.create_fence(&fence_info, None) {
                Ok(f) => f,
                Err(result) => {
                    device.destroy_semaphore(image_available, None);
                    device.destroy_semaphore(render_finished, None);
                    return Err(VkError::Call {
                        call: "vkCreateFence",
                        result,
                    });
                }
            };
            self.slots.push(FrameSlot {
                command_buffer,
                image_available,
                render_finished,
                in_flight,
            });
        }
        Ok(())
    }

    pub fn get(&self, slot: usize) -> Result<FrameSlot, VkError> {
        self.slots.get(slot).copied().ok_or(VkError::NoSuchSlot(slot))
    }

    /// Only call once the device is idle. Destroying the pool frees the
    /// command buffers.
    pub unsafe fn destroy(self, device: &ash::Device) {
        for slot in self.slots.iter().rev() {
            device.destroy_fence(slot.in_flight, None);
            device.destroy_semaphore(slot.render_finished, None);
            device.destroy_semaphore(slot.image_available, None);
        }
        device.destroy_command_pool(self.pool, None);
    }
}
