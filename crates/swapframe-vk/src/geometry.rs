// SPDX-License-Identifier: CEPL-1.0
use std::ffi::c_void;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use swapframe_math::UniformBlock;
use tracing::debug;

use crate::context::DeviceContext;
use crate::error::{VkError, VkResultExt};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub color: [f32; 3],
}

impl Vertex {
    pub fn binding() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attributes() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, color) as u32,
            },
        ]
    }
}

pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex {
        pos: [-0.5, -0.5],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        pos: [0.5, -0.5],
        color: [0.0, 1.0, 0.0],
    },
    Vertex {
        pos: [0.5, 0.5],
        color: [0.0, 0.0, 1.0],
    },
    Vertex {
        pos: [-0.5, 0.5],
        color: [1.0, 1.0, 1.0],
    },
];

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// First memory type allowed by `type_bits` that has all of `flags`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Result<u32, VkError> {
    (0..props.memory_type_count)
        .find(|&i| {
            type_bits & (1 << i) != 0
                && props.memory_types[i as usize].property_flags.contains(flags)
        })
        .ok_or(VkError::NoMemoryType { type_bits, flags })
}

#[derive(Clone, Copy, Debug)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl GpuBuffer {
    pub unsafe fn create(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<Self, VkError> {
        let device = &ctx.device;
        let info = vk::BufferCreateInfo {
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = device.create_buffer(&info, None).during("vkCreateBuffer")?;
        let req = device.get_buffer_memory_requirements(buffer);
        let memory = find_memory_type(&ctx.memory_properties, req.memory_type_bits, flags)
            .and_then(|memory_type_index| {
                let alloc = vk::MemoryAllocateInfo {
                    allocation_size: req.size,
                    memory_type_index,
                    ..Default::default()
                };
                device.allocate_memory(&alloc, None).during("vkAllocateMemory")
            });
        let memory = match memory {
            Ok(m) => m,
            Err(e) => {
                device.destroy_buffer(buffer, None);
                return Err(e);
            }
        };
        let gpu = GpuBuffer {
            buffer,
            memory,
            size,
        };
        if let Err(result) = device.bind_buffer_memory(buffer, memory, 0) {
            gpu.destroy(device);
            return Err(VkError::Call {
                call: "vkBindBufferMemory",
                result,
            });
        }
        Ok(gpu)
    }

    pub unsafe fn destroy(self, device: &ash::Device) {
        device.destroy_buffer(self.buffer, None);
        device.free_memory(self.memory, None);
    }
}

/// Copy `bytes` into a new device-local buffer through a staging buffer,
/// waiting for the transfer to finish.
pub unsafe fn upload_via_staging(
    ctx: &DeviceContext,
    pool: vk::CommandPool,
    usage: vk::BufferUsageFlags,
    bytes: &[u8],
) -> Result<GpuBuffer, VkError> {
    let device = &ctx.device;
    let size = bytes.len() as vk::DeviceSize;
    let staging = GpuBuffer::create(
        ctx,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    let dst = match GpuBuffer::create(
        ctx,
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    ) {
        Ok(dst) => dst,
        Err(e) => {
            staging.destroy(device);
            return Err(e);
        }
    };

    let copied = copy_through(ctx, pool, staging, dst, bytes);
    staging.destroy(device);
    match copied {
        Ok(()) => Ok(dst),
        Err(e) => {
            dst.destroy(device);
            Err(e)
        }
    }
}

unsafe fn copy_through(
    ctx: &DeviceContext,
    pool: vk::CommandPool,
    staging: GpuBuffer,
    dst: GpuBuffer,
    bytes: &[u8],
) -> Result<(), VkError> {
    let device = &ctx.device;
    let ptr = device
        .map_memory(staging.memory, 0, staging.size, vk::MemoryMapFlags::empty())
        .during("vkMapMemory")?;
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
    device.unmap_memory(staging.memory);

    let alloc = vk::CommandBufferAllocateInfo {
        command_pool: pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: 1,
        ..Default::default()
    };
    let cmd = device
        .allocate_command_buffers(&alloc)
        .during("vkAllocateCommandBuffers")?[0];
    let result = (|| {
        let begin = vk::CommandBufferBeginInfo {
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        device
            .begin_command_buffer(cmd, &begin)
            .during("vkBeginCommandBuffer")?;
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: staging.size,
        };
        device.cmd_copy_buffer(cmd, staging.buffer, dst.buffer, std::slice::from_ref(&region));
        device.end_command_buffer(cmd).during("vkEndCommandBuffer")?;

        let submit = vk::SubmitInfo {
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            ..Default::default()
        };
        device
            .queue_submit(ctx.graphics_queue, std::slice::from_ref(&submit), vk::Fence::null())
            .during("vkQueueSubmit")?;
        device
            .queue_wait_idle(ctx.graphics_queue)
            .during("vkQueueWaitIdle")
    })();
    device.free_command_buffers(pool, std::slice::from_ref(&cmd));
    result
}

/// Device-local vertex and index buffers for the quad.
pub struct QuadMesh {
    pub vertices: GpuBuffer,
    pub indices: GpuBuffer,
    pub index_count: u32,
}

impl QuadMesh {
    pub unsafe fn upload(ctx: &DeviceContext, pool: vk::CommandPool) -> Result<Self, VkError> {
        let vertices = upload_via_staging(
            ctx,
            pool,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&QUAD_VERTICES),
        )?;
        let indices = match upload_via_staging(
            ctx,
            pool,
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&QUAD_INDICES),
        ) {
            Ok(b) => b,
            Err(e) => {
                vertices.destroy(&ctx.device);
                return Err(e);
            }
        };
        debug!(
            vertices = QUAD_VERTICES.len(),
            indices = QUAD_INDICES.len(),
            "quad uploaded"
        );
        Ok(Self {
            vertices,
            indices,
            index_count: QUAD_INDICES.len() as u32,
        })
    }

    pub unsafe fn destroy(self, device: &ash::Device) {
        self.indices.destroy(device);
        self.vertices.destroy(device);
    }
}

pub unsafe fn create_uniform_set_layout(
    device: &ash::Device,
) -> Result<vk::DescriptorSetLayout, VkError> {
    let binding = vk::DescriptorSetLayoutBinding {
        binding: 0,
        descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: 1,
        stage_flags: vk::ShaderStageFlags::VERTEX,
        ..Default::default()
    };
    let info = vk::DescriptorSetLayoutCreateInfo {
        binding_count: 1,
        p_bindings: &binding,
        ..Default::default()
    };
    device
        .create_descriptor_set_layout(&info, None)
        .during("vkCreateDescriptorSetLayout")
}

struct MappedUniform {
    buffer: GpuBuffer,
    mapped: *mut c_void,
}

/// One persistently mapped uniform buffer and descriptor set per frame slot.
/// Slot `i` is only written after its fence has been waited on.
pub struct FrameUniforms {
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
    buffers: Vec<MappedUniform>,
}

impl FrameUniforms {
    pub unsafe fn create(
        ctx: &DeviceContext,
        layout: vk::DescriptorSetLayout,
        count: usize,
    ) -> Result<Self, VkError> {
        let device = &ctx.device;
        let pool_size = vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: count as u32,
        };
        let pool_info = vk::DescriptorPoolCreateInfo {
            max_sets: count as u32,
            pool_size_count: 1,
            p_pool_sizes: &pool_size,
            ..Default::default()
        };
        let pool = device
            .create_descriptor_pool(&pool_info, None)
            .during("vkCreateDescriptorPool")?;
        let mut uniforms = FrameUniforms {
            pool,
            sets: Vec::new(),
            buffers: Vec::with_capacity(count),
        };
        if let Err(e) = uniforms.populate(ctx, layout, count) {
            uniforms.destroy(device);
            return Err(e);
        }
        Ok(uniforms)
    }

    unsafe fn populate(
        &mut self,
        ctx: &DeviceContext,
        layout: vk::DescriptorSetLayout,
        count: usize,
    ) -> Result<(), VkError> {
        let device = &ctx.device;
        let size = std::mem::size_of::<UniformBlock>() as vk::DeviceSize;
        for _ in 0..count {
            let buffer = GpuBuffer::create(
                ctx,
                size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            let mapped = match device.map_memory(buffer.memory, 0, size, vk::MemoryMapFlags::empty())
            {
                Ok(p) => p,
                Err(result) => {
                    buffer.destroy(device);
                    return Err(VkError::Call {
                        call: "vkMapMemory",
                        result,
                    });
                }
            };
            self.buffers.push(MappedUniform { buffer, mapped });
        }

        let layouts = vec![layout; count];
        let alloc = vk::DescriptorSetAllocateInfo {
            descriptor_pool: self.pool,
            descriptor_set_count: count as u32,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        self.sets = device
            .allocate_descriptor_sets(&alloc)
            .during("vkAllocateDescriptorSets")?;

        for (set, uniform) in self.sets.iter().zip(&self.buffers) {
            let buffer_info = vk::DescriptorBufferInfo {
                buffer: uniform.buffer.buffer,
                offset: 0,
                range: size,
            };
            let write = vk::WriteDescriptorSet {
                dst_set: *set,
                dst_binding: 0,
                dst_array_element: 0,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                p_buffer_info: &buffer_info,
                ..Default::default()
            };
            device.update_descriptor_sets(std::slice::from_ref(&write), &[]);
        }
        Ok(())
    }

    pub fn set(&self, slot: usize) -> Result<vk::DescriptorSet, VkError> {
        self.sets.get(slot).copied().ok_or(VkError::NoSuchSlot(slot))
    }

    /// Overwrite the slot's uniform buffer. The caller must have waited on the
    /// slot's fence.
    pub fn write(&mut self, slot: usize, block: &UniformBlock) -> Result<(), VkError> {
        let uniform = self.buffers.get(slot).ok_or(VkError::NoSuchSlot(slot))?;
        let bytes = block.as_bytes();
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), uniform.mapped.cast::<u8>(), bytes.len());
        }
        Ok(())
    }

    /// Only call once the device is idle. Sets go with the pool.
    pub unsafe fn destroy(self, device: &ash::Device) {
        for uniform in self.buffers {
            device.unmap_memory(uniform.buffer.memory);
            uniform.buffer.destroy(device);
        }
        device.destroy_descriptor_pool(self.pool, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
        }
        props
    }

    #[test]
    fn memory_type_respects_allowed_bits() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = memory(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            host,
            host | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        assert_eq!(find_memory_type(&props, 0b111, host).unwrap(), 1);
        assert_eq!(find_memory_type(&props, 0b100, host).unwrap(), 2);
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn missing_memory_type_is_an_error() {
        let props = memory(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap_err();
        assert!(matches!(err, VkError::NoMemoryType { type_bits: 1, .. }));
    }

    #[test]
    fn vertex_layout_matches_the_shader() {
        assert_eq!(std::mem::size_of::<Vertex>(), 20);
        assert_eq!(Vertex::binding().stride, 20);
        let attrs = Vertex::attributes();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 8);
        assert_eq!(attrs[1].format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn quad_indices_stay_in_range() {
        assert!(QUAD_INDICES
            .iter()
            .all(|&i| (i as usize) < QUAD_VERTICES.len()));
        assert_eq!(bytemuck::cast_slice::<u16, u8>(&QUAD_INDICES).len(), 12);
    }
}
