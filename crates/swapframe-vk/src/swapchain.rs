// SPDX-License-Identifier: CEPL-1.0
use ash::khr::swapchain;
use ash::vk;
use swapframe_render::RenderSize;
use tracing::debug;

use crate::context::{DeviceContext, QueueFamilies};
use crate::error::{VkError, VkResultExt};

/// Present mode policy from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VsyncMode {
    /// MAILBOX when the surface offers it, FIFO otherwise.
    #[default]
    Mailbox,
    /// Always FIFO.
    Fifo,
}

/// `B8G8R8A8_SRGB` in the sRGB nonlinear color space, else whatever the
/// surface lists first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: VsyncMode) -> vk::PresentModeKHR {
    match vsync {
        VsyncMode::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        _ => vk::PresentModeKHR::FIFO,
    }
}

/// The surface's current extent, or the framebuffer size clamped into the
/// allowed range when the surface leaves it to us (`u32::MAX`).
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, framebuffer: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: framebuffer
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: framebuffer
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// [`choose_extent`], rejecting the zero extent some surfaces report while
/// their window is minimized.
pub fn usable_extent(caps: &vk::SurfaceCapabilitiesKHR, framebuffer: RenderSize) -> Result<vk::Extent2D, VkError> {
    let extent = choose_extent(caps, framebuffer);
    if extent.width == 0 || extent.height == 0 {
        return Err(VkError::EmptyExtent);
    }
    Ok(extent)
}

/// One image more than the minimum; `max_image_count == 0` means no limit.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        wanted
    } else {
        wanted.min(caps.max_image_count)
    }
}

/// Concurrent sharing across both families when they differ.
pub fn sharing_mode(families: QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, families.unique())
    }
}

/// Swapchain plus everything derived from its images.
///
/// `images`, `views` and `framebuffers` always have the same length, which is
/// unrelated to the number of frames in flight.
pub struct SwapchainBundle {
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl SwapchainBundle {
    /// Build a swapchain for `size` using the format the render pass was made
    /// for.
    ///
    /// # Safety
    /// The device must be idle with respect to any previous bundle, and that
    /// bundle must already be destroyed.
    pub unsafe fn create(
        ctx: &DeviceContext,
        render_pass: vk::RenderPass,
        surface_format: vk::SurfaceFormatKHR,
        size: RenderSize,
        vsync: VsyncMode,
    ) -> Result<Self, VkError> {
        let caps = ctx.surface_capabilities()?;
        let modes = ctx.present_modes()?;

        let present_mode = choose_present_mode(&modes, vsync);
        let extent = usable_extent(&caps, size)?;
        let min_image_count = choose_image_count(&caps);
        let (image_sharing_mode, family_indices) = sharing_mode(ctx.families);

        let create_info = vk::SwapchainCreateInfoKHR {
            surface: ctx.surface,
            min_image_count,
            image_format: surface_format.format,
            image_color_space: surface_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode,
            queue_family_index_count: family_indices.len() as u32,
            p_queue_family_indices: family_indices.as_ptr(),
            pre_transform: caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };
        let swapchain = ctx
            .swapchain_loader
            .create_swapchain(&create_info, None)
            .during("vkCreateSwapchainKHR")?;

        let mut bundle = SwapchainBundle {
            swapchain,
            format: surface_format.format,
            extent,
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
        };
        if let Err(e) = bundle.populate(ctx, render_pass) {
            bundle.destroy(&ctx.device, &ctx.swapchain_loader);
            return Err(e);
        }

        debug!(
            "swapchain: {}x{}, {} images, {:?}, {:?}, {:?}",
            extent.width,
            extent.height,
            bundle.images.len(),
            surface_format.format,
            present_mode,
            image_sharing_mode
        );
        Ok(bundle)
    }

    unsafe fn populate(&mut self, ctx: &DeviceContext, render_pass: vk::RenderPass) -> Result<(), VkError> {
        let device = &ctx.device;
        self.images = ctx
            .swapchain_loader
            .get_swapchain_images(self.swapchain)
            .during("vkGetSwapchainImagesKHR")?;

        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo {
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: self.format,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = device
                .create_image_view(&view_info, None)
                .during("vkCreateImageView")?;
            self.views.push(view);
        }

        for &view in &self.views {
            let fb_info = vk::FramebufferCreateInfo {
                render_pass,
                attachment_count: 1,
                p_attachments: &view,
                width: self.extent.width,
                height: self.extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = device
                .create_framebuffer(&fb_info, None)
                .during("vkCreateFramebuffer")?;
            self.framebuffers.push(fb);
        }
        Ok(())
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Framebuffers, then views, then the swapchain. Images belong to the
    /// swapchain and go with it.
    ///
    /// # Safety
    /// No submitted work may still reference this bundle.
    pub unsafe fn destroy(self, device: &ash::Device, loader: &swapchain::Device) {
        for fb in self.framebuffers {
            device.destroy_framebuffer(fb, None);
        }
        for view in self.views {
            device.destroy_image_view(view, None);
        }
        loader.destroy_swapchain(self.swapchain, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn caps(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 16,
                height: 16,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            min_image_count: min_count,
            max_image_count: max_count,
            ..Default::default()
        }
    }

    #[test]
    fn srgb_bgra_is_preferred() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[1]));
    }

    #[test]
    fn first_format_is_the_fallback() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn mailbox_only_when_offered_and_wanted() {
        let both = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        let fifo = [vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&both, VsyncMode::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&fifo, VsyncMode::Mailbox),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&both, VsyncMode::Fifo),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn current_extent_wins_unless_sentinel() {
        let fixed = caps((1024, 768), 2, 0);
        assert_eq!(
            choose_extent(&fixed, RenderSize::new(1, 1)),
            vk::Extent2D {
                width: 1024,
                height: 768
            }
        );

        let free = caps((u32::MAX, u32::MAX), 2, 0);
        assert_eq!(
            choose_extent(&free, RenderSize::new(800, 600)),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
        assert_eq!(
            choose_extent(&free, RenderSize::new(8, 9000)),
            vk::Extent2D {
                width: 16,
                height: 2048
            }
        );
    }

    #[test]
    fn minimized_surface_extent_is_refused() {
        let minimized = caps((0, 0), 2, 0);
        assert!(matches!(
            usable_extent(&minimized, RenderSize::new(800, 600)),
            Err(VkError::EmptyExtent)
        ));
        let half = caps((1024, 0), 2, 0);
        assert!(usable_extent(&half, RenderSize::new(800, 600)).is_err());
        assert_eq!(
            usable_extent(&caps((1024, 768), 2, 0), RenderSize::new(800, 600)).unwrap(),
            vk::Extent2D {
                width: 1024,
                height: 768
            }
        );
    }

    #[test]
    fn image_count_is_one_over_min_within_max() {
        assert_eq!(choose_image_count(&caps((1, 1), 2, 0)), 3);
        assert_eq!(choose_image_count(&caps((1, 1), 2, 8)), 3);
        assert_eq!(choose_image_count(&caps((1, 1), 3, 3)), 3);
    }

    #[test]
    fn split_families_share_concurrently() {
        let (mode, indices) = sharing_mode(QueueFamilies {
            graphics: 0,
            present: 2,
        });
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(indices, vec![0, 2]);

        let (mode, indices) = sharing_mode(QueueFamilies {
            graphics: 1,
            present: 1,
        });
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(indices.is_empty());
    }
}
