// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_void, CStr, CString};

use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, error, info, trace, warn};

use crate::error::{VkError, VkResultExt};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Queue family indices for drawing and presenting. They may be equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Pick graphics and present families, preferring one family that does both.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> Option<QueueFamilies> {
    let mut graphics = None;
    let mut present = None;
    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        let draws = family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let presents = supports_present(i);
        if draws && presents {
            return Some(QueueFamilies {
                graphics: i,
                present: i,
            });
        }
        if draws && graphics.is_none() {
            graphics = Some(i);
        }
        if presents && present.is_none() {
            present = Some(i);
        }
    }
    Some(QueueFamilies {
        graphics: graphics?,
        present: present?,
    })
}

/// Instance, surface and logical device. Outlives every other Vulkan object.
pub struct DeviceContext {
    _entry: Entry,
    pub instance: Instance,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub physical: vk::PhysicalDevice,
    pub families: QueueFamilies,
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub swapchain_loader: swapchain::Device,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl DeviceContext {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        app_name: &str,
        validation: bool,
    ) -> Result<Self, VkError> {
        let display_raw = display.display_handle()?.as_raw();
        let window_raw = window.window_handle()?.as_raw();

        unsafe {
            let entry = Entry::linked();
            let validation = validation && has_validation_layer(&entry);
            let instance = create_instance(&entry, display_raw, app_name, validation)?;
            let debug = if validation {
                Some(create_debug_messenger(&entry, &instance)?)
            } else {
                None
            };

            let surface_loader = surface::Instance::new(&entry, &instance);
            let surface = ash_window::create_surface(&entry, &instance, display_raw, window_raw, None)
                .during("vkCreateSurfaceKHR")?;

            let (physical, families) = pick_physical_device(&instance, &surface_loader, surface)?;
            let props = instance.get_physical_device_properties(physical);
            let name = CStr::from_ptr(props.device_name.as_ptr()).to_string_lossy();
            info!(
                "vk device: {} (graphics family {}, present family {})",
                name, families.graphics, families.present
            );

            let device = create_logical_device(&instance, physical, families)?;
            let graphics_queue = device.get_device_queue(families.graphics, 0);
            let present_queue = device.get_device_queue(families.present, 0);
            let swapchain_loader = swapchain::Device::new(&instance, &device);
            let memory_properties = instance.get_physical_device_memory_properties(physical);

            Ok(Self {
                _entry: entry,
                instance,
                debug,
                surface_loader,
                surface,
                physical,
                families,
                device,
                graphics_queue,
                present_queue,
                swapchain_loader,
                memory_properties,
            })
        }
    }

    pub fn surface_capabilities(&self) -> Result<vk::SurfaceCapabilitiesKHR, VkError> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical, self.surface)
                .during("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
        }
    }

    pub fn surface_formats(&self) -> Result<Vec<vk::SurfaceFormatKHR>, VkError> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.physical, self.surface)
                .during("vkGetPhysicalDeviceSurfaceFormatsKHR")
        }
    }

    pub fn present_modes(&self) -> Result<Vec<vk::PresentModeKHR>, VkError> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.physical, self.surface)
                .during("vkGetPhysicalDeviceSurfacePresentModesKHR")
        }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

unsafe fn has_validation_layer(entry: &Entry) -> bool {
    let found = entry
        .enumerate_instance_layer_properties()
        .unwrap_or_default()
        .iter()
        .any(|layer| CStr::from_ptr(layer.layer_name.as_ptr()) == VALIDATION_LAYER);
    if !found {
        warn!("validation requested but {:?} is not installed", VALIDATION_LAYER);
    }
    found
}

unsafe fn create_instance(
    entry: &Entry,
    display_raw: raw_window_handle::RawDisplayHandle,
    app_name: &str,
    validation: bool,
) -> Result<Instance, VkError> {
    let app_name = CString::new(app_name).unwrap_or_default();
    let app_info = vk::ApplicationInfo {
        p_application_name: app_name.as_ptr(),
        application_version: vk::make_api_version(0, 0, 1, 0),
        p_engine_name: c"swapframe".as_ptr(),
        engine_version: vk::make_api_version(0, 0, 1, 0),
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut extensions = ash_window::enumerate_required_extensions(display_raw)
        .during("vkEnumerateInstanceExtensionProperties")?
        .to_vec();
    let mut layers = Vec::new();
    if validation {
        extensions.push(debug_utils::NAME.as_ptr());
        layers.push(VALIDATION_LAYER.as_ptr());
    }

    let create_info = vk::InstanceCreateInfo {
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };
    entry
        .create_instance(&create_info, None)
        .during("vkCreateInstance")
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(?types, "vk: {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(?types, "vk: {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!(?types, "vk: {msg}");
    } else {
        trace!(?types, "vk: {msg}");
    }
    vk::FALSE
}

unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
) -> Result<(debug_utils::Instance, vk::DebugUtilsMessengerEXT), VkError> {
    let loader = debug_utils::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let messenger = loader
        .create_debug_utils_messenger(&ci, None)
        .during("vkCreateDebugUtilsMessengerEXT")?;
    debug!("validation layer enabled");
    Ok((loader, messenger))
}

unsafe fn pick_physical_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilies), VkError> {
    let devices = instance
        .enumerate_physical_devices()
        .during("vkEnumeratePhysicalDevices")?;
    for phys in devices {
        let qprops = instance.get_physical_device_queue_family_properties(phys);
        let Some(families) = find_queue_families(&qprops, |i| {
            surface_loader
                .get_physical_device_surface_support(phys, i, surface)
                .unwrap_or(false)
        }) else {
            continue;
        };
        if !supports_swapchain(instance, phys) {
            continue;
        }
        let has_formats = !surface_loader
            .get_physical_device_surface_formats(phys, surface)
            .unwrap_or_default()
            .is_empty();
        let has_modes = !surface_loader
            .get_physical_device_surface_present_modes(phys, surface)
            .unwrap_or_default()
            .is_empty();
        if has_formats && has_modes {
            return Ok((phys, families));
        }
    }
    Err(VkError::NoSuitableDevice)
}

unsafe fn supports_swapchain(instance: &Instance, phys: vk::PhysicalDevice) -> bool {
    instance
        .enumerate_device_extension_properties(phys)
        .unwrap_or_default()
        .iter()
        .any(|ext| CStr::from_ptr(ext.extension_name.as_ptr()) == swapchain::NAME)
}

unsafe fn create_logical_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    families: QueueFamilies,
) -> Result<ash::Device, VkError> {
    let priority = [1.0f32];
    let queue_infos: Vec<_> = families
        .unique()
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priority.as_ptr(),
            ..Default::default()
        })
        .collect();
    let extensions = [swapchain::NAME.as_ptr()];
    let features = vk::PhysicalDeviceFeatures::default();

    let create_info = vk::DeviceCreateInfo {
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };
    instance
        .create_device(phys, &create_info, None)
        .during("vkCreateDevice")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn one_family_doing_both_wins() {
        let families = [
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER),
        ];
        let found = find_queue_families(&families, |i| i != 1).unwrap();
        assert_eq!(
            found,
            QueueFamilies {
                graphics: 2,
                present: 2
            }
        );
        assert!(found.is_shared());
        assert_eq!(found.unique(), vec![2]);
    }

    #[test]
    fn split_families_are_both_reported() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
        let found = find_queue_families(&families, |i| i == 1).unwrap();
        assert_eq!(
            found,
            QueueFamilies {
                graphics: 0,
                present: 1
            }
        );
        assert_eq!(found.unique(), vec![0, 1]);
    }

    #[test]
    fn missing_present_support_rejects_the_device() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert_eq!(find_queue_families(&families, |_| false), None);
    }

    #[test]
    fn empty_graphics_family_is_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];
        let found = find_queue_families(&families, |_| true).unwrap();
        assert_eq!(found.graphics, 1);
    }
}
