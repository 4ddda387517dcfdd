// SPDX-License-Identifier: CEPL-1.0
use ash::{prelude::VkResult, vk};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VkError {
    #[error("{call} returned {result}")]
    Call {
        call: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("no physical device offers graphics, presentation and a usable swapchain")]
    NoSuitableDevice,

    #[error("surface reports no formats")]
    NoSurfaceFormat,

    #[error("no memory type in {type_bits:#b} has {flags:?}")]
    NoMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },

    #[error("window handle unavailable")]
    Handle(#[from] raw_window_handle::HandleError),

    #[error("{name} is not valid SPIR-V")]
    Shader {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("surface has no area to present to")]
    EmptyExtent,

    #[error("no swapchain to {0}")]
    NoSwapchain(&'static str),

    #[error("frame slot {0} does not exist")]
    NoSuchSlot(usize),

    #[error("swapchain image {0} does not exist")]
    NoSuchImage(u32),

    #[error("renderer has no {0}")]
    Missing(&'static str),
}

impl VkError {
    /// The raw result of a failed Vulkan call, if that is what this is.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            VkError::Call { result, .. } => Some(*result),
            _ => None,
        }
    }
}

/// Attach the call name to a failed Vulkan result.
pub(crate) trait VkResultExt<T> {
    fn during(self, call: &'static str) -> Result<T, VkError>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn during(self, call: &'static str) -> Result<T, VkError> {
        self.map_err(|result| VkError::Call { call, result })
    }
}
