// SPDX-License-Identifier: CEPL-1.0
use ash::{prelude::VkResult, vk};
use swapframe_render::{AcquireOutcome, PresentOutcome};

/// Sort `vkAcquireNextImageKHR` results into recoverable outcomes and fatal
/// errors. Suboptimal arrives as `Ok` with the flag set.
pub fn classify_acquire(result: VkResult<(u32, bool)>) -> Result<AcquireOutcome, vk::Result> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(e),
    }
}

pub fn classify_present(result: VkResult<bool>) -> Result<PresentOutcome, vk::Result> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(e) => Err(e),
    }
}
