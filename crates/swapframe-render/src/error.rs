// SPDX-License-Identifier: CEPL-1.0
use std::fmt;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The backend call that was running when a frame failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStage {
    FenceWait,
    Acquire,
    FenceReset,
    Record,
    Submit,
    Present,
    DeviceIdle,
    SwapchainCreate,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FrameStage::FenceWait => "waiting on the in-flight fence",
            FrameStage::Acquire => "acquiring a swapchain image",
            FrameStage::FenceReset => "resetting the in-flight fence",
            FrameStage::Record => "recording the command buffer",
            FrameStage::Submit => "submitting to the graphics queue",
            FrameStage::Present => "presenting the swapchain image",
            FrameStage::DeviceIdle => "waiting for the device to idle",
            FrameStage::SwapchainCreate => "creating the swapchain",
        })
    }
}

/// Unrecoverable frame loop failures. Stale swapchains are not errors; they
/// are handled by the rebuild path and never show up here.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("{stage} failed on frame slot {slot}")]
    Frame {
        stage: FrameStage,
        slot: usize,
        #[source]
        source: BoxError,
    },

    #[error("{stage} failed outside of a frame")]
    Device {
        stage: FrameStage,
        #[source]
        source: BoxError,
    },

    #[error("the backend reported zero frames in flight")]
    NoFrameSlots,
}

impl FrameError {
    pub(crate) fn frame<E>(stage: FrameStage, slot: usize, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        FrameError::Frame {
            stage,
            slot,
            source: Box::new(source),
        }
    }

    pub(crate) fn device<E>(stage: FrameStage, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        FrameError::Device {
            stage,
            source: Box::new(source),
        }
    }

    pub fn stage(&self) -> Option<FrameStage> {
        match self {
            FrameError::Frame { stage, .. } | FrameError::Device { stage, .. } => Some(*stage),
            FrameError::NoFrameSlots => None,
        }
    }
}
