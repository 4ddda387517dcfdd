// SPDX-License-Identifier: CEPL-1.0
//! Scripted stand-ins for a GPU backend and a window.
#![allow(dead_code)]

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use swapframe_render::{AcquireOutcome, FrameBackend, FramebufferSource, PresentOutcome, RenderSize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Call {
    WaitFence(usize),
    ResetFence(usize),
    Acquire(usize),
    Record { slot: usize, image: u32 },
    Submit(usize),
    Present { slot: usize, image: u32 },
    WaitIdle,
    DestroySwapchain,
    CreateSwapchain(RenderSize),
    SizeQuery(RenderSize),
    WaitEvents,
}

/// Call log shared between a backend and the windows it hands out, so tests
/// can check ordering across both.
pub type Journal = Rc<RefCell<Vec<Call>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    Image,
    Suboptimal,
    OutOfDate,
    DeviceLost,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Present {
    Ok,
    Suboptimal,
    OutOfDate,
    DeviceLost,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FakeError {
    #[error("device lost")]
    DeviceLost,
    #[error("waited on unsignaled fence {0} with nothing in flight")]
    Deadlock(usize),
    #[error("no swapchain")]
    NoSwapchain,
}

/// Records every call and plays back scripted acquire/present results. GPU
/// work completes the moment it is submitted.
pub struct ScriptedBackend {
    journal: Journal,
    fences: Vec<bool>,
    image_count: u32,
    next_image: u32,
    has_swapchain: bool,
    acquire_script: VecDeque<Acquire>,
    present_script: VecDeque<Present>,
    fail_create: bool,
}

impl ScriptedBackend {
    pub fn new(frames_in_flight: usize, image_count: u32) -> Self {
        Self {
            journal: Journal::default(),
            fences: vec![true; frames_in_flight],
            image_count,
            next_image: 0,
            has_swapchain: true,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            fail_create: false,
        }
    }

    /// Queue results for upcoming acquires. Unscripted acquires succeed.
    pub fn script_acquires(&mut self, steps: impl IntoIterator<Item = Acquire>) {
        self.acquire_script.extend(steps);
    }

    /// Queue results for upcoming presents. Unscripted presents succeed.
    pub fn script_presents(&mut self, steps: impl IntoIterator<Item = Present>) {
        self.present_script.extend(steps);
    }

    pub fn fail_next_create(&mut self) {
        self.fail_create = true;
    }

    pub fn fence_signaled(&self, slot: usize) -> bool {
        self.fences[slot]
    }

    pub fn has_swapchain(&self) -> bool {
        self.has_swapchain
    }

    /// A window logging into this backend's journal.
    pub fn window(&self, size: (u32, u32)) -> ScriptedWindow {
        ScriptedWindow {
            journal: self.journal.clone(),
            sizes: VecDeque::new(),
            current: size.into(),
            resized: false,
            closing: false,
            close_on_wait: false,
            size_queries: 0,
            event_waits: 0,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.journal.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.journal.borrow().iter().filter(|c| pred(*c)).count()
    }

    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut *self.journal.borrow_mut())
    }

    fn log(&self, call: Call) {
        self.journal.borrow_mut().push(call);
    }

    fn next_image(&mut self) -> u32 {
        let image = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        image
    }
}

impl FrameBackend for ScriptedBackend {
    type Error = FakeError;

    fn frames_in_flight(&self) -> usize {
        self.fences.len()
    }

    fn wait_for_fence(&mut self, slot: usize) -> Result<(), FakeError> {
        self.log(Call::WaitFence(slot));
        if self.fences[slot] {
            Ok(())
        } else {
            Err(FakeError::Deadlock(slot))
        }
    }

    fn reset_fence(&mut self, slot: usize) -> Result<(), FakeError> {
        self.log(Call::ResetFence(slot));
        self.fences[slot] = false;
        Ok(())
    }

    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome, FakeError> {
        self.log(Call::Acquire(slot));
        if !self.has_swapchain {
            return Err(FakeError::NoSwapchain);
        }
        match self.acquire_script.pop_front().unwrap_or(Acquire::Image) {
            Acquire::Image => Ok(AcquireOutcome::Acquired {
                image_index: self.next_image(),
                suboptimal: false,
            }),
            Acquire::Suboptimal => Ok(AcquireOutcome::Acquired {
                image_index: self.next_image(),
                suboptimal: true,
            }),
            Acquire::OutOfDate => Ok(AcquireOutcome::OutOfDate),
            Acquire::DeviceLost => Err(FakeError::DeviceLost),
        }
    }

    fn record_commands(&mut self, slot: usize, image_index: u32) -> Result<(), FakeError> {
        self.log(Call::Record {
            slot,
            image: image_index,
        });
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<(), FakeError> {
        self.log(Call::Submit(slot));
        self.fences[slot] = true;
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome, FakeError> {
        self.log(Call::Present {
            slot,
            image: image_index,
        });
        match self.present_script.pop_front().unwrap_or(Present::Ok) {
            Present::Ok => Ok(PresentOutcome::Presented),
            Present::Suboptimal => Ok(PresentOutcome::Suboptimal),
            Present::OutOfDate => Ok(PresentOutcome::OutOfDate),
            Present::DeviceLost => Err(FakeError::DeviceLost),
        }
    }

    fn wait_idle(&mut self) -> Result<(), FakeError> {
        self.log(Call::WaitIdle);
        Ok(())
    }

    fn destroy_swapchain(&mut self) {
        self.log(Call::DestroySwapchain);
        self.has_swapchain = false;
    }

    fn create_swapchain(&mut self, size: RenderSize) -> Result<(), FakeError> {
        self.log(Call::CreateSwapchain(size));
        if std::mem::take(&mut self.fail_create) {
            return Err(FakeError::DeviceLost);
        }
        self.has_swapchain = true;
        self.next_image = 0;
        Ok(())
    }
}

/// A window whose size follows a script. Once the script runs out the last
/// size sticks.
pub struct ScriptedWindow {
    journal: Journal,
    sizes: VecDeque<RenderSize>,
    current: RenderSize,
    resized: bool,
    closing: bool,
    close_on_wait: bool,
    pub size_queries: usize,
    pub event_waits: usize,
}

impl ScriptedWindow {
    /// Sizes returned by the next queries, in order.
    pub fn script_sizes(&mut self, sizes: impl IntoIterator<Item = (u32, u32)>) {
        self.sizes.extend(sizes.into_iter().map(RenderSize::from));
    }

    pub fn resize(&mut self, size: (u32, u32)) {
        self.current = size.into();
        self.resized = true;
    }

    pub fn flag_resized(&mut self) {
        self.resized = true;
    }

    pub fn resize_pending(&self) -> bool {
        self.resized
    }

    /// The next `wait_events` delivers a close request.
    pub fn close_during_next_wait(&mut self) {
        self.close_on_wait = true;
    }
}

impl FramebufferSource for ScriptedWindow {
    fn framebuffer_size(&mut self) -> RenderSize {
        self.size_queries += 1;
        if let Some(next) = self.sizes.pop_front() {
            self.current = next;
        }
        self.journal.borrow_mut().push(Call::SizeQuery(self.current));
        self.current
    }

    fn wait_events(&mut self) {
        self.event_waits += 1;
        self.journal.borrow_mut().push(Call::WaitEvents);
        if std::mem::take(&mut self.close_on_wait) {
            self.closing = true;
        }
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    fn close_requested(&self) -> bool {
        self.closing
    }
}
