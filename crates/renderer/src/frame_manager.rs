//! Frame synchronization.
//!
//! This module provides the [`FrameManager`] struct, which owns the per-slot
//! semaphores and fences and performs the GPU-facing half of each frame:
//!
//! - waiting for a slot's previous submission
//! - acquiring a swapchain image
//! - waiting on the image guard
//! - submitting recorded work and presenting the result
//!
//! Slot and image bookkeeping lives in [`FrameCursor`]; command buffers and
//! uniforms are per swapchain image and belong to the renderer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vge_rhi::command::CommandBuffer;
//! use vge_rhi::device::Device;
//! use vge_rhi::swapchain::Swapchain;
//! use vge_renderer::frame_manager::{Acquired, FrameManager};
//!
//! # fn example(
//! #     device: Arc<Device>,
//! #     swapchain: &Swapchain,
//! #     command_buffers: &[CommandBuffer],
//! # ) -> vge_renderer::RendererResult<()> {
//! let mut frames = FrameManager::new(device, swapchain.image_count())?;
//!
//! frames.wait_for_frame()?;
//! let Acquired::Image(image_index) = frames.acquire_next_image(swapchain)? else {
//!     // Swapchain is out of date: recreate it and try again next frame.
//!     return Ok(());
//! };
//! frames.guard_image(image_index)?;
//! frames.begin_submission()?;
//!
//! // Record command_buffers[image_index] here...
//!
//! frames.submit(&command_buffers[image_index as usize])?;
//! let needs_recreate = frames.present(swapchain, image_index)?;
//! frames.next_frame();
//! # let _ = needs_recreate;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use vge_rhi::command::CommandBuffer;
use vge_rhi::device::Device;
use vge_rhi::swapchain::Swapchain;
use vge_rhi::sync::{Fence, Semaphore};

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::error::RendererResult;
use crate::frame::{FrameCursor, FrameState};

/// Synchronization primitives for one frame slot.
///
/// # Synchronization Flow
///
/// ```text
/// 1. Wait on in_flight_fence (CPU waits for previous use of this slot)
/// 2. Acquire swapchain image (signals image_available)
/// 3. Record commands for the acquired image
/// 4. Submit:
///    - Wait on image_available at COLOR_ATTACHMENT_OUTPUT
///    - Signal render_finished
///    - Signal in_flight_fence
/// 5. Present (waits on render_finished)
/// ```
pub struct FrameData {
    /// Semaphore signaled when a swapchain image is available.
    image_available: Semaphore,
    /// Semaphore signaled when rendering is complete.
    render_finished: Semaphore,
    /// Fence signaled when this slot's submission has executed.
    in_flight_fence: Fence,
}

impl FrameData {
    fn new(device: Arc<Device>) -> RendererResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        // Signaled, so the first wait on a fresh slot returns immediately
        let in_flight_fence = Fence::new(device, true)?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight_fence,
        })
    }

    /// Returns the image available semaphore.
    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    /// Returns the render finished semaphore.
    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    /// Returns the in-flight fence.
    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight_fence
    }
}

/// Outcome of an acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// The presentation engine handed out this image.
    Image(u32),
    /// The swapchain no longer matches the surface and must be recreated.
    OutOfDate,
}

/// Owns the frame slots and runs the submit/present protocol.
///
/// # Thread Safety
///
/// The frame manager is driven from the render thread only.
pub struct FrameManager {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Per-slot synchronization.
    frames: Vec<FrameData>,
    /// Slot cursor, slot states and the image guard table.
    cursor: FrameCursor,
}

impl FrameManager {
    /// Creates [`MAX_FRAMES_IN_FLIGHT`] frame slots and an image guard table
    /// for `image_count` swapchain images.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore or fence creation fails.
    pub fn new(device: Arc<Device>, image_count: usize) -> RendererResult<Self> {
        let mut frames = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);

        for i in 0..MAX_FRAMES_IN_FLIGHT {
            frames.push(FrameData::new(device.clone())?);
            debug!("Created sync objects for frame slot {}", i);
        }

        info!(
            "Frame manager created with {} frames in flight over {} swapchain images",
            MAX_FRAMES_IN_FLIGHT, image_count
        );

        Ok(Self {
            device,
            frames,
            cursor: FrameCursor::new(image_count),
        })
    }

    /// Returns the current slot's synchronization primitives.
    #[inline]
    pub fn current_frame(&self) -> &FrameData {
        &self.frames[self.cursor.current_slot()]
    }

    /// Returns the current slot index.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.cursor.current_slot()
    }

    /// Returns the slot cursor.
    #[inline]
    pub fn cursor(&self) -> &FrameCursor {
        &self.cursor
    }

    /// Blocks until the current slot's previous submission has executed.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_for_frame(&mut self) -> RendererResult<()> {
        self.cursor.set_state(FrameState::Acquiring);
        self.current_frame().in_flight_fence.wait(u64::MAX)?;
        Ok(())
    }

    /// Acquires the next swapchain image, signaling the current slot's
    /// image available semaphore.
    ///
    /// On [`Acquired::OutOfDate`] the slot returns to idle with its fence
    /// still signaled, so the frame can simply be skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if acquisition fails for any reason other than an
    /// out-of-date swapchain.
    pub fn acquire_next_image(&mut self, swapchain: &Swapchain) -> RendererResult<Acquired> {
        let semaphore = self.current_frame().image_available.handle();

        match swapchain.acquire_next_image(semaphore) {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    debug!("Acquired image {} from a suboptimal swapchain", index);
                }
                Ok(Acquired::Image(index))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during acquire");
                self.cursor.set_state(FrameState::Idle);
                Ok(Acquired::OutOfDate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Waits for whichever other slot last rendered to `image_index`, then
    /// claims the image for the current slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn guard_image(&mut self, image_index: u32) -> RendererResult<()> {
        if let Some(owner) = self.cursor.claim_image(image_index) {
            debug!(
                "Image {} still owned by slot {}, waiting on its fence",
                image_index, owner
            );
            self.frames[owner].in_flight_fence.wait(u64::MAX)?;
        }
        Ok(())
    }

    /// Resets the current slot's fence ahead of a submission.
    ///
    /// Call only once a submit is certain, otherwise the next wait on this
    /// slot never returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn begin_submission(&mut self) -> RendererResult<()> {
        self.current_frame().in_flight_fence.reset()?;
        self.cursor.set_state(FrameState::Recording);
        Ok(())
    }

    /// Submits `command_buffer` to the graphics queue.
    ///
    /// Waits on image available at `COLOR_ATTACHMENT_OUTPUT`, signals render
    /// finished and the slot fence.
    ///
    /// # Errors
    ///
    /// Returns an error if queue submission fails.
    pub fn submit(&mut self, command_buffer: &CommandBuffer) -> RendererResult<()> {
        let frame = self.current_frame();

        let wait_semaphores = [frame.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished.handle()];
        let command_buffers = [command_buffer.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the command buffer has finished recording, and the fence was
        // reset in begin_submission and is not attached to another submission.
        unsafe {
            self.device.submit_graphics(
                std::slice::from_ref(&submit_info),
                frame.in_flight_fence.handle(),
            )?;
        }

        self.cursor.set_state(FrameState::Submitted);
        Ok(())
    }

    /// Queues `image_index` for presentation after rendering completes.
    ///
    /// Returns true when the swapchain is out of date or suboptimal and should
    /// be recreated.
    ///
    /// # Errors
    ///
    /// Returns an error if presentation fails for any other reason.
    pub fn present(&mut self, swapchain: &Swapchain, image_index: u32) -> RendererResult<bool> {
        self.cursor.set_state(FrameState::Presenting);

        let result = swapchain.present(
            self.device.present_queue(),
            image_index,
            self.current_frame().render_finished.handle(),
        );

        self.cursor.set_state(FrameState::Idle);

        match result {
            Ok(suboptimal) => {
                if suboptimal {
                    debug!("Present returned suboptimal");
                }
                Ok(suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during present");
                Ok(true)
            }
            Err(vk::Result::SUBOPTIMAL_KHR) => {
                debug!("Swapchain suboptimal during present");
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Advances to the next frame slot.
    #[inline]
    pub fn next_frame(&mut self) {
        self.cursor.advance();
    }

    /// Clears the image guard after swapchain recreation.
    ///
    /// The device must be idle, so no claimed image can still be pending.
    pub fn reset_images(&mut self, image_count: usize) {
        self.cursor.reset_images(image_count);
        debug!("Image guard reset for {} swapchain images", image_count);
    }

    /// Returns the number of frames in flight.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_frames_in_flight_constant() {
        assert!(MAX_FRAMES_IN_FLIGHT >= 1);
        assert!(MAX_FRAMES_IN_FLIGHT <= 4);
    }

    #[test]
    fn test_frame_manager_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameManager>();
    }

    #[test]
    fn test_frame_data_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FrameData>();
    }

    #[test]
    fn test_acquired_variants_are_distinct() {
        assert_ne!(Acquired::Image(0), Acquired::OutOfDate);
        assert_eq!(Acquired::Image(2), Acquired::Image(2));
    }
}
