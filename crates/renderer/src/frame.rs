//! Frame slot bookkeeping.
//!
//! Two indices advance independently during rendering:
//!
//! - the **slot index** picks one of [`MAX_FRAMES_IN_FLIGHT`] bundles of
//!   semaphores and a fence, and cycles strictly in order;
//! - the **image index** is whatever the swapchain hands back from acquire,
//!   in any order the presentation engine likes.
//!
//! Per-image resources (command buffers, uniform buffers) are indexed by the
//! image index, so an image can come back while a submission from a
//! *different* slot is still reading them. [`FrameCursor::claim_image`]
//! remembers which slot last used each image and reports the slot whose fence
//! must be waited on before the image's resources are rewritten.
//!
//! The cursor holds no Vulkan handles. The renderer drives the actual fences;
//! the cursor only decides which of them to wait on, which keeps the protocol
//! testable without a GPU.

use tracing::trace;

use crate::MAX_FRAMES_IN_FLIGHT;

/// Maps a monotonically increasing frame counter to a frame slot.
#[inline]
pub fn slot_index(frame_counter: u64) -> usize {
    (frame_counter % MAX_FRAMES_IN_FLIGHT as u64) as usize
}

/// Lifecycle of a single frame slot.
///
/// ```text
/// Idle -> Acquiring -> Recording -> Submitted -> Presenting -> Idle
///             |
///             +-> Idle (swapchain out of date, frame skipped)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    /// Fence signaled, nothing pending for this slot on the CPU side.
    #[default]
    Idle,
    /// Waiting for the presentation engine to hand out an image.
    Acquiring,
    /// Uniforms and the command buffer for the acquired image are being written.
    Recording,
    /// Work is queued; the slot fence will signal when it completes.
    Submitted,
    /// The image has been queued for presentation.
    Presenting,
}

impl FrameState {
    /// Returns true if `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: FrameState) -> bool {
        matches!(
            (self, next),
            (FrameState::Idle, FrameState::Acquiring)
                | (FrameState::Acquiring, FrameState::Recording)
                | (FrameState::Acquiring, FrameState::Idle)
                | (FrameState::Recording, FrameState::Submitted)
                | (FrameState::Submitted, FrameState::Presenting)
                | (FrameState::Presenting, FrameState::Idle)
        )
    }
}

/// Tracks the current slot, per-slot state and the image guard table.
#[derive(Debug, Clone)]
pub struct FrameCursor {
    /// Frames started since creation; the slot is derived from it.
    frame_counter: u64,
    /// State of each slot.
    states: [FrameState; MAX_FRAMES_IN_FLIGHT],
    /// For each swapchain image, the slot whose submission last used it.
    images_in_flight: Vec<Option<usize>>,
}

impl FrameCursor {
    /// Creates a cursor for a swapchain with `image_count` images.
    pub fn new(image_count: usize) -> Self {
        Self {
            frame_counter: 0,
            states: [FrameState::Idle; MAX_FRAMES_IN_FLIGHT],
            images_in_flight: vec![None; image_count],
        }
    }

    /// Slot used by the frame currently being built.
    #[inline]
    pub fn current_slot(&self) -> usize {
        slot_index(self.frame_counter)
    }

    /// Number of frames started so far.
    #[inline]
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Number of swapchain images the guard table covers.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }

    /// State of `slot`.
    #[inline]
    pub fn state(&self, slot: usize) -> FrameState {
        self.states[slot]
    }

    /// Moves the current slot to `next`.
    ///
    /// Illegal transitions are logged and applied anyway; the renderer is the
    /// only caller and follows the protocol, so this is a diagnostic aid.
    pub fn set_state(&mut self, next: FrameState) {
        let slot = self.current_slot();
        let current = self.states[slot];
        if !current.can_transition_to(next) {
            tracing::warn!(
                "Frame slot {} moved {:?} -> {:?} outside the frame protocol",
                slot,
                current,
                next
            );
        }
        trace!("Frame slot {}: {:?} -> {:?}", slot, current, next);
        self.states[slot] = next;
    }

    /// Records that the current slot is about to use `image_index`.
    ///
    /// Returns the slot that used the image before, when that slot is not the
    /// current one. Its fence must be waited on before the image's command
    /// buffer or uniform buffer is rewritten. An index outside the table is
    /// ignored and yields `None`.
    pub fn claim_image(&mut self, image_index: u32) -> Option<usize> {
        let slot = self.current_slot();
        let entry = self.images_in_flight.get_mut(image_index as usize)?;
        let previous = entry.replace(slot);
        previous.filter(|&owner| owner != slot)
    }

    /// Slot that last used `image_index`, if any.
    pub fn image_owner(&self, image_index: u32) -> Option<usize> {
        self.images_in_flight
            .get(image_index as usize)
            .copied()
            .flatten()
    }

    /// Forgets every image claim and resizes the table.
    ///
    /// Called after swapchain recreation, once the device is idle.
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, None);
    }

    /// Advances to the next slot.
    pub fn advance(&mut self) {
        self.frame_counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;

    #[test]
    fn test_slot_index_cycles() {
        let slots: Vec<usize> = (0..6).map(slot_index).collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_slot_index_stays_in_bounds() {
        for counter in [0, 1, 7, u64::MAX - 1, u64::MAX] {
            assert!(slot_index(counter) < MAX_FRAMES_IN_FLIGHT);
        }
    }

    #[test]
    fn test_state_protocol() {
        use FrameState::*;

        let happy_path = [Idle, Acquiring, Recording, Submitted, Presenting, Idle];
        for pair in happy_path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
        }

        assert!(Acquiring.can_transition_to(Idle));
        assert!(!Idle.can_transition_to(Recording));
        assert!(!Recording.can_transition_to(Presenting));
        assert!(!Submitted.can_transition_to(Idle));
    }

    #[test]
    fn test_claim_image_reports_other_slot() {
        let mut cursor = FrameCursor::new(3);

        assert_eq!(cursor.claim_image(0), None);
        cursor.advance();

        // Slot 1 gets image 0 back while slot 0 may still be rendering to it.
        assert_eq!(cursor.claim_image(0), Some(0));
        assert_eq!(cursor.image_owner(0), Some(1));
    }

    #[test]
    fn test_claim_image_same_slot_needs_no_extra_wait() {
        let mut cursor = FrameCursor::new(3);
        assert_eq!(cursor.claim_image(2), None);
        cursor.advance();
        cursor.advance();

        // Same slot again: its own fence was already waited on.
        assert_eq!(cursor.current_slot(), 0);
        assert_eq!(cursor.claim_image(2), None);
    }

    #[test]
    fn test_claim_out_of_range_image_is_ignored() {
        let mut cursor = FrameCursor::new(2);
        assert_eq!(cursor.claim_image(5), None);
        assert_eq!(cursor.image_owner(5), None);
    }

    #[test]
    fn test_reset_images_clears_guard() {
        let mut cursor = FrameCursor::new(2);
        cursor.claim_image(0);
        cursor.claim_image(1);

        cursor.reset_images(4);

        assert_eq!(cursor.image_count(), 4);
        assert!((0..4).all(|i| cursor.image_owner(i).is_none()));
    }

    /// Minimal model of a GPU queue: submissions complete in order, and only
    /// when the CPU forces them by waiting on a fence.
    struct SimulatedQueue {
        /// Pending submissions as (submit id, slot).
        pending: VecDeque<(u64, usize)>,
        /// Last submit id per slot, i.e. what that slot's fence tracks.
        fence_target: [Option<u64>; MAX_FRAMES_IN_FLIGHT],
        next_id: u64,
        max_pending: usize,
    }

    impl SimulatedQueue {
        fn new() -> Self {
            Self {
                pending: VecDeque::new(),
                fence_target: [None; MAX_FRAMES_IN_FLIGHT],
                next_id: 0,
                max_pending: 0,
            }
        }

        /// Blocks until the slot's fence signals: everything up to and
        /// including that slot's last submission has executed.
        fn wait_fence(&mut self, slot: usize) {
            if let Some(target) = self.fence_target[slot] {
                while self.pending.front().is_some_and(|&(id, _)| id <= target) {
                    self.pending.pop_front();
                }
            }
        }

        fn submit(&mut self, slot: usize) {
            let id = self.next_id;
            self.next_id += 1;
            self.pending.push_back((id, slot));
            self.fence_target[slot] = Some(id);
            self.max_pending = self.max_pending.max(self.pending.len());
        }

        fn is_pending(&self, slot: usize) -> bool {
            self.pending.iter().any(|&(_, s)| s == slot)
        }
    }

    #[test]
    fn test_simulated_timeline_bounds_in_flight_work() {
        let image_count = 3;
        let mut cursor = FrameCursor::new(image_count);
        let mut queue = SimulatedQueue::new();

        // An uneven acquire order, like a compositor holding images back.
        let acquire_order = [0u32, 1, 2, 0, 2, 1, 1, 0, 2, 2, 0, 1, 0, 0, 1, 2];

        for &image_index in acquire_order.iter().cycle().take(200) {
            let slot = cursor.current_slot();

            cursor.set_state(FrameState::Acquiring);
            queue.wait_fence(slot);
            assert!(!queue.is_pending(slot), "slot {slot} reused while pending");

            if let Some(owner) = cursor.claim_image(image_index) {
                queue.wait_fence(owner);
                assert!(!queue.is_pending(owner));
            }

            cursor.set_state(FrameState::Recording);
            queue.submit(slot);
            cursor.set_state(FrameState::Submitted);
            cursor.set_state(FrameState::Presenting);
            cursor.set_state(FrameState::Idle);

            assert!(queue.pending.len() <= MAX_FRAMES_IN_FLIGHT);
            cursor.advance();
        }

        assert_eq!(queue.max_pending, MAX_FRAMES_IN_FLIGHT);
        assert_eq!(cursor.frame_counter(), 200);
    }

    #[test]
    fn test_image_guard_prevents_overwriting_pending_image() {
        let mut cursor = FrameCursor::new(3);
        let mut queue = SimulatedQueue::new();
        // Which submission last read each image's resources.
        let mut image_reader: Vec<Option<u64>> = vec![None; 3];

        let acquire_order = [0u32, 0, 1, 1, 2, 0, 2, 2, 1, 0];
        for &image_index in acquire_order.iter().cycle().take(100) {
            let slot = cursor.current_slot();
            queue.wait_fence(slot);
            if let Some(owner) = cursor.claim_image(image_index) {
                queue.wait_fence(owner);
            }

            if let Some(reader) = image_reader[image_index as usize] {
                assert!(
                    queue.pending.iter().all(|&(id, _)| id != reader),
                    "image {image_index} rewritten while submission {reader} pending"
                );
            }

            image_reader[image_index as usize] = Some(queue.next_id);
            queue.submit(slot);
            cursor.advance();
        }
    }

    #[test]
    fn test_skipped_frame_returns_to_idle() {
        let mut cursor = FrameCursor::new(2);
        cursor.set_state(FrameState::Acquiring);
        cursor.set_state(FrameState::Idle);
        assert_eq!(cursor.state(0), FrameState::Idle);
        assert_eq!(cursor.current_slot(), 0);
    }
}
