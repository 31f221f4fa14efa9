//! Scripted input for the NES.
//!
//! Two layers:
//! 1. [`NesButton`] — logical button names mapped to shift-register bits.
//! 2. [`InputQueue`] — timed button events applied at frame boundaries,
//!    so tests and automation can drive deterministic input.

use std::collections::VecDeque;

use crate::controller::{self, Controller};

/// Logical button on the NES controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NesButton {
    A,
    B,
    Select,
    Start,
    Up,
    Down,
    Left,
    Right,
}

impl NesButton {
    /// Bit position of this button in the controller latch.
    #[must_use]
    pub const fn bit(self) -> u8 {
        match self {
            Self::A => controller::button::A,
            Self::B => controller::button::B,
            Self::Select => controller::button::SELECT,
            Self::Start => controller::button::START,
            Self::Up => controller::button::UP,
            Self::Down => controller::button::DOWN,
            Self::Left => controller::button::LEFT,
            Self::Right => controller::button::RIGHT,
        }
    }
}

/// A timed button event.
#[derive(Debug, Clone)]
pub struct InputEvent {
    /// Frame number at which the event applies.
    pub frame: u64,
    pub button: NesButton,
    /// True = press, false = release.
    pub pressed: bool,
}

/// Queue of timed button events, sorted by frame and drained at the start
/// of each frame.
#[derive(Debug, Default)]
pub struct InputQueue {
    events: VecDeque<InputEvent>,
}

impl InputQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event, keeping the queue frame-ordered.
    pub fn push(&mut self, event: InputEvent) {
        let pos = self
            .events
            .iter()
            .position(|e| e.frame > event.frame)
            .unwrap_or(self.events.len());
        self.events.insert(pos, event);
    }

    /// Queue a press at `at_frame` and the matching release `hold_frames`
    /// later.
    pub fn enqueue_button(&mut self, button: NesButton, at_frame: u64, hold_frames: u64) {
        self.push(InputEvent {
            frame: at_frame,
            button,
            pressed: true,
        });
        self.push(InputEvent {
            frame: at_frame + hold_frames,
            button,
            pressed: false,
        });
    }

    /// Apply every event due at or before `frame` to `pad`.
    pub fn process(&mut self, frame: u64, pad: &mut Controller) {
        while let Some(event) = self.events.front() {
            if event.frame > frame {
                break;
            }
            let event = self.events.pop_front().expect("front was Some");
            pad.set_button(event.button.bit(), event.pressed);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_creates_press_and_release() {
        let mut queue = InputQueue::new();
        queue.enqueue_button(NesButton::Start, 10, 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn events_apply_at_their_frame() {
        let mut queue = InputQueue::new();
        let mut pad = Controller::new();
        queue.enqueue_button(NesButton::A, 5, 3);

        queue.process(4, &mut pad);
        assert_eq!(pad.buttons(), 0);

        queue.process(5, &mut pad);
        assert_eq!(pad.buttons() >> 7, 1);

        queue.process(8, &mut pad);
        assert_eq!(pad.buttons(), 0);
    }

    #[test]
    fn out_of_order_pushes_are_sorted() {
        let mut queue = InputQueue::new();
        queue.push(InputEvent {
            frame: 9,
            button: NesButton::B,
            pressed: true,
        });
        queue.push(InputEvent {
            frame: 3,
            button: NesButton::A,
            pressed: true,
        });
        let mut pad = Controller::new();
        queue.process(3, &mut pad);
        assert_eq!(pad.buttons(), 1 << NesButton::A.bit());
        assert_eq!(queue.len(), 1);
    }
}
