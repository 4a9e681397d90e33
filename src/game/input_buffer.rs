//! Input handed from host handlers to the frame loop
//!
//! Keyboard/pointer handlers (or the autopilot) submit signals from any
//! thread. Once per frame the loop takes everything pending, in submission
//! order, with key repeat collapsed: back-to-back identical signals count
//! once. A held key or a double tap within one frame therefore can't both
//! restart a finished run and jump, or start a run and jump, on the same
//! frame.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use smallvec::SmallVec;
use tracing::debug;

use crate::game::engine::InputSignal;

/// Signals a frame can hold before senders see `Full`
pub const INPUT_CAPACITY: usize = 64;

/// One frame's signals; rarely more than a couple
pub type FrameInput = SmallVec<[InputSignal; 4]>;

pub struct InputBuffer {
    sender: Sender<InputSignal>,
    receiver: Receiver<InputSignal>,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self { sender, receiver }
    }

    /// Create a handle for an input source
    pub fn sender(&self) -> InputSender {
        InputSender {
            sender: self.sender.clone(),
        }
    }

    /// Take this frame's signals with repeats collapsed
    pub fn take_frame(&self) -> FrameInput {
        let mut signals: FrameInput = self.receiver.try_iter().collect();
        let submitted = signals.len();
        signals.dedup();

        if signals.len() < submitted {
            debug!(
                "Collapsed {} repeated input signals",
                submitted - signals.len()
            );
        }
        signals
    }
}

/// Clonable sender handle for input sources
#[derive(Clone)]
pub struct InputSender {
    sender: Sender<InputSignal>,
}

impl InputSender {
    /// Submit a signal without blocking
    pub fn try_send(&self, signal: InputSignal) -> Result<(), InputBufferError> {
        self.sender.try_send(signal).map_err(|e| match e {
            TrySendError::Full(_) => {
                debug!("Input buffer full, dropping {:?}", signal);
                InputBufferError::Full
            }
            TrySendError::Disconnected(_) => InputBufferError::Disconnected,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputBufferError {
    #[error("Input buffer is full")]
    Full,
    #[error("Game loop is gone")]
    Disconnected,
}
