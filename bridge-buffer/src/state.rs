use crate::error::BufferError;

/// Which of the (at most two) buffers a call addresses.
///
/// The receive/transform pipeline for one direction only ever needs one
/// buffer; the input/output split exists for the case where the
/// transformer's input and output payload shapes differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
    Input,
    Output,
}

/// The buffer-state cell alphabet.
///
/// NEST->TVB uses the `ReadyToReceive`/`ReadyToTransform` pair; TVB->NEST
/// uses the `Ready`/`Head` pair. Both pairs are the same two-token
/// ping-pong described in the concurrency model, just named differently
/// by the two directions' original sources. `Wait` is the value a freshly
/// allocated buffer starts at before the first producer write, so a
/// consumer that races ahead of setup observes a distinguishable state
/// rather than a zeroed float that happens to look like a valid tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum BufferState {
    Wait = 0,
    ReadyToReceive = 1,
    ReadyToTransform = 2,
    Ready = 3,
    Head = 4,
}

impl BufferState {
    pub fn as_f64(self) -> f64 {
        self as i32 as f64
    }

    pub fn from_f64(value: f64) -> Result<Self, BufferError> {
        match value as i32 {
            0 => Ok(Self::Wait),
            1 => Ok(Self::ReadyToReceive),
            2 => Ok(Self::ReadyToTransform),
            3 => Ok(Self::Ready),
            4 => Ok(Self::Head),
            _ => Err(BufferError::InvalidState(value)),
        }
    }
}
