//! Group-shared data buffer: a fixed-size array of `f64` with two
//! trailing control cells (header, buffer-state) used to hand payload
//! between the receiver and sender roles of one coupling direction.
//!
//! See [`SharedBuffer`] for the allocation/attach/destroy lifecycle and
//! [`BufferState`] for the producer/consumer handshake alphabet.

mod buffer;
mod error;
mod state;

pub use buffer::SharedBuffer;
pub use error::BufferError;
pub use state::{BufferState, BufferType};
