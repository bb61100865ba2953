//! The receive/emit state machines driving one coupling direction.
//! `nest_to_tvb` implements spikes-in/rates-out; `tvb_to_nest`
//! implements rates-in/spikes-out.

pub mod nest_to_tvb;
pub mod tvb_to_nest;

use std::time::Duration;

use bridge_buffer::{BufferState, SharedBuffer};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Busy-waits, yielding to the executor every 1 ms, until the shared
/// buffer's state cell equals `want`. A tokio-native counterpart to
/// [`SharedBuffer::wait_for_state`]'s blocking sleep, so that a pipeline
/// loop never stalls the runtime it shares with the TCP I/O on the same
/// rank.
pub(crate) async fn wait_for_state(
    buffer: &SharedBuffer,
    want: BufferState,
) -> Result<(), bridge_buffer::BufferError> {
    loop {
        if buffer.get_state()? == want {
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
