//! spikes-in / rates-out direction.
//!
//! The receive loop takes spike triples from each NEST rank into the
//! shared buffer; the emit loop converts them to a rate array and sends
//! it to TVB. Folds the transform role into the emit role, as the MVP
//! rank partition allows.

use bridge_buffer::{BufferState, SharedBuffer};
use bridge_proto::{wire, ControlTag, Intercomm, ProtoError};
use bridge_transform::Mediator;

use crate::error::FacadeError;

fn io_err(peer: usize, source: std::io::Error) -> FacadeError {
    FacadeError::Proto(ProtoError::Io { peer, source })
}

/// Runs on the `R_recv` rank. Returns `Ok(())` once the upstream sends
/// tag 2 (clean termination); any tag mismatch across peers or bad tag
/// is a fatal error.
pub async fn receive_loop(
    intercomm: &mut Intercomm,
    buffer: &SharedBuffer,
) -> Result<(), FacadeError> {
    buffer.set_header(0);
    buffer.set_state(BufferState::ReadyToReceive);

    let n_peers = intercomm.peer_count();
    let mut skip_count: u64 = 0;

    loop {
        let tag0 = wire::read_tag(intercomm.peer_mut(0))
            .await
            .map_err(|source| io_err(0, source))?;

        for i in 1..n_peers {
            let tag_i = wire::read_tag(intercomm.peer_mut(i))
                .await
                .map_err(|source| io_err(i, source))?;
            if tag_i != tag0 {
                tracing::error!(
                    peer = i,
                    got = ?tag_i,
                    expected = ?tag0,
                    "tag inconsistency in NEST receive loop"
                );
                return Err(FacadeError::Proto(ProtoError::TagInconsistency {
                    peer: i,
                    got: tag_i.into(),
                    expected: tag0.into(),
                }));
            }
        }

        match tag0 {
            ControlTag::Payload => {
                super::wait_for_state(buffer, BufferState::ReadyToReceive).await?;

                let mut running_head = 0usize;
                for peer_idx in 0..n_peers {
                    let peer = intercomm.peer_mut(peer_idx);
                    wire::write_bool(peer, true)
                        .await
                        .map_err(|source| io_err(peer_idx, source))?;
                    let shape = wire::read_i32(peer)
                        .await
                        .map_err(|source| io_err(peer_idx, source))?
                        as usize;
                    let floats = wire::read_f64_vec(peer, shape)
                        .await
                        .map_err(|source| io_err(peer_idx, source))?;
                    buffer.write_slice(running_head, &floats)?;
                    running_head += shape;
                }

                buffer.set_header(running_head as i64);
                buffer.set_state(BufferState::ReadyToTransform);
            }
            ControlTag::Skip => {
                skip_count += 1;
                tracing::debug!(skip_count, "receive loop: advanced without payload");
            }
            ControlTag::End => {
                tracing::info!("receive loop: clean termination from upstream");
                return Ok(());
            }
        }
    }
}

/// Runs on the `R_send` rank. Converts the shared buffer's spikes to a
/// rate array on each demand from TVB, and returns `Ok(())` once TVB
/// signals end (tag 1).
///
/// The demand signal may arrive from any TVB peer (spec.md §4.5 step 1's
/// "receive ... from any source"), so each round races a tag read across
/// every peer and replies to whichever one actually signalled, rather
/// than assuming peer 0.
pub async fn emit_loop(
    intercomm: &mut Intercomm,
    buffer: &SharedBuffer,
    mediator: &mut Mediator,
) -> Result<(), FacadeError> {
    loop {
        let (peer_idx, tag) = wire::read_tag_any_source(intercomm.peers_mut()).await;
        let tag = tag.map_err(|source| io_err(peer_idx, source))?;

        match tag {
            ControlTag::Payload => {
                super::wait_for_state(buffer, BufferState::ReadyToTransform).await?;
                let (window, rates) = mediator.spikes_to_rate(buffer)?;
                buffer.set_state(BufferState::ReadyToReceive);

                let demander = intercomm.peer_mut(peer_idx);
                wire::write_f64_slice(demander, &[window.start_ms, window.end_ms])
                    .await
                    .map_err(|source| io_err(peer_idx, source))?;
                wire::write_i32(demander, rates.len() as i32)
                    .await
                    .map_err(|source| io_err(peer_idx, source))?;
                wire::write_f64_slice(demander, &rates)
                    .await
                    .map_err(|source| io_err(peer_idx, source))?;

                mediator.advance();
                tracing::debug!(step = mediator.step(), peer = peer_idx, "emit loop: step complete");
            }
            ControlTag::Skip => {
                tracing::info!(peer = peer_idx, "emit loop: downstream signalled end");
                return Ok(());
            }
            ControlTag::End => {
                return Err(FacadeError::Proto(ProtoError::BadTag(2)));
            }
        }
    }
}
