//! rates-in / spikes-out direction.
//!
//! The receive loop takes a rate array from TVB into the shared buffer;
//! the emit loop converts it to one independent spike train per
//! requested neuron and answers each NEST spike-generator rank with the
//! trains it asked for.

use bridge_buffer::{BufferState, SharedBuffer};
use bridge_proto::{wire, ControlTag, Intercomm, ProtoError};
use bridge_transform::Mediator;
use rand::Rng;

use crate::error::FacadeError;

fn io_err(peer: usize, source: std::io::Error) -> FacadeError {
    FacadeError::Proto(ProtoError::Io { peer, source })
}

/// Runs on the `R_recv` rank. Announces readiness to every TVB peer each
/// step, then reads the timing bounds and (on payload) the rate array
/// from peer 0, the designated data channel.
pub async fn receive_loop(
    intercomm: &mut Intercomm,
    buffer: &SharedBuffer,
) -> Result<(), FacadeError> {
    buffer.set_header(0);
    buffer.set_state(BufferState::Ready);

    let n_peers = intercomm.peer_count();

    loop {
        for peer_idx in 0..n_peers {
            wire::write_bool(intercomm.peer_mut(peer_idx), true)
                .await
                .map_err(|source| io_err(peer_idx, source))?;
        }

        let data_peer = intercomm.peer_mut(0);
        let tag = wire::read_tag(data_peer).await.map_err(|source| io_err(0, source))?;
        let bounds = wire::read_f64_vec(data_peer, 2)
            .await
            .map_err(|source| io_err(0, source))?;

        match tag {
            ControlTag::Payload => {
                buffer.write_slice(0, &bounds)?;
                super::wait_for_state(buffer, BufferState::Ready).await?;

                let data_peer = intercomm.peer_mut(0);
                let size = wire::read_i32(data_peer)
                    .await
                    .map_err(|source| io_err(0, source))? as usize;
                let rates = wire::read_f64_vec(data_peer, size)
                    .await
                    .map_err(|source| io_err(0, source))?;

                buffer.write_slice(2, &rates)?;
                buffer.set_header(size as i64);
                buffer.set_state(BufferState::Head);
            }
            ControlTag::Skip => {
                tracing::info!("receive loop: clean termination from TVB");
                return Ok(());
            }
            ControlTag::End => {
                return Err(FacadeError::Proto(ProtoError::BadTag(2)));
            }
        }
    }
}

/// Runs on the `R_send` rank. Every downstream spike-generator rank must
/// agree on the step's control tag; a mismatch is fatal (see DESIGN.md
/// on why this direction checks all peers rather than only the last).
pub async fn emit_loop(
    intercomm: &mut Intercomm,
    buffer: &SharedBuffer,
    mediator: &mut Mediator,
    id_first_spike_detector: i64,
    nb_neurons: usize,
    rng: &mut impl Rng,
) -> Result<(), FacadeError> {
    let n_peers = intercomm.peer_count();

    loop {
        let tag0 = wire::read_tag(intercomm.peer_mut(0))
            .await
            .map_err(|source| io_err(0, source))?;
        for peer_idx in 1..n_peers {
            let tag_i = wire::read_tag(intercomm.peer_mut(peer_idx))
                .await
                .map_err(|source| io_err(peer_idx, source))?;
            if tag_i != tag0 {
                tracing::error!(
                    peer = peer_idx,
                    got = ?tag_i,
                    expected = ?tag0,
                    "tag inconsistency in NEST emit loop"
                );
                return Err(FacadeError::Proto(ProtoError::TagInconsistency {
                    peer: peer_idx,
                    got: tag_i.into(),
                    expected: tag0.into(),
                }));
            }
        }

        match tag0 {
            ControlTag::Payload => {
                super::wait_for_state(buffer, BufferState::Head).await?;
                let trains = mediator.rate_to_spikes(buffer, nb_neurons, rng)?;
                buffer.set_state(BufferState::Ready);

                for peer_idx in 0..n_peers {
                    let peer = intercomm.peer_mut(peer_idx);
                    let k = wire::read_i32(peer)
                        .await
                        .map_err(|source| io_err(peer_idx, source))?
                        as usize;
                    if k == 0 {
                        continue;
                    }
                    let ids = wire::read_i32_vec(peer, k)
                        .await
                        .map_err(|source| io_err(peer_idx, source))?;

                    let mut per_train_counts = Vec::with_capacity(k);
                    let mut times_concat = Vec::new();
                    for id in &ids {
                        let relative = *id as i64 - id_first_spike_detector;
                        let train = usize::try_from(relative)
                            .ok()
                            .and_then(|idx| trains.get(idx))
                            .cloned()
                            .unwrap_or_default();
                        per_train_counts.push(train.len() as i32);
                        times_concat.extend(train);
                    }
                    let total: i32 = per_train_counts.iter().sum();
                    let mut sizes = Vec::with_capacity(k + 1);
                    sizes.push(total);
                    sizes.extend(per_train_counts);

                    let peer = intercomm.peer_mut(peer_idx);
                    wire::write_i32_slice(peer, &sizes)
                        .await
                        .map_err(|source| io_err(peer_idx, source))?;
                    wire::write_f64_slice(peer, &times_concat)
                        .await
                        .map_err(|source| io_err(peer_idx, source))?;
                }

                mediator.advance();
            }
            ControlTag::Skip => {
                tracing::debug!("emit loop: per-step sentinel, continuing");
            }
            ControlTag::End => {
                tracing::info!("emit loop: clean termination");
                return Ok(());
            }
        }
    }
}
