use std::path::PathBuf;
use std::time::Duration;

use bridge_buffer::SharedBuffer;
use bridge_proto::{handshake, IntercommManager};
use bridge_transform::Mediator;
use rand::SeedableRng;

use crate::{
    config::{Direction, RunConfig},
    error::FacadeError,
    pipeline::{nest_to_tvb, tvb_to_nest},
    roles::{RankRole, RoleSet},
};

fn tvb_handshake_path(cfg: &RunConfig) -> PathBuf {
    cfg.path
        .join("transformation/receive_from_tvb")
        .join(format!("{}.txt", cfg.id_nest_region))
}

fn nest_handshake_path(cfg: &RunConfig) -> PathBuf {
    cfg.path
        .join("transformation/receive_from_nest")
        .join(format!("{}.txt", cfg.id_nest_region))
}

fn spike_generator_path(cfg: &RunConfig, generator_id: i64) -> PathBuf {
    cfg.path
        .join("transformation/spike_generator")
        .join(format!("{generator_id}.txt"))
}

fn nest_spike_generator_data_path(cfg: &RunConfig) -> PathBuf {
    cfg.path.join("nest/spike_generator.txt")
}

const BUFFER_ATTACH_RETRY: Duration = Duration::from_millis(50);

/// Attaches to a shared buffer created by another rank, retrying while
/// the segment does not exist yet (ranks are not guaranteed to start in
/// any particular order).
async fn attach_with_retry(
    name: &str,
    len: usize,
) -> Result<SharedBuffer, FacadeError> {
    loop {
        match SharedBuffer::open(name, len) {
            Ok(buf) => return Ok(buf),
            Err(_) => tokio::time::sleep(BUFFER_ATTACH_RETRY).await,
        }
    }
}

fn buffer_name(cfg: &RunConfig) -> String {
    let direction = match cfg.direction {
        Direction::NestToTvb => "nest-to-tvb",
        Direction::TvbToNest => "tvb-to-nest",
    };
    format!("bridge-{}-{direction}", cfg.id_nest_region)
}

/// Wires IntercommManager, BufferManager, Transformer/Mediator and the
/// appropriate DirectionalPipeline together, dispatches this rank to its
/// role, and tears everything down on the way out.
pub struct ManagerFacade {
    cfg: RunConfig,
    roles: RoleSet,
    rank: usize,
}

impl ManagerFacade {
    pub fn new(cfg: RunConfig, roles: RoleSet, rank: usize) -> Self {
        Self { cfg, roles, rank }
    }

    /// Runs this rank to completion: builds whatever this rank's role
    /// needs, drives the loop, and closes any intercomm it opened.
    pub async fn start(&self) -> Result<(), FacadeError> {
        let role = self.roles.role_for(self.rank);
        tracing::info!(rank = self.rank, ?role, direction = ?self.cfg.direction, "starting");

        let name = buffer_name(&self.cfg);
        let len = self.cfg.buffer_len();

        match role {
            RankRole::Xform => {
                tracing::info!("transformer rank idle; transform folded into emit role");
                Ok(())
            }
            RankRole::Recv => {
                // The recv rank is the group's buffer owner in the MVP.
                let buffer = SharedBuffer::create(&name, len)?;
                self.run_recv(buffer).await
            }
            RankRole::Send => {
                let buffer = attach_with_retry(&name, len).await?;
                self.run_send(buffer).await
            }
        }
    }

    async fn run_recv(&self, buffer: SharedBuffer) -> Result<(), FacadeError> {
        let (path, expected_peers) = match self.cfg.direction {
            Direction::NestToTvb => {
                (nest_handshake_path(&self.cfg), self.cfg.nest_peer_count)
            }
            Direction::TvbToNest => {
                (tvb_handshake_path(&self.cfg), self.cfg.tvb_peer_count)
            }
        };
        let mut intercomm =
            IntercommManager::open_and_accept(&[path], expected_peers).await?;

        let result = match self.cfg.direction {
            Direction::NestToTvb => {
                nest_to_tvb::receive_loop(&mut intercomm, &buffer).await
            }
            Direction::TvbToNest => {
                tvb_to_nest::receive_loop(&mut intercomm, &buffer).await
            }
        };

        intercomm.close().await;
        // The recv rank owns the segment (see DESIGN.md's buffer-ownership
        // decision); it is the one rank that unlinks it at teardown.
        if let Err(err) = buffer.destroy() {
            tracing::warn!(%err, "failed to destroy shared buffer at teardown");
        }
        result
    }

    async fn run_send(&self, buffer: SharedBuffer) -> Result<(), FacadeError> {
        let mut mediator = Mediator::new(
            self.cfg.time_synchronization_ms,
            self.cfg.resolution_ms,
            self.cfg.nb_neurons,
            self.cfg.id_first_neurons,
        );

        let result = match self.cfg.direction {
            Direction::NestToTvb => {
                let path = tvb_handshake_path(&self.cfg);
                let mut intercomm = IntercommManager::open_and_accept(
                    &[path],
                    self.cfg.tvb_peer_count,
                )
                .await?;
                let result =
                    nest_to_tvb::emit_loop(&mut intercomm, &buffer, &mut mediator).await;
                intercomm.close().await;
                result
            }
            Direction::TvbToNest => {
                let data_path = nest_spike_generator_data_path(&self.cfg);
                handshake::wait_for_unlock(&data_path).await;
                let ids = handshake::read_requested_ids(&data_path).await?;
                let generator_paths: Vec<PathBuf> = ids
                    .iter()
                    .map(|id| spike_generator_path(&self.cfg, *id))
                    .collect();

                let mut intercomm = IntercommManager::open_and_accept(
                    &generator_paths,
                    ids.len(),
                )
                .await?;
                let mut rng = rand::rngs::StdRng::from_entropy();
                let result = tvb_to_nest::emit_loop(
                    &mut intercomm,
                    &buffer,
                    &mut mediator,
                    self.cfg.id_first_spike_detector,
                    self.cfg.nb_neurons,
                    &mut rng,
                )
                .await;
                intercomm.close().await;
                result
            }
        };

        result
    }
}
