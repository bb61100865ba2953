/// One of the three disjoint role sets a rank belongs to. Fixed at
/// start, never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankRole {
    Recv,
    Xform,
    Send,
}

/// Partitions `0..world_size` into receivers, transformers and senders.
/// The MVP keeps `R_recv` and `R_send` to a single rank each; every rank
/// not explicitly listed falls into `R_xform`.
#[derive(Debug, Clone, Copy)]
pub struct RoleSet {
    world_size: usize,
    recv_rank: usize,
    send_rank: usize,
}

impl RoleSet {
    pub fn new(
        world_size: usize,
        recv_rank: usize,
        send_rank: usize,
    ) -> Result<Self, RoleSetError> {
        if recv_rank >= world_size || send_rank >= world_size {
            return Err(RoleSetError::RankOutOfRange { world_size });
        }
        if recv_rank == send_rank {
            return Err(RoleSetError::RecvEqualsSend { rank: recv_rank });
        }
        if world_size < 3 {
            return Err(RoleSetError::WorldTooSmall { world_size });
        }
        Ok(Self {
            world_size,
            recv_rank,
            send_rank,
        })
    }

    pub fn role_for(&self, rank: usize) -> RankRole {
        if rank == self.recv_rank {
            RankRole::Recv
        } else if rank == self.send_rank {
            RankRole::Send
        } else {
            RankRole::Xform
        }
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RoleSetError {
    #[error("recv/send rank out of range for world size {world_size}")]
    RankOutOfRange { world_size: usize },

    #[error("recv and send rank are both {rank}, but must be disjoint")]
    RecvEqualsSend { rank: usize },

    #[error("world size {world_size} is below the minimum of 3 ranks")]
    WorldTooSmall { world_size: usize },
}
