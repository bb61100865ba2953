use std::path::Path;

use tokio::net::{TcpListener, TcpStream};

use crate::error::ProtoError;

/// An inter-group communicator: the bridge's side of a connection to one
/// external simulator's process group. Peers are indexed in the order
/// they connected, which stands in for the rank ordering a real MPI
/// intercomm would provide for free.
pub struct Intercomm {
    peers: Vec<TcpStream>,
}

impl Intercomm {
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn peer_mut(&mut self, index: usize) -> &mut TcpStream {
        &mut self.peers[index]
    }

    pub fn peers_mut(&mut self) -> &mut [TcpStream] {
        &mut self.peers
    }

    /// Disconnects every peer link. Best-effort: a shutdown error on one
    /// peer is logged and does not stop the others from being closed.
    pub async fn close(mut self) {
        for (index, peer) in self.peers.iter_mut().enumerate() {
            use tokio::io::AsyncWriteExt as _;
            if let Err(err) = peer.shutdown().await {
                tracing::warn!(index, %err, "error shutting down peer link");
            }
        }
    }
}

/// Opens a named endpoint, publishes its address to one or more
/// handshake files, and blocks until `expected_peers` connections have
/// arrived.
pub struct IntercommManager;

impl IntercommManager {
    /// Binds an ephemeral TCP listener, writes `{ip}:{port}` to every
    /// path in `handshake_paths` (creating parent directories as
    /// needed), then accepts exactly `expected_peers` connections.
    pub async fn open_and_accept(
        handshake_paths: &[impl AsRef<Path>],
        expected_peers: usize,
    ) -> Result<Intercomm, ProtoError> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(ProtoError::Bind)?;
        let addr = listener.local_addr().map_err(ProtoError::Bind)?;

        for path in handshake_paths {
            publish_address(path.as_ref(), addr).await?;
        }

        let mut peers = Vec::with_capacity(expected_peers);
        for index in 0..expected_peers {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|source| ProtoError::Accept { index, source })?;
            tracing::debug!(index, "accepted peer connection");
            peers.push(stream);
        }
        Ok(Intercomm { peers })
    }
}

async fn publish_address(
    path: &Path,
    addr: std::net::SocketAddr,
) -> Result<(), ProtoError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ProtoError::Handshake {
                path: path.to_owned(),
                source,
            })?;
    }
    tokio::fs::write(path, addr.to_string())
        .await
        .map_err(|source| ProtoError::Handshake {
            path: path.to_owned(),
            source,
        })
}
