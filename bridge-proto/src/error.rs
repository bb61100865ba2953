use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error("binding accept socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("writing handshake file {path}: {source}")]
    Handshake {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("accepting peer connection {index}: {source}")]
    Accept {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("io error on peer {peer}: {source}")]
    Io {
        peer: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("control tag {0} is not one of {{0, 1, 2}}")]
    BadTag(u8),

    #[error("peer {peer} sent tag {got}, expected {expected} to match peer 0")]
    TagInconsistency { peer: usize, got: u8, expected: u8 },

    #[error("reading handshake content from {path}: {source}")]
    ReadHandshake {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
