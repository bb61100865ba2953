use nix::errno::Errno;

#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("shm_open failed for {name}: {source}")]
    ShmOpen { name: String, source: Errno },

    #[error("ftruncate failed for {name}: {source}")]
    Truncate { name: String, source: Errno },

    #[error("mmap failed for {name}: {source}")]
    Mmap { name: String, source: Errno },

    #[error("munmap failed for {name}: {source}")]
    Munmap { name: String, source: Errno },

    #[error("shm_unlink failed for {name}: {source}")]
    ShmUnlink { name: String, source: Errno },

    #[error("index {index} out of range for buffer of capacity {capacity}")]
    IndexOutOfRange { index: usize, capacity: usize },

    #[error("invalid buffer-state value {0}")]
    InvalidState(f64),

    #[error("shared-memory name {0:?} is not representable as a C string")]
    InvalidName(String),
}
