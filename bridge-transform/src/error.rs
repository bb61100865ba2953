#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("reading transform input from the shared buffer: {0}")]
    Buffer(#[from] bridge_buffer::BufferError),
}
