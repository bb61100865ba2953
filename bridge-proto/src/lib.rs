//! Wire protocol and transport primitives for talking to the external
//! simulators: the control tag alphabet, little-endian scalar/array
//! codecs, the TCP-backed intercomm standing in for an MPI intercomm,
//! and the NEST-side filesystem handshake.

mod error;
pub mod handshake;
mod intercomm;
mod tag;
pub mod wire;

pub use error::ProtoError;
pub use intercomm::{Intercomm, IntercommManager};
pub use tag::ControlTag;
