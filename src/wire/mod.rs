//! Wire-level concerns: path virtualization and protocol messages.

pub mod path;
pub mod protocol;

pub use path::WirePathCodec;
pub use protocol::{ChangeEvent, ClientEvent, ClientMessage, InitialFile, ServerMessage};
