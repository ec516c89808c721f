//! Protocol implementation module
//!
//! This module defines the app server framing, the payload schema, the
//! command dispatcher and the network state model.

pub mod codec;
pub mod dispatcher;
pub mod message;
pub mod schema;
pub mod state;

pub use self::codec::{decode_stream, encode_frame, Frame, FrameCodec};
pub use self::dispatcher::{Action, Dispatcher, Event, Outcome};
pub use self::message::{CommandId, Inbound, Request};
pub use self::state::{Channel, NetworkInfo, NetworkMode, NetworkState};

// Constants
/// Frame header size: length (2) + subsystem (1) + command (1)
pub const HEADER_SIZE: usize = 4;

/// Largest payload the 16-bit length field can describe
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;
