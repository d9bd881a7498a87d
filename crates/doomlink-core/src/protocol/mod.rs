//! Protocol module containing the message catalog, encoders and the
//! resumable decoder.

pub mod codec;
pub mod decoder;
pub mod messages;

pub use codec::{encode_client_message, encode_init, encode_server_message, ServerMessage};
pub use decoder::{DecodeError, Decoder};
pub use messages::*;
