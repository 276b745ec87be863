//! Protocol module containing the phone-facing message types, the JSON codec
//! and the discovery datagram format.

pub mod codec;
pub mod discovery;
pub mod messages;

pub use codec::{decode_client_message, encode_server_message, ProtocolError};
pub use messages::*;
