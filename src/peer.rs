//! Peer-facing surface: identity, bitfields, piece bookkeeping, the
//! command/event contract a transport implements, and the extension
//! handshake (BEP-6, BEP-10).

mod bitfield;
mod event;
mod extension;
mod link;
mod peer_id;
mod piece;

pub use bitfield::Bitfield;
pub use event::{ExtendedEvent, PeerEvent};
pub use extension::{ExtensionError, ExtensionHandshake, UT_PEX};
pub use link::{PeerCommand, PeerLink};
pub use peer_id::PeerId;
pub use piece::{Block, BlockRequest, Piece, PieceSet};
