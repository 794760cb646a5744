//! Events a peer transport reports to the swarm.

use bytes::Bytes;

use super::bitfield::Bitfield;
use super::extension::ExtensionHandshake;
use super::piece::{Block, BlockRequest};

/// An extension-protocol message surfaced by the transport, with message
/// ids already resolved to names.
#[derive(Debug, Clone)]
pub enum ExtendedEvent {
    /// The remote's extended handshake.
    Handshake(ExtensionHandshake),
    /// A named extension message, payload still bencoded.
    Message { name: String, payload: Bytes },
}

/// One event from a peer's wire session.
///
/// The transport owns framing and the BitTorrent handshake; the swarm only
/// sees the decoded protocol stream. Every variant carries the data the
/// corresponding handler consumes, nothing more.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// Transport-level connect succeeded; the peer joins the active set.
    Connected,
    /// The remote completed the BitTorrent handshake.
    Handshake,
    Bitfield(Bitfield),
    HaveAll,
    HaveNone,
    Have(u32),
    /// The remote's choke state toward us changed; `true` means choked.
    ChokeChange(bool),
    /// The remote's interest in us changed.
    InterestedChange(bool),
    /// BEP-6: the remote allows this piece to be requested while choked.
    AllowFast(u32),
    /// BEP-6: the remote suggests downloading this piece.
    Suggest(u32),
    /// The remote wants a block from us.
    Request(BlockRequest),
    /// The remote delivered a block.
    Piece(Block),
    /// One of our outstanding requests stalled.
    RequestTimeout(BlockRequest),
    /// BEP-6: the remote rejected one of our requests.
    Reject(BlockRequest),
    Extended(ExtendedEvent),
    /// The session ended; no further events follow.
    Disposed(String),
}
