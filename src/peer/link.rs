//! Command-side handle to a peer's wire session.
//!
//! The coordinator never touches the network; it manipulates a [`PeerLink`]
//! whose commands a transport task drains and turns into wire messages.
//! The channel is bounded: a full queue means the session cannot keep up,
//! and the two senders where that matters (`send_request`, `send_piece`)
//! report it as `false` so the caller can back off.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::bitfield::Bitfield;
use super::peer_id::PeerId;
use super::piece::{Block, BlockRequest};
use crate::constants::PEER_COMMAND_CAPACITY;

/// An instruction for the transport task behind a peer session.
#[derive(Debug, Clone)]
pub enum PeerCommand {
    Connect,
    Handshake,
    Bitfield(Bitfield),
    Interested(bool),
    Choke(bool),
    Have(u32),
    Request(BlockRequest),
    Cancel(BlockRequest),
    Piece(Block),
    KeepAlive,
    Extended { name: String, payload: Bytes },
    RegisterExtension(String),
    Dispose(String),
}

/// Identity plus command channel for one peer session.
#[derive(Debug, Clone)]
pub struct PeerLink {
    id: PeerId,
    addr: SocketAddr,
    commands: mpsc::Sender<PeerCommand>,
}

impl PeerLink {
    /// Creates a link and the receiver its transport drains.
    pub fn channel(id: PeerId, addr: SocketAddr) -> (Self, mpsc::Receiver<PeerCommand>) {
        let (tx, rx) = mpsc::channel(PEER_COMMAND_CAPACITY);
        (
            Self {
                id,
                addr,
                commands: tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn send(&self, command: PeerCommand) -> bool {
        self.commands.try_send(command).is_ok()
    }

    pub fn connect(&self) {
        self.send(PeerCommand::Connect);
    }

    pub fn send_handshake(&self) {
        self.send(PeerCommand::Handshake);
    }

    pub fn send_bitfield(&self, bitfield: Bitfield) {
        self.send(PeerCommand::Bitfield(bitfield));
    }

    pub fn send_interested(&self, interested: bool) {
        self.send(PeerCommand::Interested(interested));
    }

    pub fn send_choke(&self, choke: bool) {
        self.send(PeerCommand::Choke(choke));
    }

    pub fn send_have(&self, piece: u32) {
        self.send(PeerCommand::Have(piece));
    }

    /// Queues an outgoing block request. `false` means backpressure: the
    /// command queue is full (or the session is gone) and the caller should
    /// requeue the block.
    #[must_use]
    pub fn send_request(&self, request: BlockRequest) -> bool {
        self.send(PeerCommand::Request(request))
    }

    /// Queues a block for upload; `false` on backpressure.
    #[must_use]
    pub fn send_piece(&self, block: Block) -> bool {
        self.send(PeerCommand::Piece(block))
    }

    pub fn send_keep_alive(&self) {
        self.send(PeerCommand::KeepAlive);
    }

    pub fn send_extended(&self, name: &str, payload: Bytes) {
        self.send(PeerCommand::Extended {
            name: name.to_string(),
            payload,
        });
    }

    /// Asks the session to cancel an outstanding request on the wire.
    pub fn remove_request(&self, request: BlockRequest) {
        self.send(PeerCommand::Cancel(request));
    }

    pub fn register_extension(&self, name: &str) {
        self.send(PeerCommand::RegisterExtension(name.to_string()));
    }

    pub fn dispose(&self, reason: &str) {
        self.send(PeerCommand::Dispose(reason.to_string()));
    }
}
