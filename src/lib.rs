//! swarmbit - BitTorrent peer-swarm coordination
//!
//! This library implements the state manager at the heart of a BitTorrent
//! client: it multiplexes many concurrent peers through the shared piece
//! bitfield, schedules block requests, serves uploads, exchanges peers
//! over PEX, and survives stalls, rejects, and misbehaving remotes.
//!
//! Trackers, DHT, wire framing, and disk I/O live outside; they talk to
//! the swarm through the [`peer::PeerLink`]/[`peer::PeerEvent`] contract
//! and the [`store::FileStore`] interface.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 bencode values for extension payloads
//! - [`peer`] - Peer identity, bitfields, pieces, command/event contract
//! - [`pex`] - BEP-11 Peer Exchange
//! - [`picker`] - Piece selection policies
//! - [`store`] - Storage collaborator interface
//! - [`swarm`] - The coordinator actor

pub mod bencode;
pub mod constants;
pub mod peer;
pub mod pex;
pub mod picker;
pub mod store;
pub mod swarm;

pub use bencode::{decode, encode, BencodeError, Value};
pub use peer::{
    Bitfield, Block, BlockRequest, ExtendedEvent, ExtensionHandshake, PeerCommand, PeerEvent,
    PeerId, PeerLink, Piece, PieceSet,
};
pub use pex::{PexMessage, PexState};
pub use picker::{PieceSelector, RarestFirstSelector};
pub use store::{FileStore, StoreError, StoreEvent, StoreRequest};
pub use swarm::{Swarm, SwarmConfig, SwarmCoordinator, SwarmNotice, SwarmStats};
