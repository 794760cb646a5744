//! Coordinator-owned per-peer state.

use super::stats::RateEstimator;
use crate::peer::{Bitfield, BlockRequest, PeerLink};

/// Where a peer is in its lifecycle. Only `Connected` peers count toward
/// the active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    Connected,
}

/// The four BEP-3 flow-control flags for one peer pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChokeState {
    pub am_choking: bool,
    pub am_interested: bool,
    pub peer_choking: bool,
    pub peer_interested: bool,
}

impl Default for ChokeState {
    fn default() -> Self {
        Self {
            am_choking: true,
            am_interested: false,
            peer_choking: true,
            peer_interested: false,
        }
    }
}

/// Everything the coordinator tracks about one hooked peer.
///
/// Owned exclusively by the coordinator; transports only ever see the
/// [`PeerLink`] command stream.
#[derive(Debug)]
pub struct PeerHandle {
    pub link: PeerLink,
    pub state: PeerState,
    pub flags: ChokeState,
    /// The remote's advertised pieces.
    pub remote: Bitfield,
    /// Pieces the remote suggested (BEP-6), in arrival order.
    pub suggested: Vec<u32>,
    /// Blocks we have requested from this peer and not yet received.
    pub requests: Vec<BlockRequest>,
    /// Whether the remote negotiated `ut_pex`.
    pub ut_pex: bool,
    pub is_seeder: bool,
    pub download: RateEstimator,
    pub upload: RateEstimator,
}

impl PeerHandle {
    pub fn new(link: PeerLink, piece_count: usize) -> Self {
        Self {
            link,
            state: PeerState::Connecting,
            flags: ChokeState::default(),
            remote: Bitfield::new(piece_count),
            suggested: Vec::new(),
            requests: Vec::new(),
            ut_pex: false,
            is_seeder: false,
            download: RateEstimator::new(),
            upload: RateEstimator::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == PeerState::Connected
    }

    /// Records an issued request in the buffer.
    pub fn track_request(&mut self, request: BlockRequest) {
        self.requests.push(request);
    }

    /// Forgets a request (delivered, rejected, or cancelled). Returns
    /// whether it was tracked.
    pub fn untrack_request(&mut self, request: &BlockRequest) -> bool {
        match self.requests.iter().position(|r| r == request) {
            Some(pos) => {
                self.requests.swap_remove(pos);
                true
            }
            None => false,
        }
    }
}
