//! Piece selection.
//!
//! The coordinator delegates "what should this peer fetch next" to a
//! [`PieceSelector`]. The default is rarest-first over the availability
//! sets; swapping in another policy (sequential for streaming, say) is a
//! matter of implementing the trait.

use crate::peer::{Bitfield, PeerId, PieceSet};

/// Chooses pieces for peers.
///
/// Implementations see the provider of incomplete pieces and the remote's
/// advertised bitfield; they must only return pieces that still have
/// queued blocks.
pub trait PieceSelector: Send {
    /// Picks the next piece `peer` should download, or `None` when nothing
    /// suitable remains.
    fn select_piece(
        &mut self,
        peer: &PeerId,
        remote: &Bitfield,
        pieces: &PieceSet,
        suggested: &[u32],
    ) -> Option<u32>;

    /// Picks a follow-up piece right after a block for `piece` arrived
    /// from `peer`. The default sticks with the same piece while it has
    /// blocks left, then falls back to a fresh selection.
    fn select_piece_on_block(
        &mut self,
        peer: &PeerId,
        remote: &Bitfield,
        pieces: &PieceSet,
        piece: u32,
        _begin: u32,
    ) -> Option<u32> {
        match pieces.get(piece) {
            Some(p) if p.has_queued_blocks() => Some(piece),
            _ => self.select_piece(peer, remote, pieces, &[]),
        }
    }

    /// Notification that a block reached storage. Selectors tracking
    /// per-piece progress can hook this; the default ignores it.
    fn on_block_written(&mut self, _piece: u32, _begin: u32, _length: u32) {}
}

/// Rarest-first selection.
///
/// Considers pieces whose availability set contains the asking peer and
/// which still have queued blocks; among those, suggested pieces win,
/// then the piece served by the fewest peers (ties broken by lowest
/// index, which keeps selection deterministic for tests).
#[derive(Debug, Default)]
pub struct RarestFirstSelector;

impl RarestFirstSelector {
    pub fn new() -> Self {
        Self
    }

    fn eligible(pieces: &PieceSet, peer: &PeerId, index: u32) -> bool {
        pieces
            .get(index)
            .is_some_and(|p| p.has_peer(peer) && p.has_queued_blocks())
    }
}

impl PieceSelector for RarestFirstSelector {
    fn select_piece(
        &mut self,
        peer: &PeerId,
        _remote: &Bitfield,
        pieces: &PieceSet,
        suggested: &[u32],
    ) -> Option<u32> {
        if let Some(&index) = suggested
            .iter()
            .find(|&&index| Self::eligible(pieces, peer, index))
        {
            return Some(index);
        }

        pieces
            .iter()
            .filter(|p| p.has_peer(peer) && p.has_queued_blocks())
            .map(|p| (p.peer_count(), p.index()))
            .min()
            .map(|(_, index)| index)
    }
}
