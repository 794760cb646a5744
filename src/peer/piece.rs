//! Piece download bookkeeping.
//!
//! A [`Piece`] tracks which of its fixed-size blocks still need to be
//! requested and which peers can currently serve it. A [`PieceSet`] holds
//! the pieces we do not have yet and is the provider handed to piece
//! selection.

use std::collections::{HashMap, HashSet, VecDeque};

use bytes::Bytes;

use super::bitfield::Bitfield;
use super::peer_id::PeerId;
use crate::constants::BLOCK_SIZE;

/// A request for one block of a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    /// Piece index.
    pub piece: u32,
    /// Byte offset within the piece.
    pub begin: u32,
    /// Block length in bytes.
    pub length: u32,
}

impl BlockRequest {
    pub fn new(piece: u32, begin: u32, length: u32) -> Self {
        Self {
            piece,
            begin,
            length,
        }
    }

    /// The block ordinal within its piece.
    pub fn ordinal(&self) -> u32 {
        self.begin / BLOCK_SIZE
    }
}

/// A delivered block of piece data.
#[derive(Debug, Clone)]
pub struct Block {
    pub piece: u32,
    pub begin: u32,
    pub data: Bytes,
}

impl Block {
    pub fn new(piece: u32, begin: u32, data: Bytes) -> Self {
        Self { piece, begin, data }
    }

    pub fn request(&self) -> BlockRequest {
        BlockRequest::new(self.piece, self.begin, self.data.len() as u32)
    }
}

/// Download state of a single incomplete piece.
///
/// Blocks to request are kept in a FIFO of ordinals. Receiving-side retry
/// policy is expressed through which end an ordinal is returned to:
/// `requeue_front` for quick retry after transport backpressure or a peer
/// loss, `requeue_back` to deprioritize a rejected block.
#[derive(Debug)]
pub struct Piece {
    index: u32,
    byte_length: u32,
    queue: VecDeque<u32>,
    peers: HashSet<PeerId>,
}

impl Piece {
    pub fn new(index: u32, byte_length: u32) -> Self {
        let block_count = byte_length.div_ceil(BLOCK_SIZE);
        Self {
            index,
            byte_length,
            queue: (0..block_count).collect(),
            peers: HashSet::new(),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn byte_length(&self) -> u32 {
        self.byte_length
    }

    pub fn block_count(&self) -> u32 {
        self.byte_length.div_ceil(BLOCK_SIZE)
    }

    /// Length of block `ordinal`; the final block is truncated.
    pub fn block_length(&self, ordinal: u32) -> u32 {
        BLOCK_SIZE.min(self.byte_length - ordinal * BLOCK_SIZE)
    }

    /// Pops the next block ordinal to request.
    pub fn next_block(&mut self) -> Option<u32> {
        self.queue.pop_front()
    }

    /// Returns an ordinal to the head of the queue (retry soon).
    pub fn requeue_front(&mut self, ordinal: u32) {
        self.queue.push_front(ordinal);
    }

    /// Returns an ordinal to the tail of the queue (deprioritize).
    pub fn requeue_back(&mut self, ordinal: u32) {
        self.queue.push_back(ordinal);
    }

    pub fn has_queued_blocks(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn add_peer(&mut self, peer: PeerId) {
        self.peers.insert(peer);
    }

    pub fn remove_peer(&mut self, peer: &PeerId) {
        self.peers.remove(peer);
    }

    pub fn has_peer(&self, peer: &PeerId) -> bool {
        self.peers.contains(peer)
    }

    /// Number of peers registered as able to serve this piece.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

/// The set of pieces still to download, indexed by piece number.
///
/// Acts as the piece provider: lookups for unknown (already complete or
/// out-of-range) indices return `None`.
#[derive(Debug, Default)]
pub struct PieceSet {
    pieces: HashMap<u32, Piece>,
}

impl PieceSet {
    /// Builds the set of missing pieces for a torrent with `piece_count`
    /// pieces of `piece_length` bytes (`total_length` over all pieces),
    /// skipping indices already present in `have`.
    pub fn missing(
        piece_count: usize,
        piece_length: u32,
        total_length: u64,
        have: &Bitfield,
    ) -> Self {
        let mut pieces = HashMap::new();
        for index in 0..piece_count as u32 {
            if have.has(index as usize) {
                continue;
            }
            let remaining =
                total_length.saturating_sub(u64::from(index) * u64::from(piece_length));
            let byte_length = u64::from(piece_length).min(remaining) as u32;
            pieces.insert(index, Piece::new(index, byte_length));
        }
        Self { pieces }
    }

    pub fn insert(&mut self, piece: Piece) {
        self.pieces.insert(piece.index(), piece);
    }

    pub fn get(&self, index: u32) -> Option<&Piece> {
        self.pieces.get(&index)
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut Piece> {
        self.pieces.get_mut(&index)
    }

    pub fn remove(&mut self, index: u32) -> Option<Piece> {
        self.pieces.remove(&index)
    }

    /// Drops `peer` from every piece's availability set.
    pub fn remove_peer(&mut self, peer: &PeerId) {
        for piece in self.pieces.values_mut() {
            piece.remove_peer(peer);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Piece> {
        self.pieces.values()
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_queue_order() {
        let mut piece = Piece::new(0, 3 * BLOCK_SIZE);
        assert_eq!(piece.next_block(), Some(0));
        assert_eq!(piece.next_block(), Some(1));
        piece.requeue_front(1);
        assert_eq!(piece.next_block(), Some(1));
        piece.requeue_back(0);
        assert_eq!(piece.next_block(), Some(2));
        assert_eq!(piece.next_block(), Some(0));
        assert!(!piece.has_queued_blocks());
    }

    #[test]
    fn test_final_block_truncated() {
        let piece = Piece::new(7, 2 * BLOCK_SIZE + 100);
        assert_eq!(piece.block_count(), 3);
        assert_eq!(piece.block_length(0), BLOCK_SIZE);
        assert_eq!(piece.block_length(2), 100);
    }

    #[test]
    fn test_availability() {
        let mut piece = Piece::new(0, BLOCK_SIZE);
        let a = PeerId::generate();
        let b = PeerId::generate();
        piece.add_peer(a);
        piece.add_peer(a);
        piece.add_peer(b);
        assert_eq!(piece.peer_count(), 2);
        piece.remove_peer(&a);
        assert!(!piece.has_peer(&a));
        assert!(piece.has_peer(&b));
    }

    #[test]
    fn test_missing_skips_held_pieces() {
        let mut have = Bitfield::new(4);
        have.set(1);
        let set = PieceSet::missing(4, BLOCK_SIZE, 3 * u64::from(BLOCK_SIZE) + 10, &have);
        assert_eq!(set.len(), 3);
        assert!(set.get(1).is_none());
        // Final piece carries only the leftover bytes.
        assert_eq!(set.get(3).unwrap().byte_length(), 10);
    }

    #[test]
    fn test_remove_peer_scrubs_all_pieces() {
        let mut set = PieceSet::missing(3, BLOCK_SIZE, 3 * u64::from(BLOCK_SIZE), &Bitfield::new(3));
        let peer = PeerId::generate();
        for index in 0..3 {
            set.get_mut(index).unwrap().add_peer(peer);
        }
        set.remove_peer(&peer);
        assert!(set.iter().all(|p| p.peer_count() == 0));
    }
}
