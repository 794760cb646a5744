//! Interface to the file/piece storage collaborator.
//!
//! The storage engine itself (disk layout, hashing, fsync) lives outside
//! this crate. [`FileStore`] is the coordinator-facing handle: synchronous
//! reads of the shared local bitfield and piece geometry, fire-and-forget
//! block I/O submissions, and two awaited operations whose ordering the
//! swarm depends on: persisting a piece's bitfield bit before HAVE is
//! broadcast, and flushing completed pieces.
//!
//! Completions come back as [`StoreEvent`]s on the swarm's event queue.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::peer::{Bitfield, Block, BlockRequest};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend task is gone; no storage operation can complete.
    #[error("storage backend closed")]
    Closed,

    /// The backend reported a failed operation.
    #[error("storage operation failed: {0}")]
    Failed(String),
}

/// A request the storage backend must service.
#[derive(Debug)]
pub enum StoreRequest {
    /// Write a downloaded block. Completion arrives as
    /// [`StoreEvent::BlockWritten`]; piece verification is the backend's
    /// job and surfaces as [`StoreEvent::PieceComplete`].
    Write(Block),
    /// Read a block for upload. Completion arrives as
    /// [`StoreEvent::BlockRead`].
    Read(BlockRequest),
    /// Persist the on-disk bitmap bit for a completed piece, then ack.
    PersistPiece {
        piece: u32,
        ack: oneshot::Sender<Result<(), StoreError>>,
    },
    /// Durably flush the listed pieces, then ack.
    Flush {
        pieces: Vec<u32>,
        ack: oneshot::Sender<Result<(), StoreError>>,
    },
    /// The total-uploaded counter crossed a persistence threshold.
    RecordUploaded(u64),
}

/// A completion the backend reports to the swarm.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    BlockWritten { piece: u32, begin: u32, length: u32 },
    BlockRead(Block),
    /// A piece was fully written and passed hash verification.
    PieceComplete(u32),
}

#[derive(Debug)]
struct Geometry {
    piece_length: u32,
    total_length: u64,
}

/// Coordinator-side handle to piece storage.
#[derive(Debug, Clone)]
pub struct FileStore {
    requests: mpsc::UnboundedSender<StoreRequest>,
    bitfield: Arc<RwLock<Bitfield>>,
    geometry: Arc<Geometry>,
}

impl FileStore {
    /// Creates the handle plus the request stream a backend drains.
    /// `have` seeds the local bitfield (resume data).
    pub fn new(
        piece_length: u32,
        total_length: u64,
        have: Bitfield,
    ) -> (Self, mpsc::UnboundedReceiver<StoreRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                requests: tx,
                bitfield: Arc::new(RwLock::new(have)),
                geometry: Arc::new(Geometry {
                    piece_length,
                    total_length,
                }),
            },
            rx,
        )
    }

    pub fn piece_count(&self) -> usize {
        self.bitfield.read().piece_count()
    }

    pub fn piece_length(&self) -> u32 {
        self.geometry.piece_length
    }

    pub fn total_length(&self) -> u64 {
        self.geometry.total_length
    }

    /// Byte length of piece `index`; the final piece may be short.
    pub fn piece_size(&self, index: u32) -> u32 {
        let start = u64::from(index) * u64::from(self.geometry.piece_length);
        let remaining = self.geometry.total_length.saturating_sub(start);
        u64::from(self.geometry.piece_length).min(remaining) as u32
    }

    pub fn has_piece(&self, index: u32) -> bool {
        self.bitfield.read().has(index as usize)
    }

    /// Snapshot of the local bitfield.
    pub fn bitfield(&self) -> Bitfield {
        self.bitfield.read().clone()
    }

    pub fn is_complete(&self) -> bool {
        self.bitfield.read().is_complete()
    }

    /// Submits a block write. Fire-and-forget; loss means the backend is
    /// gone and a later awaited operation will surface the failure.
    pub fn write(&self, block: Block) {
        let _ = self.requests.send(StoreRequest::Write(block));
    }

    /// Submits a block read for upload.
    pub fn read(&self, request: BlockRequest) {
        let _ = self.requests.send(StoreRequest::Read(request));
    }

    pub fn record_uploaded(&self, total: u64) {
        let _ = self.requests.send(StoreRequest::RecordUploaded(total));
    }

    /// Persists the completed piece in the on-disk bitmap and only then
    /// marks it in the shared bitfield, so a HAVE broadcast can never get
    /// ahead of durable state.
    pub async fn persist_piece(&self, piece: u32) -> Result<(), StoreError> {
        let (ack, done) = oneshot::channel();
        self.requests
            .send(StoreRequest::PersistPiece { piece, ack })
            .map_err(|_| StoreError::Closed)?;
        done.await.map_err(|_| StoreError::Closed)??;
        self.bitfield.write().set(piece as usize);
        Ok(())
    }

    /// Flushes the listed pieces to durable storage.
    pub async fn flush(&self, pieces: Vec<u32>) -> Result<(), StoreError> {
        let (ack, done) = oneshot::channel();
        self.requests
            .send(StoreRequest::Flush { pieces, ack })
            .map_err(|_| StoreError::Closed)?;
        done.await.map_err(|_| StoreError::Closed)?
    }
}
