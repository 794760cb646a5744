//! The swarm coordinator.
//!
//! A single cooperative actor owns every piece of shared swarm state: the
//! peer set, the piece provider, the timeout table, the upload queue, PEX
//! state, pause buffers, and accounting. All mutation happens inside
//! [`SwarmCoordinator::handle_event`], which runs to completion per event;
//! the only suspension points are the awaited storage operations (bitmap
//! persist before a HAVE broadcast, flush). That discipline is what makes
//! the swarm correct without locks.
//!
//! Re-entrant work (request scheduling after an event, replays on resume)
//! is posted back onto the coordinator's own event queue instead of being
//! called inline, keeping stack depth bounded and preserving ordering
//! across pause/resume transitions.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::constants::{
    BLOCK_SIZE, FLUSH_THRESHOLD, KEEP_ALIVE_DELAY, MAX_PAUSED_REMOTE_REQUESTS,
    MAX_REMOTE_REQUESTS, MAX_REQUEST_LENGTH, PEX_INTERVAL, UPLOAD_NOTIFY_THRESHOLD,
};
use super::handle::{PeerHandle, PeerState};
use super::stats::SwarmStats;
use super::timeout::TimeoutTable;
use super::upload::UploadQueue;
use crate::peer::{
    Bitfield, Block, BlockRequest, ExtendedEvent, PeerEvent, PeerId, PeerLink, PieceSet, UT_PEX,
};
use crate::pex::{PexMessage, PexState};
use crate::picker::PieceSelector;
use crate::store::{FileStore, StoreEvent};

/// Tunables for one swarm. Defaults come from [`crate::constants`]; tests
/// shrink the timers.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    pub max_remote_requests: usize,
    pub max_paused_remote_requests: usize,
    pub max_request_length: u32,
    pub flush_threshold: u64,
    pub upload_notify_threshold: u64,
    pub pex_interval: Duration,
    pub keep_alive_delay: Duration,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_remote_requests: MAX_REMOTE_REQUESTS,
            max_paused_remote_requests: MAX_PAUSED_REMOTE_REQUESTS,
            max_request_length: MAX_REQUEST_LENGTH,
            flush_threshold: FLUSH_THRESHOLD,
            upload_notify_threshold: UPLOAD_NOTIFY_THRESHOLD,
            pex_interval: PEX_INTERVAL,
            keep_alive_delay: KEEP_ALIVE_DELAY,
        }
    }
}

/// Everything that can land on the coordinator's queue.
#[derive(Debug)]
pub(crate) enum SwarmEvent {
    Peer(PeerId, PeerEvent),
    Store(StoreEvent),
    Hook(PeerLink),
    Pause,
    Resume,
    DisposeSeeders(String),
    Shutdown,
    Stats(oneshot::Sender<SwarmStats>),
    /// Self-posted request-scheduling trigger.
    RequestPieces { peer: PeerId, hint: Option<u32> },
}

/// Notifications the swarm emits to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwarmNotice {
    /// PEX surfaced an address worth connecting to.
    PeerFound(SocketAddr),
    /// Every piece is downloaded, verified, and flushed.
    AllComplete,
    /// The last connected peer left the swarm.
    NoActivePeers,
}

/// Tagging sink a peer transport uses to report its events.
#[derive(Debug, Clone)]
pub struct PeerEvents {
    peer: PeerId,
    events: mpsc::UnboundedSender<SwarmEvent>,
}

impl PeerEvents {
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(SwarmEvent::Peer(self.peer, event));
    }
}

/// Sink the storage backend uses to report completions.
#[derive(Debug, Clone)]
pub struct StoreEvents {
    events: mpsc::UnboundedSender<SwarmEvent>,
}

impl StoreEvents {
    pub fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(SwarmEvent::Store(event));
    }
}

/// Cheap cloneable control handle to a running coordinator.
#[derive(Debug, Clone)]
pub struct Swarm {
    events: mpsc::UnboundedSender<SwarmEvent>,
}

impl Swarm {
    /// Hands a peer to the swarm. A no-op if the address is our own
    /// external IP or the peer is already hooked.
    pub fn hook_peer(&self, link: PeerLink) {
        let _ = self.events.send(SwarmEvent::Hook(link));
    }

    pub fn pause(&self) {
        let _ = self.events.send(SwarmEvent::Pause);
    }

    pub fn resume(&self) {
        let _ = self.events.send(SwarmEvent::Resume);
    }

    /// Disposes every peer whose bitfield is complete. Useful once our
    /// own download finishes.
    pub fn dispose_all_seeders(&self, reason: &str) {
        let _ = self
            .events
            .send(SwarmEvent::DisposeSeeders(reason.to_string()));
    }

    /// Tears the swarm down. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.events.send(SwarmEvent::Shutdown);
    }

    /// Snapshot of swarm throughput; `None` once the coordinator is gone.
    pub async fn stats(&self) -> Option<SwarmStats> {
        let (tx, rx) = oneshot::channel();
        self.events.send(SwarmEvent::Stats(tx)).ok()?;
        rx.await.ok()
    }

    /// Event sink for the transport behind `peer`.
    pub fn peer_events(&self, peer: PeerId) -> PeerEvents {
        PeerEvents {
            peer,
            events: self.events.clone(),
        }
    }

    /// Event sink for the storage backend.
    pub fn store_events(&self) -> StoreEvents {
        StoreEvents {
            events: self.events.clone(),
        }
    }
}

/// The coordinator actor. Construct with [`SwarmCoordinator::new`], then
/// drive it with [`run`](SwarmCoordinator::run) on a task.
pub struct SwarmCoordinator {
    config: SwarmConfig,
    events: mpsc::UnboundedReceiver<SwarmEvent>,
    events_tx: mpsc::UnboundedSender<SwarmEvent>,
    notices: mpsc::UnboundedSender<SwarmNotice>,
    store: FileStore,
    selector: Box<dyn PieceSelector>,
    pieces: PieceSet,
    peers: HashMap<PeerId, PeerHandle>,
    timeouts: TimeoutTable,
    uploads: UploadQueue,
    pex: PexState,
    external_ip: Option<IpAddr>,
    paused: bool,
    deferred_requests: VecDeque<(PeerId, Option<u32>)>,
    deferred_remote: HashMap<PeerId, VecDeque<BlockRequest>>,
    /// Completed pieces not yet flushed. Every index here is already set
    /// in the local bitfield.
    dirty_pieces: HashSet<u32>,
    uploaded_total: u64,
    uploaded_delta: u64,
    keep_alive_at: Option<Instant>,
    disposed: bool,
}

impl SwarmCoordinator {
    /// Builds a coordinator over `store` using `selector` for piece
    /// choice. Returns the control handle, the notice stream, and the
    /// actor itself.
    pub fn new(
        config: SwarmConfig,
        store: FileStore,
        selector: Box<dyn PieceSelector>,
    ) -> (Swarm, mpsc::UnboundedReceiver<SwarmNotice>, Self) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let pieces = PieceSet::missing(
            store.piece_count(),
            store.piece_length(),
            store.total_length(),
            &store.bitfield(),
        );
        let coordinator = Self {
            config,
            events,
            events_tx: events_tx.clone(),
            notices: notices_tx,
            store,
            selector,
            pieces,
            peers: HashMap::new(),
            timeouts: TimeoutTable::new(),
            uploads: UploadQueue::new(),
            pex: PexState::new(),
            external_ip: None,
            paused: false,
            deferred_requests: VecDeque::new(),
            deferred_remote: HashMap::new(),
            dirty_pieces: HashSet::new(),
            uploaded_total: 0,
            uploaded_delta: 0,
            keep_alive_at: None,
            disposed: false,
        };
        (Swarm { events: events_tx }, notices_rx, coordinator)
    }

    /// Drives the actor until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        let mut pex_timer = tokio::time::interval(self.config.pex_interval);
        pex_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        pex_timer.tick().await;

        while !self.disposed {
            let keep_alive_at = self.keep_alive_at;
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                _ = pex_timer.tick() => self.pex_tick(),
                _ = tokio::time::sleep_until(keep_alive_at.unwrap_or_else(Instant::now)),
                    if keep_alive_at.is_some() =>
                {
                    self.broadcast_keep_alive();
                }
            }
        }
    }

    pub(crate) async fn handle_event(&mut self, event: SwarmEvent) {
        if self.disposed {
            return;
        }
        match event {
            SwarmEvent::Peer(peer, event) => self.on_peer_event(peer, event),
            SwarmEvent::Store(event) => self.on_store_event(event).await,
            SwarmEvent::Hook(link) => self.hook_peer(link),
            SwarmEvent::Pause => self.pause(),
            SwarmEvent::Resume => self.resume(),
            SwarmEvent::DisposeSeeders(reason) => self.dispose_all_seeders(&reason),
            SwarmEvent::Shutdown => self.shutdown().await,
            SwarmEvent::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            SwarmEvent::RequestPieces { peer, hint } => self.request_pieces(peer, hint),
        }
    }

    fn on_peer_event(&mut self, peer: PeerId, event: PeerEvent) {
        if !self.peers.contains_key(&peer) {
            return;
        }
        match event {
            PeerEvent::Connected => self.on_connected(peer),
            PeerEvent::Handshake => self.on_handshake(peer),
            PeerEvent::Bitfield(bitfield) => self.on_bitfield(peer, bitfield),
            PeerEvent::HaveAll => {
                let full = Bitfield::full(self.store.piece_count());
                self.on_bitfield(peer, full);
            }
            PeerEvent::HaveNone => {
                let empty = Bitfield::new(self.store.piece_count());
                self.on_bitfield(peer, empty);
            }
            PeerEvent::Have(piece) => self.on_have(peer, piece),
            PeerEvent::ChokeChange(choked) => self.on_choke_change(peer, choked),
            PeerEvent::InterestedChange(interested) => {
                self.on_interested_change(peer, interested);
            }
            PeerEvent::AllowFast(piece) => self.on_allow_fast(peer, piece),
            PeerEvent::Suggest(piece) => self.on_suggest(peer, piece),
            PeerEvent::Request(request) => self.on_remote_request(peer, request),
            PeerEvent::Piece(block) => self.on_block(peer, block),
            PeerEvent::RequestTimeout(request) => self.on_request_timeout(peer, request),
            PeerEvent::Reject(request) => self.on_reject(peer, request),
            PeerEvent::Extended(event) => self.on_extended(peer, event),
            PeerEvent::Disposed(reason) => self.dispose_peer(peer, &reason),
        }
    }

    async fn on_store_event(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::BlockWritten {
                piece,
                begin,
                length,
            } => self.selector.on_block_written(piece, begin, length),
            StoreEvent::BlockRead(block) => self.on_block_read(block),
            StoreEvent::PieceComplete(piece) => self.on_piece_complete(piece).await,
        }
    }

    // ------------------------------------------------------------------
    // Peer lifecycle
    // ------------------------------------------------------------------

    fn hook_peer(&mut self, link: PeerLink) {
        if self.external_ip == Some(link.addr().ip()) {
            debug!(addr = %link.addr(), "not hooking our own address");
            return;
        }
        if self.peers.contains_key(&link.id()) {
            return;
        }
        trace!(peer = %link.id(), addr = %link.addr(), "hooking peer");
        link.register_extension(UT_PEX);
        link.connect();
        let piece_count = self.store.piece_count();
        self.peers.insert(link.id(), PeerHandle::new(link, piece_count));
    }

    fn on_connected(&mut self, peer: PeerId) {
        if let Some(handle) = self.peers.get_mut(&peer) {
            handle.state = PeerState::Connected;
            handle.link.send_handshake();
        }
    }

    fn on_handshake(&mut self, peer: PeerId) {
        let bitfield = self.store.bitfield();
        if let Some(handle) = self.peers.get(&peer) {
            handle.link.send_bitfield(bitfield);
        }
    }

    fn dispose_peer(&mut self, peer: PeerId, reason: &str) {
        let Some(handle) = self.peers.remove(&peer) else {
            return;
        };
        debug!(peer = %peer, reason, "disposing peer");
        handle.link.dispose(reason);

        // Every in-flight request goes back to the head of its piece's
        // queue for a quick retry; parked copies are dropped with it.
        for request in &handle.requests {
            self.timeouts.remove(*request);
            if let Some(piece) = self.pieces.get_mut(request.piece) {
                piece.requeue_front(request.ordinal());
            }
        }

        self.pieces.remove_peer(&peer);
        self.uploads.remove_peer(&peer);
        self.deferred_remote.remove(&peer);
        self.deferred_requests.retain(|(p, _)| *p != peer);

        if handle.is_connected()
            && !self.disposed
            && !self.peers.values().any(PeerHandle::is_connected)
        {
            let _ = self.notices.send(SwarmNotice::NoActivePeers);
        }
    }

    fn dispose_all_seeders(&mut self, reason: &str) {
        let seeders: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, handle)| handle.is_seeder)
            .map(|(id, _)| *id)
            .collect();
        for peer in seeders {
            self.dispose_peer(peer, reason);
        }
    }

    // ------------------------------------------------------------------
    // Download side
    // ------------------------------------------------------------------

    fn on_bitfield(&mut self, peer: PeerId, bitfield: Bitfield) {
        let local = self.store.bitfield();
        let interested = bitfield.ones().any(|index| !local.has(index));
        let Some(handle) = self.peers.get_mut(&peer) else {
            return;
        };
        handle.is_seeder = bitfield.is_complete();
        handle.remote = bitfield;
        handle.flags.am_interested = interested;
        handle.link.send_interested(interested);
    }

    fn on_have(&mut self, peer: PeerId, piece: u32) {
        let have_locally = self.store.has_piece(piece);
        let Some(handle) = self.peers.get_mut(&peer) else {
            return;
        };
        handle.remote.set(piece as usize);
        handle.is_seeder = handle.remote.is_complete();
        if have_locally {
            return;
        }
        if !handle.flags.am_interested {
            handle.flags.am_interested = true;
            handle.link.send_interested(true);
        }
        if let Some(entry) = self.pieces.get_mut(piece) {
            entry.add_peer(peer);
        }
        let _ = self.events_tx.send(SwarmEvent::RequestPieces {
            peer,
            hint: Some(piece),
        });
    }

    fn on_choke_change(&mut self, peer: PeerId, choked: bool) {
        let Some(handle) = self.peers.get_mut(&peer) else {
            return;
        };
        handle.flags.peer_choking = choked;
        if choked {
            // In-flight requests stay out; a choking peer may still
            // deliver them, and timeouts recover the rest.
            for index in handle.remote.ones() {
                if let Some(piece) = self.pieces.get_mut(index as u32) {
                    piece.remove_peer(&peer);
                }
            }
        } else {
            for index in handle.remote.ones() {
                if let Some(piece) = self.pieces.get_mut(index as u32) {
                    piece.add_peer(peer);
                }
            }
            let _ = self
                .events_tx
                .send(SwarmEvent::RequestPieces { peer, hint: None });
        }
    }

    fn on_interested_change(&mut self, peer: PeerId, interested: bool) {
        // Unchoke anyone interested in us; no fairness algorithm.
        let Some(handle) = self.peers.get_mut(&peer) else {
            return;
        };
        handle.flags.peer_interested = interested;
        handle.flags.am_choking = !interested;
        handle.link.send_choke(!interested);
    }

    fn on_allow_fast(&mut self, peer: PeerId, index: u32) {
        // BEP-6: this piece may be fetched despite being choked.
        let Some(piece) = self.pieces.get_mut(index) else {
            return;
        };
        if !piece.has_queued_blocks() {
            return;
        }
        piece.add_peer(peer);
        self.request_pieces(peer, Some(index));
    }

    fn on_suggest(&mut self, peer: PeerId, index: u32) {
        if let Some(handle) = self.peers.get_mut(&peer) {
            if !handle.suggested.contains(&index) {
                handle.suggested.push(index);
            }
        }
    }

    fn on_request_timeout(&mut self, peer: PeerId, request: BlockRequest) {
        trace!(peer = %peer, ?request, "request timed out");
        self.timeouts.add(request, peer);
    }

    fn on_reject(&mut self, peer: PeerId, request: BlockRequest) {
        let tracked = self
            .peers
            .get_mut(&peer)
            .map(|handle| handle.untrack_request(&request))
            .unwrap_or(false);
        if !tracked {
            return;
        }
        self.timeouts.remove(request);
        if let Some(piece) = self.pieces.get_mut(request.piece) {
            piece.requeue_back(request.ordinal());
        }
    }

    fn on_block(&mut self, peer: PeerId, block: Block) {
        let request = block.request();
        let Some(handle) = self.peers.get_mut(&peer) else {
            return;
        };
        handle.untrack_request(&request);
        handle.download.record(block.data.len() as u64);
        let remote = handle.remote.clone();

        // A late delivery for a parked request: cancel the stale copy on
        // whichever peer it was re-issued from.
        if let Some(stalled) = self.timeouts.remove(request) {
            if stalled.origin != peer {
                if let Some(origin) = self.peers.get(&stalled.origin) {
                    origin.link.remove_request(request);
                }
            }
        }

        self.store.write(block);

        let next = self.selector.select_piece_on_block(
            &peer,
            &remote,
            &self.pieces,
            request.piece,
            request.begin,
        );
        let _ = self
            .events_tx
            .send(SwarmEvent::RequestPieces { peer, hint: next });
    }

    /// The request-issuing core. `hint` pins the piece; otherwise the
    /// selector chooses. With nothing fresh to fetch, the oldest stalled
    /// request is re-issued to this peer.
    fn request_pieces(&mut self, peer: PeerId, hint: Option<u32>) {
        if self.paused {
            self.deferred_requests.push_back((peer, hint));
            return;
        }
        if !self.peers.contains_key(&peer) {
            return;
        }

        let index = match hint {
            Some(index) => self.pieces.get(index).map(|_| index),
            None => {
                let handle = &self.peers[&peer];
                self.selector
                    .select_piece(&peer, &handle.remote, &self.pieces, &handle.suggested)
            }
        };

        let Some(index) = index else {
            self.reissue_stalled(peer);
            return;
        };

        let Some(piece) = self.pieces.get_mut(index) else {
            return;
        };
        let Some(ordinal) = piece.next_block() else {
            return;
        };
        let request = BlockRequest::new(index, ordinal * BLOCK_SIZE, piece.block_length(ordinal));

        let Some(handle) = self.peers.get_mut(&peer) else {
            piece.requeue_front(ordinal);
            return;
        };
        if handle.link.send_request(request) {
            handle.track_request(request);
        } else {
            piece.requeue_front(ordinal);
        }
    }

    fn reissue_stalled(&mut self, peer: PeerId) {
        let Some(stalled) = self.timeouts.pop_front() else {
            return;
        };
        // Best-effort cancel on the origin; it may be long gone.
        if stalled.origin != peer {
            if let Some(origin) = self.peers.get(&stalled.origin) {
                origin.link.remove_request(stalled.request);
            }
        }
        let Some(handle) = self.peers.get_mut(&peer) else {
            self.timeouts.push_front(stalled);
            return;
        };
        if handle.link.send_request(stalled.request) {
            handle.track_request(stalled.request);
        } else {
            self.timeouts.push_front(stalled);
        }
    }

    // ------------------------------------------------------------------
    // Upload side
    // ------------------------------------------------------------------

    fn on_remote_request(&mut self, peer: PeerId, request: BlockRequest) {
        if request.length > self.config.max_request_length {
            warn!(peer = %peer, length = request.length, "oversized request");
            self.dispose_peer(peer, "request too large");
            return;
        }

        if self.paused {
            let buffered = self
                .deferred_remote
                .get(&peer)
                .map(VecDeque::len)
                .unwrap_or(0);
            if buffered >= self.config.max_paused_remote_requests {
                self.dispose_peer(peer, "too many requests");
            } else {
                self.deferred_remote
                    .entry(peer)
                    .or_default()
                    .push_back(request);
            }
            return;
        }

        if self.uploads.count_for(&peer) >= self.config.max_remote_requests {
            warn!(peer = %peer, "remote request cap exceeded");
            self.dispose_peer(peer, "too many requests");
            return;
        }

        self.uploads.enqueue(request.piece, request.begin, peer);
        self.store.read(request);
    }

    fn on_block_read(&mut self, block: Block) {
        let Some(owner) = self.uploads.complete(block.piece, block.begin) else {
            trace!(piece = block.piece, begin = block.begin, "read with no waiter");
            return;
        };
        let Some(handle) = self.peers.get_mut(&owner) else {
            return;
        };
        if !handle.is_connected() {
            return;
        }
        let length = block.data.len() as u64;
        if handle.link.send_piece(block) {
            handle.upload.record(length);
            self.uploaded_total += length;
            self.uploaded_delta += length;
            if self.uploaded_delta >= self.config.upload_notify_threshold {
                self.uploaded_delta = 0;
                self.store.record_uploaded(self.uploaded_total);
            }
        }
    }

    // ------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------

    async fn on_piece_complete(&mut self, piece: u32) {
        if self.store.has_piece(piece) {
            return;
        }
        // The on-disk bitmap must be ahead of the HAVE broadcast; a peer
        // reacting to the HAVE may request the piece immediately.
        if let Err(error) = self.store.persist_piece(piece).await {
            warn!(piece, %error, "failed to persist completed piece");
            self.shutdown().await;
            return;
        }
        debug!(piece, "piece complete");
        self.pieces.remove(piece);

        for handle in self.peers.values().filter(|h| h.is_connected()) {
            handle.link.send_have(piece);
        }

        self.dirty_pieces.insert(piece);
        let all_complete = self.store.is_complete();
        let dirty_bytes = self.dirty_pieces.len() as u64 * u64::from(self.store.piece_length());
        if all_complete || dirty_bytes >= self.config.flush_threshold {
            let pieces: Vec<u32> = self.dirty_pieces.drain().collect();
            if let Err(error) = self.store.flush(pieces).await {
                warn!(%error, "flush failed");
                self.shutdown().await;
                return;
            }
        }
        if all_complete {
            let _ = self.notices.send(SwarmNotice::AllComplete);
        }
    }

    // ------------------------------------------------------------------
    // Extension protocol
    // ------------------------------------------------------------------

    fn on_extended(&mut self, peer: PeerId, event: ExtendedEvent) {
        match event {
            ExtendedEvent::Handshake(handshake) => {
                if let Some(ip) = handshake.yourip {
                    self.external_ip = Some(ip);
                }
                if let Some(handle) = self.peers.get_mut(&peer) {
                    handle.ut_pex = handshake.supports(UT_PEX);
                }
            }
            ExtendedEvent::Message { name, payload } if name == UT_PEX => {
                match PexMessage::from_payload(&payload) {
                    Ok(message) => {
                        for addr in message.added_addrs() {
                            if self.external_ip == Some(addr.ip()) {
                                continue;
                            }
                            let _ = self.notices.send(SwarmNotice::PeerFound(addr));
                        }
                    }
                    Err(error) => debug!(peer = %peer, %error, "bad pex payload"),
                }
            }
            ExtendedEvent::Message { name, .. } => {
                trace!(peer = %peer, name, "unhandled extension message");
            }
        }
    }

    pub(crate) fn pex_tick(&mut self) {
        let current: HashSet<SocketAddr> = self
            .peers
            .values()
            .filter(|h| h.is_connected())
            .map(|h| h.link.addr())
            .collect();
        let Some(message) = self.pex.diff(&current) else {
            return;
        };
        trace!(
            added = message.added.len() + message.added6.len(),
            dropped = message.dropped.len() + message.dropped6.len(),
            "pex round"
        );
        let payload = message.to_payload();
        for handle in self
            .peers
            .values()
            .filter(|h| h.is_connected() && h.ut_pex)
        {
            handle.link.send_extended(UT_PEX, payload.clone());
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn pause(&mut self) {
        debug!("swarm paused");
        self.paused = true;
        // One keep-alive broadcast before the 120s idle timeout would
        // drop the connections; rescheduling replaces any earlier timer.
        self.keep_alive_at = Some(Instant::now() + self.config.keep_alive_delay);
    }

    fn resume(&mut self) {
        debug!("swarm resumed");
        self.paused = false;
        self.keep_alive_at = None;
        for (peer, hint) in self.deferred_requests.drain(..) {
            let _ = self.events_tx.send(SwarmEvent::RequestPieces { peer, hint });
        }
        for (peer, queue) in self.deferred_remote.drain() {
            for request in queue {
                let _ = self
                    .events_tx
                    .send(SwarmEvent::Peer(peer, PeerEvent::Request(request)));
            }
        }
    }

    fn broadcast_keep_alive(&mut self) {
        self.keep_alive_at = None;
        for handle in self.peers.values().filter(|h| h.is_connected()) {
            handle.link.send_keep_alive();
        }
    }

    async fn shutdown(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        debug!("swarm shutting down");

        if !self.dirty_pieces.is_empty() {
            let pieces: Vec<u32> = self.dirty_pieces.drain().collect();
            if let Err(error) = self.store.flush(pieces).await {
                warn!(%error, "final flush failed");
            }
        }

        let peers: Vec<PeerId> = self.peers.keys().copied().collect();
        for peer in peers {
            self.dispose_peer(peer, "swarm disposed");
        }

        self.timeouts = TimeoutTable::new();
        self.uploads.clear();
        self.deferred_requests.clear();
        self.deferred_remote.clear();
        self.keep_alive_at = None;
    }

    fn stats(&mut self) -> SwarmStats {
        let mut stats = SwarmStats {
            uploaded: self.uploaded_total,
            pending_pieces: self.pieces.len(),
            ..Default::default()
        };
        for handle in self
            .peers
            .values_mut()
            .filter(|h| h.state == PeerState::Connected)
        {
            stats.active_peers += 1;
            stats.download_rate += handle.download.rate();
            stats.upload_rate += handle.upload.rate();
        }
        stats
    }

    #[cfg(test)]
    pub(crate) async fn drain_queued(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event).await;
        }
    }

    #[cfg(test)]
    pub(crate) fn peer(&self, peer: &PeerId) -> Option<&PeerHandle> {
        self.peers.get(peer)
    }

    #[cfg(test)]
    pub(crate) fn timeouts(&self) -> &TimeoutTable {
        &self.timeouts
    }

    #[cfg(test)]
    pub(crate) fn uploads(&self) -> &UploadQueue {
        &self.uploads
    }

    #[cfg(test)]
    pub(crate) fn pieces(&self) -> &PieceSet {
        &self.pieces
    }

    #[cfg(test)]
    pub(crate) fn keep_alive_scheduled(&self) -> bool {
        self.keep_alive_at.is_some()
    }

    #[cfg(test)]
    pub(crate) fn dirty_pieces(&self) -> &HashSet<u32> {
        &self.dirty_pieces
    }
}
