//! Protocol constants and tuning parameters.
//!
//! All swarm-level constants live here: block geometry, per-peer caps,
//! flush and accounting thresholds, and the coordinator's timer periods.

use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// Client ID prefix for peer ID generation (Azureus-style)
pub const CLIENT_PREFIX: &[u8] = b"-SB0001-";

// ============================================================================
// Block and piece sizes
// ============================================================================

/// Standard sub-piece (block) size: the unit of wire request/piece messages.
pub const BLOCK_SIZE: u32 = 16384;

/// Maximum serviceable inbound request length per BEP-3 (128KB).
/// A remote asking for more gets its connection closed.
pub const MAX_REQUEST_LENGTH: u32 = 131072;

// ============================================================================
// Peer limits
// ============================================================================

/// Maximum peers the coordinator will track at once. Enforced by the
/// collaborator that hands peers to `hook_peer`.
pub const MAX_ACTIVE_PEERS: usize = 50;

/// Maximum in-flight remote (upload-side) requests per peer. A peer that
/// exceeds this is disposed.
pub const MAX_REMOTE_REQUESTS: usize = 6;

/// Maximum remote requests buffered per peer while paused; one more than
/// this disposes the peer.
pub const MAX_PAUSED_REMOTE_REQUESTS: usize = 6;

/// Capacity of each peer's outbound command channel. A full channel is
/// reported to the coordinator as send backpressure.
pub const PEER_COMMAND_CAPACITY: usize = 64;

// ============================================================================
// Thresholds
// ============================================================================

/// Bytes of completed-but-unflushed pieces that trigger a storage flush.
pub const FLUSH_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Uploaded bytes between persistence notifications.
pub const UPLOAD_NOTIFY_THRESHOLD: u64 = 10 * 1024 * 1024;

// ============================================================================
// Timers
// ============================================================================

/// Period between PEX gossip rounds (BEP-11).
pub const PEX_INTERVAL: Duration = Duration::from_secs(60);

/// Delay after pause() before a single keep-alive broadcast. The BitTorrent
/// idle timeout is 120s; 110s leaves headroom.
pub const KEEP_ALIVE_DELAY: Duration = Duration::from_secs(110);

/// Window over which per-peer transfer rates are averaged.
pub const RATE_WINDOW: Duration = Duration::from_secs(5);
