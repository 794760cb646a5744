//! Swarm coordination: the single-actor hub that drives downloads,
//! serves uploads, and keeps per-peer state consistent.

mod coordinator;
mod handle;
mod stats;
mod timeout;
mod upload;

pub use coordinator::{PeerEvents, StoreEvents, Swarm, SwarmConfig, SwarmCoordinator, SwarmNotice};
pub use handle::{ChokeState, PeerHandle, PeerState};
pub use stats::{RateEstimator, SwarmStats};
pub use timeout::{StalledRequest, TimeoutTable};
pub use upload::UploadQueue;
