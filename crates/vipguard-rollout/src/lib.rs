//! vipguard-rollout: configuration consistency between primary and
//! secondaries.
//!
//! # Components
//!
//! - **`watcher`**: `ConfigWatcher` timestamp diffing and the primary's
//!   `ConfigChangeDetector` poll loop
//! - **`sequencer`**: `RolloutSequencer`: restart the local proxy, gate on
//!   health, then notify every secondary
//! - **`sync`**: `SecondarySync`: the secondary's pull, write, restart,
//!   verify cycle
//!
//! # Flow
//!
//! ```text
//! primary:   watcher tick ─► changed batch ─► restart + await healthy
//!                                              ├─ unhealthy → stop (no fan-out)
//!                                              └─ healthy   → POST /update-config to each secondary
//! secondary: POST /update-config ─► probe primary ─► GET /config/dynamic, /config/static
//!                                    ─► write files ─► restart + await healthy
//! ```

pub mod error;
pub mod sequencer;
pub mod sync;
pub mod watcher;

pub use error::{NotifyError, SyncError, WatchError};
pub use sequencer::{HttpNotifier, RolloutOutcome, RolloutSequencer, SecondaryNotifier, SecondaryResult};
pub use sync::{SecondarySync, SyncReport};
pub use watcher::{ConfigChangeDetector, ConfigWatcher};
