//! Synchronization roots and change summaries
//!
//! Provides:
//! - Per-user ordered set of synchronization roots
//! - Change summaries since a device's last successful synchronization
//! - Blacklist of document types kept out of synchronization
//!
//! # Polling Protocol
//!
//! 1. Device asks for a summary without checkpoint and runs a full sync
//! 2. Device stores `upperBound` (or `syncDate`) and the active root
//!    definitions from the summary
//! 3. Next poll sends them back and receives the changes in between
//! 4. `too_many_changes` means the device has to run a full sync again
//!
//! Roots present in the device's definitions but no longer active are
//! reported as deletions, even when the audit trail has nothing under the
//! remaining roots.

pub mod blacklist;
mod cache;
mod manager;
mod types;

pub use blacklist::{is_blacklisted, BlacklistedDocumentType};
pub use cache::RootsCache;
pub use manager::{DriveManager, SyncRootManager};
pub use types::{
    format_root_definitions, parse_root_definitions, DocumentChangeSummary, SummaryStatus,
    SyncCheckpoint, SyncRootEntry,
};
