/// Change notification plumbing
///
/// This module carries live-update events from write paths to connected
/// subscribers:
///
/// - **feed**: the in-process broadcast bus ([`feed::ChangeFeed`]) and the
///   [`feed::ChangeEvent`] records it carries
/// - **debounce**: a cancellable timer for coalescing bursts before
///   notifying a subscriber
///
/// Events describe that a row changed, not what it now contains;
/// subscribers re-read through the normal policy-checked read paths. A
/// subscriber that falls behind is told to resync rather than being fed a
/// gap.

pub mod debounce;
pub mod feed;

pub use debounce::Debouncer;
pub use feed::{ChangeEvent, ChangeFeed, ChangeOp, EntityKind};
