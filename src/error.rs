//! Typed errors for the few call sites that can't assert their way out.
//!
//! `spec.md` §7 puts most of this crate's failure taxonomy outside
//! `Result`: programming errors assert/panic, transient I/O and
//! protocol errors recover silently (optionally logged), and timeouts
//! surface as state transitions rather than return values. The small
//! remainder — fallible registration performed outside a context that
//! can safely assert, e.g. dynamic device bring-up after boot — gets a
//! plain enum rather than a derive-macro error crate, following
//! `original_source`'s own C++ style of returning/asserting on
//! `short`/`bool` rather than modeling a rich exception hierarchy.
//! This also matches the un-derived `Error` enum style common in the
//! embedded ecosystem (e.g. `tock`, `mcan`) rather than the heavier
//! `thiserror` style seen in hosted workspaces.

use core::fmt;

/// Contract violations that a caller chose to have reported instead of
/// asserted (e.g. a dynamic frame-id or CANopen node registration
/// attempted outside of static setup).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// A [`crate::min::FrameRegistry`] handler slot for this id is
    /// already occupied.
    FrameIdTaken(u8),
    /// A CANopen node id was already registered, or is the reserved
    /// broadcast id 0.
    CanNodeTaken(u8),
    /// The request-queue engine's bounded queue had no room.
    QueueFull,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::FrameIdTaken(id) => write!(f, "frame id {id} already has a handler"),
            CoreError::CanNodeTaken(id) => write!(f, "CANopen node id {id} already registered"),
            CoreError::QueueFull => write!(f, "request queue is full"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CoreError {}
