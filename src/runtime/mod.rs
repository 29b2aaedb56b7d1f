//! Background execution context for all transport I/O
//!
//! 1. [`bridge`] - submit/cancel/complete API used by the foreground
//! 2. `worker` - the statum-driven loop living on the dedicated thread
//!
//! The foreground never awaits anything from here. Work goes in through
//! [`RuntimeBridge::submit`], results come back through
//! [`RuntimeBridge::try_completions`].

pub mod bridge;
mod worker;

pub use bridge::{BridgeError, Completion, Outcome, RuntimeBridge, WorkHandle};

/// Identifier of one submitted unit of work, unique per bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkId(pub u64);

/// What a unit of work does, used to route its completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkKind {
    Connect,
    Close,
    ButtonEvent,
    LoadPayload,
    EjectPayload,
    DeviceScan,
    Unpair,
}
