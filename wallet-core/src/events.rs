//! Events emitted by the background sync engine.
//!
//! The engine pushes onto an unbounded channel; callers drain it at their
//! own pace. Consumers must treat events as side-effect-only signals and
//! never call back into mutating wallet operations from the drain loop,
//! which would re-enter the sync writer.

use tokio::sync::mpsc;

use crate::error::WalletError;

#[derive(Clone, Debug)]
pub enum SyncEvent {
    /// A block was committed.
    Progress {
        height: u64,
        tip_height: u64,
        blocks_done: u64,
    },
    /// Some committed mutation affected owned outputs.
    BalanceChanged,
    /// A recoverable error; the engine is backing off and will retry.
    Error(WalletError),
    /// The engine has exited, either from `stop()` or a fatal error.
    Stopped,
}

pub type SyncEventSender = mpsc::UnboundedSender<SyncEvent>;
pub type SyncEventReceiver = mpsc::UnboundedReceiver<SyncEvent>;
