//! Bridge server: intent handling, reporting and scheduling
//!
//! [`bridge`] holds the actor that owns all mutable state. The other modules
//! are the pieces it drives.

pub mod bridge;
pub mod debouncer;
pub mod dispatcher;
pub mod intents;
pub mod scheduler;
pub mod subscription;

pub use bridge::{spawn, BridgeCommand, BridgeCore, BridgeHandle};
pub use debouncer::ReportDebouncer;
pub use dispatcher::Dispatcher;
pub use intents::{
    ExecuteCommand, ExecuteResponse, ExecutionResult, Intent, IntentRequest, QueryResponse,
    SyncResponse,
};
pub use scheduler::run_scheduler;
pub use subscription::{sync_subscriptions, SubscriptionRegistry, SubscriptionReport};
