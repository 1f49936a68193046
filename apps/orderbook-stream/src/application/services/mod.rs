//! Application Services
//!
//! Server side:
//! - `OutboundGate`: single-writer gate over a connection's outbound channel
//! - `UpdateProducer`: per-instrument incremental update loop
//! - `SubscriptionRegistry`: per-connection subscription state machine
//! - `ConnectionSession`: read loop and teardown for one connection
//!
//! Client side:
//! - `ClientReconciler`: applies snapshots and incrementals to local books
//! - `CommandSender`: paced SUBSCRIBE sends and ad hoc UNSUBSCRIBE

mod command_sender;
mod outbound;
mod producer;
mod reconciler;
mod registry;
mod session;

pub use command_sender::{CommandError, CommandSender};
pub use outbound::{Delivery, OutboundError, OutboundGate};
pub use producer::{ProducerExit, UpdateProducer};
pub use reconciler::{ApplyOutcome, ClientReconciler, ReadLoopEnd, ReadLoopSummary, drive_updates};
pub use registry::{SubscribeOutcome, SubscriptionRegistry, UnsubscribeOutcome};
pub use session::{ConnectionId, ConnectionSession, SessionEnd, SessionSummary};
