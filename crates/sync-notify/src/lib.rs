//! Realtime Notifier & Connection Registry (spec §4.8): tracks open push
//! channels per client, indexed by subscription scope keys, and wakes
//! connections on commit. Transport-agnostic — owns no socket or HTTP
//! concerns; those live in the excluded front-end route layer.

mod broadcaster;
mod connection;
mod notifier;
mod registry;

pub use broadcaster::{BroadcastError, BroadcastEvent, Broadcaster};
pub use connection::{Connection, ConnectionId, MpscConnection, SendError};
pub use notifier::Notifier;
pub use registry::{ConnectionRegistry, RegisteredConnection};
