#![warn(missing_docs)]
//! Lockstep IPC Protocol
//!
//! Inter-task protocol between the pipeline controller and its per-core workers:
//! - `WorkerCommand` fan-out (execute / stop) over one bounded channel per worker
//! - `WorkerMessage` fan-in (ready / completed / exited) over one shared bounded channel
//! - `CompletionSet` for counting exactly one completion signal per worker per round
//!
//! All receives block with an infinite timeout. Nothing here polls.

mod channel;
mod completion;
mod messages;

pub use channel::{
    ChannelError, CollectionChannel, CommandReceiver, DispatchChannel, ReportSender,
    WorkerEndpoint, wire,
};
pub use completion::CompletionSet;
pub use messages::{CoreId, RoundId, WorkerCommand, WorkerMessage};

/// Capacity of each worker's dispatch channel.
///
/// A round issues exactly one command per worker, so one slot per worker is
/// enough; the fan-out as a whole holds at most `cores` commands.
pub const DISPATCH_CAPACITY: usize = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_capacity() {
        assert_eq!(DISPATCH_CAPACITY, 1);
    }

    #[test]
    fn test_core_id_size() {
        // CoreId is a plain index and must stay Copy-cheap
        assert_eq!(std::mem::size_of::<CoreId>(), std::mem::size_of::<usize>());
    }
}
