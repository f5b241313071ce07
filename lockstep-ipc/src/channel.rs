//! Dispatch and Collection Channels
//!
//! Fan-out: one bounded channel per worker, written only by the controller.
//! Fan-in: one bounded channel shared by all workers, read only by the controller.
//!
//! ```text
//!                 ┌──────────────┐
//!   controller ──►│ dispatch[0]  │──► worker 0 ──┐
//!              ──►│ dispatch[1]  │──► worker 1 ──┤
//!                 └──────────────┘               ▼
//!   controller ◄──────────── collection (capacity = cores)
//! ```
//!
//! Both directions together never hold more than one item per worker per
//! round. A full channel on send is therefore a protocol violation and is
//! reported instead of blocking.

use crate::messages::{CoreId, WorkerCommand, WorkerMessage};
use crate::DISPATCH_CAPACITY;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use thiserror::Error;

/// Errors raised by the dispatch/collection channels
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("cannot wire channels for zero workers")]
    NoWorkers,

    #[error("dispatch channel for {core} is full; a previous command was never consumed")]
    CapacityExceeded { core: CoreId },

    #[error("{core} is not part of this pipeline ({cores} cores)")]
    UnknownCore { core: CoreId, cores: usize },

    #[error("{core} hung up its command channel")]
    WorkerGone { core: CoreId },

    #[error("controller hung up the collection channel")]
    ControllerGone,

    #[error("all workers hung up the collection channel")]
    AllWorkersGone,

    #[error("{core} signalled completion twice in one round")]
    DuplicateCompletion { core: CoreId },
}

/// Controller side of the fan-out path
#[derive(Debug)]
pub struct DispatchChannel {
    senders: Vec<Sender<WorkerCommand>>,
}

impl DispatchChannel {
    /// Number of workers reachable through this channel
    pub fn cores(&self) -> usize {
        self.senders.len()
    }

    /// Hand `command` to the worker on `core` without blocking.
    pub fn send(&self, core: CoreId, command: WorkerCommand) -> Result<(), ChannelError> {
        let sender = self.senders.get(core.index()).ok_or(ChannelError::UnknownCore {
            core,
            cores: self.senders.len(),
        })?;
        match sender.try_send(command) {
            Ok(()) => {
                tracing::trace!(%core, ?command, "dispatched");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(ChannelError::CapacityExceeded { core }),
            Err(TrySendError::Disconnected(_)) => Err(ChannelError::WorkerGone { core }),
        }
    }

    /// Send `Stop` to every worker. Workers that already hung up are skipped
    /// and returned so the caller can stop waiting for their acknowledgement.
    ///
    /// Unlike `send`, this waits for room: a worker still holding an
    /// unconsumed `Execute` takes it first and sees `Stop` next.
    pub fn broadcast_stop(&self) -> Vec<CoreId> {
        let mut gone = Vec::new();
        for (index, sender) in self.senders.iter().enumerate() {
            let core = CoreId(index);
            if sender.send(WorkerCommand::Stop).is_err() {
                gone.push(core);
            } else {
                tracing::trace!(%core, "stop dispatched");
            }
        }
        gone
    }
}

/// Controller side of the fan-in path
#[derive(Debug)]
pub struct CollectionChannel {
    receiver: Receiver<WorkerMessage>,
    capacity: usize,
}

impl CollectionChannel {
    /// Bounded capacity (equal to the worker count)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until some worker reports. No timeout: a wait only returns when a
    /// message arrives or every worker has dropped its sender.
    pub fn recv(&self) -> Result<WorkerMessage, ChannelError> {
        self.receiver.recv().map_err(|_| ChannelError::AllWorkersGone)
    }
}

/// Worker side of its own dispatch channel
#[derive(Debug)]
pub struct CommandReceiver {
    core: CoreId,
    receiver: Receiver<WorkerCommand>,
}

impl CommandReceiver {
    /// Block until the controller sends the next command.
    ///
    /// A command sent before this call is observed immediately; there is no
    /// window in which a wake can be missed.
    pub fn recv(&self) -> Result<WorkerCommand, ChannelError> {
        self.receiver
            .recv()
            .map_err(|_| ChannelError::ControllerGone)
    }

    /// Core this receiver belongs to
    pub fn core(&self) -> CoreId {
        self.core
    }
}

/// Worker side of the shared collection channel, stamped with its core id
#[derive(Debug, Clone)]
pub struct ReportSender {
    core: CoreId,
    sender: Sender<WorkerMessage>,
}

impl ReportSender {
    /// Report to the controller. Blocks only if the collection channel is full,
    /// which cannot happen while every worker sends one message per command.
    pub fn send(&self, message: WorkerMessage) -> Result<(), ChannelError> {
        debug_assert_eq!(message.core(), self.core, "worker reported for another core");
        self.sender
            .send(message)
            .map_err(|_| ChannelError::ControllerGone)
    }

    /// Core this sender belongs to
    pub fn core(&self) -> CoreId {
        self.core
    }
}

/// Everything one worker needs to talk to the controller
#[derive(Debug)]
pub struct WorkerEndpoint {
    /// Core the worker runs on
    pub core: CoreId,
    /// Commands from the controller
    pub commands: CommandReceiver,
    /// Reports to the controller
    pub reports: ReportSender,
}

/// Create the channels for a pipeline of `cores` workers.
///
/// Returns the controller's two ends and one endpoint per worker, in core order.
pub fn wire(
    cores: usize,
) -> Result<(DispatchChannel, CollectionChannel, Vec<WorkerEndpoint>), ChannelError> {
    if cores == 0 {
        return Err(ChannelError::NoWorkers);
    }

    let (report_tx, report_rx) = bounded(cores);
    let mut senders = Vec::with_capacity(cores);
    let mut endpoints = Vec::with_capacity(cores);

    for core in CoreId::all(cores) {
        let (tx, rx) = bounded(DISPATCH_CAPACITY);
        senders.push(tx);
        endpoints.push(WorkerEndpoint {
            core,
            commands: CommandReceiver { core, receiver: rx },
            reports: ReportSender {
                core,
                sender: report_tx.clone(),
            },
        });
    }
    // Only workers hold collection senders, so `recv` fails once they are all gone.
    drop(report_tx);

    Ok((
        DispatchChannel { senders },
        CollectionChannel {
            receiver: report_rx,
            capacity: cores,
        },
        endpoints,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::RoundId;

    #[test]
    fn test_wire_zero_cores() {
        assert_eq!(wire(0).unwrap_err(), ChannelError::NoWorkers);
    }

    #[test]
    fn test_wire_shapes() {
        let (dispatch, collection, endpoints) = wire(2).unwrap();
        assert_eq!(dispatch.cores(), 2);
        assert_eq!(collection.capacity(), 2);
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[1].core, CoreId(1));
        assert_eq!(endpoints[1].commands.core(), CoreId(1));
    }

    #[test]
    fn test_command_delivered_to_owning_worker() {
        let (dispatch, _collection, endpoints) = wire(2).unwrap();
        let round = RoundId::first(0);
        dispatch
            .send(CoreId(1), WorkerCommand::Execute { round })
            .unwrap();
        assert_eq!(
            endpoints[1].commands.recv().unwrap(),
            WorkerCommand::Execute { round }
        );
        assert!(endpoints[0].commands.receiver.is_empty());
    }

    #[test]
    fn test_capacity_exceeded_is_reported() {
        let (dispatch, _collection, _endpoints) = wire(1).unwrap();
        let round = RoundId::first(0);
        dispatch
            .send(CoreId(0), WorkerCommand::Execute { round })
            .unwrap();
        assert_eq!(
            dispatch.send(CoreId(0), WorkerCommand::Execute { round }),
            Err(ChannelError::CapacityExceeded { core: CoreId(0) })
        );
    }

    #[test]
    fn test_unknown_core() {
        let (dispatch, _collection, _endpoints) = wire(2).unwrap();
        assert_eq!(
            dispatch.send(CoreId(5), WorkerCommand::Stop),
            Err(ChannelError::UnknownCore {
                core: CoreId(5),
                cores: 2
            })
        );
    }

    #[test]
    fn test_collection_fails_when_workers_gone() {
        let (_dispatch, collection, endpoints) = wire(2).unwrap();
        endpoints[0]
            .reports
            .send(WorkerMessage::Ready { core: CoreId(0) })
            .unwrap();
        drop(endpoints);
        assert_eq!(
            collection.recv().unwrap(),
            WorkerMessage::Ready { core: CoreId(0) }
        );
        assert_eq!(collection.recv(), Err(ChannelError::AllWorkersGone));
    }

    #[test]
    fn test_broadcast_stop_skips_gone_workers() {
        let (dispatch, _collection, mut endpoints) = wire(2).unwrap();
        let survivor = endpoints.remove(0);
        drop(endpoints);
        let gone = dispatch.broadcast_stop();
        assert_eq!(gone, vec![CoreId(1)]);
        assert_eq!(survivor.commands.recv().unwrap(), WorkerCommand::Stop);
    }

    #[test]
    fn test_blocking_recv_sees_earlier_send() {
        let (dispatch, _collection, mut endpoints) = wire(1).unwrap();
        let endpoint = endpoints.remove(0);
        // Give before take: the pending command must be observed.
        dispatch.send(CoreId(0), WorkerCommand::Stop).unwrap();
        let handle = std::thread::spawn(move || endpoint.commands.recv());
        assert_eq!(handle.join().unwrap(), Ok(WorkerCommand::Stop));
    }
}
