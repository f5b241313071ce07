//! Worker Loop
//!
//! Runs on each core's thread for the lifetime of the pipeline:
//!
//! ```text
//! setup ──▶ WaitingForWork ──Execute──▶ Executing ──▶ Reporting ─┐
//!                ▲                                                │
//!                └────────────────────────────────────────────────┘
//!                │
//!               Stop ──▶ Exiting (send Exited, return)
//! ```
//!
//! The worker blocks on its command channel between rounds. A panicking step
//! is caught and reported as a `StepFault`, so every `Execute` is answered
//! with exactly one `Completed`.

use crate::measure::{Timer, available_cores, lower_thread_priority, pin_to_cpu};
use crate::slot::SlotHandle;
use crate::{CoreResult, StepFault, Workload};
use lockstep_ipc::{CoreId, RoundId, WorkerCommand, WorkerEndpoint, WorkerMessage};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

/// How a worker thread places itself before setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Placement {
    /// Pin the thread to CPU `core % available`
    pub pin: bool,
    /// Niceness increment applied to the worker thread
    pub priority_offset: i32,
}

/// Why a worker loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Acknowledged a `Stop` command
    Stopped,
    /// `Workload::setup` failed
    SetupFailed,
    /// The controller dropped its channels without sending `Stop`
    ControllerGone,
}

/// Worker summary returned from the thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    /// Core the worker ran on
    pub core: CoreId,
    /// Rounds (including retries) executed
    pub rounds_executed: u64,
    /// Steps that ended in a fault
    pub faults: u64,
    /// Why the loop ended
    pub reason: ExitReason,
}

/// One core's worker
pub struct Worker<W: Workload> {
    workload: Arc<W>,
    endpoint: WorkerEndpoint,
    slot: SlotHandle<W::Input, W::Output>,
    placement: Placement,
    rounds_executed: u64,
    faults: u64,
}

impl<W: Workload> Worker<W> {
    /// Worker bound to `endpoint.core`
    pub fn new(
        workload: Arc<W>,
        endpoint: WorkerEndpoint,
        slot: SlotHandle<W::Input, W::Output>,
        placement: Placement,
    ) -> Self {
        debug_assert_eq!(endpoint.core, slot.core());
        Self {
            workload,
            endpoint,
            slot,
            placement,
            rounds_executed: 0,
            faults: 0,
        }
    }

    /// Core this worker runs on
    pub fn core(&self) -> CoreId {
        self.endpoint.core
    }

    /// Run until `Stop`, setup failure, or controller loss
    pub fn run(mut self) -> WorkerExit {
        let core = self.core();
        self.place();

        if let Err(message) = self.setup() {
            tracing::error!(%core, %message, "Worker setup failed");
            let _ = self
                .endpoint
                .reports
                .send(WorkerMessage::SetupFailed { core, message });
            return self.exit(ExitReason::SetupFailed);
        }

        if self.endpoint.reports.send(WorkerMessage::Ready { core }).is_err() {
            return self.exit(ExitReason::ControllerGone);
        }
        tracing::debug!(%core, "Worker ready");

        loop {
            let command = match self.endpoint.commands.recv() {
                Ok(command) => command,
                Err(e) => {
                    tracing::warn!(%core, error = %e, "Command channel closed without Stop");
                    return self.exit(ExitReason::ControllerGone);
                }
            };

            match command {
                WorkerCommand::Execute { round } => {
                    let result = self.execute(round);
                    if let Err(e) = self.slot.publish(result) {
                        tracing::error!(%core, %round, error = %e, "Result slot not drained");
                    }
                    let completed = WorkerMessage::Completed { core, round };
                    if self.endpoint.reports.send(completed).is_err() {
                        return self.exit(ExitReason::ControllerGone);
                    }
                }
                WorkerCommand::Stop => {
                    let _ = self.endpoint.reports.send(WorkerMessage::Exited { core });
                    return self.exit(ExitReason::Stopped);
                }
            }
        }
    }

    fn place(&self) {
        let core = self.core();
        if self.placement.pin {
            let cpu = core.index() % available_cores();
            if let Err(e) = pin_to_cpu(cpu) {
                tracing::warn!(%core, cpu, error = %e, "Failed to pin worker");
            }
        }
        if let Err(e) = lower_thread_priority(self.placement.priority_offset) {
            tracing::warn!(%core, error = %e, "Failed to lower worker priority");
        }
    }

    fn setup(&mut self) -> Result<(), String> {
        let core = self.core();
        let workload = &self.workload;
        match catch_unwind(AssertUnwindSafe(|| workload.setup(core))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.message),
            Err(panic) => Err(panic_message(panic.as_ref())),
        }
    }

    fn execute(&mut self, round: RoundId) -> CoreResult<W::Output> {
        let core = self.core();
        self.rounds_executed += 1;

        let input = match self.slot.take_input() {
            Some(pending) if pending.round == round => pending.input,
            Some(pending) => {
                return self.fault(
                    round,
                    format!("input slot held {} while executing {round}", pending.round),
                );
            }
            None => return self.fault(round, format!("no input in slot for {round}")),
        };

        let workload = &self.workload;
        let timer = Timer::start();
        let outcome = catch_unwind(AssertUnwindSafe(|| workload.step(core, input)));
        let (elapsed, cycles) = timer.stop();

        let value = match outcome {
            Ok(value) => Ok(value),
            Err(panic) => {
                self.faults += 1;
                let message = panic_message(panic.as_ref());
                tracing::warn!(%core, %round, %message, "Step panicked");
                Err(StepFault::new(message))
            }
        };

        tracing::trace!(%core, %round, ?elapsed, "Step finished");
        CoreResult {
            core,
            round,
            value,
            elapsed,
            cycles,
        }
    }

    fn fault(&mut self, round: RoundId, message: String) -> CoreResult<W::Output> {
        self.faults += 1;
        tracing::error!(core = %self.core(), %round, %message, "Step skipped");
        CoreResult {
            core: self.core(),
            round,
            value: Err(StepFault::new(message)),
            elapsed: Duration::ZERO,
            cycles: 0,
        }
    }

    fn exit(&self, reason: ExitReason) -> WorkerExit {
        tracing::debug!(core = %self.core(), ?reason, rounds = self.rounds_executed, "Worker exiting");
        WorkerExit {
            core: self.core(),
            rounds_executed: self.rounds_executed,
            faults: self.faults,
            reason,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::SlotArena;
    use crate::{FnWorkload, SetupError};
    use lockstep_ipc::wire;

    struct FailingSetup;

    impl Workload for FailingSetup {
        type Input = ();
        type Output = ();

        fn setup(&self, _core: CoreId) -> Result<(), SetupError> {
            Err(SetupError::new("sensor missing"))
        }

        fn step(&self, _core: CoreId, _input: ()) {}
    }

    fn spawn<W: Workload>(
        workload: W,
    ) -> (
        lockstep_ipc::DispatchChannel,
        lockstep_ipc::CollectionChannel,
        Arc<SlotArena<W::Input, W::Output>>,
        std::thread::JoinHandle<WorkerExit>,
    ) {
        let (dispatch, collection, mut endpoints) = wire(1).unwrap();
        let arena = SlotArena::new(1);
        let handle = arena.handle(CoreId(0)).unwrap();
        let worker = Worker::new(
            Arc::new(workload),
            endpoints.remove(0),
            handle,
            Placement::default(),
        );
        let join = std::thread::spawn(move || worker.run());
        (dispatch, collection, arena, join)
    }

    #[test]
    fn test_execute_then_stop() {
        let (dispatch, collection, arena, join) =
            spawn(FnWorkload::new(|_core, (a, b): (i32, i32)| a + b));
        assert_eq!(collection.recv().unwrap(), WorkerMessage::Ready { core: CoreId(0) });

        let round = RoundId::first(0);
        arena.place_input(CoreId(0), round, (10, 3)).unwrap();
        dispatch.send(CoreId(0), WorkerCommand::Execute { round }).unwrap();
        assert_eq!(
            collection.recv().unwrap(),
            WorkerMessage::Completed { core: CoreId(0), round }
        );
        let result = arena.take_result(CoreId(0)).unwrap().unwrap();
        assert_eq!(result.value, Ok(13));
        assert_eq!(result.round, round);

        dispatch.send(CoreId(0), WorkerCommand::Stop).unwrap();
        assert_eq!(collection.recv().unwrap(), WorkerMessage::Exited { core: CoreId(0) });

        let exit = join.join().unwrap();
        assert_eq!(exit.reason, ExitReason::Stopped);
        assert_eq!(exit.rounds_executed, 1);
        assert_eq!(exit.faults, 0);
    }

    #[test]
    fn test_panicking_step_still_reports() {
        let (dispatch, collection, arena, join) =
            spawn(FnWorkload::new(|_core, (a, b): (i32, i32)| a / b));
        collection.recv().unwrap();

        let round = RoundId::first(0);
        arena.place_input(CoreId(0), round, (10, 0)).unwrap();
        dispatch.send(CoreId(0), WorkerCommand::Execute { round }).unwrap();
        assert!(matches!(collection.recv().unwrap(), WorkerMessage::Completed { .. }));

        let result = arena.take_result(CoreId(0)).unwrap().unwrap();
        let fault = result.value.unwrap_err();
        assert!(fault.message.contains("divide by zero"), "{}", fault.message);

        dispatch.send(CoreId(0), WorkerCommand::Stop).unwrap();
        assert_eq!(join.join().unwrap().faults, 1);
    }

    #[test]
    fn test_missing_input_is_a_fault() {
        let (dispatch, collection, arena, join) =
            spawn(FnWorkload::new(|_core, x: i32| x));
        collection.recv().unwrap();

        let round = RoundId::first(4);
        dispatch.send(CoreId(0), WorkerCommand::Execute { round }).unwrap();
        collection.recv().unwrap();
        let result = arena.take_result(CoreId(0)).unwrap().unwrap();
        assert!(result.value.is_err());

        dispatch.send(CoreId(0), WorkerCommand::Stop).unwrap();
        join.join().unwrap();
    }

    #[test]
    fn test_setup_failure_reported() {
        let (_dispatch, collection, _arena, join) = spawn(FailingSetup);
        assert_eq!(
            collection.recv().unwrap(),
            WorkerMessage::SetupFailed {
                core: CoreId(0),
                message: "sensor missing".to_string(),
            }
        );
        assert_eq!(join.join().unwrap().reason, ExitReason::SetupFailed);
    }

    #[test]
    fn test_controller_drop_ends_worker() {
        let (dispatch, collection, _arena, join) = spawn(FnWorkload::new(|_core, x: i32| x));
        collection.recv().unwrap();
        drop(dispatch);
        assert_eq!(join.join().unwrap().reason, ExitReason::ControllerGone);
    }
}
