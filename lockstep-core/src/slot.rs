//! Per-core handoff slots.
//!
//! The controller owns one `WorkerSlot` per core inside a `SlotArena`. Each
//! slot holds two single-value cells:
//!
//! - `input`: controller places the round input here; the worker takes it.
//! - `result`: worker publishes its `CoreResult` here; the controller collects it.
//!
//! A worker never sees the arena directly. It receives a `SlotHandle`, a
//! capability bound to its own index, so it cannot read or write another
//! core's slot. The dispatch/collection channels carry the happens-before
//! edges; the cells use Release/Acquire swaps so a value is fully visible to
//! whichever side takes it.

use crate::CoreResult;
use lockstep_ipc::{CoreId, RoundId};
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, Ordering};
use thiserror::Error;

/// Slot protocol violations
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SlotError {
    /// Input placed while the previous one was still untaken
    #[error("{core}: input slot still holds an untaken input")]
    InputOccupied {
        /// Owning core
        core: CoreId,
    },

    /// Result published while the previous one was still uncollected
    #[error("{core}: result slot still holds an uncollected result")]
    ResultOccupied {
        /// Owning core
        core: CoreId,
    },

    /// Index outside the arena
    #[error("{core} has no slot (arena holds {cores})")]
    UnknownCore {
        /// Requested core
        core: CoreId,
        /// Arena size
        cores: usize,
    },
}

/// Single-value ownership handoff cell.
///
/// Holds either null or a pointer leaked from `Box::into_raw`. Ownership moves
/// on every successful swap, so exactly one side ever reconstructs the box.
struct HandoffCell<T> {
    ptr: AtomicPtr<T>,
}

// SAFETY: the cell only moves owned `T` values between threads.
unsafe impl<T: Send> Send for HandoffCell<T> {}
// SAFETY: every access is a single atomic swap/CAS; no `&T` is ever shared.
unsafe impl<T: Send> Sync for HandoffCell<T> {}

impl<T> HandoffCell<T> {
    fn new() -> Self {
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Store `value` if the cell is empty, otherwise hand it back.
    fn put(&self, value: Box<T>) -> Result<(), Box<T>> {
        let raw = Box::into_raw(value);
        // Ordering: Release publishes the value before the taker's Acquire.
        match self
            .ptr
            .compare_exchange(ptr::null_mut(), raw, Ordering::Release, Ordering::Relaxed)
        {
            Ok(_) => Ok(()),
            // SAFETY: the CAS failed so `raw` was never shared; we still own it.
            Err(_) => Err(unsafe { Box::from_raw(raw) }),
        }
    }

    /// Take the value out, leaving the cell empty.
    fn take(&self) -> Option<Box<T>> {
        // Ordering: Acquire pairs with `put`'s Release.
        let raw = self.ptr.swap(ptr::null_mut(), Ordering::Acquire);
        if raw.is_null() {
            None
        } else {
            // SAFETY: non-null pointers come from `Box::into_raw` in `put`, and
            // swapping in null made us the only owner.
            Some(unsafe { Box::from_raw(raw) })
        }
    }

    fn is_occupied(&self) -> bool {
        !self.ptr.load(Ordering::Acquire).is_null()
    }
}

impl<T> Drop for HandoffCell<T> {
    fn drop(&mut self) {
        let raw = *self.ptr.get_mut();
        if !raw.is_null() {
            // SAFETY: exclusive access on drop; pointer came from `Box::into_raw`.
            drop(unsafe { Box::from_raw(raw) });
        }
    }
}

/// Round input waiting in a worker's slot
#[derive(Debug, Clone)]
pub struct PendingInput<I> {
    /// Round the input was placed for
    pub round: RoundId,
    /// The worker's private copy
    pub input: I,
}

/// One core's slot. Cache-line aligned to prevent false sharing.
#[repr(C, align(128))]
struct WorkerSlot<I, O> {
    input: HandoffCell<PendingInput<I>>,
    result: HandoffCell<CoreResult<O>>,
}

impl<I, O> WorkerSlot<I, O> {
    fn new() -> Self {
        Self {
            input: HandoffCell::new(),
            result: HandoffCell::new(),
        }
    }
}

/// Controller-owned set of per-core slots
pub struct SlotArena<I, O> {
    slots: Box<[WorkerSlot<I, O>]>,
}

impl<I: Send, O: Send> SlotArena<I, O> {
    /// Arena with one empty slot per core
    pub fn new(cores: usize) -> Arc<Self> {
        let slots = (0..cores).map(|_| WorkerSlot::new()).collect();
        Arc::new(Self { slots })
    }

    /// Number of slots
    pub fn cores(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, core: CoreId) -> Result<&WorkerSlot<I, O>, SlotError> {
        self.slots.get(core.index()).ok_or(SlotError::UnknownCore {
            core,
            cores: self.slots.len(),
        })
    }

    /// Capability for the worker on `core`
    pub fn handle(self: &Arc<Self>, core: CoreId) -> Result<SlotHandle<I, O>, SlotError> {
        self.slot(core)?;
        Ok(SlotHandle {
            arena: Arc::clone(self),
            core,
        })
    }

    /// Place `input` into `core`'s slot for `round`
    pub fn place_input(&self, core: CoreId, round: RoundId, input: I) -> Result<(), SlotError> {
        self.slot(core)?
            .input
            .put(Box::new(PendingInput { round, input }))
            .map_err(|_| SlotError::InputOccupied { core })
    }

    /// Collect whatever result `core` last published
    pub fn take_result(&self, core: CoreId) -> Result<Option<CoreResult<O>>, SlotError> {
        Ok(self.slot(core)?.result.take().map(|boxed| *boxed))
    }

    /// Drop every untaken input and uncollected result
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            drop(slot.input.take());
            drop(slot.result.take());
        }
    }

    /// Whether `core` has an untaken input
    pub fn has_pending_input(&self, core: CoreId) -> bool {
        self.slot(core).is_ok_and(|slot| slot.input.is_occupied())
    }
}

/// A worker's access to its own slot and nothing else
pub struct SlotHandle<I, O> {
    arena: Arc<SlotArena<I, O>>,
    core: CoreId,
}

impl<I: Send, O: Send> SlotHandle<I, O> {
    /// Core this handle is bound to
    pub fn core(&self) -> CoreId {
        self.core
    }

    fn slot(&self) -> &WorkerSlot<I, O> {
        // Bounds checked when the handle was issued.
        &self.arena.slots[self.core.index()]
    }

    /// Take the input the controller placed for this core
    pub fn take_input(&self) -> Option<PendingInput<I>> {
        self.slot().input.take().map(|boxed| *boxed)
    }

    /// Publish this core's result for the controller
    pub fn publish(&self, result: CoreResult<O>) -> Result<(), SlotError> {
        debug_assert_eq!(result.core, self.core);
        self.slot()
            .result
            .put(Box::new(result))
            .map_err(|_| SlotError::ResultOccupied { core: self.core })
    }
}
