//! Completion Counting
//!
//! The controller's per-round barrier: exactly one completion per worker,
//! accepted in any order.

use crate::channel::ChannelError;
use crate::messages::CoreId;

/// Tracks which workers have signalled completion for the current round
#[derive(Debug, Clone)]
pub struct CompletionSet {
    seen: Vec<bool>,
    remaining: usize,
}

impl CompletionSet {
    /// Empty set for `cores` workers
    pub fn new(cores: usize) -> Self {
        Self {
            seen: vec![false; cores],
            remaining: cores,
        }
    }

    /// Record a completion from `core`.
    ///
    /// A second completion from the same core in one round is a protocol
    /// violation: it would mean the slot was written twice.
    pub fn mark(&mut self, core: CoreId) -> Result<(), ChannelError> {
        let cores = self.seen.len();
        let seen = self
            .seen
            .get_mut(core.index())
            .ok_or(ChannelError::UnknownCore { core, cores })?;
        if *seen {
            return Err(ChannelError::DuplicateCompletion { core });
        }
        *seen = true;
        self.remaining -= 1;
        Ok(())
    }

    /// Whether every worker has reported
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    /// Workers still outstanding
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Whether `core` has already reported
    pub fn contains(&self, core: CoreId) -> bool {
        self.seen.get(core.index()).copied().unwrap_or(false)
    }

    /// Clear for the next round
    pub fn reset(&mut self) {
        self.seen.iter_mut().for_each(|s| *s = false);
        self.remaining = self.seen.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_order_completes() {
        let mut set = CompletionSet::new(3);
        set.mark(CoreId(2)).unwrap();
        set.mark(CoreId(0)).unwrap();
        assert!(!set.is_complete());
        assert_eq!(set.remaining(), 1);
        set.mark(CoreId(1)).unwrap();
        assert!(set.is_complete());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut set = CompletionSet::new(2);
        set.mark(CoreId(1)).unwrap();
        assert_eq!(
            set.mark(CoreId(1)),
            Err(ChannelError::DuplicateCompletion { core: CoreId(1) })
        );
        assert_eq!(set.remaining(), 1);
    }

    #[test]
    fn test_reset() {
        let mut set = CompletionSet::new(2);
        set.mark(CoreId(0)).unwrap();
        set.mark(CoreId(1)).unwrap();
        set.reset();
        assert!(!set.contains(CoreId(0)));
        assert_eq!(set.remaining(), 2);
    }

    #[test]
    fn test_unknown_core() {
        let mut set = CompletionSet::new(2);
        assert!(matches!(
            set.mark(CoreId(9)),
            Err(ChannelError::UnknownCore { .. })
        ));
    }
}
