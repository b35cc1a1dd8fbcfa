//! Scoped transactions provided by the storage engine.
//!
//! The reindexer never talks to a transaction manager directly; it hands
//! units of work to a [`TransactionScope`] and lets the scope decide
//! whether to commit or roll back.

use std::sync::atomic::{AtomicBool, Ordering};

use reindex_types::ReindexError;

/// How a unit of work relates to an enclosing transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Join the current transaction, or start one if there is none
    Required,
    /// Always start an independent transaction, suspending any current one
    RequiresNew,
}

/// Handle passed to a unit of work while its transaction is open.
#[derive(Debug, Default)]
pub struct TransactionStatus {
    rollback_only: AtomicBool,
}

impl TransactionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roll back instead of committing once the work returns.
    pub fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }
}

/// A transaction boundary around a unit of work.
///
/// Implementations must:
/// - roll back and return the error when `work` fails,
/// - roll back and return `Ok(())` when `work` succeeded but marked the status rollback-only,
/// - otherwise commit, returning any commit failure. A commit rejected because
///   of a concurrent version or uniqueness violation must be reported as
///   [`ReindexError::Conflict`].
pub trait TransactionScope: Send + Sync {
    fn execute(
        &self,
        propagation: Propagation,
        work: &mut dyn FnMut(&TransactionStatus) -> Result<(), ReindexError>,
    ) -> Result<(), ReindexError>;
}

/// Run `work` inside a transaction and return its value.
pub fn in_transaction<R, F>(
    scope: &dyn TransactionScope,
    propagation: Propagation,
    work: F,
) -> Result<R, ReindexError>
where
    F: FnOnce(&TransactionStatus) -> Result<R, ReindexError>,
{
    let mut work = Some(work);
    let mut output = None;

    scope.execute(propagation, &mut |status| {
        let work = work
            .take()
            .ok_or_else(|| ReindexError::Transaction("work invoked twice".to_string()))?;
        output = Some(work(status)?);
        Ok(())
    })?;

    output.ok_or_else(|| ReindexError::Transaction("work was never invoked".to_string()))
}
