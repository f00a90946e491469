use futures::FutureExt;
use futures::future::BoxFuture;

/// Boxed future produced by a transaction's commit computation.
pub type Commit<T, E> = BoxFuture<'static, Result<T, E>>;

/// Boxed future produced by a transaction's rollback computation.
pub type Rollback<E> = BoxFuture<'static, Result<(), E>>;

/// A leaf unit of work that can be committed and rolled back.
///
/// Implementors wrap the real side effect (a file write, a remote call, a
/// record mutation) together with the compensating action that undoes it.
/// Cancellation and timeouts, if needed, belong inside the implementation.
///
/// # Type Parameters
///
/// - `Output`: Value produced by a successful commit
/// - `Error`: Failure type for both commit and rollback
pub trait Step: Send + Sync + 'static {
    /// Value produced by a successful commit.
    type Output: Send + 'static;

    /// Error type for commit and rollback failures.
    type Error: Send + 'static;

    /// Human-readable name for logging and the textual representation.
    fn name(&self) -> &'static str;

    /// Perform the step's work.
    ///
    /// # Errors
    ///
    /// Returns an error if the work could not be completed.
    fn commit(&self) -> BoxFuture<'_, Result<Self::Output, Self::Error>>;

    /// Undo the work performed by `commit()`.
    ///
    /// The default implementation is a no-op, suitable for read-only steps.
    ///
    /// # Errors
    ///
    /// Returns an error if the undo action fails.
    fn rollback(&self) -> BoxFuture<'_, Result<(), Self::Error>> {
        async { Ok(()) }.boxed()
    }

    /// Human-readable description of what rollback will do.
    fn rollback_description(&self) -> String {
        format!("undo {}", self.name())
    }
}
