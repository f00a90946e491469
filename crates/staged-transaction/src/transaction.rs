use std::fmt::{self, Debug};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::label::Label;
use crate::settle::{apply_both, rollback_both};
use crate::step::{Commit, Rollback, Step};

type CommitFn<T, E> = Arc<dyn Fn() -> Commit<T, E> + Send + Sync>;
type RollbackFn<E> = Arc<dyn Fn() -> Rollback<E> + Send + Sync>;

/// A unit of staged work paired with the work that undoes it.
///
/// Neither computation runs when the transaction is built. Calling
/// [`commit`](Self::commit) or [`rollback`](Self::rollback) returns a future
/// that performs the work when polled and resolves exactly once. The
/// transaction never rolls itself back after a failed commit; that decision
/// belongs to the caller. Composition via [`chain`](Self::chain) is the
/// exception: a failure in a later stage rolls back the earlier stage before
/// the failure is propagated.
///
/// Each transaction is meant to be committed at most once and rolled back at
/// most once.
pub struct Transaction<T, E> {
    commit: CommitFn<T, E>,
    rollback: RollbackFn<E>,
    label: Label,
}

impl<T, E> Clone for Transaction<T, E> {
    fn clone(&self) -> Self {
        Self {
            commit: Arc::clone(&self.commit),
            rollback: Arc::clone(&self.rollback),
            label: self.label.clone(),
        }
    }
}

/// How far the stages of a chained transaction got.
enum Progress<U, E> {
    /// The later stage was never built.
    Idle,
    /// The later stage was built and its commit started.
    Started(Transaction<U, E>),
    /// The later stage failed and the earlier stage was already rolled back,
    /// holding that rollback's failure until the combined rollback reports it.
    Compensated(Option<E>),
}

impl<T, E> Transaction<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn from_parts(commit: CommitFn<T, E>, rollback: RollbackFn<E>, label: Label) -> Self {
        Self {
            commit,
            rollback,
            label,
        }
    }

    /// Build a leaf transaction from a commit and a rollback computation.
    ///
    /// Each closure is called once per invocation of the matching method and
    /// must return a future that does the actual work.
    #[must_use]
    pub fn new<C, CF, R, RF>(commit: C, rollback: R) -> Self
    where
        C: Fn() -> CF + Send + Sync + 'static,
        CF: Future<Output = Result<T, E>> + Send + 'static,
        R: Fn() -> RF + Send + Sync + 'static,
        RF: Future<Output = Result<(), E>> + Send + 'static,
    {
        let label = Label::closures::<C, R>();
        Self::from_parts(
            Arc::new(move || commit().boxed()),
            Arc::new(move || rollback().boxed()),
            label,
        )
    }

    /// Build a leaf transaction that delegates to a [`Step`].
    #[must_use]
    pub fn from_step<S>(step: S) -> Self
    where
        S: Step<Output = T, Error = E>,
    {
        let label = Label::new(step.name(), step.rollback_description());
        let step = Arc::new(step);
        let undo = Arc::clone(&step);

        Self::from_parts(
            Arc::new(move || {
                let step = Arc::clone(&step);
                async move { step.commit().await }.boxed()
            }),
            Arc::new(move || {
                let step = Arc::clone(&undo);
                async move { step.rollback().await }.boxed()
            }),
            label,
        )
    }

    /// Lift a value into a transaction that always commits with it and whose
    /// rollback does nothing.
    #[must_use]
    pub fn of(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::from_parts(
            Arc::new(move || {
                let value = value.clone();
                async move { Ok(value) }.boxed()
            }),
            Arc::new(|| async { Ok(()) }.boxed()),
            Label::unit(),
        )
    }

    /// Start the commit computation.
    ///
    /// # Errors
    ///
    /// The returned future resolves to the commit failure, if any.
    pub fn commit(&self) -> Commit<T, E> {
        (self.commit)()
    }

    /// Start the rollback computation.
    ///
    /// # Errors
    ///
    /// The returned future resolves to the rollback failure, if any.
    pub fn rollback(&self) -> Rollback<E> {
        (self.rollback)()
    }

    /// Transform the committed value.
    ///
    /// Failures pass through unchanged and the rollback is this transaction's
    /// own rollback, so this behaves exactly like `chain(|x| of(f(x)))`
    /// without requiring the mapped value to be cloneable.
    #[must_use]
    pub fn map<U, F>(&self, f: F) -> Transaction<U, E>
    where
        F: Fn(T) -> U + Send + Sync + 'static,
        U: Send + 'static,
    {
        let label = self.label.map::<F>();
        let commit = Arc::clone(&self.commit);
        let f = Arc::new(f);

        Transaction::from_parts(
            Arc::new(move || {
                let commit = Arc::clone(&commit);
                let f = Arc::clone(&f);
                async move { commit().await.map(&*f) }.boxed()
            }),
            Arc::clone(&self.rollback),
            label,
        )
    }

    /// Sequence a dependent stage built from the committed value.
    ///
    /// The later stage only starts after this one commits. If the later
    /// stage's commit fails, this stage is rolled back before the failure is
    /// propagated. The commit always returns the later stage's failure; a
    /// failure of that rollback is kept and surfaced by the combined rollback.
    ///
    /// The combined rollback undoes whatever actually committed: both stages
    /// together (later stage started first) after a successful commit, this
    /// stage alone if the later stage was never built. If the later stage
    /// failed, this stage was already rolled back, so nothing runs again and
    /// the combined rollback reports the outcome of that earlier rollback.
    #[must_use]
    pub fn chain<U, F>(&self, f: F) -> Transaction<U, E>
    where
        F: Fn(T) -> Transaction<U, E> + Send + Sync + 'static,
        U: Send + 'static,
        E: Debug,
    {
        let label = self.label.chain::<F>();
        let progress = Arc::new(Mutex::new(Progress::Idle));
        let f = Arc::new(f);

        let first = self.clone();
        let committed = Arc::clone(&progress);
        let commit = move || {
            let first = first.clone();
            let f = Arc::clone(&f);
            let progress = Arc::clone(&committed);

            async move {
                let value = first.commit().await?;
                let next = f(value);
                *progress.lock() = Progress::Started(next.clone());

                match next.commit().await {
                    Ok(output) => Ok(output),
                    Err(error) => {
                        debug!(error = ?error, "chained stage failed, rolling back earlier stage");
                        let compensation = first.rollback().await;
                        if let Err(rollback_error) = &compensation {
                            warn!(
                                error = ?rollback_error,
                                "rollback of earlier stage failed, propagating the commit failure"
                            );
                        }
                        *progress.lock() = Progress::Compensated(compensation.err());
                        Err(error)
                    }
                }
            }
            .boxed()
        };

        let first = self.clone();
        let rollback = move || {
            let next = match &mut *progress.lock() {
                Progress::Idle => None,
                Progress::Started(next) => Some(next.clone()),
                Progress::Compensated(failure) => {
                    trace!(failed = failure.is_some(), "earlier stage already rolled back during commit");
                    let failure = failure.take();
                    return async move { failure.map_or(Ok(()), Err) }.boxed();
                }
            };
            match next {
                None => first.rollback(),
                Some(next) => rollback_both(next.rollback(), first.rollback()).boxed(),
            }
        };

        Transaction::from_parts(Arc::new(commit), Arc::new(rollback), label)
    }

    /// Apply the committed function to the value committed by `other`.
    ///
    /// Both commits start together and both run to completion. The first
    /// failure to arrive is reported; a later one is logged and dropped. The
    /// combined rollback runs both rollbacks together under the same rule and
    /// only reports success once both have succeeded.
    ///
    /// Nothing is cancelled, so a failure is only reported once the slower
    /// branch has also settled, for both the commit and the rollback.
    #[must_use]
    pub fn ap<A, B>(&self, other: &Transaction<A, E>) -> Transaction<B, E>
    where
        T: FnOnce(A) -> B,
        A: Send + 'static,
        B: Send + 'static,
        E: Debug,
    {
        let label = self.label.ap(&other.label);
        let (func, value) = (Arc::clone(&self.commit), Arc::clone(&other.commit));
        let (undo_func, undo_value) = (Arc::clone(&self.rollback), Arc::clone(&other.rollback));

        Transaction::from_parts(
            Arc::new(move || apply_both(func(), value()).boxed()),
            Arc::new(move || rollback_both(undo_func(), undo_value()).boxed()),
            label,
        )
    }
}

impl<T, E> fmt::Debug for Transaction<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("commit", &self.label.commit)
            .field("rollback", &self.label.rollback)
            .finish()
    }
}

impl<T, E> fmt::Display for Transaction<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.label, f)
    }
}
