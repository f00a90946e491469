use std::fmt::Debug;

use futures::future::{self, Either};
use tracing::{debug, trace, warn};

use crate::step::{Commit, Rollback};

/// Output of one of two computations started together, tagged by side.
pub(crate) enum Arrival<L, R> {
    Left(L),
    Right(R),
}

impl<T> Arrival<T, T> {
    fn into_inner(self) -> T {
        match self {
            Arrival::Left(value) | Arrival::Right(value) => value,
        }
    }
}

/// Poll both futures together and return their outputs in the order they settled.
///
/// Neither future is dropped early: the second one is awaited to completion
/// after the first one settles.
pub(crate) async fn in_arrival_order<L, R>(left: L, right: R) -> [Arrival<L::Output, R::Output>; 2]
where
    L: Future + Unpin,
    R: Future + Unpin,
{
    match future::select(left, right).await {
        Either::Left((first, right)) => [Arrival::Left(first), Arrival::Right(right.await)],
        Either::Right((first, left)) => [Arrival::Right(first), Arrival::Left(left.await)],
    }
}

/// Settle-once guard for a group of computations started together.
///
/// The first failure to arrive is the one reported; later failures are
/// dropped. Success is signalled only on the arrival that completes the group
/// without any failure.
#[derive(Debug)]
pub(crate) struct SettleOnce<E> {
    expected: usize,
    succeeded: usize,
    failure: Option<E>,
}

impl<E: Debug> SettleOnce<E> {
    pub(crate) fn new(expected: usize) -> Self {
        Self {
            expected,
            succeeded: 0,
            failure: None,
        }
    }

    /// Record a successful arrival.
    ///
    /// Returns `true` only for the arrival that completes the group.
    pub(crate) fn resolve(&mut self) -> bool {
        self.succeeded += 1;
        self.failure.is_none() && self.succeeded == self.expected
    }

    /// Record a failed arrival.
    ///
    /// Returns `true` if this failure is the one that will be reported.
    pub(crate) fn reject(&mut self, error: E) -> bool {
        if let Some(kept) = &self.failure {
            warn!(kept = ?kept, dropped = ?error, "dropping later failure, first failure wins");
            return false;
        }
        self.failure = Some(error);
        true
    }

    /// Consume the guard once every computation in the group has settled.
    pub(crate) fn finish(self) -> Result<(), E> {
        match self.failure {
            Some(error) => Err(error),
            None => {
                debug_assert_eq!(self.succeeded, self.expected);
                Ok(())
            }
        }
    }
}

/// Two write-once slots holding the function and the argument of an `ap`.
pub(crate) struct Stash<F, A> {
    func: Option<F>,
    value: Option<A>,
}

impl<F, A> Default for Stash<F, A> {
    fn default() -> Self {
        Self {
            func: None,
            value: None,
        }
    }
}

impl<F, A> Stash<F, A> {
    fn take(self) -> Option<(F, A)> {
        self.func.zip(self.value)
    }
}

/// Commit a function and its argument together and apply one to the other.
pub(crate) async fn apply_both<F, A, B, E>(func: Commit<F, E>, value: Commit<A, E>) -> Result<B, E>
where
    F: FnOnce(A) -> B,
    E: Debug,
{
    let mut guard = SettleOnce::new(2);
    let mut stash = Stash::default();

    for arrival in in_arrival_order(func, value).await {
        match arrival {
            Arrival::Left(Ok(f)) => {
                stash.func = Some(f);
                guard.resolve();
            }
            Arrival::Right(Ok(a)) => {
                stash.value = Some(a);
                guard.resolve();
            }
            Arrival::Left(Err(error)) | Arrival::Right(Err(error)) => {
                if guard.reject(error) {
                    debug!("applicative commit failed, waiting for the other branch to settle");
                }
            }
        }
    }

    guard.finish()?;
    let Some((f, a)) = stash.take() else {
        unreachable!("settle guard reported success without both values")
    };
    Ok(f(a))
}

/// Run two rollbacks together; both always run to completion.
///
/// Reports success after both succeed, or the first failure to arrive.
pub(crate) async fn rollback_both<E: Debug>(first: Rollback<E>, second: Rollback<E>) -> Result<(), E> {
    let mut guard = SettleOnce::new(2);

    for arrival in in_arrival_order(first, second).await {
        match arrival.into_inner() {
            Ok(()) => {
                if guard.resolve() {
                    trace!("both rollbacks succeeded");
                }
            }
            Err(error) => {
                if guard.reject(error) {
                    debug!("rollback failed, waiting for the other rollback to finish");
                }
            }
        }
    }

    guard.finish()
}
