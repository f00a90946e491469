//! Composable commit/rollback transactions for staged, undoable work.
//!
//! A [`Transaction`] pairs an asynchronous commit computation with the
//! asynchronous rollback computation that undoes it. Transactions compose with
//! [`map`](Transaction::map), [`chain`](Transaction::chain) and
//! [`ap`](Transaction::ap), so a multi-step process is described up front and
//! then driven through a single commit/rollback pair. When a chained stage
//! fails, the stages before it are rolled back in reverse order, starting
//! from the point of failure.
//!
//! ```
//! use futures::executor::block_on;
//! use staged_transaction::Transaction;
//!
//! let reserve = Transaction::<u32, String>::new(
//!     || async { Ok(10) },
//!     || async { Ok(()) },
//! );
//! let doubled = reserve.chain(|x| Transaction::of(x * 2));
//!
//! assert_eq!(block_on(doubled.commit()), Ok(20));
//! ```
//!
//! The crate never decides when to roll back a whole process: callers commit
//! the composed transaction and, on failure, invoke its rollback themselves.

mod label;
mod settle;
mod step;
mod transaction;

pub use step::{Commit, Rollback, Step};
pub use transaction::Transaction;
