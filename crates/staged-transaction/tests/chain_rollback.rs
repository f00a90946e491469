//! Integration tests for rollback behavior of chained transactions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use futures::executor::block_on;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use staged_transaction::{Step, Transaction};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
struct TestError(String);

#[derive(Default)]
struct Ledger {
    entries: Mutex<Vec<String>>,
}

impl Ledger {
    fn record(&self, entry: String) {
        self.entries.lock().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }
}

struct TrackedStep {
    name: &'static str,
    value: i32,
    ledger: Arc<Ledger>,
}

impl Step for TrackedStep {
    type Output = i32;
    type Error = TestError;

    fn name(&self) -> &'static str {
        self.name
    }

    fn commit(&self) -> BoxFuture<'_, Result<Self::Output, Self::Error>> {
        async move {
            self.ledger.record(format!("commit {}", self.name));
            Ok(self.value)
        }
        .boxed()
    }

    fn rollback(&self) -> BoxFuture<'_, Result<(), Self::Error>> {
        async move {
            self.ledger.record(format!("rollback {}", self.name));
            Ok(())
        }
        .boxed()
    }
}

struct FailingStep {
    message: &'static str,
    ledger: Arc<Ledger>,
}

impl Step for FailingStep {
    type Output = i32;
    type Error = TestError;

    fn name(&self) -> &'static str {
        "failing"
    }

    fn commit(&self) -> BoxFuture<'_, Result<Self::Output, Self::Error>> {
        async move {
            self.ledger.record("commit failing".to_string());
            Err(TestError(self.message.to_string()))
        }
        .boxed()
    }

    fn rollback(&self) -> BoxFuture<'_, Result<(), Self::Error>> {
        async move {
            self.ledger.record("rollback failing".to_string());
            Ok(())
        }
        .boxed()
    }
}

struct FailingRollbackStep {
    name: &'static str,
    ledger: Arc<Ledger>,
}

impl Step for FailingRollbackStep {
    type Output = i32;
    type Error = TestError;

    fn name(&self) -> &'static str {
        self.name
    }

    fn commit(&self) -> BoxFuture<'_, Result<Self::Output, Self::Error>> {
        async move {
            self.ledger.record(format!("commit {}", self.name));
            Ok(1)
        }
        .boxed()
    }

    fn rollback(&self) -> BoxFuture<'_, Result<(), Self::Error>> {
        async move {
            self.ledger.record(format!("failed rollback {}", self.name));
            Err(TestError(format!("cannot undo {}", self.name)))
        }
        .boxed()
    }

    fn rollback_description(&self) -> String {
        format!("attempt to undo {}", self.name)
    }
}

fn tracked(name: &'static str, value: i32, ledger: &Arc<Ledger>) -> Transaction<i32, TestError> {
    Transaction::from_step(TrackedStep {
        name,
        value,
        ledger: Arc::clone(ledger),
    })
}

fn failing(message: &'static str, ledger: &Arc<Ledger>) -> Transaction<i32, TestError> {
    Transaction::from_step(FailingStep {
        message,
        ledger: Arc::clone(ledger),
    })
}

#[test]
fn later_stage_failure_rolls_back_earlier_stage_once() {
    let ledger = Arc::new(Ledger::default());
    let second = failing("boom", &ledger);
    let chained = tracked("step_a", 10, &ledger).chain(move |_| second.clone());

    let result = block_on(chained.commit());
    assert_eq!(result, Err(TestError("boom".to_string())));

    assert_eq!(block_on(chained.rollback()), Ok(()));

    assert_eq!(
        ledger.entries(),
        vec!["commit step_a", "commit failing", "rollback step_a"]
    );
}

#[test]
fn first_stage_failure_never_builds_second_stage() {
    let ledger = Arc::new(Ledger::default());
    let built = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&built);
    let inner = Arc::clone(&ledger);

    let chained = failing("early", &ledger).chain(move |x| {
        counter.fetch_add(1, Ordering::SeqCst);
        tracked("step_b", x, &inner)
    });

    assert_eq!(
        block_on(chained.commit()),
        Err(TestError("early".to_string()))
    );
    assert_eq!(built.load(Ordering::SeqCst), 0);

    assert_eq!(block_on(chained.rollback()), Ok(()));
    assert_eq!(ledger.entries(), vec!["commit failing", "rollback failing"]);
}

#[test]
fn successful_chain_rolls_back_later_stage_first() -> anyhow::Result<()> {
    let ledger = Arc::new(Ledger::default());
    let inner = Arc::clone(&ledger);
    let chained = tracked("step_a", 10, &ledger).chain(move |x| tracked("step_b", x * 2, &inner));

    assert_eq!(block_on(chained.commit())?, 20);
    block_on(chained.rollback())?;

    assert_eq!(
        ledger.entries(),
        vec![
            "commit step_a",
            "commit step_b",
            "rollback step_b",
            "rollback step_a"
        ]
    );
    Ok(())
}

#[test]
fn left_nested_chain_compensates_in_reverse_order() {
    let ledger = Arc::new(Ledger::default());
    let for_b = Arc::clone(&ledger);
    let for_c = Arc::clone(&ledger);

    let chained = tracked("step_a", 1, &ledger)
        .chain(move |x| tracked("step_b", x + 1, &for_b))
        .chain(move |_| failing("abort", &for_c));

    assert_eq!(
        block_on(chained.commit()),
        Err(TestError("abort".to_string()))
    );
    assert_eq!(
        ledger.entries(),
        vec![
            "commit step_a",
            "commit step_b",
            "commit failing",
            "rollback step_b",
            "rollback step_a"
        ]
    );
}

#[test]
fn right_nested_chain_compensates_in_reverse_order() {
    let ledger = Arc::new(Ledger::default());
    let for_b = Arc::clone(&ledger);

    let chained = tracked("step_a", 1, &ledger).chain(move |x| {
        let for_c = Arc::clone(&for_b);
        tracked("step_b", x + 1, &for_b).chain(move |_| failing("abort", &for_c))
    });

    assert_eq!(
        block_on(chained.commit()),
        Err(TestError("abort".to_string()))
    );
    assert_eq!(
        ledger.entries(),
        vec![
            "commit step_a",
            "commit step_b",
            "commit failing",
            "rollback step_b",
            "rollback step_a"
        ]
    );
}

#[test]
fn failed_compensation_keeps_original_commit_failure() {
    let ledger = Arc::new(Ledger::default());
    let inner = Arc::clone(&ledger);
    let first = Transaction::from_step(FailingRollbackStep {
        name: "step_a",
        ledger: Arc::clone(&ledger),
    });

    let chained = first.chain(move |_| failing("boom", &inner));

    assert_eq!(
        block_on(chained.commit()),
        Err(TestError("boom".to_string()))
    );
    assert_eq!(
        ledger.entries(),
        vec!["commit step_a", "commit failing", "failed rollback step_a"]
    );

    assert_eq!(
        block_on(chained.rollback()),
        Err(TestError("cannot undo step_a".to_string()))
    );
    assert_eq!(
        ledger.entries(),
        vec!["commit step_a", "commit failing", "failed rollback step_a"]
    );
}

#[test]
fn rollback_of_committed_chain_reports_stage_failure() {
    let ledger = Arc::new(Ledger::default());
    let inner = Arc::clone(&ledger);
    let chained = tracked("step_a", 1, &ledger).chain(move |_| {
        Transaction::from_step(FailingRollbackStep {
            name: "step_b",
            ledger: Arc::clone(&inner),
        })
    });

    assert_eq!(block_on(chained.commit()), Ok(1));
    assert_eq!(
        block_on(chained.rollback()),
        Err(TestError("cannot undo step_b".to_string()))
    );
    assert!(ledger.entries().contains(&"rollback step_a".to_string()));
}

#[test]
fn step_label_uses_name_and_rollback_description() {
    let ledger = Arc::new(Ledger::default());
    let tx = Transaction::from_step(FailingRollbackStep {
        name: "write_manifest",
        ledger,
    });

    assert_eq!(
        tx.to_string(),
        "Transaction(write_manifest, attempt to undo write_manifest)"
    );
}
