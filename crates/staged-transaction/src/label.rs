use std::any::type_name;
use std::fmt;
use std::sync::Arc;

/// Textual description of a transaction's two computations.
///
/// Labels are built bottom-up as transactions are composed, so a composed
/// transaction renders the shape of everything it was built from.
#[derive(Clone)]
pub(crate) struct Label {
    pub(crate) commit: Arc<str>,
    pub(crate) rollback: Arc<str>,
}

impl Label {
    pub(crate) fn new(commit: impl Into<Arc<str>>, rollback: impl Into<Arc<str>>) -> Self {
        Self {
            commit: commit.into(),
            rollback: rollback.into(),
        }
    }

    pub(crate) fn unit() -> Self {
        Self::new("of", "of")
    }

    pub(crate) fn closures<C, R>() -> Self {
        Self::new(type_name::<C>(), type_name::<R>())
    }

    pub(crate) fn map<F>(&self) -> Self {
        Self::new(
            format!("map({}, {})", self.commit, type_name::<F>()),
            Arc::clone(&self.rollback),
        )
    }

    pub(crate) fn chain<F>(&self) -> Self {
        Self::new(
            format!("chain({}, {})", self.commit, type_name::<F>()),
            format!("chain_rollback({})", self.rollback),
        )
    }

    pub(crate) fn ap(&self, other: &Label) -> Self {
        Self::new(
            format!("ap({}, {})", self.commit, other.commit),
            format!("rollback_both({}, {})", self.rollback, other.rollback),
        )
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transaction({}, {})", self.commit, self.rollback)
    }
}
