//! Ephemeral view lifecycle.
//!
//! Every relation a cycle creates is recorded in a [`ViewLedger`] before the
//! cycle moves on. A [`ViewScope`] drops them in reverse creation order,
//! either explicitly through [`ViewScope::release`] or when it goes out of
//! scope. The ledger is shared with the cycle, so a cycle that gave up on
//! its worker can still drop whatever the worker left behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};
use veil_types::EphemeralView;

use crate::engine::{Engine, EngineError, Session};
use crate::error::{CycleError, Result};

/// Names of the relations a cycle currently owns, in creation order.
#[derive(Debug, Default)]
pub struct ViewLedger {
    names: Mutex<Vec<String>>,
    abandoned: AtomicBool,
}

impl ViewLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, name: &str) {
        self.lock().push(name.to_string());
    }

    /// Forgets `name`; returns whether it was recorded.
    pub fn remove(&self, name: &str) -> bool {
        let mut names = self.lock();
        match names.iter().rposition(|n| n == name) {
            Some(idx) => {
                names.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().iter().any(|n| n == name)
    }

    /// Recorded names, oldest first.
    pub fn names(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Marks the cycle as given up; scopes on this ledger refuse further work.
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }
}

fn drop_view_sql(name: &str) -> String {
    format!("drop view if exists {name}")
}

/// Drops every recorded relation through `session`, newest first.
///
/// Names whose drop failed stay in the ledger; the first failure is
/// returned after every drop has been attempted.
fn release_into(
    session: &mut dyn Session,
    ledger: &ViewLedger,
) -> std::result::Result<(), EngineError> {
    let mut first_err = None;
    for name in ledger.names().into_iter().rev() {
        match session.execute(&drop_view_sql(&name)) {
            Ok(()) => {
                ledger.remove(&name);
                debug!(view = %name, "View dropped");
            }
            Err(err) => {
                warn!(view = %name, error = %err, "Failed to drop view");
                first_err.get_or_insert(err);
            }
        }
    }
    first_err.map_or(Ok(()), Err)
}

/// Drops whatever `ledger` still holds through a newly opened session.
///
/// Used when the session that created the views is unavailable, e.g. held
/// by a worker that outlived its deadline.
pub fn release_with_fresh_session(
    engine: &dyn Engine,
    ledger: &ViewLedger,
) -> std::result::Result<(), EngineError> {
    if ledger.is_empty() {
        return Ok(());
    }
    let mut session = engine.connect()?;
    release_into(session.as_mut(), ledger)
}

/// A session plus the relations created through it.
pub struct ViewScope {
    session: Box<dyn Session>,
    ledger: Arc<ViewLedger>,
}

impl ViewScope {
    pub fn new(session: Box<dyn Session>, ledger: Arc<ViewLedger>) -> Self {
        Self { session, ledger }
    }

    /// Fails with [`CycleError::ViewConflict`] when `name` is already taken.
    fn ensure_free(&mut self, name: &str) -> Result<()> {
        if self.ledger.contains(name) || self.session.relation_exists(name)? {
            return Err(CycleError::ViewConflict {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Creates a filtering view. Existing relations are never replaced.
    pub fn create(&mut self, view: &EphemeralView) -> Result<()> {
        self.create_relation(&view.name, &view.create_sql())
    }

    /// Fails with [`CycleError::Abandoned`] once the cycle gave up on this scope.
    pub fn ensure_live(&self) -> Result<()> {
        if self.ledger.is_abandoned() {
            return Err(CycleError::Abandoned);
        }
        Ok(())
    }

    /// Runs `sql`, which creates the relation `name`, and records it.
    pub fn create_relation(&mut self, name: &str, sql: &str) -> Result<()> {
        self.ensure_live()?;
        self.ensure_free(name)?;
        self.session.execute(sql)?;
        self.adopt(name);
        debug!(view = %name, "View created");
        Ok(())
    }

    /// Records a relation created outside [`ViewScope::create`].
    pub fn adopt(&self, name: &str) {
        self.ledger.record(name);
    }

    /// Stops tracking a relation dropped outside this scope.
    pub fn forget(&self, name: &str) {
        self.ledger.remove(name);
    }

    pub fn session(&mut self) -> &mut dyn Session {
        self.session.as_mut()
    }

    pub fn ledger(&self) -> &ViewLedger {
        &self.ledger
    }

    /// Drops every relation still recorded, newest first.
    pub fn release(&mut self) -> std::result::Result<(), EngineError> {
        release_into(self.session.as_mut(), &self.ledger)
    }
}

impl Drop for ViewScope {
    fn drop(&mut self) {
        if self.ledger.is_empty() {
            return;
        }
        if let Err(err) = self.release() {
            warn!(error = %err, remaining = ?self.ledger.names(), "Views left behind");
        }
    }
}
