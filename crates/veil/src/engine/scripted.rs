//! Recording engine for dry runs and tests.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{Engine, EngineError, Rows, Session};

#[derive(Debug, Default)]
struct ScriptState {
    log: Vec<String>,
    live: BTreeSet<String>,
    fail_when: Vec<String>,
    latency: Option<Duration>,
}

/// An engine that executes nothing.
///
/// Every statement is logged; `create view` and `drop view` statements are
/// tracked so tests can check which relations are still live. Statements
/// containing a configured fragment fail, and an optional latency is slept
/// before each statement.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every statement containing `fragment`.
    pub fn fail_when(self, fragment: impl Into<String>) -> Self {
        self.lock().fail_when.push(fragment.into());
        self
    }

    /// Sleeps `latency` before each statement.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    /// Every statement received so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Relations created and not yet dropped.
    pub fn live_relations(&self) -> Vec<String> {
        self.lock().live.iter().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Engine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn connect(&self) -> Result<Box<dyn Session>, EngineError> {
        Ok(Box::new(ScriptedSession {
            engine: self.clone(),
        }))
    }
}

struct ScriptedSession {
    engine: ScriptedEngine,
}

impl ScriptedSession {
    fn run(&self, sql: &str) -> Result<(), EngineError> {
        let latency = self.engine.lock().latency;
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }

        let mut state = self.engine.lock();
        state.log.push(sql.to_string());
        if state.fail_when.iter().any(|fragment| sql.contains(fragment.as_str())) {
            return Err(EngineError::statement(sql, "scripted failure"));
        }

        let lowered = sql.trim().to_ascii_lowercase();
        if let Some(rest) = lowered.strip_prefix("create view ") {
            if let Some(name) = rest.split_whitespace().next() {
                if !state.live.insert(name.to_string()) {
                    return Err(EngineError::statement(sql, "relation already exists"));
                }
            }
        } else if let Some(rest) = lowered.strip_prefix("drop view ") {
            let rest = rest.strip_prefix("if exists ").unwrap_or(rest);
            if let Some(name) = rest.split_whitespace().next() {
                state.live.remove(name.trim_end_matches(';'));
            }
        }
        Ok(())
    }
}

impl Session for ScriptedSession {
    fn execute(&mut self, sql: &str) -> Result<(), EngineError> {
        self.run(sql)
    }

    fn query(&mut self, sql: &str) -> Result<Rows, EngineError> {
        self.run(sql)?;
        Ok(Rows::default())
    }

    fn relation_exists(&mut self, name: &str) -> Result<bool, EngineError> {
        Ok(self.engine.lock().live.contains(&name.to_ascii_lowercase()))
    }
}
