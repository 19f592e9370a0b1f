use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    OrmError, Result, Row, Rows, SqlConnectionBackend, SqlCursorBackend, SqlDialect, SqlDriver,
    SqlSource, Value,
};

/// Scripted answer for one statement.
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    Rows(Rows),
    Error(String),
}

impl FakeOutcome {
    fn to_rows(&self) -> Result<Rows> {
        match self {
            FakeOutcome::Rows(rows) => Ok(rows.clone()),
            FakeOutcome::Error(message) => Err(OrmError::db(message.clone())),
        }
    }
}

/// Journal entry of one backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum FakeCall {
    Open(String),
    ExecDirect(String),
    Exec { sql: String, params: Vec<Value> },
    Begin,
    Commit,
    Rollback,
    Close,
}

#[derive(Default)]
struct FakeState {
    /// Per-statement outcome queues; an exhausted queue repeats its last
    /// entry.
    outcomes: Mutex<HashMap<String, VecDeque<FakeOutcome>>>,
    default_outcome: Mutex<Option<FakeOutcome>>,
    calls: Mutex<Vec<FakeCall>>,
    connect_error: Mutex<Option<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}

impl FakeState {
    fn outcome_for(&self, sql: &str) -> Option<FakeOutcome> {
        let mut outcomes = lock(&self.outcomes);
        if let Some(queue) = outcomes.get_mut(sql) {
            if queue.len() > 1 {
                return queue.pop_front();
            }
            return queue.front().cloned();
        }
        lock(&self.default_outcome).clone()
    }
}

/// Scripted in-memory driver: maps SQL text to canned rows or errors and
/// records every call for assertion.
#[derive(Clone)]
pub struct FakeDriver {
    name: &'static str,
    explicit_begin: bool,
    numbered_params: bool,
    state: Arc<FakeState>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            name: "FAKE",
            explicit_begin: true,
            numbered_params: false,
            state: Arc::new(FakeState::default()),
        }
    }

    pub fn with_autocommit(mut self) -> Self {
        self.explicit_begin = false;
        self
    }

    pub fn with_numbered_params(mut self) -> Self {
        self.numbered_params = true;
        self
    }

    /// Queue one result for the exact SQL text. Repeated calls queue
    /// further results; the last one repeats forever.
    pub fn with_query_result(self, sql: impl Into<String>, rows: Rows) -> Self {
        lock(&self.state.outcomes)
            .entry(sql.into())
            .or_default()
            .push_back(FakeOutcome::Rows(rows));
        self
    }

    pub fn with_query_error(self, sql: impl Into<String>, message: impl Into<String>) -> Self {
        lock(&self.state.outcomes)
            .entry(sql.into())
            .or_default()
            .push_back(FakeOutcome::Error(message.into()));
        self
    }

    pub fn with_default_result(self, rows: Rows) -> Self {
        *lock(&self.state.default_outcome) = Some(FakeOutcome::Rows(rows));
        self
    }

    pub fn with_connect_error(self, message: impl Into<String>) -> Self {
        *lock(&self.state.connect_error) = Some(message.into());
        self
    }

    pub fn set_query_outcome(&self, sql: impl Into<String>, outcome: FakeOutcome) {
        let mut outcomes = lock(&self.state.outcomes);
        let queue = outcomes.entry(sql.into()).or_default();
        queue.clear();
        queue.push_back(outcome);
    }

    pub fn clear_connect_error(&self) {
        *lock(&self.state.connect_error) = None;
    }

    /// Everything executed so far, in order.
    pub fn calls(&self) -> Vec<FakeCall> {
        lock(&self.state.calls).clone()
    }

    /// Just the statements (prepared and direct), in execution order.
    pub fn statements(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                FakeCall::Exec { sql, .. } => Some(sql),
                FakeCall::ExecDirect(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.state.calls).clear();
    }
}

impl SqlDriver for FakeDriver {
    fn name(&self) -> &str {
        self.name
    }

    fn create_backend(&self) -> Result<Box<dyn SqlConnectionBackend>> {
        Ok(Box::new(FakeBackend {
            state: self.state.clone(),
        }))
    }

    fn explicit_begin_trans_required(&self) -> bool {
        self.explicit_begin
    }

    fn numbered_params(&self) -> bool {
        self.numbered_params
    }
}

struct FakeBackend {
    state: Arc<FakeState>,
}

impl SqlConnectionBackend for FakeBackend {
    fn open(&mut self, _dialect: &dyn SqlDialect, source: &SqlSource) -> Result<()> {
        if let Some(message) = lock(&self.state.connect_error).clone() {
            return Err(OrmError::db(message));
        }
        lock(&self.state.calls).push(FakeCall::Open(source.format(true)));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        lock(&self.state.calls).push(FakeCall::Close);
        Ok(())
    }

    fn begin_trans(&mut self) -> Result<()> {
        lock(&self.state.calls).push(FakeCall::Begin);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        lock(&self.state.calls).push(FakeCall::Commit);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        lock(&self.state.calls).push(FakeCall::Rollback);
        Ok(())
    }

    fn new_cursor(&mut self) -> Result<Box<dyn SqlCursorBackend>> {
        Ok(Box::new(FakeCursor {
            state: self.state.clone(),
            prepared: None,
            pending: VecDeque::new(),
        }))
    }
}

struct FakeCursor {
    state: Arc<FakeState>,
    prepared: Option<String>,
    pending: VecDeque<Row>,
}

impl FakeCursor {
    fn run(&mut self, sql: &str) -> Result<()> {
        match self.state.outcome_for(sql) {
            Some(outcome) => {
                self.pending = outcome.to_rows()?.into();
            }
            None => self.pending.clear(),
        }
        Ok(())
    }
}

impl SqlCursorBackend for FakeCursor {
    fn exec_direct(&mut self, sql: &str) -> Result<()> {
        lock(&self.state.calls).push(FakeCall::ExecDirect(sql.to_string()));
        self.run(sql)
    }

    fn prepare(&mut self, sql: &str) -> Result<()> {
        self.prepared = Some(sql.to_string());
        self.pending.clear();
        Ok(())
    }

    fn exec(&mut self, params: &[Value]) -> Result<()> {
        let sql = self
            .prepared
            .clone()
            .ok_or_else(|| OrmError::bad_sql("exec without prepare"))?;
        lock(&self.state.calls).push(FakeCall::Exec {
            sql: sql.clone(),
            params: params.to_vec(),
        });
        self.run(&sql)
    }

    fn fetch_row(&mut self) -> Result<Option<Row>> {
        Ok(self.pending.pop_front())
    }
}
