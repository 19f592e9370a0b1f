use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};

use crate::error::{OrmError, Result};
use crate::source::SqlSource;
use crate::sql_dialect::{ColumnInfo, DialectRegistry, SqlDialect};
use crate::sql_text::to_numbered_params;
use crate::traits::{DriverRegistry, SqlCursorBackend, SqlDriver};
use crate::value::{Row, Rows, Value, ValueType};

/// One statement slot on a connection.
///
/// Owns its backend cursor; a new `prepare` replaces the previous
/// statement. Shares the connection's bad latch and activity flag, so a
/// failure on any cursor poisons the connection for pooling callers.
pub struct SqlCursor {
    backend: Box<dyn SqlCursorBackend>,
    echo: bool,
    conv_params: bool,
    numbered_params: bool,
    bad: Arc<AtomicBool>,
    activity: Arc<AtomicBool>,
}

impl SqlCursor {
    fn guard<T>(&self, r: Result<T>) -> Result<T> {
        if let Err(e) = &r {
            if !self.bad.swap(true, Ordering::Relaxed) {
                warn!("mark connection bad, because of {}", e);
            }
        }
        r
    }

    pub fn exec_direct(&mut self, sql: &str) -> Result<()> {
        if self.echo {
            debug!("exec_direct: {}", sql);
        }
        self.activity.store(true, Ordering::Relaxed);
        let r = self.backend.exec_direct(sql);
        self.guard(r)
    }

    pub fn prepare(&mut self, sql: &str) -> Result<()> {
        let fixed;
        let sql = if self.conv_params && self.numbered_params {
            fixed = to_numbered_params(sql);
            &fixed
        } else {
            sql
        };
        if self.echo {
            debug!("prepare: {}", sql);
        }
        self.activity.store(true, Ordering::Relaxed);
        let r = self.backend.prepare(sql);
        self.guard(r)
    }

    pub fn bind_params(&mut self, types: &[ValueType]) -> Result<()> {
        if self.echo {
            let names: Vec<&str> = types.iter().map(|t| t.name()).collect();
            debug!("bind: ({})", names.join(", "));
        }
        let r = self.backend.bind_params(types);
        self.guard(r)
    }

    pub fn exec(&mut self, params: &[Value]) -> Result<()> {
        if self.echo {
            let rendered: Vec<String> = params
                .iter()
                .enumerate()
                .map(|(i, p)| format!("p{}=\"{}\"", i + 1, p.sql_str()))
                .collect();
            debug!("exec prepared: {}", rendered.join(" "));
        }
        self.activity.store(true, Ordering::Relaxed);
        let r = self.backend.exec(params);
        self.guard(r)
    }

    /// Next row with column names upper-cased, or `None` at the end.
    pub fn fetch_row(&mut self) -> Result<Option<Row>> {
        let r = self.backend.fetch_row();
        let r = self.guard(r)?;
        let row = r.map(|mut row| {
            for (name, _) in row.iter_mut() {
                *name = name.to_uppercase();
            }
            row
        });
        if self.echo {
            match &row {
                Some(row) => {
                    let rendered: Vec<String> = row
                        .iter()
                        .map(|(n, v)| format!("{}={}", n, v.sql_str()))
                        .collect();
                    debug!("fetch: {}", rendered.join(" "));
                }
                None => debug!("fetch: no more rows"),
            }
        }
        Ok(row)
    }

    /// Stream the pending rows, borrowing this cursor.
    pub fn result_set(&mut self) -> SqlResultSet<'_> {
        SqlResultSet::borrowed(self)
    }

    /// Buffer up to `max_rows` rows (`None` = all).
    pub fn fetch_rows(&mut self, max_rows: Option<usize>) -> Result<Rows> {
        self.result_set().fetch_rows(max_rows)
    }
}

enum CursorRef<'a> {
    Borrowed(&'a mut SqlCursor),
    Owned(Box<SqlCursor>),
}

impl CursorRef<'_> {
    fn get(&mut self) -> &mut SqlCursor {
        match self {
            CursorRef::Borrowed(c) => c,
            CursorRef::Owned(c) => c,
        }
    }
}

/// Lazy, finite, non-restartable row sequence with one-row look-ahead.
///
/// May own its cursor, so that a streaming result keeps the statement
/// alive until exhaustion.
pub struct SqlResultSet<'a> {
    cursor: CursorRef<'a>,
    peeked: Option<Option<Row>>,
}

impl<'a> SqlResultSet<'a> {
    pub fn borrowed(cursor: &'a mut SqlCursor) -> Self {
        Self {
            cursor: CursorRef::Borrowed(cursor),
            peeked: None,
        }
    }

    pub fn fetch(&mut self) -> Result<Option<Row>> {
        match self.peeked.take() {
            Some(row) => Ok(row),
            None => self.cursor.get().fetch_row(),
        }
    }

    /// Look at the next row without consuming it.
    pub fn peek(&mut self) -> Result<Option<&Row>> {
        if self.peeked.is_none() {
            let row = self.cursor.get().fetch_row()?;
            self.peeked = Some(row);
        }
        Ok(self.peeked.as_ref().and_then(|r| r.as_ref()))
    }

    pub fn fetch_rows(&mut self, max_rows: Option<usize>) -> Result<Rows> {
        let mut rows = Rows::new();
        while max_rows.map_or(true, |max| rows.len() < max) {
            match self.fetch()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }
}

impl SqlResultSet<'static> {
    /// Take ownership of the cursor so the stream outlives the caller's
    /// borrow of the connection.
    pub fn owning(cursor: SqlCursor) -> Self {
        Self {
            cursor: CursorRef::Owned(Box::new(cursor)),
            peeked: None,
        }
    }
}

impl Iterator for SqlResultSet<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetch().transpose()
    }
}

/// An open database connection.
///
/// Owns the backend and one optional prepared-cursor slot used by the
/// convenience `prepare`/`exec`/`fetch_row` methods. Latches itself "bad"
/// when any call fails, so pooling callers discard it instead of reusing.
pub struct SqlConnection {
    source: SqlSource,
    driver: Arc<dyn SqlDriver>,
    dialect: Arc<dyn SqlDialect>,
    backend: Box<dyn crate::traits::SqlConnectionBackend>,
    cursor: Option<SqlCursor>,
    echo: bool,
    conv_params: bool,
    bad: Arc<AtomicBool>,
    activity: Arc<AtomicBool>,
    explicit_trans_started: bool,
}

impl SqlConnection {
    /// Open a connection described by `source`, resolving the driver and
    /// dialect through the given registries.
    pub fn open(
        drivers: &DriverRegistry,
        dialects: &DialectRegistry,
        source: SqlSource,
    ) -> Result<Self> {
        let driver = drivers.find(source.driver())?;
        let dialect = dialects.find(source.dialect())?;
        let mut source = source;
        source.set("&driver", driver.name().to_uppercase());
        let mut backend = driver.create_backend()?;
        backend.open(dialect.as_ref(), &source)?;
        Ok(Self {
            source,
            driver,
            dialect,
            backend,
            cursor: None,
            echo: false,
            conv_params: false,
            bad: Arc::new(AtomicBool::new(false)),
            activity: Arc::new(AtomicBool::new(false)),
            explicit_trans_started: false,
        })
    }

    pub fn from_url(
        drivers: &DriverRegistry,
        dialects: &DialectRegistry,
        url: &str,
    ) -> Result<Self> {
        Self::open(drivers, dialects, SqlSource::from_url(url)?)
    }

    pub fn source(&self) -> &SqlSource {
        &self.source
    }

    pub fn driver(&self) -> &Arc<dyn SqlDriver> {
        &self.driver
    }

    pub fn dialect(&self) -> &Arc<dyn SqlDialect> {
        &self.dialect
    }

    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    /// Rewrite `?` placeholders for drivers wanting numbered params.
    pub fn set_convert_params(&mut self, conv: bool) {
        self.conv_params = conv;
    }

    pub fn bad(&self) -> bool {
        self.bad.load(Ordering::Relaxed)
    }

    pub fn activity(&self) -> bool {
        self.activity.load(Ordering::Relaxed)
    }

    pub fn explicit_trans_started(&self) -> bool {
        self.explicit_trans_started
    }

    pub fn explicit_transaction_control(&self) -> bool {
        self.driver.explicit_begin_trans_required()
    }

    fn mark_bad(&self, e: &OrmError) {
        if !self.bad.swap(true, Ordering::Relaxed) {
            warn!("mark connection bad, because of {}", e);
        }
    }

    pub fn new_cursor(&mut self) -> Result<SqlCursor> {
        match self.backend.new_cursor() {
            Ok(backend) => Ok(SqlCursor {
                backend,
                echo: self.echo,
                conv_params: self.conv_params,
                numbered_params: self.driver.numbered_params(),
                bad: self.bad.clone(),
                activity: self.activity.clone(),
            }),
            Err(e) => {
                self.mark_bad(&e);
                Err(e)
            }
        }
    }

    /// Start a transaction exactly when the driver requires explicit
    /// transaction control and none is active.
    pub fn begin_trans_if_necessary(&mut self) -> Result<()> {
        if self.explicit_transaction_control() && !self.explicit_trans_started {
            self.begin_trans()?;
        }
        Ok(())
    }

    pub fn begin_trans(&mut self) -> Result<()> {
        debug!("begin transaction");
        match self.backend.begin_trans() {
            Ok(()) => {
                self.explicit_trans_started = true;
                Ok(())
            }
            Err(e) => {
                self.mark_bad(&e);
                Err(e)
            }
        }
    }

    pub fn commit(&mut self) -> Result<()> {
        if !self.explicit_transaction_control() || self.explicit_trans_started {
            if self.echo {
                debug!("commit");
            }
            if let Err(e) = self.backend.commit() {
                self.mark_bad(&e);
                return Err(e);
            }
        }
        self.activity.store(false, Ordering::Relaxed);
        self.explicit_trans_started = false;
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        if !self.explicit_transaction_control() || self.explicit_trans_started {
            if self.echo {
                debug!("rollback");
            }
            if let Err(e) = self.backend.rollback() {
                self.mark_bad(&e);
                return Err(e);
            }
        }
        self.activity.store(false, Ordering::Relaxed);
        self.explicit_trans_started = false;
        Ok(())
    }

    /// Drop the prepared-cursor slot.
    pub fn clear(&mut self) {
        self.cursor = None;
    }

    pub fn exec_direct(&mut self, sql: &str) -> Result<()> {
        let mut cursor = self.new_cursor()?;
        cursor.exec_direct(sql)
    }

    pub fn prepare(&mut self, sql: &str) -> Result<()> {
        self.cursor = None;
        let mut cursor = self.new_cursor()?;
        cursor.prepare(sql)?;
        self.cursor = Some(cursor);
        Ok(())
    }

    pub fn exec(&mut self, params: &[Value]) -> Result<SqlResultSet<'_>> {
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| OrmError::bad_sql("exec without prepare"))?;
        cursor.exec(params)?;
        Ok(cursor.result_set())
    }

    pub fn fetch_row(&mut self) -> Result<Option<Row>> {
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| OrmError::bad_sql("fetch without prepare"))?;
        cursor.fetch_row()
    }

    pub fn fetch_rows(&mut self, max_rows: Option<usize>) -> Result<Rows> {
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| OrmError::bad_sql("fetch without prepare"))?;
        cursor.fetch_rows(max_rows)
    }

    /// Toggle explicit-id inserts where the dialect wants a statement for
    /// it, optionally swallowing errors.
    pub fn grant_insert_id(
        &mut self,
        table_name: &str,
        on: bool,
        ignore_errors: bool,
    ) -> Result<()> {
        let dialect = self.dialect.clone();
        let sql = dialect.grant_insert_id_statement(table_name, on);
        if sql.is_empty() {
            return Ok(());
        }
        match self.exec_direct(&sql) {
            Ok(()) => Ok(()),
            Err(e) if ignore_errors => {
                warn!("ignored DB error: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // -- schema introspection, delegated to the dialect --

    pub fn table_exists(&mut self, table: &str) -> Result<bool> {
        let dialect = self.dialect.clone();
        dialect.table_exists(self, table)
    }

    pub fn view_exists(&mut self, table: &str) -> Result<bool> {
        let dialect = self.dialect.clone();
        dialect.view_exists(self, table)
    }

    pub fn get_tables(&mut self) -> Result<Vec<String>> {
        let dialect = self.dialect.clone();
        dialect.get_tables(self)
    }

    pub fn get_views(&mut self) -> Result<Vec<String>> {
        let dialect = self.dialect.clone();
        dialect.get_views(self)
    }

    pub fn get_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>> {
        let dialect = self.dialect.clone();
        dialect.get_columns(self, table)
    }
}

impl Drop for SqlConnection {
    fn drop(&mut self) {
        self.cursor = None;
        if self.activity() {
            if let Err(e) = self.rollback() {
                warn!("error while closing connection: {}", e);
            }
        }
        if let Err(e) = self.backend.close() {
            warn!("error while closing connection: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql_dialect::DialectRegistry;
    use crate::value::Value;
    use crate::test_support::{FakeCall, FakeDriver, row};

    fn connect(driver: &FakeDriver, dialect: &str) -> SqlConnection {
        let mut drivers = DriverRegistry::new();
        drivers.register(Arc::new(driver.clone()));
        let dialects = DialectRegistry::standard();
        SqlConnection::from_url(&drivers, &dialects, &format!("{}+fake://testdb", dialect))
            .unwrap()
    }

    #[test]
    fn exec_and_fetch_require_a_prepared_statement() {
        let driver = FakeDriver::new();
        let mut conn = connect(&driver, "mysql");
        assert!(matches!(
            conn.exec(&[]),
            Err(OrmError::BadSqlOperation(_))
        ));
        assert!(matches!(
            conn.fetch_row(),
            Err(OrmError::BadSqlOperation(_))
        ));
        conn.prepare("SELECT 1").unwrap();
        conn.exec(&[]).unwrap();
        assert!(conn.fetch_row().unwrap().is_none());
    }

    #[test]
    fn fetched_column_names_are_upper_cased() {
        let driver = FakeDriver::new().with_query_result(
            "SELECT id FROM t",
            vec![row(vec![("id", Value::LongInt(1))])],
        );
        let mut conn = connect(&driver, "mysql");
        conn.prepare("SELECT id FROM t").unwrap();
        let mut rs = conn.exec(&[]).unwrap();
        let fetched = rs.fetch().unwrap().unwrap();
        assert_eq!(fetched[0].0, "ID");
    }

    #[test]
    fn a_failing_statement_latches_the_connection_bad() {
        let driver = FakeDriver::new().with_query_error("SELECT boom", "boom");
        let mut conn = connect(&driver, "mysql");
        assert!(!conn.bad());
        conn.prepare("SELECT boom").unwrap();
        assert!(conn.exec(&[]).is_err());
        assert!(conn.bad());
    }

    #[test]
    fn numbered_param_conversion_happens_at_prepare_time() {
        let driver = FakeDriver::new().with_numbered_params();
        let mut conn = connect(&driver, "oracle");
        conn.set_convert_params(true);
        conn.prepare("SELECT A FROM T WHERE B = ? AND C = ?").unwrap();
        conn.exec(&[Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(
            driver.statements(),
            ["SELECT A FROM T WHERE B = :1 AND C = :2"]
        );
    }

    #[test]
    fn transactions_follow_the_driver_policy() {
        let driver = FakeDriver::new();
        let mut conn = connect(&driver, "mysql");
        assert!(conn.explicit_transaction_control());
        conn.begin_trans_if_necessary().unwrap();
        assert!(conn.explicit_trans_started());
        // a second call is a no-op
        conn.begin_trans_if_necessary().unwrap();
        conn.commit().unwrap();
        assert!(!conn.explicit_trans_started());
        let begins = driver
            .calls()
            .iter()
            .filter(|c| matches!(c, FakeCall::Begin))
            .count();
        assert_eq!(begins, 1);

        // commit without a started transaction stays local
        conn.commit().unwrap();
        let commits = driver
            .calls()
            .iter()
            .filter(|c| matches!(c, FakeCall::Commit))
            .count();
        assert_eq!(commits, 1);
    }

    #[test]
    fn result_set_peek_does_not_consume() {
        let driver = FakeDriver::new().with_query_result(
            "SELECT N FROM T",
            vec![
                row(vec![("N", Value::Int(1))]),
                row(vec![("N", Value::Int(2))]),
            ],
        );
        let mut conn = connect(&driver, "mysql");
        let mut cursor = conn.new_cursor().unwrap();
        cursor.prepare("SELECT N FROM T").unwrap();
        cursor.exec(&[]).unwrap();
        let mut rs = cursor.result_set();
        assert_eq!(rs.peek().unwrap().unwrap()[0].1, Value::Int(1));
        assert_eq!(rs.fetch().unwrap().unwrap()[0].1, Value::Int(1));
        assert_eq!(rs.fetch().unwrap().unwrap()[0].1, Value::Int(2));
        assert!(rs.peek().unwrap().is_none());
        assert!(rs.fetch().unwrap().is_none());
    }
}
