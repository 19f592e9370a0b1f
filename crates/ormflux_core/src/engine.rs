use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;

use crate::connection::{SqlConnection, SqlResultSet};
use crate::error::{OrmError, Result};
use crate::expression::{Expr, SelectExpr, SqlGeneratorContext, SqlGeneratorOptions};
use crate::schema::{Key, Schema, Table};
use crate::source::SqlSource;
use crate::sql_dialect::{DialectRegistry, SqlDialect};
use crate::sql_generation::SqlSchemaGenerator;
use crate::traits::DriverRegistry;
use crate::value::{Row, Rows, Value, Values, ValueType};

/// Write-permission policy of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    ReadOnly,
    ReadWrite,
    /// Like ReadWrite, but the caller drives transactions explicitly.
    Manual,
}

/// Higher-level CRUD on top of the expression algebra and one connection.
pub struct Engine {
    mode: EngineMode,
    conn: SqlConnection,
    /// Window within which one failed streaming select is retried after a
    /// reconnect.
    pub retry_window: Duration,
    reconnect_source: Option<(DriverRegistry, DialectRegistry, SqlSource)>,
}

impl Engine {
    /// Wrap an existing connection; no automatic reconnect.
    pub fn new(mode: EngineMode, conn: SqlConnection) -> Self {
        Self {
            mode,
            conn,
            retry_window: Duration::from_millis(500),
            reconnect_source: None,
        }
    }

    /// Open a fresh connection from a source; keeps the registries around
    /// so a broken connection can be re-opened once per failed select.
    pub fn open(
        mode: EngineMode,
        drivers: &DriverRegistry,
        dialects: &DialectRegistry,
        source: SqlSource,
    ) -> Result<Self> {
        let conn = SqlConnection::open(drivers, dialects, source.clone())?;
        Ok(Self {
            mode,
            conn,
            retry_window: Duration::from_millis(500),
            reconnect_source: Some((drivers.clone(), dialects.clone(), source)),
        })
    }

    /// Open from the `YBORM_*` environment.
    pub fn from_env(
        mode: EngineMode,
        drivers: &DriverRegistry,
        dialects: &DialectRegistry,
    ) -> Result<Self> {
        Self::open(mode, drivers, dialects, SqlSource::from_env()?)
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn dialect(&self) -> Arc<dyn SqlDialect> {
        self.conn.dialect().clone()
    }

    pub fn connection(&mut self) -> &mut SqlConnection {
        &mut self.conn
    }

    pub fn set_echo(&mut self, echo: bool) {
        self.conn.set_echo(echo);
    }

    fn check_write(&self, what: &str) -> Result<()> {
        if self.mode == EngineMode::ReadOnly {
            return Err(OrmError::BadOperationInMode(format!(
                "Using {} operation in read-only mode",
                what
            )));
        }
        Ok(())
    }

    fn touch(&mut self) -> Result<()> {
        self.conn.begin_trans_if_necessary()
    }

    fn make_options(&self) -> SqlGeneratorOptions {
        SqlGeneratorOptions {
            pager_model: self.conn.dialect().pager_model(),
            has_for_update: self.conn.dialect().has_for_update(),
            collect_params: true,
            numbered_params: self.conn.driver().numbered_params(),
            ..Default::default()
        }
    }

    fn placeholder(&self, counter: &mut usize) -> String {
        if self.conn.driver().numbered_params() {
            *counter += 1;
            format!(":{}", counter)
        } else {
            "?".to_string()
        }
    }

    fn exec_select(&mut self, sql: &str, params: &Values) -> Result<SqlResultSet<'static>> {
        self.touch()?;
        let mut cursor = self.conn.new_cursor()?;
        cursor.prepare(sql)?;
        cursor.exec(params)?;
        Ok(SqlResultSet::owning(cursor))
    }

    fn reconnect(&mut self) -> bool {
        let Some((drivers, dialects, source)) = self.reconnect_source.clone() else {
            return false;
        };
        match SqlConnection::open(&drivers, &dialects, source) {
            Ok(conn) => {
                self.conn = conn;
                true
            }
            Err(e) => {
                warn!("reconnect failed: {}", e);
                false
            }
        }
    }

    /// Serialize and execute a SELECT, returning a streaming result set
    /// that owns its cursor. When no transaction is in flight, one early
    /// execution failure triggers a single reconnect-and-retry.
    pub fn select_iter(&mut self, select: &SelectExpr) -> Result<SqlResultSet<'static>> {
        if select.for_update_flag() {
            self.check_write("SELECT FOR UPDATE")?;
        }
        let options = self.make_options();
        let mut ctx = SqlGeneratorContext::new();
        let sql = select.generate_sql(&options, &mut ctx)?;
        if self.conn.activity() {
            return self.exec_select(&sql, &ctx.params);
        }
        let t0 = Instant::now();
        match self.exec_select(&sql, &ctx.params) {
            Ok(rs) => Ok(rs),
            Err(e) if e.is_execution() => {
                if t0.elapsed() > self.retry_window || !self.reconnect() {
                    return Err(e);
                }
                self.exec_select(&sql, &ctx.params)
            }
            Err(e) => Err(e),
        }
    }

    /// Buffered select over (what, from, where).
    pub fn select(&mut self, what: Expr, from: Expr, where_: Expr) -> Result<Rows> {
        let select = SelectExpr::new(what).from_(from).where_(where_);
        let mut rs = self.select_iter(&select)?;
        rs.fetch_rows(None)
    }

    /// Exactly one row, or `NoDataFound`.
    pub fn select_row(&mut self, what: Expr, from: Expr, where_: Expr) -> Result<Row> {
        let mut rows = self.select(what, from, where_)?;
        if rows.len() != 1 {
            return Err(OrmError::NoDataFound(
                "Unable to fetch exactly one row!".to_string(),
            ));
        }
        Ok(rows.pop().expect("just checked the length"))
    }

    /// Exactly one row of one column.
    pub fn select1(&mut self, what: Expr, from: Expr, where_: Expr) -> Result<Value> {
        let row = self.select_row(what, from, where_)?;
        if row.len() != 1 {
            return Err(OrmError::bad_sql("Unable to fetch exactly one column!"));
        }
        Ok(row.into_iter().next().expect("one column").1)
    }

    fn gen_sql_insert(
        &self,
        table: &Table,
        include_pk: bool,
    ) -> (String, Vec<ValueType>, Vec<usize>) {
        let mut names = Vec::new();
        let mut placeholders = Vec::new();
        let mut types = Vec::new();
        let mut param_cols = Vec::new();
        let mut counter = 0usize;
        for (i, column) in table.columns().iter().enumerate() {
            if (!column.is_ro() || column.is_pk()) && (!column.is_pk() || include_pk) {
                names.push(column.name().to_string());
                placeholders.push(self.placeholder(&mut counter));
                types.push(column.ty());
                param_cols.push(i);
            }
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.name(),
            names.join(", "),
            placeholders.join(", ")
        );
        (sql, types, param_cols)
    }

    fn gen_sql_update(&self, table: &Table) -> Result<(String, Vec<ValueType>, Vec<usize>)> {
        if table.pk_fields().is_empty() {
            return Err(OrmError::bad_sql(
                "cannot build update statement: no key in table",
            ));
        }
        let options = self.make_options();
        let mut ctx = SqlGeneratorContext::new();
        let mut sql = format!("UPDATE {} SET ", table.name());
        let mut types = Vec::new();
        let mut param_cols = Vec::new();
        for (i, column) in table.columns().iter().enumerate() {
            if !column.is_pk() && !column.is_ro() {
                if !types.is_empty() {
                    sql.push_str(", ");
                }
                sql.push_str(column.name());
                sql.push_str(" = ");
                if options.numbered_params {
                    ctx.counter += 1;
                    sql.push_str(&format!(":{}", ctx.counter));
                } else {
                    sql.push('?');
                }
                types.push(column.ty());
                param_cols.push(i);
            }
        }
        for pk in table.pk_fields() {
            let i = table.idx_by_name(pk)?;
            types.push(table.column_at(i).ty());
            param_cols.push(i);
        }
        let filter = Expr::key_filter(table.mk_sample_key()?);
        sql.push_str(" WHERE ");
        sql.push_str(&filter.generate_sql(&options, &mut ctx)?);
        Ok((sql, types, param_cols))
    }

    fn gen_sql_delete(&self, table: &Table) -> Result<(String, Vec<ValueType>)> {
        if table.pk_fields().is_empty() {
            return Err(OrmError::bad_sql(
                "cannot build delete statement: no key in table",
            ));
        }
        let options = self.make_options();
        let mut ctx = SqlGeneratorContext::new();
        let mut types = Vec::new();
        for pk in table.pk_fields() {
            types.push(table.column(pk)?.ty());
        }
        let filter = Expr::key_filter(table.mk_sample_key()?);
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            table.name(),
            filter.generate_sql(&options, &mut ctx)?
        );
        Ok((sql, types))
    }

    /// Insert full-width row images (values in table column order). When
    /// `collect_new_ids` is set, the surrogate PK is left out of the
    /// statement and the generated ids are captured after each execute.
    pub fn insert(
        &mut self,
        table: &Table,
        rows: &[Values],
        collect_new_ids: bool,
    ) -> Result<Vec<i64>> {
        self.check_write("INSERT")?;
        let mut ids = Vec::new();
        if rows.is_empty() {
            return Ok(ids);
        }
        self.touch()?;
        let (sql, types, param_cols) = self.gen_sql_insert(table, !collect_new_ids);
        let id_sql = if collect_new_ids {
            Some(self.dialect().select_last_inserted_id(table.name())?)
        } else {
            None
        };
        let mut cursor = self.conn.new_cursor()?;
        cursor.prepare(&sql)?;
        cursor.bind_params(&types)?;
        let mut id_cursor = if id_sql.is_some() {
            Some(self.conn.new_cursor()?)
        } else {
            None
        };
        for row in rows {
            let params: Values = param_cols.iter().map(|&i| row[i].clone()).collect();
            cursor.exec(&params)?;
            if let (Some(id_cursor), Some(id_sql)) = (id_cursor.as_mut(), id_sql.as_deref()) {
                id_cursor.prepare(id_sql)?;
                id_cursor.exec(&[])?;
                let id_rows = id_cursor.fetch_rows(None)?;
                let id = id_rows
                    .first()
                    .and_then(|r| r.first())
                    .ok_or_else(|| OrmError::NoDataFound("no generated id".to_string()))?;
                ids.push(id.1.as_long_int()?);
            }
        }
        Ok(ids)
    }

    /// One prepared UPDATE, executed per row image.
    pub fn update(&mut self, table: &Table, rows: &[Values]) -> Result<()> {
        self.check_write("UPDATE")?;
        if rows.is_empty() {
            return Ok(());
        }
        self.touch()?;
        let (sql, types, param_cols) = self.gen_sql_update(table)?;
        let mut cursor = self.conn.new_cursor()?;
        cursor.prepare(&sql)?;
        cursor.bind_params(&types)?;
        for row in rows {
            let params: Values = param_cols.iter().map(|&i| row[i].clone()).collect();
            cursor.exec(&params)?;
        }
        Ok(())
    }

    /// One prepared DELETE, executed per key.
    pub fn delete_from(&mut self, table: &Table, keys: &[Key]) -> Result<()> {
        self.check_write("DELETE")?;
        if keys.is_empty() {
            return Ok(());
        }
        self.touch()?;
        let (sql, types) = self.gen_sql_delete(table)?;
        let mut cursor = self.conn.new_cursor()?;
        cursor.prepare(&sql)?;
        cursor.bind_params(&types)?;
        for key in keys {
            let params: Values = key.parts().into_iter().map(|(_, v)| v).collect();
            cursor.exec(&params)?;
        }
        Ok(())
    }

    /// Run a procedure or any direct statement.
    pub fn exec_proc(&mut self, proc_code: &str) -> Result<()> {
        self.check_write("PROCEDURE")?;
        self.touch()?;
        let mut cursor = self.conn.new_cursor()?;
        cursor.exec_direct(proc_code)
    }

    pub fn get_curr_value(&mut self, seq_name: &str) -> Result<i64> {
        let what = self.dialect().select_curr_value(seq_name)?;
        let dual = self.dialect().dual_name().to_string();
        self.select1(Expr::sql(what), Expr::sql(dual), Expr::Empty)?
            .as_long_int()
    }

    pub fn get_next_value(&mut self, seq_name: &str) -> Result<i64> {
        let what = self.dialect().select_next_value(seq_name)?;
        let dual = self.dialect().dual_name().to_string();
        self.select1(Expr::sql(what), Expr::sql(dual), Expr::Empty)?
            .as_long_int()
    }

    pub fn commit(&mut self) -> Result<()> {
        self.conn.commit()
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.conn.rollback()
    }

    fn run_ddl(&mut self, sql: &str, ignore_errors: bool) -> Result<()> {
        let mut cursor = self.conn.new_cursor()?;
        match cursor.exec_direct(sql) {
            Ok(()) => Ok(()),
            Err(e) if ignore_errors => {
                warn!("ignored DB error: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Create every table, constraint, index and sequence of the schema.
    pub fn create_schema(&mut self, schema: &Schema, ignore_errors: bool) -> Result<()> {
        self.check_write("CREATE SCHEMA")?;
        let dialect = self.dialect();
        let mut generator = SqlSchemaGenerator::new(schema, dialect.as_ref())?;
        while let Some(sql) = generator.next_statement() {
            self.run_ddl(&sql, ignore_errors)?;
        }
        Ok(())
    }

    /// Drop tables in reverse dependency order, then sequences.
    pub fn drop_schema(&mut self, schema: &Schema, ignore_errors: bool) -> Result<()> {
        self.check_write("DROP SCHEMA")?;
        let mut tables: Vec<&Table> = schema.tables().collect();
        tables.sort_by_key(|t| std::cmp::Reverse(t.depth()));
        for table in &tables {
            self.run_ddl(&format!("DROP TABLE {}", table.name()), ignore_errors)?;
        }
        if self.dialect().has_sequences() {
            let dialect = self.dialect();
            let mut sequences: Vec<&str> = tables.iter().filter_map(|t| t.seq_name()).collect();
            sequences.sort_unstable();
            sequences.dedup();
            for seq in sequences {
                let sql = dialect.drop_sequence(seq)?;
                self.run_ddl(&sql, ignore_errors)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeCall, FakeDriver, client_order_schema, row};

    fn engine_for(driver: &FakeDriver, dialect: &str, mode: EngineMode) -> Engine {
        let mut drivers = DriverRegistry::new();
        drivers.register(Arc::new(driver.clone()));
        let dialects = DialectRegistry::standard();
        let source = SqlSource::from_url(&format!("{}+fake://testdb", dialect)).unwrap();
        Engine::open(mode, &drivers, &dialects, source).unwrap()
    }

    #[test]
    fn select_iter_begins_a_transaction_and_streams_rows() {
        let driver = FakeDriver::new().with_query_result(
            "SELECT T_CLIENT.ID FROM T_CLIENT",
            vec![
                row(vec![("ID", Value::LongInt(1))]),
                row(vec![("ID", Value::LongInt(2))]),
            ],
        );
        let mut engine = engine_for(&driver, "mysql", EngineMode::ReadWrite);
        let select =
            SelectExpr::new(Expr::column("T_CLIENT", "ID")).from_(Expr::sql("T_CLIENT"));
        let mut rs = engine.select_iter(&select).unwrap();
        assert_eq!(rs.peek().unwrap().unwrap()[0].1, Value::LongInt(1));
        let rows = rs.fetch_rows(None).unwrap();
        assert_eq!(rows.len(), 2);
        let calls = driver.calls();
        assert!(calls.contains(&FakeCall::Begin));
    }

    #[test]
    fn insert_excludes_the_surrogate_pk_and_captures_generated_ids() {
        let schema = client_order_schema();
        let driver = FakeDriver::new()
            .with_query_result(
                "SELECT LAST_INSERT_ID() LID",
                vec![row(vec![("LID", Value::LongInt(7))])],
            )
            .with_query_result(
                "SELECT LAST_INSERT_ID() LID",
                vec![row(vec![("LID", Value::LongInt(8))])],
            );
        let mut engine = engine_for(&driver, "mysql", EngineMode::ReadWrite);
        let table = schema.table("T_CLIENT").unwrap();
        let rows = vec![
            vec![Value::Null, Value::Str("one".into()), Value::Null],
            vec![Value::Null, Value::Str("two".into()), Value::Null],
        ];
        let ids = engine.insert(table, &rows, true).unwrap();
        assert_eq!(ids, vec![7, 8]);
        let statements = driver.statements();
        assert_eq!(
            statements[0],
            "INSERT INTO T_CLIENT (NAME, BALANCE) VALUES (?, ?)"
        );
        assert_eq!(statements[1], "SELECT LAST_INSERT_ID() LID");
    }

    #[test]
    fn insert_keyed_rows_includes_the_pk() {
        let schema = client_order_schema();
        let driver = FakeDriver::new();
        let mut engine = engine_for(&driver, "mysql", EngineMode::ReadWrite);
        let table = schema.table("T_CLIENT").unwrap();
        let rows = vec![vec![
            Value::LongInt(-10),
            Value::Str("one".into()),
            Value::Null,
        ]];
        let ids = engine.insert(table, &rows, false).unwrap();
        assert!(ids.is_empty());
        assert_eq!(
            driver.statements(),
            ["INSERT INTO T_CLIENT (ID, NAME, BALANCE) VALUES (?, ?, ?)"]
        );
        let calls = driver.calls();
        let exec = calls
            .iter()
            .find_map(|c| match c {
                FakeCall::Exec { params, .. } => Some(params.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(exec[0], Value::LongInt(-10));
    }

    #[test]
    fn numbered_params_drivers_get_numbered_placeholders() {
        let schema = client_order_schema();
        let driver = FakeDriver::new().with_numbered_params();
        let mut engine = engine_for(&driver, "oracle", EngineMode::ReadWrite);
        let table = schema.table("T_CLIENT").unwrap();
        let rows = vec![vec![
            Value::LongInt(1),
            Value::Str("x".into()),
            Value::Null,
        ]];
        engine.insert(table, &rows, false).unwrap();
        assert_eq!(
            driver.statements(),
            ["INSERT INTO T_CLIENT (ID, NAME, BALANCE) VALUES (:1, :2, :3)"]
        );
    }

    #[test]
    fn update_sets_non_pk_columns_and_filters_by_key() {
        let schema = client_order_schema();
        let driver = FakeDriver::new();
        let mut engine = engine_for(&driver, "mysql", EngineMode::ReadWrite);
        let table = schema.table("T_CLIENT").unwrap();
        let rows = vec![vec![
            Value::LongInt(3),
            Value::Str("renamed".into()),
            Value::Null,
        ]];
        engine.update(table, &rows).unwrap();
        assert_eq!(
            driver.statements(),
            ["UPDATE T_CLIENT SET NAME = ?, BALANCE = ? WHERE T_CLIENT.ID = ?"]
        );
        let calls = driver.calls();
        let params = calls
            .iter()
            .find_map(|c| match c {
                FakeCall::Exec { params, .. } => Some(params.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            params,
            vec![Value::Str("renamed".into()), Value::Null, Value::LongInt(3)]
        );
    }

    #[test]
    fn delete_from_executes_once_per_key() {
        let schema = client_order_schema();
        let driver = FakeDriver::new();
        let mut engine = engine_for(&driver, "mysql", EngineMode::ReadWrite);
        let table = schema.table("T_CLIENT").unwrap();
        let keys = vec![
            table.mk_key_id(-20).unwrap(),
            table.mk_key_id(-30).unwrap(),
        ];
        engine.delete_from(table, &keys).unwrap();
        assert_eq!(
            driver.statements(),
            [
                "DELETE FROM T_CLIENT WHERE T_CLIENT.ID = ?",
                "DELETE FROM T_CLIENT WHERE T_CLIENT.ID = ?"
            ]
        );
    }

    #[test]
    fn writes_fail_in_read_only_mode() {
        let schema = client_order_schema();
        let driver = FakeDriver::new();
        let mut engine = engine_for(&driver, "mysql", EngineMode::ReadOnly);
        let table = schema.table("T_CLIENT").unwrap();
        assert!(matches!(
            engine.insert(table, &[vec![Value::Null; 3]], false),
            Err(OrmError::BadOperationInMode(_))
        ));
        assert!(matches!(
            engine.update(table, &[vec![Value::Null; 3]]),
            Err(OrmError::BadOperationInMode(_))
        ));
        assert!(matches!(
            engine.delete_from(table, &[table.mk_key_id(1).unwrap()]),
            Err(OrmError::BadOperationInMode(_))
        ));
        let select = SelectExpr::new(Expr::sql("1")).from_(Expr::sql("T_CLIENT")).for_update(true);
        assert!(matches!(
            engine.select_iter(&select),
            Err(OrmError::BadOperationInMode(_))
        ));
        assert!(driver.statements().is_empty());
    }

    #[test]
    fn sequence_values_come_from_the_dialect_select() {
        let driver = FakeDriver::new().with_query_result(
            "SELECT NEXTVAL('S_CLIENT_ID')",
            vec![row(vec![("NEXTVAL", Value::LongInt(41))])],
        );
        let mut engine = engine_for(&driver, "postgres", EngineMode::ReadWrite);
        assert_eq!(engine.get_next_value("S_CLIENT_ID").unwrap(), 41);
        // MySQL has no sequences at all
        let mut engine = engine_for(&FakeDriver::new(), "mysql", EngineMode::ReadWrite);
        assert!(matches!(
            engine.get_next_value("S_X"),
            Err(OrmError::SqlDialect(_))
        ));
    }

    #[test]
    fn select_iter_reconnects_once_on_an_early_failure() {
        let driver = FakeDriver::new()
            .with_query_error("SELECT T_CLIENT.ID FROM T_CLIENT", "connection lost")
            .with_query_result(
                "SELECT T_CLIENT.ID FROM T_CLIENT",
                vec![row(vec![("ID", Value::LongInt(5))])],
            )
            .with_autocommit();
        let mut engine = engine_for(&driver, "mysql", EngineMode::ReadWrite);
        let select =
            SelectExpr::new(Expr::column("T_CLIENT", "ID")).from_(Expr::sql("T_CLIENT"));
        let rows = engine
            .select_iter(&select)
            .unwrap()
            .fetch_rows(None)
            .unwrap();
        assert_eq!(rows.len(), 1);
        let opens = driver
            .calls()
            .iter()
            .filter(|c| matches!(c, FakeCall::Open(_)))
            .count();
        assert_eq!(opens, 2);
    }

    #[test]
    fn select_row_demands_exactly_one_row() {
        let driver = FakeDriver::new()
            .with_query_result("SELECT COUNT(*) RCNT FROM T_CLIENT", Vec::new());
        let mut engine = engine_for(&driver, "mysql", EngineMode::ReadWrite);
        assert!(matches!(
            engine.select_row(
                Expr::sql("COUNT(*) RCNT"),
                Expr::sql("T_CLIENT"),
                Expr::Empty
            ),
            Err(OrmError::NoDataFound(_))
        ));
    }

    #[test]
    fn create_and_drop_schema_run_the_ddl_stream() {
        let schema = client_order_schema();
        let driver = FakeDriver::new();
        let mut engine = engine_for(&driver, "postgres", EngineMode::Manual);
        engine.create_schema(&schema, false).unwrap();
        let statements = driver.statements();
        assert!(statements[0].starts_with("CREATE TABLE T_CLIENT"));
        assert!(statements[1].starts_with("CREATE TABLE T_ORDER"));
        assert!(statements.iter().any(|s| s.starts_with("ALTER TABLE T_ORDER ADD FOREIGN KEY")));
        assert!(statements.contains(&"CREATE SEQUENCE S_CLIENT_ID".to_string()));

        driver.clear_calls();
        engine.drop_schema(&schema, false).unwrap();
        let statements = driver.statements();
        assert_eq!(statements[0], "DROP TABLE T_ORDER");
        assert_eq!(statements[1], "DROP TABLE T_CLIENT");
        assert!(statements.contains(&"DROP SEQUENCE S_ORDER_ID".to_string()));
    }
}
