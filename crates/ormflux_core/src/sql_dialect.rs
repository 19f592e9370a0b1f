use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::connection::SqlConnection;
use crate::error::{OrmError, Result};
use crate::expression::PagerModel;
use crate::value::{Value, ValueType};

/// Introspected column description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
    pub size: usize,
    pub notnull: bool,
    pub default_value: String,
    pub pk: bool,
    pub fk_table: String,
    pub fk_table_key: String,
}

/// Capability vector of one SQL flavor.
///
/// Everything the SQL generator, the DDL generator and the engine need to
/// know about a target database lives behind this trait; statement
/// execution itself does not.
pub trait SqlDialect: Send + Sync {
    fn name(&self) -> &str;

    /// Name of the single-row system table used for scalar selects.
    fn dual_name(&self) -> &str;

    fn has_sequences(&self) -> bool;

    /// Whether the native client strips the leading slash from the parsed
    /// database path itself.
    fn native_driver_eats_slash(&self) -> bool {
        true
    }

    fn select_curr_value(&self, seq_name: &str) -> Result<String>;

    fn select_next_value(&self, seq_name: &str) -> Result<String>;

    fn select_last_inserted_id(&self, _table_name: &str) -> Result<String> {
        Err(OrmError::dialect("No autoincrement flag"))
    }

    /// Literal rendering, including dialect prefixes where required.
    fn sql_value(&self, x: &Value) -> String {
        x.sql_str()
    }

    /// Are FK constraints emitted inline in CREATE TABLE?
    fn fk_internal(&self) -> bool {
        false
    }

    /// Does DDL need an explicit COMMIT after each statement?
    fn commit_ddl(&self) -> bool {
        false
    }

    fn has_for_update(&self) -> bool {
        true
    }

    fn type2sql(&self, t: ValueType) -> Result<String>;

    fn create_sequence(&self, seq_name: &str) -> Result<String>;

    fn drop_sequence(&self, seq_name: &str) -> Result<String>;

    fn suffix_create_table(&self) -> String {
        String::new()
    }

    /// Inline PK flag used together with the autoincrement flag; empty for
    /// dialects that always emit a PRIMARY KEY clause.
    fn primary_key_flag(&self) -> String {
        String::new()
    }

    fn autoinc_flag(&self) -> String {
        String::new()
    }

    fn sysdate_func(&self) -> String {
        "CURRENT_TIMESTAMP".to_string()
    }

    /// Whether nullable columns carry an explicit NULL clause.
    fn explicit_null(&self) -> bool {
        false
    }

    /// Combine the NOT NULL clause with the DEFAULT clause in the order
    /// this dialect expects.
    fn not_null_default(&self, not_null_clause: &str, default_value: &str) -> String {
        match (not_null_clause.is_empty(), default_value.is_empty()) {
            (true, _) => default_value.to_string(),
            (_, true) => not_null_clause.to_string(),
            _ => format!("{} {}", default_value, not_null_clause),
        }
    }

    fn pager_model(&self) -> PagerModel {
        PagerModel::Postgres
    }

    /// Statement toggling explicit id inserts, for dialects that demand it.
    fn grant_insert_id_statement(&self, _table_name: &str, _on: bool) -> String {
        String::new()
    }

    // -- schema introspection --

    fn table_exists(&self, conn: &mut SqlConnection, table: &str) -> Result<bool>;

    fn view_exists(&self, conn: &mut SqlConnection, table: &str) -> Result<bool>;

    fn get_tables(&self, conn: &mut SqlConnection) -> Result<Vec<String>>;

    fn get_views(&self, conn: &mut SqlConnection) -> Result<Vec<String>>;

    fn get_columns(&self, conn: &mut SqlConnection, table: &str) -> Result<Vec<ColumnInfo>>;
}

/// Explicit name registry; nothing registers itself at module init.
#[derive(Clone, Default)]
pub struct DialectRegistry {
    items: IndexMap<String, Arc<dyn SqlDialect>>,
}

impl DialectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The six built-in dialects.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SqliteDialect));
        registry.register(Arc::new(MysqlDialect));
        registry.register(Arc::new(PostgresDialect));
        registry.register(Arc::new(OracleDialect));
        registry.register(Arc::new(InterbaseDialect));
        registry.register(Arc::new(MssqlDialect));
        registry
    }

    pub fn register(&mut self, dialect: Arc<dyn SqlDialect>) -> bool {
        let name = dialect.name().to_uppercase();
        if self.items.contains_key(&name) {
            return false;
        }
        self.items.insert(name, dialect);
        true
    }

    pub fn find(&self, name: &str) -> Result<Arc<dyn SqlDialect>> {
        self.items
            .get(&name.to_uppercase())
            .cloned()
            .ok_or_else(|| OrmError::UnknownDialect(name.to_string()))
    }

    pub fn list(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }
}

fn bad_type() -> OrmError {
    OrmError::dialect("Bad type")
}

fn no_sequences() -> OrmError {
    OrmError::dialect("No sequences, please")
}

fn fetch_all(conn: &mut SqlConnection, sql: &str, params: &[Value]) -> Result<crate::value::Rows> {
    let mut cursor = conn.new_cursor()?;
    cursor.prepare(sql)?;
    cursor.exec(params)?;
    cursor.fetch_rows(None)
}

fn fetch_single_strings(
    conn: &mut SqlConnection,
    sql: &str,
    params: &[Value],
) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for row in fetch_all(conn, sql, params)? {
        if let Some((_, value)) = row.first() {
            names.push(value.as_string()?);
        }
    }
    Ok(names)
}

pub struct SqliteDialect;

impl SqliteDialect {
    fn really_get_tables(
        &self,
        conn: &mut SqlConnection,
        kind: &str,
        name: &str,
        filter_system: bool,
    ) -> Result<Vec<String>> {
        let mut sql = "SELECT name FROM sqlite_master WHERE type=?".to_string();
        let mut params = vec![Value::Str(kind.to_string())];
        if !name.is_empty() {
            sql.push_str(" AND UPPER(name)=UPPER(?)");
            params.push(Value::Str(name.to_string()));
        }
        if filter_system {
            sql.push_str(" AND UPPER(name) NOT IN (?)");
            params.push(Value::Str("SQLITE_SEQUENCE".to_string()));
        }
        let names = fetch_single_strings(conn, &sql, &params)?;
        Ok(names.into_iter().map(|n| n.to_uppercase()).collect())
    }
}

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &str {
        "SQLITE"
    }

    fn dual_name(&self) -> &str {
        ""
    }

    fn has_sequences(&self) -> bool {
        false
    }

    fn select_curr_value(&self, _seq_name: &str) -> Result<String> {
        Err(no_sequences())
    }

    fn select_next_value(&self, _seq_name: &str) -> Result<String> {
        Err(no_sequences())
    }

    fn select_last_inserted_id(&self, table_name: &str) -> Result<String> {
        Ok(format!(
            "SELECT SEQ FROM SQLITE_SEQUENCE WHERE NAME = '{}'",
            table_name
        ))
    }

    fn fk_internal(&self) -> bool {
        true
    }

    fn has_for_update(&self) -> bool {
        false
    }

    fn type2sql(&self, t: ValueType) -> Result<String> {
        Ok(match t {
            ValueType::Int => "INTEGER".to_string(),
            ValueType::LongInt => "INTEGER".to_string(),
            ValueType::Str => "VARCHAR".to_string(),
            ValueType::Decimal => "NUMERIC".to_string(),
            ValueType::DateTime => "TIMESTAMP".to_string(),
            ValueType::Float => "DOUBLE PRECISION".to_string(),
            _ => return Err(bad_type()),
        })
    }

    fn create_sequence(&self, _seq_name: &str) -> Result<String> {
        Err(no_sequences())
    }

    fn drop_sequence(&self, _seq_name: &str) -> Result<String> {
        Err(no_sequences())
    }

    fn primary_key_flag(&self) -> String {
        "PRIMARY KEY".to_string()
    }

    fn autoinc_flag(&self) -> String {
        "AUTOINCREMENT".to_string()
    }

    fn table_exists(&self, conn: &mut SqlConnection, table: &str) -> Result<bool> {
        Ok(self.really_get_tables(conn, "table", table, false)?.len() == 1)
    }

    fn view_exists(&self, conn: &mut SqlConnection, table: &str) -> Result<bool> {
        Ok(self.really_get_tables(conn, "view", table, false)?.len() == 1)
    }

    fn get_tables(&self, conn: &mut SqlConnection) -> Result<Vec<String>> {
        self.really_get_tables(conn, "table", "", true)
    }

    fn get_views(&self, conn: &mut SqlConnection) -> Result<Vec<String>> {
        self.really_get_tables(conn, "view", "", true)
    }

    fn get_columns(&self, conn: &mut SqlConnection, table: &str) -> Result<Vec<ColumnInfo>> {
        let mut columns: Vec<ColumnInfo> = Vec::new();
        for row in fetch_all(conn, &format!("PRAGMA table_info('{}')", table), &[])? {
            let mut info = ColumnInfo::default();
            for (name, value) in &row {
                match name.as_str() {
                    "NAME" => info.name = value.as_string()?.to_uppercase(),
                    "TYPE" => {
                        info.type_name = value.as_string()?.to_uppercase();
                        if let Some(open_par) = info.type_name.find('(') {
                            let inner: String = info.type_name
                                [open_par + 1..info.type_name.len() - 1]
                                .to_string();
                            if let Ok(size) = inner.parse() {
                                info.size = size;
                                info.type_name.truncate(open_par);
                            }
                        }
                    }
                    "NOTNULL" => info.notnull = value.as_string()? != "0",
                    "DFLT_VALUE" => {
                        if !value.is_null() {
                            info.default_value = value.as_string()?;
                        }
                    }
                    "PK" => info.pk = value.as_string()? != "0",
                    _ => {}
                }
            }
            columns.push(info);
        }
        for row in fetch_all(conn, &format!("PRAGMA foreign_key_list('{}')", table), &[])? {
            let mut fk_column = String::new();
            let mut fk_table = String::new();
            let mut fk_table_key = String::new();
            for (name, value) in &row {
                if value.is_null() {
                    continue;
                }
                match name.as_str() {
                    "TABLE" => fk_table = value.as_string()?,
                    "FROM" => fk_column = value.as_string()?,
                    "TO" => fk_table_key = value.as_string()?,
                    _ => {}
                }
            }
            if let Some(info) = columns.iter_mut().find(|c| c.name == fk_column) {
                info.fk_table = fk_table;
                info.fk_table_key = fk_table_key;
            }
        }
        Ok(columns)
    }
}

pub struct MysqlDialect;

impl MysqlDialect {
    fn really_get_tables(
        &self,
        conn: &mut SqlConnection,
        table: &str,
        view: bool,
    ) -> Result<Vec<String>> {
        let mut sql = "SHOW TABLE STATUS WHERE 1=1".to_string();
        if view {
            sql.push_str(" AND Comment = 'VIEW'");
        } else {
            sql.push_str(" AND Comment != 'VIEW'");
        }
        if !table.is_empty() {
            sql.push_str(&format!(" AND UPPER(NAME) = UPPER('{}')", table));
        }
        fetch_single_strings(conn, &sql, &[])
    }
}

impl SqlDialect for MysqlDialect {
    fn name(&self) -> &str {
        "MYSQL"
    }

    fn dual_name(&self) -> &str {
        "DUAL"
    }

    fn has_sequences(&self) -> bool {
        false
    }

    fn select_curr_value(&self, _seq_name: &str) -> Result<String> {
        Err(no_sequences())
    }

    fn select_next_value(&self, _seq_name: &str) -> Result<String> {
        Err(no_sequences())
    }

    fn select_last_inserted_id(&self, _table_name: &str) -> Result<String> {
        Ok("SELECT LAST_INSERT_ID() LID".to_string())
    }

    fn type2sql(&self, t: ValueType) -> Result<String> {
        Ok(match t {
            ValueType::Int => "INT".to_string(),
            ValueType::LongInt => "BIGINT".to_string(),
            ValueType::Str => "VARCHAR".to_string(),
            ValueType::Decimal => "DECIMAL(16,6)".to_string(),
            ValueType::DateTime => "TIMESTAMP".to_string(),
            ValueType::Float => "DOUBLE".to_string(),
            _ => return Err(bad_type()),
        })
    }

    fn create_sequence(&self, _seq_name: &str) -> Result<String> {
        Err(no_sequences())
    }

    fn drop_sequence(&self, _seq_name: &str) -> Result<String> {
        Err(no_sequences())
    }

    fn suffix_create_table(&self) -> String {
        " ENGINE=INNODB DEFAULT CHARSET=utf8".to_string()
    }

    fn autoinc_flag(&self) -> String {
        "AUTO_INCREMENT".to_string()
    }

    fn explicit_null(&self) -> bool {
        true
    }

    fn not_null_default(&self, not_null_clause: &str, default_value: &str) -> String {
        match (not_null_clause.is_empty(), default_value.is_empty()) {
            (true, _) => default_value.to_string(),
            (_, true) => not_null_clause.to_string(),
            _ => format!("{} {}", not_null_clause, default_value),
        }
    }

    fn pager_model(&self) -> PagerModel {
        PagerModel::Mysql
    }

    fn table_exists(&self, conn: &mut SqlConnection, table: &str) -> Result<bool> {
        Ok(!self.really_get_tables(conn, table, false)?.is_empty())
    }

    fn view_exists(&self, conn: &mut SqlConnection, table: &str) -> Result<bool> {
        Ok(!self.really_get_tables(conn, table, true)?.is_empty())
    }

    fn get_tables(&self, conn: &mut SqlConnection) -> Result<Vec<String>> {
        self.really_get_tables(conn, "", false)
    }

    fn get_views(&self, conn: &mut SqlConnection) -> Result<Vec<String>> {
        self.really_get_tables(conn, "", true)
    }

    fn get_columns(&self, conn: &mut SqlConnection, table: &str) -> Result<Vec<ColumnInfo>> {
        let mut columns: Vec<ColumnInfo> = Vec::new();
        for row in fetch_all(conn, &format!("SHOW COLUMNS FROM {}", table), &[])? {
            let mut info = ColumnInfo::default();
            for (name, value) in &row {
                match name.as_str() {
                    "FIELD" => info.name = value.as_string()?.to_uppercase(),
                    "TYPE" => {
                        info.type_name = value.as_string()?.to_uppercase();
                        if let Some(open_par) = info.type_name.find('(') {
                            let base = info.type_name[..open_par].to_string();
                            match base.as_str() {
                                "INT" | "BIGINT" | "TIMESTAMP" | "DOUBLE" => {
                                    info.type_name = base;
                                }
                                "DECIMAL" => {}
                                _ => {
                                    let inner = &info.type_name
                                        [open_par + 1..info.type_name.len() - 1];
                                    if let Ok(size) = inner.parse() {
                                        info.size = size;
                                        info.type_name = base;
                                    }
                                }
                            }
                        }
                    }
                    "NULL" => info.notnull = value.as_string()? == "NO",
                    "DEFAULT" => {
                        if !value.is_null() {
                            info.default_value = value.as_string()?;
                        }
                    }
                    "KEY" => info.pk = value.as_string()? == "PRI",
                    _ => {}
                }
            }
            columns.push(info);
        }
        let sql = format!(
            "select COLUMN_NAME, REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME \
             from information_schema.KEY_COLUMN_USAGE \
             where TABLE_SCHEMA=(select schema() from dual) and TABLE_NAME='{}' \
             and REFERENCED_TABLE_NAME is not null",
            table
        );
        for row in fetch_all(conn, &sql, &[])? {
            let mut fk_column = String::new();
            let mut fk_table = String::new();
            let mut fk_table_key = String::new();
            for (name, value) in &row {
                if value.is_null() {
                    continue;
                }
                match name.as_str() {
                    "COLUMN_NAME" => fk_column = value.as_string()?,
                    "REFERENCED_TABLE_NAME" => fk_table = value.as_string()?,
                    "REFERENCED_COLUMN_NAME" => fk_table_key = value.as_string()?,
                    _ => {}
                }
            }
            if let Some(info) = columns.iter_mut().find(|c| c.name == fk_column) {
                info.fk_table = fk_table;
                info.fk_table_key = fk_table_key;
            }
        }
        Ok(columns)
    }
}

pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &str {
        "POSTGRES"
    }

    fn dual_name(&self) -> &str {
        ""
    }

    fn has_sequences(&self) -> bool {
        true
    }

    fn select_curr_value(&self, seq_name: &str) -> Result<String> {
        Ok(format!("CURRVAL('{}')", seq_name))
    }

    fn select_next_value(&self, seq_name: &str) -> Result<String> {
        Ok(format!("NEXTVAL('{}')", seq_name))
    }

    fn type2sql(&self, t: ValueType) -> Result<String> {
        Ok(match t {
            ValueType::Int => "INTEGER".to_string(),
            ValueType::LongInt => "BIGINT".to_string(),
            ValueType::Str => "CHARACTER VARYING".to_string(),
            ValueType::Decimal => "NUMERIC".to_string(),
            ValueType::DateTime => "TIMESTAMP".to_string(),
            ValueType::Float => "DOUBLE PRECISION".to_string(),
            _ => return Err(bad_type()),
        })
    }

    fn create_sequence(&self, seq_name: &str) -> Result<String> {
        Ok(format!("CREATE SEQUENCE {}", seq_name))
    }

    fn drop_sequence(&self, seq_name: &str) -> Result<String> {
        Ok(format!("DROP SEQUENCE {}", seq_name))
    }

    fn table_exists(&self, conn: &mut SqlConnection, table: &str) -> Result<bool> {
        Ok(self.get_tables(conn)?.iter().any(|t| t == table))
    }

    fn view_exists(&self, _conn: &mut SqlConnection, _table: &str) -> Result<bool> {
        Ok(false)
    }

    fn get_tables(&self, conn: &mut SqlConnection) -> Result<Vec<String>> {
        let names = fetch_single_strings(
            conn,
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'public'",
            &[],
        )?;
        Ok(names.into_iter().map(|n| n.to_uppercase()).collect())
    }

    fn get_views(&self, _conn: &mut SqlConnection) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn get_columns(&self, conn: &mut SqlConnection, table: &str) -> Result<Vec<ColumnInfo>> {
        let mut columns: Vec<ColumnInfo> = Vec::new();
        let sql = format!(
            "SELECT column_name, data_type, character_maximum_length, \
             is_nullable, column_default \
             FROM information_schema.columns WHERE table_name = '{}'",
            table.to_lowercase()
        );
        for row in fetch_all(conn, &sql, &[])? {
            let mut info = ColumnInfo::default();
            for (name, value) in &row {
                match name.as_str() {
                    "COLUMN_NAME" => info.name = value.as_string()?.to_uppercase(),
                    "DATA_TYPE" => info.type_name = value.as_string()?.to_uppercase(),
                    "CHARACTER_MAXIMUM_LENGTH" => {
                        if !value.is_null() {
                            info.size = value.as_long_int()? as usize;
                        }
                    }
                    "IS_NULLABLE" => info.notnull = value.as_string()? == "NO",
                    "COLUMN_DEFAULT" => {
                        if !value.is_null() {
                            info.default_value = value.as_string()?;
                        }
                    }
                    _ => {}
                }
            }
            columns.push(info);
        }
        let sql = format!(
            "SELECT c.column_name FROM information_schema.table_constraints tc \
             JOIN information_schema.constraint_column_usage AS ccu \
             USING (constraint_schema, constraint_name) \
             JOIN information_schema.columns AS c \
             ON c.table_name = tc.table_name AND c.column_name = ccu.column_name \
             WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_name = '{}'",
            table.to_lowercase()
        );
        for pk_name in fetch_single_strings(conn, &sql, &[])? {
            let pk_name = pk_name.to_uppercase();
            if let Some(info) = columns.iter_mut().find(|c| c.name == pk_name) {
                info.pk = true;
            }
        }
        Ok(columns)
    }
}

pub struct OracleDialect;

impl SqlDialect for OracleDialect {
    fn name(&self) -> &str {
        "ORACLE"
    }

    fn dual_name(&self) -> &str {
        "DUAL"
    }

    fn has_sequences(&self) -> bool {
        true
    }

    fn select_curr_value(&self, seq_name: &str) -> Result<String> {
        Ok(format!("{}.CURRVAL", seq_name))
    }

    fn select_next_value(&self, seq_name: &str) -> Result<String> {
        Ok(format!("{}.NEXTVAL", seq_name))
    }

    fn sql_value(&self, x: &Value) -> String {
        if let Value::DateTime(_) = x {
            format!("timestamp{}", x.sql_str())
        } else {
            x.sql_str()
        }
    }

    fn type2sql(&self, t: ValueType) -> Result<String> {
        Ok(match t {
            ValueType::Int => "NUMBER(10)".to_string(),
            ValueType::LongInt => "NUMBER(20)".to_string(),
            ValueType::Str => "VARCHAR2".to_string(),
            ValueType::DateTime => "DATE".to_string(),
            ValueType::Float | ValueType::Decimal => "NUMBER".to_string(),
            _ => return Err(bad_type()),
        })
    }

    fn create_sequence(&self, seq_name: &str) -> Result<String> {
        Ok(format!("CREATE SEQUENCE {}", seq_name))
    }

    fn drop_sequence(&self, seq_name: &str) -> Result<String> {
        Ok(format!("DROP SEQUENCE {}", seq_name))
    }

    fn sysdate_func(&self) -> String {
        "SYSDATE".to_string()
    }

    fn pager_model(&self) -> PagerModel {
        PagerModel::Oracle
    }

    fn table_exists(&self, _conn: &mut SqlConnection, _table: &str) -> Result<bool> {
        Ok(false)
    }

    fn view_exists(&self, _conn: &mut SqlConnection, _table: &str) -> Result<bool> {
        Ok(false)
    }

    fn get_tables(&self, _conn: &mut SqlConnection) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn get_views(&self, _conn: &mut SqlConnection) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn get_columns(&self, _conn: &mut SqlConnection, _table: &str) -> Result<Vec<ColumnInfo>> {
        Ok(Vec::new())
    }
}

pub struct InterbaseDialect;

impl SqlDialect for InterbaseDialect {
    fn name(&self) -> &str {
        "INTERBASE"
    }

    fn dual_name(&self) -> &str {
        "RDB$DATABASE"
    }

    fn has_sequences(&self) -> bool {
        true
    }

    fn select_curr_value(&self, seq_name: &str) -> Result<String> {
        Ok(format!("GEN_ID({}, 0)", seq_name))
    }

    fn select_next_value(&self, seq_name: &str) -> Result<String> {
        Ok(format!("GEN_ID({}, 1)", seq_name))
    }

    fn commit_ddl(&self) -> bool {
        true
    }

    fn type2sql(&self, t: ValueType) -> Result<String> {
        Ok(match t {
            ValueType::Int => "INTEGER".to_string(),
            ValueType::LongInt => "BIGINT".to_string(),
            ValueType::Str => "VARCHAR".to_string(),
            ValueType::Decimal => "DECIMAL(16, 6)".to_string(),
            ValueType::DateTime => "TIMESTAMP".to_string(),
            ValueType::Float => "DOUBLE PRECISION".to_string(),
            _ => return Err(bad_type()),
        })
    }

    fn create_sequence(&self, seq_name: &str) -> Result<String> {
        Ok(format!("CREATE GENERATOR {}", seq_name))
    }

    fn drop_sequence(&self, seq_name: &str) -> Result<String> {
        Ok(format!("DROP GENERATOR {}", seq_name))
    }

    fn pager_model(&self) -> PagerModel {
        PagerModel::Interbase
    }

    fn table_exists(&self, _conn: &mut SqlConnection, _table: &str) -> Result<bool> {
        Ok(false)
    }

    fn view_exists(&self, _conn: &mut SqlConnection, _table: &str) -> Result<bool> {
        Ok(false)
    }

    fn get_tables(&self, _conn: &mut SqlConnection) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn get_views(&self, _conn: &mut SqlConnection) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn get_columns(&self, _conn: &mut SqlConnection, _table: &str) -> Result<Vec<ColumnInfo>> {
        Ok(Vec::new())
    }
}

pub struct MssqlDialect;

impl SqlDialect for MssqlDialect {
    fn name(&self) -> &str {
        "MSSQL"
    }

    fn dual_name(&self) -> &str {
        ""
    }

    fn has_sequences(&self) -> bool {
        false
    }

    fn select_curr_value(&self, _seq_name: &str) -> Result<String> {
        Err(no_sequences())
    }

    fn select_next_value(&self, _seq_name: &str) -> Result<String> {
        Err(no_sequences())
    }

    fn select_last_inserted_id(&self, _table_name: &str) -> Result<String> {
        Ok("SELECT SCOPE_IDENTITY()".to_string())
    }

    fn type2sql(&self, t: ValueType) -> Result<String> {
        Ok(match t {
            ValueType::Int => "INT".to_string(),
            ValueType::LongInt => "BIGINT".to_string(),
            ValueType::Str => "VARCHAR".to_string(),
            ValueType::Decimal => "DECIMAL(16, 6)".to_string(),
            ValueType::DateTime => "DATETIME".to_string(),
            ValueType::Float => "DOUBLE PRECISION".to_string(),
            _ => return Err(bad_type()),
        })
    }

    fn create_sequence(&self, seq_name: &str) -> Result<String> {
        Ok(format!("CREATE SEQUENCE {}", seq_name))
    }

    fn drop_sequence(&self, seq_name: &str) -> Result<String> {
        Ok(format!("DROP SEQUENCE {}", seq_name))
    }

    fn autoinc_flag(&self) -> String {
        "IDENTITY(1,1)".to_string()
    }

    fn explicit_null(&self) -> bool {
        true
    }

    fn not_null_default(&self, not_null_clause: &str, default_value: &str) -> String {
        match (not_null_clause.is_empty(), default_value.is_empty()) {
            (true, _) => default_value.to_string(),
            (_, true) => not_null_clause.to_string(),
            _ => format!("{} {}", not_null_clause, default_value),
        }
    }

    fn pager_model(&self) -> PagerModel {
        PagerModel::Mysql
    }

    fn grant_insert_id_statement(&self, table_name: &str, on: bool) -> String {
        format!(
            "SET IDENTITY_INSERT {} {}",
            table_name,
            if on { "ON" } else { "OFF" }
        )
    }

    fn table_exists(&self, _conn: &mut SqlConnection, _table: &str) -> Result<bool> {
        Ok(false)
    }

    fn view_exists(&self, _conn: &mut SqlConnection, _table: &str) -> Result<bool> {
        Ok(false)
    }

    fn get_tables(&self, _conn: &mut SqlConnection) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn get_views(&self, _conn: &mut SqlConnection) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn get_columns(&self, _conn: &mut SqlConnection, _table: &str) -> Result<Vec<ColumnInfo>> {
        Ok(Vec::new())
    }
}
