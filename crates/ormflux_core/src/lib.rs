//! Relational object-mapping core: an in-memory object graph layered over
//! a SQL database, with identity tracking, lazy loading, change detection,
//! ordered flushing and cascading deletion.

mod connection;
mod data_object;
mod engine;
mod error;
mod expression;
mod schema;
mod session;
mod source;
mod sql_dialect;
mod sql_generation;
mod sql_text;
#[cfg(test)]
mod test_support;
mod traits;
mod value;

pub use connection::{SqlConnection, SqlCursor, SqlResultSet};
pub use data_object::{
    DataObject, DeletionMode, ObjId, ObjectGraph, RelationObject, RelationStatus, Status,
};
pub use engine::{Engine, EngineMode};
pub use error::{OrmError, Result};
pub use expression::{
    Expr, IdQuoting, PagerModel, SelectExpr, SqlGeneratorContext, SqlGeneratorOptions,
    filter_eq, filter_ge, filter_gt, filter_le, filter_lt, filter_ne, find_all_tables,
    is_in_parentheses, is_number_or_object_name, is_string_constant, make_select, sql_alias,
    sql_parentheses_as_needed, sql_prefix,
};
pub use schema::{
    CascadePolicy, Column, ColumnFlags, Key, KeyId, Relation, RelationAttrs, RelationKind, Schema,
    Table, mk_xml_name,
};
pub use session::{DataObjectResultSet, Session};
pub use source::SqlSource;
pub use sql_dialect::{
    ColumnInfo, DialectRegistry, InterbaseDialect, MssqlDialect, MysqlDialect, OracleDialect,
    PostgresDialect, SqlDialect, SqliteDialect,
};
pub use sql_generation::{SqlSchemaGenerator, SqlTableGenerator};
pub use sql_text::{find_subst_signs, first_word, to_numbered_params};
pub use traits::{DriverRegistry, SqlConnectionBackend, SqlCursorBackend, SqlDriver};
pub use value::{Row, Rows, Value, ValueType, Values};

pub use chrono;
pub use rust_decimal;
