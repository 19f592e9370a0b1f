use crate::error::Result;
use crate::schema::{Column, Schema, Table};
use crate::sql_dialect::SqlDialect;
use crate::value::{Value, ValueType};

fn fk_rule(column: &Column) -> String {
    format!(
        "FOREIGN KEY ({}) REFERENCES {}({})",
        column.name(),
        column.fk_table_name().unwrap_or(""),
        column.fk_column_name().unwrap_or("")
    )
}

/// Renders DDL for one table against a dialect.
pub struct SqlTableGenerator<'a> {
    table: &'a Table,
    dialect: &'a dyn SqlDialect,
}

impl<'a> SqlTableGenerator<'a> {
    pub fn new(table: &'a Table, dialect: &'a dyn SqlDialect) -> Self {
        Self { table, dialect }
    }

    fn typed_column(&self, column: &Column) -> Result<String> {
        let mut out = format!("{} {}", column.name(), self.dialect.type2sql(column.ty())?);
        if column.ty() == ValueType::Str {
            out.push_str(&format!("({})", column.size()));
        }
        let mut default_clause = String::new();
        if !column.default_value().is_null() {
            default_clause.push_str("DEFAULT ");
            let is_sysdate = column.ty() == ValueType::DateTime
                && matches!(column.default_value(), Value::Str(s) if s == "sysdate");
            if is_sysdate {
                default_clause.push_str(&self.dialect.sysdate_func());
            } else {
                default_clause.push_str(&self.dialect.sql_value(column.default_value()));
            }
        }
        let not_null_clause = if column.is_nullable() && !column.is_pk() {
            if self.dialect.explicit_null() { "NULL" } else { "" }
        } else {
            "NOT NULL"
        };
        let combined = self.dialect.not_null_default(not_null_clause, &default_clause);
        if !combined.is_empty() {
            out.push(' ');
            out.push_str(&combined);
        }
        let autoinc_flag = self.dialect.autoinc_flag();
        if column.is_pk() && self.table_autogen() && !autoinc_flag.is_empty() {
            let pk_flag = self.dialect.primary_key_flag();
            if !pk_flag.is_empty() {
                out.push(' ');
                out.push_str(&pk_flag);
            }
            out.push(' ');
            out.push_str(&autoinc_flag);
        }
        Ok(out)
    }

    fn table_autogen(&self) -> bool {
        self.table.autoinc() || self.table.seq_name().is_some()
    }

    pub fn create_table(&self) -> Result<String> {
        let mut out = format!("CREATE TABLE {} (\n", self.table.name());
        let columns = self.table.columns();
        for (i, column) in columns.iter().enumerate() {
            out.push('\t');
            out.push_str(&self.typed_column(column)?);
            if i + 1 != columns.len() {
                out.push(',');
            }
            out.push('\n');
        }
        let pk_flag = self.dialect.primary_key_flag();
        if pk_flag.is_empty() || !self.table_autogen() {
            out.push_str("\t, PRIMARY KEY (");
            let mut first = true;
            for column in columns {
                if column.is_pk() {
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    out.push_str(column.name());
                }
            }
            out.push_str(")\n");
        }
        if self.dialect.fk_internal() {
            for column in columns {
                if column.has_fk() {
                    out.push_str("\t, ");
                    out.push_str(&fk_rule(column));
                    out.push('\n');
                }
            }
        }
        out.push(')');
        out.push_str(&self.dialect.suffix_create_table());
        Ok(out)
    }
}

/// Streams the DDL of a whole schema: tables in dependency order, then FK
/// constraints, then indexes, then sequences, with COMMIT interleaved on
/// dialects whose DDL needs it.
pub struct SqlSchemaGenerator {
    statements: std::vec::IntoIter<String>,
}

impl SqlSchemaGenerator {
    pub fn new(schema: &Schema, dialect: &dyn SqlDialect) -> Result<Self> {
        let mut statements = Vec::new();
        let commit_ddl = dialect.commit_ddl();
        let mut push = |statements: &mut Vec<String>, sql: String| {
            statements.push(sql);
            if commit_ddl {
                statements.push("COMMIT".to_string());
            }
        };

        let mut tables: Vec<&Table> = schema.tables().collect();
        tables.sort_by_key(|t| t.depth());

        for table in &tables {
            let sql = SqlTableGenerator::new(table, dialect).create_table()?;
            push(&mut statements, sql);
        }
        if !dialect.fk_internal() {
            for table in &tables {
                for column in table.columns() {
                    if column.has_fk() {
                        push(
                            &mut statements,
                            format!("ALTER TABLE {} ADD {}", table.name(), fk_rule(column)),
                        );
                    }
                }
            }
        }
        for table in &tables {
            for column in table.columns() {
                if let Some(index_name) = column.index_name() {
                    push(
                        &mut statements,
                        format!(
                            "CREATE INDEX {} ON {}({})",
                            index_name,
                            table.name(),
                            column.name()
                        ),
                    );
                }
            }
        }
        if dialect.has_sequences() {
            let mut sequences: Vec<&str> = tables.iter().filter_map(|t| t.seq_name()).collect();
            sequences.sort_unstable();
            sequences.dedup();
            for seq in sequences {
                push(&mut statements, dialect.create_sequence(seq)?);
            }
        }
        Ok(Self {
            statements: statements.into_iter(),
        })
    }

    pub fn next_statement(&mut self) -> Option<String> {
        self.statements.next()
    }

    /// Render the full script, one statement per paragraph.
    pub fn generate(mut self, dialect_name: &str) -> String {
        let mut out = format!("-- DBTYPE={}\n\n", dialect_name);
        while let Some(sql) = self.next_statement() {
            out.push_str(&sql);
            out.push_str(";\n\n");
        }
        out
    }
}

impl Iterator for SqlSchemaGenerator {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_statement()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnFlags, Table};
    use crate::sql_dialect::{InterbaseDialect, MysqlDialect, OracleDialect, SqliteDialect};

    fn master_table() -> Table {
        Table::new("T_CLIENT")
            .with_class("Client")
            .with_seq_name("S_CLIENT_ID")
            .with_column(Column::new("ID", ValueType::LongInt, 0, ColumnFlags::PRIMARY_KEY))
            .with_column(Column::new("NAME", ValueType::Str, 100, ColumnFlags::empty()))
            .with_column(
                Column::new("CREATED", ValueType::DateTime, 0, ColumnFlags::empty())
                    .with_default(Value::Str("sysdate".into())),
            )
    }

    fn slave_table() -> Table {
        Table::new("T_ORDER")
            .with_class("Order")
            .with_autoinc(true)
            .with_column(Column::new("ID", ValueType::LongInt, 0, ColumnFlags::PRIMARY_KEY))
            .with_column(
                Column::new("CLIENT_ID", ValueType::LongInt, 0, ColumnFlags::NULLABLE)
                    .with_fk("T_CLIENT", "ID")
                    .with_index("I_ORDER_CLIENT"),
            )
    }

    #[test]
    fn oracle_create_table_has_pk_clause_and_sysdate_default() {
        let table = master_table();
        let sql = SqlTableGenerator::new(&table, &OracleDialect)
            .create_table()
            .unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE T_CLIENT (\n\
             \tID NUMBER(20) NOT NULL,\n\
             \tNAME VARCHAR2(100) NOT NULL,\n\
             \tCREATED DATE DEFAULT SYSDATE NOT NULL\n\
             \t, PRIMARY KEY (ID)\n\
             )"
        );
    }

    #[test]
    fn mysql_autoincrement_column_and_suffix() {
        let table = slave_table();
        let sql = SqlTableGenerator::new(&table, &MysqlDialect)
            .create_table()
            .unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE T_ORDER (\n\
             \tID BIGINT NOT NULL AUTO_INCREMENT,\n\
             \tCLIENT_ID BIGINT NULL\n\
             \t, PRIMARY KEY (ID)\n\
             ) ENGINE=INNODB DEFAULT CHARSET=utf8"
        );
    }

    #[test]
    fn sqlite_inlines_pk_and_fk() {
        let table = slave_table();
        let sql = SqlTableGenerator::new(&table, &SqliteDialect)
            .create_table()
            .unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE T_ORDER (\n\
             \tID INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,\n\
             \tCLIENT_ID INTEGER\n\
             \t, FOREIGN KEY (CLIENT_ID) REFERENCES T_CLIENT(ID)\n\
             )"
        );
    }

    #[test]
    fn schema_stream_orders_tables_constraints_indexes_sequences() {
        let mut schema = Schema::new();
        schema.add_table(slave_table());
        schema.add_table(master_table());
        schema.check().unwrap();
        let statements: Vec<String> = SqlSchemaGenerator::new(&schema, &OracleDialect)
            .unwrap()
            .collect();
        assert!(statements[0].starts_with("CREATE TABLE T_CLIENT"));
        assert!(statements[1].starts_with("CREATE TABLE T_ORDER"));
        assert_eq!(
            statements[2],
            "ALTER TABLE T_ORDER ADD FOREIGN KEY (CLIENT_ID) REFERENCES T_CLIENT(ID)"
        );
        assert_eq!(
            statements[3],
            "CREATE INDEX I_ORDER_CLIENT ON T_ORDER(CLIENT_ID)"
        );
        assert_eq!(statements[4], "CREATE SEQUENCE S_CLIENT_ID");
        assert_eq!(statements.len(), 5);
    }

    #[test]
    fn commit_ddl_dialects_interleave_commits() {
        let mut schema = Schema::new();
        schema.add_table(master_table());
        schema.check().unwrap();
        let statements: Vec<String> = SqlSchemaGenerator::new(&schema, &InterbaseDialect)
            .unwrap()
            .collect();
        assert!(statements[0].starts_with("CREATE TABLE T_CLIENT"));
        assert_eq!(statements[1], "COMMIT");
        assert_eq!(statements[2], "CREATE GENERATOR S_CLIENT_ID");
        assert_eq!(statements[3], "COMMIT");
    }
}
