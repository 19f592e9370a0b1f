use crate::error::{OrmError, Result};
use crate::schema::{Key, Schema};
use crate::value::{Value, Values};

/// Identifier quoting mode. The default expects unquoted upper-case
/// identifiers; auto mode quotes only what would not survive unquoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdQuoting {
    #[default]
    NoQuotes,
    DoubleQuotes,
    AutoDoubleQuotes,
}

/// LIMIT/OFFSET rendering strategy of the target engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PagerModel {
    #[default]
    Postgres,
    Mysql,
    Interbase,
    Oracle,
}

/// Knobs the SQL serializer consults. Engines fill these from the dialect
/// and driver of the live connection.
#[derive(Debug, Clone, Copy)]
pub struct SqlGeneratorOptions {
    pub quotes: IdQuoting,
    pub pager_model: PagerModel,
    pub has_for_update: bool,
    pub collect_params: bool,
    pub numbered_params: bool,
}

impl Default for SqlGeneratorOptions {
    fn default() -> Self {
        Self {
            quotes: IdQuoting::NoQuotes,
            pager_model: PagerModel::Postgres,
            has_for_update: true,
            collect_params: false,
            numbered_params: false,
        }
    }
}

/// Mutable accumulator for one serialization run: collected parameter
/// values and the running number for `:n` placeholders.
#[derive(Debug, Default)]
pub struct SqlGeneratorContext {
    pub params: Values,
    pub counter: usize,
}

impl SqlGeneratorContext {
    pub fn new() -> Self {
        Self::default()
    }
}

fn subst_param(
    value: &Value,
    options: &SqlGeneratorOptions,
    ctx: &mut SqlGeneratorContext,
) -> String {
    if options.collect_params {
        ctx.params.push(value.clone());
        if options.numbered_params {
            ctx.counter += 1;
            format!(":{}", ctx.counter)
        } else {
            "?".to_string()
        }
    } else {
        value.sql_str()
    }
}

pub fn is_number_or_object_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '#' | '$' | '.' | ':')
        })
}

pub fn is_string_constant(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < 2 || chars[0] != '\'' || chars[chars.len() - 1] != '\'' {
        return false;
    }
    let mut seen_quot = false;
    for &c in &chars[1..chars.len() - 1] {
        if c == '\'' {
            seen_quot = !seen_quot;
        } else if seen_quot {
            return false;
        }
    }
    !seen_quot
}

pub fn is_in_parentheses(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < 2 || chars[0] != '(' || chars[chars.len() - 1] != ')' {
        return false;
    }
    let mut level = 0;
    let mut seen_quot = false;
    for &c in &chars[1..chars.len() - 1] {
        if c == '\'' {
            seen_quot = !seen_quot;
        } else if !seen_quot {
            if c == '(' {
                level += 1;
            } else if c == ')' {
                level -= 1;
                if level < 0 {
                    return false;
                }
            }
        }
    }
    !seen_quot && level == 0
}

pub fn sql_parentheses_as_needed(s: &str) -> String {
    if is_number_or_object_name(s) || is_string_constant(s) || is_in_parentheses(s) || s == "?" {
        s.to_string()
    } else {
        format!("({})", s)
    }
}

pub fn sql_prefix(s: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        s.to_string()
    } else {
        format!("{}.{}", prefix, s)
    }
}

pub fn sql_alias(s: &str, alias: &str) -> String {
    if alias.is_empty() {
        s.to_string()
    } else {
        format!("{} {}", s, alias)
    }
}

fn quote_id(id: &str, quotes: IdQuoting) -> String {
    match quotes {
        IdQuoting::NoQuotes => id.to_string(),
        IdQuoting::DoubleQuotes => format!("\"{}\"", id),
        IdQuoting::AutoDoubleQuotes => {
            let plain = !id.is_empty()
                && id
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
            if plain {
                id.to_string()
            } else {
                format!("\"{}\"", id)
            }
        }
    }
}

/// Composable SQL expression tree. One closed sum, one operation:
/// serialization against generator options.
#[derive(Debug, Clone, Default)]
pub enum Expr {
    #[default]
    Empty,
    /// Verbatim SQL text.
    Sql(String),
    /// A possibly table-qualified, possibly aliased column reference.
    Column {
        table: String,
        column: String,
        alias: String,
    },
    /// An arbitrary expression with a projection alias.
    Aliased { expr: Box<Expr>, alias: String },
    Const(Value),
    Unary {
        prefix: bool,
        op: String,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: String,
        right: Box<Expr>,
    },
    Join {
        left: Box<Expr>,
        right: Box<Expr>,
        on: Box<Expr>,
    },
    List(Vec<Expr>),
    Select(Box<SelectExpr>),
    /// `pk1 = ? AND pk2 = ?` filter from a key image.
    KeyFilter(Key),
}

impl Expr {
    pub fn sql(text: impl Into<String>) -> Self {
        Expr::Sql(text.into())
    }

    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            table: table.into(),
            column: column.into(),
            alias: String::new(),
        }
    }

    pub fn column_alias(
        table: impl Into<String>,
        column: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Expr::Column {
            table: table.into(),
            column: column.into(),
            alias: alias.into(),
        }
    }

    pub fn value(v: impl Into<Value>) -> Self {
        Expr::Const(v.into())
    }

    /// Any expression with a projection alias.
    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        Expr::Aliased {
            expr: Box::new(expr),
            alias: alias.into(),
        }
    }

    pub fn list(items: Vec<Expr>) -> Self {
        Expr::List(items)
    }

    pub fn key_filter(key: Key) -> Self {
        Expr::KeyFilter(key)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Expr::Empty => true,
            Expr::Sql(s) => s.is_empty(),
            _ => false,
        }
    }

    fn binary(left: Expr, op: &str, right: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(left),
            op: op.to_string(),
            right: Box::new(right),
        }
    }

    pub fn eq(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(self, "=", other.into())
    }

    pub fn ne(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(self, "<>", other.into())
    }

    pub fn gt(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(self, ">", other.into())
    }

    pub fn lt(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(self, "<", other.into())
    }

    pub fn ge(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(self, ">=", other.into())
    }

    pub fn le(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(self, "<=", other.into())
    }

    pub fn like_(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(self, "LIKE", other.into())
    }

    pub fn in_(self, other: impl Into<Expr>) -> Expr {
        Expr::binary(self, "IN", other.into())
    }

    /// Conjunction; an empty side disappears.
    pub fn and(self, other: Expr) -> Expr {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        Expr::binary(self, "AND", other)
    }

    /// Disjunction; an empty side disappears.
    pub fn or(self, other: Expr) -> Expr {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        Expr::binary(self, "OR", other)
    }

    pub fn not(self) -> Expr {
        Expr::Unary {
            prefix: true,
            op: "NOT".to_string(),
            expr: Box::new(self),
        }
    }

    pub fn join(self, other: Expr, on: Expr) -> Expr {
        Expr::Join {
            left: Box::new(self),
            right: Box::new(other),
            on: Box::new(on),
        }
    }

    /// Serialize with default options and no parameter collection.
    pub fn get_sql(&self) -> Result<String> {
        let mut ctx = SqlGeneratorContext::new();
        self.generate_sql(&SqlGeneratorOptions::default(), &mut ctx)
    }

    pub fn generate_sql(
        &self,
        options: &SqlGeneratorOptions,
        ctx: &mut SqlGeneratorContext,
    ) -> Result<String> {
        match self {
            Expr::Empty => Ok(String::new()),
            Expr::Sql(s) => Ok(s.clone()),
            Expr::Column {
                table,
                column,
                alias,
            } => {
                let prefix = if table.is_empty() {
                    String::new()
                } else {
                    quote_id(table, options.quotes)
                };
                let r = sql_prefix(&quote_id(column, options.quotes), &prefix);
                Ok(sql_alias(&r, alias))
            }
            Expr::Aliased { expr, alias } => {
                let inner = expr.generate_sql(options, ctx)?;
                Ok(sql_alias(&sql_parentheses_as_needed(&inner), alias))
            }
            Expr::Const(v) => Ok(subst_param(v, options, ctx)),
            Expr::Unary { prefix, op, expr } => {
                let inner = sql_parentheses_as_needed(&expr.generate_sql(options, ctx)?);
                if *prefix {
                    Ok(format!("{} {}", op, inner))
                } else {
                    Ok(format!("{} {}", inner, op))
                }
            }
            Expr::Binary { left, op, right } => {
                let sql1 = sql_parentheses_as_needed(&left.generate_sql(options, ctx)?);
                // probe the right operand without parameter substitution to
                // catch a constant NULL
                let probe_options = SqlGeneratorOptions {
                    collect_params: false,
                    numbered_params: false,
                    ..*options
                };
                let mut probe_ctx = SqlGeneratorContext::new();
                let sql2_nosubst =
                    sql_parentheses_as_needed(&right.generate_sql(&probe_options, &mut probe_ctx)?);
                if sql2_nosubst == "NULL" {
                    if op == "=" {
                        return Ok(format!("{} IS NULL", sql1));
                    }
                    if op == "<>" {
                        return Ok(format!("{} IS NOT NULL", sql1));
                    }
                }
                let sql2 = sql_parentheses_as_needed(&right.generate_sql(options, ctx)?);
                Ok(format!("{} {} {}", sql1, op, sql2))
            }
            Expr::Join { left, right, on } => {
                let mut sql = sql_parentheses_as_needed(&left.generate_sql(options, ctx)?);
                sql.push_str(" JOIN ");
                sql.push_str(&sql_parentheses_as_needed(
                    &right.generate_sql(options, ctx)?,
                ));
                sql.push_str(" ON ");
                sql.push_str(&sql_parentheses_as_needed(&on.generate_sql(options, ctx)?));
                Ok(sql)
            }
            Expr::List(items) => {
                let mut sql = String::new();
                for item in items {
                    if !sql.is_empty() {
                        sql.push_str(", ");
                    }
                    sql.push_str(&sql_parentheses_as_needed(
                        &item.generate_sql(options, ctx)?,
                    ));
                }
                Ok(sql)
            }
            Expr::Select(select) => select.generate_sql(options, ctx),
            Expr::KeyFilter(key) => {
                let mut expr = Expr::Empty;
                for (column, value) in key.parts() {
                    expr = expr.and(Expr::column(key.table.clone(), column).eq(Expr::Const(value)));
                }
                expr.generate_sql(options, ctx)
            }
        }
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Const(v)
    }
}

pub fn filter_eq(name: impl Into<String>, value: impl Into<Value>) -> Expr {
    Expr::sql(name.into()).eq(Expr::Const(value.into()))
}

pub fn filter_ne(name: impl Into<String>, value: impl Into<Value>) -> Expr {
    Expr::sql(name.into()).ne(Expr::Const(value.into()))
}

pub fn filter_lt(name: impl Into<String>, value: impl Into<Value>) -> Expr {
    Expr::sql(name.into()).lt(Expr::Const(value.into()))
}

pub fn filter_gt(name: impl Into<String>, value: impl Into<Value>) -> Expr {
    Expr::sql(name.into()).gt(Expr::Const(value.into()))
}

pub fn filter_le(name: impl Into<String>, value: impl Into<Value>) -> Expr {
    Expr::sql(name.into()).le(Expr::Const(value.into()))
}

pub fn filter_ge(name: impl Into<String>, value: impl Into<Value>) -> Expr {
    Expr::sql(name.into()).ge(Expr::Const(value.into()))
}

/// SELECT statement builder. Clauses render in fixed order; `HAVING`
/// without `GROUP BY` is rejected at serialization time.
#[derive(Debug, Clone, Default)]
pub struct SelectExpr {
    select: Expr,
    from: Expr,
    where_clause: Expr,
    group_by: Expr,
    having: Expr,
    order_by: Expr,
    distinct: bool,
    lock_mode: String,
    pager_limit: u64,
    pager_offset: u64,
}

impl SelectExpr {
    pub fn new(select: Expr) -> Self {
        Self {
            select,
            ..Self::default()
        }
    }

    pub fn from_(mut self, from: Expr) -> Self {
        self.from = from;
        self
    }

    pub fn where_(mut self, filter: Expr) -> Self {
        self.where_clause = filter;
        self
    }

    pub fn group_by_(mut self, group_by: Expr) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn having_(mut self, having: Expr) -> Self {
        self.having = having;
        self
    }

    pub fn order_by_(mut self, order_by: Expr) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn distinct(mut self, flag: bool) -> Self {
        self.distinct = flag;
        self
    }

    pub fn with_lock_mode(mut self, lock_mode: impl Into<String>) -> Self {
        self.lock_mode = lock_mode.into();
        self
    }

    pub fn for_update(self, flag: bool) -> Self {
        self.with_lock_mode(if flag { "UPDATE" } else { "" })
    }

    pub fn for_update_flag(&self) -> bool {
        self.lock_mode == "UPDATE"
    }

    pub fn pager(mut self, limit: u64, offset: u64) -> Self {
        self.pager_limit = limit;
        self.pager_offset = offset;
        self
    }

    pub fn select_expr(&self) -> &Expr {
        &self.select
    }

    pub fn from_expr(&self) -> &Expr {
        &self.from
    }

    pub fn where_expr(&self) -> &Expr {
        &self.where_clause
    }

    pub fn order_by_expr(&self) -> &Expr {
        &self.order_by
    }

    pub fn get_sql(&self) -> Result<String> {
        let mut ctx = SqlGeneratorContext::new();
        self.generate_sql(&SqlGeneratorOptions::default(), &mut ctx)
    }

    pub fn generate_sql(
        &self,
        options: &SqlGeneratorOptions,
        ctx: &mut SqlGeneratorContext,
    ) -> Result<String> {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&self.select.generate_sql(options, ctx)?);
        if !self.from.is_empty() {
            sql.push_str(" FROM ");
            sql.push_str(&self.from.generate_sql(options, ctx)?);
        }
        if !self.where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clause.generate_sql(options, ctx)?);
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.generate_sql(options, ctx)?);
        }
        if !self.having.is_empty() {
            if self.group_by.is_empty() {
                return Err(OrmError::bad_sql(
                    "Trying to use HAVING without GROUP BY clause",
                ));
            }
            sql.push_str(" HAVING ");
            sql.push_str(&self.having.generate_sql(options, ctx)?);
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.generate_sql(options, ctx)?);
        }
        if !self.lock_mode.is_empty() && options.has_for_update {
            sql.push_str(" FOR ");
            sql.push_str(&self.lock_mode);
        }
        if self.pager_limit > 0 {
            let limit = self.pager_limit;
            let offset = self.pager_offset;
            match options.pager_model {
                PagerModel::Mysql => {
                    sql.push_str(&format!(" LIMIT {}, {}", offset, limit));
                }
                PagerModel::Interbase => {
                    sql.push_str(&format!(" ROWS {} TO {}", offset + 1, offset + limit));
                }
                PagerModel::Oracle => {
                    sql = format!(
                        "SELECT OUTER_.* FROM (SELECT INNER_.*, ROWNUM RN_ FROM ({}) INNER_) OUTER_ WHERE OUTER_.RN_ > {} AND OUTER_.RN_ <= {}",
                        sql,
                        offset,
                        offset + limit
                    );
                }
                PagerModel::Postgres => {
                    sql.push_str(&format!(" LIMIT {}", limit));
                    if offset > 0 {
                        sql.push_str(&format!(" OFFSET {}", offset));
                    }
                }
            }
        }
        Ok(sql)
    }
}

impl From<SelectExpr> for Expr {
    fn from(select: SelectExpr) -> Self {
        Expr::Select(Box::new(select))
    }
}

/// Collect the table names referenced by a FROM expression. Lists and
/// joins are walked; every leaf must be a bare table name.
pub fn find_all_tables(expr: &Expr, tables: &mut Vec<String>) -> Result<()> {
    match expr {
        Expr::List(items) => {
            for item in items {
                find_all_tables(item, tables)?;
            }
            Ok(())
        }
        Expr::Join { left, right, .. } => {
            find_all_tables(left, tables)?;
            find_all_tables(right, tables)
        }
        other => {
            let sql = other.get_sql()?;
            if is_number_or_object_name(&sql) {
                tables.push(sql);
                Ok(())
            } else {
                Err(OrmError::bad_sql(format!("Not a table expression: {}", sql)))
            }
        }
    }
}

/// Build a SELECT that projects every column of every table referenced by
/// `from_where`, in schema declaration order.
pub fn make_select(
    schema: &Schema,
    from_where: Expr,
    filter: Expr,
    order_by: Expr,
    for_update: bool,
) -> Result<SelectExpr> {
    let mut tables = Vec::new();
    find_all_tables(&from_where, &mut tables)?;
    let mut cols = Vec::new();
    for name in &tables {
        let table = schema.table(name)?;
        for column in table.columns() {
            cols.push(Expr::column(table.name(), column.name()));
        }
    }
    Ok(SelectExpr::new(Expr::List(cols))
        .from_(from_where)
        .where_(filter)
        .order_by_(order_by)
        .for_update(for_update))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnFlags, Key, Table};
    use crate::value::ValueType;

    fn opts_collect() -> SqlGeneratorOptions {
        SqlGeneratorOptions {
            collect_params: true,
            ..Default::default()
        }
    }

    #[test]
    fn column_refs_render_with_prefix_and_alias() {
        assert_eq!(Expr::column("T1", "A").get_sql().unwrap(), "T1.A");
        assert_eq!(
            Expr::column_alias("T1", "A", "A1").get_sql().unwrap(),
            "T1.A A1"
        );
        assert_eq!(Expr::column("", "A").get_sql().unwrap(), "A");
        assert_eq!(
            Expr::aliased(Expr::sql("COUNT(*)"), "RCNT").get_sql().unwrap(),
            "(COUNT(*)) RCNT"
        );
    }

    #[test]
    fn const_renders_literal_or_placeholder() {
        assert_eq!(Expr::value(10).get_sql().unwrap(), "10");
        assert_eq!(Expr::value("it's").get_sql().unwrap(), "'it''s'");

        let mut ctx = SqlGeneratorContext::new();
        let sql = Expr::value(10)
            .generate_sql(&opts_collect(), &mut ctx)
            .unwrap();
        assert_eq!(sql, "?");
        assert_eq!(ctx.params, vec![Value::Int(10)]);
    }

    #[test]
    fn numbered_placeholders_count_from_one() {
        let options = SqlGeneratorOptions {
            collect_params: true,
            numbered_params: true,
            ..Default::default()
        };
        let mut ctx = SqlGeneratorContext::new();
        let e = Expr::column("T", "A")
            .eq(Expr::value(1))
            .and(Expr::column("T", "B").eq(Expr::value(2)));
        assert_eq!(
            e.generate_sql(&options, &mut ctx).unwrap(),
            "(T.A = :1) AND (T.B = :2)"
        );
        assert_eq!(ctx.params.len(), 2);
    }

    #[test]
    fn binary_rewrites_null_comparison() {
        let e = Expr::column("T", "A").eq(Expr::Const(Value::Null));
        assert_eq!(e.get_sql().unwrap(), "T.A IS NULL");
        let e = Expr::column("T", "A").ne(Expr::Const(Value::Null));
        assert_eq!(e.get_sql().unwrap(), "T.A IS NOT NULL");
        // the rewrite applies under parameter collection too
        let mut ctx = SqlGeneratorContext::new();
        let e = Expr::column("T", "A").eq(Expr::Const(Value::Null));
        assert_eq!(e.generate_sql(&opts_collect(), &mut ctx).unwrap(), "T.A IS NULL");
        assert!(ctx.params.is_empty());
    }

    #[test]
    fn parentheses_only_where_needed() {
        let e = Expr::column("T", "A")
            .eq(Expr::value(1))
            .or(Expr::column("T", "B").eq(Expr::value("b")));
        assert_eq!(e.get_sql().unwrap(), "(T.A = 1) OR (T.B = 'b')");
        let e = Expr::sql("A").not();
        assert_eq!(e.get_sql().unwrap(), "NOT A");
    }

    #[test]
    fn join_renders_on_clause() {
        let e = Expr::sql("T1").join(
            Expr::sql("T2"),
            Expr::column("T1", "ID").eq(Expr::column("T2", "T1_ID")),
        );
        assert_eq!(e.get_sql().unwrap(), "T1 JOIN T2 ON (T1.ID = T2.T1_ID)");
    }

    #[test]
    fn select_clause_order() {
        let q = SelectExpr::new(Expr::list(vec![
            Expr::column("T", "A"),
            Expr::column("T", "B"),
        ]))
        .from_(Expr::sql("T"))
        .where_(Expr::column("T", "A").gt(Expr::value(0)))
        .group_by_(Expr::column("T", "A"))
        .having_(Expr::sql("COUNT(*) > 1"))
        .order_by_(Expr::column("T", "B"))
        .distinct(true);
        assert_eq!(
            q.get_sql().unwrap(),
            "SELECT DISTINCT T.A, T.B FROM T WHERE T.A > 0 \
             GROUP BY T.A HAVING COUNT(*) > 1 ORDER BY T.B"
        );
    }

    #[test]
    fn having_without_group_by_is_rejected() {
        let q = SelectExpr::new(Expr::sql("A")).from_(Expr::sql("T")).having_(Expr::sql("A > 1"));
        assert!(matches!(
            q.get_sql(),
            Err(OrmError::BadSqlOperation(_))
        ));
    }

    #[test]
    fn for_update_respects_dialect_capability() {
        let q = SelectExpr::new(Expr::sql("A")).from_(Expr::sql("T")).for_update(true);
        assert_eq!(q.get_sql().unwrap(), "SELECT A FROM T FOR UPDATE");
        let options = SqlGeneratorOptions {
            has_for_update: false,
            ..Default::default()
        };
        let mut ctx = SqlGeneratorContext::new();
        assert_eq!(
            q.generate_sql(&options, &mut ctx).unwrap(),
            "SELECT A FROM T"
        );
    }

    #[test]
    fn pager_models() {
        let q = SelectExpr::new(Expr::sql("A")).from_(Expr::sql("T")).pager(10, 20);
        let render = |model| {
            let options = SqlGeneratorOptions {
                pager_model: model,
                ..Default::default()
            };
            let mut ctx = SqlGeneratorContext::new();
            q.generate_sql(&options, &mut ctx).unwrap()
        };
        assert_eq!(render(PagerModel::Postgres), "SELECT A FROM T LIMIT 10 OFFSET 20");
        assert_eq!(render(PagerModel::Mysql), "SELECT A FROM T LIMIT 20, 10");
        assert_eq!(render(PagerModel::Interbase), "SELECT A FROM T ROWS 21 TO 30");
        assert_eq!(
            render(PagerModel::Oracle),
            "SELECT OUTER_.* FROM (SELECT INNER_.*, ROWNUM RN_ FROM \
             (SELECT A FROM T) INNER_) OUTER_ WHERE OUTER_.RN_ > 20 AND OUTER_.RN_ <= 30"
        );
    }

    #[test]
    fn key_filter_surrogate_and_composite() {
        let key = Key::surrogate("T", "ID", Some(5));
        assert_eq!(Expr::key_filter(key).get_sql().unwrap(), "T.ID = 5");

        let key = Key::fields(
            "T",
            vec![
                ("A".to_string(), Value::Str("x".into())),
                ("B".to_string(), Value::Int(2)),
            ],
        );
        assert_eq!(
            Expr::key_filter(key).get_sql().unwrap(),
            "(T.A = 'x') AND (T.B = 2)"
        );
    }

    #[test]
    fn quoting_modes() {
        let options = SqlGeneratorOptions {
            quotes: IdQuoting::DoubleQuotes,
            ..Default::default()
        };
        let mut ctx = SqlGeneratorContext::new();
        assert_eq!(
            Expr::column("t1", "a").generate_sql(&options, &mut ctx).unwrap(),
            "\"t1\".\"a\""
        );
        let options = SqlGeneratorOptions {
            quotes: IdQuoting::AutoDoubleQuotes,
            ..Default::default()
        };
        assert_eq!(
            Expr::column("T1", "lower").generate_sql(&options, &mut ctx).unwrap(),
            "T1.\"lower\""
        );
    }

    #[test]
    fn find_all_tables_walks_lists_and_joins() {
        let from = Expr::list(vec![Expr::sql("T1"), Expr::sql("T2")]);
        let mut tables = Vec::new();
        find_all_tables(&from, &mut tables).unwrap();
        assert_eq!(tables, ["T1", "T2"]);

        let from = Expr::sql("T1").join(Expr::sql("T2"), Expr::sql("1=1"));
        let mut tables = Vec::new();
        find_all_tables(&from, &mut tables).unwrap();
        assert_eq!(tables, ["T1", "T2"]);

        let mut tables = Vec::new();
        assert!(find_all_tables(&Expr::sql("T1, T2"), &mut tables).is_err());
    }

    #[test]
    fn make_select_projects_all_columns_in_schema_order() {
        let mut schema = Schema::new();
        schema.add_table(
            Table::new("T1")
                .with_column(Column::new("ID", ValueType::LongInt, 0, ColumnFlags::PRIMARY_KEY))
                .with_column(Column::new("A", ValueType::Str, 10, ColumnFlags::empty())),
        );
        let q = make_select(
            &schema,
            Expr::sql("T1"),
            filter_eq("T1.ID", 1),
            Expr::Empty,
            false,
        )
        .unwrap();
        assert_eq!(
            q.get_sql().unwrap(),
            "SELECT T1.ID, T1.A FROM T1 WHERE T1.ID = 1"
        );
    }
}
