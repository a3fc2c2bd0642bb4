//! SQL expressions for filters, join conditions, HAVING and ORDER BY.
//!
//! Expressions are opaque until compilation. Column references may be left
//! unqualified ([`Expr::col`]), in which case they resolve to whichever table
//! the expression is attached to: the base request for request filters, the
//! associated table for association filters. [`TableAlias::col`] references a
//! specific table instance anywhere in the statement.

use crate::alias::TableAlias;
use crate::association::AssociationAggregate;
use crate::clause::{OrderBy, OrderDirection};
use serde::{Deserialize, Serialize};
use sqlassoc_core::{AssociationError, AssociationErrorKind, Result, Value};

/// SQL dialect for generating dialect-specific SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Dialect {
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// SQLite dialect (uses ?1, ?2 placeholders)
    Sqlite,
    /// MySQL dialect (uses ? placeholders)
    Mysql,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are doubled.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => sqlassoc_core::quote_ident(name),
            Dialect::Mysql => sqlassoc_core::quote_ident_mysql(name),
        }
    }
}

/// The table a column reference belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    /// The table the expression is attached to
    Current,
    /// A specific table instance, resolved at compile time
    Alias(TableAlias),
    /// A literal table name or alias, emitted verbatim (quoted)
    Named(String),
}

/// A SQL expression that can be used in WHERE, ON, HAVING and ORDER BY.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference
    Column {
        /// Table qualifier
        table: TableRef,
        /// Column name
        name: String,
    },

    /// Literal value, always bound as a parameter
    Literal(Value),

    /// Binary operation (e.g., a = b, a > b)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Unary operation (e.g., NOT a, -a)
    Unary { op: UnaryOp, expr: Box<Expr> },

    /// Function call (e.g., COUNT(x), UPPER(name))
    Function { name: String, args: Vec<Expr> },

    /// IN expression
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// LIKE / NOT LIKE pattern
    Like {
        expr: Box<Expr>,
        pattern: String,
        negated: bool,
    },

    /// Raw SQL fragment (escape hatch)
    Raw(String),

    /// Parenthesized expression
    Paren(Box<Expr>),

    /// COUNT(*)
    CountStar,

    /// Aggregate over an association of the base table.
    ///
    /// Compiles into a LEFT JOIN plus GROUP BY on the base request.
    Aggregate(Box<AssociationAggregate>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
    /// Logical AND
    And,
    /// Logical OR
    Or,
    /// Addition (+)
    Add,
    /// Subtraction (-)
    Sub,
    /// Multiplication (*)
    Mul,
    /// Division (/)
    Div,
    /// String concatenation (||)
    Concat,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Concat => "||",
        }
    }

    /// Get the precedence of this operator (higher = binds tighter).
    pub const fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 3,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Concat => 7,
            BinaryOp::Mul | BinaryOp::Div => 8,
        }
    }

    const fn is_associative(self) -> bool {
        matches!(
            self,
            BinaryOp::And | BinaryOp::Or | BinaryOp::Add | BinaryOp::Mul | BinaryOp::Concat
        )
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Resolves table references while rendering.
pub(crate) trait Resolver {
    /// Rendered alias of the table the expression is attached to.
    fn current(&self) -> Option<&str>;
    /// Rendered alias of a specific table instance.
    fn alias<'a>(&'a self, alias: &'a TableAlias) -> Result<&'a str>;
    /// Rendered alias of the table an aggregate ranges over.
    fn aggregate<'a>(&'a self, aggregate: &'a AssociationAggregate) -> Result<&'a str>;
}

/// Accumulates bound parameters while a statement renders.
pub(crate) struct SqlWriter {
    pub(crate) dialect: Dialect,
    pub(crate) params: Vec<Value>,
}

impl SqlWriter {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    pub(crate) fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        self.dialect.placeholder(self.params.len())
    }

    pub(crate) fn quote(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    pub(crate) fn column(&self, table: &str, column: &str) -> String {
        format!("{}.{}", self.quote(table), self.quote(column))
    }
}

/// Renders expressions outside of a compiled request: unqualified columns stay
/// unqualified and only locked aliases can be named.
struct Standalone;

impl Resolver for Standalone {
    fn current(&self) -> Option<&str> {
        None
    }

    fn alias<'a>(&'a self, alias: &'a TableAlias) -> Result<&'a str> {
        alias.locked_name().ok_or_else(|| {
            AssociationError::new(
                AssociationErrorKind::UndefinedAlias,
                "undefined alias: unnamed alias outside of a compiled request",
            )
            .into()
        })
    }

    fn aggregate<'a>(&'a self, _aggregate: &'a AssociationAggregate) -> Result<&'a str> {
        Err(AssociationError::unsupported("association aggregate outside of a compiled request").into())
    }
}

impl Expr {
    // ==================== Constructors ====================

    /// Create a column reference on the table this expression is attached to.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column {
            table: TableRef::Current,
            name: name.into(),
        }
    }

    /// Create a column reference qualified by a literal table name.
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            table: TableRef::Named(table.into()),
            name: column.into(),
        }
    }

    /// Create a literal value expression.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Create a raw SQL expression (escape hatch).
    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    // ==================== Comparison Operators ====================

    /// Equal to (=)
    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// Not equal to (<>)
    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    /// Less than (<)
    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    /// Less than or equal to (<=)
    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    /// Greater than (>)
    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    /// Greater than or equal to (>=)
    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    // ==================== Logical Operators ====================

    /// Logical AND
    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// Logical OR
    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// Logical NOT
    pub fn not(self) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }

    // ==================== Null Checks ====================

    /// IS NULL
    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    /// IS NOT NULL
    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    // ==================== Pattern Matching ====================

    /// LIKE pattern
    pub fn like(self, pattern: impl Into<String>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: pattern.into(),
            negated: false,
        }
    }

    /// NOT LIKE pattern
    pub fn not_like(self, pattern: impl Into<String>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: pattern.into(),
            negated: true,
        }
    }

    // ==================== IN Lists ====================

    /// IN (values)
    pub fn in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// NOT IN (values)
    pub fn not_in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    // ==================== Arithmetic ====================

    /// Addition (+)
    pub fn add(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Add, other)
    }

    /// Subtraction (-)
    pub fn sub(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Sub, other)
    }

    /// Multiplication (*)
    pub fn mul(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Mul, other)
    }

    /// Division (/)
    pub fn div(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Div, other)
    }

    /// Negation (-)
    pub fn neg(self) -> Self {
        Expr::Unary {
            op: UnaryOp::Neg,
            expr: Box::new(self),
        }
    }

    /// String concatenation (CONCAT() on MySQL)
    pub fn concat(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Concat, other)
    }

    // ==================== Functions ====================

    /// COUNT(*)
    pub fn count_star() -> Self {
        Expr::CountStar
    }

    /// Generic function call.
    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    /// COALESCE(args...)
    pub fn coalesce(args: Vec<impl Into<Expr>>) -> Self {
        Expr::function("COALESCE", args.into_iter().map(Into::into).collect())
    }

    /// UPPER(expr)
    pub fn upper(self) -> Self {
        Expr::function("UPPER", vec![self])
    }

    /// LOWER(expr)
    pub fn lower(self) -> Self {
        Expr::function("LOWER", vec![self])
    }

    // ==================== Ordering ====================

    /// Create an ascending ORDER BY term.
    pub fn asc(self) -> OrderBy {
        OrderBy::new(self, OrderDirection::Asc)
    }

    /// Create a descending ORDER BY term.
    pub fn desc(self) -> OrderBy {
        OrderBy::new(self, OrderDirection::Desc)
    }

    // ==================== Utility ====================

    /// Wrap expression in parentheses.
    pub fn paren(self) -> Self {
        Expr::Paren(Box::new(self))
    }

    /// Rewrite unqualified columns to reference `alias`.
    ///
    /// This is how a filter written for one table is moved onto another table
    /// instance without re-parsing it.
    pub fn rerooted(&self, alias: &TableAlias) -> Expr {
        self.map_columns(&|table| match table {
            TableRef::Current => TableRef::Alias(alias.clone()),
            other => other.clone(),
        })
    }

    fn map_columns(&self, f: &dyn Fn(&TableRef) -> TableRef) -> Expr {
        let boxed = |e: &Expr| Box::new(e.map_columns(f));
        match self {
            Expr::Column { table, name } => Expr::Column {
                table: f(table),
                name: name.clone(),
            },
            Expr::Binary { left, op, right } => Expr::Binary {
                left: boxed(left),
                op: *op,
                right: boxed(right),
            },
            Expr::Unary { op, expr } => Expr::Unary {
                op: *op,
                expr: boxed(expr),
            },
            Expr::Function { name, args } => Expr::Function {
                name: name.clone(),
                args: args.iter().map(|a| a.map_columns(f)).collect(),
            },
            Expr::In {
                expr,
                values,
                negated,
            } => Expr::In {
                expr: boxed(expr),
                values: values.iter().map(|v| v.map_columns(f)).collect(),
                negated: *negated,
            },
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: boxed(expr),
                negated: *negated,
            },
            Expr::Like {
                expr,
                pattern,
                negated,
            } => Expr::Like {
                expr: boxed(expr),
                pattern: pattern.clone(),
                negated: *negated,
            },
            Expr::Paren(expr) => Expr::Paren(boxed(expr)),
            Expr::Literal(_) | Expr::Raw(_) | Expr::CountStar | Expr::Aggregate(_) => self.clone(),
        }
    }

    /// Visit every association aggregate in this expression, left to right.
    pub(crate) fn visit_aggregates<'a>(&'a self, out: &mut Vec<&'a AssociationAggregate>) {
        match self {
            Expr::Aggregate(agg) => out.push(agg),
            Expr::Binary { left, right, .. } => {
                left.visit_aggregates(out);
                right.visit_aggregates(out);
            }
            Expr::Unary { expr, .. }
            | Expr::IsNull { expr, .. }
            | Expr::Like { expr, .. }
            | Expr::Paren(expr) => expr.visit_aggregates(out),
            Expr::Function { args, .. } => args.iter().for_each(|a| a.visit_aggregates(out)),
            Expr::In { expr, values, .. } => {
                expr.visit_aggregates(out);
                values.iter().for_each(|v| v.visit_aggregates(out));
            }
            Expr::Column { .. } | Expr::Literal(_) | Expr::Raw(_) | Expr::CountStar => {}
        }
    }

    /// Does this expression contain an association aggregate?
    pub fn contains_aggregate(&self) -> bool {
        let mut found = Vec::new();
        self.visit_aggregates(&mut found);
        !found.is_empty()
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            // NOT binds looser than comparisons
            Expr::Unary {
                op: UnaryOp::Not, ..
            } => 2,
            Expr::In { .. } | Expr::IsNull { .. } | Expr::Like { .. } => 3,
            _ => u8::MAX,
        }
    }

    // ==================== SQL Generation ====================

    /// Render this expression on its own, outside of any compiled request.
    ///
    /// Unqualified columns stay unqualified; aliases must be locked.
    pub fn to_sql(&self, dialect: Dialect) -> Result<(String, Vec<Value>)> {
        let mut w = SqlWriter::new(dialect);
        let sql = self.render(&mut w, &Standalone)?;
        Ok((sql, w.params))
    }

    pub(crate) fn render(&self, w: &mut SqlWriter, r: &dyn Resolver) -> Result<String> {
        let sql = match self {
            Expr::Column { table, name } => match table {
                TableRef::Current => match r.current() {
                    Some(alias) => w.column(alias, name),
                    None => w.quote(name),
                },
                TableRef::Alias(alias) => {
                    let alias = r.alias(alias)?;
                    w.column(alias, name)
                }
                TableRef::Named(table) => w.column(table, name),
            },

            Expr::Literal(value) => w.bind(value.clone()),

            Expr::Binary { left, op, right } => {
                let prec = op.precedence();
                let left_sql = left.render_operand(w, r, left.precedence() < prec)?;
                let right_prec = right.precedence();
                let wrap_right =
                    right_prec < prec || (right_prec == prec && !op.is_associative());
                let right_sql = right.render_operand(w, r, wrap_right)?;
                if *op == BinaryOp::Concat && w.dialect == Dialect::Mysql {
                    format!("CONCAT({left_sql}, {right_sql})")
                } else {
                    format!("{left_sql} {} {right_sql}", op.as_str())
                }
            }

            Expr::Unary { op, expr } => {
                let wrap = match op {
                    UnaryOp::Not => expr.precedence() < 3,
                    UnaryOp::Neg => expr.precedence() < u8::MAX,
                };
                let expr_sql = expr.render_operand(w, r, wrap)?;
                match op {
                    UnaryOp::Not => format!("NOT {expr_sql}"),
                    UnaryOp::Neg => format!("-{expr_sql}"),
                }
            }

            Expr::Function { name, args } => {
                let arg_sqls = args
                    .iter()
                    .map(|a| a.render(w, r))
                    .collect::<Result<Vec<_>>>()?;
                format!("{name}({})", arg_sqls.join(", "))
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                if values.is_empty() {
                    // IN () is not valid SQL
                    return Ok(if *negated { "1 = 1" } else { "1 = 0" }.to_string());
                }
                let expr_sql = expr.render_operand(w, r, expr.precedence() <= 3)?;
                let value_sqls = values
                    .iter()
                    .map(|v| v.render(w, r))
                    .collect::<Result<Vec<_>>>()?;
                let not_str = if *negated { "NOT " } else { "" };
                format!("{expr_sql} {not_str}IN ({})", value_sqls.join(", "))
            }

            Expr::IsNull { expr, negated } => {
                let expr_sql = expr.render_operand(w, r, expr.precedence() <= 3)?;
                let not_str = if *negated { " NOT" } else { "" };
                format!("{expr_sql} IS{not_str} NULL")
            }

            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let expr_sql = expr.render_operand(w, r, expr.precedence() <= 3)?;
                let param = w.bind(Value::Text(pattern.clone()));
                let not_str = if *negated { "NOT " } else { "" };
                format!("{expr_sql} {not_str}LIKE {param}")
            }

            Expr::Raw(sql) => sql.clone(),

            Expr::Paren(expr) => format!("({})", expr.render(w, r)?),

            Expr::CountStar => "COUNT(*)".to_string(),

            Expr::Aggregate(agg) => {
                let alias = r.aggregate(agg)?;
                agg.render(w, alias)
            }
        };
        Ok(sql)
    }

    fn render_operand(&self, w: &mut SqlWriter, r: &dyn Resolver, wrap: bool) -> Result<String> {
        let sql = self.render(w, r)?;
        Ok(if wrap { format!("({sql})") } else { sql })
    }

    /// Render as one term of an AND list.
    pub(crate) fn render_conjunct(&self, w: &mut SqlWriter, r: &dyn Resolver) -> Result<String> {
        self.render_operand(w, r, self.precedence() < BinaryOp::And.precedence())
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Literal(Value::Text(s.to_string()))
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Literal(Value::Text(s))
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Literal(Value::Int(n))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Literal(Value::BigInt(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Literal(Value::Bool(b))
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Expr::Literal(Value::Double(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql(expr: &Expr) -> (String, Vec<Value>) {
        expr.to_sql(Dialect::Postgres).unwrap()
    }

    #[test]
    fn test_column_unqualified_stays_bare() {
        assert_eq!(sql(&Expr::col("name")).0, "\"name\"");
        assert_eq!(
            sql(&Expr::qualified("books", "year")).0,
            "\"books\".\"year\""
        );
    }

    #[test]
    fn test_literals_bind_in_order() {
        let expr = Expr::col("year").gt(2000).and(Expr::col("title").eq("Dune"));
        let (sql, params) = sql(&expr);
        assert_eq!(sql, "\"year\" > $1 AND \"title\" = $2");
        assert_eq!(params, vec![Value::Int(2000), Value::Text("Dune".into())]);
    }

    #[test]
    fn test_or_inside_and_is_parenthesized() {
        let expr = Expr::col("a")
            .eq(1)
            .or(Expr::col("b").eq(2))
            .and(Expr::col("c").eq(3));
        assert_eq!(
            sql(&expr).0,
            "(\"a\" = $1 OR \"b\" = $2) AND \"c\" = $3"
        );
    }

    #[test]
    fn test_non_associative_right_operand() {
        let expr = Expr::col("a").sub(Expr::col("b").sub(Expr::col("c")));
        assert_eq!(sql(&expr).0, "\"a\" - (\"b\" - \"c\")");
    }

    #[test]
    fn test_not_wraps_only_looser_operands() {
        let expr = Expr::col("a").eq(1).not();
        assert_eq!(sql(&expr).0, "NOT \"a\" = $1");
        let expr = Expr::col("a").eq(1).or(Expr::col("b").eq(2)).not();
        assert_eq!(sql(&expr).0, "NOT (\"a\" = $1 OR \"b\" = $2)");
    }

    #[test]
    fn test_empty_in_list() {
        let expr = Expr::col("id").in_list(Vec::<i64>::new());
        assert_eq!(sql(&expr).0, "1 = 0");
        let expr = Expr::col("id").not_in_list(Vec::<i64>::new());
        assert_eq!(sql(&expr).0, "1 = 1");
    }

    #[test]
    fn test_dialect_placeholders() {
        let expr = Expr::col("a").eq(1).and(Expr::col("b").eq(2));
        let (sqlite, _) = expr.to_sql(Dialect::Sqlite).unwrap();
        assert_eq!(sqlite, "\"a\" = ?1 AND \"b\" = ?2");
        let (mysql, _) = expr.to_sql(Dialect::Mysql).unwrap();
        assert_eq!(mysql, "`a` = ? AND `b` = ?");
    }

    #[test]
    fn test_mysql_concat() {
        let expr = Expr::col("first").concat(Expr::col("last"));
        let (sql, _) = expr.to_sql(Dialect::Mysql).unwrap();
        assert_eq!(sql, "CONCAT(`first`, `last`)");
    }

    #[test]
    fn test_rerooted_qualifies_only_unqualified_columns() {
        let alias = TableAlias::named("b");
        let expr = Expr::col("year")
            .gt(2000)
            .and(Expr::qualified("authors", "id").is_not_null());
        let rerooted = expr.rerooted(&alias);
        assert_eq!(
            sql(&rerooted).0,
            "\"b\".\"year\" > $1 AND \"authors\".\"id\" IS NOT NULL"
        );
    }

    #[test]
    fn test_unlocked_alias_is_undefined_outside_request() {
        let alias = TableAlias::new();
        let err = alias.col("id").eq(1).to_sql(Dialect::Postgres).unwrap_err();
        assert_eq!(
            err.association_kind(),
            Some(AssociationErrorKind::UndefinedAlias)
        );
    }
}
