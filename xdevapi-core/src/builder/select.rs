//! Table select statement builder

use super::common::{
    column_list, ensure_allowed, context, order_criteria, parse_expression, push_order_by,
    Bindings, IntoColumns, Operation, OrderByClause, QueryBuilder, Stage, TableRef,
};
use crate::executor::{CompiledStatement, StatementKind};
use crate::expr::{IntoExpression, ParsedExpr};
use crate::lock::{IntoLockContention, LockMode};
use crate::{Result, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectStage {
    Select,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    Offset,
    Lock,
    Bind,
    Executed,
}

impl Stage for SelectStage {
    const STATEMENT: &'static str = "TableSelect";

    fn allowed(self) -> &'static [Operation] {
        use Operation::*;
        match self {
            Self::Select => &[
                Where, GroupBy, OrderBy, Limit, LockShared, LockExclusive, Bind, Execute,
            ],
            Self::Where => &[
                GroupBy, OrderBy, Limit, LockShared, LockExclusive, Bind, Execute,
            ],
            Self::GroupBy => &[
                Having, OrderBy, Limit, LockShared, LockExclusive, Bind, Execute,
            ],
            Self::Having => &[OrderBy, Limit, LockShared, LockExclusive, Bind, Execute],
            Self::OrderBy => &[Limit, LockShared, LockExclusive, Bind, Execute],
            Self::Limit => &[Offset, LockShared, LockExclusive, Bind, Execute],
            Self::Offset => &[LockShared, LockExclusive, Bind, Execute],
            Self::Lock => &[Bind, Execute],
            Self::Bind => &[Bind, Execute],
            Self::Executed => &[Limit, Bind, Execute],
        }
    }
}

/// Select statement on a table, created by `Table::select`
///
/// # Examples
/// ```
/// use xdevapi_core::{QueryBuilder, Schema};
///
/// let table = Schema::new("test").get_table("people");
/// let select = table
///     .select(["name", "age"]).unwrap()
///     .where_("age > :years").unwrap()
///     .order_by("age desc").unwrap()
///     .limit(10).unwrap()
///     .bind("years", 13).unwrap();
///
/// assert_eq!(
///     select.to_sql().unwrap(),
///     "SELECT name, age FROM `test`.`people` WHERE age > ? ORDER BY age DESC LIMIT 10"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct TableSelect {
    table: TableRef,
    projection: Vec<String>,
    filter: Option<ParsedExpr>,
    grouping: Vec<String>,
    having: Option<ParsedExpr>,
    ordering: Vec<OrderByClause>,
    limit_value: Option<u64>,
    offset_value: Option<u64>,
    lock: Option<LockMode>,
    bindings: Bindings,
    stage: SelectStage,
}

impl TableSelect {
    /// Select the given columns or expressions
    pub(crate) fn new<C: IntoColumns>(table: TableRef, columns: C) -> Result<Self> {
        let projection = column_list("Table.select", "Field selection criteria", columns)?;
        Ok(Self::with_projection(table, projection))
    }

    /// Select every column
    pub(crate) fn all(table: TableRef) -> Self {
        Self::with_projection(table, Vec::new())
    }

    fn with_projection(table: TableRef, projection: Vec<String>) -> Self {
        Self {
            table,
            projection,
            filter: None,
            grouping: Vec::new(),
            having: None,
            ordering: Vec::new(),
            limit_value: None,
            offset_value: None,
            lock: None,
            bindings: Bindings::default(),
            stage: SelectStage::Select,
        }
    }

    fn enter(&self, op: Operation) -> Result<String> {
        ensure_allowed(self.stage, op)?;
        Ok(context::<SelectStage>(op))
    }

    /// Filter the rows with a boolean expression
    pub fn where_<E: IntoExpression>(mut self, condition: E) -> Result<Self> {
        let ctx = self.enter(Operation::Where)?;
        let text = condition.into_expression(&ctx)?;
        self.filter = Some(parse_expression(&ctx, text, &mut self.bindings)?);
        self.stage = SelectStage::Where;
        Ok(self)
    }

    /// Group the rows by the given columns
    pub fn group_by<C: IntoColumns>(mut self, columns: C) -> Result<Self> {
        let ctx = self.enter(Operation::GroupBy)?;
        self.grouping = column_list(&ctx, "Grouping criteria", columns)?;
        self.stage = SelectStage::GroupBy;
        Ok(self)
    }

    /// Filter the groups with a boolean expression
    pub fn having<E: IntoExpression>(mut self, condition: E) -> Result<Self> {
        let ctx = self.enter(Operation::Having)?;
        let text = condition.into_expression(&ctx)?;
        self.having = Some(parse_expression(&ctx, text, &mut self.bindings)?);
        self.stage = SelectStage::Having;
        Ok(self)
    }

    /// Sort by `column [ASC|DESC]` criteria
    pub fn order_by<C: IntoColumns>(mut self, criteria: C) -> Result<Self> {
        let ctx = self.enter(Operation::OrderBy)?;
        self.ordering = order_criteria(&ctx, criteria)?;
        self.stage = SelectStage::OrderBy;
        Ok(self)
    }

    /// Limit the number of returned rows
    pub fn limit(mut self, count: u64) -> Result<Self> {
        self.enter(Operation::Limit)?;
        self.limit_value = Some(count);
        self.stage = SelectStage::Limit;
        Ok(self)
    }

    /// Skip rows before the first returned one, only valid after `limit`
    pub fn offset(mut self, count: u64) -> Result<Self> {
        self.enter(Operation::Offset)?;
        self.offset_value = Some(count);
        self.stage = SelectStage::Offset;
        Ok(self)
    }

    /// Request shared locks (`FOR SHARE`) on the matching rows
    pub fn lock_shared<M: IntoLockContention>(mut self, mode: M) -> Result<Self> {
        let ctx = self.enter(Operation::LockShared)?;
        self.lock = Some(LockMode::Shared(mode.into_lock_contention(&ctx)?));
        self.stage = SelectStage::Lock;
        Ok(self)
    }

    /// Request exclusive locks (`FOR UPDATE`) on the matching rows
    pub fn lock_exclusive<M: IntoLockContention>(mut self, mode: M) -> Result<Self> {
        let ctx = self.enter(Operation::LockExclusive)?;
        self.lock = Some(LockMode::Exclusive(mode.into_lock_contention(&ctx)?));
        self.stage = SelectStage::Lock;
        Ok(self)
    }

    /// Bind a value to a named placeholder
    pub fn bind<V: Into<Value>>(mut self, name: &str, value: V) -> Result<Self> {
        let ctx = self.enter(Operation::Bind)?;
        self.bindings.bind(&ctx, name, value.into())?;
        self.stage = SelectStage::Bind;
        Ok(self)
    }

    pub fn lock_mode(&self) -> Option<LockMode> {
        self.lock
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub(crate) fn prepare_execute(&self) -> Result<CompiledStatement> {
        let ctx = self.enter(Operation::Execute)?;
        self.bindings.ensure_complete(&ctx)?;
        self.compile()
    }

    pub(crate) fn mark_executed(&mut self) {
        self.stage = SelectStage::Executed;
    }
}

impl QueryBuilder for TableSelect {
    fn compile(&self) -> Result<CompiledStatement> {
        let ctx = context::<SelectStage>(Operation::Execute);
        let mut sql = String::from("SELECT ");
        let mut params = Vec::new();

        if self.projection.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.projection.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.table.to_sql());

        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            filter.render(&ctx, &self.bindings, &mut sql, &mut params)?;
        }

        if !self.grouping.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.grouping.join(", "));
        }

        if let Some(having) = &self.having {
            sql.push_str(" HAVING ");
            having.render(&ctx, &self.bindings, &mut sql, &mut params)?;
        }

        push_order_by(&mut sql, &self.ordering);

        if let Some(limit) = self.limit_value {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = self.offset_value {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        if let Some(lock) = self.lock {
            sql.push_str(&lock.to_sql());
        }

        Ok(CompiledStatement::new(StatementKind::Select, sql, params))
    }

    fn valid_operations(&self) -> &'static [Operation] {
        self.stage.allowed()
    }
}
