//! Table delete statement builder

use super::common::{
    context, ensure_allowed, order_criteria, parse_expression, push_order_by, Bindings,
    IntoColumns, Operation, OrderByClause, QueryBuilder, Stage, TableRef,
};
use crate::executor::{CompiledStatement, StatementKind};
use crate::expr::{IntoExpression, ParsedExpr};
use crate::{Result, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeleteStage {
    Delete,
    Where,
    OrderBy,
    Limit,
    Bind,
    Executed,
}

impl Stage for DeleteStage {
    const STATEMENT: &'static str = "TableDelete";

    fn allowed(self) -> &'static [Operation] {
        use Operation::*;
        match self {
            // Nothing can be referenced yet, so bind is not offered
            Self::Delete => &[Where, OrderBy, Limit, Execute],
            Self::Where => &[OrderBy, Limit, Bind, Execute],
            Self::OrderBy => &[Limit, Bind, Execute],
            Self::Limit => &[Bind, Execute],
            Self::Bind => &[Bind, Execute],
            Self::Executed => &[Limit, Bind, Execute],
        }
    }
}

/// Delete statement on a table, created by `Table::delete`
///
/// # Examples
/// ```
/// use xdevapi_core::{QueryBuilder, Schema};
///
/// let delete = Schema::new("test")
///     .get_table("people")
///     .delete()
///     .where_("age < :years").unwrap()
///     .limit(1).unwrap()
///     .bind("years", 18).unwrap();
///
/// assert_eq!(
///     delete.to_sql().unwrap(),
///     "DELETE FROM `test`.`people` WHERE age < ? LIMIT 1"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct TableDelete {
    table: TableRef,
    filter: Option<ParsedExpr>,
    ordering: Vec<OrderByClause>,
    limit_value: Option<u64>,
    bindings: Bindings,
    stage: DeleteStage,
}

impl TableDelete {
    pub(crate) fn new(table: TableRef) -> Self {
        Self {
            table,
            filter: None,
            ordering: Vec::new(),
            limit_value: None,
            bindings: Bindings::default(),
            stage: DeleteStage::Delete,
        }
    }

    fn enter(&self, op: Operation) -> Result<String> {
        ensure_allowed(self.stage, op)?;
        Ok(context::<DeleteStage>(op))
    }

    /// Restrict the deleted rows with a boolean expression
    pub fn where_<E: IntoExpression>(mut self, condition: E) -> Result<Self> {
        let ctx = self.enter(Operation::Where)?;
        let text = condition.into_expression(&ctx)?;
        self.filter = Some(parse_expression(&ctx, text, &mut self.bindings)?);
        self.stage = DeleteStage::Where;
        Ok(self)
    }

    /// Sort by `column [ASC|DESC]` criteria, used together with `limit`
    pub fn order_by<C: IntoColumns>(mut self, criteria: C) -> Result<Self> {
        let ctx = self.enter(Operation::OrderBy)?;
        self.ordering = order_criteria(&ctx, criteria)?;
        self.stage = DeleteStage::OrderBy;
        Ok(self)
    }

    /// Limit the number of deleted rows
    pub fn limit(mut self, count: u64) -> Result<Self> {
        self.enter(Operation::Limit)?;
        self.limit_value = Some(count);
        self.stage = DeleteStage::Limit;
        Ok(self)
    }

    /// Bind a value to a named placeholder
    pub fn bind<V: Into<Value>>(mut self, name: &str, value: V) -> Result<Self> {
        let ctx = self.enter(Operation::Bind)?;
        self.bindings.bind(&ctx, name, value.into())?;
        self.stage = DeleteStage::Bind;
        Ok(self)
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
        self.stage = DeleteStage::Executed;
    }
}

impl QueryBuilder for TableDelete {
    fn compile(&self) -> Result<CompiledStatement> {
        let ctx = context::<DeleteStage>(Operation::Execute);
        let mut sql = String::from("DELETE FROM ");
        let mut params = Vec::new();
        sql.push_str(&self.table.to_sql());

        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            filter.render(&ctx, &self.bindings, &mut sql, &mut params)?;
        }

        push_order_by(&mut sql, &self.ordering);

        if let Some(limit) = self.limit_value {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        Ok(CompiledStatement::new(StatementKind::Delete, sql, params))
    }

    fn valid_operations(&self) -> &'static [Operation] {
        self.stage.allowed()
    }
}
