//! Table update statement builder

use super::common::{
    context, ensure_allowed, order_criteria, parse_expression, push_order_by, push_value,
    quote_identifier, register_value, Bindings, IntoColumns, Operation, OrderByClause,
    QueryBuilder, Stage, TableRef,
};
use crate::executor::{CompiledStatement, StatementKind};
use crate::expr::{IntoExpression, ParsedExpr};
use crate::{Error, Result, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateStage {
    Update,
    Set,
    Where,
    OrderBy,
    Limit,
    Bind,
    Executed,
}

impl Stage for UpdateStage {
    const STATEMENT: &'static str = "TableUpdate";

    fn allowed(self) -> &'static [Operation] {
        use Operation::*;
        match self {
            Self::Update => &[Set],
            Self::Set => &[Set, Where, OrderBy, Limit, Bind, Execute],
            Self::Where => &[OrderBy, Limit, Bind, Execute],
            Self::OrderBy => &[Limit, Bind, Execute],
            Self::Limit => &[Bind, Execute],
            Self::Bind => &[Bind, Execute],
            Self::Executed => &[Limit, Bind, Execute],
        }
    }
}

/// Update statement on a table, created by `Table::update`
#[derive(Debug, Clone)]
pub struct TableUpdate {
    table: TableRef,
    assignments: Vec<(String, Value)>,
    filter: Option<ParsedExpr>,
    ordering: Vec<OrderByClause>,
    limit_value: Option<u64>,
    bindings: Bindings,
    stage: UpdateStage,
}

impl TableUpdate {
    pub(crate) fn new(table: TableRef) -> Self {
        Self {
            table,
            assignments: Vec::new(),
            filter: None,
            ordering: Vec::new(),
            limit_value: None,
            bindings: Bindings::default(),
            stage: UpdateStage::Update,
        }
    }

    fn enter(&self, op: Operation) -> Result<String> {
        ensure_allowed(self.stage, op)?;
        Ok(context::<UpdateStage>(op))
    }

    /// Assign a value or an `expr(...)` to a column
    ///
    /// Setting the same column again replaces the earlier assignment.
    ///
    /// # Examples
    /// ```
    /// use xdevapi_core::{expr, QueryBuilder, Schema};
    ///
    /// let update = Schema::new("test")
    ///     .get_table("people")
    ///     .update()
    ///     .set("age", expr("age + 1")).unwrap()
    ///     .where_("name = 'jack'").unwrap();
    ///
    /// assert_eq!(
    ///     update.to_sql().unwrap(),
    ///     "UPDATE `test`.`people` SET `age` = (age + 1) WHERE name = 'jack'"
    /// );
    /// ```
    pub fn set<V: Into<Value>>(mut self, column: &str, value: V) -> Result<Self> {
        let ctx = self.enter(Operation::Set)?;
        if column.trim().is_empty() {
            return Err(Error::invalid_argument(ctx, "Column name can not be empty"));
        }
        let value = value.into();
        register_value(&ctx, &value, &mut self.bindings)?;
        match self.assignments.iter().position(|(c, _)| c == column) {
            Some(index) => {
                self.assignments[index].1 = value;
                let used = self.placeholders_in_use(&ctx)?;
                self.bindings.retain(&used);
            }
            None => self.assignments.push((column.to_string(), value)),
        }
        self.stage = UpdateStage::Set;
        Ok(self)
    }

    /// Placeholder names still referenced by the assignments or the filter
    fn placeholders_in_use(&self, ctx: &str) -> Result<Vec<String>> {
        let mut used = Vec::new();
        for (_, value) in &self.assignments {
            if let Value::Expr(e) = value {
                let parsed = ParsedExpr::parse(ctx, e.data().to_string())?;
                used.extend(parsed.placeholder_names().map(str::to_string));
            }
        }
        if let Some(filter) = &self.filter {
            used.extend(filter.placeholder_names().map(str::to_string));
        }
        Ok(used)
    }

    /// Restrict the updated rows with a boolean expression
    pub fn where_<E: IntoExpression>(mut self, condition: E) -> Result<Self> {
        let ctx = self.enter(Operation::Where)?;
        let text = condition.into_expression(&ctx)?;
        self.filter = Some(parse_expression(&ctx, text, &mut self.bindings)?);
        self.stage = UpdateStage::Where;
        Ok(self)
    }

    /// Sort by `column [ASC|DESC]` criteria, used together with `limit`
    pub fn order_by<C: IntoColumns>(mut self, criteria: C) -> Result<Self> {
        let ctx = self.enter(Operation::OrderBy)?;
        self.ordering = order_criteria(&ctx, criteria)?;
        self.stage = UpdateStage::OrderBy;
        Ok(self)
    }

    /// Limit the number of updated rows
    pub fn limit(mut self, count: u64) -> Result<Self> {
        self.enter(Operation::Limit)?;
        self.limit_value = Some(count);
        self.stage = UpdateStage::Limit;
        Ok(self)
    }

    /// Bind a value to a named placeholder
    pub fn bind<V: Into<Value>>(mut self, name: &str, value: V) -> Result<Self> {
        let ctx = self.enter(Operation::Bind)?;
        self.bindings.bind(&ctx, name, value.into())?;
        self.stage = UpdateStage::Bind;
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
        self.stage = UpdateStage::Executed;
    }
}

impl QueryBuilder for TableUpdate {
    fn compile(&self) -> Result<CompiledStatement> {
        let ctx = context::<UpdateStage>(Operation::Execute);
        if self.assignments.is_empty() {
            return Err(Error::invalid_argument(
                ctx,
                "UPDATE requires at least one set() call",
            ));
        }

        let mut sql = String::from("UPDATE ");
        let mut params = Vec::new();
        sql.push_str(&self.table.to_sql());
        sql.push_str(" SET ");
        for (i, (column, value)) in self.assignments.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&quote_identifier(column));
            sql.push_str(" = ");
            push_value(&ctx, value, &self.bindings, &mut sql, &mut params)?;
        }

        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            filter.render(&ctx, &self.bindings, &mut sql, &mut params)?;
        }

        push_order_by(&mut sql, &self.ordering);

        if let Some(limit) = self.limit_value {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        Ok(CompiledStatement::new(StatementKind::Update, sql, params))
    }

    fn valid_operations(&self) -> &'static [Operation] {
        self.stage.allowed()
    }
}
