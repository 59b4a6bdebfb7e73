use crate::core::{DriverError, DriverResult, Value};
use sqlparser::ast as sql_ast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    /// 1-based parameter index.
    Param(usize),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Filter {
    All,
    Eq(String, Operand),
    In(String, Vec<Operand>),
    And(Box<Filter>, Box<Filter>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        values: Vec<Operand>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Operand)>,
        filter: Filter,
    },
    Delete {
        table: String,
        filter: Filter,
    },
    Select {
        table: String,
        columns: Option<Vec<String>>,
        filter: Filter,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedStatement {
    pub command: Command,
    pub parameter_count: usize,
}

#[derive(Default)]
struct Placeholders {
    sequential: usize,
    highest_numbered: usize,
}

impl Placeholders {
    fn take(&mut self, text: &str) -> DriverResult<usize> {
        if text == "?" {
            self.sequential += 1;
            return Ok(self.sequential);
        }
        let number = text
            .strip_prefix('$')
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| unsupported(format!("Unsupported placeholder '{}'", text)))?;
        self.highest_numbered = self.highest_numbered.max(number);
        Ok(number)
    }

    fn count(&self) -> usize {
        self.sequential.max(self.highest_numbered)
    }
}

fn syntax_error(message: impl Into<String>) -> DriverError {
    DriverError::new(message).with_sql_state("42601")
}

fn unsupported(message: impl Into<String>) -> DriverError {
    DriverError::new(message).with_sql_state("0A000")
}

pub(crate) fn parse(sql: &str) -> DriverResult<ParsedStatement> {
    let mut statements = Parser::parse_sql(&GenericDialect {}, sql)
        .map_err(|e| syntax_error(format!("Parse error: {}", e)))?;
    if statements.len() != 1 {
        return Err(syntax_error(format!(
            "Expected exactly one statement, got {}",
            statements.len()
        )));
    }

    let mut params = Placeholders::default();
    let command = match statements.remove(0) {
        sql_ast::Statement::Insert(insert) => convert_insert(insert, &mut params)?,
        sql_ast::Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => convert_update(table, assignments, selection, &mut params)?,
        sql_ast::Statement::Delete(delete) => convert_delete(delete, &mut params)?,
        sql_ast::Statement::Query(query) => convert_query(*query, &mut params)?,
        other => {
            return Err(unsupported(format!(
                "Statement type not supported: {}",
                other
            )));
        }
    };

    Ok(ParsedStatement {
        command,
        parameter_count: params.count(),
    })
}

fn convert_insert(insert: sql_ast::Insert, params: &mut Placeholders) -> DriverResult<Command> {
    let table = normalize(&insert.table.to_string());
    let columns = if insert.columns.is_empty() {
        None
    } else {
        Some(insert.columns.iter().map(|id| normalize(&id.value)).collect())
    };

    let Some(source) = insert.source else {
        return Err(unsupported("INSERT requires a VALUES clause"));
    };
    let sql_ast::SetExpr::Values(values) = *source.body else {
        return Err(unsupported("Only VALUES clause supported"));
    };
    let mut rows = values.rows.into_iter();
    let (Some(row), None) = (rows.next(), rows.next()) else {
        return Err(unsupported("Only single-row VALUES supported"));
    };
    let values = row
        .into_iter()
        .map(|expr| operand(expr, params))
        .collect::<DriverResult<Vec<_>>>()?;

    Ok(Command::Insert {
        table,
        columns,
        values,
    })
}

fn convert_update(
    table: sql_ast::TableWithJoins,
    assignments: Vec<sql_ast::Assignment>,
    selection: Option<sql_ast::Expr>,
    params: &mut Placeholders,
) -> DriverResult<Command> {
    let table = table_name(table)?;

    let assignments = assignments
        .into_iter()
        .map(|assign| {
            let column = match assign.target {
                sql_ast::AssignmentTarget::ColumnName(col_name) => col_name
                    .0
                    .last()
                    .map(|part| normalize(&part.to_string()))
                    .ok_or_else(|| syntax_error("Empty column name in UPDATE"))?,
                _ => return Err(unsupported("Only simple column names supported in UPDATE")),
            };
            Ok((column, operand(assign.value, params)?))
        })
        .collect::<DriverResult<Vec<_>>>()?;

    let filter = convert_filter(selection, params)?;

    Ok(Command::Update {
        table,
        assignments,
        filter,
    })
}

fn convert_delete(delete: sql_ast::Delete, params: &mut Placeholders) -> DriverResult<Command> {
    let tables = match delete.from {
        sql_ast::FromTable::WithFromKeyword(tables) => tables,
        sql_ast::FromTable::WithoutKeyword(tables) => tables,
    };
    let table = tables
        .into_iter()
        .next()
        .ok_or_else(|| syntax_error("DELETE requires a table"))
        .and_then(table_name)?;
    let filter = convert_filter(delete.selection, params)?;

    Ok(Command::Delete { table, filter })
}

fn convert_query(query: sql_ast::Query, params: &mut Placeholders) -> DriverResult<Command> {
    let sql_ast::SetExpr::Select(select) = *query.body else {
        return Err(unsupported("Only SELECT queries supported"));
    };
    let select = *select;

    let mut columns = Some(Vec::new());
    for item in select.projection {
        match item {
            sql_ast::SelectItem::Wildcard(_) => columns = None,
            sql_ast::SelectItem::UnnamedExpr(expr)
            | sql_ast::SelectItem::ExprWithAlias { expr, .. } => {
                if let Some(list) = columns.as_mut() {
                    list.push(identifier(expr)?);
                }
            }
            other => {
                return Err(unsupported(format!("Unsupported select item: {}", other)));
            }
        }
    }

    let mut from = select.from.into_iter();
    let (Some(table), None) = (from.next(), from.next()) else {
        return Err(unsupported("SELECT requires exactly one table"));
    };
    let table = table_name(table)?;
    let filter = convert_filter(select.selection, params)?;

    Ok(Command::Select {
        table,
        columns,
        filter,
    })
}

fn table_name(table: sql_ast::TableWithJoins) -> DriverResult<String> {
    if !table.joins.is_empty() {
        return Err(unsupported("Joins are not supported"));
    }
    match table.relation {
        sql_ast::TableFactor::Table { name, .. } => name
            .0
            .last()
            .map(|part| normalize(&part.to_string()))
            .ok_or_else(|| syntax_error("Invalid table name")),
        _ => Err(unsupported("Complex table references not supported")),
    }
}

fn convert_filter(
    selection: Option<sql_ast::Expr>,
    params: &mut Placeholders,
) -> DriverResult<Filter> {
    match selection {
        Some(expr) => predicate(expr, params),
        None => Ok(Filter::All),
    }
}

fn predicate(expr: sql_ast::Expr, params: &mut Placeholders) -> DriverResult<Filter> {
    match expr {
        sql_ast::Expr::Nested(inner) => predicate(*inner, params),
        sql_ast::Expr::BinaryOp {
            left,
            op: sql_ast::BinaryOperator::And,
            right,
        } => {
            let left = predicate(*left, params)?;
            let right = predicate(*right, params)?;
            Ok(Filter::And(Box::new(left), Box::new(right)))
        }
        sql_ast::Expr::BinaryOp {
            left,
            op: sql_ast::BinaryOperator::Eq,
            right,
        } => {
            let column = identifier(*left)?;
            Ok(Filter::Eq(column, operand(*right, params)?))
        }
        sql_ast::Expr::InList {
            expr,
            list,
            negated: false,
        } => {
            let column = identifier(*expr)?;
            let list = list
                .into_iter()
                .map(|item| operand(item, params))
                .collect::<DriverResult<Vec<_>>>()?;
            Ok(Filter::In(column, list))
        }
        other => Err(unsupported(format!("Unsupported predicate: {}", other))),
    }
}

fn identifier(expr: sql_ast::Expr) -> DriverResult<String> {
    match expr {
        sql_ast::Expr::Identifier(ident) => Ok(normalize(&ident.value)),
        sql_ast::Expr::CompoundIdentifier(idents) => idents
            .last()
            .map(|ident| normalize(&ident.value))
            .ok_or_else(|| syntax_error("Empty identifier")),
        sql_ast::Expr::Nested(inner) => identifier(*inner),
        other => Err(unsupported(format!("Expected a column name, got: {}", other))),
    }
}

fn operand(expr: sql_ast::Expr, params: &mut Placeholders) -> DriverResult<Operand> {
    match expr {
        sql_ast::Expr::Value(value) => match value.value {
            sql_ast::Value::Placeholder(text) => params.take(&text).map(Operand::Param),
            other => literal(&other).map(Operand::Literal),
        },
        sql_ast::Expr::Nested(inner) => operand(*inner, params),
        other => Err(unsupported(format!("Unsupported operand: {}", other))),
    }
}

fn literal(value: &sql_ast::Value) -> DriverResult<Value> {
    match value {
        sql_ast::Value::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Value::Integer(i))
            } else {
                n.parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| syntax_error(format!("Invalid number: {}", n)))
            }
        }
        sql_ast::Value::SingleQuotedString(s) => Ok(Value::Text(s.clone())),
        sql_ast::Value::Boolean(b) => Ok(Value::Boolean(*b)),
        sql_ast::Value::Null => Ok(Value::Null),
        other => Err(unsupported(format!("Unsupported literal: {}", other))),
    }
}

fn normalize(name: &str) -> String {
    name.trim_matches('"').to_lowercase()
}
