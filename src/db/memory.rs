//! In-process database for demos and tests.
//!
//! Understands `SELECT <columns | *> FROM <table> [LIMIT n]` and
//! `EXPLAIN [ANALYZE]` of such a query. Failures use the same phrasing an
//! embedded analytical engine uses, so the classifier sees realistic messages.

use dashmap::DashMap;
use sqlparser::ast::{
    Expr, Ident, Query, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins,
    Value as SqlValue,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::{Database, DatabaseError, ResultHandle, TableHandle};
use crate::data::{Column, Table};

/// Named tables held in memory
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: DashMap<String, Arc<Table>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a table, returning the previous one
    pub fn register(&self, name: impl Into<String>, table: Table) -> Option<Arc<Table>> {
        self.tables.insert(name.into(), Arc::new(table))
    }

    pub fn drop_table(&self, name: &str) -> bool {
        self.tables.remove(name).is_some()
    }

    pub fn table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.get(name).map(|t| Arc::clone(&t))
    }

    /// Table names, sorted
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn run(&self, sql: &str) -> Result<Table, DatabaseError> {
        let statements = Parser::parse_sql(&GenericDialect {}, sql)
            .map_err(|e| DatabaseError::new(format!("Parser Error: syntax error, {}", e)))?;

        match statements.as_slice() {
            [Statement::Query(query)] => self.select(&SelectPlan::from_query(query)?),
            [Statement::Explain {
                statement, analyze, ..
            }] => match statement.as_ref() {
                Statement::Query(query) => self.explain(&SelectPlan::from_query(query)?, *analyze),
                _ => Err(not_implemented("EXPLAIN is only supported for SELECT")),
            },
            [] => Err(DatabaseError::new("Parser Error: syntax error, empty query")),
            [_] => Err(not_implemented("only SELECT statements are supported")),
            _ => Err(not_implemented("multiple statements")),
        }
    }

    fn source(&self, name: &str) -> Result<Arc<Table>, DatabaseError> {
        self.table(name).ok_or_else(|| {
            DatabaseError::new(format!(
                "Catalog Error: Table with name {} does not exist!",
                name
            ))
        })
    }

    fn select(&self, plan: &SelectPlan) -> Result<Table, DatabaseError> {
        let source = self.source(&plan.table)?;
        let projected = plan.project(&source)?;
        Ok(match plan.limit {
            Some(limit) => projected.slice(0, limit),
            None => projected,
        })
    }

    /// One row of `explain_key`, `explain_value`. ANALYZE runs the query and
    /// appends the produced row count and wall time.
    fn explain(&self, plan: &SelectPlan, analyze: bool) -> Result<Table, DatabaseError> {
        let source = self.source(&plan.table)?;
        // Binding errors surface from EXPLAIN too
        plan.project(&source)?;
        let mut text = plan.render(source.num_rows());

        let key = if analyze {
            let started = Instant::now();
            let rows = self.select(plan)?.num_rows();
            text.push_str(&format!(
                "\nRows: {}\nTotal Time: {:.4}s",
                rows,
                started.elapsed().as_secs_f64()
            ));
            "analyzed_plan"
        } else {
            "physical_plan"
        };

        Table::from_columns([
            ("explain_key", Column::String(vec![Some(key.to_string())])),
            ("explain_value", Column::String(vec![Some(text)])),
        ])
        .map_err(|e| DatabaseError::new(e.to_string()))
    }
}

impl Database for MemoryDatabase {
    fn execute(&self, sql: &str) -> Result<Box<dyn ResultHandle>, DatabaseError> {
        let table = self.run(sql)?;
        tracing::debug!(rows = table.num_rows(), "Memory database produced result");
        Ok(Box::new(TableHandle::new(table)))
    }
}

fn not_implemented(what: &str) -> DatabaseError {
    DatabaseError::new(format!("Not implemented Error: {}", what))
}

enum Projection {
    Wildcard,
    Column { name: String, alias: String },
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projection::Wildcard => f.write_str("*"),
            Projection::Column { name, alias } if name == alias => f.write_str(name),
            Projection::Column { name, alias } => write!(f, "{} AS {}", name, alias),
        }
    }
}

struct SelectPlan {
    table: String,
    projections: Vec<Projection>,
    limit: Option<usize>,
}

impl SelectPlan {
    fn from_query(query: &Query) -> Result<Self, DatabaseError> {
        let select = match &*query.body {
            SetExpr::Select(select) => select,
            _ => return Err(not_implemented("set operations")),
        };
        if select.selection.is_some() {
            return Err(not_implemented("WHERE clauses"));
        }
        if !query.order_by.is_empty() {
            return Err(not_implemented("ORDER BY"));
        }

        Ok(Self {
            table: table_name(&select.from)?,
            projections: select
                .projection
                .iter()
                .map(projection)
                .collect::<Result<_, _>>()?,
            limit: query.limit.as_ref().map(parse_limit).transpose()?,
        })
    }

    /// Operator tree, outermost first
    fn render(&self, scanned_rows: usize) -> String {
        let projections = self
            .projections
            .iter()
            .map(Projection::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        let mut lines = vec![format!("PROJECTION [{}]", projections)];
        if let Some(limit) = self.limit {
            lines.push(format!("LIMIT {}", limit));
        }
        lines.push(format!("SEQ_SCAN {} ({} rows)", self.table, scanned_rows));

        lines
            .iter()
            .enumerate()
            .map(|(depth, line)| format!("{}{}", "  ".repeat(depth), line))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn project(&self, source: &Table) -> Result<Table, DatabaseError> {
        let mut columns = Vec::new();
        for projection in &self.projections {
            match projection {
                Projection::Wildcard => {
                    for name in source.column_names() {
                        if let Some(col) = source.column(name) {
                            columns.push((name.clone(), col.clone()));
                        }
                    }
                }
                Projection::Column { name, alias } => {
                    let col = source.column(name).ok_or_else(|| {
                        DatabaseError::new(format!(
                            "Binder Error: Referenced column {} not found in FROM clause!",
                            name
                        ))
                    })?;
                    columns.push((alias.clone(), col.clone()));
                }
            }
        }
        Table::from_columns(columns).map_err(|e| DatabaseError::new(e.to_string()))
    }
}

fn table_name(from: &[TableWithJoins]) -> Result<String, DatabaseError> {
    match from {
        [] => Err(DatabaseError::new(
            "Parser Error: syntax error, SELECT without FROM",
        )),
        [table] if table.joins.is_empty() => match &table.relation {
            TableFactor::Table { name, .. } => Ok(idents_to_string(&name.0)),
            _ => Err(not_implemented("derived tables")),
        },
        _ => Err(not_implemented("joins")),
    }
}

fn idents_to_string(idents: &[Ident]) -> String {
    idents.iter().map(|i| i.value.clone()).collect::<Vec<_>>().join(".")
}

fn projection(item: &SelectItem) -> Result<Projection, DatabaseError> {
    let column = |expr: &Expr| match expr {
        Expr::Identifier(ident) => Ok(ident.value.clone()),
        Expr::CompoundIdentifier(idents) => Ok(idents
            .last()
            .map(|i| i.value.clone())
            .unwrap_or_default()),
        other => Err(not_implemented(&format!("expression {}", other))),
    };

    match item {
        SelectItem::Wildcard(_) => Ok(Projection::Wildcard),
        SelectItem::UnnamedExpr(expr) => {
            let name = column(expr)?;
            Ok(Projection::Column {
                alias: name.clone(),
                name,
            })
        }
        SelectItem::ExprWithAlias { expr, alias } => Ok(Projection::Column {
            name: column(expr)?,
            alias: alias.value.clone(),
        }),
        _ => Err(not_implemented("qualified wildcards")),
    }
}

fn parse_limit(expr: &Expr) -> Result<usize, DatabaseError> {
    match expr {
        Expr::Value(SqlValue::Number(n, _)) => n
            .parse()
            .map_err(|_| DatabaseError::new(format!("Binder Error: invalid LIMIT {}", n))),
        other => Err(not_implemented(&format!("LIMIT {}", other))),
    }
}
