//! SQL text to the internal AST (spec §4.1-§4.5). Two front ends feed
//! [`Statement`]: a handful of meta statements (`CREATE`/`DROP`/`USE
//! DATABASE`, `SHOW DATABASES`/`TABLES`, `DESC`, `CREATE`/`DROP INDEX`) are
//! not standard SQL and are tokenized by hand; everything else (`CREATE
//! TABLE`, `INSERT`, `SELECT`, `UPDATE`, `DELETE`) is delegated to
//! `sqlparser`'s generic dialect and lowered from its AST.

mod ast;
#[cfg(test)]
mod tests;

pub use ast::*;

use common::{DbError, DbResult};
use expr::{CompareOp, Expr};
use sqlparser::ast as sqlast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;

fn parse_err(message: impl Into<String>) -> DbError {
    DbError::ParseFailed {
        message: message.into(),
    }
}

/// Parse a buffer of `;`-separated statements into the internal AST.
pub fn parse_sql(sql: &str) -> DbResult<Vec<Statement>> {
    split_statements(sql)
        .iter()
        .map(|stmt| parse_one(stmt))
        .collect()
}

/// Split on top-level `;`, skipping ones inside a `'...'` string literal.
/// Doubled quotes (`it''s`) still balance correctly under plain toggling
/// since each half of the pair flips the in-string flag once.
fn split_statements(sql: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    for c in sql.chars() {
        if c == '\'' {
            in_string = !in_string;
        }
        if c == ';' && !in_string {
            out.push(current.clone());
            current.clear();
            continue;
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn tokenize(stmt: &str) -> Vec<String> {
    let mut spaced = String::with_capacity(stmt.len());
    for c in stmt.chars() {
        match c {
            '(' | ')' | ',' => {
                spaced.push(' ');
                spaced.push(c);
                spaced.push(' ');
            }
            _ => spaced.push(c),
        }
    }
    spaced.split_whitespace().map(str::to_string).collect()
}

fn parse_one(stmt: &str) -> DbResult<Statement> {
    let tokens = tokenize(stmt);
    let first = tokens.first().map(|t| t.to_uppercase());
    let second = tokens.get(1).map(|t| t.to_uppercase());

    match (first.as_deref(), second.as_deref()) {
        (Some("CREATE"), Some("DATABASE")) => Ok(Statement::CreateDatabase {
            name: name_token(&tokens, 2, "CREATE DATABASE requires a name")?,
        }),
        (Some("DROP"), Some("DATABASE")) => Ok(Statement::DropDatabase {
            name: name_token(&tokens, 2, "DROP DATABASE requires a name")?,
        }),
        (Some("USE"), Some("DATABASE")) => Ok(Statement::UseDatabase {
            name: name_token(&tokens, 2, "USE DATABASE requires a name")?,
        }),
        (Some("USE"), _) => Ok(Statement::UseDatabase {
            name: name_token(&tokens, 1, "USE requires a database name")?,
        }),
        (Some("SHOW"), Some("DATABASES")) => Ok(Statement::ShowDatabases),
        (Some("SHOW"), Some("TABLES")) => Ok(Statement::ShowTables),
        (Some("DESC"), Some("TABLE")) | (Some("DESCRIBE"), Some("TABLE")) => {
            Ok(Statement::DescTable {
                name: name_token(&tokens, 2, "DESC TABLE requires a table name")?,
            })
        }
        (Some("DESC"), _) | (Some("DESCRIBE"), _) => Ok(Statement::DescTable {
            name: name_token(&tokens, 1, "DESC requires a table name")?,
        }),
        (Some("CREATE"), Some("INDEX")) => parse_create_index(&tokens),
        (Some("DROP"), Some("INDEX")) => parse_drop_index(&tokens),
        _ => via_sqlparser(stmt),
    }
}

fn name_token(tokens: &[String], idx: usize, missing: &str) -> DbResult<String> {
    tokens
        .get(idx)
        .map(|t| t.to_lowercase())
        .ok_or_else(|| parse_err(missing))
}

/// `CREATE INDEX <name> ON <table> ( <column> )`.
fn parse_create_index(tokens: &[String]) -> DbResult<Statement> {
    let name = name_token(tokens, 2, "CREATE INDEX requires an index name")?;
    if tokens.get(3).map(|t| t.to_uppercase()).as_deref() != Some("ON") {
        return Err(parse_err("CREATE INDEX requires ON <table>"));
    }
    let table = name_token(tokens, 4, "CREATE INDEX requires a table name")?;
    if tokens.get(5).as_deref() != Some("(") || tokens.get(7).as_deref() != Some(")") {
        return Err(parse_err("CREATE INDEX requires ( <column> )"));
    }
    let column = name_token(tokens, 6, "CREATE INDEX requires a column name")?;
    Ok(Statement::CreateIndex { name, table, column })
}

/// `DROP INDEX <name> ON <table>`.
fn parse_drop_index(tokens: &[String]) -> DbResult<Statement> {
    let name = name_token(tokens, 2, "DROP INDEX requires an index name")?;
    if tokens.get(3).map(|t| t.to_uppercase()).as_deref() != Some("ON") {
        return Err(parse_err("DROP INDEX requires ON <table>"));
    }
    let table = name_token(tokens, 4, "DROP INDEX requires a table name")?;
    Ok(Statement::DropIndex { name, table })
}

fn via_sqlparser(stmt: &str) -> DbResult<Statement> {
    let dialect = GenericDialect {};
    let mut stmts =
        SqlParser::parse_sql(&dialect, stmt).map_err(|e| parse_err(format!("{e}")))?;
    if stmts.len() != 1 {
        return Err(parse_err("expected exactly one SQL statement"));
    }
    map_sql_statement(stmts.remove(0))
}

fn map_sql_statement(stmt: sqlast::Statement) -> DbResult<Statement> {
    use sqlast::Statement as S;

    match stmt {
        S::CreateTable {
            name,
            columns,
            constraints,
            ..
        } => map_create_table(name, columns, constraints),
        S::Drop {
            object_type, names, ..
        } if object_type == sqlast::ObjectType::Table => Ok(Statement::DropTable {
            name: first_name(names)?,
        }),
        S::Insert {
            table_name, source, ..
        } => {
            let table = normalize_object_name(&table_name)?;
            let source = source.ok_or_else(|| parse_err("INSERT requires VALUES"))?;
            let rows = extract_rows(*source)?;
            Ok(Statement::Insert { table, rows })
        }
        S::Query(query) => map_select(*query),
        S::Update {
            table,
            assignments,
            selection,
            ..
        } => {
            let table = table_name_from_with_joins(&table)?;
            let assignments = assignments
                .into_iter()
                .map(|assign| {
                    let ident = assign
                        .id
                        .last()
                        .ok_or_else(|| parse_err("invalid assignment target"))?;
                    Ok((normalize_ident(ident), map_expr(assign.value)?))
                })
                .collect::<DbResult<Vec<_>>>()?;
            let selection = selection.map(map_expr).transpose()?.map(promote_literals);
            Ok(Statement::Update {
                table,
                assignments,
                selection,
            })
        }
        S::Delete {
            from, selection, ..
        } => {
            if from.is_empty() {
                return Err(parse_err("DELETE requires a FROM source"));
            }
            if from.len() > 1 {
                return Err(parse_err("DELETE supports a single table only"));
            }
            let table = table_name_from_with_joins(&from[0])?;
            let selection = selection.map(map_expr).transpose()?.map(promote_literals);
            Ok(Statement::Delete { table, selection })
        }
        other => Err(parse_err(format!("unsupported statement: {other}"))),
    }
}

fn map_create_table(
    name: sqlast::ObjectName,
    columns: Vec<sqlast::ColumnDef>,
    constraints: Vec<sqlast::TableConstraint>,
) -> DbResult<Statement> {
    let table = normalize_object_name(&name)?;

    let mut mapped_columns = Vec::with_capacity(columns.len());
    let mut inline_pk = Vec::new();
    let mut checks = Vec::new();
    let mut foreign_keys = Vec::new();

    for col in &columns {
        let col_name = normalize_ident(&col.name);
        let (ty, length) = parse_ty_and_length(&col.data_type);
        let mut not_null = false;

        for opt in &col.options {
            match &opt.option {
                sqlast::ColumnOption::NotNull => not_null = true,
                sqlast::ColumnOption::Unique { is_primary: true, .. } => {
                    inline_pk.push(col_name.clone());
                }
                sqlast::ColumnOption::Check(expr) => {
                    checks.push(promote_literals(map_expr(expr.clone())?));
                }
                sqlast::ColumnOption::ForeignKey {
                    foreign_table,
                    referred_columns,
                    ..
                } => {
                    let ref_field = referred_columns
                        .first()
                        .map(normalize_ident)
                        .ok_or_else(|| parse_err("FOREIGN KEY requires a referenced column"))?;
                    foreign_keys.push(ForeignKeyDef {
                        field: col_name.clone(),
                        ref_table: normalize_object_name(foreign_table)?,
                        ref_field,
                    });
                }
                _ => {}
            }
        }

        mapped_columns.push(ColumnDef {
            name: col_name,
            ty,
            length,
            not_null,
        });
    }

    let mut table_pk: Option<Vec<String>> = None;
    for constraint in &constraints {
        match constraint {
            sqlast::TableConstraint::Unique {
                columns,
                is_primary: true,
                ..
            } => {
                let cols: Vec<String> = columns.iter().map(normalize_ident).collect();
                if cols.is_empty() {
                    return Err(parse_err("PRIMARY KEY must name at least one column"));
                }
                table_pk = Some(cols);
            }
            sqlast::TableConstraint::ForeignKey {
                columns,
                foreign_table,
                referred_columns,
                ..
            } => {
                let field = columns
                    .first()
                    .map(normalize_ident)
                    .ok_or_else(|| parse_err("FOREIGN KEY requires a column"))?;
                let ref_field = referred_columns
                    .first()
                    .map(normalize_ident)
                    .ok_or_else(|| parse_err("FOREIGN KEY requires a referenced column"))?;
                foreign_keys.push(ForeignKeyDef {
                    field,
                    ref_table: normalize_object_name(foreign_table)?,
                    ref_field,
                });
            }
            sqlast::TableConstraint::Check { expr, .. } => {
                checks.push(promote_literals(map_expr((**expr).clone())?));
            }
            _ => {}
        }
    }

    let primary_key = match (table_pk, inline_pk.is_empty()) {
        (Some(_), false) => {
            return Err(parse_err(
                "PRIMARY KEY declared both inline and at table level",
            ))
        }
        (Some(pk), true) => Some(pk),
        (None, false) => Some(inline_pk),
        (None, true) => None,
    };

    Ok(Statement::CreateTable {
        name: table,
        columns: mapped_columns,
        primary_key,
        checks,
        foreign_keys,
    })
}

/// `CHAR(20)` → (`"CHAR"`, `Some(20)`); `INT` → (`"INT"`, `None`).
fn parse_ty_and_length(dt: &sqlast::DataType) -> (String, Option<u64>) {
    let full = dt.to_string().to_uppercase();
    match full.find('(') {
        Some(open) => {
            let base = full[..open].trim().to_string();
            let close = full.rfind(')').unwrap_or(full.len());
            let length = full[open + 1..close]
                .split(',')
                .next()
                .and_then(|s| s.trim().parse::<u64>().ok());
            (base, length)
        }
        None => (full, None),
    }
}

fn map_select(query: sqlast::Query) -> DbResult<Statement> {
    use sqlast::SetExpr;

    let select = match *query.body {
        SetExpr::Select(select) => select,
        SetExpr::Values(_) => return Err(parse_err("standalone VALUES is not a SELECT")),
        _ => return Err(parse_err("set operations (UNION/INTERSECT/...) are not supported")),
    };

    let sqlast::Select {
        projection,
        from,
        selection,
        group_by,
        ..
    } = *select;

    if from.is_empty() {
        return Err(parse_err("SELECT requires a FROM clause"));
    }
    let tables = from
        .iter()
        .map(table_ref_from_with_joins)
        .collect::<DbResult<Vec<_>>>()?;

    let items = projection
        .into_iter()
        .map(map_select_item)
        .collect::<DbResult<Vec<_>>>()?;
    let selection = selection.map(map_expr).transpose()?.map(promote_literals);

    let group_by = match group_by {
        sqlast::GroupByExpr::All(_) => {
            return Err(parse_err("GROUP BY ALL is not supported"))
        }
        sqlast::GroupByExpr::Expressions(exprs, _) => match exprs.len() {
            0 => None,
            1 => Some(column_name_of(&exprs[0])?),
            _ => return Err(parse_err("GROUP BY supports a single column only")),
        },
    };

    let order_by = match query.order_by.len() {
        0 => None,
        1 => Some(map_order_by_expr(&query.order_by[0])?),
        _ => return Err(parse_err("ORDER BY supports a single column only")),
    };

    Ok(Statement::Select {
        items,
        tables,
        selection,
        group_by,
        order_by,
    })
}

fn column_name_of(expr: &sqlast::Expr) -> DbResult<String> {
    match expr {
        sqlast::Expr::Identifier(ident) => Ok(normalize_ident(ident)),
        sqlast::Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(normalize_ident)
            .ok_or_else(|| parse_err("invalid column reference")),
        _ => Err(parse_err("GROUP BY/ORDER BY support column names only")),
    }
}

fn map_order_by_expr(expr: &sqlast::OrderByExpr) -> DbResult<OrderByExpr> {
    let column = column_name_of(&expr.expr)?;
    let direction = match expr.asc {
        Some(false) => SortDirection::Desc,
        _ => SortDirection::Asc,
    };
    Ok(OrderByExpr { column, direction })
}

fn extract_rows(query: sqlast::Query) -> DbResult<Vec<Vec<Expr>>> {
    match *query.body {
        sqlast::SetExpr::Values(values) => values
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(map_expr).collect())
            .collect(),
        _ => Err(parse_err("INSERT requires a VALUES list")),
    }
}

fn map_select_item(item: sqlast::SelectItem) -> DbResult<SelectItem> {
    match item {
        sqlast::SelectItem::Wildcard(options) => {
            ensure_plain_wildcard(&options)?;
            Ok(SelectItem::Wildcard)
        }
        sqlast::SelectItem::QualifiedWildcard(_, _) => {
            Err(parse_err("qualified wildcard (t.*) is not supported"))
        }
        sqlast::SelectItem::UnnamedExpr(expr) => map_select_expr(expr),
        sqlast::SelectItem::ExprWithAlias { .. } => {
            Err(parse_err("column aliases are not supported"))
        }
    }
}

fn map_select_expr(expr: sqlast::Expr) -> DbResult<SelectItem> {
    match expr {
        sqlast::Expr::Identifier(ident) => Ok(SelectItem::Column {
            table: None,
            name: normalize_ident(&ident),
        }),
        sqlast::Expr::CompoundIdentifier(parts) => {
            let (table, name) = split_qualified(parts)?;
            Ok(SelectItem::Column { table, name })
        }
        sqlast::Expr::Function(func) => map_aggregate(func),
        other => Err(parse_err(format!("unsupported select item: {other}"))),
    }
}

fn map_aggregate(func: sqlast::Function) -> DbResult<SelectItem> {
    let name = func
        .name
        .0
        .first()
        .map(|i| i.value.clone())
        .ok_or_else(|| parse_err("invalid function name"))?;
    let func_kind = AggregateFnName::from_name(&name)
        .ok_or_else(|| parse_err(format!("unsupported function: {name}")))?;

    let arg = function_single_arg(&func)?;
    match arg {
        None if func_kind == AggregateFnName::Count => Ok(SelectItem::Aggregate {
            func: func_kind,
            table: None,
            column: "*".to_string(),
        }),
        None => Err(parse_err(format!("{name} requires a column argument"))),
        Some(sqlast::Expr::Identifier(ident)) => Ok(SelectItem::Aggregate {
            func: func_kind,
            table: None,
            column: normalize_ident(&ident),
        }),
        Some(sqlast::Expr::CompoundIdentifier(parts)) => {
            let (table, column) = split_qualified(parts)?;
            Ok(SelectItem::Aggregate {
                func: func_kind,
                table,
                column,
            })
        }
        Some(other) => Err(parse_err(format!("unsupported aggregate argument: {other}"))),
    }
}

/// Extract a single, unnamed, non-wildcard-star argument. `COUNT(*)` is
/// returned as `None` (`*` carries no column).
fn function_single_arg(func: &sqlast::Function) -> DbResult<Option<sqlast::Expr>> {
    let args = match &func.args {
        sqlast::FunctionArguments::List(list) => &list.args,
        sqlast::FunctionArguments::None => return Ok(None),
        sqlast::FunctionArguments::Subquery(_) => {
            return Err(parse_err("subquery arguments are not supported"))
        }
    };
    if args.len() > 1 {
        return Err(parse_err("aggregate functions take exactly one argument"));
    }
    match args.first() {
        None => Ok(None),
        Some(sqlast::FunctionArg::Unnamed(sqlast::FunctionArgExpr::Wildcard)) => Ok(None),
        Some(sqlast::FunctionArg::Unnamed(sqlast::FunctionArgExpr::Expr(e))) => Ok(Some(e.clone())),
        Some(_) => Err(parse_err("unsupported aggregate argument form")),
    }
}

fn split_qualified(parts: Vec<sqlast::Ident>) -> DbResult<(Option<String>, String)> {
    match parts.len() {
        1 => Ok((None, normalize_ident(&parts[0]))),
        2 => Ok((
            Some(normalize_ident(&parts[0])),
            normalize_ident(&parts[1]),
        )),
        _ => Err(parse_err("column references support at most table.column")),
    }
}

fn map_expr(expr: sqlast::Expr) -> DbResult<Expr> {
    use sqlast::Expr as E;

    match expr {
        E::Identifier(ident) => Ok(Expr::Column {
            table: None,
            name: normalize_ident(&ident),
        }),
        E::CompoundIdentifier(parts) => {
            let (table, name) = split_qualified(parts)?;
            Ok(Expr::Column { table, name })
        }
        E::Value(value) => map_value(value),
        E::Nested(inner) => map_expr(*inner),
        E::IsNull(inner) => Ok(Expr::IsNull {
            expr: Box::new(map_expr(*inner)?),
            negated: false,
        }),
        E::IsNotNull(inner) => Ok(Expr::IsNull {
            expr: Box::new(map_expr(*inner)?),
            negated: true,
        }),
        E::Like {
            negated,
            expr,
            pattern,
            ..
        } => Ok(Expr::Compare {
            left: Box::new(map_expr(*expr)?),
            op: if negated { CompareOp::NotLike } else { CompareOp::Like },
            right: Box::new(map_expr(*pattern)?),
        }),
        E::BinaryOp { left, op, right } => map_binary(*left, op, *right),
        other => Err(parse_err(format!("unsupported expression: {other}"))),
    }
}

fn map_binary(left: sqlast::Expr, op: sqlast::BinaryOperator, right: sqlast::Expr) -> DbResult<Expr> {
    use sqlast::BinaryOperator as B;

    if op == B::And {
        return Ok(Expr::And(Box::new(map_expr(left)?), Box::new(map_expr(right)?)));
    }
    if op == B::Or {
        return Err(parse_err("OR is not supported in WHERE/CHECK clauses"));
    }

    let cmp = match op {
        B::Eq => CompareOp::Eq,
        B::NotEq => CompareOp::Ne,
        B::Lt => CompareOp::Lt,
        B::LtEq => CompareOp::Le,
        B::Gt => CompareOp::Gt,
        B::GtEq => CompareOp::Ge,
        other => return Err(parse_err(format!("unsupported operator: {other}"))),
    };
    Ok(Expr::Compare {
        left: Box::new(map_expr(left)?),
        op: cmp,
        right: Box::new(map_expr(right)?),
    })
}

fn map_value(value: sqlast::Value) -> DbResult<Expr> {
    use sqlast::Value as V;

    match value {
        V::Number(n, _) => Ok(Expr::Literal(n)),
        V::SingleQuotedString(s) => Ok(Expr::Literal(s)),
        V::Boolean(b) => Ok(Expr::Literal(if b { "true".into() } else { "false".into() })),
        V::Null => Ok(Expr::Literal("NULL".into())),
        other => Err(parse_err(format!("unsupported literal: {other}"))),
    }
}

/// Fold a lone `TRUE`/`FALSE` leaf (not operand to a comparison) to
/// [`Expr::BoolLiteral`], which is how [`expr::parse_simple_condition`]
/// recognizes a constant whole condition (spec §4.6).
fn promote_literals(expr: Expr) -> Expr {
    match expr {
        Expr::And(l, r) => Expr::And(Box::new(promote_literals(*l)), Box::new(promote_literals(*r))),
        Expr::Literal(s) if s.eq_ignore_ascii_case("true") => Expr::BoolLiteral(true),
        Expr::Literal(s) if s.eq_ignore_ascii_case("false") => Expr::BoolLiteral(false),
        other => other,
    }
}

fn normalize_ident(ident: &sqlast::Ident) -> String {
    ident.value.to_lowercase()
}

fn normalize_object_name(name: &sqlast::ObjectName) -> DbResult<String> {
    name.0
        .first()
        .map(|ident| ident.value.to_lowercase())
        .ok_or_else(|| parse_err("invalid object name"))
}

fn first_name(mut names: Vec<sqlast::ObjectName>) -> DbResult<String> {
    if names.is_empty() {
        return Err(parse_err("DROP requires a target name"));
    }
    normalize_object_name(&names.remove(0))
}

fn table_name_from_with_joins(table: &sqlast::TableWithJoins) -> DbResult<String> {
    if !table.joins.is_empty() {
        return Err(parse_err("explicit JOIN syntax is not supported; list tables in FROM"));
    }
    match &table.relation {
        sqlast::TableFactor::Table { name, .. } => normalize_object_name(name),
        _ => Err(parse_err("unsupported table reference")),
    }
}

/// Like [`table_name_from_with_joins`] but also carries a `FROM` entry's
/// alias (`FROM t a` / `FROM t AS a`), defaulting the alias to the real
/// table name when none is given so self-joins (`FROM t a, t b`) can open
/// the same table twice under distinct aliases.
fn table_ref_from_with_joins(table: &sqlast::TableWithJoins) -> DbResult<TableRef> {
    if !table.joins.is_empty() {
        return Err(parse_err("explicit JOIN syntax is not supported; list tables in FROM"));
    }
    match &table.relation {
        sqlast::TableFactor::Table { name, alias, .. } => {
            let name = normalize_object_name(name)?;
            let alias = alias
                .as_ref()
                .map(|a| normalize_ident(&a.name))
                .unwrap_or_else(|| name.clone());
            Ok(TableRef { name, alias })
        }
        _ => Err(parse_err("unsupported table reference")),
    }
}

fn ensure_plain_wildcard(options: &sqlast::WildcardAdditionalOptions) -> DbResult<()> {
    let has_options = options.opt_exclude.is_some()
        || options.opt_except.is_some()
        || options.opt_rename.is_some()
        || options.opt_replace.is_some();
    if has_options {
        Err(parse_err("wildcard options (EXCLUDE/EXCEPT/...) are not supported"))
    } else {
        Ok(())
    }
}
