use expr::Expr;

/// One parsed statement. Field constraints (`PRIMARY KEY`, `CHECK`,
/// `FOREIGN KEY`) are carried unbound — it's the planner/executor's job to
/// resolve them against declared columns and other tables.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    CreateDatabase {
        name: String,
    },
    DropDatabase {
        name: String,
    },
    UseDatabase {
        name: String,
    },
    ShowDatabases,
    ShowTables,
    CreateTable {
        name: String,
        columns: Vec<ColumnDef>,
        primary_key: Option<Vec<String>>,
        checks: Vec<Expr>,
        foreign_keys: Vec<ForeignKeyDef>,
    },
    DropTable {
        name: String,
    },
    DescTable {
        name: String,
    },
    CreateIndex {
        name: String,
        table: String,
        column: String,
    },
    DropIndex {
        name: String,
        table: String,
    },
    Insert {
        table: String,
        rows: Vec<Vec<Expr>>,
    },
    Select {
        items: Vec<SelectItem>,
        tables: Vec<TableRef>,
        selection: Option<Expr>,
        group_by: Option<String>,
        order_by: Option<OrderByExpr>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Expr)>,
        selection: Option<Expr>,
    },
    Delete {
        table: String,
        selection: Option<Expr>,
    },
}

/// A declared column: name, scalar type name (matched against
/// `types::SqlType::name()`, case-insensitively), an optional explicit
/// length (required for `CHAR`/`UCHAR`), and whether `NOT NULL` was given.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: String,
    pub length: Option<u64>,
    pub not_null: bool,
}

/// A `FROM` entry: the real on-disk table plus the name conditions/
/// projections qualify it by. `alias` equals `name` when no `AS` was given,
/// so `FROM t a, t b` opens `t` twice under the distinct aliases `a`/`b`.
#[derive(Clone, Debug, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: String,
}

/// `FOREIGN KEY (field) REFERENCES ref_table(ref_field)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ForeignKeyDef {
    pub field: String,
    pub ref_table: String,
    pub ref_field: String,
}

/// One projected item in a `SELECT` list.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Column {
        table: Option<String>,
        name: String,
    },
    Aggregate {
        func: AggregateFnName,
        table: Option<String>,
        column: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFnName {
    Sum,
    Avg,
    Max,
    Min,
    Count,
}

impl AggregateFnName {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_uppercase().as_str() {
            "SUM" => AggregateFnName::Sum,
            "AVG" => AggregateFnName::Avg,
            "MAX" => AggregateFnName::Max,
            "MIN" => AggregateFnName::Min,
            "COUNT" => AggregateFnName::Count,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderByExpr {
    pub column: String,
    pub direction: SortDirection,
}
