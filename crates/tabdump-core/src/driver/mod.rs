use crate::{Cell, ColumnInfo, DataSourceOptions};

pub use mysql::MySQLDriver;
pub use postgres::PostgresDriver;
pub use sqlite::SQLiteDriver;

mod mysql;
mod postgres;
mod sqlite;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Paging {
    page: usize,
    size: usize,
}

impl Paging {
    pub fn new(
        page: usize,
        size: usize,
    ) -> Self {
        Self { page, size }
    }

    pub fn limit(&self) -> usize {
        self.size
    }

    pub fn offset(&self) -> usize {
        self.page * self.size
    }
}

#[derive(Clone, Debug)]
pub struct OrderCond {
    pub field: String,
    pub ascending: bool,
}

#[derive(Clone, Debug)]
pub enum QueryReq {
    Count {
        table: String,
        filter: Option<String>,
    },
    Builder {
        table: String,
        columns: Vec<String>,
        paging: Option<Paging>,
        orders: Vec<OrderCond>,
        filter: Option<String>,
    },
}

/// 查询结果，行内单元格顺序与请求的列一致
#[derive(Clone, Debug, Default)]
pub struct QueryResp {
    pub rows: Vec<Vec<Cell>>,
}

impl QueryResp {
    /// 取第一行第一列，常用于 COUNT 等标量查询
    pub fn scalar(&self) -> Option<&Cell> {
        self.rows.first().and_then(|row| row.first())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("{0}")]
    Other(String),
    #[error("配置字段缺失: {0}")]
    MissingField(String),
    #[error("配置字段非法: {0}")]
    InvalidField(String),
}

pub trait DatabaseDriver {
    type Config;

    fn check_connection(
        &self,
        config: &Self::Config,
    ) -> Result<(), DriverError>;

    fn create_connection(
        &self,
        config: &Self::Config,
    ) -> Result<Box<dyn DatabaseSession>, DriverError>;
}

pub trait DatabaseSession: Send {
    fn query(
        &mut self,
        req: QueryReq,
    ) -> Result<QueryResp, DriverError>;

    /// 按列序号返回表的列信息
    fn columns(
        &mut self,
        table: &str,
    ) -> Result<Vec<ColumnInfo>, DriverError>;
}

pub fn check_connection(opts: &DataSourceOptions) -> Result<(), DriverError> {
    match opts {
        DataSourceOptions::MySQL(config) => MySQLDriver.check_connection(config),
        DataSourceOptions::SQLite(config) => SQLiteDriver.check_connection(config),
        DataSourceOptions::Postgres(config) => PostgresDriver.check_connection(config),
    }
}

pub fn create_connection(opts: &DataSourceOptions) -> Result<Box<dyn DatabaseSession>, DriverError> {
    match opts {
        DataSourceOptions::MySQL(config) => MySQLDriver.create_connection(config),
        DataSourceOptions::SQLite(config) => SQLiteDriver.create_connection(config),
        DataSourceOptions::Postgres(config) => PostgresDriver.create_connection(config),
    }
}

/// 双引号包裹标识符（PostgreSQL / SQLite），内部双引号加倍
pub(crate) fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// 反引号包裹标识符（MySQL），内部反引号加倍
pub(crate) fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// 二进制内容统一输出为小写十六进制
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// 表名按 `.` 拆分后逐段包裹，支持 `schema.table`
pub(crate) fn quote_table(
    table: &str,
    quote: fn(&str) -> String,
) -> String {
    table.split('.').map(quote).collect::<Vec<_>>().join(".")
}

/// 拆分 `schema.table`，未指定 schema 时返回 None
pub(crate) fn split_table(table: &str) -> (Option<&str>, &str) {
    match table.rsplit_once('.') {
        Some((schema, name)) => (Some(schema), name),
        None => (None, table),
    }
}

pub(crate) fn count_sql(
    table: &str,
    filter: Option<&str>,
    quote: fn(&str) -> String,
) -> String {
    let mut sql = format!("SELECT COUNT(*) FROM {}", quote_table(table, quote));
    push_filter(&mut sql, filter);
    sql
}

pub(crate) fn select_sql(
    table: &str,
    columns: &[String],
    paging: Option<Paging>,
    orders: &[OrderCond],
    filter: Option<&str>,
    quote: fn(&str) -> String,
) -> String {
    let cols = if columns.is_empty() {
        "*".to_string()
    } else {
        columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
    };
    let mut sql = format!("SELECT {} FROM {}", cols, quote_table(table, quote));
    push_filter(&mut sql, filter);

    if !orders.is_empty() {
        let order_clauses: Vec<_> = orders
            .iter()
            .map(|ord| format!("{} {}", quote(&ord.field), if ord.ascending { "ASC" } else { "DESC" }))
            .collect();
        sql.push_str(&format!(" ORDER BY {}", order_clauses.join(", ")));
    }

    // 分页子句
    if let Some(page) = paging {
        sql.push_str(&format!(" LIMIT {} OFFSET {}", page.limit(), page.offset()));
    }
    sql
}

fn push_filter(
    sql: &mut String,
    filter: Option<&str>,
) {
    if let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) {
        sql.push_str(&format!(" WHERE {}", filter));
    }
}
