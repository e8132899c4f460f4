use std::path::Path;

use rusqlite::{Connection, OpenFlags, types::ValueRef};

use crate::{Cell, ColumnInfo, SQLiteOptions};

use super::{
    DatabaseDriver, DatabaseSession, DriverError, QueryReq, QueryResp, count_sql, hex, quote_double, quote_table,
    select_sql, split_table,
};

#[derive(Debug, Clone, Copy)]
pub struct SQLiteDriver;

struct SQLiteConnection {
    conn: Connection,
}

impl SQLiteConnection {
    fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

impl DatabaseSession for SQLiteConnection {
    fn query(
        &mut self,
        req: QueryReq,
    ) -> Result<QueryResp, DriverError> {
        let sql = match req {
            QueryReq::Count { table, filter } => count_sql(&table, filter.as_deref(), quote_double),
            QueryReq::Builder {
                table,
                columns,
                paging,
                orders,
                filter,
            } => select_sql(&table, &columns, paging, &orders, filter.as_deref(), quote_double),
        };
        tracing::debug!(sql = %sql);

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|err| DriverError::Other(format!("准备查询失败: {}", err)))?;
        let columns = stmt.column_names().iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let mut rows = stmt
            .query([])
            .map_err(|err| DriverError::Other(format!("执行查询失败: {}", err)))?;

        let mut records = vec![];
        while let Some(row) = rows
            .next()
            .map_err(|err| DriverError::Other(format!("读取结果失败: {}", err)))?
        {
            let mut record = Vec::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                let value = row
                    .get_ref(idx)
                    .map_err(|err| DriverError::Other(format!("读取列 {name} 失败: {}", err)))?;
                record.push(parse_value(value));
            }
            records.push(record);
        }

        Ok(QueryResp { rows: records })
    }

    fn columns(
        &mut self,
        table: &str,
    ) -> Result<Vec<ColumnInfo>, DriverError> {
        // PRAGMA 只接受 schema.pragma(table) 形式
        let sql = match split_table(table) {
            (Some(schema), name) => format!("PRAGMA {}.table_info({})", quote_double(schema), quote_double(name)),
            (None, name) => format!("PRAGMA table_info({})", quote_table(name, quote_double)),
        };
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|err| DriverError::Other(format!("查询列信息失败: {}", err)))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i32>(3)?,
                ))
            })
            .map_err(|err| DriverError::Other(format!("查询列信息失败: {}", err)))?;

        let mut columns = vec![];
        for row in rows {
            let (name, data_type, notnull) =
                row.map_err(|err| DriverError::Other(format!("读取列信息失败: {}", err)))?;

            columns.push(ColumnInfo {
                name,
                kind: data_type,
                nullable: notnull == 0,
            });
        }
        Ok(columns)
    }
}

impl DatabaseDriver for SQLiteDriver {
    type Config = SQLiteOptions;

    fn check_connection(
        &self,
        config: &Self::Config,
    ) -> Result<(), DriverError> {
        let conn = open_conn(config)?;
        conn.query_row("SELECT 1", [], |_| Ok::<_, rusqlite::Error>(()))
            .map_err(|err| DriverError::Other(format!("校验查询失败: {}", err)))?;
        Ok(())
    }

    fn create_connection(
        &self,
        config: &Self::Config,
    ) -> Result<Box<dyn DatabaseSession>, DriverError> {
        let conn = open_conn(config)?;
        Ok(Box::new(SQLiteConnection::new(conn)))
    }
}

fn open_conn(config: &SQLiteOptions) -> Result<Connection, DriverError> {
    let path_str = config.filepath.trim();
    if path_str.is_empty() {
        return Err(DriverError::MissingField("file_path".into()));
    }

    let path = Path::new(path_str);
    if !path.exists() {
        return Err(DriverError::InvalidField(format!("file_path 不存在: {}", path_str)));
    }

    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|err| DriverError::Other(format!("打开 SQLite 失败: {}", err)))
}

fn parse_value(value: ValueRef<'_>) -> Cell {
    match value {
        ValueRef::Null => Cell::Null,
        ValueRef::Integer(int) => Cell::Text(int.to_string()),
        ValueRef::Real(real) => Cell::Text(real.to_string()),
        ValueRef::Text(text) => Cell::Text(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Cell::Text(hex(blob)),
    }
}
