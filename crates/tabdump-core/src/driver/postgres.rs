use postgres::{Client, Config, Error as PostgresError, NoTls, SimpleQueryMessage};

use crate::{Cell, ColumnInfo, PostgresOptions};

use super::{
    DatabaseDriver, DatabaseSession, DriverError, QueryReq, QueryResp, count_sql, quote_double, select_sql,
    split_table,
};

#[derive(Debug, Clone, Copy)]
pub struct PostgresDriver;

impl DatabaseDriver for PostgresDriver {
    type Config = PostgresOptions;

    fn check_connection(
        &self,
        config: &Self::Config,
    ) -> Result<(), DriverError> {
        let mut client = open_conn(config)?;
        client
            .simple_query("SELECT 1")
            .map_err(|err| DriverError::Other(format!("校验查询失败: {}", err)))?;
        Ok(())
    }

    fn create_connection(
        &self,
        config: &Self::Config,
    ) -> Result<Box<dyn DatabaseSession>, DriverError> {
        let client = open_conn(config)?;
        Ok(Box::new(PostgresSession::new(client)))
    }
}

struct PostgresSession {
    client: Client,
}

impl PostgresSession {
    fn new(client: Client) -> Self {
        Self { client }
    }

    /// 文本协议查询：服务端按各类型的标准文本格式输出，NUMERIC、时间、数组等类型无需逐一解码
    fn query_text(
        &mut self,
        sql: &str,
    ) -> Result<QueryResp, DriverError> {
        let messages = self
            .client
            .simple_query(sql)
            .map_err(|err| DriverError::Other(format!("执行查询失败: {}", err)))?;

        let mut resp = QueryResp::default();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let mut record = Vec::with_capacity(row.len());
                for idx in 0..row.len() {
                    let value = row
                        .try_get(idx)
                        .map_err(|err| DriverError::Other(format!("读取结果失败: {}", err)))?;
                    record.push(Cell::from(value));
                }
                resp.rows.push(record);
            }
        }
        Ok(resp)
    }
}

impl DatabaseSession for PostgresSession {
    fn query(
        &mut self,
        req: QueryReq,
    ) -> Result<QueryResp, DriverError> {
        match req {
            QueryReq::Count { table, filter } => {
                let sql = count_sql(&table, filter.as_deref(), quote_double);
                tracing::debug!(sql = %sql);
                self.query_text(&sql)
            }
            QueryReq::Builder {
                table,
                columns,
                paging,
                orders,
                filter,
            } => {
                // PostgreSQL 建议使用 OFFSET 时必须有 ORDER BY
                if paging.is_some() && orders.is_empty() {
                    tracing::debug!("PostgreSQL: 使用 OFFSET 但没有 ORDER BY，结果顺序可能不确定");
                }
                let sql = select_sql(&table, &columns, paging, &orders, filter.as_deref(), quote_double);
                tracing::debug!(sql = %sql);
                self.query_text(&sql)
            }
        }
    }

    fn columns(
        &mut self,
        table: &str,
    ) -> Result<Vec<ColumnInfo>, DriverError> {
        let sql = "SELECT
            c.column_name::text,
            c.data_type::text,
            c.is_nullable::text
        FROM information_schema.columns c
        WHERE c.table_schema = COALESCE($1::text, current_schema())
            AND c.table_name = $2::text
        ORDER BY c.ordinal_position";

        let (schema, name) = split_table(table);
        let rows = self
            .client
            .query(sql, &[&schema, &name])
            .map_err(|err| DriverError::Other(format!("查询列信息失败: {}", err)))?;

        let mut columns = vec![];
        for row in rows {
            let name: String = row.try_get(0).map_err(map_pg_err)?;
            let data_type: String = row.try_get(1).map_err(map_pg_err)?;
            let is_nullable: String = row.try_get(2).map_err(map_pg_err)?;

            columns.push(ColumnInfo {
                name,
                kind: data_type,
                nullable: is_nullable.eq_ignore_ascii_case("YES"),
            });
        }
        Ok(columns)
    }
}

fn open_conn(config: &PostgresOptions) -> Result<Client, DriverError> {
    if config.host.trim().is_empty() {
        return Err(DriverError::MissingField("host".into()));
    }
    if config.username.trim().is_empty() {
        return Err(DriverError::MissingField("username".into()));
    }
    if config.database.trim().is_empty() {
        return Err(DriverError::MissingField("database".into()));
    }
    if config.use_tls {
        // 未接入 TLS 连接器
        return Err(DriverError::InvalidField("use_tls".into()));
    }

    let mut pg_config = Config::new();
    pg_config.host(config.host.trim());
    pg_config.port(config.port);
    pg_config.user(config.username.trim());
    if !config.password.is_empty() {
        pg_config.password(config.password.as_str());
    }
    pg_config.dbname(config.database.trim());

    let client = pg_config
        .connect(NoTls)
        .map_err(|err| DriverError::Other(format!("连接失败: {}", err)))?;
    Ok(client)
}

fn map_pg_err(err: PostgresError) -> DriverError {
    DriverError::Other(format!("PostgreSQL 解析字段失败: {}", err))
}
