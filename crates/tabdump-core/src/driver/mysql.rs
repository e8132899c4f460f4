use mysql::{Column, Conn, Opts, OptsBuilder, SslOpts, Value, consts::ColumnType, prelude::Queryable};

use crate::{Cell, ColumnInfo, MySQLOptions};

use super::{
    DatabaseDriver, DatabaseSession, DriverError, QueryReq, QueryResp, count_sql, hex, quote_backtick, quote_table,
    select_sql,
};

/// binary 字符集编号
const BINARY_CHARSET: u16 = 63;

#[derive(Debug, Clone, Copy)]
pub struct MySQLDriver;

impl DatabaseDriver for MySQLDriver {
    type Config = MySQLOptions;

    fn check_connection(
        &self,
        config: &Self::Config,
    ) -> Result<(), DriverError> {
        let mut conn = open_conn(config)?;
        conn.ping()
            .map_err(|err| DriverError::Other(format!("ping 失败: {}", err)))?;
        Ok(())
    }

    fn create_connection(
        &self,
        config: &Self::Config,
    ) -> Result<Box<dyn DatabaseSession>, DriverError> {
        let conn = open_conn(config)?;
        Ok(Box::new(MySQLSession::new(conn)))
    }
}

struct MySQLSession {
    conn: Conn,
}

impl MySQLSession {
    fn new(conn: Conn) -> Self {
        Self { conn }
    }
}

impl DatabaseSession for MySQLSession {
    fn query(
        &mut self,
        req: QueryReq,
    ) -> Result<QueryResp, DriverError> {
        let sql = match req {
            QueryReq::Count { table, filter } => count_sql(&table, filter.as_deref(), quote_backtick),
            QueryReq::Builder {
                table,
                columns,
                paging,
                orders,
                filter,
            } => select_sql(&table, &columns, paging, &orders, filter.as_deref(), quote_backtick),
        };
        tracing::debug!(sql = %sql);

        let rows: Vec<mysql::Row> = self
            .conn
            .query(&sql)
            .map_err(|err| DriverError::Other(format!("执行查询失败: {}", err)))?;

        if rows.is_empty() {
            return Ok(QueryResp::default());
        }

        let binary: Vec<bool> = rows[0].columns_ref().iter().map(is_binary).collect();
        let mut records = Vec::with_capacity(rows.len());

        for row in rows {
            let raw = row.unwrap();
            records.push(
                raw.into_iter()
                    .zip(&binary)
                    .map(|(value, &binary)| parse_value(value, binary))
                    .collect(),
            );
        }

        Ok(QueryResp { rows: records })
    }

    fn columns(
        &mut self,
        table: &str,
    ) -> Result<Vec<ColumnInfo>, DriverError> {
        let sql = format!("SHOW FULL COLUMNS FROM {}", quote_table(table, quote_backtick));
        let rows: Vec<mysql::Row> = match self.conn.query(&sql) {
            Ok(rows) => rows,
            // 1146: 表不存在，按无列处理
            Err(mysql::Error::MySqlError(err)) if err.code == 1146 => return Ok(vec![]),
            Err(err) => return Err(DriverError::Other(format!("查询列信息失败: {}", err))),
        };

        let mut columns = vec![];
        for row in rows {
            let name: String = row
                .get("Field")
                .ok_or_else(|| DriverError::Other("缺少 Field 字段".into()))?;

            let kind = row.get::<Option<String>, _>("Type").flatten();
            let null = row.get::<Option<String>, _>("Null").flatten();

            columns.push(ColumnInfo {
                name,
                kind: kind.unwrap_or_default(),
                nullable: null.is_some_and(|v| v.eq_ignore_ascii_case("YES")),
            });
        }
        Ok(columns)
    }
}

fn open_conn(config: &MySQLOptions) -> Result<Conn, DriverError> {
    if config.host.trim().is_empty() {
        return Err(DriverError::MissingField("host".into()));
    }
    if config.username.trim().is_empty() {
        return Err(DriverError::MissingField("username".into()));
    }
    if config.database.trim().is_empty() {
        return Err(DriverError::MissingField("database".into()));
    }

    let mut builder = OptsBuilder::new();
    builder = builder.ip_or_hostname(Some(config.host.trim()));
    builder = builder.tcp_port(config.port);
    builder = builder.user(Some(config.username.trim()));
    if !config.password.is_empty() {
        builder = builder.pass(Some(config.password.as_str()));
    }
    builder = builder.db_name(Some(config.database.trim()));

    if config.use_tls {
        builder = builder.ssl_opts(Some(SslOpts::default()));
    }
    let opts = Opts::from(builder);
    Conn::new(opts).map_err(|err| DriverError::Other(format!("连接失败: {}", err)))
}

/// BLOB、BINARY、VARBINARY 等二进制列
fn is_binary(column: &Column) -> bool {
    binary_type(column.column_type(), column.character_set())
}

fn binary_type(
    column_type: ColumnType,
    charset: u16,
) -> bool {
    charset == BINARY_CHARSET
        && matches!(
            column_type,
            ColumnType::MYSQL_TYPE_TINY_BLOB
                | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
                | ColumnType::MYSQL_TYPE_LONG_BLOB
                | ColumnType::MYSQL_TYPE_BLOB
                | ColumnType::MYSQL_TYPE_VAR_STRING
                | ColumnType::MYSQL_TYPE_STRING
                | ColumnType::MYSQL_TYPE_VARCHAR
        )
}

/// 文本协议下大部分值以 Bytes 返回，二进制列输出为十六进制
fn parse_value(
    value: Value,
    binary: bool,
) -> Cell {
    let text = match value {
        Value::NULL => return Cell::Null,
        Value::Bytes(bytes) if binary => hex(&bytes),
        Value::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Value::Int(int) => int.to_string(),
        Value::UInt(uint) => uint.to_string(),
        Value::Float(float) => float.to_string(),
        Value::Double(double) => double.to_string(),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let mut text = format!("{year:04}-{month:02}-{day:02}");
            if (hour, minute, second, micros) != (0, 0, 0, 0) {
                text.push_str(&format!(" {hour:02}:{minute:02}:{second:02}"));
                push_micros(&mut text, micros);
            }
            text
        }
        Value::Time(neg, days, hours, minutes, seconds, micros) => {
            let sign = if neg { "-" } else { "" };
            let mut text = if days > 0 {
                format!("{sign}{days} {hours:02}:{minutes:02}:{seconds:02}")
            } else {
                format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
            };
            push_micros(&mut text, micros);
            text
        }
    };
    Cell::Text(text)
}

fn push_micros(
    text: &mut String,
    micros: u32,
) {
    if micros > 0 {
        text.push_str(&format!(".{micros:06}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(value: Value) -> Cell {
        parse_value(value, false)
    }

    #[test]
    fn binary_columns_render_as_hex() {
        assert_eq!(parse_value(Value::Bytes(vec![0x00, 0xff, 0x10]), true), Cell::text("00ff10"));
        assert_eq!(parse_value(Value::NULL, true), Cell::Null);
        assert_eq!(decode(Value::Bytes(vec![0x61, 0x62])), Cell::text("ab"));
    }

    #[test]
    fn binary_detection_needs_binary_charset() {
        assert!(binary_type(ColumnType::MYSQL_TYPE_BLOB, BINARY_CHARSET));
        assert!(binary_type(ColumnType::MYSQL_TYPE_VAR_STRING, BINARY_CHARSET));
        // TEXT 列同样以 BLOB 类型返回，但字符集不同
        assert!(!binary_type(ColumnType::MYSQL_TYPE_BLOB, 45));
        // 数值列在文本协议下也是 binary 字符集
        assert!(!binary_type(ColumnType::MYSQL_TYPE_LONG, BINARY_CHARSET));
    }

    #[test]
    fn null_and_scalars() {
        assert_eq!(decode(Value::NULL), Cell::Null);
        assert_eq!(decode(Value::Bytes(b"hello".to_vec())), Cell::text("hello"));
        assert_eq!(decode(Value::Bytes(vec![])), Cell::text(""));
        assert_eq!(decode(Value::Int(-7)), Cell::text("-7"));
        assert_eq!(decode(Value::UInt(7)), Cell::text("7"));
        assert_eq!(decode(Value::Double(0.25)), Cell::text("0.25"));
    }

    #[test]
    fn dates_drop_zero_time() {
        assert_eq!(decode(Value::Date(2024, 3, 9, 0, 0, 0, 0)), Cell::text("2024-03-09"));
        assert_eq!(
            decode(Value::Date(2024, 3, 9, 8, 5, 1, 0)),
            Cell::text("2024-03-09 08:05:01")
        );
        assert_eq!(
            decode(Value::Date(2024, 3, 9, 8, 5, 1, 120)),
            Cell::text("2024-03-09 08:05:01.000120")
        );
    }

    #[test]
    fn times_with_sign_and_days() {
        assert_eq!(decode(Value::Time(false, 0, 1, 2, 3, 0)), Cell::text("01:02:03"));
        assert_eq!(
            decode(Value::Time(true, 2, 1, 2, 3, 500000)),
            Cell::text("-2 01:02:03.500000")
        );
    }

    #[test]
    fn missing_fields_fail_before_connecting() {
        let opts = MySQLOptions {
            username: String::new(),
            ..Default::default()
        };
        assert!(matches!(open_conn(&opts), Err(DriverError::MissingField(f)) if f == "username"));
    }
}
