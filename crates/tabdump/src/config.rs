use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use tabdump_core::{DataSourceKind, DataSourceOptions, MySQLOptions, PostgresOptions, SQLiteOptions};

use crate::error::{Error, Result};

/// 单表导出配置
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub name: String,
    /// 为空时导出全部列
    #[serde(default)]
    pub columns: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub filter: Option<String>,
    #[serde(default)]
    pub order_by: Vec<String>,
}

/// 配置文件（YAML）
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub driver: DataSourceKind,
    #[serde(default)]
    pub db_user: String,
    #[serde(default)]
    pub db_password: String,
    #[serde(default = "default_host")]
    pub db_host: String,
    pub db_port: Option<u16>,
    #[serde(default)]
    pub db_name: String,
    pub db_path: Option<String>,
    #[serde(default)]
    pub db_tls: bool,

    table: Option<TableConfig>,
    tables: Option<Vec<TableConfig>>,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub concurrently: bool,
    pub output_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_chunk_size() -> usize {
    1000
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("无法读取配置文件 {}: {}", path.display(), err)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size 必须大于 0".into()));
        }

        match (&self.table, &self.tables) {
            (Some(_), Some(_)) => return Err(Error::Config("table 与 tables 只能配置其一".into())),
            (None, None) => return Err(Error::Config("缺少 table 或 tables".into())),
            (None, Some(tables)) if tables.is_empty() => return Err(Error::Config("tables 不能为空".into())),
            _ => {}
        }

        let mut targets = HashSet::new();
        for table in self.tables() {
            if table.name.trim().is_empty() {
                return Err(Error::Config("表名不能为空".into()));
            }
            if table.columns.iter().chain(&table.order_by).any(|c| c.trim().is_empty()) {
                return Err(Error::Config(format!("表 {} 存在空列名", table.name)));
            }
            // 同名表写入同一目录会互相覆盖
            if !targets.insert((table.name.as_str(), self.output_dir_for(table))) {
                return Err(Error::Config(format!("表 {} 重复导出到同一目录", table.name)));
            }
        }

        if self.driver == DataSourceKind::SQLite && self.db_path.as_deref().is_none_or(|p| p.trim().is_empty()) {
            return Err(Error::Config("SQLite 需要配置 db_path".into()));
        }

        Ok(())
    }

    /// 待导出的表，`table` 与 `tables` 二选一
    pub fn tables(&self) -> &[TableConfig] {
        match (&self.table, &self.tables) {
            (Some(table), None) => std::slice::from_ref(table),
            (None, Some(tables)) => tables,
            _ => &[],
        }
    }

    /// 表级 output_dir 优先，其次全局 output_dir，最后为当前目录
    pub fn output_dir_for(
        &self,
        table: &TableConfig,
    ) -> PathBuf {
        table
            .output_dir
            .clone()
            .or_else(|| self.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn datasource(&self) -> DataSourceOptions {
        let port = self.db_port.unwrap_or_else(|| self.driver.default_port());
        match self.driver {
            DataSourceKind::Postgres => DataSourceOptions::Postgres(PostgresOptions {
                host: self.db_host.clone(),
                port,
                database: self.db_name.clone(),
                username: self.db_user.clone(),
                password: self.db_password.clone(),
                use_tls: self.db_tls,
            }),
            DataSourceKind::MySQL => DataSourceOptions::MySQL(MySQLOptions {
                host: self.db_host.clone(),
                port,
                username: self.db_user.clone(),
                password: self.db_password.clone(),
                database: self.db_name.clone(),
                use_tls: self.db_tls,
            }),
            DataSourceKind::SQLite => DataSourceOptions::SQLite(SQLiteOptions {
                filepath: self.db_path.clone().unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let config = Config::from_yaml(include_str!("../test_data/config.yaml")).unwrap();

        assert_eq!(config.driver, DataSourceKind::Postgres);
        assert_eq!(config.db_user, "exporter");
        assert_eq!(config.db_port, Some(5433));
        assert_eq!(config.chunk_size, 500);
        assert!(config.concurrently);

        let tables = config.tables();
        assert_eq!(tables.len(), 3);
        assert_eq!(tables[0].name, "users");
        assert_eq!(tables[0].columns, vec!["id", "email", "created_at"]);
        assert_eq!(tables[0].order_by, vec!["id"]);
        assert_eq!(tables[1].filter.as_deref(), Some("status = 'paid'"));
        assert!(tables[2].columns.is_empty());

        assert_eq!(config.output_dir_for(&tables[0]), PathBuf::from("out/users"));
        assert_eq!(config.output_dir_for(&tables[2]), PathBuf::from("out"));

        match config.datasource() {
            DataSourceOptions::Postgres(opts) => {
                assert_eq!(opts.host, "db.internal");
                assert_eq!(opts.port, 5433);
                assert_eq!(opts.database, "shop");
            }
            _ => panic!("expected postgres options"),
        }
    }

    #[test]
    fn test_single_table_and_defaults() {
        let config = Config::from_yaml(
            r#"
            db_user: app
            db_name: shop
            table:
              name: users
            "#,
        )
        .unwrap();

        assert_eq!(config.chunk_size, 1000);
        assert!(!config.concurrently);
        assert_eq!(config.db_host, "127.0.0.1");
        assert_eq!(config.tables().len(), 1);
        assert_eq!(config.output_dir_for(&config.tables()[0]), PathBuf::from("."));

        match config.datasource() {
            DataSourceOptions::Postgres(opts) => assert_eq!(opts.port, 5432),
            _ => panic!("expected postgres options"),
        }
    }

    #[test]
    fn test_mysql_default_port() {
        let config = Config::from_yaml("driver: mysql\ndb_name: shop\ntable: {name: t}\n").unwrap();
        match config.datasource() {
            DataSourceOptions::MySQL(opts) => assert_eq!(opts.port, 3306),
            _ => panic!("expected mysql options"),
        }
    }

    #[test]
    fn test_sqlite_requires_path() {
        let result = Config::from_yaml("driver: sqlite\ntable: {name: t}\n");
        assert!(matches!(result, Err(Error::Config(_))));

        let config = Config::from_yaml("driver: sqlite\ndb_path: data.db\ntable: {name: t}\n").unwrap();
        match config.datasource() {
            DataSourceOptions::SQLite(opts) => assert_eq!(opts.filepath, "data.db"),
            _ => panic!("expected sqlite options"),
        }
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let result = Config::from_yaml("chunk_size: 0\ntable: {name: t}\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_table_and_tables_are_exclusive() {
        let both = Config::from_yaml("table: {name: a}\ntables: [{name: b}]\n");
        assert!(matches!(both, Err(Error::Config(_))));

        let neither = Config::from_yaml("chunk_size: 10\n");
        assert!(matches!(neither, Err(Error::Config(_))));

        let empty = Config::from_yaml("tables: []\n");
        assert!(matches!(empty, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_duplicate_targets() {
        let dup = Config::from_yaml("tables: [{name: a}, {name: a}]\n");
        assert!(matches!(dup, Err(Error::Config(_))));

        let split = Config::from_yaml("tables: [{name: a, output_dir: x}, {name: a, output_dir: y}]\n");
        assert!(split.is_ok());
    }

    #[test]
    fn test_rejects_blank_names() {
        assert!(matches!(Config::from_yaml("table: {name: ' '}\n"), Err(Error::Config(_))));
        assert!(matches!(
            Config::from_yaml("table: {name: t, columns: [id, '']}\n"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_unknown_field() {
        let result = Config::from_yaml("table: {name: t, output: x}\n");
        assert!(matches!(result, Err(Error::Yaml(_))));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(Config::from_yaml("invalid: yaml: [").is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("nonexistent.yaml");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
