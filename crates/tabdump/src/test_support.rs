use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};

use tabdump_core::{DataSourceOptions, SQLiteOptions};

use crate::config::TableConfig;

/// 建立测试库：每张表 `rows` 行，`note` 列每 7 行一个 NULL
pub fn sqlite_fixture(
    dir: &Path,
    tables: &[(&str, usize)],
) -> DataSourceOptions {
    let path = dir.join("fixture.db");
    let mut conn = Connection::open(&path).unwrap();

    for (name, rows) in tables {
        conn.execute_batch(&format!(
            "CREATE TABLE \"{name}\" (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL, note TEXT);"
        ))
        .unwrap();

        let tx = conn.transaction().unwrap();
        {
            let mut stmt = tx
                .prepare(&format!("INSERT INTO \"{name}\" (id, name, score, note) VALUES (?1, ?2, ?3, ?4)"))
                .unwrap();
            for id in 1..=*rows as i64 {
                let note = if id % 7 == 0 { None } else { Some(format!("note {id}")) };
                stmt.execute(params![id, format!("{name}-{id}"), id as f64 / 2.0, note])
                    .unwrap();
            }
        }
        tx.commit().unwrap();
    }

    DataSourceOptions::SQLite(SQLiteOptions {
        filepath: path.to_string_lossy().into_owned(),
    })
}

pub fn table(name: &str) -> TableConfig {
    TableConfig {
        name: name.to_string(),
        columns: vec![],
        output_dir: None,
        filter: None,
        order_by: vec!["id".to_string()],
    }
}

/// 按编号顺序列出 `<table>_chunk_<n>.csv`
pub fn chunk_files(
    dir: &Path,
    table: &str,
) -> Vec<PathBuf> {
    let mut files = vec![];
    let mut n = 1;
    loop {
        let path = dir.join(format!("{table}_chunk_{n}.csv"));
        if !path.exists() {
            break;
        }
        files.push(path);
        n += 1;
    }
    files
}

/// 读取 CSV 文件，返回表头与数据行
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader.headers().unwrap().iter().map(String::from).collect();
    let rows = reader
        .records()
        .map(|record| record.unwrap().iter().map(String::from).collect())
        .collect();
    (headers, rows)
}
