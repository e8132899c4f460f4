use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tabdump_core::{Cell, DatabaseSession, DriverError, OrderCond, Paging, QueryReq};

use crate::config::TableConfig;
use crate::error::{Error, Result};
use crate::progress::ProgressSink;

/// 单表导出结果
#[derive(Clone, Debug, PartialEq)]
pub struct ExportSummary {
    pub table: String,
    pub rows: u64,
    pub chunks: usize,
    pub output_dir: PathBuf,
}

/// 块文件路径：`<output_dir>/<table>_chunk_<n>.csv`，n 从 1 开始
pub fn chunk_path(
    output_dir: &Path,
    table: &str,
    chunk: usize,
) -> PathBuf {
    output_dir.join(format!("{}_chunk_{}.csv", table, chunk))
}

/// 按 OFFSET/LIMIT 分页，将一张表导出为若干 CSV 块文件
pub struct Exporter<'a> {
    session: &'a mut dyn DatabaseSession,
    chunk_size: usize,
    abort: Option<&'a AtomicBool>,
}

impl<'a> Exporter<'a> {
    pub fn new(
        session: &'a mut dyn DatabaseSession,
        chunk_size: usize,
    ) -> Self {
        Self {
            session,
            chunk_size,
            abort: None,
        }
    }

    /// 每页查询前检查中止标志，标志置位后不再写入新的块文件
    pub fn with_abort(
        mut self,
        abort: &'a AtomicBool,
    ) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn export(
        &mut self,
        table: &TableConfig,
        output_dir: &Path,
        progress: &mut dyn ProgressSink,
    ) -> Result<ExportSummary> {
        tracing::info!("开始导出表: {}", table.name);
        tracing::debug!(
            "导出配置: table={}, columns={:?}, filter={:?}, order_by={:?}, chunk_size={}, output_dir={}",
            table.name,
            table.columns,
            table.filter,
            table.order_by,
            self.chunk_size,
            output_dir.display()
        );

        // 1. 确定导出列
        let columns = self.resolve_columns(table)?;
        tracing::info!("表 {} 共 {} 列", table.name, columns.len());

        // 2. 统计总行数，仅在开始时查询一次
        let total = self.count_rows(table)?;
        tracing::info!("表 {} 总行数: {}", table.name, total);
        progress.start(total);

        let mut summary = ExportSummary {
            table: table.name.clone(),
            rows: 0,
            chunks: 0,
            output_dir: output_dir.to_path_buf(),
        };

        if total == 0 {
            tracing::warn!("表 {} 为空，跳过导出", table.name);
            progress.finish();
            return Ok(summary);
        }

        if table.order_by.is_empty() {
            tracing::warn!("表 {} 未配置 order_by，分页顺序由数据库决定", table.name);
        }
        let orders: Vec<OrderCond> = table
            .order_by
            .iter()
            .map(|field| OrderCond {
                field: field.clone(),
                ascending: true,
            })
            .collect();

        fs::create_dir_all(output_dir)?;

        // 3. 分页导出，每页写一个块文件
        let start_time = Instant::now();
        let mut page = 0;
        loop {
            let paging = Paging::new(page, self.chunk_size);
            if paging.offset() as u64 >= total {
                break;
            }
            if self.abort.is_some_and(|abort| abort.load(Ordering::Relaxed)) {
                tracing::warn!("表 {} 在第 {} 页中止导出", table.name, page);
                progress.finish();
                return Err(Error::Aborted(table.name.clone()));
            }

            tracing::debug!("查询第 {} 页数据，offset={}", page, paging.offset());
            let resp = self.session.query(QueryReq::Builder {
                table: table.name.clone(),
                columns: columns.clone(),
                paging: Some(paging),
                orders: orders.clone(),
                filter: table.filter.clone(),
            })?;

            if resp.rows.is_empty() {
                tracing::warn!(
                    "表 {} 第 {} 页无数据（offset={}，总行数={}），数据可能在导出期间被删除",
                    table.name,
                    page,
                    paging.offset(),
                    total
                );
                break;
            }

            let chunk = page + 1;
            let path = chunk_path(output_dir, &table.name, chunk);
            write_chunk(&path, &columns, &resp.rows, progress)?;
            tracing::debug!("写入块文件 {}，{} 行", path.display(), resp.rows.len());

            summary.rows += resp.rows.len() as u64;
            summary.chunks = chunk;
            page += 1;
        }
        progress.finish();

        let elapsed = start_time.elapsed().as_secs_f64();
        tracing::info!(
            "表 {} 导出完成，共 {} 行，{} 个文件，耗时 {:.1} 秒，速度 {:.0} 行/秒",
            table.name,
            summary.rows,
            summary.chunks,
            elapsed,
            summary.rows as f64 / elapsed.max(f64::EPSILON)
        );
        Ok(summary)
    }

    /// 未指定列时从数据库元数据读取全部列
    fn resolve_columns(
        &mut self,
        table: &TableConfig,
    ) -> Result<Vec<String>> {
        if !table.columns.is_empty() {
            return Ok(table.columns.clone());
        }

        tracing::info!("分析表结构: {}", table.name);
        let columns = self.session.columns(&table.name)?;
        if columns.is_empty() {
            return Err(Error::EmptyTable(table.name.clone()));
        }
        for column in &columns {
            tracing::debug!("列 {}: {} (nullable={})", column.name, column.kind, column.nullable);
        }
        Ok(columns.into_iter().map(|c| c.name).collect())
    }

    fn count_rows(
        &mut self,
        table: &TableConfig,
    ) -> Result<u64> {
        let resp = self.session.query(QueryReq::Count {
            table: table.name.clone(),
            filter: table.filter.clone(),
        })?;

        match resp.scalar() {
            Some(Cell::Text(total)) => total
                .trim()
                .parse()
                .map_err(|_| DriverError::Other(format!("无法解析行数: {}", total)).into()),
            _ => Err(DriverError::Other(format!("表 {} 的行数查询没有返回结果", table.name)).into()),
        }
    }
}

/// 写入一个块文件，首行为表头，NULL 写为空字段
fn write_chunk(
    path: &Path,
    headers: &[String],
    rows: &[Vec<Cell>],
    progress: &mut dyn ProgressSink,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row.iter().map(Cell::as_field))?;
        progress.inc(1);
    }
    writer.flush()?;
    Ok(())
}
