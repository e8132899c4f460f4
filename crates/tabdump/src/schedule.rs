use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use tabdump_core::{DataSourceOptions, create_connection};

use crate::config::{Config, TableConfig};
use crate::error::{Error, Result};
use crate::export::{ExportSummary, Exporter};
use crate::progress::Reporter;

/// 单表导出任务
#[derive(Clone, Debug)]
pub struct Plan {
    pub table: TableConfig,
    pub output_dir: PathBuf,
}

pub fn plan(config: &Config) -> Vec<Plan> {
    config
        .tables()
        .iter()
        .map(|table| Plan {
            table: table.clone(),
            output_dir: config.output_dir_for(table),
        })
        .collect()
}

/// 执行全部导出任务
///
/// 任一表失败即终止整个运行：顺序模式不再开始后续表；
/// 并发模式每表一个线程，第一个失败置位中止标志，其余表在下一页前停止。
pub fn run(
    opts: &DataSourceOptions,
    plans: &[Plan],
    chunk_size: usize,
    concurrently: bool,
    reporter: &Reporter,
) -> Result<Vec<ExportSummary>> {
    if !concurrently || plans.len() <= 1 {
        let mut summaries = Vec::with_capacity(plans.len());
        for plan in plans {
            let summary = run_one(opts, plan, chunk_size, reporter, None).inspect_err(|err| {
                tracing::error!("表 {} 导出失败: {}", plan.table.name, err);
            })?;
            summaries.push(summary);
        }
        return Ok(summaries);
    }

    tracing::info!("并发导出 {} 个表", plans.len());
    let pool = ThreadPoolBuilder::new()
        .num_threads(plans.len())
        .thread_name(|idx| format!("tabdump-{}", idx))
        .build()?;

    let abort = AtomicBool::new(false);
    let results: Vec<Result<ExportSummary>> = pool.install(|| {
        plans
            .par_iter()
            .map(|plan| {
                if abort.load(Ordering::Relaxed) {
                    return Err(Error::Aborted(plan.table.name.clone()));
                }
                let result = run_one(opts, plan, chunk_size, reporter, Some(&abort));
                match &result {
                    Err(Error::Aborted(_)) | Ok(_) => {}
                    Err(err) => {
                        tracing::error!("表 {} 导出失败: {}", plan.table.name, err);
                        abort.store(true, Ordering::Relaxed);
                    }
                }
                result
            })
            .collect()
    });

    // 返回引发中止的错误，而非被连带中止的表
    let mut summaries = Vec::with_capacity(results.len());
    let mut aborted = None;
    for result in results {
        match result {
            Ok(summary) => summaries.push(summary),
            Err(err @ Error::Aborted(_)) => aborted = aborted.or(Some(err)),
            Err(err) => return Err(err),
        }
    }
    match aborted {
        Some(err) => Err(err),
        None => Ok(summaries),
    }
}

/// 每个任务独立建立连接
fn run_one(
    opts: &DataSourceOptions,
    plan: &Plan,
    chunk_size: usize,
    reporter: &Reporter,
    abort: Option<&AtomicBool>,
) -> Result<ExportSummary> {
    let mut session = create_connection(opts)?;
    let mut bar = reporter.table_bar(&plan.table.name);

    let mut exporter = Exporter::new(session.as_mut(), chunk_size);
    if let Some(abort) = abort {
        exporter = exporter.with_abort(abort);
    }
    let summary = exporter.export(&plan.table, &plan.output_dir, &mut bar)?;

    reporter.println(&format!(
        "Exported {} records from {} to {} directory",
        summary.rows,
        summary.table,
        summary.output_dir.display()
    ));
    Ok(summary)
}
