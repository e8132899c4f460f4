use std::io;

use tabdump_core::DriverError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO 错误: {0}")]
    Io(#[from] io::Error),

    #[error("配置文件格式错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV 写入失败: {0}")]
    Csv(#[from] csv::Error),

    #[error("数据库错误: {0}")]
    Driver(#[from] DriverError),

    #[error("线程池创建失败: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("表 {0} 不存在或没有列")]
    EmptyTable(String),

    #[error("表 {0} 的导出因其他表失败而中止")]
    Aborted(String),
}

pub type Result<T> = std::result::Result<T, Error>;
