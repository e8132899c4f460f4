use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str = "{prefix} {pos} / {len} {bar:40.cyan/blue} {percent}%";

/// 导出进度接收方，每个表任务独占一个
pub trait ProgressSink: Send {
    /// 总行数确定后调用一次
    fn start(
        &mut self,
        total: u64,
    );

    fn inc(
        &mut self,
        delta: u64,
    );

    fn finish(&mut self);
}

/// 终端多进度条，各表各占一行
#[derive(Clone)]
pub struct Reporter {
    multi: MultiProgress,
}

impl Reporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
        }
    }

    /// 不绘制任何内容，用于测试
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        }
    }

    pub fn table_bar(
        &self,
        table: &str,
    ) -> TableBar {
        TableBar {
            table: table.to_string(),
            multi: self.multi.clone(),
            bar: None,
        }
    }

    /// 在进度条上方输出一行，不打乱进度条
    pub fn println(
        &self,
        message: &str,
    ) {
        if self.multi.println(message).is_err() {
            tracing::debug!("终端输出失败: {}", message);
        }
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TableBar {
    table: String,
    multi: MultiProgress,
    bar: Option<ProgressBar>,
}

impl ProgressSink for TableBar {
    fn start(
        &mut self,
        total: u64,
    ) {
        let style = ProgressStyle::with_template(BAR_TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_bar());
        let bar = self.multi.add(ProgressBar::new(total));
        bar.set_style(style);
        bar.set_prefix(format!("Processing {}:", self.table));
        self.bar = Some(bar);
    }

    fn inc(
        &mut self,
        delta: u64,
    ) {
        if let Some(bar) = &self.bar {
            bar.inc(delta);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}

/// 记录收到的进度事件
#[cfg(test)]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordingSink {
    pub total: Option<u64>,
    pub rows: u64,
    pub incs: u64,
    pub finished: bool,
}

#[cfg(test)]
impl ProgressSink for RecordingSink {
    fn start(
        &mut self,
        total: u64,
    ) {
        self.total = Some(total);
    }

    fn inc(
        &mut self,
        delta: u64,
    ) {
        self.rows += delta;
        self.incs += 1;
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}
