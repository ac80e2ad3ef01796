// ==========================================
// 动态台账导入系统 - 导入任务
// ==========================================
// 职责: 导入任务记录及其增量更新
// 红线: 任务仅由进度报告器修改; current_step == end 后不可再变
// ==========================================

use crate::domain::types::{JobOutcome, JobStep};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 对象存储中的文件引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub url: String,
    pub name: String,
}

/// 导入计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub total: usize,
    pub inserted: usize,
    pub updated: usize,
}

impl JobCounts {
    pub fn committed(&self) -> usize {
        self.inserted + self.updated
    }

    /// 完成百分比（total 为 0 时视为 100）
    pub fn progress(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let pct = self.committed().min(self.total) * 100 / self.total;
        pct as u8
    }
}

// ==========================================
// ImportJob - 导入任务
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub job_id: String,
    pub app_id: String,
    pub datastore_id: String,
    pub user_id: String,
    pub steps: Vec<JobStep>,
    pub current_step: JobStep,
    pub message: String,
    pub counts: JobCounts,
    pub progress: u8,
    pub outcome: Option<JobOutcome>,
    pub error_artifact: Option<FileRef>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ImportJob {
    /// 创建新任务（处于 get-file 步骤）
    pub fn new(job_id: &str, app_id: &str, datastore_id: &str, user_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            app_id: app_id.to_string(),
            datastore_id: datastore_id.to_string(),
            user_id: user_id.to_string(),
            steps: JobStep::ALL.to_vec(),
            current_step: JobStep::GetFile,
            message: String::new(),
            counts: JobCounts::default(),
            progress: 0,
            outcome: None,
            error_artifact: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.current_step == JobStep::End
    }

    /// 合并一次增量更新
    ///
    /// # 返回
    /// - true: 已应用
    /// - false: 任务已结束,更新被忽略
    pub fn apply(&mut self, update: &TaskUpdate) -> bool {
        if self.is_finished() {
            return false;
        }
        if let Some(message) = &update.message {
            self.message = message.clone();
        }
        if let Some(step) = update.current_step {
            self.current_step = step;
        }
        if let Some(counts) = update.counts {
            self.counts = counts;
        }
        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(outcome) = update.outcome {
            self.outcome = Some(outcome);
        }
        if let Some(file) = &update.error_artifact {
            self.error_artifact = Some(file.clone());
        }
        if let Some(end_time) = update.end_time {
            self.end_time = Some(end_time);
        }
        true
    }
}

// ==========================================
// TaskUpdate - 任务增量更新
// ==========================================
// None 表示"保持不变"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub job_id: String,
    pub message: Option<String>,
    pub current_step: Option<JobStep>,
    pub counts: Option<JobCounts>,
    pub progress: Option<u8>,
    pub outcome: Option<JobOutcome>,
    pub error_artifact: Option<FileRef>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    pub fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            ..Default::default()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn step(mut self, step: JobStep) -> Self {
        self.current_step = Some(step);
        self
    }

    pub fn counts(mut self, counts: JobCounts) -> Self {
        self.counts = Some(counts);
        self.progress = Some(counts.progress());
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn outcome(mut self, outcome: JobOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn error_artifact(mut self, file: FileRef) -> Self {
        self.error_artifact = Some(file);
        self
    }

    pub fn finished_now(mut self) -> Self {
        self.end_time = Some(Utc::now());
        self
    }
}
