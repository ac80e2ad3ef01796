// ==========================================
// 动态台账导入系统 - 进度与错误报告
// ==========================================
// 职责:
// 1. 每个阶段边界更新任务记录（唯一的任务写入方）
// 2. 成功确认后更新进度
// 3. 运行结束: 判定结果,生成并上传错误日志,任务进入终态
// 红线: 任务记录写入失败只记日志,不中断导入
// ==========================================

use crate::domain::job::{FileRef, JobCounts, TaskUpdate};
use crate::domain::record::{FieldError, LineRef};
use crate::domain::types::{JobOutcome, JobStep};
use crate::importer::error::ImportError;
use crate::importer::message::Message;
use crate::repository::object_storage::ObjectStorage;
use crate::repository::task_repo::TaskRepository;
use std::sync::Arc;
use tracing::{error, info, warn};

const ARTIFACT_CONTENT_TYPE: &str = "text/plain";
const UTF8_BOM: &str = "\u{FEFF}";

/// 运行结束时的汇总
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub counts: JobCounts,
    pub errors: Vec<FieldError>,
    /// 工作流模式（数据尚未写入记录存储）
    pub pending_approval: bool,
}

pub struct ProgressReporter {
    tasks: Arc<dyn TaskRepository>,
    storage: Arc<dyn ObjectStorage>,
    job_id: String,
    app_id: String,
    locale: String,
}

impl ProgressReporter {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        storage: Arc<dyn ObjectStorage>,
        job_id: &str,
        app_id: &str,
        locale: &str,
    ) -> Self {
        Self {
            tasks,
            storage,
            job_id: job_id.to_string(),
            app_id: app_id.to_string(),
            locale: locale.to_string(),
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    async fn modify(&self, update: TaskUpdate) {
        if let Err(e) = self.tasks.modify_task(&update).await {
            warn!(job_id = %self.job_id, error = %e, "任务记录更新失败");
        }
    }

    /// 阶段切换
    pub async fn phase(&self, step: JobStep, message: Message) {
        info!(job_id = %self.job_id, step = %step, "进入阶段");
        self.modify(
            TaskUpdate::new(&self.job_id)
                .step(step)
                .message(message.render(&self.locale)),
        )
        .await;
    }

    /// 数据校验阶段开始（已知总行数）
    pub async fn start_check(&self, datastore_label: &str, total: usize) {
        info!(job_id = %self.job_id, total = total, "开始校验与提交数据");
        self.modify(
            TaskUpdate::new(&self.job_id)
                .step(JobStep::CheckData)
                .message(
                    Message::new("import.step.check_data")
                        .arg("datastore", datastore_label)
                        .render(&self.locale),
                )
                .counts(JobCounts {
                    total,
                    ..Default::default()
                }),
        )
        .await;
    }

    /// 进度更新
    pub async fn progress(&self, counts: JobCounts) {
        self.modify(TaskUpdate::new(&self.job_id).counts(counts)).await;
    }

    /// 正常结束（可能含行级错误）
    ///
    /// # 返回
    /// 任务终态
    pub async fn complete(&self, mut report: RunReport) -> JobOutcome {
        let counts = report.counts;
        let committed = counts.committed();

        let (outcome, message) = if !report.errors.is_empty() {
            if committed > 0 {
                (
                    JobOutcome::PartialSuccess,
                    Message::new("import.result.partial_success")
                        .arg("inserted", counts.inserted)
                        .arg("updated", counts.updated),
                )
            } else {
                (JobOutcome::AllFailed, Message::new("import.result.all_failed"))
            }
        } else if report.pending_approval {
            (
                JobOutcome::PendingApproval,
                Message::new("import.result.pending_approval").arg("count", counts.inserted),
            )
        } else if committed < counts.total {
            (
                JobOutcome::PartialSuccess,
                Message::new("import.result.not_all_imported"),
            )
        } else {
            (
                JobOutcome::Success,
                Message::new("import.result.success")
                    .arg("inserted", counts.inserted)
                    .arg("updated", counts.updated),
            )
        };

        let artifact = if report.errors.is_empty() {
            None
        } else {
            report.errors.sort_by_key(FieldError::first_line);
            let lines: Vec<String> = report.errors.iter().map(|e| self.format_error(e)).collect();
            self.write_artifact(&lines).await
        };

        info!(
            job_id = %self.job_id,
            outcome = %outcome,
            total = counts.total,
            inserted = counts.inserted,
            updated = counts.updated,
            errors = report.errors.len(),
            "导入结束"
        );
        self.finish(outcome, message, counts, artifact).await;
        outcome
    }

    /// 致命错误结束: 错误日志只包含导致中止的那一条消息
    pub async fn fail(&self, cause: &ImportError, counts: JobCounts) {
        error!(job_id = %self.job_id, kind = cause.kind(), error = %cause, "导入中止");
        let line = cause.message().render(&self.locale);
        let artifact = self.write_artifact(&[line]).await;
        self.finish(
            JobOutcome::Failed,
            Message::new("import.result.failed"),
            counts,
            artifact,
        )
        .await;
    }

    async fn finish(
        &self,
        outcome: JobOutcome,
        message: Message,
        counts: JobCounts,
        artifact: Option<FileRef>,
    ) {
        let mut update = TaskUpdate::new(&self.job_id)
            .step(JobStep::End)
            .message(message.render(&self.locale))
            .counts(counts)
            .outcome(outcome)
            .finished_now();
        if let Some(file) = artifact {
            update = update.error_artifact(file);
        }
        self.modify(update).await;
    }

    /// 行级错误 -> 本地化的一行文本
    pub fn format_error(&self, error: &FieldError) -> String {
        let message = match (&error.line, &error.field_label) {
            (LineRef::Single(line), Some(field)) => Message::new("import.row.field_error")
                .arg("line", line)
                .arg("field", field)
                .arg("message", &error.message),
            (LineRef::Single(line), None) => Message::new("import.row.error")
                .arg("line", line)
                .arg("message", &error.message),
            (LineRef::Range { first, last }, field) => {
                let text = match field {
                    Some(f) => format!("[{}] {}", f, error.message),
                    None => error.message.clone(),
                };
                Message::new("import.row.range_error")
                    .arg("first", first)
                    .arg("last", last)
                    .arg("message", text)
            }
        };
        message.render(&self.locale)
    }

    /// 上传错误日志
    ///
    /// # 返回
    /// - None: 上传失败（任务仍然进入终态）
    async fn write_artifact(&self, lines: &[String]) -> Option<FileRef> {
        self.phase(JobStep::Upload, Message::new("import.step.upload"))
            .await;

        let file_name = format!("import_errors_{}.txt", self.job_id);
        let path = format!("app_{}/text/{}", self.app_id, file_name);
        let content = format!("{}{}", UTF8_BOM, lines.join("\n"));

        match self
            .storage
            .save_object(content.into_bytes(), &path, ARTIFACT_CONTENT_TYPE)
            .await
        {
            Ok(stored) => {
                info!(job_id = %self.job_id, path = %path, lines = lines.len(), "错误日志已上传");
                Some(FileRef {
                    url: stored.url,
                    name: file_name,
                })
            }
            Err(e) => {
                error!(job_id = %self.job_id, error = %e, "错误日志上传失败");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::ImportJob;
    use crate::domain::record::ErrorKind;
    use crate::repository::error::{RepositoryError, RepositoryResult};
    use crate::repository::object_storage::StoredObject;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryTasks {
        job: Mutex<Option<ImportJob>>,
    }

    #[async_trait]
    impl TaskRepository for MemoryTasks {
        async fn create_task(&self, job: &ImportJob) -> RepositoryResult<()> {
            *self.job.lock().unwrap() = Some(job.clone());
            Ok(())
        }

        async fn modify_task(&self, update: &TaskUpdate) -> RepositoryResult<()> {
            if let Some(job) = self.job.lock().unwrap().as_mut() {
                job.apply(update);
            }
            Ok(())
        }

        async fn find_task(&self, _job_id: &str) -> RepositoryResult<Option<ImportJob>> {
            Ok(self.job.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct TextStorage {
        fail: bool,
        saved: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ObjectStorage for TextStorage {
        async fn fetch_object(&self, path: &str) -> RepositoryResult<Vec<u8>> {
            Err(RepositoryError::Transport(path.into()))
        }

        async fn save_object(
            &self,
            bytes: Vec<u8>,
            path: &str,
            _content_type: &str,
        ) -> RepositoryResult<StoredObject> {
            if self.fail {
                return Err(RepositoryError::Transport("storage offline".into()));
            }
            let text = String::from_utf8(bytes).unwrap();
            self.saved.lock().unwrap().push((path.to_string(), text));
            Ok(StoredObject {
                url: format!("https://storage.test/{}", path),
                size: 0,
                name: path.to_string(),
            })
        }

        async fn delete_object(&self, _name: &str) -> RepositoryResult<()> {
            Ok(())
        }

        async fn can_upload(&self, _tenant: &str, _size: u64) -> RepositoryResult<bool> {
            Ok(true)
        }

        async fn modify_used_size(&self, _tenant: &str, _delta: i64) -> RepositoryResult<()> {
            Ok(())
        }
    }

    async fn reporter(storage: Arc<TextStorage>) -> (ProgressReporter, Arc<MemoryTasks>) {
        let tasks = Arc::new(MemoryTasks::default());
        tasks
            .create_task(&ImportJob::new("job1", "app1", "ds1", "u1"))
            .await
            .unwrap();
        (
            ProgressReporter::new(tasks.clone(), storage, "job1", "app1", "en"),
            tasks,
        )
    }

    fn counts(total: usize, inserted: usize, updated: usize) -> JobCounts {
        JobCounts {
            total,
            inserted,
            updated,
        }
    }

    #[tokio::test]
    async fn test_success_without_artifact() {
        let storage = Arc::new(TextStorage::default());
        let (reporter, tasks) = reporter(storage.clone()).await;

        let outcome = reporter
            .complete(RunReport {
                counts: counts(2, 2, 0),
                ..Default::default()
            })
            .await;

        assert_eq!(outcome, JobOutcome::Success);
        let job = tasks.find_task("job1").await.unwrap().unwrap();
        assert!(job.is_finished());
        assert_eq!(job.message, "Import finished: 2 inserted, 0 updated");
        assert!(job.error_artifact.is_none());
        assert!(storage.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_success_writes_sorted_artifact() {
        let storage = Arc::new(TextStorage::default());
        let (reporter, tasks) = reporter(storage.clone()).await;

        let outcome = reporter
            .complete(RunReport {
                counts: counts(3, 1, 0),
                errors: vec![
                    FieldError::row(4, ErrorKind::RelationIntegrity, "missing"),
                    FieldError::field(3, ErrorKind::RowValidation, "Name", "This field is required"),
                ],
                pending_approval: false,
            })
            .await;

        assert_eq!(outcome, JobOutcome::PartialSuccess);
        let saved = storage.saved.lock().unwrap();
        assert_eq!(saved[0].0, "app_app1/text/import_errors_job1.txt");
        assert_eq!(
            saved[0].1,
            "\u{FEFF}Line 3: field [Name]: This field is required\nLine 4: missing"
        );

        let job = tasks.find_task("job1").await.unwrap().unwrap();
        assert_eq!(job.outcome, Some(JobOutcome::PartialSuccess));
        assert_eq!(
            job.error_artifact.map(|f| f.name).as_deref(),
            Some("import_errors_job1.txt")
        );
    }

    #[tokio::test]
    async fn test_outcome_variants() {
        let storage = Arc::new(TextStorage::default());
        let (reporter, _) = reporter(storage.clone()).await;
        let failed_row = vec![FieldError::row(2, ErrorKind::Commit, "rejected")];

        assert_eq!(
            reporter
                .complete(RunReport {
                    counts: counts(1, 0, 0),
                    errors: failed_row,
                    pending_approval: false,
                })
                .await,
            JobOutcome::AllFailed
        );
        assert_eq!(
            reporter
                .complete(RunReport {
                    counts: counts(2, 2, 0),
                    errors: vec![],
                    pending_approval: true,
                })
                .await,
            JobOutcome::PendingApproval
        );
        assert_eq!(
            reporter
                .complete(RunReport {
                    counts: counts(3, 2, 0),
                    ..Default::default()
                })
                .await,
            JobOutcome::PartialSuccess
        );
    }

    #[tokio::test]
    async fn test_fail_survives_artifact_upload_failure() {
        let storage = Arc::new(TextStorage {
            fail: true,
            ..Default::default()
        });
        let (reporter, tasks) = reporter(storage).await;

        let cause = ImportError::SchemaMismatch(Message::new("import.fatal.empty_file"));
        reporter.fail(&cause, JobCounts::default()).await;

        let job = tasks.find_task("job1").await.unwrap().unwrap();
        assert_eq!(job.outcome, Some(JobOutcome::Failed));
        assert!(job.is_finished());
        assert!(job.error_artifact.is_none());
    }

    #[test]
    fn test_range_error_format() {
        let tasks = Arc::new(MemoryTasks::default());
        let reporter = ProgressReporter::new(
            tasks,
            Arc::new(TextStorage::default()),
            "job1",
            "app1",
            "en",
        );
        let error = FieldError {
            line: LineRef::Range { first: 2, last: 5 },
            kind: ErrorKind::Commit,
            field_label: Some("Code".into()),
            message: "duplicated".into(),
        };
        assert_eq!(reporter.format_error(&error), "Lines 2-5: [Code] duplicated");
    }
}
