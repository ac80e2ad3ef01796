// ==========================================
// 动态台账导入系统 - 导入流水线
// ==========================================
// 流程: 取文件 -> 读表头 -> 加载元数据 -> 决定提交方式
//       -> 逐行(取原记录 -> 校验转换 -> 关联检查 -> 提交) -> 报告
// 致命错误: 任一阶段直接进入失败终态,错误日志只含该错误
// 只含逗号的数据行: 致命错误（计数预扫描时发现,提交前中止）
// 临时文件: ResolvedFiles 在本次运行结束时销毁
// ==========================================

use crate::config::settings::ImportSettings;
use crate::domain::job::JobCounts;
use crate::domain::record::{ErrorKind, FieldError, PriorRecord, RowContext, ValidatedRow};
use crate::domain::request::ImportRequest;
use crate::domain::types::{CsvEncoding, JobOutcome, JobStep};
use crate::i18n::normalize_locale;
use crate::importer::commit_router::{CommitRouter, CommitStrategy};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{CsvRowReader, RowStream};
use crate::importer::file_resolver::FileResolver;
use crate::importer::file_uploader::FileUploader;
use crate::importer::header::HeaderScan;
use crate::importer::message::Message;
use crate::importer::progress_reporter::{ProgressReporter, RunReport};
use crate::importer::relation_checker::RelationChecker;
use crate::importer::row_validator::RowValidator;
use crate::importer::schema_context::{SchemaContext, SchemaContextLoader};
use crate::importer::stream_committer::StreamCommitter;
use crate::importer::workflow_committer::WorkflowCommitter;
use crate::repository::object_storage::ObjectStorage;
use crate::repository::record_store::{ImportMeta, RecordStore};
use crate::repository::schema_repo::SchemaSource;
use crate::repository::task_repo::TaskRepository;
use crate::repository::workflow_repo::WorkflowService;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// 外部协作方
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn ObjectStorage>,
    pub schema: Arc<dyn SchemaSource>,
    pub records: Arc<dyn RecordStore>,
    pub workflows: Arc<dyn WorkflowService>,
    pub tasks: Arc<dyn TaskRepository>,
}

/// 致命中止（携带中止前已确认的计数）
struct Aborted {
    cause: ImportError,
    counts: JobCounts,
}

impl From<ImportError> for Aborted {
    fn from(cause: ImportError) -> Self {
        Self {
            cause,
            counts: JobCounts::default(),
        }
    }
}

pub struct ImportPipeline {
    deps: Collaborators,
    settings: ImportSettings,
}

impl ImportPipeline {
    pub fn new(deps: Collaborators, settings: ImportSettings) -> Self {
        Self { deps, settings }
    }

    /// 执行一次导入（后台任务入口）
    ///
    /// # 返回
    /// 任务终态; 任务记录已由报告器更新
    #[instrument(skip(self, request), fields(job_id = %request.job_id, datastore_id = %request.datastore_id))]
    pub async fn run(&self, request: ImportRequest) -> JobOutcome {
        let locale = normalize_locale(&request.actor.lang);
        let reporter = Arc::new(ProgressReporter::new(
            self.deps.tasks.clone(),
            self.deps.storage.clone(),
            &request.job_id,
            &request.app_id,
            &locale,
        ));
        let request = Arc::new(request);

        match self.execute(&request, &reporter, &locale).await {
            Ok(outcome) => {
                if outcome == JobOutcome::Success {
                    info!(user_id = %request.actor.user_id, "导入成功,通知用户");
                }
                outcome
            }
            Err(aborted) => {
                reporter.fail(&aborted.cause, aborted.counts).await;
                JobOutcome::Failed
            }
        }
    }

    async fn execute(
        &self,
        request: &Arc<ImportRequest>,
        reporter: &Arc<ProgressReporter>,
        locale: &str,
    ) -> Result<JobOutcome, Aborted> {
        // ===== 取文件 =====
        reporter
            .phase(JobStep::GetFile, Message::new("import.step.get_file"))
            .await;
        let resolver = FileResolver::new(self.deps.storage.clone(), self.settings.temp_root.clone());
        let files = resolver
            .resolve(
                &request.file_path,
                request.zip_path.as_deref(),
                request.encoding.unwrap_or(self.settings.default_encoding),
                request.zip_charset.unwrap_or(self.settings.zip_charset),
            )
            .await?;

        // ===== 读表头 =====
        reporter
            .phase(JobStep::ReadFile, Message::new("import.step.read_file"))
            .await;
        let rows = RowStream::open(
            files.csv_path.clone(),
            files.encoding,
            self.settings.stream_buffer,
        )
        .await?;
        let header = HeaderScan::scan(rows.header())?;
        let total = count_rows(files.csv_path.clone(), files.encoding).await?;
        debug!(columns = header.data_column_count(), total = total, "文件读取完成");

        // ===== 元数据与提交方式 =====
        let ctx = Arc::new(
            SchemaContextLoader::new(self.deps.schema.clone())
                .load(request, &header, locale)
                .await?,
        );
        let strategy = CommitRouter::new(
            self.deps.workflows.clone(),
            self.settings.workflow_field_policy,
        )
        .route(request, &header, &ctx)
        .await?;

        reporter.start_check(&ctx.datastore_label(), total).await;

        let uploader = FileUploader::new(
            self.deps.storage.clone(),
            &request.tenant,
            &request.app_id,
            &request.datastore_id,
            &files.file_map,
        );
        let stage = RowStage {
            request,
            ctx: &ctx,
            validator: RowValidator::new(
                &ctx,
                &header,
                request.action,
                request.empty_as_clear,
                &uploader,
            ),
            relations: RelationChecker::new(self.deps.records.clone()),
            records: self.deps.records.as_ref(),
        };

        let report = match strategy {
            CommitStrategy::Direct => {
                self.commit_direct(&stage, rows, total, reporter).await?
            }
            CommitStrategy::Workflow(workflow) => {
                let committer = WorkflowCommitter::new(
                    self.deps.workflows.clone(),
                    self.deps.records.clone(),
                    workflow,
                    request.clone(),
                );
                self.commit_workflow(&stage, &committer, rows, total, reporter)
                    .await?
            }
        };

        Ok(reporter.complete(report).await)
    }

    async fn commit_direct(
        &self,
        stage: &RowStage<'_>,
        mut rows: RowStream,
        total: usize,
        reporter: &Arc<ProgressReporter>,
    ) -> Result<RunReport, Aborted> {
        let request = stage.request;
        let committer = StreamCommitter::new(
            self.deps.records.clone(),
            self.settings.stream_buffer,
            self.settings.stream_timeout,
            self.settings.progress_every,
        );
        let meta = ImportMeta {
            app_id: request.app_id.clone(),
            datastore_id: request.datastore_id.clone(),
            writer: request.actor.user_id.clone(),
            owners: request.owners.clone(),
            update_owners: request.update_owners.clone(),
            database: request.database.clone(),
        };
        let mut session = committer
            .open(meta, stage.ctx.clone(), total, reporter.clone())
            .await?;

        let mut errors = Vec::new();
        let mut fatal = None;
        while let Some(row) = rows.next().await {
            let mut row = match row {
                Ok(row) => row,
                Err(e) => {
                    fatal = Some(e);
                    break;
                }
            };
            match stage.prepare(&mut row).await {
                Ok(validated) => {
                    if let Err(e) = session.send(validated).await {
                        fatal = Some(e);
                        break;
                    }
                }
                Err(row_errors) => errors.extend(row_errors),
            }
        }

        let summary = match fatal {
            Some(cause) => session.abort(cause).await,
            None => session.finish().await,
        };
        let counts = JobCounts {
            total,
            inserted: summary.inserted,
            updated: summary.updated,
        };
        if let Some(cause) = summary.fatal {
            return Err(Aborted { cause, counts });
        }

        errors.extend(summary.errors);
        Ok(RunReport {
            counts,
            errors,
            pending_approval: false,
        })
    }

    async fn commit_workflow(
        &self,
        stage: &RowStage<'_>,
        committer: &WorkflowCommitter,
        mut rows: RowStream,
        total: usize,
        reporter: &Arc<ProgressReporter>,
    ) -> Result<RunReport, Aborted> {
        let mut counts = JobCounts {
            total,
            ..Default::default()
        };
        let mut errors = Vec::new();

        while let Some(row) = rows.next().await {
            let mut row = row.map_err(|cause| Aborted { cause, counts })?;
            let validated = match stage.prepare(&mut row).await {
                Ok(validated) => validated,
                Err(row_errors) => {
                    errors.extend(row_errors);
                    continue;
                }
            };
            match committer
                .commit_row(&validated, row.prior_record.as_ref(), reporter.locale())
                .await
            {
                Ok(_) => {
                    counts.inserted += 1;
                    reporter.progress(counts).await;
                }
                Err(error) => errors.push(error),
            }
        }

        Ok(RunReport {
            counts,
            errors,
            pending_approval: true,
        })
    }
}

/// 单行处理（两种提交方式共用）
struct RowStage<'a> {
    request: &'a Arc<ImportRequest>,
    ctx: &'a Arc<SchemaContext>,
    validator: RowValidator<'a>,
    relations: RelationChecker,
    records: &'a dyn RecordStore,
}

impl RowStage<'_> {
    /// 取原记录 -> 校验转换 -> 关联检查
    async fn prepare(&self, row: &mut RowContext) -> Result<ValidatedRow, Vec<FieldError>> {
        if let Err(error) = self.load_prior(row).await {
            return Err(vec![error]);
        }

        let validated = self.validator.validate(row).await?;
        let relation_errors = self.relations.check(self.ctx, &validated).await;
        if !relation_errors.is_empty() {
            return Err(relation_errors);
        }
        Ok(validated)
    }

    /// 更新/图片模式: 按 update_owners 读取原记录
    async fn load_prior(&self, row: &mut RowContext) -> Result<(), FieldError> {
        if !self.request.action.targets_existing() {
            return Ok(());
        }
        let Some(item_id) = row.item_id().map(str::to_string) else {
            return Ok(());
        };

        let prior: Option<PriorRecord> = self
            .records
            .find_item(&self.request.datastore_id, &item_id, &self.request.update_owners)
            .await
            .map_err(|e| {
                FieldError::row(
                    row.index,
                    ErrorKind::RowValidation,
                    Message::new("import.error.lookup_failed")
                        .arg("reason", e)
                        .render(&self.ctx.locale),
                )
            })?;
        row.prior_record = prior;
        Ok(())
    }
}

/// 数据行数
///
/// # 错误
/// - 某行全部单元格为空（只含逗号）: InvalidRow,携带行号
async fn count_rows(csv_path: PathBuf, encoding: CsvEncoding) -> ImportResult<usize> {
    tokio::task::spawn_blocking(move || count_rows_blocking(&csv_path, encoding))
        .await
        .map_err(|e| ImportError::Other(anyhow::Error::from(e)))?
}

fn count_rows_blocking(csv_path: &Path, encoding: CsvEncoding) -> ImportResult<usize> {
    let mut total = 0;
    for row in CsvRowReader::open(csv_path, encoding)? {
        let row = row?;
        if row.is_blank() {
            return Err(ImportError::InvalidRow(
                Message::new("import.fatal.comma_only_row").arg("line", row.index),
            ));
        }
        total += 1;
    }
    Ok(total)
}
