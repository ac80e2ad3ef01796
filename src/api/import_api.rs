// ==========================================
// 动态台账导入系统 - 导入受理 API
// ==========================================
// 职责: 校验上传请求,创建导入任务,在后台启动导入流水线
// 并发: 同一台账同时只允许一个导入（进程内守卫,按 租户/应用/台账 区分）
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::settings::ImportSettings;
use crate::domain::job::ImportJob;
use crate::domain::request::ImportRequest;
use crate::domain::types::JobOutcome;
use crate::importer::file_resolver::SourceFormat;
use crate::importer::pipeline::{Collaborators, ImportPipeline};
use crate::repository::task_repo::TaskRepository;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// 已受理的导入
///
/// job_id 立即返回给调用方; handle 可用于等待后台运行结束
pub struct ImportHandle {
    pub job_id: String,
    handle: JoinHandle<JobOutcome>,
}

impl ImportHandle {
    /// 等待后台导入结束
    pub async fn join(self) -> JobOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "后台导入任务异常退出");
                JobOutcome::Failed
            }
        }
    }
}

/// 台账标识（租户 + 应用 + 台账）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DatastoreKey {
    tenant: String,
    app_id: String,
    datastore_id: String,
}

impl DatastoreKey {
    fn of(request: &ImportRequest) -> Self {
        Self {
            tenant: request.tenant.clone(),
            app_id: request.app_id.clone(),
            datastore_id: request.datastore_id.clone(),
        }
    }
}

/// 台账导入占用标记（drop 时释放）
struct RunningGuard {
    running: Arc<Mutex<HashSet<DatastoreKey>>>,
    key: DatastoreKey,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        match self.running.lock() {
            Ok(mut running) => {
                running.remove(&self.key);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&self.key);
            }
        }
    }
}

pub struct ImportApi {
    pipeline: Arc<ImportPipeline>,
    tasks: Arc<dyn TaskRepository>,
    running: Arc<Mutex<HashSet<DatastoreKey>>>,
}

impl ImportApi {
    pub fn new(deps: Collaborators, settings: ImportSettings) -> Self {
        let tasks = deps.tasks.clone();
        Self {
            pipeline: Arc::new(ImportPipeline::new(deps, settings)),
            tasks,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// 受理导入请求
    ///
    /// # 参数
    /// - request: 导入请求; job_id 为空时自动生成
    ///
    /// # 返回
    /// 已受理的导入（任务已创建,流水线已在后台启动）
    ///
    /// # 错误
    /// - InvalidInput: 必填标识为空
    /// - UnsupportedFormat: 文件扩展名不受支持
    /// - ImportInProgress: 同一台账已有导入在运行
    #[instrument(skip(self, request), fields(datastore_id = %request.datastore_id))]
    pub async fn submit(&self, mut request: ImportRequest) -> ApiResult<ImportHandle> {
        validate_request(&request)?;
        if request.job_id.trim().is_empty() {
            request.job_id = uuid::Uuid::new_v4().to_string();
        }

        let guard = self.acquire(DatastoreKey::of(&request))?;

        let job = ImportJob::new(
            &request.job_id,
            &request.app_id,
            &request.datastore_id,
            &request.actor.user_id,
        );
        // 创建失败时 guard 随之释放
        self.tasks.create_task(&job).await?;

        let job_id = request.job_id.clone();
        let pipeline = self.pipeline.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            pipeline.run(request).await
        });

        info!(job_id = %job_id, "导入已受理");
        Ok(ImportHandle { job_id, handle })
    }

    /// 查询导入任务
    pub async fn job_status(&self, job_id: &str) -> ApiResult<ImportJob> {
        self.tasks
            .find_task(job_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(job_id.to_string()))
    }

    /// 台账是否有导入在运行
    pub fn is_running(&self, tenant: &str, app_id: &str, datastore_id: &str) -> bool {
        let key = DatastoreKey {
            tenant: tenant.to_string(),
            app_id: app_id.to_string(),
            datastore_id: datastore_id.to_string(),
        };
        self.running
            .lock()
            .map(|running| running.contains(&key))
            .unwrap_or(false)
    }

    fn acquire(&self, key: DatastoreKey) -> ApiResult<RunningGuard> {
        let mut running = self
            .running
            .lock()
            .map_err(|e| ApiError::InternalError(format!("导入守卫锁获取失败: {}", e)))?;
        if !running.insert(key.clone()) {
            warn!(tenant = %key.tenant, app_id = %key.app_id, datastore_id = %key.datastore_id, "台账已有导入在运行,拒绝");
            return Err(ApiError::ImportInProgress(key.datastore_id));
        }
        Ok(RunningGuard {
            running: self.running.clone(),
            key,
        })
    }
}

fn validate_request(request: &ImportRequest) -> ApiResult<()> {
    let required = [
        ("tenant", &request.tenant),
        ("app_id", &request.app_id),
        ("datastore_id", &request.datastore_id),
        ("user_id", &request.actor.user_id),
        ("file_path", &request.file_path),
    ];
    if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(ApiError::InvalidInput(format!("{} 不能为空", name)));
    }
    if SourceFormat::detect(request.file_name()).is_none() {
        return Err(ApiError::UnsupportedFormat(request.file_name().to_string()));
    }
    Ok(())
}
