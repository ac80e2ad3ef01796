use crate::domain::job::{FileRef, ImportJob, JobCounts, TaskUpdate};
use crate::domain::types::{JobOutcome, JobStep};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::task_repo::TaskRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::debug;

const SELECT_COLUMNS: &str = r#"
    SELECT job_id, app_id, datastore_id, user_id, steps_json, current_step,
           message, total_count, inserted_count, updated_count, progress,
           outcome, error_file_url, error_file_name, start_time, end_time
    FROM import_task
"#;

// ==========================================
// ImportTaskRepository - 导入任务仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
pub struct ImportTaskRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImportTaskRepository {
    /// 创建新的导入任务仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 建表（幂等）
    pub fn ensure_schema(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS import_task (
                job_id TEXT PRIMARY KEY,
                app_id TEXT NOT NULL,
                datastore_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                steps_json TEXT NOT NULL,
                current_step TEXT NOT NULL,
                message TEXT NOT NULL DEFAULT '',
                total_count INTEGER NOT NULL DEFAULT 0,
                inserted_count INTEGER NOT NULL DEFAULT 0,
                updated_count INTEGER NOT NULL DEFAULT 0,
                progress INTEGER NOT NULL DEFAULT 0,
                outcome TEXT,
                error_file_url TEXT,
                error_file_name TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT
            );
            "#,
        )?;
        Ok(())
    }

    fn load(conn: &Connection, job_id: &str) -> RepositoryResult<Option<ImportJob>> {
        let sql = format!("{} WHERE job_id = ?1", SELECT_COLUMNS);
        let job = conn
            .query_row(&sql, params![job_id], map_row)
            .optional()?;
        Ok(job)
    }

    fn store(conn: &Connection, job: &ImportJob) -> RepositoryResult<()> {
        conn.execute(
            r#"
            UPDATE import_task SET
                current_step = ?2, message = ?3,
                total_count = ?4, inserted_count = ?5, updated_count = ?6,
                progress = ?7, outcome = ?8,
                error_file_url = ?9, error_file_name = ?10, end_time = ?11
            WHERE job_id = ?1
            "#,
            params![
                job.job_id,
                job.current_step.as_str(),
                job.message,
                job.counts.total as i64,
                job.counts.inserted as i64,
                job.counts.updated as i64,
                job.progress as i64,
                job.outcome.map(|o| o.as_str()),
                job.error_artifact.as_ref().map(|f| f.url.clone()),
                job.error_artifact.as_ref().map(|f| f.name.clone()),
                job.end_time,
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for ImportTaskRepository {
    async fn create_task(&self, job: &ImportJob) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let steps: Vec<&str> = job.steps.iter().map(JobStep::as_str).collect();

        conn.execute(
            r#"
            INSERT INTO import_task (
                job_id, app_id, datastore_id, user_id, steps_json, current_step,
                message, total_count, inserted_count, updated_count, progress,
                outcome, error_file_url, error_file_name, start_time, end_time
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                job.job_id,
                job.app_id,
                job.datastore_id,
                job.user_id,
                serde_json::to_string(&steps)?,
                job.current_step.as_str(),
                job.message,
                job.counts.total as i64,
                job.counts.inserted as i64,
                job.counts.updated as i64,
                job.progress as i64,
                job.outcome.map(|o| o.as_str()),
                job.error_artifact.as_ref().map(|f| f.url.clone()),
                job.error_artifact.as_ref().map(|f| f.name.clone()),
                job.start_time,
                job.end_time,
            ],
        )?;
        Ok(())
    }

    async fn modify_task(&self, update: &TaskUpdate) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut job = Self::load(&tx, &update.job_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "ImportTask".to_string(),
            id: update.job_id.clone(),
        })?;

        if job.apply(update) {
            Self::store(&tx, &job)?;
        } else {
            debug!(job_id = %update.job_id, "任务已结束,忽略更新");
        }

        tx.commit()?;
        Ok(())
    }

    async fn find_task(&self, job_id: &str) -> RepositoryResult<Option<ImportJob>> {
        let conn = self.get_conn()?;
        Self::load(&conn, job_id)
    }
}

// ==========================================
// 行映射
// ==========================================

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn map_row(row: &Row) -> rusqlite::Result<ImportJob> {
    let steps_json: String = row.get(4)?;
    let step_names: Vec<String> =
        serde_json::from_str(&steps_json).map_err(|e| conversion_error(4, e))?;
    let steps = step_names
        .iter()
        .map(|s| JobStep::from_str(s))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| conversion_error(4, e))?;

    let current_step: String = row.get(5)?;
    let current_step = JobStep::from_str(&current_step).map_err(|e| conversion_error(5, e))?;

    let outcome = row
        .get::<_, Option<String>>(11)?
        .map(|s| JobOutcome::from_str(&s))
        .transpose()
        .map_err(|e| conversion_error(11, e))?;

    let error_artifact = match (
        row.get::<_, Option<String>>(12)?,
        row.get::<_, Option<String>>(13)?,
    ) {
        (Some(url), Some(name)) => Some(FileRef { url, name }),
        _ => None,
    };

    Ok(ImportJob {
        job_id: row.get(0)?,
        app_id: row.get(1)?,
        datastore_id: row.get(2)?,
        user_id: row.get(3)?,
        steps,
        current_step,
        message: row.get(6)?,
        counts: JobCounts {
            total: row.get::<_, i64>(7)? as usize,
            inserted: row.get::<_, i64>(8)? as usize,
            updated: row.get::<_, i64>(9)? as usize,
        },
        progress: row.get::<_, i64>(10)?.clamp(0, 100) as u8,
        outcome,
        error_artifact,
        start_time: row.get::<_, DateTime<Utc>>(14)?,
        end_time: row.get::<_, Option<DateTime<Utc>>>(15)?,
    })
}
