// ==========================================
// 动态台账导入系统 - 流式直接提交
// ==========================================
// 状态: Init -> MetaSent -> Streaming -> Draining -> Closed
// 任务划分:
// - 发送方（调用方所在任务）: 元数据帧 -> 每行一帧 -> 空帧结束
// - 接收任务: 读取记录存储的确认流,转发给汇总任务
// - 汇总任务: 单线程累计计数与错误,按需上报进度
// 约束:
// - 帧通道有界,服务端慢时发送方等待而不是堆积
// - 传输错误: 停止发送,已收到的确认照常计数
// - 超时是整次调用的上限,不是逐行超时
// ==========================================

use crate::domain::job::JobCounts;
use crate::domain::record::{ErrorKind, FieldError, LineRef, ValidatedRow};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::message::Message;
use crate::importer::progress_reporter::ProgressReporter;
use crate::importer::schema_context::SchemaContext;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::record_store::{
    AckStatus, ImportAck, ImportFrame, ImportMeta, RecordStore, RemoteRowError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// 流状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Init,
    MetaSent,
    Streaming,
    Draining,
    Closed,
}

/// 汇总任务的累计结果
#[derive(Debug, Default)]
struct AckTally {
    inserted: usize,
    updated: usize,
    errors: Vec<FieldError>,
}

/// 一次流式提交的结果
#[derive(Debug, Default)]
pub struct StreamSummary {
    pub sent: usize,
    pub inserted: usize,
    pub updated: usize,
    pub errors: Vec<FieldError>,
    /// 导致提前结束的致命错误
    pub fatal: Option<ImportError>,
}

pub struct StreamCommitter {
    store: Arc<dyn RecordStore>,
    buffer: usize,
    timeout: Duration,
    progress_every: usize,
}

impl StreamCommitter {
    /// # 参数
    /// - buffer: 帧/确认通道容量
    /// - timeout: 整次调用上限
    /// - progress_every: 每 N 个成功确认上报一次进度
    pub fn new(
        store: Arc<dyn RecordStore>,
        buffer: usize,
        timeout: Duration,
        progress_every: usize,
    ) -> Self {
        Self {
            store,
            buffer: buffer.max(1),
            timeout,
            progress_every: progress_every.max(1),
        }
    }

    /// 打开流并发送元数据帧
    ///
    /// # 参数
    /// - meta: 目标台账/写入者/权限键
    /// - ctx: 用于解析服务端错误中的字段名称
    /// - total: 数据总行数（进度计算）
    /// - reporter: 进度上报
    pub async fn open(
        &self,
        meta: ImportMeta,
        ctx: Arc<SchemaContext>,
        total: usize,
        reporter: Arc<ProgressReporter>,
    ) -> ImportResult<StreamSession> {
        let deadline = Instant::now() + self.timeout;
        let timeout_secs = self.timeout.as_secs();

        let stream = match timeout_at(deadline, self.store.open_import_stream(self.buffer)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(stream_error(e)),
            Err(_) => return Err(timeout_error(timeout_secs)),
        };

        let (events_tx, events_rx) = mpsc::channel(self.buffer);
        let (aborted_tx, aborted_rx) = watch::channel(false);
        let receiver = tokio::spawn(receive_acks(stream.acks, events_tx, aborted_tx));
        let aggregator = tokio::spawn(aggregate_acks(
            events_rx,
            ctx,
            total,
            self.progress_every,
            reporter,
        ));

        let mut session = StreamSession {
            state: StreamState::Init,
            frames: Some(stream.frames),
            aborted: aborted_rx,
            receiver,
            aggregator,
            deadline,
            timeout_secs,
            sent: 0,
        };

        if let Err(e) = session.send_frame(ImportFrame::Meta(meta)).await {
            warn!(error = %e, "元数据帧发送失败");
            session.receiver.abort();
            session.aggregator.abort();
            return Err(e);
        }
        session.state = StreamState::MetaSent;
        debug!("元数据帧已发送");
        Ok(session)
    }
}

pub struct StreamSession {
    state: StreamState,
    frames: Option<mpsc::Sender<ImportFrame>>,
    aborted: watch::Receiver<bool>,
    receiver: JoinHandle<Option<RepositoryError>>,
    aggregator: JoinHandle<AckTally>,
    deadline: Instant,
    timeout_secs: u64,
    sent: usize,
}

impl StreamSession {
    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    async fn send_frame(&mut self, frame: ImportFrame) -> ImportResult<()> {
        if *self.aborted.borrow() {
            return Err(closed_error());
        }
        let frames = self.frames.as_ref().ok_or_else(closed_error)?;
        match timeout_at(self.deadline, frames.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(closed_error()),
            Err(_) => Err(timeout_error(self.timeout_secs)),
        }
    }

    /// 发送一行
    ///
    /// # 错误
    /// - 传输中断或超时: RemoteCommit,调用方应停止发送并调用 abort
    pub async fn send(&mut self, row: ValidatedRow) -> ImportResult<()> {
        if !matches!(self.state, StreamState::MetaSent | StreamState::Streaming) {
            return Err(closed_error());
        }
        self.send_frame(ImportFrame::Data(Some(row))).await?;
        self.state = StreamState::Streaming;
        self.sent += 1;
        Ok(())
    }

    /// 发送结束帧并等待全部确认
    pub async fn finish(mut self) -> StreamSummary {
        let fatal = self.send_frame(ImportFrame::Data(None)).await.err();
        self.frames = None;
        self.state = StreamState::Draining;
        debug!(sent = self.sent, "输入结束,等待确认");
        self.drain(fatal).await
    }

    /// 因致命错误提前结束: 不再发送（不发结束帧）,已发出行的确认照常收取
    pub async fn abort(mut self, cause: ImportError) -> StreamSummary {
        warn!(sent = self.sent, error = %cause, "提前关闭提交流");
        self.frames = None;
        self.state = StreamState::Draining;
        self.drain(Some(cause)).await
    }

    async fn drain(mut self, mut fatal: Option<ImportError>) -> StreamSummary {
        let joined = timeout_at(self.deadline, &mut self.receiver).await;
        let transport = match joined {
            Ok(Ok(transport)) => transport,
            Ok(Err(join)) if join.is_cancelled() => None,
            Ok(Err(join)) => Some(RepositoryError::InternalError(join.to_string())),
            Err(_) => {
                self.receiver.abort();
                fatal.get_or_insert_with(|| timeout_error(self.timeout_secs));
                None
            }
        };
        if let Some(e) = transport {
            // 传输层的真实原因优先于发送方看到的"连接已关闭"
            fatal = Some(stream_error(e));
        }

        // 接收任务结束后事件通道关闭,汇总任务随之结束
        let tally = self.aggregator.await.unwrap_or_else(|e| {
            warn!(error = %e, "确认汇总任务异常结束");
            AckTally::default()
        });
        self.state = StreamState::Closed;

        info!(
            sent = self.sent,
            inserted = tally.inserted,
            updated = tally.updated,
            errors = tally.errors.len(),
            fatal = fatal.is_some(),
            "流式提交结束"
        );
        StreamSummary {
            sent: self.sent,
            inserted: tally.inserted,
            updated: tally.updated,
            errors: tally.errors,
            fatal,
        }
    }
}

// ===== 接收任务 =====

async fn receive_acks(
    mut acks: mpsc::Receiver<RepositoryResult<ImportAck>>,
    events: mpsc::Sender<ImportAck>,
    aborted: watch::Sender<bool>,
) -> Option<RepositoryError> {
    while let Some(ack) = acks.recv().await {
        match ack {
            Ok(ack) => {
                if events.send(ack).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "确认流传输错误");
                let _ = aborted.send(true);
                return Some(e);
            }
        }
    }
    None
}

// ===== 汇总任务 =====

async fn aggregate_acks(
    mut events: mpsc::Receiver<ImportAck>,
    ctx: Arc<SchemaContext>,
    total: usize,
    progress_every: usize,
    reporter: Arc<ProgressReporter>,
) -> AckTally {
    let mut tally = AckTally::default();
    let mut success_acks = 0usize;

    while let Some(ack) = events.recv().await {
        match ack.status {
            AckStatus::Section => {}
            AckStatus::Success => {
                tally.inserted += ack.insert_count;
                tally.updated += ack.update_count;
                success_acks += 1;
                if success_acks % progress_every == 0 {
                    reporter
                        .progress(JobCounts {
                            total,
                            inserted: tally.inserted,
                            updated: tally.updated,
                        })
                        .await;
                }
            }
            AckStatus::Failed => {
                tally
                    .errors
                    .extend(ack.errors.iter().map(|e| remote_error(&ctx, e)));
            }
        }
    }
    tally
}

/// 服务端行错误 -> 字段错误（字段 ID 解析为名称）
fn remote_error(ctx: &SchemaContext, error: &RemoteRowError) -> FieldError {
    let line = if error.first_line > 0 && error.last_line > error.first_line {
        LineRef::Range {
            first: error.first_line,
            last: error.last_line,
        }
    } else {
        LineRef::Single(error.current_line)
    };
    FieldError {
        line,
        kind: ErrorKind::Commit,
        field_label: error.field_id.as_deref().map(|f| ctx.field_label(f)),
        message: error.message.clone(),
    }
}

fn stream_error(err: RepositoryError) -> ImportError {
    ImportError::RemoteCommit(Message::new("import.fatal.stream").arg("reason", err))
}

fn closed_error() -> ImportError {
    ImportError::RemoteCommit(Message::new("import.fatal.stream").arg("reason", "stream closed"))
}

fn timeout_error(seconds: u64) -> ImportError {
    ImportError::RemoteCommit(Message::new("import.fatal.timeout").arg("seconds", seconds))
}
