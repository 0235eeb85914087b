//! 任务状态推送 - 编排层
//!
//! ## 职责
//!
//! 为每个订阅方维护一条任务状态事件流：
//!
//! 1. **订阅**：立即发送 `connected` 心跳，启动心跳定时器与轮询循环
//! 2. **轮询**：读取任务行，终态发送 finalize 并在宽限期后关闭，否则发送 update
//! 3. **退避**：轮询成功时间隔 ×3/4（下限 2s），失败时 ×2（上限 15s），
//!    连续失败 10 次发送 error 并关闭；任务行保持原样
//! 4. **主动推送**：任务管理器的每次更新通过按任务划分的广播通道直达订阅方，
//!    终态推送 1s 后释放该通道
//! 5. **退订**：丢弃 `JobSubscription` 即停止定时器并释放通道
//!
//! 同一订阅内：update 的百分比不会回退，finalize 只发一次。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::clients::DataStore;
use crate::config::StreamConfig;
use crate::models::{GradingJob, JobEventType, JobStatus, JobStatusEvent};

type Subjects = Mutex<HashMap<String, broadcast::Sender<JobStatusEvent>>>;

/// 任务状态推送
///
/// 进程内的"任务 → 广播通道"表；不跨进程
pub struct JobStatusStream {
    store: Arc<dyn DataStore>,
    config: StreamConfig,
    subjects: Arc<Subjects>,
}

impl JobStatusStream {
    pub fn new(store: Arc<dyn DataStore>, config: StreamConfig) -> Self {
        Self {
            store,
            config,
            subjects: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 广播一次任务更新；没有订阅方时什么也不做
    pub fn publish(&self, job: &GradingJob) {
        let event = JobStatusEvent::from_job(job);
        {
            let subjects = self.subjects.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(sender) = subjects.get(&job.id) {
                let _ = sender.send(event);
            }
        }

        if job.status.is_terminal() {
            let subjects = Arc::downgrade(&self.subjects);
            let job_id = job.id.clone();
            let delay = self.config.terminal_cleanup();
            tokio::spawn(async move {
                sleep(delay).await;
                release_subject(&subjects, &job_id, true);
            });
        }
    }

    /// 订阅某个任务的状态事件
    pub fn subscribe(&self, job_id: &str) -> JobSubscription {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let pushes = PushFeed::attach(&self.subjects, job_id);

        let driver = StreamDriver {
            job_id: job_id.to_string(),
            store: self.store.clone(),
            config: self.config.clone(),
            tx,
            pushes,
            last_percentage: None,
            last_emitted: None,
            last_update_at: Instant::now(),
            finalized: false,
        };

        debug!("任务 {} 新增订阅", job_id);
        JobSubscription {
            events: rx,
            driver: tokio::spawn(driver.run()),
        }
    }

    /// 当前有订阅方的任务数量
    pub fn active_subjects(&self) -> usize {
        self.subjects.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// 一个订阅：读取事件；丢弃即退订
pub struct JobSubscription {
    events: mpsc::Receiver<JobStatusEvent>,
    driver: JoinHandle<()>,
}

impl JobSubscription {
    /// 下一条事件；流关闭后返回 `None`
    pub async fn next(&mut self) -> Option<JobStatusEvent> {
        self.events.recv().await
    }
}

impl Drop for JobSubscription {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// 广播通道的接收端，离开时释放通道表中的空条目
struct PushFeed {
    rx: Option<broadcast::Receiver<JobStatusEvent>>,
    subjects: Weak<Subjects>,
    job_id: String,
}

impl PushFeed {
    fn attach(subjects: &Arc<Subjects>, job_id: &str) -> Self {
        let rx = {
            let mut map = subjects.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(job_id.to_string())
                .or_insert_with(|| broadcast::channel(16).0)
                .subscribe()
        };
        Self {
            rx: Some(rx),
            subjects: Arc::downgrade(subjects),
            job_id: job_id.to_string(),
        }
    }

    /// 下一条推送；通道关闭后返回 `None`
    async fn recv(&mut self) -> Option<JobStatusEvent> {
        loop {
            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("任务 {} 推送积压，跳过 {} 条", self.job_id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    fn is_open(&self) -> bool {
        self.rx.is_some()
    }
}

impl Drop for PushFeed {
    fn drop(&mut self) {
        self.rx.take();
        release_subject(&self.subjects, &self.job_id, false);
    }
}

/// 从通道表移除某个任务；`force` 为假时只在没有接收端时移除
fn release_subject(subjects: &Weak<Subjects>, job_id: &str, force: bool) {
    let Some(subjects) = subjects.upgrade() else {
        return;
    };
    let mut map = subjects.lock().unwrap_or_else(|e| e.into_inner());
    let idle = map
        .get(job_id)
        .map_or(false, |sender| force || sender.receiver_count() == 0);
    if idle {
        map.remove(job_id);
        debug!("任务 {} 的推送通道已释放", job_id);
    }
}

/// 单个订阅的驱动任务
struct StreamDriver {
    job_id: String,
    store: Arc<dyn DataStore>,
    config: StreamConfig,
    tx: mpsc::Sender<JobStatusEvent>,
    pushes: PushFeed,
    last_percentage: Option<u8>,
    last_emitted: Option<(JobStatus, String, u8)>,
    last_update_at: Instant,
    finalized: bool,
}

/// 转发结果
enum Forwarded {
    Continue,
    Done,
    Closed,
}

impl StreamDriver {
    async fn run(mut self) {
        let connected = JobStatusEvent::heartbeat(None, "connected", 0);
        if self.tx.send(connected).await.is_err() {
            return;
        }

        let heartbeat_every = self.config.heartbeat_interval();
        let mut heartbeat = tokio::time::interval_at(Instant::now() + heartbeat_every, heartbeat_every);
        let min_poll = Duration::from_millis(self.config.min_poll_ms);
        let max_poll = Duration::from_millis(self.config.max_poll_ms.max(self.config.min_poll_ms));
        let mut poll_delay = Duration::from_millis(self.config.initial_poll_ms).clamp(min_poll, max_poll);
        let poll = sleep(Duration::ZERO);
        tokio::pin!(poll);
        let mut consecutive_errors: u32 = 0;

        let outcome = loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if self.last_update_at.elapsed() >= self.config.heartbeat_idle() {
                        let (status, progress, percentage) = self
                            .last_emitted
                            .clone()
                            .map(|(s, p, pct)| (Some(s), p, pct))
                            .unwrap_or((None, String::new(), 0));
                        if self.tx.send(JobStatusEvent::heartbeat(status, progress, percentage)).await.is_err() {
                            break Forwarded::Closed;
                        }
                    }
                }
                _ = &mut poll => {
                    match self.store.find_job(&self.job_id).await {
                        Ok(Some(job)) => {
                            consecutive_errors = 0;
                            poll_delay = (poll_delay * 3 / 4).max(min_poll);
                            match self.forward(JobStatusEvent::from_job(&job)).await {
                                Forwarded::Continue => {}
                                other => break other,
                            }
                        }
                        Ok(None) => {
                            warn!("⚠️ 任务 {} 不存在，关闭状态流", self.job_id);
                            let _ = self.tx.send(JobStatusEvent::error(format!("任务不存在: {}", self.job_id))).await;
                            break Forwarded::Closed;
                        }
                        Err(e) => {
                            consecutive_errors += 1;
                            poll_delay = (poll_delay * 2).min(max_poll);
                            warn!(
                                "⚠️ 任务 {} 状态轮询失败 ({}/{}): {}",
                                self.job_id, consecutive_errors, self.config.max_consecutive_errors, e
                            );
                            if consecutive_errors >= self.config.max_consecutive_errors {
                                let _ = self
                                    .tx
                                    .send(JobStatusEvent::error(format!(
                                        "连续 {} 次读取任务状态失败: {}",
                                        consecutive_errors, e
                                    )))
                                    .await;
                                break Forwarded::Closed;
                            }
                        }
                    }
                    poll.as_mut().reset(Instant::now() + poll_delay);
                }
                pushed = self.pushes.recv(), if self.pushes.is_open() => {
                    if let Some(event) = pushed {
                        match self.forward(event).await {
                            Forwarded::Continue => {}
                            other => break other,
                        }
                    }
                }
                _ = self.tx.closed() => break Forwarded::Closed,
            }
        };

        if let Forwarded::Done = outcome {
            // 给订阅方留出读取 finalize 的时间
            sleep(self.config.finalize_grace()).await;
            info!("任务 {} 状态流结束", self.job_id);
        }
    }

    /// 过滤并发送一条 update / finalize
    async fn forward(&mut self, event: JobStatusEvent) -> Forwarded {
        let data = &event.data;
        match event.event_type {
            JobEventType::Finalize => {
                if self.finalized {
                    return Forwarded::Done;
                }
                self.finalized = true;
            }
            JobEventType::Update => {
                if self.last_percentage.map_or(false, |last| data.percentage < last) {
                    return Forwarded::Continue;
                }
                let key = data.status.map(|s| (s, data.progress.clone(), data.percentage));
                if key.is_some() && key == self.last_emitted {
                    return Forwarded::Continue;
                }
            }
            JobEventType::Heartbeat | JobEventType::Error => {}
        }

        if let Some(status) = data.status {
            self.last_emitted = Some((status, data.progress.clone(), data.percentage));
            self.last_percentage = Some(self.last_percentage.unwrap_or(0).max(data.percentage));
        }
        self.last_update_at = Instant::now();

        let done = event.event_type == JobEventType::Finalize;
        if self.tx.send(event).await.is_err() {
            return Forwarded::Closed;
        }
        if done {
            Forwarded::Done
        } else {
            Forwarded::Continue
        }
    }
}
