//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: 足りない port はまとめて 1 回で報告する
//! - 省略できる port（clock, id 生成, queue, limiter）はデフォルトを入れる

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;

use crate::app::dispatcher::{CycleReport, Dispatcher};
use crate::app::scheduler::Scheduler;
use crate::app::worker::{TaskRunReport, Worker};
use crate::app::worker_pool::WorkerPool;
use crate::config::{ConfigError, FinsyncConfig};
use crate::domain::FinsyncError;
use crate::impls::{InMemoryWorkQueue, MinIntervalLimiter, Unlimited};
use crate::ports::{
    Clock, CredentialStore, EventBus, FinancialApi, IdGenerator, InvocationLimiter, RoleAssumer,
    ShipmentEventStore, SystemClock, TaskStore, UlidGenerator, WorkQueue,
};

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing ports: {0:?}. These ports are required but were not provided.")]
    MissingPorts(Vec<String>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(FinsyncConfig::default())
///     .credentials(InMemoryCredentialStore::new(sellers, 100))
///     .roles(StaticRoleAssumer::new())
///     .upstream(ScriptedFinancialApi::new(50))
///     .task_store(InMemoryTaskStore::new())
///     .shipment_store(InMemoryShipmentStore::new())
///     .event_bus(RecordingEventBus::new())
///     .build()?;
/// ```
pub struct AppBuilder {
    config: FinsyncConfig,
    credentials: Option<Arc<dyn CredentialStore>>,
    roles: Option<Arc<dyn RoleAssumer>>,
    upstream: Option<Arc<dyn FinancialApi>>,
    tasks: Option<Arc<dyn TaskStore>>,
    shipments: Option<Arc<dyn ShipmentEventStore>>,
    bus: Option<Arc<dyn EventBus>>,
    queue: Option<Arc<dyn WorkQueue>>,
    limiter: Option<Arc<dyn InvocationLimiter>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl AppBuilder {
    pub fn new(config: FinsyncConfig) -> Self {
        Self {
            config,
            credentials: None,
            roles: None,
            upstream: None,
            tasks: None,
            shipments: None,
            bus: None,
            queue: None,
            limiter: None,
            clock: None,
            ids: None,
        }
    }

    pub fn credentials(mut self, store: impl CredentialStore + 'static) -> Self {
        self.credentials = Some(Arc::new(store));
        self
    }

    pub fn roles(mut self, roles: impl RoleAssumer + 'static) -> Self {
        self.roles = Some(Arc::new(roles));
        self
    }

    pub fn upstream(mut self, api: impl FinancialApi + 'static) -> Self {
        self.upstream = Some(Arc::new(api));
        self
    }

    pub fn task_store(mut self, store: impl TaskStore + 'static) -> Self {
        self.tasks = Some(Arc::new(store));
        self
    }

    pub fn shipment_store(mut self, store: impl ShipmentEventStore + 'static) -> Self {
        self.shipments = Some(Arc::new(store));
        self
    }

    pub fn event_bus(mut self, bus: impl EventBus + 'static) -> Self {
        self.bus = Some(Arc::new(bus));
        self
    }

    /// Default: `InMemoryWorkQueue`.
    pub fn work_queue(mut self, queue: impl WorkQueue + 'static) -> Self {
        self.queue = Some(Arc::new(queue));
        self
    }

    /// Default: derived from `min_invocation_interval_ms`.
    pub fn limiter(mut self, limiter: impl InvocationLimiter + 'static) -> Self {
        self.limiter = Some(Arc::new(limiter));
        self
    }

    /// Default: `SystemClock`.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Default: `UlidGenerator` over the configured clock.
    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    /// 検証してから App を組み立てる
    ///
    /// - config を validate する
    /// - 必須 port が揃っているかチェックし、不足があれば全部まとめて返す
    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;

        let mut missing = Vec::new();
        if self.credentials.is_none() {
            missing.push("credentials".to_string());
        }
        if self.roles.is_none() {
            missing.push("roles".to_string());
        }
        if self.upstream.is_none() {
            missing.push("upstream".to_string());
        }
        if self.tasks.is_none() {
            missing.push("task_store".to_string());
        }
        if self.shipments.is_none() {
            missing.push("shipment_store".to_string());
        }
        if self.bus.is_none() {
            missing.push("event_bus".to_string());
        }
        let (
            Some(credentials),
            Some(roles),
            Some(upstream),
            Some(tasks),
            Some(shipments),
            Some(bus),
        ) = (
            self.credentials,
            self.roles,
            self.upstream,
            self.tasks,
            self.shipments,
            self.bus,
        )
        else {
            return Err(BuildError::MissingPorts(missing));
        };

        let config = self.config;
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(Arc::clone(&clock))),
        };
        let queue: Arc<dyn WorkQueue> = match self.queue {
            Some(queue) => queue,
            None => Arc::new(InMemoryWorkQueue::new()),
        };
        let limiter: Arc<dyn InvocationLimiter> = match (self.limiter, config.min_invocation_interval()) {
            (Some(limiter), _) => limiter,
            (None, Some(interval)) => Arc::new(MinIntervalLimiter::new(interval)),
            (None, None) => Arc::new(Unlimited),
        };

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&credentials),
            Arc::clone(&tasks),
            Arc::clone(&queue),
            limiter,
            Arc::clone(&clock),
            ids,
            config.dispatch_budget(),
            config.stale_task_after(),
            config.role_arn.clone(),
        ));
        let worker = Arc::new(Worker::new(
            credentials,
            roles,
            upstream,
            Arc::clone(&tasks),
            Arc::clone(&shipments),
            bus,
            clock,
            config.worker_budget(),
            config.event_bus_name.clone(),
            config.role_arn.clone(),
        ));

        Ok(App {
            config,
            dispatcher,
            worker,
            tasks,
            shipments,
            queue,
        })
    }
}

/// One dispatch cycle plus every task it handed out.
#[derive(Debug, Clone, Serialize)]
pub struct DrainReport {
    pub cycle: CycleReport,
    pub tasks: Vec<TaskRunReport>,
    /// `run_task` calls that hit a Task Store failure or panicked.
    pub worker_errors: usize,
}

/// App は組み立て済みのランタイム
pub struct App {
    pub(crate) config: FinsyncConfig,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) worker: Arc<Worker>,
    pub(crate) tasks: Arc<dyn TaskStore>,
    pub(crate) shipments: Arc<dyn ShipmentEventStore>,
    pub(crate) queue: Arc<dyn WorkQueue>,
}

impl App {
    pub fn config(&self) -> &FinsyncConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn worker(&self) -> Arc<Worker> {
        Arc::clone(&self.worker)
    }

    /// Start `worker_concurrency` workers on the work queue.
    pub fn spawn_workers(&self) -> WorkerPool {
        WorkerPool::spawn(
            self.config.worker_concurrency,
            Arc::clone(&self.queue),
            Arc::clone(&self.worker),
        )
    }

    pub fn spawn_scheduler(&self, max_cycles: Option<u64>) -> Scheduler {
        Scheduler::spawn(
            Arc::clone(&self.dispatcher),
            self.config.schedule_interval(),
            max_cycles,
        )
    }

    /// Run one cycle, then run every queued item to completion with at most
    /// `worker_concurrency` tasks at a time.
    pub async fn run_cycle_and_drain(&self) -> Result<DrainReport, FinsyncError> {
        let cycle = self.dispatcher.run_cycle().await;

        let mut running: JoinSet<Result<TaskRunReport, FinsyncError>> = JoinSet::new();
        let mut tasks = Vec::new();
        let mut worker_errors = 0;

        loop {
            while running.len() < self.config.worker_concurrency {
                let Some(item) = self.queue.pop(Duration::ZERO).await? else {
                    break;
                };
                let worker = Arc::clone(&self.worker);
                running.spawn(async move { worker.run_task(&item.seller).await });
            }

            let Some(done) = running.join_next().await else {
                break;
            };
            match done {
                Ok(Ok(report)) => tasks.push(report),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "task store failure while draining");
                    worker_errors += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "worker panicked while draining");
                    worker_errors += 1;
                }
            }
        }

        Ok(DrainReport {
            cycle,
            tasks,
            worker_errors,
        })
    }
}
