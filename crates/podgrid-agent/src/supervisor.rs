//! Host supervisor — drives one host toward its wanted suspend/resume
//! state and keeps its container set in sync with the node repository.
//!
//! One background worker per host. Each tick the worker converges the
//! host one gated step at a time along the state chain (resume and
//! suspend both need orchestrator permission, suspension needs the
//! node-admin subsystem frozen first) and then refreshes the wanted
//! container set. Transient failures are logged and retried on the next
//! tick; only [`HostSupervisor::stop`] ends the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use podgrid_core::NodeState;

use crate::driver::NodeAdminDriver;
use crate::error::{AgentError, AgentResult, ConvergenceError, RepositoryError};
use crate::orchestrator::Orchestrator;
use crate::repository::NodeRepository;

/// How long a freeze may fail to converge before ticks are forced
/// unfrozen again, so the host agents do not stall behind a suspension
/// that never gets permission.
const FREEZE_CONVERGENCE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How long `stop` waits for the worker to finish its current tick.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Suspend/resume state of a host.
///
/// Transitions move one step at a time along `Resumed`,
/// `SuspendedNodeAdmin`, `Suspended`; a resumed host reaches `Suspended`
/// through `SuspendedNodeAdmin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostState {
    /// Containers run and mutate freely.
    Resumed,
    /// The node-admin subsystem is frozen and the orchestrator has
    /// granted suspension of the host and its containers.
    SuspendedNodeAdmin,
    /// Per-container agent services are stopped as well.
    Suspended,
}

/// Snapshot returned by [`HostSupervisor::debug_view`].
#[derive(Debug, Clone, Serialize)]
pub struct DebugView {
    pub host_hostname: String,
    pub node_admin: serde_json::Value,
    pub wanted_state: HostState,
    pub current_state: HostState,
}

/// Mutable loop state, guarded by the supervisor's single lock.
struct LoopState {
    wanted: HostState,
    current: HostState,
    work_pending: bool,
    last_tick: Instant,
    tick_interval: Duration,
}

struct Inner {
    host_hostname: String,
    repository: Arc<dyn NodeRepository>,
    orchestrator: Arc<dyn Orchestrator>,
    driver: Arc<dyn NodeAdminDriver>,
    state: Mutex<LoopState>,
    wake: Notify,
    terminated: AtomicBool,
}

/// Supervises one host's convergence loop.
pub struct HostSupervisor {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HostSupervisor {
    pub fn new(
        host_hostname: impl Into<String>,
        repository: Arc<dyn NodeRepository>,
        orchestrator: Arc<dyn Orchestrator>,
        driver: Arc<dyn NodeAdminDriver>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                host_hostname: host_hostname.into(),
                repository,
                orchestrator,
                driver,
                state: Mutex::new(LoopState {
                    wanted: HostState::Resumed,
                    current: HostState::SuspendedNodeAdmin,
                    work_pending: true,
                    last_tick: Instant::now(),
                    tick_interval: podgrid_core::DEFAULT_TICK_INTERVAL,
                }),
                wake: Notify::new(),
                terminated: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Begin the periodic convergence loop. Fails if already started;
    /// a stopped supervisor cannot be restarted.
    pub async fn start(&self, tick_interval: Duration) -> AgentResult<()> {
        let mut worker = self.worker.lock().await;
        if worker.is_some() || self.inner.terminated.load(Ordering::SeqCst) {
            return Err(AgentError::AlreadyStarted);
        }

        self.inner.state.lock().await.tick_interval = tick_interval;

        let inner = Arc::clone(&self.inner);
        *worker = Some(tokio::spawn(async move {
            while !inner.terminated.load(Ordering::SeqCst) {
                inner.tick().await;
            }
        }));

        info!(
            host = %self.inner.host_hostname,
            interval = ?tick_interval,
            "host supervisor started"
        );
        Ok(())
    }

    /// Stop the loop and shut the node-admin driver down. Fails on the
    /// second call.
    pub async fn stop(&self) -> AgentResult<()> {
        if self.inner.terminated.swap(true, Ordering::SeqCst) {
            return Err(AgentError::AlreadyStopped);
        }
        self.inner.signal_work().await;

        let worker = self.worker.lock().await.take();
        if let Some(handle) = worker {
            match tokio::time::timeout(STOP_JOIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(join_error)) => {
                    error!(host = %self.inner.host_hostname, error = %join_error,
                        "supervisor worker failed");
                }
                Err(_) => {
                    error!(host = %self.inner.host_hostname,
                        "supervisor worker did not stop in time");
                }
            }
        }

        self.inner.driver.shutdown().await;
        info!(host = %self.inner.host_hostname, "host supervisor stopped");
        Ok(())
    }

    /// Record the wanted state and wake the worker if it changed.
    ///
    /// Returns whether the host is already in the wanted state at call
    /// time; convergence itself happens on the worker's next tick.
    pub async fn set_wanted_state(&self, wanted: HostState) -> bool {
        let mut state = self.inner.state.lock().await;
        if state.wanted != wanted {
            state.wanted = wanted;
            state.work_pending = true;
            self.inner.wake.notify_one();
        }
        state.current == wanted
    }

    /// Consistent snapshot of the supervisor and driver state.
    pub async fn debug_view(&self) -> DebugView {
        let state = self.inner.state.lock().await;
        DebugView {
            host_hostname: self.inner.host_hostname.clone(),
            node_admin: self.inner.driver.debug_info(),
            wanted_state: state.wanted,
            current_state: state.current,
        }
    }
}

impl Inner {
    async fn signal_work(&self) {
        let mut state = self.state.lock().await;
        if !state.work_pending {
            state.work_pending = true;
            self.wake.notify_one();
        }
    }

    /// One pass of the convergence loop: wait, converge, refresh.
    async fn tick(&self) {
        let target = self.await_work().await;

        if let Some(target) = target {
            let converged = match self.converge(target).await {
                Ok(()) => true,
                Err(error @ ConvergenceError::Denied(_)) => {
                    info!(wanted = ?target, "no permission to converge, will retry shortly: {error}");
                    false
                }
                Err(error @ ConvergenceError::NotYetFrozen(_)) => {
                    info!("{error}");
                    false
                }
                Err(error) => {
                    error!(wanted = ?target, error = %error, "error while trying to converge");
                    false
                }
            };

            if target != HostState::Resumed
                && !converged
                && self.driver.subsystem_freeze_duration() > FREEZE_CONVERGENCE_TIMEOUT
            {
                // The freeze has been pending for too long; run unfrozen
                // ticks again so the host agents do not stall.
                info!("timed out trying to freeze, will force unfrozen ticks");
                self.driver.set_frozen(false).await;
            }
        }

        // Refresh even when a suspension is pending: permission to
        // suspend can take a long time to arrive.
        self.fetch_containers_to_run().await;
    }

    /// Block until work is signalled or the tick interval elapses, then
    /// snapshot the convergence target for this tick (none when current
    /// already matches wanted).
    async fn await_work(&self) -> Option<HostState> {
        let mut state = self.state.lock().await;
        loop {
            if state.work_pending || self.terminated.load(Ordering::SeqCst) {
                break;
            }
            let elapsed = state.last_tick.elapsed();
            if elapsed >= state.tick_interval {
                break;
            }
            let remaining = state.tick_interval - elapsed;
            drop(state);
            // A wakeup without work pending re-enters the wait.
            let _ = tokio::time::timeout(remaining, self.wake.notified()).await;
            state = self.state.lock().await;
        }
        state.last_tick = Instant::now();
        state.work_pending = false;

        (state.current != state.wanted).then_some(state.wanted)
    }

    /// Attempt one convergence pass toward `target`.
    ///
    /// Walks the state chain monotonically within a single call: a
    /// resumed host headed for `Suspended` passes through
    /// `SuspendedNodeAdmin` on the way, each step gated on its
    /// precondition.
    async fn converge(&self, target: HostState) -> Result<(), ConvergenceError> {
        let want_frozen = target != HostState::Resumed;
        if !self.driver.set_frozen(want_frozen).await {
            return Err(ConvergenceError::NotYetFrozen(if want_frozen {
                "frozen"
            } else {
                "unfrozen"
            }));
        }

        if target == HostState::Resumed {
            self.orchestrator.resume(&self.host_hostname).await?;
            self.set_current(HostState::Resumed).await;
            return Ok(());
        }

        // Only active nodes can be suspended, so their hostnames are
        // fetched up front. The subsystem is frozen at this point: the
        // repository may be read, but the data must not reach the driver.
        let active = self.active_hostnames().await?;

        if self.current_state().await == HostState::Resumed {
            // The host's own hostname suspends the node admin itself.
            let mut to_suspend = active.clone();
            to_suspend.push(self.host_hostname.clone());
            self.orchestrator
                .suspend(&self.host_hostname, &to_suspend)
                .await?;
            self.set_current(HostState::SuspendedNodeAdmin).await;
            if target == HostState::SuspendedNodeAdmin {
                return Ok(());
            }
        }

        self.driver.stop_services(&active).await;
        self.set_current(HostState::Suspended).await;
        Ok(())
    }

    /// Push the node repository's wanted container set into the driver.
    ///
    /// Holds the state lock across the repository call so `debug_view`
    /// sees a consistent picture; debug reads queue behind the refresh.
    async fn fetch_containers_to_run(&self) {
        let state = self.state.lock().await;
        if state.current != HostState::Resumed {
            info!("frozen, skipping container refresh from node repository");
            return;
        }

        let containers = match self.repository.containers_to_run().await {
            Ok(containers) => containers,
            Err(error) => {
                warn!(error = %error, "failed fetching containers to run from node repository");
                return;
            }
        };
        if let Err(error) = self.driver.refresh_containers_to_run(containers).await {
            warn!(error = %error, "failed refreshing node admin");
        }
    }

    async fn active_hostnames(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(self
            .repository
            .containers_to_run()
            .await?
            .into_iter()
            .filter(|spec| spec.node_state == NodeState::Active)
            .map(|spec| spec.hostname)
            .collect())
    }

    async fn current_state(&self) -> HostState {
        self.state.lock().await.current
    }

    async fn set_current(&self, current: HostState) {
        self.state.lock().await.current = current;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use podgrid_core::ContainerSpec;

    use super::*;
    use crate::error::OrchestratorError;

    const HOST: &str = "dockerhost1.example.com";

    #[derive(Default)]
    struct FakeRepository {
        containers: StdMutex<Vec<ContainerSpec>>,
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NodeRepository for FakeRepository {
        async fn containers_to_run(&self) -> Result<Vec<ContainerSpec>, RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(RepositoryError("connection refused".to_string()));
            }
            Ok(self.containers.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct FakeOrchestrator {
        deny_resume: AtomicBool,
        deny_suspend: AtomicBool,
        resumes: StdMutex<Vec<String>>,
        suspends: StdMutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl Orchestrator for FakeOrchestrator {
        async fn resume(&self, hostname: &str) -> Result<(), OrchestratorError> {
            if self.deny_resume.load(Ordering::SeqCst) {
                return Err(OrchestratorError::Denied {
                    operation: "resume",
                    hostname: hostname.to_string(),
                    reason: "host is allowed to be down".to_string(),
                });
            }
            self.resumes.lock().unwrap().push(hostname.to_string());
            Ok(())
        }

        async fn suspend(
            &self,
            hostname: &str,
            hostnames: &[String],
        ) -> Result<(), OrchestratorError> {
            if self.deny_suspend.load(Ordering::SeqCst) {
                return Err(OrchestratorError::Denied {
                    operation: "suspend",
                    hostname: hostname.to_string(),
                    reason: "would break cluster redundancy".to_string(),
                });
            }
            self.suspends
                .lock()
                .unwrap()
                .push((hostname.to_string(), hostnames.to_vec()));
            Ok(())
        }
    }

    struct FakeDriver {
        freeze_succeeds: AtomicBool,
        freeze_duration: StdMutex<Duration>,
        frozen_calls: StdMutex<Vec<bool>>,
        refresh_fails: AtomicBool,
        refreshes: StdMutex<Vec<Vec<ContainerSpec>>>,
        stopped: StdMutex<Vec<Vec<String>>>,
        shutdowns: AtomicUsize,
    }

    impl Default for FakeDriver {
        fn default() -> Self {
            Self {
                freeze_succeeds: AtomicBool::new(true),
                freeze_duration: StdMutex::new(Duration::ZERO),
                frozen_calls: StdMutex::new(Vec::new()),
                refresh_fails: AtomicBool::new(false),
                refreshes: StdMutex::new(Vec::new()),
                stopped: StdMutex::new(Vec::new()),
                shutdowns: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NodeAdminDriver for FakeDriver {
        async fn set_frozen(&self, frozen: bool) -> bool {
            self.frozen_calls.lock().unwrap().push(frozen);
            self.freeze_succeeds.load(Ordering::SeqCst)
        }

        fn subsystem_freeze_duration(&self) -> Duration {
            *self.freeze_duration.lock().unwrap()
        }

        async fn refresh_containers_to_run(
            &self,
            containers: Vec<ContainerSpec>,
        ) -> anyhow::Result<()> {
            self.refreshes.lock().unwrap().push(containers);
            if self.refresh_fails.load(Ordering::SeqCst) {
                anyhow::bail!("node admin rejected the refresh");
            }
            Ok(())
        }

        async fn stop_services(&self, hostnames: &[String]) {
            self.stopped.lock().unwrap().push(hostnames.to_vec());
        }

        fn debug_info(&self) -> serde_json::Value {
            serde_json::json!({ "numberOfContainers": 2 })
        }

        async fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        supervisor: HostSupervisor,
        repository: Arc<FakeRepository>,
        orchestrator: Arc<FakeOrchestrator>,
        driver: Arc<FakeDriver>,
    }

    fn harness() -> Harness {
        let repository = Arc::new(FakeRepository::default());
        let orchestrator = Arc::new(FakeOrchestrator::default());
        let driver = Arc::new(FakeDriver::default());
        let supervisor = HostSupervisor::new(
            HOST,
            repository.clone(),
            orchestrator.clone(),
            driver.clone(),
        );
        Harness {
            supervisor,
            repository,
            orchestrator,
            driver,
        }
    }

    fn containers() -> Vec<ContainerSpec> {
        vec![
            ContainerSpec::new("container1.example.com", NodeState::Active),
            ContainerSpec::new("container2.example.com", NodeState::Inactive),
        ]
    }

    impl Harness {
        /// Run one tick as the worker would, without waiting out the
        /// tick interval.
        async fn tick(&self) {
            self.supervisor.inner.signal_work().await;
            self.supervisor.inner.tick().await;
        }

        async fn set_current(&self, current: HostState) {
            self.supervisor.inner.state.lock().await.current = current;
        }

        async fn current(&self) -> HostState {
            self.supervisor.inner.current_state().await
        }
    }

    #[tokio::test]
    async fn first_tick_resumes_from_the_initial_state() {
        let h = harness();
        *h.repository.containers.lock().unwrap() = containers();

        assert_eq!(h.current().await, HostState::SuspendedNodeAdmin);
        assert!(!h.supervisor.set_wanted_state(HostState::Resumed).await);

        h.tick().await;

        assert_eq!(h.current().await, HostState::Resumed);
        assert_eq!(*h.driver.frozen_calls.lock().unwrap(), vec![false]);
        assert_eq!(*h.orchestrator.resumes.lock().unwrap(), vec![HOST]);
        // The refresh runs in the same tick, with the full container set.
        assert_eq!(*h.driver.refreshes.lock().unwrap(), vec![containers()]);

        assert!(h.supervisor.set_wanted_state(HostState::Resumed).await);
    }

    #[tokio::test]
    async fn resume_denied_is_retried_next_tick() {
        let h = harness();
        h.orchestrator.deny_resume.store(true, Ordering::SeqCst);

        h.tick().await;
        assert_eq!(h.current().await, HostState::SuspendedNodeAdmin);

        h.orchestrator.deny_resume.store(false, Ordering::SeqCst);
        h.tick().await;
        assert_eq!(h.current().await, HostState::Resumed);
    }

    #[tokio::test]
    async fn suspend_denied_then_allowed() {
        let h = harness();
        *h.repository.containers.lock().unwrap() = containers();
        h.set_current(HostState::Resumed).await;
        h.orchestrator.deny_suspend.store(true, Ordering::SeqCst);

        h.supervisor.set_wanted_state(HostState::Suspended).await;
        h.tick().await;
        // Denied: no state change, and the refresh still happens.
        assert_eq!(h.current().await, HostState::Resumed);
        assert!(h.orchestrator.suspends.lock().unwrap().is_empty());
        assert_eq!(h.driver.refreshes.lock().unwrap().len(), 1);

        h.orchestrator.deny_suspend.store(false, Ordering::SeqCst);
        h.tick().await;
        assert_eq!(h.current().await, HostState::Suspended);

        // The suspension covered the active container and the host
        // itself; services were stopped for the active container only.
        let suspends = h.orchestrator.suspends.lock().unwrap();
        assert_eq!(suspends.len(), 1);
        assert_eq!(suspends[0].0, HOST);
        assert_eq!(
            suspends[0].1,
            vec!["container1.example.com".to_string(), HOST.to_string()]
        );
        assert_eq!(
            *h.driver.stopped.lock().unwrap(),
            vec![vec!["container1.example.com".to_string()]]
        );
    }

    #[tokio::test]
    async fn suspend_stops_at_node_admin_when_requested() {
        let h = harness();
        *h.repository.containers.lock().unwrap() = containers();
        h.set_current(HostState::Resumed).await;

        h.supervisor
            .set_wanted_state(HostState::SuspendedNodeAdmin)
            .await;
        h.tick().await;

        assert_eq!(h.current().await, HostState::SuspendedNodeAdmin);
        assert!(h.driver.stopped.lock().unwrap().is_empty());

        // Continuing to full suspension stops services without asking
        // the orchestrator again.
        h.supervisor.set_wanted_state(HostState::Suspended).await;
        h.tick().await;

        assert_eq!(h.current().await, HostState::Suspended);
        assert_eq!(h.orchestrator.suspends.lock().unwrap().len(), 1);
        assert_eq!(h.driver.stopped.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stuck_freeze_forces_unfrozen_ticks() {
        let h = harness();
        *h.repository.containers.lock().unwrap() = containers();
        h.set_current(HostState::Resumed).await;
        h.driver.freeze_succeeds.store(false, Ordering::SeqCst);
        *h.driver.freeze_duration.lock().unwrap() = Duration::from_secs(6 * 60);

        h.supervisor.set_wanted_state(HostState::Suspended).await;
        h.tick().await;

        // The convergence attempt asked for frozen; the escape hatch
        // forced unfrozen afterwards. State is unchanged and the host,
        // still resumed, keeps refreshing.
        assert_eq!(*h.driver.frozen_calls.lock().unwrap(), vec![true, false]);
        assert_eq!(h.current().await, HostState::Resumed);
        assert_eq!(h.driver.refreshes.lock().unwrap().len(), 1);

        // Below the timeout the escape hatch stays out of the way.
        *h.driver.freeze_duration.lock().unwrap() = Duration::from_secs(60);
        h.tick().await;
        assert_eq!(
            *h.driver.frozen_calls.lock().unwrap(),
            vec![true, false, true]
        );
    }

    #[tokio::test]
    async fn repository_failure_aborts_the_suspension_but_not_the_tick() {
        let h = harness();
        h.set_current(HostState::Resumed).await;
        h.repository.fail.store(true, Ordering::SeqCst);

        h.supervisor.set_wanted_state(HostState::Suspended).await;
        h.tick().await;

        assert_eq!(h.current().await, HostState::Resumed);
        assert!(h.orchestrator.suspends.lock().unwrap().is_empty());
        // One read for the suspension, one for the refresh; the refresh
        // failure is absorbed too.
        assert_eq!(h.repository.calls.load(Ordering::SeqCst), 2);
        assert!(h.driver.refreshes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_is_skipped_while_not_resumed() {
        let h = harness();
        h.supervisor
            .set_wanted_state(HostState::SuspendedNodeAdmin)
            .await;

        h.tick().await;

        assert_eq!(h.repository.calls.load(Ordering::SeqCst), 0);
        assert!(h.driver.refreshes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_failure_is_absorbed() {
        let h = harness();
        h.set_current(HostState::Resumed).await;
        h.driver.refresh_fails.store(true, Ordering::SeqCst);

        h.tick().await;
        h.tick().await;

        // Still trying every tick, still resumed.
        assert_eq!(h.driver.refreshes.lock().unwrap().len(), 2);
        assert_eq!(h.current().await, HostState::Resumed);
    }

    #[tokio::test]
    async fn debug_view_reports_both_states() {
        let h = harness();
        h.supervisor.set_wanted_state(HostState::Suspended).await;

        let view = h.supervisor.debug_view().await;
        assert_eq!(view.host_hostname, HOST);
        assert_eq!(view.wanted_state, HostState::Suspended);
        assert_eq!(view.current_state, HostState::SuspendedNodeAdmin);
        assert_eq!(view.node_admin["numberOfContainers"], 2);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["wanted_state"], "SUSPENDED");
        assert_eq!(json["current_state"], "SUSPENDED_NODE_ADMIN");
    }

    #[tokio::test]
    async fn stop_is_one_way_and_shuts_the_driver_down() {
        let h = harness();
        h.supervisor.start(Duration::from_millis(10)).await.unwrap();

        assert_eq!(
            h.supervisor.start(Duration::from_millis(10)).await,
            Err(AgentError::AlreadyStarted)
        );

        h.supervisor.stop().await.unwrap();
        assert_eq!(h.driver.shutdowns.load(Ordering::SeqCst), 1);

        assert_eq!(h.supervisor.stop().await, Err(AgentError::AlreadyStopped));
        assert_eq!(
            h.supervisor.start(Duration::from_millis(10)).await,
            Err(AgentError::AlreadyStarted)
        );
        assert_eq!(h.driver.shutdowns.load(Ordering::SeqCst), 1);
    }
}
