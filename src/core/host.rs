//! Sandbox host.
//!
//! The thread that starts a [`SandboxHost`] becomes the supervisor of its
//! accountant and is bound to it until shutdown, so neither the accountant's
//! methods nor the free `record_*` functions ever meter it. Units run either on a pool of named worker threads fed by a
//! `crossbeam-channel` queue ([`SandboxHost::submit`]) or on a fresh thread
//! per unit ([`SandboxHost::run_dedicated`]).
//!
//! Reset protocol: a pooled worker zeroes its ledger and tags it with the
//! unit id before every unit, so cost never carries over between units that
//! share a thread. A dedicated thread starts with a fresh ledger anyway.

use crate::config::types::{AccountingError, CostLimits, Result, UnitStatus};
use crate::core::accountant::CostAccountant;
use crate::core::ledger::{self, CostLedger};
use crate::core::supervisor::ThreadKey;
use crate::core::termination::Termination;
use crate::core::types::{UnitOutcome, UnitReport};
use crate::observability::{audit, metrics};
use crate::verdict::VerdictClassifier;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use uuid::Uuid;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Host construction parameters
#[derive(Clone, Debug)]
pub struct HostConfig {
    pub limits: CostLimits,
    pub workers: usize,
    pub thread_name_prefix: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            limits: CostLimits::default(),
            workers: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            thread_name_prefix: "costbox-worker".to_string(),
        }
    }
}

pub struct SandboxHost {
    accountant: Arc<CostAccountant>,
    config: HostConfig,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    dedicated_seq: AtomicU64,
    supervisor: ThreadKey,
    /// Binding the supervisor thread had before this host took it over
    displaced: Option<Arc<CostAccountant>>,
}

impl SandboxHost {
    /// Start a host whose supervisor is the calling thread.
    pub fn start(config: HostConfig) -> Result<Self> {
        if config.workers == 0 {
            return Err(AccountingError::Config(
                "sandbox host needs at least one worker".to_string(),
            ));
        }

        let supervisor = ThreadKey::current();
        let accountant = Arc::new(CostAccountant::with_supervisor(config.limits, supervisor));
        let displaced = accountant.bind_current_thread();

        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let mut host = Self {
            accountant,
            config,
            sender: Some(sender),
            workers: Vec::new(),
            dedicated_seq: AtomicU64::new(0),
            supervisor,
            displaced,
        };

        for index in 0..host.config.workers {
            let name = format!("{}-{}", host.config.thread_name_prefix, index);
            let receiver = receiver.clone();
            let accountant = Arc::clone(&host.accountant);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(accountant, receiver))
                .map_err(|e| AccountingError::WorkerSpawn(format!("{}: {}", name, e)))?;
            host.workers.push(handle);
        }

        log::info!(
            "Sandbox host started: {} workers, envelope {}",
            host.workers.len(),
            host.accountant.envelope_id()
        );
        Ok(host)
    }

    pub fn with_limits(limits: CostLimits, workers: usize) -> Result<Self> {
        Self::start(HostConfig {
            limits,
            workers,
            ..HostConfig::default()
        })
    }

    pub fn accountant(&self) -> &Arc<CostAccountant> {
        &self.accountant
    }

    pub fn limits(&self) -> &CostLimits {
        self.accountant.limits()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue `unit` on the worker pool.
    pub fn submit<T, F>(&self, unit: F) -> Result<UnitHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(AccountingError::HostShutdown)?;
        let unit_id = Uuid::new_v4();
        let (report_tx, report_rx) = crossbeam_channel::bounded(1);
        let accountant = Arc::clone(&self.accountant);

        let job: Job = Box::new(move || {
            let report = execute_pooled(&accountant, unit_id, unit);
            let _ = report_tx.send(report);
        });
        sender
            .send(job)
            .map_err(|_| AccountingError::HostShutdown)?;

        Ok(UnitHandle {
            unit_id,
            receiver: report_rx,
        })
    }

    /// Run `unit` on a thread of its own and join it. A budget violation
    /// kills that thread; the join observes the termination payload.
    pub fn run_dedicated<T, F>(&self, unit: F) -> Result<UnitReport<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.sender.is_none() {
            return Err(AccountingError::HostShutdown);
        }

        let unit_id = Uuid::new_v4();
        let seq = self.dedicated_seq.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-dedicated-{}", self.config.thread_name_prefix, seq);
        let run = UnitRun::begin(unit_id, name.clone(), &self.accountant);

        let (ledger_tx, ledger_rx) = crossbeam_channel::bounded(1);
        let accountant = Arc::clone(&self.accountant);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                accountant.bind_current_thread();
                ledger::begin_unit(unit_id);
                let _reporter = LedgerReporter { sender: ledger_tx };
                unit()
            })
            .map_err(|e| AccountingError::WorkerSpawn(format!("{}: {}", name, e)))?;

        let joined = handle.join();
        let ledger = ledger_rx.recv().unwrap_or_default();
        Ok(run.finish(&self.accountant, joined, ledger))
    }

    /// Close the queue and join every worker. Queued units still run.
    /// On the supervisor thread this also releases its binding.
    pub fn shutdown(&mut self) {
        let Some(sender) = self.sender.take() else {
            return;
        };
        drop(sender);

        if ThreadKey::current() == self.supervisor {
            self.accountant.release_current_thread(self.displaced.take());
        }

        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("<unnamed>").to_string();
            if handle.join().is_err() {
                log::warn!("Worker {} exited abnormally", name);
            }
        }
        log::info!("Sandbox host stopped");
    }
}

impl Drop for SandboxHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Pending report of a queued unit
pub struct UnitHandle<T> {
    unit_id: Uuid,
    receiver: Receiver<UnitReport<T>>,
}

impl<T> UnitHandle<T> {
    pub fn unit_id(&self) -> Uuid {
        self.unit_id
    }

    /// Block until the unit's report arrives.
    pub fn wait(self) -> Result<UnitReport<T>> {
        self.receiver
            .recv()
            .map_err(|_| AccountingError::HostShutdown)
    }

    pub fn try_wait(&self) -> Option<UnitReport<T>> {
        self.receiver.try_recv().ok()
    }
}

fn worker_loop(accountant: Arc<CostAccountant>, receiver: Receiver<Job>) {
    accountant.bind_current_thread();
    log::debug!("Worker {} ready", current_thread_name());

    for job in receiver.iter() {
        job();
    }

    CostAccountant::unbind_current_thread();
    log::debug!("Worker {} draining complete", current_thread_name());
}

fn execute_pooled<T, F>(accountant: &CostAccountant, unit_id: Uuid, unit: F) -> UnitReport<T>
where
    F: FnOnce() -> T,
{
    let run = UnitRun::begin(unit_id, current_thread_name(), accountant);
    ledger::begin_unit(unit_id);

    let result = panic::catch_unwind(AssertUnwindSafe(unit));
    let ledger = ledger::current();
    ledger::clear();

    run.finish(accountant, result, ledger)
}

/// Sends the dying thread's ledger to the joiner, also while unwinding.
struct LedgerReporter {
    sender: Sender<CostLedger>,
}

impl Drop for LedgerReporter {
    fn drop(&mut self) {
        let _ = self.sender.send(ledger::current());
    }
}

struct UnitRun {
    unit_id: Uuid,
    worker: String,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl UnitRun {
    fn begin(unit_id: Uuid, worker: String, accountant: &CostAccountant) -> Self {
        metrics::global().record_unit_started();
        audit::events::unit_start(unit_id, &worker, accountant.envelope_id());
        Self {
            unit_id,
            worker,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    fn finish<T>(
        self,
        accountant: &CostAccountant,
        result: thread::Result<T>,
        ledger: CostLedger,
    ) -> UnitReport<T> {
        let wall_time_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let report = UnitReport {
            unit_id: self.unit_id,
            worker: self.worker,
            outcome: resolve_outcome(result, ledger.violation()),
            ledger: ledger.snapshot(),
            limits: *accountant.limits(),
            envelope_id: accountant.envelope_id().to_string(),
            started_at: self.started_at,
            wall_time_ms,
        };

        let (status, provenance) = VerdictClassifier::classify(&report);
        metrics::global().record_unit_end(status, wall_time_ms);
        if status == UnitStatus::InternalError {
            log::warn!(
                "Unit {} produced contradictory evidence: {:?}",
                report.unit_id,
                provenance.detail
            );
        }
        audit::events::unit_end(report.unit_id, status, provenance);
        report
    }
}

/// A dead ledger decides the outcome: a unit that swallowed its
/// termination and returned normally is still terminated.
fn resolve_outcome<T>(result: thread::Result<T>, violation: Option<Termination>) -> UnitOutcome<T> {
    if let Some(termination) = violation {
        return UnitOutcome::Terminated(termination);
    }
    match result {
        Ok(value) => UnitOutcome::Completed(value),
        Err(payload) => match Termination::from_payload(&*payload) {
            Some(termination) => UnitOutcome::Terminated(termination),
            None => UnitOutcome::Panicked(panic_message(&*payload)),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn current_thread_name() -> String {
    thread::current().name().unwrap_or("<unnamed>").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::CostLane;
    use crate::core::accountant;

    fn small_host(workers: usize) -> SandboxHost {
        SandboxHost::with_limits(CostLimits::default(), workers).unwrap()
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = SandboxHost::with_limits(CostLimits::default(), 0).err().unwrap();
        assert!(matches!(err, AccountingError::Config(_)));
    }

    #[test]
    fn completed_unit_reports_value_and_ledger() {
        let host = small_host(1);
        let report = host
            .submit(|| {
                for _ in 0..3 {
                    accountant::record_jump();
                }
                accountant::record_method_call();
                7
            })
            .unwrap()
            .wait()
            .unwrap();

        assert_eq!(report.outcome, UnitOutcome::Completed(7));
        assert_eq!(report.ledger.jump, 3);
        assert_eq!(report.ledger.invocation, 1);
        assert_eq!(report.worker, "costbox-worker-0");
        assert_eq!(report.envelope_id, CostLimits::default().envelope_id());
    }

    #[test]
    fn supervisor_thread_is_exempt_while_host_runs() {
        let host = small_host(1);
        for _ in 0..1_000 {
            host.accountant().record_jump();
        }
        assert_eq!(host.accountant().get_jump_cost(), 0);
    }

    #[test]
    fn supervisor_binding_is_released_on_shutdown() {
        thread::spawn(|| {
            let mut host = small_host(1);
            for _ in 0..1_000 {
                accountant::record_jump();
            }
            assert_eq!(accountant::get_jump_cost(), 0);

            host.shutdown();
            for _ in 0..100 {
                accountant::record_jump();
            }
            assert_eq!(accountant::get_jump_cost(), 100);
            accountant::reset_counters();
        })
        .join()
        .unwrap();
    }

    #[test]
    fn ordinary_panic_is_reported_as_panicked() {
        let host = small_host(1);
        let report = host
            .submit(|| -> u32 { panic!("unit bug") })
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(report.outcome, UnitOutcome::Panicked("unit bug".to_string()));
    }

    #[test]
    fn dedicated_thread_death_is_observed_as_termination() {
        let host = small_host(1);
        let report = host
            .run_dedicated(|| {
                for _ in 0..1_000 {
                    accountant::record_jump();
                }
            })
            .unwrap();
        let termination = report.outcome.termination().unwrap();
        assert_eq!(termination.lane(), CostLane::Jump);
        assert_eq!(report.ledger.jump, 101);
        assert!(report.worker.starts_with("costbox-worker-dedicated-"));
    }

    #[test]
    fn submit_after_shutdown_fails() {
        let mut host = small_host(2);
        host.shutdown();
        assert!(matches!(host.submit(|| ()), Err(AccountingError::HostShutdown)));
        assert!(matches!(host.run_dedicated(|| ()), Err(AccountingError::HostShutdown)));
    }

    #[test]
    fn swallowed_termination_still_counts() {
        let host = small_host(1);
        let report = host
            .submit(|| {
                let caught = panic::catch_unwind(|| {
                    for _ in 0..1_000 {
                        accountant::record_throw();
                    }
                });
                assert!(caught.is_err());
                "escaped"
            })
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(report.outcome.termination().map(|t| t.lane()), Some(CostLane::Throw));
    }
}
