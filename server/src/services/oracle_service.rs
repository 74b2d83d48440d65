//! Simulated oracle fleet: registers oracle identities with the contract and
//! answers `OracleRequest` events on behalf of every oracle holding the
//! requested index.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::{join_all, select_all};
use futures_util::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::ledger::{
    EventChannel, EventHandler, EventSource, LedgerClient, LedgerError, TxHash, Wei,
};
use crate::models::{Address, LedgerEvent, Oracle, RequestEvent, ResponseSubmission, StatusCode};
use crate::services::metrics::CoordinatorMetrics;
use crate::services::oracle_pool::OraclePool;

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Upper bound on identities registered by [`OracleCoordinator::register_oracles`].
    pub max_oracles: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Unstarted,
    Registering,
    Listening,
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("could not prepare oracle registration: {0}")]
    Bootstrap(#[source] LedgerError),

    #[error("could not subscribe to {channel}: {source}")]
    Subscribe {
        channel: EventChannel,
        #[source]
        source: LedgerError,
    },

    #[error("{channel} subscription lost: {source}")]
    SubscriptionLost {
        channel: EventChannel,
        #[source]
        source: LedgerError,
    },
}

#[derive(Debug, Clone)]
pub struct RegistrationFailure {
    pub address: Address,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct RegistrationReport {
    pub registered: Vec<Oracle>,
    pub failed: Vec<RegistrationFailure>,
}

/// Result of one oracle's response to one request.
#[derive(Debug)]
pub struct SubmissionOutcome {
    pub oracle: Address,
    pub status_code: StatusCode,
    pub result: Result<TxHash, LedgerError>,
}

pub struct OracleCoordinator {
    ledger: Arc<dyn LedgerClient>,
    events: Arc<dyn EventSource>,
    pool: OraclePool,
    settings: CoordinatorSettings,
    state: watch::Sender<CoordinatorState>,
    metrics: Arc<CoordinatorMetrics>,
}

impl OracleCoordinator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        events: Arc<dyn EventSource>,
        pool: OraclePool,
        settings: CoordinatorSettings,
    ) -> Self {
        let (state, _) = watch::channel(CoordinatorState::Unstarted);
        Self {
            ledger,
            events,
            pool,
            settings,
            state,
            metrics: Arc::new(CoordinatorMetrics::default()),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.borrow()
    }

    pub fn pool(&self) -> &OraclePool {
        &self.pool
    }

    pub fn metrics(&self) -> Arc<CoordinatorMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Fetch the node's accounts and the registration fee, then register them.
    ///
    /// A failed query leaves the pool untouched.
    pub async fn bootstrap(&mut self) -> Result<RegistrationReport, CoordinatorError> {
        self.state.send_replace(CoordinatorState::Registering);

        let accounts = self.ledger.accounts().await.map_err(|err| {
            error!(error = %err, "could not list node accounts");
            CoordinatorError::Bootstrap(err)
        })?;
        let fee = self.ledger.registration_fee().await.map_err(|err| {
            error!(error = %err, "could not fetch registration fee");
            CoordinatorError::Bootstrap(err)
        })?;

        info!(fee = %fee, candidates = accounts.len(), "registering oracles");
        Ok(self.register_oracles(&accounts, fee).await)
    }

    /// Register up to `max_oracles` identities concurrently, each paying `fee`.
    ///
    /// Failures are logged and skipped.
    pub async fn register_oracles(&mut self, identities: &[Address], fee: Wei) -> RegistrationReport {
        self.state.send_replace(CoordinatorState::Registering);

        let identities = &identities[..identities.len().min(self.settings.max_oracles)];
        let ledger = &self.ledger;
        let results = join_all(identities.iter().map(|identity| async move {
            (*identity, ledger.register_oracle(*identity, fee).await)
        }))
        .await;

        let mut report = RegistrationReport::default();
        for (address, result) in results {
            let inserted = result
                .map_err(|err| err.to_string())
                .and_then(|indexes| {
                    self.pool
                        .insert(address, indexes)
                        .map(|()| indexes)
                        .map_err(|err| err.to_string())
                });

            match inserted {
                Ok(indexes) => {
                    info!(oracle = %address, %indexes, "oracle registered");
                    self.metrics.record_registration(true);
                    report.registered.push(Oracle { address, indexes });
                }
                Err(reason) => {
                    warn!(oracle = %address, error = %reason, "oracle registration failed; skipping");
                    self.metrics.record_registration(false);
                    report.failed.push(RegistrationFailure { address, reason });
                }
            }
        }

        info!(
            registered = report.registered.len(),
            failed = report.failed.len(),
            pool_size = self.pool.len(),
            "oracle registration finished"
        );
        report
    }

    /// Answer `event` from every pooled oracle holding its index.
    ///
    /// Each qualifying oracle submits exactly once with its own random status.
    /// Submissions run concurrently; failures are logged, counted and returned,
    /// never retried.
    pub async fn on_request_event(&self, event: RequestEvent) -> Vec<SubmissionOutcome> {
        let submissions: Vec<ResponseSubmission> = {
            let mut rng = rand::thread_rng();
            self.pool
                .holders(event.index)
                .map(|oracle| {
                    ResponseSubmission::answer(&event, oracle.address, StatusCode::random(&mut rng))
                })
                .collect()
        };

        self.metrics.record_request(!submissions.is_empty());
        if submissions.is_empty() {
            debug!(index = event.index, flight = %event.flight, "no oracle holds requested index");
            return Vec::new();
        }

        info!(
            index = event.index,
            airline = %event.airline,
            flight = %event.flight,
            timestamp = event.timestamp,
            responders = submissions.len(),
            "answering oracle request"
        );

        let mut tasks = JoinSet::new();
        for submission in submissions {
            let ledger = Arc::clone(&self.ledger);
            tasks.spawn(async move {
                let result = AssertUnwindSafe(ledger.submit_oracle_response(&submission))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(LedgerError::Panicked(panic_message(&*panic))));
                SubmissionOutcome {
                    oracle: submission.oracle,
                    status_code: submission.status_code,
                    result,
                }
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    self.record_outcome(&event, &outcome);
                    outcomes.push(outcome);
                }
                Err(join_error) => {
                    error!(error = %join_error, "submission task cancelled");
                }
            }
        }
        outcomes
    }

    fn record_outcome(&self, event: &RequestEvent, outcome: &SubmissionOutcome) {
        self.metrics
            .record_submission(outcome.status_code, outcome.result.is_ok());

        match &outcome.result {
            Ok(tx_hash) => debug!(
                oracle = %outcome.oracle,
                index = event.index,
                flight = %event.flight,
                status = %outcome.status_code,
                tx_hash = %tx_hash,
                "oracle response submitted"
            ),
            Err(err) => warn!(
                oracle = %outcome.oracle,
                index = event.index,
                flight = %event.flight,
                status = %outcome.status_code,
                error = %err,
                "oracle response rejected"
            ),
        }
    }

    /// Subscribe to the contract's events and answer requests until `shutdown`
    /// resolves or a subscription is lost.
    ///
    /// Subscriptions are released before returning either way.
    pub async fn listen<F>(self: Arc<Self>, shutdown: F) -> Result<(), CoordinatorError>
    where
        F: Future<Output = ()> + Send,
    {
        self.state.send_replace(CoordinatorState::Listening);
        info!(oracles = self.pool.len(), "listening for oracle requests");

        let mut subscriptions = Vec::with_capacity(EventChannel::ALL.len());
        for channel in EventChannel::ALL {
            let subscription = self
                .events
                .subscribe(channel, self.event_handler())
                .await
                .map_err(|source| {
                    error!(%channel, error = %source, "could not subscribe to contract events");
                    CoordinatorError::Subscribe { channel, source }
                })?;
            subscriptions.push(subscription);
        }

        let lost = select_all(subscriptions.iter_mut().map(|subscription| {
            Box::pin(async move {
                let channel = subscription.channel();
                (channel, subscription.closed().await)
            })
        }));

        let result = tokio::select! {
            _ = shutdown => {
                info!("shutdown requested; releasing subscriptions");
                Ok(())
            }
            ((channel, closed), _, _) = lost => {
                let source = closed
                    .err()
                    .unwrap_or_else(|| LedgerError::Transport(format!("{channel} stream ended")));
                error!(
                    %channel,
                    error = %source,
                    "event subscription lost; oracle responses stopped until restart"
                );
                Err(CoordinatorError::SubscriptionLost { channel, source })
            }
        };

        for subscription in subscriptions {
            subscription.cancel().await;
        }
        result
    }

    fn event_handler(self: &Arc<Self>) -> EventHandler {
        let coordinator = Arc::clone(self);
        Arc::new(move |event: LedgerEvent| match event {
            LedgerEvent::OracleRequest(request) => {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move {
                    coordinator.on_request_event(request).await;
                });
            }
            LedgerEvent::FlightStatusInfo(status) => info!(
                airline = %status.airline,
                flight = %status.flight,
                timestamp = status.timestamp,
                status = status.status,
                "flight status decided"
            ),
            LedgerEvent::OracleReport(report) => info!(
                airline = %report.airline,
                flight = %report.flight,
                timestamp = report.timestamp,
                status = report.status,
                "oracle report accepted"
            ),
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
