//! In-memory ledger used by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};

use flightsurety_server::ledger::{
    EventChannel, EventHandler, EventSource, LedgerClient, LedgerError, Subscription, TxHash, Wei,
};
use flightsurety_server::models::{Address, LedgerEvent, OracleIndexes, ResponseSubmission};

pub const FEE: Wei = 1_000_000_000_000_000_000;

pub fn address(n: u8) -> Address {
    let mut raw = [0u8; 20];
    raw[0] = 0xaa;
    raw[19] = n;
    Address(raw)
}

pub fn airline() -> Address {
    address(200)
}

#[derive(Default)]
pub struct MockLedger {
    pub accounts: Vec<Address>,
    pub accounts_unavailable: bool,
    pub fee_unavailable: bool,
    pub assignments: HashMap<Address, OracleIndexes>,
    pub rejected_submitters: HashSet<Address>,
    pub panicking_submitters: HashSet<Address>,
    /// Submissions for this flight wait until the receiver reads `true`.
    pub held_flight: Option<(String, watch::Receiver<bool>)>,
    pub waiting: AtomicUsize,
    pub registration_fees: Mutex<Vec<(Address, Wei)>>,
    pub submissions: Mutex<Vec<ResponseSubmission>>,
}

impl MockLedger {
    pub fn with_oracles(assignments: &[(Address, [u8; 3])]) -> Self {
        Self {
            accounts: assignments.iter().map(|(address, _)| *address).collect(),
            assignments: assignments
                .iter()
                .map(|(address, indexes)| (*address, OracleIndexes(*indexes)))
                .collect(),
            ..Self::default()
        }
    }

    /// Hold every submission for `flight` until the returned sender sends `true`.
    pub fn hold_flight(&mut self, flight: &str) -> watch::Sender<bool> {
        let (release, held) = watch::channel(false);
        self.held_flight = Some((flight.to_string(), held));
        release
    }

    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn submissions_for(&self, flight: &str) -> usize {
        self.submissions()
            .iter()
            .filter(|submission| submission.flight == flight)
            .count()
    }

    pub fn submissions(&self) -> Vec<ResponseSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submitters(&self) -> HashSet<Address> {
        self.submissions().iter().map(|s| s.oracle).collect()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn accounts(&self) -> Result<Vec<Address>, LedgerError> {
        if self.accounts_unavailable {
            return Err(LedgerError::Rpc {
                code: -32601,
                message: "method not found".into(),
            });
        }
        Ok(self.accounts.clone())
    }

    async fn registration_fee(&self) -> Result<Wei, LedgerError> {
        if self.fee_unavailable {
            return Err(LedgerError::Transport("connection refused".into()));
        }
        Ok(FEE)
    }

    async fn register_oracle(
        &self,
        identity: Address,
        fee: Wei,
    ) -> Result<OracleIndexes, LedgerError> {
        self.registration_fees.lock().unwrap().push((identity, fee));
        self.assignments
            .get(&identity)
            .copied()
            .ok_or_else(|| LedgerError::Rpc {
                code: -32000,
                message: "revert Registration fee is required".into(),
            })
    }

    async fn submit_oracle_response(
        &self,
        submission: &ResponseSubmission,
    ) -> Result<TxHash, LedgerError> {
        if let Some((flight, held)) = &self.held_flight {
            if submission.flight == *flight {
                let mut held = held.clone();
                self.waiting.fetch_add(1, Ordering::SeqCst);
                let _ = held.wait_for(|released| *released).await;
                self.waiting.fetch_sub(1, Ordering::SeqCst);
            }
        }
        if self.panicking_submitters.contains(&submission.oracle) {
            panic!("signer for {} unavailable", submission.oracle);
        }
        self.submissions.lock().unwrap().push(submission.clone());
        if self.rejected_submitters.contains(&submission.oracle) {
            return Err(LedgerError::Reverted {
                tx_hash: format!("0xrejected{}", submission.oracle),
            });
        }
        Ok(format!("0xaccepted{}", submission.oracle))
    }
}

/// Event source whose streams are driven from the test.
pub struct MockEvents {
    handlers: Mutex<HashMap<EventChannel, EventHandler>>,
    kill: watch::Sender<bool>,
    active: Arc<AtomicUsize>,
}

impl Default for MockEvents {
    fn default() -> Self {
        let (kill, _) = watch::channel(false);
        Self {
            handlers: Mutex::new(HashMap::new()),
            kill,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockEvents {
    pub fn subscribed(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn emit(&self, channel: EventChannel, event: LedgerEvent) {
        let handler = self.handlers.lock().unwrap().get(&channel).cloned();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    /// Drop every stream as if the node connection went away.
    pub fn disconnect(&self) {
        let _ = self.kill.send(true);
    }
}

#[async_trait]
impl EventSource for MockEvents {
    async fn subscribe(
        &self,
        channel: EventChannel,
        handler: EventHandler,
    ) -> Result<Subscription, LedgerError> {
        self.handlers.lock().unwrap().insert(channel, handler);

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let mut kill = self.kill.subscribe();
        let active = Arc::clone(&self.active);
        active.fetch_add(1, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel_rx => Ok(()),
                _ = async { let _ = kill.wait_for(|killed| *killed).await; } => {
                    Err(LedgerError::Transport("connection reset".into()))
                }
            };
            active.fetch_sub(1, Ordering::SeqCst);
            result
        });

        Ok(Subscription::new(channel, cancel_tx, task))
    }
}

/// Poll `condition` until it holds or a second has passed.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
