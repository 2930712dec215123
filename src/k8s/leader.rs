//! Leader election
//!
//! A coordination/v1 Lease campaign so that only one replica emits events.
//! The transition contract is the part the rest of the system depends on:
//! `{follower → leader → stepping-down}` with callbacks fired on acquiring
//! leadership, losing it, and observing a new leader. All durations are
//! deterministic configuration constants.

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, PostParams};
use kube::Client;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{info, warn};

pub const LEASE_DURATION: Duration = Duration::from_secs(15);
pub const RENEW_DEADLINE: Duration = Duration::from_secs(10);
pub const RETRY_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderState {
    Follower,
    Leader,
    SteppingDown,
}

pub struct LeaderCallbacks {
    pub on_started_leading: Box<dyn Fn() + Send + Sync>,
    pub on_stopped_leading: Box<dyn Fn() + Send + Sync>,
    pub on_new_leader: Box<dyn Fn(&str) + Send + Sync>,
}

/// The three-edge transition core, separated from the lease plumbing.
struct Transitions {
    state: LeaderState,
    observed_leader: Option<String>,
    callbacks: LeaderCallbacks,
}

impl Transitions {
    fn new(callbacks: LeaderCallbacks) -> Self {
        Self {
            state: LeaderState::Follower,
            observed_leader: None,
            callbacks,
        }
    }

    fn become_leader(&mut self) {
        if self.state != LeaderState::Leader {
            self.state = LeaderState::Leader;
            (self.callbacks.on_started_leading)();
        }
    }

    fn step_down(&mut self) {
        if self.state == LeaderState::Leader {
            self.state = LeaderState::SteppingDown;
            (self.callbacks.on_stopped_leading)();
            self.state = LeaderState::Follower;
        }
    }

    fn observe(&mut self, holder: &str) {
        if self.observed_leader.as_deref() != Some(holder) {
            self.observed_leader = Some(holder.to_string());
            (self.callbacks.on_new_leader)(holder);
        }
    }
}

fn lease_expired(renew_time: Option<DateTime<Utc>>, duration_seconds: i64, now: DateTime<Utc>) -> bool {
    match renew_time {
        Some(renewed) => now - renewed > chrono::Duration::seconds(duration_seconds),
        None => true,
    }
}

pub struct LeaderElector {
    client: Client,
    namespace: String,
    lease_name: String,
    identity: String,
    transitions: Mutex<Transitions>,
    last_renew: Mutex<Option<Instant>>,
}

impl LeaderElector {
    pub fn new(
        client: Client,
        namespace: String,
        lease_name: String,
        callbacks: LeaderCallbacks,
    ) -> Self {
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "virta".to_string());
        let identity = format!("{hostname}_{}", std::process::id());
        Self {
            client,
            namespace,
            lease_name,
            identity,
            transitions: Mutex::new(Transitions::new(callbacks)),
            last_renew: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> LeaderState {
        self.transitions.lock().state
    }

    /// Campaign until the shutdown signal fires (or its sender is dropped).
    /// Releases the lease on the way out when this replica holds it.
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let mut ticker = tokio::time::interval(RETRY_PERIOD);

        info!(lease = %self.lease_name, identity = %self.identity, "leader election started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.tick(&api).await,
            }
        }

        self.release(&api).await;
    }

    async fn tick(&self, api: &Api<Lease>) {
        match self.try_acquire_or_renew(api).await {
            Ok(true) => {
                *self.last_renew.lock() = Some(Instant::now());
                self.transitions.lock().become_leader();
            }
            Ok(false) => {
                // Someone else holds a live lease.
                self.transitions.lock().step_down();
            }
            Err(e) => {
                warn!(error = %e, lease = %self.lease_name, "lease update failed");
                let renewed_recently = match *self.last_renew.lock() {
                    Some(at) => at.elapsed() < RENEW_DEADLINE,
                    None => false,
                };
                if !renewed_recently {
                    self.transitions.lock().step_down();
                }
            }
        }
    }

    async fn try_acquire_or_renew(&self, api: &Api<Lease>) -> Result<bool, kube::Error> {
        let now = Utc::now();
        let pp = PostParams::default();

        let Some(mut lease) = api.get_opt(&self.lease_name).await? else {
            let lease = self.fresh_lease(now, 0);
            api.create(&pp, &lease).await?;
            return Ok(true);
        };

        let spec = lease.spec.clone().unwrap_or_default();
        let holder = spec.holder_identity.clone().unwrap_or_default();
        let duration = i64::from(
            spec.lease_duration_seconds
                .unwrap_or(LEASE_DURATION.as_secs() as i32),
        );

        if holder == self.identity {
            let mut renewed = spec;
            renewed.renew_time = Some(MicroTime(now));
            lease.spec = Some(renewed);
            api.replace(&self.lease_name, &pp, &lease).await?;
            return Ok(true);
        }

        let renew_time = spec.renew_time.as_ref().map(|t| t.0);
        if holder.is_empty() || lease_expired(renew_time, duration, now) {
            let transitions = spec.lease_transitions.unwrap_or(0) + 1;
            let mut taken = self.fresh_lease(now, transitions);
            taken.metadata = lease.metadata.clone();
            api.replace(&self.lease_name, &pp, &taken).await?;
            return Ok(true);
        }

        self.transitions.lock().observe(&holder);
        Ok(false)
    }

    fn fresh_lease(&self, now: DateTime<Utc>, transitions: i32) -> Lease {
        Lease {
            metadata: ObjectMeta {
                name: Some(self.lease_name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.identity.clone()),
                lease_duration_seconds: Some(LEASE_DURATION.as_secs() as i32),
                acquire_time: Some(MicroTime(now)),
                renew_time: Some(MicroTime(now)),
                lease_transitions: Some(transitions),
                ..Default::default()
            }),
        }
    }

    async fn release(&self, api: &Api<Lease>) {
        if self.state() != LeaderState::Leader {
            return;
        }
        if let Ok(Some(mut lease)) = api.get_opt(&self.lease_name).await {
            let mut spec = lease.spec.clone().unwrap_or_default();
            if spec.holder_identity.as_deref() == Some(self.identity.as_str()) {
                spec.holder_identity = Some(String::new());
                lease.spec = Some(spec);
                if let Err(e) = api.replace(&self.lease_name, &PostParams::default(), &lease).await
                {
                    warn!(error = %e, "failed to release lease");
                }
            }
        }
        self.transitions.lock().step_down();
        info!(lease = %self.lease_name, "leadership released");
    }
}
