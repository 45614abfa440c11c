//! Periodic session refresh
//!
//! [`TokenRefresher`] re-authenticates every known host on a fixed interval
//! and persists the new sessions through the [`Authenticator`]. A failure
//! for one host is logged and never stops the loop.

use crate::authenticator::Authenticator;
use crate::credentials::CredentialSource;
use crate::session::normalize_host;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Default refresh interval (12 hours).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Hosts whose session was replaced
    pub refreshed: Vec<String>,

    /// Hosts that failed, with the error message
    pub failed: Vec<(String, String)>,
}

impl RefreshReport {
    /// Whether every host refreshed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Background re-authentication of known hosts.
pub struct TokenRefresher {
    authenticator: Arc<Authenticator>,
    credentials: Arc<dyn CredentialSource>,
    hosts: Vec<String>,
    interval: Duration,
}

impl TokenRefresher {
    /// Create a refresher. `hosts` are always refreshed, in addition to
    /// hosts found in the cache and the token store.
    pub fn new(
        authenticator: Arc<Authenticator>,
        credentials: Arc<dyn CredentialSource>,
        hosts: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            authenticator,
            credentials,
            hosts,
            interval,
        }
    }

    /// Configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Every host to refresh, normalized and deduplicated.
    pub async fn known_hosts(&self) -> Vec<String> {
        let mut hosts: BTreeSet<String> = self.hosts.iter().map(|h| normalize_host(h)).collect();
        hosts.extend(self.authenticator.cache().hosts().await);

        if let Some(store) = self.authenticator.store() {
            match store.hosts().await {
                Ok(stored) => hosts.extend(stored),
                Err(e) => warn!(error = %e, "Could not list stored tokens"),
            }
        }
        hosts.into_iter().collect()
    }

    /// Refresh every known host once.
    #[instrument(skip(self))]
    pub async fn refresh_all(&self) -> RefreshReport {
        let mut report = RefreshReport::default();

        for host in self.known_hosts().await {
            let result = match self.credentials.credentials_for(&host).await {
                Ok(creds) => self.authenticator.refresh(&host, &creds).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(session) => {
                    debug!(host = %host, fingerprint = %session.fingerprint(), "Session refreshed");
                    report.refreshed.push(host);
                }
                Err(e) => {
                    warn!(host = %host, error = %e, "Session refresh failed");
                    report.failed.push((host, e.to_string()));
                }
            }
        }

        info!(
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            "Refresh pass complete"
        );
        report
    }

    /// Run [`refresh_all`](Self::refresh_all) every interval until stopped.
    ///
    /// The first pass happens one interval after spawning.
    pub fn spawn(self: Arc<Self>) -> RefreshHandle {
        let (shutdown, mut stopped) = watch::channel(false);
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = period.as_secs(), "Token refresher started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.refresh_all().await;
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Token refresher stopped");
        });

        RefreshHandle { shutdown, task }
    }
}

/// Handle to a running refresher task.
pub struct RefreshHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Signal the loop to stop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Token refresher task ended abnormally");
        }
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
