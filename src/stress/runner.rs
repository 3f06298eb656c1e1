//! The load loop: spawn users along the ramp, let them hammer the target,
//! stop on deadline or request.

use super::report::{Failure, Outcome, StressReport, Tally};
use super::StressConfig;
use crate::error::KitError;
use crate::progress::{emit, ProgressCallback};
use chrono::Local;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// How often the ramp-up and deadline are re-evaluated.
const TICK: Duration = Duration::from_millis(100);

/// Users that should be active `elapsed` into the run.
pub fn user_target(users: usize, ramp_up: Duration, elapsed: Duration) -> usize {
    if ramp_up.is_zero() {
        return users;
    }
    let fraction = (elapsed.as_secs_f64() / ramp_up.as_secs_f64()).min(1.0);
    (users as f64 * fraction) as usize
}

/// Stops a running [`StressTest`] from another task (e.g. a Ctrl-C handler).
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// One configured stress run.
pub struct StressTest {
    config: Arc<StressConfig>,
    stop: StopHandle,
}

impl StressTest {
    pub fn new(config: StressConfig) -> Self {
        let (tx, _rx) = watch::channel(false);
        StressTest {
            config: Arc::new(config),
            stop: StopHandle { tx: Arc::new(tx) },
        }
    }

    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run until the configured duration elapses or [`StopHandle::stop`] is
    /// called. Requests in flight at that moment are awaited and counted.
    ///
    /// Progress counts requests against `users × duration`.
    pub async fn run(&self, progress: Option<&ProgressCallback>) -> Result<StressReport, KitError> {
        let config = Arc::clone(&self.config);
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("scriptkit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| KitError::InvalidConfig(format!("HTTP client: {e}")))?;

        info!(
            "Starting stress test for {} with up to {} users for {}s",
            config.url,
            config.users,
            config.duration.as_secs()
        );
        if !config.ramp_up.is_zero() {
            info!("Ramping up users over {}s", config.ramp_up.as_secs());
        }

        let tally = Arc::new(Mutex::new(Tally::default()));
        let mut stop_rx = self.stop.tx.subscribe();
        let mut users = JoinSet::new();
        let mut active = 0usize;

        emit(progress, |p| p.on_start("Requests", Some(config.estimated_requests())));
        let start_time = Local::now();
        let started = Instant::now();

        let interrupted = loop {
            if *stop_rx.borrow() {
                break true;
            }
            let elapsed = started.elapsed();
            if elapsed >= config.duration {
                break false;
            }

            let target = user_target(config.users, config.ramp_up, elapsed).min(config.users);
            while active < target {
                active += 1;
                debug!("Starting user {}", active);
                users.spawn(simulate_user(
                    client.clone(),
                    Arc::clone(&config),
                    Arc::clone(&tally),
                    self.stop.tx.subscribe(),
                    progress.cloned(),
                ));
            }

            let wait = TICK.min(config.duration.saturating_sub(elapsed));
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = stop_rx.changed() => {}
            }
        };

        self.stop.stop();
        let end_time = Local::now();
        if interrupted {
            warn!("Stress test interrupted after {:.1}s", started.elapsed().as_secs_f64());
        }

        while let Some(joined) = users.join_next().await {
            if let Err(e) = joined {
                warn!("User task ended abnormally: {}", e);
            }
        }
        emit(progress, |p| p.on_finish(true));

        let tally = match Arc::try_unwrap(tally) {
            Ok(m) => m.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()),
            Err(shared) => lock(&shared).clone(),
        };
        let report = StressReport::new(&config, tally, start_time, end_time, interrupted);
        info!(
            "Completed {} requests ({} failed)",
            report.total_requests, report.failed_requests
        );
        Ok(report)
    }
}

fn lock(tally: &Mutex<Tally>) -> std::sync::MutexGuard<'_, Tally> {
    tally.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn simulate_user(
    client: reqwest::Client,
    config: Arc<StressConfig>,
    tally: Arc<Mutex<Tally>>,
    mut stop_rx: watch::Receiver<bool>,
    progress: Option<ProgressCallback>,
) {
    while !*stop_rx.borrow() {
        let outcome = send_once(&client, &config).await;
        lock(&tally).record(outcome);
        emit(progress.as_ref(), |p| p.on_advance(1));

        if !config.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(config.delay) => {}
                _ = stop_rx.changed() => {}
            }
        }
    }
}

/// Send one request, read the whole body, and classify the result.
pub async fn send_once(client: &reqwest::Client, config: &StressConfig) -> Outcome {
    let mut request = client
        .request(config.method.clone(), config.url.clone())
        .headers(config.headers.clone());
    if let Some(ref body) = config.body {
        request = request.body(body.clone());
    }

    let started = Instant::now();
    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            debug!("Request failed: {}", e);
            return Outcome::Failed(Failure::classify(&e));
        }
    };
    let status = response.status().as_u16();
    match response.bytes().await {
        Ok(_) => Outcome::Response {
            status,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        },
        Err(e) => {
            debug!("Reading body failed: {}", e);
            Outcome::Failed(Failure::classify(&e))
        }
    }
}
