//! Cron-driven job loop
//!
//! An empty expression means one-shot mode. Otherwise the job is re-invoked at every fire
//! time until the shutdown future completes. Ticks that arrive while a run is still in
//! progress are skipped with a warning.

use chrono::{DateTime, Local};
use cron::Schedule;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {message}")]
    InvalidExpression { expression: String, message: String },

    #[error("Cron expression '{0}' has no upcoming fire time")]
    NoUpcomingFireTime(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    OneShot,
    Scheduled,
}

fn invalid(expression: &str, message: impl Into<String>) -> ScheduleError {
    ScheduleError::InvalidExpression {
        expression: expression.to_string(),
        message: message.into(),
    }
}

/// Standard crontab weekdays are 0-7 with Sunday as 0 and 7; the `cron` crate uses 1-7
/// with Sunday as 1.
fn translate_weekdays(field: &str, expression: &str) -> Result<String, ScheduleError> {
    let day = |token: &str| -> Result<u32, ScheduleError> {
        let n: u32 = token
            .parse()
            .map_err(|_| invalid(expression, format!("bad day of week '{}'", token)))?;
        if n > 7 {
            return Err(invalid(expression, format!("day of week {} out of range", n)));
        }
        Ok(n % 7 + 1)
    };
    let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    let mut parts = Vec::new();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (part, None),
        };

        let translated = match range.split_once('-') {
            Some((start, end)) if numeric(start) && numeric(end) => {
                let (start_n, end_n): (u32, u32) = (
                    start.parse().map_err(|_| invalid(expression, "bad range"))?,
                    end.parse().map_err(|_| invalid(expression, "bad range"))?,
                );
                if start_n == 0 && end_n >= 6 {
                    "1-7".to_string()
                } else if end_n == 7 && start_n > 0 {
                    // Wraps past Saturday to Sunday
                    format!("{}-7,1", day(start)?)
                } else {
                    format!("{}-{}", day(start)?, day(end)?)
                }
            }
            _ if numeric(range) => day(range)?.to_string(),
            _ => range.to_string(),
        };

        match step {
            Some(_) if translated.contains(',') => {
                return Err(invalid(
                    expression,
                    "stepped weekday ranges ending on Sunday are not supported",
                ));
            }
            Some(step) => parts.push(format!("{}/{}", translated, step)),
            None => parts.push(translated),
        }
    }

    Ok(parts.join(","))
}

/// Convert a standard 5-field expression or descriptor into the `cron` crate's syntax.
/// Expressions with a leading seconds field pass through unchanged.
pub fn normalize_expression(expression: &str) -> Result<String, ScheduleError> {
    let trimmed = expression.trim();

    if trimmed.starts_with('@') {
        return match trimmed {
            "@yearly" | "@annually" | "@monthly" | "@weekly" | "@daily" | "@hourly" => {
                Ok(trimmed.to_string())
            }
            "@midnight" => Ok("@daily".to_string()),
            other => Err(invalid(other, "unsupported descriptor")),
        };
    }

    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    match fields.len() {
        5 => {
            let weekdays = translate_weekdays(fields[4], trimmed)?;
            Ok(format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], fields[2], fields[3], weekdays
            ))
        }
        // Seconds already present: native `cron` crate syntax
        6 | 7 => Ok(fields.join(" ")),
        n => Err(invalid(
            trimmed,
            format!("expected 5 to 7 fields or a descriptor, got {} fields", n),
        )),
    }
}

/// Clears the busy flag when a run ends, including by panic
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Scheduler {
    expression: String,
    schedule: Option<Schedule>,
    busy: Arc<AtomicBool>,
}

impl Scheduler {
    /// Parse `expression`; an empty one selects one-shot mode
    pub fn from_expression(expression: &str) -> Result<Self, ScheduleError> {
        let expression = expression.trim().to_string();

        let schedule = if expression.is_empty() {
            None
        } else {
            let normalized = normalize_expression(&expression)?;
            debug!("Normalized cron expression '{}' to '{}'", expression, normalized);
            Some(
                Schedule::from_str(&normalized)
                    .map_err(|e| invalid(&expression, e.to_string()))?,
            )
        };

        Ok(Self {
            expression,
            schedule,
            busy: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn mode(&self) -> Mode {
        match self.schedule {
            Some(_) => Mode::Scheduled,
            None => Mode::OneShot,
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Next fire time from now, `None` in one-shot mode
    pub fn next_fire(&self) -> Option<DateTime<Local>> {
        self.next_fire_after(Local::now())
    }

    pub fn next_fire_after(&self, after: DateTime<Local>) -> Option<DateTime<Local>> {
        self.schedule.as_ref()?.after(&after).next()
    }

    /// True while a dispatched run has not finished
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Try to claim the single run slot
    fn try_acquire(&self) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard(self.busy.clone()))
    }

    /// Dispatch `job` at every fire time until `shutdown` completes.
    ///
    /// Runs execute on the blocking pool. A failed run is logged and the loop goes on.
    /// On shutdown no new run starts and an in-flight run is awaited.
    pub async fn run<F, S>(&self, job: F, shutdown: S) -> Result<(), ScheduleError>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
        S: Future<Output = ()>,
    {
        let job = Arc::new(job);
        tokio::pin!(shutdown);

        let mut last_fire: Option<DateTime<Local>> = None;
        let mut in_flight: Option<JoinHandle<()>> = None;

        info!("Starting scheduler with expression '{}'", self.expression);

        loop {
            let now = Local::now();
            let reference = match last_fire {
                Some(last) if last > now => last,
                _ => now,
            };
            let next = self
                .next_fire_after(reference)
                .ok_or_else(|| ScheduleError::NoUpcomingFireTime(self.expression.clone()))?;
            let wait = (next - Local::now()).to_std().unwrap_or_default();
            info!("Next run scheduled at {}", next.format("%Y-%m-%d %H:%M:%S"));

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping scheduler");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
            last_fire = Some(next);

            let Some(guard) = self.try_acquire() else {
                warn!("Previous run is still in progress, skipping the run scheduled at {}", next);
                continue;
            };

            let job = job.clone();
            in_flight = Some(tokio::task::spawn_blocking(move || {
                let _guard = guard;
                match job() {
                    Ok(()) => info!("Scheduled run completed"),
                    Err(e) => error!("Scheduled run failed: {:#}", e),
                }
            }));
        }

        if let Some(handle) = in_flight {
            if !handle.is_finished() {
                info!("Waiting for the running job to finish...");
            }
            if let Err(e) = handle.await {
                error!("Scheduled run panicked: {}", e);
            }
        }

        Ok(())
    }
}

/// Completes on Ctrl-C or, on unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
