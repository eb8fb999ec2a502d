//! Tests for scheduled mode
//!
//! These run the real cron loop with a one-second cadence, so each takes a few seconds.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use volume_backup::managers::scheduler::{Mode, Scheduler};

const EVERY_SECOND: &str = "* * * * * *";

fn after(ms: u64) -> impl std::future::Future<Output = ()> {
    tokio::time::sleep(Duration::from_millis(ms))
}

#[test]
fn test_modes() {
    assert_eq!(Scheduler::from_expression("").unwrap().mode(), Mode::OneShot);
    assert_eq!(
        Scheduler::from_expression("0 1 * * *").unwrap().mode(),
        Mode::Scheduled
    );
    assert!(Scheduler::from_expression("0 1 * *").is_err());
}

#[test]
fn test_next_fire_is_in_the_future() {
    let scheduler = Scheduler::from_expression("*/5 * * * *").unwrap();
    let next = scheduler.next_fire().unwrap();
    assert!(next > chrono::Local::now());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_job_runs_on_every_tick() {
    let scheduler = Scheduler::from_expression(EVERY_SECOND).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = runs.clone();
    scheduler
        .run(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            after(3_500),
        )
        .await
        .unwrap();

    let runs = runs.load(Ordering::SeqCst);
    assert!((2..=4).contains(&runs), "unexpected run count {}", runs);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overlapping_ticks_are_skipped() {
    let scheduler = Scheduler::from_expression(EVERY_SECOND).unwrap();
    let started = Arc::new(AtomicUsize::new(0));
    let concurrent = Arc::new(AtomicUsize::new(0));
    let max_concurrent = Arc::new(AtomicUsize::new(0));

    let (s, c, m) = (started.clone(), concurrent.clone(), max_concurrent.clone());
    scheduler
        .run(
            move || {
                s.fetch_add(1, Ordering::SeqCst);
                let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(2_500));
                c.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            },
            after(4_500),
        )
        .await
        .unwrap();

    assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    // Roughly four ticks happened, a 2.5s job leaves room for at most two runs
    assert!(started.load(Ordering::SeqCst) <= 2);
    assert!(!scheduler.is_busy());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_waits_for_running_job() {
    let scheduler = Scheduler::from_expression(EVERY_SECOND).unwrap();
    let finished = Arc::new(AtomicBool::new(false));

    let flag = finished.clone();
    scheduler
        .run(
            move || {
                std::thread::sleep(Duration::from_millis(2_000));
                flag.store(true, Ordering::SeqCst);
                Ok(())
            },
            after(1_500),
        )
        .await
        .unwrap();

    assert!(finished.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_runs_do_not_stop_the_loop() {
    let scheduler = Scheduler::from_expression(EVERY_SECOND).unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = attempts.clone();
    scheduler
        .run(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("simulated failure")
            },
            after(3_500),
        )
        .await
        .unwrap();

    assert!(attempts.load(Ordering::SeqCst) >= 2);
}
