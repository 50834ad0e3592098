use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use chrono::Local;
use futures::FutureExt;
use rusqlite::Connection;
use tracing::{error, info, warn};

use crate::alert;
use crate::db;
use crate::fetch::Fetcher;
use crate::notify::Notifier;
use crate::scan::{ScanOutcome, Scanner};

const ERROR_COOLDOWN_TICKS: u64 = 60;

/// Periodic scan-and-notify loop for one city.
pub struct Monitor<F, N> {
    scanner: Scanner<F>,
    notifier: Arc<N>,
    history: Mutex<Connection>,
    max_pages: u32,
    interval_ticks: u64,
    tick: Duration,
}

impl<F, N> Monitor<F, N>
where
    F: Fetcher + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        scanner: Scanner<F>,
        notifier: Arc<N>,
        history: Connection,
        max_pages: u32,
        interval_minutes: f64,
    ) -> Self {
        Self {
            scanner,
            notifier,
            history: Mutex::new(history),
            max_pages,
            interval_ticks: ((interval_minutes * 60.0) as u64).max(1),
            tick: Duration::from_secs(1),
        }
    }

    /// Length of one wait step; the stop flag is polled once per tick.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// One scan: notify on matches, record the outcome.
    pub async fn run_cycle(&self, notify: bool) -> Result<ScanOutcome> {
        let started_at = Local::now();
        let t0 = Instant::now();
        let city = self.scanner.city().name().to_string();

        let outcome = self.scanner.scan(self.max_pages).await;

        let notified = match &outcome {
            ScanOutcome::Found { matches, .. } if notify => {
                let message = alert::format_alert(&city, matches, Local::now());
                let sent = self.notifier.send(&message).await;
                if sent {
                    info!("{} found! Notification sent.", alert::title_case(&city));
                } else {
                    warn!("{} found but failed to send notification", alert::title_case(&city));
                }
                sent
            }
            ScanOutcome::Found { .. } => false,
            ScanOutcome::NoMatches { pages_scanned } => {
                info!(
                    "No valid {} listings on {} page(s) (false positives filtered)",
                    alert::title_case(&city),
                    pages_scanned
                );
                false
            }
            ScanOutcome::FetchFailed(reason) => {
                warn!("Scan failed, nothing checked: {}", reason);
                false
            }
        };

        let record = db::ScanRecord {
            started_at: started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            city: &city,
            outcome: &outcome,
            notified,
            duration_ms: t0.elapsed().as_millis() as i64,
        };
        {
            // a panicked cycle may leave the lock poisoned; the store itself is transactional
            let conn = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            db::record_scan(&conn, &record)?;
        }

        Ok(outcome)
    }

    /// Loop until `running` is cleared. Failed or panicked cycles are logged and
    /// followed by a cooldown.
    pub async fn run(self, running: Arc<AtomicBool>) {
        while running.load(Ordering::SeqCst) {
            info!("Starting scheduled check...");
            let result = AssertUnwindSafe(self.run_cycle(true))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(anyhow!("scan panicked: {}", panic_message(&*panic))));
            match result {
                Ok(_) => {
                    let next = Local::now()
                        + chrono::Duration::from_std(self.tick * self.interval_ticks as u32)
                            .unwrap_or_else(|_| chrono::Duration::zero());
                    info!("Next check at {}", next.format("%H:%M:%S"));
                    self.wait(&running, self.interval_ticks).await;
                }
                Err(e) => {
                    error!("Error during monitoring: {:#}", e);
                    self.wait(&running, ERROR_COOLDOWN_TICKS).await;
                }
            }
        }
        info!("Monitor loop stopped");
    }

    async fn wait(&self, running: &AtomicBool, ticks: u64) {
        for _ in 0..ticks {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(self.tick).await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Resolves when `signal` fires. A signal source that fails to install is
/// logged and never resolves, so monitoring is not stopped by it.
pub async fn until_signal<S, E>(signal: S)
where
    S: Future<Output = std::result::Result<(), E>>,
    E: Display,
{
    if let Err(e) = signal.await {
        error!("Cannot listen for the stop signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Run `monitor` on a background task until `shutdown` resolves, bracketing it
/// with start and stop notifications.
pub async fn supervise<F, N, S>(
    monitor: Monitor<F, N>,
    interval_minutes: f64,
    shutdown: S,
) -> Result<()>
where
    F: Fetcher + 'static,
    N: Notifier + 'static,
    S: Future<Output = ()>,
{
    let city = monitor.scanner.city().name().to_string();
    let notifier = Arc::clone(&monitor.notifier);
    let running = Arc::new(AtomicBool::new(true));

    let started = alert::startup_message(&city, monitor.max_pages, interval_minutes);
    if !notifier.send(&started).await {
        warn!("Failed to send startup notification");
    }
    info!(
        "Monitoring started for {} (every {} min, up to {} pages)",
        alert::title_case(&city),
        interval_minutes,
        monitor.max_pages
    );

    let mut task = tokio::spawn(monitor.run(Arc::clone(&running)));

    tokio::select! {
        _ = shutdown => {
            running.store(false, Ordering::SeqCst);
            info!("Stop requested, waiting for the current cycle to finish...");
            if let Err(e) = (&mut task).await {
                error!("Monitor task ended abnormally: {}", e);
            }
            notifier.send(&alert::stop_message(&city)).await;
            info!("Monitoring stopped");
            Ok(())
        }
        joined = &mut task => {
            running.store(false, Ordering::SeqCst);
            notifier.send(&alert::unexpected_stop_message(&city)).await;
            match joined {
                Err(e) => Err(anyhow!("monitor task crashed: {}", e)),
                Ok(()) => Err(anyhow!("monitor loop exited unexpectedly")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::detect::city::TargetCity;
    use crate::fetch::FetchError;
    use crate::scan::tests::FakeFetcher;
    use crate::scan::SEARCH_URL;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, text: &str) -> bool {
            self.sent.lock().unwrap().push(text.to_string());
            !self.fail
        }
    }

    const LAC: &str = r#"<h3>Résidence du Lac</h3><p>Résidence du Lac — Paris 75015, disponible</p>"#;

    /// Panics on its first request, then serves a valid Paris page.
    #[derive(Default)]
    struct FlakyFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for FlakyFetcher {
        async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("bad page");
            }
            Ok("<h3>Résidence Port-Royal</h3><p>Boulevard de Port-Royal, Paris 75005</p>".to_string())
        }
    }

    fn flaky_monitor(notifier: Arc<RecordingNotifier>) -> Monitor<FlakyFetcher, RecordingNotifier> {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let scanner = Scanner::new(FlakyFetcher::default(), TargetCity::new("paris").unwrap())
            .unwrap()
            .with_page_delay(Duration::ZERO);
        Monitor::new(scanner, notifier, conn, 5, 30.0).with_tick(Duration::from_millis(1))
    }

    async fn wait_for_messages(notifier: &RecordingNotifier, n: usize) {
        while notifier.sent.lock().unwrap().len() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn monitor(fetcher: FakeFetcher, notifier: Arc<RecordingNotifier>) -> Monitor<FakeFetcher, RecordingNotifier> {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let scanner = Scanner::new(fetcher, TargetCity::new("paris").unwrap())
            .unwrap()
            .with_page_delay(Duration::ZERO);
        Monitor::new(scanner, notifier, conn, 5, 30.0).with_tick(Duration::from_millis(5))
    }

    fn stats(m: &Monitor<FakeFetcher, RecordingNotifier>) -> db::Stats {
        db::get_stats(&m.history.lock().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn cycle_notifies_and_records() {
        let notifier = Arc::new(RecordingNotifier::default());
        let m = monitor(FakeFetcher::default().with(SEARCH_URL, LAC), Arc::clone(&notifier));

        let outcome = m.run_cycle(true).await.unwrap();
        assert_eq!(outcome.matches().len(), 1);

        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Résidence du Lac"));

        let s = stats(&m);
        assert_eq!((s.total, s.found, s.notified, s.hits), (1, 1, 1, 1));
    }

    #[tokio::test]
    async fn failed_send_is_not_a_failed_scan() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let m = monitor(FakeFetcher::default().with(SEARCH_URL, LAC), notifier);
        let outcome = m.run_cycle(true).await.unwrap();
        assert_eq!(outcome.label(), "found");
        assert_eq!(stats(&m).notified, 0);
    }

    #[tokio::test]
    async fn fetch_failure_sends_nothing() {
        let notifier = Arc::new(RecordingNotifier::default());
        let m = monitor(FakeFetcher::default(), Arc::clone(&notifier));
        let outcome = m.run_cycle(true).await.unwrap();
        assert!(matches!(outcome, ScanOutcome::FetchFailed(_)));
        assert!(notifier.sent.lock().unwrap().is_empty());
        assert_eq!(stats(&m).fetch_failed, 1);
    }

    #[tokio::test]
    async fn dry_cycle_skips_notification() {
        let notifier = Arc::new(RecordingNotifier::default());
        let m = monitor(FakeFetcher::default().with(SEARCH_URL, LAC), Arc::clone(&notifier));
        m.run_cycle(false).await.unwrap();
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_flag_ends_loop_promptly() {
        let notifier = Arc::new(RecordingNotifier::default());
        let m = monitor(FakeFetcher::default().with(SEARCH_URL, LAC), Arc::clone(&notifier));
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(m.run(Arc::clone(&running)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        running.store(false, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop did not stop")
            .unwrap();

        // one cycle ran, then the 30 min wait was cut short
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn supervise_brackets_with_lifecycle_messages() {
        let notifier = Arc::new(RecordingNotifier::default());
        let m = monitor(FakeFetcher::default(), Arc::clone(&notifier));

        supervise(m, 30.0, tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap();

        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("Monitor Started"));
        assert!(sent[1].contains("Monitoring has been stopped."));
    }

    #[tokio::test]
    async fn panicked_cycle_cools_down_and_loop_continues() {
        let notifier = Arc::new(RecordingNotifier::default());
        let m = flaky_monitor(Arc::clone(&notifier));
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(m.run(Arc::clone(&running)));

        // first cycle panics, the one after the cooldown finds the listing
        tokio::time::timeout(Duration::from_secs(5), wait_for_messages(&notifier, 1))
            .await
            .expect("no cycle ran after the failure");
        assert!(notifier.sent.lock().unwrap()[0].contains("Résidence Port-Royal"));

        running.store(false, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop did not stop")
            .expect("loop task panicked");
    }

    #[tokio::test]
    async fn supervise_survives_a_panicking_scan() {
        let notifier = Arc::new(RecordingNotifier::default());
        let m = flaky_monitor(Arc::clone(&notifier));

        let watcher = Arc::clone(&notifier);
        let shutdown = async move { wait_for_messages(&watcher, 2).await };
        tokio::time::timeout(Duration::from_secs(5), supervise(m, 30.0, shutdown))
            .await
            .expect("supervise did not return")
            .unwrap();

        let sent = notifier.sent.lock().unwrap().clone();
        assert!(sent[0].contains("Monitor Started"));
        assert!(sent[1].contains("CROUS Housing Alert for Paris!"));
        assert!(sent.last().unwrap().contains("Monitoring has been stopped."));
        assert!(!sent.iter().any(|m| m.contains("unexpectedly")));
    }

    #[tokio::test]
    async fn failed_signal_source_never_stops_monitoring() {
        let failing = until_signal(async { Err::<(), _>("no signal handler") });
        assert!(tokio::time::timeout(Duration::from_millis(50), failing)
            .await
            .is_err());

        let fired = until_signal(async { Ok::<(), &str>(()) });
        assert!(tokio::time::timeout(Duration::from_millis(50), fired)
            .await
            .is_ok());
    }
}
