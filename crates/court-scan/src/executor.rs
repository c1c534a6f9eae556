use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info, warn};

use crate::differ::AvailabilityDiffer;
use crate::notification_service::render_notification;
use crate::scan_types::*;
use crate::state_store::StateStore;

/// Trait for booking provider clients
#[async_trait::async_trait]
pub trait AvailabilityProvider: Send + Sync {
    /// Fetch the availability of every court on `date`
    async fn fetch_availability(&self, date: NaiveDate) -> Result<AvailabilitySnapshot, ProviderError>;
}

/// Trait for notification channels
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message to one recipient
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<(), NotifyError>;
}

/// Paces the polling loop
#[async_trait::async_trait]
pub trait Ticker: Send {
    /// Wait for the next cycle. Returns `false` once the loop must stop.
    async fn tick(&mut self) -> bool;
}

/// [`Ticker`] firing at a fixed period until a shutdown is requested.
/// The first tick fires immediately.
pub struct IntervalTicker {
    interval: Interval,
    shutdown: watch::Receiver<bool>,
}

impl IntervalTicker {
    /// Tick every `period`; setting `shutdown` to `true` ends the loop at the next tick
    pub fn new(period: Duration, shutdown: watch::Receiver<bool>) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, shutdown }
    }
}

#[async_trait::async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        if *self.shutdown.borrow() {
            return false;
        }

        tokio::select! {
            _ = self.interval.tick() => true,
            _ = self.shutdown.changed() => false,
        }
    }
}

/// Stage of the polling cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// Not started, or stopped
    Idle,
    /// Waiting on the booking provider
    Fetching,
    /// Comparing a snapshot with stored state
    Diffing,
    /// Sending an email
    Notifying,
    /// Pruning and writing state
    Persisting,
    /// Waiting for the next tick
    Sleeping,
}

/// Summary of one polling cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Dates checked this cycle
    pub dates_tracked: usize,
    /// Dates whose fetch failed
    pub fetch_failures: usize,
    /// Notifications delivered
    pub notifications_sent: usize,
    /// Notifications that could not be delivered
    pub notification_failures: usize,
    /// Expired entries removed from the store
    pub pruned: usize,
    /// Whether the state reached the disk
    pub persisted: bool,
}

/// Configuration for the scan executor
#[derive(Debug, Clone)]
pub struct ScanExecutorConfig {
    /// Dates, window and courts to watch
    pub plan: WatchPlan,

    /// Email addresses receiving the notifications
    pub recipients: Vec<String>,

    /// Link to the booking page included in notifications
    pub booking_url: Option<String>,

    /// Whether a notified date may be announced again
    pub policy: NotificationPolicy,

    /// Minimum spacing between two provider calls (default: 2 seconds)
    pub min_fetch_interval: Duration,
}

impl Default for ScanExecutorConfig {
    fn default() -> Self {
        Self {
            plan: WatchPlan::default(),
            recipients: Vec::new(),
            booking_url: None,
            policy: NotificationPolicy::default(),
            min_fetch_interval: Duration::from_secs(2),
        }
    }
}

/// Main scan execution engine
pub struct ScanExecutor {
    provider: Arc<dyn AvailabilityProvider>,
    notifier: Arc<dyn Notifier>,
    store: StateStore,
    differ: AvailabilityDiffer,
    phase: CyclePhase,

    /// When the provider was last called, for rate limiting
    last_fetch: Option<Instant>,

    config: ScanExecutorConfig,
}

impl ScanExecutor {
    /// Create a new scan executor; `None` uses the default configuration
    pub fn new(
        provider: Arc<dyn AvailabilityProvider>,
        notifier: Arc<dyn Notifier>,
        store: StateStore,
        config: Option<ScanExecutorConfig>,
    ) -> Self {
        let config = config.unwrap_or_default();

        Self {
            provider,
            notifier,
            store,
            differ: AvailabilityDiffer::new(config.policy),
            phase: CyclePhase::Idle,
            last_fetch: None,
            config,
        }
    }

    /// Current stage of the cycle
    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// State accumulated so far
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Run cycles until `ticker` asks to stop
    pub async fn start(&mut self, ticker: &mut dyn Ticker) {
        info!(
            "Starting court availability scan for {} recipients",
            self.config.recipients.len()
        );

        while ticker.tick().await {
            let today = Local::now().date_naive();
            let report = self.run_cycle(today).await;

            info!(
                "Cycle done: {} dates, {} fetch failures, {} notifications sent, {} failed",
                report.dates_tracked,
                report.fetch_failures,
                report.notifications_sent,
                report.notification_failures
            );

            self.phase = CyclePhase::Sleeping;
        }

        self.phase = CyclePhase::Idle;
        info!("Court availability scan stopped");
    }

    /// Check every tracked date once, then prune and persist the state
    pub async fn run_cycle(&mut self, today: NaiveDate) -> CycleReport {
        let tracked_dates = self.config.plan.tracked_dates(today);
        let mut report = CycleReport {
            dates_tracked: tracked_dates.len(),
            ..CycleReport::default()
        };

        debug!("Checking {} dates", tracked_dates.len());

        for tracked in &tracked_dates {
            self.check_date(tracked, &mut report).await;
        }

        self.phase = CyclePhase::Persisting;
        report.pruned = self.store.prune_expired(today);

        match self.store.persist() {
            Ok(()) => report.persisted = true,
            Err(e) => error!("Failed to persist scan state: {}", e),
        }

        report
    }

    /// Fetch, diff and notify for one date. Failures stay local to the date.
    async fn check_date(&mut self, tracked: &TrackedDate, report: &mut CycleReport) {
        self.phase = CyclePhase::Fetching;
        self.enforce_rate_limit().await;

        let result = self.provider.fetch_availability(tracked.date).await;
        self.last_fetch = Some(Instant::now());

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to fetch availability for {}: {}", tracked.date, e);
                report.fetch_failures += 1;
                return;
            }
        };

        self.phase = CyclePhase::Diffing;
        let outcome = self.differ.diff(tracked, &snapshot, &mut self.store);

        let Some(event) = outcome.event else {
            debug!(
                "No new availability on {} ({} slots observed)",
                tracked.date, outcome.observed
            );
            return;
        };

        info!(
            "Found {} newly available slots on {}",
            event.slots.len(),
            event.date
        );

        self.phase = CyclePhase::Notifying;
        match self.deliver(&event).await {
            Ok(()) => {
                self.store.mark_date_known(event.date);
                report.notifications_sent += 1;
                info!("Sent notification for {}", event.date);
            }
            Err(e) => {
                error!("Failed to send notification for {}: {}", event.date, e);
                self.differ.revert(&event, &mut self.store);
                report.notification_failures += 1;
            }
        }
    }

    /// Send the rendered event to every recipient.
    /// Succeeds only when every recipient got it.
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        if self.config.recipients.is_empty() {
            return Err(NotifyError::InvalidRecipient(
                "no recipient configured".to_string(),
            ));
        }

        let message = render_notification(event, self.config.booking_url.as_deref());
        let mut first_error = None;

        for recipient in &self.config.recipients {
            if let Err(e) = self
                .notifier
                .send(&message.subject, &message.body, recipient)
                .await
            {
                error!("Failed to notify {}: {}", recipient, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Enforce spacing between provider calls
    async fn enforce_rate_limit(&self) {
        if let Some(last_fetch) = self.last_fetch {
            let elapsed = last_fetch.elapsed();
            if elapsed < self.config.min_fetch_interval {
                sleep(self.config.min_fetch_interval - elapsed).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::{TempDir, tempdir};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn time(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    /// Provider answering from a per-date script; dates without an entry fail
    #[derive(Default)]
    struct MockProvider {
        plannings: Mutex<HashMap<NaiveDate, Vec<SlotObservation>>>,
        calls: Mutex<Vec<NaiveDate>>,
    }

    impl MockProvider {
        fn set(&self, date: NaiveDate, slots: &[(&str, u32, bool)]) {
            let slots = slots
                .iter()
                .map(|(court, h, available)| SlotObservation {
                    court: court.to_string(),
                    time: time(*h),
                    available: *available,
                })
                .collect();
            self.plannings.lock().unwrap().insert(date, slots);
        }

        fn fail(&self, date: NaiveDate) {
            self.plannings.lock().unwrap().remove(&date);
        }
    }

    #[async_trait::async_trait]
    impl AvailabilityProvider for MockProvider {
        async fn fetch_availability(
            &self,
            date: NaiveDate,
        ) -> Result<AvailabilitySnapshot, ProviderError> {
            self.calls.lock().unwrap().push(date);
            match self.plannings.lock().unwrap().get(&date) {
                Some(slots) => Ok(AvailabilitySnapshot {
                    date,
                    slots: slots.clone(),
                    fetched_at: Utc::now(),
                }),
                None => Err(ProviderError::Network("connection reset".to_string())),
            }
        }
    }

    #[derive(Default)]
    struct MockNotifier {
        sent: Mutex<Vec<(String, String, String)>>,
        failing: Mutex<bool>,
    }

    #[async_trait::async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<(), NotifyError> {
            if *self.failing.lock().unwrap() {
                return Err(NotifyError::Email("SMTP 421".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string(), recipient.to_string()));
            Ok(())
        }
    }

    struct Harness {
        dir: TempDir,
        provider: Arc<MockProvider>,
        notifier: Arc<MockNotifier>,
        executor: ScanExecutor,
    }

    fn config(dates: Vec<NaiveDate>) -> ScanExecutorConfig {
        ScanExecutorConfig {
            plan: WatchPlan {
                scope: WatchScope::Dates(dates),
                window: TimeWindow::new(time(10), time(12)).unwrap().into(),
                courts: CourtScope::Any,
            },
            recipients: vec!["player@example.com".to_string()],
            booking_url: Some("https://club.example/planning".to_string()),
            min_fetch_interval: Duration::ZERO,
            ..ScanExecutorConfig::default()
        }
    }

    fn harness(dates: Vec<NaiveDate>) -> Harness {
        let dir = tempdir().unwrap();
        let provider = Arc::new(MockProvider::default());
        let notifier = Arc::new(MockNotifier::default());
        let executor = ScanExecutor::new(
            provider.clone(),
            notifier.clone(),
            StateStore::load(dir.path()),
            Some(config(dates)),
        );
        Harness {
            dir,
            provider,
            notifier,
            executor,
        }
    }

    #[tokio::test]
    async fn test_opening_is_notified_once() {
        let mut h = harness(vec![day(24)]);
        h.provider.set(day(24), &[("Padel 1", 10, false)]);
        let first = h.executor.run_cycle(day(19)).await;
        assert_eq!(first.notifications_sent, 0);

        h.provider.set(day(24), &[("Padel 1", 10, true)]);
        let second = h.executor.run_cycle(day(19)).await;
        let third = h.executor.run_cycle(day(19)).await;

        assert_eq!(second.notifications_sent, 1);
        assert_eq!(third.notifications_sent, 0);
        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].2, "player@example.com");
        assert!(sent[0].1.contains("10:00 : Padel 1"));
        assert!(h.executor.store().is_date_known(day(24)));
    }

    #[tokio::test]
    async fn test_fetch_failure_changes_nothing() {
        let mut h = harness(vec![day(24)]);
        h.provider.set(day(24), &[("Padel 1", 10, true)]);
        h.executor.run_cycle(day(19)).await;
        h.provider.set(day(24), &[("Padel 1", 10, false)]);
        h.executor.run_cycle(day(19)).await;

        h.provider.fail(day(24));
        let report = h.executor.run_cycle(day(19)).await;

        assert_eq!(report.fetch_failures, 1);
        assert_eq!(report.notifications_sent, 0);
        let status = h.executor.store().get_status("Padel 1", day(24), time(10)).unwrap();
        assert!(!status.available);
    }

    #[tokio::test]
    async fn test_failing_date_does_not_stop_the_others() {
        let mut h = harness(vec![day(24), day(25)]);
        h.provider.set(day(25), &[("Padel 2", 11, true)]);

        let report = h.executor.run_cycle(day(19)).await;

        assert_eq!(report.dates_tracked, 2);
        assert_eq!(report.fetch_failures, 1);
        assert_eq!(report.notifications_sent, 1);
        assert!(report.persisted);
        assert_eq!(*h.provider.calls.lock().unwrap(), vec![day(24), day(25)]);
    }

    #[tokio::test]
    async fn test_notify_failure_is_retried_next_cycle() {
        let mut h = harness(vec![day(24)]);
        h.provider.set(day(24), &[("Padel 1", 10, true)]);
        *h.notifier.failing.lock().unwrap() = true;

        let failed = h.executor.run_cycle(day(19)).await;
        assert_eq!(failed.notification_failures, 1);
        assert!(!h.executor.store().is_date_known(day(24)));

        *h.notifier.failing.lock().unwrap() = false;
        let retried = h.executor.run_cycle(day(19)).await;

        assert_eq!(retried.notifications_sent, 1);
        assert!(h.executor.store().is_date_known(day(24)));
    }

    #[tokio::test]
    async fn test_restart_does_not_renotify() {
        let mut h = harness(vec![day(24)]);
        h.provider.set(day(24), &[("Padel 1", 10, true)]);
        h.executor.run_cycle(day(19)).await;

        let mut restarted = ScanExecutor::new(
            h.provider.clone(),
            h.notifier.clone(),
            StateStore::load(h.dir.path()),
            Some(config(vec![day(24)])),
        );
        let report = restarted.run_cycle(day(19)).await;

        assert_eq!(report.notifications_sent, 0);
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cycle_prunes_expired_dates() {
        let mut h = harness(vec![day(24)]);
        h.provider.set(day(24), &[("Padel 1", 10, true)]);
        h.executor.run_cycle(day(19)).await;

        let report = h.executor.run_cycle(day(25)).await;

        assert_eq!(report.dates_tracked, 0);
        assert_eq!(report.pruned, 2);
        assert!(h.executor.store().get_status("Padel 1", day(24), time(10)).is_none());
        assert!(!h.executor.store().is_date_known(day(24)));
        assert_eq!(StateStore::load(h.dir.path()).slot_count(), 0);
    }

    #[tokio::test]
    async fn test_every_recipient_is_notified() {
        let mut h = harness(vec![day(24)]);
        h.executor.config.recipients.push("partner@example.com".to_string());
        h.provider.set(day(24), &[("Padel 1", 10, true)]);

        h.executor.run_cycle(day(19)).await;

        let recipients: Vec<String> = h
            .notifier
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, to)| to.clone())
            .collect();
        assert_eq!(recipients, vec!["player@example.com", "partner@example.com"]);
    }

    struct ScriptedTicker {
        remaining: usize,
    }

    #[async_trait::async_trait]
    impl Ticker for ScriptedTicker {
        async fn tick(&mut self) -> bool {
            if self.remaining == 0 {
                return false;
            }
            self.remaining -= 1;
            true
        }
    }

    #[tokio::test]
    async fn test_start_runs_one_cycle_per_tick() {
        // Far enough ahead that the wall clock never prunes or skips it
        let date = NaiveDate::from_ymd_opt(2099, 6, 1).unwrap();
        let mut h = harness(vec![date]);
        h.provider.set(date, &[("Padel 1", 11, true)]);

        h.executor.start(&mut ScriptedTicker { remaining: 3 }).await;

        assert_eq!(h.provider.calls.lock().unwrap().len(), 3);
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
        assert_eq!(h.executor.phase(), CyclePhase::Idle);
    }

    #[tokio::test]
    async fn test_interval_ticker_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let mut ticker = IntervalTicker::new(Duration::from_millis(5), rx);

        assert!(ticker.tick().await);
        tx.send(true).unwrap();
        assert!(!ticker.tick().await);
    }
}
