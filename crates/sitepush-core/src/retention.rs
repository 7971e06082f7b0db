//! Retention window for expiring published files
//!
//! The window is anchored either at "now" or, with skip-previous enabled, at
//! the time the currently live version was published. The latter is read from
//! the last-modified time of the site's entry document (index page, falling
//! back to the error page) and rounded down to the hour, so a burst of uploads
//! from one publish collapses to a single comparable instant.
//!
//! The reference timestamp is resolved once per policy and then reused, so
//! every object of a sweep is judged against the same boundary no matter how
//! long the listing takes.

use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone, Timelike, Utc};

use crate::config::schema::check_duration;
use crate::config::{ConfigError, Settings};
use crate::store::{ObjectHead, RemoteObject, RemoteStore};

pub const HOUR_MS: i64 = 3_600_000;
pub const DAY_MS: i64 = 86_400_000;

/// Source of the current time and the local UTC offset.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Offset of local time at `at`, used when rounding to the hour.
    fn local_offset(&self, at: DateTime<Utc>) -> FixedOffset {
        Local.offset_from_utc_datetime(&at.naive_utc())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that never moves, in a fixed offset.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
    offset: FixedOffset,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self { now, offset }
    }

    pub fn utc(now: DateTime<Utc>) -> Self {
        Self::new(now, Utc.fix())
    }

    pub fn from_millis(now_ms: i64) -> Self {
        Self::utc(Utc.timestamp_millis_opt(now_ms).single().unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn local_offset(&self, _at: DateTime<Utc>) -> FixedOffset {
        self.offset
    }
}

/// Retention inputs taken from the settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionSettings {
    pub duration_ms: i64,
    pub skip_previous: bool,
    pub index_page: String,
    pub error_page: String,
}

impl RetentionSettings {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let oss = settings.oss()?;
        check_duration(settings.duration_secs())?;
        Ok(Self {
            duration_ms: settings.duration_ms(),
            skip_previous: settings.skip_previous,
            index_page: oss.index_page.clone(),
            error_page: oss.error_page.clone(),
        })
    }
}

/// The cutoff one sweep judges every object against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow {
    pub duration_ms: i64,
    pub reference_timestamp: i64,
    pub expiration_boundary: i64,
}

impl RetentionWindow {
    pub fn new(reference_timestamp: i64, duration_ms: i64) -> Self {
        Self {
            duration_ms,
            reference_timestamp,
            expiration_boundary: reference_timestamp.saturating_sub(duration_ms),
        }
    }

    /// Strictly older than the window: an object exactly `duration_ms` old is kept.
    pub fn is_expired_at(&self, last_modified_ms: i64) -> bool {
        self.reference_timestamp.saturating_sub(last_modified_ms) > self.duration_ms
    }

    pub fn is_expired(&self, object: &RemoteObject) -> bool {
        self.is_expired_at(object.last_modified_ms())
    }
}

/// Round a publish time down to the start of its (local) hour.
///
/// A time already on the hour is ambiguous: it may be a write that an earlier
/// run normalised. It is moved back a full hour instead.
pub fn round_to_hour(at: DateTime<Utc>, offset: FixedOffset) -> i64 {
    let local = at.with_timezone(&offset);
    let ms = at.timestamp_millis();
    let millis = i64::from(local.timestamp_subsec_millis());

    if local.minute() == 0 && local.second() == 0 {
        ms - millis - HOUR_MS
    } else {
        ms - i64::from(local.minute()) * 60_000 - i64::from(local.second()) * 1000 - millis
    }
}

pub struct RetentionPolicy<'a> {
    store: &'a dyn RemoteStore,
    clock: Box<dyn Clock + 'a>,
    settings: RetentionSettings,
    previous: Option<Option<i64>>,
    reference: Option<i64>,
}

impl<'a> RetentionPolicy<'a> {
    pub fn new(store: &'a dyn RemoteStore, settings: RetentionSettings) -> Self {
        Self {
            store,
            clock: Box::new(SystemClock),
            settings,
            previous: None,
            reference: None,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'a) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn settings(&self) -> &RetentionSettings {
        &self.settings
    }

    pub fn skip_previous(&self) -> bool {
        self.settings.skip_previous
    }

    pub fn duration_ms(&self) -> i64 {
        self.settings.duration_ms
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    /// Rounded publish time of the live version, if any entry document exists.
    pub async fn previous_publish_timestamp(&mut self) -> Option<i64> {
        if let Some(previous) = self.previous {
            return previous;
        }

        let mut head = self.fetch_entry(&self.settings.index_page).await;
        if head.is_none() && self.settings.error_page != self.settings.index_page {
            head = self.fetch_entry(&self.settings.error_page).await;
        }

        let previous = head.map(|head| {
            let offset = self.clock.local_offset(head.last_modified);
            round_to_hour(head.last_modified, offset)
        });
        tracing::debug!(?previous, "resolved previous publish time");
        self.previous = Some(previous);
        previous
    }

    pub async fn has_previous(&mut self) -> bool {
        self.previous_publish_timestamp().await.is_some()
    }

    /// `now`, or the previous publish time when skip-previous applies.
    pub async fn reference_timestamp(&mut self) -> i64 {
        if let Some(reference) = self.reference {
            return reference;
        }
        let mut reference = self.now_ms();
        if self.settings.skip_previous {
            if let Some(previous) = self.previous_publish_timestamp().await {
                reference = previous;
            }
        }
        self.reference = Some(reference);
        reference
    }

    pub async fn expiration_boundary(&mut self) -> i64 {
        self.reference_timestamp()
            .await
            .saturating_sub(self.settings.duration_ms)
    }

    pub async fn window(&mut self) -> RetentionWindow {
        RetentionWindow::new(self.reference_timestamp().await, self.settings.duration_ms)
    }

    /// Roughly how many days back the boundary lies, as seen from now.
    ///
    /// Only for display; the boundary itself never uses this value.
    pub async fn effective_duration_days(&mut self) -> i64 {
        let mut duration = self.settings.duration_ms;
        if self.settings.skip_previous {
            if let Some(previous) = self.previous_publish_timestamp().await {
                duration = duration.saturating_add(self.now_ms().saturating_sub(previous));
            }
        }
        duration.div_euclid(DAY_MS)
    }

    pub async fn previous_publish_date(&mut self) -> Option<DateTime<FixedOffset>> {
        let previous = self.previous_publish_timestamp().await?;
        Some(self.to_local(previous))
    }

    pub async fn expiration_date(&mut self) -> DateTime<FixedOffset> {
        let boundary = self.expiration_boundary().await;
        self.to_local(boundary)
    }

    fn to_local(&self, ms: i64) -> DateTime<FixedOffset> {
        let utc = Utc.timestamp_millis_opt(ms).single().unwrap_or_else(|| {
            tracing::warn!(ms, "timestamp out of range, showing the epoch");
            DateTime::default()
        });
        utc.with_timezone(&self.clock.local_offset(utc))
    }

    async fn fetch_entry(&self, name: &str) -> Option<ObjectHead> {
        match self.store.get(name).await {
            Ok(head) => Some(head),
            Err(e) if e.is_not_found() => {
                tracing::debug!(name, "entry document not found");
                None
            }
            Err(e) => {
                tracing::warn!(name, error = %e, "failed to fetch entry document, assuming no previous version");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn settings(skip_previous: bool, index: &str, error: &str) -> RetentionSettings {
        RetentionSettings {
            duration_ms: 100_000,
            skip_previous,
            index_page: index.to_string(),
            error_page: error.to_string(),
        }
    }

    #[test]
    fn test_window_boundary_is_strict() {
        let window = RetentionWindow::new(1_000_000, 100_000);
        assert_eq!(window.expiration_boundary, 900_000);
        assert!(!window.is_expired_at(900_000));
        assert!(window.is_expired_at(899_999));
        assert!(!window.is_expired_at(1_000_000));
    }

    #[test]
    fn test_round_to_hour_truncates_within_hour() {
        let at = utc(2024, 5, 1, 12, 0, 30);
        assert_eq!(round_to_hour(at, Utc.fix()), utc(2024, 5, 1, 12, 0, 0).timestamp_millis());

        let at = utc(2024, 5, 1, 12, 34, 56) + chrono::Duration::milliseconds(789);
        assert_eq!(round_to_hour(at, Utc.fix()), utc(2024, 5, 1, 12, 0, 0).timestamp_millis());
    }

    #[test]
    fn test_round_to_hour_moves_exact_hour_back() {
        let at = utc(2024, 5, 1, 12, 0, 0);
        assert_eq!(round_to_hour(at, Utc.fix()), utc(2024, 5, 1, 11, 0, 0).timestamp_millis());

        let at = utc(2024, 5, 1, 12, 0, 0) + chrono::Duration::milliseconds(250);
        assert_eq!(round_to_hour(at, Utc.fix()), utc(2024, 5, 1, 11, 0, 0).timestamp_millis());
    }

    #[test]
    fn test_round_to_hour_uses_local_minutes() {
        // 12:15 UTC is 17:45 at +05:30, whose hour started at 11:30 UTC
        let offset = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        let at = utc(2024, 5, 1, 12, 15, 0);
        assert_eq!(round_to_hour(at, offset), utc(2024, 5, 1, 11, 30, 0).timestamp_millis());
    }

    #[test]
    fn test_round_to_hour_is_deterministic() {
        let at = utc(2024, 5, 1, 12, 0, 30);
        assert_eq!(round_to_hour(at, Utc.fix()), round_to_hour(at, Utc.fix()));
    }

    #[tokio::test]
    async fn test_previous_publish_from_index_page() {
        let store = MemoryStore::new("site");
        store.insert("index.html", utc(2024, 5, 1, 12, 0, 30));
        let mut policy = RetentionPolicy::new(&store, settings(true, "index.html", "404.html"))
            .with_clock(FixedClock::utc(utc(2024, 6, 1, 0, 0, 0)));

        assert_eq!(
            policy.previous_publish_timestamp().await,
            Some(utc(2024, 5, 1, 12, 0, 0).timestamp_millis())
        );
    }

    #[tokio::test]
    async fn test_previous_publish_falls_back_to_error_page() {
        let store = MemoryStore::new("site");
        store.insert("404.html", utc(2024, 5, 1, 12, 0, 0));
        let mut policy = RetentionPolicy::new(&store, settings(true, "index.html", "404.html"))
            .with_clock(FixedClock::utc(utc(2024, 6, 1, 0, 0, 0)));

        assert_eq!(
            policy.previous_publish_timestamp().await,
            Some(utc(2024, 5, 1, 11, 0, 0).timestamp_millis())
        );
    }

    #[tokio::test]
    async fn test_same_entry_pages_are_fetched_once() {
        let store = MemoryStore::new("site");
        let mut policy = RetentionPolicy::new(&store, settings(true, "index.html", "index.html"));

        assert_eq!(policy.previous_publish_timestamp().await, None);
        assert!(!policy.has_previous().await);
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_previous_publish_is_cached() {
        let store = MemoryStore::new("site");
        store.insert("index.html", utc(2024, 5, 1, 12, 10, 0));
        let mut policy = RetentionPolicy::new(&store, settings(true, "index.html", "index.html"));

        let first = policy.previous_publish_timestamp().await;
        store.insert("index.html", utc(2024, 5, 2, 9, 10, 0));
        let second = policy.previous_publish_timestamp().await;

        assert_eq!(first, second);
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_reference_is_previous_publish_when_skipping() {
        let store = MemoryStore::new("site");
        store.insert("index.html", utc(2024, 5, 1, 12, 0, 30));
        let mut policy = RetentionPolicy::new(&store, settings(true, "index.html", "index.html"))
            .with_clock(FixedClock::utc(utc(2024, 6, 1, 0, 0, 0)));

        let previous = utc(2024, 5, 1, 12, 0, 0).timestamp_millis();
        assert_eq!(policy.reference_timestamp().await, previous);
        assert_eq!(policy.expiration_boundary().await, previous - 100_000);
    }

    #[tokio::test]
    async fn test_reference_is_now_without_skip_previous() {
        let store = MemoryStore::new("site");
        store.insert("index.html", utc(2024, 5, 1, 12, 0, 30));
        let now = utc(2024, 6, 1, 0, 0, 0);
        let mut policy = RetentionPolicy::new(&store, settings(false, "index.html", "index.html"))
            .with_clock(FixedClock::utc(now));

        assert_eq!(policy.reference_timestamp().await, now.timestamp_millis());
    }

    #[tokio::test]
    async fn test_reference_is_now_when_nothing_was_published() {
        let store = MemoryStore::new("site");
        let now = utc(2024, 6, 1, 0, 0, 0);
        let mut policy = RetentionPolicy::new(&store, settings(true, "index.html", "404.html"))
            .with_clock(FixedClock::utc(now));

        assert_eq!(policy.reference_timestamp().await, now.timestamp_millis());
    }

    #[tokio::test]
    async fn test_reference_is_computed_once() {
        let store = MemoryStore::new("site");
        let mut policy = RetentionPolicy::new(&store, settings(false, "index.html", "index.html"));

        let first = policy.reference_timestamp().await;
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(policy.reference_timestamp().await, first);
    }

    #[tokio::test]
    async fn test_effective_days_extend_by_time_since_previous() {
        let store = MemoryStore::new("site");
        store.insert("index.html", utc(2024, 5, 1, 12, 30, 0));
        let mut s = settings(true, "index.html", "index.html");
        s.duration_ms = 10 * DAY_MS;
        let mut policy = RetentionPolicy::new(&store, s)
            .with_clock(FixedClock::utc(utc(2024, 5, 4, 18, 0, 0)));

        // previous rounds to 12:00 on the 1st; 3 days 6 hours have passed
        assert_eq!(policy.effective_duration_days().await, 13);
        // the boundary still uses the configured window only
        assert_eq!(
            policy.expiration_boundary().await,
            utc(2024, 5, 1, 12, 0, 0).timestamp_millis() - 10 * DAY_MS
        );
    }

    #[tokio::test]
    async fn test_effective_days_without_skip_previous() {
        let store = MemoryStore::new("site");
        store.insert("index.html", utc(2024, 5, 1, 12, 30, 0));
        let mut s = settings(false, "index.html", "index.html");
        s.duration_ms = 180 * DAY_MS;
        let mut policy = RetentionPolicy::new(&store, s);

        assert_eq!(policy.effective_duration_days().await, 180);
    }

    #[tokio::test]
    async fn test_huge_window_saturates_instead_of_overflowing() {
        let store = MemoryStore::new("site");
        store.insert("index.html", utc(2024, 5, 1, 12, 30, 0));
        let mut s = settings(true, "index.html", "index.html");
        s.duration_ms = i64::MAX;
        let mut policy = RetentionPolicy::new(&store, s)
            .with_clock(FixedClock::utc(utc(2024, 5, 4, 18, 0, 0)));

        assert_eq!(policy.effective_duration_days().await, i64::MAX.div_euclid(DAY_MS));
        let reference = utc(2024, 5, 1, 12, 0, 0).timestamp_millis();
        assert_eq!(policy.expiration_boundary().await, reference - i64::MAX);
        assert_eq!(policy.expiration_date().await.timestamp_millis(), 0);
        assert!(!policy.window().await.is_expired_at(i64::MIN));
    }

    #[test]
    fn test_settings_with_oversized_duration_are_rejected() {
        let settings = Settings {
            duration: Some(10_000_000_000_000_000),
            oss: Some(crate::config::OssSettings::default()),
            ..Settings::default()
        };
        assert!(matches!(
            RetentionSettings::from_settings(&settings),
            Err(ConfigError::Invalid { ref field, .. }) if field == "duration"
        ));
    }

    #[tokio::test]
    async fn test_failed_entry_fetch_means_no_previous_version() {
        struct BrokenStore;

        #[async_trait::async_trait]
        impl RemoteStore for BrokenStore {
            fn name(&self) -> &str {
                "broken"
            }
            async fn list(&self, _: Option<&str>) -> crate::store::StoreResult<crate::store::ListPage> {
                unreachable!()
            }
            async fn get(&self, _: &str) -> crate::store::StoreResult<ObjectHead> {
                Err(crate::store::StoreError::Status {
                    operation: "HeadObject".to_string(),
                    status: 403,
                    message: "denied".to_string(),
                })
            }
            async fn delete(&self, _: &str) -> crate::store::StoreResult<()> {
                unreachable!()
            }
            async fn delete_multi(&self, _: &[String]) -> crate::store::StoreResult<()> {
                unreachable!()
            }
            async fn put(&self, _: &str, _: &std::path::Path) -> crate::store::StoreResult<()> {
                unreachable!()
            }
            async fn put_website(&self, _: &str, _: &str) -> crate::store::StoreResult<()> {
                unreachable!()
            }
        }

        let store = BrokenStore;
        let now = utc(2024, 6, 1, 0, 0, 0);
        let mut policy = RetentionPolicy::new(&store, settings(true, "index.html", "404.html"))
            .with_clock(FixedClock::utc(now));

        assert_eq!(policy.previous_publish_timestamp().await, None);
        assert_eq!(policy.reference_timestamp().await, now.timestamp_millis());
    }
}
