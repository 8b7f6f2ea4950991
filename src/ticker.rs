use std::{
    path::PathBuf,
    thread,
    time::{Duration as StdDuration, Instant},
};

use chrono::{DateTime, Local, Utc};
use rand::Rng;

use crate::{
    actions::settle_pomodoro,
    classifier::{Verdict, classify, site_of},
    config::Balance,
    domain::day_key,
    notify::{NotificationKind, Notifier, distraction_alert_due, send},
    score::{TickEffects, apply_tick},
    storage::{Entries, KvStore, StoreError, keys, load_snapshot, put, put_timestamp, read_text_file},
    tank::food::FoodSupply,
};

/// Source of the url the user is currently looking at. Polled, never pushed.
pub trait TabProvider {
    fn active_tab_url(&self) -> Option<String>;
}

/// Reads the active url from a one-line file another process keeps current.
pub struct FileTabProvider {
    path: PathBuf,
}

impl FileTabProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TabProvider for FileTabProvider {
    fn active_tab_url(&self) -> Option<String> {
        match read_text_file(&self.path) {
            Ok(Some(content)) => {
                let url = content.trim();
                (!url.is_empty()).then(|| url.to_string())
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("Could not read active tab: {}", e);
                None
            }
        }
    }
}

pub struct FixedTab(pub Option<String>);

impl TabProvider for FixedTab {
    fn active_tab_url(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    pub verdict: Verdict,
    pub effects: TickEffects,
    /// False while the foreground owned the second counters.
    pub counted_time: bool,
    pub food_gained: u32,
    pub pomodoro_completed: bool,
    pub notifications: Vec<NotificationKind>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    /// No tab or a browser-internal page; nothing was persisted.
    NoActiveSite,
    StorageUnavailable,
    Applied(TickSummary),
}

/// The foreground marks itself active with every counter write-back.
fn foreground_active(seen_at: Option<DateTime<Utc>>, now: DateTime<Utc>, window_secs: i64) -> bool {
    seen_at.is_some_and(|seen| now >= seen && (now - seen).num_seconds() < window_secs)
}

/// One Background Ticker firing. Never fails: a store error leaves the stored
/// state untouched and the next firing retries from scratch.
pub fn run_tick<R: Rng + ?Sized>(
    store: &dyn KvStore,
    tabs: &dyn TabProvider,
    notifier: &mut dyn Notifier,
    balance: &Balance,
    now_local: &DateTime<Local>,
    rng: &mut R,
) -> TickReport {
    let url = tabs.active_tab_url();
    if url.as_deref().and_then(site_of).is_none() {
        log::debug!("Tick skipped, no active site");
        return TickReport::NoActiveSite;
    }

    match apply_and_persist(store, url.as_deref(), balance, now_local, rng) {
        Ok(summary) => {
            for kind in &summary.notifications {
                send(notifier, *kind, rng);
            }
            TickReport::Applied(summary)
        }
        Err(e) => {
            log::warn!("Tick skipped, {}", e);
            TickReport::StorageUnavailable
        }
    }
}

fn apply_and_persist<R: Rng + ?Sized>(
    store: &dyn KvStore,
    url: Option<&str>,
    balance: &Balance,
    now_local: &DateTime<Local>,
    rng: &mut R,
) -> Result<TickSummary, StoreError> {
    let now = now_local.with_timezone(&Utc);
    let today = day_key(now_local);
    let snapshot = load_snapshot(store, balance.start_score)?;
    let verdict = classify(url, &snapshot.blocklist, &snapshot.work_hours, now_local);

    let counted_time = !foreground_active(
        snapshot.foreground_seen_at,
        now,
        balance.foreground_active_secs,
    );
    let mut focus = snapshot.focus.clone();
    let effects = apply_tick(&mut focus, &verdict, balance, &today, counted_time);

    let mut food = FoodSupply::from_stored(
        snapshot.food_supply,
        snapshot.food_last_refill_at,
        now,
        balance.max_food,
    );
    let food_gained = food.refill(now, verdict.is_distracting, balance.max_food, balance.food_refill_secs);

    let mut pomodoro = snapshot.pomodoro.clone();
    let mut pending = snapshot.pending_fish.clone();
    let pomodoro_completed =
        settle_pomodoro(&mut pomodoro, &mut focus, &mut pending, now, balance, rng);

    let alert = effects.distraction_edge
        && distraction_alert_due(
            snapshot.last_distraction_alert_at,
            now,
            balance.distraction_alert_cooldown_secs,
        );

    let mut entries = Entries::new();
    put(&mut entries, keys::FOCUS_SCORE, &focus.focus_score)?;
    put(&mut entries, keys::COINS, &focus.coins)?;
    put(&mut entries, keys::IS_DISTRACTING, &focus.is_distracting)?;
    put(&mut entries, keys::CURRENT_SITE_ID, &focus.current_site_id)?;
    put(&mut entries, keys::LAST_FOCUS_DATE, &focus.last_focus_date)?;
    put(&mut entries, keys::FOCUS_STREAK_TICKS, &focus.focus_streak_ticks)?;
    if counted_time || effects.rolled_over || snapshot.has_legacy_fields {
        put(&mut entries, keys::FOCUS_SECONDS, &focus.focus_seconds)?;
        put(&mut entries, keys::DISTRACTED_SECONDS, &focus.distracted_seconds)?;
    }
    food.write_to(&mut entries);
    if alert {
        put_timestamp(&mut entries, keys::LAST_DISTRACTION_ALERT_AT, now);
    }
    if pomodoro_completed {
        put(&mut entries, keys::POMODORO, &pomodoro)?;
        put(&mut entries, keys::PENDING_FISH, &pending)?;
    }
    store.set(entries)?;

    if snapshot.has_legacy_fields {
        store.remove(&[keys::LEGACY_FOCUS_MINUTES, keys::LEGACY_DISTRACTED_MINUTES])?;
        log::info!("Removed legacy minute counters");
    }

    let mut notifications = Vec::new();
    if alert {
        notifications.push(NotificationKind::Distraction);
    }
    if effects.streak_completed {
        notifications.push(NotificationKind::Streak);
    }
    if pomodoro_completed {
        notifications.push(NotificationKind::Pomodoro);
    }

    log::debug!(
        "Tick {}: score {:.1} ({:+.1}), coins {:.3}, counted_time={}",
        verdict.site_id(),
        focus.focus_score,
        effects.score_delta,
        focus.coins,
        counted_time
    );

    Ok(TickSummary {
        verdict,
        effects,
        counted_time,
        food_gained,
        pomodoro_completed,
        notifications,
    })
}

/// Scheduler primitive: fires a tick every `tick_secs` until `max_ticks` (if any) is reached.
pub fn run_schedule<R: Rng + ?Sized>(
    store: &dyn KvStore,
    tabs: &dyn TabProvider,
    notifier: &mut dyn Notifier,
    balance: &Balance,
    max_ticks: Option<u64>,
    rng: &mut R,
) -> u64 {
    let tick_rate = StdDuration::from_secs(balance.tick_secs);
    let mut last_tick: Option<Instant> = None;
    let mut fired = 0u64;

    loop {
        if max_ticks.is_some_and(|max| fired >= max) {
            return fired;
        }

        if last_tick.is_none_or(|last| last.elapsed() >= tick_rate) {
            last_tick = Some(Instant::now());
            let report = run_tick(store, tabs, notifier, balance, &Local::now(), rng);
            log::debug!("Tick {} -> {:?}", fired + 1, report);
            fired += 1;
            continue;
        }

        let wait = last_tick
            .map(|last| tick_rate.saturating_sub(last.elapsed()))
            .unwrap_or_default();
        thread::sleep(wait.min(StdDuration::from_millis(250)));
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, time::SystemTime};

    use chrono::{Duration, TimeZone};
    use rand::{SeedableRng, rngs::StdRng};
    use serde_json::json;

    use super::*;
    use crate::{
        domain::{PendingFish, Pomodoro},
        notify::RecordingNotifier,
        popup::Popup,
        storage::{MemoryStore, list_field},
    };

    // Wednesday, inside the default work window.
    fn wednesday(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 1, 3, h, m, s)
            .single()
            .expect("unambiguous local time")
    }

    fn store_with(value: serde_json::Value) -> MemoryStore {
        let store = MemoryStore::new();
        store.set(value.as_object().cloned().unwrap()).unwrap();
        store
    }

    fn tick(store: &MemoryStore, url: &str, at: DateTime<Local>, notifier: &mut RecordingNotifier) -> TickReport {
        let mut rng = StdRng::seed_from_u64(9);
        run_tick(
            store,
            &FixedTab(Some(url.to_string())),
            notifier,
            &Balance::default(),
            &at,
            &mut rng,
        )
    }

    fn applied(report: TickReport) -> TickSummary {
        match report {
            TickReport::Applied(summary) => summary,
            other => panic!("expected an applied tick, got {other:?}"),
        }
    }

    #[test]
    fn test_internal_page_persists_nothing() {
        let store = MemoryStore::new();
        let mut notifier = RecordingNotifier::default();

        let report = tick(&store, "chrome://newtab/", wednesday(12, 0, 0), &mut notifier);
        assert_eq!(report, TickReport::NoActiveSite);

        let mut rng = StdRng::seed_from_u64(1);
        let report = run_tick(
            &store,
            &FixedTab(None),
            &mut notifier,
            &Balance::default(),
            &wednesday(12, 0, 0),
            &mut rng,
        );
        assert_eq!(report, TickReport::NoActiveSite);
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_distraction_penalty_over_ten_ticks() {
        let store = store_with(json!({"focusScore": 70, "lastFocusDate": "2024-01-03"}));
        let mut notifier = RecordingNotifier::default();

        for i in 0..10 {
            tick(&store, "https://www.reddit.com/r/rust", wednesday(12, 0, i * 5), &mut notifier);
        }

        let snapshot = load_snapshot(&store, 70.0).unwrap();
        assert_eq!(snapshot.focus.focus_score, 55.0);
        assert_eq!(snapshot.focus.distracted_seconds, 50);
        assert_eq!(snapshot.focus.focus_seconds, 0);
        assert!(snapshot.focus.is_distracting);
        assert_eq!(snapshot.focus.current_site_id, "reddit.com");

        // Only the rising edge alerts.
        assert_eq!(notifier.sent.len(), 1);
        assert_eq!(notifier.sent[0].0, NotificationKind::Distraction);
    }

    #[test]
    fn test_midnight_reset_before_increment() {
        let store = store_with(json!({"focusSeconds": 1200, "lastFocusDate": "2024-01-02"}));
        let mut notifier = RecordingNotifier::default();

        let summary = applied(tick(&store, "https://docs.rs", wednesday(9, 30, 0), &mut notifier));
        assert!(summary.effects.rolled_over);

        let snapshot = load_snapshot(&store, 70.0).unwrap();
        assert_eq!(snapshot.focus.focus_seconds, 5);
        assert_eq!(snapshot.focus.last_focus_date, "2024-01-03");
    }

    #[test]
    fn test_active_foreground_keeps_the_counters() {
        let now = wednesday(12, 0, 0);
        let seen = now.with_timezone(&Utc) - Duration::seconds(3);
        let store = store_with(json!({
            "focusSeconds": 40,
            "lastFocusDate": "2024-01-03",
            "foregroundSeenAt": seen.timestamp_millis(),
        }));
        let mut notifier = RecordingNotifier::default();

        let summary = applied(tick(&store, "https://docs.rs", now, &mut notifier));
        assert!(!summary.counted_time);
        let snapshot = load_snapshot(&store, 70.0).unwrap();
        assert_eq!(snapshot.focus.focus_seconds, 40);
        assert!(snapshot.focus.focus_score > 70.0);

        // A foreground that went quiet hands the counters back.
        let later = now + Duration::seconds(30);
        let summary = applied(tick(&store, "https://docs.rs", later, &mut notifier));
        assert!(summary.counted_time);
        assert_eq!(load_snapshot(&store, 70.0).unwrap().focus.focus_seconds, 45);
    }

    #[test]
    fn test_closed_foreground_hands_counters_back_at_once() {
        let store = store_with(json!({"focusSeconds": 0, "lastFocusDate": "2024-01-03"}));
        let mut rng = StdRng::seed_from_u64(4);
        let mut popup = Popup::open(&store, Balance::default(), &wednesday(12, 0, 0), &mut rng);
        popup.poll(&store, Some("https://docs.rs"), &wednesday(12, 0, 0), &mut rng);
        popup.clock(&wednesday(12, 0, 0));
        popup.clock(&wednesday(12, 0, 3));
        popup.frame(&store, wednesday(12, 0, 4).with_timezone(&Utc), &mut rng);
        assert!(store.contents().contains_key(keys::FOREGROUND_SEEN_AT));

        popup.close(&store, wednesday(12, 0, 4).with_timezone(&Utc)).unwrap();
        assert!(!store.contents().contains_key(keys::FOREGROUND_SEEN_AT));

        let mut notifier = RecordingNotifier::default();
        let first = applied(tick(&store, "https://docs.rs", wednesday(12, 0, 9), &mut notifier));
        let second = applied(tick(&store, "https://docs.rs", wednesday(12, 0, 14), &mut notifier));
        assert!(first.counted_time && second.counted_time);

        let snapshot = load_snapshot(&store, 70.0).unwrap();
        assert_eq!(snapshot.focus.focus_seconds, 13);
    }

    #[test]
    fn test_alert_cooldown_across_flapping() {
        let store = store_with(json!({"lastFocusDate": "2024-01-03"}));
        let mut notifier = RecordingNotifier::default();

        tick(&store, "https://x.com", wednesday(12, 0, 0), &mut notifier);
        tick(&store, "https://docs.rs", wednesday(12, 0, 5), &mut notifier);
        let summary = applied(tick(&store, "https://x.com", wednesday(12, 0, 10), &mut notifier));
        assert!(summary.effects.distraction_edge);
        assert!(summary.notifications.is_empty());

        tick(&store, "https://docs.rs", wednesday(12, 1, 15), &mut notifier);
        tick(&store, "https://x.com", wednesday(12, 1, 20), &mut notifier);
        assert_eq!(notifier.sent.len(), 2);
    }

    #[test]
    fn test_food_does_not_refill_while_distracted() {
        let now = wednesday(12, 0, 0);
        let anchor = now.with_timezone(&Utc) - Duration::minutes(30);
        let store = store_with(json!({
            "foodSupply": 3,
            "foodLastRefillAt": anchor.timestamp_millis(),
            "lastFocusDate": "2024-01-03",
        }));
        let mut notifier = RecordingNotifier::default();

        let summary = applied(tick(&store, "https://youtube.com/watch", now, &mut notifier));
        assert_eq!(summary.food_gained, 0);
        assert_eq!(load_snapshot(&store, 70.0).unwrap().food_supply, Some(3));

        let summary = applied(tick(&store, "https://docs.rs", now + Duration::seconds(125), &mut notifier));
        assert_eq!(summary.food_gained, 1);
        assert_eq!(load_snapshot(&store, 70.0).unwrap().food_supply, Some(4));
    }

    #[test]
    fn test_completed_pomodoro_queues_reward_fry() {
        let now = wednesday(12, 0, 0);
        let started = now.with_timezone(&Utc) - Duration::minutes(26);
        let mut pomodoro = Pomodoro::default();
        pomodoro.start(started, Balance::default().pomodoro_secs);
        let store = store_with(json!({
            "coins": 1,
            "lastFocusDate": "2024-01-03",
            "pomodoro": serde_json::to_value(&pomodoro).unwrap(),
        }));
        let mut notifier = RecordingNotifier::default();

        let summary = applied(tick(&store, "https://docs.rs", now, &mut notifier));
        assert!(summary.pomodoro_completed);
        assert_eq!(summary.notifications, vec![NotificationKind::Pomodoro]);

        let contents = store.contents();
        assert_eq!(list_field::<PendingFish>(&contents, keys::PENDING_FISH).len(), 1);
        let snapshot = load_snapshot(&store, 70.0).unwrap();
        assert!(!snapshot.pomodoro.is_running());
        assert!(snapshot.focus.coins >= 26.0);
    }

    #[test]
    fn test_legacy_counters_are_migrated_and_removed() {
        let store = store_with(json!({"totalFocusMinutes": 2, "lastFocusDate": "2024-01-03"}));
        let mut notifier = RecordingNotifier::default();

        tick(&store, "https://docs.rs", wednesday(12, 0, 0), &mut notifier);

        let contents = store.contents();
        assert!(!contents.contains_key(keys::LEGACY_FOCUS_MINUTES));
        assert_eq!(contents.get(keys::FOCUS_SECONDS), Some(&json!(125)));
    }

    #[test]
    fn test_unavailable_store_is_reported() {
        let store = MemoryStore::new();
        store.set_available(false);
        let mut notifier = RecordingNotifier::default();

        let report = tick(&store, "https://docs.rs", wednesday(12, 0, 0), &mut notifier);
        assert_eq!(report, TickReport::StorageUnavailable);
        assert!(notifier.sent.is_empty());
    }

    #[test]
    fn test_file_tab_provider_trims_and_treats_blank_as_none() {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let path = PathBuf::from(format!("/tmp/aquafocus_tab_{}", now));
        let provider = FileTabProvider::new(&path);
        assert_eq!(provider.active_tab_url(), None);

        fs::write(&path, "  https://docs.rs/serde \n").unwrap();
        assert_eq!(provider.active_tab_url().as_deref(), Some("https://docs.rs/serde"));

        fs::write(&path, "\n").unwrap();
        assert_eq!(provider.active_tab_url(), None);

        fs::remove_file(path).ok();
    }

    #[test]
    fn test_schedule_stops_after_max_ticks() {
        let store = MemoryStore::new();
        let mut notifier = RecordingNotifier::default();
        let mut rng = StdRng::seed_from_u64(2);
        let balance = Balance {
            tick_secs: 1,
            ..Balance::default()
        };

        let fired = run_schedule(&store, &FixedTab(None), &mut notifier, &balance, Some(2), &mut rng);
        assert_eq!(fired, 2);
    }
}
