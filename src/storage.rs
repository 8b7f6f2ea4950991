use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

#[cfg(test)]
use std::sync::{
    Mutex, MutexGuard,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use chrono::{DateTime, Local};
use directories::ProjectDirs;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{
    Background, Blocklist, DecorationSnapshot, FishSnapshot, FocusState, PendingFish, Pomodoro,
    Timestamp, WorkHours,
};

pub type Entries = Map<String, Value>;

pub mod keys {
    pub const FOCUS_SCORE: &str = "focusScore";
    pub const FOCUS_SECONDS: &str = "focusSeconds";
    pub const DISTRACTED_SECONDS: &str = "distractedSeconds";
    pub const IS_DISTRACTING: &str = "isDistracting";
    pub const CURRENT_SITE_ID: &str = "currentSiteId";
    pub const COINS: &str = "coins";
    pub const BLOCKLIST: &str = "blocklist";
    pub const WORK_HOURS: &str = "workHours";
    pub const LAST_DAILY_CLAIM_DATE: &str = "lastDailyClaimDate";
    pub const LAST_FOCUS_DATE: &str = "lastFocusDate";
    pub const FOCUS_STREAK_TICKS: &str = "focusStreakTicks";
    pub const TANK_FISH: &str = "tankFish";
    pub const TANK_DECORATIONS: &str = "tankDecorations";
    pub const GRAVEYARD_FISH: &str = "graveyardFish";
    pub const RELEASED_FISH: &str = "releasedFish";
    pub const RELEASED_DECORATIONS: &str = "releasedDecorations";
    pub const PENDING_FISH: &str = "pendingFish";
    pub const FOOD_SUPPLY: &str = "foodSupply";
    pub const FOOD_LAST_REFILL_AT: &str = "foodLastRefillAt";
    pub const TANK_BACKGROUND: &str = "tankBackground";
    pub const UNLOCKED_BACKGROUNDS: &str = "unlockedBackgrounds";
    pub const LAST_DISTRACTION_ALERT_AT: &str = "lastDistractionAlertAt";
    pub const FOREGROUND_SEEN_AT: &str = "foregroundSeenAt";
    pub const RESET_EPOCH: &str = "resetEpoch";
    pub const POMODORO: &str = "pomodoro";

    pub const LEGACY_FOCUS_MINUTES: &str = "totalFocusMinutes";
    pub const LEGACY_DISTRACTED_MINUTES: &str = "totalDistractedMinutes";

    pub const ALL: &[&str] = &[
        FOCUS_SCORE,
        FOCUS_SECONDS,
        DISTRACTED_SECONDS,
        IS_DISTRACTING,
        CURRENT_SITE_ID,
        COINS,
        BLOCKLIST,
        WORK_HOURS,
        LAST_DAILY_CLAIM_DATE,
        LAST_FOCUS_DATE,
        FOCUS_STREAK_TICKS,
        TANK_FISH,
        TANK_DECORATIONS,
        GRAVEYARD_FISH,
        RELEASED_FISH,
        RELEASED_DECORATIONS,
        PENDING_FISH,
        FOOD_SUPPLY,
        FOOD_LAST_REFILL_AT,
        TANK_BACKGROUND,
        UNLOCKED_BACKGROUNDS,
        LAST_DISTRACTION_ALERT_AT,
        FOREGROUND_SEEN_AT,
        RESET_EPOCH,
        POMODORO,
        LEGACY_FOCUS_MINUTES,
        LEGACY_DISTRACTED_MINUTES,
    ];
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid stored json: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Shared key-value store. No transactions and no compare-and-swap: a `set`
/// replaces the listed keys and leaves every other key alone.
pub trait KvStore {
    fn get(&self, keys: &[&str]) -> Result<Entries, StoreError>;
    fn set(&self, entries: Entries) -> Result<(), StoreError>;
    fn remove(&self, keys: &[&str]) -> Result<(), StoreError>;
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Entries, StoreError> {
        if !self.path.exists() {
            return Ok(Entries::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(Entries::new());
        }

        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::Unavailable(format!(
                "{} does not hold a json object",
                self.path.display()
            ))),
        }
    }

    fn write_all(&self, entries: &Entries) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        write_json_atomic(&self.path, entries)
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, keys: &[&str]) -> Result<Entries, StoreError> {
        let all = self.read_all()?;
        Ok(keys
            .iter()
            .filter_map(|k| all.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    fn set(&self, entries: Entries) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut all = self.read_all()?;
        all.extend(entries);
        self.write_all(&all)
    }

    fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut all = self.read_all()?;
        let before = all.len();
        for key in keys {
            all.remove(*key);
        }
        if all.len() == before {
            return Ok(());
        }
        self.write_all(&all)
    }
}

/// In-process store with an availability switch and a write counter.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Entries>,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn contents(&self) -> Entries {
        self.data.lock().map(|d| d.clone()).unwrap_or_default()
    }

    fn guard(&self) -> Result<MutexGuard<'_, Entries>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        self.data
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".to_string()))
    }
}

#[cfg(test)]
impl KvStore for MemoryStore {
    fn get(&self, keys: &[&str]) -> Result<Entries, StoreError> {
        let data = self.guard()?;
        Ok(keys
            .iter()
            .filter_map(|k| data.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    fn set(&self, entries: Entries) -> Result<(), StoreError> {
        let mut data = self.guard()?;
        data.extend(entries);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut data = self.guard()?;
        for key in keys {
            data.remove(*key);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// Tolerant readers: a missing or malformed field reads as absent, never as an error.

pub fn field<T: DeserializeOwned>(entries: &Entries, key: &str) -> Option<T> {
    let value = entries.get(key)?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("Ignoring malformed {}: {}", key, e);
            None
        }
    }
}

pub fn field_or<T: DeserializeOwned>(entries: &Entries, key: &str, default: T) -> T {
    field(entries, key).unwrap_or(default)
}

/// Non-negative whole count; accepts floats written by older versions.
pub fn count_field(entries: &Entries, key: &str) -> Option<u64> {
    let raw = field::<f64>(entries, key)?;
    if !raw.is_finite() {
        log::warn!("Ignoring non-finite {}", key);
        return None;
    }
    Some(raw.max(0.0).round() as u64)
}

pub fn timestamp_field(entries: &Entries, key: &str) -> Option<Timestamp> {
    let millis = field::<f64>(entries, key)?;
    DateTime::from_timestamp_millis(millis as i64)
}

/// Parses a list element by element so one bad entry does not drop the rest.
pub fn list_field<T: DeserializeOwned>(entries: &Entries, key: &str) -> Vec<T> {
    let Some(Value::Array(items)) = entries.get(key) else {
        if entries.get(key).is_some_and(|v| !v.is_null()) {
            log::warn!("Ignoring {}: not a list", key);
        }
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("Skipping malformed entry in {}: {}", key, e);
                None
            }
        })
        .collect()
}

pub fn put<T: Serialize + ?Sized>(
    entries: &mut Entries,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    entries.insert(key.to_string(), serde_json::to_value(value)?);
    Ok(())
}

pub fn put_timestamp(entries: &mut Entries, key: &str, at: Timestamp) {
    entries.insert(key.to_string(), Value::from(at.timestamp_millis()));
}

/// Everything the core reads from the shared store, with defaults applied.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub focus: FocusState,
    pub blocklist: Blocklist,
    pub work_hours: WorkHours,
    pub fish: Vec<FishSnapshot>,
    pub decorations: Vec<DecorationSnapshot>,
    pub graveyard: Vec<FishSnapshot>,
    pub released_fish: Vec<FishSnapshot>,
    pub released_decorations: Vec<DecorationSnapshot>,
    pub pending_fish: Vec<PendingFish>,
    pub food_supply: Option<u32>,
    pub food_last_refill_at: Option<Timestamp>,
    pub background: Background,
    pub unlocked_backgrounds: Vec<Background>,
    pub last_distraction_alert_at: Option<Timestamp>,
    pub foreground_seen_at: Option<Timestamp>,
    pub reset_epoch: u64,
    pub pomodoro: Pomodoro,
    /// Legacy minute counters were present and should be removed on the next write.
    pub has_legacy_fields: bool,
}

impl Snapshot {
    pub fn from_entries(entries: &Entries, start_score: f64) -> Self {
        let mut focus = FocusState {
            focus_score: field::<f64>(entries, keys::FOCUS_SCORE)
                .filter(|s| s.is_finite())
                .map(|s| s.clamp(0.0, 100.0))
                .unwrap_or(start_score),
            focus_seconds: count_field(entries, keys::FOCUS_SECONDS).unwrap_or(0),
            distracted_seconds: count_field(entries, keys::DISTRACTED_SECONDS).unwrap_or(0),
            is_distracting: field_or(entries, keys::IS_DISTRACTING, false),
            current_site_id: field_or(entries, keys::CURRENT_SITE_ID, String::new()),
            coins: field::<f64>(entries, keys::COINS)
                .filter(|c| c.is_finite())
                .map(|c| c.max(0.0))
                .unwrap_or(0.0),
            last_daily_claim_date: field(entries, keys::LAST_DAILY_CLAIM_DATE)
                .filter(|d: &String| !d.is_empty()),
            last_focus_date: field_or(entries, keys::LAST_FOCUS_DATE, String::new()),
            focus_streak_ticks: count_field(entries, keys::FOCUS_STREAK_TICKS)
                .map(|t| t.min(u32::MAX as u64) as u32)
                .unwrap_or(0),
        };

        let legacy_focus = count_field_scaled(entries, keys::LEGACY_FOCUS_MINUTES, 60.0);
        let legacy_distracted = count_field_scaled(entries, keys::LEGACY_DISTRACTED_MINUTES, 60.0);
        let has_legacy_fields = entries.contains_key(keys::LEGACY_FOCUS_MINUTES)
            || entries.contains_key(keys::LEGACY_DISTRACTED_MINUTES);
        if !entries.contains_key(keys::FOCUS_SECONDS) {
            if let Some(seconds) = legacy_focus {
                log::info!("Migrating legacy focus minutes to {} seconds", seconds);
                focus.focus_seconds = seconds;
            }
        }
        if !entries.contains_key(keys::DISTRACTED_SECONDS) {
            if let Some(seconds) = legacy_distracted {
                log::info!("Migrating legacy distracted minutes to {} seconds", seconds);
                focus.distracted_seconds = seconds;
            }
        }

        let blocklist = field::<Vec<String>>(entries, keys::BLOCKLIST)
            .map(Blocklist::new)
            .unwrap_or_default();

        let mut unlocked_backgrounds: Vec<Background> =
            list_field(entries, keys::UNLOCKED_BACKGROUNDS);
        if !unlocked_backgrounds.contains(&Background::Default) {
            unlocked_backgrounds.insert(0, Background::Default);
        }

        Snapshot {
            focus,
            blocklist,
            work_hours: field(entries, keys::WORK_HOURS).unwrap_or_default(),
            fish: list_field(entries, keys::TANK_FISH),
            decorations: list_field(entries, keys::TANK_DECORATIONS),
            graveyard: list_field(entries, keys::GRAVEYARD_FISH),
            released_fish: list_field(entries, keys::RELEASED_FISH),
            released_decorations: list_field(entries, keys::RELEASED_DECORATIONS),
            pending_fish: list_field(entries, keys::PENDING_FISH),
            food_supply: count_field(entries, keys::FOOD_SUPPLY)
                .map(|u| u.min(u32::MAX as u64) as u32),
            food_last_refill_at: timestamp_field(entries, keys::FOOD_LAST_REFILL_AT),
            background: field(entries, keys::TANK_BACKGROUND).unwrap_or_default(),
            unlocked_backgrounds,
            last_distraction_alert_at: timestamp_field(entries, keys::LAST_DISTRACTION_ALERT_AT),
            foreground_seen_at: timestamp_field(entries, keys::FOREGROUND_SEEN_AT),
            reset_epoch: count_field(entries, keys::RESET_EPOCH).unwrap_or(0),
            pomodoro: field(entries, keys::POMODORO).unwrap_or_default(),
            has_legacy_fields,
        }
    }
}

fn count_field_scaled(entries: &Entries, key: &str, factor: f64) -> Option<u64> {
    let raw = field::<f64>(entries, key)?;
    raw.is_finite().then(|| (raw.max(0.0) * factor).round() as u64)
}

pub fn load_snapshot(store: &dyn KvStore, start_score: f64) -> Result<Snapshot, StoreError> {
    let entries = store.get(keys::ALL)?;
    Ok(Snapshot::from_entries(&entries, start_score))
}

pub fn get_data_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        fs::create_dir_all(dir).ok();
        return dir.to_path_buf();
    }

    if let Some(proj_dirs) = ProjectDirs::from("com", "aquafocus", "aquafocus") {
        let data_dir = proj_dirs.data_dir().to_path_buf();
        fs::create_dir_all(&data_dir).ok();
        data_dir
    } else {
        PathBuf::from(".")
    }
}

pub fn get_state_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return get_data_dir(Some(dir));
    }

    if let Some(proj_dirs) = ProjectDirs::from("com", "aquafocus", "aquafocus") {
        if let Some(state_dir) = proj_dirs.state_dir() {
            let dir = state_dir.to_path_buf();
            fs::create_dir_all(&dir).ok();
            return dir;
        }
    }
    get_data_dir(None)
}

pub fn get_store_path(data_dir: &Path) -> PathBuf {
    data_dir.join("store.json")
}

pub fn get_active_tab_path(state_dir: &Path) -> PathBuf {
    state_dir.join("active_tab")
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, &json)
}

pub fn read_text_file(path: &Path) -> Result<Option<String>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .map_err(|e| StoreError::io(path, e))
}

pub fn write_text_file(path: &Path, content: &str) -> Result<(), StoreError> {
    atomic_write(path, content)
}

pub fn delete_file_if_exists(path: &Path) -> Result<(), StoreError> {
    if path.exists() {
        fs::remove_file(path).map_err(|e| StoreError::io(path, e))?;
    }
    Ok(())
}

pub fn create_backup(path: &Path) -> Result<(), StoreError> {
    if !path.exists() {
        return Ok(());
    }

    let backup_dir = path.parent().unwrap_or(Path::new(".")).join("backups");
    fs::create_dir_all(&backup_dir).map_err(|e| StoreError::io(&backup_dir, e))?;

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let filename = format!(
        "{}.{}",
        path.file_name().unwrap_or_default().to_string_lossy(),
        timestamp
    );
    let backup_path = backup_dir.join(&filename);
    fs::copy(path, &backup_path).map_err(|e| StoreError::io(&backup_path, e))?;

    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    if let Ok(entries) = fs::read_dir(&backup_dir) {
        let mut backups: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(&*stem))
            .collect();
        backups.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

        let excess = backups.len().saturating_sub(10);
        for oldest in backups.iter().take(excess) {
            let _ = fs::remove_file(oldest.path());
        }
    }

    Ok(())
}

/// Write through a per-process temp file and rename, so a reader in the other
/// context never sees a half-written store.
pub fn atomic_write(path: &Path, content: &str) -> Result<(), StoreError> {
    let tmp_path = path.with_extension(format!("{}.tmp", std::process::id()));
    let mut tmp_file = File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
    tmp_file
        .write_all(content.as_bytes())
        .map_err(|e| StoreError::io(&tmp_path, e))?;
    tmp_file
        .sync_all()
        .map_err(|e| StoreError::io(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| StoreError::io(path, e))?;
    Ok(())
}
