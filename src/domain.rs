use std::fmt;

use chrono::{DateTime, Datelike, Local, NaiveTime, Timelike, Utc};
use itertools::Itertools;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BLOCKLIST, DEFAULT_WORK_HOURS, GAME_BALANCE};

pub type Timestamp = DateTime<Utc>;

/// Calendar day key used for daily rollover and the daily reward.
pub fn day_key(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d").to_string()
}

#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        EntityId(id.into())
    }

    pub fn generate<R: Rng + ?Sized>(now: Timestamp, rng: &mut R) -> Self {
        let millis = now.timestamp_millis().max(0) as u64;
        let salt = rng.gen_range(0..u64::MAX);
        EntityId(format!("{}{}", to_base36(millis), to_base36(salt)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Species {
    Basic,
    Long,
    Round,
    Angel,
    Betta,
    Dragon,
    Seahorse,
}

impl Species {
    pub const ALL: [Species; 7] = [
        Species::Basic,
        Species::Long,
        Species::Round,
        Species::Angel,
        Species::Betta,
        Species::Dragon,
        Species::Seahorse,
    ];

    /// Species a default or reward fry may be drawn from.
    pub const STARTERS: [Species; 5] = [
        Species::Basic,
        Species::Long,
        Species::Round,
        Species::Angel,
        Species::Betta,
    ];

    pub fn base_hue(self) -> f64 {
        match self {
            Species::Basic => 155.0,
            Species::Long => 20.0,
            Species::Round => 280.0,
            Species::Angel => 200.0,
            Species::Betta => 340.0,
            Species::Dragon => 45.0,
            Species::Seahorse => 30.0,
        }
    }

    pub fn default_size(self) -> f64 {
        match self {
            Species::Basic => 24.0,
            Species::Long => 22.0,
            Species::Round => 21.0,
            Species::Angel => 22.0,
            Species::Betta => 20.0,
            Species::Dragon => 24.0,
            Species::Seahorse => 19.0,
        }
    }

    pub fn price(self) -> f64 {
        match self {
            Species::Basic => 30.0,
            Species::Long => 60.0,
            Species::Round => 100.0,
            Species::Angel => 150.0,
            Species::Betta => 200.0,
            Species::Seahorse => 250.0,
            Species::Dragon => 400.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Species::Basic => "basic",
            Species::Long => "long",
            Species::Round => "round",
            Species::Angel => "angel",
            Species::Betta => "betta",
            Species::Dragon => "dragon",
            Species::Seahorse => "seahorse",
        }
    }

    pub fn parse(raw: &str) -> Option<Species> {
        let raw = raw.trim().to_ascii_lowercase();
        Species::ALL.into_iter().find(|s| s.name() == raw)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifeStage {
    Fry,
    Juvenile,
    Adult,
    Dead,
}

impl LifeStage {
    pub fn is_growing(self) -> bool {
        matches!(self, LifeStage::Fry | LifeStage::Juvenile)
    }

    pub fn is_alive(self) -> bool {
        self != LifeStage::Dead
    }

    /// Stage reached when growth completes. Adults and the dead stay put.
    pub fn matured(self) -> LifeStage {
        match self {
            LifeStage::Fry => LifeStage::Juvenile,
            LifeStage::Juvenile => LifeStage::Adult,
            other => other,
        }
    }

    /// Debug-only cycle; the one path allowed to move a stage backwards.
    pub fn debug_next(self) -> LifeStage {
        match self {
            LifeStage::Fry => LifeStage::Juvenile,
            LifeStage::Juvenile => LifeStage::Adult,
            LifeStage::Adult => LifeStage::Dead,
            LifeStage::Dead => LifeStage::Fry,
        }
    }

    pub fn size_factor(self) -> f64 {
        match self {
            LifeStage::Fry => 0.38,
            LifeStage::Juvenile => 0.62,
            LifeStage::Adult | LifeStage::Dead => 1.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LifeStage::Fry => "fry",
            LifeStage::Juvenile => "juvenile",
            LifeStage::Adult => "adult",
            LifeStage::Dead => "dead",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecorationKind {
    Kelp,
    CoralFan,
    CoralBranch,
    Anemone,
    TreasureChest,
}

impl DecorationKind {
    pub const ALL: [DecorationKind; 5] = [
        DecorationKind::Kelp,
        DecorationKind::CoralFan,
        DecorationKind::CoralBranch,
        DecorationKind::Anemone,
        DecorationKind::TreasureChest,
    ];

    /// Living kinds take their vigor from tank health; the chest never does.
    pub fn is_living(self) -> bool {
        !matches!(self, DecorationKind::TreasureChest)
    }

    pub fn price(self) -> f64 {
        match self {
            DecorationKind::Kelp => 40.0,
            DecorationKind::CoralFan => 70.0,
            DecorationKind::CoralBranch => 70.0,
            DecorationKind::Anemone => 90.0,
            DecorationKind::TreasureChest => 120.0,
        }
    }

    pub fn default_hue(self) -> f64 {
        match self {
            DecorationKind::Kelp => 120.0,
            DecorationKind::CoralFan => 350.0,
            DecorationKind::CoralBranch => 15.0,
            DecorationKind::Anemone => 300.0,
            DecorationKind::TreasureChest => 40.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DecorationKind::Kelp => "kelp",
            DecorationKind::CoralFan => "coral_fan",
            DecorationKind::CoralBranch => "coral_branch",
            DecorationKind::Anemone => "anemone",
            DecorationKind::TreasureChest => "treasure_chest",
        }
    }

    pub fn parse(raw: &str) -> Option<DecorationKind> {
        let raw = raw.trim().to_ascii_lowercase().replace('-', "_");
        DecorationKind::ALL.into_iter().find(|k| k.name() == raw)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Background {
    #[default]
    Default,
    Twilight,
    KelpForest,
    CoralReef,
    Abyss,
    Bioluminescent,
    GoldenReef,
}

impl Background {
    pub const ALL: [Background; 7] = [
        Background::Default,
        Background::Twilight,
        Background::KelpForest,
        Background::CoralReef,
        Background::Abyss,
        Background::Bioluminescent,
        Background::GoldenReef,
    ];

    pub fn price(self) -> f64 {
        match self {
            Background::Default => 0.0,
            Background::Twilight => 80.0,
            Background::KelpForest => 120.0,
            Background::CoralReef => 150.0,
            Background::Abyss => 200.0,
            Background::Bioluminescent => 300.0,
            Background::GoldenReef => 500.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Background::Default => "default",
            Background::Twilight => "twilight",
            Background::KelpForest => "kelp_forest",
            Background::CoralReef => "coral_reef",
            Background::Abyss => "abyss",
            Background::Bioluminescent => "bioluminescent",
            Background::GoldenReef => "golden_reef",
        }
    }

    pub fn parse(raw: &str) -> Option<Background> {
        let raw = raw.trim().to_ascii_lowercase().replace('-', "_");
        Background::ALL.into_iter().find(|b| b.name() == raw)
    }
}

fn full_health() -> f64 {
    100.0
}

fn default_base_size() -> f64 {
    22.0
}

fn default_velocity_scale() -> f64 {
    1.0
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FishSnapshot {
    pub id: EntityId,
    #[serde(alias = "type")]
    pub species: Species,
    #[serde(alias = "stage")]
    pub life_stage: LifeStage,
    #[serde(default)]
    pub hue: f64,
    #[serde(default = "full_health")]
    pub health: f64,
    #[serde(default)]
    pub growth: f64,
    #[serde(default, alias = "foodGrowth")]
    pub food_bonus_accumulated: f64,
    #[serde(default = "default_base_size", alias = "maxSize")]
    pub base_size: f64,
    #[serde(default = "default_velocity_scale", alias = "speed")]
    pub velocity_scale: f64,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub born_at: Option<Timestamp>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub died_at: Option<Timestamp>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub released_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecorationSnapshot {
    pub id: EntityId,
    #[serde(alias = "type")]
    pub kind: DecorationKind,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub hue: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub released_at: Option<Timestamp>,
}

/// Entry in the consumer-drained queue of fish granted while no tank was open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingFish {
    #[serde(alias = "type")]
    pub species: Species,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hue: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkHours {
    pub enabled: bool,
    pub start: String,
    pub end: String,
    pub days: Vec<u8>,
}

impl Default for WorkHours {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_WORK_HOURS.enabled,
            start: DEFAULT_WORK_HOURS.start.to_string(),
            end: DEFAULT_WORK_HOURS.end.to_string(),
            days: DEFAULT_WORK_HOURS.days.to_vec(),
        }
    }
}

impl WorkHours {
    /// True when gating is off, or `at` falls on an active weekday inside [start, end).
    pub fn contains(&self, at: &DateTime<Local>) -> bool {
        if !self.enabled {
            return true;
        }

        let weekday = at.weekday().num_days_from_sunday() as u8;
        if !self.days.contains(&weekday) {
            return false;
        }

        let (start, end) = match (minutes_of_day(&self.start), minutes_of_day(&self.end)) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                log::warn!(
                    "Malformed work hours {}-{}, using the default window",
                    self.start,
                    self.end
                );
                (
                    minutes_of_day(DEFAULT_WORK_HOURS.start).unwrap_or(9 * 60),
                    minutes_of_day(DEFAULT_WORK_HOURS.end).unwrap_or(18 * 60),
                )
            }
        };

        let now = at.hour() * 60 + at.minute();
        now >= start && now < end
    }
}

pub fn minutes_of_day(raw: &str) -> Option<u32> {
    let time = NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()?;
    Some(time.hour() * 60 + time.minute())
}

/// Ordered set of host suffixes considered distracting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blocklist(Vec<String>);

impl Default for Blocklist {
    fn default() -> Self {
        Blocklist::new(DEFAULT_BLOCKLIST.iter().copied())
    }
}

impl Blocklist {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Blocklist(
            entries
                .into_iter()
                .map(|e| normalize_host(e.as_ref()))
                .filter(|e| !e.is_empty())
                .unique()
                .collect(),
        )
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    /// Exact match or sub-domain match against any entry.
    pub fn matches(&self, host: &str) -> bool {
        let host = normalize_host(host);
        if host.is_empty() {
            return false;
        }
        self.0.iter().any(|entry| {
            let entry = normalize_host(entry);
            !entry.is_empty()
                && (host == entry
                    || host
                        .strip_suffix(entry.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.')))
        })
    }

    pub fn insert(&mut self, entry: &str) -> bool {
        let entry = normalize_host(entry);
        if entry.is_empty() || self.0.contains(&entry) {
            return false;
        }
        self.0.push(entry);
        true
    }

    pub fn remove(&mut self, entry: &str) -> bool {
        let entry = normalize_host(entry);
        let before = self.0.len();
        self.0.retain(|e| *e != entry);
        self.0.len() != before
    }
}

pub fn normalize_host(raw: &str) -> String {
    let lowered = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    lowered
        .strip_prefix("www.")
        .map(ToString::to_string)
        .unwrap_or(lowered)
}

/// Score, currency and daily counters owned by the background ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusState {
    pub focus_score: f64,
    pub focus_seconds: u64,
    pub distracted_seconds: u64,
    pub is_distracting: bool,
    pub current_site_id: String,
    pub coins: f64,
    pub last_daily_claim_date: Option<String>,
    pub last_focus_date: String,
    pub focus_streak_ticks: u32,
}

impl Default for FocusState {
    fn default() -> Self {
        Self {
            focus_score: GAME_BALANCE.start_score,
            focus_seconds: 0,
            distracted_seconds: 0,
            is_distracting: false,
            current_site_id: String::new(),
            coins: 0.0,
            last_daily_claim_date: None,
            last_focus_date: String::new(),
            focus_streak_ticks: 0,
        }
    }
}

/// Countdown anchored on a wall-clock start so a closed UI does not drift it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pomodoro {
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub started_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<u32>,
}

impl Pomodoro {
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn remaining_at(&self, now: Timestamp, duration_secs: u32) -> u32 {
        let base = self.remaining_secs.unwrap_or(duration_secs);
        match self.started_at {
            Some(started) => {
                let elapsed = (now - started).num_seconds().max(0) as u64;
                base.saturating_sub(elapsed.min(u32::MAX as u64) as u32)
            }
            None => base,
        }
    }

    pub fn start(&mut self, now: Timestamp, duration_secs: u32) {
        if self.is_running() {
            return;
        }
        let remaining = self
            .remaining_secs
            .filter(|secs| *secs > 0)
            .unwrap_or(duration_secs);
        self.remaining_secs = Some(remaining);
        self.started_at = Some(now);
    }

    pub fn pause(&mut self, now: Timestamp, duration_secs: u32) {
        if !self.is_running() {
            return;
        }
        self.remaining_secs = Some(self.remaining_at(now, duration_secs));
        self.started_at = None;
    }

    pub fn is_complete(&self, now: Timestamp, duration_secs: u32) -> bool {
        self.is_running() && self.remaining_at(now, duration_secs) == 0
    }
}
