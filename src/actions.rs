use chrono::{DateTime, Local, Utc};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

use crate::{
    classifier::site_of,
    config::Balance,
    domain::{
        Background, DecorationKind, DecorationSnapshot, EntityId, FishSnapshot, FocusState,
        LifeStage, PendingFish, Pomodoro, Species, Timestamp, WorkHours, day_key, minutes_of_day,
    },
    score::round_coins,
    storage::{Entries, KvStore, StoreError, field, keys, list_field, load_snapshot, put},
    sync::merge::append_unique,
    tank::{decoration, food::FoodSupply},
};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("not enough coins: need {needed:.0}, have {available:.2}")]
    InsufficientCoins { needed: f64, available: f64 },
    #[error("daily reward already claimed today")]
    AlreadyClaimed,
    #[error("no {kind} with id '{id}'")]
    NotFound { kind: &'static str, id: String },
    #[error("background '{0}' is already unlocked")]
    AlreadyOwned(String),
    #[error("background '{0}' is locked, buy it first")]
    BackgroundLocked(String),
    #[error("invalid work hours: {0}")]
    InvalidWorkHours(String),
    #[error("export failed: {0}")]
    Export(String),
}

/// Reads the stored balance and writes it back reduced by `price`.
pub fn spend_coins(store: &dyn KvStore, price: f64) -> Result<f64, ActionError> {
    let entries = store.get(&[keys::COINS])?;
    let available = field::<f64>(&entries, keys::COINS)
        .filter(|c| c.is_finite())
        .unwrap_or(0.0)
        .max(0.0);
    if available + 1e-9 < price {
        return Err(ActionError::InsufficientCoins {
            needed: price,
            available,
        });
    }

    let remaining = round_coins((available - price).max(0.0));
    let mut update = Entries::new();
    put(&mut update, keys::COINS, &remaining)?;
    store.set(update)?;
    Ok(remaining)
}

pub fn claim_daily(
    store: &dyn KvStore,
    balance: &Balance,
    now_local: &DateTime<Local>,
) -> Result<f64, ActionError> {
    let snapshot = load_snapshot(store, balance.start_score)?;
    let today = day_key(now_local);
    if snapshot.focus.last_daily_claim_date.as_deref() == Some(today.as_str()) {
        return Err(ActionError::AlreadyClaimed);
    }

    let coins = round_coins(snapshot.focus.coins + balance.daily_reward);
    let mut entries = Entries::new();
    put(&mut entries, keys::COINS, &coins)?;
    put(&mut entries, keys::LAST_DAILY_CLAIM_DATE, &today)?;
    store.set(entries)?;

    log::info!("Claimed daily reward of {} coins", balance.daily_reward);
    Ok(coins)
}

/// The three adults a reset tank starts with.
pub fn default_adults<R: Rng + ?Sized>(now: Timestamp, rng: &mut R) -> Vec<FishSnapshot> {
    [(Species::Basic, 1.2), (Species::Long, 0.9), (Species::Round, 1.0)]
        .into_iter()
        .map(|(species, speed)| FishSnapshot {
            id: EntityId::generate(now, rng),
            species,
            life_stage: LifeStage::Adult,
            hue: species.base_hue(),
            health: 80.0,
            growth: 0.0,
            food_bonus_accumulated: 0.0,
            base_size: species.default_size(),
            velocity_scale: speed,
            born_at: Some(now),
            died_at: None,
            released_at: None,
        })
        .collect()
}

/// Wipes progress and restocks the tank. Returns the new reset epoch, which tells
/// any open foreground to rebuild instead of merging.
pub fn reset_tank<R: Rng + ?Sized>(
    store: &dyn KvStore,
    balance: &Balance,
    now_local: &DateTime<Local>,
    rng: &mut R,
) -> Result<u64, ActionError> {
    let now = now_local.with_timezone(&Utc);
    let snapshot = load_snapshot(store, balance.start_score)?;
    let epoch = snapshot.reset_epoch + 1;
    let empty_fish: Vec<FishSnapshot> = Vec::new();
    let empty_decorations: Vec<DecorationSnapshot> = Vec::new();

    let mut entries = Entries::new();
    put(&mut entries, keys::TANK_FISH, &default_adults(now, rng))?;
    put(&mut entries, keys::TANK_DECORATIONS, &empty_decorations)?;
    put(&mut entries, keys::GRAVEYARD_FISH, &empty_fish)?;
    put(&mut entries, keys::RELEASED_FISH, &empty_fish)?;
    put(&mut entries, keys::RELEASED_DECORATIONS, &empty_decorations)?;
    put(&mut entries, keys::PENDING_FISH, &Vec::<PendingFish>::new())?;
    put(&mut entries, keys::COINS, &0.0)?;
    put(&mut entries, keys::FOCUS_SCORE, &balance.start_score)?;
    put(&mut entries, keys::FOCUS_SECONDS, &0u64)?;
    put(&mut entries, keys::DISTRACTED_SECONDS, &0u64)?;
    put(&mut entries, keys::FOCUS_STREAK_TICKS, &0u32)?;
    put(&mut entries, keys::LAST_FOCUS_DATE, &day_key(now_local))?;
    put(&mut entries, keys::POMODORO, &Pomodoro::default())?;
    put(&mut entries, keys::RESET_EPOCH, &epoch)?;
    FoodSupply::full(now, balance.max_food).write_to(&mut entries);
    store.set(entries)?;
    store.remove(&[
        keys::LAST_DAILY_CLAIM_DATE,
        keys::LEGACY_FOCUS_MINUTES,
        keys::LEGACY_DISTRACTED_MINUTES,
    ])?;

    log::info!("Tank reset (epoch {})", epoch);
    Ok(epoch)
}

/// Moves a fish from the tank into the append-only released log.
pub fn release_fish(store: &dyn KvStore, id: &str, now: Timestamp) -> Result<FishSnapshot, ActionError> {
    let stored = store.get(&[keys::TANK_FISH, keys::RELEASED_FISH])?;
    let mut fish: Vec<FishSnapshot> = list_field(&stored, keys::TANK_FISH);
    let mut released: Vec<FishSnapshot> = list_field(&stored, keys::RELEASED_FISH);

    let Some(index) = fish.iter().position(|f| f.id.as_str() == id) else {
        return Err(ActionError::NotFound {
            kind: "fish",
            id: id.to_string(),
        });
    };
    let mut entry = fish.remove(index);
    entry.released_at = Some(now);
    append_unique(&mut released, [entry.clone()], |f| &f.id);

    let mut entries = Entries::new();
    put(&mut entries, keys::TANK_FISH, &fish)?;
    put(&mut entries, keys::RELEASED_FISH, &released)?;
    store.set(entries)?;

    log::info!("Released {} fish {}", entry.species.name(), entry.id);
    Ok(entry)
}

pub fn release_decoration(
    store: &dyn KvStore,
    id: &str,
    now: Timestamp,
) -> Result<DecorationSnapshot, ActionError> {
    let stored = store.get(&[keys::TANK_DECORATIONS, keys::RELEASED_DECORATIONS])?;
    let mut decorations: Vec<DecorationSnapshot> = list_field(&stored, keys::TANK_DECORATIONS);
    let mut released: Vec<DecorationSnapshot> = list_field(&stored, keys::RELEASED_DECORATIONS);

    let Some(index) = decorations.iter().position(|d| d.id.as_str() == id) else {
        return Err(ActionError::NotFound {
            kind: "decoration",
            id: id.to_string(),
        });
    };
    let mut entry = decorations.remove(index);
    entry.released_at = Some(now);
    append_unique(&mut released, [entry.clone()], |d| &d.id);

    let mut entries = Entries::new();
    put(&mut entries, keys::TANK_DECORATIONS, &decorations)?;
    put(&mut entries, keys::RELEASED_DECORATIONS, &released)?;
    store.set(entries)?;

    log::info!("Released {} {}", entry.kind.name(), entry.id);
    Ok(entry)
}

/// Charges for a fish and queues it. Whichever context drains the queue first spawns it.
pub fn purchase_fish(store: &dyn KvStore, species: Species) -> Result<f64, ActionError> {
    let remaining = spend_coins(store, species.price())?;
    let mut pending: Vec<PendingFish> = list_field(&store.get(&[keys::PENDING_FISH])?, keys::PENDING_FISH);
    pending.push(PendingFish { species, hue: None });

    let mut entries = Entries::new();
    put(&mut entries, keys::PENDING_FISH, &pending)?;
    store.set(entries)?;

    log::info!("Bought a {} fish", species.name());
    Ok(remaining)
}

pub fn purchase_decoration<R: Rng + ?Sized>(
    store: &dyn KvStore,
    kind: DecorationKind,
    now: Timestamp,
    rng: &mut R,
) -> Result<DecorationSnapshot, ActionError> {
    spend_coins(store, kind.price())?;
    let snap = decoration::new_snapshot(kind, None, now, rng);
    add_decoration(store, &snap)?;

    log::info!("Bought a {}", kind.name());
    Ok(snap)
}

/// Appends a decoration to the stored list unless its id is already there.
pub fn add_decoration(store: &dyn KvStore, snap: &DecorationSnapshot) -> Result<(), ActionError> {
    let mut decorations: Vec<DecorationSnapshot> =
        list_field(&store.get(&[keys::TANK_DECORATIONS])?, keys::TANK_DECORATIONS);
    if append_unique(&mut decorations, [snap.clone()], |d| &d.id) == 0 {
        return Ok(());
    }
    let mut entries = Entries::new();
    put(&mut entries, keys::TANK_DECORATIONS, &decorations)?;
    store.set(entries)?;
    Ok(())
}

pub fn purchase_background(store: &dyn KvStore, background: Background) -> Result<f64, ActionError> {
    let mut unlocked: Vec<Background> =
        list_field(&store.get(&[keys::UNLOCKED_BACKGROUNDS])?, keys::UNLOCKED_BACKGROUNDS);
    if background == Background::Default || unlocked.contains(&background) {
        return Err(ActionError::AlreadyOwned(background.name().to_string()));
    }

    let remaining = spend_coins(store, background.price())?;
    unlocked.push(background);
    let mut entries = Entries::new();
    put(&mut entries, keys::UNLOCKED_BACKGROUNDS, &unlocked)?;
    put(&mut entries, keys::TANK_BACKGROUND, &background)?;
    store.set(entries)?;

    log::info!("Unlocked the {} background", background.name());
    Ok(remaining)
}

pub fn select_background(
    store: &dyn KvStore,
    balance: &Balance,
    background: Background,
) -> Result<(), ActionError> {
    let snapshot = load_snapshot(store, balance.start_score)?;
    if !snapshot.unlocked_backgrounds.contains(&background) {
        return Err(ActionError::BackgroundLocked(background.name().to_string()));
    }
    let mut entries = Entries::new();
    put(&mut entries, keys::TANK_BACKGROUND, &background)?;
    store.set(entries)?;
    Ok(())
}

/// Accepts a bare host or a full URL. Returns false when the site was already listed.
pub fn block_site(store: &dyn KvStore, balance: &Balance, site: &str) -> Result<bool, ActionError> {
    let host = site_of(site).unwrap_or_else(|| site.to_string());
    let mut blocklist = load_snapshot(store, balance.start_score)?.blocklist;
    if !blocklist.insert(&host) {
        return Ok(false);
    }
    let mut entries = Entries::new();
    put(&mut entries, keys::BLOCKLIST, blocklist.entries())?;
    store.set(entries)?;
    Ok(true)
}

/// Returns false when the site was not listed.
pub fn unblock_site(store: &dyn KvStore, balance: &Balance, site: &str) -> Result<bool, ActionError> {
    let host = site_of(site).unwrap_or_else(|| site.to_string());
    let mut blocklist = load_snapshot(store, balance.start_score)?.blocklist;
    if !blocklist.remove(&host) {
        return Ok(false);
    }
    let mut entries = Entries::new();
    put(&mut entries, keys::BLOCKLIST, blocklist.entries())?;
    store.set(entries)?;
    Ok(true)
}

pub fn set_work_hours(store: &dyn KvStore, hours: WorkHours) -> Result<(), ActionError> {
    let (Some(start), Some(end)) = (minutes_of_day(&hours.start), minutes_of_day(&hours.end)) else {
        return Err(ActionError::InvalidWorkHours(format!(
            "'{}'-'{}' is not HH:MM-HH:MM",
            hours.start, hours.end
        )));
    };
    if start >= end {
        return Err(ActionError::InvalidWorkHours("start must be before end".to_string()));
    }
    if let Some(day) = hours.days.iter().find(|d| **d > 6) {
        return Err(ActionError::InvalidWorkHours(format!(
            "day {} is out of range 0 (Sun) to 6 (Sat)",
            day
        )));
    }

    let mut entries = Entries::new();
    put(&mut entries, keys::WORK_HOURS, &hours)?;
    store.set(entries)?;
    Ok(())
}

pub fn start_pomodoro(store: &dyn KvStore, balance: &Balance, now: Timestamp) -> Result<Pomodoro, ActionError> {
    let mut pomodoro = load_snapshot(store, balance.start_score)?.pomodoro;
    pomodoro.start(now, balance.pomodoro_secs);
    let mut entries = Entries::new();
    put(&mut entries, keys::POMODORO, &pomodoro)?;
    store.set(entries)?;
    Ok(pomodoro)
}

pub fn pause_pomodoro(store: &dyn KvStore, balance: &Balance, now: Timestamp) -> Result<Pomodoro, ActionError> {
    let mut pomodoro = load_snapshot(store, balance.start_score)?.pomodoro;
    pomodoro.pause(now, balance.pomodoro_secs);
    let mut entries = Entries::new();
    put(&mut entries, keys::POMODORO, &pomodoro)?;
    store.set(entries)?;
    Ok(pomodoro)
}

/// Pays out a finished countdown: reward coins plus a random starter fry in the
/// pending queue. Returns whether it paid.
pub fn settle_pomodoro<R: Rng + ?Sized>(
    pomodoro: &mut Pomodoro,
    focus: &mut FocusState,
    pending: &mut Vec<PendingFish>,
    now: Timestamp,
    balance: &Balance,
    rng: &mut R,
) -> bool {
    if !pomodoro.is_complete(now, balance.pomodoro_secs) {
        return false;
    }
    *pomodoro = Pomodoro::default();
    focus.coins = round_coins(focus.coins + balance.pomodoro_reward);
    let species = Species::STARTERS[rng.gen_range(0..Species::STARTERS.len())];
    pending.push(PendingFish { species, hue: None });
    log::info!(
        "Pomodoro complete: +{} coins and a {} fry",
        balance.pomodoro_reward,
        species.name()
    );
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryLog {
    Graveyard,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryFormat {
    Json,
    Csv,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryExport {
    pub schema_version: u32,
    pub exported_at: DateTime<Utc>,
    pub fish: Vec<FishSnapshot>,
    pub decorations: Vec<DecorationSnapshot>,
}

/// Flat row for spreadsheet export; fish and decorations share the columns.
#[derive(Debug, Serialize)]
struct HistoryRow {
    entity: &'static str,
    id: String,
    kind: &'static str,
    stage: &'static str,
    health: Option<f64>,
    born_at: Option<String>,
    ended_at: Option<String>,
}

impl HistoryRow {
    fn from_fish(fish: &FishSnapshot) -> Self {
        HistoryRow {
            entity: "fish",
            id: fish.id.to_string(),
            kind: fish.species.name(),
            stage: fish.life_stage.name(),
            health: Some(fish.health),
            born_at: fish.born_at.map(|t| t.to_rfc3339()),
            ended_at: fish.died_at.or(fish.released_at).map(|t| t.to_rfc3339()),
        }
    }

    fn from_decoration(decoration: &DecorationSnapshot) -> Self {
        HistoryRow {
            entity: "decoration",
            id: decoration.id.to_string(),
            kind: decoration.kind.name(),
            stage: "",
            health: None,
            born_at: None,
            ended_at: decoration.released_at.map(|t| t.to_rfc3339()),
        }
    }
}

pub fn export_history(
    store: &dyn KvStore,
    log: HistoryLog,
    format: HistoryFormat,
    now: Timestamp,
) -> Result<String, ActionError> {
    let stored = store.get(&[
        keys::GRAVEYARD_FISH,
        keys::RELEASED_FISH,
        keys::RELEASED_DECORATIONS,
    ])?;
    let (fish, decorations): (Vec<FishSnapshot>, Vec<DecorationSnapshot>) = match log {
        HistoryLog::Graveyard => (list_field(&stored, keys::GRAVEYARD_FISH), Vec::new()),
        HistoryLog::Released => (
            list_field(&stored, keys::RELEASED_FISH),
            list_field(&stored, keys::RELEASED_DECORATIONS),
        ),
    };

    match format {
        HistoryFormat::Json => {
            let export = HistoryExport {
                schema_version: 1,
                exported_at: now,
                fish,
                decorations,
            };
            serde_json::to_string_pretty(&export).map_err(|e| ActionError::Export(e.to_string()))
        }
        HistoryFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            let rows = fish
                .iter()
                .map(HistoryRow::from_fish)
                .chain(decorations.iter().map(HistoryRow::from_decoration));
            for row in rows {
                writer
                    .serialize(row)
                    .map_err(|e| ActionError::Export(e.to_string()))?;
            }
            let bytes = writer
                .into_inner()
                .map_err(|e| ActionError::Export(e.to_string()))?;
            String::from_utf8(bytes).map_err(|e| ActionError::Export(e.to_string()))
        }
    }
}
