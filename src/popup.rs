use chrono::{DateTime, Local, Utc};
use rand::Rng;

use crate::{
    actions::{ActionError, spend_coins},
    config::Balance,
    constants::{TANK_SETTINGS, TIME_SETTINGS},
    domain::{Background, DecorationKind, EntityId, FishSnapshot, FocusState, LifeStage, Species, Timestamp, day_key},
    storage::{Entries, KvStore, StoreError, keys, load_snapshot, put},
    sync::{
        LocalState, PollOutcome, Synchronizer, archive_to_graveyard, hydrate_fish,
        interpolator::TimeInterpolator,
        writer::{Coalesced, WriteBuffer},
    },
    tank::{
        FrameOutcome, Presentation, SimContext, Tank, TankView,
        decoration::{DebugVigor, Decoration},
        fish::Fish,
        food::FoodSupply,
    },
};

/// Minimum hit radius for taps on small fry.
const TAP_RADIUS: f64 = 22.0;
const GRAB_RADIUS: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedOutcome {
    Dropped(usize),
    /// Debug mode tap on a fish.
    StageCycled(LifeStage),
    /// Debug mode tap on a living decoration.
    VigorCycled(DebugVigor),
    NoFood,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PopupView {
    pub tank: TankView,
    pub background: Background,
    pub focus_score: f64,
    pub coins: f64,
    pub is_distracting: bool,
    pub site: String,
    pub focus_seconds: u64,
    pub distracted_seconds: u64,
    pub food: u32,
    pub next_food_in_secs: Option<i64>,
}

/// The foreground context: owns the live tank and everything it keeps between polls.
pub struct Popup {
    pub local: LocalState,
    pub presentation: Presentation,
    pub background: Background,
    sync: Synchronizer,
    balance: Balance,
    /// Dead fish whose graveyard write failed; kept in the stored fish list until it lands.
    unarchived: Vec<FishSnapshot>,
    /// False until the store has been read once. Before that the tank is a
    /// stand-in and nothing local may overwrite the stored tank.
    hydrated: bool,
}

impl Popup {
    /// Startup hydration. Never fails: an unreadable store yields a single fry
    /// that lives only in memory until the store comes back.
    pub fn open<R: Rng + ?Sized>(
        store: &dyn KvStore,
        balance: Balance,
        now_local: &DateTime<Local>,
        rng: &mut R,
    ) -> Self {
        let now = now_local.with_timezone(&Utc);
        let today = day_key(now_local);
        let mut tank = Tank::new();
        let mut writer = WriteBuffer::new(TIME_SETTINGS.debounce_ms);

        let snapshot = match load_snapshot(store, balance.start_score) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("Store unavailable at startup: {}", e);
                let (width, height) = (tank.width, tank.height);
                tank.fish.push(random_fry(now, width, height, rng));
                return Self {
                    local: LocalState {
                        tank,
                        writer,
                        interpolator: TimeInterpolator::new(
                            0,
                            0,
                            today,
                            TIME_SETTINGS.writeback_secs,
                            TIME_SETTINGS.foreground_active_secs,
                        ),
                        food: FoodSupply::full(now, balance.max_food),
                        focus: FocusState::default(),
                        verdict: None,
                    },
                    presentation: Presentation::default(),
                    background: Background::Default,
                    sync: Synchronizer::new(),
                    balance,
                    unarchived: Vec::new(),
                    hydrated: false,
                };
            }
        };

        tank.decorations = snapshot
            .decorations
            .iter()
            .map(|d| Decoration::from_snapshot(d, rng))
            .collect();
        let dead = hydrate_fish(&mut tank, &snapshot.fish, now, rng);

        let mut unarchived = Vec::new();
        if !dead.is_empty() {
            log::info!("Archiving {} fish that died while the tank was closed", dead.len());
            if let Err(e) = archive_to_graveyard(store, &mut writer, dead.clone(), tank.fish_snapshots(), now) {
                log::warn!("Could not archive dead fish: {}", e);
                unarchived = dead;
            }
        }

        let counters_day = if snapshot.focus.last_focus_date.is_empty() {
            today
        } else {
            snapshot.focus.last_focus_date.clone()
        };
        let mut popup = Self {
            local: LocalState {
                tank,
                writer,
                interpolator: TimeInterpolator::new(
                    snapshot.focus.focus_seconds,
                    snapshot.focus.distracted_seconds,
                    counters_day,
                    TIME_SETTINGS.writeback_secs,
                    TIME_SETTINGS.foreground_active_secs,
                ),
                food: FoodSupply::from_stored(
                    snapshot.food_supply,
                    snapshot.food_last_refill_at,
                    now,
                    balance.max_food,
                ),
                focus: snapshot.focus.clone(),
                verdict: None,
            },
            presentation: Presentation::default(),
            background: snapshot.background,
            sync: Synchronizer::with_epoch(snapshot.reset_epoch),
            balance,
            unarchived,
            hydrated: true,
        };

        if snapshot.pending_fish.is_empty() {
            popup.seed_if_empty(now, rng);
        }
        popup
    }

    fn seed_if_empty<R: Rng + ?Sized>(&mut self, now: Timestamp, rng: &mut R) {
        if !self.local.tank.fish.is_empty() {
            return;
        }
        let (width, height) = (self.local.tank.width, self.local.tank.height);
        for _ in 0..TANK_SETTINGS.default_fry_count {
            self.local.tank.fish.push(random_fry(now, width, height, rng));
        }
        log::info!("Empty tank, added {} fry", TANK_SETTINGS.default_fry_count);
        self.stage_fish(now);
    }

    pub fn balance(&self) -> &Balance {
        &self.balance
    }

    /// Fish list as it should be stored, including dead fish still awaiting archival.
    fn stored_fish(&self) -> Vec<FishSnapshot> {
        let mut fish = self.local.tank.fish_snapshots();
        fish.extend(self.unarchived.iter().cloned());
        fish
    }

    fn stage_fish(&mut self, now: Timestamp) {
        if !self.hydrated {
            return;
        }
        let mut entries = Entries::new();
        match put(&mut entries, keys::TANK_FISH, &self.stored_fish()) {
            Ok(()) => self.local.writer.stage(Coalesced(entries), now),
            Err(e) => log::warn!("Could not serialize fish: {}", e),
        }
    }

    fn stage_decorations(&mut self, now: Timestamp) {
        if !self.hydrated {
            return;
        }
        let mut entries = Entries::new();
        match put(&mut entries, keys::TANK_DECORATIONS, &self.local.tank.decoration_snapshots()) {
            Ok(()) => self.local.writer.stage(Coalesced(entries), now),
            Err(e) => log::warn!("Could not serialize decorations: {}", e),
        }
    }

    fn stage_food(&mut self, now: Timestamp) {
        if !self.hydrated {
            return;
        }
        let mut entries = Entries::new();
        self.local.food.write_to(&mut entries);
        self.local.writer.stage(Coalesced(entries), now);
    }

    fn archive(&mut self, store: &dyn KvStore, dead: Vec<FishSnapshot>, now: Timestamp) {
        if !self.hydrated {
            // Memory-only fish; the stored tank is not ours to rewrite yet.
            return;
        }
        let remaining = self.local.tank.fish_snapshots();
        match archive_to_graveyard(store, &mut self.local.writer, dead.clone(), remaining, now) {
            Ok(_) => {}
            Err(e) => {
                log::warn!("Graveyard write failed, will retry: {}", e);
                self.unarchived.extend(dead);
            }
        }
    }

    /// One animation frame: simulate, archive, then flush whatever is due.
    pub fn frame<R: Rng + ?Sized>(&mut self, store: &dyn KvStore, now: Timestamp, rng: &mut R) -> FrameOutcome {
        let ctx = SimContext {
            focus_score: self.local.focus.focus_score,
            now,
        };
        let outcome = self.local.tank.frame(&ctx, &self.presentation.overrides(), rng);

        let mut dead = std::mem::take(&mut self.unarchived);
        dead.extend(outcome.archived.iter().cloned());
        if !dead.is_empty() {
            self.archive(store, dead, now);
        } else if outcome.fish_changed {
            self.stage_fish(now);
        }

        if let Err(e) = self.local.writer.flush_due(store, now) {
            log::warn!("Debounced write failed: {}", e);
        }
        outcome
    }

    pub fn poll<R: Rng + ?Sized>(
        &mut self,
        store: &dyn KvStore,
        tab_url: Option<&str>,
        now_local: &DateTime<Local>,
        rng: &mut R,
    ) -> PollOutcome {
        let outcome = self
            .sync
            .poll(store, &mut self.local, tab_url, now_local, &self.balance, rng);
        if let PollOutcome::Synced(report) = &outcome {
            if !self.hydrated {
                log::info!("Store is back, the stored tank replaces the stand-in");
                self.hydrated = true;
                self.unarchived.clear();
                let now = now_local.with_timezone(&Utc);
                if report.pending_spawned == 0 {
                    self.seed_if_empty(now, rng);
                }
            }
            if report.reset_observed {
                self.unarchived.clear();
                self.presentation.dragging = None;
                self.presentation.decoration_vigor.clear();
            }
        }
        outcome
    }

    /// Per-second clock: advances the local counters and schedules their write-back.
    pub fn clock(&mut self, now_local: &DateTime<Local>) -> u64 {
        let Some(verdict) = self.local.verdict.clone() else {
            return 0;
        };
        let counted = self.local.interpolator.advance(now_local, &verdict);
        self.local.focus.focus_seconds = self.local.interpolator.focus_seconds;
        self.local.focus.distracted_seconds = self.local.interpolator.distracted_seconds;

        let now = now_local.with_timezone(&Utc);
        if let Some(write) = self.local.interpolator.writeback_due(now) {
            self.local.writer.stage(write, now);
        }
        counted
    }

    /// A tap on the tank. In debug mode a tap on a fish cycles its stage and a tap
    /// on a living decoration cycles its display state instead.
    pub fn feed<R: Rng + ?Sized>(&mut self, x: f64, y: f64, now: Timestamp, rng: &mut R) -> FeedOutcome {
        if self.presentation.debug_mode {
            if let Some(fish) = self.local.tank.fish_at(x, y, TAP_RADIUS) {
                fish.debug_cycle_stage(now);
                let stage = fish.life_stage;
                log::debug!("Debug: fish {} is now {}", fish.id, stage.name());
                self.stage_fish(now);
                return FeedOutcome::StageCycled(stage);
            }
            let living = self
                .local
                .tank
                .decoration_at(x, y, TAP_RADIUS)
                .filter(|d| d.kind.is_living())
                .map(|d| d.id.clone());
            if let Some(id) = living {
                let vigor = self.presentation.cycle_vigor(&id);
                log::debug!("Debug: decoration {} shows {:?}", id, vigor);
                return FeedOutcome::VigorCycled(vigor);
            }
        }

        if !self.local.food.take_one(now, self.balance.max_food) {
            return FeedOutcome::NoFood;
        }
        let dropped = self.local.tank.feed_at(x, y, rng);
        self.stage_food(now);
        FeedOutcome::Dropped(dropped)
    }

    /// Pays for a fish and drops it in from above. The drop-in keeps polls from
    /// evicting it before the debounced write lands.
    pub fn buy_fish<R: Rng + ?Sized>(
        &mut self,
        store: &dyn KvStore,
        species: Species,
        now: Timestamp,
        rng: &mut R,
    ) -> Result<EntityId, ActionError> {
        self.local.focus.coins = spend_coins(store, species.price())?;
        let fish = Fish::spawn_entering(species, now, self.local.tank.width, rng);
        let id = fish.id.clone();
        self.local.tank.fish.push(fish);
        self.stage_fish(now);
        log::info!("Bought a {} fish", species.name());
        Ok(id)
    }

    pub fn buy_decoration<R: Rng + ?Sized>(
        &mut self,
        store: &dyn KvStore,
        kind: DecorationKind,
        now: Timestamp,
        rng: &mut R,
    ) -> Result<EntityId, ActionError> {
        self.local.focus.coins = spend_coins(store, kind.price())?;
        let decoration = Decoration::place_new(kind, None, now, rng);
        let id = decoration.id.clone();
        self.local.tank.decorations.push(decoration);
        self.stage_decorations(now);
        log::info!("Bought a {}", kind.name());
        Ok(id)
    }

    pub fn grab(&mut self, x: f64, y: f64) -> Option<EntityId> {
        if !self.presentation.rearrange_mode {
            return None;
        }
        let id = self.local.tank.decoration_at(x, y, GRAB_RADIUS)?.id.clone();
        self.presentation.dragging = Some(id.clone());
        Some(id)
    }

    pub fn drag(&mut self, x: f64, y: f64) -> bool {
        match self.presentation.dragging.clone() {
            Some(id) => self.local.tank.move_decoration(&id, x, y),
            None => false,
        }
    }

    pub fn drop_held(&mut self, now: Timestamp) -> Option<EntityId> {
        let id = self.presentation.dragging.take()?;
        self.stage_decorations(now);
        Some(id)
    }

    /// Stages everything and writes it through before the foreground goes away.
    /// The counters go back to the background ticker from the next tick on.
    pub fn close(&mut self, store: &dyn KvStore, now: Timestamp) -> Result<bool, StoreError> {
        if !self.hydrated {
            return Ok(false);
        }
        if !self.unarchived.is_empty() {
            let dead = std::mem::take(&mut self.unarchived);
            self.archive(store, dead, now);
        }
        self.stage_fish(now);
        self.stage_decorations(now);
        self.stage_food(now);
        if self.local.verdict.is_some() {
            self.local
                .writer
                .stage(Coalesced(self.local.interpolator.counter_entries()), now);
        }
        self.local.writer.discard(keys::FOREGROUND_SEEN_AT);
        let flushed = self.local.writer.flush_now(store)?;
        store.remove(&[keys::FOREGROUND_SEEN_AT])?;
        Ok(flushed)
    }

    pub fn view(&self, now: Timestamp) -> PopupView {
        let ctx = SimContext {
            focus_score: self.local.focus.focus_score,
            now,
        };
        PopupView {
            tank: self.local.tank.view(&ctx, &self.presentation),
            background: self.background,
            focus_score: self.local.focus.focus_score,
            coins: self.local.focus.coins,
            is_distracting: self.local.focus.is_distracting,
            site: self.local.focus.current_site_id.clone(),
            focus_seconds: self.local.focus.focus_seconds,
            distracted_seconds: self.local.focus.distracted_seconds,
            food: self.local.food.units,
            next_food_in_secs: self.local.food.seconds_until_next(
                now,
                self.balance.max_food,
                self.balance.food_refill_secs,
            ),
        }
    }
}

fn random_fry<R: Rng + ?Sized>(now: Timestamp, width: f64, height: f64, rng: &mut R) -> Fish {
    let species = Species::STARTERS[rng.gen_range(0..Species::STARTERS.len())];
    Fish::spawn_fry(species, None, now, width, height, false, rng)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use rand::{SeedableRng, rngs::StdRng};
    use serde_json::json;

    use super::*;
    use crate::{
        actions::default_adults,
        domain::DecorationSnapshot,
        storage::{MemoryStore, list_field},
    };

    fn now_local() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 1, 3, 12, 0, 0)
            .single()
            .expect("unambiguous local time")
    }

    fn store_with(value: serde_json::Value) -> MemoryStore {
        let store = MemoryStore::new();
        store.set(value.as_object().cloned().unwrap()).unwrap();
        store
    }

    fn seeded_store(fish: &[FishSnapshot], extra: serde_json::Value) -> MemoryStore {
        let store = store_with(extra);
        let mut entries = Entries::new();
        put(&mut entries, keys::TANK_FISH, &fish).unwrap();
        store.set(entries).unwrap();
        store
    }

    #[test]
    fn test_empty_store_gets_two_fry() {
        let mut rng = StdRng::seed_from_u64(1);
        let store = MemoryStore::new();
        let mut popup = Popup::open(&store, Balance::default(), &now_local(), &mut rng);

        assert_eq!(popup.local.tank.fish.len(), 2);
        assert!(popup.local.tank.fish.iter().all(|f| f.life_stage == LifeStage::Fry));

        let now = now_local().with_timezone(&Utc);
        popup.frame(&store, now + Duration::seconds(1), &mut rng);
        let stored: Vec<FishSnapshot> = list_field(&store.contents(), keys::TANK_FISH);
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn test_unavailable_store_gets_one_fry_and_no_writes() {
        let mut rng = StdRng::seed_from_u64(2);
        let store = MemoryStore::new();
        store.set_available(false);
        let popup = Popup::open(&store, Balance::default(), &now_local(), &mut rng);

        assert_eq!(popup.local.tank.fish.len(), 1);
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_store_coming_back_restores_the_stored_tank() {
        let mut rng = StdRng::seed_from_u64(11);
        let now = now_local().with_timezone(&Utc);
        let adults = default_adults(now, &mut rng);
        let store = seeded_store(&adults, json!({}));
        store.set_available(false);
        let mut popup = Popup::open(&store, Balance::default(), &now_local(), &mut rng);
        assert_eq!(popup.local.tank.fish.len(), 1);

        store.set_available(true);
        for s in 1..=3 {
            popup.frame(&store, now + Duration::seconds(s), &mut rng);
            popup.poll(&store, Some("https://docs.rs"), &now_local(), &mut rng);
        }

        assert_eq!(popup.local.tank.fish.len(), 3);
        let stored: Vec<FishSnapshot> = list_field(&store.contents(), keys::TANK_FISH);
        assert_eq!(stored.len(), 3);
        let ids: Vec<&EntityId> = stored.iter().map(|f| &f.id).collect();
        assert!(adults.iter().all(|a| ids.contains(&&a.id)));
    }

    #[test]
    fn test_store_coming_back_empty_gets_default_fry() {
        let mut rng = StdRng::seed_from_u64(12);
        let store = MemoryStore::new();
        store.set_available(false);
        let mut popup = Popup::open(&store, Balance::default(), &now_local(), &mut rng);
        assert!(!popup.close(&store, Utc::now()).unwrap());

        store.set_available(true);
        popup.poll(&store, Some("https://docs.rs"), &now_local(), &mut rng);
        assert_eq!(popup.local.tank.fish.len(), 2);

        let now = now_local().with_timezone(&Utc);
        popup.frame(&store, now + Duration::seconds(1), &mut rng);
        popup.poll(&store, Some("https://docs.rs"), &now_local(), &mut rng);
        assert_eq!(popup.local.tank.fish.len(), 2);
        assert_eq!(list_field::<FishSnapshot>(&store.contents(), keys::TANK_FISH).len(), 2);
    }

    #[test]
    fn test_open_archives_fish_that_died_while_closed() {
        let mut rng = StdRng::seed_from_u64(3);
        let now = now_local().with_timezone(&Utc);
        let mut fish = default_adults(now, &mut rng);
        fish[0].life_stage = LifeStage::Dead;
        let store = seeded_store(&fish, json!({}));

        let popup = Popup::open(&store, Balance::default(), &now_local(), &mut rng);
        assert_eq!(popup.local.tank.fish.len(), 2);

        let contents = store.contents();
        let graveyard: Vec<FishSnapshot> = list_field(&contents, keys::GRAVEYARD_FISH);
        assert_eq!(graveyard.len(), 1);
        assert_eq!(graveyard[0].id, fish[0].id);
        assert_eq!(list_field::<FishSnapshot>(&contents, keys::TANK_FISH).len(), 2);
    }

    #[test]
    fn test_death_in_the_open_tank_reaches_the_graveyard_once() {
        let mut rng = StdRng::seed_from_u64(4);
        let now = now_local().with_timezone(&Utc);
        let mut fish = default_adults(now, &mut rng);
        fish.truncate(1);
        fish[0].health = 2.0;
        let store = seeded_store(&fish, json!({"focusScore": 0}));

        let mut popup = Popup::open(&store, Balance::default(), &now_local(), &mut rng);
        for _ in 0..2_000 {
            popup.frame(&store, now, &mut rng);
        }

        let contents = store.contents();
        let graveyard: Vec<FishSnapshot> = list_field(&contents, keys::GRAVEYARD_FISH);
        assert_eq!(graveyard.len(), 1);
        assert!(list_field::<FishSnapshot>(&contents, keys::TANK_FISH).is_empty());
    }

    #[test]
    fn test_feeding_spends_food_until_empty() {
        let mut rng = StdRng::seed_from_u64(5);
        let store = seeded_store(&default_adults(Utc::now(), &mut rng), json!({"foodSupply": 1}));
        let mut popup = Popup::open(&store, Balance::default(), &now_local(), &mut rng);
        let now = now_local().with_timezone(&Utc);

        assert!(matches!(popup.feed(100.0, 50.0, now, &mut rng), FeedOutcome::Dropped(5..=8)));
        assert_eq!(popup.feed(100.0, 50.0, now, &mut rng), FeedOutcome::NoFood);

        popup.local.writer.flush_now(&store).unwrap();
        assert_eq!(store.contents().get(keys::FOOD_SUPPLY), Some(&json!(0)));
    }

    #[test]
    fn test_debug_tap_cycles_stage() {
        let mut rng = StdRng::seed_from_u64(6);
        let store = seeded_store(&default_adults(Utc::now(), &mut rng), json!({}));
        let mut popup = Popup::open(&store, Balance::default(), &now_local(), &mut rng);
        popup.presentation.debug_mode = true;

        let (x, y) = (popup.local.tank.fish[0].x, popup.local.tank.fish[0].y);
        let outcome = popup.feed(x, y, Utc::now(), &mut rng);
        assert!(matches!(outcome, FeedOutcome::StageCycled(_)));
        assert_eq!(popup.local.food.units, 15);
    }

    #[test]
    fn test_debug_tap_cycles_living_decoration() {
        let mut rng = StdRng::seed_from_u64(10);
        let store = seeded_store(&default_adults(Utc::now(), &mut rng), json!({"coins": 500}));
        let mut popup = Popup::open(&store, Balance::default(), &now_local(), &mut rng);
        let now = now_local().with_timezone(&Utc);
        let id = popup.buy_decoration(&store, DecorationKind::Kelp, now, &mut rng).unwrap();
        popup.local.tank.fish.clear();
        popup.presentation.debug_mode = true;

        let (x, y) = (popup.local.tank.decorations[0].x, popup.local.tank.decorations[0].y);
        assert_eq!(
            popup.feed(x, y, now, &mut rng),
            FeedOutcome::VigorCycled(DebugVigor::Thriving)
        );
        assert_eq!(
            popup.feed(x, y, now, &mut rng),
            FeedOutcome::VigorCycled(DebugVigor::Surviving)
        );
        assert_eq!(popup.presentation.vigor_for(&id), Some(DebugVigor::Surviving));
    }

    #[test]
    fn test_bought_fish_survives_polls_and_is_persisted() {
        let mut rng = StdRng::seed_from_u64(7);
        let store = seeded_store(&default_adults(Utc::now(), &mut rng), json!({"coins": 100}));
        let mut popup = Popup::open(&store, Balance::default(), &now_local(), &mut rng);
        let now = now_local().with_timezone(&Utc);

        let id = popup.buy_fish(&store, Species::Basic, now, &mut rng).unwrap();
        assert_eq!(popup.local.focus.coins, 70.0);

        popup.poll(&store, Some("https://docs.rs"), &now_local(), &mut rng);
        assert!(popup.local.tank.fish.iter().any(|f| f.id == id));

        popup.frame(&store, now + Duration::seconds(1), &mut rng);
        let stored: Vec<FishSnapshot> = list_field(&store.contents(), keys::TANK_FISH);
        assert!(stored.iter().any(|f| f.id == id));

        let err = popup.buy_fish(&store, Species::Dragon, now, &mut rng).unwrap_err();
        assert!(matches!(err, ActionError::InsufficientCoins { .. }));
    }

    #[test]
    fn test_rearranged_decoration_is_persisted() {
        let mut rng = StdRng::seed_from_u64(8);
        let store = seeded_store(&default_adults(Utc::now(), &mut rng), json!({"coins": 500}));
        let mut popup = Popup::open(&store, Balance::default(), &now_local(), &mut rng);
        let now = now_local().with_timezone(&Utc);

        let id = popup.buy_decoration(&store, DecorationKind::Kelp, now, &mut rng).unwrap();
        let (x, y) = {
            let d = &popup.local.tank.decorations[0];
            (d.x, d.y)
        };

        assert_eq!(popup.grab(x, y), None);
        popup.presentation.rearrange_mode = true;
        assert_eq!(popup.grab(x, y), Some(id.clone()));
        assert!(popup.drag(50.0, 230.0));
        assert_eq!(popup.drop_held(now), Some(id));

        popup.close(&store, now).unwrap();
        let stored: Vec<DecorationSnapshot> = list_field(&store.contents(), keys::TANK_DECORATIONS);
        assert_eq!(stored.len(), 1);
        assert_eq!((stored[0].x, stored[0].y), (50.0, 230.0));
    }

    #[test]
    fn test_clock_counts_and_close_writes_counters() {
        let mut rng = StdRng::seed_from_u64(9);
        let store = seeded_store(
            &default_adults(Utc::now(), &mut rng),
            json!({"focusSeconds": 100, "lastFocusDate": "2024-01-03"}),
        );
        let mut popup = Popup::open(&store, Balance::default(), &now_local(), &mut rng);
        assert_eq!(popup.clock(&now_local()), 0);

        popup.poll(&store, Some("https://docs.rs"), &now_local(), &mut rng);
        popup.clock(&now_local());
        for s in 1..=3 {
            popup.clock(&(now_local() + Duration::seconds(s)));
        }
        assert_eq!(popup.view(Utc::now()).focus_seconds, 103);

        let now = (now_local() + Duration::seconds(3)).with_timezone(&Utc);
        popup.close(&store, now).unwrap();
        let contents = store.contents();
        assert_eq!(contents.get(keys::FOCUS_SECONDS), Some(&json!(103)));
        assert!(!contents.contains_key(keys::FOREGROUND_SEEN_AT));
    }
}
