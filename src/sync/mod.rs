pub mod interpolator;
pub mod merge;
pub mod writer;

use std::collections::HashSet;

use chrono::{DateTime, Local, Utc};
use rand::Rng;

use crate::{
    classifier::{Verdict, classify},
    config::Balance,
    domain::{EntityId, FishSnapshot, FocusState, LifeStage, PendingFish, Timestamp},
    storage::{Entries, KvStore, Snapshot, StoreError, keys, list_field, load_snapshot, put},
    tank::{
        Tank,
        decoration::Decoration,
        fish::Fish,
        food::FoodSupply,
        graveyard_entry,
    },
};

use interpolator::TimeInterpolator;
use merge::{append_unique, evictions};
use writer::{Urgent, WriteBuffer};

/// Everything the foreground holds in memory between polls.
pub struct LocalState {
    pub tank: Tank,
    pub writer: WriteBuffer,
    pub interpolator: TimeInterpolator,
    pub food: FoodSupply,
    /// Last known stored focus fields, with the live verdict applied.
    pub focus: FocusState,
    pub verdict: Option<Verdict>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollReport {
    pub reset_observed: bool,
    pub removed_fish: usize,
    pub rehydrated_fish: usize,
    pub archived_fish: usize,
    pub removed_decorations: usize,
    pub adopted_decorations: usize,
    pub pending_spawned: usize,
    pub counters_adopted: bool,
    pub food_gained: u32,
}

impl PollReport {
    pub fn changed_anything(&self) -> bool {
        self.reset_observed
            || self.removed_fish > 0
            || self.rehydrated_fish > 0
            || self.archived_fish > 0
            || self.removed_decorations > 0
            || self.adopted_decorations > 0
            || self.pending_spawned > 0
            || self.counters_adopted
            || self.food_gained > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Store unreadable; local state kept as it was.
    StorageUnavailable,
    Synced(PollReport),
}

/// Writes the fish list and, when any are new, the dead fish into the graveyard
/// log, as one urgent write. Returns how many graveyard entries were added.
pub fn archive_to_graveyard(
    store: &dyn KvStore,
    writer: &mut WriteBuffer,
    dead: Vec<FishSnapshot>,
    remaining: Vec<FishSnapshot>,
    now: Timestamp,
) -> Result<usize, StoreError> {
    let mut graveyard: Vec<FishSnapshot> =
        list_field(&store.get(&[keys::GRAVEYARD_FISH])?, keys::GRAVEYARD_FISH);
    let added = append_unique(
        &mut graveyard,
        dead.iter().map(|f| graveyard_entry(f, now)),
        |f| &f.id,
    );

    let mut entries = Entries::new();
    if added > 0 {
        put(&mut entries, keys::GRAVEYARD_FISH, &graveyard)?;
    }
    put(&mut entries, keys::TANK_FISH, &remaining)?;
    writer.write_urgent(store, Urgent(entries), now)?;

    if added > 0 {
        log::info!("Archived {} fish to the graveyard", added);
    }
    Ok(added)
}

/// Rebuilds live fish from stored snapshots. Dead ones lingering in the list
/// (the foreground closed mid-fade) are returned for archival instead.
pub fn hydrate_fish<R: Rng + ?Sized>(
    tank: &mut Tank,
    stored: &[FishSnapshot],
    now: Timestamp,
    rng: &mut R,
) -> Vec<FishSnapshot> {
    let (dead, live): (Vec<&FishSnapshot>, Vec<&FishSnapshot>) = stored
        .iter()
        .partition(|f| f.life_stage == LifeStage::Dead);

    tank.fish = live
        .into_iter()
        .map(|snap| Fish::from_snapshot(snap, now, tank.width, tank.height, rng))
        .collect();
    dead.into_iter().cloned().collect()
}

/// Reconciles foreground state against the shared store once per poll.
#[derive(Debug, Default)]
pub struct Synchronizer {
    known_epoch: Option<u64>,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_epoch(epoch: u64) -> Self {
        Self {
            known_epoch: Some(epoch),
        }
    }

    pub fn poll<R: Rng + ?Sized>(
        &mut self,
        store: &dyn KvStore,
        local: &mut LocalState,
        tab_url: Option<&str>,
        now_local: &DateTime<Local>,
        balance: &Balance,
        rng: &mut R,
    ) -> PollOutcome {
        let snapshot = match load_snapshot(store, balance.start_score) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("Poll skipped, {}", e);
                return PollOutcome::StorageUnavailable;
            }
        };

        let now = now_local.with_timezone(&Utc);
        let verdict = classify(tab_url, &snapshot.blocklist, &snapshot.work_hours, now_local);
        let mut report = PollReport::default();

        let reset_observed = self
            .known_epoch
            .is_some_and(|epoch| epoch != snapshot.reset_epoch);
        self.known_epoch = Some(snapshot.reset_epoch);
        report.reset_observed = reset_observed;

        if reset_observed {
            log::info!("External reset observed, rebuilding the tank");
            local.writer.discard_all();
            local.tank.pellets.clear();
            local.tank.decorations = snapshot
                .decorations
                .iter()
                .map(|d| Decoration::from_snapshot(d, rng))
                .collect();
            let dead = hydrate_fish(&mut local.tank, &snapshot.fish, now, rng);
            report.rehydrated_fish = local.tank.fish.len();
            report.archived_fish = self.archive_dead(store, local, dead, now);
        } else {
            self.sync_fish(store, local, &snapshot, now, rng, &mut report);
            self.sync_decorations(local, &snapshot, now, rng, &mut report);
        }

        if !snapshot.pending_fish.is_empty() {
            self.drain_pending(store, local, &snapshot, now, rng, &mut report);
        }

        report.counters_adopted = local.interpolator.reconcile(
            snapshot.focus.focus_seconds,
            snapshot.focus.distracted_seconds,
            &snapshot.focus.last_focus_date,
            reset_observed,
        );

        if reset_observed || !local.writer.has_pending(keys::FOOD_SUPPLY) {
            local.food = FoodSupply::from_stored(
                snapshot.food_supply,
                snapshot.food_last_refill_at,
                now,
                balance.max_food,
            );
        }
        report.food_gained = local.food.refill(
            now,
            verdict.is_distracting,
            balance.max_food,
            balance.food_refill_secs,
        );
        if report.food_gained > 0 {
            let mut entries = Entries::new();
            local.food.write_to(&mut entries);
            local.writer.stage(writer::Coalesced(entries), now);
        }

        local.focus = FocusState {
            is_distracting: verdict.is_distracting,
            current_site_id: verdict.site_id().to_string(),
            focus_seconds: local.interpolator.focus_seconds,
            distracted_seconds: local.interpolator.distracted_seconds,
            ..snapshot.focus
        };
        local.verdict = Some(verdict);

        if report.changed_anything() {
            log::debug!("Poll reconciled: {:?}", report);
        }
        PollOutcome::Synced(report)
    }

    fn archive_dead(
        &self,
        store: &dyn KvStore,
        local: &mut LocalState,
        dead: Vec<FishSnapshot>,
        now: Timestamp,
    ) -> usize {
        if dead.is_empty() {
            return 0;
        }
        let remaining = local.tank.fish_snapshots();
        match archive_to_graveyard(store, &mut local.writer, dead, remaining, now) {
            Ok(added) => added,
            Err(e) => {
                log::warn!("Could not archive dead fish: {}", e);
                0
            }
        }
    }

    fn sync_fish<R: Rng + ?Sized>(
        &self,
        store: &dyn KvStore,
        local: &mut LocalState,
        snapshot: &Snapshot,
        now: Timestamp,
        rng: &mut R,
        report: &mut PollReport,
    ) {
        let stored_ids: HashSet<EntityId> = snapshot.fish.iter().map(|f| f.id.clone()).collect();
        let evicted = evictions(&local.tank.fish, &stored_ids, |f| &f.id, Fish::is_protected);

        // Nothing local survives while the store still has fish: the stored list
        // is the tank, and no local view of it may be written back.
        if evicted.len() == local.tank.fish.len() && !snapshot.fish.is_empty() {
            if !evicted.is_empty() {
                log::info!("Replacing {} local-only fish with the stored tank", evicted.len());
            }
            report.removed_fish = evicted.len();
            local.writer.discard(keys::TANK_FISH);
            let dead = hydrate_fish(&mut local.tank, &snapshot.fish, now, rng);
            report.rehydrated_fish = local.tank.fish.len();
            report.archived_fish = self.archive_dead(store, local, dead, now);
            return;
        }

        if evicted.is_empty() {
            return;
        }
        for index in evicted.iter().rev() {
            let fish = local.tank.fish.remove(*index);
            log::info!("Fish {} left the tank externally", fish.id);
        }
        report.removed_fish = evicted.len();

        // The store already lacks them; only a staged list could bring them back.
        if local.writer.has_pending(keys::TANK_FISH) {
            let mut entries = Entries::new();
            if put(&mut entries, keys::TANK_FISH, &local.tank.fish_snapshots()).is_ok() {
                local.writer.stage(writer::Coalesced(entries), now);
            }
        }
    }

    fn sync_decorations<R: Rng + ?Sized>(
        &self,
        local: &mut LocalState,
        snapshot: &Snapshot,
        now: Timestamp,
        rng: &mut R,
        report: &mut PollReport,
    ) {
        let stored_ids: HashSet<EntityId> =
            snapshot.decorations.iter().map(|d| d.id.clone()).collect();
        let evicted = evictions(
            &local.tank.decorations,
            &stored_ids,
            |d| &d.id,
            Decoration::is_protected,
        );

        for index in evicted.iter().rev() {
            local.tank.decorations.remove(*index);
        }
        report.removed_decorations = evicted.len();

        let known: HashSet<EntityId> = local.tank.decorations.iter().map(|d| d.id.clone()).collect();
        for snap in snapshot.decorations.iter().filter(|d| !known.contains(&d.id)) {
            local.tank.decorations.push(Decoration::from_snapshot(snap, rng));
            report.adopted_decorations += 1;
        }

        // A staged list from before the removal would bring the evicted ones back.
        if !evicted.is_empty() && local.writer.has_pending(keys::TANK_DECORATIONS) {
            let mut entries = Entries::new();
            if put(&mut entries, keys::TANK_DECORATIONS, &local.tank.decoration_snapshots()).is_ok() {
                local.writer.stage(writer::Coalesced(entries), now);
            }
        }
    }

    fn drain_pending<R: Rng + ?Sized>(
        &self,
        store: &dyn KvStore,
        local: &mut LocalState,
        snapshot: &Snapshot,
        now: Timestamp,
        rng: &mut R,
        report: &mut PollReport,
    ) {
        let (width, height) = (local.tank.width, local.tank.height);
        let mut spawned = Vec::new();
        for pending in &snapshot.pending_fish {
            spawned.push(Fish::spawn_fry(
                pending.species,
                pending.hue,
                now,
                width,
                height,
                true,
                rng,
            ));
        }

        let mut fish = local.tank.fish_snapshots();
        fish.extend(spawned.iter().map(Fish::to_snapshot));

        let mut entries = Entries::new();
        let staged = put(&mut entries, keys::TANK_FISH, &fish)
            .and_then(|_| put(&mut entries, keys::PENDING_FISH, &Vec::<PendingFish>::new()));
        if let Err(e) = staged.and_then(|_| local.writer.write_urgent(store, Urgent(entries), now)) {
            // Leave the queue for the next poll rather than spawning twice.
            log::warn!("Could not drain pending fish: {}", e);
            return;
        }

        report.pending_spawned = spawned.len();
        log::info!("{} new fish joined the tank", spawned.len());
        local.tank.fish.extend(spawned);
    }
}
