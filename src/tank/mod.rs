pub mod decoration;
pub mod fish;
pub mod food;

use std::collections::HashMap;

use rand::Rng;

use crate::{
    constants::{FISH_SETTINGS, FOOD_SETTINGS, TANK_SETTINGS},
    domain::{DecorationSnapshot, EntityId, FishSnapshot, LifeStage, Timestamp},
};

use decoration::{DebugVigor, Decoration, DecorationView};
use fish::{Fish, FishEnv, FishView};
use food::FoodPellet;

/// Ambient environment value every fish and living decoration reacts to.
pub fn tank_health(focus_score: f64, decoration_count: usize) -> f64 {
    let bonus = (decoration_count as f64 * TANK_SETTINGS.decoration_bonus_each)
        .min(TANK_SETTINGS.decoration_bonus_cap);
    (focus_score + bonus).clamp(0.0, 100.0)
}

/// Inputs the simulation reads each frame.
#[derive(Debug, Clone, Copy)]
pub struct SimContext {
    pub focus_score: f64,
    pub now: Timestamp,
}

/// UI-only state. The simulation never touches it directly, only the
/// [`Overrides`] it hands out.
#[derive(Debug, Clone, Default)]
pub struct Presentation {
    pub debug_mode: bool,
    pub health_override: Option<f64>,
    pub hp_react_override: Option<f64>,
    pub growth_speed: Option<f64>,
    pub decoration_vigor: HashMap<EntityId, DebugVigor>,
    pub rearrange_mode: bool,
    pub dragging: Option<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overrides {
    pub tank_health: Option<f64>,
    pub hp_react: f64,
    pub growth_speed: f64,
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            tank_health: None,
            hp_react: FISH_SETTINGS.hp_react,
            growth_speed: 1.0,
        }
    }
}

impl Presentation {
    /// Debug values only take effect while debug mode is on.
    pub fn overrides(&self) -> Overrides {
        if !self.debug_mode {
            return Overrides::default();
        }
        Overrides {
            tank_health: self.health_override.map(|h| h.clamp(0.0, 100.0)),
            hp_react: self
                .hp_react_override
                .map(|r| r.clamp(0.0, 1.0))
                .unwrap_or(FISH_SETTINGS.hp_react),
            growth_speed: self.growth_speed.map(|g| g.max(0.0)).unwrap_or(1.0),
        }
    }

    pub fn vigor_for(&self, id: &EntityId) -> Option<DebugVigor> {
        if !self.debug_mode {
            return None;
        }
        self.decoration_vigor.get(id).copied()
    }

    pub fn cycle_vigor(&mut self, id: &EntityId) -> DebugVigor {
        let next = DebugVigor::cycle(self.decoration_vigor.get(id).copied());
        self.decoration_vigor.insert(id.clone(), next);
        next
    }
}

#[derive(Debug, Default)]
pub struct FrameOutcome {
    /// Fully faded dead fish, already removed from the live set.
    pub archived: Vec<FishSnapshot>,
    /// A stage change or death that should reach the store.
    pub fish_changed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TankView {
    pub tank_health: f64,
    pub fish: Vec<FishView>,
    pub decorations: Vec<DecorationView>,
    pub pellets: usize,
}

pub struct Tank {
    pub fish: Vec<Fish>,
    pub decorations: Vec<Decoration>,
    pub pellets: Vec<FoodPellet>,
    pub width: f64,
    pub height: f64,
}

impl Default for Tank {
    fn default() -> Self {
        Self::new()
    }
}

impl Tank {
    pub fn new() -> Self {
        Self {
            fish: Vec::new(),
            decorations: Vec::new(),
            pellets: Vec::new(),
            width: TANK_SETTINGS.width,
            height: TANK_SETTINGS.height,
        }
    }

    pub fn tank_health(&self, ctx: &SimContext, overrides: &Overrides) -> f64 {
        overrides
            .tank_health
            .unwrap_or_else(|| tank_health(ctx.focus_score, self.decorations.len()))
    }

    /// One animation frame.
    pub fn frame<R: Rng + ?Sized>(
        &mut self,
        ctx: &SimContext,
        overrides: &Overrides,
        rng: &mut R,
    ) -> FrameOutcome {
        let env = FishEnv {
            tank_health: self.tank_health(ctx, overrides),
            hp_react: overrides.hp_react,
            growth_speed: overrides.growth_speed,
            width: self.width,
            height: self.height,
            now: ctx.now,
        };

        let mut outcome = FrameOutcome::default();

        for fish in self.fish.iter_mut() {
            let events = fish.update(&env, &mut self.pellets, rng);
            if events.changed_snapshot() {
                outcome.fish_changed = true;
            }
            if events.died {
                log::info!("Fish {} ({}) died", fish.id, fish.species.name());
            }
        }

        for decoration in self.decorations.iter_mut() {
            decoration.update();
        }

        for pellet in self.pellets.iter_mut() {
            pellet.update();
        }
        self.pellets.retain(FoodPellet::is_alive);

        let (faded, live): (Vec<Fish>, Vec<Fish>) =
            std::mem::take(&mut self.fish).into_iter().partition(Fish::is_faded);
        self.fish = live;
        for fish in faded {
            outcome.archived.push(graveyard_entry(&fish.to_snapshot(), ctx.now));
        }
        if !outcome.archived.is_empty() {
            outcome.fish_changed = true;
        }

        outcome
    }

    /// Drops 5 to 8 pellets around a point. Returns how many fell.
    pub fn feed_at<R: Rng + ?Sized>(&mut self, x: f64, y: f64, rng: &mut R) -> usize {
        let count = rng.gen_range(FOOD_SETTINGS.pellets_min..=FOOD_SETTINGS.pellets_max);
        let floor_y = self.height - TANK_SETTINGS.sand_height - 2.0;
        for _ in 0..count {
            self.pellets.push(FoodPellet::drop_at(x, y, floor_y, rng));
        }
        count
    }

    pub fn fish_at(&mut self, x: f64, y: f64, min_radius: f64) -> Option<&mut Fish> {
        self.fish.iter_mut().find(|f| f.hit_test(x, y, min_radius))
    }

    pub fn decoration_at(&self, x: f64, y: f64, radius: f64) -> Option<&Decoration> {
        self.decorations.iter().find(|d| d.hit_test(x, y, radius))
    }

    pub fn move_decoration(&mut self, id: &EntityId, x: f64, y: f64) -> bool {
        let Some(decoration) = self.decorations.iter_mut().find(|d| d.id == *id) else {
            return false;
        };
        decoration.x = x.clamp(0.0, self.width);
        decoration.y = y.clamp(0.0, self.height - TANK_SETTINGS.sand_height);
        true
    }

    pub fn fish_snapshots(&self) -> Vec<FishSnapshot> {
        self.fish.iter().map(Fish::to_snapshot).collect()
    }

    pub fn decoration_snapshots(&self) -> Vec<DecorationSnapshot> {
        self.decorations.iter().map(Decoration::to_snapshot).collect()
    }

    pub fn view(&self, ctx: &SimContext, presentation: &Presentation) -> TankView {
        let health = self.tank_health(ctx, &presentation.overrides());
        TankView {
            tank_health: health,
            fish: self.fish.iter().map(Fish::view).collect(),
            decorations: self
                .decorations
                .iter()
                .map(|d| d.view(health, presentation.vigor_for(&d.id)))
                .collect(),
            pellets: self.pellets.len(),
        }
    }
}

/// Graveyard form of a fish: dead, zero health, stamped with its death time.
pub fn graveyard_entry(snap: &FishSnapshot, now: Timestamp) -> FishSnapshot {
    FishSnapshot {
        life_stage: LifeStage::Dead,
        health: 0.0,
        died_at: snap.died_at.or(Some(now)),
        released_at: None,
        ..snap.clone()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::domain::{DecorationKind, Species};

    fn ctx(score: f64) -> SimContext {
        SimContext {
            focus_score: score,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_tank_health_bonus_is_capped() {
        assert_eq!(tank_health(70.0, 0), 70.0);
        assert_eq!(tank_health(70.0, 2), 78.0);
        assert_eq!(tank_health(50.0, 10), 70.0);
        assert_eq!(tank_health(95.0, 3), 100.0);
    }

    #[test]
    fn test_overrides_ignored_outside_debug_mode() {
        let mut presentation = Presentation {
            health_override: Some(5.0),
            growth_speed: Some(10.0),
            ..Presentation::default()
        };
        assert_eq!(presentation.overrides(), Overrides::default());

        presentation.debug_mode = true;
        let overrides = presentation.overrides();
        assert_eq!(overrides.tank_health, Some(5.0));
        assert_eq!(overrides.growth_speed, 10.0);
    }

    #[test]
    fn test_decorations_raise_fish_target_health() {
        let mut rng = StdRng::seed_from_u64(12);
        let mut tank = Tank::new();
        for _ in 0..3 {
            tank.decorations
                .push(Decoration::place_new(DecorationKind::Kelp, None, Utc::now(), &mut rng));
        }
        assert_eq!(tank.tank_health(&ctx(60.0), &Overrides::default()), 72.0);
    }

    #[test]
    fn test_dead_fish_is_archived_exactly_once() {
        let mut rng = StdRng::seed_from_u64(33);
        let mut tank = Tank::new();
        let mut fish = Fish::spawn_fry(
            Species::Long,
            None,
            Utc::now(),
            tank.width,
            tank.height,
            false,
            &mut rng,
        );
        fish.health = 2.0;
        let id = fish.id.clone();
        tank.fish.push(fish);

        let mut archived = Vec::new();
        for _ in 0..2_000 {
            archived.extend(tank.frame(&ctx(0.0), &Overrides::default(), &mut rng).archived);
        }

        assert!(tank.fish.is_empty());
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].id, id);
        assert_eq!(archived[0].life_stage, LifeStage::Dead);
        assert_eq!(archived[0].health, 0.0);
        assert!(archived[0].died_at.is_some());
    }

    #[test]
    fn test_feeding_drops_pellets_that_expire() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut tank = Tank::new();
        let dropped = tank.feed_at(180.0, 40.0, &mut rng);
        assert!((5..=8).contains(&dropped));
        assert_eq!(tank.pellets.len(), dropped);

        for _ in 0..(FOOD_SETTINGS.pellet_ttl_frames + 30) {
            tank.frame(&ctx(70.0), &Overrides::default(), &mut rng);
        }
        assert!(tank.pellets.is_empty());
    }

    #[test]
    fn test_view_applies_debug_vigor() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut tank = Tank::new();
        let kelp = Decoration::place_new(DecorationKind::Kelp, None, Utc::now(), &mut rng);
        let id = kelp.id.clone();
        tank.decorations.push(kelp);

        let mut presentation = Presentation {
            debug_mode: true,
            ..Presentation::default()
        };
        presentation.cycle_vigor(&id);
        presentation.cycle_vigor(&id);

        let view = tank.view(&ctx(70.0), &presentation);
        assert_eq!(view.decorations[0].health, 50.0);
        assert_eq!(view.tank_health, 74.0);
    }
}
