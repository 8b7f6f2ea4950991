use std::f64::consts::TAU;

use rand::Rng;

use crate::{
    constants::{FISH_SETTINGS, TANK_SETTINGS},
    domain::{EntityId, FishSnapshot, LifeStage, Species, Timestamp},
};

use super::food::FoodPellet;

/// Per-frame inputs a fish reacts to.
#[derive(Debug, Clone, Copy)]
pub struct FishEnv {
    pub tank_health: f64,
    pub hp_react: f64,
    pub growth_speed: f64,
    pub width: f64,
    pub height: f64,
    pub now: Timestamp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FishEvents {
    pub died: bool,
    pub matured: bool,
    pub ate: bool,
}

impl FishEvents {
    pub fn changed_snapshot(&self) -> bool {
        self.died || self.matured
    }
}

/// What the renderer needs for one fish.
#[derive(Debug, Clone, PartialEq)]
pub struct FishView {
    pub id: EntityId,
    pub species: Species,
    pub life_stage: LifeStage,
    pub hue: f64,
    pub size: f64,
    pub phase: f64,
    pub health: f64,
    pub x: f64,
    pub y: f64,
    pub facing: f64,
    pub alpha: f64,
}

#[derive(Debug, Clone)]
pub struct Fish {
    pub id: EntityId,
    pub species: Species,
    pub life_stage: LifeStage,
    pub hue: f64,
    pub health: f64,
    pub growth: f64,
    pub food_bonus_accumulated: f64,
    pub base_size: f64,
    pub velocity_scale: f64,
    pub born_at: Timestamp,
    pub died_at: Option<Timestamp>,
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub facing: f64,
    target_x: f64,
    target_y: f64,
    enter_frames: u32,
    grace_frames: u32,
    phase: f64,
    wander_cooldown: f64,
    dead_frames: u32,
    dead_alpha: f64,
    spurt_frames: u32,
}

fn sample_span<R: Rng + ?Sized>(rng: &mut R, lo: f64, span: f64) -> f64 {
    if span > 0.0 {
        lo + rng.gen_range(0.0..span)
    } else {
        lo
    }
}

/// Random in-bounds point for a fish of `base_size`, clear of the sand strip.
pub fn random_position<R: Rng + ?Sized>(
    base_size: f64,
    width: f64,
    height: f64,
    rng: &mut R,
) -> (f64, f64) {
    let margin = (base_size * LifeStage::Fry.size_factor()).round() * 2.0;
    let x = sample_span(rng, margin, width - margin * 2.0);
    let y = sample_span(rng, margin, height - margin * 2.0 - TANK_SETTINGS.sand_height - 5.0);
    (x, y)
}

impl Fish {
    fn blank(snap: &FishSnapshot, born_at: Timestamp, x: f64, y: f64, phase: f64) -> Self {
        let mut fish = Self {
            id: snap.id.clone(),
            species: snap.species,
            life_stage: snap.life_stage,
            hue: snap.hue,
            health: snap.health.clamp(0.0, 100.0),
            growth: snap.growth.clamp(0.0, 100.0),
            food_bonus_accumulated: snap.food_bonus_accumulated.max(0.0),
            base_size: snap.base_size,
            velocity_scale: snap.velocity_scale,
            born_at,
            died_at: snap.died_at,
            x,
            y,
            size: 0.0,
            facing: 1.0,
            target_x: x,
            target_y: y,
            enter_frames: 0,
            grace_frames: 0,
            phase,
            wander_cooldown: 0.0,
            dead_frames: 0,
            dead_alpha: 1.0,
            spurt_frames: 0,
        };
        if fish.life_stage == LifeStage::Dead {
            fish.health = 0.0;
        }
        fish.apply_stage_size();
        fish
    }

    /// Rebuilds a live object from its stored snapshot at a random in-bounds position.
    pub fn from_snapshot<R: Rng + ?Sized>(
        snap: &FishSnapshot,
        now: Timestamp,
        width: f64,
        height: f64,
        rng: &mut R,
    ) -> Self {
        let (x, y) = random_position(snap.base_size, width, height, rng);
        let phase = rng.gen_range(0.0..TAU);
        Self::blank(snap, snap.born_at.unwrap_or(now), x, y, phase)
    }

    fn new_snapshot<R: Rng + ?Sized>(
        species: Species,
        hue: Option<f64>,
        now: Timestamp,
        rng: &mut R,
    ) -> FishSnapshot {
        FishSnapshot {
            id: EntityId::generate(now, rng),
            species,
            life_stage: LifeStage::Fry,
            hue: hue.unwrap_or_else(|| species.base_hue()),
            health: 100.0,
            growth: 0.0,
            food_bonus_accumulated: 0.0,
            base_size: rng
                .gen_range(FISH_SETTINGS.size_min..FISH_SETTINGS.size_max + 1.0)
                .floor(),
            velocity_scale: rng.gen_range(FISH_SETTINGS.velocity_min..FISH_SETTINGS.velocity_max),
            born_at: Some(now),
            died_at: None,
            released_at: None,
        }
    }

    /// New fry at a random position. Fry from the pending queue get the spawn grace
    /// so a poll cannot evict them before their own write lands.
    pub fn spawn_fry<R: Rng + ?Sized>(
        species: Species,
        hue: Option<f64>,
        now: Timestamp,
        width: f64,
        height: f64,
        with_grace: bool,
        rng: &mut R,
    ) -> Self {
        let snap = Self::new_snapshot(species, hue, now, rng);
        let mut fish = Self::from_snapshot(&snap, now, width, height, rng);
        if with_grace {
            fish.grace_frames = TANK_SETTINGS.spawn_grace_frames;
        }
        fish
    }

    /// Purchased fry dropping in from above the water line.
    pub fn spawn_entering<R: Rng + ?Sized>(
        species: Species,
        now: Timestamp,
        width: f64,
        rng: &mut R,
    ) -> Self {
        let snap = Self::new_snapshot(species, None, now, rng);
        let x = sample_span(rng, 40.0, width - 80.0);
        let phase = rng.gen_range(0.0..TAU);
        let mut fish = Self::blank(&snap, now, x, -snap.base_size, phase);
        fish.enter_frames = FISH_SETTINGS.enter_frames;
        fish
    }

    fn apply_stage_size(&mut self) {
        self.size = (self.base_size * self.life_stage.size_factor()).round();
    }

    pub fn is_alive(&self) -> bool {
        self.life_stage.is_alive()
    }

    pub fn is_entering(&self) -> bool {
        self.enter_frames > 0
    }

    /// Inside the drop-in animation or the spawn grace window.
    pub fn is_protected(&self) -> bool {
        self.is_entering() || self.grace_frames > 0
    }

    /// Dead and fully faded; ready for the graveyard.
    pub fn is_faded(&self) -> bool {
        self.life_stage == LifeStage::Dead && self.dead_alpha <= 0.0
    }

    pub fn hit_test(&self, px: f64, py: f64, min_radius: f64) -> bool {
        (px - self.x).hypot(py - self.y) < (self.size * FISH_SETTINGS.hit_radius_factor).max(min_radius)
    }

    /// Debug tool: the only path allowed to move a stage backwards.
    pub fn debug_cycle_stage(&mut self, now: Timestamp) {
        self.life_stage = self.life_stage.debug_next();
        match self.life_stage {
            LifeStage::Dead => self.die(now),
            LifeStage::Fry => {
                self.health = 50.0;
                self.died_at = None;
                self.dead_frames = 0;
                self.dead_alpha = 1.0;
                self.growth = 0.0;
                self.food_bonus_accumulated = 0.0;
            }
            _ => {}
        }
        self.apply_stage_size();
        self.wander_cooldown = 0.0;
    }

    fn die(&mut self, now: Timestamp) {
        self.life_stage = LifeStage::Dead;
        self.health = 0.0;
        self.died_at.get_or_insert(now);
        self.spurt_frames = 0;
        self.apply_stage_size();
    }

    pub fn update<R: Rng + ?Sized>(
        &mut self,
        env: &FishEnv,
        pellets: &mut [FoodPellet],
        rng: &mut R,
    ) -> FishEvents {
        let mut events = FishEvents::default();
        self.grace_frames = self.grace_frames.saturating_sub(1);

        if self.life_stage == LifeStage::Dead {
            self.y = (self.y - FISH_SETTINGS.dead_rise_speed).max(self.size + 5.0);
            self.dead_frames += 1;
            if self.dead_frames > FISH_SETTINGS.dead_grace_frames {
                let fading = (self.dead_frames - FISH_SETTINGS.dead_grace_frames) as f64;
                self.dead_alpha = (1.0 - fading / FISH_SETTINGS.dead_fade_frames as f64).max(0.0);
            }
            return events;
        }

        if self.enter_frames > 0 {
            self.enter_frames -= 1;
            self.y += FISH_SETTINGS.enter_speed;
            self.phase += 0.06;
            if self.enter_frames == 0 {
                self.target_x = self.x;
                self.target_y = self.y;
                self.wander_cooldown = 0.0;
            }
            return events;
        }

        self.health = (self.health + (env.tank_health - self.health) * env.hp_react).clamp(0.0, 100.0);
        if self.health < FISH_SETTINGS.death_threshold {
            self.die(env.now);
            events.died = true;
            return events;
        }

        let vigor = self.health / 100.0;
        self.phase += 0.025 + vigor * 0.012;
        let speed = 0.40 + vigor * self.velocity_scale * 0.35;

        let nearest = pellets
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_active())
            .map(|(i, p)| (i, (p.x - self.x).hypot(p.y - self.y)))
            .filter(|(_, d)| *d < FISH_SETTINGS.detect_radius)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((index, distance)) = nearest {
            let pellet = &mut pellets[index];
            self.target_x = pellet.x;
            self.target_y = pellet.y;
            self.wander_cooldown = FISH_SETTINGS.seek_cooldown_frames;
            if distance < FISH_SETTINGS.eat_radius {
                pellet.eat();
                events.ate = true;
                self.credit_food();
            }
        } else {
            self.wander_cooldown -= 1.0;
            if self.wander_cooldown <= 0.0 {
                let margin = self.size * 2.0;
                self.target_x = sample_span(rng, margin, env.width - margin * 2.0);
                self.target_y = sample_span(
                    rng,
                    margin,
                    env.height - margin * 2.0 - TANK_SETTINGS.sand_height - 5.0,
                );
                self.wander_cooldown =
                    rng.gen_range(FISH_SETTINGS.wander_cooldown_min..FISH_SETTINGS.wander_cooldown_max);
            }
        }

        let dx = self.target_x - self.x;
        let dy = self.target_y - self.y;
        let distance = dx.hypot(dy);
        if distance > 2.0 {
            let boost = if nearest.is_some() {
                FISH_SETTINGS.seek_boost
            } else {
                1.0
            };
            self.x += dx / distance * speed * boost;
            self.y += dy / distance * speed * boost;
            self.facing = if dx > 0.0 { 1.0 } else { -1.0 };
        }
        self.y += (self.phase * 0.6).sin() * 0.18;

        if self.life_stage.is_growing() {
            events.matured = self.grow(env, rng);
        }

        events
    }

    fn credit_food(&mut self) {
        if !self.life_stage.is_growing() || self.food_bonus_accumulated >= FISH_SETTINGS.food_growth_cap {
            return;
        }
        let bonus = FISH_SETTINGS
            .food_growth_bonus
            .min(FISH_SETTINGS.food_growth_cap - self.food_bonus_accumulated);
        self.food_bonus_accumulated += bonus;
        self.growth = (self.growth + bonus).min(100.0);
    }

    fn grow<R: Rng + ?Sized>(&mut self, env: &FishEnv, rng: &mut R) -> bool {
        if self.spurt_frames == 0
            && env.tank_health > FISH_SETTINGS.spurt_min_tank_health
            && rng.gen_bool(FISH_SETTINGS.spurt_chance)
        {
            self.spurt_frames = FISH_SETTINGS.spurt_frames;
        }
        let multiplier = if self.spurt_frames > 0 {
            self.spurt_frames -= 1;
            FISH_SETTINGS.spurt_multiplier
        } else {
            1.0
        };

        self.growth += env.tank_health / 100.0 * FISH_SETTINGS.base_growth_rate * env.growth_speed * multiplier;
        if self.growth < 100.0 {
            return false;
        }

        self.life_stage = self.life_stage.matured();
        self.growth = 0.0;
        self.food_bonus_accumulated = 0.0;
        self.spurt_frames = 0;
        self.apply_stage_size();
        log::debug!("Fish {} grew into a {}", self.id, self.life_stage.name());
        true
    }

    pub fn to_snapshot(&self) -> FishSnapshot {
        FishSnapshot {
            id: self.id.clone(),
            species: self.species,
            life_stage: self.life_stage,
            hue: self.hue,
            health: self.health,
            growth: self.growth,
            food_bonus_accumulated: self.food_bonus_accumulated,
            base_size: self.base_size,
            velocity_scale: self.velocity_scale,
            born_at: Some(self.born_at),
            died_at: self.died_at,
            released_at: None,
        }
    }

    pub fn view(&self) -> FishView {
        FishView {
            id: self.id.clone(),
            species: self.species,
            life_stage: self.life_stage,
            hue: self.hue,
            size: self.size,
            phase: self.phase,
            health: self.health,
            x: self.x,
            y: self.y,
            facing: self.facing,
            alpha: if self.is_alive() { 1.0 } else { self.dead_alpha },
        }
    }
}
