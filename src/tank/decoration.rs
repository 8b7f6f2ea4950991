use std::f64::consts::TAU;

use rand::Rng;

use crate::{
    constants::TANK_SETTINGS,
    domain::{DecorationKind, DecorationSnapshot, EntityId, Timestamp},
};

/// Debug override for a living decoration's displayed vigor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugVigor {
    Thriving,
    Surviving,
    Dead,
}

impl DebugVigor {
    pub fn display_health(self) -> f64 {
        match self {
            DebugVigor::Thriving => 100.0,
            DebugVigor::Surviving => 50.0,
            DebugVigor::Dead => 15.0,
        }
    }

    /// None -> thriving -> surviving -> dead -> thriving.
    pub fn cycle(current: Option<DebugVigor>) -> DebugVigor {
        match current {
            None | Some(DebugVigor::Dead) => DebugVigor::Thriving,
            Some(DebugVigor::Thriving) => DebugVigor::Surviving,
            Some(DebugVigor::Surviving) => DebugVigor::Dead,
        }
    }

    pub fn label(health: f64) -> &'static str {
        if health >= 60.0 {
            "thriving"
        } else if health >= 30.0 {
            "surviving"
        } else {
            "dead"
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecorationView {
    pub id: EntityId,
    pub kind: DecorationKind,
    pub x: f64,
    pub y: f64,
    pub hue: f64,
    pub scale: f64,
    pub phase: f64,
    pub health: f64,
}

#[derive(Debug, Clone)]
pub struct Decoration {
    pub id: EntityId,
    pub kind: DecorationKind,
    pub x: f64,
    pub y: f64,
    pub hue: f64,
    pub scale: f64,
    phase: f64,
    spawn_frames: u32,
}

impl Decoration {
    pub fn from_snapshot<R: Rng + ?Sized>(snap: &DecorationSnapshot, rng: &mut R) -> Self {
        Self {
            id: snap.id.clone(),
            kind: snap.kind,
            x: snap.x,
            y: snap.y,
            hue: snap.hue,
            scale: snap.scale,
            phase: rng.gen_range(0.0..TAU),
            spawn_frames: 0,
        }
    }

    /// A freshly bought decoration resting on the sand. It starts inside the spawn
    /// grace window so a poll cannot evict it before its write lands.
    pub fn place_new<R: Rng + ?Sized>(
        kind: DecorationKind,
        hue: Option<f64>,
        now: Timestamp,
        rng: &mut R,
    ) -> Self {
        let snap = new_snapshot(kind, hue, now, rng);
        let mut decoration = Self::from_snapshot(&snap, rng);
        decoration.spawn_frames = TANK_SETTINGS.spawn_grace_frames;
        decoration
    }

    pub fn update(&mut self) {
        if self.kind.is_living() {
            self.phase += TANK_SETTINGS.decoration_sway_step;
        }
        self.spawn_frames = self.spawn_frames.saturating_sub(1);
    }

    pub fn is_protected(&self) -> bool {
        self.spawn_frames > 0
    }

    pub fn hit_test(&self, px: f64, py: f64, radius: f64) -> bool {
        (px - self.x).hypot(py - self.y) < radius
    }

    /// Vigor shown by the renderer. The inert kind is always drawn at full health.
    pub fn display_health(&self, tank_health: f64, debug: Option<DebugVigor>) -> f64 {
        if !self.kind.is_living() {
            return 100.0;
        }
        debug.map_or(tank_health, DebugVigor::display_health)
    }

    pub fn to_snapshot(&self) -> DecorationSnapshot {
        DecorationSnapshot {
            id: self.id.clone(),
            kind: self.kind,
            x: self.x,
            y: self.y,
            hue: self.hue,
            scale: self.scale,
            released_at: None,
        }
    }

    pub fn view(&self, tank_health: f64, debug: Option<DebugVigor>) -> DecorationView {
        DecorationView {
            id: self.id.clone(),
            kind: self.kind,
            x: self.x,
            y: self.y,
            hue: self.hue,
            scale: self.scale,
            phase: self.phase,
            health: self.display_health(tank_health, debug),
        }
    }
}

/// Snapshot for a newly bought decoration: random x, sitting on the sand.
pub fn new_snapshot<R: Rng + ?Sized>(
    kind: DecorationKind,
    hue: Option<f64>,
    now: Timestamp,
    rng: &mut R,
) -> DecorationSnapshot {
    let width = TANK_SETTINGS.width;
    DecorationSnapshot {
        id: EntityId::generate(now, rng),
        kind,
        x: 40.0 + rng.gen_range(0.0..(width - 80.0).max(1.0)),
        y: TANK_SETTINGS.height - TANK_SETTINGS.sand_height,
        hue: hue.unwrap_or_else(|| kind.default_hue()),
        scale: rng.gen_range(0.85..1.15),
        released_at: None,
    }
}
