use chrono::Duration;
use rand::Rng;

use crate::{
    constants::FOOD_SETTINGS,
    domain::Timestamp,
    storage::{Entries, keys, put, put_timestamp},
};

/// A sinking pellet. Eaten pellets fade out before they are dropped from the tank.
#[derive(Debug, Clone, PartialEq)]
pub struct FoodPellet {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    vx: f64,
    vy: f64,
    alpha: f64,
    ttl: u32,
    eaten: bool,
    floor_y: f64,
}

impl FoodPellet {
    pub fn drop_at<R: Rng + ?Sized>(x: f64, y: f64, floor_y: f64, rng: &mut R) -> Self {
        Self {
            x: x + rng.gen_range(-11.0..11.0),
            y: y + rng.gen_range(-5.0..5.0),
            radius: rng.gen_range(2.0..3.5),
            vx: rng.gen_range(-0.2..0.2),
            vy: rng.gen_range(0.35..0.7),
            alpha: 1.0,
            ttl: FOOD_SETTINGS.pellet_ttl_frames,
            eaten: false,
            floor_y,
        }
    }

    pub fn eat(&mut self) {
        self.eaten = true;
    }

    pub fn update(&mut self) {
        if self.eaten {
            self.alpha -= 0.07;
            return;
        }

        self.ttl = self.ttl.saturating_sub(1);
        if self.ttl == 0 {
            self.eaten = true;
            return;
        }

        self.x += self.vx;
        self.y += self.vy;
        if self.y > self.floor_y {
            self.y = self.floor_y;
            self.vx = 0.0;
            self.vy = 0.0;
        }
    }

    /// Still edible.
    pub fn is_active(&self) -> bool {
        self.alpha > 0.0 && !self.eaten
    }

    /// Still visible, eaten or not.
    pub fn is_alive(&self) -> bool {
        self.alpha > 0.0
    }

    pub fn alpha(&self) -> f64 {
        self.alpha.max(0.0)
    }
}

/// Persisted food counter. Refills are computed from the anchor timestamp, so a
/// closed popup or a suspended ticker catches up instead of drifting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoodSupply {
    pub units: u32,
    pub last_refill_at: Timestamp,
}

impl FoodSupply {
    pub fn full(now: Timestamp, max: u32) -> Self {
        Self {
            units: max,
            last_refill_at: now,
        }
    }

    pub fn from_stored(
        units: Option<u32>,
        last_refill_at: Option<Timestamp>,
        now: Timestamp,
        max: u32,
    ) -> Self {
        Self {
            units: units.unwrap_or(max).min(max),
            last_refill_at: last_refill_at.unwrap_or(now),
        }
    }

    /// Credits whole refill intervals since the anchor. Returns the units gained.
    pub fn refill(&mut self, now: Timestamp, distracting: bool, max: u32, refill_secs: i64) -> u32 {
        if self.units >= max || distracting || now < self.last_refill_at || refill_secs <= 0 {
            // Nothing banks while full or distracted.
            self.units = self.units.min(max);
            self.last_refill_at = now;
            return 0;
        }

        let elapsed = (now - self.last_refill_at).num_seconds();
        let intervals = elapsed / refill_secs;
        if intervals <= 0 {
            return 0;
        }

        let before = self.units;
        let gained = intervals.min((max - before) as i64) as u32;
        self.units = before + gained;
        if self.units >= max {
            self.last_refill_at = now;
        } else {
            self.last_refill_at += Duration::seconds(intervals * refill_secs);
        }
        gained
    }

    /// Consumes one unit for a feeding. Taking from a full supply starts the refill clock.
    pub fn take_one(&mut self, now: Timestamp, max: u32) -> bool {
        if self.units == 0 {
            return false;
        }
        if self.units >= max {
            self.last_refill_at = now;
        }
        self.units -= 1;
        true
    }

    pub fn seconds_until_next(&self, now: Timestamp, max: u32, refill_secs: i64) -> Option<i64> {
        if self.units >= max {
            return None;
        }
        let elapsed = (now - self.last_refill_at).num_seconds().max(0);
        Some(refill_secs - elapsed % refill_secs.max(1))
    }

    pub fn write_to(&self, entries: &mut Entries) {
        // A u32 always serializes.
        let _ = put(entries, keys::FOOD_SUPPLY, &self.units);
        put_timestamp(entries, keys::FOOD_LAST_REFILL_AT, self.last_refill_at);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn at(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_refill_one_unit_per_interval() {
        let mut supply = FoodSupply {
            units: 10,
            last_refill_at: at(0),
        };

        assert_eq!(supply.refill(at(119), false, 15, 120), 0);
        assert_eq!(supply.refill(at(250), false, 15, 120), 2);
        assert_eq!(supply.units, 12);
        // The remainder stays banked on the anchor.
        assert_eq!(supply.last_refill_at, at(240));
    }

    #[test]
    fn test_food_gating_while_distracted() {
        let mut supply = FoodSupply {
            units: 4,
            last_refill_at: at(0),
        };

        assert_eq!(supply.refill(at(10_000), true, 15, 120), 0);
        assert_eq!(supply.units, 4);
        // Distracted time never banks refills for later.
        assert_eq!(supply.refill(at(10_060), false, 15, 120), 0);
        assert_eq!(supply.refill(at(10_120), false, 15, 120), 1);
    }

    #[test]
    fn test_refill_caps_at_max() {
        let mut supply = FoodSupply {
            units: 14,
            last_refill_at: at(0),
        };
        assert_eq!(supply.refill(at(3600), false, 15, 120), 1);
        assert_eq!(supply.units, 15);
        assert_eq!(supply.last_refill_at, at(3600));
    }

    #[test]
    fn test_take_from_full_restarts_clock() {
        let mut supply = FoodSupply::full(at(0), 15);
        assert!(supply.take_one(at(500), 15));
        assert_eq!(supply.units, 14);
        assert_eq!(supply.last_refill_at, at(500));
        assert_eq!(supply.seconds_until_next(at(530), 15, 120), Some(90));

        let mut empty = FoodSupply {
            units: 0,
            last_refill_at: at(0),
        };
        assert!(!empty.take_one(at(1), 15));
    }

    #[test]
    fn test_pellet_sinks_to_floor_then_expires() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut pellet = FoodPellet::drop_at(100.0, 50.0, 238.0, &mut rng);

        for _ in 0..FOOD_SETTINGS.pellet_ttl_frames - 1 {
            pellet.update();
        }
        assert!(pellet.is_active());
        assert_eq!(pellet.y, 238.0);

        pellet.update();
        assert!(!pellet.is_active());
        assert!(pellet.is_alive());

        for _ in 0..20 {
            pellet.update();
        }
        assert!(!pellet.is_alive());
    }
}
