use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    constants::{FOOD_SETTINGS, GAME_BALANCE, TIME_SETTINGS},
    storage::read_json,
};

pub const BALANCE_FILE: &str = "balance.json";

/// Tunable game balance. Any field missing from `balance.json` keeps its built-in value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Balance {
    pub tick_secs: u64,
    pub start_score: f64,
    pub decay: f64,
    pub gain: f64,
    pub score_floor: f64,
    pub coin_rate: f64,
    pub passive_coin_rate: f64,
    pub passive_coin_ceiling: f64,
    pub streak_threshold_ticks: u32,
    pub distraction_alert_cooldown_secs: i64,
    pub foreground_active_secs: i64,
    pub food_refill_secs: i64,
    pub max_food: u32,
    pub daily_reward: f64,
    pub pomodoro_secs: u32,
    pub pomodoro_reward: f64,
}

impl Default for Balance {
    fn default() -> Self {
        Self {
            tick_secs: TIME_SETTINGS.tick_secs,
            start_score: GAME_BALANCE.start_score,
            decay: GAME_BALANCE.decay,
            gain: GAME_BALANCE.gain,
            score_floor: GAME_BALANCE.score_floor,
            coin_rate: GAME_BALANCE.coin_rate,
            passive_coin_rate: GAME_BALANCE.passive_coin_rate,
            passive_coin_ceiling: GAME_BALANCE.passive_coin_ceiling,
            streak_threshold_ticks: GAME_BALANCE.streak_threshold_ticks,
            distraction_alert_cooldown_secs: GAME_BALANCE.distraction_alert_cooldown_secs,
            foreground_active_secs: TIME_SETTINGS.foreground_active_secs,
            food_refill_secs: FOOD_SETTINGS.refill_secs,
            max_food: FOOD_SETTINGS.max_supply,
            daily_reward: GAME_BALANCE.daily_reward,
            pomodoro_secs: GAME_BALANCE.pomodoro_secs,
            pomodoro_reward: GAME_BALANCE.pomodoro_reward,
        }
    }
}

impl Balance {
    /// Clamp values that would break the score or food invariants.
    fn sanitized(mut self) -> Self {
        let defaults = Balance::default();
        if self.tick_secs == 0 {
            self.tick_secs = defaults.tick_secs;
        }
        self.start_score = self.start_score.clamp(0.0, 100.0);
        self.score_floor = self.score_floor.clamp(0.0, 100.0);
        self.decay = self.decay.max(0.0);
        self.gain = self.gain.max(0.0);
        self.coin_rate = self.coin_rate.max(0.0);
        self.passive_coin_rate = self.passive_coin_rate.max(0.0);
        if self.food_refill_secs <= 0 {
            self.food_refill_secs = defaults.food_refill_secs;
        }
        if self.streak_threshold_ticks == 0 {
            self.streak_threshold_ticks = defaults.streak_threshold_ticks;
        }
        self
    }
}

pub fn load_balance(data_dir: &Path) -> Balance {
    let path = data_dir.join(BALANCE_FILE);
    if !path.exists() {
        return Balance::default();
    }

    match read_json::<Balance>(&path) {
        Ok(balance) => {
            log::debug!("Loaded balance overrides from {}", path.display());
            balance.sanitized()
        }
        Err(e) => {
            log::warn!("Could not load {}: {}, using defaults", path.display(), e);
            Balance::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf, time::SystemTime};

    use super::*;

    fn unique_dir(prefix: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = PathBuf::from(format!("/tmp/{}_{}", prefix, now));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = unique_dir("aquafocus_balance_missing");
        assert_eq!(load_balance(&dir), Balance::default());
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_partial_overrides_keep_other_defaults() {
        let dir = unique_dir("aquafocus_balance_partial");
        fs::write(dir.join(BALANCE_FILE), r#"{"decay": 3.0, "startScore": 140}"#).unwrap();

        let balance = load_balance(&dir);
        assert_eq!(balance.decay, 3.0);
        assert_eq!(balance.start_score, 100.0);
        assert_eq!(balance.gain, GAME_BALANCE.gain);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let dir = unique_dir("aquafocus_balance_bad");
        fs::write(dir.join(BALANCE_FILE), "{not json").unwrap();
        assert_eq!(load_balance(&dir), Balance::default());
        fs::remove_dir_all(dir).ok();
    }
}
