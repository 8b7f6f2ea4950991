use crate::{classifier::Verdict, config::Balance, domain::FocusState};

/// What a tick did beyond mutating the state; the ticker turns these into notifications.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickEffects {
    pub rolled_over: bool,
    pub distraction_edge: bool,
    pub streak_completed: bool,
    pub coins_earned: f64,
    pub score_delta: f64,
}

pub fn round_coins(coins: f64) -> f64 {
    (coins * 1000.0).round() / 1000.0
}

/// One Score Engine transition. `count_time` is false while the foreground owns the
/// second counters; everything else still advances.
pub fn apply_tick(
    state: &mut FocusState,
    verdict: &Verdict,
    balance: &Balance,
    today: &str,
    count_time: bool,
) -> TickEffects {
    let mut effects = TickEffects::default();

    if state.last_focus_date != today {
        state.focus_seconds = 0;
        state.distracted_seconds = 0;
        state.last_focus_date = today.to_string();
        effects.rolled_over = true;
    }

    effects.distraction_edge = verdict.is_distracting && !state.is_distracting;

    if count_time {
        if verdict.is_distracting {
            state.distracted_seconds += balance.tick_secs;
        } else {
            state.focus_seconds += balance.tick_secs;
        }
    }

    let score_before = state.focus_score;
    let coins_before = state.coins;

    if verdict.in_work_hours {
        if verdict.is_distracting {
            // Never pushes a score that is already under the floor further down.
            if state.focus_score > balance.score_floor {
                state.focus_score = (state.focus_score - balance.decay).max(balance.score_floor);
            }
            state.focus_streak_ticks = 0;
        } else {
            state.coins += score_before / 100.0 * balance.coin_rate;
            state.focus_score = (state.focus_score + balance.gain).min(100.0);
            state.focus_streak_ticks += 1;
            if state.focus_streak_ticks >= balance.streak_threshold_ticks {
                state.focus_streak_ticks = 0;
                effects.streak_completed = true;
            }
        }
    }

    if state.coins < balance.passive_coin_ceiling {
        state.coins = (state.coins + balance.passive_coin_rate).min(balance.passive_coin_ceiling);
    }

    state.focus_score = state.focus_score.clamp(0.0, 100.0);
    state.coins = round_coins(state.coins.max(0.0));
    state.is_distracting = verdict.is_distracting;
    state.current_site_id = verdict.site_id().to_string();

    effects.coins_earned = state.coins - coins_before;
    effects.score_delta = state.focus_score - score_before;

    log::debug!(
        "Tick: score {:.2} -> {:.2}, coins {:.3}, distracting={}, in_work_hours={}",
        score_before,
        state.focus_score,
        state.coins,
        verdict.is_distracting,
        verdict.in_work_hours
    );

    effects
}
