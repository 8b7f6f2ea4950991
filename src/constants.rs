pub const TIME_SETTINGS: TimeSettings = TimeSettings {
    tick_secs: 5,
    frame_ms: 16,
    poll_ms: 2000,
    debounce_ms: 250,
    writeback_secs: 5,
    foreground_active_secs: 12,
};

pub const GAME_BALANCE: GameBalance = GameBalance {
    start_score: 70.0,
    decay: 1.5,
    gain: 0.4,
    score_floor: 50.0,
    coin_rate: 0.2,
    passive_coin_rate: 0.01,
    passive_coin_ceiling: 50.0,
    streak_threshold_ticks: 300,
    distraction_alert_cooldown_secs: 60,
    daily_reward: 50.0,
    pomodoro_secs: 25 * 60,
    pomodoro_reward: 25.0,
};

pub const TANK_SETTINGS: TankSettings = TankSettings {
    width: 360.0,
    height: 260.0,
    sand_height: 20.0,
    decoration_bonus_each: 4.0,
    decoration_bonus_cap: 20.0,
    spawn_grace_frames: 180,
    decoration_sway_step: 0.018,
    default_fry_count: 2,
};

pub const FISH_SETTINGS: FishSettings = FishSettings {
    hp_react: 0.002,
    death_threshold: 1.0,
    dead_grace_frames: 300,
    dead_fade_frames: 120,
    dead_rise_speed: 0.4,
    enter_frames: 55,
    enter_speed: 2.5,
    detect_radius: 150.0,
    eat_radius: 14.0,
    seek_boost: 1.4,
    seek_cooldown_frames: 30.0,
    wander_cooldown_min: 200.0,
    wander_cooldown_max: 380.0,
    base_growth_rate: 100.0 / (8.0 * 60.0 * 60.0),
    food_growth_bonus: 5.0,
    food_growth_cap: 35.0,
    spurt_chance: 0.002,
    spurt_min_tank_health: 35.0,
    spurt_frames: 360,
    spurt_multiplier: 4.0,
    hit_radius_factor: 1.8,
    size_min: 17.0,
    size_max: 22.0,
    velocity_min: 0.8,
    velocity_max: 1.4,
};

pub const FOOD_SETTINGS: FoodSettings = FoodSettings {
    max_supply: 15,
    refill_secs: 120,
    pellets_min: 5,
    pellets_max: 8,
    pellet_ttl_frames: 700,
};

pub const DEFAULT_BLOCKLIST: &[&str] = &[
    "twitter.com",
    "x.com",
    "reddit.com",
    "facebook.com",
    "instagram.com",
    "tiktok.com",
    "youtube.com",
    "twitch.tv",
    "netflix.com",
    "hulu.com",
    "disneyplus.com",
    "primevideo.com",
    "pinterest.com",
    "snapchat.com",
    "tumblr.com",
];

pub const DEFAULT_WORK_HOURS: WorkHoursSettings = WorkHoursSettings {
    enabled: true,
    start: "09:00",
    end: "18:00",
    days: &[1, 2, 3, 4, 5],
};

/// URL schemes that belong to the browser itself rather than to a site.
pub const INTERNAL_SCHEMES: &[&str] = &[
    "about",
    "brave",
    "chrome",
    "chrome-extension",
    "chrome-search",
    "devtools",
    "edge",
    "moz-extension",
    "view-source",
];

pub const MESSAGE_POOLS: MessagePools = MessagePools {
    distraction: &[
        "Your fish noticed you wandered off.",
        "The tank is getting murky. Back to work?",
        "A distracting site is draining your aquarium.",
    ],
    streak: &[
        "25 focused minutes! Your fish are thriving.",
        "Deep work streak complete. Take a short break.",
        "The water is crystal clear. Great focus!",
        "Focus streak reached. Stretch and hydrate.",
    ],
    pomodoro: &[
        "Pomodoro complete! A new fry joined the tank.",
        "Timer done. Coins and a fresh fry are waiting.",
    ],
};

pub struct TimeSettings {
    pub tick_secs: u64,
    pub frame_ms: u64,
    pub poll_ms: u64,
    pub debounce_ms: i64,
    pub writeback_secs: i64,
    pub foreground_active_secs: i64,
}

pub struct GameBalance {
    pub start_score: f64,
    pub decay: f64,
    pub gain: f64,
    pub score_floor: f64,
    pub coin_rate: f64,
    pub passive_coin_rate: f64,
    pub passive_coin_ceiling: f64,
    pub streak_threshold_ticks: u32,
    pub distraction_alert_cooldown_secs: i64,
    pub daily_reward: f64,
    pub pomodoro_secs: u32,
    pub pomodoro_reward: f64,
}

pub struct TankSettings {
    pub width: f64,
    pub height: f64,
    pub sand_height: f64,
    pub decoration_bonus_each: f64,
    pub decoration_bonus_cap: f64,
    pub spawn_grace_frames: u32,
    pub decoration_sway_step: f64,
    pub default_fry_count: usize,
}

pub struct FishSettings {
    pub hp_react: f64,
    pub death_threshold: f64,
    pub dead_grace_frames: u32,
    pub dead_fade_frames: u32,
    pub dead_rise_speed: f64,
    pub enter_frames: u32,
    pub enter_speed: f64,
    pub detect_radius: f64,
    pub eat_radius: f64,
    pub seek_boost: f64,
    pub seek_cooldown_frames: f64,
    pub wander_cooldown_min: f64,
    pub wander_cooldown_max: f64,
    pub base_growth_rate: f64,
    pub food_growth_bonus: f64,
    pub food_growth_cap: f64,
    pub spurt_chance: f64,
    pub spurt_min_tank_health: f64,
    pub spurt_frames: u32,
    pub spurt_multiplier: f64,
    pub hit_radius_factor: f64,
    pub size_min: f64,
    pub size_max: f64,
    pub velocity_min: f64,
    pub velocity_max: f64,
}

pub struct FoodSettings {
    pub max_supply: u32,
    pub refill_secs: i64,
    pub pellets_min: usize,
    pub pellets_max: usize,
    pub pellet_ttl_frames: u32,
}

pub struct WorkHoursSettings {
    pub enabled: bool,
    pub start: &'static str,
    pub end: &'static str,
    pub days: &'static [u8],
}

pub struct MessagePools {
    pub distraction: &'static [&'static str],
    pub streak: &'static [&'static str],
    pub pomodoro: &'static [&'static str],
}
