use std::{
    io,
    path::PathBuf,
    thread,
    time::{Duration as StdDuration, Instant},
};

use chrono::{Local, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};

use crate::{
    actions::{self, ActionError, HistoryFormat, HistoryLog},
    config::{Balance, load_balance},
    constants::TIME_SETTINGS,
    domain::{Background, DecorationKind, Species, WorkHours},
    notify::LogNotifier,
    popup::{FeedOutcome, Popup},
    storage::{self, JsonFileStore, load_snapshot},
    sync::PollOutcome,
    tank::decoration::DebugVigor,
    ticker::{self, FileTabProvider, FixedTab, TabProvider, TickReport},
};

#[derive(Parser, Debug)]
#[command(name = "aquafocus")]
#[command(about = "Focus tracking that keeps a virtual aquarium alive", long_about = None)]
pub struct Cli {
    #[arg(long, global = true, help = "Data directory (defaults to the platform data dir)")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(about = "Run one background tick")]
    Tick {
        #[arg(long, help = "Classify this url instead of the active tab file")]
        url: Option<String>,
    },

    #[command(about = "Tick on a schedule until interrupted")]
    Run {
        #[arg(long, help = "Stop after this many ticks")]
        ticks: Option<u64>,
    },

    #[command(about = "Set or clear the active tab url")]
    Tab {
        #[arg(help = "Url of the active tab", required_unless_present = "clear")]
        url: Option<String>,

        #[arg(long, help = "No active tab", conflicts_with = "url")]
        clear: bool,
    },

    #[command(about = "Run the tank headless for a while")]
    Popup {
        #[arg(long, default_value_t = 10, help = "How long to keep the tank open")]
        seconds: u64,

        #[arg(long, help = "Classify this url instead of the active tab file")]
        url: Option<String>,

        #[arg(long, help = "Enable debug overrides")]
        debug: bool,

        #[arg(long, help = "Tank health override (debug only)")]
        health: Option<f64>,

        #[arg(long, help = "Growth speed multiplier (debug only)")]
        growth_speed: Option<f64>,

        #[arg(long, value_name = "X,Y", value_parser = parse_point, help = "Tap the tank here (feeds, or cycles in debug)")]
        tap: Vec<(f64, f64)>,

        #[arg(long = "move", value_name = "X,Y,TO_X,TO_Y", value_parser = parse_move, help = "Drag a decoration")]
        moves: Vec<[f64; 4]>,

        #[arg(long, value_parser = parse_species, help = "Buy a fish into the open tank")]
        buy: Option<Species>,

        #[arg(long, value_parser = parse_decoration, help = "Buy a decoration into the open tank")]
        buy_decoration: Option<DecorationKind>,
    },

    #[command(about = "Show score, coins and the tank")]
    Status,

    #[command(about = "Claim the daily coin reward")]
    Claim,

    #[command(about = "Reset the tank to three adult fish")]
    Reset {
        #[arg(long, help = "Confirm the reset")]
        yes: bool,
    },

    #[command(about = "Release a fish by id")]
    Release {
        #[arg(help = "Fish id")]
        id: String,
    },

    #[command(about = "Release a decoration by id")]
    ReleaseDecoration {
        #[arg(help = "Decoration id")]
        id: String,
    },

    #[command(about = "Buy a fish")]
    Buy {
        #[arg(value_parser = parse_species, help = "Species")]
        species: Species,
    },

    #[command(about = "Buy a decoration")]
    BuyDecoration {
        #[arg(value_parser = parse_decoration, help = "Decoration kind")]
        kind: DecorationKind,
    },

    #[command(about = "Buy or select a tank background")]
    Background {
        #[arg(value_parser = parse_background, help = "Background name")]
        name: Background,
    },

    #[command(about = "Control the pomodoro timer")]
    Pomodoro {
        #[arg(value_enum)]
        action: PomodoroAction,
    },

    #[command(about = "Edit the distraction block-list")]
    Blocklist {
        #[arg(value_enum)]
        action: BlocklistAction,

        #[arg(help = "Site host or url", required_if_eq_any = [("action", "add"), ("action", "remove")])]
        site: Option<String>,
    },

    #[command(about = "Configure work hours")]
    WorkHours {
        #[arg(long, help = "Start time, HH:MM")]
        start: String,

        #[arg(long, help = "End time, HH:MM")]
        end: String,

        #[arg(long, value_delimiter = ',', default_values_t = [1u8, 2, 3, 4, 5], help = "Days, 0 = Sunday")]
        days: Vec<u8>,

        #[arg(long, help = "Count every hour as work hours")]
        always: bool,
    },

    #[command(about = "Export the graveyard or released log")]
    Export {
        #[arg(long, value_enum, help = "Which log")]
        log: ExportLog,

        #[arg(long, value_enum, default_value = "json", help = "Export format")]
        format: ExportFormat,

        #[arg(long, short, help = "Output path")]
        out: Option<PathBuf>,
    },

    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(help = "Shell type (bash, zsh, fish)")]
        shell: String,
    },
}

#[derive(Debug, Clone, ValueEnum)]
pub enum PomodoroAction {
    Start,
    Pause,
    Status,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum BlocklistAction {
    Add,
    Remove,
    List,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ExportLog {
    Graveyard,
    Released,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

fn parse_species(raw: &str) -> Result<Species, String> {
    Species::parse(raw).ok_or_else(|| {
        let names: Vec<&str> = Species::ALL.iter().map(|s| s.name()).collect();
        format!("unknown species '{}', expected one of {}", raw, names.join(", "))
    })
}

fn parse_decoration(raw: &str) -> Result<DecorationKind, String> {
    DecorationKind::parse(raw).ok_or_else(|| {
        let names: Vec<&str> = DecorationKind::ALL.iter().map(|k| k.name()).collect();
        format!("unknown decoration '{}', expected one of {}", raw, names.join(", "))
    })
}

fn parse_background(raw: &str) -> Result<Background, String> {
    Background::parse(raw).ok_or_else(|| {
        let names: Vec<&str> = Background::ALL.iter().map(|b| b.name()).collect();
        format!("unknown background '{}', expected one of {}", raw, names.join(", "))
    })
}

fn parse_numbers(raw: &str, count: usize) -> Result<Vec<f64>, String> {
    let values: Vec<f64> = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("'{}': {}", raw, e))?;
    if values.len() != count {
        return Err(format!("'{}': expected {} comma separated numbers", raw, count));
    }
    Ok(values)
}

fn parse_point(raw: &str) -> Result<(f64, f64), String> {
    let v = parse_numbers(raw, 2)?;
    Ok((v[0], v[1]))
}

fn parse_move(raw: &str) -> Result<[f64; 4], String> {
    let v = parse_numbers(raw, 4)?;
    Ok([v[0], v[1], v[2], v[3]])
}

/// Input replayed into a headless foreground once it has synced.
struct Interactions {
    taps: Vec<(f64, f64)>,
    moves: Vec<[f64; 4]>,
    buy: Option<Species>,
    buy_decoration: Option<DecorationKind>,
}

struct Context {
    state_dir: PathBuf,
    store: JsonFileStore,
    balance: Balance,
}

impl Context {
    fn new(data_dir: Option<PathBuf>) -> Self {
        let data_dir = storage::get_data_dir(data_dir.as_deref());
        let state_dir = storage::get_state_dir(Some(&data_dir));
        Self {
            store: JsonFileStore::new(storage::get_store_path(&data_dir)),
            balance: load_balance(&data_dir),
            state_dir,
        }
    }

    fn tabs(&self, url: Option<String>) -> Box<dyn TabProvider> {
        match url {
            Some(url) => Box::new(FixedTab(Some(url))),
            None => Box::new(FileTabProvider::new(storage::get_active_tab_path(&self.state_dir))),
        }
    }
}

fn format_seconds(total: u64) -> String {
    format!("{}h {:02}m {:02}s", total / 3600, (total % 3600) / 60, total % 60)
}

fn tick(ctx: &Context, url: Option<String>) {
    let tabs = ctx.tabs(url);
    let mut rng = rand::thread_rng();
    let report = ticker::run_tick(
        &ctx.store,
        tabs.as_ref(),
        &mut LogNotifier,
        &ctx.balance,
        &Local::now(),
        &mut rng,
    );
    match report {
        TickReport::NoActiveSite => println!("No active site, nothing recorded"),
        TickReport::StorageUnavailable => println!("Storage unavailable, tick skipped"),
        TickReport::Applied(summary) => println!(
            "{} {} ({:+.1} score, +{:.3} coins)",
            if summary.verdict.is_distracting { "Distracted on" } else { "Focused on" },
            summary.verdict.site_id(),
            summary.effects.score_delta,
            summary.effects.coins_earned
        ),
    }
}

fn run(ctx: &Context, ticks: Option<u64>) {
    let tabs = ctx.tabs(None);
    let mut rng = rand::thread_rng();
    log::info!("Ticking every {}s", ctx.balance.tick_secs);
    let fired = ticker::run_schedule(&ctx.store, tabs.as_ref(), &mut LogNotifier, &ctx.balance, ticks, &mut rng);
    println!("Ran {} ticks", fired);
}

fn set_tab(ctx: &Context, url: Option<String>, clear: bool) -> Result<(), ActionError> {
    let path = storage::get_active_tab_path(&ctx.state_dir);
    match url.filter(|_| !clear) {
        Some(url) => {
            storage::write_text_file(&path, url.trim())?;
            println!("Active tab: {}", url.trim());
        }
        None => {
            storage::delete_file_if_exists(&path)?;
            println!("Active tab cleared");
        }
    }
    Ok(())
}

fn replay<R: rand::Rng + ?Sized>(ctx: &Context, popup: &mut Popup, input: Interactions, rng: &mut R) -> Result<(), ActionError> {
    let now = Utc::now();
    if let Some(species) = input.buy {
        popup.buy_fish(&ctx.store, species, now, rng)?;
        println!("A {} fish drops into the tank", species.name());
    }
    if let Some(kind) = input.buy_decoration {
        popup.buy_decoration(&ctx.store, kind, now, rng)?;
        println!("Placed a {}", kind.name());
    }
    for (x, y) in input.taps {
        match popup.feed(x, y, now, rng) {
            FeedOutcome::Dropped(pellets) => println!("Dropped {} pellets at ({:.0}, {:.0})", pellets, x, y),
            FeedOutcome::StageCycled(stage) => println!("Fish is now {}", stage.name()),
            FeedOutcome::VigorCycled(vigor) => println!("Decoration now shows {:?}", vigor),
            FeedOutcome::NoFood => println!("Out of food"),
        }
    }
    if !input.moves.is_empty() {
        popup.presentation.rearrange_mode = true;
        for [x, y, to_x, to_y] in input.moves {
            if popup.grab(x, y).is_none() {
                println!("No decoration at ({:.0}, {:.0})", x, y);
                continue;
            }
            popup.drag(to_x, to_y);
            if let Some(id) = popup.drop_held(now) {
                println!("Moved {} to ({:.0}, {:.0})", id, to_x, to_y);
            }
        }
        popup.presentation.rearrange_mode = false;
    }
    Ok(())
}

fn popup(
    ctx: &Context,
    seconds: u64,
    url: Option<String>,
    debug: bool,
    health: Option<f64>,
    growth_speed: Option<f64>,
    input: Interactions,
) -> Result<(), ActionError> {
    let tabs = ctx.tabs(url);
    let mut rng = rand::thread_rng();
    let mut popup = Popup::open(&ctx.store, ctx.balance.clone(), &Local::now(), &mut rng);
    popup.presentation.debug_mode = debug;
    popup.presentation.health_override = health;
    popup.presentation.growth_speed = growth_speed;

    let tab = tabs.active_tab_url();
    popup.poll(&ctx.store, tab.as_deref(), &Local::now(), &mut rng);
    replay(ctx, &mut popup, input, &mut rng)?;

    let frame_rate = StdDuration::from_millis(TIME_SETTINGS.frame_ms);
    let poll_rate = StdDuration::from_millis(TIME_SETTINGS.poll_ms);
    let started = Instant::now();
    let mut last_frame = Instant::now();
    let mut last_poll = Instant::now();

    while started.elapsed() < StdDuration::from_secs(seconds) {
        if last_poll.elapsed() >= poll_rate {
            let tab = tabs.active_tab_url();
            if popup.poll(&ctx.store, tab.as_deref(), &Local::now(), &mut rng) == PollOutcome::StorageUnavailable {
                log::warn!("Poll could not read the store");
            }
            last_poll = Instant::now();
        }

        if last_frame.elapsed() >= frame_rate {
            popup.frame(&ctx.store, Utc::now(), &mut rng);
            popup.clock(&Local::now());
            last_frame = Instant::now();
        }

        thread::sleep(StdDuration::from_millis(2));
    }

    popup.close(&ctx.store, Utc::now())?;
    let view = popup.view(Utc::now());
    println!(
        "Tank health {:.0}, {} fish, {} decorations, food {}",
        view.tank.tank_health,
        view.tank.fish.len(),
        view.tank.decorations.len(),
        view.food
    );
    for fish in &view.tank.fish {
        println!(
            "  {} {:<9} {:<8} health {:>5.1}",
            fish.id,
            fish.species.name(),
            fish.life_stage.name(),
            fish.health
        );
    }
    for decoration in &view.tank.decorations {
        let vigor = if decoration.kind.is_living() {
            DebugVigor::label(decoration.health)
        } else {
            "-"
        };
        println!(
            "  {} {:<14} at ({:>5.1}, {:>5.1}) {}",
            decoration.id,
            decoration.kind.name(),
            decoration.x,
            decoration.y,
            vigor
        );
    }
    Ok(())
}

fn status(ctx: &Context) -> Result<(), ActionError> {
    let snapshot = load_snapshot(&ctx.store, ctx.balance.start_score)?;
    let focus = &snapshot.focus;
    let now = Utc::now();

    println!("Focus score:  {:.1}", focus.focus_score);
    println!("Coins:        {:.2}", focus.coins);
    println!("Focused:      {}", format_seconds(focus.focus_seconds));
    println!("Distracted:   {}", format_seconds(focus.distracted_seconds));
    if !focus.current_site_id.is_empty() {
        println!(
            "Current site: {}{}",
            focus.current_site_id,
            if focus.is_distracting { " (distracting)" } else { "" }
        );
    }
    println!(
        "Food:         {}/{}",
        snapshot.food_supply.unwrap_or(ctx.balance.max_food),
        ctx.balance.max_food
    );
    println!("Background:   {}", snapshot.background.name());
    if snapshot.pomodoro.is_running() {
        println!(
            "Pomodoro:     {} left",
            format_seconds(snapshot.pomodoro.remaining_at(now, ctx.balance.pomodoro_secs) as u64)
        );
    }

    println!("\nFish ({}):", snapshot.fish.len());
    for fish in &snapshot.fish {
        println!(
            "  {} {:<9} {:<8} health {:>5.1}",
            fish.id,
            fish.species.name(),
            fish.life_stage.name(),
            fish.health
        );
    }
    if !snapshot.pending_fish.is_empty() {
        println!("  + {} waiting to be added", snapshot.pending_fish.len());
    }

    println!("\nDecorations ({}):", snapshot.decorations.len());
    for decoration in &snapshot.decorations {
        println!("  {} {}", decoration.id, decoration.kind.name());
    }
    println!(
        "\nGraveyard: {}  Released: {}",
        snapshot.graveyard.len(),
        snapshot.released_fish.len() + snapshot.released_decorations.len()
    );
    Ok(())
}

fn reset(ctx: &Context, yes: bool) -> Result<(), ActionError> {
    if !yes {
        println!("This deletes all fish, coins and stats. Re-run with --yes to confirm.");
        return Ok(());
    }
    storage::create_backup(ctx.store.path())?;
    let mut rng = rand::thread_rng();
    actions::reset_tank(&ctx.store, &ctx.balance, &Local::now(), &mut rng)?;
    println!("Tank reset. Starting fresh with 3 fish!");
    Ok(())
}

fn background(ctx: &Context, name: Background) -> Result<(), ActionError> {
    let unlocked = load_snapshot(&ctx.store, ctx.balance.start_score)?.unlocked_backgrounds;
    if unlocked.contains(&name) {
        actions::select_background(&ctx.store, &ctx.balance, name)?;
        println!("Background set to {}", name.name());
    } else {
        let remaining = actions::purchase_background(&ctx.store, name)?;
        println!("Unlocked {} ({:.2} coins left)", name.name(), remaining);
    }
    Ok(())
}

fn pomodoro(ctx: &Context, action: PomodoroAction) -> Result<(), ActionError> {
    let now = Utc::now();
    let pomodoro = match action {
        PomodoroAction::Start => actions::start_pomodoro(&ctx.store, &ctx.balance, now)?,
        PomodoroAction::Pause => actions::pause_pomodoro(&ctx.store, &ctx.balance, now)?,
        PomodoroAction::Status => load_snapshot(&ctx.store, ctx.balance.start_score)?.pomodoro,
    };
    println!(
        "Pomodoro {}: {} left",
        if pomodoro.is_running() { "running" } else { "paused" },
        format_seconds(pomodoro.remaining_at(now, ctx.balance.pomodoro_secs) as u64)
    );
    Ok(())
}

fn blocklist(ctx: &Context, action: BlocklistAction, site: Option<String>) -> Result<(), ActionError> {
    let site = site.unwrap_or_default();
    match action {
        BlocklistAction::Add => {
            if actions::block_site(&ctx.store, &ctx.balance, &site)? {
                println!("Blocked {}", site);
            } else {
                println!("{} is already blocked", site);
            }
        }
        BlocklistAction::Remove => {
            if actions::unblock_site(&ctx.store, &ctx.balance, &site)? {
                println!("Unblocked {}", site);
            } else {
                println!("{} was not blocked", site);
            }
        }
        BlocklistAction::List => {
            let blocklist = load_snapshot(&ctx.store, ctx.balance.start_score)?.blocklist;
            for entry in blocklist.entries() {
                println!("{}", entry);
            }
        }
    }
    Ok(())
}

fn export(ctx: &Context, log: ExportLog, format: ExportFormat, out: Option<PathBuf>) -> Result<(), ActionError> {
    let log = match log {
        ExportLog::Graveyard => HistoryLog::Graveyard,
        ExportLog::Released => HistoryLog::Released,
    };
    let format = match format {
        ExportFormat::Json => HistoryFormat::Json,
        ExportFormat::Csv => HistoryFormat::Csv,
    };
    let content = actions::export_history(&ctx.store, log, format, Utc::now())?;
    if let Some(path) = out {
        storage::write_text_file(&path, &content)?;
        println!("Exported to {}", path.display());
    } else {
        println!("{}", content);
    }
    Ok(())
}

pub fn print_completions(shell: &str) -> Result<(), String> {
    use clap_complete::Shell;
    let shell = match shell {
        "bash" => Shell::Bash,
        "zsh" => Shell::Zsh,
        "fish" => Shell::Fish,
        _ => {
            return Err(format!(
                "Unsupported shell: {}. Use bash, zsh, or fish.",
                shell
            ));
        }
    };
    clap_complete::generate(shell, &mut Cli::command(), "aquafocus", &mut io::stdout());
    Ok(())
}

fn exit_on_error<E: std::fmt::Display>(result: Result<(), E>) {
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

pub fn run_cli() {
    let cli = Cli::parse();
    if let Command::Completions { shell } = &cli.command {
        exit_on_error(print_completions(shell));
        return;
    }

    let ctx = Context::new(cli.data_dir);
    let now = Utc::now();
    match cli.command {
        Command::Tick { url } => tick(&ctx, url),
        Command::Run { ticks } => run(&ctx, ticks),
        Command::Tab { url, clear } => exit_on_error(set_tab(&ctx, url, clear)),
        Command::Popup {
            seconds,
            url,
            debug,
            health,
            growth_speed,
            tap,
            moves,
            buy,
            buy_decoration,
        } => exit_on_error(popup(
            &ctx,
            seconds,
            url,
            debug,
            health,
            growth_speed,
            Interactions {
                taps: tap,
                moves,
                buy,
                buy_decoration,
            },
        )),
        Command::Status => exit_on_error(status(&ctx)),
        Command::Claim => exit_on_error(
            actions::claim_daily(&ctx.store, &ctx.balance, &Local::now())
                .map(|coins| println!("Claimed! {:.2} coins", coins)),
        ),
        Command::Reset { yes } => exit_on_error(reset(&ctx, yes)),
        Command::Release { id } => exit_on_error(
            actions::release_fish(&ctx.store, &id, now)
                .map(|fish| println!("Released {} fish {}", fish.species.name(), fish.id)),
        ),
        Command::ReleaseDecoration { id } => exit_on_error(
            actions::release_decoration(&ctx.store, &id, now)
                .map(|d| println!("Released {} {}", d.kind.name(), d.id)),
        ),
        Command::Buy { species } => exit_on_error(
            actions::purchase_fish(&ctx.store, species).map(|left| {
                println!("A {} fry is on its way ({:.2} coins left)", species.name(), left)
            }),
        ),
        Command::BuyDecoration { kind } => {
            let mut rng = rand::thread_rng();
            exit_on_error(
                actions::purchase_decoration(&ctx.store, kind, now, &mut rng)
                    .map(|d| println!("Placed a {} ({})", kind.name(), d.id)),
            )
        }
        Command::Background { name } => exit_on_error(background(&ctx, name)),
        Command::Pomodoro { action } => exit_on_error(pomodoro(&ctx, action)),
        Command::Blocklist { action, site } => exit_on_error(blocklist(&ctx, action, site)),
        Command::WorkHours {
            start,
            end,
            days,
            always,
        } => exit_on_error(
            actions::set_work_hours(
                &ctx.store,
                WorkHours {
                    enabled: !always,
                    start,
                    end,
                    days,
                },
            )
            .map(|_| println!("Work hours saved")),
        ),
        Command::Export { log, format, out } => exit_on_error(export(&ctx, log, format, out)),
        Command::Completions { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_global_data_dir_and_species() {
        let cli = Cli::try_parse_from(["aquafocus", "--data-dir", "/tmp/aq", "buy", "Betta"]).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/aq")));
        assert!(matches!(cli.command, Command::Buy { species: Species::Betta }));

        assert!(Cli::try_parse_from(["aquafocus", "buy", "shark"]).is_err());
    }

    #[test]
    fn test_work_hours_days_default_to_weekdays() {
        let cli = Cli::try_parse_from(["aquafocus", "work-hours", "--start", "09:00", "--end", "17:00"]).unwrap();
        match cli.command {
            Command::WorkHours { days, always, .. } => {
                assert_eq!(days, vec![1, 2, 3, 4, 5]);
                assert!(!always);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_popup_interactions_parse() {
        let cli = Cli::try_parse_from([
            "aquafocus", "popup", "--tap", "100,50", "--tap", "10, 20", "--move", "1,2,3,4",
        ])
        .unwrap();
        match cli.command {
            Command::Popup { tap, moves, .. } => {
                assert_eq!(tap, vec![(100.0, 50.0), (10.0, 20.0)]);
                assert_eq!(moves, vec![[1.0, 2.0, 3.0, 4.0]]);
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Cli::try_parse_from(["aquafocus", "popup", "--tap", "100"]).is_err());
    }

    #[test]
    fn test_seconds_format() {
        assert_eq!(format_seconds(3725), "1h 02m 05s");
    }
}
