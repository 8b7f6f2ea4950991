mod actions;
mod classifier;
mod cli;
mod config;
mod constants;
mod domain;
mod notify;
mod popup;
mod score;
mod storage;
mod sync;
mod tank;
mod ticker;

fn main() {
    // RUST_LOG wins over the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::debug!("aquafocus starting");
    cli::run_cli();
}
