use std::error::Error;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use log::warn;

use sourcequery::context::{ContextConfig, QueryContext};
use sourcequery::info::ServerInfo;
use sourcequery::player::Players;
use sourcequery::query::SourceQuery;

/// Query a Source engine server for its info and player list
#[derive(Parser)]
#[command(name = "sourcequery", version, about, long_about = None)]
struct Cli {
    /// Server hostname or address
    host: String,

    /// Query port
    #[arg(short, long, default_value_t = 27015)]
    port: u16,

    /// Deadline for each query, in milliseconds
    #[arg(short, long, default_value_t = 1500)]
    timeout_ms: u64,

    /// Skip the player list
    #[arg(long)]
    no_players: bool,

    /// Worker threads (defaults to twice the core count)
    #[arg(long)]
    workers: Option<usize>,
}

fn summary(info: &ServerInfo) -> String {
    format!(
        "{}\n\t{} ({}/{}) - {}:{}\n",
        info.hostname,
        info.map,
        info.players,
        info.maxplayers,
        info.sender.ip(),
        info.sender.port()
    )
}

fn roster(players: &Players) -> String {
    players
        .players
        .iter()
        .map(|p| format!("{} [{}] / ", p.name, p.score))
        .collect()
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init_from_env(Env::default().default_filter_or("warn"));
    let cli = Cli::parse();

    let ctx = QueryContext::new(ContextConfig {
        worker_threads: cli.workers,
        ..ContextConfig::default()
    })?;
    let client = SourceQuery::new(ctx.handle());
    let timeout = Some(Duration::from_millis(cli.timeout_ms));

    let target = (cli.host.as_str(), cli.port);
    let info = client.info(target, timeout);
    let players = (!cli.no_players).then(|| client.players(target, timeout));

    let result = info.wait().map(|info| {
        let mut reply = summary(&info);
        match players.map(|p| p.wait()) {
            Some(Ok(players)) => reply.push_str(&roster(&players)),
            Some(Err(e)) => warn!("player list unavailable: {e}"),
            None => {}
        }
        reply
    });

    ctx.shutdown();
    println!("{}", result?);
    Ok(())
}
