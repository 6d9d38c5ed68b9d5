//! Line-oriented control panel driving a sync client against the relay.
//!
//! Usage: `scoreboard-control [--server <host>] [--query <viewer query string>]`

use std::{env, sync::Arc};

use anyhow::{Context, bail};
use scoreboard_relay::{
    client::SyncClient,
    config::AppConfig,
    dao::local_cache::FileCache,
    dto::game::{GameState, Team},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "commands: start <team a> <team b> | a <+n|-n> | b <+n|-n> | winner | next | server <host> | show | quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut config = AppConfig::load().client;
    apply_args(&mut config, env::args().skip(1))?;

    let cache = Arc::new(FileCache::new(config.cache_path.clone()));
    let client = SyncClient::new(config, cache).context("building sync client")?;
    client.start().await;
    print_state(&client.state());

    let mut status = client.watch_status();
    let mut updates = client.watch_state();
    updates.borrow_and_update();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else { break };
                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => run_command(&client, command).await,
                    Err(err) => println!("{err}; {HELP}"),
                }
            }
            Ok(()) = updates.changed() => {
                let state = updates.borrow_and_update().clone();
                print_state(&state);
            }
            Ok(()) = status.changed() => {
                let current = *status.borrow_and_update();
                println!("relay: {current:?}");
            }
        }
    }

    client.stop().await;
    Ok(())
}

/// A single control-panel instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Start(String, String),
    Score(Team, i64),
    Winner,
    Next,
    Server(String),
    Show,
    Quit,
}

impl Command {
    fn parse(line: &str) -> anyhow::Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            bail!("empty command");
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "start" => {
                let (Some(team_a), Some(team_b)) = (words.next(), words.next()) else {
                    bail!("start needs two team names");
                };
                Self::Start(team_a.to_string(), team_b.to_string())
            }
            "a" | "b" => {
                let team = if verb.eq_ignore_ascii_case("a") {
                    Team::TeamA
                } else {
                    Team::TeamB
                };
                let delta = words
                    .next()
                    .unwrap_or("+1")
                    .trim_start_matches('+')
                    .parse::<i64>()
                    .context("score delta must be an integer")?;
                Self::Score(team, delta)
            }
            "winner" => Self::Winner,
            "next" => Self::Next,
            "server" => {
                let Some(host) = words.next() else {
                    bail!("server needs a host");
                };
                Self::Server(host.to_string())
            }
            "show" => Self::Show,
            "quit" | "exit" => Self::Quit,
            other => bail!("unknown command `{other}`"),
        };
        Ok(command)
    }
}

async fn run_command(client: &SyncClient, command: Command) {
    let outcome = match command {
        Command::Start(team_a, team_b) => client
            .try_apply_local_change(|s| s.start_game(&team_a, &team_b))
            .map(drop),
        Command::Score(team, delta) => {
            client.apply_local_change(|s| s.update_score(team, delta));
            Ok(())
        }
        Command::Winner => client
            .try_apply_local_change(GameState::declare_winner)
            .map(drop),
        Command::Next => {
            client.apply_local_change(GameState::next_game);
            Ok(())
        }
        Command::Server(host) => {
            if let Err(err) = client.set_endpoint(&host).await {
                warn!(error = %err, "failed to switch relay endpoint");
            } else {
                info!(endpoint = %client.endpoint(), "now syncing with relay");
            }
            Ok(())
        }
        Command::Show => {
            print_state(&client.state());
            println!(
                "relay: {:?} ({}), reconnect attempts: {}",
                client.connection_status(),
                client.endpoint(),
                client.reconnect_attempts()
            );
            Ok(())
        }
        Command::Quit => Ok(()),
    };

    if let Err(err) = outcome {
        println!("rejected: {err}");
    }
}

fn print_state(state: &GameState) {
    let names = &state.team_names;
    let label = |name: &str, fallback: &'static str| {
        if name.is_empty() {
            fallback.to_string()
        } else {
            name.to_string()
        }
    };
    println!(
        "{} {} - {} {}{}",
        label(&names.team_a, "Team A"),
        state.scores.team_a,
        state.scores.team_b,
        label(&names.team_b, "Team B"),
        match (&state.winner, state.started) {
            (Some(_), _) if state.is_tie() => "  [tie]".to_string(),
            (Some(winner), _) => format!("  [winner: {winner}]"),
            (None, false) => "  [not started]".to_string(),
            (None, true) => String::new(),
        }
    );
}

/// Apply `--server <host>` and `--query <query string>` overrides.
fn apply_args(
    config: &mut scoreboard_relay::config::ClientConfig,
    mut args: impl Iterator<Item = String>,
) -> anyhow::Result<()> {
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--server" => {
                let host = args.next().context("--server needs a value")?;
                config.apply_query_override(&format!("server={host}"));
            }
            "--query" => {
                let query = args.next().context("--query needs a value")?;
                config.apply_query_override(&query);
            }
            other => bail!("unexpected argument `{other}`"),
        }
    }
    Ok(())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warn,scoreboard_relay=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
