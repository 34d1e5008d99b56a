use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use paddock_client::Client;
use paddock_execution::{
    BetAccountingEngine, ChainError, Error, LookupTableSweeper, RaceLedger, ResolutionScheduler,
    TickOutcome,
};
use paddock_node::{Config, SqliteStore, ValidatedConfig};
use paddock_types::{pool_name, Address, PoolId, RaceId};
use std::{
    path::PathBuf,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs and settles paddock races.", long_about = None)]
struct Args {
    /// Path to the YAML config file.
    #[arg(long)]
    config: PathBuf,

    /// Validate the config and exit.
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Drive resolution and lookup table sweeps until interrupted (default).
    Run,
    /// Open a new race for betting.
    CreateRace {
        #[arg(long, default_value = "operator")]
        operator: String,
    },
    /// Close betting on the open race and start it.
    StartRace,
    /// Finish the running race with the given winner and settle it.
    ForceResolve {
        #[arg(long)]
        pool: u16,
    },
    /// Show pool totals for a race (latest when omitted).
    Pools {
        #[arg(long)]
        race: Option<u64>,
    },
    /// Clear a rejected settlement so the next tick resubmits it.
    RetrySettlement {
        #[arg(long)]
        race: u64,
    },
    /// Close lookup tables that are old enough.
    Sweep,
    /// Create a user record for a handle and wallet.
    RegisterUser {
        #[arg(long)]
        handle: String,
        /// Hex wallet address.
        #[arg(long)]
        wallet: String,
    },
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

fn init_logging(config: &ValidatedConfig) {
    let builder = tracing_subscriber::fmt().with_max_level(config.log_level);
    if config.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_client(config: &ValidatedConfig) -> Result<Client> {
    let client = Client::new(&config.rpc_url, config.program_id, config.signer.clone())
        .context("Failed to create chain client")?
        .with_confirmation(config.confirm_timeout, config.confirm_poll)
        .with_compute_unit_price(config.compute_unit_price_micro_lamports);
    Ok(client)
}

fn log_tick(result: Result<TickOutcome, Error>) {
    match result {
        Ok(TickOutcome::Skipped) | Ok(TickOutcome::Idle) => {}
        Ok(TickOutcome::Racing {
            race_id,
            ends_at_ms,
        }) => debug!(%race_id, ends_at_ms, "race running"),
        Ok(TickOutcome::Settled {
            race_id,
            winning_pool,
            signature,
        }) => info!(%race_id, %winning_pool, ?signature, "race settled"),
        Ok(TickOutcome::Submitting { race_id }) => {
            debug!(%race_id, "settlement claimed by another settler")
        }
        Ok(TickOutcome::InFlight { race_id, signature }) => {
            info!(%race_id, %signature, "settlement awaiting confirmation")
        }
        Ok(TickOutcome::Rejected { race_id, reason }) => {
            warn!(%race_id, %reason, "settlement rejected, run retry-settlement once fixed")
        }
        Err(err @ Error::Chain(ChainError::Rejected { .. })) => {
            error!(%err, "settlement rejected by program")
        }
        Err(err) => warn!(%err, "resolution tick failed"),
    }
}

async fn run(config: &ValidatedConfig, store: SqliteStore, client: Client) -> Result<()> {
    let engine = config.engine_config();
    let scheduler = ResolutionScheduler::new(store.clone(), client.clone(), engine.clone());
    let sweeper = LookupTableSweeper::new(store, client, engine);

    let mut resolve = tokio::time::interval(config.resolve_interval);
    resolve.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sweep = tokio::time::interval(config.sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        authority = %config.authority,
        program = %config.program_id,
        resolve_interval = ?config.resolve_interval,
        sweep_interval = ?config.sweep_interval,
        "resolution loop started"
    );
    loop {
        tokio::select! {
            _ = resolve.tick() => log_tick(scheduler.tick(now_ms()).await),
            _ = sweep.tick() => match sweeper.sweep(now_ms()).await {
                Ok(report) if report.closed.is_empty() && report.failed.is_empty() => {}
                Ok(report) => info!(
                    closed = report.closed.len(),
                    failed = report.failed.len(),
                    skipped = report.skipped.len(),
                    "lookup table sweep"
                ),
                Err(err) => warn!(%err, "lookup table sweep failed"),
            },
            result = &mut shutdown => {
                result.context("Failed to listen for shutdown signal")?;
                info!("shutting down");
                return Ok(());
            }
        }
    }
}

fn print_pools(race: &paddock_types::Race, pool_count: u16) {
    println!("race {} ({})", race.id, race.state);
    for pool in (1..=pool_count).map(PoolId) {
        let name = pool_name(pool).unwrap_or("-");
        let (bets, stake) = race
            .pool(pool)
            .map(|totals| (totals.total_bets, totals.total_stake))
            .unwrap_or_default();
        let marker = if race.winning_pool == Some(pool) {
            " (winner)"
        } else {
            ""
        };
        println!("  {pool} {name:<10} bets={bets:<4} stake={stake}{marker}");
    }
    println!("  total stake={}", race.total_stake());
}

async fn execute(command: Cmd, config: &ValidatedConfig) -> Result<()> {
    let store = SqliteStore::open(&config.database_path).with_context(|| {
        format!(
            "Could not open database {}",
            config.database_path.display()
        )
    })?;
    let client = build_client(config)?;
    let engine = config.engine_config();
    let ledger = RaceLedger::new(store.clone(), engine.clone());

    match command {
        Cmd::Run => run(config, store, client).await?,
        Cmd::CreateRace { operator } => {
            let race = ledger
                .create_race(&operator, now_ms())
                .await
                .context("Could not create race")?;
            println!("created race {}", race.id);
        }
        Cmd::StartRace => {
            let race = ledger
                .start_race(now_ms())
                .await
                .context("Could not start race")?;
            println!(
                "started race {} (ends at {})",
                race.id,
                race.ends_at_ms.unwrap_or_default()
            );
        }
        Cmd::ForceResolve { pool } => {
            let pool = PoolId(pool);
            let race = ledger
                .finish_race(pool)
                .await
                .with_context(|| format!("Could not finish race with pool {pool}"))?;
            let scheduler = ResolutionScheduler::new(store, client, engine);
            let outcome = scheduler
                .settle(race, now_ms())
                .await
                .context("Could not settle race")?;
            println!("{outcome:?}");
        }
        Cmd::Pools { race } => {
            let race = match race {
                Some(id) => ledger.race(RaceId(id)).await?,
                None => ledger
                    .latest_race()
                    .await?
                    .context("No race has been created")?,
            };
            print_pools(&race, engine.pool_count);
        }
        Cmd::RetrySettlement { race } => {
            let race = RaceId(race);
            ledger
                .retry_settlement(race)
                .await
                .with_context(|| format!("Could not retry settlement of race {race}"))?;
            println!("race {race} will be resubmitted on the next tick");
        }
        Cmd::Sweep => {
            let sweeper = LookupTableSweeper::new(store, client, engine);
            let report = sweeper
                .sweep(now_ms())
                .await
                .context("Lookup table sweep failed")?;
            println!(
                "closed {} failed {} skipped {}",
                report.closed.len(),
                report.failed.len(),
                report.skipped.len()
            );
        }
        Cmd::RegisterUser { handle, wallet } => {
            let wallet = Address::from_str(&wallet).context("Wallet is not a valid address")?;
            let accounting = BetAccountingEngine::new(store, client, engine);
            let user = accounting
                .register_user(&handle, wallet)
                .await
                .context("Could not register user")?;
            println!("registered {} with wallet {}", user.handle, user.wallet);
        }
    }
    Ok(())
}

fn main() {
    if let Err(err) = main_result() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn main_result() -> Result<()> {
    let args = Args::parse();

    let config_file = std::fs::read_to_string(&args.config)
        .with_context(|| format!("Could not read config file {}", args.config.display()))?;
    let config: Config =
        serde_yaml::from_str(&config_file).context("Could not parse config file")?;

    if args.dry_run {
        println!("{:#?}", config.redacted_debug());
        let config = config.validate().context("Invalid config")?;
        build_client(&config)?;
        println!("authority {}", config.authority);
        println!("config ok");
        return Ok(());
    }

    let redacted = format!("{:?}", config.redacted_debug());
    let config = config.validate().context("Invalid config")?;
    init_logging(&config);
    info!(config = %redacted, "loaded config file");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    runtime.block_on(execute(args.command.unwrap_or(Cmd::Run), &config))
}
