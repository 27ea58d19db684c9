//! finsync - in-memory simulator for the seller finances ingestion pipeline.
//!
//! `finsync cycle` runs one dispatch cycle and drains it, printing the report
//! as JSON. `finsync run` starts the scheduler and the worker pool and keeps
//! going until Ctrl-C (or `--cycles` cycles).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;

use finsync_core::domain::{
    AmountKind, RawAmount, RawFinancialRecord, SecretMaterial, SellerCredential, SellerId,
    SellerKey,
};
use finsync_core::impls::{
    Fault, FaultKind, InMemoryCredentialStore, InMemoryShipmentStore, InMemoryTaskStore,
    RecordingEventBus, ScriptedFinancialApi, StaticRoleAssumer,
};
use finsync_core::{App, AppBuilder, FinsyncConfig};

// ── CLI ─────────────────────────────────────────────────────────────

/// Scheduled fan-out ingestion of seller financial events (in-memory backends).
#[derive(Parser, Debug)]
#[command(name = "finsync", version, about)]
struct Cli {
    /// Path to a finsync TOML config file.
    #[arg(long, env = "FINSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Shipment event table name.
    #[arg(long, env = "DYNAMODB_FINANCES_TABLE")]
    finances_table: Option<String>,

    /// Seller credential table name.
    #[arg(long, env = "DYNAMODB_SECRETS_TABLE")]
    secrets_table: Option<String>,

    #[arg(long, env = "EVENT_BUS_NAME")]
    event_bus_name: Option<String>,

    /// Reference to the seller-central application credentials.
    #[arg(long, env = "SELLER_CENTRAL_APP_CREDENTIALS")]
    app_credentials: Option<String>,

    /// Role assumed for sellers whose entry carries none.
    #[arg(long = "role", env = "Role")]
    role_arn: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(flatten)]
    demo: DemoArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler and the worker pool.
    Run {
        /// Stop after this many cycles, once every task has finished.
        #[arg(long)]
        cycles: Option<u64>,
    },
    /// Run one cycle, drain it and print the report.
    Cycle,
}

/// Simulated sellers and upstream data.
#[derive(Args, Debug)]
struct DemoArgs {
    #[arg(long, default_value_t = 3)]
    sellers: usize,

    #[arg(long, default_value_t = 5)]
    records_per_seller: usize,

    /// Upstream page size.
    #[arg(long, default_value_t = 2)]
    page_size: usize,

    /// Upstream latency per page, in milliseconds.
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,

    /// Deny role assumption for this seller id (repeatable).
    #[arg(long, value_name = "SELLER_ID")]
    deny_role: Vec<String>,

    /// Rate-limit the fetch starting at record INDEX of SELLER_ID, once (repeatable).
    #[arg(long, value_name = "SELLER_ID:INDEX", value_parser = parse_fault)]
    rate_limit_at: Vec<(String, usize)>,
}

fn parse_fault(s: &str) -> Result<(String, usize), String> {
    let (seller_id, index) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected SELLER_ID:INDEX, got {s:?}"))?;
    let index = index
        .parse()
        .map_err(|e| format!("bad index in {s:?}: {e}"))?;
    Ok((seller_id.to_string(), index))
}

// ── wiring ──────────────────────────────────────────────────────────

fn load_config(cli: &Cli) -> anyhow::Result<FinsyncConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let config = FinsyncConfig::from_toml_file(path)
                .with_context(|| format!("loading {}", path.display()))?;
            info!(path = %path.display(), "loaded finsync config");
            config
        }
        None => FinsyncConfig::default(),
    };

    // 環境変数（と同名のフラグ）で上書き
    if let Some(table) = &cli.finances_table {
        config.finances_table = table.clone();
    }
    if let Some(table) = &cli.secrets_table {
        config.secrets_table = Some(table.clone());
    }
    if let Some(bus) = &cli.event_bus_name {
        config.event_bus_name = bus.clone();
    }
    if let Some(app_credentials) = &cli.app_credentials {
        config.seller_central_app_credentials = Some(app_credentials.clone());
    }
    if let Some(role) = &cli.role_arn {
        config.role_arn = Some(role.clone());
    }
    Ok(config)
}

fn demo_role(seller_id: &str) -> String {
    format!("arn:aws:iam::000000000000:role/finsync-{seller_id}")
}

fn demo_records(seller_id: &str, n: usize) -> Vec<RawFinancialRecord> {
    let now = Utc::now();
    (0..n)
        .map(|i| {
            let principal = Decimal::new(1_000 + 137 * i as i64, 2);
            RawFinancialRecord {
                amazon_order_id: format!("{seller_id}-{:07}", 1_000 + i),
                event_type: if i % 4 == 3 { "RefundEvent" } else { "ShipmentEvent" }.to_string(),
                posted_date: Some(now - chrono::Duration::hours((n - i) as i64)),
                marketplace_name: Some("Amazon.com".to_string()),
                components: vec![
                    RawAmount {
                        kind: AmountKind::Charge,
                        label: "Principal".to_string(),
                        currency_code: "USD".to_string(),
                        amount: principal,
                    },
                    RawAmount {
                        kind: AmountKind::Fee,
                        label: "Commission".to_string(),
                        currency_code: "USD".to_string(),
                        amount: -(principal * Decimal::new(15, 2)).round_dp(2),
                    },
                ],
            }
        })
        .collect()
}

async fn build_demo_app(config: FinsyncConfig, demo: &DemoArgs) -> anyhow::Result<App> {
    let seller_ids: Vec<String> = (1..=demo.sellers).map(|i| format!("A{i:02}")).collect();

    let mut credentials = InMemoryCredentialStore::new(
        seller_ids
            .iter()
            .enumerate()
            .map(|(i, id)| SellerCredential {
                seller_key: SellerKey::new(format!("tenant-{}", i + 1)),
                seller_id: SellerId::new(id.as_str()),
                material: SecretMaterial::new(format!("demo-refresh-token-{id}")),
                role_arn: demo_role(id),
            })
            .collect(),
        config.seller_page_size,
    );
    if let Some(table) = &config.secrets_table {
        credentials = credentials.with_table(table);
    }
    let tasks = InMemoryTaskStore::named(&config.task_table);
    let shipments = InMemoryShipmentStore::named(&config.finances_table);

    let upstream = ScriptedFinancialApi::new(demo.page_size)
        .with_latency(Duration::from_millis(demo.latency_ms));
    for id in &seller_ids {
        upstream
            .append(&SellerId::new(id.as_str()), demo_records(id, demo.records_per_seller))
            .await;
    }
    for (seller_id, at) in &demo.rate_limit_at {
        upstream
            .inject_fault(
                &SellerId::new(seller_id.as_str()),
                Fault {
                    at: *at,
                    kind: FaultKind::RateLimited,
                    remaining: Some(1),
                },
            )
            .await;
    }

    let roles = StaticRoleAssumer::new();
    for seller_id in &demo.deny_role {
        roles.deny(demo_role(seller_id)).await;
    }

    info!(
        sellers = demo.sellers,
        records_per_seller = demo.records_per_seller,
        task_table = tasks.name(),
        finances_table = shipments.name(),
        secrets_table = ?credentials.name(),
        event_bus = %config.event_bus_name,
        "demo backends ready"
    );

    let app = AppBuilder::new(config)
        .credentials(credentials)
        .roles(roles)
        .upstream(upstream)
        .task_store(tasks)
        .shipment_store(shipments)
        .event_bus(RecordingEventBus::new())
        .build()?;
    Ok(app)
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = load_config(&cli)?;
    let app = build_demo_app(config, &cli.demo).await?;

    match cli.command {
        Command::Cycle => {
            let report = app.run_cycle_and_drain().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Run { cycles } => run(&app, cycles).await?,
    }
    Ok(())
}

async fn run(app: &App, cycles: Option<u64>) -> anyhow::Result<()> {
    // (A) worker を先に起動しておく
    let pool = app.spawn_workers();

    // (B) scheduler。--cycles があれば自分で止まる。Ctrl-C で drop すると止まる
    let scheduler = app.spawn_scheduler(cycles);
    let finished = tokio::select! {
        fired = scheduler.join() => Some(fired),
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            info!("interrupt received; stopping scheduler");
            None
        }
    };

    // (C) 決められた回数を撃ち終えたら、残りの task が終わるのを待つ
    if let Some(fired) = finished {
        info!(fired, "scheduled cycles done; waiting for tasks to finish");
        tokio::select! {
            status = app.wait_idle(Duration::from_millis(200)) => {
                println!("{}", serde_json::to_string_pretty(&status?)?);
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for Ctrl-C")?;
                info!("interrupt received; not waiting for queued tasks");
            }
        }
    }

    // (D) 実行中の task は最後まで走らせる
    pool.shutdown_and_join().await;
    Ok(())
}
