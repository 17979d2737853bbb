//! crm-runner: churn analytics over a CRM database.
//!
//! Usage:
//!   crm-runner --db crm.db --fixture data/fixtures/sample_crm.json
//!   crm-runner --serve --port 5000
//!   crm-runner --ipc-mode --seed 42

mod http;

use anyhow::Result;
use chrono::Utc;
use crm_core::{
    analytics::ChurnAnalytics,
    config::CrmConfig,
    pipeline::PipelineSummary,
    rng::ScoringRng,
    store::{CrmFixture, CrmStore},
    types::EntityId,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    ChurnRisk,
    ChurnMetrics,
    Engagement { customer_id: EntityId },
    Pipeline,
    DealsByAssignee { assignee: String },
    RecentCustomers {
        #[serde(default = "default_limit")]
        limit: usize,
    },
    TopProducts {
        #[serde(default = "default_limit")]
        limit: usize,
    },
    Quit,
}

fn default_limit() -> usize {
    4
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let port = parse_arg(&args, "--port", 5000u16);
    let serve = args.iter().any(|a| a == "--serve");
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let default_fixture = format!("{data_dir}/fixtures/sample_crm.json");
    let fixture = flag_value(&args, "--fixture").unwrap_or(default_fixture.as_str());

    let mut config = CrmConfig::load(data_dir)?;
    if let Some(seed) = flag_value(&args, "--seed").and_then(|s| s.parse().ok()) {
        config.rng_seed = Some(seed);
    }

    if !ipc_mode {
        println!("CRM churn analytics: crm-runner");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!("  model:     {}", config.model_version);
        match config.rng_seed {
            Some(seed) => println!("  seed:      {seed}"),
            None => println!("  seed:      (entropy)"),
        }
        println!();
    }

    let store = if db == ":memory:" {
        CrmStore::in_memory()?
    } else {
        CrmStore::open(db)?
    };
    store.migrate()?;
    seed_if_empty(&store, fixture)?;

    if serve {
        let state = Arc::new(http::AppState::new(store, config));
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(http::serve(state, port))?;
    } else if ipc_mode {
        run_ipc_loop(&store, &config)?;
    } else {
        print_summary(&store, &config)?;
    }

    Ok(())
}

/// Load the fixture into a fresh database. An existing population is left alone.
fn seed_if_empty(store: &CrmStore, fixture: &str) -> Result<()> {
    let customers = store.counts()?.customers;
    if customers > 0 {
        log::info!("store already holds {customers} customers; skipping fixture");
        return Ok(());
    }
    if !std::path::Path::new(fixture).exists() {
        log::warn!("fixture {fixture} not found; starting with an empty store");
        return Ok(());
    }
    let data = CrmFixture::load(fixture)?;
    store.import_fixture(&data, Utc::now())?;
    Ok(())
}

fn run_ipc_loop(store: &CrmStore, config: &CrmConfig) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();
    let analytics = ChurnAnalytics::new(store, config);

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                write_error(&mut stdout, &e.to_string())?;
                continue;
            }
        };

        let now = Utc::now();
        let mut rng = ScoringRng::from_optional_seed(config.rng_seed);
        log::debug!("ipc: scoring with seed {}", rng.seed());
        let response = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::ChurnRisk => analytics
                .customers_with_churn_risk(now, &mut rng)
                .map(serde_json::to_value),
            IpcCommand::ChurnMetrics => analytics
                .churn_metrics(now, &mut rng)
                .map(serde_json::to_value),
            IpcCommand::Engagement { customer_id } => {
                match analytics.customer_engagement(customer_id, now, &mut rng) {
                    Ok(Some(summary)) => Ok(serde_json::to_value(summary)),
                    Ok(None) => {
                        write_error(&mut stdout, &format!("Customer {customer_id} not found"))?;
                        continue;
                    }
                    Err(e) => Err(e),
                }
            }
            IpcCommand::Pipeline => store
                .list_deals()
                .map(|deals| serde_json::to_value(PipelineSummary::from_deals(&deals))),
            IpcCommand::DealsByAssignee { assignee } => store
                .list_deals_by_assignee(&assignee)
                .map(serde_json::to_value),
            IpcCommand::RecentCustomers { limit } => store
                .recent_customers(limit)
                .map(serde_json::to_value),
            IpcCommand::TopProducts { limit } => store
                .top_products(limit)
                .map(serde_json::to_value),
        };

        match response {
            Ok(value) => writeln!(stdout, "{}", value?)?,
            Err(e) => {
                log::warn!("ipc command failed: {e}");
                write_error(&mut stdout, &e.to_string())?;
                continue;
            }
        }
        stdout.flush()?;
    }
    Ok(())
}

fn write_error(out: &mut impl Write, message: &str) -> Result<()> {
    let err_json = serde_json::json!({ "error": message });
    writeln!(out, "{err_json}")?;
    out.flush()?;
    Ok(())
}

fn print_summary(store: &CrmStore, config: &CrmConfig) -> Result<()> {
    let now = Utc::now();
    let mut rng = ScoringRng::from_optional_seed(config.rng_seed);
    log::info!("summary: scoring with seed {}", rng.seed());
    let analytics = ChurnAnalytics::new(store, config);

    let counts = store.counts()?;
    let metrics = analytics.churn_metrics(now, &mut rng)?;
    let at_risk = analytics.customers_with_churn_risk(now, &mut rng)?;
    let pipeline = PipelineSummary::from_deals(&store.list_deals()?);

    println!("=== STORE ===");
    println!("  customers:      {}", counts.customers);
    println!("  deals:          {}", counts.deals);
    println!("  tickets:        {}", counts.tickets);
    println!("  activities:     {}", counts.activities);
    println!("  products:       {}", counts.products);

    println!();
    println!("=== CHURN ===");
    println!("  current rate:   {}", metrics.current_churn_rate);
    println!("  at risk:        {} ({})", metrics.at_risk_count, metrics.at_risk_percentage);
    for c in &at_risk {
        println!(
            "    #{:<4} {:<24} {:>3}  {}",
            c.customer.id,
            c.customer.name,
            c.churn_risk,
            c.risk_level.label()
        );
    }
    println!("  top reasons:");
    for r in &metrics.top_churn_reasons {
        println!("    {:<44} {:>3}%", r.reason, r.percentage);
    }

    println!();
    println!("=== PIPELINE ===");
    println!("  total value:    {:.0}", pipeline.total_value);
    println!("  open value:     {:.0}", pipeline.open_value);
    println!("  forecast:       {:.0}", pipeline.weighted_forecast);
    println!("  win rate:       {:.1}%", pipeline.win_rate);

    println!();
    println!("=== TOP PRODUCTS ===");
    for p in store.top_products(default_limit())? {
        println!("    {:<28} {:>12.0} {}", p.name, p.price, p.currency);
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
