//! fmp CLI binary.
//!
//! Fetches Financial Modeling Prep data for many identifiers at once and
//! prints the merged table.

mod cache_manager;
mod output;

use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use fmp_data::company::Report;
use fmp_data::economics::Bucket;
use fmp_data::frequency::{Frequency, Period};
use fmp_data::{Config, Session};
use fmp_engine::{Catalog, MergedTable, Symbol};
use indicatif::{ProgressBar, ProgressStyle};
use output::OutputFormat;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "fmp")]
#[command(about = "Batched Financial Modeling Prep client", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to <config dir>/fmp/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API key, overriding the config file and FMP_API_KEY
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Save the result in the table cache under this name
    #[arg(long, global = true)]
    save: Option<String>,

    /// Maximum requests in flight
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Budget for the whole fetch, in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ReportArgs {
    /// Comma-separated symbols
    symbols: String,

    /// Reporting period: A or Q
    #[arg(long, default_value = "A")]
    period: String,

    /// Most recent periods per symbol
    #[arg(long)]
    limit: Option<u32>,
}

#[derive(Args)]
struct RangeArgs {
    /// Frequency: d, 1min, 5min, 15min, 30min, 1hour or 4hour
    #[arg(long, default_value = "d")]
    freq: String,

    /// First date (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last date (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
}

#[derive(Subcommand)]
enum Commands {
    /// Income, balance sheet or cash flow statements
    Statements {
        /// Statement: income, balance or cashflow
        #[arg(long, default_value = "income")]
        kind: String,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Financial ratios
    Ratios(ReportArgs),

    /// Key metrics
    Metrics(ReportArgs),

    /// Financial growth
    Growth(ReportArgs),

    /// Company profiles
    Profile {
        /// Comma-separated symbols
        symbols: String,
    },

    /// Real-time quotes
    Quote {
        /// Comma-separated symbols
        symbols: String,
    },

    /// Historical prices
    Prices {
        /// Comma-separated symbols
        symbols: String,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// Aggregate institutional ownership
    Ownership {
        /// Comma-separated symbols
        symbols: String,

        /// Include the current, still incomplete quarter
        #[arg(long)]
        current_quarter: bool,
    },

    /// Institutional holders at a quarter end
    Holders {
        /// Comma-separated symbols
        symbols: String,

        /// Year (defaults to the last completed quarter)
        #[arg(long)]
        year: Option<i32>,

        /// Quarter 1-4 (defaults to the last completed quarter)
        #[arg(long)]
        quarter: Option<u8>,
    },

    /// Historical forex rates
    Fx {
        /// Comma-separated pairs, e.g. EURUSD,GBPUSD
        pairs: String,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// Live forex quotes
    FxLive {
        /// Comma-separated pairs (all pairs when omitted)
        pairs: Option<String>,
    },

    /// Economic indicators
    Economics {
        /// Comma-separated indicator names (all indicators when omitted)
        names: Option<String>,

        /// First date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Relabel dates to periods: month, quarter or year
        #[arg(long)]
        bucket: Option<String>,
    },

    /// Inspect the table cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached tables
    List {
        /// Tables saved longer ago than this many days are shown as stale
        #[arg(long, default_value_t = 7)]
        max_age_days: i64,
    },
    /// Print a cached table
    Show {
        /// Table name
        name: String,
    },
    /// Delete a cached table
    Drop {
        /// Table name
        name: String,
    },
    /// Delete every cached table
    Clear,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_string());
    pb
}

fn load_config(cli: &Cli) -> fmp_data::Result<Config> {
    let mut config = Config::resolve(cli.config.as_deref(), cli.api_key.clone())?;
    if let Some(concurrency) = cli.concurrency {
        config.max_concurrency = concurrency;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = Some(timeout);
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::Cache { action } = &cli.command {
        return run_cache(action, cli.format);
    }

    let config = load_config(&cli)?;
    let session = Session::from_config(&config)?;

    let pb = spinner("Fetching...");
    let result = fetch(&session, &cli.command).await;
    pb.finish_and_clear();
    let table = result?;

    // Failures and page-cap truncation are already logged at warn level by the merge.
    if !table.empty_identifiers().is_empty() {
        eprintln!(
            "No data for: {}",
            Symbol::join(table.empty_identifiers())
        );
    }

    output::print(&table, cli.format)?;

    if let Some(name) = &cli.save {
        let store = cache_manager::open_cache()?;
        store.save_table(name, &table)?;
        eprintln!("Saved {} row(s) to cached table {name}", table.len());
    }

    Ok(())
}

async fn fetch(session: &Session, command: &Commands) -> Result<MergedTable, Box<dyn std::error::Error>> {
    let table = match command {
        Commands::Statements { kind, report } => {
            let kind: Report = kind.parse()?;
            if !matches!(
                kind,
                Report::IncomeStatement | Report::BalanceSheet | Report::CashFlow
            ) {
                return Err(format!("{kind} is not a financial statement").into());
            }
            fetch_report(session, kind, report).await?
        }
        Commands::Ratios(report) => fetch_report(session, Report::Ratios, report).await?,
        Commands::Metrics(report) => fetch_report(session, Report::KeyMetrics, report).await?,
        Commands::Growth(report) => fetch_report(session, Report::Growth, report).await?,
        Commands::Profile { symbols } => session.company(symbols).await?.profile().await?,
        Commands::Quote { symbols } => market_company(session, symbols).await?.quote().await?,
        Commands::Prices { symbols, range } => {
            let frequency: Frequency = range.freq.parse()?;
            market_company(session, symbols)
                .await?
                .historical_prices(frequency, range.from, range.to)
                .await?
        }
        Commands::Ownership {
            symbols,
            current_quarter,
        } => {
            session
                .company(symbols)
                .await?
                .institutional_ownership(*current_quarter)
                .await?
        }
        Commands::Holders {
            symbols,
            year,
            quarter,
        } => {
            session
                .company(symbols)
                .await?
                .institutional_holders(*year, *quarter)
                .await?
        }
        Commands::Fx { pairs, range } => {
            let frequency: Frequency = range.freq.parse()?;
            session
                .forex()
                .historical(pairs, frequency, range.from, range.to)
                .await?
        }
        Commands::FxLive { pairs } => {
            let filter = pairs.as_deref().map(Symbol::parse_list).unwrap_or_default();
            session.forex().live_quotes(&filter).await?
        }
        Commands::Economics {
            names,
            from,
            to,
            bucket,
        } => {
            let bucket = bucket.as_deref().map(str::parse::<Bucket>).transpose()?;
            let economics = session.economics();
            match names {
                Some(names) => {
                    let names: Vec<&str> = names.split(',').filter(|n| !n.trim().is_empty()).collect();
                    economics.indicators(names.as_slice(), *from, *to, bucket).await?
                }
                None => economics.all(*from, *to, bucket).await?,
            }
        }
        Commands::Cache { .. } => return Err("cache commands do not fetch".into()),
    };
    Ok(table)
}

async fn fetch_report(
    session: &Session,
    kind: Report,
    args: &ReportArgs,
) -> Result<MergedTable, Box<dyn std::error::Error>> {
    let period: Period = args.period.parse()?;
    Ok(session
        .company(&args.symbols)
        .await?
        .report(kind, period, args.limit)
        .await?)
}

async fn market_company<'s>(
    session: &'s Session,
    symbols: &str,
) -> fmp_data::Result<fmp_data::company::Company<'s, fmp_data::HttpTransport>> {
    session
        .company_in(Catalog::MarketData, &Symbol::parse_list(symbols))
        .await
}

fn run_cache(action: &CacheAction, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let store = cache_manager::open_cache()?;
    match action {
        CacheAction::List { max_age_days } => {
            let tables = store.list_tables()?;
            if tables.is_empty() {
                println!("No cached tables in {}", cache_manager::default_cache_path().display());
            }
            for info in tables {
                let status = if store.is_fresh(&info.name, *max_age_days)? {
                    "fresh"
                } else {
                    "stale"
                };
                println!(
                    "{:<24} {:>8} row(s)  key ({})  saved {}  {status}",
                    info.name,
                    info.rows,
                    info.key_fields.join(", "),
                    info.cached_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        CacheAction::Show { name } => match store.load_table(name)? {
            Some(table) => output::print(&table, format)?,
            None => return Err(format!("no cached table named {name}").into()),
        },
        CacheAction::Drop { name } => {
            if store.drop_table(name)? {
                println!("Dropped {name}");
            } else {
                return Err(format!("no cached table named {name}").into());
            }
        }
        CacheAction::Clear => {
            store.clear_all()?;
            println!("Cleared {}", cache_manager::default_cache_path().display());
        }
    }
    Ok(())
}
