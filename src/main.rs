use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use dip_screener::config::{AppConfig, AsyncStorageManager};
use dip_screener::scanner::{ScanError, Scanner};
use dip_screener::{
    BinanceGateway, Exchange, FilterConfig, GateioGateway, MarketDataGateway, report, tui,
};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "dip-screener",
    about = "Scan exchange USDT spot pairs for dips near moving averages on rising volume"
)]
struct Cli {
    /// Exchange to scan. Defaults to the one in storage/config.json.
    #[arg(long, value_enum, global = true)]
    exchange: Option<Exchange>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan once and print the matches as cards and a table (default).
    Scan {
        #[command(flatten)]
        filters: FilterArgs,

        /// List every skipped symbol with the reason.
        #[arg(long, default_value_t = false)]
        show_skipped: bool,
    },
    /// Check the exchange connection and count the tradable pairs.
    Check,
    /// Interactive dashboard with adjustable filters and price charts.
    Tui {
        #[command(flatten)]
        filters: FilterArgs,
    },
}

/// One-off overrides for the filter settings in config.json.
#[derive(Args, Default)]
struct FilterArgs {
    /// MA proximity tolerance in percent (1-10).
    #[arg(long)]
    ma_tolerance: Option<f64>,

    /// Minimum latest/average volume multiple (1.0-5.0).
    #[arg(long)]
    volume_threshold: Option<f64>,

    /// RSI ceiling (10-50).
    #[arg(long)]
    rsi_threshold: Option<f64>,

    /// Enable or disable the MA dip filter.
    #[arg(long)]
    use_ma: Option<bool>,

    /// Enable or disable the RSI dip filter.
    #[arg(long)]
    use_rsi: Option<bool>,
}

impl FilterArgs {
    fn apply(&self, mut filters: FilterConfig) -> FilterConfig {
        if let Some(pct) = self.ma_tolerance {
            filters.ma_tolerance = pct / 100.0;
        }
        if let Some(v) = self.volume_threshold {
            filters.volume_threshold = v;
        }
        if let Some(v) = self.rsi_threshold {
            filters.rsi_threshold = v;
        }
        if let Some(v) = self.use_ma {
            filters.use_ma = v;
        }
        if let Some(v) = self.use_rsi {
            filters.use_rsi = v;
        }
        filters
    }
}

/// Logs go to stderr, or to storage/dip-screener.log while the dashboard owns the terminal.
fn init_tracing(storage: &AsyncStorageManager, to_file: bool) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dip_screener=info"));

    if to_file {
        let appender = tracing_appender::rolling::never(&storage.base_dir, "dip-screener.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        None
    }
}

async fn run<G>(gateway: G, config: &AppConfig, command: Commands) -> Result<()>
where
    G: MarketDataGateway + 'static,
{
    let scanner = Scanner::new(Arc::new(gateway), config.scan_settings());
    let exchange = scanner.gateway().name().to_string();

    match command {
        Commands::Check => {
            let symbols = scanner
                .gateway()
                .list_usdt_spot_symbols()
                .await
                .with_context(|| format!("{exchange} connection failed"))?;
            println!(
                "{exchange} reachable: {} {} spot pairs loaded.",
                symbols.len(),
                config.quote_asset
            );
        }
        Commands::Scan {
            filters,
            show_skipped,
        } => {
            let filters = filters.apply(config.filters);
            match scanner.run(&filters).await {
                Ok(report) => report::print_report(&report, &exchange, Utc::now(), show_skipped),
                Err(ScanError::EmptyUniverse) => {
                    println!(
                        "warning: {exchange} returned no {} spot pairs; nothing to scan.",
                        config.quote_asset
                    );
                }
                Err(e) => return Err(e).context("scan aborted"),
            }
        }
        Commands::Tui { filters } => {
            let filters = filters.apply(config.filters);
            filters.validate()?;
            tui::run_tui(scanner, filters).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Scan {
        filters: FilterArgs::default(),
        show_skipped: false,
    });

    let storage = AsyncStorageManager::new_relative("storage").await?;
    let _guard = init_tracing(&storage, matches!(command, Commands::Tui { .. }));

    let mut config: AppConfig = storage.load_or_init("config").await?;
    if let Some(exchange) = cli.exchange {
        config.exchange = exchange;
    }
    info!(exchange = %config.exchange, "configuration loaded");

    let options = config.gateway_options();
    match config.exchange {
        Exchange::Binance => run(BinanceGateway::new(&options)?, &config, command).await,
        Exchange::Gateio => run(GateioGateway::new(&options)?, &config, command).await,
    }
}
