use clap::{Parser, Subcommand};
use questcoin_core::{Config, CoreError, StorageError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "questcoin-cli", version, about = "QuestCoin CLI")]
struct Cli {
    /// Act as this user (default: identity.default_user from config)
    #[arg(long, global = true)]
    user: Option<String>,
    /// Act with reviewer capability
    #[arg(long, global = true)]
    reviewer: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tasks and completions
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Coin balance and transactions
    Wallet {
        #[command(subcommand)]
        action: commands::wallet::WalletAction,
    },
    /// Coupons on offer
    Shop {
        #[command(subcommand)]
        action: commands::shop::ShopAction,
    },
    /// Purchased coupons and redemption
    Coupon {
        #[command(subcommand)]
        action: commands::coupon::CouponAction,
    },
    /// Reviewer queue
    Review {
        #[command(subcommand)]
        action: commands::review::ReviewAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn is_retryable(e: &(dyn std::error::Error + 'static)) -> bool {
    if let Some(core) = e.downcast_ref::<CoreError>() {
        return core.is_retryable();
    }
    e.is::<StorageError>()
}

fn main() {
    let cli = Cli::parse();
    init_logging(&Config::load_or_default().logging.filter);

    let global = commands::Global {
        user: cli.user,
        reviewer: cli.reviewer,
    };
    let result = match cli.command {
        Commands::Task { action } => commands::task::run(action, &global),
        Commands::Wallet { action } => commands::wallet::run(action, &global),
        Commands::Shop { action } => commands::shop::run(action, &global),
        Commands::Coupon { action } => commands::coupon::run(action, &global),
        Commands::Review { action } => commands::review::run(action, &global),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        if is_retryable(e.as_ref()) {
            eprintln!("error: operation failed, retry: {e}");
        } else {
            eprintln!("error: {e}");
        }
        std::process::exit(1);
    }
}
