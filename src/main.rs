//! Weibo Harvester - CLI entry point.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use weibo_harvester::{
    api::{CookieSource, StaticCookies, WeiboClient},
    cli::Args,
    config::{validate_config, Config},
    crawl::Harvester,
    error::{exit_codes, Error, Result},
    output::{
        print_banner, print_config_summary, print_error, print_info, print_run_summary,
        print_success, print_warning,
    },
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(e) => {
            print_error(&format!("{}", e));
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt().with_env_filter(filter).with_target(false).init();

    print_banner();

    // Load configuration
    let config_path = args.config.clone();
    let mut config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        print_warning(&format!(
            "Configuration file not found: {}",
            config_path.display()
        ));
        print_info("Using default configuration with CLI arguments");
        Config::default()
    };

    args.merge_into_config(&mut config);
    validate_config(&config)?;
    print_config_summary(&config);

    // Session and HTTP client
    let cookies = StaticCookies::from_config(&config.account)
        .session_cookies()
        .await?;
    print_info(&format!("Loaded {} session cookies", cookies.len()));
    let client = WeiboClient::new(&config, &cookies)?;

    let harvester = Harvester::new(config, Arc::new(client));
    let report = harvester
        .run(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await?;

    print_run_summary(&report);

    if report.interrupted {
        return Err(Error::Interrupted);
    }
    print_success("Harvest complete");
    Ok(())
}
