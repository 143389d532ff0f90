use tracing::{error, info};

use wallet_state_sync::config::WalletSyncConfig;
use wallet_state_sync::transaction::NATIVE_TOKEN_DECIMALS;
use wallet_state_sync::utils::format_token_amount;
use wallet_state_sync::wallet::TokenAddress;
use wallet_state_sync::wallet::sync::WalletSyncOrchestrator;

#[tokio::main(flavor = "current_thread")]
async fn main() {
	dotenv::dotenv().ok();

	// Initialize tracing subscriber, debug output for the sync core by default
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive("wallet_state_sync=debug".parse().unwrap())
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting wallet state sync service");

	let config = match WalletSyncConfig::from_env() {
		Ok(config) => config,
		Err(e) => {
			error!("Failed to load configuration: {}", e);
			return;
		}
	};

	let orchestrator = WalletSyncOrchestrator::new(&config);
	info!("Created wallet sync orchestrator");

	orchestrator.restore();
	orchestrator.start();

	if let Err(e) = tokio::signal::ctrl_c().await {
		error!("Failed to listen for shutdown signal: {}", e);
	}

	info!("Shutting down");
	orchestrator.stop();

	for stats in orchestrator.stats() {
		info!("{}", stats.summary());
	}

	let native = orchestrator
		.stores()
		.balances
		.balance_for_address(&TokenAddress::native())
		.unwrap_or_default();
	info!(
		"Native balance: {} (portfolio ${:.2})",
		format_token_amount(native, NATIVE_TOKEN_DECIMALS),
		orchestrator.total_usd_value()
	);

	if let Err(e) = orchestrator.flush().await {
		error!("Failed to flush wallet state: {}", e);
	}
}
