use dotenvy::dotenv;
use purchasing::{
    config::{database, settings},
    core::ledger,
    errors::Result,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal since env vars can be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load settings, falling back to defaults when no file exists
    let settings = settings::load_app_settings()
        .inspect_err(|e| error!("Failed to load settings: {}", e))?;
    info!(
        "Using inventory account {} and cash account {}",
        settings.ledger.inventory_account_code, settings.ledger.cash_account_code
    );

    // 4. Connect and make sure the schema exists
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Seed the accounts every posting relies on
    let (inventory, cash) = ledger::ensure_base_accounts(&db, &settings.ledger)
        .await
        .inspect_err(|e| error!("Failed to seed base accounts: {}", e))?;
    info!(
        "Ledger ready: {} ({}), {} ({})",
        inventory.name, inventory.code, cash.name, cash.code
    );

    info!("Purchasing database initialized at {}", database::get_database_url());
    Ok(())
}
