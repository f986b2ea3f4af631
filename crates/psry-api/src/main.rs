use psry_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize the application (record store, storage, routes)
    let (_state, router) = psry_api::setup::initialize_app(config.clone()).await?;

    // Start the server
    psry_api::setup::server::start_server(&config, router).await?;

    Ok(())
}
