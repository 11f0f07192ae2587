use anyhow::Result;
use bedrock_gateway::config::Settings;
use bedrock_gateway::infrastructure::{init_logging, log_messages};
use bedrock_gateway::Application;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;
    init_logging(&settings.logging)?;

    info!(
        environment = %settings.application.environment,
        version = env!("CARGO_PKG_VERSION"),
        "{}",
        log_messages::application::STARTING
    );
    info!("{}", log_messages::configuration::CONFIG_LOADED);

    let app = Application::from_settings(settings).await?;
    app.run().await?;

    Ok(())
}
