use crate::adapter::Orchestrator;
use crate::config::Settings;
use crate::error::Error;
use crate::infrastructure::log_messages::{application, configuration};
use crate::providers::bedrock::{BedrockTransport, InvocationClient, RegionRouter, SdkTransport};
use crate::providers::ModelCatalog;
use crate::proxy::GatewayService;
use crate::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

/// Main application struct that wires configuration, catalog, Bedrock
/// client and HTTP router together
pub struct Application {
    settings: Settings,
    router: Router,
}

impl Application {
    /// Loads configuration from files and environment, then builds the app
    /// against the real Bedrock runtime
    #[instrument]
    pub async fn new() -> Result<Self> {
        let settings = Settings::new()?;
        Self::from_settings(settings).await
    }

    #[instrument(skip(settings))]
    pub async fn from_settings(settings: Settings) -> Result<Self> {
        if settings.gateway.endpoint_url.is_some() {
            info!(
                endpoint_url = settings.gateway.endpoint_url.as_deref(),
                "{}",
                configuration::CUSTOM_ENDPOINT
            );
        }
        let transport = SdkTransport::from_settings(&settings.gateway).await;
        Self::with_transport(settings, Arc::new(transport))
    }

    /// Builds the app over any transport; tests pass scripted ones
    pub fn with_transport(settings: Settings, transport: Arc<dyn BedrockTransport>) -> Result<Self> {
        let catalog = ModelCatalog::with_aliases(&settings.models)?;
        for (model, purpose) in [
            (&settings.gateway.default_model, "chat completions"),
            (&settings.gateway.default_embedding_model, "embeddings"),
        ] {
            if catalog.resolve(model).is_err() {
                return Err(Error::UnknownDefaultModel {
                    model: model.clone(),
                    purpose,
                });
            }
        }
        info!(
            models = catalog.len(),
            aliases = settings.models.len(),
            "{}",
            application::CATALOG_LOADED
        );

        let service_config = settings.service_config()?;
        if !service_config.auth.is_enabled() {
            warn!("{}", configuration::AUTH_DISABLED);
        }

        let orchestrator = Orchestrator::new(
            Arc::new(catalog),
            RegionRouter::new(settings.aws_region()?),
            InvocationClient::new(transport, settings.invocation_policy()),
            settings.gateway_defaults(),
        );
        let router = GatewayService::new(Arc::new(orchestrator), service_config).into_router();

        Ok(Self { settings, router })
    }

    #[instrument(skip(self))]
    pub async fn run(self) -> Result<()> {
        let address = self.settings.bind_address();
        let listener = TcpListener::bind(&address).await?;
        info!(
            address = %address,
            region = %self.settings.gateway.aws_region,
            cross_region = self.settings.gateway.enable_cross_region_inference,
            "{}",
            application::LISTENING
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("{}", application::STOPPED);
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("{}", application::SHUTDOWN_SIGNAL);
}
