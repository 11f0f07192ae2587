use crate::adapter::GatewayDefaults;
use crate::providers::bedrock::types::AwsRegion;
use crate::providers::bedrock::InvocationPolicy;
use crate::providers::catalog::ModelAlias;
use crate::proxy::middleware::AuthConfig;
use crate::proxy::service::ServiceConfig;
use crate::proxy::types::{ApiKey, RequestSizeLimit, RoutePrefix};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

pub use config::ConfigError;

/// Prefix for environment overrides, e.g. `BEDROCK_GATEWAY__GATEWAY__AWS_REGION`
pub const ENV_PREFIX: &str = "BEDROCK_GATEWAY";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub gateway: GatewaySettings,
    pub invocation: InvocationSettings,
    pub auth: AuthSettings,
    pub logging: LoggingSettings,
    #[serde(default)]
    pub models: Vec<ModelAlias>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub api_route_prefix: String,
    pub max_request_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewaySettings {
    pub default_model: String,
    pub default_embedding_model: String,
    pub enable_cross_region_inference: bool,
    pub aws_region: String,
    /// Overrides the Bedrock runtime endpoint, e.g. for a local stub
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InvocationSettings {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub stream_idle_timeout_secs: u64,
    pub cancel_grace_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Settings {
    /// Defaults, then `config/default`, `config/{ENVIRONMENT}`, `config/local`,
    /// then `BEDROCK_GATEWAY__*` environment variables
    pub fn new() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let config = Self::defaults(&environment)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Self::from_config(config)
    }

    pub fn defaults(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("application.host", "0.0.0.0")?
            .set_default("application.port", 8080)?
            .set_default("application.environment", environment)?
            .set_default("application.api_route_prefix", "/v1")?
            .set_default("application.max_request_bytes", 20 * 1024 * 1024)?
            .set_default(
                "gateway.default_model",
                "anthropic.claude-3-5-sonnet-20241022-v2:0",
            )?
            .set_default("gateway.default_embedding_model", "cohere.embed-multilingual-v3")?
            .set_default("gateway.enable_cross_region_inference", true)?
            .set_default("gateway.aws_region", "us-west-2")?
            .set_default("invocation.max_retries", 3)?
            .set_default("invocation.initial_backoff_ms", 200)?
            .set_default("invocation.max_backoff_ms", 5_000)?
            .set_default("invocation.request_timeout_secs", 120)?
            .set_default("invocation.stream_idle_timeout_secs", 60)?
            .set_default("invocation.cancel_grace_ms", 2_000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Self = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.aws_region()?;
        self.service_config()?;
        if self.invocation.initial_backoff_ms > self.invocation.max_backoff_ms {
            return Err(ConfigError::Message(
                "invocation.initial_backoff_ms must not exceed invocation.max_backoff_ms"
                    .to_string(),
            ));
        }
        if self.invocation.request_timeout_secs == 0 || self.invocation.stream_idle_timeout_secs == 0
        {
            return Err(ConfigError::Message(
                "invocation timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn aws_region(&self) -> Result<AwsRegion, ConfigError> {
        AwsRegion::try_new(self.gateway.aws_region.clone()).map_err(|_| {
            ConfigError::Message(format!(
                "gateway.aws_region `{}` is not an AWS region",
                self.gateway.aws_region
            ))
        })
    }

    pub fn service_config(&self) -> Result<ServiceConfig, ConfigError> {
        let route_prefix = RoutePrefix::try_new(self.application.api_route_prefix.clone())
            .map_err(|_| {
                ConfigError::Message(format!(
                    "application.api_route_prefix `{}` must be empty or start with `/`",
                    self.application.api_route_prefix
                ))
            })?;
        let max_request_bytes = RequestSizeLimit::try_new(self.application.max_request_bytes)
            .map_err(|_| {
                ConfigError::Message("application.max_request_bytes must be positive".to_string())
            })?;
        let api_key = match self.auth.api_key.as_deref() {
            None => None,
            Some(key) => Some(ApiKey::try_new(key.to_string()).map_err(|_| {
                ConfigError::Message("auth.api_key must not be blank".to_string())
            })?),
        };

        Ok(ServiceConfig {
            route_prefix,
            auth: AuthConfig::new(api_key),
            max_request_bytes,
        })
    }

    pub fn invocation_policy(&self) -> InvocationPolicy {
        InvocationPolicy {
            max_retries: self.invocation.max_retries,
            initial_backoff: Duration::from_millis(self.invocation.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.invocation.max_backoff_ms),
            request_timeout: Duration::from_secs(self.invocation.request_timeout_secs),
            stream_idle_timeout: Duration::from_secs(self.invocation.stream_idle_timeout_secs),
        }
    }

    pub fn gateway_defaults(&self) -> GatewayDefaults {
        GatewayDefaults {
            default_model: self.gateway.default_model.clone(),
            default_embedding_model: self.gateway.default_embedding_model.clone(),
            cross_region: self.gateway.enable_cross_region_inference,
            cancel_grace: Duration::from_millis(self.invocation.cancel_grace_ms),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn load(overrides: &str) -> Result<Settings, ConfigError> {
        let config = Settings::defaults("test")?
            .add_source(File::from_str(overrides, FileFormat::Toml))
            .build()?;
        Settings::from_config(config)
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = load("").unwrap();

        assert_eq!(settings.application.port, 8080);
        assert_eq!(settings.application.environment, "test");
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert!(settings.gateway.enable_cross_region_inference);
        assert!(settings.auth.api_key.is_none());
        assert!(settings.models.is_empty());
    }

    #[test]
    fn test_invocation_policy_conversion() {
        let settings = load(
            r#"
            [invocation]
            max_retries = 5
            initial_backoff_ms = 10
            max_backoff_ms = 20
            request_timeout_secs = 30
            stream_idle_timeout_secs = 15
            cancel_grace_ms = 100
            "#,
        )
        .unwrap();

        let policy = settings.invocation_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(10));
        assert_eq!(policy.request_timeout, Duration::from_secs(30));
        assert_eq!(
            settings.gateway_defaults().cancel_grace,
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_model_aliases_are_loaded() {
        let settings = load(
            r#"
            [[models]]
            id = "claude"
            bedrock_model_id = "anthropic.claude-3-5-sonnet-20241022-v2:0"
            streaming = false
            "#,
        )
        .unwrap();

        assert_eq!(settings.models.len(), 1);
        assert_eq!(settings.models[0].id, "claude");
        assert_eq!(settings.models[0].streaming, Some(false));
    }

    #[test]
    fn test_service_config_enables_auth_with_key() {
        let settings = load(
            r#"
            [auth]
            api_key = "sk-local"

            [application]
            api_route_prefix = "/openai/v1/"
            "#,
        )
        .unwrap();

        let service = settings.service_config().unwrap();
        assert!(service.auth.is_enabled());
        assert_eq!(service.route_prefix.as_ref(), "/openai/v1");
    }

    #[test]
    fn test_invalid_region_is_rejected() {
        let result = load(
            r#"
            [gateway]
            aws_region = "moon-base-1a"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_backoff_bounds_are_checked() {
        let result = load(
            r#"
            [invocation]
            initial_backoff_ms = 1000
            max_backoff_ms = 10
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_pretty_log_format() {
        let settings = load(
            r#"
            [logging]
            format = "pretty"
            "#,
        )
        .unwrap();
        assert_eq!(settings.logging.format, LogFormat::Pretty);
    }
}
