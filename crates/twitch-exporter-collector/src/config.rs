use tracing::warn;
use twitch_exporter_common::{
    error::{ExporterError, Result},
    types::ChannelNames,
};
use twitch_exporter_eventsub::EventSubConfig;
use twitch_exporter_helix::client::DEFAULT_BASE_URL;

use crate::{collector::CollectorRegistry, governor::DEFAULT_REMAINING_THRESHOLD};

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9184";
pub const DEFAULT_TELEMETRY_PATH: &str = "/metrics";
pub const DEFAULT_WEBHOOK_PATH: &str = "/eventsub";

/// Per-name overrides of the registry's default enablement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorOverrides {
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
}

impl CollectorOverrides {
    pub fn is_enabled(&self, name: &str, enabled_by_default: bool) -> bool {
        if self.disabled.iter().any(|disabled| disabled == name) {
            return false;
        }
        if self.enabled.iter().any(|enabled| enabled == name) {
            return true;
        }
        enabled_by_default
    }

    pub fn validate(&self, registry: &CollectorRegistry) -> Result<()> {
        for name in self.enabled.iter().chain(self.disabled.iter()) {
            if !registry.contains(name) {
                return Err(ExporterError::InvalidConfig(format!(
                    "unknown collector {name}, available: {}",
                    registry.names().join(", ")
                )));
            }
        }

        if let Some(name) = self
            .enabled
            .iter()
            .find(|name| self.disabled.contains(*name))
        {
            return Err(ExporterError::InvalidConfig(format!(
                "collector {name} is both enabled and disabled"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EventSubSettings {
    pub client_secret: String,
    pub webhook_url: String,
    pub webhook_secret: String,
    pub webhook_path: String,
}

#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub listen_address: String,
    pub telemetry_path: String,
    pub client_id: String,
    pub access_token: String,
    pub helix_url: String,
    /// Remaining Helix requests at or below which scrapes wait for the reset.
    pub rate_limit_threshold: u32,
    pub channels: ChannelNames,
    pub eventsub: Option<EventSubSettings>,
    pub collectors: CollectorOverrides,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            telemetry_path: DEFAULT_TELEMETRY_PATH.to_string(),
            client_id: String::new(),
            access_token: String::new(),
            helix_url: DEFAULT_BASE_URL.to_string(),
            rate_limit_threshold: DEFAULT_REMAINING_THRESHOLD,
            channels: ChannelNames::new(),
            eventsub: None,
            collectors: CollectorOverrides::default(),
        }
    }
}

impl ExporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(ExporterError::InvalidConfig(
                "twitch client id is required".to_string(),
            ));
        }
        if self.access_token.trim().is_empty() {
            return Err(ExporterError::InvalidConfig(
                "twitch access token is required".to_string(),
            ));
        }
        if !self.helix_url.starts_with("https://") && !self.helix_url.starts_with("http://") {
            return Err(ExporterError::InvalidConfig(format!(
                "helix url must be an http(s) url: {}",
                self.helix_url
            )));
        }
        validate_path("telemetry path", &self.telemetry_path)?;

        if let Some(eventsub) = &self.eventsub {
            validate_path("eventsub webhook path", &eventsub.webhook_path)?;
            if eventsub.webhook_path == self.telemetry_path {
                return Err(ExporterError::InvalidConfig(
                    "eventsub webhook path must differ from the telemetry path".to_string(),
                ));
            }
            if let Some(config) = self.eventsub_config() {
                config.validate()?;
            }
        }

        if self.channels.is_empty() {
            warn!("no channels configured, channel collectors will report no data");
        }
        Ok(())
    }

    pub fn eventsub_config(&self) -> Option<EventSubConfig> {
        self.eventsub.as_ref().map(|eventsub| EventSubConfig {
            client_id: self.client_id.clone(),
            client_secret: eventsub.client_secret.clone(),
            webhook_url: eventsub.webhook_url.clone(),
            webhook_secret: eventsub.webhook_secret.clone(),
        })
    }

    pub fn webhook_path(&self) -> Option<&str> {
        self.eventsub
            .as_ref()
            .map(|eventsub| eventsub.webhook_path.as_str())
    }
}

fn validate_path(what: &str, path: &str) -> Result<()> {
    if !path.starts_with('/') || path == "/" {
        return Err(ExporterError::InvalidConfig(format!(
            "{what} must start with '/' and not be the root path: {path}"
        )));
    }
    Ok(())
}
