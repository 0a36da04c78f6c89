use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;
use twitch_exporter_collector::{
    CollectorContext, CollectorOverrides, CollectorRegistry, EventSubSettings, ExporterConfig,
    ExporterState, MemoryCache, Orchestrator, RateLimitGovernor, cache::identity_ttl, config,
    exporter_router, governor::DEFAULT_REMAINING_THRESHOLD,
};
use twitch_exporter_common::{ChannelNames, error::Result, time::system_clock};
use twitch_exporter_eventsub::EventSubClient;
use twitch_exporter_helix::{HelixClient, client::DEFAULT_BASE_URL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "twitch_exporter", version, about = "Prometheus exporter for Twitch channels")]
struct Cli {
    #[arg(long = "web.listen-address", default_value = config::DEFAULT_LISTEN_ADDRESS)]
    listen_address: String,

    #[arg(long = "web.telemetry-path", default_value = config::DEFAULT_TELEMETRY_PATH)]
    telemetry_path: String,

    #[arg(long = "twitch.client-id", env = "TWITCH_CLIENT_ID", default_value = "")]
    client_id: String,

    #[arg(
        long = "twitch.access-token",
        env = "TWITCH_ACCESS_TOKEN",
        default_value = "",
        hide_env_values = true
    )]
    access_token: String,

    #[arg(long = "twitch.api-url", default_value = DEFAULT_BASE_URL)]
    helix_url: String,

    /// Wait for the rate-limit reset once this few Helix requests remain.
    #[arg(long = "twitch.rate-limit-threshold", default_value_t = DEFAULT_REMAINING_THRESHOLD)]
    rate_limit_threshold: u32,

    /// Channel logins to watch, comma separated. May be repeated.
    #[arg(long = "twitch.channel")]
    channels: Vec<String>,

    #[arg(long = "eventsub.enabled", default_value_t = false)]
    eventsub_enabled: bool,

    #[arg(
        long = "eventsub.client-secret",
        env = "TWITCH_CLIENT_SECRET",
        default_value = "",
        hide_env_values = true
    )]
    eventsub_client_secret: String,

    /// Public https URL Twitch delivers events to.
    #[arg(long = "eventsub.webhook-url", default_value = "")]
    eventsub_webhook_url: String,

    #[arg(
        long = "eventsub.webhook-secret",
        env = "TWITCH_WEBHOOK_SECRET",
        default_value = "",
        hide_env_values = true
    )]
    eventsub_webhook_secret: String,

    #[arg(long = "eventsub.webhook-path", default_value = config::DEFAULT_WEBHOOK_PATH)]
    eventsub_webhook_path: String,

    /// Enable a collector that is off by default. May be repeated.
    #[arg(long = "collector")]
    enable_collectors: Vec<String>,

    /// Disable a collector. May be repeated.
    #[arg(long = "no-collector")]
    disable_collectors: Vec<String>,

    #[arg(long = "log.format", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Cli {
    fn into_config(self) -> ExporterConfig {
        let eventsub = self.eventsub_enabled.then(|| EventSubSettings {
            client_secret: self.eventsub_client_secret,
            webhook_url: self.eventsub_webhook_url,
            webhook_secret: self.eventsub_webhook_secret,
            webhook_path: self.eventsub_webhook_path,
        });

        let mut channels = ChannelNames::new();
        for value in &self.channels {
            channels.extend_csv(value);
        }

        ExporterConfig {
            listen_address: self.listen_address,
            telemetry_path: self.telemetry_path,
            client_id: self.client_id,
            access_token: self.access_token,
            helix_url: self.helix_url,
            rate_limit_threshold: self.rate_limit_threshold,
            channels,
            eventsub,
            collectors: CollectorOverrides {
                enabled: self.enable_collectors,
                disabled: self.disable_collectors,
            },
        }
    }
}

fn init_logging(format: LogFormat) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::from_default_env().add_directive("twitch_exporter=info".parse()?);
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(env_filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init(),
    }
    Ok(())
}

async fn build_state(config: &ExporterConfig) -> Result<Arc<ExporterState>> {
    let clock = system_clock();
    let api = Arc::new(
        HelixClient::new(&config.client_id, &config.access_token)?.with_base_url(&config.helix_url),
    );
    let cache = Arc::new(MemoryCache::new(identity_ttl(), Arc::clone(&clock)));
    let governor = RateLimitGovernor::with_threshold(config.rate_limit_threshold, Arc::clone(&clock));
    info!(threshold = governor.threshold(), "helix rate-limit governor ready");
    let mut context =
        CollectorContext::new(api, config.channels.clone(), cache, clock).with_governor(governor);

    let eventsub = match config.eventsub_config() {
        Some(settings) => {
            let client = Arc::new(EventSubClient::new(settings)?);
            context = context.with_eventsub(Arc::clone(&client));
            Some(client)
        }
        None => None,
    };

    let registry = CollectorRegistry::builtin()?;
    let orchestrator = Orchestrator::build(&registry, &config.collectors, context).await?;
    info!(
        collectors = ?orchestrator.collector_names(),
        channels = config.channels.len(),
        "collectors ready"
    );

    let mut state = ExporterState::new(Arc::new(orchestrator), config.telemetry_path.clone());
    if let Some(client) = eventsub {
        state = state.with_eventsub(client);
    }
    Ok(Arc::new(state))
}

async fn run(config: ExporterConfig) -> Result<()> {
    let state = build_state(&config).await?;
    let app = exporter_router(state, config.webhook_path());

    let listener = tokio::net::TcpListener::bind(&config.listen_address).await?;
    info!(
        address = %config.listen_address,
        telemetry_path = %config.telemetry_path,
        version = env!("CARGO_PKG_VERSION"),
        "twitch exporter listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_format)?;

    let config = cli.into_config();
    config.validate()?;
    run(config).await?;

    Ok(())
}
