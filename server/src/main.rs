use anyhow::{Context, Result};
use clap::Parser;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use raven_rush_server::{Api, Quest, QuestConfig};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// OTLP trace export; plain fmt logging when no endpoint is configured.
#[derive(clap::Args, Debug)]
struct TelemetryArgs {
    /// OTLP/HTTP collector endpoint.
    #[arg(long = "otlp-endpoint", env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    endpoint: Option<String>,

    #[arg(long = "otel-service-name", env = "OTEL_SERVICE_NAME", default_value = "raven-rush-server")]
    service_name: String,

    /// Fraction of traces sampled, clamped to [0, 1].
    #[arg(long = "otel-sampling-rate", env = "OTEL_SAMPLING_RATE", default_value_t = 1.0)]
    sampling_rate: f64,
}

impl TelemetryArgs {
    fn endpoint(&self) -> Option<&str> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
    }
}

fn init_tracing(telemetry: &TelemetryArgs) -> Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(LevelFilter::INFO);
    let Some(endpoint) = telemetry.endpoint() else {
        tracing_subscriber::registry().with(fmt_layer).init();
        return Ok(());
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .context("failed to build OTLP exporter")?;
    let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(
            telemetry.sampling_rate.clamp(0.0, 1.0),
        ))
        .with_resource(
            opentelemetry_sdk::Resource::builder_empty()
                .with_attributes([opentelemetry::KeyValue::new(
                    "service.name",
                    telemetry.service_name.clone(),
                )])
                .build(),
        )
        .with_batch_exporter(exporter)
        .build();
    let tracer = tracer_provider.tracer(telemetry.service_name.clone());
    opentelemetry::global::set_tracer_provider(tracer_provider);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .init();
    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Directory holding the JSON record stores.
    #[arg(long, env = "RAVEN_RUSH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// File name of the points store inside the data directory.
    #[arg(long)]
    users_file: Option<String>,

    /// File name of the referral store inside the data directory.
    #[arg(long)]
    referrals_file: Option<String>,

    /// Keep records in memory only (nothing is written to disk).
    #[arg(long, default_value_t = false)]
    in_memory: bool,

    /// Minimum time between two check-ins of one address, in milliseconds.
    #[arg(long)]
    checkin_cooldown_ms: Option<u64>,

    /// Points awarded per check-in.
    #[arg(long)]
    checkin_points: Option<u64>,

    /// Points awarded per boost.
    #[arg(long)]
    boost_points: Option<u64>,

    /// Maximum referral leaderboard length (must be > 0 when set).
    #[arg(long)]
    referral_leaderboard_limit: Option<usize>,

    /// HTTP rate limit per IP in requests per second (0 disables rate limiting).
    #[arg(long)]
    http_rate_limit_per_second: Option<u64>,

    /// HTTP rate limit burst size (0 disables rate limiting).
    #[arg(long)]
    http_rate_limit_burst: Option<u32>,

    /// Write endpoint rate limit per IP in requests per minute (0 disables).
    #[arg(long)]
    write_rate_limit_per_minute: Option<u64>,

    /// Write endpoint rate limit burst size (0 disables).
    #[arg(long)]
    write_rate_limit_burst: Option<u32>,

    /// Max request body size in bytes (0 disables limit).
    #[arg(long)]
    http_body_limit_bytes: Option<usize>,

    #[command(flatten)]
    telemetry: TelemetryArgs,
}

fn is_production() -> bool {
    matches!(
        std::env::var("NODE_ENV").as_deref(),
        Ok("production") | Ok("prod")
    )
}

/// Maps an optional arg value to Option: 0 => None, Some(v) => Some(v), None => default
fn map_optional_limit<T: Copy + PartialEq + From<u8>>(
    arg: Option<T>,
    default: Option<T>,
) -> Option<T> {
    match arg {
        Some(v) if v == T::from(0) => None,
        Some(v) => Some(v),
        None => default,
    }
}

fn build_config(args: &Args) -> Result<QuestConfig> {
    let defaults = QuestConfig::default();
    if let Some(0) = args.checkin_cooldown_ms {
        anyhow::bail!("checkin_cooldown_ms must be > 0 when set");
    }
    if let Some(0) = args.referral_leaderboard_limit {
        anyhow::bail!("referral_leaderboard_limit must be > 0 when set");
    }
    Ok(QuestConfig {
        data_dir: args.data_dir.clone().unwrap_or(defaults.data_dir),
        users_file: args.users_file.clone().unwrap_or(defaults.users_file),
        referrals_file: args.referrals_file.clone().unwrap_or(defaults.referrals_file),
        checkin_cooldown_ms: args.checkin_cooldown_ms.unwrap_or(defaults.checkin_cooldown_ms),
        checkin_points: args.checkin_points.unwrap_or(defaults.checkin_points),
        boost_points: args.boost_points.unwrap_or(defaults.boost_points),
        referral_leaderboard_limit: args
            .referral_leaderboard_limit
            .unwrap_or(defaults.referral_leaderboard_limit),
        http_rate_limit_per_second: map_optional_limit(args.http_rate_limit_per_second, defaults.http_rate_limit_per_second),
        http_rate_limit_burst: map_optional_limit(args.http_rate_limit_burst, defaults.http_rate_limit_burst),
        write_rate_limit_per_minute: map_optional_limit(args.write_rate_limit_per_minute, defaults.write_rate_limit_per_minute),
        write_rate_limit_burst: map_optional_limit(args.write_rate_limit_burst, defaults.write_rate_limit_burst),
        http_body_limit_bytes: map_optional_limit(args.http_body_limit_bytes, defaults.http_body_limit_bytes),
        allowed_origins: defaults.allowed_origins,
        allow_no_origin: defaults.allow_no_origin,
        in_memory: args.in_memory,
    })
}

fn require_env(var: &str) -> Result<String> {
    let value = std::env::var(var).unwrap_or_default();
    if value.trim().is_empty() {
        anyhow::bail!("Missing required env: {var}");
    }
    Ok(value)
}

fn ensure_production_env() -> Result<()> {
    if !is_production() {
        return Ok(());
    }
    require_env("ALLOWED_HTTP_ORIGINS")?;
    require_env("METRICS_AUTH_TOKEN")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    init_tracing(&args.telemetry)?;
    ensure_production_env()?;

    let config = build_config(&args)?.apply_env_overrides();
    info!(
        data_dir = %config.data_dir.display(),
        in_memory = config.in_memory,
        cooldown_ms = config.checkin_cooldown_ms,
        origins = config.allowed_origins.len(),
        "quest config loaded"
    );
    let quest = Arc::new(Quest::open(config).context("failed to open record stores")?);
    let api = Api::new(quest);
    let app = api.router();

    // Start server
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("axum server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_disables_optional_limits() {
        let args = Args::parse_from([
            "raven-rush-server",
            "--http-rate-limit-per-second",
            "0",
            "--write-rate-limit-burst",
            "0",
            "--http-body-limit-bytes",
            "1024",
        ]);
        let config = build_config(&args).expect("config should parse");
        assert_eq!(config.http_rate_limit_per_second, None);
        assert_eq!(config.write_rate_limit_burst, None);
        assert_eq!(config.http_body_limit_bytes, Some(1024));
        assert_eq!(
            config.http_rate_limit_burst,
            QuestConfig::default().http_rate_limit_burst
        );
    }

    #[test]
    fn quest_rules_are_configurable() {
        let args = Args::parse_from([
            "raven-rush-server",
            "--data-dir",
            "/tmp/raven",
            "--checkin-cooldown-ms",
            "1000",
            "--boost-points",
            "5",
            "--in-memory",
        ]);
        let config = build_config(&args).expect("config should parse");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/raven"));
        assert_eq!(config.checkin_cooldown_ms, 1000);
        assert_eq!(config.boost_points, 5);
        assert_eq!(config.checkin_points, 10);
        assert!(config.in_memory);
    }

    #[test]
    fn blank_otlp_endpoint_means_fmt_only() {
        let args = Args::parse_from([
            "raven-rush-server",
            "--otlp-endpoint",
            "  ",
            "--otel-service-name",
            "quest-staging",
        ]);
        assert_eq!(args.telemetry.endpoint(), None);
        assert_eq!(args.telemetry.service_name, "quest-staging");

        let args = Args::parse_from([
            "raven-rush-server",
            "--otlp-endpoint",
            " http://collector:4318 ",
        ]);
        assert_eq!(args.telemetry.endpoint(), Some("http://collector:4318"));
    }

    #[test]
    fn rejects_zero_cooldown() {
        let args = Args::parse_from(["raven-rush-server", "--checkin-cooldown-ms", "0"]);
        let err = build_config(&args).unwrap_err();
        assert!(
            err.to_string().contains("checkin_cooldown_ms"),
            "unexpected error: {err}"
        );
    }
}
