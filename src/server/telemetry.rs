use crate::config::ServerConfig;
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const DEFAULT_FILTER: &str = "scavenger_hunt=debug,tower_http=debug,axum::rejection=trace,warn";
#[cfg(feature = "jaeger")]
const SERVICE_NAME: &str = "scavenger-hunt";

fn telemetry_enabled() -> bool {
    env::var("ENABLE_TELEMETRY")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false)
}

/// Installs the global subscriber: env filter, plain or JSON output, and
/// Jaeger export when built with `jaeger` and `ENABLE_TELEMETRY=true`.
pub fn init_telemetry(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json_layer = config.log_json.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_file(true)
            .json()
    });
    let plain_layer = (!config.log_json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true)
    });

    let registry = Registry::default()
        .with(env_filter)
        .with(json_layer)
        .with(plain_layer);

    #[cfg(feature = "jaeger")]
    if telemetry_enabled() {
        let (tracer, endpoint) = jaeger::tracer()?;
        registry
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .try_init()?;
        tracing::info!("Telemetry initialized with Jaeger endpoint: {}", endpoint);
        return Ok(());
    }

    registry.try_init()?;
    if telemetry_enabled() {
        tracing::warn!("ENABLE_TELEMETRY is set but the server was built without `jaeger`");
    }
    Ok(())
}

pub fn shutdown_telemetry() {
    #[cfg(feature = "jaeger")]
    if telemetry_enabled() {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

#[cfg(feature = "jaeger")]
mod jaeger {
    use super::SERVICE_NAME;
    use opentelemetry::sdk::propagation::TraceContextPropagator;
    use opentelemetry::sdk::{
        trace::{self, RandomIdGenerator, Sampler, Tracer},
        Resource,
    };
    use opentelemetry::{global, KeyValue};
    use std::env;

    pub fn tracer() -> Result<(Tracer, String), Box<dyn std::error::Error>> {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let endpoint = env::var("JAEGER_ENDPOINT")
            .unwrap_or_else(|_| "http://jaeger:14268/api/traces".to_string());

        let tracer = opentelemetry_jaeger::new_collector_pipeline()
            .with_service_name(SERVICE_NAME)
            .with_endpoint(&endpoint)
            .with_isahc()
            .with_trace_config(
                trace::config()
                    .with_sampler(Sampler::AlwaysOn)
                    .with_id_generator(RandomIdGenerator::default())
                    .with_resource(Resource::new(vec![
                        KeyValue::new("service.name", SERVICE_NAME),
                        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    ])),
            )
            .with_timeout(std::time::Duration::from_secs(2))
            .install_batch(opentelemetry::runtime::Tokio)?;
        Ok((tracer, endpoint))
    }
}
