use std::{
    fs::{File, OpenOptions},
    io,
    sync::Mutex,
    time::Instant,
};

use axum::{
    extract::MatchedPath,
    http::Request,
    middleware::Next,
    response::Response,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{fmt::writer::MakeWriterExt, EnvFilter};

use crate::config::LoggingConfig;

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// configured level. With `logging.file` set, output goes to stdout and is
/// appended to that file.
pub fn init_tracing(config: &LoggingConfig) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let file = config.file.as_deref().map(open_log_file).transpose()?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (file, config.json) {
        (None, false) => builder.init(),
        (None, true) => builder.json().init(),
        (Some(file), false) => builder
            .with_ansi(false)
            .with_writer(io::stdout.and(Mutex::new(file)))
            .init(),
        (Some(file), true) => builder
            .json()
            .with_writer(io::stdout.and(Mutex::new(file)))
            .init(),
    }
    Ok(())
}

/// Opens `path` for appending, creating it if needed. Earlier runs' lines
/// are kept.
pub fn open_log_file(path: &str) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Installs the global Prometheus recorder; the handle renders `/metrics`.
pub fn install_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub fn record_storage_error(operation: &'static str) {
    metrics::increment_counter!("expensedb_storage_errors_total", "operation" => operation);
}

/// Counts requests and records their latency, labelled by route template.
pub async fn track_requests<B>(req: Request<B>, next: Next<B>) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    let elapsed = start.elapsed().as_secs_f64();
    metrics::increment_counter!(
        "expensedb_http_requests_total",
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status.clone()
    );
    metrics::histogram!(
        "expensedb_request_duration_seconds",
        elapsed,
        "method" => method.clone(),
        "route" => route.clone()
    );
    tracing::debug!(%method, %route, %status, elapsed, "Request handled");
    response
}
