mod api;
mod client;
mod graphql;
mod model;
mod service;

use std::fs::OpenOptions;
use std::sync::Arc;

use crate::api::endpoints::health;
use crate::api::middleware::timing_middleware;
use crate::api::state::AppState;
use crate::client::feed::SoapFeedClient;
use crate::client::identity::HttpIdentityClient;
use crate::client::queue::{BookingPublisher, DisabledPublisher, RabbitMqPublisher};
use crate::client::rest::RestClient;
use crate::client::{BackendClients, backend_failures_counter};
use crate::model::apperror::{ApplicationError, ErrorType};
use crate::model::config::{ApplicationArguments, Config, HttpsConfig, LoggingConfig};
use crate::model::models::{Booking, BookingAddInputType, Establishment, EstablishmentAddInputType, Favorite, FavoriteAddInputType, Report, ReportAddInputType, User, UserAddInputType};
use crate::service::dispatcher::QueryDispatcher;

use actix_web::middleware::from_fn;
use actix_web::{App, HttpServer, web};
use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};
use clap::Parser;
use prometheus::IntCounterVec;
use rustls::pki_types::PrivateKeyDer;
use rustls::{ServerConfig, SupportedProtocolVersion};
use rustls_pemfile::{certs, pkcs8_private_keys};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args = ApplicationArguments::parse();

    let config = get_config(&args.config_file)?;

    init_tracing(&config.logging)?;

    let prometheus = PrometheusMetricsBuilder::new("")
        .endpoint("/metrics")
        .mask_unmatched_patterns("UNKNOWN")
        .build()
        .map_err(|err| std::io::Error::other(format!("Failed to create Prometheus metrics: {err}")))?;

    let backend_failures = backend_failures_counter().map_err(|err| std::io::Error::other(err.message))?;
    register_promethius_metrics(&prometheus, &backend_failures)?;

    let dispatcher = get_dispatcher(&config, &backend_failures).map_err(|err| std::io::Error::other(format!("Failed to create backend clients: {err}")))?;
    let state = web::Data::new(AppState::new(dispatcher));

    let server_init = HttpServer::new(move || App::new().wrap(prometheus.clone()).wrap(from_fn(timing_middleware)).app_data(state.clone()).service(crate::api::endpoints::graphql).service(health));

    let server_init = if let Some(http_port) = &config.server.http_port {
        info!("Listening for http on port {http_port}");
        server_init.bind(("127.0.0.1", *http_port))?
    } else {
        server_init
    };
    let server_init = if let Some(https_config) = &config.server.https_config {
        let ssl_builder = ssl_builder(https_config).map_err(|err| std::io::Error::other(format!("Failed to create SSL/TLS configuration: {err}")))?;
        info!("Listening for https on port {}", https_config.port);
        server_init.bind_rustls_0_23("127.0.0.1:".to_string() + &https_config.port.to_string(), ssl_builder).map_err(|err| std::io::Error::other(format!("Failed to bind HTTPS server: {err}")))?
    } else {
        server_init
    };

    server_init.workers(config.server.workers).run().await
}

/**
 * Initializes logging for the application.
 *
 * #Arguments
 * `logging`: Output format, optional log file and filter directives added to `RUST_LOG`.
 *
 * #Returns
 * A `Result` indicating success or failure.
 */
fn init_tracing(logging: &LoggingConfig) -> Result<(), std::io::Error> {
    let mut filter = EnvFilter::from_default_env();
    for directive in &logging.directives {
        let directive: Directive = directive.parse().map_err(|err| std::io::Error::other(format!("Invalid logging directive {directive}: {err}")))?;
        filter = filter.add_directive(directive);
    }
    let layer = tracing_subscriber::fmt::layer()
        .with_target(logging.target)
        .with_thread_ids(logging.thread_ids)
        .with_thread_names(logging.thread_names)
        .with_line_number(logging.line_number)
        .with_level(logging.level)
        .with_ansi(logging.ansi)
        .with_file(logging.file);
    let initialized = match &logging.logfile {
        Some(logfile) => {
            let file = OpenOptions::new().create(true).append(true).open(logfile).map_err(|err| std::io::Error::other(format!("Failed to open log file {logfile}: {err}")))?;
            tracing_subscriber::registry().with(filter).with(layer.with_writer(Arc::new(file))).try_init()
        }
        None => tracing_subscriber::registry().with(filter).with(layer).try_init(),
    };
    initialized.map_err(|err| std::io::Error::other(format!("Failed to initialize logging: {err}")))
}

/**
 * Registers custom Prometheus metrics.
 *
 * #Arguments
 * `prometheus_metrics`: The Prometheus metrics instance to register the counter with.
 * `counter`: The counter to register.
 */
fn register_promethius_metrics(prometheus_metrics: &PrometheusMetrics, counter: &IntCounterVec) -> Result<(), std::io::Error> {
    prometheus_metrics.registry.register(Box::new(counter.clone())).map_err(|err| std::io::Error::other(format!("Failed to register Prometheus counter: {err}")))?;
    Ok(())
}

/**
 * Creates the backend clients and the dispatcher using them.
 *
 * #Arguments
 * `config`: The application configuration.
 * `failures`: Counter shared by all clients.
 */
fn get_dispatcher(config: &Config, failures: &IntCounterVec) -> Result<QueryDispatcher, ApplicationError> {
    let backends = &config.backends;
    let clients = BackendClients {
        users: Arc::new(RestClient::<User, UserAddInputType>::new("users", &backends.users, failures.clone())?),
        establishments: Arc::new(RestClient::<Establishment, EstablishmentAddInputType>::new("establishments", &backends.establishments, failures.clone())?),
        reports: Arc::new(RestClient::<Report, ReportAddInputType>::new("reports", &backends.reports, failures.clone())?),
        favorites: Arc::new(RestClient::<Favorite, FavoriteAddInputType>::new("favorites", &backends.favorites, failures.clone())?),
        bookings: Arc::new(RestClient::<Booking, BookingAddInputType>::new("bookings", &backends.bookings, failures.clone())?),
    };
    let identity = Arc::new(HttpIdentityClient::new(&config.identity, failures.clone())?);
    let feed = Arc::new(SoapFeedClient::new(&config.feed, failures.clone())?);
    let publisher: Arc<dyn BookingPublisher> = if config.queue.enabled {
        info!("Publishing bookings to queue {}", config.queue.queue_name);
        Arc::new(RabbitMqPublisher::new(&config.queue, failures.clone())?)
    } else {
        Arc::new(DisabledPublisher)
    };
    Ok(QueryDispatcher::new(clients, identity, feed, publisher))
}

/**
 * Initializes the SSL/TLS configuration for the server.
 *
 * #Arguments
 * `https_config`: The HTTPS configuration containing the certificate and private key files.
 *
 * #Returns
 * A `Result` containing the initialized `ServerConfig` or an `ApplicationError` if initialization fails.
 */
fn ssl_builder(https_config: &HttpsConfig) -> Result<ServerConfig, ApplicationError> {
    let config_builder = ServerConfig::builder_with_protocol_versions(&get_protocol_versions());
    let cert_file = &mut std::io::BufReader::new(
        std::fs::File::open(&https_config.certificate_file).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to read certificate file: {err}")))?,
    );
    let key_file = &mut std::io::BufReader::new(
        std::fs::File::open(&https_config.private_key_file).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to read private key file: {err}")))?,
    );
    let cert_chain = certs(cert_file).collect::<Result<Vec<_>, _>>().map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to convert certificate to der: {err}")))?;
    let key = pkcs8_private_keys(key_file)
        .map(|key| key.map(PrivateKeyDer::Pkcs8))
        .next()
        .ok_or_else(|| ApplicationError::new(ErrorType::Initialization, "No pkcs8 private key found in private key file".to_string()))?
        .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to convert private key to der: {err}")))?;
    let config = config_builder
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create server config: {err}")))?;
    Ok(config)
}

/**
 * Returns the supported TLS protocol versions.
 *
 * #Returns
 * A vector of supported protocol versions.
 */
fn get_protocol_versions() -> Vec<&'static SupportedProtocolVersion> {
    vec![&rustls::version::TLS13]
}

/**
 * Reads the configuration from the specified file.
 *
 * #Arguments
 * `config_file`: The path to the configuration file.
 *
 * #Returns
 * A `Result` containing the parsed `Config` or an `std::io::Error` if reading or parsing fails.
*/
fn get_config(config_file: &str) -> Result<Config, std::io::Error> {
    let config_str: String = std::fs::read_to_string(config_file).map_err(|err| std::io::Error::other(format!("Failed to read config file: {err}")))?;
    let config: Config = toml::from_str(&config_str).map_err(|err| std::io::Error::other(format!("Failed to parse config file: {err}")))?;
    Ok(config)
}
