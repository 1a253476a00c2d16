use clap::{Parser, command};
use serde::{Deserialize, Serialize};

/**
 * Command-line arguments for the application.
 */
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct ApplicationArguments {
    /**
     * Path to the configuration file.
     */
    #[arg(short, long)]
    pub config_file: String,
}

/**
 * Represents the configuration for the application.
 */
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /**
     * Logging configuration for the application.
     */
    pub logging: LoggingConfig,
    /**
     * Server configuration for the application.
     */
    pub server: Server,
    /**
     * Entity backend services.
     */
    pub backends: Backends,
    /**
     * Identity service used for sign-up, sign-in and token verification.
     */
    pub identity: IdentityConfig,
    /**
     * External feed service.
     */
    pub feed: FeedConfig,
    /**
     * Booking queue side channel.
     */
    pub queue: QueueConfig,
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /**
     * Whether to log the target of the log message.
     */
    pub target: bool,
    /**
     * Whether to log thread IDs .
     */
    pub thread_ids: bool,
    /**
     * Whether to log thread names.
     */
    pub thread_names: bool,
    /**
     * Whether to log line numbers.
     */
    pub line_number: bool,
    /**
     * Whether to log the log level.
     */
    pub level: bool,
    /**
     * Whether to use ANSI colors in logs.
     */
    pub ansi: bool,
    /**
     * Whether to log file.
     */
    pub file: bool,
    /**
     * Path to the log file. Logs go to stdout when not set.
     */
    pub logfile: Option<String>,
    /**
     * Additional directives for logging configuration.
     */
    pub directives: Vec<String>,
}

impl LoggingConfig {
    #[allow(dead_code)]
    pub fn default() -> Self {
        LoggingConfig { target: true, thread_ids: true, thread_names: true, line_number: true, level: true, ansi: true, file: true, logfile: Some("/tmp/establishment_gateway.log".to_string()), directives: vec![] }
    }
}

/**
 * Represents the server configuration for the application.
 */
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    /**
     * Number of worker threads for the server.
     */
    pub workers: usize,
    /**
     * HTTP port for the server.
     */
    pub http_port: Option<u16>,
    /**
     * HTTPS configuration for the server.
     */
    pub https_config: Option<HttpsConfig>,
}

/**
 * Represents the HTTPS configuration for the server.
 */
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HttpsConfig {
    /**
     * Port for the HTTPS server.
     */
    pub port: u16,
    /**
     * Path to the certificate file.
     */
    pub certificate_file: String,
    /**
     * Path to the private key file.
     */
    pub private_key_file: String,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Backends {
    pub users: BackendConfig,
    pub establishments: BackendConfig,
    pub reports: BackendConfig,
    pub favorites: BackendConfig,
    pub bookings: BackendConfig,
}

/**
 * One REST backend owning an entity domain.
 */
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /**
     * Collection url, e.g. `http://reports:8080/reports`.
     */
    pub base_url: String,
    /**
     * Timeout for a single request in milliseconds.
     */
    pub timeout_ms: u64,
    /**
     * Whether the backend narrows the collection with `?{key}={value}`. When false the
     * whole collection is fetched and filtered here.
     */
    #[serde(default)]
    pub filter_by_query: bool,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityConfig {
    /**
     * Base url below which `sign-up`, `sign-in` and `verify-token` are served.
     */
    pub base_url: String,
    pub timeout_ms: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedConfig {
    /**
     * Endpoint the envelope is posted to.
     */
    pub url: String,
    /**
     * Target namespace of the search operation.
     */
    pub namespace: String,
    /**
     * Value of the `SOAPAction` header.
     */
    pub soap_action: String,
    pub timeout_ms: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    /**
     * When false, bookings are not published anywhere.
     */
    pub enabled: bool,
    /**
     * Broker management api, e.g. `http://rabbitmq:15672`.
     */
    pub url: String,
    pub vhost: String,
    pub queue_name: String,
    /**
     * Persistent messages when true, transient otherwise.
     */
    pub durable: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_ms: u64,
}
