use std::time::Duration;

use async_trait::async_trait;
use prometheus::IntCounterVec;
use reqwest::{Client, Url, header::AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    client::{identity::basic_authorization, rest::status_error},
    model::{
        apperror::{ApplicationError, ErrorType},
        config::QueueConfig,
        models::Booking,
    },
};

const DOMAIN: &str = "queue";

/**
 * Side channel receiving every created booking.
 */
#[async_trait]
pub trait BookingPublisher: Send + Sync {
    async fn publish(&self, booking: &Booking) -> Result<(), ApplicationError>;
}

/**
 * Publisher used when the side channel is switched off.
 */
pub struct DisabledPublisher;

#[async_trait]
impl BookingPublisher for DisabledPublisher {
    async fn publish(&self, booking: &Booking) -> Result<(), ApplicationError> {
        debug!(establishment_id = %booking.establishment_id, "Booking queue disabled, not publishing");
        Ok(())
    }
}

/**
 * Message as accepted by the broker's HTTP publish endpoint.
 */
#[derive(Debug, Serialize)]
struct PublishRequest {
    properties: MessageProperties,
    routing_key: String,
    payload: String,
    payload_encoding: &'static str,
}

#[derive(Debug, Serialize)]
struct MessageProperties {
    /**
     * 2 is persistent, 1 is transient.
     */
    delivery_mode: u8,
    content_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    routed: bool,
}

/**
 * Publishes bookings to a queue through the RabbitMQ management api, using the default exchange so the
 * routing key is the queue name.
 */
pub struct RabbitMqPublisher {
    client: Client,
    publish_url: Url,
    queue_name: String,
    durable: bool,
    authorization: Option<String>,
    failures: IntCounterVec,
}

impl RabbitMqPublisher {
    pub fn new(config: &QueueConfig, failures: IntCounterVec) -> Result<Self, ApplicationError> {
        let publish_url = publish_url(&config.url, &config.vhost)?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create http client for booking queue: {err}")))?;
        let authorization = config.username.as_ref().map(|username| basic_authorization(username, config.password.as_deref().unwrap_or_default()));
        Ok(RabbitMqPublisher { client, publish_url, queue_name: config.queue_name.clone(), durable: config.durable, authorization, failures })
    }

    fn message(&self, booking: &Booking) -> Result<PublishRequest, ApplicationError> {
        let payload = serde_json::to_string(booking).map_err(|err| ApplicationError::validation(format!("Booking could not be serialized: {err}")))?;
        Ok(PublishRequest {
            properties: MessageProperties { delivery_mode: if self.durable { 2 } else { 1 }, content_type: "application/json" },
            routing_key: self.queue_name.clone(),
            payload,
            payload_encoding: "string",
        })
    }
}

#[async_trait]
impl BookingPublisher for RabbitMqPublisher {
    async fn publish(&self, booking: &Booking) -> Result<(), ApplicationError> {
        let result: Result<(), ApplicationError> = async {
            let message = self.message(booking)?;
            debug!(domain = DOMAIN, method = "POST", path = self.publish_url.path(), "Publishing booking");
            let mut request = self.client.post(self.publish_url.clone()).json(&message);
            if let Some(authorization) = &self.authorization {
                request = request.header(AUTHORIZATION, authorization);
            }
            let response = request.send().await.map_err(|err| ApplicationError::backend_unavailable(format!("{DOMAIN} is unavailable: {err}")))?;
            let status = response.status();
            let body = response.bytes().await.map_err(|err| ApplicationError::backend_unavailable(format!("{DOMAIN} response could not be read: {err}")))?;
            if !status.is_success() {
                return Err(status_error(DOMAIN, status, &body));
            }
            let answer: PublishResponse = serde_json::from_slice(&body).map_err(|err| ApplicationError::malformed_response(format!("{DOMAIN} returned an unexpected payload: {err}")))?;
            if !answer.routed {
                return Err(ApplicationError::backend_unavailable(format!("Booking was not routed to queue {}", self.queue_name)));
            }
            Ok(())
        }
        .await;
        if let Err(err) = &result {
            warn!(domain = DOMAIN, "Publishing booking failed: {}", err.message);
            self.failures.with_label_values(&[DOMAIN]).inc();
        }
        result
    }
}

/**
 * `{url}/api/exchanges/{vhost}/amq.default/publish` with the vhost as one escaped segment.
 */
fn publish_url(url: &str, vhost: &str) -> Result<Url, ApplicationError> {
    let mut publish_url = Url::parse(url).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Invalid url for booking queue: {err}")))?;
    publish_url
        .path_segments_mut()
        .map_err(|()| ApplicationError::new(ErrorType::Initialization, "Url for booking queue cannot carry path segments".to_string()))?
        .pop_if_empty()
        .extend(["api", "exchanges", vhost, "amq.default", "publish"]);
    Ok(publish_url)
}
