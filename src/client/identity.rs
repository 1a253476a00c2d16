use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use prometheus::IntCounterVec;
use reqwest::{Client, Url, header::AUTHORIZATION};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    client::rest::{append_segment, status_error},
    model::{
        apperror::{ApplicationError, ErrorType},
        config::IdentityConfig,
        models::{SignInInputType, Token, UserAddInputType},
    },
};

const DOMAIN: &str = "identity";

/**
 * Identity service. Owns users and credentials, answers with opaque tokens.
 */
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /**
     * Registers a user.
     */
    async fn sign_up(&self, input: &UserAddInputType) -> Result<Token, ApplicationError>;

    /**
     * Exchanges credentials for a token.
     */
    async fn sign_in(&self, input: &SignInInputType) -> Result<Token, ApplicationError>;

    /**
     * Asks the identity service whether a token is valid.
     */
    async fn verify_token(&self, token: &str) -> Result<Token, ApplicationError>;
}

/**
 * Identity client speaking to `sign-up`, `sign-in` and `verify-token` below one base url.
 */
pub struct HttpIdentityClient {
    client: Client,
    base_url: Url,
    failures: IntCounterVec,
}

impl HttpIdentityClient {
    pub fn new(config: &IdentityConfig, failures: IntCounterVec) -> Result<Self, ApplicationError> {
        let base_url = Url::parse(&config.base_url).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Invalid url for identity service: {err}")))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create http client for identity service: {err}")))?;
        Ok(HttpIdentityClient { client, base_url, failures })
    }

    fn endpoint(&self, name: &str) -> Result<Url, ApplicationError> {
        append_segment(&self.base_url, name).ok_or_else(|| ApplicationError::new(ErrorType::Initialization, "Url for identity service cannot carry path segments".to_string()))
    }

    /**
     * Posts to an identity endpoint and passes the answer through as a token.
     *
     * # Arguments
     * `name`: Endpoint name, e.g. `sign-in`.
     * `authorization`: Value of the `Authorization` header, if any.
     * `body`: JSON body, if any.
     */
    async fn post(&self, name: &str, authorization: Option<String>, body: Option<Value>) -> Result<Token, ApplicationError> {
        let result: Result<Token, ApplicationError> = async {
            let url = self.endpoint(name)?;
            debug!(domain = DOMAIN, method = "POST", path = url.path(), "Calling backend");
            let mut request = self.client.post(url);
            if let Some(authorization) = authorization {
                request = request.header(AUTHORIZATION, authorization);
            }
            if let Some(body) = body {
                request = request.json(&body);
            }
            let response = request.send().await.map_err(|err| ApplicationError::backend_unavailable(format!("{DOMAIN} service is unavailable: {err}")))?;
            let status = response.status();
            let body = response.bytes().await.map_err(|err| ApplicationError::backend_unavailable(format!("{DOMAIN} service response could not be read: {err}")))?;
            if !status.is_success() {
                return Err(status_error(DOMAIN, status, &body));
            }
            Ok(token_from_body(&body))
        }
        .await;
        if let Err(err) = &result {
            warn!(domain = DOMAIN, "Backend call failed: {}", err.message);
            self.failures.with_label_values(&[DOMAIN]).inc();
        }
        result
    }
}

#[async_trait]
impl IdentityClient for HttpIdentityClient {
    async fn sign_up(&self, input: &UserAddInputType) -> Result<Token, ApplicationError> {
        let body = serde_json::to_value(input).map_err(|err| ApplicationError::validation(format!("User could not be serialized: {err}")))?;
        self.post("sign-up", None, Some(body)).await
    }

    async fn sign_in(&self, input: &SignInInputType) -> Result<Token, ApplicationError> {
        self.post("sign-in", Some(basic_authorization(&input.email, &input.password)), None).await
    }

    async fn verify_token(&self, token: &str) -> Result<Token, ApplicationError> {
        self.post("verify-token", Some(format!("Bearer {token}")), None).await
    }
}

/**
 * `Authorization` header value for basic authentication.
 */
pub fn basic_authorization(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/**
 * The token is whatever the identity service answered. JSON is kept as JSON, anything else as text.
 */
fn token_from_body(body: &[u8]) -> Token {
    serde_json::from_slice::<Value>(body).map_or_else(|_err| Token(Value::String(String::from_utf8_lossy(body).trim().to_string())), Token)
}
