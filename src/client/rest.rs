use std::{marker::PhantomData, time::Duration};

use async_trait::async_trait;
use prometheus::IntCounterVec;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    client::BackendClient,
    model::{
        apperror::{ApplicationError, ErrorType},
        config::BackendConfig,
        models::{IdentifierKeys, decode_entity},
    },
};

/**
 * Longest plain text error body that is quoted in an error message.
 */
const MAX_PLAIN_ERROR_LENGTH: usize = 200;

/**
 * REST backend client.
 *
 * Collection at `GET {base}`, entity at `GET {base}/{id}`, creation at `POST {base}`. Filtering by a
 * foreign key uses `GET {base}?{key}={value}` when the backend supports it, otherwise the whole
 * collection is fetched and filtered on the raw payload.
 */
pub struct RestClient<E, I> {
    /**
     * Domain name used in logs, messages and metric labels.
     */
    domain: &'static str,
    client: Client,
    base_url: Url,
    filter_by_query: bool,
    failures: IntCounterVec,
    _marker: PhantomData<fn() -> (E, I)>,
}

impl<E, I> RestClient<E, I> {
    /**
     * Creates a new REST client.
     *
     * # Arguments
     * `domain`: Domain name, e.g. `reports`.
     * `config`: Backend location and timeout.
     * `failures`: Counter incremented for every failed call.
     *
     * # Returns
     * The client or an `Initialization` error if the url or http client is invalid.
     */
    pub fn new(domain: &'static str, config: &BackendConfig, failures: IntCounterVec) -> Result<Self, ApplicationError> {
        let base_url = Url::parse(&config.base_url).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Invalid url for {domain} backend: {err}")))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create http client for {domain} backend: {err}")))?;
        Ok(RestClient { domain, client, base_url, filter_by_query: config.filter_by_query, failures, _marker: PhantomData })
    }

    /**
     * Sends a request and reads the whole body.
     *
     * # Returns
     * Status and body. Transport failures and timeouts are `BackendUnavailable`.
     */
    async fn send(&self, request: RequestBuilder, method: &str, url: &Url) -> Result<(StatusCode, Vec<u8>), ApplicationError> {
        debug!(domain = self.domain, method, path = url.path(), "Calling backend");
        let response = request.send().await.map_err(|err| ApplicationError::backend_unavailable(format!("{} service is unavailable: {err}", self.domain)))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|err| ApplicationError::backend_unavailable(format!("{} service response could not be read: {err}", self.domain)))?;
        Ok((status, body.to_vec()))
    }

    /**
     * Sends a request and fails on any non-2xx status.
     */
    async fn send_expecting_success(&self, request: RequestBuilder, method: &str, url: &Url) -> Result<Vec<u8>, ApplicationError> {
        let (status, body) = self.send(request, method, url).await?;
        if !status.is_success() {
            return Err(status_error(self.domain, status, &body));
        }
        Ok(body)
    }

    fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T, ApplicationError> {
        serde_json::from_slice(body).map_err(|err| self.malformed(err))
    }

    fn malformed(&self, err: serde_json::Error) -> ApplicationError {
        ApplicationError::malformed_response(format!("{} service returned an unexpected payload: {err}", self.domain))
    }

    /**
     * Counts a failed call before handing the result back.
     */
    fn record<T>(&self, result: Result<T, ApplicationError>) -> Result<T, ApplicationError> {
        if let Err(err) = &result {
            warn!(domain = self.domain, "Backend call failed: {}", err.message);
            self.failures.with_label_values(&[self.domain]).inc();
        }
        result
    }

    fn entity_url(&self, id: &str) -> Result<Url, ApplicationError> {
        append_segment(&self.base_url, id).ok_or_else(|| ApplicationError::new(ErrorType::Initialization, format!("Url for {} backend cannot carry path segments", self.domain)))
    }
}

impl<E: DeserializeOwned + IdentifierKeys, I> RestClient<E, I> {
    fn decode_item(&self, item: Value) -> Result<E, ApplicationError> {
        decode_entity(item).map_err(|err| self.malformed(err))
    }

    /**
     * Decodes a collection payload, keeping only the items accepted by `filter`.
     */
    fn decode_entities(&self, body: &[u8], filter: impl Fn(&Value) -> bool) -> Result<Vec<E>, ApplicationError> {
        let items: Vec<Value> = self.decode(body)?;
        items.into_iter().filter(|item| filter(item)).map(|item| self.decode_item(item)).collect()
    }
}

#[async_trait]
impl<E, I> BackendClient<E, I> for RestClient<E, I>
where
    E: DeserializeOwned + IdentifierKeys + Send,
    I: Serialize + Sync,
{
    async fn fetch_all(&self) -> Result<Vec<E>, ApplicationError> {
        let url = self.base_url.clone();
        let result: Result<Vec<E>, ApplicationError> = async { self.decode_entities(&self.send_expecting_success(self.client.get(url.clone()), "GET", &url).await?, |_| true) }.await;
        self.record(result)
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<E>, ApplicationError> {
        let result: Result<Option<E>, ApplicationError> = async {
            let url = self.entity_url(id)?;
            let (status, body) = self.send(self.client.get(url.clone()), "GET", &url).await?;
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                return Err(status_error(self.domain, status, &body));
            }
            match self.decode::<Value>(&body)? {
                Value::Null => Ok(None),
                item => self.decode_item(item).map(Some),
            }
        }
        .await;
        self.record(result)
    }

    async fn fetch_by_foreign_key(&self, key: &str, value: &str) -> Result<Vec<E>, ApplicationError> {
        let result: Result<Vec<E>, ApplicationError> = async {
            let mut url = self.base_url.clone();
            if self.filter_by_query {
                url.query_pairs_mut().append_pair(key, value);
                return self.decode_entities(&self.send_expecting_success(self.client.get(url.clone()), "GET", &url).await?, |_| true);
            }
            self.decode_entities(&self.send_expecting_success(self.client.get(url.clone()), "GET", &url).await?, |item| matches_key(item, key, value))
        }
        .await;
        self.record(result)
    }

    async fn create(&self, input: &I) -> Result<E, ApplicationError> {
        let url = self.base_url.clone();
        let result: Result<E, ApplicationError> = async {
            let item: Value = self.decode(&self.send_expecting_success(self.client.post(url.clone()).json(input), "POST", &url).await?)?;
            self.decode_item(item)
        }
        .await;
        self.record(result)
    }
}

/**
 * Appends one escaped path segment.
 */
pub fn append_segment(base_url: &Url, segment: &str) -> Option<Url> {
    let mut url = base_url.clone();
    url.path_segments_mut().ok()?.pop_if_empty().push(segment);
    Some(url)
}

/**
 * Whether the payload field `key` holds `value`. The key is matched exactly first, then ignoring
 * case and underscores, so `EstablishmentID` also finds `establishmentId` and `establishment_id`.
 */
pub fn matches_key(item: &Value, key: &str, value: &str) -> bool {
    let Some(object) = item.as_object() else {
        return false;
    };
    let field = object.get(key).or_else(|| {
        let wanted = normalize_key(key);
        object.iter().find(|(name, _)| normalize_key(name) == wanted).map(|(_, field)| field)
    });
    match field {
        Some(Value::String(text)) => text == value,
        Some(Value::Number(number)) => number.to_string() == value,
        _ => false,
    }
}

fn normalize_key(key: &str) -> String {
    key.chars().filter(|c| *c != '_').flat_map(char::to_lowercase).collect()
}

/**
 * Builds the `BackendUnavailable` error for a non-2xx answer.
 */
pub fn status_error(domain: &str, status: StatusCode, body: &[u8]) -> ApplicationError {
    match error_detail(body) {
        Some(detail) => ApplicationError::backend_unavailable(format!("{domain} service answered {status}: {detail}")),
        None => ApplicationError::backend_unavailable(format!("{domain} service answered {status}")),
    }
}

/**
 * Human readable message of an error body, from `{"message": ..}`, `{"error": ..}` or a short text.
 */
fn error_detail(body: &[u8]) -> Option<String> {
    if let Ok(Value::Object(object)) = serde_json::from_slice::<Value>(body) {
        return ["message", "error"].iter().find_map(|name| object.get(*name).and_then(Value::as_str)).map(str::to_string);
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() || text.len() > MAX_PLAIN_ERROR_LENGTH || text.starts_with('<') {
        return None;
    }
    Some(text.to_string())
}

#[cfg(test)]
mod test {
    use actix_web::{HttpRequest, HttpResponse, web};
    use serde_json::json;

    use super::*;
    use crate::{
        client::{backend_failures_counter, fake::stub_backend},
        model::models::{Report, ReportAddInputType},
    };

    fn report_json(id: &str, establishment_id: &str) -> Value {
        json!({"id": id, "EstablishmentID": establishment_id, "InternetQuality": 4, "ScoreEstablishment": 3})
    }

    fn reports_client(address: &str, filter_by_query: bool, failures: IntCounterVec) -> RestClient<Report, ReportAddInputType> {
        let config = BackendConfig { base_url: format!("{address}/reports"), timeout_ms: 2_000, filter_by_query };
        RestClient::new("reports", &config, failures).unwrap()
    }

    fn reports_backend(cfg: &mut web::ServiceConfig) {
        cfg.service(
            web::resource("/reports")
                .route(web::get().to(|request: HttpRequest| async move {
                    let mut first = report_json("R1", "E1");
                    first["Review"] = json!(request.query_string());
                    HttpResponse::Ok().json(json!([first, report_json("R2", "E2"), {"id": "R3", "establishment_id": "E1", "EstablishmentID": "E1", "InternetQuality": 1, "ScoreEstablishment": 1}]))
                }))
                .route(web::post().to(|body: web::Json<Value>| async move {
                    let mut created = body.into_inner();
                    created["id"] = json!("R9");
                    HttpResponse::Created().json(created)
                })),
        )
        .route(
            "/reports/{id}",
            web::get().to(|path: web::Path<String>| async move {
                match path.into_inner().as_str() {
                    "R1" => HttpResponse::Ok().json(report_json("R1", "E1")),
                    "R5" => HttpResponse::Ok().json(json!({"id": "R5", "EstablishmentID": "E1", "InternetQuality": "fast", "ScoreEstablishment": 3})),
                    _ => HttpResponse::NotFound().json(json!({"message": "no such report"})),
                }
            }),
        );
    }

    #[test]
    fn test_append_segment() {
        let base = Url::parse("http://reports:8080/api/reports").unwrap();
        assert_eq!(append_segment(&base, "17").unwrap().as_str(), "http://reports:8080/api/reports/17");
        let base = Url::parse("http://reports:8080/api/reports/").unwrap();
        assert_eq!(append_segment(&base, "a b/c").unwrap().as_str(), "http://reports:8080/api/reports/a%20b%2Fc");
    }

    #[test]
    fn test_matches_key_casings() {
        assert!(matches_key(&json!({"EstablishmentID": "E1"}), "EstablishmentID", "E1"));
        assert!(matches_key(&json!({"establishmentId": 12}), "EstablishmentID", "12"));
        assert!(matches_key(&json!({"establishment_id": "E1"}), "EstablishmentID", "E1"));
        assert!(!matches_key(&json!({"EstablishmentID": "E2"}), "EstablishmentID", "E1"));
        assert!(!matches_key(&json!({"UserID": "E1"}), "EstablishmentID", "E1"));
        assert!(!matches_key(&json!(["E1"]), "EstablishmentID", "E1"));
    }

    #[test]
    fn test_status_error_messages() {
        let err = status_error("reports", StatusCode::SERVICE_UNAVAILABLE, br#"{"message": "maintenance"}"#);
        assert_eq!(err.error_type, ErrorType::BackendUnavailable);
        assert_eq!(err.message, "reports service answered 503 Service Unavailable: maintenance");
        let err = status_error("users", StatusCode::BAD_REQUEST, br#"{"error": "bad id"}"#);
        assert_eq!(err.message, "users service answered 400 Bad Request: bad id");
        let err = status_error("users", StatusCode::INTERNAL_SERVER_ERROR, b"boom");
        assert_eq!(err.message, "users service answered 500 Internal Server Error: boom");
        let err = status_error("users", StatusCode::BAD_GATEWAY, b"<html><body>bad gateway</body></html>");
        assert_eq!(err.message, "users service answered 502 Bad Gateway");
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        let config = BackendConfig { base_url: "not a url".to_string(), timeout_ms: 100, filter_by_query: false };
        let client = RestClient::<Report, ReportAddInputType>::new("reports", &config, backend_failures_counter().unwrap());
        assert_eq!(client.err().unwrap().error_type, ErrorType::Initialization);
    }

    #[tokio::test]
    async fn test_unreachable_backend_counts_failure() {
        let failures = backend_failures_counter().unwrap();
        let config = BackendConfig { base_url: "http://127.0.0.1:9/reports".to_string(), timeout_ms: 500, filter_by_query: false };
        let client = RestClient::<Report, ReportAddInputType>::new("reports", &config, failures.clone()).unwrap();
        let err = client.fetch_all().await.unwrap_err();
        assert_eq!(err.error_type, ErrorType::BackendUnavailable);
        assert_eq!(failures.with_label_values(&["reports"]).get(), 1);
    }

    #[actix_web::test]
    async fn test_fetch_by_id_found_and_missing() {
        let address = stub_backend(reports_backend);
        let failures = backend_failures_counter().unwrap();
        let client = reports_client(&address, false, failures.clone());
        assert_eq!(client.fetch_by_id("R1").await.unwrap().map(|report| report.establishment_id), Some("E1".to_string()));
        assert_eq!(client.fetch_by_id("R404").await.unwrap(), None);
        assert_eq!(failures.with_label_values(&["reports"]).get(), 0);
    }

    #[actix_web::test]
    async fn test_fetch_by_id_undecodable_report() {
        let address = stub_backend(reports_backend);
        let failures = backend_failures_counter().unwrap();
        let err = reports_client(&address, false, failures.clone()).fetch_by_id("R5").await.unwrap_err();
        assert_eq!(err.error_type, ErrorType::MalformedResponse);
        assert!(err.message.starts_with("reports service returned an unexpected payload"), "{}", err.message);
        assert_eq!(failures.with_label_values(&["reports"]).get(), 1);
    }

    #[actix_web::test]
    async fn test_fetch_by_foreign_key_with_query_filter() {
        let address = stub_backend(reports_backend);
        let client = reports_client(&address, true, backend_failures_counter().unwrap());
        let reports = client.fetch_by_foreign_key("EstablishmentID", "E 1").await.unwrap();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].review.as_deref(), Some("EstablishmentID=E+1"));
    }

    #[actix_web::test]
    async fn test_fetch_by_foreign_key_filters_in_memory() {
        let address = stub_backend(reports_backend);
        let client = reports_client(&address, false, backend_failures_counter().unwrap());
        let reports = client.fetch_by_foreign_key("EstablishmentID", "E1").await.unwrap();
        let ids: Vec<&str> = reports.iter().map(|report| report.id.as_str()).collect();
        assert_eq!(ids, vec!["R1", "R3"]);
        assert_eq!(reports[0].review.as_deref(), Some(""));
    }

    #[actix_web::test]
    async fn test_create_posts_input() {
        let address = stub_backend(reports_backend);
        let client = reports_client(&address, false, backend_failures_counter().unwrap());
        let input = ReportAddInputType {
            user_id: "3".to_string(),
            establishment_id: "E1".to_string(),
            date: "2024-05-01".to_string(),
            internet_quality: 4.0,
            capability_id: "1".to_string(),
            score_establishment: 5.0,
            score_report: "good".to_string(),
            review: "Quiet".to_string(),
        };
        let created = client.create(&input).await.unwrap();
        assert_eq!(created.id, "R9");
        assert_eq!(created.user_id.as_deref(), Some("3"));
        assert_eq!(created.establishment_id, "E1");
        assert_eq!(created.internet_quality, 4.0);
        assert_eq!(created.capability_id.as_deref(), Some("1"));
        assert_eq!(created.review.as_deref(), Some("Quiet"));
    }

    #[actix_web::test]
    async fn test_error_status_carries_backend_message() {
        let address = stub_backend(|cfg: &mut web::ServiceConfig| {
            cfg.route("/reports", web::get().to(|| async { HttpResponse::ServiceUnavailable().json(json!({"message": "maintenance"})) }));
        });
        let failures = backend_failures_counter().unwrap();
        let err = reports_client(&address, false, failures.clone()).fetch_all().await.unwrap_err();
        assert_eq!(err.error_type, ErrorType::BackendUnavailable);
        assert_eq!(err.message, "reports service answered 503 Service Unavailable: maintenance");
        assert_eq!(failures.with_label_values(&["reports"]).get(), 1);
    }
}
