use actix_web::{HttpRequest, HttpResponse, get, post, web};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use tracing::{Instrument, instrument};

use crate::{
    api::{
        rest::{GraphqlRequest, GraphqlResponse, HealthResponse},
        state::AppState,
    },
    graphql::parser::parse_document,
    model::apperror::ApplicationError,
    service::dispatcher::RequestContext,
};

/**
 * Executes a query or mutation document.
 *
 * Field failures are reported inside a 200 response. Only a document that cannot be parsed, or that
 * does not name a single operation to run, is rejected as a whole.
 */
#[instrument(level = "info", skip(http_request, request_body, bearer, app_state), fields(service = "graphql", trace_id = get_trace_id(&http_request), result))]
#[post("/graphql")]
pub async fn graphql(http_request: HttpRequest, request_body: web::Json<GraphqlRequest>, bearer: Option<BearerAuth>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let request = request_body.into_inner();
    let document = parse_document(&request.query)?;
    let variables = request.variables.unwrap_or_default();
    let operation = document.operation(request.operation_name.as_deref(), &variables)?;
    let context = RequestContext { bearer_token: bearer.map(|credentials| credentials.token().to_string()) };
    let output = app_state.dispatcher.execute(&operation, &context).instrument(span.clone()).await;
    span.record("result", if output.errors.is_empty() { "complete" } else { "partial" });
    Ok(HttpResponse::Ok().json(GraphqlResponse::from(output)))
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse { status: "UP" })
}

/**
 * Retrieves the trace ID from the HTTP request headers.
 * If the trace ID is not present, a new UUID is generated.
 */
fn get_trace_id(http_request: &HttpRequest) -> String {
    http_request.headers().get("X-Trace-ID").and_then(|v| v.to_str().ok().map(std::string::ToString::to_string)).unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use actix_web::{App, test, test::TestRequest};
    use serde_json::{Value, json};
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;
    use crate::{
        client::{
            BackendClients,
            fake::{FakeClient, FakeFeed, FakeIdentity, FakePublisher, establishment},
        },
        model::models::{Booking, Favorite, Report, User},
        service::dispatcher::QueryDispatcher,
    };

    fn state() -> web::Data<AppState> {
        let clients = BackendClients {
            users: Arc::new(FakeClient::<User>::new("users", vec![])),
            establishments: Arc::new(FakeClient::new("establishments", vec![establishment("E1", "Cafe"), establishment("E2", "Library")])),
            reports: Arc::new(FakeClient::<Report>::new("reports", vec![])),
            favorites: Arc::new(FakeClient::<Favorite>::new("favorites", vec![])),
            bookings: Arc::new(FakeClient::<Booking>::new("bookings", vec![])),
        };
        let (sender, _receiver) = unbounded_channel();
        let dispatcher = QueryDispatcher::new(clients, Arc::new(FakeIdentity::default()), Arc::new(FakeFeed { result: Ok(vec![]) }), Arc::new(FakePublisher { sender, failing: false }));
        web::Data::new(AppState::new(dispatcher))
    }

    async fn post_graphql(body: Value, bearer: Option<&str>) -> (u16, Value) {
        let app = test::init_service(App::new().app_data(state()).service(graphql)).await;
        let mut request = TestRequest::post().uri("/graphql").set_json(body);
        if let Some(token) = bearer {
            request = request.insert_header(("Authorization", format!("Bearer {token}")));
        }
        let response = test::call_service(&app, request.to_request()).await;
        let status = response.status().as_u16();
        let body: Value = test::read_body_json(response).await;
        (status, body)
    }

    #[actix_web::test]
    async fn test_graphql_query() {
        let (status, body) = post_graphql(json!({"query": "{ allEstablishments { id EstablishmentName } }"}), None).await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({"data": {"allEstablishments": [{"id": "E1", "EstablishmentName": "Cafe"}, {"id": "E2", "EstablishmentName": "Library"}]}}));
    }

    #[actix_web::test]
    async fn test_graphql_variables_and_operation_name() {
        let (status, body) = post_graphql(
            json!({
                "query": "query Find($id: ID!) { findEstablishment(id: $id) { EstablishmentName } } query All { allEstablishments { id } }",
                "variables": {"id": "E2"},
                "operationName": "Find"
            }),
            None,
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({"data": {"findEstablishment": {"EstablishmentName": "Library"}}}));
    }

    #[actix_web::test]
    async fn test_graphql_field_errors_are_reported_with_200() {
        let (status, body) = post_graphql(json!({"query": "{ allEstablishments { id Wifi } }"}), None).await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["allEstablishments"][0], json!({"id": "E1", "Wifi": null}));
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);
        assert_eq!(body["errors"][1]["path"], json!(["allEstablishments", 1, "Wifi"]));
    }

    #[actix_web::test]
    async fn test_graphql_syntax_error_is_rejected() {
        let (status, body) = post_graphql(json!({"query": "{ allEstablishments { id "}), None).await;
        assert_eq!(status, 400);
        assert_eq!(body["code"], json!(1005));
        assert!(body["message"].as_str().unwrap().starts_with("Syntax error"));
    }

    #[actix_web::test]
    async fn test_graphql_deeply_nested_document_is_rejected() {
        let query = format!("{{ findUser(id: {}1{}) {{ id }} }}", "[".repeat(5_000), "]".repeat(5_000));
        let (status, body) = post_graphql(json!({ "query": query }), None).await;
        assert_eq!(status, 400);
        assert_eq!(body["code"], json!(1005));
    }

    #[actix_web::test]
    async fn test_graphql_unknown_operation_is_rejected() {
        let (status, body) = post_graphql(json!({"query": "query All { allEstablishments { id } }", "operationName": "Other"}), None).await;
        assert_eq!(status, 400);
        assert_eq!(body["message"], json!("Unknown operation named 'Other'"));
    }

    #[actix_web::test]
    async fn test_graphql_bearer_token_is_verified() {
        let (status, body) = post_graphql(json!({"query": "{ verifyToken }"}), Some("abc")).await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({"data": {"verifyToken": {"valid": true}}}));
    }

    #[actix_web::test]
    async fn test_health() {
        let app = test::init_service(App::new().service(health)).await;
        let response = test::call_service(&app, TestRequest::get().uri("/health").to_request()).await;
        assert!(response.status().is_success());
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body, json!({"status": "UP"}));
    }

    #[actix_web::test]
    async fn test_get_trace_id_exists() {
        let request = TestRequest::default().insert_header(("X-Trace-ID", "test")).to_http_request();
        let trace_id = get_trace_id(&request);
        assert_eq!(trace_id, "test");
    }

    #[actix_web::test]
    async fn test_get_trace_id_not_exists() {
        let request = TestRequest::default().to_http_request();
        let trace_id = get_trace_id(&request);
        assert!(!trace_id.is_empty());
    }
}
