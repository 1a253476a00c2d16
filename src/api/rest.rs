use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    model::apperror::{ApplicationError, ErrorType},
    service::dispatcher::{ExecutionOutput, FieldError},
};

/***************** Graphql models *********************/

/**
 * Request body of `POST /graphql`.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
    /**
     * The query document.
     */
    pub query: String,
    /**
     * Values of the variables declared by the operation.
     */
    pub variables: Option<Map<String, Value>>,
    /**
     * Operation to execute when the document holds more than one.
     */
    pub operation_name: Option<String>,
}

/**
 * Response body of `POST /graphql`. `errors` is left out when no field failed.
 */
#[derive(Debug, Serialize)]
pub struct GraphqlResponse {
    data: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<FieldError>,
}

impl From<ExecutionOutput> for GraphqlResponse {
    fn from(output: ExecutionOutput) -> Self {
        GraphqlResponse { data: output.data, errors: output.errors }
    }
}

/***************** Health models *********************/

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/***************** Error models *********************/

/**
 * Custom error response for the application.
 */
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /**
     * The error code associated with the error type.
     */
    pub code: u16,
    /**
     * A human-readable message describing the error.
     */
    pub message: String,
}

impl ResponseError for ApplicationError {
    fn status_code(&self) -> StatusCode {
        get_statuscode(&self.error_type)
    }

    /**
     * Generates an error response for the application error.
     */
    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse { code: get_error_code(&self.error_type), message: self.message.clone() };
        HttpResponse::build(get_statuscode(&self.error_type)).json(&error_response)
    }
}

/**
* Maps application errors to HTTP status codes.
*
* # Arguments
* `application_error`: The type of error that occurred.
*
* # Returns
* The corresponding HTTP status code.
*/
fn get_statuscode(application_error: &ErrorType) -> StatusCode {
    match application_error {
        ErrorType::QuerySyntax | ErrorType::Validation => StatusCode::BAD_REQUEST,
        ErrorType::BackendUnavailable | ErrorType::MalformedResponse => StatusCode::BAD_GATEWAY,
        ErrorType::Initialization => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/**
 * Maps application errors to error codes.
 *
 * # Arguments
 * `application_error`: The type of error that occurred.
 *
 * # Returns
 * The corresponding error code.
 */
fn get_error_code(application_error: &ErrorType) -> u16 {
    match application_error {
        ErrorType::Initialization => 1001,
        ErrorType::BackendUnavailable => 1002,
        ErrorType::MalformedResponse => 1003,
        ErrorType::Validation => 1004,
        ErrorType::QuerySyntax => 1005,
    }
}
