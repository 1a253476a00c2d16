use std::fmt;

/**
 * Represents the type of error that can occur within the application.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorType {
    /**
     * Startup failures: configuration, TLS material, client construction.
     */
    Initialization,
    /**
     * A backend service could not be reached, timed out or answered with a non-2xx status.
     */
    BackendUnavailable,
    /**
     * A backend answered with data that could not be decoded.
     */
    MalformedResponse,
    /**
     * A required argument was missing or malformed. Raised before any backend call.
     */
    Validation,
    /**
     * The query document itself could not be parsed.
     */
    QuerySyntax,
}

impl ErrorType {
    /**
     * Code reported in the `extensions.code` entry of a field error.
     */
    pub fn code(&self) -> &'static str {
        match self {
            ErrorType::Initialization => "INITIALIZATION",
            ErrorType::BackendUnavailable => "BACKEND_UNAVAILABLE",
            ErrorType::MalformedResponse => "MALFORMED_RESPONSE",
            ErrorType::Validation => "VALIDATION_FAILURE",
            ErrorType::QuerySyntax => "QUERY_SYNTAX",
        }
    }
}

/**
 * Represents an error that occurs within the application.
 */
#[derive(Debug, Clone)]
pub struct ApplicationError {
    /**
     * Error type.
     */
    pub error_type: ErrorType,
    /**
     * Error message describing problem.
     */
    pub message: String,
}

impl ApplicationError {
    /**
     * Creates a new ApplicationError.
     *
     * #Arguments
     * `error_type`: The type of error.
     * `message`: A description of the error.
     */
    pub fn new(error_type: ErrorType, message: String) -> Self {
        ApplicationError { error_type, message }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApplicationError::new(ErrorType::Validation, message.into())
    }

    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        ApplicationError::new(ErrorType::BackendUnavailable, message.into())
    }

    pub fn malformed_response(message: impl Into<String>) -> Self {
        ApplicationError::new(ErrorType::MalformedResponse, message.into())
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApplicationError {}
