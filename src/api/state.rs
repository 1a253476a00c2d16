use crate::service::dispatcher::QueryDispatcher;

/**
* Represents the application state shared across the Actix web application.
*/
pub struct AppState {
    /**
     * Executes query documents against the backend services.
     */
    pub dispatcher: QueryDispatcher,
}

impl AppState {
    pub fn new(dispatcher: QueryDispatcher) -> Self {
        AppState { dispatcher }
    }
}
