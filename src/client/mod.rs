use std::sync::Arc;

use async_trait::async_trait;
use prometheus::{IntCounterVec, Opts};

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::{Booking, BookingAddInputType, Establishment, EstablishmentAddInputType, Favorite, FavoriteAddInputType, Report, ReportAddInputType, User, UserAddInputType},
};

pub mod feed;
pub mod identity;
pub mod queue;
pub mod rest;

#[cfg(test)]
pub mod fake;

/**
 * Access to one backend service owning an entity domain.
 *
 * Every call is a single round trip. Nothing is retried or cached.
 */
#[async_trait]
pub trait BackendClient<E: Send, I: Sync>: Send + Sync {
    /**
     * Fetches the whole collection.
     */
    async fn fetch_all(&self) -> Result<Vec<E>, ApplicationError>;

    /**
     * Fetches one entity.
     *
     * # Returns
     * `None` when the backend does not know the id.
     */
    async fn fetch_by_id(&self, id: &str) -> Result<Option<E>, ApplicationError>;

    /**
     * Fetches the entities whose field `key` equals `value`. Implementations may return a
     * superset, callers filter the result again.
     *
     * # Arguments
     * `key`: Field name as the backend spells it, e.g. `EstablishmentID`.
     * `value`: Identifier to match.
     */
    async fn fetch_by_foreign_key(&self, key: &str, value: &str) -> Result<Vec<E>, ApplicationError>;

    /**
     * Creates an entity and returns the backend's representation of it.
     */
    async fn create(&self, input: &I) -> Result<E, ApplicationError>;
}

pub type UserClient = dyn BackendClient<User, UserAddInputType>;
pub type EstablishmentClient = dyn BackendClient<Establishment, EstablishmentAddInputType>;
pub type ReportClient = dyn BackendClient<Report, ReportAddInputType>;
pub type FavoriteClient = dyn BackendClient<Favorite, FavoriteAddInputType>;
pub type BookingClient = dyn BackendClient<Booking, BookingAddInputType>;

/**
 * One client per entity domain.
 */
#[derive(Clone)]
pub struct BackendClients {
    pub users: Arc<UserClient>,
    pub establishments: Arc<EstablishmentClient>,
    pub reports: Arc<ReportClient>,
    pub favorites: Arc<FavoriteClient>,
    pub bookings: Arc<BookingClient>,
}

/**
 * Creates the counter of failed backend calls, labelled by domain.
 *
 * # Returns
 * The counter, not yet registered in any registry.
 */
pub fn backend_failures_counter() -> Result<IntCounterVec, ApplicationError> {
    IntCounterVec::new(Opts::new("backend_failures_total", "Failed calls to backend services"), &["domain"])
        .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create backend failure counter: {err}")))
}
