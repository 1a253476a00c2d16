use std::collections::HashMap;

use futures_util::future::try_join;
use tracing::debug;

use crate::{
    client::BackendClients,
    model::{
        apperror::ApplicationError,
        models::{Booking, Establishment, Favorite, Report},
    },
};

/**
 * Foreign key field naming the establishment in reports, favorites and bookings.
 */
pub const ESTABLISHMENT_KEY: &str = "EstablishmentID";
/**
 * Foreign key field naming the user in favorites.
 */
pub const USER_KEY: &str = "UserID";

/**
 * Joins entities across backends in memory.
 *
 * Null versus empty: relations reached from an entity (`reports_of`, `bookings_of`) return `None`
 * when nothing matches, so `Establishment.Reports` and `Establishment.BookingList` are null. Relations
 * requested at the top level (`favorites_of`, `favorite_establishments`, `findReports`) always return
 * a list, possibly empty.
 */
#[derive(Clone)]
pub struct RelationResolver {
    clients: BackendClients,
}

impl RelationResolver {
    pub fn new(clients: BackendClients) -> Self {
        RelationResolver { clients }
    }

    /**
     * Reports of one establishment.
     *
     * # Returns
     * `None` when the establishment has no reports.
     */
    pub async fn reports_of(&self, establishment_id: &str) -> Result<Option<Vec<Report>>, ApplicationError> {
        let reports = self.all_reports_of(establishment_id).await?;
        Ok(if reports.is_empty() { None } else { Some(reports) })
    }

    /**
     * Reports of one establishment, empty when there are none.
     */
    pub async fn all_reports_of(&self, establishment_id: &str) -> Result<Vec<Report>, ApplicationError> {
        let reports = self.clients.reports.fetch_by_foreign_key(ESTABLISHMENT_KEY, establishment_id).await?;
        let reports: Vec<Report> = reports.into_iter().filter(|report| report.establishment_id == establishment_id).collect();
        debug!(establishment_id, count = reports.len(), "Resolved reports");
        Ok(reports)
    }

    /**
     * Bookings of one establishment.
     *
     * # Returns
     * `None` when the establishment has no bookings.
     */
    pub async fn bookings_of(&self, establishment_id: &str) -> Result<Option<Vec<Booking>>, ApplicationError> {
        let bookings = self.clients.bookings.fetch_by_foreign_key(ESTABLISHMENT_KEY, establishment_id).await?;
        let bookings: Vec<Booking> = bookings.into_iter().filter(|booking| booking.establishment_id == establishment_id).collect();
        debug!(establishment_id, count = bookings.len(), "Resolved bookings");
        Ok(if bookings.is_empty() { None } else { Some(bookings) })
    }

    /**
     * Favorite rows of one user. Duplicates are kept.
     */
    pub async fn favorites_of(&self, user_id: &str) -> Result<Vec<Favorite>, ApplicationError> {
        let favorites = self.clients.favorites.fetch_by_foreign_key(USER_KEY, user_id).await?;
        Ok(favorites.into_iter().filter(|favorite| favorite.user_id == user_id).collect())
    }

    /**
     * Establishments a user marked as favorite, in favorite order.
     *
     * Favorites pointing at an establishment that does not exist are dropped, so the result may be
     * shorter than the favorite list. Duplicate favorites give duplicate establishments.
     */
    pub async fn favorite_establishments(&self, user_id: &str) -> Result<Vec<Establishment>, ApplicationError> {
        let (favorites, establishments) = try_join(self.favorites_of(user_id), self.clients.establishments.fetch_all()).await?;
        let by_id: HashMap<&str, &Establishment> = establishments.iter().map(|establishment| (establishment.id.as_str(), establishment)).collect();
        let resolved: Vec<Establishment> = favorites.iter().filter_map(|favorite| by_id.get(favorite.establishment_id.as_str()).map(|establishment| (*establishment).clone())).collect();
        if resolved.len() < favorites.len() {
            debug!(user_id, dropped = favorites.len() - resolved.len(), "Dropped favorites without establishment");
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::{
        client::fake::{FakeClient, booking, establishment, report},
        model::{apperror::ErrorType, models::User},
    };

    fn favorite(establishment_id: &str, user_id: &str) -> Favorite {
        Favorite { id: None, establishment_id: establishment_id.to_string(), user_id: user_id.to_string(), city: None }
    }

    fn resolver(establishments: Vec<Establishment>, reports: Vec<Report>, favorites: Vec<Favorite>, bookings: Vec<Booking>) -> (RelationResolver, Arc<FakeClient<Report>>) {
        let reports = Arc::new(FakeClient::new("reports", reports));
        let clients = BackendClients {
            users: Arc::new(FakeClient::<User>::new("users", vec![])),
            establishments: Arc::new(FakeClient::new("establishments", establishments)),
            reports: reports.clone(),
            favorites: Arc::new(FakeClient::new("favorites", favorites)),
            bookings: Arc::new(FakeClient::new("bookings", bookings)),
        };
        (RelationResolver::new(clients), reports)
    }

    #[tokio::test]
    async fn test_reports_of_filters_and_nulls() {
        let (resolver, reports) = resolver(vec![], vec![report("1", "E1", 2.0, 3.0), report("2", "E2", 4.0, 3.0), report("3", "E1", 6.0, 9.0)], vec![], vec![]);
        let found = resolver.reports_of("E1").await.unwrap().unwrap();
        assert_eq!(found.iter().map(|report| report.id.as_str()).collect::<Vec<_>>(), vec!["1", "3"]);
        assert!(resolver.reports_of("E3").await.unwrap().is_none());
        assert!(resolver.all_reports_of("E3").await.unwrap().is_empty());
        assert_eq!(reports.foreign_key_calls(), 3);
    }

    #[tokio::test]
    async fn test_bookings_of_empty_is_none() {
        let (resolver, _) = resolver(vec![], vec![], vec![], vec![booking("E1", "2024-05-01", "08-10", 2)]);
        assert_eq!(resolver.bookings_of("E1").await.unwrap().unwrap().len(), 1);
        assert!(resolver.bookings_of("E2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_favorite_establishments_drops_dangling_and_keeps_duplicates() {
        let (resolver, _) = resolver(
            vec![establishment("E1", "Cafe"), establishment("E2", "Library")],
            vec![],
            vec![favorite("E2", "U1"), favorite("E9", "U1"), favorite("E2", "U1"), favorite("E1", "U2")],
            vec![],
        );
        let found = resolver.favorite_establishments("U1").await.unwrap();
        assert_eq!(found.iter().map(|establishment| establishment.id.as_str()).collect::<Vec<_>>(), vec!["E2", "E2"]);
        assert!(found.len() <= resolver.favorites_of("U1").await.unwrap().len());
        assert!(resolver.favorite_establishments("U3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_backend_propagates() {
        let (resolver, reports) = resolver(vec![], vec![report("1", "E1", 2.0, 3.0)], vec![], vec![]);
        reports.set_unavailable(true);
        let err = resolver.reports_of("E1").await.unwrap_err();
        assert_eq!(err.error_type, ErrorType::BackendUnavailable);
    }
}
