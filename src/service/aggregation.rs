use tracing::debug;

use crate::{
    model::{
        apperror::ApplicationError,
        models::{Booking, Report, Statistic},
    },
    service::relations::RelationResolver,
};

/**
 * Narrows a booking total to a date and/or a time block.
 */
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingScope {
    pub date: Option<String>,
    pub hour: Option<String>,
}

impl BookingScope {
    fn matches(&self, booking: &Booking) -> bool {
        self.date.as_ref().is_none_or(|date| booking.date.as_ref() == Some(date)) && self.hour.as_ref().is_none_or(|hour| booking.hour.as_ref() == Some(hour))
    }
}

/**
 * Values derived from backend collections on every request. Nothing is cached.
 */
#[derive(Clone)]
pub struct AggregationEngine {
    relations: RelationResolver,
}

impl AggregationEngine {
    pub fn new(relations: RelationResolver) -> Self {
        AggregationEngine { relations }
    }

    /**
     * Statistics of one establishment.
     *
     * # Returns
     * `None` when the establishment has no reports.
     */
    pub async fn statistics(&self, establishment_id: &str) -> Result<Option<Statistic>, ApplicationError> {
        let reports = self.relations.reports_of(establishment_id).await?;
        Ok(reports.and_then(|reports| compute_statistics(&reports)))
    }

    /**
     * Sum of party sizes of the bookings of an establishment within a scope.
     *
     * # Returns
     * `None` when no booking is in scope.
     */
    pub async fn booking_total(&self, establishment_id: &str, scope: &BookingScope) -> Result<Option<i64>, ApplicationError> {
        let bookings = self.relations.bookings_of(establishment_id).await?.unwrap_or_default();
        let total = sum_party_sizes(&bookings, scope)?;
        debug!(establishment_id, ?scope, ?total, "Computed booking total");
        Ok(total)
    }
}

/**
 * Means of both scores over all reports, divided by the report count.
 */
pub fn compute_statistics(reports: &[Report]) -> Option<Statistic> {
    if reports.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = reports.len() as f64;
    let iq_sum: f64 = reports.iter().map(|report| report.internet_quality).sum();
    let se_sum: f64 = reports.iter().map(|report| report.score_establishment).sum();
    Some(Statistic { iq_average: iq_sum / count, se_average: se_sum / count })
}

/**
 * Sum of party sizes in scope. `None` when no booking is in scope, `MalformedResponse` when the sum overflows.
 */
pub fn sum_party_sizes(bookings: &[Booking], scope: &BookingScope) -> Result<Option<i64>, ApplicationError> {
    bookings.iter().filter(|booking| scope.matches(booking)).try_fold(None, |total: Option<i64>, booking| match total {
        None => Ok(Some(booking.number_of_people)),
        Some(total) => total
            .checked_add(booking.number_of_people)
            .map(Some)
            .ok_or_else(|| ApplicationError::malformed_response("bookings service returned party sizes whose total overflows")),
    })
}
