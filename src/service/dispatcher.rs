use std::{future::Future, sync::Arc};

use futures_util::{
    FutureExt,
    future::{BoxFuture, join_all, ready},
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{Instrument, debug, warn};

use crate::{
    client::{BackendClients, feed::FeedClient, identity::IdentityClient, queue::BookingPublisher},
    graphql::document::{Arguments, Field, Operation, OperationKind},
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{
            Booking, BookingAddInputType, Establishment, EstablishmentAddInputType, EntityFields, Favorite, FavoriteAddInputType, FeedEntry, Report, ReportAddInputType, SignInInputType, Statistic, Token, User,
            UserAddInputType, validate_date,
        },
    },
    service::{
        aggregation::{AggregationEngine, BookingScope},
        relations::RelationResolver,
    },
};

/**
 * One step of the path from the response root to a failed field.
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorExtensions {
    pub code: &'static str,
}

/**
 * Error attached to a single field of the response. The field itself is null.
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub message: String,
    pub path: Vec<PathSegment>,
    pub extensions: ErrorExtensions,
}

impl FieldError {
    pub fn new(path: Vec<PathSegment>, error: &ApplicationError) -> Self {
        FieldError { message: error.message.clone(), path, extensions: ErrorExtensions { code: error.error_type.code() } }
    }
}

/**
 * Per request values not carried by the query document.
 */
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /**
     * Bearer token of the incoming request, used by `verifyToken` without argument.
     */
    pub bearer_token: Option<String>,
}

/**
 * Result of executing one operation: the data tree and the errors of the fields that failed.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    pub data: Map<String, Value>,
    pub errors: Vec<FieldError>,
}

/**
 * Value of one field together with the errors raised below it.
 */
struct Resolved {
    value: Value,
    errors: Vec<FieldError>,
}

impl Resolved {
    fn value(value: Value) -> Self {
        Resolved { value, errors: vec![] }
    }

    fn failure(path: Vec<PathSegment>, error: &ApplicationError) -> Self {
        Resolved { value: Value::Null, errors: vec![FieldError::new(path, error)] }
    }
}

/**
 * Object types of the response. Scalars come from `EntityFields`, fields computed through further
 * backend calls from `derived`.
 */
trait ObjectValue: EntityFields + Send + Sync {
    /**
     * Starts resolving a derived field.
     *
     * # Returns
     * `None` when the type has no derived field of that name.
     */
    fn derived<'a>(&'a self, _dispatcher: &'a QueryDispatcher, _field: &'a Field, _path: &[PathSegment]) -> Option<BoxFuture<'a, Resolved>> {
        None
    }
}

impl ObjectValue for User {}
impl ObjectValue for Report {}
impl ObjectValue for Favorite {}
impl ObjectValue for Booking {}
impl ObjectValue for Statistic {}
impl ObjectValue for FeedEntry {}

impl ObjectValue for Establishment {
    fn derived<'a>(&'a self, dispatcher: &'a QueryDispatcher, field: &'a Field, path: &[PathSegment]) -> Option<BoxFuture<'a, Resolved>> {
        let path = path.to_vec();
        let future = match field.lookup_name().as_str() {
            "reports" => async move {
                if let Err(err) = check_selection(field, "Report", true) {
                    return Resolved::failure(path, &err);
                }
                match dispatcher.relations.reports_of(&self.id).await {
                    Ok(Some(reports)) => dispatcher.complete_list(&reports, field, path).await,
                    Ok(None) => Resolved::value(Value::Null),
                    Err(err) => Resolved::failure(path, &err),
                }
            }
            .boxed(),
            "bookinglist" => async move {
                if let Err(err) = check_selection(field, "Booking", true) {
                    return Resolved::failure(path, &err);
                }
                match dispatcher.relations.bookings_of(&self.id).await {
                    Ok(Some(bookings)) => dispatcher.complete_list(&bookings, field, path).await,
                    Ok(None) => Resolved::value(Value::Null),
                    Err(err) => Resolved::failure(path, &err),
                }
            }
            .boxed(),
            "bookings" => async move {
                let total: Result<Option<i64>, ApplicationError> = async {
                    check_selection(field, "Int", false)?;
                    let scope = booking_scope(&field.arguments)?;
                    dispatcher.aggregation.booking_total(&self.id, &scope).await
                }
                .await;
                match total {
                    Ok(total) => Resolved::value(total.map_or(Value::Null, Value::from)),
                    Err(err) => Resolved::failure(path, &err),
                }
            }
            .boxed(),
            "statistics" => async move {
                if let Err(err) = check_selection(field, "Statistic", true) {
                    return Resolved::failure(path, &err);
                }
                match dispatcher.aggregation.statistics(&self.id).await {
                    Ok(Some(statistic)) => dispatcher.complete_object(&statistic, field, path).await,
                    Ok(None) => Resolved::value(Value::Null),
                    Err(err) => Resolved::failure(path, &err),
                }
            }
            .boxed(),
            _ => return None,
        };
        Some(future)
    }
}

/**
 * Executes operations against the backends.
 *
 * Only requested fields are resolved. Each derived field is resolved once per parent entity, sibling
 * fields and list elements concurrently. A failing field becomes null with an error entry, its siblings
 * are unaffected. Nothing is kept between requests.
 */
#[derive(Clone)]
pub struct QueryDispatcher {
    clients: BackendClients,
    relations: RelationResolver,
    aggregation: AggregationEngine,
    identity: Arc<dyn IdentityClient>,
    feed: Arc<dyn FeedClient>,
    publisher: Arc<dyn BookingPublisher>,
}

impl QueryDispatcher {
    pub fn new(clients: BackendClients, identity: Arc<dyn IdentityClient>, feed: Arc<dyn FeedClient>, publisher: Arc<dyn BookingPublisher>) -> Self {
        let relations = RelationResolver::new(clients.clone());
        let aggregation = AggregationEngine::new(relations.clone());
        QueryDispatcher { clients, relations, aggregation, identity, feed, publisher }
    }

    /**
     * Executes an operation.
     *
     * Query root fields run concurrently. Mutation root fields run one after the other in document order.
     */
    pub async fn execute(&self, operation: &Operation, context: &RequestContext) -> ExecutionOutput {
        let resolved = match operation.kind {
            OperationKind::Query => join_all(operation.selection.iter().map(|field| self.resolve_query_field(field, context))).await,
            OperationKind::Mutation => {
                let mut resolved = Vec::with_capacity(operation.selection.len());
                for field in &operation.selection {
                    resolved.push(self.resolve_mutation_field(field).await);
                }
                resolved
            }
        };
        let (data, errors) = collect_fields(&operation.selection, resolved);
        debug!(operation = operation.name.as_deref().unwrap_or("anonymous"), fields = data.len(), errors = errors.len(), "Executed operation");
        ExecutionOutput { data, errors }
    }

    async fn resolve_query_field(&self, field: &Field, context: &RequestContext) -> Resolved {
        let path = vec![PathSegment::Key(field.response_key().to_string())];
        let arguments = &field.arguments;
        match field.lookup_name().as_str() {
            "__typename" => leaf(field, Value::String("Query".to_string()), path),
            "allusers" => self.list(field, path, "User", || self.clients.users.fetch_all()).await,
            "finduser" => self.single(field, path, "User", || async { self.clients.users.fetch_by_id(&arguments.required_id(&["id", "UserID"])?).await }).await,
            "allestablishments" | "allestablishtmets" => self.list(field, path, "Establishment", || self.clients.establishments.fetch_all()).await,
            "findestablishment" => self.single(field, path, "Establishment", || async { self.clients.establishments.fetch_by_id(&arguments.required_id(&["id", "EstablishmentID"])?).await }).await,
            "allreports" => self.list(field, path, "Report", || self.clients.reports.fetch_all()).await,
            "findreports" => self.list(field, path, "Report", || async { self.relations.all_reports_of(&arguments.required_id(&["EstablishmentID", "id"])?).await }).await,
            "favoritesbyid" => self.list(field, path, "Favorite", || async { self.relations.favorites_of(&arguments.required_id(&["UserID", "id"])?).await }).await,
            "findfavorites" => self.list(field, path, "Establishment", || async { self.relations.favorite_establishments(&arguments.required_id(&["UserID", "id"])?).await }).await,
            "allbookings" => self.list(field, path, "Booking", || self.clients.bookings.fetch_all()).await,
            "gettotalbooking" => {
                let total: Result<Option<i64>, ApplicationError> = async {
                    check_selection(field, "Int", false)?;
                    let establishment_id = arguments.required_id(&["EstablishmentID", "id"])?;
                    let scope = booking_scope(arguments)?;
                    self.aggregation.booking_total(&establishment_id, &scope).await
                }
                .await;
                match total {
                    Ok(total) => Resolved::value(total.map_or(Value::Null, Value::from)),
                    Err(err) => Resolved::failure(path, &err),
                }
            }
            "gettweets" => self.tweets(field, path).await,
            "verifytoken" => {
                let token: Result<Token, ApplicationError> = async {
                    check_selection(field, "Token", false)?;
                    let token = arguments.optional_string(&["token"])?.or_else(|| context.bearer_token.clone()).ok_or_else(|| ApplicationError::validation("Argument 'token' is required"))?;
                    self.identity.verify_token(&token).await
                }
                .await;
                token_value(token, path)
            }
            _ => unknown_field(field, "Query", path),
        }
    }

    async fn resolve_mutation_field(&self, field: &Field) -> Resolved {
        let path = vec![PathSegment::Key(field.response_key().to_string())];
        let arguments = &field.arguments;
        match field.lookup_name().as_str() {
            "__typename" => leaf(field, Value::String("Mutation".to_string()), path),
            "adduser" | "signup" => {
                let token: Result<Token, ApplicationError> = async {
                    check_selection(field, "Token", false)?;
                    let input = UserAddInputType::try_from(arguments)?;
                    self.identity.sign_up(&input).await
                }
                .await;
                token_value(token, path)
            }
            "signin" => {
                let token: Result<Token, ApplicationError> = async {
                    check_selection(field, "Token", false)?;
                    let input = SignInInputType::try_from(arguments)?;
                    self.identity.sign_in(&input).await
                }
                .await;
                token_value(token, path)
            }
            "addestablishment" => {
                self.single(field, path, "Establishment", || async {
                    let input = EstablishmentAddInputType::try_from(arguments)?;
                    self.clients.establishments.create(&input).await.map(Some)
                })
                .await
            }
            "addreport" => {
                self.single(field, path, "Report", || async {
                    let input = ReportAddInputType::try_from(arguments)?;
                    self.clients.reports.create(&input).await.map(Some)
                })
                .await
            }
            "addfavorite" => {
                self.single(field, path, "Favorite", || async {
                    let input = FavoriteAddInputType::try_from(arguments)?;
                    self.clients.favorites.create(&input).await.map(Some)
                })
                .await
            }
            "addbooking" => {
                self.single(field, path, "Booking", || async {
                    let input = BookingAddInputType::try_from(arguments)?;
                    let created = self.clients.bookings.create(&input).await;
                    created.map(|booking| {
                        self.publish(booking.clone());
                        Some(booking)
                    })
                })
                .await
            }
            _ => unknown_field(field, "Mutation", path),
        }
    }

    /**
     * Hands a created booking to the publisher without waiting for it. Failures are only logged.
     */
    fn publish(&self, booking: Booking) {
        let publisher = self.publisher.clone();
        tokio::spawn(
            async move {
                if let Err(err) = publisher.publish(&booking).await {
                    warn!("Booking for establishment {} was not published: {}", booking.establishment_id, err.message);
                }
            }
            .in_current_span(),
        );
    }

    /**
     * Feed search. A malformed feed answer gives an empty list next to the error.
     */
    async fn tweets(&self, field: &Field, path: Vec<PathSegment>) -> Resolved {
        if let Err(err) = check_selection(field, "FeedEntry", true) {
            return Resolved::failure(path, &err);
        }
        let text = match field.arguments.required_string(&["text"]) {
            Ok(text) => text,
            Err(err) => return Resolved::failure(path, &err),
        };
        match self.feed.search(&text).await {
            Ok(entries) => self.complete_list(&entries, field, path).await,
            Err(err) if err.error_type == ErrorType::MalformedResponse => Resolved { value: Value::Array(vec![]), errors: vec![FieldError::new(path, &err)] },
            Err(err) => Resolved::failure(path, &err),
        }
    }

    /**
     * Root field returning a list of objects. The selection is checked before anything is fetched.
     */
    async fn list<T, F, Fut>(&self, field: &Field, path: Vec<PathSegment>, type_name: &str, fetch: F) -> Resolved
    where
        T: ObjectValue,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, ApplicationError>>,
    {
        if let Err(err) = check_selection(field, type_name, true) {
            return Resolved::failure(path, &err);
        }
        match fetch().await {
            Ok(items) => self.complete_list(&items, field, path).await,
            Err(err) => Resolved::failure(path, &err),
        }
    }

    /**
     * Root field returning one object or null.
     */
    async fn single<T, F, Fut>(&self, field: &Field, path: Vec<PathSegment>, type_name: &str, fetch: F) -> Resolved
    where
        T: ObjectValue,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, ApplicationError>>,
    {
        if let Err(err) = check_selection(field, type_name, true) {
            return Resolved::failure(path, &err);
        }
        match fetch().await {
            Ok(Some(item)) => self.complete_object(&item, field, path).await,
            Ok(None) => Resolved::value(Value::Null),
            Err(err) => Resolved::failure(path, &err),
        }
    }

    fn complete_list<'a, T: ObjectValue>(&'a self, items: &'a [T], field: &'a Field, path: Vec<PathSegment>) -> BoxFuture<'a, Resolved> {
        async move {
            let elements = join_all(items.iter().enumerate().map(|(index, item)| {
                let mut element_path = path.clone();
                element_path.push(PathSegment::Index(index));
                self.complete_object(item, field, element_path)
            }))
            .await;
            let mut values = Vec::with_capacity(elements.len());
            let mut errors = vec![];
            for element in elements {
                values.push(element.value);
                errors.extend(element.errors);
            }
            Resolved { value: Value::Array(values), errors }
        }
        .boxed()
    }

    fn complete_object<'a, T: ObjectValue>(&'a self, object: &'a T, field: &'a Field, path: Vec<PathSegment>) -> BoxFuture<'a, Resolved> {
        async move {
            if let Err(err) = check_selection(field, object.type_name(), true) {
                return Resolved::failure(path, &err);
            }
            let members = join_all(field.selection.iter().map(|member| {
                let mut member_path = path.clone();
                member_path.push(PathSegment::Key(member.response_key().to_string()));
                self.complete_member(object, member, member_path)
            }))
            .await;
            let (data, errors) = collect_fields(&field.selection, members);
            Resolved { value: Value::Object(data), errors }
        }
        .boxed()
    }

    fn complete_member<'a, T: ObjectValue>(&'a self, object: &'a T, field: &'a Field, path: Vec<PathSegment>) -> BoxFuture<'a, Resolved> {
        let name = field.lookup_name();
        if name == "__typename" {
            return ready(leaf(field, Value::String(object.type_name().to_string()), path)).boxed();
        }
        if let Some(derived) = object.derived(self, field, &path) {
            return derived;
        }
        let resolved = match object.scalar_field(&name) {
            Some(value) => leaf(field, value, path),
            None => unknown_field(field, object.type_name(), path),
        };
        ready(resolved).boxed()
    }
}

/**
 * Puts field values under their response keys, in request order.
 */
fn collect_fields(fields: &[Field], resolved: Vec<Resolved>) -> (Map<String, Value>, Vec<FieldError>) {
    let mut data = Map::new();
    let mut errors = vec![];
    for (field, resolved) in fields.iter().zip(resolved) {
        data.insert(field.response_key().to_string(), resolved.value);
        errors.extend(resolved.errors);
    }
    (data, errors)
}

/**
 * Objects need a selection of subfields, scalars must not have one.
 */
fn check_selection(field: &Field, type_name: &str, object: bool) -> Result<(), ApplicationError> {
    match (object, field.selection.is_empty()) {
        (true, true) => Err(ApplicationError::validation(format!("Field '{}' of type '{type_name}' must have a selection of subfields", field.name))),
        (false, false) => Err(ApplicationError::validation(format!("Field '{}' must not have a selection since type '{type_name}' has no subfields", field.name))),
        _ => Ok(()),
    }
}

fn leaf(field: &Field, value: Value, path: Vec<PathSegment>) -> Resolved {
    match check_selection(field, "scalar", false) {
        Ok(()) => Resolved::value(value),
        Err(err) => Resolved::failure(path, &err),
    }
}

fn unknown_field(field: &Field, type_name: &str, path: Vec<PathSegment>) -> Resolved {
    Resolved::failure(path, &ApplicationError::validation(format!("Cannot query field '{}' on type '{type_name}'", field.name)))
}

fn token_value(token: Result<Token, ApplicationError>, path: Vec<PathSegment>) -> Resolved {
    match token {
        Ok(Token(value)) => Resolved::value(value),
        Err(err) => Resolved::failure(path, &err),
    }
}

/**
 * Optional `Date` and `Hour` arguments of booking totals.
 */
fn booking_scope(arguments: &Arguments) -> Result<BookingScope, ApplicationError> {
    let date = arguments.optional_string(&["Date"])?;
    if let Some(date) = &date {
        validate_date(date)?;
    }
    Ok(BookingScope { date, hour: arguments.optional_string(&["Hour", "block"])? })
}
