use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use actix_web::{App, HttpServer, web};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    client::{BackendClient, feed::FeedClient, identity::IdentityClient, queue::BookingPublisher, rest::matches_key},
    model::{
        apperror::ApplicationError,
        models::{Booking, Establishment, FeedEntry, Report, SignInInputType, Token, UserAddInputType},
    },
};

/**
 * In memory backend. Counts calls and can be switched to unavailable.
 */
pub struct FakeClient<E> {
    domain: &'static str,
    items: Mutex<Vec<E>>,
    unavailable: AtomicBool,
    calls: AtomicUsize,
    foreign_key_calls: AtomicUsize,
    creates: AtomicUsize,
}

impl<E: Clone> FakeClient<E> {
    pub fn new(domain: &'static str, items: Vec<E>) -> Self {
        FakeClient { domain, items: Mutex::new(items), unavailable: AtomicBool::new(false), calls: AtomicUsize::new(0), foreign_key_calls: AtomicUsize::new(0), creates: AtomicUsize::new(0) }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /**
     * Number of calls of any kind.
     */
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn foreign_key_calls(&self) -> usize {
        self.foreign_key_calls.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<Vec<E>, ApplicationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ApplicationError::backend_unavailable(format!("{} service is unavailable: connection refused", self.domain)));
        }
        Ok(self.items.lock().unwrap().clone())
    }
}

#[async_trait]
impl<E, I> BackendClient<E, I> for FakeClient<E>
where
    E: Clone + Serialize + DeserializeOwned + Send + Sync,
    I: Serialize + Sync,
{
    async fn fetch_all(&self) -> Result<Vec<E>, ApplicationError> {
        self.enter()
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<E>, ApplicationError> {
        let items = self.enter()?;
        Ok(items.into_iter().find(|item| matches_key(&serde_json::to_value(item).unwrap(), "id", id)))
    }

    /**
     * Answers with the whole collection, like a backend without filter support.
     */
    async fn fetch_by_foreign_key(&self, _key: &str, _value: &str) -> Result<Vec<E>, ApplicationError> {
        self.foreign_key_calls.fetch_add(1, Ordering::SeqCst);
        self.enter()
    }

    async fn create(&self, input: &I) -> Result<E, ApplicationError> {
        self.enter()?;
        let mut value = serde_json::to_value(input).unwrap();
        let next_id = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        if let Value::Object(object) = &mut value {
            object.entry("id").or_insert_with(|| json!(format!("{}-{next_id}", self.domain)));
        }
        let created: E = serde_json::from_value(value).unwrap();
        self.items.lock().unwrap().push(created.clone());
        Ok(created)
    }
}

/**
 * Identity service answering every call with a token naming the call.
 */
#[derive(Default)]
pub struct FakeIdentity {
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl IdentityClient for FakeIdentity {
    async fn sign_up(&self, input: &UserAddInputType) -> Result<Token, ApplicationError> {
        self.calls.lock().unwrap().push(format!("sign-up:{}", input.email));
        Ok(Token(json!({"token": "signed-up"})))
    }

    async fn sign_in(&self, input: &SignInInputType) -> Result<Token, ApplicationError> {
        self.calls.lock().unwrap().push(format!("sign-in:{}", input.email));
        Ok(Token(json!({"token": "signed-in"})))
    }

    async fn verify_token(&self, token: &str) -> Result<Token, ApplicationError> {
        self.calls.lock().unwrap().push(format!("verify-token:{token}"));
        Ok(Token(json!({"valid": true})))
    }
}

/**
 * Feed answering with a fixed result.
 */
pub struct FakeFeed {
    pub result: Result<Vec<FeedEntry>, ApplicationError>,
}

#[async_trait]
impl FeedClient for FakeFeed {
    async fn search(&self, _text: &str) -> Result<Vec<FeedEntry>, ApplicationError> {
        self.result.clone()
    }
}

/**
 * Publisher forwarding bookings to a channel, or failing every time.
 */
pub struct FakePublisher {
    pub sender: UnboundedSender<Booking>,
    pub failing: bool,
}

#[async_trait]
impl BookingPublisher for FakePublisher {
    async fn publish(&self, booking: &Booking) -> Result<(), ApplicationError> {
        if self.failing {
            return Err(ApplicationError::backend_unavailable("queue is unavailable"));
        }
        self.sender.send(booking.clone()).map_err(|err| ApplicationError::backend_unavailable(err.to_string()))
    }
}

pub fn establishment(id: &str, name: &str) -> Establishment {
    serde_json::from_value(json!({"EstablishmentID": id, "UserID": 1, "EstablishmentName": name, "Capacity": 20, "City": 1})).unwrap()
}

pub fn report(id: &str, establishment_id: &str, internet_quality: f64, score_establishment: f64) -> Report {
    serde_json::from_value(json!({"id": id, "EstablishmentID": establishment_id, "UserID": 1, "InternetQuality": internet_quality, "ScoreEstablishment": score_establishment, "Review": "ok"})).unwrap()
}

pub fn booking(establishment_id: &str, date: &str, hour: &str, number_of_people: i64) -> Booking {
    serde_json::from_value(json!({"UserID": 1, "EstablishmentID": establishment_id, "Date": date, "Hour": hour, "NumberofPeople": number_of_people})).unwrap()
}

/**
 * Starts a local HTTP server on an ephemeral port standing in for a backend service.
 * Must run inside an actix system, e.g. an `#[actix_web::test]`.
 *
 * # Returns
 * Base address such as `http://127.0.0.1:41234`.
 */
pub fn stub_backend<F>(configure: F) -> String
where
    F: Fn(&mut web::ServiceConfig) + Clone + Send + 'static,
{
    let server = HttpServer::new(move || App::new().configure(configure.clone())).workers(1).disable_signals().bind(("127.0.0.1", 0)).unwrap();
    let address = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    format!("http://{address}")
}
