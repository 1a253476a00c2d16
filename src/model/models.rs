use chrono::{DateTime, NaiveDate};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{DeserializeOwned, Error as _},
};
use serde_json::{Number, Value};

use crate::{graphql::document::Arguments, model::apperror::ApplicationError};

/**
 * Read access to the scalar fields of an entity by their exposed name.
 */
pub trait EntityFields {
    /**
     * Type name answered for `__typename`.
     */
    fn type_name(&self) -> &'static str;

    /**
     * Returns the value of a scalar field.
     *
     * # Arguments
     * `field`: Lower case field name.
     *
     * # Returns
     * `None` when the type has no such scalar field, `Some(Value::Null)` when the field exists but is absent.
     */
    fn scalar_field(&self, field: &str) -> Option<Value>;
}

/***************** Entities *********************/

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "UserID", alias = "userId", alias = "user_id", deserialize_with = "deserialize_id", serialize_with = "serialize_id")]
    pub id: String,
    #[serde(rename = "UserName", alias = "userName", alias = "username", default)]
    pub user_name: Option<String>,
    #[serde(rename = "Password", alias = "password", default)]
    pub password: Option<String>,
    #[serde(rename = "Email", alias = "email", default)]
    pub email: Option<String>,
    #[serde(rename = "Telephone", alias = "telephone", default)]
    pub telephone: Option<String>,
    #[serde(rename = "UserPhoto", alias = "userPhoto", alias = "userphoto", default)]
    pub user_photo: Option<String>,
    #[serde(rename = "City", alias = "city", default, deserialize_with = "deserialize_optional_integer")]
    pub city: Option<i64>,
}

impl EntityFields for User {
    fn type_name(&self) -> &'static str {
        "User"
    }

    fn scalar_field(&self, field: &str) -> Option<Value> {
        Some(match field {
            "id" => Value::String(self.id.clone()),
            "username" => optional_string(&self.user_name),
            "password" => optional_string(&self.password),
            "email" => optional_string(&self.email),
            "telephone" => optional_string(&self.telephone),
            "userphoto" => optional_string(&self.user_photo),
            "city" => optional_integer(self.city),
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Establishment {
    #[serde(alias = "EstablishmentID", alias = "establishmentId", alias = "establishment_id", deserialize_with = "deserialize_id", serialize_with = "serialize_id")]
    pub id: String,
    #[serde(rename = "UserID", alias = "userId", alias = "userid", alias = "user_id", default, deserialize_with = "deserialize_optional_id")]
    pub user_id: Option<String>,
    #[serde(rename = "EstablishmentName", alias = "establishmentName", alias = "name", default)]
    pub name: Option<String>,
    #[serde(rename = "Opening", alias = "opening", default)]
    pub opening: Option<String>,
    #[serde(rename = "Closing", alias = "closing", default)]
    pub closing: Option<String>,
    #[serde(rename = "Menu", alias = "menu", default)]
    pub menu: Option<String>,
    #[serde(rename = "EstablishmentType", alias = "establishmentType", default)]
    pub establishment_type: Option<String>,
    #[serde(rename = "Capacity", alias = "capacity", default, deserialize_with = "deserialize_optional_integer")]
    pub capacity: Option<i64>,
    #[serde(rename = "InternetQuality", alias = "internetQuality", alias = "internetquality", default, deserialize_with = "deserialize_optional_integer")]
    pub internet_quality: Option<i64>,
    #[serde(rename = "Rating", alias = "rating", default)]
    pub rating: Option<String>,
    #[serde(rename = "Description", alias = "description", default)]
    pub description: Option<String>,
    #[serde(rename = "CoverPicture", alias = "coverPicture", default)]
    pub cover_picture: Option<String>,
    #[serde(rename = "Location", alias = "location", default)]
    pub location: Option<String>,
    #[serde(rename = "City", alias = "city", default, deserialize_with = "deserialize_optional_integer")]
    pub city: Option<i64>,
}

impl EntityFields for Establishment {
    fn type_name(&self) -> &'static str {
        "Establishment"
    }

    fn scalar_field(&self, field: &str) -> Option<Value> {
        Some(match field {
            "id" | "establishmentid" => Value::String(self.id.clone()),
            "userid" => optional_string(&self.user_id),
            "establishmentname" => optional_string(&self.name),
            "opening" => optional_string(&self.opening),
            "closing" => optional_string(&self.closing),
            "menu" => optional_string(&self.menu),
            "establishmenttype" => optional_string(&self.establishment_type),
            "capacity" => optional_integer(self.capacity),
            "internetquality" => optional_integer(self.internet_quality),
            "rating" => optional_string(&self.rating),
            "description" => optional_string(&self.description),
            "coverpicture" => optional_string(&self.cover_picture),
            "location" => optional_string(&self.location),
            "city" => optional_integer(self.city),
            _ => return None,
        })
    }
}

/**
 * A report on an establishment. Both scores are required at ingestion: a report whose
 * scores are missing or not numeric fails decoding instead of counting as zero.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(alias = "ReportID", alias = "reportId", deserialize_with = "deserialize_id", serialize_with = "serialize_id")]
    pub id: String,
    #[serde(rename = "UserID", alias = "userId", alias = "userid", alias = "user_id", default, deserialize_with = "deserialize_optional_id")]
    pub user_id: Option<String>,
    #[serde(rename = "EstablishmentID", alias = "establishmentId", alias = "establishmentid", alias = "establishment_id", deserialize_with = "deserialize_id", serialize_with = "serialize_id")]
    pub establishment_id: String,
    #[serde(rename = "Date", alias = "date", default)]
    pub date: Option<String>,
    #[serde(rename = "InternetQuality", alias = "internetQuality", alias = "internetquality", deserialize_with = "deserialize_score")]
    pub internet_quality: f64,
    #[serde(rename = "CapabilityID", alias = "capabilityId", alias = "capabilityid", default, deserialize_with = "deserialize_optional_id")]
    pub capability_id: Option<String>,
    #[serde(rename = "ScoreEstablishment", alias = "scoreEstablishment", alias = "scoreestablishment", deserialize_with = "deserialize_score")]
    pub score_establishment: f64,
    #[serde(rename = "ScoreReport", alias = "scoreReport", alias = "scorereport", default, deserialize_with = "deserialize_optional_text")]
    pub score_report: Option<String>,
    #[serde(rename = "Review", alias = "review", default)]
    pub review: Option<String>,
}

impl EntityFields for Report {
    fn type_name(&self) -> &'static str {
        "Report"
    }

    fn scalar_field(&self, field: &str) -> Option<Value> {
        Some(match field {
            "id" => Value::String(self.id.clone()),
            "userid" => optional_string(&self.user_id),
            "establishmentid" => Value::String(self.establishment_id.clone()),
            "date" => optional_string(&self.date),
            "internetquality" => float(self.internet_quality),
            "capabilityid" => optional_string(&self.capability_id),
            "scoreestablishment" => float(self.score_establishment),
            "scorereport" => optional_string(&self.score_report),
            "review" => optional_string(&self.review),
            _ => return None,
        })
    }
}

/**
 * Link between a user and an establishment. Duplicates are possible and kept.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    #[serde(alias = "FavoriteID", alias = "favoriteId", default, deserialize_with = "deserialize_optional_id")]
    pub id: Option<String>,
    #[serde(rename = "EstablishmentID", alias = "establishmentId", alias = "establishmentid", alias = "establishment_id", deserialize_with = "deserialize_id", serialize_with = "serialize_id")]
    pub establishment_id: String,
    #[serde(rename = "UserID", alias = "userId", alias = "userid", alias = "user_id", deserialize_with = "deserialize_id", serialize_with = "serialize_id")]
    pub user_id: String,
    #[serde(rename = "City", alias = "city", default, deserialize_with = "deserialize_optional_text")]
    pub city: Option<String>,
}

impl EntityFields for Favorite {
    fn type_name(&self) -> &'static str {
        "Favorite"
    }

    fn scalar_field(&self, field: &str) -> Option<Value> {
        Some(match field {
            "id" => optional_string(&self.id),
            "establishmentid" => Value::String(self.establishment_id.clone()),
            "userid" => Value::String(self.user_id.clone()),
            "city" => optional_string(&self.city),
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    #[serde(alias = "BookingID", alias = "bookingId", default, deserialize_with = "deserialize_optional_id")]
    pub id: Option<String>,
    #[serde(rename = "UserID", alias = "userId", alias = "userid", alias = "user_id", default, deserialize_with = "deserialize_optional_id")]
    pub user_id: Option<String>,
    #[serde(rename = "EstablishmentID", alias = "establishmentId", alias = "establishmentid", alias = "establishment_id", deserialize_with = "deserialize_id", serialize_with = "serialize_id")]
    pub establishment_id: String,
    #[serde(rename = "Date", alias = "date", default)]
    pub date: Option<String>,
    #[serde(rename = "Hour", alias = "hour", alias = "block", default)]
    pub hour: Option<String>,
    #[serde(rename = "NumberofPeople", alias = "numberOfPeople", alias = "numberofpeople", deserialize_with = "deserialize_integer")]
    pub number_of_people: i64,
}

impl EntityFields for Booking {
    fn type_name(&self) -> &'static str {
        "Booking"
    }

    fn scalar_field(&self, field: &str) -> Option<Value> {
        Some(match field {
            "id" => optional_string(&self.id),
            "userid" => optional_string(&self.user_id),
            "establishmentid" => Value::String(self.establishment_id.clone()),
            "date" => optional_string(&self.date),
            "hour" => optional_string(&self.hour),
            "numberofpeople" => Value::from(self.number_of_people),
            _ => return None,
        })
    }
}

/**
 * Averages over the current reports of one establishment. Never persisted.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct Statistic {
    pub iq_average: f64,
    pub se_average: f64,
}

impl EntityFields for Statistic {
    fn type_name(&self) -> &'static str {
        "Statistic"
    }

    fn scalar_field(&self, field: &str) -> Option<Value> {
        Some(match field {
            "iqaverage" => float(self.iq_average),
            "seaverage" => float(self.se_average),
            _ => return None,
        })
    }
}

/**
 * One result element of the external feed.
 */
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedEntry {
    pub id: String,
    pub text: String,
    pub author: String,
}

impl EntityFields for FeedEntry {
    fn type_name(&self) -> &'static str {
        "FeedEntry"
    }

    fn scalar_field(&self, field: &str) -> Option<Value> {
        Some(match field {
            "id" => Value::String(self.id.clone()),
            "text" => Value::String(self.text.clone()),
            "author" => Value::String(self.author.clone()),
            _ => return None,
        })
    }
}

/**
 * Credential artifact returned by the identity service, passed through unmodified.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct Token(pub Value);

fn optional_string(value: &Option<String>) -> Value {
    value.clone().map_or(Value::Null, Value::String)
}

fn optional_integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::from)
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

/***************** Ingestion helpers *********************/

const USER_ID_KEYS: &[&str] = &["UserID", "userId", "userid", "user_id"];
const ESTABLISHMENT_ID_KEYS: &[&str] = &["EstablishmentID", "establishmentId", "establishmentid", "establishment_id"];

/**
 * Groups of payload keys that decode into the same identifier field, highest priority first.
 *
 * Services sometimes send an identifier twice, e.g. `{"id": 3, "EstablishmentID": 3}`. Serde rejects
 * such an object as a duplicate field, so all keys of a group but the first one present are dropped
 * before decoding.
 */
pub trait IdentifierKeys {
    const KEY_GROUPS: &'static [&'static [&'static str]];
}

impl IdentifierKeys for User {
    const KEY_GROUPS: &'static [&'static [&'static str]] = &[&["id", "UserID", "userId", "user_id"]];
}

impl IdentifierKeys for Establishment {
    const KEY_GROUPS: &'static [&'static [&'static str]] = &[&["id", "EstablishmentID", "establishmentId", "establishment_id"], USER_ID_KEYS];
}

impl IdentifierKeys for Report {
    const KEY_GROUPS: &'static [&'static [&'static str]] = &[&["id", "ReportID", "reportId"], USER_ID_KEYS, ESTABLISHMENT_ID_KEYS];
}

impl IdentifierKeys for Favorite {
    const KEY_GROUPS: &'static [&'static [&'static str]] = &[&["id", "FavoriteID", "favoriteId"], USER_ID_KEYS, ESTABLISHMENT_ID_KEYS];
}

impl IdentifierKeys for Booking {
    const KEY_GROUPS: &'static [&'static [&'static str]] = &[&["id", "BookingID", "bookingId"], USER_ID_KEYS, ESTABLISHMENT_ID_KEYS];
}

/**
 * Decodes one entity from a service payload, keeping only the highest priority key of every
 * identifier group.
 */
pub fn decode_entity<E: DeserializeOwned + IdentifierKeys>(mut item: Value) -> Result<E, serde_json::Error> {
    if let Value::Object(object) = &mut item {
        for group in E::KEY_GROUPS {
            if let Some(first) = group.iter().position(|key| object.contains_key(*key)) {
                for key in &group[first + 1..] {
                    object.remove(*key);
                }
            }
        }
    }
    serde_json::from_value(item)
}

/**
 * Identifiers arrive as strings or integers depending on the service. Both are carried as strings.
 */
fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(value),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(D::Error::custom(format!("expected identifier, found {other}"))),
    }
}

fn deserialize_optional_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(value) => Ok(Some(value)),
        Value::Number(number) => Ok(Some(number.to_string())),
        other => Err(D::Error::custom(format!("expected identifier, found {other}"))),
    }
}

/**
 * Identifiers that look like integers are sent back to the services as integers.
 */
fn serialize_id<S: Serializer>(id: &str, serializer: S) -> Result<S::Ok, S::Error> {
    match id.parse::<i64>() {
        Ok(number) if number.to_string() == id => serializer.serialize_i64(number),
        _ => serializer.serialize_str(id),
    }
}

fn deserialize_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let score = match &value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    score.filter(|score| score.is_finite()).ok_or_else(|| D::Error::custom(format!("expected numeric score, found {value}")))
}

fn deserialize_integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    deserialize_optional_integer(deserializer)?.ok_or_else(|| D::Error::custom("expected integer, found null"))
}

fn deserialize_optional_integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(number) => number.as_i64().map(Some).ok_or_else(|| D::Error::custom(format!("expected integer, found {number}"))),
        Value::String(text) => text.trim().parse::<i64>().map(Some).map_err(|_err| D::Error::custom(format!("expected integer, found \"{text}\""))),
        other => Err(D::Error::custom(format!("expected integer, found {other}"))),
    }
}

/**
 * Free text that some services send as numbers.
 */
fn deserialize_optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(value) => Ok(Some(value)),
        Value::Number(number) => Ok(Some(number.to_string())),
        other => Err(D::Error::custom(format!("expected text, found {other}"))),
    }
}

/***************** Mutation inputs *********************/

/**
 * Input for signing up a user. Forwarded to the identity service.
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAddInputType {
    #[serde(rename = "UserName")]
    pub user_name: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Telephone")]
    pub telephone: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "UserPhoto")]
    pub user_photo: String,
    #[serde(rename = "City")]
    pub city: i64,
}

impl TryFrom<&Arguments> for UserAddInputType {
    type Error = ApplicationError;

    fn try_from(arguments: &Arguments) -> Result<Self, Self::Error> {
        let input = UserAddInputType {
            user_name: arguments.required_string(&["UserName"])?,
            password: arguments.required_string(&["Password"])?,
            telephone: arguments.required_string(&["Telephone"])?,
            email: arguments.required_string(&["Email"])?,
            user_photo: arguments.required_string(&["UserPhoto"])?,
            city: arguments.required_integer(&["City"])?,
        };
        validate_email(&input.email)?;
        Ok(input)
    }
}

/**
 * Credentials for signing in. Sent in a request header, never in a body.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct SignInInputType {
    pub email: String,
    pub password: String,
}

impl TryFrom<&Arguments> for SignInInputType {
    type Error = ApplicationError;

    fn try_from(arguments: &Arguments) -> Result<Self, Self::Error> {
        let input = SignInInputType { email: arguments.required_string(&["Email"])?, password: arguments.required_string(&["Password"])? };
        validate_email(&input.email)?;
        Ok(input)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstablishmentAddInputType {
    #[serde(rename = "UserID", serialize_with = "serialize_id")]
    pub user_id: String,
    #[serde(rename = "EstablishmentName")]
    pub name: String,
    #[serde(rename = "Opening")]
    pub opening: String,
    #[serde(rename = "Closing")]
    pub closing: String,
    #[serde(rename = "Menu")]
    pub menu: String,
    #[serde(rename = "EstablishmentType")]
    pub establishment_type: String,
    #[serde(rename = "Capacity")]
    pub capacity: i64,
    #[serde(rename = "InternetQuality")]
    pub internet_quality: i64,
    #[serde(rename = "Rating")]
    pub rating: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "CoverPicture")]
    pub cover_picture: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "City")]
    pub city: i64,
}

impl TryFrom<&Arguments> for EstablishmentAddInputType {
    type Error = ApplicationError;

    fn try_from(arguments: &Arguments) -> Result<Self, Self::Error> {
        let input = EstablishmentAddInputType {
            user_id: arguments.required_id(&["UserID", "user"])?,
            name: arguments.required_string(&["EstablishmentName", "name"])?,
            opening: arguments.required_string(&["Opening"])?,
            closing: arguments.required_string(&["Closing"])?,
            menu: arguments.required_string(&["Menu"])?,
            establishment_type: arguments.required_string(&["EstablishmentType"])?,
            capacity: arguments.required_integer(&["Capacity"])?,
            internet_quality: arguments.required_integer(&["InternetQuality"])?,
            rating: arguments.required_string(&["Rating"])?,
            description: arguments.required_string(&["Description"])?,
            cover_picture: arguments.required_string(&["CoverPicture"])?,
            location: arguments.required_string(&["Location"])?,
            city: arguments.required_integer(&["City"])?,
        };
        if input.capacity <= 0 {
            return Err(ApplicationError::validation("Argument 'Capacity' must be positive"));
        }
        Ok(input)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportAddInputType {
    #[serde(rename = "UserID", serialize_with = "serialize_id")]
    pub user_id: String,
    #[serde(rename = "EstablishmentID", serialize_with = "serialize_id")]
    pub establishment_id: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "InternetQuality")]
    pub internet_quality: f64,
    #[serde(rename = "CapabilityID", serialize_with = "serialize_id")]
    pub capability_id: String,
    #[serde(rename = "ScoreEstablishment")]
    pub score_establishment: f64,
    #[serde(rename = "ScoreReport")]
    pub score_report: String,
    #[serde(rename = "Review")]
    pub review: String,
}

impl TryFrom<&Arguments> for ReportAddInputType {
    type Error = ApplicationError;

    fn try_from(arguments: &Arguments) -> Result<Self, Self::Error> {
        let input = ReportAddInputType {
            user_id: arguments.required_id(&["UserID", "user"])?,
            establishment_id: arguments.required_id(&["EstablishmentID", "establishment"])?,
            date: arguments.required_string(&["Date"])?,
            internet_quality: arguments.required_number(&["InternetQuality"])?,
            capability_id: arguments.required_id(&["CapabilityID"])?,
            score_establishment: arguments.required_number(&["ScoreEstablishment"])?,
            score_report: arguments.required_string(&["ScoreReport"])?,
            review: arguments.required_string(&["Review"])?,
        };
        // Reports carry a timestamp, a plain date is accepted too.
        if NaiveDate::parse_from_str(&input.date, "%Y-%m-%d").is_err() && DateTime::parse_from_rfc3339(&input.date).is_err() {
            return Err(ApplicationError::validation("Argument 'Date' must be a date (YYYY-MM-DD) or an RFC 3339 timestamp"));
        }
        Ok(input)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FavoriteAddInputType {
    #[serde(rename = "EstablishmentID", serialize_with = "serialize_id")]
    pub establishment_id: String,
    #[serde(rename = "UserID", serialize_with = "serialize_id")]
    pub user_id: String,
    #[serde(rename = "City", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl TryFrom<&Arguments> for FavoriteAddInputType {
    type Error = ApplicationError;

    fn try_from(arguments: &Arguments) -> Result<Self, Self::Error> {
        Ok(FavoriteAddInputType {
            establishment_id: arguments.required_id(&["EstablishmentID", "establishment"])?,
            user_id: arguments.required_id(&["UserID", "user"])?,
            city: arguments.optional_id(&["City"])?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingAddInputType {
    #[serde(rename = "UserID", serialize_with = "serialize_id")]
    pub user_id: String,
    #[serde(rename = "EstablishmentID", serialize_with = "serialize_id")]
    pub establishment_id: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Hour")]
    pub hour: String,
    #[serde(rename = "NumberofPeople")]
    pub number_of_people: i64,
}

impl TryFrom<&Arguments> for BookingAddInputType {
    type Error = ApplicationError;

    fn try_from(arguments: &Arguments) -> Result<Self, Self::Error> {
        let input = BookingAddInputType {
            user_id: arguments.required_id(&["UserID", "user"])?,
            establishment_id: arguments.required_id(&["EstablishmentID", "establishment"])?,
            date: arguments.required_string(&["Date"])?,
            hour: arguments.required_string(&["Hour", "block"])?,
            number_of_people: arguments.required_integer(&["NumberofPeople"])?,
        };
        validate_date(&input.date)?;
        if input.number_of_people <= 0 {
            return Err(ApplicationError::validation("Argument 'NumberofPeople' must be positive"));
        }
        Ok(input)
    }
}

pub fn validate_date(date: &str) -> Result<(), ApplicationError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").map(|_date| ()).map_err(|_err| ApplicationError::validation(format!("Argument 'Date' must be a date (YYYY-MM-DD), got '{date}'")))
}

fn validate_email(email: &str) -> Result<(), ApplicationError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ApplicationError::validation("Argument 'Email' must be an email address")),
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_establishment_accepts_historical_casing() {
        let establishment: Establishment = serde_json::from_value(json!({"EstablishmentID": 7, "UserID": 3, "EstablishmentName": "Cafe", "Capacity": "20", "City": 1})).unwrap();
        assert_eq!(establishment.id, "7");
        assert_eq!(establishment.user_id.as_deref(), Some("3"));
        assert_eq!(establishment.capacity, Some(20));
        let establishment: Establishment = serde_json::from_value(json!({"id": "E1", "establishmentName": "Cafe"})).unwrap();
        assert_eq!(establishment.id, "E1");
        assert_eq!(establishment.name.as_deref(), Some("Cafe"));
    }

    #[test]
    fn test_decode_entity_prefers_canonical_identifier() {
        assert!(serde_json::from_value::<Establishment>(json!({"id": 3, "EstablishmentID": 4})).is_err());
        let establishment: Establishment = decode_entity(json!({"EstablishmentID": 4, "id": 3, "UserID": 1, "user_id": 2})).unwrap();
        assert_eq!(establishment.id, "3");
        assert_eq!(establishment.user_id.as_deref(), Some("1"));
        let report: Report = decode_entity(json!({"ReportID": "R2", "id": "R1", "establishment_id": "E2", "EstablishmentID": "E1", "InternetQuality": 1, "ScoreEstablishment": 2})).unwrap();
        assert_eq!(report.id, "R1");
        assert_eq!(report.establishment_id, "E1");
        let user: User = decode_entity(json!({"userId": "U2"})).unwrap();
        assert_eq!(user.id, "U2");
    }

    #[test]
    fn test_report_scores_from_strings_and_numbers() {
        let report: Report = serde_json::from_value(json!({"id": 1, "EstablishmentID": "E1", "InternetQuality": "4", "scoreestablishment": 3.5})).unwrap();
        assert_eq!(report.internet_quality, 4.0);
        assert_eq!(report.score_establishment, 3.5);
    }

    #[test]
    fn test_report_rejects_malformed_scores() {
        assert!(serde_json::from_value::<Report>(json!({"id": 1, "EstablishmentID": "E1", "InternetQuality": "fast", "ScoreEstablishment": 3})).is_err());
        assert!(serde_json::from_value::<Report>(json!({"id": 1, "EstablishmentID": "E1", "ScoreEstablishment": 3})).is_err());
        assert!(serde_json::from_value::<Report>(json!({"id": 1, "EstablishmentID": "E1", "InternetQuality": null, "ScoreEstablishment": 3})).is_err());
    }

    #[test]
    fn test_booking_requires_party_size() {
        assert!(serde_json::from_value::<Booking>(json!({"EstablishmentID": "E1", "Date": "2024-05-01"})).is_err());
        let booking: Booking = serde_json::from_value(json!({"EstablishmentID": 2, "NumberofPeople": "3", "Hour": "08-10"})).unwrap();
        assert_eq!(booking.number_of_people, 3);
        assert_eq!(booking.establishment_id, "2");
    }

    #[test]
    fn test_scalar_fields() {
        let statistic = Statistic { iq_average: 4.0, se_average: 5.0 };
        assert_eq!(statistic.scalar_field("iqaverage"), Some(json!(4.0)));
        assert_eq!(statistic.scalar_field("unknown"), None);
        let favorite = Favorite { id: None, establishment_id: "E1".to_string(), user_id: "U1".to_string(), city: None };
        assert_eq!(favorite.scalar_field("id"), Some(Value::Null));
        assert_eq!(favorite.scalar_field("establishmentid"), Some(json!("E1")));
    }

    #[test]
    fn test_serialize_id_keeps_numeric_ids_numeric() {
        let input = FavoriteAddInputType { establishment_id: "12".to_string(), user_id: "U1".to_string(), city: None };
        assert_eq!(serde_json::to_value(&input).unwrap(), json!({"EstablishmentID": 12, "UserID": "U1"}));
        let input = FavoriteAddInputType { establishment_id: "007".to_string(), user_id: "1".to_string(), city: Some("X".to_string()) };
        assert_eq!(serde_json::to_value(&input).unwrap(), json!({"EstablishmentID": "007", "UserID": 1, "City": "X"}));
    }

    #[test]
    fn test_booking_input_validation() {
        let arguments = Arguments::new(vec![
            ("UserID".to_string(), json!("U1")),
            ("EstablishmentID".to_string(), json!("E1")),
            ("Date".to_string(), json!("2024-13-01")),
            ("Hour".to_string(), json!("08-10")),
            ("NumberofPeople".to_string(), json!(2)),
        ]);
        assert!(BookingAddInputType::try_from(&arguments).is_err());
        let arguments = Arguments::new(vec![
            ("UserID".to_string(), json!("U1")),
            ("EstablishmentID".to_string(), json!("E1")),
            ("Date".to_string(), json!("2024-12-01")),
            ("Hour".to_string(), json!("08-10")),
            ("NumberofPeople".to_string(), json!(0)),
        ]);
        assert!(BookingAddInputType::try_from(&arguments).is_err());
    }

    #[test]
    fn test_favorite_input_short_names() {
        let arguments = Arguments::new(vec![("establishment".to_string(), json!("E1")), ("user".to_string(), json!("U1")), ("city".to_string(), json!("X"))]);
        let input = FavoriteAddInputType::try_from(&arguments).unwrap();
        assert_eq!(input, FavoriteAddInputType { establishment_id: "E1".to_string(), user_id: "U1".to_string(), city: Some("X".to_string()) });
    }

    #[test]
    fn test_report_input_date_formats() {
        let base = vec![
            ("UserID".to_string(), json!(1)),
            ("EstablishmentID".to_string(), json!(2)),
            ("InternetQuality".to_string(), json!(4)),
            ("CapabilityID".to_string(), json!(1)),
            ("ScoreEstablishment".to_string(), json!("5")),
            ("ScoreReport".to_string(), json!("good")),
            ("Review".to_string(), json!("Quiet")),
        ];
        let with_date = |date: &str| {
            let mut values = base.clone();
            values.push(("Date".to_string(), json!(date)));
            Arguments::new(values)
        };
        assert!(ReportAddInputType::try_from(&with_date("2024-05-01")).is_ok());
        assert!(ReportAddInputType::try_from(&with_date("2024-05-01T10:00:00Z")).is_ok());
        assert!(ReportAddInputType::try_from(&with_date("yesterday")).is_err());
    }

    #[test]
    fn test_user_input_requires_email() {
        let arguments = Arguments::new(vec![
            ("UserName".to_string(), json!("ana")),
            ("Password".to_string(), json!("secret")),
            ("Telephone".to_string(), json!("555")),
            ("Email".to_string(), json!("not-an-email")),
            ("UserPhoto".to_string(), json!("ana.png")),
            ("City".to_string(), json!(1)),
        ]);
        let err = UserAddInputType::try_from(&arguments).unwrap_err();
        assert_eq!(err.message, "Argument 'Email' must be an email address");
    }
}
