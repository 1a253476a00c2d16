use std::time::Duration;

use async_trait::async_trait;
use prometheus::IntCounterVec;
use quick_xml::{Reader, escape::escape, events::Event};
use reqwest::{Client, Url, header::CONTENT_TYPE};
use tracing::{debug, warn};

use crate::{
    client::rest::status_error,
    model::{
        apperror::{ApplicationError, ErrorType},
        config::FeedConfig,
        models::FeedEntry,
    },
};

const DOMAIN: &str = "feed";
const SOAP_ENVELOPE_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SEARCH_OPERATION: &str = "searchTweets";

/**
 * External feed search.
 */
#[async_trait]
pub trait FeedClient: Send + Sync {
    /**
     * Searches the feed for entries matching a text.
     *
     * # Returns
     * Entries in the order the feed returned them. A malformed answer is a `MalformedResponse` error.
     */
    async fn search(&self, text: &str) -> Result<Vec<FeedEntry>, ApplicationError>;
}

/**
 * Feed client posting SOAP 1.1 envelopes.
 */
pub struct SoapFeedClient {
    client: Client,
    url: Url,
    namespace: String,
    soap_action: String,
    failures: IntCounterVec,
}

impl SoapFeedClient {
    pub fn new(config: &FeedConfig, failures: IntCounterVec) -> Result<Self, ApplicationError> {
        let url = Url::parse(&config.url).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Invalid url for feed service: {err}")))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create http client for feed service: {err}")))?;
        Ok(SoapFeedClient { client, url, namespace: config.namespace.clone(), soap_action: config.soap_action.clone(), failures })
    }
}

#[async_trait]
impl FeedClient for SoapFeedClient {
    async fn search(&self, text: &str) -> Result<Vec<FeedEntry>, ApplicationError> {
        let result: Result<Vec<FeedEntry>, ApplicationError> = async {
            debug!(domain = DOMAIN, method = "POST", path = self.url.path(), "Calling backend");
            let response = self
                .client
                .post(self.url.clone())
                .header(CONTENT_TYPE, "text/xml; charset=utf-8")
                .header("SOAPAction", format!("\"{}\"", self.soap_action))
                .body(search_envelope(&self.namespace, text))
                .send()
                .await
                .map_err(|err| ApplicationError::backend_unavailable(format!("{DOMAIN} service is unavailable: {err}")))?;
            let status = response.status();
            let body = response.text().await.map_err(|err| ApplicationError::backend_unavailable(format!("{DOMAIN} service response could not be read: {err}")))?;
            if !status.is_success() {
                // Faults come with status 500 and still carry an envelope.
                return Err(match parse_envelope(&body) {
                    Err(fault) if fault.error_type == ErrorType::BackendUnavailable => fault,
                    _ => status_error(DOMAIN, status, body.as_bytes()),
                });
            }
            parse_envelope(&body)
        }
        .await;
        if let Err(err) = &result {
            warn!(domain = DOMAIN, "Backend call failed: {}", err.message);
            self.failures.with_label_values(&[DOMAIN]).inc();
        }
        result
    }
}

/**
 * Builds the request envelope carrying the search text.
 */
pub fn search_envelope(namespace: &str, text: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><soap:Envelope xmlns:soap="{SOAP_ENVELOPE_NAMESPACE}"><soap:Body><tns:{SEARCH_OPERATION} xmlns:tns="{}"><tns:text>{}</tns:text></tns:{SEARCH_OPERATION}></soap:Body></soap:Envelope>"#,
        escape(namespace),
        escape(text)
    )
}

/**
 * Reads the entries out of a response envelope.
 *
 * Expected shape, prefixes ignored: `Envelope > Body > {response} > {result}*`, every result
 * carrying `id`, `text` and optionally `author`. A `Fault` body is reported as `BackendUnavailable`,
 * everything else that does not fit is `MalformedResponse`.
 */
pub fn parse_envelope(xml: &str) -> Result<Vec<FeedEntry>, ApplicationError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut state = EnvelopeState::default();
    loop {
        match reader.read_event().map_err(|err| malformed(format!("Feed envelope is not well formed: {err}")))? {
            Event::Start(element) => state.open(local_name(element.local_name().as_ref()))?,
            Event::Empty(element) => {
                state.open(local_name(element.local_name().as_ref()))?;
                state.close()?;
            }
            Event::End(_) => state.close()?,
            Event::Text(content) => state.text.push_str(&content.unescape().map_err(|err| malformed(format!("Feed envelope has invalid text: {err}")))?),
            Event::CData(content) => state.text.push_str(&String::from_utf8_lossy(&content)),
            Event::Eof => break,
            _ => {}
        }
    }
    state.finish()
}

fn local_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn malformed(message: String) -> ApplicationError {
    ApplicationError::malformed_response(message)
}

#[derive(Default)]
struct PartialEntry {
    id: Option<String>,
    text: Option<String>,
    author: Option<String>,
}

/**
 * Element path and collected values while reading an envelope.
 */
#[derive(Default)]
struct EnvelopeState {
    path: Vec<String>,
    text: String,
    saw_body: bool,
    fault: Option<String>,
    entry: Option<PartialEntry>,
    entries: Vec<FeedEntry>,
}

impl EnvelopeState {
    fn in_body(&self) -> bool {
        self.path.get(1).is_some_and(|name| name == "Body")
    }

    fn in_response(&self) -> bool {
        self.in_body() && self.path.get(2).is_some_and(|name| name != "Fault")
    }

    fn open(&mut self, name: String) -> Result<(), ApplicationError> {
        match self.path.len() {
            0 if name != "Envelope" => return Err(malformed(format!("Feed answer is not an envelope, root element is {name}"))),
            1 if name == "Body" => self.saw_body = true,
            2 if self.in_body() && name == "Fault" => self.fault = Some(String::new()),
            3 if self.in_response() => self.entry = Some(PartialEntry::default()),
            _ => {}
        }
        self.path.push(name);
        self.text.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<(), ApplicationError> {
        let name = self.path.pop().ok_or_else(|| malformed("Feed envelope closes more elements than it opens".to_string()))?;
        let text = std::mem::take(&mut self.text);
        let depth = self.path.len();
        if self.fault.is_some() && (name == "faultstring" || name == "Text") && !text.is_empty() {
            self.fault = Some(text);
            return Ok(());
        }
        if depth == 4 && self.in_response() {
            if let Some(entry) = self.entry.as_mut() {
                match name.to_ascii_lowercase().as_str() {
                    "id" => entry.id = Some(text),
                    "text" => entry.text = Some(text),
                    "author" => entry.author = Some(text),
                    _ => {}
                }
            }
        } else if depth == 3 && self.in_response() {
            if let Some(entry) = self.entry.take() {
                let (Some(id), Some(text)) = (entry.id, entry.text) else {
                    return Err(malformed(format!("Feed result {name} lacks id or text")));
                };
                self.entries.push(FeedEntry { id, text, author: entry.author.unwrap_or_default() });
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<FeedEntry>, ApplicationError> {
        if !self.path.is_empty() {
            return Err(malformed("Feed envelope ends before it is closed".to_string()));
        }
        if let Some(fault) = self.fault {
            let fault = if fault.is_empty() { "unknown fault".to_string() } else { fault };
            return Err(ApplicationError::backend_unavailable(format!("{DOMAIN} service fault: {fault}")));
        }
        if !self.saw_body {
            return Err(malformed("Feed envelope has no body".to_string()));
        }
        Ok(self.entries)
    }
}
