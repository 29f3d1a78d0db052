use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{Document, DocumentStore};
use crate::config::AppConfig;
use crate::errors::ServiceError;

const PAGE_SIZE: u32 = 300;
/// Guard against a store that keeps returning page tokens.
const MAX_PAGES: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
    update_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    message: Option<String>,
    status: Option<String>,
}

/// Firestore over its REST interface.
#[derive(Clone)]
pub struct FirestoreStore {
    documents_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl FirestoreStore {
    pub fn new(
        api_base: &str,
        project_id: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                api_base.trim_end_matches('/'),
                project_id
            ),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let project = cfg.require_firestore_project()?;
        Self::new(
            &cfg.firestore_api_base,
            project,
            cfg.firestore_api_key.clone(),
            cfg.http_timeout(),
        )
    }

    fn with_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.query(&[("key", key.as_str())]),
            None => request,
        }
    }

    async fn store_error(response: reqwest::Response) -> ServiceError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<GoogleErrorEnvelope>(&body)
            .ok()
            .and_then(|envelope| {
                envelope
                    .error
                    .message
                    .or(envelope.error.status)
            })
            .unwrap_or(body);
        warn!(status = status.as_u16(), "Document store request failed: {}", detail);
        ServiceError::ExternalServiceError(format!(
            "Document store returned {}: {}",
            status.as_u16(),
            detail
        ))
    }

    fn into_document(raw: RawDocument) -> Document {
        let id = raw
            .name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let updated_at = raw
            .update_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));
        Document {
            id,
            fields: decode_fields(&raw.fields),
            updated_at,
        }
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    #[instrument(skip(self, doc), fields(doc_id = %doc.id))]
    async fn create(&self, collection: &str, doc: &Document) -> Result<String, ServiceError> {
        let url = format!("{}/{}", self.documents_url, collection);
        let mut request = self
            .client
            .post(&url)
            .json(&json!({ "fields": encode_fields(&doc.fields) }));
        if !doc.id.is_empty() {
            request = request.query(&[("documentId", doc.id.as_str())]);
        }

        let response = self.with_key(request).send().await?;
        // An earlier attempt committed even though its response never arrived
        if response.status() == reqwest::StatusCode::CONFLICT && !doc.id.is_empty() {
            debug!("Document {}/{} already exists", collection, doc.id);
            return Ok(doc.id.clone());
        }
        if !response.status().is_success() {
            return Err(Self::store_error(response).await);
        }

        let created: RawDocument = response.json().await?;
        let stored = Self::into_document(created);
        debug!("Stored document {}/{}", collection, stored.id);
        Ok(stored.id)
    }

    #[instrument(skip(self))]
    async fn list(&self, collection: &str) -> Result<Vec<Document>, ServiceError> {
        let url = format!("{}/{}", self.documents_url, collection);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut request = self
                .client
                .get(&url)
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = self.with_key(request).send().await?;
            if !response.status().is_success() {
                return Err(Self::store_error(response).await);
            }

            let page: ListResponse = response.json().await?;
            documents.extend(page.documents.into_iter().map(Self::into_document));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => {
                    debug!("Listed {} documents from {}", documents.len(), collection);
                    return Ok(documents);
                }
            }
        }

        warn!("Stopped listing {} after {} pages", collection, MAX_PAGES);
        Ok(documents)
    }
}

/// Decodes a map of typed values (`{"name": {"stringValue": "x"}}`) into plain JSON.
pub fn decode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), decode_value(value)))
        .collect()
}

/// Decodes one typed value, recursing through maps and arrays.
///
/// Unknown value kinds decode to `null`.
pub fn decode_value(value: &Value) -> Value {
    let Some(typed) = value.as_object() else {
        return Value::Null;
    };
    let Some((kind, inner)) = typed.iter().next() else {
        return Value::Null;
    };

    match kind.as_str() {
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        // 64-bit integers travel as strings
        "integerValue" => match inner {
            Value::String(raw) => raw
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| inner.clone()),
            other => other.clone(),
        },
        "doubleValue" => match inner {
            Value::String(raw) => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            other => other.clone(),
        },
        "booleanValue" => inner.clone(),
        "nullValue" => Value::Null,
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .unwrap_or_default(),
        ),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "geoPointValue" => inner.clone(),
        _ => Value::Null,
    }
}

pub fn encode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

/// Encodes plain JSON into typed values. RFC 3339 strings become timestamps.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) if DateTime::parse_from_rfc3339(s).is_ok() => {
            json!({ "timestampValue": s })
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(values) => json!({
            "arrayValue": { "values": values.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}
