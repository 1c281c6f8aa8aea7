use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StoreError;
use crate::filter::{Filter, Query};
use crate::model::Row;
use crate::remote::types::{encode_filters, encode_query, ErrorBody, REST_PREFIX, REST_VERSION};
use crate::store::RecordStore;

/// `RecordStore` over the hosted backend's REST surface.
#[derive(Debug, Clone)]
pub struct RestStore {
    base: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::Transient(e.to_string())
}

impl RestStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}/{}", self.base, REST_PREFIX, REST_VERSION, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, self.url(path));
        if let Some(key) = &self.api_key {
            req = req.header("apikey", key).bearer_auth(key);
        }
        req
    }

    async fn send<Resp: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<Resp, StoreError> {
        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();

        if !status.is_success() {
            let raw = resp.text().await.map_err(transport)?;
            return Err(match serde_json::from_str::<ErrorBody>(&raw) {
                Ok(body) => body.into_error(),
                Err(_) if status.is_server_error() => StoreError::Transient(format!("HTTP error: {}", status)),
                Err(_) => StoreError::rejected(status.as_str(), raw),
            });
        }

        resp.json::<Resp>().await.map_err(transport)
    }
}

impl RecordStore for RestStore {
    async fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        let req = self.request(reqwest::Method::GET, table).query(&encode_query(query));
        self.send(req).await
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        let req = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&row);
        let mut rows: Vec<Row> = self.send(req).await?;
        rows.pop()
            .ok_or_else(|| StoreError::rejected("empty_reply", format!("insert into '{}' returned no row", table)))
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError> {
        let req = self
            .request(reqwest::Method::PATCH, table)
            .query(&encode_filters(filters))
            .header("Prefer", "return=representation")
            .json(&patch);
        self.send(req).await
    }

    async fn call_procedure(&self, name: &str, args: Value) -> Result<Value, StoreError> {
        let req = self.request(reqwest::Method::POST, &format!("rpc/{}", name)).json(&args);
        self.send(req).await
    }
}
