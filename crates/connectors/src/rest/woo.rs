use crate::rest::{
    DestinationApi,
    error::ApiError,
    wire::{BatchRequest, BatchResponse, MetaQuery},
};
use async_trait::async_trait;
use model::{execution::destination::DestinationEndpoint, records::product::ProductData};
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use tracing::debug;

const API_PREFIX: &str = "wp-json/wc/v3";

/// WooCommerce REST v3 catalog, authenticated with the consumer key/secret
/// pair over basic auth.
pub struct WooCommerceApi {
    client: reqwest::Client,
    endpoint: DestinationEndpoint,
    root: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl WooCommerceApi {
    pub fn new(endpoint: DestinationEndpoint, client: reqwest::Client) -> Self {
        let root = format!("{}/{API_PREFIX}", endpoint.base_url.trim_end_matches('/'));
        WooCommerceApi {
            client,
            endpoint,
            root,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.root)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request
            .basic_auth(&self.endpoint.consumer_key, Some(&self.endpoint.consumer_secret))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(err) if !err.message.is_empty() => format!("{}: {}", err.code, err.message),
            _ => status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
        };
        Err(ApiError::classify(Some(status.as_u16()), message))
    }
}

#[async_trait]
impl DestinationApi for WooCommerceApi {
    fn key(&self) -> &str {
        &self.endpoint.id
    }

    async fn ping(&self) -> Result<(), ApiError> {
        let request = self
            .client
            .get(self.url("products"))
            .query(&[("per_page", "1"), ("_fields", "id")]);
        self.send(request).await.map(|_| ())
    }

    async fn find_by_meta(
        &self,
        query: &MetaQuery,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ProductData>, ApiError> {
        let mut params: Vec<(&str, String)> = vec![
            ("meta_key", query.key.clone()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
            ("orderby", "id".to_string()),
            ("order", "asc".to_string()),
            ("status", "any".to_string()),
        ];
        params.extend(query.values.iter().map(|v| ("meta_value[]", v.clone())));

        debug!(key = %query.key, values = query.values.len(), page, "Looking up products by meta");
        let request = self.client.get(self.url("products")).query(&params);
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    async fn batch(&self, request: &BatchRequest) -> Result<BatchResponse, ApiError> {
        let http = self
            .client
            .post(self.url("products/batch"))
            .query(&[("force", "true")])
            .json(request);
        let response = self.send(http).await?;
        Ok(response.json().await?)
    }
}
