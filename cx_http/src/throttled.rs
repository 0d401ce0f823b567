use std::time::Duration;

use cx_throttle::costs::endpoint_key;
use cx_throttle::EndpointCosts;
use cx_throttle::Throttler;
use cx_throttle::ThrottlerConfig;
use cx_throttle::Ticket;
use reqwest::Method;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::warn;

use crate::client::HttpClient;
use crate::client::HttpClientConfig;
use crate::errors::HttpError;
use crate::errors::Result;

/// REST client for one exchange connection
///
/// Every request is charged its endpoint cost against the connection's
/// throttler before it is sent. Requests leave in the order they were made.
pub struct ThrottledClient {
    client: HttpClient,
    base_url: String,
    throttler: Throttler,
    costs: EndpointCosts,
    enable_rate_limit: bool,
    admission_timeout: Option<Duration>,
}

impl ThrottledClient {
    /// Create a new client builder
    pub fn builder(base_url: impl Into<String>, throttler: ThrottlerConfig) -> ThrottledClientBuilder {
        ThrottledClientBuilder::new(base_url.into(), throttler)
    }

    /// Wait for the throttler to admit a call to `method path`
    ///
    /// Returns `None` when rate limiting is disabled.
    pub async fn admit(&self, method: &Method, path: &str, limit: Option<u64>) -> Result<Option<Ticket>> {
        if !self.enable_rate_limit {
            return Ok(None);
        }

        let key = endpoint_key(method.as_str(), path);
        let cost = self.costs.cost(&key, limit);
        let admission = self.throttler.throttle(cost)?;

        let ticket = match self.admission_timeout {
            Some(timeout) => tokio::time::timeout(timeout, admission).await.map_err(|_| {
                warn!(endpoint = %key, cost, ?timeout, "request not admitted in time");
                HttpError::ThrottleTimeout(timeout)
            })??,
            None => admission.await?,
        };

        debug!(endpoint = %key, cost, seq = ticket.seq, tokens = ticket.tokens_after, "request admitted");
        Ok(Some(ticket))
    }

    /// Send a throttled request and decode the JSON response
    ///
    /// A `limit` entry in `query` selects the cost tier for endpoints billed by page size.
    pub async fn request<T: DeserializeOwned>(&self, method: Method, path: &str, query: &[(&str, String)]) -> Result<T> {
        let limit = query_limit(query);
        self.admit(&method, path, limit).await?;

        let url = format!("{}{}", self.base_url, path);
        let response = self.client.request(method, &url).query(query).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            warn!(%url, status = status.as_u16(), "exchange reported rate limit breach");
            return Err(HttpError::RateLimitExceeded(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpError::Status { status: status.as_u16(), body });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Throttled GET
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        self.request(Method::GET, path, query).await
    }

    /// Throttled POST
    pub async fn post<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        self.request(Method::POST, path, query).await
    }

    pub fn throttler(&self) -> &Throttler {
        &self.throttler
    }

    pub fn costs(&self) -> &EndpointCosts {
        &self.costs
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn query_limit(query: &[(&str, String)]) -> Option<u64> {
    query.iter().find(|(name, _)| *name == "limit").and_then(|(_, value)| value.parse().ok())
}

/// Builder for configuring a throttled client
pub struct ThrottledClientBuilder {
    base_url: String,
    throttler: ThrottlerConfig,
    http_config: HttpClientConfig,
    costs: EndpointCosts,
    enable_rate_limit: bool,
    admission_timeout: Option<Duration>,
}

impl ThrottledClientBuilder {
    fn new(base_url: String, throttler: ThrottlerConfig) -> Self {
        Self {
            base_url,
            throttler,
            http_config: HttpClientConfig::default(),
            costs: EndpointCosts::default(),
            enable_rate_limit: true,
            admission_timeout: None,
        }
    }

    /// Configure HTTP client settings
    pub fn http_config(mut self, config: HttpClientConfig) -> Self {
        self.http_config = config;
        self
    }

    /// Set the endpoint cost table
    pub fn costs(mut self, costs: EndpointCosts) -> Self {
        self.costs = costs;
        self
    }

    /// Turn throttling on or off (on by default)
    pub fn enable_rate_limit(mut self, enabled: bool) -> Self {
        self.enable_rate_limit = enabled;
        self
    }

    /// Give up on requests not admitted within `timeout`
    pub fn admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = Some(timeout);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ThrottledClient> {
        let throttler = Throttler::new(self.throttler)?;
        let client = HttpClient::with_config(self.http_config)?;

        Ok(ThrottledClient {
            client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            throttler,
            costs: self.costs,
            enable_rate_limit: self.enable_rate_limit,
            admission_timeout: self.admission_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use cx_throttle::exchanges::binance;
    use cx_throttle::ThrottleError;
    use mockito::Matcher;
    use serde_json::Value;

    use super::*;

    fn binance_client() -> ThrottledClient {
        ThrottledClient::builder("https://api.binance.com/", binance::spot_burst()).costs(binance::spot_costs()).build().unwrap()
    }

    #[test]
    fn test_query_limit() {
        assert_eq!(query_limit(&[("symbol", "BTCUSDT".to_string()), ("limit", "500".to_string())]), Some(500));
        assert_eq!(query_limit(&[("symbol", "BTCUSDT".to_string())]), None);
        assert_eq!(query_limit(&[("limit", "many".to_string())]), None);
    }

    #[test]
    fn test_build_rejects_invalid_throttler() {
        let result = ThrottledClient::builder("https://example.com", ThrottlerConfig::from_rate_limit(0.0)).build();
        assert!(matches!(result, Err(HttpError::Throttle(ThrottleError::InvalidConfig(_)))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_charges_endpoint_cost() {
        let client = binance_client();
        assert_eq!(client.base_url(), "https://api.binance.com");

        let ticket = client.admit(&Method::GET, "/api/v3/depth", Some(1000)).await.unwrap().unwrap();
        assert_eq!(ticket.cost, 50.0);

        let ticket = client.admit(&Method::GET, "/api/v3/exchangeInfo", None).await.unwrap().unwrap();
        assert_eq!(ticket.cost, 20.0);
        assert_eq!(ticket.seq, 1);

        assert!((client.throttler().tokens() - 1_130.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_disabled() {
        let client = ThrottledClient::builder("https://api.binance.com", binance::spot()).enable_rate_limit(false).build().unwrap();

        assert!(client.admit(&Method::GET, "/api/v3/ping", None).await.unwrap().is_none());
        assert_eq!(client.throttler().pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_timeout_withdraws_request() {
        let config = ThrottlerConfig::builder().refill_rate(0.001).initial_tokens(-10.0).build().unwrap();
        let client = ThrottledClient::builder("https://example.com", config).admission_timeout(Duration::from_millis(50)).build().unwrap();

        let result = client.admit(&Method::GET, "/slow", None).await;
        assert!(matches!(result, Err(HttpError::ThrottleTimeout(_))));
        assert_eq!(client.throttler().pending(), 0);
    }

    #[tokio::test]
    async fn test_request_charges_limit_tier_and_decodes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/depth")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
                Matcher::UrlEncoded("limit".into(), "1000".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"lastUpdateId":42,"bids":[["100.0","1.5"]],"asks":[]}"#)
            .create_async()
            .await;

        let client = ThrottledClient::builder(server.url(), binance::spot_burst()).costs(binance::spot_costs()).build().unwrap();
        let body: Value = client.get("/api/v3/depth", &[("symbol", "BTCUSDT".to_string()), ("limit", "1000".to_string())]).await.unwrap();

        mock.assert_async().await;
        assert_eq!(body["lastUpdateId"], 42);
        assert_eq!(body["bids"][0][1], "1.5");

        // limit=1000 bills 50 weight; refill during the round trip is small
        let tokens = client.throttler().tokens();
        assert!((1_150.0..1_175.0).contains(&tokens), "tokens {tokens}");
    }

    #[tokio::test]
    async fn test_request_rate_limit_statuses() {
        let mut server = mockito::Server::new_async().await;
        let too_many = server.mock("GET", "/api/v3/ticker/24hr").with_status(429).with_body("Too many requests").create_async().await;
        let banned = server.mock("POST", "/api/v3/order").match_query(Matcher::Any).with_status(418).with_body("IP banned").create_async().await;

        let client = ThrottledClient::builder(server.url(), binance::spot_burst()).costs(binance::spot_costs()).build().unwrap();

        let result = client.get::<Value>("/api/v3/ticker/24hr", &[]).await;
        assert!(matches!(result, Err(HttpError::RateLimitExceeded(429))));

        let result = client.post::<Value>("/api/v3/order", &[("symbol", "BTCUSDT".to_string())]).await;
        assert!(matches!(result, Err(HttpError::RateLimitExceeded(418))));

        too_many.assert_async().await;
        banned.assert_async().await;
        assert_eq!(client.throttler().pending(), 0);
    }

    #[tokio::test]
    async fn test_request_error_status_keeps_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/api/v3/exchangeInfo").with_status(500).with_body("internal error").create_async().await;

        let client = ThrottledClient::builder(server.url(), binance::spot_burst()).costs(binance::spot_costs()).build().unwrap();
        let result = client.get::<Value>("/api/v3/exchangeInfo", &[]).await;

        mock.assert_async().await;
        match result {
            Err(HttpError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "internal error");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_invalid_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/api/v3/time").with_status(200).with_body("not json").create_async().await;

        let client = ThrottledClient::builder(server.url(), binance::spot_burst()).costs(binance::spot_costs()).build().unwrap();
        let result = client.get::<Value>("/api/v3/time", &[]).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(HttpError::JsonError(_))));
    }

    #[tokio::test]
    async fn test_request_without_rate_limit_leaves_bucket_untouched() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/api/v3/exchangeInfo").with_status(200).with_body("{}").create_async().await;

        let client = ThrottledClient::builder(server.url(), binance::spot_burst())
            .costs(binance::spot_costs())
            .enable_rate_limit(false)
            .build()
            .unwrap();
        let _: Value = client.get("/api/v3/exchangeInfo", &[]).await.unwrap();

        mock.assert_async().await;
        assert_eq!(client.throttler().tokens(), 1_200.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_admitted_in_call_order() {
        let client = std::sync::Arc::new(
            ThrottledClient::builder("https://example.com", ThrottlerConfig::builder().rate_per_second(100.0).max_capacity(1.0).build().unwrap())
                .build()
                .unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..5 {
            let client = std::sync::Arc::clone(&client);
            handles.push(tokio::spawn(async move { client.admit(&Method::GET, "/ticker", None).await.unwrap().unwrap() }));
            tokio::task::yield_now().await;
        }

        let mut tickets = Vec::new();
        for handle in handles {
            tickets.push(handle.await.unwrap());
        }
        for (i, ticket) in tickets.iter().enumerate() {
            assert_eq!(ticket.seq, ticket.admission, "request {i} overtaken");
        }
    }
}
