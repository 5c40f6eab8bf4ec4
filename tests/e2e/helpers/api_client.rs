use anyhow::Result;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Thin reqwest wrapper pointed at the server under test
#[derive(Clone)]
pub struct TestClient {
    base_url: String,
    http: Client,
}

impl TestClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        send(self.http.get(self.url(path))).await
    }

    pub async fn get_with_header(
        &self,
        path: &str,
        name: &str,
        value: &str,
    ) -> Result<ApiResponse> {
        send(self.http.get(self.url(path)).header(name, value)).await
    }

    pub async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<ApiResponse> {
        send(self.http.post(self.url(path)).json(body)).await
    }
}

async fn send(builder: RequestBuilder) -> Result<ApiResponse> {
    let response = builder.send().await?;

    let status = response.status();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
        })
        .collect();
    let body_bytes = response.bytes().await?.to_vec();
    // Plain-text endpoints such as /health leave this empty
    let body = serde_json::from_slice(&body_bytes).ok();

    Ok(ApiResponse {
        status,
        body,
        body_bytes,
        headers,
    })
}

/// Everything a test may want to look at after a call
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Option<Value>,
    pub body_bytes: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl ApiResponse {
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "unexpected status, body: {}",
            String::from_utf8_lossy(&self.body_bytes)
        );
        self
    }

    /// Checks the `message` of an error body contains `fragment`
    pub fn assert_error_message(&self, fragment: &str) -> &Self {
        let message = self
            .body
            .as_ref()
            .and_then(|body| body["message"].as_str())
            .unwrap_or_else(|| panic!("no error message in {:?}", self.body));

        assert!(
            message.contains(fragment),
            "error message {:?} does not mention {:?}",
            message,
            fragment
        );
        self
    }

    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers.get(name)
    }

    pub fn assert_header_exists(&self, name: &str) -> &Self {
        assert!(self.header(name).is_some(), "missing {} header", name);
        self
    }
}
