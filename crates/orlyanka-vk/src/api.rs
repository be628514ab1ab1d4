//! Token-authenticated HTTP client for the VK Bots API.
//!
//! Every call goes through the [`ApiTransport`] trait so that the execute
//! pool, the long-poll feed and the tests are all decoupled from the
//! concrete HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use tracing::debug;

use crate::error::{ApiError, ApiResult};

const API_URL: &str = "https://api.vk.com/method/";
const API_VERSION: &str = "5.131";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The seam between API consumers and the concrete HTTP client.
///
/// Production code uses [`VkApi`]; tests substitute a recording transport.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Calls `method` with the given JSON object of parameters and returns
    /// the payload of the `response` envelope field.
    async fn call(&self, method: &str, params: Value) -> ApiResult<Value>;
}

/// VK API client holding the group access token.
pub struct VkApi {
    client: Client,
    token: String,
}

impl VkApi {
    /// Creates a client with the default request timeout.
    pub fn new(token: impl Into<String>) -> ApiResult<Self> {
        let client = ClientBuilder::new().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            token: token.into(),
        })
    }

    /// Flattens a JSON object into form fields, stringifying scalars the way
    /// the VK endpoint expects them.
    fn form_fields(&self, method: &str, params: Value) -> ApiResult<Vec<(String, String)>> {
        let Value::Object(map) = params else {
            return Err(ApiError::Malformed {
                method: method.to_string(),
                reason: "params must be a JSON object".to_string(),
            });
        };

        let mut fields = Vec::with_capacity(map.len() + 2);
        for (key, value) in map {
            let rendered = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            fields.push((key, rendered));
        }
        fields.push(("access_token".to_string(), self.token.clone()));
        fields.push(("v".to_string(), API_VERSION.to_string()));
        Ok(fields)
    }
}

#[async_trait]
impl ApiTransport for VkApi {
    async fn call(&self, method: &str, params: Value) -> ApiResult<Value> {
        let fields = self.form_fields(method, params)?;

        debug!(method = %method, "Calling VK API");

        let body: Value = self
            .client
            .post(format!("{API_URL}{method}"))
            .form(&fields)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = body.get("error") {
            return Err(ApiError::Api {
                method: method.to_string(),
                code: error.get("error_code").and_then(Value::as_i64).unwrap_or(-1),
                message: error
                    .get("error_msg")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }

        body.get("response")
            .cloned()
            .ok_or_else(|| ApiError::Malformed {
                method: method.to_string(),
                reason: "neither 'response' nor 'error' present".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn form_fields_stringify_scalars_and_append_auth() {
        let api = VkApi::new("secret").unwrap();
        let fields = api
            .form_fields("messages.send", json!({"user_id": 42, "message": "hi"}))
            .unwrap();

        assert!(fields.contains(&("user_id".to_string(), "42".to_string())));
        assert!(fields.contains(&("message".to_string(), "hi".to_string())));
        assert!(fields.contains(&("access_token".to_string(), "secret".to_string())));
        assert!(fields.iter().any(|(k, _)| k == "v"));
    }

    #[test]
    fn form_fields_reject_non_object_params() {
        let api = VkApi::new("secret").unwrap();
        let err = api.form_fields("users.get", json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, ApiError::Malformed { .. }));
    }
}
