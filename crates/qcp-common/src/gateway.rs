//! Gateway Client (component A): typed calls to the downstream AiGateway
//! admin API.
//!
//! Retries are the caller's responsibility (`spec.md` §2, component A).
//! This module only defines the trait and two implementations: an HTTP
//! client behind the `http-gateway-client` feature, and an in-memory mock
//! used by every crate's test suite and by `qcp-integration-tests`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::{QcpError, QcpResult};

/// Quota totals as reported by the gateway for a single user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GatewayQuotaSnapshot {
    pub total: i64,
    pub used: i64,
}

/// Typed calls to the downstream AiGateway.
///
/// Implementations must treat every call as independently fallible; a
/// caller inside a database transaction (`spec.md` §5) is expected to
/// abort that transaction on any `Err` here.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// `GET {path}/quota?user_id=…`
    async fn get_quota(&self, user_id: &str) -> QcpResult<i64>;

    /// `POST {path}/quota/delta`
    async fn delta_quota(&self, user_id: &str, value: i64) -> QcpResult<()>;

    /// `GET {path}/quota/used?user_id=…`
    async fn get_used(&self, user_id: &str) -> QcpResult<i64>;

    /// `POST {path}/quota/used/delta`
    async fn delta_used(&self, user_id: &str, value: i64) -> QcpResult<()>;

    /// `POST {admin}/set` (model whitelist)
    async fn set_model_whitelist(&self, employee_number: &str, models: &[String]) -> QcpResult<()>;

    /// `GET {admin}/query?employee_number=…`
    async fn get_model_whitelist(&self, employee_number: &str) -> QcpResult<Vec<String>>;

    /// `DELETE {admin}/delete?employee_number=…`
    async fn delete_model_whitelist(&self, employee_number: &str) -> QcpResult<()>;

    /// Star-check enforcement flag endpoint.
    async fn set_star_check(&self, employee_number: &str, enabled: bool) -> QcpResult<()>;

    /// Quota-check enforcement flag endpoint.
    async fn set_quota_check(&self, employee_number: &str, enabled: bool) -> QcpResult<()>;
}

/// Lets a single gateway instance be shared across multiple services
/// (e.g. a ledger service and a strategy engine in the same test, or in a
/// process wiring several components against one `HttpGatewayClient`).
#[async_trait]
impl<T: GatewayClient> GatewayClient for std::sync::Arc<T> {
    async fn get_quota(&self, user_id: &str) -> QcpResult<i64> {
        (**self).get_quota(user_id).await
    }

    async fn delta_quota(&self, user_id: &str, value: i64) -> QcpResult<()> {
        (**self).delta_quota(user_id, value).await
    }

    async fn get_used(&self, user_id: &str) -> QcpResult<i64> {
        (**self).get_used(user_id).await
    }

    async fn delta_used(&self, user_id: &str, value: i64) -> QcpResult<()> {
        (**self).delta_used(user_id, value).await
    }

    async fn set_model_whitelist(&self, employee_number: &str, models: &[String]) -> QcpResult<()> {
        (**self).set_model_whitelist(employee_number, models).await
    }

    async fn get_model_whitelist(&self, employee_number: &str) -> QcpResult<Vec<String>> {
        (**self).get_model_whitelist(employee_number).await
    }

    async fn delete_model_whitelist(&self, employee_number: &str) -> QcpResult<()> {
        (**self).delete_model_whitelist(employee_number).await
    }

    async fn set_star_check(&self, employee_number: &str, enabled: bool) -> QcpResult<()> {
        (**self).set_star_check(employee_number, enabled).await
    }

    async fn set_quota_check(&self, employee_number: &str, enabled: bool) -> QcpResult<()> {
        (**self).set_quota_check(employee_number, enabled).await
    }
}

/// Envelope the gateway wraps every response body in (`spec.md` §6).
#[derive(Debug, serde::Deserialize)]
struct GatewayEnvelope<T> {
    code: i32,
    message: String,
    success: bool,
    #[serde(default)]
    data: Option<T>,
}

/// Production implementation, talking to the real gateway over HTTP.
pub struct HttpGatewayClient {
    client: reqwest::Client,
    base_url: String,
    admin_base_path: String,
    auth_header_name: String,
    auth_header_value: Option<secrecy::SecretString>,
}

impl HttpGatewayClient {
    pub fn new(config: &crate::config::GatewayConfig) -> QcpResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(QcpError::from)?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            admin_base_path: config.admin_base_path.clone(),
            auth_header_name: config.auth_header_name.clone(),
            auth_header_value: config.auth_header_value.clone(),
        })
    }

    fn auth_header(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_header_value {
            Some(secret) => {
                use secrecy::ExposeSecret;
                builder.header(&self.auth_header_name, secret.expose_secret())
            }
            None => builder,
        }
    }

    async fn unwrap_envelope<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> QcpResult<T> {
        if !resp.status().is_success() {
            return Err(QcpError::Gateway(format!(
                "non-2xx status: {}",
                resp.status()
            )));
        }
        let envelope: GatewayEnvelope<T> = resp.json().await.map_err(QcpError::from)?;
        if !envelope.success {
            return Err(QcpError::Gateway(format!(
                "gateway rejected request ({}): {}",
                envelope.code, envelope.message
            )));
        }
        envelope
            .data
            .ok_or_else(|| QcpError::Gateway("gateway envelope missing data".to_string()))
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn get_quota(&self, user_id: &str) -> QcpResult<i64> {
        let resp = self
            .auth_header(
                self.client
                    .get(format!("{}/quota", self.base_url))
                    .query(&[("user_id", user_id)]),
            )
            .send()
            .await
            .map_err(QcpError::from)?;
        #[derive(serde::Deserialize)]
        struct QuotaBody {
            quota: i64,
        }
        Ok(Self::unwrap_envelope::<QuotaBody>(resp).await?.quota)
    }

    async fn delta_quota(&self, user_id: &str, value: i64) -> QcpResult<()> {
        let resp = self
            .auth_header(
                self.client
                    .post(format!("{}/quota/delta", self.base_url))
                    .form(&[("user_id", user_id.to_string()), ("value", value.to_string())]),
            )
            .send()
            .await
            .map_err(QcpError::from)?;
        Self::unwrap_envelope::<serde_json::Value>(resp).await.map(|_| ())
    }

    async fn get_used(&self, user_id: &str) -> QcpResult<i64> {
        let resp = self
            .auth_header(
                self.client
                    .get(format!("{}/quota/used", self.base_url))
                    .query(&[("user_id", user_id)]),
            )
            .send()
            .await
            .map_err(QcpError::from)?;
        #[derive(serde::Deserialize)]
        struct UsedBody {
            quota: i64,
        }
        Ok(Self::unwrap_envelope::<UsedBody>(resp).await?.quota)
    }

    async fn delta_used(&self, user_id: &str, value: i64) -> QcpResult<()> {
        let resp = self
            .auth_header(
                self.client
                    .post(format!("{}/quota/used/delta", self.base_url))
                    .form(&[("user_id", user_id.to_string()), ("value", value.to_string())]),
            )
            .send()
            .await
            .map_err(QcpError::from)?;
        Self::unwrap_envelope::<serde_json::Value>(resp).await.map(|_| ())
    }

    async fn set_model_whitelist(&self, employee_number: &str, models: &[String]) -> QcpResult<()> {
        let models_json = serde_json::to_string(models).map_err(|e| QcpError::Internal(e.to_string()))?;
        let resp = self
            .auth_header(
                self.client
                    .post(format!("{}/set", self.admin_base_path))
                    .form(&[("employee_number", employee_number.to_string()), ("models", models_json)]),
            )
            .send()
            .await
            .map_err(QcpError::from)?;
        Self::unwrap_envelope::<serde_json::Value>(resp).await.map(|_| ())
    }

    async fn get_model_whitelist(&self, employee_number: &str) -> QcpResult<Vec<String>> {
        let resp = self
            .auth_header(
                self.client
                    .get(format!("{}/query", self.admin_base_path))
                    .query(&[("employee_number", employee_number)]),
            )
            .send()
            .await
            .map_err(QcpError::from)?;
        #[derive(serde::Deserialize)]
        struct QueryBody {
            models: Vec<String>,
        }
        Ok(Self::unwrap_envelope::<QueryBody>(resp).await?.models)
    }

    async fn delete_model_whitelist(&self, employee_number: &str) -> QcpResult<()> {
        let resp = self
            .auth_header(
                self.client
                    .delete(format!("{}/delete", self.admin_base_path))
                    .query(&[("employee_number", employee_number)]),
            )
            .send()
            .await
            .map_err(QcpError::from)?;
        Self::unwrap_envelope::<serde_json::Value>(resp).await.map(|_| ())
    }

    async fn set_star_check(&self, employee_number: &str, enabled: bool) -> QcpResult<()> {
        let resp = self
            .auth_header(
                self.client
                    .post(format!("{}/star-check", self.admin_base_path))
                    .form(&[
                        ("employee_number", employee_number.to_string()),
                        ("enabled", enabled.to_string()),
                    ]),
            )
            .send()
            .await
            .map_err(QcpError::from)?;
        Self::unwrap_envelope::<serde_json::Value>(resp).await.map(|_| ())
    }

    async fn set_quota_check(&self, employee_number: &str, enabled: bool) -> QcpResult<()> {
        let resp = self
            .auth_header(
                self.client
                    .post(format!("{}/quota-check", self.admin_base_path))
                    .form(&[
                        ("employee_number", employee_number.to_string()),
                        ("enabled", enabled.to_string()),
                    ]),
            )
            .send()
            .await
            .map_err(QcpError::from)?;
        Self::unwrap_envelope::<serde_json::Value>(resp).await.map(|_| ())
    }
}

/// In-memory mock used by every crate's own test suite and by
/// `qcp-integration-tests`. Process-wide only within a single instance,
/// never shared globally (`spec.md` §9, "Global state").
#[derive(Default)]
pub struct MockGatewayClient {
    quota: Mutex<HashMap<String, i64>>,
    used: Mutex<HashMap<String, i64>>,
    whitelists: Mutex<HashMap<String, Vec<String>>>,
    star_check: Mutex<HashMap<String, bool>>,
    quota_check: Mutex<HashMap<String, bool>>,
    calls: Mutex<Vec<String>>,
}

impl MockGatewayClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the gateway's quota/used snapshot for a user, as a test fixture.
    pub fn seed(&self, user_id: &str, snapshot: GatewayQuotaSnapshot) {
        self.quota.lock().unwrap().insert(user_id.to_string(), snapshot.total);
        self.used.lock().unwrap().insert(user_id.to_string(), snapshot.used);
    }

    /// Snapshot the current recorded state for a user.
    pub fn snapshot(&self, user_id: &str) -> GatewayQuotaSnapshot {
        GatewayQuotaSnapshot {
            total: *self.quota.lock().unwrap().get(user_id).unwrap_or(&0),
            used: *self.used.lock().unwrap().get(user_id).unwrap_or(&0),
        }
    }

    /// All calls made so far, in order, as human-readable labels. Tests use
    /// this to assert the "gateway is notified iff the effective value
    /// actually changes" invariant (`spec.md` §4.2, §8 property 4).
    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl GatewayClient for MockGatewayClient {
    async fn get_quota(&self, user_id: &str) -> QcpResult<i64> {
        self.record(format!("get_quota({user_id})"));
        Ok(*self.quota.lock().unwrap().get(user_id).unwrap_or(&0))
    }

    async fn delta_quota(&self, user_id: &str, value: i64) -> QcpResult<()> {
        self.record(format!("delta_quota({user_id},{value})"));
        let mut quota = self.quota.lock().unwrap();
        let entry = quota.entry(user_id.to_string()).or_insert(0);
        *entry += value;
        Ok(())
    }

    async fn get_used(&self, user_id: &str) -> QcpResult<i64> {
        self.record(format!("get_used({user_id})"));
        Ok(*self.used.lock().unwrap().get(user_id).unwrap_or(&0))
    }

    async fn delta_used(&self, user_id: &str, value: i64) -> QcpResult<()> {
        self.record(format!("delta_used({user_id},{value})"));
        let mut used = self.used.lock().unwrap();
        let entry = used.entry(user_id.to_string()).or_insert(0);
        *entry += value;
        Ok(())
    }

    async fn set_model_whitelist(&self, employee_number: &str, models: &[String]) -> QcpResult<()> {
        self.record(format!("set_model_whitelist({employee_number},{models:?})"));
        self.whitelists
            .lock()
            .unwrap()
            .insert(employee_number.to_string(), models.to_vec());
        Ok(())
    }

    async fn get_model_whitelist(&self, employee_number: &str) -> QcpResult<Vec<String>> {
        Ok(self
            .whitelists
            .lock()
            .unwrap()
            .get(employee_number)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_model_whitelist(&self, employee_number: &str) -> QcpResult<()> {
        self.record(format!("delete_model_whitelist({employee_number})"));
        self.whitelists.lock().unwrap().remove(employee_number);
        Ok(())
    }

    async fn set_star_check(&self, employee_number: &str, enabled: bool) -> QcpResult<()> {
        self.record(format!("set_star_check({employee_number},{enabled})"));
        self.star_check
            .lock()
            .unwrap()
            .insert(employee_number.to_string(), enabled);
        Ok(())
    }

    async fn set_quota_check(&self, employee_number: &str, enabled: bool) -> QcpResult<()> {
        self.record(format!("set_quota_check({employee_number},{enabled})"));
        self.quota_check
            .lock()
            .unwrap()
            .insert(employee_number.to_string(), enabled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_delta_quota_accumulates() {
        let gw = MockGatewayClient::new();
        gw.seed("u1", GatewayQuotaSnapshot { total: 100, used: 0 });
        gw.delta_quota("u1", -30).await.unwrap();
        assert_eq!(gw.get_quota("u1").await.unwrap(), 70);
    }

    #[tokio::test]
    async fn mock_call_log_records_every_call() {
        let gw = MockGatewayClient::new();
        gw.get_quota("u1").await.unwrap();
        gw.set_star_check("E1", true).await.unwrap();
        assert_eq!(gw.call_count(), 2);
        assert!(gw.call_log()[1].starts_with("set_star_check"));
    }

    #[tokio::test]
    async fn mock_whitelist_roundtrip() {
        let gw = MockGatewayClient::new();
        let models = vec!["gpt-4".to_string(), "claude-3".to_string()];
        gw.set_model_whitelist("E1", &models).await.unwrap();
        assert_eq!(gw.get_model_whitelist("E1").await.unwrap(), models);
        gw.delete_model_whitelist("E1").await.unwrap();
        assert!(gw.get_model_whitelist("E1").await.unwrap().is_empty());
    }
}
