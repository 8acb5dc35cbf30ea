use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::DashboardError;
use crate::models::{Cycle, InitialData, KnackData, NationalEri, SchoolEri, Scope};

/// Client for the dashboard backend. Non-OK statuses and transport failures
/// surface as `Network`; body decode failures as `DataShape`. Requests are
/// not retried.
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> ApiClient {
        ApiClient {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn initial_data(
        &self,
        scope: &Scope,
        cycle: Cycle,
    ) -> Result<InitialData, DashboardError> {
        let body = match scope {
            Scope::Establishment(id) => json!({
                "establishmentId": id,
                "cycle": cycle.number(),
            }),
            Scope::StaffAdmin(id) => json!({
                "staffAdminId": id,
                "cycle": cycle.number(),
            }),
        };
        self.post_json("/api/dashboard-initial-data", &body).await
    }

    pub async fn school_eri(
        &self,
        scope: &Scope,
        cycle: Cycle,
    ) -> Result<SchoolEri, DashboardError> {
        let cycle = cycle.number().to_string();
        let scope_param = match scope {
            Scope::Establishment(id) => ("establishmentId", id.clone()),
            Scope::StaffAdmin(id) => ("staffAdminId", id.clone()),
        };
        self.get_json("/api/calculate-eri", &[("cycle", cycle), scope_param])
            .await
    }

    pub async fn national_eri(&self, cycle: Cycle) -> Result<NationalEri, DashboardError> {
        self.get_json("/api/national-eri", &[("cycle", cycle.number().to_string())])
            .await
    }

    pub async fn knack_data(
        &self,
        object_key: &str,
        filters: &Value,
    ) -> Result<KnackData, DashboardError> {
        self.get_json(
            "/api/knack-data",
            &[
                ("objectKey", object_key.to_string()),
                ("filters", filters.to_string()),
            ],
        )
        .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, DashboardError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|err| DashboardError::Network(err.to_string()))?;
        Self::decode(path, response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, DashboardError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| DashboardError::Network(err.to_string()))?;
        Self::decode(path, response).await
    }

    async fn decode<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, DashboardError> {
        let status = response.status();
        if !status.is_success() {
            return Err(DashboardError::Network(format!("{path} returned {status}")));
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| DashboardError::Network(err.to_string()))?;
        serde_json::from_slice(&body)
            .map_err(|err| DashboardError::DataShape(format!("{path}: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = ApiClient::new("https://backend.example.com/");
        assert_eq!(client.base_url, "https://backend.example.com");
    }

    #[test]
    fn eri_payloads_decode() {
        let school: SchoolEri =
            serde_json::from_value(json!({"school_eri": 3.4, "response_count": 98})).unwrap();
        assert_eq!(school.school_eri, Some(3.4));
        assert_eq!(school.response_count, 98);

        let national: NationalEri = serde_json::from_value(
            json!({"national_eri": 3.6, "source": "benchmark", "message": null}),
        )
        .unwrap();
        assert_eq!(national.national_eri, Some(3.6));
        assert_eq!(national.source, "benchmark");
        assert!(national.message.is_none());
    }

    #[test]
    fn knack_payload_defaults_to_empty_records() {
        let data: KnackData = serde_json::from_value(json!({})).unwrap();
        assert!(data.records.is_empty());
    }
}
