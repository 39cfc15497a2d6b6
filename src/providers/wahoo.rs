// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ProviderError;
use crate::constants::wahoo_api::{PLANS_PATH, PLAN_FILENAME, PLAN_FILE_PREFIX, WORKOUTS_PATH};
use crate::models::{NewWorkout, RemotePlan, WorkoutData, WorkoutPage};
use crate::oauth2_client::AccessTokenProvider;
use crate::sync::WorkoutSource;

/// Client for the Wahoo cloud API
pub struct WahooProvider {
    client: Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl WahooProvider {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ProviderError> {
        let token = self.tokens.access_token().await?;
        Ok(request.bearer_auth(token))
    }

    /// Send a request and turn a non-2xx answer into [`ProviderError::Status`]
    async fn send(
        &self,
        request: RequestBuilder,
        operation: &'static str,
        target: Option<i64>,
    ) -> Result<Response, ProviderError> {
        let response = self
            .authorized(request)
            .await?
            .send()
            .await
            .map_err(|source| ProviderError::Http { operation, source })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            operation,
            target_id = ?target,
            status = status.as_u16(),
            body = %body,
            "Wahoo API request failed"
        );
        Err(ProviderError::Status {
            operation,
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response, operation: &'static str) -> Result<T, ProviderError> {
        response
            .json()
            .await
            .map_err(|source| ProviderError::Decode { operation, source })
    }

    /// One page of the workouts collection, newest first
    pub async fn get_workouts_page(&self, page: u32, per_page: u32) -> Result<WorkoutPage, ProviderError> {
        let request = self
            .client
            .get(self.url(WORKOUTS_PATH))
            .query(&[("page", page), ("per_page", per_page)]);

        let response = self.send(request, "list workouts", None).await?;
        let page: WorkoutPage = Self::decode(response, "list workouts").await?;
        debug!(page = page.page, count = page.workouts.len(), total = page.total, "Fetched workouts page");
        Ok(page)
    }

    pub async fn create_workout(&self, workout: &NewWorkout) -> Result<WorkoutData, ProviderError> {
        let mut form = vec![
            ("workout[name]", workout.name.clone()),
            ("workout[workout_token]", workout.workout_token.clone()),
            ("workout[workout_type_id]", workout.workout_type_id.to_string()),
            ("workout[starts]", workout.starts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ("workout[minutes]", workout.minutes.to_string()),
        ];
        if let Some(plan_id) = workout.plan_id {
            form.push(("workout[plan_id]", plan_id.to_string()));
        }

        let request = self.client.post(self.url(WORKOUTS_PATH)).form(&form);
        let response = self.send(request, "create workout", None).await?;
        let created: WorkoutData = Self::decode(response, "create workout").await?;
        info!(workout_id = created.id, "Created workout");
        Ok(created)
    }

    pub async fn delete_workout(&self, workout_id: i64) -> Result<(), ProviderError> {
        let request = self.client.delete(self.url(&format!("{WORKOUTS_PATH}/{workout_id}")));
        self.send(request, "delete workout", Some(workout_id)).await?;
        info!(workout_id, "Deleted workout");
        Ok(())
    }

    fn plan_form(payload: &str, external_id: &str) -> Vec<(&'static str, String)> {
        vec![
            ("plan[file]", format!("{PLAN_FILE_PREFIX}{payload}")),
            ("plan[filename]", PLAN_FILENAME.to_string()),
            ("plan[external_id]", external_id.to_string()),
            (
                "plan[provider_updated_at]",
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        ]
    }

    /// Upload a base64 plan payload
    pub async fn create_plan(&self, payload: &str, external_id: &str) -> Result<RemotePlan, ProviderError> {
        let request = self
            .client
            .post(self.url(PLANS_PATH))
            .form(&Self::plan_form(payload, external_id));

        let response = self.send(request, "create plan", None).await?;
        let plan: RemotePlan = Self::decode(response, "create plan").await?;
        info!(plan_id = plan.id, external_id, "Uploaded plan");
        Ok(plan)
    }

    /// Replace the file of an uploaded plan
    pub async fn update_plan(
        &self,
        plan_id: i64,
        payload: &str,
        external_id: &str,
    ) -> Result<RemotePlan, ProviderError> {
        let request = self
            .client
            .put(self.url(&format!("{PLANS_PATH}/{plan_id}")))
            .form(&Self::plan_form(payload, external_id));

        let response = self.send(request, "update plan", Some(plan_id)).await?;
        let plan: RemotePlan = Self::decode(response, "update plan").await?;
        info!(plan_id, "Updated plan");
        Ok(plan)
    }

    pub async fn delete_plan(&self, plan_id: i64) -> Result<(), ProviderError> {
        let request = self.client.delete(self.url(&format!("{PLANS_PATH}/{plan_id}")));
        self.send(request, "delete plan", Some(plan_id)).await?;
        info!(plan_id, "Deleted plan");
        Ok(())
    }

    /// Download a file referenced by a workout summary
    ///
    /// File URLs point at a CDN and are fetched without credentials.
    pub async fn download_file(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let operation = "download file";
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ProviderError::Http { operation, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(operation, url, status = status.as_u16(), body = %body, "File download failed");
            return Err(ProviderError::Status {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| ProviderError::Decode { operation, source })?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl WorkoutSource for WahooProvider {
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<WorkoutPage, ProviderError> {
        self.get_workouts_page(page, per_page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth2_client::StaticToken;

    #[test]
    fn test_base_url_is_normalized() {
        let provider = WahooProvider::new("https://api.wahooligan.com/", Arc::new(StaticToken("t".into())));
        assert_eq!(provider.url(WORKOUTS_PATH), "https://api.wahooligan.com/v1/workouts");
    }

    #[test]
    fn test_plan_form_wraps_payload() {
        let form = WahooProvider::plan_form("eyJhIjoxfQ==", "ext-7");
        assert_eq!(form[0], ("plan[file]", "data:application/json;base64,eyJhIjoxfQ==".to_string()));
        assert_eq!(form[1].1, "plan.json");
        assert_eq!(form[2].1, "ext-7");
    }
}
