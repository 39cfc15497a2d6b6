// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Constants Module
//!
//! Application constants and environment-based configuration values.

use std::env;

/// Wahoo cloud API endpoints
pub mod wahoo_api {
    /// Production API host
    pub const DEFAULT_API_BASE: &str = "https://api.wahooligan.com";

    pub const WORKOUTS_PATH: &str = "/v1/workouts";
    pub const PLANS_PATH: &str = "/v1/plans";
    pub const AUTHORIZE_PATH: &str = "/oauth/authorize";
    pub const TOKEN_PATH: &str = "/oauth/token";

    /// Ordering the workouts endpoint is expected to report
    pub const EXPECTED_ORDER: &str = "descending";
    pub const EXPECTED_SORT: &str = "starts";

    /// Scopes needed to read workouts and manage plans
    pub const DEFAULT_SCOPES: &[&str] = &["user_read", "workouts_read", "workouts_write", "plans_read", "plans_write"];

    /// Prefix wrapping the base64 plan payload in the upload form
    pub const PLAN_FILE_PREFIX: &str = "data:application/json;base64,";
    pub const PLAN_FILENAME: &str = "plan.json";
}

/// Fixed plan header values
pub mod plan_format {
    /// Only version accepted by the platform
    pub const PLAN_VERSION: &str = "1.0.0";
    pub const WORKOUT_TYPE_FAMILY_RUNNING: u32 = 1;
    pub const WORKOUT_TYPE_LOCATION_OUTDOOR: u32 = 1;
    pub const DEFAULT_PLAN_NAME: &str = "Today's workout";
}

/// Size and count limits
pub mod limits {
    pub const MAX_PLAN_DESCRIPTION_CHARS: usize = 5000;
    /// Upper bound on the base64 plan payload
    pub const MAX_PLAN_PAYLOAD_BYTES: usize = 1024 * 1024;
    pub const DEFAULT_PAGE_SIZE: u32 = 50;
    pub const MAX_PAGE_SIZE: u32 = 100;
    /// Attempts given to the text generator to produce components that normalize
    pub const MAX_NORMALIZATION_ATTEMPTS: usize = 5;
    /// Workouts summarised in the coach prompt
    pub const RECENT_WORKOUTS_IN_PROMPT: i64 = 10;
    pub const MIN_RPE: u8 = 1;
    pub const MAX_RPE: u8 = 10;
    /// Seconds before expiry at which an access token is refreshed
    pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;
}

/// Text generation defaults
pub mod llm {
    pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
    pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;
}

/// Environment-based configuration
pub mod env_config {
    use super::env;

    /// Get database URL from environment or default
    pub fn database_url() -> String {
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./data/wahoo_coach.db".to_string())
    }

    /// Get Wahoo API base URL from environment or default
    pub fn wahoo_api_base() -> String {
        env::var("WAHOO_API_BASE").unwrap_or_else(|_| super::wahoo_api::DEFAULT_API_BASE.to_string())
    }

    /// Get OAuth redirect URI from environment or default
    pub fn wahoo_redirect_uri() -> String {
        env::var("WAHOO_REDIRECT_URI").unwrap_or_else(|_| "http://localhost:8080/callback".to_string())
    }

    /// Get workouts page size from environment or default
    pub fn page_size() -> u32 {
        env::var("WAHOO_PAGE_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(super::limits::DEFAULT_PAGE_SIZE)
    }

    /// Get text generation model from environment or default
    pub fn llm_model() -> String {
        env::var("LLM_MODEL").unwrap_or_else(|_| super::llm::DEFAULT_MODEL.to_string())
    }

    /// Get text generation base URL from environment or default
    pub fn llm_base_url() -> String {
        env::var("LLM_BASE_URL").unwrap_or_else(|_| super::llm::DEFAULT_BASE_URL.to_string())
    }

    /// Get sampling temperature from environment or default
    pub fn llm_temperature() -> f32 {
        env::var("LLM_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(super::llm::DEFAULT_TEMPERATURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_constants() {
        assert_eq!(plan_format::PLAN_VERSION, "1.0.0");
        assert!(limits::MAX_PAGE_SIZE >= limits::DEFAULT_PAGE_SIZE);
        assert!(limits::MIN_RPE < limits::MAX_RPE);
    }

    #[test]
    fn test_api_paths_are_absolute() {
        for path in [
            wahoo_api::WORKOUTS_PATH,
            wahoo_api::PLANS_PATH,
            wahoo_api::AUTHORIZE_PATH,
            wahoo_api::TOKEN_PATH,
        ] {
            assert!(path.starts_with('/'));
        }
    }
}
