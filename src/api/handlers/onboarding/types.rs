//! Request and response payloads for onboarding endpoints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use super::claims::Claim;

/// Field name to validation messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OnboardingInput {
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedirectResponse {
    pub success: bool,
    pub redirect_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidationResponse {
    pub success: bool,
    pub validation: FieldErrors,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AntiforgeryTokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub claims: Vec<Claim>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdpDiagnosticsResponse {
    pub scheme: String,
    pub claims: Vec<Claim>,
    pub properties: BTreeMap<String, String>,
    pub tokens: BTreeMap<String, String>,
    pub continue_url: String,
}
