//! Principals, claim sets, and the IDP-to-application claims transform.
//!
//! Claim sets are immutable ordered sequences of `(type, value)` pairs. The
//! transform never mutates its input: it builds a new principal for the
//! application scheme and hands the ticket properties back untouched.

use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;
use uuid::Uuid;

pub const SUBJECT: &str = "sub";
pub const IDP_SUBJECT: &str = "idp-sub";
pub const DISPLAY_NAME: &str = "display-name";
pub const NAME: &str = "name";
pub const SESSION_ID: &str = "sid";

/// Properties key holding the sanitized return URL while onboarding is pending.
pub const ULTIMATE_RETURN_URL_KEY: &str = ".ultimate-return-url";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Claim {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Claim {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClaimSet(Vec<Claim>);

impl ClaimSet {
    #[must_use]
    pub fn new(claims: Vec<Claim>) -> Self {
        Self(claims)
    }

    /// First value for a claim type.
    #[must_use]
    pub fn first(&self, kind: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|claim| claim.kind == kind)
            .map(|claim| claim.value.as_str())
    }

    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.0.iter().any(|claim| claim.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Claim> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A new set with `claim` appended.
    #[must_use]
    pub fn with(&self, claim: Claim) -> Self {
        let mut claims = self.0.clone();
        claims.push(claim);
        Self(claims)
    }
}

impl FromIterator<Claim> for ClaimSet {
    fn from_iter<I: IntoIterator<Item = Claim>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Authenticated principal tagged with the cookie scheme it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    scheme: String,
    claims: ClaimSet,
}

impl Principal {
    pub fn new(scheme: impl Into<String>, claims: ClaimSet) -> Self {
        Self {
            scheme: scheme.into(),
            claims,
        }
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.claims.first(SUBJECT)
    }
}

/// Transport properties carried alongside a principal.
///
/// `tokens` holds the token set issued by the IDP and must survive the
/// handoff unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TicketProperties {
    items: BTreeMap<String, String>,
    tokens: BTreeMap<String, String>,
}

impl TicketProperties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_token(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tokens.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn items(&self) -> &BTreeMap<String, String> {
        &self.items
    }

    #[must_use]
    pub fn tokens(&self) -> &BTreeMap<String, String> {
        &self.tokens
    }

    pub fn stash_return_url(&mut self, url: String) {
        self.items.insert(ULTIMATE_RETURN_URL_KEY.to_string(), url);
    }

    #[must_use]
    pub fn return_url(&self) -> Option<&str> {
        self.items.get(ULTIMATE_RETURN_URL_KEY).map(String::as_str)
    }

    /// Remove and return the stashed return URL.
    pub fn take_return_url(&mut self) -> Option<String> {
        self.items.remove(ULTIMATE_RETURN_URL_KEY)
    }
}

/// Map an IDP principal onto the application scheme.
///
/// Every claim is copied in order, with `sub` renamed to `idp-sub`. Then
/// `sub` (the application user id) and `display-name` are appended, and
/// `name` is synthesized from the display name only when the IDP sent none.
#[must_use]
pub fn transform_principal(
    idp: &Principal,
    properties: TicketProperties,
    app_scheme: &str,
    user_id: Uuid,
    display_name: &str,
) -> (Principal, TicketProperties) {
    let mut claims: Vec<Claim> = idp
        .claims()
        .iter()
        .map(|claim| {
            if claim.kind == SUBJECT {
                Claim::new(IDP_SUBJECT, claim.value.clone())
            } else {
                claim.clone()
            }
        })
        .collect();

    claims.push(Claim::new(SUBJECT, user_id.to_string()));
    claims.push(Claim::new(DISPLAY_NAME, display_name));
    if !idp.claims().contains(NAME) {
        claims.push(Claim::new(NAME, display_name));
    }

    (Principal::new(app_scheme, ClaimSet::new(claims)), properties)
}

/// Add a `sid` claim when the IDP did not send one.
#[must_use]
pub fn on_token_validated(principal: Principal) -> Principal {
    if principal.claims().contains(SESSION_ID) {
        return principal;
    }
    let claims = principal
        .claims()
        .with(Claim::new(SESSION_ID, Uuid::now_v7().to_string()));
    Principal::new(principal.scheme, claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idp_principal(claims: &[(&str, &str)]) -> Principal {
        Principal::new(
            "cookie-idp",
            claims
                .iter()
                .map(|(kind, value)| Claim::new(*kind, *value))
                .collect(),
        )
    }

    fn values<'a>(principal: &'a Principal, kind: &str) -> Vec<&'a str> {
        principal
            .claims()
            .iter()
            .filter(|claim| claim.kind == kind)
            .map(|claim| claim.value.as_str())
            .collect()
    }

    #[test]
    fn transform_renames_subject_and_keeps_existing_name() {
        let user_id = Uuid::now_v7();
        let idp = idp_principal(&[(SUBJECT, "abc"), (NAME, "X")]);
        let (app, _) =
            transform_principal(&idp, TicketProperties::new(), "cookie-app", user_id, "Alice");

        assert_eq!(app.scheme(), "cookie-app");
        assert_eq!(values(&app, IDP_SUBJECT), vec!["abc"]);
        assert_eq!(values(&app, SUBJECT), vec![user_id.to_string().as_str()]);
        assert_eq!(values(&app, DISPLAY_NAME), vec!["Alice"]);
        assert_eq!(values(&app, NAME), vec!["X"]);
    }

    #[test]
    fn transform_synthesizes_name_when_missing() {
        let idp = idp_principal(&[(SUBJECT, "abc")]);
        let (app, _) = transform_principal(
            &idp,
            TicketProperties::new(),
            "cookie-app",
            Uuid::now_v7(),
            "Alice Smith",
        );
        assert_eq!(values(&app, NAME), vec!["Alice Smith"]);
    }

    #[test]
    fn transform_preserves_order_and_unknown_claims() {
        let idp = idp_principal(&[
            ("email", "a@example.com"),
            (SUBJECT, "abc"),
            ("urn:custom:tier", "gold"),
        ]);
        let (app, _) = transform_principal(
            &idp,
            TicketProperties::new(),
            "cookie-app",
            Uuid::now_v7(),
            "Alice",
        );
        let kinds: Vec<&str> = app.claims().iter().map(|claim| claim.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "email",
                IDP_SUBJECT,
                "urn:custom:tier",
                SUBJECT,
                DISPLAY_NAME,
                NAME
            ]
        );
    }

    #[test]
    fn transform_leaves_input_and_properties_untouched() {
        let idp = idp_principal(&[(SUBJECT, "abc")]);
        let before = idp.clone();
        let properties = TicketProperties::new()
            .with_token("access_token", "at")
            .with_token("refresh_token", "rt")
            .with_item(".redirect", "/orders");
        let (_, after) = transform_principal(
            &idp,
            properties.clone(),
            "cookie-app",
            Uuid::now_v7(),
            "Alice",
        );
        assert_eq!(idp, before);
        assert_eq!(after, properties);
    }

    #[test]
    fn return_url_stash_and_take() {
        let mut properties = TicketProperties::new();
        properties.stash_return_url("/orders".to_string());
        assert_eq!(properties.return_url(), Some("/orders"));
        assert_eq!(properties.take_return_url(), Some("/orders".to_string()));
        assert_eq!(properties.take_return_url(), None);
    }

    #[test]
    fn sid_is_polyfilled_once() {
        let principal = on_token_validated(idp_principal(&[(SUBJECT, "abc")]));
        let sid = principal.claims().first(SESSION_ID).map(str::to_string);
        assert!(sid.is_some());

        let again = on_token_validated(principal);
        assert_eq!(again.claims().first(SESSION_ID).map(str::to_string), sid);
        assert_eq!(values(&again, SESSION_ID).len(), 1);
    }

    #[test]
    fn sid_from_idp_is_kept() {
        let principal = on_token_validated(idp_principal(&[(SUBJECT, "abc"), (SESSION_ID, "s1")]));
        assert_eq!(principal.claims().first(SESSION_ID), Some("s1"));
    }
}
