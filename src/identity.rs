use crate::{transport::Transport, Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::debug;

pub const PUSH_FACTOR_TYPE: &str = "push";

/// Identity provider user id (e.g. `00u1abcd`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A verification method enrolled by a user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Factor {
    pub id: String,
    pub factor_type: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Factor {
    #[must_use]
    pub fn is_push(&self) -> bool {
        self.factor_type == PUSH_FACTOR_TYPE
    }
}

fn user_id(page: &Value) -> Result<UserId> {
    page.get("id")
        .and_then(Value::as_str)
        .map(UserId::new)
        .ok_or_else(|| Error::MalformedResponse("no user id found".to_string()))
}

/// Build a `search` expression matching `attribute` exactly.
///
/// Backslashes and double quotes are escaped so `value` stays inside the
/// string literal.
#[must_use]
pub fn search_filter(attribute: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("{attribute} eq \"{escaped}\"")
}

/// Look up a user by login (or id) and return their id.
/// # Errors
/// Returns an error if the provider rejects the lookup (e.g. 404) or the response has no `id`.
pub async fn resolve_user_id(transport: &Transport, username: &str) -> Result<UserId> {
    let url = transport.api_url(["api", "v1", "users", username])?;

    let page = transport.get(&url).await?;
    let id = user_id(&page)?;

    debug!("resolved user {} to {}", username, id);

    Ok(id)
}

/// Search users whose `attribute` equals `value` and return the first id.
/// # Errors
/// Returns [`Error::Lookup`] when nothing matches, or a transport error.
pub async fn resolve_user_id_by_attribute(
    transport: &Transport,
    attribute: &str,
    value: &str,
) -> Result<UserId> {
    let mut url = transport.api_url(["api", "v1", "users"])?;
    url.query_pairs_mut()
        .append_pair("search", &search_filter(attribute, value));

    let page = transport.get(&url).await?;
    let users = page
        .as_array()
        .ok_or_else(|| Error::MalformedResponse("user search did not return a list".to_string()))?;

    let first = users
        .first()
        .ok_or_else(|| Error::Lookup(format!("no user with {attribute} = {value}")))?;

    if users.len() > 1 {
        debug!(
            "{} users match {} = {}, using the first",
            users.len(),
            attribute,
            value
        );
    }

    user_id(first)
}

/// Return the user's first enrolled push factor, in provider order.
///
/// `None` means the user has no push factor, which is not an error.
/// # Errors
/// Returns an error if the request fails or the factor list is malformed.
pub async fn get_push_factor(transport: &Transport, user_id: &UserId) -> Result<Option<Factor>> {
    let url = transport.api_url(["api", "v1", "users", user_id.as_str(), "factors"])?;

    let page = transport.get(&url).await?;
    let factors = page
        .as_array()
        .ok_or_else(|| Error::MalformedResponse("factor list is not an array".to_string()))?;

    let Some(entry) = factors
        .iter()
        .find(|f| f.get("factorType").and_then(Value::as_str) == Some(PUSH_FACTOR_TYPE))
    else {
        debug!("user {} has no push factor", user_id);
        return Ok(None);
    };

    let factor = Factor::deserialize(entry)
        .map_err(|e| Error::MalformedResponse(format!("invalid push factor: {e}")))?;

    Ok(Some(factor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use anyhow::{anyhow, Result};
    use secrecy::SecretString;
    use serde_json::json;
    use std::net::TcpListener;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn transport(uri: &str) -> Result<Transport> {
        let config = Config::new(uri, SecretString::from("api-token".to_string()));
        Ok(Transport::new(&config)?)
    }

    #[test]
    fn search_filter_quotes_value() {
        assert_eq!(
            search_filter("profile.samAccountName", "jdoe"),
            "profile.samAccountName eq \"jdoe\""
        );
    }

    #[test]
    fn search_filter_escapes_quotes_and_backslashes() {
        assert_eq!(
            search_filter("profile.samAccountName", r#"a"b\c"#),
            r#"profile.samAccountName eq "a\"b\\c""#
        );
    }

    #[test]
    fn factor_deserializes_camel_case() -> Result<()> {
        let factor = Factor::deserialize(&json!({
            "id": "opf1",
            "factorType": "push",
            "provider": "OKTA",
            "status": "ACTIVE",
            "_links": {}
        }))?;
        assert!(factor.is_push());
        assert_eq!(factor.provider.as_deref(), Some("OKTA"));
        Ok(())
    }

    #[tokio::test]
    async fn resolve_user_id_returns_id() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/users/jdoe@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "00u1",
                "status": "ACTIVE"
            })))
            .mount(&server)
            .await;

        let transport = transport(&server.uri())?;
        let first = resolve_user_id(&transport, "jdoe@example.com").await?;
        let second = resolve_user_id(&transport, "jdoe@example.com").await?;
        assert_eq!(first, UserId::new("00u1"));
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn resolve_user_id_propagates_not_found() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/users/ghost"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "errorSummary": "Not found: Resource not found: ghost (User)"
            })))
            .mount(&server)
            .await;

        let transport = transport(&server.uri())?;
        let err = resolve_user_id(&transport, "ghost")
            .await
            .err()
            .ok_or_else(|| anyhow!("expected error"))?;
        assert_eq!(err.status(), Some(404));
        Ok(())
    }

    #[tokio::test]
    async fn resolve_user_id_requires_id_field() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/users/jdoe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let transport = transport(&server.uri())?;
        let result = resolve_user_id(&transport, "jdoe").await;
        assert!(matches!(result, Err(Error::MalformedResponse(_))));
        Ok(())
    }

    #[tokio::test]
    async fn resolve_by_attribute_returns_first_match() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/users"))
            .and(query_param("search", "profile.samAccountName eq \"jdoe\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "00u1"},
                {"id": "00u2"}
            ])))
            .mount(&server)
            .await;

        let transport = transport(&server.uri())?;
        let id =
            resolve_user_id_by_attribute(&transport, "profile.samAccountName", "jdoe").await?;
        assert_eq!(id.as_str(), "00u1");
        Ok(())
    }

    #[tokio::test]
    async fn resolve_by_attribute_empty_is_lookup_error() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let transport = transport(&server.uri())?;
        let result =
            resolve_user_id_by_attribute(&transport, "profile.samAccountName", "nobody").await;
        assert!(matches!(result, Err(Error::Lookup(_))));
        Ok(())
    }

    #[tokio::test]
    async fn get_push_factor_returns_first_push_entry() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/users/00u1/factors"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "sms1", "factorType": "sms", "provider": "OKTA"},
                {"id": "opf1", "factorType": "push", "provider": "OKTA"},
                {"id": "opf2", "factorType": "push", "provider": "OKTA"}
            ])))
            .mount(&server)
            .await;

        let transport = transport(&server.uri())?;
        let factor = get_push_factor(&transport, &UserId::new("00u1"))
            .await?
            .ok_or_else(|| anyhow!("expected a push factor"))?;
        assert_eq!(factor.id, "opf1");
        Ok(())
    }

    #[tokio::test]
    async fn get_push_factor_none_without_push() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/users/00u1/factors"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "sms1", "factorType": "sms"},
                {"id": "tot1", "factorType": "token:software:totp"}
            ])))
            .mount(&server)
            .await;

        let transport = transport(&server.uri())?;
        assert_eq!(get_push_factor(&transport, &UserId::new("00u1")).await?, None);
        Ok(())
    }
}
