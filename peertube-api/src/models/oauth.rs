use serde::{Deserialize, Serialize};

/// Local OAuth client returned by `/oauth-clients/local`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
}

/// OAuth grant type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    Password,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::Password => "password",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

/// Form body for `/users/token`
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub grant_type: GrantType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<&'a str>,
}

impl<'a> TokenRequest<'a> {
    /// Resource owner password grant
    pub fn password(client: &'a OAuthClient, username: &'a str, password: &'a str) -> Self {
        Self {
            client_id: &client.client_id,
            client_secret: &client.client_secret,
            grant_type: GrantType::Password,
            response_type: Some("code"),
            username: Some(username),
            password: Some(password),
            refresh_token: None,
        }
    }

    /// Refresh token grant
    pub fn refresh(client: &'a OAuthClient, refresh_token: &'a str) -> Self {
        Self {
            client_id: &client.client_id,
            client_secret: &client.client_secret,
            grant_type: GrantType::RefreshToken,
            response_type: None,
            username: None,
            password: None,
            refresh_token: Some(refresh_token),
        }
    }
}

/// Token response from `/users/token`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TokenResponse {
    #[serde(default)]
    pub token_type: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token_expires_in: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_request_form() {
        let client = OAuthClient {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
        };
        let form = serde_json::to_value(TokenRequest::password(&client, "root", "pw")).unwrap();
        assert_eq!(form["grant_type"], "password");
        assert_eq!(form["response_type"], "code");
        assert_eq!(form["username"], "root");
        assert!(form.get("refresh_token").is_none());
    }

    #[test]
    fn test_refresh_request_form() {
        let client = OAuthClient::default();
        let form = serde_json::to_value(TokenRequest::refresh(&client, "rt")).unwrap();
        assert_eq!(form["grant_type"], "refresh_token");
        assert_eq!(form["refresh_token"], "rt");
        assert!(form.get("password").is_none());
    }

    #[test]
    fn test_token_response_without_refresh_fields() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":3600}"#).unwrap();
        assert_eq!(token.access_token, "a");
        assert!(token.refresh_token.is_empty());
        assert_eq!(token.refresh_token_expires_in, 0);
    }
}
