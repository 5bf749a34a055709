use crate::client::Client;
use crate::error::{ApiError, ApiResult, ErrorBody};
use crate::models::oauth::{OAuthClient, TokenRequest, TokenResponse};
use async_trait::async_trait;
use tracing::debug;

/// Identity endpoints
#[async_trait]
pub trait OAuthApi {
    /// Discover the instance's local OAuth client
    async fn get_local_client(&self) -> ApiResult<OAuthClient>;

    /// Exchange a grant for a token pair
    async fn request_token(&self, request: &TokenRequest<'_>) -> ApiResult<TokenResponse>;
}

#[async_trait]
impl OAuthApi for Client {
    async fn get_local_client(&self) -> ApiResult<OAuthClient> {
        let url = self.build_url("/oauth-clients/local");
        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Auth {
                status: status.as_u16(),
                message: ErrorBody::message_from(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::parse("oauth client", e))
    }

    async fn request_token(&self, request: &TokenRequest<'_>) -> ApiResult<TokenResponse> {
        let url = self.build_url("/users/token");
        debug!(
            target: "auth",
            grant_type = request.grant_type.as_str(),
            "Requesting token"
        );

        let response = self.http_client.post(&url).form(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.as_u16() != 200 {
            return Err(ApiError::Auth {
                status: status.as_u16(),
                message: ErrorBody::message_from(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::parse("token", e))
    }
}
