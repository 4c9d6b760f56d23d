use serde::Deserialize;
use tracing::error;

use crate::error::WorkerError;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Client-credentials grant for the status-tracking service.
pub async fn client_credentials_token(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<String, WorkerError> {
    let response = http
        .post(token_url)
        .basic_auth(client_id, Some(client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await?;

    parse_token(response, "status service").await
}

/// Password grant for the delivery-metadata service.
pub async fn password_grant_token(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    username: &str,
    password: &str,
) -> Result<String, WorkerError> {
    let response = http
        .post(token_url)
        .form(&[
            ("grant_type", "password"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("username", username),
            ("password", password),
        ])
        .send()
        .await?;

    parse_token(response, "delivery-metadata service").await
}

async fn parse_token(response: reqwest::Response, service: &str) -> Result<String, WorkerError> {
    let status = response.status();
    if status.is_client_error() {
        error!("{service} token grant rejected: {status}");
        return Err(WorkerError::NetworkAuthFailure(format!(
            "{service} token grant rejected with {status}"
        )));
    }
    if !status.is_success() {
        return Err(WorkerError::Http(format!(
            "{service} token endpoint returned {status}"
        )));
    }

    let token: TokenResponse = response.json().await?;
    Ok(token.access_token)
}
