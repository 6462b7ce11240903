//! HTTP implementations of the upload collaborators.
//!
//! The signer POSTs `{"kind": "<mime>"}` to a signing endpoint and expects
//! [`UploadCredentials`] back. The transport sends a multipart form with the
//! signed fields plus a `file` part, then reads the permanent URL out of the
//! JSON response under `final_url_field` (dotted paths allowed).

use async_trait::async_trait;
use quire_common::NetworkError;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;

use crate::upload::{ImageFile, UploadCredentials, UploadProgress, UploadSigner, UploadTransport};

#[derive(Serialize)]
struct SigningRequest<'a> {
    kind: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpUploadSigner {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpUploadSigner {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl UploadSigner for HttpUploadSigner {
    async fn request_upload_credentials(
        &self,
        kind: &str,
    ) -> Result<UploadCredentials, NetworkError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SigningRequest { kind })
            .send()
            .await
            .map_err(|e| NetworkError::Signing {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Signing {
                message: format!("{}: {}", status, body.trim()),
            });
        }

        response
            .json::<UploadCredentials>()
            .await
            .map_err(|e| NetworkError::MalformedResponse {
                message: e.to_string(),
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpUploadTransport {
    client: reqwest::Client,
}

impl HttpUploadTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn transfer_error(e: impl ToString) -> NetworkError {
    NetworkError::Transfer {
        message: e.to_string(),
    }
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    async fn transfer(
        &self,
        credentials: &UploadCredentials,
        file: &ImageFile,
        progress: &UploadProgress,
    ) -> Result<String, NetworkError> {
        let mut form = Form::new();
        for (name, value) in &credentials.upload_fields {
            form = form.text(name.clone(), value.clone());
        }
        let mut part = Part::bytes(file.data.to_vec()).file_name(file.name.to_string());
        if let Some(content_type) = &file.content_type {
            part = part.mime_str(content_type).map_err(transfer_error)?;
        }
        form = form.part("file", part);
        progress.report(25);

        let response = self
            .client
            .post(&credentials.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(transfer_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(transfer_error(format!("{}: {}", status, body.trim())));
        }
        progress.report(90);

        let body: Value = response
            .json()
            .await
            .map_err(|e| NetworkError::MalformedResponse {
                message: e.to_string(),
            })?;
        final_url_from(&body, &credentials.final_url_field)
    }
}

/// Pull the permanent URL out of a transfer response.
pub(crate) fn final_url_from(body: &Value, field: &str) -> Result<String, NetworkError> {
    let mut value = body;
    for segment in field.split('.') {
        value = value
            .get(segment)
            .ok_or_else(|| NetworkError::MalformedResponse {
                message: format!("response has no `{}`", field),
            })?;
    }
    match value.as_str() {
        Some(url) if !url.trim().is_empty() => Ok(url.to_string()),
        _ => Err(NetworkError::MalformedResponse {
            message: format!("`{}` is not a url", field),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_top_level_and_nested_fields() {
        let body = json!({ "url": "https://cdn/a.png", "data": { "location": "https://cdn/b.png" } });
        assert_eq!(final_url_from(&body, "url").unwrap(), "https://cdn/a.png");
        assert_eq!(
            final_url_from(&body, "data.location").unwrap(),
            "https://cdn/b.png"
        );
    }

    #[test]
    fn missing_or_wrong_field_is_malformed() {
        let body = json!({ "url": 12, "empty": "" });
        for field in ["nope", "url", "empty", "url.deeper"] {
            let err = final_url_from(&body, field).unwrap_err();
            assert!(
                matches!(err, NetworkError::MalformedResponse { .. }),
                "{field}: {err:?}"
            );
        }
    }

    #[test]
    fn credentials_parse_camel_case() {
        let creds: UploadCredentials = serde_json::from_value(json!({
            "uploadUrl": "https://bucket/upload",
            "uploadFields": { "key": "a/b.png", "policy": "p" },
            "finalUrlField": "url"
        }))
        .unwrap();
        assert_eq!(creds.upload_url, "https://bucket/upload");
        assert_eq!(creds.upload_fields.len(), 2);
        assert_eq!(creds.final_url_field, "url");
    }
}
