//! Client for the hosted object upload service.
//!
//! The service exposes functions over HTTP: `POST /api/mutation` and
//! `POST /api/query` take `{path, args, format}` and answer
//! `{status, value}` or `{status: "error", errorMessage}`. Uploads go to a
//! short-lived URL handed out by `upload:generateUploadUrl`.

use async_trait::async_trait;
use feedline_shared::service::UploadService;
use feedline_shared::types::StorageId;
use feedline_shared::{ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::error::{NetError, NetResult};
use crate::rest::checked;

const GENERATE_UPLOAD_URL: &str = "upload:generateUploadUrl";
const GET_IMAGE_URL: &str = "upload:getImageUrl";

/// Upload service client bound to one deployment.
#[derive(Clone, Debug)]
pub struct HostedUploader {
    http: reqwest::Client,
    deployment_url: Url,
}

#[derive(Debug, Serialize)]
struct FunctionCall<'a> {
    path: &'a str,
    args: Value,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum FunctionResult {
    Success {
        #[serde(default)]
        value: Value,
    },
    Error {
        #[serde(rename = "errorMessage", default)]
        error_message: String,
    },
}

#[derive(Debug, Deserialize)]
struct UploadReceipt {
    #[serde(rename = "storageId")]
    storage_id: String,
}

impl HostedUploader {
    pub fn new(deployment_url: &str, http_timeout: std::time::Duration) -> NetResult<Self> {
        let mut deployment_url = Url::parse(deployment_url)?;
        if !deployment_url.path().ends_with('/') {
            let path = format!("{}/", deployment_url.path());
            deployment_url.set_path(&path);
        }

        Ok(Self {
            http: reqwest::Client::builder().timeout(http_timeout).build()?,
            deployment_url,
        })
    }

    async fn call(&self, kind: &str, path: &str, args: Value) -> NetResult<Value> {
        let url = self.deployment_url.join(&format!("api/{kind}"))?;
        let response = self
            .http
            .post(url)
            .json(&FunctionCall {
                path,
                args,
                format: "json",
            })
            .send()
            .await?;

        let result: FunctionResult = checked(response).await?.json().await?;
        result.into_value(path)
    }
}

impl FunctionResult {
    fn into_value(self, path: &str) -> NetResult<Value> {
        match self {
            FunctionResult::Success { value } => Ok(value),
            FunctionResult::Error { error_message } => {
                tracing::warn!(function = path, error = %error_message, "upload service function failed");
                Err(NetError::Api {
                    status: 400,
                    message: error_message,
                })
            }
        }
    }
}

#[async_trait]
impl UploadService for HostedUploader {
    async fn generate_upload_url(&self) -> ServiceResult<String> {
        let value = self.call("mutation", GENERATE_UPLOAD_URL, json!({})).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ServiceError::InvalidResponse("upload URL is not a string".into()))
    }

    async fn put_blob(
        &self,
        upload_url: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> ServiceResult<StorageId> {
        let size = bytes.len();
        let response = self
            .http
            .post(upload_url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(NetError::from)?;

        let receipt: UploadReceipt = checked(response)
            .await?
            .json()
            .await
            .map_err(NetError::from)?;

        tracing::debug!(storage_id = %receipt.storage_id, size, "blob uploaded");
        Ok(StorageId(receipt.storage_id))
    }

    async fn resolve_url(&self, storage_id: &StorageId) -> ServiceResult<String> {
        let value = self
            .call("query", GET_IMAGE_URL, json!({ "storageId": storage_id.0 }))
            .await?;
        match value {
            Value::String(url) => Ok(url),
            Value::Null => Err(ServiceError::NotFound),
            other => Err(ServiceError::InvalidResponse(format!(
                "unexpected image URL value: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_call_body() {
        let body = serde_json::to_value(FunctionCall {
            path: GET_IMAGE_URL,
            args: json!({ "storageId": "kg2abc" }),
            format: "json",
        })
        .unwrap();
        assert_eq!(
            body,
            json!({"path": "upload:getImageUrl", "args": {"storageId": "kg2abc"}, "format": "json"})
        );
    }

    #[test]
    fn success_and_error_results() {
        let ok: FunctionResult =
            serde_json::from_str(r#"{"status":"success","value":"https://cdn/x","logLines":[]}"#)
                .unwrap();
        assert_eq!(ok.into_value("f").unwrap(), json!("https://cdn/x"));

        let err: FunctionResult =
            serde_json::from_str(r#"{"status":"error","errorMessage":"Server Error","logLines":[]}"#)
                .unwrap();
        assert!(matches!(
            err.into_value("f"),
            Err(NetError::Api { status: 400, .. })
        ));
    }

    #[test]
    fn null_value_decodes() {
        let ok: FunctionResult = serde_json::from_str(r#"{"status":"success","value":null}"#).unwrap();
        assert_eq!(ok.into_value("f").unwrap(), Value::Null);
    }

    #[test]
    fn upload_receipt_decodes() {
        let receipt: UploadReceipt = serde_json::from_str(r#"{"storageId":"kg2abc"}"#).unwrap();
        assert_eq!(receipt.storage_id, "kg2abc");
    }

    #[test]
    fn deployment_url_joins_api_paths() {
        let uploader = HostedUploader::new(
            "https://happy-otter-123.example.cloud",
            std::time::Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            uploader.deployment_url.join("api/mutation").unwrap().as_str(),
            "https://happy-otter-123.example.cloud/api/mutation"
        );
    }
}
