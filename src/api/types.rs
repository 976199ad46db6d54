//! Request and response payloads of the scanning API.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Product {
    Education,
    Businesses,
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Product::Education => f.write_str("education"),
            Product::Businesses => f.write_str("businesses"),
        }
    }
}

impl FromStr for Product {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "education" => Ok(Product::Education),
            "businesses" => Ok(Product::Businesses),
            other => Err(format!(
                "unknown product '{}', expected 'education' or 'businesses'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub key: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhooks {
    /// Called with the scan status; `{STATUS}` is substituted by the service.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_result: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionProperties {
    pub webhooks: Webhooks,
    #[serde(default)]
    pub sandbox: bool,
    /// Hours the results are kept on the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub developer_payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_html: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<u8>,
}

impl SubmissionProperties {
    pub fn new(status_webhook: impl Into<String>) -> Self {
        Self {
            webhooks: Webhooks {
                status: status_webhook.into(),
                new_result: None,
            },
            ..Default::default()
        }
    }

    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDocument {
    pub base64: String,
    pub filename: String,
    pub properties: SubmissionProperties,
}

impl FileDocument {
    pub fn from_bytes(
        filename: impl Into<String>,
        content: &[u8],
        properties: SubmissionProperties,
    ) -> Self {
        Self {
            base64: STANDARD.encode(content),
            filename: filename.into(),
            properties,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrFileDocument {
    #[serde(flatten)]
    pub file: FileDocument,
    /// Language of the text in the image, e.g. `en`.
    pub lang_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlDocument {
    pub url: String,
    pub properties: SubmissionProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTask {
    pub endpoint: String,
    pub verb: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<[String; 2]>,
}

impl ExportTask {
    pub fn new(endpoint: impl Into<String>, verb: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            verb: verb.into(),
            headers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub id: String,
    #[serde(flatten)]
    pub task: ExportTask,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ExportResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_report: Option<ExportTask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crawled_version: Option<ExportTask>,
    pub completion_webhook: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub trigger: Vec<String>,
    /// 0 cancels the whole batch on any failure, 1 ignores failed scans.
    pub error_handling: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub success: Vec<String>,
    #[serde(default)]
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub scans: Vec<ScanRef>,
    #[serde(default)]
    pub purge: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_webhook: Option<String>,
}

impl DeleteRequest {
    pub fn new<I, S>(scan_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scans: scan_ids
                .into_iter()
                .map(|id| ScanRef { id: id.into() })
                .collect(),
            purge: false,
            completion_webhook: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditsBalance {
    #[serde(rename = "Amount")]
    pub amount: u64,
}
