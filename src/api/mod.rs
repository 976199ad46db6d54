//! Endpoint operations of the scanning API.
//!
//! Every authenticated operation checks the credential with the token guard,
//! attaches it as a bearer token, runs the request through the retrying
//! executor and classifies the response.

pub mod types;

use chrono::NaiveDate;
use log::{debug, info};

use crate::auth::{Credential, verify_token};
use crate::config::ClientConfig;
use crate::error::ScanError;
use crate::http::{RawResponse, ReqwestTransport, RequestDescriptor, Transport, classify, execute};

pub use types::{
    CreditsBalance, DeleteRequest, ExportRequest, ExportResult, ExportTask, FileDocument,
    LoginRequest, OcrFileDocument, Product, ScanRef, StartRequest, StartResponse,
    SubmissionProperties, UrlDocument, Webhooks,
};

const USAGE_DATE_FORMAT: &str = "%d-%m-%Y";

pub struct ScanClient<T: Transport = ReqwestTransport> {
    transport: T,
    config: ClientConfig,
}

impl ScanClient<ReqwestTransport> {
    /// Builds a client over a fresh reqwest transport.
    pub fn from_config(config: ClientConfig) -> Result<Self, ScanError> {
        let transport = ReqwestTransport::with_user_agent(&config.user_agent)?;
        Ok(Self::new(transport, config))
    }
}

fn require_id(name: &str, value: &str) -> Result<(), ScanError> {
    if value.trim().is_empty() {
        return Err(ScanError::InvalidArgument(format!("{} must not be empty", name)));
    }
    Ok(())
}

impl<T: Transport> ScanClient<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    /// Checks that `credential` is still usable for at least the configured
    /// safety margin.
    pub fn verify_token(&self, credential: &Credential) -> Result<(), ScanError> {
        verify_token(credential, self.config.token_safety_margin)
    }

    async fn dispatch(
        &self,
        base_url: &str,
        request: RequestDescriptor,
    ) -> Result<RawResponse, ScanError> {
        let request = match request.timeout {
            Some(_) => request,
            None => request.timeout(self.config.request_timeout),
        };
        let response = execute(&self.transport, base_url, &request, &self.config.retry).await?;
        classify(response).into_result()
    }

    async fn dispatch_authorized(
        &self,
        credential: &Credential,
        request: RequestDescriptor,
    ) -> Result<RawResponse, ScanError> {
        self.verify_token(credential)?;
        let request = request.header("Authorization", credential.bearer());
        self.dispatch(&self.config.api_base_url, request).await
    }

    /// Exchanges an account email and API key for an access token.
    #[tracing::instrument(skip(self, key))]
    pub async fn login(&self, email: &str, key: &str) -> Result<Credential, ScanError> {
        require_id("email", email)?;
        require_id("key", key)?;

        let request = RequestDescriptor::post("/v3/account/login/api")
            .json(&LoginRequest { email, key })?;
        let response = self
            .dispatch(&self.config.identity_base_url, request)
            .await?;
        let credential: Credential = response.json()?;

        info!("Logged in, token valid until {}", credential.expires);
        Ok(credential)
    }

    #[tracing::instrument(skip(self, credential, document), fields(filename = %document.filename))]
    pub async fn submit_file(
        &self,
        credential: &Credential,
        product: Product,
        scan_id: &str,
        document: &FileDocument,
    ) -> Result<(), ScanError> {
        require_id("scan id", scan_id)?;
        let request =
            RequestDescriptor::put(format!("/v3/{}/submit/file/{}", product, scan_id))
                .json(document)?;
        self.dispatch_authorized(credential, request).await?;
        debug!("Submitted file {} as scan {}", document.filename, scan_id);
        Ok(())
    }

    /// Submits an image whose text is extracted by OCR before scanning.
    #[tracing::instrument(skip(self, credential, document), fields(filename = %document.file.filename))]
    pub async fn submit_ocr(
        &self,
        credential: &Credential,
        product: Product,
        scan_id: &str,
        document: &OcrFileDocument,
    ) -> Result<(), ScanError> {
        require_id("scan id", scan_id)?;
        require_id("language code", &document.lang_code)?;
        let request = RequestDescriptor::put(format!("/v3/{}/submit/ocr/{}", product, scan_id))
            .json(document)?;
        self.dispatch_authorized(credential, request).await?;
        debug!("Submitted image {} as scan {}", document.file.filename, scan_id);
        Ok(())
    }

    #[tracing::instrument(skip(self, credential, document), fields(url = %document.url))]
    pub async fn submit_url(
        &self,
        credential: &Credential,
        product: Product,
        scan_id: &str,
        document: &UrlDocument,
    ) -> Result<(), ScanError> {
        require_id("scan id", scan_id)?;
        require_id("url", &document.url)?;
        let request = RequestDescriptor::put(format!("/v3/{}/submit/url/{}", product, scan_id))
            .json(document)?;
        self.dispatch_authorized(credential, request).await?;
        debug!("Submitted {} as scan {}", document.url, scan_id);
        Ok(())
    }

    /// Asks the service to push scan artifacts to the endpoints in `request`.
    #[tracing::instrument(skip(self, credential, request))]
    pub async fn export(
        &self,
        credential: &Credential,
        scan_id: &str,
        export_id: &str,
        request: &ExportRequest,
    ) -> Result<(), ScanError> {
        require_id("scan id", scan_id)?;
        require_id("export id", export_id)?;
        let descriptor =
            RequestDescriptor::post(format!("/v3/downloads/{}/export/{}", scan_id, export_id))
                .json(request)?;
        self.dispatch_authorized(credential, descriptor).await?;
        Ok(())
    }

    /// Starts scans that were submitted in price-check mode.
    #[tracing::instrument(skip(self, credential, request))]
    pub async fn start(
        &self,
        credential: &Credential,
        product: Product,
        request: &StartRequest,
    ) -> Result<StartResponse, ScanError> {
        if request.trigger.is_empty() {
            return Err(ScanError::InvalidArgument(
                "at least one scan id must be triggered".to_string(),
            ));
        }
        let descriptor =
            RequestDescriptor::patch(format!("/v3/{}/start", product)).json(request)?;
        let response = self.dispatch_authorized(credential, descriptor).await?;
        response.json()
    }

    #[tracing::instrument(skip(self, credential, request))]
    pub async fn delete(
        &self,
        credential: &Credential,
        product: Product,
        request: &DeleteRequest,
    ) -> Result<(), ScanError> {
        if request.scans.is_empty() {
            return Err(ScanError::InvalidArgument(
                "at least one scan id must be deleted".to_string(),
            ));
        }
        let descriptor =
            RequestDescriptor::patch(format!("/v3.1/{}/delete", product)).json(request)?;
        self.dispatch_authorized(credential, descriptor).await?;
        info!("Deleted {} scan(s)", request.scans.len());
        Ok(())
    }

    #[tracing::instrument(skip(self, credential))]
    pub async fn resend_webhook(
        &self,
        credential: &Credential,
        product: Product,
        scan_id: &str,
    ) -> Result<(), ScanError> {
        require_id("scan id", scan_id)?;
        let descriptor = RequestDescriptor::post(format!(
            "/v3/{}/scans/{}/webhooks/resend",
            product, scan_id
        ));
        self.dispatch_authorized(credential, descriptor).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, credential))]
    pub async fn credits_balance(
        &self,
        credential: &Credential,
        product: Product,
    ) -> Result<CreditsBalance, ScanError> {
        let descriptor = RequestDescriptor::get(format!("/v3/{}/credits", product));
        let response = self.dispatch_authorized(credential, descriptor).await?;
        response.json()
    }

    /// Downloads the credit usage between `start` and `end` (inclusive) as CSV.
    #[tracing::instrument(skip(self, credential))]
    pub async fn usages_history_csv(
        &self,
        credential: &Credential,
        product: Product,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<String, ScanError> {
        if start > end {
            return Err(ScanError::InvalidArgument(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }
        let descriptor = RequestDescriptor::get(format!("/v3/{}/usages/history", product))
            .query("start", start.format(USAGE_DATE_FORMAT).to_string())
            .query("end", end.format(USAGE_DATE_FORMAT).to_string());
        let response = self.dispatch_authorized(credential, descriptor).await?;
        Ok(response.body)
    }

    #[tracing::instrument(skip(self))]
    pub async fn release_notes(&self) -> Result<serde_json::Value, ScanError> {
        self.lookup("/v3/release-logs.json").await
    }

    #[tracing::instrument(skip(self))]
    pub async fn supported_file_types(&self) -> Result<serde_json::Value, ScanError> {
        self.lookup("/v3/miscellaneous/supported-file-types").await
    }

    #[tracing::instrument(skip(self))]
    pub async fn supported_languages(&self) -> Result<Vec<String>, ScanError> {
        self.lookup("/v3/miscellaneous/supported-languages").await
    }

    #[tracing::instrument(skip(self))]
    pub async fn ocr_supported_languages(&self) -> Result<Vec<String>, ScanError> {
        self.lookup("/v3/miscellaneous/ocr-languages-list").await
    }

    async fn lookup<R: serde::de::DeserializeOwned>(&self, path: &str) -> Result<R, ScanError> {
        let response = self
            .dispatch(&self.config.api_base_url, RequestDescriptor::get(path))
            .await?;
        response.json()
    }
}
