use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use clap::Parser;
use log::debug;
use scanlink::api::{
    DeleteRequest, ExportRequest, ExportResult, ExportTask, FileDocument, OcrFileDocument,
    Product, StartRequest, SubmissionProperties, UrlDocument,
};
use scanlink::http::RetryPolicy;
use scanlink::{ClientConfig, Credential, ScanClient};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// scanlink - client for the document comparison service
///
/// Logs in with SCANLINK_EMAIL / SCANLINK_API_KEY on every invocation and
/// runs a single command. Nothing is stored between runs.
#[derive(Parser, Debug)]
#[command(author, version = env!("SCANLINK_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the scanning API
    #[arg(long = "api-url", env = "SCANLINK_API_URL", value_name = "URL", global = true)]
    api_url: Option<String>,

    /// Base URL of the identity server (defaults to the API URL)
    #[arg(long = "id-url", env = "SCANLINK_ID_URL", value_name = "URL", global = true)]
    id_url: Option<String>,

    /// Account email used to log in
    #[arg(long, env = "SCANLINK_EMAIL", global = true)]
    email: Option<String>,

    /// API key used to log in
    #[arg(long, env = "SCANLINK_API_KEY", hide_env_values = true, global = true)]
    key: Option<String>,

    /// Product line the scans belong to (education or businesses)
    #[arg(long, default_value = "education", global = true)]
    product: Product,

    /// Retries after the first attempt on transient failures
    #[arg(long, env = "SCANLINK_MAX_RETRIES", default_value_t = scanlink::http::MAX_RETRIES, global = true)]
    max_retries: u32,

    /// Delay before the first retry in milliseconds, doubled after each retry
    #[arg(long, env = "SCANLINK_BACKOFF_MS", default_value_t = scanlink::http::INITIAL_BACKOFF_MS, global = true)]
    backoff_ms: u64,

    /// Per-attempt timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    timeout: Option<u64>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Log in and print the issued access token
    Login,

    /// Show the remaining credit balance
    Credits,

    /// Download credit usage history as CSV
    Usages(UsagesArgs),

    /// Submit a web page for scanning
    SubmitUrl(SubmitUrlArgs),

    /// Submit a local file for scanning
    SubmitFile(SubmitFileArgs),

    /// Submit an image whose text is read with OCR
    SubmitOcr(SubmitOcrArgs),

    /// Export scan results to your own endpoints
    Export(ExportArgs),

    /// Start scans submitted in price-check mode
    Start(StartArgs),

    /// Delete scans
    Delete(DeleteArgs),

    /// Ask the service to resend the status webhook of a scan
    ResendWebhook(ScanIdArgs),

    /// Show the service release notes
    ReleaseNotes,

    /// List supported file types
    FileTypes,

    /// List supported languages
    Languages,

    /// List languages supported by OCR
    OcrLanguages,
}

#[derive(clap::Args, Debug)]
struct UsagesArgs {
    /// First day, YYYY-MM-DD
    #[arg(long)]
    start: NaiveDate,
    /// Last day, YYYY-MM-DD
    #[arg(long)]
    end: NaiveDate,
}

#[derive(clap::Args, Debug)]
struct SubmissionArgs {
    /// Status webhook; {STATUS} is replaced by the service
    #[arg(long, value_name = "URL")]
    webhook: String,

    /// Submit in sandbox mode (no credits used, mock results)
    #[arg(long)]
    sandbox: bool,
}

impl SubmissionArgs {
    fn properties(&self) -> SubmissionProperties {
        SubmissionProperties::new(self.webhook.clone()).sandbox(self.sandbox)
    }
}

#[derive(clap::Args, Debug)]
struct SubmitUrlArgs {
    scan_id: String,
    url: String,
    #[command(flatten)]
    submission: SubmissionArgs,
}

#[derive(clap::Args, Debug)]
struct SubmitFileArgs {
    scan_id: String,
    path: PathBuf,
    #[command(flatten)]
    submission: SubmissionArgs,
}

#[derive(clap::Args, Debug)]
struct SubmitOcrArgs {
    scan_id: String,
    path: PathBuf,
    /// Language of the text in the image
    #[arg(long = "lang", default_value = "en")]
    lang_code: String,
    #[command(flatten)]
    submission: SubmissionArgs,
}

#[derive(clap::Args, Debug)]
struct ExportArgs {
    scan_id: String,
    export_id: String,

    /// Called once every export task finished
    #[arg(long, value_name = "URL")]
    completion_webhook: String,

    /// Result to export as RESULT_ID=ENDPOINT (repeatable)
    #[arg(long = "result", value_name = "ID=URL", value_parser = parse_result_target)]
    results: Vec<(String, String)>,

    /// Endpoint receiving the PDF report
    #[arg(long, value_name = "URL")]
    pdf_report: Option<String>,

    /// Endpoint receiving the crawled version of the submission
    #[arg(long, value_name = "URL")]
    crawled_version: Option<String>,

    /// HTTP verb used for every export endpoint
    #[arg(long, default_value = "POST")]
    verb: String,
}

impl ExportArgs {
    fn to_request(&self) -> ExportRequest {
        let task = |endpoint: &str| ExportTask::new(endpoint, self.verb.clone());
        ExportRequest {
            results: self
                .results
                .iter()
                .map(|(id, endpoint)| ExportResult {
                    id: id.clone(),
                    task: task(endpoint.as_str()),
                })
                .collect(),
            pdf_report: self.pdf_report.as_deref().map(task),
            crawled_version: self.crawled_version.as_deref().map(task),
            completion_webhook: self.completion_webhook.clone(),
            max_retries: None,
        }
    }
}

fn parse_result_target(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((id, endpoint)) if !id.is_empty() && !endpoint.is_empty() => {
            Ok((id.to_string(), endpoint.to_string()))
        }
        _ => Err(format!("expected RESULT_ID=ENDPOINT, got '{}'", s)),
    }
}

#[derive(clap::Args, Debug)]
struct StartArgs {
    #[arg(required = true)]
    scan_ids: Vec<String>,

    /// Start the remaining scans even if some fail
    #[arg(long)]
    ignore_failures: bool,
}

#[derive(clap::Args, Debug)]
struct DeleteArgs {
    #[arg(required = true)]
    scan_ids: Vec<String>,

    /// Also remove the scans from the shared data hub
    #[arg(long)]
    purge: bool,

    #[arg(long, value_name = "URL")]
    completion_webhook: Option<String>,
}

#[derive(clap::Args, Debug)]
struct ScanIdArgs {
    scan_id: String,
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig> {
        let api_url = self
            .api_url
            .clone()
            .ok_or_else(|| anyhow!("--api-url or SCANLINK_API_URL is required"))?;
        let id_url = self.id_url.clone().unwrap_or_else(|| api_url.clone());

        Ok(ClientConfig::new(api_url, id_url)
            .with_retry(RetryPolicy::new(
                self.max_retries,
                Duration::from_millis(self.backoff_ms),
            ))
            .with_request_timeout(self.timeout.map(Duration::from_secs)))
    }
}

async fn login(client: &ScanClient, cli: &Cli) -> Result<Credential> {
    let (Some(email), Some(key)) = (cli.email.as_deref(), cli.key.as_deref()) else {
        bail!("--email and --key (or SCANLINK_EMAIL and SCANLINK_API_KEY) are required");
    };
    client.login(email, key).await.context("Failed to log in")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn read_file(path: &Path) -> Result<(String, Vec<u8>)> {
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{:?} has no file name", path))?;
    debug!("Read {} bytes from {:?}", content.len(), path);
    Ok((filename, content))
}

async fn run(cli: Cli) -> Result<()> {
    let client = ScanClient::from_config(cli.client_config()?)?;
    let product = cli.product;

    match &cli.command {
        Commands::Login => {
            let credential = login(&client, &cli).await?;
            print_json(&credential)?;
        }
        Commands::Credits => {
            let credential = login(&client, &cli).await?;
            let balance = client.credits_balance(&credential, product).await?;
            print_json(&balance)?;
        }
        Commands::Usages(args) => {
            let credential = login(&client, &cli).await?;
            let csv = client
                .usages_history_csv(&credential, product, args.start, args.end)
                .await?;
            print!("{}", csv);
        }
        Commands::SubmitUrl(args) => {
            let credential = login(&client, &cli).await?;
            let document = UrlDocument {
                url: args.url.clone(),
                properties: args.submission.properties(),
            };
            client
                .submit_url(&credential, product, &args.scan_id, &document)
                .await?;
            println!("Submitted {} as {}", args.url, args.scan_id);
        }
        Commands::SubmitFile(args) => {
            let (filename, content) = read_file(&args.path).await?;
            let credential = login(&client, &cli).await?;
            let document =
                FileDocument::from_bytes(filename, &content, args.submission.properties());
            client
                .submit_file(&credential, product, &args.scan_id, &document)
                .await?;
            println!("Submitted {:?} as {}", args.path, args.scan_id);
        }
        Commands::SubmitOcr(args) => {
            let (filename, content) = read_file(&args.path).await?;
            let credential = login(&client, &cli).await?;
            let document = OcrFileDocument {
                file: FileDocument::from_bytes(filename, &content, args.submission.properties()),
                lang_code: args.lang_code.clone(),
            };
            client
                .submit_ocr(&credential, product, &args.scan_id, &document)
                .await?;
            println!("Submitted {:?} as {}", args.path, args.scan_id);
        }
        Commands::Export(args) => {
            let credential = login(&client, &cli).await?;
            client
                .export(&credential, &args.scan_id, &args.export_id, &args.to_request())
                .await?;
            println!("Export {} of {} requested", args.export_id, args.scan_id);
        }
        Commands::Start(args) => {
            let credential = login(&client, &cli).await?;
            let request = StartRequest {
                trigger: args.scan_ids.clone(),
                error_handling: u8::from(args.ignore_failures),
            };
            let response = client.start(&credential, product, &request).await?;
            print_json(&response)?;
        }
        Commands::Delete(args) => {
            let credential = login(&client, &cli).await?;
            let mut request = DeleteRequest::new(args.scan_ids.iter().cloned());
            request.purge = args.purge;
            request.completion_webhook = args.completion_webhook.clone();
            client.delete(&credential, product, &request).await?;
            println!("Deleted {} scan(s)", args.scan_ids.len());
        }
        Commands::ResendWebhook(args) => {
            let credential = login(&client, &cli).await?;
            client
                .resend_webhook(&credential, product, &args.scan_id)
                .await?;
            println!("Webhook of {} resent", args.scan_id);
        }
        Commands::ReleaseNotes => print_json(&client.release_notes().await?)?,
        Commands::FileTypes => print_json(&client.supported_file_types().await?)?,
        Commands::Languages => print_json(&client.supported_languages().await?)?,
        Commands::OcrLanguages => print_json(&client.ocr_supported_languages().await?)?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    run(Cli::parse()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_credits_parsing() {
        let cli = Cli::try_parse_from([
            "scanlink",
            "--api-url",
            "http://api",
            "--product",
            "businesses",
            "credits",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Credits));
        assert_eq!(cli.product, Product::Businesses);
        assert_eq!(cli.api_url.as_deref(), Some("http://api"));
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "scanlink",
            "credits",
            "--max-retries",
            "3",
            "--backoff-ms",
            "50",
            "--api-url",
            "http://api",
        ])
        .unwrap();
        let config = cli.client_config().unwrap();
        assert_eq!(config.retry, RetryPolicy::new(3, Duration::from_millis(50)));
        assert_eq!(config.identity_base_url, "http://api");
    }

    #[test]
    fn test_cli_usages_dates() {
        let cli = Cli::try_parse_from([
            "scanlink",
            "usages",
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-31",
        ])
        .unwrap();
        match cli.command {
            Commands::Usages(args) => {
                assert_eq!(args.start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
                assert_eq!(args.end, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
            }
            _ => panic!("Expected Usages command"),
        }
    }

    #[test]
    fn test_cli_export_results() {
        let cli = Cli::try_parse_from([
            "scanlink",
            "export",
            "scan-1",
            "exp-1",
            "--completion-webhook",
            "https://hooks.test/done",
            "--result",
            "r1=https://store.test/r1",
            "--pdf-report",
            "https://store.test/pdf",
        ])
        .unwrap();
        match cli.command {
            Commands::Export(args) => {
                let request = args.to_request();
                assert_eq!(request.results.len(), 1);
                assert_eq!(request.results[0].id, "r1");
                assert_eq!(request.results[0].task.endpoint, "https://store.test/r1");
                assert_eq!(request.results[0].task.verb, "POST");
                assert_eq!(
                    request.pdf_report.map(|t| t.endpoint),
                    Some("https://store.test/pdf".to_string())
                );
                assert_eq!(request.crawled_version, None);
            }
            _ => panic!("Expected Export command"),
        }
    }

    #[test]
    fn test_cli_rejects_malformed_result_target() {
        let result = Cli::try_parse_from([
            "scanlink",
            "export",
            "scan-1",
            "exp-1",
            "--completion-webhook",
            "https://hooks.test/done",
            "--result",
            "no-endpoint",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_delete_requires_ids() {
        assert!(Cli::try_parse_from(["scanlink", "delete"]).is_err());
    }

    #[test]
    fn test_cli_unknown_product_fails() {
        assert!(Cli::try_parse_from(["scanlink", "--product", "school", "credits"]).is_err());
    }
}
