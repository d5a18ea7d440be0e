use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::{Client, Response};

use crate::core::{ExportResponse, FixesResponse, Health, ScanRecord, ScanSummary, StartResponse};

/// Outcome of a launch request. A backend refusal (ownership verification
/// failed, bad target) is data for the transcript, not an error: it must
/// never throw across into state-update code.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started { scan_id: String },
    Refused { detail: String },
}

/// Blocking client for the Sentra scan backend. All operations are
/// read-or-submit calls with no local side effects; callers apply results.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("building the HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .with_context(|| format!("GET {path}: backend unreachable at {}", self.base_url))?;
        parse_json(resp, path)
    }

    pub fn fetch_scan(&self, scan_id: &str) -> Result<ScanRecord> {
        self.get_json(&format!("/scan/{scan_id}"))
    }

    /// Same payload as `fetch_scan`, but only valid for finished scans:
    /// the status record doubles as the report once complete.
    pub fn fetch_report(&self, scan_id: &str) -> Result<ScanRecord> {
        let record = self.fetch_scan(scan_id)?;
        if !record.is_complete() {
            return Err(anyhow!(
                "scan {scan_id} is not complete yet (status: {})",
                record.status
            ));
        }
        Ok(record)
    }

    pub fn fetch_fixes(&self, scan_id: &str) -> Result<FixesResponse> {
        self.get_json(&format!("/scan/{scan_id}/fixes"))
    }

    pub fn list_scans(&self) -> Result<Vec<ScanSummary>> {
        self.get_json("/scans")
    }

    pub fn health(&self) -> Result<Health> {
        self.get_json("/health")
    }

    pub fn export_report(&self, scan_id: &str) -> Result<ExportResponse> {
        self.get_json(&format!("/scan/{scan_id}/export"))
    }

    pub fn start_scan(&self, target: &str) -> Result<StartOutcome> {
        let resp = self
            .http
            .post(self.url("/scan/start"))
            .json(&serde_json::json!({ "target": target }))
            .send()
            .with_context(|| format!("POST /scan/start: backend unreachable at {}", self.base_url))?;

        let status = resp.status();
        let body: StartResponse = resp
            .json()
            .with_context(|| format!("POST /scan/start: invalid response ({status})"))?;

        if let Some(scan_id) = body.scan_id {
            return Ok(StartOutcome::Started { scan_id });
        }
        Ok(StartOutcome::Refused {
            detail: body
                .detail
                .unwrap_or_else(|| format!("launch rejected ({status})")),
        })
    }

    pub fn delete_scan(&self, scan_id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/scan/{scan_id}")))
            .send()
            .with_context(|| format!("DELETE /scan/{scan_id}: backend unreachable"))?;
        if !resp.status().is_success() {
            return Err(anyhow!(
                "DELETE /scan/{scan_id} failed: {}",
                describe_error(resp)
            ));
        }
        Ok(())
    }

    /// Websocket URL of the live log stream for a scan.
    pub fn log_stream_url(&self, scan_id: &str) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{}", self.base_url)
        };
        format!("{ws_base}/ws/scan/{scan_id}")
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(resp: Response, path: &str) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        return Err(anyhow!("GET {path} failed: {}", describe_error(resp)));
    }
    resp.json()
        .with_context(|| format!("GET {path}: invalid JSON response"))
}

/// Backend errors carry a `{"detail": ...}` body; fold it into the message.
fn describe_error(resp: Response) -> String {
    let status = resp.status();
    #[derive(serde::Deserialize)]
    struct Detail {
        detail: Option<String>,
    }
    match resp.json::<Detail>() {
        Ok(Detail { detail: Some(d) }) => format!("{status}: {d}"),
        _ => status.to_string(),
    }
}
