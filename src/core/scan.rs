use serde::{Deserialize, Serialize};

/// Payload of `GET /scan/{id}`. The backend returns the same record for
/// status polling and for the final report; report fields stay `None`
/// until the corresponding pipeline step has run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    #[serde(default)]
    pub scan_id: Option<String>,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub scan_stage: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub nmap: Option<String>,
    #[serde(default)]
    pub nikto: Option<String>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub risk_label: Option<String>,
}

impl ScanRecord {
    pub fn is_complete(&self) -> bool {
        self.status == "complete"
    }
}

/// One row of `GET /scans`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub scan_id: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub risk_score: Option<f64>,
}

/// Payload of `POST /scan/start`. A refusal carries `detail` and no id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub scan_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Health {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub nmap_available: bool,
    #[serde(default)]
    pub nikto_available: bool,
    #[serde(default)]
    pub active_scans: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub path: String,
}
