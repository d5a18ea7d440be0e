use serde::{Deserialize, Serialize};

/// Payload of `GET /scan/{id}/fixes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixesResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub os_detected: Option<String>,
    #[serde(default)]
    pub fix_count: Option<u64>,
    #[serde(default)]
    pub fixes: FixBundle,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixBundle {
    #[serde(default)]
    pub os_detected: String,
    #[serde(default)]
    pub findings: Vec<FixFinding>,
    #[serde(default)]
    pub ai_recommendations: String,
}

/// A remediation entry. `port` is set for nmap-sourced findings,
/// `finding` for nikto-sourced ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixFinding {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub finding: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub commands: Vec<String>,
}

impl FixFinding {
    pub fn subject(&self) -> &str {
        self.port
            .as_deref()
            .or(self.finding.as_deref())
            .unwrap_or("general")
    }
}
