use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One phase of the backend scan pipeline, in execution order.
/// The ordering is fixed: `index` is the sequence position and `complete`
/// is the only terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    NmapRunning,
    NmapDone,
    NiktoRunning,
    NiktoDone,
    Analyzing,
    GeneratingFixes,
    Complete,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::NmapRunning,
        Stage::NmapDone,
        Stage::NiktoRunning,
        Stage::NiktoDone,
        Stage::Analyzing,
        Stage::GeneratingFixes,
        Stage::Complete,
    ];

    pub const fn first() -> Stage {
        Stage::NmapRunning
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Sequence successor; saturates at the terminal stage.
    pub const fn next(self) -> Stage {
        match self {
            Stage::NmapRunning => Stage::NmapDone,
            Stage::NmapDone => Stage::NiktoRunning,
            Stage::NiktoRunning => Stage::NiktoDone,
            Stage::NiktoDone => Stage::Analyzing,
            Stage::Analyzing => Stage::GeneratingFixes,
            Stage::GeneratingFixes => Stage::Complete,
            Stage::Complete => Stage::Complete,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Stage::Complete)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::NmapRunning => "nmap_running",
            Stage::NmapDone => "nmap_done",
            Stage::NiktoRunning => "nikto_running",
            Stage::NiktoDone => "nikto_done",
            Stage::Analyzing => "analyzing",
            Stage::GeneratingFixes => "generating_fixes",
            Stage::Complete => "complete",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Stage::NmapRunning => "Network discovery running",
            Stage::NmapDone => "Network discovery done",
            Stage::NiktoRunning => "Web audit running",
            Stage::NiktoDone => "Web audit done",
            Stage::Analyzing => "AI analysis",
            Stage::GeneratingFixes => "Generating fixes",
            Stage::Complete => "Complete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "nmap_running" => Ok(Stage::NmapRunning),
            "nmap_done" => Ok(Stage::NmapDone),
            "nikto_running" => Ok(Stage::NiktoRunning),
            "nikto_done" => Ok(Stage::NiktoDone),
            "analyzing" => Ok(Stage::Analyzing),
            "generating_fixes" => Ok(Stage::GeneratingFixes),
            "complete" => Ok(Stage::Complete),
            other => Err(format!("unknown scan stage: {other}")),
        }
    }
}
