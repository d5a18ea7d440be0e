mod fixes;
mod scan;
mod stage;
mod transcript;

pub use fixes::{FixBundle, FixFinding, FixesResponse};
pub use scan::{ExportResponse, Health, ScanRecord, ScanSummary, StartResponse};
pub use stage::Stage;
pub use transcript::{EntryBody, Role, Transcript, TranscriptEntry};
