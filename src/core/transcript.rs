use serde::{Deserialize, Serialize};

use crate::core::{FixBundle, ScanRecord, Stage};

pub const WELCOME_ID: &str = "welcome";

const WELCOME_TEXT: &str = "Welcome to Sentra operator console.\n\
Type `scan <target>` to launch a security scan, or `help` for commands.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Operator,
    Assistant,
}

/// The payload of a transcript entry. A scan entry transitions
/// `ScanProgress -> ScanResult` in place; it is never re-inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryBody {
    Text { text: String },
    ScanProgress { stage: Stage },
    ScanResult {
        report: Box<ScanRecord>,
        fixes: Option<FixBundle>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(flatten)]
    pub body: EntryBody,
}

impl TranscriptEntry {
    pub fn operator_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Operator,
            scan_id: None,
            target: None,
            body: EntryBody::Text { text: text.into() },
        }
    }

    pub fn assistant_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            scan_id: None,
            target: None,
            body: EntryBody::Text { text: text.into() },
        }
    }

    pub fn scan_progress(scan_id: impl Into<String>, target: impl Into<String>) -> Self {
        let scan_id = scan_id.into();
        Self {
            id: scan_id.clone(),
            role: Role::Assistant,
            scan_id: Some(scan_id),
            target: Some(target.into()),
            body: EntryBody::ScanProgress {
                stage: Stage::first(),
            },
        }
    }

    pub fn scan_result(
        scan_id: impl Into<String>,
        report: ScanRecord,
        fixes: Option<FixBundle>,
    ) -> Self {
        let scan_id = scan_id.into();
        let target = if report.target.is_empty() {
            None
        } else {
            Some(report.target.clone())
        };
        Self {
            id: format!("res-{scan_id}"),
            role: Role::Assistant,
            scan_id: Some(scan_id),
            target,
            body: EntryBody::ScanResult {
                report: Box::new(report),
                fixes,
            },
        }
    }

    pub fn is_progress(&self) -> bool {
        matches!(self.body, EntryBody::ScanProgress { .. })
    }

    pub fn is_result(&self) -> bool {
        matches!(self.body, EntryBody::ScanResult { .. })
    }
}

/// Ordered conversation log. Insertion order is conversation order;
/// entries are only ever patched in place, never reordered or replaced.
#[derive(Debug, Clone)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            entries: vec![TranscriptEntry::assistant_text(WELCOME_ID, WELCOME_TEXT)],
        }
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert at the end unless an entry with the same id already exists.
    /// Initialization paths may run more than once per session; duplicate
    /// ids must leave the transcript unchanged.
    pub fn append(&mut self, entry: TranscriptEntry) -> bool {
        if self.entries.iter().any(|e| e.id == entry.id) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Update the stage of the in-progress entry for `scan_id`.
    /// Sealed entries are never patched back to progress.
    pub fn patch_stage(&mut self, scan_id: &str, stage: Stage) -> bool {
        for entry in &mut self.entries {
            if entry.scan_id.as_deref() != Some(scan_id) {
                continue;
            }
            if let EntryBody::ScanProgress { stage: current } = &mut entry.body {
                *current = stage;
                return true;
            }
        }
        false
    }

    /// One-way `ScanProgress -> ScanResult` transition, in place.
    /// The entry keeps its id and position; fixes arrive later via
    /// `attach_fixes`.
    pub fn seal(&mut self, scan_id: &str, report: ScanRecord) -> bool {
        for entry in &mut self.entries {
            if entry.scan_id.as_deref() != Some(scan_id) {
                continue;
            }
            if entry.is_progress() {
                entry.body = EntryBody::ScanResult {
                    report: Box::new(report),
                    fixes: None,
                };
                return true;
            }
        }
        false
    }

    /// Convert a still-in-progress entry into a plain note. Used when a
    /// new launch supersedes a live scan, so at most one in-progress
    /// entry exists at a time. Sealed entries are left alone.
    pub fn supersede(&mut self, scan_id: &str) -> bool {
        for entry in &mut self.entries {
            if entry.scan_id.as_deref() != Some(scan_id) {
                continue;
            }
            if entry.is_progress() {
                let target = entry.target.as_deref().unwrap_or("target");
                entry.body = EntryBody::Text {
                    text: format!("Scan of {target} was superseded by a new launch."),
                };
                return true;
            }
        }
        false
    }

    /// Patch remediation data onto an already-sealed result entry.
    pub fn attach_fixes(&mut self, scan_id: &str, bundle: FixBundle) -> bool {
        for entry in &mut self.entries {
            if entry.scan_id.as_deref() != Some(scan_id) {
                continue;
            }
            if let EntryBody::ScanResult { fixes, .. } = &mut entry.body {
                *fixes = Some(bundle);
                return true;
            }
        }
        false
    }

    /// Reset to the welcome-only state.
    pub fn clear(&mut self) {
        *self = Transcript::new();
    }

    pub fn live_progress(&self) -> Option<&TranscriptEntry> {
        self.entries.iter().find(|e| e.is_progress())
    }

    pub fn has_scan(&self, scan_id: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.scan_id.as_deref() == Some(scan_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(scan_id: &str, status: &str) -> ScanRecord {
        ScanRecord {
            scan_id: Some(scan_id.to_string()),
            target: "example.com".to_string(),
            status: status.to_string(),
            ..ScanRecord::default()
        }
    }

    #[test]
    fn starts_with_welcome_only() {
        let t = Transcript::new();
        assert_eq!(t.len(), 1);
        assert_eq!(t.entries()[0].id, WELCOME_ID);
    }

    #[test]
    fn append_is_idempotent_by_id() {
        let mut t = Transcript::new();
        assert!(t.append(TranscriptEntry::scan_progress("s1", "example.com")));
        let before = t.entries().to_vec();
        assert!(!t.append(TranscriptEntry::scan_progress("s1", "example.com")));
        assert_eq!(t.entries(), before.as_slice());
    }

    #[test]
    fn patch_stage_keeps_order_and_identity() {
        let mut t = Transcript::new();
        t.append(TranscriptEntry::operator_text("op-1", "scan example.com"));
        t.append(TranscriptEntry::scan_progress("s1", "example.com"));
        t.append(TranscriptEntry::assistant_text("a-1", "later"));

        assert!(t.patch_stage("s1", Stage::Analyzing));
        let ids: Vec<&str> = t.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![WELCOME_ID, "op-1", "s1", "a-1"]);
        match &t.entries()[2].body {
            EntryBody::ScanProgress { stage } => assert_eq!(*stage, Stage::Analyzing),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn seal_transitions_in_place_and_is_one_way() {
        let mut t = Transcript::new();
        t.append(TranscriptEntry::scan_progress("s1", "example.com"));
        assert!(t.seal("s1", record("s1", "complete")));
        assert!(t.entries()[1].is_result());
        assert_eq!(t.entries()[1].id, "s1");

        // Further progress patches must not touch a sealed entry.
        assert!(!t.patch_stage("s1", Stage::NmapRunning));
        assert!(t.entries()[1].is_result());
        // Sealing twice is a no-op.
        assert!(!t.seal("s1", record("s1", "complete")));
    }

    #[test]
    fn attach_fixes_only_applies_to_sealed_entries() {
        let mut t = Transcript::new();
        t.append(TranscriptEntry::scan_progress("s1", "example.com"));
        assert!(!t.attach_fixes("s1", FixBundle::default()));

        t.seal("s1", record("s1", "complete"));
        let bundle = FixBundle {
            os_detected: "linux".to_string(),
            ..FixBundle::default()
        };
        assert!(t.attach_fixes("s1", bundle));
        match &t.entries()[1].body {
            EntryBody::ScanResult { fixes, .. } => {
                assert_eq!(fixes.as_ref().unwrap().os_detected, "linux");
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn supersede_converts_live_progress_to_a_note() {
        let mut t = Transcript::new();
        t.append(TranscriptEntry::scan_progress("s1", "a.example.com"));
        assert!(t.supersede("s1"));
        assert!(t.live_progress().is_none());
        match &t.entries()[1].body {
            EntryBody::Text { text } => {
                assert!(text.contains("a.example.com"), "text={text}");
                assert!(text.contains("superseded"), "text={text}");
            }
            other => panic!("unexpected body: {other:?}"),
        }

        // Sealed entries are never rewritten.
        t.append(TranscriptEntry::scan_progress("s2", "b.example.com"));
        t.seal("s2", record("s2", "complete"));
        assert!(!t.supersede("s2"));
        assert!(t.entries()[2].is_result());
    }

    #[test]
    fn clear_resets_to_welcome() {
        let mut t = Transcript::new();
        t.append(TranscriptEntry::scan_progress("s1", "example.com"));
        t.clear();
        assert_eq!(t.len(), 1);
        assert!(!t.has_scan("s1"));
    }

    #[test]
    fn at_most_one_live_progress_entry() {
        let mut t = Transcript::new();
        t.append(TranscriptEntry::scan_progress("s1", "a"));
        t.seal("s1", record("s1", "complete"));
        t.append(TranscriptEntry::scan_progress("s2", "b"));

        let progress: Vec<&str> = t
            .entries()
            .iter()
            .filter(|e| e.is_progress())
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(progress, vec!["s2"]);
    }
}
