use crate::core::{ScanRecord, Stage};

/// The server-side view extracted from one status poll. `scan_stage`
/// takes precedence over `status` as the fine-grained signal; a stage
/// name we do not know counts as no information for this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub complete: bool,
    pub server_stage: Option<Stage>,
}

impl StatusSnapshot {
    pub fn from_record(record: &ScanRecord) -> Self {
        let raw = record.scan_stage.as_deref().unwrap_or(&record.status);
        Self {
            complete: record.is_complete(),
            server_stage: raw.parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// No stage movement this tick.
    Unchanged,
    /// Local stage advanced or caught up to the given stage.
    Advanced(Stage),
    /// The entry is done: convert to a result, stop polling.
    Sealed,
}

/// Reconciles locally displayed progress against polled backend status.
///
/// The displayed stage never regresses and never moves more than one step
/// per tick, even when the backend is already far ahead: a scan that
/// finishes between two polls still walks through every intermediate stage
/// before sealing. Sealing is one-way; a sealed tracker ignores input.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    scan_id: String,
    stage: Stage,
    sealed: bool,
}

impl ProgressTracker {
    pub fn new(scan_id: impl Into<String>) -> Self {
        Self {
            scan_id: scan_id.into(),
            stage: Stage::first(),
            sealed: false,
        }
    }

    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// One reconciliation step. Callers skip this entirely on a failed
    /// fetch, so a poll error is a no-op by construction.
    pub fn on_status(&mut self, snap: &StatusSnapshot) -> Tick {
        if self.sealed {
            return Tick::Unchanged;
        }

        let current = self.stage;
        let server_idx = snap.server_stage.map(Stage::index);
        let behind = server_idx.is_some_and(|idx| current.index() < idx);

        let next = if behind || (snap.complete && !current.is_terminal()) {
            current.next()
        } else {
            // Catch up exactly; never move backwards or past server truth.
            match snap.server_stage {
                Some(server) if server > current => server,
                _ => current,
            }
        };

        let seal = next.is_terminal()
            || (snap.complete && current.index() >= Stage::GeneratingFixes.index());
        if seal {
            self.stage = next;
            self.sealed = true;
            return Tick::Sealed;
        }

        if next == current {
            Tick::Unchanged
        } else {
            self.stage = next;
            Tick::Advanced(next)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(complete: bool, stage: Option<Stage>) -> StatusSnapshot {
        StatusSnapshot {
            complete,
            server_stage: stage,
        }
    }

    #[test]
    fn snapshot_prefers_scan_stage_over_status() {
        let record = ScanRecord {
            status: "scanning".to_string(),
            scan_stage: Some("nikto_running".to_string()),
            ..ScanRecord::default()
        };
        let s = StatusSnapshot::from_record(&record);
        assert!(!s.complete);
        assert_eq!(s.server_stage, Some(Stage::NiktoRunning));

        // Coarse statuses that are not stage names carry no stage info.
        let record = ScanRecord {
            status: "pending".to_string(),
            ..ScanRecord::default()
        };
        assert_eq!(StatusSnapshot::from_record(&record).server_stage, None);
    }

    #[test]
    fn advances_one_step_per_tick_while_behind() {
        let mut t = ProgressTracker::new("s1");
        let server = snap(false, Some(Stage::NiktoDone));

        assert_eq!(t.on_status(&server), Tick::Advanced(Stage::NmapDone));
        assert_eq!(t.on_status(&server), Tick::Advanced(Stage::NiktoRunning));
        assert_eq!(t.on_status(&server), Tick::Advanced(Stage::NiktoDone));
        // Caught up: no movement until the server moves.
        assert_eq!(t.on_status(&server), Tick::Unchanged);
        assert_eq!(t.stage(), Stage::NiktoDone);
    }

    #[test]
    fn stage_index_is_monotone_and_single_step() {
        let inputs = [
            snap(false, Some(Stage::NmapRunning)),
            snap(false, None),
            snap(false, Some(Stage::NiktoDone)),
            snap(false, Some(Stage::NmapRunning)), // stale server view
            snap(false, Some(Stage::NiktoDone)),
            snap(true, Some(Stage::Complete)),
            snap(true, Some(Stage::Complete)),
            snap(true, Some(Stage::Complete)),
            snap(true, Some(Stage::Complete)),
        ];

        let mut t = ProgressTracker::new("s1");
        let mut prev = t.stage().index();
        for input in &inputs {
            let before = t.stage().index();
            t.on_status(input);
            let after = t.stage().index();
            assert!(after >= prev, "stage regressed: {prev} -> {after}");
            assert!(after - before <= 1, "skipped stages: {before} -> {after}");
            prev = after;
        }
    }

    #[test]
    fn fast_completion_still_animates_every_stage() {
        // Server jumps straight from nmap_running to complete between
        // two polls; the tracker must output each intermediate stage.
        let mut t = ProgressTracker::new("s1");
        let done = snap(true, Some(Stage::Complete));

        assert_eq!(t.on_status(&done), Tick::Advanced(Stage::NmapDone));
        assert_eq!(t.on_status(&done), Tick::Advanced(Stage::NiktoRunning));
        assert_eq!(t.on_status(&done), Tick::Advanced(Stage::NiktoDone));
        assert_eq!(t.on_status(&done), Tick::Advanced(Stage::Analyzing));
        assert_eq!(t.on_status(&done), Tick::Advanced(Stage::GeneratingFixes));
        assert_eq!(t.on_status(&done), Tick::Sealed);
        assert!(t.is_sealed());
    }

    #[test]
    fn short_pipeline_scenario_from_running_to_sealed() {
        // nmap_running -> (server already complete) -> nmap_done,
        // nikto_running, nikto_done, analyzing, generating_fixes, sealed.
        let mut t = ProgressTracker::new("s1");
        let done = snap(true, Some(Stage::Complete));
        let mut seen = vec![];
        loop {
            match t.on_status(&done) {
                Tick::Advanced(stage) => seen.push(stage),
                Tick::Sealed => break,
                Tick::Unchanged => panic!("stalled while backend is complete"),
            }
        }
        assert_eq!(
            seen,
            vec![
                Stage::NmapDone,
                Stage::NiktoRunning,
                Stage::NiktoDone,
                Stage::Analyzing,
                Stage::GeneratingFixes,
            ]
        );
    }

    #[test]
    fn sealed_tracker_ignores_further_input() {
        let mut t = ProgressTracker::new("s1");
        let done = snap(true, Some(Stage::Complete));
        while t.on_status(&done) != Tick::Sealed {}

        assert_eq!(t.on_status(&done), Tick::Unchanged);
        assert_eq!(t.on_status(&snap(false, Some(Stage::NmapRunning))), Tick::Unchanged);
        assert_eq!(t.stage(), Stage::Complete);
    }

    #[test]
    fn no_information_ticks_leave_stage_unchanged() {
        // fetchStatus failing is a skipped call; a parseable response with
        // an unknown stage behaves the same way.
        let mut t = ProgressTracker::new("s1");
        let nothing = snap(false, None);
        for _ in 0..3 {
            assert_eq!(t.on_status(&nothing), Tick::Unchanged);
        }
        assert_eq!(t.stage(), Stage::NmapRunning);

        let server = snap(false, Some(Stage::NmapDone));
        assert_eq!(t.on_status(&server), Tick::Advanced(Stage::NmapDone));
    }

    #[test]
    fn stale_server_stage_never_regresses_local() {
        let mut t = ProgressTracker::new("s1");
        let ahead = snap(false, Some(Stage::Analyzing));
        t.on_status(&ahead);
        t.on_status(&ahead);
        assert_eq!(t.stage(), Stage::NiktoRunning);

        let stale = snap(false, Some(Stage::NmapRunning));
        assert_eq!(t.on_status(&stale), Tick::Unchanged);
        assert_eq!(t.stage(), Stage::NiktoRunning);
    }

    #[test]
    fn seals_when_complete_and_local_reached_last_prestage() {
        let mut t = ProgressTracker::new("s1");
        let running = snap(false, Some(Stage::GeneratingFixes));
        while t.stage() != Stage::GeneratingFixes {
            t.on_status(&running);
        }
        // Backend flips to complete while we already display the last
        // pre-terminal stage: seal on the next tick.
        assert_eq!(t.on_status(&snap(true, Some(Stage::Complete))), Tick::Sealed);
    }
}
