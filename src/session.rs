use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::api::{ApiClient, StartOutcome};
use crate::core::{FixesResponse, ScanRecord, Transcript, TranscriptEntry};
use crate::tracker::{ProgressTracker, StatusSnapshot, Tick};

const HELP_TEXT: &str = "Commands:\n\
  scan <target>     launch a security scan against a host or IP\n\
  open <scan-id>    pull a finished scan into the conversation\n\
  delete <scan-id>  delete a scan upstream and start a new session\n\
  help              show this message";

/// An in-flight backend fetch running on a worker thread. The generation
/// tag is the liveness flag: results that arrive after the owning scan was
/// superseded or the session cleared are discarded, not applied.
struct PendingFetch<T> {
    generation: u64,
    rx: mpsc::Receiver<Result<T>>,
}

impl<T: Send + 'static> PendingFetch<T> {
    fn spawn(
        generation: u64,
        job: impl FnOnce() -> Result<T> + Send + 'static,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(job());
        });
        Self { generation, rx }
    }
}

struct LiveScan {
    tracker: ProgressTracker,
    generation: u64,
    last_poll: Option<Instant>,
    pending_status: Option<PendingFetch<ScanRecord>>,
}

/// Wires one transcript to at most one live (actively polled) scan.
///
/// Polling is timer-driven and cooperative: `tick` starts at most one
/// status fetch per interval and never while a previous fetch for the same
/// scan is still pending; `pump` applies finished fetches. All transcript
/// mutation happens here, on the caller's thread.
pub struct SessionController {
    api: ApiClient,
    transcript: Transcript,
    live: Option<LiveScan>,
    pending_fixes: Vec<(String, PendingFetch<FixesResponse>)>,
    generation: u64,
    poll_interval: Duration,
    entry_seq: u64,
}

impl SessionController {
    pub fn new(api: ApiClient, poll_interval: Duration) -> Self {
        Self {
            api,
            transcript: Transcript::new(),
            live: None,
            pending_fixes: Vec::new(),
            generation: 0,
            poll_interval,
            entry_seq: 0,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn live_scan_id(&self) -> Option<&str> {
        self.live.as_ref().map(|l| l.tracker.scan_id())
    }

    pub fn live_stage(&self) -> Option<crate::core::Stage> {
        self.live.as_ref().map(|l| l.tracker.stage())
    }

    /// False while a scan is being polled or a fixes fetch is outstanding.
    pub fn idle(&self) -> bool {
        self.live.is_none() && self.pending_fixes.is_empty()
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.entry_seq += 1;
        format!("{prefix}-{}", self.entry_seq)
    }

    /// Operator input from the console. Scan launches go to the backend;
    /// everything else is answered locally (intent routing is backend AI
    /// and out of scope for the console).
    pub fn submit(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        if line.eq_ignore_ascii_case("help") {
            let op = self.next_id("op");
            self.transcript
                .append(TranscriptEntry::operator_text(op, line));
            let id = self.next_id("help");
            self.transcript
                .append(TranscriptEntry::assistant_text(id, HELP_TEXT));
            return Ok(());
        }

        if let Some(target) = parse_scan_command(line) {
            let op = self.next_id("op");
            self.transcript
                .append(TranscriptEntry::operator_text(op, line));
            self.start_scan(&target)?;
            return Ok(());
        }

        if let Some(scan_id) = parse_arg_command(line, "open") {
            if !self.select_scan(&scan_id)? {
                let id = self.next_id("hint");
                self.transcript.append(TranscriptEntry::assistant_text(
                    id,
                    "That scan is already in the conversation.",
                ));
            }
            return Ok(());
        }

        if let Some(scan_id) = parse_arg_command(line, "delete") {
            self.delete_scan(&scan_id)?;
            let id = self.next_id("note");
            self.transcript.append(TranscriptEntry::assistant_text(
                id,
                format!("Deleted scan {scan_id} and started a new session."),
            ));
            return Ok(());
        }

        let op = self.next_id("op");
        self.transcript
            .append(TranscriptEntry::operator_text(op, line));
        let id = self.next_id("hint");
        self.transcript.append(TranscriptEntry::assistant_text(
            id,
            "I did not recognize that. Type `scan <target>` to launch a scan, or `help`.",
        ));
        Ok(())
    }

    /// Launch a scan and mark it live. A refusal produces exactly one
    /// informational transcript entry: no session, no polling.
    pub fn start_scan(&mut self, target: &str) -> Result<StartOutcome> {
        let outcome = self.api.start_scan(target)?;
        match &outcome {
            StartOutcome::Started { scan_id } => {
                // A new launch supersedes any prior live scan: its polling
                // stops (dropping the pending fetch discards late results)
                // and its progress entry becomes a plain note, so at most
                // one in-progress entry exists.
                if let Some(prev) = self.live.take() {
                    self.transcript.supersede(prev.tracker.scan_id());
                }
                self.transcript
                    .append(TranscriptEntry::scan_progress(scan_id.clone(), target));
                self.live = Some(LiveScan {
                    tracker: ProgressTracker::new(scan_id.clone()),
                    generation: self.generation,
                    last_poll: None,
                    pending_status: None,
                });
            }
            StartOutcome::Refused { detail } => {
                let id = self.next_id("launch-err");
                self.transcript.append(TranscriptEntry::assistant_text(
                    id,
                    format!("Launch failed: {detail}"),
                ));
            }
        }
        Ok(outcome)
    }

    /// Open a previously completed scan from history: a single fetch,
    /// never polled, appended at most once per scan id.
    pub fn select_scan(&mut self, scan_id: &str) -> Result<bool> {
        if self.transcript.has_scan(scan_id) {
            return Ok(false);
        }
        let report = self.api.fetch_report(scan_id)?;
        // Missing remediation data must not block showing the result.
        let fixes = self.api.fetch_fixes(scan_id).ok().map(|r| r.fixes);

        let op = self.next_id("op");
        self.transcript.append(TranscriptEntry::operator_text(
            op,
            format!("View scan: {}", report.target),
        ));
        self.transcript
            .append(TranscriptEntry::scan_result(scan_id, report, fixes));
        Ok(true)
    }

    /// Clear the conversation and stop any active polling. In-flight
    /// fetches are orphaned by the generation bump and discarded on
    /// arrival.
    pub fn new_session(&mut self) {
        self.generation += 1;
        self.live = None;
        self.pending_fixes.clear();
        self.transcript.clear();
    }

    pub fn delete_scan(&mut self, scan_id: &str) -> Result<()> {
        self.api.delete_scan(scan_id)?;
        self.new_session();
        Ok(())
    }

    /// Timer tick: start one status fetch if the interval elapsed and no
    /// fetch for this scan is already pending (overlapping ticks coalesce).
    pub fn tick(&mut self, now: Instant) {
        let Some(live) = &mut self.live else { return };
        if live.pending_status.is_some() {
            return;
        }
        let due = match live.last_poll {
            None => true,
            Some(at) => now.duration_since(at) >= self.poll_interval,
        };
        if !due {
            return;
        }
        live.last_poll = Some(now);
        let api = self.api.clone();
        let scan_id = live.tracker.scan_id().to_string();
        live.pending_status = Some(PendingFetch::spawn(live.generation, move || {
            api.fetch_scan(&scan_id)
        }));
    }

    /// Drain finished fetches and apply them. Returns true if the
    /// transcript changed.
    pub fn pump(&mut self) -> bool {
        let mut changed = self.pump_status();
        changed |= self.pump_fixes();
        changed
    }

    fn pump_status(&mut self) -> bool {
        let Some(live) = &mut self.live else {
            return false;
        };
        let Some(pending) = &live.pending_status else {
            return false;
        };
        let result = match pending.rx.try_recv() {
            Ok(result) => result,
            Err(mpsc::TryRecvError::Empty) => return false,
            Err(mpsc::TryRecvError::Disconnected) => {
                live.pending_status = None;
                return false;
            }
        };
        let generation = pending.generation;
        live.pending_status = None;

        if generation != self.generation {
            return false;
        }
        let record = match result {
            Ok(record) => record,
            // Transient fetch failure: no information this tick, retry on
            // the next interval.
            Err(_) => return false,
        };

        let snapshot = StatusSnapshot::from_record(&record);
        let scan_id = live.tracker.scan_id().to_string();
        match live.tracker.on_status(&snapshot) {
            Tick::Unchanged => false,
            Tick::Advanced(stage) => self.transcript.patch_stage(&scan_id, stage),
            Tick::Sealed => {
                self.transcript.seal(&scan_id, record);
                self.live = None;
                let api = self.api.clone();
                let id = scan_id.clone();
                self.pending_fixes.push((
                    scan_id,
                    PendingFetch::spawn(generation, move || api.fetch_fixes(&id)),
                ));
                true
            }
        }
    }

    fn pump_fixes(&mut self) -> bool {
        let mut changed = false;
        let mut done = Vec::new();
        for (idx, (scan_id, pending)) in self.pending_fixes.iter().enumerate() {
            let result = match pending.rx.try_recv() {
                Ok(result) => result,
                Err(mpsc::TryRecvError::Empty) => continue,
                Err(mpsc::TryRecvError::Disconnected) => {
                    done.push(idx);
                    continue;
                }
            };
            done.push(idx);
            if pending.generation != self.generation {
                continue;
            }
            match result {
                Ok(resp) => {
                    changed |= self.transcript.attach_fixes(scan_id, resp.fixes);
                }
                // The result entry stays sealed with partial data.
                Err(_) => {}
            }
        }
        for idx in done.into_iter().rev() {
            self.pending_fixes.remove(idx);
        }
        changed
    }
}

/// `<verb> <arg>` with exactly one argument.
fn parse_arg_command(line: &str, verb: &str) -> Option<String> {
    let mut parts = line.split_whitespace();
    if !parts.next()?.eq_ignore_ascii_case(verb) {
        return None;
    }
    let arg = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some(arg.to_string())
}

/// `scan <target>`, or a bare host/IP the way the operator would type it.
fn parse_scan_command(line: &str) -> Option<String> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    if first.eq_ignore_ascii_case("scan") {
        let target = parts.next()?;
        return Some(target.to_string());
    }
    if parts.next().is_none() && looks_like_target(first) {
        return Some(first.to_string());
    }
    None
}

fn looks_like_target(word: &str) -> bool {
    word == "localhost"
        || word.contains('.')
            && word
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'))
}
