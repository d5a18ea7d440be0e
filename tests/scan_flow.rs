use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

fn sentra_cmd(home: &Path, base_url: &str) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sentra"));
    cmd.env("HOME", home);
    cmd.env_remove("SENTRA_CONFIG");
    cmd.env_remove("SENTRA_UI_COLOR");
    cmd.env_remove("SENTRA_UI_MAX_TABLE_ROWS");
    cmd.env("SENTRA_API_BASE_URL", base_url);
    // Fast polling so the stage animation runs its course quickly.
    cmd.env("SENTRA_POLL_INTERVAL_MS", "25");
    cmd
}

fn make_temp_home() -> PathBuf {
    static HOME_SEQ: AtomicU64 = AtomicU64::new(0);

    let temp = std::env::temp_dir();
    let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
    let uniq = format!("sentra-scan-test-{}-{seq}", std::process::id());
    let home = temp.join(uniq);
    let _ = std::fs::remove_dir_all(&home);
    std::fs::create_dir_all(&home).expect("create home");
    home
}

fn json_response(body: serde_json::Value) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    tiny_http::Response::from_string(body.to_string()).with_header(
        tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap(),
    )
}

fn scan_record(stage: &str, status: &str) -> serde_json::Value {
    let mut record = serde_json::json!({
        "scan_id": "s1",
        "target": "example.com",
        "status": status,
        "scan_stage": stage,
        "created_at": "2026-08-24T10:00:00Z",
    });
    if status == "complete" {
        record["completed_at"] = serde_json::json!("2026-08-24T10:05:00Z");
        record["analysis"] = serde_json::json!("Two services exposed; TLS configuration is weak.");
        record["risk_score"] = serde_json::json!(7.5);
        record["risk_label"] = serde_json::json!("High");
    }
    record
}

fn fixes_body() -> serde_json::Value {
    serde_json::json!({
        "status": "complete",
        "os_detected": "Linux",
        "fix_count": 1,
        "fixes": {
            "os_detected": "Linux",
            "findings": [{
                "source": "nmap",
                "port": "22/tcp",
                "description": "OpenSSH allows password authentication",
                "severity": "medium",
                "commands": ["sudo sed -i 's/^#\\?PasswordAuthentication.*/PasswordAuthentication no/' /etc/ssh/sshd_config"]
            }],
            "ai_recommendations": "Disable password authentication and rotate host keys."
        }
    })
}

/// Mock backend: launch accepted, status advances through the pipeline
/// across polls, fixes available once complete.
fn spawn_backend() -> String {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("bind mock backend");
    let addr = server.server_addr().to_ip().expect("ip addr");
    let base_url = format!("http://{addr}");

    thread::spawn(move || {
        let mut polls: u32 = 0;
        for request in server.incoming_requests() {
            let method = request.method().clone();
            let url = request.url().to_string();
            match (method, url.as_str()) {
                (tiny_http::Method::Post, "/scan/start") => {
                    let _ = request.respond(json_response(serde_json::json!({
                        "scan_id": "s1",
                        "status": "started",
                    })));
                }
                (tiny_http::Method::Get, "/scan/s1") => {
                    let body = match polls {
                        0 => scan_record("nmap_running", "scanning"),
                        1 => scan_record("nikto_running", "scanning"),
                        2 => scan_record("analyzing", "analyzing"),
                        _ => scan_record("complete", "complete"),
                    };
                    polls += 1;
                    let _ = request.respond(json_response(body));
                }
                (tiny_http::Method::Get, "/scan/s1/fixes") => {
                    let _ = request.respond(json_response(fixes_body()));
                }
                _ => {
                    let _ = request.respond(
                        json_response(serde_json::json!({ "detail": "not found" }))
                            .with_status_code(404),
                    );
                }
            }
        }
    });

    base_url
}

#[test]
fn scan_follows_progress_to_a_sealed_result() {
    let home = make_temp_home();
    let base_url = spawn_backend();

    let out = sentra_cmd(&home, &base_url)
        .args(["scan", "example.com", "--json"])
        .output()
        .expect("run sentra");
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );

    let result: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse scan json");
    assert_eq!(result["scan"]["status"], "complete");
    assert_eq!(result["scan"]["target"], "example.com");
    assert_eq!(result["scan"]["risk_score"], 7.5);
    assert_eq!(result["fixes"]["os_detected"], "Linux");
    assert_eq!(result["fixes"]["findings"][0]["port"], "22/tcp");

    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn scan_prints_a_result_card_on_plain_output() {
    let home = make_temp_home();
    let base_url = spawn_backend();

    let out = sentra_cmd(&home, &base_url)
        .args(["scan", "example.com"])
        .output()
        .expect("run sentra");
    assert_eq!(out.status.code(), Some(0));

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Scan report: example.com"), "stdout={stdout}");
    assert!(stdout.contains("risk score: 7.5/10 High"), "stdout={stdout}");
    assert!(stdout.contains("22/tcp"), "stdout={stdout}");
    assert!(
        stdout.contains("Disable password authentication"),
        "stdout={stdout}"
    );

    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn scan_no_follow_reports_the_scan_id_and_stops() {
    let home = make_temp_home();
    let base_url = spawn_backend();

    let out = sentra_cmd(&home, &base_url)
        .args(["scan", "example.com", "--no-follow", "--json"])
        .output()
        .expect("run sentra");
    assert_eq!(out.status.code(), Some(0));

    let result: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse json");
    assert_eq!(result["scan_id"], "s1");

    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn refused_launch_exits_20_without_polling() {
    let home = make_temp_home();
    let server = tiny_http::Server::http("127.0.0.1:0").expect("bind mock backend");
    let addr = server.server_addr().to_ip().expect("ip addr");
    let base_url = format!("http://{addr}");

    thread::spawn(move || {
        for request in server.incoming_requests() {
            assert_eq!(request.url(), "/scan/start", "only the launch may be called");
            let _ = request.respond(
                json_response(serde_json::json!({
                    "detail": "target ownership could not be verified"
                }))
                .with_status_code(403),
            );
        }
    });

    let out = sentra_cmd(&home, &base_url)
        .args(["scan", "example.com"])
        .output()
        .expect("run sentra");
    assert_eq!(out.status.code(), Some(20));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(
        stderr.contains("target ownership could not be verified"),
        "stderr={stderr}"
    );

    let _ = std::fs::remove_dir_all(&home);
}
