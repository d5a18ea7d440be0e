use std::io;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};

use crate::api::{ApiClient, StartOutcome};
use crate::core::EntryBody;
use crate::session::SessionController;
use crate::ui::UiConfig;

#[derive(Debug, Parser)]
#[command(
    name = "sentra",
    version,
    about = "Operator console for the Sentra scan backend: launch security scans, follow pipeline progress, and review analysis and remediation"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, default_value_t = 30, global = true)]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Console(ConsoleArgs),
    Scan(ScanArgs),
    Scans(ScansArgs),
    Show(ShowArgs),
    Fixes(FixesArgs),
    Export(ExportArgs),
    Delete(DeleteArgs),
    Health(HealthArgs),
    Config(ConfigArgs),
    Completion(CompletionArgs),
}

#[derive(Debug, Args)]
pub struct ConsoleArgs {}

#[derive(Debug, Args)]
pub struct ScanArgs {
    pub target: String,
    /// Launch only; do not follow progress to completion.
    #[arg(long)]
    pub no_follow: bool,
}

#[derive(Debug, Args)]
pub struct ScansArgs {}

#[derive(Debug, Args)]
pub struct ShowArgs {
    pub scan_id: String,
}

#[derive(Debug, Args)]
pub struct FixesArgs {
    pub scan_id: String,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    pub scan_id: String,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    pub scan_id: String,
}

#[derive(Debug, Args)]
pub struct HealthArgs {}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let stdin_is_tty = io::stdin().is_terminal();
    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();

    let home_dir = crate::config::home_dir()?;

    let env_config_path = std::env::var_os("SENTRA_CONFIG").map(PathBuf::from);
    let cfg = crate::config::load(
        cli.config.as_deref().or(env_config_path.as_deref()),
        &home_dir,
    )
    .map_err(crate::exit::invalid_args_err)?;

    let color = stdout_is_tty && cfg.ui.color && !cli.no_color;

    let ui_cfg = UiConfig {
        color,
        stdin_is_tty,
        stdout_is_tty,
        stderr_is_tty,
        max_table_rows: cfg.ui.max_table_rows,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let api = ApiClient::new(&cfg.api.base_url, Duration::from_secs(cli.timeout))?;
    let poll_interval = Duration::from_millis(cfg.poll.interval_ms.max(1));

    match cli.command {
        Commands::Console(_args) => {
            if cli.json {
                return Err(crate::exit::invalid_args(
                    "console cannot be combined with --json",
                ));
            }
            if !(ui_cfg.stdin_is_tty && ui_cfg.stdout_is_tty) {
                return Err(crate::exit::invalid_args(
                    "console requires a TTY (stdin + stdout)",
                ));
            }
            crate::tui::run(api, poll_interval, ui_cfg.color)?;
        }
        Commands::Scan(ref args) => {
            run_scan(&cli, &ui_cfg, api, poll_interval, args)?;
        }
        Commands::Scans(_args) => {
            let scans = api.list_scans()?;
            if cli.json {
                write_json(&scans)?;
            } else {
                crate::ui::print_scans_table(&scans, &ui_cfg);
            }
        }
        Commands::Show(args) => {
            let report = api.fetch_report(&args.scan_id)?;
            let fixes = api.fetch_fixes(&args.scan_id).ok().map(|r| r.fixes);
            if cli.json {
                write_json(&serde_json::json!({ "scan": report, "fixes": fixes }))?;
            } else {
                crate::ui::print_result_card(&report, fixes.as_ref(), &ui_cfg);
            }
        }
        Commands::Fixes(args) => {
            let resp = api.fetch_fixes(&args.scan_id)?;
            if cli.json {
                write_json(&resp)?;
            } else {
                crate::ui::print_fixes(&resp.fixes, &ui_cfg);
            }
        }
        Commands::Export(args) => {
            let resp = api.export_report(&args.scan_id)?;
            if cli.json {
                write_json(&resp)?;
            } else if !ui_cfg.quiet {
                println!("Report written: {}", resp.path);
            }
        }
        Commands::Delete(args) => {
            if cli.json {
                return Err(crate::exit::invalid_args(
                    "delete cannot be combined with --json",
                ));
            }
            if !(ui_cfg.stdin_is_tty && ui_cfg.stdout_is_tty) {
                return Err(crate::exit::invalid_args(
                    "delete requires a TTY (stdin + stdout)",
                ));
            }
            if !confirm_exact(
                &format!(
                    "This permanently deletes scan {} upstream. Type 'yes' to continue: ",
                    args.scan_id
                ),
                "yes",
            )? {
                if !ui_cfg.quiet {
                    eprintln!("Cancelled.");
                }
                return Ok(());
            }
            api.delete_scan(&args.scan_id)?;
            if !ui_cfg.quiet {
                println!("Deleted scan {}", args.scan_id);
            }
        }
        Commands::Health(_args) => {
            let health = api.health()?;
            if cli.json {
                write_json(&health)?;
            } else {
                crate::ui::print_health(&health, api.base_url(), &ui_cfg);
            }
        }
        Commands::Config(args) => {
            if args.show {
                if cli.json {
                    let stdout = std::io::stdout();
                    serde_json::to_writer_pretty(stdout.lock(), &cfg)?;
                } else {
                    println!("{}", toml::to_string_pretty(&cfg)?);
                }
            } else if !ui_cfg.quiet {
                eprintln!("config: use `sentra config --show`");
            }
        }
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = std::io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "sentra", &mut out);
        }
    }

    Ok(())
}

/// Launch a scan and, unless `--no-follow`, drive the session loop until
/// the result is sealed, animating stages one step per poll tick.
fn run_scan(
    cli: &Cli,
    ui_cfg: &UiConfig,
    api: ApiClient,
    poll_interval: Duration,
    args: &ScanArgs,
) -> Result<()> {
    let mut session = SessionController::new(api, poll_interval);

    let scan_id = match session.start_scan(&args.target)? {
        StartOutcome::Started { scan_id } => scan_id,
        StartOutcome::Refused { detail } => {
            return Err(crate::exit::launch_failed(format!(
                "launch failed: {detail}"
            )));
        }
    };

    if args.no_follow {
        if cli.json {
            write_json(&serde_json::json!({ "scan_id": scan_id }))?;
        } else if !ui_cfg.quiet {
            println!("Scan started: {scan_id}");
            println!("Follow it later with `sentra show {scan_id}`.");
        }
        return Ok(());
    }

    let progress_enabled = ui_cfg.stderr_is_tty && !cli.quiet && !cli.json;
    let pb = if progress_enabled {
        let pb = indicatif::ProgressBar::new_spinner();
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.set_message(crate::ui::format_stage_line(crate::core::Stage::first()));
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    while !session.idle() {
        session.tick(Instant::now());
        if session.pump() {
            if let (Some(pb), Some(stage)) = (&pb, session.live_stage()) {
                pb.set_message(crate::ui::format_stage_line(stage));
            }
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let sealed = session.transcript().entries().iter().find_map(|entry| {
        if entry.scan_id.as_deref() != Some(scan_id.as_str()) {
            return None;
        }
        match &entry.body {
            EntryBody::ScanResult { report, fixes } => Some((report.clone(), fixes.clone())),
            _ => None,
        }
    });

    match sealed {
        Some((report, fixes)) => {
            if cli.json {
                write_json(&serde_json::json!({ "scan": report, "fixes": fixes }))?;
            } else {
                crate::ui::print_result_card(&report, fixes.as_ref(), ui_cfg);
            }
            Ok(())
        }
        None => Err(anyhow::anyhow!(
            "scan {scan_id} did not reach a result; check the backend and retry with `sentra show {scan_id}`"
        )),
    }
}

fn write_json<T: serde::Serialize>(value: &T) -> Result<()> {
    use std::io::Write;

    let buf = serde_json::to_vec_pretty(value)?;

    let mut stdout = std::io::stdout().lock();
    match stdout.write_all(&buf) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    match stdout.write_all(b"\n") {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn confirm_exact(prompt: &str, expected: &str) -> Result<bool> {
    use std::io::{BufRead, Write};

    let mut stderr = std::io::stderr().lock();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;

    let mut input = String::new();
    let mut stdin = std::io::stdin().lock();
    let n = stdin.read_line(&mut input)?;
    if n == 0 {
        return Ok(false);
    }
    Ok(input.trim() == expected)
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        other => Err(crate::exit::invalid_args(format!(
            "unsupported shell: {other} (use bash|zsh|fish)"
        ))),
    }
}
