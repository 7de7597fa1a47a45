//! Command handlers

use super::settings::Settings;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use infrautomater_core::models::{ResourceType, TaskResult, TaskStatus};
use infrautomater_core::task::TaskReport;
use infrautomater_core::worker::{JobKind, Reconciler, Worker};
use infrautomater_core::workspace::{module_name, WorkspaceLayout};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

fn create_worker(settings: &Settings) -> Result<Arc<Worker>> {
    settings.ensure_valid()?;
    Ok(Arc::new(Worker::from_config(
        settings.store()?,
        settings.runner(),
        &settings.config,
    )))
}

/// Submit one job and wait for its last attempt
async fn run_job(settings: &Settings, kind: JobKind, request_id: i64) -> Result<Vec<TaskReport>> {
    let worker = create_worker(settings)?;
    tracing::info!(request_id, kind = %kind, mode = ?settings.config.mode, "Running job");

    worker.submit(kind, request_id);
    let reports = worker.drain().await;
    if reports.is_empty() {
        return Err(anyhow!("Job for request {} produced no result", request_id));
    }
    Ok(reports)
}

fn print_reports(reports: &[TaskReport], json: bool) -> Result<()> {
    let Some(last) = reports.last() else {
        return Ok(());
    };

    if json {
        let output = serde_json::json!({
            "status": last.result.status,
            "request_id": last.result.request_id,
            "message": last.result.message,
            "attempts": reports.len(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for (attempt, report) in reports.iter().enumerate() {
            println!(
                "Attempt {}: {}",
                attempt + 1,
                status_label(report.result.status)
            );
        }
        if let Some(message) = &last.result.message {
            println!();
            println!("{}", message);
        }
    }
    Ok(())
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Provisioned => "provisioned",
        TaskStatus::Destroyed => "destroyed",
        TaskStatus::Failed => "failed",
        TaskStatus::Skipped => "skipped",
        TaskStatus::Error => "error",
    }
}

fn ensure_succeeded(result: &TaskResult) -> Result<()> {
    match result.status {
        TaskStatus::Failed | TaskStatus::Error => Err(anyhow!(
            "Request {} ended with status {}",
            result.request_id,
            status_label(result.status)
        )),
        _ => Ok(()),
    }
}

/// Handle provision command
pub async fn handle_provision(settings: &Settings, request_id: i64, json: bool) -> Result<()> {
    let reports = run_job(settings, JobKind::Provision, request_id).await?;
    print_reports(&reports, json)?;
    match reports.last() {
        Some(last) => ensure_succeeded(&last.result),
        None => Ok(()),
    }
}

/// Handle destroy command
pub async fn handle_destroy(settings: &Settings, request_id: i64, json: bool) -> Result<()> {
    let reports = run_job(settings, JobKind::Destroy, request_id).await?;
    print_reports(&reports, json)?;
    match reports.last() {
        Some(last) => ensure_succeeded(&last.result),
        None => Ok(()),
    }
}

/// Handle run command: serve until Ctrl-C
pub async fn handle_run(
    settings: &Settings,
    poll_interval: Option<u64>,
    reconcile: bool,
) -> Result<()> {
    settings.ensure_valid()?;
    let config = &settings.config;
    let store = settings.store()?;

    let mut worker = Worker::from_config(store.clone(), settings.runner(), config);
    if reconcile {
        worker = worker.with_reconciler(Reconciler::from_config(store, config));
    }
    let worker = Arc::new(worker);

    let interval = Duration::from_secs(poll_interval.unwrap_or(config.poll_interval_seconds).max(1));
    println!(
        "Worker running in {} mode, polling every {}s (Ctrl-C to stop)",
        if config.mode.is_dry_run() { "dry-run" } else { "live" },
        interval.as_secs()
    );

    worker
        .serve(interval, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await;

    println!("Worker stopped");
    Ok(())
}

#[derive(Serialize)]
struct StaleEntry {
    request_id: i64,
    name: String,
    resource_type: String,
    stuck_minutes: i64,
}

/// Handle reconcile command
pub async fn handle_reconcile(settings: &Settings, redrive: bool, json: bool) -> Result<()> {
    settings.ensure_valid()?;
    let store = settings.store()?;
    let reconciler = Reconciler::from_config(store.clone(), &settings.config);
    let now = Utc::now();

    let stale: Vec<StaleEntry> = reconciler
        .find_stale(now)
        .context("Failed to list stale requests")?
        .into_iter()
        .map(|request| StaleEntry {
            request_id: request.id,
            stuck_minutes: (now - request.updated_at).num_minutes(),
            name: request.name,
            resource_type: request.resource_type,
        })
        .collect();

    let mut reports = Vec::new();
    if redrive && !stale.is_empty() {
        let worker = Arc::new(Worker::from_config(
            store,
            settings.runner(),
            &settings.config,
        ));
        reconciler
            .redrive(&worker, now)
            .context("Failed to re-drive stale requests")?;
        reports = worker.drain().await;
    }

    if json {
        let results: Vec<&TaskResult> = reports.iter().map(|r| &r.result).collect();
        let output = serde_json::json!({
            "stale": stale,
            "redriven": redrive,
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if stale.is_empty() {
        println!("No requests stuck in provisioning");
        return Ok(());
    }

    println!("Stale Requests");
    println!("==============");
    for entry in &stale {
        println!(
            "  #{:<6} {:<14} {:<24} {} min",
            entry.request_id, entry.resource_type, entry.name, entry.stuck_minutes
        );
    }

    if redrive {
        println!();
        for report in &reports {
            println!(
                "  #{:<6} {}",
                report.result.request_id,
                status_label(report.result.status)
            );
        }
    } else {
        println!();
        println!("Use 'infrautomater reconcile --redrive' to provision them again");
    }

    Ok(())
}

/// Handle status command
pub fn handle_status(settings: &Settings, request_id: i64, json: bool) -> Result<()> {
    let store = settings.store()?;
    let request = store
        .load_request(request_id)
        .context("Failed to read request store")?
        .ok_or_else(|| anyhow!("Request {} not found", request_id))?;

    let layout = WorkspaceLayout::new(&settings.config.workspaces_root);
    let workspace = layout.workspace_dir(request_id);

    if json {
        let output = serde_json::json!({
            "request": request,
            "workspace": workspace.display().to_string(),
            "workspace_exists": layout.exists(request_id),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Request Status");
        println!("==============");
        println!("Request ID:     {}", request.id);
        println!("Name:           {}", request.name);
        println!("Type:           {}", request.resource_type);
        println!("Team:           {}", request.team_id);
        println!("Status:         {}", request.status);
        println!(
            "Updated At:     {}",
            request.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!(
            "Workspace:      {}{}",
            workspace.display(),
            if layout.exists(request_id) { "" } else { " (absent)" }
        );
        if !request.notes().is_empty() {
            println!();
            println!("Notes");
            println!("-----");
            println!("{}", request.notes());
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct Check {
    name: String,
    ok: bool,
    detail: String,
}

impl Check {
    fn new(name: impl Into<String>, ok: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok,
            detail: detail.into(),
        }
    }
}

/// Handle check command
pub async fn handle_check(settings: &Settings, json: bool) -> Result<()> {
    let config = &settings.config;
    let mut checks = Vec::new();

    checks.push(match config.validate() {
        Ok(()) => Check::new("configuration", true, settings.config_path.display().to_string()),
        Err(errors) => Check::new("configuration", false, errors.join("; ")),
    });

    let runner = settings.runner();
    let probe_dir = std::env::temp_dir();
    checks.push(match runner.run(&probe_dir, &["version"]).await {
        Ok(output) if output.success => Check::new(
            "terraform",
            true,
            output.stdout.lines().next().unwrap_or_default().to_string(),
        ),
        Ok(output) => Check::new("terraform", false, output.diagnostic()),
        Err(e) => Check::new("terraform", false, e.to_string()),
    });

    checks.push(
        match std::fs::create_dir_all(&config.workspaces_root) {
            Ok(()) => Check::new(
                "workspaces_root",
                true,
                config.workspaces_root.display().to_string(),
            ),
            Err(e) => Check::new(
                "workspaces_root",
                false,
                format!("{}: {}", config.workspaces_root.display(), e),
            ),
        },
    );

    for kind in ResourceType::ALL {
        let module = config.modules_root.join(module_name(kind));
        checks.push(Check::new(
            format!("module {}", kind),
            module.is_dir(),
            module.display().to_string(),
        ));
    }

    let healthy = checks.iter().all(|c| c.ok);

    if json {
        let output = serde_json::json!({
            "healthy": healthy,
            "mode": config.mode,
            "checks": checks,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for check in &checks {
            let mark = if check.ok { "✅" } else { "❌" };
            println!("{} {:<22} {}", mark, check.name, check.detail);
        }
    }

    if healthy {
        Ok(())
    } else {
        Err(anyhow!("Environment check failed"))
    }
}
