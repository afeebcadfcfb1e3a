use std::sync::Arc;

use runwatch_core::{Phase, RunId};
use runwatch_engine::{RunHooks, TelemetryHandle, TriggerOutcome};
use runwatch_logging::{rw_info, rw_warn};
use tokio::sync::broadcast::error::RecvError;

use crate::config::AppConfig;
use crate::render;

struct ConsoleHooks;

impl RunHooks for ConsoleHooks {
    fn run_active(&self, active: bool) {
        if active {
            rw_info!("run active; start disabled");
        } else {
            rw_info!("no run active; start enabled");
        }
    }

    fn refresh_downstream(&self, run_id: &RunId) {
        rw_info!("run {} complete; downstream views are stale", run_id);
    }
}

/// Follows runs until interrupted, or until the first observed run ends when
/// `until_done` is set.
pub async fn run(config: AppConfig, start: bool, until_done: bool) -> anyhow::Result<()> {
    let handle = TelemetryHandle::start(
        config.supervisor.clone(),
        config.pipeline.clone(),
        Arc::new(ConsoleHooks),
    )?;

    let mut snapshots = handle.snapshots();
    let mut renderables = handle.renderables();

    if start {
        let reply = handle.start_run();
        tokio::spawn(async move {
            match reply.await {
                Ok(Ok(TriggerOutcome::Started { run_id })) => match run_id {
                    Some(id) => rw_info!("run {} started", id),
                    None => rw_info!("run started"),
                },
                Ok(Ok(TriggerOutcome::Skipped { reason })) => {
                    rw_warn!("run not started: {}", reason)
                }
                Ok(Err(err)) => rw_warn!("run not started: {}", err),
                Err(_) => rw_warn!("engine stopped before the run was triggered"),
            }
        });
    }

    let mut last_rendered = Vec::new();
    let mut seen_active = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                rw_info!("interrupted");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                let lines = render::render_snapshot(&snapshot);
                if lines != last_rendered {
                    for line in &lines {
                        println!("{line}");
                    }
                    last_rendered = lines;
                }
                seen_active |= snapshot.run_active;
                let finished = matches!(snapshot.timeline.phase, Phase::Done | Phase::Error);
                if until_done && seen_active && finished {
                    break;
                }
            }
            item = renderables.recv() => match item {
                Ok(item) => println!("{}", render::render_renderable(&item)),
                Err(RecvError::Lagged(skipped)) => {
                    rw_warn!("renderer fell behind; {} items skipped", skipped)
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    // Joins the engine thread.
    tokio::task::spawn_blocking(move || handle.shutdown()).await?;
    Ok(())
}
