use crate::app;
use std::path::Path;
use std::sync::Arc;
use taniclaw_core::error::TaniclawError;
use taniclaw_core::scheduler::Scheduler;

/// Sweep on the configured interval until Ctrl-C. The store is opened for
/// each sweep and released in between, so `act` and `run` keep working.
pub fn run(root: &Path) -> anyhow::Result<()> {
    let config = app::load_config(root)?;
    // fail on a broken project before the first tick
    drop(app::build_agent(root, &config)?);

    let project = root.to_path_buf();
    let sweep_config = config.clone();
    let scheduler = Scheduler::new(
        move || {
            app::build_agent(&project, &sweep_config)
                .map(Arc::new)
                .map_err(|e| TaniclawError::Setup(format!("{e:#}")))
        },
        &config.scheduler,
    );

    println!(
        "TaniClaw scheduler running every {} min, Ctrl-C to stop",
        scheduler.interval().as_secs() / 60
    );

    let rt = app::runtime()?;
    let sweeps = rt.block_on(scheduler.run_until(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl-C, stopping");
        }
    }));
    println!("Stopped after {sweeps} sweep(s).");
    Ok(())
}
