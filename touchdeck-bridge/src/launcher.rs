//! Process-level startup: logging, the device runtime, panel setup, and
//! the window loop.

use tracing_subscriber::fmt::MakeWriter;

use touchdeck_core::{Environment, LaunchConfig, Panel};

use crate::error::StartupError;
use crate::shell;

/// Install the global subscriber at `config`'s level, writing to `writer`.
/// Returns false when one was already installed.
pub fn init_logging<W>(config: &LaunchConfig, writer: W) -> bool
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .with_writer(writer)
        .try_init()
        .is_ok()
}

/// Build the panel with `init`, then run it until it quits.
///
/// `init` receives an empty panel and a live environment to register
/// devices with. A `LayoutError` it returns comes back as
/// `StartupError::Setup`.
pub fn run_application<F>(config: LaunchConfig, init: F) -> Result<(), StartupError>
where
    F: FnOnce(&mut Panel, &mut Environment) -> anyhow::Result<()>,
{
    let (panel, env) = prepare(init)?;
    tracing::info!(
        "touchdeck v{} starting with {} page(s), {} device(s)",
        env!("CARGO_PKG_VERSION"),
        panel.page_count(),
        env.devices().len()
    );
    shell::run(config, panel, env)
}

/// Run panel setup without opening a window.
pub fn prepare<F>(init: F) -> Result<(Panel, Environment), StartupError>
where
    F: FnOnce(&mut Panel, &mut Environment) -> anyhow::Result<()>,
{
    let mut env = Environment::new()?;
    let mut panel = Panel::new();
    if let Err(e) = init(&mut panel, &mut env) {
        env.shutdown(std::time::Duration::ZERO);
        return Err(StartupError::from_init(e));
    }
    if panel.page_count() == 0 {
        tracing::warn!("Panel has no pages; only the tab bar will be drawn");
    }
    Ok((panel, env))
}
