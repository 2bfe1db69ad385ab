//! prometheus alertmanager webhook receiver that runs local or remote
//! commands in response to alerts
//!
//! Features:
//! - runs a configured shell command on the local host, a command over
//!   ssh on a remote host, or both, for every received alert
//! - per alert overrides of user, key, host, command and timeouts via
//!   alert annotations
//! - known hosts backed ssh host key verification

use anyhow::{Context, Result};

mod action;
mod alert;
mod dispatcher;
mod executor;
mod log;
mod metrics;
mod settings;
mod telemetry_endpoint;
mod webhook_receiver;

/// exit the complete program if one thread panics
fn setup_panic_handler() {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
    setup_panic_handler();

    log::setup_logging().context("could not setup logging")?;
    metrics::setup_metrics();

    tokio::spawn(async {
        #[allow(clippy::expect_used)]
        webhook_receiver::run_webhook_receiver()
            .await
            .expect("alertmanager webhook receiver endpoint failed to start or crashed");
    });

    telemetry_endpoint::run_telemetry_endpoint().await;

    Ok(())
}
