//! http endpoint receiving alertmanager webhook payloads

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Extension, Json},
    http::StatusCode,
    routing::post,
    Router,
};
use prometheus::IntCounter;
use serde::Deserialize;

use crate::{alert, dispatcher, settings::Settings};

#[derive(Debug, Deserialize, Clone)]
pub struct AlertReceiverSettings {
    pub bind_address: IpAddr,
    pub port: u16,
}

impl AlertReceiverSettings {
    pub fn global() -> &'static Self {
        &Settings::global().alert_webhook_receiver
    }

    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

struct State {
    received_alerts: IntCounter,
}

impl State {
    fn new() -> Result<Self> {
        use prometheus::{opts, register_int_counter};

        let received_alerts = register_int_counter!(opts!(
            "received_alerts",
            "total number of deserialized alerts"
        )
        .namespace("command_responder")
        .subsystem("webhook"))?;

        Ok(Self { received_alerts })
    }
}

/// Accepts one webhook payload and spawns a dispatch task per
/// contained alert. Alerts are processed in parallel, every task owns
/// its alert and produces its own action configuration, so no state
/// is shared between dispatches. Dispatch errors are logged, never
/// reported back to the alertmanager.
async fn alertmanager_receiver(
    Extension(state): Extension<Arc<State>>,
    data: Result<Json<alert::Data>, JsonRejection>,
) -> StatusCode {
    match data {
        Ok(Json(data)) => {
            for alert in data.alerts {
                state.received_alerts.inc();

                tokio::spawn(async move {
                    let defaults = &Settings::global().defaults;
                    if let Err(err) = dispatcher::handle_alert(defaults, &alert).await {
                        tracing::error!(
                            alert = alert.fingerprint.as_str(),
                            "failed to respond to alert: {err}"
                        );
                    }
                });
            }
            StatusCode::OK
        }
        Err(err) => {
            tracing::debug!("failed to deserialize alert: {:?}", err);
            StatusCode::BAD_REQUEST
        }
    }
}

pub async fn run_webhook_receiver() -> Result<()> {
    let state = Arc::new(State::new()?);
    let addr = AlertReceiverSettings::global().to_socket_addr();

    let app = Router::new()
        .route("/alerts", post(alertmanager_receiver))
        .layer(Extension(state));

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .context("alertmanager webhook endpoint crashed")?;

    Ok(())
}
