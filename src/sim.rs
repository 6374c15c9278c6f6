//! Request dispatch and tick scheduling
//!
//! One simulated device per TCP port: every inbound request on a port is
//! routed to that device's protocol adapter, and a shared interval task
//! ticks every device on a fixed cadence. Each device sits behind its own
//! async mutex, so tick, read and write serialize per device while devices
//! stay fully independent of each other.
//!
//! Incoming requests are matched on the full path including the query
//! string; some vendor write commands live in the query.

use crate::circontrol::CircontrolDevice;
use crate::config::{Config, DeviceConfig, Vendor};
use crate::device::{Device, WireResponse};
use crate::error::{AmpsimError, Result};
use crate::goe::GoeDevice;
use crate::logging::get_logger;
use crate::persistence::SessionStore;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::interval;

/// A device handle shared between its listener and the tick loop.
pub type SharedDevice = Arc<tokio::sync::Mutex<Box<dyn Device>>>;

/// Build the protocol adapter for one configured device.
pub fn build_device(config: &DeviceConfig, store: Option<SessionStore>) -> Result<Box<dyn Device>> {
    Ok(match config.vendor {
        Vendor::Goe => Box::new(GoeDevice::new(config, store)?),
        Vendor::Circontrol => Box::new(CircontrolDevice::new(config, store)?),
    })
}

struct SimDevice {
    port: u16,
    handle: SharedDevice,
}

/// The simulator: a fleet of devices, their listeners and the tick loop.
pub struct Simulator {
    host: String,
    tick_interval: std::time::Duration,
    devices: Vec<SimDevice>,
    logger: crate::logging::StructuredLogger,
}

impl Simulator {
    /// Construct all configured devices. Persistence is offered to every
    /// device; only those with a persistence identifier use it.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let store = SessionStore::new(&config.state_dir);
        let mut devices = Vec::with_capacity(config.devices.len());
        for device_config in &config.devices {
            let device = build_device(device_config, Some(store.clone()))?;
            devices.push(SimDevice {
                port: device_config.port,
                handle: Arc::new(tokio::sync::Mutex::new(device)),
            });
        }

        Ok(Self {
            host: config.host.clone(),
            tick_interval: std::time::Duration::from_millis(config.tick_interval_ms),
            devices,
            logger: get_logger("sim"),
        })
    }

    /// Bind one listener per device and drive the tick loop. Runs until the
    /// process is terminated.
    pub async fn run(self) -> Result<()> {
        for device in &self.devices {
            let addr: SocketAddr = format!("{}:{}", self.host, device.port)
                .parse()
                .map_err(|e| AmpsimError::web(format!("Invalid bind address: {}", e)))?;
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .map_err(|e| AmpsimError::web(format!("Failed to bind {}: {}", addr, e)))?;
            let router = device_router(device.handle.clone());
            self.logger.info(&format!("Device listening on {}", addr));

            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, router).await {
                    tracing::error!("Device server error: {}", e);
                }
            });
        }

        self.logger.info(&format!(
            "Simulating {} devices, tick every {:?}",
            self.devices.len(),
            self.tick_interval
        ));

        // Inbound requests interleave with the tick through each device's
        // mutex; a slow request shifts that device's update slightly, which
        // the time-delta-based integration absorbs.
        let mut tick = interval(self.tick_interval);
        loop {
            tick.tick().await;
            for device in &self.devices {
                device.handle.lock().await.update_state();
            }
        }
    }
}

/// Router answering every path on a device's port.
pub fn device_router(handle: SharedDevice) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(handle)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn dispatch(State(handle): State<SharedDevice>, request: Request<Body>) -> Response {
    // Keep the query string: vendor write commands may live there
    let path = request
        .uri()
        .path_and_query()
        .map_or_else(|| request.uri().path().to_string(), |pq| pq.as_str().to_string());

    let method = request.method().clone();
    if method == Method::GET {
        let device = handle.lock().await;
        wire_response(device.handle_read(&path))
    } else if method == Method::POST {
        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        let body = String::from_utf8_lossy(&bytes).to_string();
        let mut device = handle.lock().await;
        wire_response(device.handle_write(&path, &body))
    } else {
        StatusCode::METHOD_NOT_ALLOWED.into_response()
    }
}

fn wire_response(response: WireResponse) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, response.content_type)],
        response.body,
    )
        .into_response()
}
