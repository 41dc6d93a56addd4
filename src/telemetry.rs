//! Optional HTTP telemetry server: `GET /` returns the last snapshot as JSON (§6).
//! A single `tiny_http` worker thread owns the snapshot mutex; the hot receiver loop
//! only ever pushes into a bounded, drop-on-full channel and never blocks on it (§5).

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PositionSnapshot {
    pub latitude: f64,
    pub longitude: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolutionSnapshot {
    pub clock_bias: f64,
    pub position: PositionSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackedSatelliteSnapshot {
    pub satellite_id: u8,
    pub bit_boundary_found: bool,
    pub bit_phase: Option<&'static str>,
    pub carrier_frequency_shifts: Vec<f64>,
    pub correlations: Vec<[f64; 2]>,
    pub prn_code_phase_shifts: Vec<f64>,
    pub required_subframes_received: bool,
    pub subframe_count: usize,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UntrackedSatelliteSnapshot {
    pub satellite_id: u8,
    pub next_acquisition_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Snapshot {
    pub solutions: Vec<SolutionSnapshot>,
    pub tracked_satellites: Vec<TrackedSatelliteSnapshot>,
    pub untracked_satellites: Vec<UntrackedSatelliteSnapshot>,
}

/// The hot-loop side: pushes snapshots without ever blocking (§5).
pub struct SnapshotSender {
    tx: SyncSender<Snapshot>,
}

impl SnapshotSender {
    /// Pushes a snapshot. If the HTTP thread hasn't consumed the previous one yet, this
    /// one is dropped rather than blocking the ms-by-ms orchestration loop.
    pub fn send(&self, snapshot: Snapshot) {
        match self.tx.try_send(snapshot) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("telemetry server thread is gone; snapshots are no longer served");
            }
        }
    }
}

/// Starts the telemetry server on `port`, if nonzero. Returns the sender half the
/// receiver orchestration loop uses to publish snapshots.
pub fn start(port: u16) -> SnapshotSender {
    let (tx, rx) = sync_channel::<Snapshot>(1);

    if port == 0 {
        log::info!("telemetry server disabled (--http-port 0)");
        // Drain the channel so `try_send` never blocks even with no server running.
        std::thread::spawn(move || while rx.recv().is_ok() {});
        return SnapshotSender { tx };
    }

    let last = Arc::new(Mutex::new(None::<Snapshot>));
    let last_for_server = Arc::clone(&last);

    std::thread::Builder::new()
        .name("telemetry-updater".into())
        .spawn(move || update_loop(rx, last))
        .expect("failed to spawn telemetry-updater thread");

    std::thread::Builder::new()
        .name("telemetry-http".into())
        .spawn(move || serve(port, last_for_server))
        .expect("failed to spawn telemetry-http thread");

    SnapshotSender { tx }
}

fn update_loop(rx: Receiver<Snapshot>, last: Arc<Mutex<Option<Snapshot>>>) {
    while let Ok(snapshot) = rx.recv() {
        *last.lock().expect("telemetry mutex poisoned") = Some(snapshot);
    }
}

fn serve(port: u16, last: Arc<Mutex<Option<Snapshot>>>) {
    let server = match tiny_http::Server::http(("0.0.0.0", port)) {
        Ok(server) => server,
        Err(e) => {
            log::warn!("telemetry server failed to bind port {port}: {e}");
            return;
        }
    };
    log::info!("telemetry server listening on port {port}");

    for request in server.incoming_requests() {
        let body = {
            let guard = last.lock().expect("telemetry mutex poisoned");
            serde_json::to_string(&*guard).unwrap_or_else(|_| "null".to_string())
        };
        let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
            .expect("static header is valid");
        let response = tiny_http::Response::from_string(body).with_header(header);
        if let Err(e) = request.respond(response) {
            log::warn!("telemetry server failed to respond: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_null_for_empty_snapshot_option() {
        let body = serde_json::to_string(&None::<Snapshot>).unwrap();
        assert_eq!(body, "null");
    }

    #[test]
    fn serializes_populated_snapshot_shape() {
        let snapshot = Snapshot {
            solutions: vec![SolutionSnapshot {
                clock_bias: 0.001,
                position: PositionSnapshot {
                    latitude: 1.0,
                    longitude: 2.0,
                    height: 3.0,
                },
            }],
            tracked_satellites: Vec::new(),
            untracked_satellites: Vec::new(),
        };
        let body = serde_json::to_string(&snapshot).unwrap();
        assert!(body.contains("\"clock_bias\":0.001"));
        assert!(body.contains("\"latitude\":1.0"));
    }
}
