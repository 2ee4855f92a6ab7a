//! End-to-end tests over a loopback TCP connection
//!
//! A small fake gateway answers like the real nanovoltmeter: one line per query,
//! framed with ``1` `` or `1'`, and lagging one query behind.

use resistivity_daq::acquisition::{AcquisitionController, EquipmentStatus};
use resistivity_daq::error::{AcquisitionError, ConnectError, LinkError};
use resistivity_daq::instrument::{Connector, LinkConfig, TcpConnector, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

const IDENTITY: &str = "KEITHLEY INSTRUMENTS INC.,MODEL 2182A,1234567,C02";

/// Spawn a fake instrument. Returns its port and the log of received commands.
async fn spawn_fake_instrument(readings: Vec<f64>) -> (u16, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let commands = Arc::new(Mutex::new(Vec::new()));
    let log = commands.clone();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let mut readings = readings.into_iter();
        let mut pending: Option<String> = None;

        while let Ok(Some(line)) = lines.next_line().await {
            let command = line.trim().to_string();
            log.lock().await.push(command.clone());
            let fresh = match command.as_str() {
                "*IDN?" => format!("1`{}\n", IDENTITY),
                "MEAS:FRES?" => format!("1'{:+E}\n", readings.next().unwrap_or(f64::NAN)),
                _ => continue,
            };
            let reply = pending.replace(fresh.clone()).unwrap_or(fresh);
            if write_half.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    (port, commands)
}

fn fast_config() -> LinkConfig {
    LinkConfig {
        query_timeout: Duration::from_millis(500),
        ..LinkConfig::default()
    }
    .with_min_query_delay(Duration::ZERO)
}

#[tokio::test]
async fn test_identify_over_tcp() {
    let (port, commands) = spawn_fake_instrument(Vec::new()).await;
    let controller = AcquisitionController::with_tcp(fast_config());

    controller.connect(Some("127.0.0.1"), Some(port)).await.unwrap();
    assert_eq!(controller.status(), EquipmentStatus::Connected);
    assert_eq!(controller.identity().as_deref(), Some(IDENTITY));
    assert_eq!(controller.identify().await.unwrap(), IDENTITY);

    // Probe: three flushes plus the query, then one query each for the two identifies.
    assert_eq!(commands.lock().await.len(), 6);
}

#[tokio::test]
async fn test_burst_over_tcp_discards_stale_replies() {
    let readings = vec![7.0e-5, 1.0e-4, 1.1e-4, 1.2e-4, 1.3e-4, 1.4e-4];
    let (port, commands) = spawn_fake_instrument(readings).await;
    let controller = AcquisitionController::with_tcp(fast_config());
    controller.connect(Some("127.0.0.1"), Some(port)).await.unwrap();
    commands.lock().await.clear();

    let burst = controller.measure_burst(3, 0.0).await.unwrap();
    // Flush: stale identity, then readings 1 and 2 are dropped; the burst then
    // receives readings 3, 4 and 5 as each query returns the previous answer.
    assert_eq!(burst, vec![1.1e-4, 1.2e-4, 1.3e-4]);
    assert_eq!(commands.lock().await.len(), 6);
}

#[tokio::test]
async fn test_connection_refused() {
    // Bind then drop to get a port nobody listens on.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let controller = AcquisitionController::with_tcp(fast_config());
    let err = controller
        .connect(Some("127.0.0.1"), Some(port))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AcquisitionError::Connect(ConnectError::CouldNotCreateLink { port: p, .. }) if p == port
    ));
    assert_eq!(controller.status(), EquipmentStatus::Disconnected);
}

#[tokio::test]
async fn test_silent_instrument_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        // Accept and hold the socket without ever answering.
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let mut transport = TcpConnector::default()
        .open("127.0.0.1", port)
        .await
        .unwrap();
    let err = transport
        .query("*IDN?", Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LinkError::Timeout {
            command: "*IDN?".to_string(),
            timeout_ms: 100
        }
    );
}
