//! stream-sim
//!
//! Runs the two-node streaming scenario: a server on one node streams CBR
//! packets to a client on another over a fixed-delay link, and a probe on
//! the client samples received throughput and mean one-way delay.
//!
//! # Flow
//!
//! 1. Load scenario configuration from `STREAM_*` environment variables
//! 2. Initialize tracing (plain or JSON) and the Prometheus recorder
//! 3. Build the simulation, schedule application start times
//! 4. Run until the configured duration
//! 5. Log per-interval samples and a summary

#![warn(clippy::pedantic)]

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use streaming_app::config::ScenarioConfig;
use streaming_app::runtime::SimTime;
use streaming_app::sim::Simulation;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVER_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(7, 0, 0, 2));
const CLIENT_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(7, 0, 0, 3));

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "streaming_app=info,stream_sim=info".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ScenarioConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    init_tracing(config.json_logs);

    let metrics_handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus recorder");
        e
    })?;

    info!(
        duration_s = config.duration.as_secs_f64(),
        data_rate = %config.data_rate,
        packet_size = config.packet_size,
        link_delay_ms = u64::try_from(config.link_delay.as_millis()).unwrap_or(u64::MAX),
        "Starting streaming scenario"
    );

    let mut sim = Simulation::new(config.link_delay);
    let server = sim.add_session(SERVER_IP, config.server_session());
    let client = sim.add_session(CLIENT_IP, config.client_session(SERVER_IP));

    let end = SimTime::ZERO + config.duration;
    sim.start_at(server, SimTime::ZERO + config.server_start);
    sim.start_at(client, SimTime::ZERO + config.client_start);
    sim.stop_at(server, end);
    sim.stop_at(client, end);
    let probe = sim.add_probe(client, config.probe_interval);

    sim.run_until(end).map_err(|e| {
        error!(error = %e, "Scenario aborted");
        e
    })?;

    if let Some(probe) = sim.probe(probe) {
        for sample in probe.samples() {
            info!(
                at = %sample.at,
                mbps = sample.mbps,
                packets = sample.packets,
                mean_delay_ms = sample
                    .mean_delay
                    .map_or(0.0, |d| d.as_secs_f64() * 1_000.0),
                "Throughput sample"
            );
        }
    }

    if let (Some(server), Some(client)) = (sim.session(server), sim.session(client)) {
        let received = client.total_bytes_received();
        let active = config
            .duration
            .saturating_sub(config.client_start)
            .max(Duration::from_millis(1));
        #[allow(clippy::cast_precision_loss)]
        let goodput_kbps = received as f64 * 8.0 / active.as_secs_f64() / 1_000.0;
        info!(
            server_packets_sent = server.packets_sent(),
            server_bytes_sent = server.total_bytes_sent(),
            client_packets_received = client.total_packets_received(),
            client_bytes_received = received,
            goodput_kbps,
            dropped = sim.dropped_datagrams(),
            "Scenario complete"
        );
    }

    if config.print_metrics {
        println!("{}", metrics_handle.render());
    }

    Ok(())
}
