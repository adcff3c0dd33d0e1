//! End-to-end scenarios on the in-process simulation harness.
//!
//! Default scenario: server on 7.0.0.2:2000 streaming 1472-byte packets at
//! 100 kb/s (117.76 ms per packet), client on 7.0.0.3:1000 requesting every
//! 250 ms, 10 ms one-way link delay. Server starts at 0.1 s, client at 1.9 s.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::net::SocketAddr;
use std::time::Duration;

use stream_test_utils::{request_frame, CLIENT_IP, SERVER_IP};
use streaming_app::config::{ConfigError, ScenarioConfig};
use streaming_app::errors::SessionError;
use streaming_app::runtime::SimTime;
use streaming_app::session::{RecordingObserver, SessionState, TraceDirection};
use streaming_app::sim::{AppId, Simulation};

const PACKET: u64 = 1472;

struct Scenario {
    sim: Simulation,
    server: AppId,
    client: AppId,
}

fn scenario(config: &ScenarioConfig) -> Scenario {
    let mut sim = Simulation::new(config.link_delay);
    let server = sim.add_session(SERVER_IP, config.server_session());
    let client = sim.add_session(CLIENT_IP, config.client_session(SERVER_IP));
    sim.start_at(server, SimTime::ZERO + config.server_start);
    sim.start_at(client, SimTime::ZERO + config.client_start);
    Scenario {
        sim,
        server,
        client,
    }
}

fn client_endpoint() -> SocketAddr {
    SocketAddr::new(CLIENT_IP, 1000)
}

fn server_endpoint() -> SocketAddr {
    SocketAddr::new(SERVER_IP, 2000)
}

#[test]
fn test_default_scenario_throughput() {
    let config = ScenarioConfig::default();
    let Scenario {
        mut sim,
        server,
        client,
    } = scenario(&config);
    let end = SimTime::from_millis(10_000);
    sim.stop_at(server, end);
    sim.stop_at(client, end);

    sim.run_until(end).unwrap();

    // First request lands at 1.91 s; packets arrive at 1.92 s + k * 117.76 ms
    let received = sim.session(client).unwrap().total_bytes_received();
    assert!(
        (67 * PACKET..=69 * PACKET).contains(&received),
        "received {received} bytes"
    );
    assert_eq!(received, 68 * PACKET);

    let server_session = sim.session(server).unwrap();
    assert_eq!(server_session.packets_sent(), 68);
    assert_eq!(server_session.connect_attempts(), 1);
    assert_eq!(server_session.state(), SessionState::Terminated);
    assert_eq!(sim.dropped_datagrams(), 0);

    // Client requests at 1.9 s + k * 250 ms up to 10 s
    let requests = sim.session(client).unwrap().packets_sent();
    assert_eq!(requests, 33);
    assert_eq!(server_session.total_packets_received(), 33);
}

#[test]
fn test_steady_state_matches_target_rate() {
    // Client up at 1 s leaves 9 s of streaming: 100 kb/s * 9 s / 8 bytes
    let config = ScenarioConfig {
        client_start: Duration::from_secs(1),
        ..ScenarioConfig::default()
    };
    let Scenario {
        mut sim, client, ..
    } = scenario(&config);

    sim.run_until(SimTime::from_millis(10_000)).unwrap();

    let expected = 100_000 * 9 / 8;
    let received = sim.session(client).unwrap().total_bytes_received();
    assert!(
        received.abs_diff(expected) <= PACKET,
        "received {received} bytes, expected {expected} +/- {PACKET}"
    );
}

#[test]
fn test_probe_reports_rate_and_link_delay() {
    let config = ScenarioConfig::default();
    let Scenario {
        mut sim, client, ..
    } = scenario(&config);
    let probe = sim.add_probe(client, Duration::from_secs(1));

    sim.run_until(SimTime::from_millis(10_000)).unwrap();

    let samples = sim.probe(probe).unwrap().samples();
    assert_eq!(samples.len(), 10);

    // Nothing before the client starts
    assert_eq!(samples[0].packets, 0);
    assert_eq!(samples[0].mbps, 0.0);
    assert!(samples[0].mean_delay.is_none());

    for sample in &samples[3..] {
        assert!(
            (0.08..=0.12).contains(&sample.mbps),
            "sample at {} reported {} Mb/s",
            sample.at,
            sample.mbps
        );
        assert_eq!(sample.mean_delay, Some(Duration::from_millis(10)));
    }

    let total: u64 = samples.iter().map(|s| s.bytes).sum();
    assert_eq!(total, sim.session(client).unwrap().total_bytes_received());
}

#[test]
fn test_server_pauses_when_requests_stop_and_resumes() {
    let config = ScenarioConfig::default();
    let Scenario {
        mut sim,
        server,
        client,
    } = scenario(&config);
    sim.stop_sending_at(client, SimTime::from_millis(4_000));

    // Last request arrives at 3.91 s; window is 2 x 375 ms
    sim.run_until(SimTime::from_millis(6_000)).unwrap();
    {
        let server_session = sim.session(server).unwrap();
        assert_eq!(server_session.state(), SessionState::Paused);
        assert_eq!(server_session.packets_sent(), 23);
        // Armed at 4.61848 s, paused at 4.66 s
        assert_eq!(server_session.residual_bits(), 4_152);
    }
    let before = sim.session(client).unwrap().total_bytes_received();

    // The client is silent, so resume it with a request from its address
    sim.inject_datagram(
        SimTime::from_millis(6_000),
        client_endpoint(),
        server_endpoint(),
        request_frame(server_endpoint(), 99, SimTime::from_millis(6_000)),
    );
    sim.run_until(SimTime::from_millis(6_500)).unwrap();

    let server_session = sim.session(server).unwrap();
    assert_eq!(server_session.state(), SessionState::Active);
    assert_eq!(server_session.connect_attempts(), 1);
    // Resume at 6.01 s, first packet 76.24 ms later, then every 117.76 ms
    assert_eq!(server_session.packets_sent(), 27);
    assert!(sim.session(client).unwrap().total_bytes_received() > before);
}

#[test]
fn test_spoofed_request_redirects_stream() {
    let config = ScenarioConfig::default();
    let Scenario {
        mut sim,
        server,
        client,
    } = scenario(&config);
    let spoofed: SocketAddr = "7.0.0.9:5555".parse().unwrap();
    sim.inject_datagram(
        SimTime::from_millis(5_000),
        spoofed,
        server_endpoint(),
        request_frame(server_endpoint(), 0, SimTime::from_millis(5_000)),
    );

    sim.run_until(SimTime::from_millis(5_100)).unwrap();
    assert_eq!(sim.session(server).unwrap().peer(), Some(spoofed));

    // The client's next request at 5.15 s takes the stream back
    sim.run_until(SimTime::from_millis(10_000)).unwrap();
    let server_session = sim.session(server).unwrap();
    assert_eq!(server_session.peer(), Some(client_endpoint()));
    assert_eq!(server_session.connect_attempts(), 3);
    // One packet went to the spoofed address and was dropped
    assert_eq!(sim.dropped_datagrams(), 1);
    assert_eq!(
        sim.session(client).unwrap().total_bytes_received(),
        67 * PACKET
    );
}

#[test]
fn test_max_bytes_scenario() {
    let config = ScenarioConfig {
        max_bytes: 5 * PACKET,
        ..ScenarioConfig::default()
    };
    let Scenario {
        mut sim,
        server,
        client,
    } = scenario(&config);

    sim.run_until(SimTime::from_millis(10_000)).unwrap();

    let server_session = sim.session(server).unwrap();
    assert_eq!(server_session.packets_sent(), 5);
    assert_eq!(server_session.stop_calls(), 1);
    assert_eq!(server_session.state(), SessionState::Terminated);
    assert_eq!(
        sim.session(client).unwrap().total_bytes_received(),
        5 * PACKET
    );
    // Requests after the server closed its socket have nowhere to go
    assert!(sim.dropped_datagrams() > 0);
}

#[test]
fn test_trace_observer_records_endpoints() {
    let config = ScenarioConfig::default();
    let Scenario {
        mut sim,
        server,
        client,
    } = scenario(&config);
    let server_trace = RecordingObserver::new();
    let client_trace = RecordingObserver::new();
    sim.add_observer(server, Box::new(server_trace.clone()));
    sim.add_observer(client, Box::new(client_trace.clone()));

    sim.run_until(SimTime::from_millis(2_100)).unwrap();

    let tx = server_trace.events_in(TraceDirection::Tx);
    assert_eq!(tx.len(), 1);
    assert_eq!(tx[0].source, Some(server_endpoint()));
    assert_eq!(tx[0].destination, Some(client_endpoint()));
    assert_eq!(tx[0].at, SimTime::from_nanos(2_027_760_000));

    let rx = client_trace.events_in(TraceDirection::Rx);
    assert_eq!(rx.len(), 1);
    assert_eq!(rx[0].at, SimTime::from_nanos(2_037_760_000));
    assert_eq!(rx[0].frame.sequence, 0);
    assert_eq!(rx[0].source, Some(server_endpoint()));
}

#[test]
fn test_misconfigured_server_aborts_run() {
    let config = ScenarioConfig {
        server_port: 0,
        ..ScenarioConfig::default()
    };
    let Scenario { mut sim, .. } = scenario(&config);

    let result = sim.run_until(SimTime::from_millis(1_000));

    assert!(matches!(
        result,
        Err(SessionError::Config(ConfigError::ServerPortRequired))
    ));
}
