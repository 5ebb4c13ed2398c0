//! Command-level checks of a full two-switch topology
//!
//! Runs the whole start/stop cycle against a recording runner, so no
//! privileges or Docker daemon are required.

use network_sim::{HostSpec, LinkParams, Network, RecordingRunner, Topology};
use std::net::Ipv4Addr;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("network_sim=debug")
        .try_init();
}

fn dumbbell(params: LinkParams) -> Topology {
    let mut topo = Topology::new();
    topo.add_controller("c0").unwrap();
    topo.add_docker_host(
        HostSpec::new("server", "video_streaming_server", Ipv4Addr::new(10, 0, 0, 1))
            .with_hostname("server"),
    )
    .unwrap();
    topo.add_docker_host(
        HostSpec::new("client", "video_streaming_client", Ipv4Addr::new(10, 0, 0, 2))
            .with_hostname("client"),
    )
    .unwrap();
    topo.add_switch("s1").unwrap();
    topo.add_switch("s2").unwrap();
    topo.add_link("s1", "server", LinkParams::unshaped()).unwrap();
    topo.add_link("s1", "s2", params).unwrap();
    topo.add_link("s2", "client", LinkParams::unshaped()).unwrap();
    topo
}

#[tokio::test]
async fn test_only_the_middle_link_is_shaped() {
    init_logging();
    let runner = RecordingRunner::new();
    runner.respond("inspect", "2000\n");
    let mut net = Network::new(dumbbell(LinkParams::shaped(10.0, 10.0)), &runner);

    net.start().await.expect("start");

    let shaped: Vec<String> = runner
        .calls()
        .into_iter()
        .filter(|c| c.contains("qdisc add"))
        .collect();
    assert_eq!(
        shaped,
        vec![
            "tc qdisc add dev s1-eth2 root handle 1: tbf rate 10000000bit burst 125000b latency 50ms",
            "tc qdisc add dev s1-eth2 parent 1:1 handle 10: netem delay 10000us",
            "tc qdisc add dev s2-eth1 root handle 1: tbf rate 10000000bit burst 125000b latency 50ms",
            "tc qdisc add dev s2-eth1 parent 1:1 handle 10: netem delay 10000us",
        ]
    );

    assert!(runner.position("ip -n mn.server addr add 10.0.0.1/8 dev server-eth0").is_some());
    assert!(runner.position("ip -n mn.client addr add 10.0.0.2/8 dev client-eth0").is_some());
    assert_eq!(net.host_container("server"), Some("mn.server"));
    assert_eq!(net.host_container("client"), Some("mn.client"));

    net.stop().await;
    assert_eq!(runner.count("docker rm -f mn."), 4, "stale cleanup plus teardown per host");
    assert!(runner.position("ip link del dev s2").is_some());
}

#[tokio::test]
async fn test_zero_delay_skips_netem() {
    init_logging();
    let runner = RecordingRunner::new();
    runner.respond("inspect", "2000\n");
    let mut net = Network::new(dumbbell(LinkParams::shaped(0.5, 0.0)), &runner);

    net.start().await.expect("start");
    assert_eq!(runner.count("netem"), 0);
    assert_eq!(runner.count("tbf rate 500000bit"), 2);
}
