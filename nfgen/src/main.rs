//! Synthetic NetFlow v5 exporter.
//!
//! Thin driver around [`nfgen_payload`]: builds packets at a fixed rate and
//! sends them to a collector under test over UDP. The exporter state the
//! builder needs for stream continuity, the simulated boot instant and the
//! cumulative flow count, lives in the send loop here and is re-supplied on
//! every call.

use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use clap::Parser;
use nfgen_payload::{NetFlowV5, netflow_v5};
use rand::{SeedableRng, rngs::StdRng};
use tokio::{net::UdpSocket, runtime::Builder, time};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Failed to deserialize payload config: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    #[error("Payload construction failed: {0}")]
    Payload(#[from] nfgen_payload::Error),
}

#[derive(Parser, Debug)]
#[clap(author, version, about = "Emits a stream of synthetic NetFlow v5 packets", long_about = None)]
struct Args {
    /// Address of the collector under test
    #[clap(short, long)]
    target: SocketAddr,
    /// Packets to emit per second
    #[clap(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    packets_per_second: u32,
    /// Flow records per packet, 1 to 30
    #[clap(long, default_value_t = 30, value_parser = clap::value_parser!(u16).range(1..=30))]
    flows_per_packet: u16,
    /// Stop after this many packets; 0 runs until interrupted
    #[clap(long, default_value_t = 0)]
    max_packets: u64,
    /// Seed for the random source, for reproducible streams
    #[clap(short, long)]
    seed: Option<u64>,
    /// Path to a YAML file tuning payload field ranges
    #[clap(short, long)]
    config_path: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<netflow_v5::Config, Error> {
    match path {
        Some(path) => {
            let contents = fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&contents)?)
        }
        None => Ok(netflow_v5::Config::default()),
    }
}

/// Send one datagram, binding a fresh socket when none is held.
///
/// Returns the socket for reuse when the send succeeded. A bind or send
/// failure drops the socket so the next call rebinds.
async fn send_packet(
    connection: Option<UdpSocket>,
    payload: &[u8],
    target: SocketAddr,
) -> Option<UdpSocket> {
    let socket = match connection {
        Some(socket) => socket,
        None => match UdpSocket::bind("0.0.0.0:0").await {
            Ok(socket) => {
                debug!("UDP port bound");
                socket
            }
            Err(err) => {
                warn!("binding UDP port failed: {err}");
                return None;
            }
        },
    };

    match socket.send_to(payload, target).await {
        Ok(bytes) => {
            debug!(bytes, "packet sent");
            Some(socket)
        }
        Err(err) => {
            warn!("send failed: {err}");
            None
        }
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let config = load_config(args.config_path.as_deref())?;
    let netflow = NetFlowV5::new(config)?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    info!(
        target = %args.target,
        packets_per_second = args.packets_per_second,
        flows_per_packet = args.flows_per_packet,
        "exporter running"
    );

    let system_start_time = SystemTime::now();
    let mut total_flows_sent: u32 = 0;
    let mut packets_sent: u64 = 0;
    let mut buffer = [0_u8; netflow_v5::MAX_PACKET_SIZE];
    let mut interval = time::interval(Duration::from_secs(1) / args.packets_per_second);
    let mut connection = Option::<UdpSocket>::None;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let size = netflow.fill_packet(
                    &mut rng,
                    &mut buffer,
                    system_start_time,
                    args.flows_per_packet,
                    total_flows_sent,
                )?;

                connection = send_packet(connection.take(), &buffer[..size], args.target).await;
                if connection.is_some() {
                    // The collector tracks loss through flow_sequence, so
                    // the counter only advances for packets that left us.
                    total_flows_sent =
                        total_flows_sent.wrapping_add(u32::from(args.flows_per_packet));
                    packets_sent += 1;
                }

                if args.max_packets != 0 && packets_sent >= args.max_packets {
                    info!(packets_sent, total_flows_sent, "packet budget exhausted");
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(packets_sent, total_flows_sent, "shutdown signal received");
                return Ok(());
            }
        }
    }
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .finish()
        .init();

    let args = Args::parse();

    let runtime = Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()?;
    runtime.block_on(run(args))
}

#[cfg(test)]
mod test {
    use super::*;
    use nfgen_payload::common::config::ConfRange;

    #[tokio::test]
    async fn send_failure_drops_socket_for_rebind() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = receiver.local_addr().unwrap();

        let connection = send_packet(None, b"flows", target).await;
        assert!(connection.is_some());
        let mut buf = [0_u8; 16];
        let (bytes, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(bytes, 5);

        // A datagram over the UDP limit fails at send time and must drop
        // the socket.
        let oversized = vec![0_u8; 70_000];
        let connection = send_packet(connection, &oversized, target).await;
        assert!(connection.is_none());

        // The next call rebinds and traffic flows again.
        let connection = send_packet(connection, b"flows", target).await;
        assert!(connection.is_some());
        let (bytes, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(bytes, 5);
    }

    #[test]
    fn cli_rejects_out_of_range_rates() {
        let base = ["nfgen", "--target", "127.0.0.1:2055"];

        assert!(Args::try_parse_from(base).is_ok());
        for (flag, value) in [
            ("--flows-per-packet", "0"),
            ("--flows-per-packet", "31"),
            ("--packets-per-second", "0"),
        ] {
            let args = base.iter().copied().chain([flag, value]);
            assert!(Args::try_parse_from(args).is_err());
        }
    }

    #[test]
    fn missing_config_path_uses_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config, netflow_v5::Config::default());
    }

    #[test]
    fn yaml_overrides_parse() {
        let contents = r"
src_port_range:
  inclusive:
    min: 4000
    max: 4100
protocol_weights:
  tcp: 100
  udp: 0
  icmp: 0
  other: 0
";
        let config: netflow_v5::Config = serde_yaml::from_str(contents).unwrap();
        assert_eq!(
            config.src_port_range,
            ConfRange::Inclusive {
                min: 4000,
                max: 4100
            }
        );
        assert_eq!(config.protocol_weights.tcp, 100);
        // Untouched fields keep their defaults.
        assert_eq!(
            config.dst_port_range,
            netflow_v5::Config::default().dst_port_range
        );
    }
}
