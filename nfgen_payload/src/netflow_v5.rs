//! `NetFlow` v5 payload.
//!
//! Lays out a 24 byte export header and 1 to 30 flow records of 48 bytes
//! each into a caller supplied buffer, every multi-byte field big-endian on
//! the wire. Timestamps, counters and the flow sequence are kept mutually
//! consistent so repeated packets resemble a plausible router telemetry
//! stream. Continuity across packets comes from the caller re-supplying
//! `total_flows_sent` on each call; the builder holds no sequence state.

use std::{
    io::Write,
    time::{SystemTime, UNIX_EPOCH},
};

use rand::{Rng, distr::weighted::WeightedIndex, prelude::Distribution};
use serde::{Deserialize, Serialize};

use crate::{Error, common::config::ConfRange};

/// Wire size of the packet header.
pub const HEADER_SIZE: usize = 24;
/// Wire size of one flow record.
pub const RECORD_SIZE: usize = 48;
/// `NetFlow` v5 caps a packet at 30 records.
pub const MAX_RECORDS: u16 = 30;
/// Largest possible packet: header plus 30 records, 1464 bytes.
pub const MAX_PACKET_SIZE: usize = HEADER_SIZE + MAX_RECORDS as usize * RECORD_SIZE;

/// `NetFlow` v5 packet header (24 bytes)
#[derive(Debug, Clone)]
struct NetFlowV5Header {
    version: u16,       // NetFlow version (always 5)
    count: u16,         // Number of flow records
    sys_uptime: u32,    // Milliseconds since exporter start
    unix_secs: u32,     // Seconds since Unix epoch
    unix_nsecs: u32,    // Residual nanoseconds
    flow_sequence: u32, // Flows sent before this packet
    engine_type: u8,    // Type of flow switching engine
    engine_id: u8,      // Slot of flow switching engine
    reserved: u16,      // Always zero
}

/// `NetFlow` v5 flow record (48 bytes)
#[derive(Debug, Clone, Copy)]
struct NetFlowV5Record {
    src_addr: u32,  // Source IP address
    dst_addr: u32,  // Destination IP address
    next_hop: u32,  // Next hop router IP address
    input: u16,     // Input interface index
    output: u16,    // Output interface index
    d_pkts: u32,    // Packets in the flow
    d_octets: u32,  // Total bytes in the flow
    first: u32,     // SysUptime at start of flow
    last: u32,      // SysUptime at end of flow
    src_port: u16,  // TCP/UDP source port
    dst_port: u16,  // TCP/UDP destination port
    pad: u8,        // Unused padding
    tcp_flags: u8,  // Cumulative OR of TCP flags
    prot: u8,       // IP protocol (TCP=6, UDP=17, etc.)
    tos: u8,        // IP type of service
    src_as: u16,    // Source BGP AS number
    dst_as: u16,    // Destination BGP AS number
    src_mask: u8,   // Source address prefix mask
    dst_mask: u8,   // Destination address prefix mask
    drops: u16,     // Flows dropped by the exporter
}

/// Configuration for `NetFlow` v5 payload generation
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Range for source IP addresses (as u32)
    pub src_addr_range: ConfRange<u32>,

    /// Range for destination IP addresses (as u32)
    pub dst_addr_range: ConfRange<u32>,

    /// Range for next-hop IP addresses (as u32)
    pub next_hop_range: ConfRange<u32>,

    /// Range for input and output interface indices
    pub interface_range: ConfRange<u16>,

    /// Range for source ports
    pub src_port_range: ConfRange<u16>,

    /// Range for destination ports
    pub dst_port_range: ConfRange<u16>,

    /// Range for AS numbers
    pub as_number_range: ConfRange<u16>,

    /// Range for packet counts in flows
    pub packet_count_range: ConfRange<u32>,

    /// Range for the mean packet size of a flow, in bytes. Octet counts are
    /// derived from the packet count so the two stay consistent.
    pub mean_packet_size_range: ConfRange<u32>,

    /// Protocol weights (TCP, UDP, ICMP, Other)
    pub protocol_weights: ProtocolWeights,

    /// Range for the engine type reported in headers
    pub engine_type_range: ConfRange<u8>,

    /// Range for the engine ID reported in headers
    pub engine_id_range: ConfRange<u8>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            src_addr_range: ConfRange::Inclusive {
                min: u32::from_be_bytes([10, 0, 0, 1]),       // 10.0.0.1
                max: u32::from_be_bytes([10, 255, 255, 254]), // 10.255.255.254
            },
            dst_addr_range: ConfRange::Inclusive {
                min: u32::from_be_bytes([192, 168, 1, 1]), // 192.168.1.1
                max: u32::from_be_bytes([192, 168, 255, 254]), // 192.168.255.254
            },
            next_hop_range: ConfRange::Inclusive {
                min: u32::from_be_bytes([10, 0, 0, 1]),
                max: u32::from_be_bytes([10, 0, 0, 254]),
            },
            interface_range: ConfRange::Inclusive { min: 1, max: 254 },
            src_port_range: ConfRange::Inclusive {
                min: 1024,
                max: 65535,
            },
            dst_port_range: ConfRange::Inclusive { min: 1, max: 65535 },
            as_number_range: ConfRange::Inclusive { min: 1, max: 65535 },
            packet_count_range: ConfRange::Inclusive { min: 1, max: 10000 },
            mean_packet_size_range: ConfRange::Inclusive { min: 64, max: 1500 },
            protocol_weights: ProtocolWeights::default(),
            engine_type_range: ConfRange::Constant(0),
            engine_id_range: ConfRange::Constant(0),
        }
    }
}

impl Config {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an explanation when any range is inverted or degenerate.
    pub fn valid(&self) -> Result<(), String> {
        let (src_valid, reason) = self.src_addr_range.valid();
        if !src_valid {
            return Err(format!("src_addr_range is invalid: {reason}"));
        }

        let (dst_valid, reason) = self.dst_addr_range.valid();
        if !dst_valid {
            return Err(format!("dst_addr_range is invalid: {reason}"));
        }

        let (next_hop_valid, reason) = self.next_hop_range.valid();
        if !next_hop_valid {
            return Err(format!("next_hop_range is invalid: {reason}"));
        }

        let (interface_valid, reason) = self.interface_range.valid();
        if !interface_valid {
            return Err(format!("interface_range is invalid: {reason}"));
        }

        let (src_port_valid, reason) = self.src_port_range.valid();
        if !src_port_valid {
            return Err(format!("src_port_range is invalid: {reason}"));
        }

        let (dst_port_valid, reason) = self.dst_port_range.valid();
        if !dst_port_valid {
            return Err(format!("dst_port_range is invalid: {reason}"));
        }

        let (as_valid, reason) = self.as_number_range.valid();
        if !as_valid {
            return Err(format!("as_number_range is invalid: {reason}"));
        }

        let (pkts_valid, reason) = self.packet_count_range.valid();
        if !pkts_valid {
            return Err(format!("packet_count_range is invalid: {reason}"));
        }
        if self.packet_count_range.start() == 0 {
            return Err("packet_count_range minimum must be at least 1".to_string());
        }

        let (size_valid, reason) = self.mean_packet_size_range.valid();
        if !size_valid {
            return Err(format!("mean_packet_size_range is invalid: {reason}"));
        }
        if self.mean_packet_size_range.start() == 0 {
            return Err("mean_packet_size_range minimum must be at least 1".to_string());
        }

        let (engine_type_valid, reason) = self.engine_type_range.valid();
        if !engine_type_valid {
            return Err(format!("engine_type_range is invalid: {reason}"));
        }

        let (engine_id_valid, reason) = self.engine_id_range.valid();
        if !engine_id_valid {
            return Err(format!("engine_id_range is invalid: {reason}"));
        }

        Ok(())
    }
}

/// Protocol distribution weights
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProtocolWeights {
    /// Weight for TCP protocol
    pub tcp: u8,
    /// Weight for UDP protocol
    pub udp: u8,
    /// Weight for ICMP protocol
    pub icmp: u8,
    /// Weight for other protocols
    pub other: u8,
}

impl Default for ProtocolWeights {
    fn default() -> Self {
        Self {
            tcp: 70,  // 70%
            udp: 25,  // 25%
            icmp: 3,  // 3%
            other: 2, // 2%
        }
    }
}

/// `NetFlow` v5 packet builder
#[derive(Debug)]
pub struct NetFlowV5 {
    config: Config,
    protocol_distribution: WeightedIndex<u16>,
}

impl NetFlowV5 {
    /// Create a new `NetFlow` v5 packet builder
    ///
    /// # Errors
    ///
    /// Fails when the configuration does not validate or the protocol
    /// weights sum to zero.
    pub fn new(config: Config) -> Result<Self, Error> {
        config.valid().map_err(Error::Validation)?;

        let protocol_weights = [
            u16::from(config.protocol_weights.tcp),
            u16::from(config.protocol_weights.udp),
            u16::from(config.protocol_weights.icmp),
            u16::from(config.protocol_weights.other),
        ];

        Ok(Self {
            config,
            protocol_distribution: WeightedIndex::new(protocol_weights)?,
        })
    }

    /// Build one packet into `buffer`, stamping uptime against the wall
    /// clock.
    ///
    /// `system_start_time` marks when the simulated exporter began running
    /// and `total_flows_sent` is the cumulative record count sent before
    /// this packet. Both are caller-owned; the builder never retains them.
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// `InvalidRecordCount` when `number_of_flows` is outside 1..=30,
    /// `BufferTooSmall` when `buffer` cannot hold the computed packet. No
    /// bytes are written in either case.
    pub fn fill_packet<R>(
        &self,
        rng: &mut R,
        buffer: &mut [u8],
        system_start_time: SystemTime,
        number_of_flows: u16,
        total_flows_sent: u32,
    ) -> Result<usize, Error>
    where
        R: Rng + ?Sized,
    {
        self.fill_packet_at(
            rng,
            buffer,
            SystemTime::now(),
            system_start_time,
            number_of_flows,
            total_flows_sent,
        )
    }

    /// Build one packet into `buffer` as of the instant `now`.
    ///
    /// Identical to [`NetFlowV5::fill_packet`] but with the clock supplied
    /// by the caller, which makes the construction fully deterministic for
    /// a seeded `rng`.
    ///
    /// # Errors
    ///
    /// See [`NetFlowV5::fill_packet`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn fill_packet_at<R>(
        &self,
        rng: &mut R,
        buffer: &mut [u8],
        now: SystemTime,
        system_start_time: SystemTime,
        number_of_flows: u16,
        total_flows_sent: u32,
    ) -> Result<usize, Error>
    where
        R: Rng + ?Sized,
    {
        if number_of_flows == 0 || number_of_flows > MAX_RECORDS {
            return Err(Error::InvalidRecordCount {
                requested: number_of_flows,
            });
        }
        let required = HEADER_SIZE + usize::from(number_of_flows) * RECORD_SIZE;
        if buffer.len() < required {
            return Err(Error::BufferTooSmall {
                required,
                capacity: buffer.len(),
            });
        }

        let uptime = now.duration_since(system_start_time).unwrap_or_default();
        let sys_uptime = u32::try_from(uptime.as_millis()).unwrap_or(u32::MAX);
        let unix = now.duration_since(UNIX_EPOCH).unwrap_or_default();

        let header = NetFlowV5Header {
            version: 5,
            count: number_of_flows,
            sys_uptime,
            unix_secs: unix.as_secs() as u32,
            unix_nsecs: unix.subsec_nanos(),
            flow_sequence: total_flows_sent,
            engine_type: self.config.engine_type_range.sample(rng),
            engine_id: self.config.engine_id_range.sample(rng),
            reserved: 0,
        };

        let mut writer = &mut buffer[..required];
        write_header(&header, &mut writer)?;
        for _ in 0..number_of_flows {
            let record = self.generate_record(sys_uptime, rng);
            write_record(&record, &mut writer)?;
        }

        Ok(required)
    }

    /// Generate a `NetFlow` v5 flow record
    fn generate_record<R>(&self, sys_uptime: u32, rng: &mut R) -> NetFlowV5Record
    where
        R: Rng + ?Sized,
    {
        let protocol = match self.protocol_distribution.sample(rng) {
            0 => 6,                         // TCP
            1 => 17,                        // UDP
            2 => 1,                         // ICMP
            _ => rng.random_range(2..=255), // Other protocols
        };

        // Flow timestamps live on the same uptime clock as the header and
        // must satisfy first <= last <= sys_uptime.
        let first = rng.random_range(0..=sys_uptime);
        let last = rng.random_range(first..=sys_uptime);

        let d_pkts = self.config.packet_count_range.sample(rng);
        let d_octets = d_pkts.saturating_mul(self.config.mean_packet_size_range.sample(rng));

        NetFlowV5Record {
            src_addr: self.config.src_addr_range.sample(rng),
            dst_addr: self.config.dst_addr_range.sample(rng),
            next_hop: self.config.next_hop_range.sample(rng),
            input: self.config.interface_range.sample(rng),
            output: self.config.interface_range.sample(rng),
            d_pkts,
            d_octets,
            first,
            last,
            src_port: self.config.src_port_range.sample(rng),
            dst_port: self.config.dst_port_range.sample(rng),
            pad: 0,
            tcp_flags: rng.random(),
            prot: protocol,
            tos: rng.random(),
            src_as: self.config.as_number_range.sample(rng),
            dst_as: self.config.as_number_range.sample(rng),
            src_mask: rng.random_range(0..=32),
            dst_mask: rng.random_range(0..=32),
            drops: rng.random(),
        }
    }
}

/// Write the header to bytes in network byte order
fn write_header<W>(header: &NetFlowV5Header, writer: &mut W) -> Result<(), Error>
where
    W: Write,
{
    writer.write_all(&header.version.to_be_bytes())?;
    writer.write_all(&header.count.to_be_bytes())?;
    writer.write_all(&header.sys_uptime.to_be_bytes())?;
    writer.write_all(&header.unix_secs.to_be_bytes())?;
    writer.write_all(&header.unix_nsecs.to_be_bytes())?;
    writer.write_all(&header.flow_sequence.to_be_bytes())?;
    writer.write_all(&[header.engine_type])?;
    writer.write_all(&[header.engine_id])?;
    writer.write_all(&header.reserved.to_be_bytes())?;
    Ok(())
}

/// Write a flow record to bytes in network byte order
fn write_record<W>(record: &NetFlowV5Record, writer: &mut W) -> Result<(), Error>
where
    W: Write,
{
    writer.write_all(&record.src_addr.to_be_bytes())?;
    writer.write_all(&record.dst_addr.to_be_bytes())?;
    writer.write_all(&record.next_hop.to_be_bytes())?;
    writer.write_all(&record.input.to_be_bytes())?;
    writer.write_all(&record.output.to_be_bytes())?;
    writer.write_all(&record.d_pkts.to_be_bytes())?;
    writer.write_all(&record.d_octets.to_be_bytes())?;
    writer.write_all(&record.first.to_be_bytes())?;
    writer.write_all(&record.last.to_be_bytes())?;
    writer.write_all(&record.src_port.to_be_bytes())?;
    writer.write_all(&record.dst_port.to_be_bytes())?;
    writer.write_all(&[record.pad])?;
    writer.write_all(&[record.tcp_flags])?;
    writer.write_all(&[record.prot])?;
    writer.write_all(&[record.tos])?;
    writer.write_all(&record.src_as.to_be_bytes())?;
    writer.write_all(&record.dst_as.to_be_bytes())?;
    writer.write_all(&[record.src_mask])?;
    writer.write_all(&[record.dst_mask])?;
    writer.write_all(&record.drops.to_be_bytes())?;
    Ok(())
}
