//! `Ipv6Routing` v3: structurally identical to a "Generic" record except
//! `tcp_state`'s top bit marks whether the three address fields hold
//! genuine IPv6 octets or an IPv4 address dressed in the
//! `::ffff:0:0/96` prefix, and start time/elapsed are plain 64/32-bit
//! fields rather than an hour-relative offset.
//!
//! Grounded on
//! `original_source/silk-src/src/libsilk/rwipv6routingio.c`'s V3 layout
//! and pack/unpack routines.

use crate::bitpack::check_packets_nonzero;
use crate::codec::{Codec, CodecContext, FormatId};
use crate::error::Result;
use crate::record::{FlowAddr, FlowRecord};
use binrw::{BinRead, BinWrite};
use std::io::Cursor;
use std::net::{Ipv4Addr, Ipv6Addr};

const IS_IPV6_BIT: u8 = 0x80;

#[silk_codec_derive::flow_record(length = 100)]
struct Ipv6RoutingV3OnDisk {
    stime_ms: i64,
    elapsed_ms: u32,
    sport: u16,
    dport: u16,
    proto: u8,
    flow_type: u8,
    sensor_id: u16,
    flags: u8,
    init_flags: u8,
    rest_flags: u8,
    tcp_state: u8,
    application: u16,
    memo: u16,
    input: u32,
    pkts: u64,
    bytes: u64,
    sip: [u8; 16],
    dip: [u8; 16],
    nhip: [u8; 16],
    output: u32,
}

fn to16(a: FlowAddr) -> [u8; 16] {
    match a {
        FlowAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        FlowAddr::V6(v6) => v6.octets(),
    }
}

fn from16_as_v6(bytes: [u8; 16]) -> FlowAddr {
    FlowAddr::V6(Ipv6Addr::from(bytes))
}

fn from16_as_v4(bytes: [u8; 16]) -> FlowAddr {
    let v4_octets: [u8; 4] = bytes[12..16].try_into().unwrap();
    FlowAddr::V4(Ipv4Addr::from(v4_octets))
}

pub struct Ipv6RoutingV3;

impl Codec for Ipv6RoutingV3 {
    fn format(&self) -> FormatId {
        FormatId::Ipv6Routing
    }
    fn version(&self) -> u8 {
        3
    }
    fn record_length(&self) -> u16 {
        Ipv6RoutingV3OnDisk::RECORD_LENGTH
    }
    fn supports_ipv6(&self) -> bool {
        true
    }
    fn swap_in_place(&self, _buf: &mut [u8]) {}

    fn pack(&self, rec: &FlowRecord, _ctx: &CodecContext) -> Result<Vec<u8>> {
        check_packets_nonzero(rec.packets)?;
        let is_v6 = rec.is_ipv6();
        let tcp_state = rec.tcp_state.to_bits() | if is_v6 { IS_IPV6_BIT } else { 0 };
        let on_disk = Ipv6RoutingV3OnDisk {
            stime_ms: rec.stime_ms,
            elapsed_ms: rec.elapsed_ms,
            sport: rec.sport,
            dport: rec.dport,
            proto: rec.proto,
            flow_type: rec.flow_type,
            sensor_id: rec.sensor_id,
            flags: rec.flags,
            init_flags: rec.init_flags,
            rest_flags: rec.rest_flags,
            tcp_state,
            application: rec.application,
            memo: rec.memo,
            input: rec.input,
            pkts: rec.packets,
            bytes: rec.bytes,
            sip: to16(rec.sip),
            dip: to16(rec.dip),
            nhip: to16(rec.next_hop),
            output: rec.output,
        };
        let mut cursor = Cursor::new(Vec::new());
        on_disk.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    fn unpack(&self, buf: &[u8], _ctx: &CodecContext) -> Result<FlowRecord> {
        let mut cursor = Cursor::new(buf);
        let on_disk = Ipv6RoutingV3OnDisk::read(&mut cursor)?;
        let is_v6 = on_disk.tcp_state & IS_IPV6_BIT != 0;
        let addr_of = if is_v6 { from16_as_v6 } else { from16_as_v4 };
        let mut rec = FlowRecord {
            stime_ms: on_disk.stime_ms,
            elapsed_ms: on_disk.elapsed_ms,
            sport: on_disk.sport,
            dport: on_disk.dport,
            proto: on_disk.proto,
            flow_type: on_disk.flow_type,
            sensor_id: on_disk.sensor_id,
            flags: on_disk.flags,
            init_flags: on_disk.init_flags,
            rest_flags: on_disk.rest_flags,
            application: on_disk.application,
            memo: on_disk.memo,
            input: on_disk.input,
            packets: on_disk.pkts,
            bytes: on_disk.bytes,
            sip: addr_of(on_disk.sip),
            dip: addr_of(on_disk.dip),
            next_hop: addr_of(on_disk.nhip),
            output: on_disk.output,
            ..Default::default()
        };
        rec.tcp_state = crate::record::TcpState::from_bits(on_disk.tcp_state & !IS_IPV6_BIT);
        Ok(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CodecContext {
        CodecContext {
            sensor_id: 7,
            flow_type: 0,
            hour_start_ms: 0,
        }
    }

    #[test]
    fn ipv4_address_round_trips_through_the_v4in6_prefix() {
        let codec = Ipv6RoutingV3;
        let rec = FlowRecord {
            stime_ms: 1_700_000_000_000,
            elapsed_ms: 42,
            sip: FlowAddr::V4(Ipv4Addr::new(10, 1, 2, 3)),
            dip: FlowAddr::V4(Ipv4Addr::new(10, 1, 2, 4)),
            packets: 3,
            bytes: 900,
            ..Default::default()
        };
        let packed = codec.pack(&rec, &ctx()).unwrap();
        assert_eq!(packed.len(), 100);
        let back = codec.unpack(&packed, &ctx()).unwrap();
        assert_eq!(back.sip, rec.sip);
        assert_eq!(back.dip, rec.dip);
        assert!(!back.is_ipv6());
    }

    #[test]
    fn genuine_ipv6_address_round_trips_and_sets_the_marker_bit() {
        let codec = Ipv6RoutingV3;
        let v6 = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 9);
        let rec = FlowRecord {
            sip: FlowAddr::V6(v6),
            dip: FlowAddr::V6(v6),
            next_hop: FlowAddr::V6(v6),
            packets: 1,
            bytes: 100,
            ..Default::default()
        };
        let packed = codec.pack(&rec, &ctx()).unwrap();
        assert_eq!(packed[23] & IS_IPV6_BIT, IS_IPV6_BIT);
        let back = codec.unpack(&packed, &ctx()).unwrap();
        assert_eq!(back.sip, FlowAddr::V6(v6));
        assert!(back.is_ipv6());
    }
}
