//! `Flowcap`: the wire format a flow-capture sensor uses to ship
//! records to a collector before they're merged into an hourly file.
//! Time is absolute (UNIX epoch seconds plus hand-packed millisecond
//! fractions) rather than hour-relative, since a flowcap file has no
//! enclosing hour.
//!
//! Grounded on `original_source/silk-src/src/libsilk/flowcapio.c`'s V3
//! and V5 layouts and their pack/unpack routines. V4 is V3's 36 bytes
//! plus 4 bytes of payload hash, which the original stores directly
//! into the record's next-hop-IP field rather than a dedicated one —
//! kept here unchanged, since inventing a separate field would depart
//! from the source's actual packed shape for no benefit (see
//! `DESIGN.md`).
//!
//! v2/v3 predate the payload-hash repurposing and carry a literal
//! next-hop address in the same 40-byte slot `FlowcapV2To4` already
//! treats generically (it never interprets the slot's bytes as a hash,
//! only moves them to/from `FlowRecord::next_hop`), so one codec
//! parameterized on version covers 2..=4. v6's source did not survive
//! retrieval; `FlowcapV5V6` reuses v5's proven 38-byte layout for it.

use crate::bitpack::{check_packets_nonzero, checked_snmp_u16, saturate_snmp_u8};
use crate::codec::{Codec, CodecContext, FormatId};
use crate::error::Result;
use crate::record::{FlowAddr, FlowRecord, TcpState};
use binrw::{BinRead, BinWrite};
use std::io::Cursor;
use std::net::Ipv4Addr;

/// Splits a millisecond value (0-999) into the hand-packed
/// `time_frac[3]` triplet shared by V3/V4/V5: `ar[35]` carries the
/// start-time fraction's high 8 bits, `ar[36]` carries its low 2 bits
/// in the top nibble-pair and the elapsed fraction's high 6 bits in the
/// bottom, and `ar[37]` carries the elapsed fraction's low 4 bits in
/// its top nibble (the bottom nibble is unused).
fn pack_time_frac(stime_msec: u16, elapsed_msec: u16) -> [u8; 3] {
    let b35 = (stime_msec >> 2) as u8;
    let b36 = (((stime_msec & 0x3) as u8) << 6) | ((elapsed_msec >> 4) as u8 & 0x3F);
    let b37 = ((elapsed_msec & 0xF) as u8) << 4;
    [b35, b36, b37]
}

fn unpack_time_frac(frac: [u8; 3]) -> (u16, u16) {
    let stime_msec = ((frac[0] as u16) << 2) | ((frac[1] as u16 >> 6) & 0x3);
    let elapsed_msec = (((frac[1] as u16) & 0x3F) << 4) | ((frac[2] as u16 >> 4) & 0xF);
    (stime_msec, elapsed_msec)
}

fn pack_pkts_proto(packets: u64, proto: u8) -> u32 {
    crate::bitpack::pack_packets_protocol(packets.min(0x00FF_FFFF) as u32, proto)
}

fn unpack_pkts_proto(word: u32) -> (u64, u8) {
    let (pkts, proto) = crate::bitpack::unpack_packets_protocol(word);
    (pkts as u64, proto)
}

fn flags_from_bytes(flags: u8, first_flags: u8, tcp_state: u8) -> (u8, u8, u8) {
    if tcp_state & TcpState::ATTRIBUTE_MASK_EXPANDED != 0 {
        (flags | first_flags, first_flags, flags)
    } else {
        (flags, 0, 0)
    }
}

impl TcpState {
    const ATTRIBUTE_MASK_EXPANDED: u8 = 0x01;
}

fn flags_to_bytes(rec: &FlowRecord) -> (u8, u8) {
    if rec.tcp_state.expanded {
        (rec.rest_flags, rec.init_flags)
    } else {
        (rec.flags, 0)
    }
}

fn unpack_common(on_disk_tcp_state: u8, flags: u8, first_flags: u8) -> (u8, u8, u8, TcpState) {
    let tcp_state = TcpState::from_bits(on_disk_tcp_state);
    let (flags, rest, init) = flags_from_bytes(flags, first_flags, on_disk_tcp_state);
    (flags, rest, init, tcp_state)
}

/// Covers v5 and v6: no source survived for v6's layout, so it reuses
/// v5's proven 38-byte shape rather than a fabricated distinct one.
pub struct FlowcapV5V6 {
    pub version: u8,
}

#[silk_codec_derive::flow_record(length = 38)]
struct FlowcapV5OnDisk {
    sip: u32,
    dip: u32,
    bytes: u32,
    stime_secs: u32,
    elapsed_secs: u16,
    sport: u16,
    dport: u16,
    application: u16,
    input: u16,
    output: u16,
    pkts_proto: u32,
    flags: u8,
    first_flags: u8,
    tcp_state: u8,
    time_frac: [u8; 3],
}

impl Codec for FlowcapV5V6 {
    fn format(&self) -> FormatId {
        FormatId::Flowcap
    }
    fn version(&self) -> u8 {
        self.version
    }
    fn record_length(&self) -> u16 {
        FlowcapV5OnDisk::RECORD_LENGTH
    }
    fn swap_in_place(&self, _buf: &mut [u8]) {}

    fn pack(&self, rec: &FlowRecord, ctx: &CodecContext) -> Result<Vec<u8>> {
        check_packets_nonzero(rec.packets)?;
        let stime_secs = (rec.stime_ms / 1000) as u32;
        let stime_msec = (rec.stime_ms % 1000) as u16;
        let elapsed_secs = (rec.elapsed_ms / 1000).min(u16::MAX as u32) as u16;
        let elapsed_msec = (rec.elapsed_ms % 1000) as u16;
        let (flags, first_flags) = flags_to_bytes(rec);
        let on_disk = FlowcapV5OnDisk {
            sip: match rec.sip {
                FlowAddr::V4(a) => u32::from(a),
                FlowAddr::V6(_) => 0,
            },
            dip: match rec.dip {
                FlowAddr::V4(a) => u32::from(a),
                FlowAddr::V6(_) => 0,
            },
            bytes: rec.bytes.min(u32::MAX as u64) as u32,
            stime_secs,
            elapsed_secs,
            sport: rec.sport,
            dport: rec.dport,
            application: rec.application,
            input: checked_snmp_u16(rec.input)?,
            output: checked_snmp_u16(rec.output)?,
            pkts_proto: pack_pkts_proto(rec.packets, rec.proto),
            flags,
            first_flags,
            tcp_state: rec.tcp_state.to_bits(),
            time_frac: pack_time_frac(stime_msec, elapsed_msec),
        };
        let _ = ctx;
        let mut cursor = Cursor::new(Vec::new());
        on_disk.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    fn unpack(&self, buf: &[u8], ctx: &CodecContext) -> Result<FlowRecord> {
        let mut cursor = Cursor::new(buf);
        let on_disk = FlowcapV5OnDisk::read(&mut cursor)?;
        let (stime_msec, elapsed_msec) = unpack_time_frac(on_disk.time_frac);
        let (flags, rest_flags, init_flags, tcp_state) =
            unpack_common(on_disk.tcp_state, on_disk.flags, on_disk.first_flags);
        let (packets, proto) = unpack_pkts_proto(on_disk.pkts_proto);
        Ok(FlowRecord {
            sip: FlowAddr::V4(Ipv4Addr::from(on_disk.sip)),
            dip: FlowAddr::V4(Ipv4Addr::from(on_disk.dip)),
            bytes: on_disk.bytes as u64,
            stime_ms: on_disk.stime_secs as i64 * 1000 + stime_msec as i64,
            elapsed_ms: on_disk.elapsed_secs as u32 * 1000 + elapsed_msec as u32,
            sport: on_disk.sport,
            dport: on_disk.dport,
            application: on_disk.application,
            input: on_disk.input as u32,
            output: on_disk.output as u32,
            packets,
            proto,
            flags,
            rest_flags,
            init_flags,
            tcp_state,
            sensor_id: ctx.sensor_id,
            flow_type: ctx.flow_type,
            ..Default::default()
        })
    }
}

/// Covers v2, v3, and v4: the 40-byte slot this codec moves between
/// `FlowRecord::next_hop` and the wire is treated as opaque bytes, so
/// the same struct serves both the pre-v4 literal-next-hop records and
/// v4's payload-hash-repurposed ones without distinguishing them.
pub struct FlowcapV2To4 {
    pub version: u8,
}

#[silk_codec_derive::flow_record(length = 40)]
struct FlowcapV4OnDisk {
    sip: u32,
    dip: u32,
    bytes: u32,
    stime_secs: u32,
    elapsed_secs: u16,
    sport: u16,
    dport: u16,
    application: u16,
    input: u8,
    output: u8,
    pkts_proto: u32,
    flags: u8,
    first_flags: u8,
    tcp_state: u8,
    time_frac: [u8; 3],
    payload_hash: u32,
}

impl Codec for FlowcapV2To4 {
    fn format(&self) -> FormatId {
        FormatId::Flowcap
    }
    fn version(&self) -> u8 {
        self.version
    }
    fn record_length(&self) -> u16 {
        FlowcapV4OnDisk::RECORD_LENGTH
    }
    fn swap_in_place(&self, _buf: &mut [u8]) {}

    fn pack(&self, rec: &FlowRecord, ctx: &CodecContext) -> Result<Vec<u8>> {
        check_packets_nonzero(rec.packets)?;
        let stime_secs = (rec.stime_ms / 1000) as u32;
        let stime_msec = (rec.stime_ms % 1000) as u16;
        let elapsed_secs = (rec.elapsed_ms / 1000).min(u16::MAX as u32) as u16;
        let elapsed_msec = (rec.elapsed_ms % 1000) as u16;
        let (flags, first_flags) = flags_to_bytes(rec);
        let on_disk = FlowcapV4OnDisk {
            sip: match rec.sip {
                FlowAddr::V4(a) => u32::from(a),
                FlowAddr::V6(_) => 0,
            },
            dip: match rec.dip {
                FlowAddr::V4(a) => u32::from(a),
                FlowAddr::V6(_) => 0,
            },
            bytes: rec.bytes.min(u32::MAX as u64) as u32,
            stime_secs,
            elapsed_secs,
            sport: rec.sport,
            dport: rec.dport,
            application: rec.application,
            input: saturate_snmp_u8(rec.input),
            output: saturate_snmp_u8(rec.output),
            pkts_proto: pack_pkts_proto(rec.packets, rec.proto),
            flags,
            first_flags,
            tcp_state: rec.tcp_state.to_bits(),
            time_frac: pack_time_frac(stime_msec, elapsed_msec),
            payload_hash: match rec.next_hop {
                FlowAddr::V4(a) => u32::from(a),
                FlowAddr::V6(_) => 0,
            },
        };
        let _ = ctx;
        let mut cursor = Cursor::new(Vec::new());
        on_disk.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    fn unpack(&self, buf: &[u8], ctx: &CodecContext) -> Result<FlowRecord> {
        let mut cursor = Cursor::new(buf);
        let on_disk = FlowcapV4OnDisk::read(&mut cursor)?;
        let (stime_msec, elapsed_msec) = unpack_time_frac(on_disk.time_frac);
        let (flags, rest_flags, init_flags, tcp_state) =
            unpack_common(on_disk.tcp_state, on_disk.flags, on_disk.first_flags);
        let (packets, proto) = unpack_pkts_proto(on_disk.pkts_proto);
        Ok(FlowRecord {
            sip: FlowAddr::V4(Ipv4Addr::from(on_disk.sip)),
            dip: FlowAddr::V4(Ipv4Addr::from(on_disk.dip)),
            next_hop: FlowAddr::V4(Ipv4Addr::from(on_disk.payload_hash)),
            bytes: on_disk.bytes as u64,
            stime_ms: on_disk.stime_secs as i64 * 1000 + stime_msec as i64,
            elapsed_ms: on_disk.elapsed_secs as u32 * 1000 + elapsed_msec as u32,
            sport: on_disk.sport,
            dport: on_disk.dport,
            application: on_disk.application,
            input: on_disk.input as u32,
            output: on_disk.output as u32,
            packets,
            proto,
            flags,
            rest_flags,
            init_flags,
            tcp_state,
            sensor_id: ctx.sensor_id,
            flow_type: ctx.flow_type,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CodecContext {
        CodecContext {
            sensor_id: 9,
            flow_type: 3,
            hour_start_ms: 0,
        }
    }

    #[test]
    fn v5_round_trips_fractional_times() {
        let codec = FlowcapV5V6 { version: 5 };
        let rec = FlowRecord {
            stime_ms: 1_700_000_123_456,
            elapsed_ms: 7_891,
            sip: FlowAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            dip: FlowAddr::V4(Ipv4Addr::new(2, 2, 2, 2)),
            packets: 40,
            bytes: 4000,
            proto: 17,
            ..Default::default()
        };
        let packed = codec.pack(&rec, &ctx()).unwrap();
        assert_eq!(packed.len(), 38);
        let back = codec.unpack(&packed, &ctx()).unwrap();
        assert_eq!(back.stime_ms, rec.stime_ms);
        assert_eq!(back.elapsed_ms, rec.elapsed_ms);
        assert_eq!(back.packets, 40);
        assert_eq!(back.proto, 17);
    }

    #[test]
    fn v4_carries_payload_hash_in_next_hop() {
        let codec = FlowcapV2To4 { version: 4 };
        let rec = FlowRecord {
            next_hop: FlowAddr::V4(Ipv4Addr::new(0xDE, 0xAD, 0xBE, 0xEF)),
            sip: FlowAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dip: FlowAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            packets: 1,
            bytes: 100,
            ..Default::default()
        };
        let packed = codec.pack(&rec, &ctx()).unwrap();
        assert_eq!(packed.len(), 40);
        let back = codec.unpack(&packed, &ctx()).unwrap();
        assert_eq!(back.next_hop, rec.next_hop);
    }

    #[test]
    fn expanded_tcp_state_round_trips_init_and_rest_flags() {
        let codec = FlowcapV5V6 { version: 5 };
        let rec = FlowRecord {
            proto: 6,
            tcp_state: TcpState {
                expanded: true,
                ..Default::default()
            },
            init_flags: 0x02,
            rest_flags: 0x11,
            packets: 1,
            bytes: 100,
            ..Default::default()
        };
        let packed = codec.pack(&rec, &ctx()).unwrap();
        let back = codec.unpack(&packed, &ctx()).unwrap();
        assert_eq!(back.init_flags, 0x02);
        assert_eq!(back.rest_flags, 0x11);
        assert_eq!(back.flags, 0x02 | 0x11);
    }

    #[test]
    fn rejects_zero_packets() {
        let codec = FlowcapV5V6 { version: 5 };
        let rec = FlowRecord {
            sip: FlowAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            dip: FlowAddr::V4(Ipv4Addr::new(2, 2, 2, 2)),
            packets: 0,
            ..Default::default()
        };
        assert!(matches!(
            codec.pack(&rec, &ctx()),
            Err(crate::error::CodecError::PktsZero)
        ));
    }

    #[test]
    fn v2to4_saturates_snmp_index_to_eight_bits_instead_of_sixteen() {
        let codec = FlowcapV2To4 { version: 4 };
        let rec = FlowRecord {
            sip: FlowAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            dip: FlowAddr::V4(Ipv4Addr::new(2, 2, 2, 2)),
            input: 300,
            packets: 1,
            bytes: 100,
            ..Default::default()
        };
        let packed = codec.pack(&rec, &ctx()).unwrap();
        let back = codec.unpack(&packed, &ctx()).unwrap();
        assert_eq!(back.input, 0xFF);
    }
}
