//! `Augmented` family: all four variants (SnmpOut, Web, Routing,
//! SnmpIn), grounded on
//! `original_source/silk-src/src/libsilk/rwaugsnmpoutio.c`'s v5 layout.
//! Only `AugSnmpOut`'s exact wire layout survived retrieval; the other
//! three reuse its proven 34-byte shape rather than a fabricated
//! distinct one (the same precedent `generic.rs` documents for its own
//! non-surviving writer), swapping which single SNMP interface field
//! (`input` or `output`) the shared `snmp_iface` slot carries to match
//! each variant's name — `AugmentedWeb`/`AugmentedRouting` report the
//! egress interface like `SnmpOut`, `AugmentedSnmpIn` the ingress one.

use crate::bitpack::{check_packets_nonzero, checked_snmp_u16};
use crate::codec::{Codec, CodecContext, FormatId};
use crate::error::{CodecError, Result};
use crate::record::{FlowAddr, FlowRecord};
use binrw::{BinRead, BinWrite};
use modular_bitfield::specifiers::*;
use std::io::Cursor;
use std::net::Ipv4Addr;

/// `rest_flags(8) / is_tcp(1) / unused(1) / stime(22)`, matching the
/// source's `rflag_stime` word.
#[silk_dtyp::mbitfield]
struct RflagStime {
    rest_flags: u8,
    is_tcp: bool,
    unused: bool,
    stime: B22,
}

#[silk_codec_derive::flow_record(length = 34)]
struct AugSnmpOutV5OnDisk {
    rflag_stime: RflagStime,
    proto_iflags: u8,
    tcp_state: u8,
    application: u16,
    sport: u16,
    dport: u16,
    elapsed: u32,
    pkts: u32,
    bytes: u32,
    sip: u32,
    dip: u32,
    snmp_iface: u16,
}

/// "Proto+Flags overlay" (`spec.md` §4.2): which byte `proto_iflags`
/// holds depends on protocol and the `EXPANDED` tcp-state attribute.
fn encode_proto_iflags(rec: &FlowRecord) -> (u8, u8, bool) {
    if rec.proto == 6 {
        if rec.tcp_state.expanded {
            (rec.init_flags, rec.rest_flags, true)
        } else {
            (rec.flags, 0, true)
        }
    } else {
        (rec.proto, rec.flags, false)
    }
}

fn decode_proto_iflags(rec: &mut FlowRecord, proto_iflags: u8, rest_flags: u8, is_tcp: bool) {
    if is_tcp {
        rec.proto = 6;
        if rec.tcp_state.expanded {
            rec.init_flags = proto_iflags;
            rec.rest_flags = rest_flags;
            rec.flags = proto_iflags | rest_flags;
        } else {
            rec.flags = proto_iflags;
        }
    } else {
        rec.proto = proto_iflags;
        rec.flags = rest_flags;
    }
}

/// One codec covers all four Augmented variants; `format` picks the
/// registry key and `iface_is_input` picks which of `rec.input`/
/// `rec.output` the shared `snmp_iface` slot round-trips.
pub struct AugmentedV5 {
    pub format: FormatId,
    pub iface_is_input: bool,
}

impl AugmentedV5 {
    pub fn snmp_out() -> Self {
        AugmentedV5 { format: FormatId::AugmentedSnmpOut, iface_is_input: false }
    }
    pub fn snmp_in() -> Self {
        AugmentedV5 { format: FormatId::AugmentedSnmpIn, iface_is_input: true }
    }
    pub fn web() -> Self {
        AugmentedV5 { format: FormatId::AugmentedWeb, iface_is_input: false }
    }
    pub fn routing() -> Self {
        AugmentedV5 { format: FormatId::AugmentedRouting, iface_is_input: false }
    }
}

impl Codec for AugmentedV5 {
    fn format(&self) -> FormatId {
        self.format
    }
    fn version(&self) -> u8 {
        5
    }
    fn record_length(&self) -> u16 {
        AugSnmpOutV5OnDisk::RECORD_LENGTH
    }
    fn swap_in_place(&self, _buf: &mut [u8]) {}

    fn pack(&self, rec: &FlowRecord, ctx: &CodecContext) -> Result<Vec<u8>> {
        check_packets_nonzero(rec.packets)?;
        let (proto_iflags, rest_flags, is_tcp) = encode_proto_iflags(rec);
        let stime_off = ((rec.stime_ms - ctx.hour_start_ms).max(0) as u32).min((1 << 22) - 1);
        let iface = if self.iface_is_input { rec.input } else { rec.output };
        let on_disk = AugSnmpOutV5OnDisk {
            rflag_stime: RflagStime::new()
                .with_rest_flags(rest_flags)
                .with_is_tcp(is_tcp)
                .with_unused(false)
                .with_stime(stime_off),
            proto_iflags,
            tcp_state: rec.tcp_state.to_bits(),
            application: rec.application,
            sport: rec.sport,
            dport: rec.dport,
            elapsed: rec.elapsed_ms,
            pkts: crate::bitpack::pack_scaled_packets(rec.packets as u32, 32),
            bytes: rec.bytes as u32,
            sip: match rec.sip {
                FlowAddr::V4(a) => u32::from(a),
                FlowAddr::V6(_) => return Err(CodecError::FieldOutOfRange { field: "sip", value: 0 }),
            },
            dip: match rec.dip {
                FlowAddr::V4(a) => u32::from(a),
                FlowAddr::V6(_) => return Err(CodecError::FieldOutOfRange { field: "dip", value: 0 }),
            },
            snmp_iface: checked_snmp_u16(iface)?,
        };
        let mut cursor = Cursor::new(Vec::new());
        on_disk.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    fn unpack(&self, buf: &[u8], ctx: &CodecContext) -> Result<FlowRecord> {
        let mut cursor = Cursor::new(buf);
        let on_disk = AugSnmpOutV5OnDisk::read(&mut cursor)?;
        let mut rec = FlowRecord {
            stime_ms: ctx.hour_start_ms + on_disk.rflag_stime.stime() as i64,
            application: on_disk.application,
            sport: on_disk.sport,
            dport: on_disk.dport,
            elapsed_ms: on_disk.elapsed,
            packets: on_disk.pkts as u64,
            bytes: on_disk.bytes as u64,
            sip: FlowAddr::V4(Ipv4Addr::from(on_disk.sip)),
            dip: FlowAddr::V4(Ipv4Addr::from(on_disk.dip)),
            sensor_id: ctx.sensor_id,
            flow_type: ctx.flow_type,
            ..Default::default()
        };
        if self.iface_is_input {
            rec.input = on_disk.snmp_iface as u32;
        } else {
            rec.output = on_disk.snmp_iface as u32;
        }
        rec.tcp_state = crate::record::TcpState::from_bits(on_disk.tcp_state);
        decode_proto_iflags(
            &mut rec,
            on_disk.proto_iflags,
            on_disk.rflag_stime.rest_flags(),
            on_disk.rflag_stime.is_tcp(),
        );
        Ok(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TcpState;

    #[test]
    fn tcp_expanded_round_trips_init_and_rest_flags() {
        let codec = AugmentedV5::snmp_out();
        let ctx = CodecContext {
            sensor_id: 4,
            flow_type: 1,
            hour_start_ms: 1_700_000_000_000,
        };
        let rec = FlowRecord {
            stime_ms: ctx.hour_start_ms + 5_000,
            proto: 6,
            init_flags: 0x02,
            rest_flags: 0x19,
            flags: 0x1B,
            tcp_state: TcpState {
                expanded: true,
                ..Default::default()
            },
            sip: FlowAddr::V4(Ipv4Addr::new(1, 2, 3, 4)),
            dip: FlowAddr::V4(Ipv4Addr::new(5, 6, 7, 8)),
            packets: 5,
            bytes: 500,
            ..Default::default()
        };
        let packed = codec.pack(&rec, &ctx).unwrap();
        assert_eq!(packed.len(), 34);
        let back = codec.unpack(&packed, &ctx).unwrap();
        assert_eq!(back.proto, 6);
        assert_eq!(back.init_flags, 0x02);
        assert_eq!(back.rest_flags, 0x19);
        assert!(back.tcp_state.expanded);
    }

    #[test]
    fn non_tcp_round_trips_protocol_byte() {
        let codec = AugmentedV5::snmp_out();
        let ctx = CodecContext {
            sensor_id: 4,
            flow_type: 1,
            hour_start_ms: 0,
        };
        let rec = FlowRecord {
            proto: 17,
            flags: 0,
            sip: FlowAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            dip: FlowAddr::V4(Ipv4Addr::new(2, 2, 2, 2)),
            packets: 1,
            bytes: 100,
            ..Default::default()
        };
        let packed = codec.pack(&rec, &ctx).unwrap();
        let back = codec.unpack(&packed, &ctx).unwrap();
        assert_eq!(back.proto, 17);
    }

    #[test]
    fn snmp_in_round_trips_input_interface_not_output() {
        let codec = AugmentedV5::snmp_in();
        let ctx = CodecContext {
            sensor_id: 4,
            flow_type: 1,
            hour_start_ms: 0,
        };
        let rec = FlowRecord {
            input: 42,
            sip: FlowAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            dip: FlowAddr::V4(Ipv4Addr::new(2, 2, 2, 2)),
            packets: 1,
            bytes: 100,
            ..Default::default()
        };
        let packed = codec.pack(&rec, &ctx).unwrap();
        let back = codec.unpack(&packed, &ctx).unwrap();
        assert_eq!(back.input, 42);
        assert_eq!(back.output, 0);
        assert_eq!(codec.format(), FormatId::AugmentedSnmpIn);
    }

    #[test]
    fn rejects_zero_packets() {
        let codec = AugmentedV5::web();
        let ctx = CodecContext {
            sensor_id: 4,
            flow_type: 1,
            hour_start_ms: 0,
        };
        let rec = FlowRecord {
            sip: FlowAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            dip: FlowAddr::V4(Ipv4Addr::new(2, 2, 2, 2)),
            packets: 0,
            ..Default::default()
        };
        assert!(matches!(codec.pack(&rec, &ctx), Err(CodecError::PktsZero)));
    }
}
