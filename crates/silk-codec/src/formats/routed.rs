//! `Routed`: the SNMP-routed on-disk flow-record family, grounded on
//! `original_source/silk-src/src/libsilk/rwroutedio.c`.
//!
//! Three wire-distinct layouts cover the five historical versions:
//! v1/v2 (28 bytes), v3/v4 (32 bytes, identical bits between the pair
//! per the source's combined `RWROUTED VERSION 3 / VERSION 4` comment
//! block), and v5 (32 bytes, switching to a single 22-bit millisecond
//! start-time field instead of the v3/v4 12-bit-seconds-plus-fraction
//! split). ICMP type/code is not derived here: ICMP packs into `dPort`
//! on disk, but reconciling that overlay with `FlowRecord::icmp_type`/
//! `icmp_code` is the stream layer's job (`spec.md` §4.1's ICMP sport/
//! dport repair, which depends on file version and runtime policy, not
//! on this codec alone).

use crate::bitpack::{
    check_packets_nonzero, checked_snmp_u16, checked_stime_offset_ms, pack_bytes_per_packet,
    pack_packets_with_pflag, saturate_snmp_u8, unpack_bytes_per_packet, unpack_packets_with_pflag,
};
use crate::codec::{Codec, CodecContext, FormatId};
use crate::error::{CodecError, Result};
use crate::record::{FlowAddr, FlowRecord};
use binrw::{BinRead, BinWrite};
use modular_bitfield::specifiers::*;
use std::io::Cursor;
use std::net::Ipv4Addr;

/// Largest millisecond offset a 22-bit hour-relative start time can
/// hold (v5's `stime` sub-field).
const MAX_STIME_22: i64 = (1 << 22) - 1;

fn stime_offset_ms(hour_start_ms: i64, stime_ms: i64) -> Result<u32> {
    checked_stime_offset_ms(stime_ms - hour_start_ms, MAX_STIME_22)
}

fn proto_flags_to_rec(prot_flags: u8, is_tcp: bool, rec: &mut FlowRecord) {
    if is_tcp {
        rec.proto = 6;
        rec.flags = prot_flags;
    } else {
        rec.proto = prot_flags;
    }
}

fn rec_to_proto_flags(rec: &FlowRecord) -> (u8, bool) {
    if rec.proto == 6 {
        (rec.flags, true)
    } else {
        (rec.proto, false)
    }
}

// ---------------------------------------------------------------- v1/v2

#[silk_dtyp::mbitfield]
struct RoutedV1Pef {
    pkts: B20,
    elapsed: B11,
    pflag: bool,
}

#[silk_dtyp::mbitfield]
struct RoutedV1Sbb {
    stime: B12,
    bppkt: B14,
    bppfrac: B6,
}

#[silk_codec_derive::flow_record(length = 28)]
struct RoutedV1OnDisk {
    sip: u32,
    dip: u32,
    nhip: u32,
    sport: u16,
    dport: u16,
    pef: RoutedV1Pef,
    sbb: RoutedV1Sbb,
    proto: u8,
    flags: u8,
    input: u8,
    output: u8,
}

/// Covers both v1 and v2: the source documents them as a single
/// layout, the numeric version only recording which release wrote a
/// given file (mirrors [`RoutedV3V4`] below).
pub struct RoutedV1V2 {
    pub version: u8,
}

impl Codec for RoutedV1V2 {
    fn format(&self) -> FormatId {
        FormatId::Routed
    }
    fn version(&self) -> u8 {
        self.version
    }
    fn record_length(&self) -> u16 {
        RoutedV1OnDisk::RECORD_LENGTH
    }

    fn swap_in_place(&self, _buf: &mut [u8]) {
        // binrw's `#[brw(big)]` means this codec's wire representation
        // is always big-endian; byte-swapping on read from a
        // little-endian source file is handled once, generically, by
        // the stream layer before bytes reach the codec (`spec.md`
        // §4.1).
    }

    fn pack(&self, rec: &FlowRecord, ctx: &CodecContext) -> Result<Vec<u8>> {
        check_packets_nonzero(rec.packets)?;
        let (bppkt, bppfrac) = pack_bytes_per_packet(rec.bytes, rec.packets as u32);
        let (pkts, pflag) = pack_packets_with_pflag(rec.packets, 20);
        let on_disk = RoutedV1OnDisk {
            sip: match rec.sip {
                FlowAddr::V4(a) => u32::from(a),
                FlowAddr::V6(_) => return Err(CodecError::FieldOutOfRange { field: "sip", value: 0 }),
            },
            dip: match rec.dip {
                FlowAddr::V4(a) => u32::from(a),
                FlowAddr::V6(_) => return Err(CodecError::FieldOutOfRange { field: "dip", value: 0 }),
            },
            nhip: match rec.next_hop {
                FlowAddr::V4(a) => u32::from(a),
                FlowAddr::V6(_) => 0,
            },
            sport: rec.sport,
            dport: rec.dport,
            pef: RoutedV1Pef::new()
                .with_pkts(pkts)
                .with_elapsed(rec.elapsed_ms / 1000)
                .with_pflag(pflag),
            sbb: RoutedV1Sbb::new()
                .with_stime(((rec.stime_ms - ctx.hour_start_ms) / 1000).max(0) as u16)
                .with_bppkt(bppkt)
                .with_bppfrac(bppfrac),
            // v1/v2 carries `proto` and `flags` as dedicated bytes, not
            // a TCP/non-TCP overlay over a single shared byte (unlike
            // v3/v4/v5, which only have room for one): store them
            // directly.
            proto: rec.proto,
            flags: rec.flags,
            input: saturate_snmp_u8(rec.input),
            output: saturate_snmp_u8(rec.output),
        };
        let mut cursor = Cursor::new(Vec::new());
        on_disk.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    fn unpack(&self, buf: &[u8], ctx: &CodecContext) -> Result<FlowRecord> {
        let mut cursor = Cursor::new(buf);
        let on_disk = RoutedV1OnDisk::read(&mut cursor)?;
        let pkts = unpack_packets_with_pflag(on_disk.pef.pkts(), on_disk.pef.pflag());
        let bytes = unpack_bytes_per_packet(
            on_disk.sbb.bppkt(),
            on_disk.sbb.bppfrac(),
            pkts.min(u32::MAX as u64) as u32,
        );
        Ok(FlowRecord {
            stime_ms: ctx.hour_start_ms + on_disk.sbb.stime() as i64 * 1000,
            elapsed_ms: on_disk.pef.elapsed() * 1000,
            sport: on_disk.sport,
            dport: on_disk.dport,
            proto: on_disk.proto,
            flags: on_disk.flags,
            sip: FlowAddr::V4(Ipv4Addr::from(on_disk.sip)),
            dip: FlowAddr::V4(Ipv4Addr::from(on_disk.dip)),
            next_hop: FlowAddr::V4(Ipv4Addr::from(on_disk.nhip)),
            input: on_disk.input as u32,
            output: on_disk.output as u32,
            packets: pkts,
            bytes,
            sensor_id: ctx.sensor_id,
            flow_type: ctx.flow_type,
            ..Default::default()
        })
    }
}

// ---------------------------------------------------------------- v3/v4

#[silk_dtyp::mbitfield]
struct RoutedV3PktsStime {
    pkts: B20,
    stime: B12,
}

#[silk_dtyp::mbitfield]
struct RoutedV3Bbe {
    bppkt: B14,
    bppfrac: B6,
    elapsed: B12,
}

#[silk_dtyp::mbitfield]
struct RoutedV3MsecFlags {
    stime_msec: B10,
    elaps_msec: B10,
    pflag: bool,
    is_tcp: bool,
    padding: B2,
    prot_flags: u8,
}

#[silk_codec_derive::flow_record(length = 32)]
struct RoutedV3OnDisk {
    sip: u32,
    dip: u32,
    sport: u16,
    dport: u16,
    pkts_stime: RoutedV3PktsStime,
    bbe: RoutedV3Bbe,
    msec_flags: RoutedV3MsecFlags,
    nhip: u32,
    input: u16,
    output: u16,
}

/// Covers both v3 and v4: the source documents them with one shared
/// layout comment and one shared pack/unpack implementation, the
/// numeric version existing only to record which release wrote a
/// given file.
pub struct RoutedV3V4 {
    pub version: u8,
}

impl Codec for RoutedV3V4 {
    fn format(&self) -> FormatId {
        FormatId::Routed
    }
    fn version(&self) -> u8 {
        self.version
    }
    fn record_length(&self) -> u16 {
        RoutedV3OnDisk::RECORD_LENGTH
    }
    fn swap_in_place(&self, _buf: &mut [u8]) {}

    fn pack(&self, rec: &FlowRecord, ctx: &CodecContext) -> Result<Vec<u8>> {
        check_packets_nonzero(rec.packets)?;
        let (bppkt, bppfrac) = pack_bytes_per_packet(rec.bytes, rec.packets as u32);
        let (prot_flags, is_tcp) = rec_to_proto_flags(rec);
        let (pkts, pflag) = pack_packets_with_pflag(rec.packets, 20);
        let elapsed_secs = rec.elapsed_ms / 1000;
        let on_disk = RoutedV3OnDisk {
            sip: match rec.sip {
                FlowAddr::V4(a) => u32::from(a),
                FlowAddr::V6(_) => return Err(CodecError::FieldOutOfRange { field: "sip", value: 0 }),
            },
            dip: match rec.dip {
                FlowAddr::V4(a) => u32::from(a),
                FlowAddr::V6(_) => return Err(CodecError::FieldOutOfRange { field: "dip", value: 0 }),
            },
            sport: rec.sport,
            dport: rec.dport,
            pkts_stime: RoutedV3PktsStime::new()
                .with_pkts(pkts)
                .with_stime(((rec.stime_ms - ctx.hour_start_ms) / 1000).max(0) as u16),
            bbe: RoutedV3Bbe::new()
                .with_bppkt(bppkt)
                .with_bppfrac(bppfrac)
                .with_elapsed(elapsed_secs.min(0xFFF)),
            msec_flags: RoutedV3MsecFlags::new()
                .with_stime_msec((((rec.stime_ms - ctx.hour_start_ms) % 1000).max(0)) as u16)
                .with_elaps_msec((rec.elapsed_ms % 1000) as u16)
                .with_pflag(pflag)
                .with_is_tcp(is_tcp)
                .with_padding(0)
                .with_prot_flags(if is_tcp { prot_flags } else { prot_flags }),
            nhip: match rec.next_hop {
                FlowAddr::V4(a) => u32::from(a),
                FlowAddr::V6(_) => 0,
            },
            input: checked_snmp_u16(rec.input)?,
            output: checked_snmp_u16(rec.output)?,
        };
        let mut cursor = Cursor::new(Vec::new());
        on_disk.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    fn unpack(&self, buf: &[u8], ctx: &CodecContext) -> Result<FlowRecord> {
        let mut cursor = Cursor::new(buf);
        let on_disk = RoutedV3OnDisk::read(&mut cursor)?;
        let is_tcp = on_disk.msec_flags.is_tcp();
        let pkts = unpack_packets_with_pflag(on_disk.pkts_stime.pkts(), on_disk.msec_flags.pflag());
        let bytes = unpack_bytes_per_packet(
            on_disk.bbe.bppkt(),
            on_disk.bbe.bppfrac(),
            pkts.min(u32::MAX as u64) as u32,
        );
        let mut rec = FlowRecord {
            stime_ms: ctx.hour_start_ms
                + on_disk.pkts_stime.stime() as i64 * 1000
                + on_disk.msec_flags.stime_msec() as i64,
            elapsed_ms: on_disk.bbe.elapsed() * 1000 + on_disk.msec_flags.elaps_msec() as u32,
            sport: on_disk.sport,
            dport: on_disk.dport,
            sip: FlowAddr::V4(Ipv4Addr::from(on_disk.sip)),
            dip: FlowAddr::V4(Ipv4Addr::from(on_disk.dip)),
            next_hop: FlowAddr::V4(Ipv4Addr::from(on_disk.nhip)),
            input: on_disk.input as u32,
            output: on_disk.output as u32,
            packets: pkts,
            bytes,
            sensor_id: ctx.sensor_id,
            flow_type: ctx.flow_type,
            ..Default::default()
        };
        proto_flags_to_rec(on_disk.msec_flags.prot_flags(), is_tcp, &mut rec);
        Ok(rec)
    }
}

// -------------------------------------------------------------------- v5

#[silk_dtyp::mbitfield]
struct RoutedV5StimeBb1 {
    stime: B22,
    bppkt1: B10,
}

#[silk_dtyp::mbitfield]
struct RoutedV5Bb2Elapsed {
    bppkt2: B4,
    bppfrac: B6,
    elapsed: B22,
}

#[silk_dtyp::mbitfield]
struct RoutedV5ProFlgPkts {
    prot_flags: u8,
    pflag: bool,
    is_tcp: bool,
    padding: B2,
    pkts: B20,
}

#[silk_codec_derive::flow_record(length = 32)]
struct RoutedV5OnDisk {
    stime_bb1: RoutedV5StimeBb1,
    bb2_elapsed: RoutedV5Bb2Elapsed,
    pro_flg_pkts: RoutedV5ProFlgPkts,
    sport: u16,
    dport: u16,
    input: u16,
    output: u16,
    sip: u32,
    dip: u32,
    nhip: u32,
}

/// The v5 on-disk layout is shared bit-for-bit across every
/// SNMP-routed-ish format the original tool wrote at version 5 — only
/// the `FormatId` byte in the file header differs between `Routed`,
/// `NotRouted`, `Split`, `Filter`, and `Www`. No source for the latter
/// four survived retrieval; this struct is grounded on `RoutedV5`'s
/// confirmed layout and generalized to the sibling formats rather than
/// reverse-engineered from their own (unavailable) writers, the same
/// move `AugmentedV5` makes for its four `FormatId`s.
pub struct RoutedV5Family {
    pub format: FormatId,
}

impl RoutedV5Family {
    pub fn routed() -> Self {
        Self { format: FormatId::Routed }
    }
    pub fn not_routed() -> Self {
        Self { format: FormatId::NotRouted }
    }
    pub fn split() -> Self {
        Self { format: FormatId::Split }
    }
    pub fn filter() -> Self {
        Self { format: FormatId::Filter }
    }
    pub fn www() -> Self {
        Self { format: FormatId::Www }
    }
}

impl Codec for RoutedV5Family {
    fn format(&self) -> FormatId {
        self.format
    }
    fn version(&self) -> u8 {
        5
    }
    fn record_length(&self) -> u16 {
        RoutedV5OnDisk::RECORD_LENGTH
    }
    fn swap_in_place(&self, _buf: &mut [u8]) {}

    fn pack(&self, rec: &FlowRecord, ctx: &CodecContext) -> Result<Vec<u8>> {
        check_packets_nonzero(rec.packets)?;
        let (prot_flags, is_tcp) = rec_to_proto_flags(rec);
        let (pkts, pflag) = pack_packets_with_pflag(rec.packets, 20);
        let stime_off = stime_offset_ms(ctx.hour_start_ms, rec.stime_ms)?;
        let bppkt_full = pack_bytes_per_packet(rec.bytes, rec.packets as u32);
        let on_disk = RoutedV5OnDisk {
            stime_bb1: RoutedV5StimeBb1::new()
                .with_stime(stime_off)
                .with_bppkt1((bppkt_full.0 >> 4) as u32),
            bb2_elapsed: RoutedV5Bb2Elapsed::new()
                .with_bppkt2((bppkt_full.0 & 0xF) as u8)
                .with_bppfrac(bppkt_full.1)
                .with_elapsed(rec.elapsed_ms.min(MAX_STIME_22 as u32)),
            pro_flg_pkts: RoutedV5ProFlgPkts::new()
                .with_prot_flags(prot_flags)
                .with_pflag(pflag)
                .with_is_tcp(is_tcp)
                .with_padding(0)
                .with_pkts(pkts),
            sport: rec.sport,
            dport: rec.dport,
            input: checked_snmp_u16(rec.input)?,
            output: checked_snmp_u16(rec.output)?,
            sip: match rec.sip {
                FlowAddr::V4(a) => u32::from(a),
                FlowAddr::V6(_) => return Err(CodecError::FieldOutOfRange { field: "sip", value: 0 }),
            },
            dip: match rec.dip {
                FlowAddr::V4(a) => u32::from(a),
                FlowAddr::V6(_) => return Err(CodecError::FieldOutOfRange { field: "dip", value: 0 }),
            },
            nhip: match rec.next_hop {
                FlowAddr::V4(a) => u32::from(a),
                FlowAddr::V6(_) => 0,
            },
        };
        let mut cursor = Cursor::new(Vec::new());
        on_disk.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    fn unpack(&self, buf: &[u8], ctx: &CodecContext) -> Result<FlowRecord> {
        let mut cursor = Cursor::new(buf);
        let on_disk = RoutedV5OnDisk::read(&mut cursor)?;
        let bppkt = ((on_disk.stime_bb1.bppkt1() as u16) << 4) | on_disk.bb2_elapsed.bppkt2() as u16;
        let pkts = unpack_packets_with_pflag(on_disk.pro_flg_pkts.pkts(), on_disk.pro_flg_pkts.pflag());
        let bytes =
            unpack_bytes_per_packet(bppkt, on_disk.bb2_elapsed.bppfrac(), pkts.min(u32::MAX as u64) as u32);
        let mut rec = FlowRecord {
            stime_ms: ctx.hour_start_ms + on_disk.stime_bb1.stime() as i64,
            elapsed_ms: on_disk.bb2_elapsed.elapsed(),
            sport: on_disk.sport,
            dport: on_disk.dport,
            input: on_disk.input as u32,
            output: on_disk.output as u32,
            sip: FlowAddr::V4(Ipv4Addr::from(on_disk.sip)),
            dip: FlowAddr::V4(Ipv4Addr::from(on_disk.dip)),
            next_hop: FlowAddr::V4(Ipv4Addr::from(on_disk.nhip)),
            packets: pkts,
            bytes,
            sensor_id: ctx.sensor_id,
            flow_type: ctx.flow_type,
            ..Default::default()
        };
        proto_flags_to_rec(on_disk.pro_flg_pkts.prot_flags(), on_disk.pro_flg_pkts.is_tcp(), &mut rec);
        Ok(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlowRecord {
        FlowRecord {
            stime_ms: 1_700_000_000_000,
            elapsed_ms: 4_321,
            sport: 12345,
            dport: 80,
            proto: 6,
            flags: 0x1B,
            sip: FlowAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dip: FlowAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            next_hop: FlowAddr::V4(Ipv4Addr::new(10, 0, 0, 254)),
            input: 3,
            output: 7,
            packets: 42,
            bytes: 6400,
            sensor_id: 9,
            flow_type: 2,
            ..Default::default()
        }
    }

    #[test]
    fn v5_round_trips_core_fields() {
        let codec = RoutedV5Family::routed();
        let rec = sample();
        let ctx = CodecContext {
            sensor_id: 9,
            flow_type: 2,
            hour_start_ms: 1_700_000_000_000 - 500,
        };
        let packed = codec.pack(&rec, &ctx).unwrap();
        assert_eq!(packed.len(), RoutedV5OnDisk::RECORD_LENGTH as usize);
        let back = codec.unpack(&packed, &ctx).unwrap();
        assert_eq!(back.sport, rec.sport);
        assert_eq!(back.dport, rec.dport);
        assert_eq!(back.packets, rec.packets);
        assert_eq!(back.sip, rec.sip);
        assert_eq!(back.dip, rec.dip);
        assert_eq!(back.next_hop, rec.next_hop);
        assert_eq!(back.proto, 6);
    }

    #[test]
    fn v1_round_trips_whole_second_times() {
        let codec = RoutedV1V2 { version: 1 };
        let hour_start = 1_700_000_000_000i64 - (1_700_000_000_000i64 % 3_600_000);
        let rec = FlowRecord {
            stime_ms: hour_start + 10_000,
            elapsed_ms: 2_000,
            ..sample()
        };
        let ctx = CodecContext {
            sensor_id: 9,
            flow_type: 2,
            hour_start_ms: hour_start,
        };
        let packed = codec.pack(&rec, &ctx).unwrap();
        assert_eq!(packed.len(), 28);
        let back = codec.unpack(&packed, &ctx).unwrap();
        assert_eq!(back.elapsed_ms, 2_000);
        assert_eq!(back.packets, rec.packets);
    }

    /// v1 carries `proto`/`flags` as dedicated bytes; a non-TCP record
    /// (`proto = 0`, no TCP flags set) must round-trip its protocol
    /// exactly rather than being reinterpreted through a TCP heuristic.
    #[test]
    fn v1_preserves_proto_zero_with_no_flags() {
        let codec = RoutedV1V2 { version: 2 };
        let hour_start = 1_700_000_000_000i64 - (1_700_000_000_000i64 % 3_600_000);
        let rec = FlowRecord {
            stime_ms: hour_start + 10_000,
            elapsed_ms: 2_000,
            proto: 0,
            flags: 0,
            ..sample()
        };
        let ctx = CodecContext {
            sensor_id: 9,
            flow_type: 2,
            hour_start_ms: hour_start,
        };
        let packed = codec.pack(&rec, &ctx).unwrap();
        let back = codec.unpack(&packed, &ctx).unwrap();
        assert_eq!(back.proto, 0);
        assert_eq!(back.flags, 0);
    }

    /// Also covers v2: the source documents v1/v2 as one wire layout,
    /// so reading it back at version 2 exercises the same registered
    /// codec, just with the version number a file header would declare.
    #[test]
    fn v2_28_byte_layout_round_trips_full_field_set() {
        let codec = RoutedV1V2 { version: 2 };
        let hour_start = 1_700_000_000_000i64 - (1_700_000_000_000i64 % 3_600_000);
        let rec = FlowRecord {
            stime_ms: hour_start + 61_000,
            elapsed_ms: 9_000,
            sport: 443,
            dport: 51_234,
            proto: 17,
            flags: 0,
            sip: FlowAddr::V4(Ipv4Addr::new(192, 0, 2, 1)),
            dip: FlowAddr::V4(Ipv4Addr::new(198, 51, 100, 7)),
            next_hop: FlowAddr::V4(Ipv4Addr::new(192, 0, 2, 254)),
            input: 12,
            output: 34,
            packets: 500,
            bytes: 64_000,
            sensor_id: 9,
            flow_type: 2,
            ..Default::default()
        };
        let ctx = CodecContext {
            sensor_id: 9,
            flow_type: 2,
            hour_start_ms: hour_start,
        };
        let packed = codec.pack(&rec, &ctx).unwrap();
        assert_eq!(packed.len(), 28);
        let back = codec.unpack(&packed, &ctx).unwrap();
        assert_eq!(back.sport, rec.sport);
        assert_eq!(back.dport, rec.dport);
        assert_eq!(back.proto, rec.proto);
        assert_eq!(back.sip, rec.sip);
        assert_eq!(back.dip, rec.dip);
        assert_eq!(back.next_hop, rec.next_hop);
        assert_eq!(back.input, rec.input);
        assert_eq!(back.output, rec.output);
        assert_eq!(back.packets, rec.packets);
        assert_eq!(back.bytes, rec.bytes);
        assert_eq!(back.elapsed_ms, rec.elapsed_ms);
        assert_eq!(back.stime_ms, rec.stime_ms);
    }

    #[test]
    fn v3v4_round_trips_fractional_times() {
        let codec = RoutedV3V4 { version: 4 };
        let hour_start = 1_700_000_000_000i64 - (1_700_000_000_000i64 % 3_600_000);
        let rec = FlowRecord {
            stime_ms: hour_start + 10_500,
            elapsed_ms: 2_750,
            ..sample()
        };
        let ctx = CodecContext {
            sensor_id: 9,
            flow_type: 2,
            hour_start_ms: hour_start,
        };
        let packed = codec.pack(&rec, &ctx).unwrap();
        assert_eq!(packed.len(), 32);
        let back = codec.unpack(&packed, &ctx).unwrap();
        assert_eq!(back.elapsed_ms, 2_750);
    }

    /// `pkts = 2_097_152` (2^21) overflows the 20-bit `pkts` field on
    /// every Routed version, so `pflag` must be set on pack and the
    /// reader must multiply the stored field back up by `PKTS_DIVISOR`
    /// to recover the exact original count.
    #[test]
    fn v5_pflag_round_trips_packets_above_20_bits() {
        let codec = RoutedV5Family::routed();
        let rec = FlowRecord {
            packets: 2_097_152,
            ..sample()
        };
        let ctx = CodecContext {
            sensor_id: 9,
            flow_type: 2,
            hour_start_ms: 1_700_000_000_000 - 500,
        };
        let packed = codec.pack(&rec, &ctx).unwrap();
        let back = codec.unpack(&packed, &ctx).unwrap();
        assert_eq!(back.packets, 2_097_152);
    }

    #[test]
    fn v5_propagates_stime_overflow_instead_of_swallowing_it() {
        let codec = RoutedV5Family::routed();
        let ctx = CodecContext {
            sensor_id: 9,
            flow_type: 2,
            hour_start_ms: 1_700_000_000_000,
        };
        let rec = FlowRecord {
            // far beyond the 22-bit hour-relative millisecond window
            stime_ms: 1_700_000_000_000 + (1 << 23),
            ..sample()
        };
        assert!(codec.pack(&rec, &ctx).is_err());
    }

    #[test]
    fn v5_rejects_zero_packets() {
        let codec = RoutedV5Family::routed();
        let ctx = CodecContext {
            sensor_id: 9,
            flow_type: 2,
            hour_start_ms: 1_700_000_000_000 - 500,
        };
        let rec = FlowRecord { packets: 0, ..sample() };
        assert!(matches!(codec.pack(&rec, &ctx), Err(CodecError::PktsZero)));
    }

    #[test]
    fn filter_v5_shares_the_routed_v5_wire_layout() {
        let codec = RoutedV5Family::filter();
        assert_eq!(codec.format(), FormatId::Filter);
        let rec = sample();
        let ctx = CodecContext {
            sensor_id: 9,
            flow_type: 2,
            hour_start_ms: 1_700_000_000_000 - 500,
        };
        let packed = codec.pack(&rec, &ctx).unwrap();
        assert_eq!(packed.len(), RoutedV5OnDisk::RECORD_LENGTH as usize);
        let back = codec.unpack(&packed, &ctx).unwrap();
        assert_eq!(back.sport, rec.sport);
        assert_eq!(back.packets, rec.packets);
        assert_eq!(back.sip, rec.sip);
    }
}
