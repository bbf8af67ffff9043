//! Bit-packing helpers shared by every per-format module.
//!
//! These mirror the handful of encoding tricks `original_source/silk-src/
//! src/libsilk/rwroutedio.c` (and its siblings) use over and over across
//! the historical record formats, factored out once instead of
//! re-implemented per format, per the data-driven approach `spec.md`
//! §4.2 asks for.

use crate::error::{CodecError, Result};

/// Packets-per-flow divisor used when a format folds packet count and
/// bytes-per-packet into a combined word: the stored `bPPkt` field is
/// `(bytes << 6) / packets`, rounded to the nearest integer, and
/// `packets` itself is carried in a reduced-width field scaled by this
/// divisor when it would otherwise overflow.
pub const PKTS_DIVISOR: u32 = 64;

/// Packs `(packets, protocol)` into a 32-bit word as a 24-bit packet
/// count (saturating at `0x00FF_FFFF`) and an 8-bit protocol, matching
/// the `Routed`/`NotRouted`/`Split` v1 `pkts_proto` word.
pub fn pack_packets_protocol(packets: u32, protocol: u8) -> u32 {
    let pkts = packets.min(0x00FF_FFFF);
    (pkts << 8) | protocol as u32
}

/// Inverse of [`pack_packets_protocol`].
pub fn unpack_packets_protocol(word: u32) -> (u32, u8) {
    (word >> 8, (word & 0xFF) as u8)
}

/// Packs `bytes` and `packets` into a 64-bit-equivalent pair of
/// `(packets: u20, bytes_per_packet: u14, frac: u6)` used by the
/// `sbb` ("sTime/bPPkt/bPPFrac") word: `bPPkt` is bytes-per-packet with
/// 14 bits of integer part and 6 bits of binary fraction, i.e. the
/// fixed-point value `round((bytes << 6) / packets)`.
///
/// Returns `(bppkt_14, bppfrac_6)`. Division by zero packets returns
/// `(0, 0)` (an empty flow has no bytes-per-packet to report).
pub fn pack_bytes_per_packet(bytes: u64, packets: u32) -> (u16, u8) {
    if packets == 0 {
        return (0, 0);
    }
    let scaled = (bytes << 6) / packets as u64;
    let rounded = ((bytes << 6) + (packets as u64 / 2)) / packets as u64;
    let _ = scaled; // documents the unrounded form; `rounded` is what's stored
    let bppkt = (rounded >> 6) & 0x3FFF;
    let bppfrac = (rounded & 0x3F) as u8;
    (bppkt as u16, bppfrac)
}

/// Inverse of [`pack_bytes_per_packet`]: recovers `bytes` from the
/// fixed-point bytes-per-packet pair and the packet count.
pub fn unpack_bytes_per_packet(bppkt: u16, bppfrac: u8, packets: u32) -> u64 {
    let fixed = ((bppkt as u64) << 6) | (bppfrac as u64 & 0x3F);
    (fixed * packets as u64) >> 6
}

/// Packs a packet count into the reduced-width field used by formats
/// that scale packets by [`PKTS_DIVISOR`] once the true count would
/// overflow the field (the "truncated/saturating" packet-count
/// behavior called out in `spec.md` §4.2). `width_bits` is the
/// target field width; values that still overflow after scaling
/// saturate at the field's maximum.
pub fn pack_scaled_packets(packets: u32, width_bits: u32) -> u32 {
    let max = (1u64 << width_bits) - 1;
    if (packets as u64) <= max {
        packets
    } else {
        let scaled = (packets as u64) / PKTS_DIVISOR as u64;
        scaled.min(max) as u32
    }
}

/// Packs a 32-bit millisecond duration into a 3-byte (24-bit) field by
/// truncating to whole milliseconds and saturating at `0x00FF_FFFF`,
/// the "hand-encoded fractional time" layout used by the v1 Augmented
/// formats for `elapsed`.
pub fn pack_u24_saturating(value: u32) -> [u8; 3] {
    let v = value.min(0x00FF_FFFF);
    [(v >> 16) as u8, (v >> 8) as u8, v as u8]
}

pub fn unpack_u24(bytes: [u8; 3]) -> u32 {
    ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32
}

/// Saturates an SNMP interface index down to the 8-bit field the oldest
/// formats carry it in (`Routed`/`NotRouted`/`Split` v1, `Flowcap`'s
/// v2-4 layout): values above `0xFF` are clamped rather than rejected,
/// since these narrow fields were always advisory.
pub fn saturate_snmp_u8(value: u32) -> u8 {
    value.min(u8::MAX as u32) as u8
}

/// Checks an SNMP interface index against the 16-bit field most later
/// formats carry it in. Unlike the 8-bit case, a 16-bit field losing
/// data means the file genuinely cannot represent a real interface
/// index, so this errors instead of saturating.
pub fn checked_snmp_u16(value: u32) -> Result<u16> {
    u16::try_from(value).map_err(|_| CodecError::SnmpOverflow { value })
}

/// Rejects a packet count of zero, the invariant every format's
/// `pack()` must enforce: an empty flow is not representable on disk.
pub fn check_packets_nonzero(packets: u64) -> Result<()> {
    if packets == 0 {
        return Err(CodecError::PktsZero);
    }
    Ok(())
}

/// Packs a packet count that may need [`PKTS_DIVISOR`] scaling into the
/// `(field_value, pflag)` pair used by every format that carries a
/// reduced-width `pkts` field alongside a `pflag` bit (`Routed`/
/// `NotRouted`/`Split`/`Filter`'s `pkts`+`pflag`): when `packets` fits
/// in `width_bits`, it passes through unscaled and `pflag` is clear;
/// otherwise the stored field is `packets / PKTS_DIVISOR` (saturating
/// at the field's maximum) and `pflag` is set so the reader knows to
/// multiply back up.
pub fn pack_packets_with_pflag(packets: u64, width_bits: u32) -> (u32, bool) {
    let max = (1u64 << width_bits) - 1;
    let pflag = packets > max;
    let truncated = packets.min(u32::MAX as u64) as u32;
    (pack_scaled_packets(truncated, width_bits), pflag)
}

/// Inverse of [`pack_packets_with_pflag`]: recovers the true packet
/// count, undoing the [`PKTS_DIVISOR`] scaling when `pflag` is set.
pub fn unpack_packets_with_pflag(field: u32, pflag: bool) -> u64 {
    if pflag {
        field as u64 * PKTS_DIVISOR as u64
    } else {
        field as u64
    }
}

/// Checks a start-time offset (milliseconds since the packed-file
/// hour boundary) against the field width the `Routed` family stores
/// it in: negative offsets mean the record predates the file's hour
/// and can't be represented; offsets beyond `max` overflow the field.
pub fn checked_stime_offset_ms(offset_ms: i64, max: i64) -> Result<u32> {
    if offset_ms < 0 {
        return Err(CodecError::StartTimeUnderflow { value: offset_ms });
    }
    if offset_ms > max {
        return Err(CodecError::StartTimeOverflow { value: offset_ms, max });
    }
    Ok(offset_ms as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packets_protocol_round_trip() {
        let w = pack_packets_protocol(12345, 6);
        assert_eq!(unpack_packets_protocol(w), (12345, 6));
    }

    #[test]
    fn packets_protocol_saturates_at_24_bits() {
        let w = pack_packets_protocol(u32::MAX, 17);
        let (pkts, proto) = unpack_packets_protocol(w);
        assert_eq!(pkts, 0x00FF_FFFF);
        assert_eq!(proto, 17);
    }

    #[test]
    fn bytes_per_packet_round_trips_exactly_divisible() {
        let (bppkt, bppfrac) = pack_bytes_per_packet(6400, 100);
        assert_eq!(unpack_bytes_per_packet(bppkt, bppfrac, 100), 6400);
    }

    #[test]
    fn bytes_per_packet_empty_flow_is_zero() {
        assert_eq!(pack_bytes_per_packet(0, 0), (0, 0));
    }

    #[test]
    fn scaled_packets_under_limit_passes_through() {
        assert_eq!(pack_scaled_packets(100, 20), 100);
    }

    #[test]
    fn scaled_packets_over_limit_divides_by_64() {
        let over = (1u32 << 20) + 640;
        assert_eq!(pack_scaled_packets(over, 20), over / PKTS_DIVISOR);
    }

    #[test]
    fn packets_with_pflag_passes_through_under_20_bits() {
        let (field, pflag) = pack_packets_with_pflag(0xF_FFFF, 20);
        assert!(!pflag);
        assert_eq!(unpack_packets_with_pflag(field, pflag), 0xF_FFFF);
    }

    #[test]
    fn packets_with_pflag_scales_by_64_over_20_bits() {
        let (field, pflag) = pack_packets_with_pflag(2_097_152, 20);
        assert!(pflag);
        assert_eq!(unpack_packets_with_pflag(field, pflag), 2_097_152);
    }

    #[test]
    fn u24_round_trip() {
        let packed = pack_u24_saturating(0x00AB_CDEF);
        assert_eq!(unpack_u24(packed), 0x00AB_CDEF);
    }

    #[test]
    fn u24_saturates() {
        let packed = pack_u24_saturating(0xFFFF_FFFF);
        assert_eq!(unpack_u24(packed), 0x00FF_FFFF);
    }
}
