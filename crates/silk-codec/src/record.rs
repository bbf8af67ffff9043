//! [`FlowRecord`]: the canonical in-memory flow record every on-disk
//! format packs into and unpacks from.
//!
//! Field set and comments are grounded directly on
//! `original_source/silk-src/src/libsilk/rwrec.h`'s `rwGenericRec_V6`,
//! the "generic" record every packed format converts to/from. Sidecar
//! and the embedded scripting-language state are represented as an
//! opaque optional blob per `spec.md` §1 (the sidecar scripting layer
//! is an external collaborator, out of scope for interpretation here).

use std::net::{Ipv4Addr, Ipv6Addr};

/// Either a v4 or v6 address; every address-valued field on
/// [`FlowRecord`] uses this so the record can represent both IPv4-only
/// legacy formats and the IPv6-capable formats uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAddr {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl FlowAddr {
    pub fn is_v4(&self) -> bool {
        matches!(self, FlowAddr::V4(_))
    }

    pub fn is_v6(&self) -> bool {
        matches!(self, FlowAddr::V6(_))
    }

    /// Returns the IPv4 address, mapping an IPv4-mapped-in-IPv6 address
    /// down if necessary. `None` if this is a genuine IPv6 address.
    pub fn to_v4(&self) -> Option<Ipv4Addr> {
        match self {
            FlowAddr::V4(a) => Some(*a),
            FlowAddr::V6(a) => a.to_ipv4_mapped(),
        }
    }
}

impl Default for FlowAddr {
    fn default() -> Self {
        FlowAddr::V4(Ipv4Addr::UNSPECIFIED)
    }
}

/// TCP state-machine bits carried in `tcp_state` (rwrec.h's
/// `SK_TCPSTATE_*` constants). The top bit (`0x80`) is reserved by the
/// original to flag "this record holds IPv6 addresses"; `silk-codec`
/// tracks that fact structurally via [`FlowAddr`] instead, so
/// [`TcpState`] only models the six meaningful low bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpState {
    pub expanded: bool,
    pub fin_followed_not_ack: bool,
    pub uniform_packet_size: bool,
    pub timeout_killed: bool,
    pub timeout_started: bool,
}

impl TcpState {
    pub const MASK: u8 = 0x79;
    pub const ATTRIBUTE_MASK: u8 = 0x78;

    pub fn from_bits(bits: u8) -> Self {
        TcpState {
            expanded: bits & 0x01 != 0,
            fin_followed_not_ack: bits & 0x08 != 0,
            uniform_packet_size: bits & 0x10 != 0,
            timeout_killed: bits & 0x20 != 0,
            timeout_started: bits & 0x40 != 0,
        }
    }

    pub fn to_bits(self) -> u8 {
        (self.expanded as u8)
            | ((self.fin_followed_not_ack as u8) << 3)
            | ((self.uniform_packet_size as u8) << 4)
            | ((self.timeout_killed as u8) << 5)
            | ((self.timeout_started as u8) << 6)
    }
}

/// The canonical, format-independent flow record.
///
/// Every per-format codec's `unpack` produces one of these, and every
/// `pack` consumes one; `silk-schema`'s `SchemaMap` transcodes between
/// this shape and a `FixedRecord`'s IPFIX-style field layout when a
/// caller reads/writes through the schema engine instead of a legacy
/// format directly.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlowRecord {
    /// Flow start time, milliseconds since the Unix epoch.
    pub stime_ms: i64,
    /// Flow duration, milliseconds (`eTime = sTime + elapsed`, stored
    /// as a duration rather than an absolute end time so adjusting
    /// `stime_ms` can never silently invalidate `etime`).
    pub elapsed_ms: u32,

    pub sport: u16,
    pub dport: u16,
    pub proto: u8,

    /// Class & type info: which flowtype this record belongs to.
    pub flow_type: u8,
    pub sensor_id: u16,

    /// Bitwise OR of all TCP flags seen on the flow (or NetFlow flags
    /// for non-TCP-flag-capable collectors).
    pub flags: u8,
    /// TCP flags on the first packet, valid only when
    /// `tcp_state.expanded` is set.
    pub init_flags: u8,
    /// TCP flags on non-initial packets, valid only when
    /// `tcp_state.expanded` is set.
    pub rest_flags: u8,
    pub tcp_state: TcpState,

    /// Collector-assigned "service" port (may differ from `dport`).
    pub application: u16,
    /// Format-specific scratch field (`memo` in the original).
    pub memo: u16,

    pub packets: u64,
    pub bytes: u64,

    pub input: u32,
    pub output: u32,

    pub sip: FlowAddr,
    pub dip: FlowAddr,
    pub next_hop: FlowAddr,

    pub icmp_type: u8,
    pub icmp_code: u8,

    /// Opaque sidecar reference. The sidecar scripting layer that
    /// interprets this value lives outside this crate (`spec.md` §1);
    /// `silk-codec`/`silk-io` only ever move it around as bytes.
    pub sidecar: Option<Vec<u8>>,
}

impl FlowRecord {
    /// Flow end time, derived from `stime_ms + elapsed_ms`.
    pub fn etime_ms(&self) -> i64 {
        self.stime_ms + self.elapsed_ms as i64
    }

    /// `true` if either endpoint address is genuinely IPv6 (not just
    /// IPv4-mapped), matching the original's "mark as IPv6" tcp_state
    /// bit semantics without reusing that bit directly.
    pub fn is_ipv6(&self) -> bool {
        matches!(self.sip, FlowAddr::V6(a) if a.to_ipv4_mapped().is_none())
            || matches!(self.dip, FlowAddr::V6(a) if a.to_ipv4_mapped().is_none())
    }
}
