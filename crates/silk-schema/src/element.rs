//! Information elements: the typed, identified atoms a [`crate::Field`]
//! wraps (`spec.md` GLOSSARY, §4.5).

use std::sync::Arc;

/// Sentinel length used by a [`Field`](crate::field::Field) whose
/// on-disk representation is variable-length (string, octet array, or
/// any of the three list kinds).
pub const VARLEN: u16 = 0xFFFF;

/// An information element's datatype, spanning the IPFIX basic types
/// this engine supports plus the three list kinds (`spec.md` §3's
/// Schema/Template data model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datatype {
    UnsignedInt8,
    UnsignedInt16,
    UnsignedInt32,
    UnsignedInt64,
    SignedInt8,
    SignedInt16,
    SignedInt32,
    SignedInt64,
    Float32,
    Float64,
    Boolean,
    MacAddress,
    Ipv4Address,
    Ipv6Address,
    String,
    OctetArray,
    DateTimeSeconds,
    DateTimeMilliseconds,
    DateTimeMicroseconds,
    DateTimeNanoseconds,
    BasicList,
    SubTemplateList,
    SubTemplateMultiList,
}

impl Datatype {
    /// Fixed on-disk width in bytes, or `None` for a type whose length
    /// is either inherently variable (string/octet array/lists) or
    /// caller-specified (the engine allows any integer/float datatype
    /// to be truncated to a narrower field via `Field::with_length`).
    pub fn natural_length(self) -> Option<u16> {
        use Datatype::*;
        match self {
            UnsignedInt8 | SignedInt8 | Boolean => Some(1),
            UnsignedInt16 | SignedInt16 => Some(2),
            UnsignedInt32 | SignedInt32 | Float32 | Ipv4Address | DateTimeSeconds => Some(4),
            UnsignedInt64 | SignedInt64 | Float64 | DateTimeMilliseconds | DateTimeMicroseconds
            | DateTimeNanoseconds => Some(8),
            MacAddress => Some(6),
            Ipv6Address => Some(16),
            String | OctetArray | BasicList | SubTemplateList | SubTemplateMultiList => None,
        }
    }

    /// `true` for the three list datatypes.
    pub fn is_list(self) -> bool {
        matches!(
            self,
            Datatype::BasicList | Datatype::SubTemplateList | Datatype::SubTemplateMultiList
        )
    }

    pub fn is_datetime(self) -> bool {
        matches!(
            self,
            Datatype::DateTimeSeconds
                | Datatype::DateTimeMilliseconds
                | Datatype::DateTimeMicroseconds
                | Datatype::DateTimeNanoseconds
        )
    }

    pub fn is_integer(self) -> bool {
        use Datatype::*;
        matches!(
            self,
            UnsignedInt8
                | UnsignedInt16
                | UnsignedInt32
                | UnsignedInt64
                | SignedInt8
                | SignedInt16
                | SignedInt32
                | SignedInt64
        )
    }

    pub fn is_signed(self) -> bool {
        use Datatype::*;
        matches!(self, SignedInt8 | SignedInt16 | SignedInt32 | SignedInt64)
    }
}

/// Annotative semantics tag carried by a field, per `spec.md` §4.5
/// ("semantics and units (annotative)"). Never interpreted by the
/// engine itself; it is carried through transcoding and available to
/// `to_text`/compare overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Semantics {
    #[default]
    Default,
    Quantity,
    TotalCounter,
    DeltaCounter,
    Identifier,
    Flags,
    List,
}

/// Annotative unit tag, mirroring IPFIX's `units` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Units {
    #[default]
    None,
    Bits,
    Octets,
    Packets,
    Flows,
    Seconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

/// An information element's stable identity plus the bits a schema
/// needs to allocate and type-check a field: enterprise number +
/// element id (the IPFIX compound key), a name borrowed from the
/// information model, and a datatype.
///
/// `name` is `Arc<str>` rather than `&'static str` because the
/// information model (an external collaborator, `spec.md` §6) may
/// load elements at runtime from a registry this crate does not own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InformationElement {
    pub enterprise_number: u32,
    pub element_id: u16,
    pub name: Arc<str>,
    pub datatype: Datatype,
}

impl InformationElement {
    pub fn new(enterprise_number: u32, element_id: u16, name: &str, datatype: Datatype) -> Self {
        InformationElement {
            enterprise_number,
            element_id,
            name: Arc::from(name),
            datatype,
        }
    }

    /// `true` for standard (non-enterprise) information elements.
    pub fn is_standard(&self) -> bool {
        self.enterprise_number == 0
    }
}
