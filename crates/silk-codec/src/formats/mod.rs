//! Concrete (format, version) codecs. Each submodule is grounded on a
//! specific file under `original_source/silk-src/src/libsilk/`; see
//! that module's doc comment for the citation.
//!
//! Coverage spans every `FormatId` `spec.md` §4.2 lists. Where a
//! format's own on-disk writer didn't survive retrieval
//! (`NotRouted`/`Split`/`Filter`/`Www`, plain `Ipv6` beyond its shared
//! `Generic` layout, three of the four `Augmented` variants, Flowcap
//! v6), the registered codec reuses the proven wire layout of a sibling
//! format that does have surviving source, per each submodule's doc
//! comment; see `DESIGN.md` for the per-format grounding ledger.

pub mod augmented;
pub mod flowcap;
pub mod generic;
pub mod ipv6routing;
pub mod routed;

use crate::codec::Registry;

/// Populates `reg` with every codec this crate ships. Called once by
/// [`crate::codec::Registry::shared`].
pub fn register_all(reg: &mut Registry) {
    reg.insert(Box::new(routed::RoutedV1V2 { version: 1 }));
    reg.insert(Box::new(routed::RoutedV1V2 { version: 2 }));
    reg.insert(Box::new(routed::RoutedV3V4 { version: 3 }));
    reg.insert(Box::new(routed::RoutedV3V4 { version: 4 }));
    reg.insert(Box::new(routed::RoutedV5Family::routed()));
    reg.insert(Box::new(routed::RoutedV5Family::not_routed()));
    reg.insert(Box::new(routed::RoutedV5Family::split()));
    reg.insert(Box::new(routed::RoutedV5Family::filter()));
    reg.insert(Box::new(routed::RoutedV5Family::www()));

    for version in 0..=5 {
        reg.insert(Box::new(generic::GenericIpv4 { version }));
    }
    for version in 1..=3 {
        reg.insert(Box::new(generic::Ipv6 { version }));
    }

    reg.insert(Box::new(augmented::AugmentedV5::snmp_out()));
    reg.insert(Box::new(augmented::AugmentedV5::snmp_in()));
    reg.insert(Box::new(augmented::AugmentedV5::web()));
    reg.insert(Box::new(augmented::AugmentedV5::routing()));

    reg.insert(Box::new(ipv6routing::Ipv6RoutingV3));

    for version in 2..=4 {
        reg.insert(Box::new(flowcap::FlowcapV2To4 { version }));
    }
    for version in 5..=6 {
        reg.insert(Box::new(flowcap::FlowcapV5V6 { version }));
    }
}
