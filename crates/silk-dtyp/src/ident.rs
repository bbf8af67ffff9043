//! The process-wide template-id allocator used by `silk-schema`.
//!
//! IPFIX reserves template ids 0..=255 for the standard-information-model
//! "reserved" range; the schema engine hands out ids starting at 256+1
//! and never reuses one within a process, matching the session-scoped
//! template-id space described by the schema/template engine design.

use crate::error::DtypError;
use std::sync::Mutex;

/// First template id available for schema-defined templates.
pub const FIRST_TEMPLATE_ID: u16 = 257;

/// A simple, mutex-protected monotonic counter handing out template ids.
///
/// Exhaustion (wrapping past `u16::MAX`) is unrecoverable: every live
/// schema holds a unique id for the lifetime of the process, and there
/// is no id-reclamation scheme, so running out is treated as fatal by
/// callers (see `silk_schema::Session`).
#[derive(Debug)]
pub struct TemplateIdAllocator {
    next: Mutex<u32>,
}

impl Default for TemplateIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateIdAllocator {
    /// Creates an allocator starting at [`FIRST_TEMPLATE_ID`].
    pub fn new() -> Self {
        Self {
            next: Mutex::new(FIRST_TEMPLATE_ID as u32),
        }
    }

    /// Allocates and returns the next unused template id.
    pub fn alloc(&self) -> Result<u16, DtypError> {
        let mut next = self.next.lock().expect("template id allocator poisoned");
        if *next > u16::MAX as u32 {
            return Err(DtypError::TemplateIdsExhausted);
        }
        let id = *next as u16;
        *next += 1;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_in_order_starting_at_257() {
        let alloc = TemplateIdAllocator::new();
        assert_eq!(alloc.alloc().unwrap(), 257);
        assert_eq!(alloc.alloc().unwrap(), 258);
        assert_eq!(alloc.alloc().unwrap(), 259);
    }

    #[test]
    fn exhaustion_is_fatal_not_wrapping() {
        let alloc = TemplateIdAllocator {
            next: Mutex::new(u16::MAX as u32 + 1),
        };
        assert!(matches!(
            alloc.alloc(),
            Err(DtypError::TemplateIdsExhausted)
        ));
    }
}
