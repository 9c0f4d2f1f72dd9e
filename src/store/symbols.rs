//! Naming function pointers for display.

use crate::parser::MemoryRegion;

/// Turns a code address into a display name
///
/// Implementations that load debug info live outside this crate; the store
/// only hands them the covering region and the address.
pub trait SymbolResolver {
    fn resolve_symbol(&self, region: &MemoryRegion, address: u64) -> String;
}

impl<F> SymbolResolver for F
where
    F: Fn(&MemoryRegion, u64) -> String,
{
    fn resolve_symbol(&self, region: &MemoryRegion, address: u64) -> String {
        self(region, address)
    }
}

/// Names addresses by mapping and offset, e.g. `/usr/bin/demo+0x1a2b`
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionSymbolResolver;

impl SymbolResolver for RegionSymbolResolver {
    fn resolve_symbol(&self, region: &MemoryRegion, address: u64) -> String {
        if region.is_unknown() || !region.contains(address) {
            return format!("{:#x}", address);
        }

        let offset = address - region.low;
        if region.pathname.is_empty() {
            format!("[anon {:#x}]+{:#x}", region.low, offset)
        } else {
            format!("{}+{:#x}", region.pathname, offset)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(pathname: &str) -> MemoryRegion {
        MemoryRegion {
            low: 0x400000,
            high: 0x40b000,
            perms: "r-xp".to_string(),
            offset: "00000000".to_string(),
            dev: "08:01".to_string(),
            inode: "1234".to_string(),
            pathname: pathname.to_string(),
        }
    }

    #[test]
    fn test_named_by_path_and_offset() {
        let name = RegionSymbolResolver.resolve_symbol(&region("/usr/bin/demo"), 0x401a2b);
        assert_eq!(name, "/usr/bin/demo+0x1a2b");
    }

    #[test]
    fn test_anonymous_mapping() {
        let name = RegionSymbolResolver.resolve_symbol(&region(""), 0x400010);
        assert_eq!(name, "[anon 0x400000]+0x10");
    }

    #[test]
    fn test_unmapped_address() {
        let unknown = MemoryRegion::unknown(0xdead);
        assert_eq!(RegionSymbolResolver.resolve_symbol(&unknown, 0xdead), "0xdead");
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |_: &MemoryRegion, addr: u64| format!("fn_{:x}", addr);
        assert_eq!(resolver.resolve_symbol(&region(""), 0x10), "fn_10");
    }
}
