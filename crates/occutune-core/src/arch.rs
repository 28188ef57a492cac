//! Per-generation resource allocation constants.
//!
//! These values come from the vendor occupancy documentation and cannot be
//! derived from device properties, so every supported compute capability
//! major version has an explicit entry.

use serde::Serialize;

/// How the register file is carved up between resident blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterAllocation {
    /// Registers are reserved for a whole block at once (compute capability 1.x).
    PerBlock,
    /// Registers are reserved warp by warp.
    PerWarp,
}

/// Allocation granularities and limits of one architecture generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArchitectureProfile {
    /// Compute capability major version the profile was looked up for.
    pub major: u32,
    /// Compute capability minor version the profile was looked up for.
    pub minor: u32,
    /// Warps are allocated to a block in multiples of this many warps.
    pub warp_alloc_granularity: u32,
    /// Registers are allocated in multiples of this many registers.
    pub reg_alloc_granularity: u32,
    /// Shared memory is allocated in multiples of this many bytes.
    pub smem_alloc_granularity: u64,
    /// Hardware cap on resident blocks per multiprocessor.
    pub max_blocks_per_sm: u32,
    /// Register accounting scheme.
    pub register_allocation: RegisterAllocation,
}

impl ArchitectureProfile {
    /// Looks up the profile for compute capability `major.minor`.
    ///
    /// Versions without an entry resolve to the newest known constants and
    /// log a warning.
    #[must_use]
    pub fn lookup(major: u32, minor: u32) -> Self {
        let (warp, reg, smem, max_blocks, registers) = match major {
            1 => (
                2,
                if minor < 2 { 256 } else { 512 },
                512,
                8,
                RegisterAllocation::PerBlock,
            ),
            2 => (2, 64, 128, 8, RegisterAllocation::PerWarp),
            3 => (4, 256, 256, 16, RegisterAllocation::PerWarp),
            5 => (4, 256, 256, 32, RegisterAllocation::PerWarp),
            6 => (
                if minor == 0 { 2 } else { 4 },
                256,
                256,
                32,
                RegisterAllocation::PerWarp,
            ),
            _ => {
                tracing::warn!(
                    major,
                    minor,
                    "Unsupported CUDA device major version, falling back to latest known SM parameters"
                );
                (4, 256, 256, 32, RegisterAllocation::PerWarp)
            }
        };

        Self {
            major,
            minor,
            warp_alloc_granularity: warp,
            reg_alloc_granularity: reg,
            smem_alloc_granularity: smem,
            max_blocks_per_sm: max_blocks,
            register_allocation: registers,
        }
    }

    /// Returns true if `major` has a dedicated table entry.
    #[must_use]
    pub fn is_known_major(major: u32) -> bool {
        matches!(major, 1 | 2 | 3 | 5 | 6)
    }

    /// Architecture version score used to break ranking ties (`major * 10 + minor`).
    #[must_use]
    pub fn version_score(&self) -> u32 {
        self.major * 10 + self.minor
    }

    /// True if the allocation constants match, ignoring the looked-up version.
    #[must_use]
    pub fn same_constants(&self, other: &Self) -> bool {
        self.warp_alloc_granularity == other.warp_alloc_granularity
            && self.reg_alloc_granularity == other.reg_alloc_granularity
            && self.smem_alloc_granularity == other.smem_alloc_granularity
            && self.max_blocks_per_sm == other.max_blocks_per_sm
            && self.register_allocation == other.register_allocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_pure() {
        for (major, minor) in [(1, 0), (1, 3), (2, 1), (3, 5), (5, 2), (6, 0), (6, 1)] {
            assert_eq!(
                ArchitectureProfile::lookup(major, minor),
                ArchitectureProfile::lookup(major, minor)
            );
        }
    }

    #[test]
    fn test_pascal_constants() {
        let arch = ArchitectureProfile::lookup(6, 1);
        assert_eq!(arch.warp_alloc_granularity, 4);
        assert_eq!(arch.reg_alloc_granularity, 256);
        assert_eq!(arch.smem_alloc_granularity, 256);
        assert_eq!(arch.max_blocks_per_sm, 32);
        assert_eq!(arch.register_allocation, RegisterAllocation::PerWarp);

        assert_eq!(ArchitectureProfile::lookup(6, 0).warp_alloc_granularity, 2);
    }

    #[test]
    fn test_tesla_minor_variants() {
        let early = ArchitectureProfile::lookup(1, 1);
        let late = ArchitectureProfile::lookup(1, 3);
        assert_eq!(early.reg_alloc_granularity, 256);
        assert_eq!(late.reg_alloc_granularity, 512);
        assert_eq!(early.register_allocation, RegisterAllocation::PerBlock);
        assert_eq!(early.max_blocks_per_sm, 8);
    }

    #[test]
    fn test_unknown_versions_share_fallback() {
        let volta = ArchitectureProfile::lookup(7, 0);
        let ampere = ArchitectureProfile::lookup(8, 6);
        let hopper = ArchitectureProfile::lookup(9, 0);
        assert!(volta.same_constants(&ampere));
        assert!(ampere.same_constants(&hopper));
        assert!(volta.same_constants(&ArchitectureProfile::lookup(6, 1)));
        assert_eq!(hopper.version_score(), 90);
        assert!(!ArchitectureProfile::is_known_major(8));
    }
}
