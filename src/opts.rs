// Index-time and query-time options.
//
// These are plain values; there is no global configuration. The engine and
// the loaders borrow an `IndexOpts` and never mutate it.

/// Hugepage backing requested for shared index segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HugepageMode {
    /// Regular 4 KB pages.
    #[default]
    Normal,
    /// Whatever the kernel's default hugepage size is.
    DefaultHuge,
    /// 2 MB pages.
    Huge2Mb,
    /// 1 GB pages.
    Huge1Gb,
}

/// Options for index construction and SMEM queries.
#[derive(Debug, Clone)]
pub struct IndexOpts {
    /// Minimum BWT interval size; an extension whose interval drops below
    /// this is considered unique enough to emit.
    pub min_intv: i64,
    /// Minimum SMEM length for emission.
    pub min_seed_len: i32,
    /// Maximum interval size for the forward-only seed strategy.
    pub max_intv: i64,
    /// Per-SMEM cap on locations resolved through the sampled SA.
    pub max_occ: i32,
    /// Suffix-array sparsity K; must be a power of two.
    pub sa_sparsity: u32,
    /// Perfect-match seed length L; 0 disables the perfect table.
    pub perfect_seed_len: i32,
    /// Overfill factor for the perfect table's slot array.
    pub perfect_slack: f64,
    /// Fractional overlap above which redundant perfect hits are collapsed.
    pub mask_level_redun: f64,
    /// Hugepage backing for shared segments.
    pub hugepage_mode: HugepageMode,
    /// If true, failure to reserve the requested page size is fatal
    /// instead of silently downgrading.
    pub hugepage_force: bool,
}

/// Hard upper bound on read length; engine scratch buffers are sized for it.
pub const MAX_READ_LEN: usize = 512;

impl Default for IndexOpts {
    fn default() -> Self {
        IndexOpts {
            min_intv: 1,
            min_seed_len: 19,
            max_intv: 500,
            max_occ: 500,
            sa_sparsity: 8,
            perfect_seed_len: 0,
            perfect_slack: 1.2,
            mask_level_redun: 0.95,
            hugepage_mode: HugepageMode::Normal,
            hugepage_force: false,
        }
    }
}

impl IndexOpts {
    /// log2 of the SA sparsity, used to turn positions into sample slots.
    pub fn sa_shift(&self) -> u32 {
        debug_assert!(self.sa_sparsity.is_power_of_two());
        self.sa_sparsity.trailing_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let opts = IndexOpts::default();
        assert_eq!(opts.min_intv, 1);
        assert_eq!(opts.min_seed_len, 19);
        assert_eq!(opts.max_intv, 500);
        assert_eq!(opts.max_occ, 500);
        assert_eq!(opts.sa_sparsity, 8);
        assert_eq!(opts.sa_shift(), 3);
        assert_eq!(opts.perfect_seed_len, 0);
        assert_eq!(opts.hugepage_mode, HugepageMode::Normal);
        assert!(!opts.hugepage_force);
    }
}
