// Offline index construction: packed text to suffix array to BWT with
// checkpoint blocks and the sampled SA, plus the optional acceleration
// and perfect-match tables. Each component lands in its own binary file
// under the common prefix.

use std::path::Path;
use std::sync::Arc;

use bio::data_structures::suffix_array::suffix_array;

use crate::error::{IndexError, Result};
use crate::fm_index::{CP_MASK, CP_SHIFT, CpOcc};
use crate::index::BwtIndex;
use crate::opts::IndexOpts;
use crate::packed_ref::{PackedReference, append_reverse_complement, read_pac};
use crate::perfect::build_perfect_table;
use crate::ref_meta::RefMetadata;
use crate::smem_accel::{AllSmemTable, LastSmemTable};

pub struct IndexBuilder;

impl IndexBuilder {
    /// Index an ASCII text (ACGT only) as-is, without appending the
    /// reverse complement. The in-memory path used by tests and tools.
    pub fn from_text(text: &[u8], sa_sparsity: u32) -> Result<BwtIndex> {
        let mut bases = Vec::with_capacity(text.len());
        for &b in text {
            match b {
                b'A' | b'a' => bases.push(0u8),
                b'C' | b'c' => bases.push(1),
                b'G' | b'g' => bases.push(2),
                b'T' | b't' => bases.push(3),
                other => {
                    return Err(IndexError::format(
                        "<text>",
                        "<in-memory>",
                        format!("unindexable byte {other:#x} in reference text"),
                    ));
                }
            }
        }
        Self::from_packed(&bases, sa_sparsity)
    }

    /// Build the BWT, checkpoint blocks and sampled SA over a 2-bit
    /// packed text (one base per byte, values 0..=3).
    pub fn from_packed(bases: &[u8], sa_sparsity: u32) -> Result<BwtIndex> {
        if bases.is_empty() {
            return Err(IndexError::format("<text>", "<in-memory>", "empty reference"));
        }
        debug_assert!(sa_sparsity.is_power_of_two());

        let mut raw_counts = [0i64; 5];
        for &b in bases {
            raw_counts[b as usize + 1] += 1;
        }
        for i in 1..5 {
            raw_counts[i] += raw_counts[i - 1];
        }

        // The suffix-array construction wants a unique smallest sentinel;
        // shift bases to 1..=4 and use 0 for it. The sentinel row lands
        // at SA[0].
        let mut sais_text: Vec<u8> = Vec::with_capacity(bases.len() + 1);
        sais_text.extend(bases.iter().map(|&b| b + 1));
        sais_text.push(0);
        let sa = suffix_array(&sais_text);
        debug_assert_eq!(sa[0], bases.len());

        let seq_len = sais_text.len() as i64; // n + 1

        // BWT[i] = text[SA[i] - 1]; the row with SA == 0 is the sentinel.
        let mut sentinel_index = -1i64;
        let cp_occ_len = ((seq_len >> CP_SHIFT) + 1) as usize;
        let mut cp_occ: Vec<CpOcc> = vec![bytemuck::Zeroable::zeroed(); cp_occ_len];
        let mut running = [0i64; 4];

        for (i, &sa_val) in sa.iter().enumerate() {
            if i as i64 & CP_MASK == 0 {
                cp_occ[i >> CP_SHIFT].checkpoint_counts = running;
            }
            if sa_val == 0 {
                sentinel_index = i as i64;
            } else {
                let c = bases[sa_val - 1] as usize;
                cp_occ[i >> CP_SHIFT].one_hot_bwt_str[c] |= 1u64 << (63 - (i as i64 & CP_MASK));
                running[c] += 1;
            }
        }
        // rank queries at position seq_len read the trailing block
        if seq_len & CP_MASK == 0 {
            cp_occ[cp_occ_len - 1].checkpoint_counts = running;
        }
        debug_assert!(sentinel_index >= 0);

        let sa_shift = sa_sparsity.trailing_zeros();
        let n_sa = ((seq_len >> sa_shift) + 1) as usize;
        let mut sa_ms_byte = Vec::with_capacity(n_sa);
        let mut sa_ls_word = Vec::with_capacity(n_sa);
        for i in (0..sa.len()).step_by(sa_sparsity as usize) {
            let v = sa[i] as i64;
            sa_ms_byte.push((v >> 32) as i8);
            sa_ls_word.push(v as u32);
        }
        sa_ms_byte.resize(n_sa, 0);
        sa_ls_word.resize(n_sa, 0);

        Ok(BwtIndex::from_parts(
            seq_len,
            raw_counts,
            cp_occ,
            sa_ms_byte,
            sa_ls_word,
            sentinel_index,
            sa_sparsity,
        ))
    }

    /// Full offline build from `<prefix>.pac`: expand, append the
    /// reverse complement, and write every index component. The
    /// accelerator tables are large and optional; the perfect table is
    /// built when `opts.perfect_seed_len` is nonzero and the annotation
    /// sidecars are present.
    pub fn build_files(prefix: &Path, opts: &IndexOpts, with_accel: bool) -> Result<()> {
        let forward = read_pac(prefix)?;
        log::info!(
            "indexing {}: {} forward bases",
            prefix.display(),
            forward.len()
        );

        let packed = PackedReference::new(append_reverse_complement(&forward));
        packed.dump(prefix)?;

        let bwt = Self::from_packed(packed.doubled(), opts.sa_sparsity)?;
        bwt.dump(prefix)?;
        log::info!("wrote BWT index: n+1 = {}", bwt.seq_len);

        if with_accel {
            let all = AllSmemTable::build(&bwt);
            all.dump(prefix)?;
            drop(all);
            let last = LastSmemTable::build(&bwt);
            last.dump(prefix)?;
            log::info!("wrote SMEM acceleration tables");
        }

        if opts.perfect_seed_len > 0 {
            let meta = RefMetadata::restore(prefix)?;
            let table = build_perfect_table(
                Arc::new(packed),
                &meta,
                opts.perfect_seed_len,
                opts.perfect_slack,
            )?;
            table.dump(prefix)?;
            log::info!("wrote perfect table (seed length {})", opts.perfect_seed_len);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bwt_blocks_satisfy_construction_invariants() {
        let bwt = IndexBuilder::from_text(b"GATTACAGATTACACATGATTACA", 8).expect("build");

        // counts sum to the text length without the sentinel
        let total: i64 = (0..4)
            .map(|c| bwt.cumulative_count[c + 1] - bwt.cumulative_count[c])
            .sum();
        assert_eq!(total, bwt.seq_len - 1);

        // per-block popcounts cover exactly the live width
        let blocks = bwt.cp_occ();
        for (bi, block) in blocks.iter().enumerate() {
            let live = (bwt.seq_len - (bi as i64) * 64).clamp(0, 64);
            let pop: u32 = block.one_hot_bwt_str.iter().map(|w| w.count_ones()).sum();
            let expect_sentinel = bwt.sentinel_index >> 6 == bi as i64;
            assert_eq!(pop as i64 + expect_sentinel as i64, live, "block {bi}");
        }

        // prefix counts are monotonically non-decreasing across blocks
        for w in blocks.windows(2) {
            for c in 0..4 {
                assert!(w[1].checkpoint_counts[c] >= w[0].checkpoint_counts[c]);
            }
        }
    }

    #[test]
    fn bwt_row_matches_rotated_text() {
        let text = b"ACGTACGTTTGACCA";
        let bwt = IndexBuilder::from_text(text, 8).expect("build");
        let n1 = bwt.seq_len;
        for p in 0..n1 {
            let sa = bwt.get_sa_entry(p);
            let expect = if sa == 0 {
                None // sentinel precedes the first suffix
            } else {
                let b = text[(sa - 1) as usize];
                Some(match b {
                    b'A' => 0u8,
                    b'C' => 1,
                    b'G' => 2,
                    _ => 3,
                })
            };
            assert_eq!(bwt.bwt_char_at(p), expect, "row {p}");
        }
    }

    #[test]
    fn doubled_build_finds_reverse_strand_matches() {
        let forward: Vec<u8> = b"ACCTGATTACAGGCAT"
            .iter()
            .map(|&b| match b {
                b'A' => 0u8,
                b'C' => 1,
                b'G' => 2,
                _ => 3,
            })
            .collect();
        let doubled = append_reverse_complement(&forward);
        let bwt = IndexBuilder::from_packed(&doubled, 8).expect("build");

        // GATTACA forward once, its RC TGTAATC once on the other strand
        assert_eq!(bwt.count(&[2, 0, 3, 3, 0, 1, 0]), 1);
        assert_eq!(bwt.count(&[3, 2, 3, 0, 0, 3, 1]), 1);
    }

    #[test]
    fn empty_reference_is_rejected() {
        assert!(IndexBuilder::from_packed(&[], 8).is_err());
        assert!(IndexBuilder::from_text(b"ACGNT", 8).is_err());
    }
}
