// Precomputed forward-extension tables.
//
// Both tables are indexed by the 2-bit big-endian packing of a short query
// window and collapse the first few forward extensions of a bidirectional
// search into one indexed read.
//
// The all-SMEM table (11 bp) stores, for each position after the first,
// the deltas needed to rebuild the extended interval: the extension at
// position i is fully determined by `k = prev_k + k_delta`,
// `l = C[3 - base] + l_delta`, `s = s_stored`. The last-SMEM table (13 bp)
// stores only the terminal interval plus how many bases it consumed.
//
// Replay must be bit-identical with the per-base loop; the tests enforce
// this against random sequences and the builder enumerates every key.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use rayon::prelude::*;

use crate::error::{IndexError, Result};
use crate::index::BwtIndex;
use crate::packed_ref::suffixed_path;
use crate::smem::Smem;

/// Window width of the all-SMEM table. 4^11 entries of 128 bytes: 512 MB.
pub const ALL_SMEM_BP: usize = 11;
/// Window width of the last-SMEM table. 4^13 entries of 16 bytes: 1 GB.
pub const LAST_SMEM_BP: usize = 13;

/// One replayed forward-extension step of the all-SMEM table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct AllSmemStep {
    /// k = previous k + k_delta.
    pub k_delta: u32,
    /// l = C[3 - base] + l_delta.
    pub l_delta: u32,
    /// Interval size after this extension.
    pub s: u32,
}

/// All-SMEM entry: two cache lines covering extensions at positions 1..=10
/// of an 11-base window.
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable, Pod)]
pub struct AllSmemEntry {
    /// Largest position with a positive stored interval size.
    pub last_avail: u32,
    pub list: [AllSmemStep; ALL_SMEM_BP - 1],
    _pad: [u8; 4],
}

/// Last-SMEM entry: the terminal interval reached by extending from
/// position 0, in 40-bit split encoding, plus the bases consumed.
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable, Pod)]
pub struct LastSmemEntry {
    /// Number of window bases this entry actually covers.
    pub bp: u8,
    pub k_ms: i8,
    pub l_ms: i8,
    pub s_ms: i8,
    pub k_ls: u32,
    pub l_ls: u32,
    pub s_ls: u32,
}

impl LastSmemEntry {
    #[inline(always)]
    pub fn k(&self) -> i64 {
        combine_ms_ls(self.k_ms, self.k_ls)
    }

    #[inline(always)]
    pub fn l(&self) -> i64 {
        combine_ms_ls(self.l_ms, self.l_ls)
    }

    #[inline(always)]
    pub fn s(&self) -> i64 {
        combine_ms_ls(self.s_ms, self.s_ls)
    }
}

#[inline(always)]
fn combine_ms_ls(ms: i8, ls: u32) -> i64 {
    ((ms as i64) << 32) | ls as i64
}

/// 2-bit big-endian key of a clean window, or None if any base is not in
/// {A,C,G,T}. The accelerator is bypassed entirely for dirty windows.
#[inline]
pub fn window_key(window: &[u8]) -> Option<usize> {
    let mut key = 0usize;
    for &b in window {
        if b > 3 {
            return None;
        }
        key = (key << 2) | b as usize;
    }
    Some(key)
}

fn num_entries(bp: usize) -> usize {
    1usize << (2 * bp)
}

/// The starting interval of a one-base search: everything prefixed by `a`.
#[inline]
pub fn singleton_interval(bwt: &BwtIndex, a: u8) -> Smem {
    Smem {
        bwt_interval_start: bwt.cumulative_count[a as usize],
        bwt_interval_end: bwt.cumulative_count[3 - a as usize],
        interval_size: bwt.cumulative_count[a as usize + 1] - bwt.cumulative_count[a as usize],
        ..Smem::default()
    }
}

fn decode_window(key: usize, bp: usize, out: &mut [u8]) {
    for (i, slot) in out.iter_mut().enumerate().take(bp) {
        *slot = ((key >> ((bp - 1 - i) * 2)) & 3) as u8;
    }
}

pub struct AllSmemTable {
    entries: crate::shm::Backing<AllSmemEntry>,
}

impl AllSmemTable {
    pub fn file_suffix() -> String {
        format!(".all_smem.{ALL_SMEM_BP}")
    }

    /// Simulate forward extension for every 11-base sequence.
    pub fn build(bwt: &BwtIndex) -> AllSmemTable {
        let n = num_entries(ALL_SMEM_BP);
        log::info!("building all-SMEM table: {n} entries");
        let entries: Vec<AllSmemEntry> = (0..n)
            .into_par_iter()
            .map(|key| {
                let mut seq = [0u8; ALL_SMEM_BP];
                decode_window(key, ALL_SMEM_BP, &mut seq);
                build_all_smem_entry(bwt, &seq)
            })
            .collect();
        AllSmemTable {
            entries: entries.into(),
        }
    }

    pub fn dump(&self, prefix: &Path) -> Result<()> {
        let path = suffixed_path(prefix, &Self::file_suffix());
        let mut file = File::create(&path)?;
        file.write_all(bytemuck::cast_slice(&self.entries))?;
        Ok(())
    }

    /// Map `<prefix>.all_smem.11` read-only.
    pub fn load(prefix: &Path) -> Result<AllSmemTable> {
        let entries = map_table(prefix, &Self::file_suffix(), ".all_smem", num_entries(ALL_SMEM_BP))?;
        Ok(AllSmemTable { entries })
    }

    pub fn from_shared(view: Arc<crate::shm::SharedView>) -> Result<AllSmemTable> {
        let n = num_entries(ALL_SMEM_BP);
        if view.len() < n * std::mem::size_of::<AllSmemEntry>() {
            return Err(IndexError::Concurrency { segment: "smem_all" });
        }
        Ok(AllSmemTable {
            entries: crate::shm::Backing::shared(view, 0, n),
        })
    }

    pub fn to_shared_image(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.entries).to_vec()
    }

    #[inline(always)]
    pub fn entry(&self, key: usize) -> &AllSmemEntry {
        &self.entries[key]
    }

    /// Table over explicit entries. A window left zeroed (`last_avail`
    /// 0) is simply never replayed, so sparse tables are valid.
    pub fn from_entries(entries: Vec<AllSmemEntry>) -> AllSmemTable {
        debug_assert_eq!(entries.len(), num_entries(ALL_SMEM_BP));
        AllSmemTable {
            entries: entries.into(),
        }
    }

    /// The table entry for one window, computed directly.
    pub fn build_entry(bwt: &BwtIndex, window: &[u8; ALL_SMEM_BP]) -> AllSmemEntry {
        build_all_smem_entry(bwt, window)
    }
}

pub struct LastSmemTable {
    entries: crate::shm::Backing<LastSmemEntry>,
}

impl LastSmemTable {
    pub fn file_suffix() -> String {
        format!(".last_smem.{LAST_SMEM_BP}")
    }

    pub fn build(bwt: &BwtIndex) -> LastSmemTable {
        let n = num_entries(LAST_SMEM_BP);
        log::info!("building last-SMEM table: {n} entries");
        let entries: Vec<LastSmemEntry> = (0..n)
            .into_par_iter()
            .map(|key| {
                let mut seq = [0u8; LAST_SMEM_BP];
                decode_window(key, LAST_SMEM_BP, &mut seq);
                build_last_smem_entry(bwt, &seq)
            })
            .collect();
        LastSmemTable {
            entries: entries.into(),
        }
    }

    pub fn dump(&self, prefix: &Path) -> Result<()> {
        let path = suffixed_path(prefix, &Self::file_suffix());
        let mut file = File::create(&path)?;
        file.write_all(bytemuck::cast_slice(&self.entries))?;
        Ok(())
    }

    pub fn load(prefix: &Path) -> Result<LastSmemTable> {
        let entries =
            map_table(prefix, &Self::file_suffix(), ".last_smem", num_entries(LAST_SMEM_BP))?;
        Ok(LastSmemTable { entries })
    }

    pub fn from_shared(view: Arc<crate::shm::SharedView>) -> Result<LastSmemTable> {
        let n = num_entries(LAST_SMEM_BP);
        if view.len() < n * std::mem::size_of::<LastSmemEntry>() {
            return Err(IndexError::Concurrency { segment: "smem_last" });
        }
        Ok(LastSmemTable {
            entries: crate::shm::Backing::shared(view, 0, n),
        })
    }

    pub fn to_shared_image(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.entries).to_vec()
    }

    #[inline(always)]
    pub fn entry(&self, key: usize) -> &LastSmemEntry {
        &self.entries[key]
    }

    /// Table over explicit entries; windows the caller will never probe
    /// may stay zeroed.
    pub fn from_entries(entries: Vec<LastSmemEntry>) -> LastSmemTable {
        debug_assert_eq!(entries.len(), num_entries(LAST_SMEM_BP));
        LastSmemTable {
            entries: entries.into(),
        }
    }

    /// The table entry for one window, computed directly.
    pub fn build_entry(bwt: &BwtIndex, window: &[u8; LAST_SMEM_BP]) -> LastSmemEntry {
        build_last_smem_entry(bwt, window)
    }
}

fn map_table<T: Pod>(
    prefix: &Path,
    suffix: &str,
    suffix_kind: &'static str,
    expect_entries: usize,
) -> Result<crate::shm::Backing<T>> {
    let path = suffixed_path(prefix, suffix);
    let file = File::open(&path)
        .map_err(|e| IndexError::resource(format!("open {}", path.display()), e))?;
    let map = unsafe { memmap2::Mmap::map(&file) }
        .map_err(|e| IndexError::resource(format!("mmap {}", path.display()), e))?;
    let expect_bytes = expect_entries * std::mem::size_of::<T>();
    if map.len() != expect_bytes {
        return Err(IndexError::format(
            suffix_kind,
            &path,
            format!("file is {} bytes, expected {expect_bytes}", map.len()),
        ));
    }
    Ok(crate::shm::Backing::mapped(Arc::new(map), 0, expect_entries))
}

fn build_all_smem_entry(bwt: &BwtIndex, seq: &[u8; ALL_SMEM_BP]) -> AllSmemEntry {
    let mut ent = AllSmemEntry::zeroed();
    let mut smem = singleton_interval(bwt, seq[0]);

    for i in 1..ALL_SMEM_BP {
        let a = seq[i];
        let new_smem = crate::fm_index::forward_ext(bwt, smem, a);

        let step = &mut ent.list[i - 1];
        debug_assert!(new_smem.bwt_interval_end >= bwt.cumulative_count[3 - a as usize]);
        debug_assert!(new_smem.bwt_interval_start >= smem.bwt_interval_start);
        step.l_delta = (new_smem.bwt_interval_end - bwt.cumulative_count[3 - a as usize]) as u32;
        step.k_delta = (new_smem.bwt_interval_start - smem.bwt_interval_start) as u32;
        step.s = new_smem.interval_size as u32;

        if new_smem.interval_size > 0 {
            ent.last_avail = i as u32;
        } else {
            break;
        }
        smem = new_smem;
    }
    ent
}

fn build_last_smem_entry(bwt: &BwtIndex, seq: &[u8; LAST_SMEM_BP]) -> LastSmemEntry {
    let mut smem = singleton_interval(bwt, seq[0]);
    let mut bp = LAST_SMEM_BP;

    for i in 1..LAST_SMEM_BP {
        let new_smem = crate::fm_index::forward_ext(bwt, smem, seq[i]);
        if new_smem.interval_size == 0 {
            bp = i;
            break;
        }
        smem = new_smem;
    }

    LastSmemEntry {
        bp: bp as u8,
        k_ms: (smem.bwt_interval_start >> 32) as i8,
        k_ls: smem.bwt_interval_start as u32,
        l_ms: (smem.bwt_interval_end >> 32) as i8,
        l_ls: smem.bwt_interval_end as u32,
        s_ms: (smem.interval_size >> 32) as i8,
        s_ls: smem.interval_size as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::IndexBuilder;
    use crate::fm_index::forward_ext;
    use rand::prelude::*;

    fn toy_index() -> BwtIndex {
        // Long enough that most short windows occur at least once.
        let text: Vec<u8> = b"ACGTACGTAAAAAAAAAAACCCCGGGGTTTTACGATCGATCGGCTAGCTAGGATTACAGATTACA"
            .repeat(3);
        IndexBuilder::from_text(&text, 8).expect("build")
    }

    fn naive_forward(bwt: &BwtIndex, seq: &[u8]) -> Vec<Smem> {
        let mut out = Vec::new();
        let mut smem = singleton_interval(bwt, seq[0]);
        out.push(smem);
        for &a in &seq[1..] {
            smem = forward_ext(bwt, smem, a);
            out.push(smem);
            if smem.interval_size == 0 {
                break;
            }
        }
        out
    }

    #[test]
    fn entry_sizes_match_the_file_layout() {
        assert_eq!(std::mem::size_of::<AllSmemEntry>(), 128);
        assert_eq!(std::mem::size_of::<LastSmemEntry>(), 16);
    }

    #[test]
    fn window_key_is_big_endian_and_rejects_n() {
        assert_eq!(window_key(&[0; 11]), Some(0));
        assert_eq!(window_key(&[0, 0, 1]), Some(1));
        assert_eq!(window_key(&[1, 0, 0]), Some(16));
        assert_eq!(window_key(&[0, 4, 0]), None);
    }

    #[test]
    fn all_smem_replay_matches_naive_loop() {
        let bwt = toy_index();
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let seq: Vec<u8> = (0..ALL_SMEM_BP).map(|_| rng.gen_range(0..4u8)).collect();
            let ent = build_all_smem_entry(&bwt, seq.as_slice().try_into().unwrap());
            let naive = naive_forward(&bwt, &seq);

            // last_avail is the largest position with positive stored size
            let expect_last = naive
                .iter()
                .enumerate()
                .skip(1)
                .take_while(|(_, s)| s.interval_size > 0)
                .map(|(i, _)| i)
                .last()
                .unwrap_or(0);
            assert_eq!(ent.last_avail as usize, expect_last.min(ALL_SMEM_BP - 1));

            let mut smem = naive[0];
            for i in 1..=ent.last_avail as usize {
                let step = ent.list[i - 1];
                let a = seq[i];
                let k = smem.bwt_interval_start + step.k_delta as i64;
                let l = bwt.cumulative_count[3 - a as usize] + step.l_delta as i64;
                let s = step.s as i64;
                assert_eq!(k, naive[i].bwt_interval_start, "k at {i}");
                assert_eq!(l, naive[i].bwt_interval_end, "l at {i}");
                assert_eq!(s, naive[i].interval_size, "s at {i}");
                smem = naive[i];
            }
        }
    }

    #[test]
    fn all_smem_homopolymer_window() {
        let bwt = toy_index();
        let seq = [0u8; ALL_SMEM_BP]; // AAAAAAAAAAA; reference has an A run
        let ent = build_all_smem_entry(&bwt, &seq);
        assert_eq!(ent.last_avail as usize, ALL_SMEM_BP - 1);
        let naive = naive_forward(&bwt, &seq);
        assert_eq!(
            ent.list[ALL_SMEM_BP - 2].s as i64,
            naive[ALL_SMEM_BP - 1].interval_size
        );
    }

    #[test]
    fn last_smem_entry_matches_terminal_interval() {
        let bwt = toy_index();
        let mut rng = StdRng::seed_from_u64(0xfeed);
        for _ in 0..200 {
            let seq: Vec<u8> = (0..LAST_SMEM_BP).map(|_| rng.gen_range(0..4u8)).collect();
            let ent = build_last_smem_entry(&bwt, seq.as_slice().try_into().unwrap());
            let naive = naive_forward(&bwt, &seq);

            let terminal = naive
                .iter()
                .rev()
                .find(|s| s.interval_size > 0)
                .copied()
                .unwrap_or(naive[0]);
            let consumed = naive
                .iter()
                .take_while(|s| s.interval_size > 0)
                .count()
                .max(1);
            assert_eq!(ent.bp as usize, consumed.min(LAST_SMEM_BP));
            if terminal.interval_size > 0 {
                assert_eq!(ent.k(), terminal.bwt_interval_start);
                assert_eq!(ent.l(), terminal.bwt_interval_end);
                assert_eq!(ent.s(), terminal.interval_size);
            }
        }
    }
}
