// The loaded FM-index: cumulative counts, checkpointed BWT blocks and the
// two-level sampled suffix array, plus the primitives the seeding engine
// needs (`count`, `locate`, sampled-SA reconstruction).
//
// All arrays sit behind `Backing`, so the same struct serves both a
// process-private load from disk and a zero-copy attach to a shared
// segment. Nothing here is mutated after construction.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::error::{IndexError, Result};
use crate::fm_index::{
    CP_BLOCK_SIZE, CP_FILENAME_SUFFIX, CP_MASK, CP_SHIFT, CpOcc, backward_ext, get_occ,
    prefetch_read,
};
use crate::opts::IndexOpts;
use crate::shm::{Backing, SharedView};
use crate::smem::Smem;

/// Number of FM-walks kept in flight by `locate_batch`.
const SA_WALK_LANES: usize = 20;

/// 16 MB read buffer; the default 8 KB causes millions of syscalls on a
/// whole-genome index.
const INDEX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub struct BwtIndex {
    /// Reference length n+1 (text plus sentinel).
    pub seq_len: i64,
    /// Cumulative counts C[0..=4], shifted by +1 so that C[0] = 1 accounts
    /// for the sentinel row.
    pub cumulative_count: [i64; 5],
    /// Position of the sentinel `$` in the BWT.
    pub sentinel_index: i64,
    cp_occ: Backing<CpOcc>,
    sa_ms_byte: Backing<i8>,
    sa_ls_word: Backing<u32>,
    sa_shift: u32,
    sa_mask: i64,
}

enum WalkStep {
    Done(i64),
    Next(i64),
}

impl BwtIndex {
    /// Assemble an index from freshly built parts. `raw_counts` are the
    /// on-disk cumulative counts (C[0] = 0); the +1 shift is applied here.
    pub fn from_parts(
        seq_len: i64,
        raw_counts: [i64; 5],
        cp_occ: Vec<CpOcc>,
        sa_ms_byte: Vec<i8>,
        sa_ls_word: Vec<u32>,
        sentinel_index: i64,
        sa_sparsity: u32,
    ) -> BwtIndex {
        let mut cumulative_count = raw_counts;
        for c in cumulative_count.iter_mut() {
            *c += 1;
        }
        let sa_shift = sa_sparsity.trailing_zeros();
        BwtIndex {
            seq_len,
            cumulative_count,
            sentinel_index,
            cp_occ: cp_occ.into(),
            sa_ms_byte: sa_ms_byte.into(),
            sa_ls_word: sa_ls_word.into(),
            sa_shift,
            sa_mask: (1i64 << sa_shift) - 1,
        }
    }

    /// Load `<prefix>.bwt.2bit.64` into process-private memory.
    pub fn load(prefix: &Path, opts: &IndexOpts) -> Result<BwtIndex> {
        let path = crate::packed_ref::suffixed_path(prefix, CP_FILENAME_SUFFIX);
        let file = File::open(&path).map_err(|e| {
            IndexError::resource(format!("open {}", path.display()), e)
        })?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::with_capacity(INDEX_BUFFER_SIZE, file);

        let seq_len = read_i64(&mut reader)?;
        if seq_len <= 0 {
            return Err(IndexError::format(
                CP_FILENAME_SUFFIX,
                &path,
                format!("nonsensical sequence length {seq_len}"),
            ));
        }

        let sa_shift = opts.sa_shift();
        let cp_occ_len = ((seq_len >> CP_SHIFT) + 1) as usize;
        let n_sa = ((seq_len >> sa_shift) + 1) as usize;
        let expected = expected_file_len(cp_occ_len, n_sa);
        if file_len != expected {
            return Err(IndexError::format(
                CP_FILENAME_SUFFIX,
                &path,
                format!(
                    "file is {file_len} bytes but the header implies {expected} \
                     (sa_sparsity {})",
                    opts.sa_sparsity
                ),
            ));
        }

        let mut raw_counts = [0i64; 5];
        for c in raw_counts.iter_mut() {
            *c = read_i64(&mut reader)?;
        }

        let mut cp_occ: Vec<CpOcc> = vec![bytemuck::Zeroable::zeroed(); cp_occ_len];
        reader.read_exact(bytemuck::cast_slice_mut(&mut cp_occ))?;

        let mut sa_ms_byte = vec![0i8; n_sa];
        reader.read_exact(bytemuck::cast_slice_mut(&mut sa_ms_byte))?;
        let mut sa_ls_word = vec![0u32; n_sa];
        reader.read_exact(bytemuck::cast_slice_mut(&mut sa_ls_word))?;

        let sentinel_index = read_i64(&mut reader)?;

        log::debug!(
            "loaded BWT index: n+1={}, {} checkpoint blocks, {} SA samples, sentinel at {}",
            seq_len,
            cp_occ_len,
            n_sa,
            sentinel_index
        );

        Ok(BwtIndex::from_parts(
            seq_len,
            raw_counts,
            cp_occ,
            sa_ms_byte,
            sa_ls_word,
            sentinel_index,
            opts.sa_sparsity,
        ))
    }

    /// Write `<prefix>.bwt.2bit.64`. Counts are stored unshifted, so a
    /// load followed by a dump is byte-identical.
    pub fn dump(&self, prefix: &Path) -> Result<()> {
        let path = crate::packed_ref::suffixed_path(prefix, CP_FILENAME_SUFFIX);
        let mut file = File::create(&path)?;

        file.write_all(&self.seq_len.to_le_bytes())?;
        for c in self.cumulative_count {
            file.write_all(&(c - 1).to_le_bytes())?;
        }
        file.write_all(bytemuck::cast_slice(&self.cp_occ))?;
        file.write_all(bytemuck::cast_slice(&self.sa_ms_byte))?;
        file.write_all(bytemuck::cast_slice(&self.sa_ls_word))?;
        file.write_all(&self.sentinel_index.to_le_bytes())?;
        Ok(())
    }

    /// Serialize into the shared-segment image: a 64-byte header followed
    /// by 64-byte-aligned sections for blocks and SA streams.
    pub fn to_shared_image(&self) -> Vec<u8> {
        let cp_bytes: &[u8] = bytemuck::cast_slice(&self.cp_occ);
        let ms_bytes: &[u8] = bytemuck::cast_slice(&self.sa_ms_byte);
        let ls_bytes: &[u8] = bytemuck::cast_slice(&self.sa_ls_word);

        let mut out = Vec::with_capacity(
            64 + aligned64(cp_bytes.len()) + aligned64(ms_bytes.len()) + aligned64(ls_bytes.len()),
        );
        out.extend_from_slice(&self.seq_len.to_le_bytes());
        for c in self.cumulative_count {
            out.extend_from_slice(&(c - 1).to_le_bytes());
        }
        out.extend_from_slice(&self.sentinel_index.to_le_bytes());
        out.extend_from_slice(&(self.sa_shift as i64).to_le_bytes());
        debug_assert_eq!(out.len(), 64);

        for section in [cp_bytes, ms_bytes, ls_bytes] {
            out.extend_from_slice(section);
            out.resize(aligned64(out.len()), 0);
        }
        out
    }

    /// Zero-copy attach to a shared segment produced by `to_shared_image`.
    pub fn attach(view: Arc<SharedView>) -> Result<BwtIndex> {
        let bytes = view.bytes();
        if bytes.len() < 64 {
            return Err(IndexError::Concurrency { segment: "bwt" });
        }
        let seq_len = i64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let mut cumulative_count = [0i64; 5];
        for (i, c) in cumulative_count.iter_mut().enumerate() {
            *c = i64::from_le_bytes(bytes[8 + i * 8..16 + i * 8].try_into().unwrap()) + 1;
        }
        let sentinel_index = i64::from_le_bytes(bytes[48..56].try_into().unwrap());
        let sa_shift = i64::from_le_bytes(bytes[56..64].try_into().unwrap()) as u32;

        let cp_occ_len = ((seq_len >> CP_SHIFT) + 1) as usize;
        let n_sa = ((seq_len >> sa_shift) + 1) as usize;

        let cp_off = 64;
        let ms_off = cp_off + aligned64(cp_occ_len * std::mem::size_of::<CpOcc>());
        let ls_off = ms_off + aligned64(n_sa);
        let end = ls_off + aligned64(n_sa * 4);
        if bytes.len() < end {
            return Err(IndexError::Concurrency { segment: "bwt" });
        }

        Ok(BwtIndex {
            seq_len,
            cumulative_count,
            sentinel_index,
            cp_occ: Backing::shared(view.clone(), cp_off, cp_occ_len),
            sa_ms_byte: Backing::shared(view.clone(), ms_off, n_sa),
            sa_ls_word: Backing::shared(view, ls_off, n_sa),
            sa_shift,
            sa_mask: (1i64 << sa_shift) - 1,
        })
    }

    #[inline(always)]
    pub fn cp_occ(&self) -> &[CpOcc] {
        &self.cp_occ
    }

    pub fn sa_sparsity(&self) -> u32 {
        1 << self.sa_shift
    }

    pub fn sa_sample_count(&self) -> usize {
        self.sa_ms_byte.len()
    }

    /// The BWT character at position `p`, or `None` for the sentinel row.
    #[inline(always)]
    pub fn bwt_char_at(&self, p: i64) -> Option<u8> {
        let block = &self.cp_occ[(p >> CP_SHIFT) as usize];
        let y = CP_BLOCK_SIZE as i64 - (p & CP_MASK) - 1;
        for b in 0..4u8 {
            if (block.one_hot_bwt_str[b as usize] >> y) & 1 == 1 {
                return Some(b);
            }
        }
        None
    }

    #[inline(always)]
    fn sampled_entry(&self, p: i64) -> i64 {
        let slot = (p >> self.sa_shift) as usize;
        ((self.sa_ms_byte[slot] as i64) << 32) + self.sa_ls_word[slot] as i64
    }

    /// SA[p], reconstructed by FM-walking to the nearest sampled row.
    /// At most `sa_sparsity - 1` rank queries.
    pub fn get_sa_entry(&self, p: i64) -> i64 {
        if p & self.sa_mask == 0 {
            return self.sampled_entry(p);
        }
        let mut sp = p;
        let mut offset = 0i64;
        loop {
            match self.bwt_char_at(sp) {
                // Walking onto the sentinel row means the text position is
                // exactly the number of steps taken.
                None => return offset,
                Some(b) => {
                    sp = self.cumulative_count[b as usize] + get_occ(self, sp, b);
                }
            }
            offset += 1;
            if sp & self.sa_mask == 0 {
                return self.sampled_entry(sp) + offset;
            }
        }
    }

    /// One step of the FM-walk, with the prefetchable state exposed so
    /// `locate_batch` can pipeline independent walks.
    #[inline]
    fn sa_walk_step(&self, pos: i64, offset: &mut i64) -> WalkStep {
        if pos & self.sa_mask == 0 {
            return WalkStep::Done(self.sampled_entry(pos) + *offset);
        }
        match self.bwt_char_at(pos) {
            None => WalkStep::Done(*offset),
            Some(b) => {
                let next = self.cumulative_count[b as usize] + get_occ(self, pos, b);
                *offset += 1;
                if next & self.sa_mask == 0 {
                    WalkStep::Done(self.sampled_entry(next) + *offset)
                } else {
                    WalkStep::Next(next)
                }
            }
        }
    }

    #[inline]
    fn prefetch_walk(&self, pos: i64) {
        if pos & self.sa_mask == 0 {
            let slot = (pos >> self.sa_shift) as usize;
            prefetch_read(&self.sa_ms_byte[slot] as *const i8 as *const u8);
            prefetch_read(&self.sa_ls_word[slot] as *const u32 as *const u8);
        } else {
            crate::fm_index::prefetch_block(self, pos);
        }
    }

    /// Resolve many BWT positions to text positions, keeping a bounded set
    /// of independent walks in flight and prefetching each walk's next
    /// cache line while the others make progress.
    pub fn locate_batch(&self, positions: &[i64], coords: &mut Vec<i64>) {
        coords.clear();
        coords.resize(positions.len(), 0);

        let mut lane_pos = [0i64; SA_WALK_LANES];
        let mut lane_out = [0usize; SA_WALK_LANES];
        let mut lane_off = [0i64; SA_WALK_LANES];
        let mut lane_live = [false; SA_WALK_LANES];

        let mut next = 0usize;
        let lanes = SA_WALK_LANES.min(positions.len());
        for lane in 0..lanes {
            lane_pos[lane] = positions[next];
            lane_out[lane] = next;
            lane_off[lane] = 0;
            lane_live[lane] = true;
            self.prefetch_walk(lane_pos[lane]);
            next += 1;
        }

        let mut done = 0usize;
        while done < positions.len() {
            for lane in 0..lanes {
                if !lane_live[lane] {
                    continue;
                }
                match self.sa_walk_step(lane_pos[lane], &mut lane_off[lane]) {
                    WalkStep::Done(coord) => {
                        coords[lane_out[lane]] = coord;
                        done += 1;
                        if next < positions.len() {
                            lane_pos[lane] = positions[next];
                            lane_out[lane] = next;
                            lane_off[lane] = 0;
                            next += 1;
                            self.prefetch_walk(lane_pos[lane]);
                        } else {
                            lane_live[lane] = false;
                        }
                    }
                    WalkStep::Next(pos) => {
                        lane_pos[lane] = pos;
                        self.prefetch_walk(pos);
                    }
                }
            }
        }
    }

    /// Resolve an SMEM's interval into at most `max_occ` text positions.
    /// Oversized intervals are strided so hits stay spread across the
    /// interval rather than clustered at its start.
    pub fn locate(&self, smem: &Smem, max_occ: i32, coords: &mut Vec<i64>) {
        let s = smem.interval_size;
        let hi = smem.bwt_interval_start + s;
        let step = if s > max_occ as i64 { s / max_occ as i64 } else { 1 };
        let mut taken = 0;
        let mut p = smem.bwt_interval_start;
        while p < hi && taken < max_occ {
            coords.push(self.get_sa_entry(p));
            p += step;
            taken += 1;
        }
    }

    /// Number of exact occurrences of `query` in the indexed text,
    /// computed by backward extension. Bases outside {A,C,G,T} collapse
    /// the interval.
    pub fn count(&self, query: &[u8]) -> i64 {
        let Some((&last, rest)) = query.split_last() else {
            return 0;
        };
        if last > 3 {
            return 0;
        }
        let mut smem = Smem {
            bwt_interval_start: self.cumulative_count[last as usize],
            bwt_interval_end: self.cumulative_count[3 - last as usize],
            interval_size: self.cumulative_count[last as usize + 1]
                - self.cumulative_count[last as usize],
            ..Smem::default()
        };
        for &a in rest.iter().rev() {
            if a > 3 || smem.interval_size == 0 {
                return 0;
            }
            smem = backward_ext(self, smem, a);
        }
        smem.interval_size
    }
}

/// The full query-time index: BWT plus reference text, annotations and
/// whichever optional tables were built. Engines borrow this immutably;
/// a single loaded index serves any number of worker threads.
pub struct KestrelIndex {
    pub bwt: BwtIndex,
    pub packed_ref: Arc<crate::packed_ref::PackedReference>,
    pub meta: crate::ref_meta::RefMetadata,
    pub all_smem: Option<crate::smem_accel::AllSmemTable>,
    pub last_smem: Option<crate::smem_accel::LastSmemTable>,
    pub perfect: Option<crate::perfect::PerfectTable>,
}

impl KestrelIndex {
    /// Load every component from `<prefix>.*` files.
    ///
    /// Acceleration tables are optional: a missing file means the engine
    /// runs the per-base loops, while a malformed one is fatal. The
    /// perfect table is loaded only when `opts.perfect_seed_len` is set,
    /// and then its absence is an error.
    pub fn load(prefix: &Path, opts: &IndexOpts) -> Result<KestrelIndex> {
        let bwt = BwtIndex::load(prefix, opts)?;
        let packed_ref = Arc::new(crate::packed_ref::PackedReference::load(prefix)?);
        let meta = crate::ref_meta::RefMetadata::restore(prefix)?;

        let all_smem = optional_table(crate::smem_accel::AllSmemTable::load(prefix))?;
        let last_smem = optional_table(crate::smem_accel::LastSmemTable::load(prefix))?;
        if all_smem.is_none() {
            log::info!("no all-SMEM table; forward extension runs per base");
        }
        if last_smem.is_none() {
            log::info!("no last-SMEM table; seed strategy runs per base");
        }

        let perfect = if opts.perfect_seed_len > 0 {
            Some(crate::perfect::PerfectTable::load(
                prefix,
                opts.perfect_seed_len,
                packed_ref.clone(),
                None,
            )?)
        } else {
            None
        };

        Ok(KestrelIndex {
            bwt,
            packed_ref,
            meta,
            all_smem,
            last_smem,
            perfect,
        })
    }

    /// Attach to the shared segment set, falling back to file loading
    /// for any component the manager cannot provide.
    pub fn load_shared(
        prefix: &Path,
        opts: &IndexOpts,
        mgr: &mut crate::shm::ShmManager,
    ) -> Result<KestrelIndex> {
        use crate::shm::SegmentKind;

        let bwt = match mgr.open_shared(SegmentKind::Bwt) {
            Ok(view) => BwtIndex::attach(view)?,
            Err(e) => {
                log::debug!("bwt segment unavailable ({e}); loading from file");
                BwtIndex::load(prefix, opts)?
            }
        };
        let packed_ref = match mgr.open_shared(SegmentKind::Ref) {
            Ok(view) => {
                let len = view.len();
                Arc::new(crate::packed_ref::PackedReference::from_shared(view, len)?)
            }
            Err(_) => Arc::new(crate::packed_ref::PackedReference::load(prefix)?),
        };
        let meta = crate::ref_meta::RefMetadata::restore(prefix)?;

        let all_smem = match mgr.open_shared(SegmentKind::SmemAll) {
            Ok(view) => Some(crate::smem_accel::AllSmemTable::from_shared(view)?),
            Err(_) => optional_table(crate::smem_accel::AllSmemTable::load(prefix))?,
        };
        let last_smem = match mgr.open_shared(SegmentKind::SmemLast) {
            Ok(view) => Some(crate::smem_accel::LastSmemTable::from_shared(view)?),
            Err(_) => optional_table(crate::smem_accel::LastSmemTable::load(prefix))?,
        };
        let perfect = if opts.perfect_seed_len > 0 {
            match mgr.open_shared(SegmentKind::Perfect) {
                Ok(view) => Some(crate::perfect::PerfectTable::from_shared(
                    view,
                    opts.perfect_seed_len,
                    packed_ref.clone(),
                )?),
                Err(_) => Some(crate::perfect::PerfectTable::load(
                    prefix,
                    opts.perfect_seed_len,
                    packed_ref.clone(),
                    None,
                )?),
            }
        } else {
            None
        };

        Ok(KestrelIndex {
            bwt,
            packed_ref,
            meta,
            all_smem,
            last_smem,
            perfect,
        })
    }

    /// Publish every loaded component into the shared segment set.
    pub fn publish_shared(&self, mgr: &mut crate::shm::ShmManager) -> Result<()> {
        use crate::shm::SegmentKind;
        let seed_len = self.perfect.as_ref().map(|p| p.seed_len).unwrap_or(0);
        mgr.renew(seed_len, |kind| match kind {
            SegmentKind::Bwt => Some(self.bwt.to_shared_image()),
            SegmentKind::Ref => Some(self.packed_ref.to_shared_image()),
            SegmentKind::Pac => None,
            SegmentKind::Perfect => self.perfect.as_ref().map(|p| p.to_shared_image()),
            SegmentKind::SmemAll => self.all_smem.as_ref().map(|t| t.to_shared_image()),
            SegmentKind::SmemLast => self.last_smem.as_ref().map(|t| t.to_shared_image()),
            SegmentKind::Info => None,
        })
    }

    /// A seeding engine over this index with the given options.
    pub fn engine(&self, opts: IndexOpts) -> crate::smem::SmemEngine<'_> {
        crate::smem::SmemEngine::new(&self.bwt, opts)
            .with_accel(self.all_smem.as_ref(), self.last_smem.as_ref())
            .with_perfect(self.perfect.as_ref(), Some(&self.meta))
    }
}

/// Missing table files degrade to `None`; anything else is fatal.
fn optional_table<T>(r: Result<T>) -> Result<Option<T>> {
    match r {
        Ok(t) => Ok(Some(t)),
        Err(IndexError::Resource { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn aligned64(n: usize) -> usize {
    n.div_ceil(64) * 64
}

fn expected_file_len(cp_occ_len: usize, n_sa: usize) -> u64 {
    (8 + 40 + cp_occ_len * 64 + n_sa + n_sa * 4 + 8) as u64
}

fn read_i64(reader: &mut impl Read) -> std::io::Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::IndexBuilder;

    #[test]
    fn counts_respect_sentinel_shift() {
        // ACGTACGT$ has two of each base.
        let bwt = IndexBuilder::from_text(b"ACGTACGT", 8).expect("build");
        assert_eq!(bwt.cumulative_count[0], 1);
        assert_eq!(bwt.cumulative_count[1], 3);
        assert_eq!(bwt.cumulative_count[2], 5);
        assert_eq!(bwt.cumulative_count[3], 7);
        assert_eq!(bwt.cumulative_count[4], 9);
        let total: i64 = (0..4)
            .map(|c| bwt.cumulative_count[c + 1] - bwt.cumulative_count[c])
            .sum();
        assert_eq!(total + 1, bwt.seq_len);
    }

    #[test]
    fn count_finds_exact_occurrences() {
        let bwt = IndexBuilder::from_text(b"ACGTACGT", 8).expect("build");
        assert_eq!(bwt.count(&[0, 1, 2, 3]), 2); // ACGT
        assert_eq!(bwt.count(&[1, 2]), 2); // CG
        assert_eq!(bwt.count(&[3, 3]), 0); // TT
        assert_eq!(bwt.count(&[0, 4]), 0); // contains N
        assert_eq!(bwt.count(&[]), 0);
    }

    #[test]
    fn sa_reconstruction_matches_direct_sa() {
        let text = b"GATTACAGATTACACATGATTACA";
        let bwt = IndexBuilder::from_text(text, 8).expect("build");
        // SA[p] for every p must be a permutation of 0..=len.
        let mut seen = vec![false; bwt.seq_len as usize];
        for p in 0..bwt.seq_len {
            let v = bwt.get_sa_entry(p) as usize;
            assert!(v < seen.len());
            assert!(!seen[v], "duplicate SA value {v}");
            seen[v] = true;
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(bwt.get_sa_entry(bwt.sentinel_index), 0);
    }

    #[test]
    fn locate_batch_agrees_with_scalar_walks() {
        let text = b"CCTAGGACGTTTACGGATCCATTG";
        let bwt = IndexBuilder::from_text(text, 8).expect("build");
        let positions: Vec<i64> = (0..bwt.seq_len).collect();
        let mut coords = Vec::new();
        bwt.locate_batch(&positions, &mut coords);
        for (p, &coord) in positions.iter().zip(coords.iter()) {
            assert_eq!(coord, bwt.get_sa_entry(*p));
        }
    }

    #[test]
    fn dump_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("toy");

        let text = b"ACGTACGTTTGACCA";
        let built = IndexBuilder::from_text(text, 8).expect("build");
        built.dump(&prefix).expect("dump");

        let opts = IndexOpts::default();
        let loaded = BwtIndex::load(&prefix, &opts).expect("load");
        assert_eq!(loaded.seq_len, built.seq_len);
        assert_eq!(loaded.cumulative_count, built.cumulative_count);
        assert_eq!(loaded.sentinel_index, built.sentinel_index);
        for p in 0..loaded.seq_len {
            assert_eq!(loaded.get_sa_entry(p), built.get_sa_entry(p));
        }
    }

    #[test]
    fn load_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("toy");

        let built = IndexBuilder::from_text(b"ACGTACGT", 8).expect("build");
        built.dump(&prefix).expect("dump");
        let path = crate::packed_ref::suffixed_path(&prefix, CP_FILENAME_SUFFIX);
        let len = std::fs::metadata(&path).unwrap().len();
        let f = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        f.set_len(len - 8).unwrap();

        match BwtIndex::load(&prefix, &IndexOpts::default()) {
            Err(IndexError::Format { suffix, .. }) => {
                assert_eq!(suffix, CP_FILENAME_SUFFIX)
            }
            other => panic!("expected Format error, got {other:?}"),
        }
    }
}
