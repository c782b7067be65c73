// SMEM search: bidirectional FM-index extension over encoded reads.
//
// A query position seeds a singleton interval which is first extended
// rightward (forward extension, optionally collapsed through the all-SMEM
// table), collecting candidate right-maximal intervals on a `prev` stack.
// Backward extension then walks leftward; candidates whose interval dies
// while long enough are emitted as SMEMs, surviving ones are kept with
// their interval size as the de-duplication key.

use crate::fm_index::{backward_ext, forward_ext, prefetch_block};
use crate::index::BwtIndex;
use crate::opts::{IndexOpts, MAX_READ_LEN};
use crate::perfect::{PerfectHit, PerfectMatch, PerfectTable};
use crate::ref_meta::RefMetadata;
use crate::smem_accel::{
    ALL_SMEM_BP, AllSmemTable, LAST_SMEM_BP, LastSmemTable, singleton_interval, window_key,
};

/// A supermaximal exact match: a BWT interval plus the query span it
/// covers. `bwt_interval_end` is the matching interval's lower bound on
/// the reverse-complement strand, not `start + size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Smem {
    pub read_id: i32,
    /// Query span, 0-based, both endpoints inclusive.
    pub query_start: i32,
    pub query_end: i32,
    pub bwt_interval_start: i64,
    pub bwt_interval_end: i64,
    pub interval_size: i64,
}

impl Smem {
    #[inline]
    pub fn len(&self) -> i32 {
        self.query_end - self.query_start + 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.interval_size == 0
    }
}

/// A resolved seed: one reference location of an SMEM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seed {
    pub rid: i32,
    pub query_pos: i32,
    pub len: i32,
    pub ref_pos: i64,
    pub interval_size: i64,
}

/// Per-query scratch reused across calls; the engine itself is immutable.
#[derive(Default)]
pub struct SmemScratch {
    prev: Vec<Smem>,
    curr: Vec<Smem>,
    positions: Vec<i64>,
    coords: Vec<i64>,
    spans: Vec<(usize, Smem)>,
}

impl SmemScratch {
    pub fn new() -> SmemScratch {
        SmemScratch {
            prev: Vec::with_capacity(MAX_READ_LEN),
            curr: Vec::with_capacity(MAX_READ_LEN),
            positions: Vec::new(),
            coords: Vec::new(),
            spans: Vec::new(),
        }
    }
}

/// How a read was seeded: a whole-read perfect match short-circuits the
/// SMEM search entirely.
#[derive(Debug)]
pub enum ReadSeeding {
    Perfect(Vec<PerfectHit>),
    Smems(Vec<Smem>),
}

/// The seeding engine. Borrows an immutable index; every table is
/// optional and the engine degrades to the per-base loops without them.
pub struct SmemEngine<'idx> {
    bwt: &'idx BwtIndex,
    all_smem: Option<&'idx AllSmemTable>,
    last_smem: Option<&'idx LastSmemTable>,
    perfect: Option<&'idx PerfectTable>,
    ref_meta: Option<&'idx RefMetadata>,
    opts: IndexOpts,
}

impl<'idx> SmemEngine<'idx> {
    pub fn new(bwt: &'idx BwtIndex, opts: IndexOpts) -> SmemEngine<'idx> {
        SmemEngine {
            bwt,
            all_smem: None,
            last_smem: None,
            perfect: None,
            ref_meta: None,
            opts,
        }
    }

    pub fn with_accel(
        mut self,
        all_smem: Option<&'idx AllSmemTable>,
        last_smem: Option<&'idx LastSmemTable>,
    ) -> Self {
        self.all_smem = all_smem;
        self.last_smem = last_smem;
        self
    }

    pub fn with_perfect(
        mut self,
        perfect: Option<&'idx PerfectTable>,
        ref_meta: Option<&'idx RefMetadata>,
    ) -> Self {
        self.perfect = perfect;
        self.ref_meta = ref_meta;
        self
    }

    pub fn bwt(&self) -> &BwtIndex {
        self.bwt
    }

    pub fn opts(&self) -> &IndexOpts {
        &self.opts
    }

    /// Probe the perfect table directly; `NoTable` when none is loaded.
    pub fn perfect_lookup(&self, q: &[u8]) -> PerfectMatch {
        match self.perfect {
            Some(pt) => pt.find_match(q),
            None => PerfectMatch::NoTable,
        }
    }

    /// Seed one read: perfect-match lookup first, SMEM search on a miss.
    pub fn seed_read(&self, q: &[u8], rid: i32, scratch: &mut SmemScratch) -> ReadSeeding {
        if let (Some(pt), Some(meta)) = (self.perfect, self.ref_meta) {
            let m = pt.find_match(q);
            if m.is_match() {
                let hits = pt.collect_hits(&m, q, rid, meta, self.opts.mask_level_redun);
                if !hits.is_empty() {
                    return ReadSeeding::Perfect(hits);
                }
            }
        }
        let mut smems = Vec::new();
        self.smems_all_pos(q, rid, self.opts.min_intv, &mut smems, scratch);
        sort_smems(&mut smems);
        ReadSeeding::Smems(smems)
    }

    /// All SMEMs pivoting at position `x`. Returns the next cursor
    /// position, which always advances past `x`.
    pub fn smems_one_pos(
        &self,
        q: &[u8],
        x: usize,
        min_intv: i64,
        rid: i32,
        out: &mut Vec<Smem>,
        scratch: &mut SmemScratch,
    ) -> usize {
        let len = q.len();
        debug_assert!(x < len);
        let a = q[x];
        if a > 3 {
            return x + 1;
        }

        let prev = &mut scratch.prev;
        let curr = &mut scratch.curr;
        prev.clear();
        curr.clear();

        let mut smem = singleton_interval(self.bwt, a);
        smem.read_id = rid;
        smem.query_start = x as i32;
        smem.query_end = x as i32;

        let mut next_x = x + 1;
        let mut j = x + 1;
        let mut forward_done = false;

        // Collapse the first extensions through the all-SMEM table when the
        // 11-base window is clean; any N in the window bypasses the table.
        if let Some(tbl) = self.all_smem {
            if len - x >= ALL_SMEM_BP {
                if let Some(key) = window_key(&q[x..x + ALL_SMEM_BP]) {
                    let ent = tbl.entry(key);
                    let last_idx = ent.last_avail as isize - 1;
                    let mut k: isize = 0;
                    while k < last_idx {
                        let jj = x + 1 + k as usize;
                        let b = q[jj];
                        next_x = jj + 1;
                        let step = ent.list[k as usize];
                        let new_smem = Smem {
                            read_id: rid,
                            query_start: smem.query_start,
                            query_end: jj as i32,
                            bwt_interval_start: smem.bwt_interval_start + step.k_delta as i64,
                            bwt_interval_end: self.bwt.cumulative_count[3 - b as usize]
                                + step.l_delta as i64,
                            interval_size: step.s as i64,
                        };
                        if new_smem.interval_size != smem.interval_size {
                            prev.push(smem);
                        }
                        if new_smem.interval_size < min_intv {
                            next_x = jj;
                            forward_done = true;
                            break;
                        }
                        smem = new_smem;
                        k += 1;
                    }
                    j = x + 1 + k.max(0) as usize;
                }
            }
        }

        // Per-base forward extension for whatever the table did not cover.
        if !forward_done {
            while j < len {
                let b = q[j];
                next_x = j + 1;
                if b > 3 {
                    break;
                }
                let mut new_smem = forward_ext(self.bwt, smem, b);
                new_smem.query_end = j as i32;
                if new_smem.interval_size != smem.interval_size {
                    prev.push(smem);
                }
                if new_smem.interval_size < min_intv {
                    next_x = j;
                    break;
                }
                smem = new_smem;
                prefetch_block(self.bwt, smem.bwt_interval_start);
                prefetch_block(self.bwt, smem.bwt_interval_end);
                j += 1;
            }
        }
        if smem.interval_size >= min_intv {
            prev.push(smem);
        }

        // Longest right extensions first.
        prev.reverse();

        // Backward extension; one emit or one keep per candidate per step,
        // with the interval size as the de-duplication key.
        let min_seed_len = self.opts.min_seed_len;
        let mut jj = x as isize - 1;
        while jj >= 0 && !prev.is_empty() {
            let b = q[jj as usize];
            if b > 3 {
                break;
            }
            curr.clear();
            let mut curr_s: i64 = -1;
            let num_prev = prev.len();

            let mut p = 0;
            while p < num_prev {
                let cand = prev[p];
                let mut new_smem = backward_ext(self.bwt, cand, b);
                new_smem.query_start = jj as i32;

                if new_smem.interval_size < min_intv && cand.len() >= min_seed_len {
                    out.push(cand);
                    break;
                }
                if new_smem.interval_size >= min_intv && new_smem.interval_size != curr_s {
                    curr_s = new_smem.interval_size;
                    prefetch_block(self.bwt, new_smem.bwt_interval_start);
                    prefetch_block(
                        self.bwt,
                        new_smem.bwt_interval_start + new_smem.interval_size,
                    );
                    curr.push(new_smem);
                    break;
                }
                p += 1;
            }

            p += 1;
            while p < num_prev {
                let cand = prev[p];
                let mut new_smem = backward_ext(self.bwt, cand, b);
                new_smem.query_start = jj as i32;
                if new_smem.interval_size >= min_intv && new_smem.interval_size != curr_s {
                    curr_s = new_smem.interval_size;
                    prefetch_block(self.bwt, new_smem.bwt_interval_start);
                    prefetch_block(
                        self.bwt,
                        new_smem.bwt_interval_start + new_smem.interval_size,
                    );
                    curr.push(new_smem);
                }
                p += 1;
            }

            std::mem::swap(prev, curr);
            jj -= 1;
        }

        // The surviving top candidate is the longest SMEM through x.
        if let Some(&top) = prev.first() {
            if top.len() >= min_seed_len {
                out.push(top);
            }
        }

        next_x
    }

    /// SMEMs for every pivot position of the read. An N collapses the
    /// interval and the cursor resumes at the following base.
    pub fn smems_all_pos(
        &self,
        q: &[u8],
        rid: i32,
        min_intv: i64,
        out: &mut Vec<Smem>,
        scratch: &mut SmemScratch,
    ) {
        let mut x = 0;
        while x < q.len() {
            if q[x] > 3 {
                x += 1;
                continue;
            }
            let next_x = self.smems_one_pos(q, x, min_intv, rid, out, scratch);
            debug_assert!(next_x > x);
            x = next_x;
        }
    }

    /// Forward-only seeding: emit the first interval that becomes specific
    /// enough (`s < max_intv`) at each pivot, using the last-SMEM table to
    /// skip the first 13 extensions when the window is clean.
    pub fn bwt_seed_strategy(
        &self,
        q: &[u8],
        rid: i32,
        max_intv: i64,
        min_seed_len: i32,
        out: &mut Vec<Smem>,
    ) {
        let len = q.len();
        let mut x = 0;
        while x < len {
            let mut next_x = x + 1;
            let a = q[x];
            if a > 3 {
                x = next_x;
                continue;
            }

            let mut smem = singleton_interval(self.bwt, a);
            smem.read_id = rid;
            smem.query_start = x as i32;
            smem.query_end = x as i32;

            let mut j = x + 1;
            let mut settled = false;

            if let Some(tbl) = self.last_smem {
                if len - x >= LAST_SMEM_BP {
                    if let Some(key) = window_key(&q[x..x + LAST_SMEM_BP]) {
                        let ent = tbl.entry(key);
                        j = x + ent.bp as usize;
                        next_x = j;
                        smem.bwt_interval_start = ent.k();
                        smem.bwt_interval_end = ent.l();
                        smem.interval_size = ent.s();
                        smem.query_end = (j - 1) as i32;

                        if smem.interval_size < max_intv && smem.len() >= min_seed_len {
                            if smem.interval_size > 0 {
                                out.push(smem);
                            }
                            settled = true;
                        }
                    }
                }
            }

            if !settled {
                while j < len {
                    next_x = j + 1;
                    let b = q[j];
                    if b > 3 {
                        break;
                    }
                    smem = forward_ext(self.bwt, smem, b);
                    smem.query_end = j as i32;
                    if smem.interval_size < max_intv && smem.len() >= min_seed_len {
                        if smem.interval_size > 0 {
                            out.push(smem);
                        }
                        break;
                    }
                    j += 1;
                }
            }

            x = next_x;
        }
    }

    /// Resolve SMEMs into reference coordinates through the sampled SA,
    /// batching the FM-walks so their cache misses overlap. Intervals
    /// larger than `max_occ` are strided.
    pub fn resolve_seeds(&self, smems: &[Smem], out: &mut Vec<Seed>, scratch: &mut SmemScratch) {
        let max_occ = self.opts.max_occ as i64;
        let positions = &mut scratch.positions;
        let spans = &mut scratch.spans;
        positions.clear();
        spans.clear();

        for &smem in smems {
            let s = smem.interval_size;
            if s <= 0 {
                continue;
            }
            let step = if s > max_occ { s / max_occ } else { 1 };
            let hi = smem.bwt_interval_start + s;
            let mut p = smem.bwt_interval_start;
            let mut c = 0i64;
            while p < hi && c < max_occ {
                spans.push((positions.len(), smem));
                positions.push(p);
                p += step;
                c += 1;
            }
        }

        self.bwt.locate_batch(positions, &mut scratch.coords);

        out.reserve(spans.len());
        for &(idx, smem) in spans.iter() {
            out.push(Seed {
                rid: smem.read_id,
                query_pos: smem.query_start,
                len: smem.len(),
                ref_pos: scratch.coords[idx],
                interval_size: smem.interval_size,
            });
        }
    }
}

/// Stable post-sort used downstream: by read, then leftmost start, then
/// longest first.
pub fn sort_smems(smems: &mut [Smem]) {
    smems.sort_by(|a, b| {
        (a.read_id, a.query_start, std::cmp::Reverse(a.query_end)).cmp(&(
            b.read_id,
            b.query_start,
            std::cmp::Reverse(b.query_end),
        ))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::IndexBuilder;

    fn engine_for(text: &[u8], opts: IndexOpts) -> (BwtIndex, IndexOpts) {
        (IndexBuilder::from_text(text, 8).expect("build"), opts)
    }

    fn encode(s: &str) -> Vec<u8> {
        s.bytes()
            .map(|b| match b {
                b'A' => 0,
                b'C' => 1,
                b'G' => 2,
                b'T' => 3,
                _ => 4,
            })
            .collect()
    }

    #[test]
    fn acgt_query_yields_one_full_length_smem() {
        let mut opts = IndexOpts::default();
        opts.min_seed_len = 1;
        let (bwt, opts) = engine_for(b"ACGTACGT", opts);
        let engine = SmemEngine::new(&bwt, opts);

        let q = encode("ACGT");
        let mut out = Vec::new();
        let mut scratch = SmemScratch::new();
        engine.smems_all_pos(&q, 0, 1, &mut out, &mut scratch);

        assert_eq!(out.len(), 1);
        let smem = out[0];
        assert_eq!(smem.query_start, 0);
        assert_eq!(smem.query_end, 3);
        assert_eq!(smem.interval_size, 2);
    }

    #[test]
    fn homopolymer_pair_collapses_to_one_smem() {
        let mut opts = IndexOpts::default();
        opts.min_seed_len = 1;
        let (bwt, opts) = engine_for(b"AAAAA", opts);
        let engine = SmemEngine::new(&bwt, opts);

        let q = encode("AA");
        let mut out = Vec::new();
        let mut scratch = SmemScratch::new();
        engine.smems_all_pos(&q, 0, 1, &mut out, &mut scratch);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 2);
        assert_eq!(out[0].interval_size, 4);
    }

    #[test]
    fn engine_without_table_reports_no_table() {
        let (bwt, opts) = engine_for(b"ACGTACGT", IndexOpts::default());
        let engine = SmemEngine::new(&bwt, opts);
        assert_eq!(
            engine.perfect_lookup(&encode("ACGT")),
            crate::perfect::PerfectMatch::NoTable
        );
    }

    #[test]
    fn short_reads_never_produce_smems() {
        let (bwt, opts) = engine_for(b"ACGTACGTACGTGGGTTTACA", IndexOpts::default());
        let engine = SmemEngine::new(&bwt, opts); // min_seed_len 19
        let q = encode("ACGTACGT");
        let mut out = Vec::new();
        let mut scratch = SmemScratch::new();
        engine.smems_all_pos(&q, 0, 1, &mut out, &mut scratch);
        assert!(out.is_empty());
    }

    #[test]
    fn n_splits_the_read_into_independent_runs() {
        let text = b"ACGTACGTGGATCCTTAACGGATCAGATTACA";
        let mut opts = IndexOpts::default();
        opts.min_seed_len = 4;
        let (bwt, opts) = engine_for(text, opts);
        let engine = SmemEngine::new(&bwt, opts.clone());

        let left = "ACGTACGT";
        let right = "GGATCCTT";
        let joined = format!("{left}N{right}");

        let mut with_n = Vec::new();
        let mut scratch = SmemScratch::new();
        engine.smems_all_pos(&encode(&joined), 0, 1, &mut with_n, &mut scratch);

        let mut separate = Vec::new();
        engine.smems_all_pos(&encode(left), 0, 1, &mut separate, &mut scratch);
        let mut right_out = Vec::new();
        engine.smems_all_pos(&encode(right), 0, 1, &mut right_out, &mut scratch);
        // shift right-hand spans past the N
        for s in &mut right_out {
            s.query_start += left.len() as i32 + 1;
            s.query_end += left.len() as i32 + 1;
        }
        separate.extend(right_out);

        sort_smems(&mut with_n);
        sort_smems(&mut separate);
        assert_eq!(with_n, separate);
    }

    #[test]
    fn smem_output_is_supermaximal() {
        // No emitted SMEM may be contained in another for the same read.
        let text = b"TTGACCATGCAGGATCCGATTACAGGATCCACGTACGTAACCGGTT";
        let mut opts = IndexOpts::default();
        opts.min_seed_len = 3;
        let (bwt, opts) = engine_for(text, opts);
        let engine = SmemEngine::new(&bwt, opts);

        let q = encode("CATGCAGGATCCGA");
        let mut out = Vec::new();
        let mut scratch = SmemScratch::new();
        engine.smems_all_pos(&q, 0, 1, &mut out, &mut scratch);
        assert!(!out.is_empty());

        for (i, a) in out.iter().enumerate() {
            for (j, b) in out.iter().enumerate() {
                if i != j {
                    let contained =
                        a.query_start >= b.query_start && a.query_end <= b.query_end;
                    assert!(!contained, "{a:?} contained in {b:?}");
                }
            }
        }
    }

    #[test]
    fn seed_strategy_emits_only_specific_intervals() {
        let text = b"ACGTACGTACGTACGTGGGTGCATTGACCA";
        let (bwt, opts) = engine_for(text, IndexOpts::default());
        let engine = SmemEngine::new(&bwt, opts);

        let q = encode("ACGTACGTACGTACGTGGGTGCATT");
        let mut out = Vec::new();
        engine.bwt_seed_strategy(&q, 0, 4, 5, &mut out);
        for smem in &out {
            assert!(smem.interval_size < 4);
            assert!(smem.interval_size > 0);
            assert!(smem.len() >= 5);
        }
    }

    #[test]
    fn resolve_seeds_maps_to_real_reference_positions() {
        let text = b"ACGTACGTGGATCCTTAACGGATCAGATTACA";
        let mut opts = IndexOpts::default();
        opts.min_seed_len = 6;
        let (bwt, opts) = engine_for(text, opts);
        let engine = SmemEngine::new(&bwt, opts);

        let q = encode("GGATCCTTAACG");
        let mut out = Vec::new();
        let mut scratch = SmemScratch::new();
        engine.smems_all_pos(&q, 0, 1, &mut out, &mut scratch);
        assert!(!out.is_empty());

        let mut seeds = Vec::new();
        engine.resolve_seeds(&out, &mut seeds, &mut scratch);
        assert!(!seeds.is_empty());
        for seed in &seeds {
            let start = seed.ref_pos as usize;
            let span = &text[start..start + seed.len as usize];
            let expect: Vec<u8> = q
                [(seed.query_pos as usize)..(seed.query_pos + seed.len) as usize]
                .to_vec();
            let got = encode(std::str::from_utf8(span).unwrap());
            assert_eq!(got, expect);
        }
    }

    fn random_text(len: usize, seed: u64) -> Vec<u8> {
        use rand::prelude::*;
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len)
            .map(|_| b"ACGT"[rng.gen_range(0..4)] )
            .collect()
    }

    fn random_reads(text: &[u8], n: usize, read_len: usize, seed: u64) -> Vec<Vec<u8>> {
        use rand::prelude::*;
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let start = rng.gen_range(0..text.len() - read_len);
                let mut read = encode(std::str::from_utf8(&text[start..start + read_len]).unwrap());
                // sprinkle mismatches and the occasional N
                for _ in 0..rng.gen_range(0..4) {
                    let i = rng.gen_range(0..read.len());
                    read[i] = if rng.gen_bool(0.2) { 4 } else { rng.gen_range(0..4) };
                }
                read
            })
            .collect()
    }

    fn sparse_all_table(bwt: &BwtIndex, reads: &[Vec<u8>]) -> crate::smem_accel::AllSmemTable {
        use crate::smem_accel::{ALL_SMEM_BP, AllSmemTable, window_key};
        let mut entries: Vec<crate::smem_accel::AllSmemEntry> =
            bytemuck::zeroed_vec(1 << (2 * ALL_SMEM_BP));
        for q in reads {
            for x in 0..q.len().saturating_sub(ALL_SMEM_BP - 1) {
                if let Some(key) = window_key(&q[x..x + ALL_SMEM_BP]) {
                    entries[key] =
                        AllSmemTable::build_entry(bwt, q[x..x + ALL_SMEM_BP].try_into().unwrap());
                }
            }
        }
        AllSmemTable::from_entries(entries)
    }

    fn sparse_last_table(bwt: &BwtIndex, reads: &[Vec<u8>]) -> crate::smem_accel::LastSmemTable {
        use crate::smem_accel::{LAST_SMEM_BP, LastSmemTable, window_key};
        let mut entries: Vec<crate::smem_accel::LastSmemEntry> =
            bytemuck::zeroed_vec(1 << (2 * LAST_SMEM_BP));
        for q in reads {
            for x in 0..q.len().saturating_sub(LAST_SMEM_BP - 1) {
                if let Some(key) = window_key(&q[x..x + LAST_SMEM_BP]) {
                    entries[key] =
                        LastSmemTable::build_entry(bwt, q[x..x + LAST_SMEM_BP].try_into().unwrap());
                }
            }
        }
        LastSmemTable::from_entries(entries)
    }

    #[test]
    fn all_smem_table_does_not_change_engine_output() {
        let text = random_text(600, 0xacc3);
        let bwt = IndexBuilder::from_text(&text, 8).expect("build");
        let mut opts = IndexOpts::default();
        opts.min_seed_len = 10;

        let reads = random_reads(&text, 30, 60, 0x1234);
        let table = sparse_all_table(&bwt, &reads);

        let plain = SmemEngine::new(&bwt, opts.clone());
        let accel = SmemEngine::new(&bwt, opts).with_accel(Some(&table), None);

        let mut scratch = SmemScratch::new();
        for (rid, q) in reads.iter().enumerate() {
            let mut a = Vec::new();
            let mut b = Vec::new();
            plain.smems_all_pos(q, rid as i32, 1, &mut a, &mut scratch);
            accel.smems_all_pos(q, rid as i32, 1, &mut b, &mut scratch);
            sort_smems(&mut a);
            sort_smems(&mut b);
            assert_eq!(a, b, "read {rid}");
        }
    }

    #[test]
    fn last_smem_table_matches_per_base_seed_strategy() {
        let text = random_text(600, 0x1a57);
        let bwt = IndexBuilder::from_text(&text, 8).expect("build");
        let opts = IndexOpts::default();

        let reads = random_reads(&text, 30, 60, 0x4321);
        let table = sparse_last_table(&bwt, &reads);

        let plain = SmemEngine::new(&bwt, opts.clone());
        let accel = SmemEngine::new(&bwt, opts).with_accel(None, Some(&table));

        // With the emission threshold past the window width the collapsed
        // path must reproduce the per-base seed stream exactly.
        let min_seed_len = crate::smem_accel::LAST_SMEM_BP as i32 + 1;
        for (rid, q) in reads.iter().enumerate() {
            let mut a = Vec::new();
            let mut b = Vec::new();
            plain.bwt_seed_strategy(q, rid as i32, 40, min_seed_len, &mut a);
            accel.bwt_seed_strategy(q, rid as i32, 40, min_seed_len, &mut b);
            assert_eq!(a, b, "read {rid}");
        }
    }

    #[test]
    fn sort_orders_by_read_start_and_longest_first() {
        let mk = |rid, m, n| Smem {
            read_id: rid,
            query_start: m,
            query_end: n,
            ..Smem::default()
        };
        let mut v = vec![mk(1, 5, 9), mk(0, 3, 7), mk(0, 3, 12), mk(0, 1, 2)];
        sort_smems(&mut v);
        assert_eq!(
            v.iter()
                .map(|s| (s.read_id, s.query_start, s.query_end))
                .collect::<Vec<_>>(),
            vec![(0, 1, 2), (0, 3, 12), (0, 3, 7), (1, 5, 9)]
        );
    }
}
