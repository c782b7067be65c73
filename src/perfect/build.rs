// Offline construction of the perfect-match table, and its file format.
//
// Phase A streams reference locations through a producer/consumer
// pipeline: key-computation workers hash striped location batches in
// parallel (skipping seeds that straddle ambiguity holes or sequence
// boundaries) and a single inserter drains them over a bounded channel.
// Insertion order across producers is irrelevant: membership is
// idempotent, and only the SET of locations per seed is contracted.
//
// Phase B is single-threaded: overflow location vectors are frozen into
// the CSR location table, and each collision chain is sorted by canonical
// seed and rebuilt as a balanced BST embedded in the flat table.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::{IndexError, Result};
use crate::packed_ref::{PackedReference, suffixed_path};
use crate::ref_meta::RefMetadata;
use crate::shm::Backing;

use super::{
    LOC_MANY, MULTI_LOC_MAX, NO_ENTRY, PerfectTable, SeedEntry, SeedRelation, fw_is_canonical,
    hash_slot, relate_seeds, seed_cmp,
};

const PERFECT_MAGIC: u64 = 0x4652_4550_5453_454b; // "KESTPERF"
const HEADER_LEN: usize = 64;

const NUM_KEY_THREADS: usize = 8;
const LOCS_PER_BATCH: usize = 3_000_000;

pub fn perfect_suffix(seed_len: i32) -> String {
    format!(".perfect.{seed_len}")
}

/// A precomputed slot for one location; `slot == NO_ENTRY` marks a seed
/// that must not be indexed (hole or boundary overlap).
struct LocKey {
    slot: u32,
    fw_less: bool,
}

struct KeyBatch {
    start: i64,
    keys: Vec<LocKey>,
}

/// Overflow locations accumulated per multi-location seed during phase A.
/// Index 0 is reserved as the null entry.
#[derive(Default)]
struct BuildLoc {
    fw: Vec<u32>,
    rc: Vec<u32>,
}

struct BuildLocs {
    list: Vec<BuildLoc>,
}

impl BuildLocs {
    fn new() -> BuildLocs {
        BuildLocs {
            list: vec![BuildLoc::default()],
        }
    }

    fn alloc(&mut self) -> u32 {
        self.list.push(BuildLoc::default());
        (self.list.len() - 1) as u32
    }

    fn add(&mut self, multi_loc: u32, loc: u32, is_rev: bool) {
        let b = &mut self.list[multi_loc as usize];
        if is_rev {
            b.rc.push(loc);
        } else {
            b.fw.push(loc);
        }
    }
}

#[derive(Default)]
struct BuildStats {
    added: u64,
    moved: u64,
    skipped: u64,
    num_used: u32,
    num_keys: u32,
}

/// Build the table over the forward strand of `ref_string`.
///
/// `slack` oversizes the slot array relative to the reference length;
/// values at or below 1.0 risk running out of free slots mid-build.
pub fn build_perfect_table(
    ref_string: Arc<PackedReference>,
    meta: &RefMetadata,
    seed_len: i32,
    slack: f64,
) -> Result<PerfectTable> {
    let seq_len = ref_string.forward_len() as i64;
    if seq_len >= u32::MAX as i64 {
        return Err(IndexError::format(
            ".perfect",
            "<in-memory>",
            format!("reference of {seq_len} bases exceeds the 32-bit location space"),
        ));
    }
    let num_seed_entries = (seq_len as f64 * slack) as i64;
    if num_seed_entries > u32::MAX as i64 {
        return Err(IndexError::format(
            ".perfect",
            "<in-memory>",
            format!("slack {slack} implies {num_seed_entries} slots; reduce it"),
        ));
    }
    let num_seed_entries = num_seed_entries.max(1) as u32;

    log::info!(
        "building perfect table: seed_len {seed_len}, {num_seed_entries} slots over {seq_len} bases"
    );

    // Page-parallel initialisation; the table can be tens of gigabytes.
    let mut seed_table: Vec<SeedEntry> = bytemuck::zeroed_vec(num_seed_entries as usize);
    seed_table
        .par_chunks_mut(1 << 16)
        .for_each(|chunk| chunk.fill(SeedEntry::free()));

    let mut build_locs = BuildLocs::new();
    let mut stats = BuildStats::default();

    // Phase A.
    let forward = ref_string.forward();
    let threads = NUM_KEY_THREADS.min(
        std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1),
    );
    let (tx, rx) = crossbeam_channel::bounded::<KeyBatch>(threads * 2);

    std::thread::scope(|scope| -> Result<()> {
        for tid in 0..threads {
            let tx = tx.clone();
            scope.spawn(move || {
                let mut start = (tid * LOCS_PER_BATCH) as i64;
                while start < seq_len {
                    let end = (start + LOCS_PER_BATCH as i64).min(seq_len);
                    let keys =
                        compute_keys(forward, meta, seed_len, num_seed_entries, start, end);
                    if tx.send(KeyBatch { start, keys }).is_err() {
                        return;
                    }
                    start += (threads * LOCS_PER_BATCH) as i64;
                }
            });
        }
        drop(tx);

        for batch in rx {
            for (i, key) in batch.keys.iter().enumerate() {
                if key.slot == NO_ENTRY {
                    stats.skipped += 1;
                    continue;
                }
                let loc = (batch.start + i as i64) as u32;
                add_to_hash(
                    &mut seed_table,
                    &mut build_locs,
                    &mut stats,
                    forward,
                    seed_len as usize,
                    num_seed_entries,
                    loc,
                    key.slot,
                    key.fw_less,
                )?;
            }
        }
        Ok(())
    })?;

    log::info!(
        "perfect table phase A done: {} added, {} moved, {} skipped, {} slots used, {} keys",
        stats.added,
        stats.moved,
        stats.skipped,
        stats.num_used,
        stats.num_keys
    );

    // Phase B.
    let loc_table = rebuild_for_mapping(&mut seed_table, build_locs, forward, seed_len as usize)?;

    log::info!(
        "perfect table rebuilt: {} location entries",
        loc_table.len()
    );

    Ok(PerfectTable {
        seed_len,
        seq_len: seq_len as u32,
        num_seed_entries,
        num_seed_load: num_seed_entries,
        num_used: stats.num_used,
        num_keys: stats.num_keys,
        loc_table: loc_table.into(),
        seed_table: seed_table.into(),
        ref_string,
    })
}

/// Slot and orientation for every location in `[start, end)`. Seeds that
/// would cross an ambiguity hole or run past the end of their sequence
/// get the skip marker.
fn compute_keys(
    forward: &[u8],
    meta: &RefMetadata,
    seed_len: i32,
    num_entries: u32,
    start: i64,
    end: i64,
) -> Vec<LocKey> {
    let seed_len_i = seed_len as i64;
    let mut keys = Vec::with_capacity((end - start) as usize);

    let mut seq_id = 0usize;
    while seq_id < meta.anns.len()
        && start >= meta.anns[seq_id].offset + meta.anns[seq_id].len as i64
    {
        seq_id += 1;
    }
    let mut hole_id = 0usize;
    while hole_id < meta.ambs.len()
        && start >= meta.ambs[hole_id].offset + meta.ambs[hole_id].len as i64
    {
        hole_id += 1;
    }

    let mut loc = start;
    while loc < end {
        while seq_id < meta.anns.len()
            && loc >= meta.anns[seq_id].offset + meta.anns[seq_id].len as i64
        {
            seq_id += 1;
        }
        while hole_id < meta.ambs.len()
            && loc >= meta.ambs[hole_id].offset + meta.ambs[hole_id].len as i64
        {
            hole_id += 1;
        }

        let hole_shadow = hole_id < meta.ambs.len()
            && loc > meta.ambs[hole_id].offset - seed_len_i;
        let boundary_shadow = seq_id < meta.anns.len()
            && loc > meta.anns[seq_id].offset + meta.anns[seq_id].len as i64 - seed_len_i;

        if seq_id >= meta.anns.len() {
            while loc < end {
                keys.push(LocKey {
                    slot: NO_ENTRY,
                    fw_less: false,
                });
                loc += 1;
            }
        } else if hole_shadow {
            let stop = (meta.ambs[hole_id].offset + meta.ambs[hole_id].len as i64).min(end);
            while loc < stop {
                keys.push(LocKey {
                    slot: NO_ENTRY,
                    fw_less: false,
                });
                loc += 1;
            }
        } else if boundary_shadow {
            let stop = (meta.anns[seq_id].offset + meta.anns[seq_id].len as i64).min(end);
            while loc < stop {
                keys.push(LocKey {
                    slot: NO_ENTRY,
                    fw_less: false,
                });
                loc += 1;
            }
        } else {
            let mut stop =
                meta.anns[seq_id].offset + meta.anns[seq_id].len as i64 - seed_len_i + 1;
            if hole_id < meta.ambs.len() {
                stop = stop.min(meta.ambs[hole_id].offset - seed_len_i + 1);
            }
            stop = stop.min(end);
            while loc < stop {
                let seed = &forward[loc as usize..(loc + seed_len_i) as usize];
                let fw_less = fw_is_canonical(seed);
                keys.push(LocKey {
                    slot: hash_slot(seed, fw_less, num_entries),
                    fw_less,
                });
                loc += 1;
            }
        }
    }
    keys
}

fn get_empty_idx(table: &[SeedEntry], from: u32) -> Option<u32> {
    if !table[from as usize].is_valid() {
        return Some(from);
    }
    let n = table.len() as u32;
    let mut idx = (from + 1) % n;
    while idx != from {
        if !table[idx as usize].is_valid() {
            return Some(idx);
        }
        idx = (idx + 1) % n;
    }
    None
}

fn table_full_error() -> IndexError {
    IndexError::format(
        ".perfect",
        "<in-memory>",
        "no free seed slot left; increase the slack factor",
    )
}

#[allow(clippy::too_many_arguments)]
fn add_to_hash(
    table: &mut [SeedEntry],
    build_locs: &mut BuildLocs,
    stats: &mut BuildStats,
    forward: &[u8],
    seed_len: usize,
    num_entries: u32,
    loc: u32,
    key: u32,
    fw_less: bool,
) -> Result<()> {
    let seed_of = |l: u32| &forward[l as usize..l as usize + seed_len];

    // An occupant whose hash does not map here is a collision node from
    // some other chain; move it to a free slot and relink before claiming
    // the slot for its rightful key.
    if table[key as usize].is_valid() && table[key as usize].is_collision() {
        let occupant = table[key as usize];
        let new_idx = get_empty_idx(table, key).ok_or_else(table_full_error)?;
        table[new_idx as usize] = occupant;

        let mut prev = hash_slot(seed_of(occupant.location), occupant.is_fw_less(), num_entries);
        while table[prev as usize].right != key && table[prev as usize].right != NO_ENTRY {
            prev = table[prev as usize].right;
        }
        debug_assert_eq!(table[prev as usize].right, key);
        table[prev as usize].right = new_idx;

        table[key as usize] = SeedEntry::free();
        stats.moved += 1;
    }

    if !table[key as usize].is_valid() {
        table[key as usize] = SeedEntry::new(loc, fw_less, false);
        stats.num_used += 1;
        stats.num_keys += 1;
        stats.added += 1;
        return Ok(());
    }

    // Walk the chain for a seed carrying the same string (or its RC).
    let mut prev = NO_ENTRY;
    let mut idx = key;
    let mut relation = SeedRelation::Distinct;
    while idx != NO_ENTRY {
        relation = relate_seeds(
            seed_of(loc),
            seed_of(table[idx as usize].location),
            seed_len,
        );
        if relation != SeedRelation::Distinct {
            break;
        }
        prev = idx;
        idx = table[idx as usize].right;
    }

    match relation {
        SeedRelation::Distinct => {
            let new_idx = get_empty_idx(table, prev).ok_or_else(table_full_error)?;
            table[new_idx as usize] = SeedEntry::new(loc, fw_less, true);
            table[prev as usize].right = new_idx;
            stats.num_used += 1;
        }
        same_or_rc => {
            let ent = &mut table[idx as usize];
            let mut multi_loc = ent.multi_loc();
            if multi_loc == 0 {
                multi_loc = build_locs.alloc();
                ent.set_multi_loc(multi_loc).map_err(|_| {
                    IndexError::format(
                        ".perfect",
                        "<in-memory>",
                        "multi-location index overflows 30 bits",
                    )
                })?;
            }
            build_locs.add(multi_loc, loc, same_or_rc == SeedRelation::ReverseComplement);
        }
    }
    stats.added += 1;
    Ok(())
}

/// Freeze the overflow vectors into the CSR location table. Lists with
/// both counts under `LOC_MANY` use the compact packing (one header word
/// with both counts); larger ones indirect through a wide block.
fn build_loc_table(build_locs: &BuildLocs) -> Result<(Vec<u32>, Vec<u32>)> {
    let list = &build_locs.list;
    if list.len() as u64 >= (MULTI_LOC_MAX as u64 - 1) / 2 {
        return Err(IndexError::format(
            ".perfect",
            "<in-memory>",
            "too many multi-location seeds for the index encoding",
        ));
    }

    // Count pass; `i_many` lands on the offset where wide blocks begin.
    let mut n = 1u64;
    let mut i_many = 1u64;
    for b in &list[1..] {
        let total = (b.fw.len() + b.rc.len()) as u64;
        if (b.fw.len() as u32) < LOC_MANY && (b.rc.len() as u32) < LOC_MANY {
            n += 1 + total;
            i_many += 1 + total;
        } else {
            n += 3 + total;
            i_many += 1;
        }
    }
    // Cache-line-align the table length for mapped access.
    let n_aligned = n + (16 - n % 16);
    let mut loc_table = vec![0u32; n_aligned as usize];
    let mut map = vec![0u32; list.len()];

    let mut n = 1u64;
    let mut i_many = i_many;
    for (bi, b) in list.iter().enumerate().skip(1) {
        let total = (b.fw.len() + b.rc.len()) as u64;
        if n > MULTI_LOC_MAX as u64 {
            return Err(IndexError::format(
                ".perfect",
                "<in-memory>",
                "location table outgrew the 30-bit index space",
            ));
        }
        map[bi] = n as u32;

        let mut i;
        if (b.fw.len() as u32) < LOC_MANY && (b.rc.len() as u32) < LOC_MANY {
            loc_table[n as usize] = ((b.fw.len() as u32) << 16) | b.rc.len() as u32;
            i = (n + 1) as usize;
            n += 1 + total;
        } else {
            loc_table[n as usize] = 0x8000_0000 | i_many as u32;
            n += 1;
            loc_table[i_many as usize] = b.fw.len() as u32;
            loc_table[i_many as usize + 1] = b.rc.len() as u32;
            i = (i_many + 2) as usize;
            i_many += 2 + total;
        }
        for &loc in &b.fw {
            loc_table[i] = loc;
            i += 1;
        }
        for &loc in &b.rc {
            loc_table[i] = loc;
            i += 1;
        }
    }

    Ok((loc_table, map))
}

fn remap_multi_loc(ent: &mut SeedEntry, map: &[u32]) -> Result<()> {
    let ml = ent.multi_loc();
    if ml != 0 {
        ent.set_multi_loc(map[ml as usize]).map_err(|_| {
            IndexError::format(
                ".perfect",
                "<in-memory>",
                "remapped multi-location index overflows 30 bits",
            )
        })?;
    }
    Ok(())
}

/// Place sorted chain nodes into the table as a balanced BST. The middle
/// node lands on the root slot; child slots are popped from the chain's
/// own slot list in preorder so siblings stay on adjacent cache lines.
fn convert_to_bst(table: &mut [SeedEntry], idx_list: &[u32], nodes: &[SeedEntry]) {
    let mut next = 1usize;
    place_bst(
        table,
        idx_list,
        &mut next,
        nodes,
        idx_list[0],
        0,
        nodes.len() as i64 - 1,
    );
}

fn place_bst(
    table: &mut [SeedEntry],
    idx_list: &[u32],
    next: &mut usize,
    nodes: &[SeedEntry],
    root_idx: u32,
    low: i64,
    high: i64,
) {
    if low > high {
        return;
    }
    let mid = (low + high) / 2;
    let mut ent = nodes[mid as usize];

    ent.left = if mid > low {
        let i = idx_list[*next];
        *next += 1;
        i
    } else {
        NO_ENTRY
    };
    ent.right = if mid < high {
        let i = idx_list[*next];
        *next += 1;
        i
    } else {
        NO_ENTRY
    };
    table[root_idx as usize] = ent;

    if ent.left != NO_ENTRY {
        place_bst(table, idx_list, next, nodes, ent.left, low, mid - 1);
    }
    if ent.right != NO_ENTRY {
        place_bst(table, idx_list, next, nodes, ent.right, mid + 1, high);
    }
}

fn rebuild_for_mapping(
    table: &mut [SeedEntry],
    build_locs: BuildLocs,
    forward: &[u8],
    seed_len: usize,
) -> Result<Vec<u32>> {
    let (loc_table, map) = build_loc_table(&build_locs)?;
    drop(build_locs);

    let mut idx_list: Vec<u32> = Vec::new();
    let mut nodes: Vec<SeedEntry> = Vec::new();

    for idx in 0..table.len() {
        let ent = table[idx];
        if !ent.is_valid() || ent.is_collision() {
            // the chain root handles its whole chain
            continue;
        }
        if ent.right == NO_ENTRY {
            remap_multi_loc(&mut table[idx], &map)?;
            continue;
        }

        idx_list.clear();
        nodes.clear();
        let mut cur = idx as u32;
        while cur != NO_ENTRY {
            idx_list.push(cur);
            nodes.push(table[cur as usize]);
            cur = table[cur as usize].right;
        }
        for node in nodes.iter_mut() {
            remap_multi_loc(node, &map)?;
        }
        nodes.sort_by(|a, b| {
            seed_cmp(
                &forward[a.location as usize..],
                a.is_fw_less(),
                &forward[b.location as usize..],
                b.is_fw_less(),
                seed_len,
            )
        });
        convert_to_bst(table, &idx_list, &nodes);

        table[idx_list[0] as usize].set_collision(false);
        for &i in &idx_list[1..] {
            table[i as usize].set_collision(true);
        }
    }

    Ok(loc_table)
}

impl PerfectTable {
    /// Write `<prefix>.perfect.<L>`: a 64-byte header, the location
    /// table, then the seed table.
    pub fn dump(&self, prefix: &Path) -> Result<()> {
        let path = suffixed_path(prefix, &perfect_suffix(self.seed_len));
        let mut file = File::create(&path)?;

        let mut header = [0u8; HEADER_LEN];
        header[0..8].copy_from_slice(&PERFECT_MAGIC.to_le_bytes());
        header[8..12].copy_from_slice(&self.seed_len.to_le_bytes());
        header[12..16].copy_from_slice(&self.num_loc_entries().to_le_bytes());
        header[16..20].copy_from_slice(&self.num_seed_entries.to_le_bytes());
        header[20..24].copy_from_slice(&self.seq_len.to_le_bytes());
        header[24..28].copy_from_slice(&self.num_used.to_le_bytes());
        header[28..32].copy_from_slice(&self.num_keys.to_le_bytes());
        file.write_all(&header)?;
        file.write_all(bytemuck::cast_slice(&self.loc_table))?;
        file.write_all(bytemuck::cast_slice(&self.seed_table))?;
        Ok(())
    }

    /// Map `<prefix>.perfect.<L>` read-only. `num_seed_load` bounds how
    /// many seed entries are considered resident; lookups whose slot
    /// falls beyond it report absent, which is the intended degradation
    /// for memory-limited deployments.
    pub fn load(
        prefix: &Path,
        seed_len: i32,
        ref_string: Arc<PackedReference>,
        num_seed_load: Option<u32>,
    ) -> Result<PerfectTable> {
        let suffix = perfect_suffix(seed_len);
        let path = suffixed_path(prefix, &suffix);
        let file = File::open(&path)
            .map_err(|e| IndexError::resource(format!("open {}", path.display()), e))?;
        let map = unsafe { memmap2::Mmap::map(&file) }
            .map_err(|e| IndexError::resource(format!("mmap {}", path.display()), e))?;
        if map.len() < HEADER_LEN {
            return Err(IndexError::format(".perfect", &path, "file shorter than header"));
        }

        let magic = u64::from_le_bytes(map[0..8].try_into().unwrap());
        if magic != PERFECT_MAGIC {
            return Err(IndexError::format(".perfect", &path, "bad magic"));
        }
        let file_seed_len = i32::from_le_bytes(map[8..12].try_into().unwrap());
        if file_seed_len != seed_len {
            return Err(IndexError::format(
                ".perfect",
                &path,
                format!("table built for seed length {file_seed_len}, wanted {seed_len}"),
            ));
        }
        let num_loc = u32::from_le_bytes(map[12..16].try_into().unwrap());
        let num_seed = u32::from_le_bytes(map[16..20].try_into().unwrap());
        let seq_len = u32::from_le_bytes(map[20..24].try_into().unwrap());
        let num_used = u32::from_le_bytes(map[24..28].try_into().unwrap());
        let num_keys = u32::from_le_bytes(map[28..32].try_into().unwrap());

        let expect = HEADER_LEN as u64
            + num_loc as u64 * 4
            + num_seed as u64 * std::mem::size_of::<SeedEntry>() as u64;
        if map.len() as u64 != expect {
            return Err(IndexError::format(
                ".perfect",
                &path,
                format!("file is {} bytes, header implies {expect}", map.len()),
            ));
        }
        if seq_len as usize != ref_string.forward_len() {
            return Err(IndexError::format(
                ".perfect",
                &path,
                format!(
                    "table covers {seq_len} bases, reference has {}",
                    ref_string.forward_len()
                ),
            ));
        }

        let map = Arc::new(map);
        let loc_off = HEADER_LEN;
        let seed_off = HEADER_LEN + num_loc as usize * 4;
        let num_seed_load = num_seed_load.unwrap_or(num_seed).min(num_seed);

        log::info!(
            "loaded perfect table: seed_len {seed_len}, {num_seed} slots ({num_seed_load} resident), \
             {num_used} used, {num_keys} keys, {num_loc} location words"
        );

        Ok(PerfectTable {
            seed_len,
            seq_len,
            num_seed_entries: num_seed,
            num_seed_load,
            num_used,
            num_keys,
            loc_table: Backing::mapped(map.clone(), loc_off, num_loc as usize),
            seed_table: Backing::mapped(map, seed_off, num_seed as usize),
            ref_string,
        })
    }

    /// Image published into the shared segment: same layout as the file.
    pub fn to_shared_image(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            HEADER_LEN + self.loc_table.len() * 4 + self.seed_table.len() * 16,
        );
        out.extend_from_slice(&PERFECT_MAGIC.to_le_bytes());
        out.extend_from_slice(&self.seed_len.to_le_bytes());
        out.extend_from_slice(&self.num_loc_entries().to_le_bytes());
        out.extend_from_slice(&self.num_seed_entries.to_le_bytes());
        out.extend_from_slice(&self.seq_len.to_le_bytes());
        out.extend_from_slice(&self.num_used.to_le_bytes());
        out.extend_from_slice(&self.num_keys.to_le_bytes());
        out.resize(HEADER_LEN, 0);
        out.extend_from_slice(bytemuck::cast_slice(&self.loc_table));
        out.extend_from_slice(bytemuck::cast_slice(&self.seed_table));
        out
    }

    pub fn from_shared(
        view: Arc<crate::shm::SharedView>,
        seed_len: i32,
        ref_string: Arc<PackedReference>,
    ) -> Result<PerfectTable> {
        let bytes = view.bytes();
        if bytes.len() < HEADER_LEN
            || u64::from_le_bytes(bytes[0..8].try_into().unwrap()) != PERFECT_MAGIC
            || i32::from_le_bytes(bytes[8..12].try_into().unwrap()) != seed_len
        {
            return Err(IndexError::Concurrency { segment: "perfect" });
        }
        let num_loc = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let num_seed = u32::from_le_bytes(bytes[16..20].try_into().unwrap());
        let seq_len = u32::from_le_bytes(bytes[20..24].try_into().unwrap());
        let num_used = u32::from_le_bytes(bytes[24..28].try_into().unwrap());
        let num_keys = u32::from_le_bytes(bytes[28..32].try_into().unwrap());

        let loc_off = HEADER_LEN;
        let seed_off = HEADER_LEN + num_loc as usize * 4;
        if bytes.len() < seed_off + num_seed as usize * std::mem::size_of::<SeedEntry>() {
            return Err(IndexError::Concurrency { segment: "perfect" });
        }

        Ok(PerfectTable {
            seed_len,
            seq_len,
            num_seed_entries: num_seed,
            num_seed_load: num_seed,
            num_used,
            num_keys,
            loc_table: Backing::shared(view.clone(), loc_off, num_loc as usize),
            seed_table: Backing::shared(view, seed_off, num_seed as usize),
            ref_string,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packed_ref::append_reverse_complement;
    use crate::perfect::PerfectMatch;

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

    fn table_for(text: &str, seed_len: i32) -> (PerfectTable, RefMetadata) {
        let fw = encode(text);
        let meta = RefMetadata::single(fw.len() as i64, "chr1");
        let packed = Arc::new(PackedReference::new(append_reverse_complement(&fw)));
        let pt = build_perfect_table(packed, &meta, seed_len, 2.0).expect("build");
        (pt, meta)
    }

    #[test]
    fn exact_seed_length_queries() {
        let (pt, meta) = table_for("ACGTACGT", 4);

        // ACGT occurs forward at 0 and 4
        match pt.find_match(&encode("ACGT")) {
            PerfectMatch::Matched { is_rev, .. } => assert!(!is_rev),
            other => panic!("expected match, got {other:?}"),
        }
        let m = pt.find_match(&encode("ACGT"));
        let hits = pt.collect_hits(&m, &encode("ACGT"), 0, &meta, 0.95);
        let fw_locs: Vec<i64> = hits.iter().filter(|h| !h.is_rev).map(|h| h.pos).collect();
        assert_eq!(fw_locs, vec![0, 4]);

        assert_eq!(pt.find_match(&encode("ACGN")), PerfectMatch::ContainsN);
        assert_eq!(pt.find_match(&encode("ACGA")), PerfectMatch::NotMatched);
        // shorter than the seed is a miss, not an error
        assert_eq!(pt.find_match(&encode("ACG")), PerfectMatch::NotMatched);
    }

    #[test]
    fn reverse_complement_queries_report_is_rev() {
        // AACC at 0; its RC GGTT occurs nowhere forward
        let (pt, meta) = table_for("AACCGATCGATT", 4);
        let q = encode("GGTT");
        match pt.find_match(&q) {
            PerfectMatch::Matched {
                location, is_rev, ..
            } => {
                assert!(is_rev);
                assert_eq!(location, 0);
            }
            other => panic!("expected rc match, got {other:?}"),
        }
        let m = pt.find_match(&q);
        let hits = pt.collect_hits(&m, &q, 0, &meta, 0.95);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].is_rev);
        assert_eq!(hits[0].pos, 0);
    }

    #[test]
    fn longer_reads_verify_the_tail() {
        let (pt, _meta) = table_for("ACGTAGGCTTACGTAGGACC", 4);
        // read longer than the seed whose tail matches at location 0 only
        let q = encode("ACGTAGGC");
        match pt.find_match(&q) {
            PerfectMatch::Matched {
                location, is_rev, ..
            } => {
                assert_eq!(location, 0);
                assert!(!is_rev);
            }
            other => panic!("expected full-length match, got {other:?}"),
        }

        // seed matches but no location carries this tail
        let q2 = encode("ACGTTTTT");
        assert_eq!(pt.find_match(&q2), PerfectMatch::SeedOnlyMatched);
    }

    #[test]
    fn multi_location_seeds_enumerate_all_locations() {
        // GATC at 2, 8, 14
        let (pt, meta) = table_for("AAGATCAAGATCAAGATCAA", 4);
        let q = encode("GATC");
        let m = pt.find_match(&q);
        assert!(m.is_match());
        let hits = pt.collect_hits(&m, &q, 0, &meta, 0.95);
        let mut pos: Vec<i64> = hits.iter().filter(|h| !h.is_rev).map(|h| h.pos).collect();
        pos.sort();
        assert_eq!(pos, vec![2, 8, 14]);
    }

    #[test]
    fn partial_load_reports_absent_without_error() {
        let (mut pt, _meta) = table_for("ACGTACGTGGCC", 4);
        pt.num_seed_load = 0;
        assert_eq!(pt.find_match(&encode("ACGT")), PerfectMatch::NotMatched);
    }

    #[test]
    fn holes_suppress_overlapping_seeds() {
        // the placeholder bases under the hole spell TTTT
        let fw = encode("ACCATTTTGGCA");
        let mut meta = RefMetadata::single(fw.len() as i64, "chr1");
        meta.ambs.push(crate::ref_meta::AmbiguityHole {
            offset: 4,
            len: 4,
            amb: b'N',
        });
        let packed = Arc::new(PackedReference::new(append_reverse_complement(&fw)));
        let pt = build_perfect_table(packed, &meta, 4, 2.0).expect("build");

        // the hole span and every seed overlapping it stay unindexed
        assert_eq!(pt.find_match(&encode("TTTT")), PerfectMatch::NotMatched);
        assert_eq!(pt.find_match(&encode("CATT")), PerfectMatch::NotMatched);
        // the seed ending exactly where the hole begins survives
        assert!(pt.find_match(&encode("ACCA")).is_match());
    }

    #[test]
    fn dump_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("toy");

        let (pt, meta) = table_for("ACGTACGTGGATCCAATTGGCC", 4);
        pt.dump(&prefix).unwrap();

        let loaded =
            PerfectTable::load(&prefix, 4, pt.ref_string.clone(), None).expect("load");
        assert_eq!(loaded.num_seed_entries, pt.num_seed_entries);
        assert_eq!(loaded.num_used, pt.num_used);

        for q in ["ACGT", "GGAT", "CCGG", "TTAA"] {
            let q = encode(q);
            let a = pt.find_match(&q);
            let b = loaded.find_match(&q);
            assert_eq!(a, b, "query {q:?}");
            let ha = pt.collect_hits(&a, &q, 0, &meta, 0.95);
            let hb = loaded.collect_hits(&b, &q, 0, &meta, 0.95);
            assert_eq!(ha, hb);
        }
    }
}
