// Perfect-match lookup: slot probe, collision-BST descent, full-length
// verification against the packed reference, and hit collection with
// redundancy masking.

use std::cmp::Ordering;

use crate::ref_meta::RefMetadata;

use super::{NO_ENTRY, PerfectTable, SeedEntry, fw_is_canonical, hash_slot, seed_cmp};

/// Outcome of probing a read against the table. Queries never error;
/// anything unusual is a dedicated kind here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerfectMatch {
    /// No table is loaded.
    NoTable,
    /// The read contains a base outside {A,C,G,T}.
    ContainsN,
    NotMatched,
    /// The first seed-length bases match but the rest of the read does
    /// not; downstream semantics are still unsettled, so callers treat
    /// this as a miss.
    SeedOnlyMatched,
    Matched {
        /// Canonical forward-strand location of the matched read.
        location: u32,
        /// The read matched as the reverse complement of the reference.
        is_rev: bool,
        /// Location-table index for additional locations, 0 if unique.
        multi_loc: u32,
    },
}

impl PerfectMatch {
    pub fn is_match(&self) -> bool {
        matches!(self, PerfectMatch::Matched { .. })
    }
}

/// One reported location of a perfectly matched read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerfectHit {
    /// Absolute forward-strand location of the match start.
    pub loc: i64,
    /// Position within the reference sequence `rid`.
    pub pos: i64,
    pub rid: i32,
    pub is_rev: bool,
    pub is_alt: bool,
}

impl PerfectTable {
    /// Probe a 2-bit encoded read (values 0..=3, anything larger is N).
    ///
    /// Reads shorter than the seed length are a miss, not an error. A
    /// slot beyond the loaded prefix of a partially loaded table reports
    /// absent by design.
    pub fn find_match(&self, q: &[u8]) -> PerfectMatch {
        let seed_len = self.seed_len as usize;
        if q.len() < seed_len {
            return PerfectMatch::NotMatched;
        }
        if q.iter().any(|&b| b > 3) {
            return PerfectMatch::ContainsN;
        }

        let seed = &q[..seed_len];
        let fw_less = fw_is_canonical(seed);
        let slot = hash_slot(seed, fw_less, self.num_seed_entries);

        let mut idx = slot;
        let Some(mut ent) = self.entry(idx) else {
            return PerfectMatch::NotMatched;
        };
        if !ent.is_valid() || ent.is_collision() {
            return PerfectMatch::NotMatched;
        }

        loop {
            match self.cmp_entry(ent, seed, fw_less) {
                Ordering::Equal => {
                    return if q.len() == seed_len {
                        PerfectMatch::Matched {
                            location: ent.location,
                            is_rev: ent.is_fw_less() != fw_less,
                            multi_loc: ent.multi_loc(),
                        }
                    } else {
                        self.match_further(ent, q, fw_less)
                    };
                }
                Ordering::Greater => idx = ent.left,
                Ordering::Less => idx = ent.right,
            }
            if idx == NO_ENTRY {
                return PerfectMatch::NotMatched;
            }
            match self.entry(idx) {
                Some(e) => ent = e,
                None => return PerfectMatch::NotMatched,
            }
        }
    }

    /// Canonical comparison between a stored entry and the query seed.
    fn cmp_entry(&self, ent: &SeedEntry, seed: &[u8], fw_less: bool) -> Ordering {
        seed_cmp(
            self.seed_at(ent.location),
            ent.is_fw_less(),
            seed,
            fw_less,
            self.seed_len as usize,
        )
    }

    /// The read is longer than the seed: verify the tail at the primary
    /// location, then at each overflow location, flipping orientation for
    /// the reverse-complement list.
    fn match_further(&self, ent: &SeedEntry, q: &[u8], fw_less: bool) -> PerfectMatch {
        let mut is_rev = ent.is_fw_less() != fw_less;
        let multi_loc = ent.multi_loc();

        if self.verify_tail(ent.location, q, is_rev) {
            return PerfectMatch::Matched {
                location: ent.location,
                is_rev,
                multi_loc,
            };
        }

        if multi_loc != 0 {
            let ml = self.multi_locations(multi_loc);
            for &loc in ml.fw {
                if self.verify_tail(loc, q, is_rev) {
                    return PerfectMatch::Matched {
                        location: loc,
                        is_rev,
                        multi_loc,
                    };
                }
            }
            is_rev = !is_rev;
            for &loc in ml.rc {
                if self.verify_tail(loc, q, is_rev) {
                    return PerfectMatch::Matched {
                        location: loc,
                        is_rev,
                        multi_loc,
                    };
                }
            }
        }

        PerfectMatch::SeedOnlyMatched
    }

    /// Check the `len - seed_len` bases beyond the seed window against
    /// the reference around `loc`. A reverse match extends leftward.
    fn verify_tail(&self, loc: u32, q: &[u8], is_rev: bool) -> bool {
        let seed_len = self.seed_len as usize;
        let extra = q.len() - seed_len;
        if extra == 0 {
            return true;
        }
        let reference = self.ref_string.forward();
        let loc = loc as usize;
        if !is_rev {
            if loc + q.len() > self.seq_len as usize {
                return false;
            }
            seed_cmp(
                &reference[loc + seed_len..],
                true,
                &q[seed_len..],
                true,
                extra,
            ) == Ordering::Equal
        } else {
            if loc < extra {
                return false;
            }
            seed_cmp(&reference[loc - extra..loc], true, &q[seed_len..], false, extra)
                == Ordering::Equal
        }
    }

    /// Expand a match into the full list of verified locations, convert
    /// them to per-sequence coordinates, and collapse redundant hits.
    ///
    /// Forward hits come before reverse ones; the final order is a stable
    /// sort by (rid, is_rev, pos). Adjacent hits on the same sequence and
    /// strand overlapping by more than `mask_level_redun * read_len`
    /// collapse onto the leftmost.
    pub fn collect_hits(
        &self,
        m: &PerfectMatch,
        q: &[u8],
        _read_id: i32,
        meta: &RefMetadata,
        mask_level_redun: f64,
    ) -> Vec<PerfectHit> {
        let PerfectMatch::Matched {
            location,
            is_rev: rc_matched,
            multi_loc,
        } = *m
        else {
            return Vec::new();
        };

        let mut hits =
            Vec::with_capacity(super::num_locations(&self.loc_table, multi_loc));

        if multi_loc == 0 {
            self.push_hit(&mut hits, location, q.len(), rc_matched, meta);
        } else {
            let ml = self.multi_locations(multi_loc);
            // Orientation is relative to the read: locations carrying the
            // reverse complement of the canonical string match a
            // reverse-matched read forward, and vice versa.
            if !rc_matched {
                self.push_hit(&mut hits, location, q.len(), false, meta);
                self.push_verified(&mut hits, ml.fw, location, q, false, meta);
                self.push_verified(&mut hits, ml.rc, location, q, true, meta);
            } else {
                self.push_verified(&mut hits, ml.rc, location, q, false, meta);
                self.push_hit(&mut hits, location, q.len(), true, meta);
                self.push_verified(&mut hits, ml.fw, location, q, true, meta);
            }
        }

        hits.sort_by_key(|h| (h.rid, h.is_rev, h.pos));
        mask_redundant(&mut hits, q.len() as i64, mask_level_redun);
        hits
    }

    fn push_verified(
        &self,
        hits: &mut Vec<PerfectHit>,
        locs: &[u32],
        matched_loc: u32,
        q: &[u8],
        is_rev: bool,
        meta: &RefMetadata,
    ) {
        let seed_len = self.seed_len as usize;
        for &loc in locs {
            if loc == matched_loc {
                continue;
            }
            if q.len() == seed_len || self.verify_tail(loc, q, is_rev) {
                self.push_hit(hits, loc, q.len(), is_rev, meta);
            }
        }
    }

    fn push_hit(
        &self,
        hits: &mut Vec<PerfectHit>,
        loc: u32,
        read_len: usize,
        is_rev: bool,
        meta: &RefMetadata,
    ) {
        let loc = loc as i64;
        let rid = meta.pos_to_rid(loc);
        if rid < 0 {
            return;
        }
        let ann = &meta.anns[rid as usize];
        // A reverse match longer than the seed starts left of the
        // canonical location.
        let mut pos = loc;
        if is_rev && read_len != self.seed_len as usize {
            pos -= (read_len - self.seed_len as usize) as i64;
        }
        hits.push(PerfectHit {
            loc,
            pos: pos - ann.offset,
            rid,
            is_rev,
            is_alt: ann.is_alt,
        });
    }
}

/// Collapse near-duplicate hits in place. Input must be sorted by
/// (rid, is_rev, pos); within each group the leftmost hit survives and
/// later hits overlapping it by more than the threshold are dropped.
fn mask_redundant(hits: &mut Vec<PerfectHit>, read_len: i64, mask_level_redun: f64) {
    if hits.len() <= 1 {
        return;
    }
    let threshold = (mask_level_redun * read_len as f64) as i64;
    let mut kept = 0usize;
    for i in 1..hits.len() {
        let prev = hits[kept];
        let cur = hits[i];
        let same_group = prev.rid == cur.rid && prev.is_rev == cur.is_rev;
        let overlap = prev.pos + read_len - cur.pos;
        if same_group && overlap > threshold {
            continue;
        }
        kept += 1;
        hits[kept] = cur;
    }
    hits.truncate(kept + 1);
}
