// Reference bookkeeping: per-sequence annotations and ambiguity holes,
// restored from the `.ann`/`.amb` sidecars. The perfect-table builder
// needs these to skip seeds that straddle a hole or a sequence boundary,
// and lookups use them to turn absolute locations into (rid, pos).

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{IndexError, Result};
use crate::packed_ref::suffixed_path;

pub const ANN_SUFFIX: &str = ".ann";
pub const AMB_SUFFIX: &str = ".amb";

/// One reference sequence (chromosome/contig).
#[derive(Debug, Clone)]
pub struct SeqAnnotation {
    /// Offset into the packed forward text.
    pub offset: i64,
    pub len: i32,
    pub n_ambs: i32,
    pub gi: u32,
    pub is_alt: bool,
    pub name: String,
    pub anno: String,
}

/// A run of ambiguous input bases. The packed text carries placeholder
/// bases there; seeds overlapping a hole are never indexed.
#[derive(Debug, Clone, Copy)]
pub struct AmbiguityHole {
    pub offset: i64,
    pub len: i32,
    pub amb: u8,
}

#[derive(Debug, Default)]
pub struct RefMetadata {
    /// Forward packed length.
    pub l_pac: i64,
    pub seed: u32,
    pub anns: Vec<SeqAnnotation>,
    pub ambs: Vec<AmbiguityHole>,
}

impl RefMetadata {
    pub fn n_seqs(&self) -> usize {
        self.anns.len()
    }

    pub fn n_holes(&self) -> usize {
        self.ambs.len()
    }

    /// Map a forward-strand position to its sequence id by binary search
    /// over the annotation offsets.
    pub fn pos_to_rid(&self, pos: i64) -> i32 {
        if pos >= self.l_pac || self.anns.is_empty() {
            return -1;
        }
        let mut lo = 0usize;
        let mut hi = self.anns.len();
        while lo + 1 < hi {
            let mid = (lo + hi) / 2;
            if self.anns[mid].offset <= pos {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo as i32
    }

    pub fn dump(&self, prefix: &Path) -> Result<()> {
        let ann_path = suffixed_path(prefix, ANN_SUFFIX);
        let mut ann = BufWriter::new(File::create(&ann_path)?);
        writeln!(ann, "{} {} {}", self.l_pac, self.anns.len(), self.seed)?;
        for a in &self.anns {
            if a.anno.is_empty() {
                writeln!(ann, "{} {}", a.gi, a.name)?;
            } else {
                writeln!(ann, "{} {} {}", a.gi, a.name, a.anno)?;
            }
            writeln!(ann, "{} {} {}", a.offset, a.len, a.n_ambs)?;
        }
        ann.flush()?;

        let amb_path = suffixed_path(prefix, AMB_SUFFIX);
        let mut amb = BufWriter::new(File::create(&amb_path)?);
        writeln!(amb, "{} {} {}", self.l_pac, self.anns.len(), self.ambs.len())?;
        for h in &self.ambs {
            writeln!(amb, "{} {} {}", h.offset, h.len, h.amb as char)?;
        }
        amb.flush()?;
        Ok(())
    }

    pub fn restore(prefix: &Path) -> Result<RefMetadata> {
        let mut meta = RefMetadata::default();

        let ann_path = suffixed_path(prefix, ANN_SUFFIX);
        let ann_file = File::open(&ann_path)
            .map_err(|e| IndexError::resource(format!("open {}", ann_path.display()), e))?;
        let mut lines = BufReader::new(ann_file).lines();

        let header = next_line(&mut lines, ANN_SUFFIX, &ann_path)?;
        let mut fields = header.split_whitespace();
        meta.l_pac = parse_field(fields.next(), ANN_SUFFIX, &ann_path, "l_pac")?;
        let n_seqs: usize = parse_field(fields.next(), ANN_SUFFIX, &ann_path, "n_seqs")?;
        meta.seed = parse_field(fields.next(), ANN_SUFFIX, &ann_path, "seed")?;

        meta.anns.reserve(n_seqs);
        for _ in 0..n_seqs {
            let name_line = next_line(&mut lines, ANN_SUFFIX, &ann_path)?;
            let mut parts = name_line.splitn(3, ' ');
            let gi = parse_field(parts.next(), ANN_SUFFIX, &ann_path, "gi")?;
            let name = parts.next().unwrap_or_default().to_string();
            let anno = parts.next().unwrap_or_default().to_string();

            let loc_line = next_line(&mut lines, ANN_SUFFIX, &ann_path)?;
            let mut loc = loc_line.split_whitespace();
            let offset = parse_field(loc.next(), ANN_SUFFIX, &ann_path, "offset")?;
            let len = parse_field(loc.next(), ANN_SUFFIX, &ann_path, "len")?;
            let n_ambs = parse_field(loc.next(), ANN_SUFFIX, &ann_path, "n_ambs")?;

            meta.anns.push(SeqAnnotation {
                offset,
                len,
                n_ambs,
                gi,
                is_alt: false,
                name,
                anno,
            });
        }

        let amb_path = suffixed_path(prefix, AMB_SUFFIX);
        let amb_file = File::open(&amb_path)
            .map_err(|e| IndexError::resource(format!("open {}", amb_path.display()), e))?;
        let mut amb_lines = BufReader::new(amb_file).lines();
        let amb_header = next_line(&mut amb_lines, AMB_SUFFIX, &amb_path)?;
        let mut amb_fields = amb_header.split_whitespace();
        let amb_l_pac: i64 = parse_field(amb_fields.next(), AMB_SUFFIX, &amb_path, "l_pac")?;
        let _n_seqs: usize = parse_field(amb_fields.next(), AMB_SUFFIX, &amb_path, "n_seqs")?;
        let n_holes: usize = parse_field(amb_fields.next(), AMB_SUFFIX, &amb_path, "n_holes")?;
        if amb_l_pac != meta.l_pac {
            return Err(IndexError::format(
                AMB_SUFFIX,
                &amb_path,
                format!(".amb says l_pac {amb_l_pac}, .ann says {}", meta.l_pac),
            ));
        }

        meta.ambs.reserve(n_holes);
        for _ in 0..n_holes {
            let line = next_line(&mut amb_lines, AMB_SUFFIX, &amb_path)?;
            let mut parts = line.split_whitespace();
            let offset = parse_field(parts.next(), AMB_SUFFIX, &amb_path, "offset")?;
            let len = parse_field(parts.next(), AMB_SUFFIX, &amb_path, "len")?;
            let amb = parts.next().and_then(|s| s.bytes().next()).unwrap_or(b'N');
            meta.ambs.push(AmbiguityHole { offset, len, amb });
        }

        log::debug!(
            "restored metadata: {} sequences, {} holes, l_pac {}",
            meta.anns.len(),
            meta.ambs.len(),
            meta.l_pac
        );
        Ok(meta)
    }

    /// Single-sequence metadata for a bare packed text; used by tests and
    /// in-memory builds where no sidecars exist.
    pub fn single(len: i64, name: &str) -> RefMetadata {
        RefMetadata {
            l_pac: len,
            seed: 11,
            anns: vec![SeqAnnotation {
                offset: 0,
                len: len as i32,
                n_ambs: 0,
                gi: 0,
                is_alt: false,
                name: name.to_string(),
                anno: String::new(),
            }],
            ambs: Vec::new(),
        }
    }
}

fn next_line(
    lines: &mut std::io::Lines<BufReader<File>>,
    suffix: &'static str,
    path: &Path,
) -> Result<String> {
    match lines.next() {
        Some(Ok(line)) => Ok(line),
        Some(Err(e)) => Err(e.into()),
        None => Err(IndexError::format(suffix, path, "unexpected end of file")),
    }
}

fn parse_field<T: std::str::FromStr>(
    field: Option<&str>,
    suffix: &'static str,
    path: &Path,
    what: &str,
) -> Result<T> {
    field
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| IndexError::format(suffix, path, format!("bad {what} field")))
}
