// The packed reference: 2-bit codecs for the `.pac` input and the
// byte-per-base `.0123` file holding the reference concatenated with its
// reverse complement.
//
// `.pac` packs four bases per byte, little order within the byte, with a
// trailing byte carrying the tail length (bases in the final partial
// byte). `.0123` is one byte per base, values 0..=3, forward strand first
// and the reverse complement appended; it is the verification text for
// the perfect-match table.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{IndexError, Result};
use crate::shm::Backing;

pub const PAC_SUFFIX: &str = ".pac";
pub const REF_0123_SUFFIX: &str = ".0123";

/// `<prefix><suffix>` without treating the suffix as a path extension,
/// so `ref.fa` becomes `ref.fa.pac` rather than `ref.pac`.
pub fn suffixed_path(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

#[inline(always)]
pub fn complement(base: u8) -> u8 {
    3 - base
}

/// Forward text extended with its reverse complement, the shape the BWT
/// and the perfect table are built over.
pub fn append_reverse_complement(forward: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(forward.len() * 2);
    out.extend_from_slice(forward);
    out.extend(forward.iter().rev().map(|&b| complement(b)));
    out
}

/// Write `bases` (values 0..=3) as a `.pac` file.
pub fn write_pac(prefix: &Path, bases: &[u8]) -> Result<()> {
    let path = suffixed_path(prefix, PAC_SUFFIX);
    let mut file = File::create(&path)?;

    let mut packed = vec![0u8; bases.len().div_ceil(4)];
    for (i, &b) in bases.iter().enumerate() {
        debug_assert!(b < 4);
        packed[i / 4] |= (b & 3) << ((i % 4) * 2);
    }
    file.write_all(&packed)?;
    let tail = (bases.len() % 4) as u8;
    if tail == 0 {
        // keep the trailing byte unambiguous when the last data byte is full
        file.write_all(&[0u8])?;
    }
    file.write_all(&[tail])?;
    Ok(())
}

/// Read a `.pac` file back into one byte per base.
pub fn read_pac(prefix: &Path) -> Result<Vec<u8>> {
    let path = suffixed_path(prefix, PAC_SUFFIX);
    let mut file = File::open(&path)
        .map_err(|e| IndexError::resource(format!("open {}", path.display()), e))?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;

    if raw.len() < 2 {
        return Err(IndexError::format(PAC_SUFFIX, &path, "file too short"));
    }
    let tail = raw[raw.len() - 1];
    if tail > 3 {
        return Err(IndexError::format(
            PAC_SUFFIX,
            &path,
            format!("tail-length byte is {tail}"),
        ));
    }
    let data_bytes = raw.len() - 1;
    let seq_len = (data_bytes as i64 - 1) * 4 + tail as i64;
    if seq_len <= 0 {
        return Err(IndexError::format(PAC_SUFFIX, &path, "empty sequence"));
    }

    let mut bases = Vec::with_capacity(seq_len as usize);
    for i in 0..seq_len as usize {
        bases.push((raw[i / 4] >> ((i % 4) * 2)) & 3);
    }
    Ok(bases)
}

/// The doubled reference text, resident in memory or mapped read-only.
pub struct PackedReference {
    bases: Backing<u8>,
}

impl PackedReference {
    pub fn new(doubled: Vec<u8>) -> PackedReference {
        debug_assert!(doubled.len() % 2 == 0);
        PackedReference {
            bases: doubled.into(),
        }
    }

    /// Expand `<prefix>.pac` and append the reverse complement.
    pub fn from_pac(prefix: &Path) -> Result<PackedReference> {
        let forward = read_pac(prefix)?;
        Ok(PackedReference::new(append_reverse_complement(&forward)))
    }

    /// Write the doubled text as `<prefix>.0123`.
    pub fn dump(&self, prefix: &Path) -> Result<()> {
        let path = suffixed_path(prefix, REF_0123_SUFFIX);
        let mut file = File::create(&path)?;
        file.write_all(&self.bases)?;
        Ok(())
    }

    /// Map `<prefix>.0123` read-only.
    pub fn load(prefix: &Path) -> Result<PackedReference> {
        let path = suffixed_path(prefix, REF_0123_SUFFIX);
        let file = File::open(&path)
            .map_err(|e| IndexError::resource(format!("open {}", path.display()), e))?;
        let map = unsafe { memmap2::Mmap::map(&file) }
            .map_err(|e| IndexError::resource(format!("mmap {}", path.display()), e))?;
        if map.len() == 0 || map.len() % 2 != 0 {
            return Err(IndexError::format(
                REF_0123_SUFFIX,
                &path,
                format!("doubled text has odd length {}", map.len()),
            ));
        }
        let len = map.len();
        Ok(PackedReference {
            bases: Backing::mapped(Arc::new(map), 0, len),
        })
    }

    pub fn from_shared(view: Arc<crate::shm::SharedView>, len: usize) -> Result<PackedReference> {
        if view.len() < len {
            return Err(IndexError::Concurrency { segment: "ref" });
        }
        Ok(PackedReference {
            bases: Backing::shared(view, 0, len),
        })
    }

    pub fn to_shared_image(&self) -> Vec<u8> {
        self.bases.to_vec()
    }

    /// Length of the doubled text (forward + reverse complement).
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.len() == 0
    }

    /// Length of the forward strand alone.
    pub fn forward_len(&self) -> usize {
        self.bases.len() / 2
    }

    #[inline(always)]
    pub fn base(&self, i: usize) -> u8 {
        self.bases[i]
    }

    /// The forward strand, the verification text for perfect matching.
    #[inline]
    pub fn forward(&self) -> &[u8] {
        &self.bases[..self.forward_len()]
    }

    /// The whole doubled text.
    #[inline]
    pub fn doubled(&self) -> &[u8] {
        &self.bases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_complement_is_an_involution() {
        let fw = vec![0u8, 1, 2, 3, 0, 0, 3];
        let doubled = append_reverse_complement(&fw);
        assert_eq!(doubled.len(), fw.len() * 2);
        // RC of the RC half is the forward half again
        let rc_half = &doubled[fw.len()..];
        let back: Vec<u8> = rc_half.iter().rev().map(|&b| complement(b)).collect();
        assert_eq!(back, fw);
    }

    #[test]
    fn pac_roundtrip_preserves_every_tail_length() {
        let dir = tempfile::tempdir().unwrap();
        for extra in 0..4usize {
            let n = 8 + extra;
            let bases: Vec<u8> = (0..n).map(|i| (i % 4) as u8).collect();
            let prefix = dir.path().join(format!("tail{extra}"));
            write_pac(&prefix, &bases).unwrap();
            let back = read_pac(&prefix).unwrap();
            assert_eq!(back, bases, "tail {extra}");
        }
    }

    #[test]
    fn dump_then_load_0123() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("toy");

        let fw = vec![0u8, 1, 2, 3, 1, 1, 2, 0];
        let packed = PackedReference::new(append_reverse_complement(&fw));
        packed.dump(&prefix).unwrap();

        let loaded = PackedReference::load(&prefix).unwrap();
        assert_eq!(loaded.forward(), &fw[..]);
        assert_eq!(loaded.doubled(), packed.doubled());
    }
}
