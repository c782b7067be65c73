// Shared-segment manager for index components.
//
// Index bytes are either owned by the process (plain heap vectors) or
// mapped from System-V shared segments governed by the protocol below.
// The rest of the crate consumes this module through three calls only:
// `open_shared`, `close_shared` and `fingerprint`. Nothing in the query
// path spins, forks or sleeps.
//
// Info-page state machine:
//   NOT_INIT -> MODIFY -> AVAIL, with WAIT interposed when a manager
//   arrives while readers are attached. A one-word spinlock protects the
//   transitions; readers arriving in AVAIL bump a counter and never stall.
//
// Hugepage backing is best effort: 1 GB falls back to 2 MB, then to
// normal pages, unless the caller demanded `force`.

use std::mem::size_of;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use bytemuck::Pod;

use crate::error::{IndexError, Result};
use crate::opts::HugepageMode;

/// Segments a process may attach. One shared segment per index component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Info,
    Bwt,
    Ref,
    Pac,
    Perfect,
    SmemAll,
    SmemLast,
}

impl SegmentKind {
    pub const ALL_DATA: [SegmentKind; 6] = [
        SegmentKind::Bwt,
        SegmentKind::Ref,
        SegmentKind::Pac,
        SegmentKind::Perfect,
        SegmentKind::SmemAll,
        SegmentKind::SmemLast,
    ];

    fn key_index(self) -> i32 {
        match self {
            SegmentKind::Info => 0,
            SegmentKind::Bwt => 1,
            SegmentKind::Ref => 2,
            SegmentKind::Pac => 3,
            SegmentKind::Perfect => 4,
            SegmentKind::SmemAll => 5,
            SegmentKind::SmemLast => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SegmentKind::Info => "info",
            SegmentKind::Bwt => "bwt",
            SegmentKind::Ref => "ref",
            SegmentKind::Pac => "pac",
            SegmentKind::Perfect => "perfect",
            SegmentKind::SmemAll => "smem_all",
            SegmentKind::SmemLast => "smem_last",
        }
    }
}

const STATE_NOT_INIT: i32 = 0;
const STATE_MODIFY: i32 = 1;
const STATE_WAIT: i32 = 2;
const STATE_AVAIL: i32 = 3;

const INFO_SEGMENT_SIZE: usize = 4096;
const MAX_REF_PATH: usize = INFO_SEGMENT_SIZE - size_of::<InfoHeader>();

// SHM_HUGE_* encodings (log2 page size << SHM_HUGE_SHIFT); not exported by
// the libc crate for every target, so spelled out here.
const SHM_HUGE_SHIFT: i32 = 26;
const SHM_HUGE_2MB: i32 = 21 << SHM_HUGE_SHIFT;
const SHM_HUGE_1GB: i32 = 30 << SHM_HUGE_SHIFT;

/// Identity of the on-disk index a segment set was built from. A mismatch
/// at attach time invalidates the whole set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub abs_path: PathBuf,
    pub mtime_sec: i64,
    pub mtime_nsec: i64,
    pub file_len: i64,
    pub hugetlb_flags: i32,
    pub seed_len: i32,
}

impl Fingerprint {
    /// Fingerprint of the current on-disk reference (`<prefix>.0123`).
    pub fn of_reference(prefix: &Path, hugetlb_flags: i32, seed_len: i32) -> Result<Fingerprint> {
        let ref_path = suffixed(prefix, ".0123");
        let abs_path = std::fs::canonicalize(&ref_path)
            .map_err(|e| IndexError::resource(format!("canonicalize {}", ref_path.display()), e))?;
        let meta = std::fs::metadata(&abs_path)
            .map_err(|e| IndexError::resource(format!("stat {}", abs_path.display()), e))?;
        use std::os::unix::fs::MetadataExt;
        Ok(Fingerprint {
            abs_path,
            mtime_sec: meta.mtime(),
            mtime_nsec: meta.mtime_nsec(),
            file_len: meta.len() as i64,
            hugetlb_flags,
            seed_len,
        })
    }

    /// Serialized form stored in the info page and handed to callers.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(40 + self.abs_path.as_os_str().len());
        out.extend_from_slice(&self.mtime_sec.to_le_bytes());
        out.extend_from_slice(&self.mtime_nsec.to_le_bytes());
        out.extend_from_slice(&self.file_len.to_le_bytes());
        out.extend_from_slice(&self.hugetlb_flags.to_le_bytes());
        out.extend_from_slice(&self.seed_len.to_le_bytes());
        out.extend_from_slice(self.abs_path.to_string_lossy().as_bytes());
        out
    }
}

#[repr(C)]
struct InfoHeader {
    lock: AtomicI32,
    state: i32,
    num_map_read: i32,
    num_map_manager: i32,
    hugetlb_flags: i32,
    pt_seed_len: i32,
    reference_len: i64,
    mtime_sec: i64,
    mtime_nsec: i64,
    ref_path_len: i32,
    _pad: i32,
}

/// A read-only view of one attached shared segment. Detaches on drop and
/// releases the reader slot it was counted under.
pub struct SharedView {
    addr: NonNull<u8>,
    size: usize,
    kind: SegmentKind,
    info: Option<Arc<InfoPage>>,
}

// The mapping is read-only and lives for the view's lifetime.
unsafe impl Send for SharedView {}
unsafe impl Sync for SharedView {}

impl SharedView {
    pub fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.addr.as_ptr(), self.size) }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl Drop for SharedView {
    fn drop(&mut self) {
        unsafe {
            libc::shmdt(self.addr.as_ptr() as *const libc::c_void);
        }
        if let Some(info) = &self.info {
            info.with_lock(|hdr| {
                hdr.num_map_read -= 1;
                if hdr.num_map_read == 0 && hdr.state == STATE_WAIT {
                    hdr.state = STATE_MODIFY;
                }
            });
            log::debug!("detached shared segment `{}`", self.kind.name());
        }
    }
}

/// Typed storage for an index array: process-owned, mapped read-only from
/// a file, or a slice of a shared segment. Deref yields the same `&[T]`
/// in every case, so the query path does not branch on the storage class.
pub enum Backing<T: Pod> {
    Owned(Vec<T>),
    Mapped {
        map: Arc<memmap2::Mmap>,
        offset: usize,
        len: usize,
    },
    Shared {
        view: Arc<SharedView>,
        offset: usize,
        len: usize,
    },
}

impl<T: Pod> Backing<T> {
    pub fn shared(view: Arc<SharedView>, offset: usize, len: usize) -> Backing<T> {
        debug_assert!(offset + len * size_of::<T>() <= view.len());
        Backing::Shared { view, offset, len }
    }

    pub fn mapped(map: Arc<memmap2::Mmap>, offset: usize, len: usize) -> Backing<T> {
        debug_assert!(offset + len * size_of::<T>() <= map.len());
        Backing::Mapped { map, offset, len }
    }
}

impl<T: Pod> Deref for Backing<T> {
    type Target = [T];

    #[inline(always)]
    fn deref(&self) -> &[T] {
        match self {
            Backing::Owned(v) => v,
            Backing::Mapped { map, offset, len } => {
                bytemuck::cast_slice(&map[*offset..*offset + *len * size_of::<T>()])
            }
            Backing::Shared { view, offset, len } => {
                bytemuck::cast_slice(&view.bytes()[*offset..*offset + *len * size_of::<T>()])
            }
        }
    }
}

impl<T: Pod + std::fmt::Debug> std::fmt::Debug for Backing<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backing::Owned(v) => write!(f, "Backing::Owned(len={})", v.len()),
            Backing::Mapped { len, .. } => write!(f, "Backing::Mapped(len={})", len),
            Backing::Shared { len, .. } => write!(f, "Backing::Shared(len={})", len),
        }
    }
}

impl<T: Pod> From<Vec<T>> for Backing<T> {
    fn from(v: Vec<T>) -> Self {
        Backing::Owned(v)
    }
}

/// The attached info page; shared by every view this process holds.
struct InfoPage {
    addr: NonNull<u8>,
}

unsafe impl Send for InfoPage {}
unsafe impl Sync for InfoPage {}

impl InfoPage {
    fn header(&self) -> *mut InfoHeader {
        self.addr.as_ptr() as *mut InfoHeader
    }

    /// Run `f` under the info-page spinlock.
    fn with_lock<R>(&self, f: impl FnOnce(&mut InfoHeader) -> R) -> R {
        let hdr = unsafe { &mut *self.header() };
        while hdr
            .lock
            .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
        let r = f(hdr);
        hdr.lock.store(0, Ordering::Release);
        r
    }

    fn ref_path(&self) -> PathBuf {
        let hdr = unsafe { &*self.header() };
        let len = hdr.ref_path_len.clamp(0, MAX_REF_PATH as i32) as usize;
        let bytes = unsafe {
            std::slice::from_raw_parts(self.addr.as_ptr().add(size_of::<InfoHeader>()), len)
        };
        PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
    }
}

impl Drop for InfoPage {
    fn drop(&mut self) {
        unsafe {
            libc::shmdt(self.addr.as_ptr() as *const libc::c_void);
        }
    }
}

fn suffixed(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Key for a segment: a hash of the absolute index prefix mixed with the
/// segment index, so two indexes on one machine do not collide.
fn segment_key(prefix: &Path, kind: SegmentKind) -> libc::key_t {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in prefix.as_os_str().as_encoded_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x1000_0000_01b3);
    }
    ((h as i32) & 0x7fff_ff00) | kind.key_index()
}

fn hugetlb_shm_flags(mode: HugepageMode) -> i32 {
    match mode {
        HugepageMode::Normal => 0,
        HugepageMode::DefaultHuge => libc::SHM_HUGETLB,
        HugepageMode::Huge2Mb => libc::SHM_HUGETLB | SHM_HUGE_2MB,
        HugepageMode::Huge1Gb => libc::SHM_HUGETLB | SHM_HUGE_1GB,
    }
}

/// Next smaller page unit in the best-effort downgrade chain.
pub fn downgrade_hugepage(mode: HugepageMode) -> Option<HugepageMode> {
    match mode {
        HugepageMode::Huge1Gb => Some(HugepageMode::Huge2Mb),
        HugepageMode::Huge2Mb | HugepageMode::DefaultHuge => Some(HugepageMode::Normal),
        HugepageMode::Normal => None,
    }
}

fn page_unit(mode: HugepageMode) -> usize {
    match mode {
        HugepageMode::Normal => 4096,
        HugepageMode::DefaultHuge | HugepageMode::Huge2Mb => 2 * 1024 * 1024,
        HugepageMode::Huge1Gb => 1024 * 1024 * 1024,
    }
}

fn align_up(v: usize, unit: usize) -> usize {
    v.div_ceil(unit) * unit
}

/// Manages the shared segment set for one index prefix.
///
/// Readers call `open_shared`/`close_shared`; a renewal process calls
/// `renew` with the bytes of each component, which tears down any segment
/// whose fingerprint or hugepage flags disagree with the request.
pub struct ShmManager {
    prefix: PathBuf,
    mode: HugepageMode,
    force: bool,
    info: Option<Arc<InfoPage>>,
}

impl ShmManager {
    pub fn new(prefix: impl Into<PathBuf>, mode: HugepageMode, force: bool) -> ShmManager {
        ShmManager {
            prefix: prefix.into(),
            mode,
            force,
            info: None,
        }
    }

    /// Attach a segment for reading. Fails without blocking when the set
    /// is absent or not in `AVAIL`; callers fall back to file loading.
    pub fn open_shared(&mut self, kind: SegmentKind) -> Result<Arc<SharedView>> {
        let info = self.attach_info(false)?;

        let admitted = info.with_lock(|hdr| {
            if hdr.state == STATE_AVAIL {
                hdr.num_map_read += 1;
                true
            } else {
                false
            }
        });
        if !admitted {
            return Err(IndexError::resource(
                format!("shared segment set for {} not available", self.prefix.display()),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }

        match self.attach_data(kind, &info) {
            Ok(view) => Ok(view),
            Err(e) => {
                info.with_lock(|hdr| hdr.num_map_read -= 1);
                Err(e)
            }
        }
    }

    /// Detach a previously opened view. Views also detach on drop; this
    /// exists so the protocol has an explicit close in the interface.
    pub fn close_shared(&mut self, view: Arc<SharedView>) {
        drop(view);
    }

    /// Fingerprint recorded in the info page, or of the on-disk reference
    /// when no segment set exists yet.
    pub fn fingerprint(&mut self) -> Result<Fingerprint> {
        if let Ok(info) = self.attach_info(false) {
            let path = info.ref_path();
            let fp = info.with_lock(|hdr| Fingerprint {
                abs_path: path.clone(),
                mtime_sec: hdr.mtime_sec,
                mtime_nsec: hdr.mtime_nsec,
                file_len: hdr.reference_len,
                hugetlb_flags: hdr.hugetlb_flags,
                seed_len: hdr.pt_seed_len,
            });
            return Ok(fp);
        }
        Fingerprint::of_reference(&self.prefix, hugetlb_shm_flags(self.mode), 0)
    }

    /// Renew the segment set: verify the recorded fingerprint against the
    /// on-disk index and rebuild every stale segment from `provide`.
    ///
    /// `provide` is called once per data segment and returns the bytes to
    /// publish, or `None` to leave that segment out (absent tables).
    pub fn renew(
        &mut self,
        seed_len: i32,
        mut provide: impl FnMut(SegmentKind) -> Option<Vec<u8>>,
    ) -> Result<()> {
        let want = Fingerprint::of_reference(&self.prefix, hugetlb_shm_flags(self.mode), seed_len)?;
        let info = self.attach_info(true)?;

        info.with_lock(|hdr| {
            hdr.num_map_manager += 1;
            hdr.state = if hdr.state == STATE_NOT_INIT || hdr.num_map_read == 0 {
                STATE_MODIFY
            } else {
                STATE_WAIT
            };
        });

        // Drain readers before touching data segments.
        loop {
            let state = info.with_lock(|hdr| {
                if hdr.state == STATE_WAIT && hdr.num_map_read == 0 {
                    hdr.state = STATE_MODIFY;
                }
                hdr.state
            });
            if state == STATE_MODIFY {
                break;
            }
            std::hint::spin_loop();
        }

        let stale = info.with_lock(|hdr| {
            hdr.reference_len != want.file_len
                || hdr.mtime_sec != want.mtime_sec
                || hdr.mtime_nsec != want.mtime_nsec
                || hdr.hugetlb_flags != want.hugetlb_flags
                || hdr.pt_seed_len != want.seed_len
                || info.ref_path() != want.abs_path
        });

        if stale {
            log::info!(
                "renewing shared segments for {} (fingerprint changed)",
                self.prefix.display()
            );
            for kind in SegmentKind::ALL_DATA {
                self.remove_segment(kind);
                if let Some(bytes) = provide(kind) {
                    self.publish_segment(kind, &bytes)?;
                }
            }
        }

        info.with_lock(|hdr| {
            hdr.hugetlb_flags = want.hugetlb_flags;
            hdr.pt_seed_len = want.seed_len;
            hdr.reference_len = want.file_len;
            hdr.mtime_sec = want.mtime_sec;
            hdr.mtime_nsec = want.mtime_nsec;
            let path_bytes = want.abs_path.to_string_lossy().into_owned().into_bytes();
            let n = path_bytes.len().min(MAX_REF_PATH);
            hdr.ref_path_len = n as i32;
            unsafe {
                std::ptr::copy_nonoverlapping(
                    path_bytes.as_ptr(),
                    (hdr as *mut InfoHeader as *mut u8).add(size_of::<InfoHeader>()),
                    n,
                );
            }
            hdr.num_map_manager -= 1;
            hdr.state = STATE_AVAIL;
        });
        Ok(())
    }

    /// Remove every segment of this prefix, info page included.
    pub fn destroy(&mut self) {
        for kind in SegmentKind::ALL_DATA {
            self.remove_segment(kind);
        }
        self.remove_segment(SegmentKind::Info);
        self.info = None;
    }

    fn attach_info(&mut self, create: bool) -> Result<Arc<InfoPage>> {
        if let Some(info) = &self.info {
            return Ok(info.clone());
        }
        let key = segment_key(&self.prefix, SegmentKind::Info);
        let mut flags = 0o666;
        if create {
            flags |= libc::IPC_CREAT;
        }
        let id = unsafe { libc::shmget(key, INFO_SEGMENT_SIZE, flags) };
        if id < 0 {
            return Err(IndexError::resource(
                "shmget(info)",
                std::io::Error::last_os_error(),
            ));
        }
        let addr = unsafe { libc::shmat(id, std::ptr::null(), 0) };
        if addr == usize::MAX as *mut libc::c_void {
            return Err(IndexError::resource(
                "shmat(info)",
                std::io::Error::last_os_error(),
            ));
        }
        let info = Arc::new(InfoPage {
            addr: NonNull::new(addr as *mut u8).unwrap(),
        });
        self.info = Some(info.clone());
        Ok(info)
    }

    fn attach_data(&self, kind: SegmentKind, info: &Arc<InfoPage>) -> Result<Arc<SharedView>> {
        let key = segment_key(&self.prefix, kind);
        let id = unsafe { libc::shmget(key, 0, 0o666) };
        if id < 0 {
            return Err(IndexError::resource(
                format!("shmget({})", kind.name()),
                std::io::Error::last_os_error(),
            ));
        }
        let mut stat: libc::shmid_ds = unsafe { std::mem::zeroed() };
        if unsafe { libc::shmctl(id, libc::IPC_STAT, &mut stat) } < 0 {
            return Err(IndexError::resource(
                format!("shmctl({})", kind.name()),
                std::io::Error::last_os_error(),
            ));
        }
        let addr = unsafe { libc::shmat(id, std::ptr::null(), libc::SHM_RDONLY) };
        if addr == usize::MAX as *mut libc::c_void {
            return Err(IndexError::resource(
                format!("shmat({})", kind.name()),
                std::io::Error::last_os_error(),
            ));
        }
        log::debug!("attached shared segment `{}` ({} bytes)", kind.name(), stat.shm_segsz);
        Ok(Arc::new(SharedView {
            addr: NonNull::new(addr as *mut u8).unwrap(),
            size: stat.shm_segsz as usize,
            kind,
            info: Some(info.clone()),
        }))
    }

    /// Create a segment with the requested page backing, walking the
    /// downgrade chain on failure, and copy `bytes` into it.
    fn publish_segment(&self, kind: SegmentKind, bytes: &[u8]) -> Result<()> {
        let key = segment_key(&self.prefix, kind);
        let mut mode = self.mode;
        let id = loop {
            let size = align_up(bytes.len().max(1), page_unit(mode));
            let flags = 0o666 | libc::IPC_CREAT | libc::IPC_EXCL | hugetlb_shm_flags(mode);
            let id = unsafe { libc::shmget(key, size, flags) };
            if id >= 0 {
                if mode != self.mode {
                    log::warn!(
                        "segment `{}`: downgraded hugepage backing to {:?}",
                        kind.name(),
                        mode
                    );
                }
                break id;
            }
            let err = std::io::Error::last_os_error();
            match downgrade_hugepage(mode) {
                Some(smaller) if !self.force => mode = smaller,
                _ => {
                    return Err(IndexError::resource(
                        format!("shmget({}, {:?})", kind.name(), mode),
                        err,
                    ));
                }
            }
        };

        let addr = unsafe { libc::shmat(id, std::ptr::null(), 0) };
        if addr == usize::MAX as *mut libc::c_void {
            return Err(IndexError::resource(
                format!("shmat({})", kind.name()),
                std::io::Error::last_os_error(),
            ));
        }
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
            libc::shmdt(addr as *const libc::c_void);
        }
        Ok(())
    }

    fn remove_segment(&self, kind: SegmentKind) {
        let key = segment_key(&self.prefix, kind);
        let id = unsafe { libc::shmget(key, 0, 0o666) };
        if id >= 0 {
            unsafe {
                libc::shmctl(id, libc::IPC_RMID, std::ptr::null_mut());
            }
        }
    }
}
