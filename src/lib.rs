// kestrel-index: the FM-index core of the Kestrel short-read aligner.
//
// Query-time layering, leaves first: `packed_ref` holds the 2-bit
// reference text, `fm_index` the checkpointed BWT rank primitives,
// `index` composes them with the sampled suffix array, `smem_accel`
// collapses short forward extensions through precomputed tables, `smem`
// runs the bidirectional SMEM search, and `perfect` short-circuits
// whole-read exact matches. `build` constructs everything offline and
// `shm` shares the loaded bytes between processes.

pub mod build;
pub mod error;
pub mod fm_index;
pub mod index;
pub mod opts;
pub mod packed_ref;
pub mod perfect;
pub mod ref_meta;
pub mod shm;
pub mod smem;
pub mod smem_accel;

pub use error::{IndexError, Result};
pub use index::{BwtIndex, KestrelIndex};
pub use opts::{HugepageMode, IndexOpts};
pub use smem::{ReadSeeding, Seed, Smem, SmemEngine, SmemScratch};
