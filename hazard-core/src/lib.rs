/*! Resource state tracking and barrier synthesis for GPU command recording.
 *
 *  A renderer records GPU operations that read and write sub-ranges of
 *  buffers and images. Execution is pipelined, so overlapping accesses
 *  must be ordered explicitly. This crate keeps, per tracking context and
 *  per independently addressable sub-range, the last write and the
 *  accumulated read-only accesses since that write, and synthesizes the
 *  minimal pipeline barriers a new batch of accesses requires.
 *
 *  The recording layer drives it through [`sync::BarrierEncoder`]:
 *  declare the usages of one operation batch, record the single batched
 *  barrier into a [`sync::CommandSink`], let the real work record, then
 *  commit the resulting states back to the tracks.
 */

#![warn(
    trivial_casts,
    trivial_numeric_casts,
    unsafe_op_in_unsafe_fn,
    unused_extern_crates,
    unused_qualifications
)]
#![allow(
    // We don't use syntax sugar where it's not necessary.
    clippy::match_like_matches_macro,
    // No need for defaults in the internal types.
    clippy::new_without_default
)]

pub mod id;
pub mod registry;
pub mod resource;
pub mod sync;
pub mod track;

use std::borrow::Cow;

pub use track::needs_barrier;

/// Hash map flavor used throughout: keys are small integers, so the
/// hasher quality matters less than its speed.
type FastHashMap<K, V> =
    std::collections::HashMap<K, V, std::hash::BuildHasherDefault<fxhash::FxHasher>>;

/// Debug label of a resource, shown in logs and graphics debuggers.
pub type Label<'a> = Option<Cow<'a, str>>;
