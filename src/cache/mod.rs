//! Incremental Resource Caches
//!
//! One generic compiler, four specializations (shader, buffer, texture,
//! sampler). Each compile diffs the descriptors a fresh [`ProgramMap`]
//! wants against the previous generation: unchanged entries are carried
//! into the next generation by reference, everything else is recompiled,
//! and whatever the new generation no longer wants is disposed when the
//! swap commits.
//!
//! A compile produces a [`PendingCache`], not an installed one. The facade
//! decides what happens to it: [`PendingCache::install`] commits the swap
//! and disposes superseded entries; [`PendingCache::discard`] throws away a
//! generation that lost the race to a newer edit, disposing exactly the
//! resources it freshly created. Either way every GPU allocation is
//! released exactly once.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::future::join_all;
use rustc_hash::FxHashMap;

use crate::analyze::ProgramMap;
use crate::context::GpuContext;

pub mod buffer;
pub mod sampler;
pub mod shader;
pub mod texture;

pub use buffer::{BufferCompiler, CompiledBuffer};
pub use sampler::{CompiledSampler, SamplerCompiler};
pub use shader::{CompiledShader, DiagnosticSeverity, ShaderCompiler, ShaderDiagnostic};
pub use texture::{CompiledTexture, TextureCompiler};

// ─── Entry identity ───────────────────────────────────────────────────────────

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

fn next_entry_id() -> u64 {
    NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Disposal contract ────────────────────────────────────────────────────────

/// Eager release of GPU memory held by a compiled resource.
///
/// Implementations must tolerate other handles to the same GPU object still
/// being alive (`wgpu` destroy semantics) and must not panic. The cache
/// guarantees at-most-once invocation per entry.
pub trait Dispose {
    fn dispose(&self);
}

// ─── Compiler strategy ────────────────────────────────────────────────────────

/// Per-resource-kind strategy plugged into [`ResourceCache`].
pub trait ResourceCompiler {
    type Key: Clone + Eq + Hash;
    /// Descriptor snapshot taken from the program map; owns everything the
    /// compile needs so it can run after the map's borrow ends.
    type Descriptor;
    type Output: Dispose;

    /// Kind label for logs.
    const KIND: &'static str;

    /// The descriptors that should currently exist.
    fn enumerate(map: &ProgramMap) -> Vec<(Self::Key, Self::Descriptor)>;

    /// Whether an existing compiled resource is stale for `desc`.
    fn needs_recompile(desc: &Self::Descriptor, existing: &Self::Output) -> bool;

    /// Compiles one resource. Infallible by contract: unsatisfiable
    /// descriptors compile to an intentionally empty output.
    fn compile(
        gpu: &GpuContext,
        key: &Self::Key,
        desc: Self::Descriptor,
        map: &ProgramMap,
    ) -> impl Future<Output = Self::Output>;
}

// ─── Cache entries ────────────────────────────────────────────────────────────

/// One compiled resource plus its disposal guard.
///
/// The entry ID is process-unique and survives carry-over, so "was this
/// reused or recompiled" is observable without comparing pointers.
pub struct CacheEntry<T> {
    resource: T,
    id: u64,
    disposed: AtomicBool,
}

impl<T> CacheEntry<T> {
    fn new(resource: T) -> Self {
        Self {
            resource,
            id: next_entry_id(),
            disposed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn resource(&self) -> &T {
        &self.resource
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<T: Dispose> CacheEntry<T> {
    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.resource.dispose();
        }
    }
}

// ─── Resource cache ───────────────────────────────────────────────────────────

/// Installed cache of one resource kind for the live generation.
pub struct ResourceCache<C: ResourceCompiler> {
    entries: FxHashMap<C::Key, Arc<CacheEntry<C::Output>>>,
}

impl<C: ResourceCompiler> Default for ResourceCache<C> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<C: ResourceCompiler> ResourceCache<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &C::Key) -> Option<&C::Output> {
        self.entries.get(key).map(|entry| entry.resource())
    }

    /// Stable identity of the entry at `key`; changes only when the entry
    /// is actually recompiled.
    #[must_use]
    pub fn entry_id(&self, key: &C::Key) -> Option<u64> {
        self.entries.get(key).map(|entry| entry.id())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&C::Key, &C::Output)> {
        self.entries.iter().map(|(key, entry)| (key, entry.resource()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Diffs this generation against `map` and compiles what changed.
    ///
    /// Unchanged entries are carried by reference. All fresh compiles are
    /// created first and then driven together, so one slow resource never
    /// blocks the others from starting.
    pub async fn compile(&self, gpu: &GpuContext, map: &ProgramMap) -> PendingCache<C> {
        let wanted = C::enumerate(map);
        let mut entries =
            FxHashMap::with_capacity_and_hasher(wanted.len(), rustc_hash::FxBuildHasher);
        let mut jobs = Vec::new();

        for (key, desc) in wanted {
            if let Some(existing) = self.entries.get(&key) {
                if !C::needs_recompile(&desc, existing.resource()) {
                    entries.insert(key, Arc::clone(existing));
                    continue;
                }
            }
            jobs.push(async move {
                let output = C::compile(gpu, &key, desc, map).await;
                (key, output)
            });
        }

        let mut fresh = Vec::with_capacity(jobs.len());
        for (key, output) in join_all(jobs).await {
            fresh.push(key.clone());
            entries.insert(key, Arc::new(CacheEntry::new(output)));
        }

        if !fresh.is_empty() {
            log::debug!(
                "{}: {} compiled, {} carried",
                C::KIND,
                fresh.len(),
                entries.len() - fresh.len()
            );
        }

        PendingCache { entries, fresh }
    }

    /// Disposes every entry. Device loss path; the next compile starts
    /// from an empty generation.
    pub fn teardown(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.dispose();
        }
    }
}

// ─── Pending caches ───────────────────────────────────────────────────────────

/// Output of one cache compile, not yet committed.
pub struct PendingCache<C: ResourceCompiler> {
    entries: FxHashMap<C::Key, Arc<CacheEntry<C::Output>>>,
    /// Keys compiled by this generation (as opposed to carried over).
    fresh: Vec<C::Key>,
}

impl<C: ResourceCompiler> PendingCache<C> {
    /// Commits the swap: entries of `previous` that were not carried into
    /// this cache are disposed.
    #[must_use]
    pub fn install(self, previous: &ResourceCache<C>) -> ResourceCache<C> {
        let mut retired = 0usize;
        for (key, old) in &previous.entries {
            let carried = self
                .entries
                .get(key)
                .is_some_and(|new| Arc::ptr_eq(old, new));
            if !carried {
                old.dispose();
                retired += 1;
            }
        }
        if retired > 0 {
            log::debug!("{}: retired {retired} stale entries", C::KIND);
        }
        ResourceCache {
            entries: self.entries,
        }
    }

    /// Throws this generation away: resources it freshly compiled are
    /// disposed, carried entries stay owned by the live cache.
    pub fn discard(self) {
        for key in &self.fresh {
            if let Some(entry) = self.entries.get(key) {
                entry.dispose();
            }
        }
    }

    /// Keys this compile actually recompiled.
    #[must_use]
    pub fn fresh(&self) -> &[C::Key] {
        &self.fresh
    }
}
