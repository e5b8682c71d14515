//! # Double-Buffered Key/Value State
//!
//! Front/back store for concurrent render and script access.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────────────────────┐
//!                    │        StateBuffer          │
//!                    │                             │
//!                    │  ┌─────────┐  ┌─────────┐  │
//!                    │  │ Slot A  │  │ Slot B  │  │
//!                    │  └────┬────┘  └────┬────┘  │
//!                    │       │            │       │
//!                    │  ┌────┴────────────┴────┐  │
//!                    │  │ Atomic front index   │  │
//!                    │  └──────────────────────┘  │
//!                    └─────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//!      ┌──────────────┐ ┌────────────┐ ┌────────────┐
//!      │   BackView   │ │ FrontView  │ │   swap     │
//!      │   (script)   │ │  (render)  │ │  (main)    │
//!      └──────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! ## Thread Safety
//!
//! - `FrontView`: shared access to the front slot (main thread, many allowed)
//! - `BackView`: exclusive access to the back slot (worker thread, or a handler
//!   on the main thread while the worker is idle)
//! - `swap_buffers`: main thread only, once per frame, with no view held
//!
//! The two slots sit behind separate locks, so a reader and the writer never
//! contend. The only blocking point is the swap itself.
//!
//! ## Swap Strategy
//!
//! Swapping copies the back contents over the front slot and then flips the
//! front index, so both slots hold the same state afterwards and the writer
//! continues from a warm buffer (no Cold Buffer Problem).
//!
//! - [`SwapPolicy::FullCopy`]: clone the whole back map, O(n).
//! - [`SwapPolicy::DirtyTracked`]: copy only keys touched since the last
//!   swap, O(d). Keys removed from the back are removed from the front.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// How a [`StateBuffer`] brings the front up to date on swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwapPolicy {
    /// Copy every record on every swap.
    FullCopy,
    /// Copy only records marked dirty since the previous swap.
    DirtyTracked,
}

/// Derived representation rebuilt from the front contents after each swap.
///
/// Renderers typically want a flat, render-friendly view of the raw records
/// (sorted instance lists, packed arrays). Building it once per swap keeps
/// that work off the per-draw path.
pub trait Projection<K, V>: Send + Sync {
    /// The cached representation.
    type Output: Send + Sync;

    /// Builds the representation from the new front map.
    fn project(&self, front: &HashMap<K, V>) -> Self::Output;
}

impl<K, V> Projection<K, V> for () {
    type Output = ();

    #[inline]
    fn project(&self, _front: &HashMap<K, V>) -> Self::Output {}
}

/// Double-buffered key/value store.
///
/// ## Usage
///
/// ```rust,ignore
/// let camera = StateBuffer::<&'static str, f32>::new("camera");
///
/// // Worker thread, during its frame
/// camera.back().insert("fov", 70.0);
///
/// // Main thread, once the worker reports frame complete
/// camera.swap_buffers();
/// let fov = camera.front().get("fov").copied();
/// ```
pub struct StateBuffer<K, V, P = ()>
where
    P: Projection<K, V>,
{
    /// Diagnostic name.
    name: String,
    /// The two maps. The front one is `slots[front_index]`.
    slots: [RwLock<HashMap<K, V>>; 2],
    /// Index of the current front slot (0 or 1).
    front_index: AtomicUsize,
    /// Keys written to the back since the last swap.
    dirty: Mutex<HashSet<K>>,
    /// Whether writes are recorded in `dirty`.
    dirty_tracking: AtomicBool,
    /// Set when tracking was just enabled: the next swap must copy everything.
    force_full_copy: AtomicBool,
    /// Serializes swaps.
    swap_lock: Mutex<()>,
    /// Number of completed swaps.
    swap_count: AtomicU64,
    /// Builds the derived representation.
    projector: P,
    /// Derived representation of the current front.
    projection: RwLock<Arc<P::Output>>,
}

impl<K, V> StateBuffer<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty full-copy buffer.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_policy(name, SwapPolicy::FullCopy)
    }

    /// Creates an empty buffer with the given swap policy.
    #[must_use]
    pub fn with_policy(name: impl Into<String>, policy: SwapPolicy) -> Self {
        Self::with_projection(name, policy, ())
    }
}

impl<K, V, P> StateBuffer<K, V, P>
where
    K: Eq + Hash + Clone,
    V: Clone,
    P: Projection<K, V>,
{
    /// Creates an empty buffer that keeps a projection of its front.
    #[must_use]
    pub fn with_projection(name: impl Into<String>, policy: SwapPolicy, projector: P) -> Self {
        let initial = Arc::new(projector.project(&HashMap::new()));
        Self {
            name: name.into(),
            slots: [RwLock::new(HashMap::new()), RwLock::new(HashMap::new())],
            front_index: AtomicUsize::new(0),
            dirty: Mutex::new(HashSet::new()),
            dirty_tracking: AtomicBool::new(policy == SwapPolicy::DirtyTracked),
            force_full_copy: AtomicBool::new(false),
            swap_lock: Mutex::new(()),
            swap_count: AtomicU64::new(0),
            projector,
            projection: RwLock::new(initial),
        }
    }

    /// Returns the diagnostic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current swap policy.
    #[must_use]
    pub fn policy(&self) -> SwapPolicy {
        if self.dirty_tracking.load(Ordering::Acquire) {
            SwapPolicy::DirtyTracked
        } else {
            SwapPolicy::FullCopy
        }
    }

    /// Selects between dirty-tracked and full-copy swaps.
    ///
    /// Turning tracking on schedules one full copy, because writes made
    /// before it was enabled were never recorded.
    pub fn enable_dirty_tracking(&self, enabled: bool) {
        let was = self.dirty_tracking.swap(enabled, Ordering::AcqRel);
        if enabled && !was {
            self.force_full_copy.store(true, Ordering::Release);
        }
        if !enabled {
            self.dirty.lock().clear();
        }
    }

    /// Number of completed swaps.
    #[inline]
    #[must_use]
    pub fn swap_count(&self) -> u64 {
        self.swap_count.load(Ordering::Relaxed)
    }

    /// Number of keys recorded dirty since the last swap.
    #[must_use]
    pub fn dirty_len(&self) -> usize {
        self.dirty.lock().len()
    }

    /// Read-only view of the front map.
    ///
    /// Never contends with the writer: the back lives in the other slot.
    #[must_use]
    pub fn front(&self) -> FrontView<'_, K, V> {
        let idx = self.front_index.load(Ordering::Acquire);
        FrontView {
            guard: self.slots[idx].read(),
        }
    }

    /// Writable view of the back map.
    ///
    /// Writes through the view are recorded dirty automatically when
    /// tracking is enabled. Drop the view before the frame ends.
    #[must_use]
    pub fn back(&self) -> BackView<'_, K, V> {
        let idx = self.front_index.load(Ordering::Acquire) ^ 1;
        BackView {
            guard: self.slots[idx].write(),
            dirty: &self.dirty,
            tracking: self.dirty_tracking.load(Ordering::Acquire),
        }
    }

    /// Records `key` as modified since the last swap.
    ///
    /// No effect when dirty tracking is off.
    pub fn mark_dirty(&self, key: K) {
        if self.dirty_tracking.load(Ordering::Acquire) {
            self.dirty.lock().insert(key);
        }
    }

    /// Latest projection of the front contents.
    #[must_use]
    pub fn projection(&self) -> Arc<P::Output> {
        Arc::clone(&self.projection.read())
    }

    /// Seeds both slots with the same records.
    ///
    /// Call once at startup, before the worker starts writing.
    pub fn initialize(&self, records: impl IntoIterator<Item = (K, V)>) {
        let _swap = self.swap_lock.lock();
        let records: HashMap<K, V> = records.into_iter().collect();
        {
            let mut a = self.slots[0].write();
            let mut b = self.slots[1].write();
            a.clone_from(&records);
            *b = records;
        }
        self.dirty.lock().clear();
        self.rebuild_projection();
    }

    /// Publishes the back contents to the front.
    ///
    /// Main thread only, once per frame, after the writer has finished. Any
    /// [`FrontView`] or [`BackView`] still alive blocks this call.
    pub fn swap_buffers(&self) {
        let _swap = self.swap_lock.lock();

        let full = !self.dirty_tracking.load(Ordering::Acquire)
            || self.force_full_copy.swap(false, Ordering::AcqRel);
        // Take the dirty set before touching the slots; BackView locks in the
        // opposite order.
        let dirty = std::mem::take(&mut *self.dirty.lock());

        let front_idx = self.front_index.load(Ordering::Acquire);
        let back_idx = front_idx ^ 1;
        {
            let back = self.slots[back_idx].read();
            let mut front = self.slots[front_idx].write();
            if full {
                front.clone_from(&back);
            } else {
                for key in dirty {
                    match back.get(&key) {
                        Some(value) => {
                            front.insert(key, value.clone());
                        }
                        None => {
                            front.remove(&key);
                        }
                    }
                }
            }
        }

        // Both slots now agree; the freshly written one becomes the front.
        self.front_index.store(back_idx, Ordering::Release);
        self.rebuild_projection();
        self.swap_count.fetch_add(1, Ordering::Relaxed);
    }

    fn rebuild_projection(&self) {
        let idx = self.front_index.load(Ordering::Acquire);
        let output = {
            let front = self.slots[idx].read();
            self.projector.project(&front)
        };
        *self.projection.write() = Arc::new(output);
    }
}

impl<K, V, P> std::fmt::Debug for StateBuffer<K, V, P>
where
    P: Projection<K, V>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateBuffer")
            .field("name", &self.name)
            .field("front_index", &self.front_index.load(Ordering::Relaxed))
            .field("dirty_tracking", &self.dirty_tracking.load(Ordering::Relaxed))
            .field("swap_count", &self.swap_count.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Read-only view of the front map.
///
/// Derefs to the map itself; there is no way to get a mutable reference.
pub struct FrontView<'a, K, V> {
    guard: RwLockReadGuard<'a, HashMap<K, V>>,
}

impl<K, V> Deref for FrontView<'_, K, V> {
    type Target = HashMap<K, V>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

/// Writable view of the back map.
///
/// Reads go through `Deref`; every mutation goes through a method so it can
/// be recorded for dirty-tracked swaps.
pub struct BackView<'a, K, V> {
    guard: RwLockWriteGuard<'a, HashMap<K, V>>,
    dirty: &'a Mutex<HashSet<K>>,
    tracking: bool,
}

impl<K, V> BackView<'_, K, V>
where
    K: Eq + Hash + Clone,
{
    /// Inserts or replaces a record.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.mark_dirty(key.clone());
        self.guard.insert(key, value)
    }

    /// Removes a record.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.guard.remove(key);
        if removed.is_some() {
            self.mark_dirty(key.clone());
        }
        removed
    }

    /// Mutable access to a record, marking it dirty.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        if self.guard.contains_key(key) {
            self.mark_dirty(key.clone());
        }
        self.guard.get_mut(key)
    }

    /// Removes every record.
    pub fn clear(&mut self) {
        if self.tracking {
            self.dirty.lock().extend(self.guard.keys().cloned());
        }
        self.guard.clear();
    }

    /// Records `key` as modified.
    pub fn mark_dirty(&mut self, key: K) {
        if self.tracking {
            self.dirty.lock().insert(key);
        }
    }
}

impl<K, V> Deref for BackView<'_, K, V> {
    type Target = HashMap<K, V>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}
