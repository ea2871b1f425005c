use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use slab::Slab;

use tether_engine::{ExternId, Invocation, ScriptEngine};

use crate::holder::Holder;
use crate::{bind_with_state, BridgeError, Translater};

/// Per-engine-instance bridge registry.
///
/// Owns the holder arena and the cached dispatcher template. Create one
/// registry alongside each engine instance and drop it when the engine goes
/// away; a weak finalizer that fires against a dropped registry is a no-op.
///
/// Holders are addressed by an opaque integer id smuggled through the engine
/// as an external value. The id pairs the arena slot with a generation tag,
/// so an id left behind by a consumed holder resolves to "not found" even
/// after the slot itself has been reused.
pub struct CallbackRegistry<E: ScriptEngine> {
    inner: Arc<RegistryInner<E>>,
}

struct RegistryInner<E: ScriptEngine> {
    holders: Mutex<HolderArena<E>>,
    /// Cached dispatcher template, built on first bridge and reused for every
    /// bridged callable on this registry.
    dispatcher: OnceCell<E::Value>,
}

/// Slot arena with generation-tagged ids.
///
/// Slab keys are reused after removal; the generation counter is not. Every
/// insert stamps the entry with a fresh generation and encodes both halves
/// into the `ExternId`, so lookups through a stale id fail the generation
/// check instead of aliasing whatever lives in the reused slot.
struct HolderArena<E: ScriptEngine> {
    entries: Slab<HolderEntry<E>>,
    generation: u32,
}

struct HolderEntry<E: ScriptEngine> {
    generation: u32,
    holder: Arc<Holder<E>>,
}

fn encode(generation: u32, key: usize) -> ExternId {
    ExternId(((generation as u64) << 32) | key as u64)
}

fn decode(id: ExternId) -> (u32, usize) {
    ((id.0 >> 32) as u32, (id.0 & u32::MAX as u64) as usize)
}

impl<E: ScriptEngine> HolderArena<E> {
    fn new() -> Self {
        HolderArena {
            entries: Slab::new(),
            generation: 0,
        }
    }

    fn insert(&mut self, holder: Arc<Holder<E>>) -> ExternId {
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let key = self.entries.insert(HolderEntry { generation, holder });
        encode(generation, key)
    }

    fn get(&self, id: ExternId) -> Option<&Arc<Holder<E>>> {
        let (generation, key) = decode(id);
        self.entries
            .get(key)
            .filter(|entry| entry.generation == generation)
            .map(|entry| &entry.holder)
    }

    fn remove(&mut self, id: ExternId) {
        let (generation, key) = decode(id);
        if self
            .entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
        {
            let _ = self.entries.try_remove(key);
        }
    }
}

impl<E: ScriptEngine> CallbackRegistry<E> {
    pub fn new() -> Self {
        CallbackRegistry {
            inner: Arc::new(RegistryInner {
                holders: Mutex::new(HolderArena::new()),
                dispatcher: OnceCell::new(),
            }),
        }
    }

    /// Number of live holders. Drops as one-time callables are consumed and
    /// as the engine collects repeatable ones.
    pub fn live_holders(&self) -> usize {
        self.inner.holders.lock().entries.len()
    }

    /// Bridge `translater` into a new engine-callable value.
    ///
    /// With `one_time` set the produced value may be called successfully at
    /// most once: the second call throws into script without reaching the
    /// translater, and the native payload is released immediately after the
    /// first call instead of waiting for the engine's collector.
    pub fn create_bridged_callable(
        &self,
        engine: &E,
        translater: Translater<E>,
        one_time: bool,
    ) -> E::Value {
        let id = self
            .inner
            .holders
            .lock()
            .insert(Arc::new(Holder::new(translater)));
        let external = engine.new_external(id);

        // The external does not keep the holder alive on its own; the
        // finalizer fires once the engine finds the bound value unreachable.
        let registry = Arc::downgrade(&self.inner);
        engine.set_weak(
            &external,
            Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.dispose_holder(id);
                }
            }),
        );

        let state = engine.new_record();
        if one_time {
            engine.set_record_flag(&state, "oneTime");
        }

        let dispatcher = self.dispatcher(engine).clone();
        log::trace!(
            "bridged callable created (holder {}, one_time: {})",
            id.0,
            one_time
        );
        bind_with_state(engine, &dispatcher, &external, &state)
    }

    /// The shared dispatcher template, built lazily on first use.
    fn dispatcher(&self, engine: &E) -> &E::Value {
        self.inner.dispatcher.get_or_init(|| {
            log::debug!("building dispatcher template");
            let registry = Arc::downgrade(&self.inner);
            engine.new_function(Arc::new(move |scope: &mut dyn Invocation<E>| {
                dispatch(&registry, scope);
            }))
        })
    }
}

impl<E: ScriptEngine> Default for CallbackRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ScriptEngine> RegistryInner<E> {
    fn resolve(&self, id: ExternId) -> Option<Arc<Holder<E>>> {
        self.holders.lock().get(id).cloned()
    }

    /// Dispose the holder behind `id`. Returns false when the other disposal
    /// path got there first, or when `id` is stale, including an id whose
    /// arena slot has since been handed to a newer holder.
    fn dispose_holder(&self, id: ExternId) -> bool {
        let holder = self.holders.lock().get(id).cloned();
        let Some(holder) = holder else {
            log::trace!("holder {} already gone", id.0);
            return false;
        };
        if holder.retire() {
            self.holders.lock().remove(id);
            log::trace!("holder {} disposed", id.0);
            true
        } else {
            false
        }
    }
}

/// Shared entry point for every bridged callable on one registry.
///
/// The bound value prepends `(external, state)` ahead of the script caller's
/// arguments; everything after those two belongs to the caller and is handed
/// to the translater untouched.
fn dispatch<E: ScriptEngine>(registry: &Weak<RegistryInner<E>>, scope: &mut dyn Invocation<E>) {
    let (external, state) = {
        let args = scope.args();
        assert!(
            args.len() >= 2,
            "dispatcher invoked without its bound leading arguments"
        );
        (args[0].clone(), args[1].clone())
    };

    // The check-and-set below is atomic from the engine's point of view:
    // script callbacks run non-reentrantly on one thread.
    let one_time = scope.engine().record_flag(&state, "oneTime");
    if one_time {
        if scope.engine().record_flag(&state, "called") {
            scope.throw_error(&BridgeError::ReuseViolation.to_string());
            return;
        }
        scope.engine().set_record_flag(&state, "called");
    }

    let id = scope
        .engine()
        .external_id(&external)
        .expect("dispatcher bound argument is not an external");
    let registry = registry
        .upgrade()
        .expect("bridged callable invoked after its registry was dropped");
    let holder = registry
        .resolve(id)
        .expect("bridged callable invoked with a stale holder id");

    holder.translater().run(&mut TailArgs {
        base: scope,
        skip: 2,
    });

    // One-time holders die now rather than waiting for the engine's
    // collector.
    if one_time {
        registry.dispose_holder(id);
    }
}

/// View of an invocation scope with the bound leading arguments stripped.
struct TailArgs<'a, E: ScriptEngine> {
    base: &'a mut dyn Invocation<E>,
    skip: usize,
}

impl<'a, E: ScriptEngine> Invocation<E> for TailArgs<'a, E> {
    fn engine(&self) -> &E {
        self.base.engine()
    }

    fn args(&self) -> &[E::Value] {
        &self.base.args()[self.skip..]
    }

    fn throw_error(&mut self, message: &str) {
        self.base.throw_error(message);
    }
}
