use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use slab::Slab;

use tether_engine::{
    ExternId, Finalizer, Invocation, NativeCallback, ScriptEngine, ScriptException,
};

use crate::SandboxValue;

/// Deterministic reference engine.
///
/// Interior state sits behind one mutex, but the lock is never held while a
/// native callback or finalizer runs, so callbacks may re-enter the engine
/// freely. Script dispatch is expected to stay on one thread, matching the
/// non-reentrant single-threaded model of real embeddings.
pub struct SandboxEngine {
    space: Mutex<Space>,
}

#[derive(Default)]
struct Space {
    cells: Slab<Cell>,
}

enum Cell {
    External(ExternalCell),
    Record(RecordCell),
    Function(FunctionCell),
}

struct ExternalCell {
    id: ExternId,
    /// Present once the native handle was demoted to a weak reference.
    finalizer: Option<Finalizer>,
    roots: usize,
}

struct RecordCell {
    flags: HashSet<String>,
    roots: usize,
}

struct FunctionCell {
    kind: FunctionKind,
    roots: usize,
}

enum FunctionKind {
    Native(NativeCallback<SandboxEngine>),
    /// Partial application produced by `bind`.
    Bound {
        target: SandboxValue,
        extras: Vec<SandboxValue>,
    },
}

impl Cell {
    fn roots(&self) -> usize {
        match self {
            Cell::External(cell) => cell.roots,
            Cell::Record(cell) => cell.roots,
            Cell::Function(cell) => cell.roots,
        }
    }

    fn roots_mut(&mut self) -> &mut usize {
        match self {
            Cell::External(cell) => &mut cell.roots,
            Cell::Record(cell) => &mut cell.roots,
            Cell::Function(cell) => &mut cell.roots,
        }
    }
}

/// Slab key of a heap-backed value, if any.
fn value_key(value: &SandboxValue) -> Option<usize> {
    match value {
        SandboxValue::External(key) | SandboxValue::Record(key) | SandboxValue::Function(key) => {
            Some(*key)
        }
        _ => None,
    }
}

impl SandboxEngine {
    pub fn new() -> Self {
        SandboxEngine {
            space: Mutex::new(Space::default()),
        }
    }

    /// Drop the native root of `value`, leaving only engine-internal
    /// references. Models handing a value to script and forgetting it.
    pub fn release(&self, value: &SandboxValue) {
        let mut space = self.space.lock();
        if let Some(cell) = value_key(value).and_then(|key| space.cells.get_mut(key)) {
            let roots = cell.roots_mut();
            *roots = roots.saturating_sub(1);
        }
    }

    /// Number of live heap cells.
    pub fn live_cells(&self) -> usize {
        self.space.lock().cells.len()
    }

    /// Run one full collection cycle: trace from rooted cells, free every
    /// unreachable cell, then run the weak finalizers of collected externals.
    pub fn collect(&self) {
        let mut finalizers: Vec<Finalizer> = Vec::new();
        {
            let mut space = self.space.lock();
            let mut marked: HashSet<usize> = HashSet::new();
            let mut pending: Vec<usize> = space
                .cells
                .iter()
                .filter(|(_, cell)| cell.roots() > 0)
                .map(|(key, _)| key)
                .collect();
            while let Some(key) = pending.pop() {
                if !marked.insert(key) {
                    continue;
                }
                if let Some(Cell::Function(cell)) = space.cells.get(key) {
                    if let FunctionKind::Bound { target, extras } = &cell.kind {
                        pending.extend(value_key(target));
                        pending.extend(extras.iter().filter_map(value_key));
                    }
                }
            }

            let dead: Vec<usize> = space
                .cells
                .iter()
                .map(|(key, _)| key)
                .filter(|key| !marked.contains(key))
                .collect();
            for key in dead {
                if let Some(Cell::External(mut cell)) = space.cells.try_remove(key) {
                    if let Some(finalizer) = cell.finalizer.take() {
                        finalizers.push(finalizer);
                    }
                }
            }
        }
        log::debug!("collection cycle ran {} weak finalizer(s)", finalizers.len());
        // Finalizers run after the sweep, outside the space lock, so they may
        // re-enter the engine.
        for finalizer in finalizers {
            finalizer();
        }
    }
}

impl Default for SandboxEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngine for SandboxEngine {
    type Value = SandboxValue;

    fn new_external(&self, id: ExternId) -> SandboxValue {
        let key = self.space.lock().cells.insert(Cell::External(ExternalCell {
            id,
            finalizer: None,
            roots: 1,
        }));
        SandboxValue::External(key)
    }

    fn external_id(&self, value: &SandboxValue) -> Option<ExternId> {
        let SandboxValue::External(key) = value else {
            return None;
        };
        match self.space.lock().cells.get(*key) {
            Some(Cell::External(cell)) => Some(cell.id),
            _ => None,
        }
    }

    fn set_weak(&self, value: &SandboxValue, finalizer: Finalizer) {
        let mut space = self.space.lock();
        let cell = match value {
            SandboxValue::External(key) => space.cells.get_mut(*key),
            _ => None,
        };
        let Some(Cell::External(cell)) = cell else {
            panic!("set_weak requires a live external value");
        };
        cell.finalizer = Some(finalizer);
        // A weak native handle no longer roots the cell.
        cell.roots = cell.roots.saturating_sub(1);
    }

    fn new_record(&self) -> SandboxValue {
        let key = self.space.lock().cells.insert(Cell::Record(RecordCell {
            flags: HashSet::new(),
            roots: 1,
        }));
        SandboxValue::Record(key)
    }

    fn record_flag(&self, record: &SandboxValue, flag: &str) -> bool {
        let SandboxValue::Record(key) = record else {
            return false;
        };
        match self.space.lock().cells.get(*key) {
            Some(Cell::Record(cell)) => cell.flags.contains(flag),
            _ => false,
        }
    }

    fn set_record_flag(&self, record: &SandboxValue, flag: &str) {
        let mut space = self.space.lock();
        let cell = match record {
            SandboxValue::Record(key) => space.cells.get_mut(*key),
            _ => None,
        };
        let Some(Cell::Record(cell)) = cell else {
            panic!("set_record_flag requires a live record value");
        };
        cell.flags.insert(flag.to_owned());
    }

    fn new_function(&self, callback: NativeCallback<Self>) -> SandboxValue {
        let key = self.space.lock().cells.insert(Cell::Function(FunctionCell {
            kind: FunctionKind::Native(callback),
            roots: 1,
        }));
        SandboxValue::Function(key)
    }

    fn bind(&self, target: &SandboxValue, extras: &[SandboxValue]) -> Option<SandboxValue> {
        let mut space = self.space.lock();
        match target {
            SandboxValue::Function(key)
                if matches!(space.cells.get(*key), Some(Cell::Function(_))) =>
            {
                let cell = Cell::Function(FunctionCell {
                    kind: FunctionKind::Bound {
                        target: target.clone(),
                        extras: extras.to_vec(),
                    },
                    roots: 1,
                });
                Some(SandboxValue::Function(space.cells.insert(cell)))
            }
            _ => None,
        }
    }

    fn call(
        &self,
        target: &SandboxValue,
        args: &[SandboxValue],
    ) -> Result<SandboxValue, ScriptException> {
        // Flatten the bind chain down to the underlying native callback while
        // holding the lock, then dispatch without it so the callback can
        // re-enter the engine.
        let (callback, full_args) = {
            let space = self.space.lock();
            let mut current = target.clone();
            let mut prefix: Vec<SandboxValue> = Vec::new();
            loop {
                let SandboxValue::Function(key) = current else {
                    return Err(ScriptException::new("value is not callable"));
                };
                match space.cells.get(key) {
                    Some(Cell::Function(cell)) => match &cell.kind {
                        FunctionKind::Native(callback) => {
                            let mut full = prefix;
                            full.extend_from_slice(args);
                            break (Arc::clone(callback), full);
                        }
                        FunctionKind::Bound { target, extras } => {
                            let mut combined = extras.clone();
                            combined.append(&mut prefix);
                            prefix = combined;
                            current = target.clone();
                        }
                    },
                    _ => return Err(ScriptException::new("value is not callable")),
                }
            }
        };

        let mut scope = CallScope {
            engine: self,
            args: full_args,
            pending: None,
        };
        (callback)(&mut scope);
        match scope.pending {
            Some(message) => Err(ScriptException::new(message)),
            None => Ok(SandboxValue::Undefined),
        }
    }
}

/// Scope handed to a native callback for one dispatch.
struct CallScope<'a> {
    engine: &'a SandboxEngine,
    args: Vec<SandboxValue>,
    pending: Option<String>,
}

impl<'a> Invocation<SandboxEngine> for CallScope<'a> {
    fn engine(&self) -> &SandboxEngine {
        self.engine
    }

    fn args(&self) -> &[SandboxValue] {
        &self.args
    }

    fn throw_error(&mut self, message: &str) {
        // First throw wins; script dispatch is non-reentrant.
        if self.pending.is_none() {
            self.pending = Some(message.to_owned());
        }
    }
}
