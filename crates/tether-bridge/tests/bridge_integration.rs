// Integration tests driving the bridge end to end against the sandbox
// engine: one-time enforcement, repeatable invocation, GC-driven cleanup,
// double-free protection and bind ordering.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use tether_bridge::{bind_with_state, CallbackRegistry, Translater};
use tether_engine::{Invocation, ScriptEngine};
use tether_sandbox::{SandboxEngine, SandboxValue};

fn logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Increments a counter on drop; stands in for the native payload a
/// translater's closure owns.
struct Payload(Arc<AtomicUsize>);

impl Drop for Payload {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn one_time_callable_runs_exactly_once() {
    logging();
    let engine = SandboxEngine::new();
    let registry = CallbackRegistry::new();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let translater = Translater::new(move |_scope: &mut dyn Invocation<SandboxEngine>| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let bridged = registry.create_bridged_callable(&engine, translater, true);

    engine.call(&bridged, &[]).expect("first call succeeds");
    let second = engine.call(&bridged, &[]);

    assert_eq!(calls.load(Ordering::SeqCst), 1, "native callable ran exactly once");
    let err = second.expect_err("second invocation must throw");
    assert_eq!(err.message, "callback can only be called for once");
    assert_eq!(
        registry.live_holders(),
        0,
        "one-time holder is consumed immediately after the first call"
    );
}

#[test]
fn repeatable_callable_runs_in_call_order() {
    logging();
    let engine = SandboxEngine::new();
    let registry = CallbackRegistry::new();

    let seen: Arc<Mutex<Vec<SandboxValue>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let translater = Translater::new(move |scope: &mut dyn Invocation<SandboxEngine>| {
        sink.lock().extend_from_slice(scope.args());
    });
    let bridged = registry.create_bridged_callable(&engine, translater, false);

    for i in 0..5 {
        engine
            .call(&bridged, &[SandboxValue::Int(i)])
            .expect("repeatable callable never throws");
    }

    let expected: Vec<SandboxValue> = (0..5).map(SandboxValue::Int).collect();
    assert_eq!(*seen.lock(), expected, "invocations observed in call order");
    assert_eq!(registry.live_holders(), 1, "repeatable holder stays alive");
}

#[test]
fn translater_sees_only_the_caller_arguments() {
    logging();
    let engine = SandboxEngine::new();
    let registry = CallbackRegistry::new();

    let seen: Arc<Mutex<Vec<SandboxValue>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let translater = Translater::new(move |scope: &mut dyn Invocation<SandboxEngine>| {
        sink.lock().extend_from_slice(scope.args());
    });
    let bridged = registry.create_bridged_callable(&engine, translater, false);

    engine
        .call(&bridged, &[SandboxValue::Str("x".into()), SandboxValue::Bool(true)])
        .unwrap();

    // The bound external and state record never leak through.
    assert_eq!(
        *seen.lock(),
        vec![SandboxValue::Str("x".into()), SandboxValue::Bool(true)]
    );
}

#[test]
fn collection_releases_an_unreachable_payload() {
    logging();
    let engine = SandboxEngine::new();
    let registry = CallbackRegistry::new();

    let dropped = Arc::new(AtomicUsize::new(0));
    let payload = Payload(Arc::clone(&dropped));
    let translater = Translater::new(move |_scope: &mut dyn Invocation<SandboxEngine>| {
        let _keep = &payload;
    });
    let bridged = registry.create_bridged_callable(&engine, translater, false);

    engine.call(&bridged, &[]).unwrap();
    engine.collect();
    assert_eq!(
        dropped.load(Ordering::SeqCst),
        0,
        "a reachable bridged callable keeps its payload"
    );

    engine.release(&bridged);
    engine.collect();
    assert_eq!(dropped.load(Ordering::SeqCst), 1, "payload released after collection");
    assert_eq!(registry.live_holders(), 0);
}

#[test]
fn one_time_payload_is_freed_exactly_once_consumption_first() {
    logging();
    let engine = SandboxEngine::new();
    let registry = CallbackRegistry::new();

    let dropped = Arc::new(AtomicUsize::new(0));
    let payload = Payload(Arc::clone(&dropped));
    let translater = Translater::new(move |_scope: &mut dyn Invocation<SandboxEngine>| {
        let _keep = &payload;
    });
    let bridged = registry.create_bridged_callable(&engine, translater, true);

    // Consumption disposes the holder, then the collector finalizes the
    // now-unreachable external. The finalizer must find nothing to do.
    engine.call(&bridged, &[]).unwrap();
    assert_eq!(dropped.load(Ordering::SeqCst), 1, "consumption frees the payload");

    engine.release(&bridged);
    engine.collect();
    assert_eq!(dropped.load(Ordering::SeqCst), 1, "the destructor never runs twice");
}

#[test]
fn one_time_payload_is_freed_exactly_once_collection_first() {
    logging();
    let engine = SandboxEngine::new();
    let registry = CallbackRegistry::new();

    let dropped = Arc::new(AtomicUsize::new(0));
    let payload = Payload(Arc::clone(&dropped));
    let translater = Translater::new(move |_scope: &mut dyn Invocation<SandboxEngine>| {
        let _keep = &payload;
    });
    let bridged = registry.create_bridged_callable(&engine, translater, true);

    // The callable is never invoked; the collector runs the weak finalizer.
    engine.release(&bridged);
    engine.collect();
    assert_eq!(dropped.load(Ordering::SeqCst), 1, "finalizer frees the payload");
    assert_eq!(registry.live_holders(), 0);

    engine.collect();
    assert_eq!(dropped.load(Ordering::SeqCst), 1, "the destructor never runs twice");
}

#[test]
fn late_collection_of_a_consumed_callable_spares_its_successor() {
    logging();
    let engine = SandboxEngine::new();
    let registry = CallbackRegistry::new();

    // Consume a one-time callable so its arena slot is freed while its
    // bound value (and pending weak finalizer) still exist in the engine.
    let noop = Translater::new(|_scope: &mut dyn Invocation<SandboxEngine>| {});
    let consumed = registry.create_bridged_callable(&engine, noop, true);
    engine.call(&consumed, &[]).unwrap();
    assert_eq!(registry.live_holders(), 0);

    // The next holder lands in the freed slot.
    let dropped = Arc::new(AtomicUsize::new(0));
    let payload = Payload(Arc::clone(&dropped));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let translater = Translater::new(move |_scope: &mut dyn Invocation<SandboxEngine>| {
        let _keep = &payload;
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let successor = registry.create_bridged_callable(&engine, translater, false);
    assert_eq!(registry.live_holders(), 1);

    // Collecting the consumed callable fires its stale finalizer. That
    // finalizer must not reach the holder now occupying the slot.
    engine.release(&consumed);
    engine.collect();
    assert_eq!(registry.live_holders(), 1, "the live holder survives the stale finalizer");
    assert_eq!(dropped.load(Ordering::SeqCst), 0, "the live payload was not freed");

    engine.call(&successor, &[]).expect("the live callable still dispatches");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn bound_value_prepends_extras_in_order() {
    logging();
    let engine = SandboxEngine::new();

    let seen: Arc<Mutex<Vec<SandboxValue>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let target = engine.new_function(Arc::new(
        move |scope: &mut dyn Invocation<SandboxEngine>| {
            sink.lock().extend_from_slice(scope.args());
        },
    ));

    let bound = bind_with_state(&engine, &target, &SandboxValue::Int(1), &SandboxValue::Int(2));
    engine
        .call(&bound, &[SandboxValue::Int(3), SandboxValue::Int(4)])
        .unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            SandboxValue::Int(1),
            SandboxValue::Int(2),
            SandboxValue::Int(3),
            SandboxValue::Int(4)
        ],
        "extras come first, caller arguments follow in their original order"
    );
}

#[test]
fn one_time_scenario_keeps_the_log_stable() {
    logging();
    let engine = SandboxEngine::new();
    let registry = CallbackRegistry::new();

    let called_log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&called_log);
    let translater = Translater::new(move |_scope: &mut dyn Invocation<SandboxEngine>| {
        sink.lock().push("called");
    });
    let bridged = registry.create_bridged_callable(&engine, translater, true);

    engine.call(&bridged, &[]).expect("first call returns normally");
    assert_eq!(*called_log.lock(), vec!["called"]);

    let err = engine.call(&bridged, &[]).expect_err("reuse violation");
    assert_eq!(err.message, "callback can only be called for once");
    assert_eq!(*called_log.lock(), vec!["called"], "the log did not grow");
}

#[test]
fn translater_errors_reach_the_script_caller() {
    logging();
    let engine = SandboxEngine::new();
    let registry = CallbackRegistry::new();

    let translater = Translater::new(|scope: &mut dyn Invocation<SandboxEngine>| {
        scope.throw_error("native refused");
    });
    let bridged = registry.create_bridged_callable(&engine, translater, false);

    let err = engine.call(&bridged, &[]).expect_err("throw must surface");
    assert_eq!(err.message, "native refused");
}

#[test]
fn bridged_callables_share_one_dispatcher_template() {
    logging();
    let engine = SandboxEngine::new();
    let registry = CallbackRegistry::new();

    let before = engine.live_cells();
    let noop = Translater::new(|_scope: &mut dyn Invocation<SandboxEngine>| {});
    let _first = registry.create_bridged_callable(&engine, noop.clone(), false);
    let after_first = engine.live_cells();
    let _second = registry.create_bridged_callable(&engine, noop, false);
    let after_second = engine.live_cells();

    // First bridge: dispatcher + external + state + bound. Second bridge
    // reuses the cached dispatcher, so it allocates one cell fewer.
    assert_eq!(after_first - before, 4);
    assert_eq!(after_second - after_first, 3, "dispatcher template is cached");
}
