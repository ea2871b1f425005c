use tether_engine::ScriptEngine;

/// `target.bind(external, state)`: produce a callable that invokes `target`
/// with the two fixed values ahead of the caller's own arguments, in that
/// order.
///
/// Panics when the engine cannot bind `target`. A missing bind facility
/// signals a misconfigured engine environment, not a recoverable runtime
/// condition.
pub fn bind_with_state<E: ScriptEngine>(
    engine: &E,
    target: &E::Value,
    external: &E::Value,
    state: &E::Value,
) -> E::Value {
    engine
        .bind(target, &[external.clone(), state.clone()])
        .expect("engine cannot bind the dispatcher template")
}
