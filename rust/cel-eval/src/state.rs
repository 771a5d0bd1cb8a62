//! Per-evaluation state sidecar.
//!
//! Written only when the `track_state` or `exhaustive_eval` decorators are
//! installed. Owned by a single eval call; `reset()` between reuses.

use cel_core::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Intermediate results keyed by AST node id.
#[derive(Debug, Default)]
pub struct EvalState {
    entries: RefCell<HashMap<i64, Value>>,
}

impl EvalState {
    pub fn new() -> Rc<EvalState> {
        Rc::new(EvalState::default())
    }

    pub fn set(&self, id: i64, value: Value) {
        self.entries.borrow_mut().insert(id, value);
    }

    pub fn value(&self, id: i64) -> Option<Value> {
        self.entries.borrow().get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.entries.borrow().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn reset(&self) {
        self.entries.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_reset() {
        let state = EvalState::new();
        state.set(3, Value::Int(7));
        state.set(1, Value::Bool(true));
        assert_eq!(state.value(3), Some(Value::Int(7)));
        assert_eq!(state.ids(), vec![1, 3]);
        state.reset();
        assert_eq!(state.value(3), None);
        assert!(state.ids().is_empty());
    }
}
