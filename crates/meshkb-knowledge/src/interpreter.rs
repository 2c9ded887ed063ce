//! Interface to the external expression interpreter.
//!
//! The engine evaluates user-supplied trigger logic (the "on data received"
//! rule) and ad hoc queries through these traits. Expressions are compiled
//! once at configuration time; the engine treats the compiled handle as an
//! opaque callback and never inspects expression internals.

use meshkb_core::error::Result;

use crate::{record::KnowledgeRecord, store::KnowledgeStore};

/// A compiled expression ready for repeated evaluation against a store.
pub trait CompiledExpression: Send {
    /// Evaluates the expression, reading (and possibly writing) knowledge
    /// through the store's public API.
    fn evaluate(&mut self, store: &KnowledgeStore) -> KnowledgeRecord;
}

/// Compiles expression text into reusable handles.
pub trait Interpreter: Send {
    /// Compiles `expression` into an evaluatable handle.
    fn compile(&self, expression: &str) -> Result<Box<dyn CompiledExpression>>;
}

impl<F> CompiledExpression for F
where
    F: FnMut(&KnowledgeStore) -> KnowledgeRecord + Send,
{
    fn evaluate(&mut self, store: &KnowledgeStore) -> KnowledgeRecord {
        self(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_as_compiled_expression() {
        let store = KnowledgeStore::new();
        store.set("x", 5);

        let mut doubled = |store: &KnowledgeStore| {
            let record = store.get("x");
            store.set(".x_doubled", match record.value {
                crate::record::KnowledgeValue::Integer(v) => v * 2,
                _ => 0,
            });
            record
        };

        let result = doubled.evaluate(&store);
        assert_eq!(result.value, crate::record::KnowledgeValue::Integer(5));
        assert_eq!(
            store.get(".x_doubled").value,
            crate::record::KnowledgeValue::Integer(10)
        );
    }
}
