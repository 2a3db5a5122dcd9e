//! A bounded table of methods, addressable by `method_id`, shared
//! identically by client and server. No schema evolution or negotiation.

use crate::error::ProtoError;
use crate::method::Method;

pub const MAX_METHODS: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct Interface {
    methods: Vec<Method>,
}

impl Interface {
    #[must_use]
    pub fn new() -> Self {
        Self { methods: Vec::new() }
    }

    /// Registers `method`.
    ///
    /// # Panics
    /// Panics if the table already holds [`MAX_METHODS`] entries or if
    /// `method`'s id collides with an existing one — both caller bugs, since
    /// interfaces are built once at startup from a fixed schema.
    pub fn register(&mut self, method: Method) {
        assert!(self.methods.len() < MAX_METHODS, "interface cannot exceed 256 methods");
        assert!(
            self.methods.iter().all(|m| m.method_id() != method.method_id()),
            "duplicate method id {}",
            method.method_id()
        );
        self.methods.push(method);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn find(&self, method_id: u8) -> Result<&Method, ProtoError> {
        self.methods
            .iter()
            .find(|m| m.method_id() == method_id)
            .ok_or(ProtoError::UnknownMethod(method_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamKind;

    #[test]
    fn find_resolves_registered_method() {
        let mut iface = Interface::new();
        iface.register(Method::new(1, vec![], vec![ParamKind::U32]));
        iface.register(Method::new(2, vec![], vec![]));
        assert_eq!(iface.find(2).unwrap().method_id(), 2);
        assert!(matches!(iface.find(9), Err(ProtoError::UnknownMethod(9))));
    }

    #[test]
    #[should_panic(expected = "duplicate method id")]
    fn duplicate_method_id_panics() {
        let mut iface = Interface::new();
        iface.register(Method::new(1, vec![], vec![]));
        iface.register(Method::new(1, vec![], vec![]));
    }
}
