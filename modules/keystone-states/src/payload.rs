use std::any::Any;
use std::fmt;

/// Opaque data handed to a state's `enter`.
///
/// States downcast to the shape they expect and ignore anything else.
pub struct StatePayload(Box<dyn Any + Send>);

impl StatePayload {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Take the value out, or get the payload back if it holds something else.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        self.0.downcast::<T>().map(|b| *b).map_err(Self)
    }
}

impl fmt::Debug for StatePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StatePayload(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Level(u32);

    #[test]
    fn downcast_to_expected_shape() {
        let payload = StatePayload::new(Level(3));
        assert!(payload.is::<Level>());
        assert_eq!(payload.downcast_ref::<Level>(), Some(&Level(3)));
        assert_eq!(payload.downcast::<Level>().unwrap(), Level(3));
    }

    #[test]
    fn mismatched_shape_is_returned_intact() {
        let payload = StatePayload::new("menu");
        assert!(payload.downcast_ref::<Level>().is_none());
        let back = payload.downcast::<Level>().unwrap_err();
        assert_eq!(back.downcast_ref::<&str>(), Some(&"menu"));
    }
}
