use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// A type-erased value passed between frames.
///
/// Values are cheap to clone: every awaiter of a strand observes the same
/// payload. An empty value stands for "no payload".
#[derive(Clone, Default)]
pub struct Value(Option<Rc<dyn Any>>);

impl Value {
    /// The empty value.
    pub fn none() -> Value {
        Value(None)
    }

    /// Wrap `value`.
    pub fn new<T: Any>(value: T) -> Value {
        Value(Some(Rc::new(value)))
    }

    // payloads crossing threads arrive boxed; a unit payload means no value
    pub(crate) fn from_send(value: Box<dyn Any + Send>) -> Value {
        if value.is::<()>() {
            return Value::none();
        }
        let value: Box<dyn Any> = value;
        Value(Some(Rc::from(value)))
    }

    /// Returns true if the value carries no payload.
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Returns true if the payload is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }

    /// Borrow the payload as a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref()?.downcast_ref::<T>()
    }

    /// Clone the payload out as a `T`.
    pub fn get<T: Any + Clone>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Value(..)"),
            None => f.write_str("Value(none)"),
        }
    }
}
