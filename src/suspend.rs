use std::any::Any;
use std::fmt;

use crate::coroutine::Resume;
use crate::error::Failure;
use crate::event_loop::{Event, Injector};
use crate::strand::{Strand, StrandId};
use crate::value::Value;

/// The resumption handle of a manually suspended strand.
///
/// Handed to the callback of a `suspend` request. Consuming it resumes the
/// strand; if the strand moved on in the meantime (it was terminated, or
/// its kernel dropped) the resumption is silently discarded.
pub struct Suspended {
    strand: Strand,
    generation: u64,
}

impl Suspended {
    pub(crate) fn new(strand: &Strand) -> Suspended {
        Suspended {
            strand: strand.clone(),
            generation: strand.generation(),
        }
    }

    /// The suspended strand.
    pub fn strand(&self) -> &Strand {
        &self.strand
    }

    /// Resume the strand with `value`.
    pub fn resume(self, value: Value) {
        self.deliver(Resume::Value(value));
    }

    /// Resume the strand with `failure`.
    pub fn throw(self, failure: Failure) {
        self.deliver(Resume::Failure(failure));
    }

    fn deliver(self, input: Resume) {
        match self.strand.kernel() {
            Some(kernel) => kernel.wake(&self.strand, self.generation, input),
            None => debug!("{} outlived its kernel, drop resumption", self.strand.id()),
        }
    }

    /// Convert into a handle that can resume the strand from another thread.
    ///
    /// Fails, giving the token back, when the kernel's event loop has no
    /// injector.
    pub fn into_remote(self) -> Result<RemoteResumer, Suspended> {
        let injector = self.strand.kernel().and_then(|kernel| kernel.injector());
        match injector {
            Some(injector) => Ok(RemoteResumer {
                injector,
                strand: self.strand.id(),
                generation: self.generation,
            }),
            None => Err(self),
        }
    }
}

impl fmt::Debug for Suspended {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Suspended")
            .field("strand", &self.strand.id())
            .field("generation", &self.generation)
            .finish()
    }
}

/// A `Send` resumption handle, delivered through the event loop.
///
/// While it is alive the loop keeps the kernel running. Dropping it without
/// resuming leaves the strand suspended.
pub struct RemoteResumer {
    injector: Injector,
    strand: StrandId,
    generation: u64,
}

impl RemoteResumer {
    pub fn strand(&self) -> StrandId {
        self.strand
    }

    /// Resume the strand with `value`, `()` resumes with no value.
    pub fn resume<T: Any + Send>(self, value: T) {
        let event = Event::remote(self.strand, self.generation, Ok(Box::new(value)));
        self.injector.inject(event);
    }

    /// Resume the strand with a failure carrying `message`.
    pub fn fail<S: Into<String>>(self, message: S) {
        let event = Event::remote(self.strand, self.generation, Err(message.into()));
        self.injector.inject(event);
    }
}

impl fmt::Debug for RemoteResumer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RemoteResumer")
            .field("strand", &self.strand)
            .field("generation", &self.generation)
            .finish()
    }
}
