use generator::{Gn, LocalGenerator, Scope};

use crate::coroutine::{Coroutine, Resume, Step};
use crate::error::Failure;
use crate::strand::Strand;
use crate::value::Value;

/// The yield handle a stackful coroutine body receives.
pub struct Yielder<'s, 'a> {
    scope: Scope<'s, 'a, Resume, Step>,
}

impl Yielder<'_, '_> {
    /// Hand `step` to the strand and wait for its input.
    ///
    /// Returns `None` only if the generator was resumed without an input.
    pub fn yield_(&mut self, step: Step) -> Option<Resume> {
        self.scope.yield_with(step);
        self.scope.get_yield()
    }
}

/// A coroutine backed by a stackful generator.
///
/// The body yields [`Step`]s through its [`Yielder`] and receives the
/// [`Resume`] input of each one back; the value it returns is its final
/// step. Build it with [`stackful`] or the [`stackful!`](crate::stackful!)
/// macro.
///
/// Terminating the frame drops the generator, which unwinds its stack.
pub struct Stackful {
    gen: Option<LocalGenerator<'static, Resume, Step>>,
}

/// build a stackful coroutine running `f` on its own stack
pub fn stackful<F>(f: F) -> Stackful
where
    F: for<'s, 'a> FnOnce(Yielder<'s, 'a>) -> Step + 'static,
{
    let gen = Gn::<Resume>::new_scoped_local(move |scope| f(Yielder { scope }));
    Stackful { gen: Some(gen) }
}

impl Stackful {
    fn send(&mut self, input: Resume) -> Step {
        let step = match self.gen.as_mut() {
            Some(gen) if !gen.is_done() => gen.raw_send(Some(input.clone())),
            _ => None,
        };
        // a finished generator behaves like a plain coroutine
        step.unwrap_or_else(|| match input.into_result() {
            Ok(value) => Step::Return(value),
            Err(failure) => Step::Throw(failure),
        })
    }
}

impl Coroutine for Stackful {
    fn call(&mut self, _strand: &Strand) -> Step {
        match self.gen.as_mut().and_then(|gen| gen.resume()) {
            Some(step) => step,
            None => Step::Return(Value::none()),
        }
    }

    fn resume_with_value(&mut self, _strand: &Strand, value: Value) -> Step {
        self.send(Resume::Value(value))
    }

    fn resume_with_failure(&mut self, _strand: &Strand, failure: Failure) -> Step {
        self.send(Resume::Failure(failure))
    }

    fn terminate(&mut self, strand: &Strand) {
        if let Some(gen) = self.gen.take() {
            if !gen.is_done() {
                trace!("{} unwind stackful frame", strand.id());
            }
        }
    }
}
