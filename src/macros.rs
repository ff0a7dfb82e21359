/// macro used to build a stackful coroutine
///
/// the closure receives a [`Yielder`], `yield_` a [`Step`] to hand it to the
/// strand and get its [`Resume`] input back. the value the closure returns
/// is the last step of the coroutine, usually a `Step::Return`.
///
/// [`Step`]: coroutine/enum.Step.html
/// [`Resume`]: coroutine/enum.Resume.html
/// [`Yielder`]: coroutine/struct.Yielder.html
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use weft::coroutine::Step;
/// use weft::{api, stackful, Kernel, SimLoop, Value};
///
/// let mut kernel = Kernel::with_event_loop(SimLoop::new());
/// let strand = kernel.execute(stackful!(|mut s| {
///     s.yield_(api::sleep(Duration::from_millis(5)));
///     s.yield_(api::sleep(Duration::from_millis(5)));
///     Step::Return(Value::new(2u32))
/// }));
/// kernel.run();
/// assert_eq!(kernel.now(), Duration::from_millis(10));
/// assert_eq!(strand.outcome().unwrap().unwrap().get::<u32>(), Some(2));
/// ```
#[macro_export]
macro_rules! stackful {
    ($func:expr) => {{
        $crate::coroutine::stackful($func)
    }};
}
