use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use weft::coroutine::from_fn;
use weft::{api, Coroutine, Failure, Kernel, Resume, Selected, SimLoop, State, Step, Strand, Value};

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

// records every hook, calls `inner` if any, otherwise sleeps
struct Probe {
    name: &'static str,
    log: Log,
    inner: Option<Box<dyn Coroutine>>,
}

impl Probe {
    fn leaf(name: &'static str, log: &Log) -> Probe {
        Probe {
            name,
            log: log.clone(),
            inner: None,
        }
    }

    fn wrap<C: Coroutine + 'static>(name: &'static str, log: &Log, inner: C) -> Probe {
        Probe {
            name,
            log: log.clone(),
            inner: Some(Box::new(inner)),
        }
    }

    fn record(&self, hook: &str) {
        self.log.borrow_mut().push(format!("{} {}", hook, self.name));
    }
}

impl Coroutine for Probe {
    fn initialize(&mut self, _strand: &Strand) {
        self.record("init");
    }

    fn call(&mut self, _strand: &Strand) -> Step {
        self.record("call");
        match self.inner.take() {
            Some(inner) => Step::Call(inner),
            None => api::sleep(Duration::from_millis(10)),
        }
    }

    fn resume_with_value(&mut self, _strand: &Strand, value: Value) -> Step {
        self.record("resume");
        Step::Return(value)
    }

    fn terminate(&mut self, _strand: &Strand) {
        self.record("terminate");
    }

    fn finalize(&mut self, _strand: &Strand) {
        self.record("finalize");
    }
}

fn three_deep(log: &Log) -> Probe {
    Probe::wrap("a", log, Probe::wrap("b", log, Probe::leaf("c", log)))
}

#[test]
fn nested_frames_complete_in_order() {
    let log = log();
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let strand = kernel.execute(three_deep(&log));

    kernel.tick();
    assert_eq!(strand.state(), State::Suspended);
    assert_eq!(strand.depth(), 3);

    assert!(kernel.run().is_empty());
    assert_eq!(strand.state(), State::Completed);
    assert_eq!(strand.depth(), 0);
    assert_eq!(
        *log.borrow(),
        vec![
            "init a",
            "call a",
            "init b",
            "call b",
            "init c",
            "call c",
            "resume c",
            "finalize c",
            "resume b",
            "finalize b",
            "resume a",
            "finalize a",
        ]
    );
}

#[test]
fn terminate_unwinds_innermost_first() {
    let log = log();
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let target = kernel.execute(three_deep(&log));
    let t = target.clone();
    let watcher = kernel.execute(from_fn(move |_strand, resume| match resume {
        Resume::Start => api::select(vec![t.clone()]),
        Resume::Value(v) => Step::Return(v),
        Resume::Failure(f) => Step::Throw(f),
    }));

    kernel.tick();
    log.borrow_mut().clear();
    target.terminate();

    assert_eq!(target.state(), State::Terminated);
    assert!(target.outcome().unwrap().unwrap_err().is_cancelled());
    assert_eq!(
        *log.borrow(),
        vec![
            "terminate c",
            "terminate b",
            "terminate a",
            "finalize c",
            "finalize b",
            "finalize a",
        ]
    );

    // a terminated strand is not an unhandled failure
    assert!(kernel.run().is_empty());
    let value = watcher.outcome().unwrap().unwrap();
    let selected = value.get::<Selected>().unwrap();
    assert_eq!(selected.index, 0);
    assert!(selected.outcome.unwrap_err().is_cancelled());
    // the sleep timer was released with the strand
    assert_eq!(kernel.now(), Duration::ZERO);
}

#[test]
fn terminate_is_idempotent() {
    let log = log();
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let strand = kernel.execute(Probe::leaf("a", &log));
    kernel.tick();
    strand.terminate();
    strand.terminate();
    assert_eq!(
        log.borrow().iter().filter(|l| l.starts_with("finalize")).count(),
        1
    );
}

#[test]
fn terminate_request_from_nested_frame() {
    let log = log();
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let inner = from_fn(|_strand, _resume| api::terminate());
    let strand = kernel.execute(Probe::wrap("a", &log, inner));
    assert!(kernel.run().is_empty());

    assert_eq!(strand.state(), State::Terminated);
    assert_eq!(
        *log.borrow(),
        vec!["init a", "call a", "terminate a", "finalize a"]
    );
}

#[test]
fn terminate_self_through_handle() {
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let strand = kernel.execute(from_fn(|strand, _resume| {
        strand.terminate();
        Step::Return(Value::new(1))
    }));
    kernel.run();
    assert_eq!(strand.state(), State::Terminated);
    assert!(strand.outcome().unwrap().unwrap_err().is_cancelled());
}

#[test]
fn unstarted_strand_terminates_without_hooks() {
    let log = log();
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let strand = kernel.execute(Probe::leaf("a", &log));
    assert_eq!(strand.state(), State::Pending);
    strand.terminate();
    assert_eq!(strand.state(), State::Terminated);
    assert!(log.borrow().is_empty());
    kernel.run();
    assert!(log.borrow().is_empty());
}

// swallows its first failure, lets everything after it through
struct Middle {
    handled: bool,
}

impl Coroutine for Middle {
    fn call(&mut self, _strand: &Strand) -> Step {
        Step::call(weft::coroutine::failure(Failure::msg("ignored")))
    }

    fn resume_with_failure(&mut self, _strand: &Strand, failure: Failure) -> Step {
        if self.handled {
            return Step::Throw(failure);
        }
        self.handled = true;
        Step::call(from_fn(|_strand, _resume| Step::Throw(Failure::msg("deep"))))
    }
}

#[test]
fn failure_propagates_until_handled() {
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let strand = kernel.execute(from_fn(|_strand, resume| match resume {
        Resume::Start => Step::call(Middle { handled: false }),
        Resume::Failure(f) => Step::Return(Value::new(format!("caught {}", f))),
        Resume::Value(_) => Step::Return(Value::none()),
    }));
    assert!(kernel.run().is_empty());
    let value = strand.outcome().unwrap().unwrap();
    assert_eq!(value.get::<String>().as_deref(), Some("caught deep"));
}

#[test]
fn unhandled_failure_is_reported() {
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let strand = kernel.execute(weft::coroutine::failure(Failure::msg("lost")));
    let unhandled = kernel.run();
    assert_eq!(unhandled.len(), 1);
    assert_eq!(unhandled[0].strand, strand.id());
    assert_eq!(unhandled[0].failure.to_string(), "lost");
    assert_eq!(strand.state(), State::Failed);
    assert!(kernel.take_unhandled().is_empty());
}

#[test]
fn dropping_the_kernel_terminates_live_strands() {
    let log = log();
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let strand = kernel.execute(Probe::leaf("a", &log));
    kernel.tick();
    drop(kernel);
    assert_eq!(strand.state(), State::Terminated);
    assert_eq!(
        *log.borrow(),
        vec!["init a", "call a", "terminate a", "finalize a"]
    );
}
