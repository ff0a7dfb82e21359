use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use weft::coroutine::{from_fn, value};
use weft::{
    api, stackful, Config, Coroutine, Failure, Kernel, ProtocolViolation, Resume,
    SchedulingError, Selected, SimLoop, State, Step, Strand, Value,
};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

// sleeps for `n` ms and completes with `n`
fn sleeper(n: u64) -> impl Coroutine {
    from_fn(move |_strand, resume| match resume {
        Resume::Start => api::sleep(ms(n)),
        Resume::Value(_) => Step::Return(Value::new(n)),
        Resume::Failure(f) => Step::Throw(f),
    })
}

// completes with whatever its only request resumed it with
fn ask(request: impl Fn(&Strand) -> Step + 'static) -> impl Coroutine {
    from_fn(move |strand, resume| match resume {
        Resume::Start => request(strand),
        Resume::Value(v) => Step::Return(v),
        Resume::Failure(f) => Step::Throw(f),
    })
}

#[test]
fn sleepers_wake_in_deadline_order() {
    let order = Rc::new(RefCell::new(Vec::new()));
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    for n in [30, 10, 20] {
        let order = order.clone();
        kernel.execute(from_fn(move |_strand, resume| match resume {
            Resume::Start => api::sleep(ms(n)),
            _ => {
                order.borrow_mut().push(n);
                Step::Return(Value::none())
            }
        }));
    }
    assert!(kernel.run().is_empty());
    assert_eq!(*order.borrow(), vec![10, 20, 30]);
    assert_eq!(kernel.now(), ms(30));
}

#[test]
fn zero_sleep_resumes_on_a_later_tick() {
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let strand = kernel.execute(sleeper(0));
    kernel.tick();
    assert_eq!(strand.state(), State::Suspended);
    kernel.run();
    assert_eq!(strand.outcome().unwrap().unwrap().get::<u64>(), Some(0));
}

#[test]
fn noop_resumes_in_the_same_tick() {
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let strand = kernel.execute(ask(|_| api::noop()));
    kernel.tick();
    assert_eq!(strand.state(), State::Completed);
    assert!(strand.outcome().unwrap().unwrap().is_none());
    assert_eq!(kernel.ticks(), 1);
}

#[test]
fn cooperate_interleaves_strands() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    for name in ["a", "b"] {
        let log = log.clone();
        let mut round = 0;
        kernel.execute(from_fn(move |_strand, _resume| {
            log.borrow_mut().push(format!("{}{}", name, round));
            round += 1;
            if round == 3 {
                Step::Return(Value::none())
            } else {
                api::cooperate()
            }
        }));
    }

    kernel.tick();
    assert_eq!(*log.borrow(), vec!["a0", "b0"]);
    kernel.run();
    assert_eq!(*log.borrow(), vec!["a0", "b0", "a1", "b1", "a2", "b2"]);
    assert_eq!(kernel.ticks(), 3);
}

#[test]
fn execute_does_not_wait_for_the_child() {
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let parent = kernel.execute(ask(|_| api::execute(sleeper(10))));
    kernel.tick();

    assert_eq!(parent.state(), State::Completed);
    let child = parent.outcome().unwrap().unwrap().get::<Strand>().unwrap();
    assert_ne!(child.id(), parent.id());
    assert_eq!(child.state(), State::Suspended);

    kernel.run();
    assert_eq!(child.outcome().unwrap().unwrap().get::<u64>(), Some(10));
}

#[test]
fn current_strand() {
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let strand = kernel.execute(ask(|_| api::strand()));
    kernel.run();
    let me = strand.outcome().unwrap().unwrap().get::<Strand>();
    assert_eq!(me, Some(strand));
}

#[test]
fn return_and_throw_requests_finish_the_frame() {
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let ok = kernel.execute(ask(|_| api::return_(Value::new("done"))));
    let err = kernel.execute(ask(|_| api::throw(Failure::msg("nope"))));
    let unhandled = kernel.run();

    assert_eq!(ok.outcome().unwrap().unwrap().get::<&str>(), Some("done"));
    assert_eq!(err.state(), State::Failed);
    assert_eq!(unhandled.len(), 1);
    assert_eq!(unhandled[0].strand, err.id());
}

#[test]
fn select_returns_the_first_to_exit() {
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let children: Vec<Strand> = [30, 10, 20].iter().map(|&n| kernel.execute(sleeper(n))).collect();
    let watched = children.clone();
    let parent = kernel.execute(ask(move |_| api::select(watched.clone())));

    while !parent.has_exited() {
        kernel.tick();
    }
    assert_eq!(kernel.now(), ms(10));
    let selected = parent.outcome().unwrap().unwrap().get::<Selected>().unwrap();
    assert_eq!(selected.index, 1);
    assert_eq!(selected.outcome.unwrap().get::<u64>(), Some(10));
    // the losers keep waiting on their own timers
    assert_eq!(children[0].state(), State::Suspended);
    assert_eq!(children[2].state(), State::Suspended);

    kernel.run();
    for child in &children {
        assert_eq!(child.state(), State::Completed);
    }
    assert_eq!(kernel.now(), ms(30));
}

#[test]
fn select_tie_goes_to_the_lowest_index() {
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let first = kernel.execute(sleeper(10));
    let second = kernel.execute(sleeper(10));
    let watched = vec![second.clone(), first.clone()];
    let parent = kernel.execute(ask(move |_| api::select(watched.clone())));

    kernel.run();
    let selected = parent.outcome().unwrap().unwrap().get::<Selected>().unwrap();
    assert_eq!(selected.index, 0);
}

#[test]
fn select_on_an_exited_strand_resumes_immediately() {
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let done = kernel.execute(value(Value::new(5u8)));
    kernel.tick();
    assert!(done.has_exited());

    let pending = kernel.execute(sleeper(50));
    let watched = vec![pending.clone(), done.clone()];
    let parent = kernel.execute(ask(move |_| api::select(watched.clone())));
    kernel.tick();

    assert_eq!(parent.state(), State::Completed);
    let selected = parent.outcome().unwrap().unwrap().get::<Selected>().unwrap();
    assert_eq!(selected.index, 1);
    assert_eq!(selected.outcome.unwrap().get::<u8>(), Some(5));
}

#[test]
fn select_protocol_violations() {
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let empty = kernel.execute(ask(|_| api::select(Vec::new())));
    let itself = kernel.execute(ask(|strand| api::select(vec![strand.clone()])));
    let unhandled = kernel.run();
    assert_eq!(unhandled.len(), 2);

    match empty.outcome().unwrap() {
        Err(Failure::Protocol(ProtocolViolation::EmptySelect)) => {}
        other => panic!("unexpected outcome {:?}", other),
    }
    match itself.outcome().unwrap() {
        Err(Failure::Protocol(ProtocolViolation::SelfSelect(id))) => assert_eq!(id, itself.id()),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
#[should_panic(expected = "protocol violation")]
fn strict_mode_panics_on_violation() {
    let mut config = Config::new();
    config.set_strict(true);
    let mut kernel = Kernel::with_config(config, SimLoop::new());
    kernel.execute(ask(|_| api::select(Vec::new())));
    kernel.run();
}

struct Recurse;

impl Coroutine for Recurse {
    fn call(&mut self, _strand: &Strand) -> Step {
        Step::call(Recurse)
    }
}

#[test]
fn stack_limit_fails_the_deepest_frame() {
    let mut config = Config::new();
    config.set_stack_limit(4);
    let mut kernel = Kernel::with_config(config, SimLoop::new());
    let strand = kernel.execute(Recurse);
    let unhandled = kernel.run();

    assert_eq!(unhandled.len(), 1);
    assert_eq!(strand.depth(), 0);
    match strand.outcome().unwrap() {
        Err(Failure::Protocol(ProtocolViolation::StackOverflow { limit })) => assert_eq!(limit, 4),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn rejected_timer_fails_the_request() {
    let mut kernel = Kernel::with_event_loop(SimLoop::with_timer_limit(0));
    let strand = kernel.execute(sleeper(10));
    let unhandled = kernel.run();

    assert_eq!(unhandled.len(), 1);
    assert_eq!(unhandled[0].strand, strand.id());
    match unhandled[0].failure {
        Failure::Scheduling(SchedulingError::TimerLimit { limit: 0 }) => {}
        ref other => panic!("unexpected failure {:?}", other),
    }
}

#[test]
fn suspend_and_resume_from_another_strand() {
    let token = Rc::new(RefCell::new(None));
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let slot = token.clone();
    let waiter = kernel.execute(ask(move |_| {
        let slot = slot.clone();
        api::suspend(move |t| *slot.borrow_mut() = Some(t))
    }));
    let slot = token.clone();
    kernel.execute(from_fn(move |_strand, resume| match resume {
        Resume::Start => api::sleep(ms(5)),
        _ => {
            if let Some(t) = slot.borrow_mut().take() {
                t.resume(Value::new("wake up"));
            }
            Step::Return(Value::none())
        }
    }));

    kernel.tick();
    assert_eq!(waiter.state(), State::Suspended);
    kernel.run();
    let value = waiter.outcome().unwrap().unwrap();
    assert_eq!(value.get::<&str>(), Some("wake up"));
    assert_eq!(kernel.now(), ms(5));
}

#[test]
fn suspend_callback_may_resume_right_away() {
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let strand = kernel.execute(ask(|_| api::suspend(|t| t.throw(Failure::msg("at once")))));
    let unhandled = kernel.run();
    assert_eq!(kernel.ticks(), 1);
    assert_eq!(unhandled.len(), 1);
    assert_eq!(strand.outcome().unwrap().unwrap_err().to_string(), "at once");
}

#[test]
fn terminate_from_suspend_callback() {
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let strand = kernel.execute(ask(|_| {
        api::suspend(|t| {
            let strand = t.strand().clone();
            drop(t);
            strand.terminate();
        })
    }));
    kernel.run();
    assert_eq!(strand.state(), State::Terminated);
}

#[test]
fn stackful_coroutine() {
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let strand = kernel.execute(stackful!(|mut s| {
        let mut total = 0u64;
        for n in [5u64, 7] {
            if let Some(Resume::Value(v)) = s.yield_(api::sleep(ms(n))) {
                assert!(v.is_none());
            }
            total += n;
        }
        match s.yield_(Step::call(value(Value::new(30u64)))) {
            Some(Resume::Value(v)) => total += v.get::<u64>().unwrap_or(0),
            _ => return Step::Throw(Failure::msg("lost value")),
        }
        Step::Return(Value::new(total))
    }));
    assert!(kernel.run().is_empty());
    assert_eq!(kernel.now(), ms(12));
    assert_eq!(strand.outcome().unwrap().unwrap().get::<u64>(), Some(42));
}

#[test]
fn terminated_stackful_coroutine_unwinds() {
    struct Guard(Rc<Cell<bool>>);
    impl Drop for Guard {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    let dropped = Rc::new(Cell::new(false));
    let flag = dropped.clone();
    let mut kernel = Kernel::with_event_loop(SimLoop::new());
    let strand = kernel.execute(stackful!(move |mut s| {
        let _guard = Guard(flag);
        s.yield_(api::sleep(ms(100)));
        Step::Return(Value::none())
    }));
    kernel.tick();
    assert!(!dropped.get());

    strand.terminate();
    assert!(dropped.get());
    assert_eq!(strand.state(), State::Terminated);
}
