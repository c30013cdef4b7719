// baton/src/tests.rs
//
//! Unit tests.

use crate::context::BindableContext;
use crate::engine::{EngineBridge, SizeReport};
use crate::error::Error;
use crate::handoff::ContextHandoff;

use euclid::default::Size2D;
use serial_test::serial;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Stand-in for a windowing toolkit context that records what was done to it.
#[derive(Default)]
struct MockContext {
    current: bool,
    fail_make_current: bool,
    times_current: u32,
    times_detached: u32,
    times_swapped: u32,
}

impl BindableContext for MockContext {
    fn make_current(&mut self) -> Result<(), Error> {
        if self.fail_make_current {
            return Err(Error::ContextOperationFailed);
        }
        self.current = true;
        self.times_current += 1;
        Ok(())
    }

    fn make_not_current(&mut self) -> Result<(), Error> {
        self.current = false;
        self.times_detached += 1;
        Ok(())
    }

    fn swap_buffers(&mut self) -> Result<(), Error> {
        if !self.current {
            return Err(Error::ContextOperationFailed);
        }
        self.times_swapped += 1;
        Ok(())
    }
}

fn null_loader() -> crate::engine::SymbolLoader {
    Box::new(|_| std::ptr::null())
}

#[test]
fn test_guard_owns_deposited_context() {
    let handoff = ContextHandoff::new();
    handoff.deposit(7u32);
    let guard = handoff.acquire().unwrap();
    assert_eq!(*guard, 7);
    assert!(!handoff.slot_occupied());
    drop(guard);
    assert!(handoff.slot_occupied());
}

#[test]
fn test_deposit_twice_panics() {
    let handoff = ContextHandoff::new();
    handoff.deposit(0u32);
    let result = std::panic::catch_unwind(|| handoff.deposit(1u32));
    assert!(result.is_err());
}

// Two threads hammering the hand-off must never both hold the context. The
// instrumented holder count may only ever read 0 or 1.
#[test]
#[serial]
fn test_mutual_exclusion() {
    const CYCLES: usize = 200;

    let handoff = ContextHandoff::new();
    handoff.deposit(());
    let holders = Arc::new(AtomicI32::new(0));

    let mut threads = Vec::new();
    for _ in 0..2 {
        let handoff = handoff.clone();
        let holders = holders.clone();
        threads.push(thread::spawn(move || {
            for _ in 0..CYCLES {
                let guard = handoff.acquire().unwrap();
                let concurrent = holders.fetch_add(1, Ordering::SeqCst);
                assert_eq!(concurrent, 0, "two threads inside the section");
                thread::yield_now();
                holders.fetch_sub(1, Ordering::SeqCst);
                drop(guard);
            }
        }));
    }
    for thread in threads {
        thread.join().unwrap();
    }

    // Deadlock freedom: after all those paired cycles a fresh acquire still
    // succeeds within a short bound.
    let guard = handoff.acquire_timeout(Duration::from_secs(1)).unwrap();
    drop(guard);
}

#[test]
#[serial]
fn test_bounded_acquire_times_out() {
    let handoff: ContextHandoff<()> = ContextHandoff::new();
    let start = Instant::now();
    let result = handoff.acquire_timeout(Duration::from_secs(1));
    let elapsed = start.elapsed();
    assert_eq!(result.err(), Some(Error::WaitTimedOut));
    assert!(elapsed >= Duration::from_secs(1), "returned early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1400), "returned late: {:?}", elapsed);
}

#[test]
#[serial]
fn test_shutdown_interrupts_blocked_acquire() {
    let handoff: ContextHandoff<u32> = ContextHandoff::new();

    let waiter = {
        let handoff = handoff.clone();
        thread::spawn(move || {
            let result = handoff.acquire();
            (result.err(), Instant::now())
        })
    };

    // Give the waiter time to park before pulling the plug.
    thread::sleep(Duration::from_millis(200));
    let signalled_at = Instant::now();
    handoff.shut_down();

    let (err, returned_at) = waiter.join().unwrap();
    assert_eq!(err, Some(Error::WaitInterrupted));
    assert!(
        returned_at.duration_since(signalled_at) < Duration::from_millis(250),
        "interrupted waiter did not return promptly"
    );

    // The interrupted waiter consumed nothing: the slot is exactly as empty
    // as it was before the call.
    assert!(!handoff.slot_occupied());
}

#[test]
fn test_acquire_after_shutdown_fails_immediately() {
    let handoff = ContextHandoff::new();
    handoff.deposit(());
    handoff.shut_down();
    assert_eq!(handoff.acquire().err(), Some(Error::WaitInterrupted));
    // The context itself is untouched by shutdown.
    assert!(handoff.slot_occupied());
}

#[test]
#[serial]
fn test_deposit_unblocks_parked_acquirer() {
    let handoff: ContextHandoff<u32> = ContextHandoff::new();

    let waiter = {
        let handoff = handoff.clone();
        thread::spawn(move || {
            let guard = handoff.acquire().unwrap();
            (*guard, Instant::now())
        })
    };

    thread::sleep(Duration::from_millis(100));
    let deposited_at = Instant::now();
    handoff.deposit(7);

    let (value, granted_at) = waiter.join().unwrap();
    assert_eq!(value, 7);
    assert!(
        granted_at.duration_since(deposited_at) < Duration::from_millis(250),
        "parked acquirer was not woken promptly"
    );
}

// A panic mid-section must not leak the permit.
#[test]
#[serial]
fn test_panic_in_section_still_releases() {
    let handoff = ContextHandoff::new();
    handoff.deposit(());

    let panicker = {
        let handoff = handoff.clone();
        thread::spawn(move || {
            let _guard = handoff.acquire().unwrap();
            panic!("GL call exploded");
        })
    };
    assert!(panicker.join().is_err());

    assert!(handoff.slot_occupied());
    let guard = handoff.acquire_timeout(Duration::from_secs(1)).unwrap();
    drop(guard);
}

#[test]
#[serial]
fn test_waiters_served_in_arrival_order() {
    let handoff = ContextHandoff::new();
    handoff.deposit(());
    let holder = handoff.acquire().unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut waiters = Vec::new();
    for id in 0..3u32 {
        let handoff = handoff.clone();
        let order = order.clone();
        waiters.push(thread::spawn(move || {
            // Stagger arrival so the queue order is deterministic.
            thread::sleep(Duration::from_millis(120 * u64::from(id)));
            let guard = handoff.acquire().unwrap();
            order.lock().unwrap().push(id);
            drop(guard);
        }));
    }

    // Everyone is queued once the last stagger has elapsed.
    thread::sleep(Duration::from_millis(500));
    drop(holder);

    for waiter in waiters {
        waiter.join().unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
}

#[test]
#[serial]
fn test_timed_out_waiter_does_not_block_queue() {
    let handoff = ContextHandoff::new();
    handoff.deposit(());
    let holder = handoff.acquire().unwrap();

    let impatient = {
        let handoff = handoff.clone();
        thread::spawn(move || handoff.acquire_timeout(Duration::from_millis(100)).err())
    };
    thread::sleep(Duration::from_millis(50));
    let patient = {
        let handoff = handoff.clone();
        thread::spawn(move || handoff.acquire().map(drop))
    };

    assert_eq!(impatient.join().unwrap(), Some(Error::WaitTimedOut));
    // The abandoned front ticket must not wedge the waiter behind it.
    drop(holder);
    assert!(patient.join().unwrap().is_ok());
}

#[test]
fn test_make_current_failure_releases_permit() {
    let handoff = ContextHandoff::new();
    handoff.deposit(MockContext {
        fail_make_current: true,
        ..MockContext::default()
    });

    let guard = handoff.acquire().unwrap();
    assert_eq!(guard.make_current().err(), Some(Error::ContextOperationFailed));

    // The failed section released; the context is acquirable again.
    assert!(handoff.slot_occupied());
    let guard = handoff.acquire_timeout(Duration::from_secs(1)).unwrap();
    drop(guard);
}

#[test]
fn test_current_context_detaches_before_release() {
    let handoff = ContextHandoff::new();
    handoff.deposit(MockContext::default());

    let current = handoff.acquire().unwrap().make_current().unwrap();
    assert!(current.current);
    drop(current);

    let guard = handoff.acquire().unwrap();
    assert!(!guard.current, "context was released while still attached");
    assert_eq!(guard.times_current, 1);
    assert_eq!(guard.times_detached, 1);
}

#[test]
fn test_engine_bridge_render_cycle() {
    let handoff = ContextHandoff::new();
    handoff.deposit(MockContext::default());
    let bridge = EngineBridge::new(handoff.clone(), null_loader());

    assert!(bridge.enter_render());
    assert!(bridge.present());
    assert!(bridge.leave_render());

    // Outside a section, present and leave are rejected without touching
    // the hand-off.
    assert!(!bridge.present());
    assert!(!bridge.leave_render());

    let guard = handoff.acquire().unwrap();
    assert_eq!(guard.times_swapped, 1);
    assert_eq!(guard.times_current, 1);
    assert_eq!(guard.times_detached, 1);
}

#[test]
fn test_engine_bridge_failed_enter_leaves_handoff_usable() {
    let handoff = ContextHandoff::new();
    handoff.deposit(MockContext {
        fail_make_current: true,
        ..MockContext::default()
    });
    let bridge = EngineBridge::new(handoff.clone(), null_loader());

    assert!(!bridge.enter_render());
    assert!(handoff.slot_occupied());
    let guard = handoff.acquire_timeout(Duration::from_secs(1)).unwrap();
    drop(guard);
}

#[test]
fn test_engine_bridge_enter_fails_after_shutdown() {
    let handoff = ContextHandoff::new();
    handoff.deposit(MockContext::default());
    let bridge = EngineBridge::new(handoff.clone(), null_loader());

    handoff.shut_down();
    assert!(!bridge.enter_render());
}

#[test]
fn test_symbol_loader_is_forwarded() {
    let handoff: ContextHandoff<MockContext> = ContextHandoff::new();
    let bridge = EngineBridge::new(
        handoff,
        Box::new(|name| {
            assert_eq!(name, "glViewport");
            1234 as *const std::os::raw::c_void
        }),
    );
    assert_eq!(bridge.resolve("glViewport") as usize, 1234);
}

#[test]
fn test_size_report_set_and_fire_across_threads() {
    let report = SizeReport::new();
    let seen = Arc::new(Mutex::new(None));

    let registrar = {
        let report = report.clone();
        let seen = seen.clone();
        thread::spawn(move || {
            report.set_callback(move |size| {
                *seen.lock().unwrap() = Some(size);
            });
        })
    };
    registrar.join().unwrap();

    report.report(Size2D::new(1280, 720));
    assert_eq!(*seen.lock().unwrap(), Some(Size2D::new(1280, 720)));

    report.clear_callback();
    report.report(Size2D::new(1, 1));
    assert_eq!(*seen.lock().unwrap(), Some(Size2D::new(1280, 720)));
}
