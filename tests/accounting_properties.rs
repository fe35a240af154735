use costbox::core::accountant::{self, CostAccountant};
use costbox::core::termination::Termination;
use costbox::{CostLane, CostLimits, ThreadKey};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Barrier};
use std::thread;

/// Every property runs on a fresh thread so each starts from an empty ledger.
fn on_fresh_thread<R: Send + 'static>(f: impl FnOnce() -> R + Send + 'static) -> R {
    thread::spawn(f).join().expect("property thread panicked")
}

fn termination_of<R>(f: impl FnOnce() -> R) -> Option<Termination> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(_) => None,
        Err(payload) => Termination::from_payload(&*payload),
    }
}

#[test]
fn per_lane_additivity_tracks_running_sums() {
    on_fresh_thread(|| {
        let amounts: [(u32, u32); 6] = [(1, 1), (3, 8), (0, 1000), (17, 1), (64, 64), (1, 4096)];
        let mut expected = 0u64;
        for (length, element_size) in amounts {
            accountant::record_array_allocation(length, element_size);
            expected += u64::from(length) * u64::from(element_size);
            assert_eq!(accountant::get_allocation_cost(), expected);
        }

        for n in 1..=30 {
            accountant::record_method_call();
            assert_eq!(accountant::get_invoke_cost(), n);
        }
        for n in 1..=10 {
            accountant::record_throw();
            assert_eq!(accountant::get_throw_cost(), n);
        }

        // Lanes never bleed into each other.
        assert_eq!(accountant::get_jump_cost(), 0);
        assert_eq!(accountant::get_allocation_cost(), expected);
    });
}

#[test]
fn hundredth_jump_returns_and_hundred_first_terminates() {
    on_fresh_thread(|| {
        for _ in 0..100 {
            accountant::record_jump();
        }
        assert_eq!(accountant::get_jump_cost(), 100);

        let termination = termination_of(accountant::record_jump).expect("101st jump must terminate");
        assert_eq!(termination.lane(), CostLane::Jump);
        assert_eq!(termination.total(), 101);
        assert_eq!(termination.limit(), 100);
    });
}

#[test]
fn allocation_limit_is_exact_for_scalar_allocations() {
    on_fresh_thread(|| {
        for _ in 0..1_048_576u32 {
            accountant::record_allocation("Node");
        }
        assert_eq!(accountant::get_allocation_cost(), 1_048_576);

        let termination = termination_of(|| accountant::record_allocation("Node"))
            .expect("allocation 1,048,577 must terminate");
        assert_eq!(termination.lane(), CostLane::Allocation);
        assert_eq!(termination.total(), 1_048_577);
    });
}

#[test]
fn oversized_array_terminates_on_first_call() {
    on_fresh_thread(|| {
        let termination = termination_of(|| accountant::record_array_allocation(10, 200_000))
            .expect("2,000,000 units exceeds the allocation budget");
        assert_eq!(termination.lane(), CostLane::Allocation);
        assert_eq!(termination.total(), 2_000_000);
        assert_eq!(termination.limit(), 1_048_576);
    });
}

#[test]
fn termination_is_raised_exactly_once_and_the_unit_stays_dead() {
    on_fresh_thread(|| {
        for _ in 0..50 {
            accountant::record_throw();
        }
        let first = termination_of(accountant::record_throw).expect("51st throw terminates");

        // Any later accounting call on the dead unit unwinds again without
        // charging anything.
        for _ in 0..5 {
            assert_eq!(termination_of(accountant::record_jump), Some(first));
            assert_eq!(termination_of(accountant::record_method_call), Some(first));
        }
        assert_eq!(accountant::get_jump_cost(), 0);
        assert_eq!(accountant::get_invoke_cost(), 0);
        assert_eq!(accountant::get_throw_cost(), 51);
    });
}

#[test]
fn supervisor_is_never_metered_or_terminated() {
    on_fresh_thread(|| {
        let limits = CostLimits {
            allocation: 1,
            jump: 1,
            invocation: 1,
            throw: 1,
        };
        let supervised = Arc::new(CostAccountant::with_supervisor(limits, ThreadKey::current()));
        supervised.bind_current_thread();

        let outcome = termination_of(|| {
            for _ in 0..10_000 {
                accountant::record_jump();
                accountant::record_method_call();
                accountant::record_throw();
                accountant::record_allocation("Object");
                accountant::record_array_allocation(u32::MAX, u32::MAX);
            }
        });
        assert_eq!(outcome, None);
        assert_eq!(accountant::get_allocation_cost(), 0);
        assert_eq!(accountant::get_jump_cost(), 0);
        assert_eq!(accountant::get_invoke_cost(), 0);
        assert_eq!(accountant::get_throw_cost(), 0);
    });
}

#[test]
fn supervisor_exemption_does_not_cover_other_threads() {
    let limits = CostLimits::default().with_limit(CostLane::Jump, 3);
    let supervised = Arc::new(CostAccountant::with_supervisor(limits, ThreadKey::current()));

    let worker = Arc::clone(&supervised);
    let termination = on_fresh_thread(move || {
        termination_of(|| {
            for _ in 0..4 {
                worker.record_jump();
            }
        })
    });
    assert_eq!(termination.map(|t| t.total()), Some(4));
}

#[test]
fn concurrent_threads_never_see_each_other() {
    let barrier = Arc::new(Barrier::new(2));

    let victim_barrier = Arc::clone(&barrier);
    let victim = thread::spawn(move || {
        victim_barrier.wait();
        termination_of(|| {
            for _ in 0..1_000 {
                accountant::record_method_call();
            }
        })
    });

    let survivor_barrier = Arc::clone(&barrier);
    let survivor = thread::spawn(move || {
        survivor_barrier.wait();
        let mut observed = Vec::new();
        for _ in 0..100 {
            accountant::record_method_call();
            observed.push(accountant::get_invoke_cost());
        }
        observed
    });

    let termination = victim.join().unwrap().expect("victim exceeds the invocation budget");
    assert_eq!(termination.total(), 101);

    let observed = survivor.join().unwrap();
    assert_eq!(observed, (1..=100).collect::<Vec<u64>>());
}

#[test]
fn reset_zeroes_all_lanes_and_is_idempotent() {
    on_fresh_thread(|| {
        accountant::record_array_allocation(12, 12);
        accountant::record_jump();
        accountant::record_method_call();
        accountant::record_throw();

        for _ in 0..3 {
            accountant::reset_counters();
            assert_eq!(accountant::get_allocation_cost(), 0);
            assert_eq!(accountant::get_jump_cost(), 0);
            assert_eq!(accountant::get_invoke_cost(), 0);
            assert_eq!(accountant::get_throw_cost(), 0);
        }

        // Full budget is available again after a reset.
        for _ in 0..100 {
            accountant::record_jump();
        }
        assert_eq!(accountant::get_jump_cost(), 100);
    });
}

#[test]
fn reset_does_not_touch_other_threads() {
    let (ready_tx, ready_rx) = crossbeam_channel::bounded(0);
    let (reset_tx, reset_rx) = crossbeam_channel::bounded::<()>(0);

    let other = thread::spawn(move || {
        for _ in 0..7 {
            accountant::record_throw();
        }
        ready_tx.send(()).unwrap();
        reset_rx.recv().unwrap();
        accountant::get_throw_cost()
    });

    ready_rx.recv().unwrap();
    accountant::record_throw();
    accountant::reset_counters();
    reset_tx.send(()).unwrap();

    assert_eq!(other.join().unwrap(), 7);
    assert_eq!(accountant::get_throw_cost(), 0);
}

#[test]
fn reads_are_pure() {
    on_fresh_thread(|| {
        for _ in 0..100 {
            accountant::record_jump();
        }
        accountant::record_array_allocation(1024, 1024);

        // At the limit on two lanes: reads must neither change nor terminate.
        for _ in 0..1_000 {
            assert_eq!(accountant::get_jump_cost(), 100);
            assert_eq!(accountant::get_allocation_cost(), 1_048_576);
            assert_eq!(accountant::get_invoke_cost(), 0);
            assert_eq!(accountant::get_throw_cost(), 0);
        }
    });
}

#[test]
fn signed_allocation_inputs_are_rejected() {
    assert!(accountant::array_cost(-10, 4).is_err());
    assert!(accountant::array_cost(10, -4).is_err());
    assert_eq!(accountant::array_cost(10, 200_000).unwrap(), 2_000_000);
}
