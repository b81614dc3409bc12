//! Black-box tests for the public `mntask` API, covering the seed end-to-end
//! scenarios the crate is built against (see `demos/` for the runnable
//! versions of several of these). Every test is `#[sequential]` because they
//! all drive the one process-wide scheduler singleton.

use mntask::Task;
use sequential_test::sequential;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
#[sequential]
fn single_task_runs_and_join_returns() {
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = Arc::clone(&ran);
    let task = Task::new(move || {
        ran_clone.fetch_add(1, Ordering::SeqCst);
    });
    task.join();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
#[sequential]
fn join_on_finished_task_is_immediate_and_repeatable() {
    let task = Task::new(|| {});
    task.join();
    task.join();
    task.join();
}

#[test]
#[sequential]
fn yield_chain_every_id_appears_twice_in_order() {
    let log = Arc::new(Mutex::new(Vec::<(usize, &'static str)>::new()));

    let tasks: Vec<Box<Task>> = (0..5)
        .map(|id| {
            let log = Arc::clone(&log);
            Task::new(move || {
                log.lock().unwrap().push((id, "first"));
                Task::yield_now();
                log.lock().unwrap().push((id, "second"));
            })
        })
        .collect();

    Task::yield_now();
    for task in &tasks {
        task.join();
    }

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 10);

    let first_positions: Vec<usize> = (0..5)
        .map(|id| log.iter().position(|&(i, phase)| i == id && phase == "first").unwrap())
        .collect();
    let second_positions: Vec<usize> = (0..5)
        .map(|id| log.iter().position(|&(i, phase)| i == id && phase == "second").unwrap())
        .collect();
    let last_first = *first_positions.iter().max().unwrap();
    let first_second = *second_positions.iter().min().unwrap();
    assert!(
        last_first < first_second,
        "every first occurrence must precede every second occurrence"
    );
}

#[test]
#[sequential]
fn join_waits_for_slow_task_to_actually_finish() {
    let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let slow_finished = Arc::clone(&finished);
    let slow = Task::new(move || {
        std::thread::sleep(Duration::from_millis(15));
        slow_finished.store(true, Ordering::SeqCst);
    });
    slow.join();
    assert!(finished.load(Ordering::SeqCst));
}

#[test]
#[sequential]
fn many_tasks_all_complete_exactly_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let tasks: Vec<Box<Task>> = (0..64)
        .map(|_| {
            let counter = Arc::clone(&counter);
            Task::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();
    for task in &tasks {
        task.join();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 64);
}

#[test]
#[sequential]
fn priority_zero_is_the_highest_lane() {
    let task = Task::new(|| {});
    task.set_priority(0);
    task.join();
}

#[test]
#[sequential]
#[should_panic(expected = "set_priority")]
fn priority_out_of_range_panics_across_the_public_api() {
    let task = Task::new(|| {});
    task.set_priority(99);
}

#[test]
#[sequential]
fn nested_spawn_from_inside_a_task_is_supported() {
    let outer_ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let inner_ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let outer_flag = Arc::clone(&outer_ran);
    let inner_flag = Arc::clone(&inner_ran);

    let outer = Task::new(move || {
        let inner = Task::new(move || {
            inner_flag.store(true, Ordering::SeqCst);
        });
        inner.join();
        outer_flag.store(true, Ordering::SeqCst);
    });
    outer.join();

    assert!(outer_ran.load(Ordering::SeqCst));
    assert!(inner_ran.load(Ordering::SeqCst));
}
