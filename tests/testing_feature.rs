//! Exercises the `testing`-feature-gated introspection surface. Run with
//! `cargo test --features testing`; compiles to nothing otherwise.

#![cfg(feature = "testing")]

use mntask::passkey::Passkey;
use mntask::Task;
use sequential_test::sequential;

#[test]
#[sequential]
fn finished_task_reports_finished_state_for_testing() {
    let task = Task::new(|| {});
    task.join();
    assert_eq!(task.state_for_testing(Passkey::for_testing()), "Finished");
}
