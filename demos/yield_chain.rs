//! Seed scenario 2: yield chain.
//!
//! Spawns 5 tasks, each printing its id, yielding once, then printing its id
//! again. The main task yields and then joins all 5, so every id is expected
//! to show up twice, with every first occurrence preceding every second one.

use mntask::Task;

fn main() {
    env_logger::init();

    let tasks: Vec<Box<Task>> = (0..5)
        .map(|id| {
            Task::new(move || {
                println!("task {id}: first");
                Task::yield_now();
                println!("task {id}: second");
            })
        })
        .collect();

    Task::yield_now();
    for task in &tasks {
        task.join();
    }
}
