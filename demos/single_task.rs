//! Seed scenario 1: single task, single thread.
//!
//! Spawns one task that prints "A" then returns; the main thread joins it.

use mntask::Task;

fn main() {
    env_logger::init();

    let task = Task::new(|| {
        println!("A");
    });
    task.join();
    println!("done");
}
