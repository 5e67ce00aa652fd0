use std::sync::Arc;
use std::thread;

use tsync::{Barrier, RwLock};

fn main() {
    let counter = Arc::new(RwLock::new(0));

    let writer = thread::spawn({
        let counter = counter.clone();
        move || {
            for _ in 0..1000 {
                *counter.write() += 1;
            }
        }
    });

    for _ in 0..1000 {
        println!("read {}", *counter.read());
    }

    writer.join().unwrap();
    assert_eq!(*counter.read(), 1000);

    let barrier = Arc::new(Barrier::new(4).unwrap());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                let result = barrier.wait();
                println!("thread {i} past the barrier, serial = {}", result.is_serial());
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}
