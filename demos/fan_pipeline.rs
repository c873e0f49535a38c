//! Streaming pipeline example: fan-out → workers → fan-in.
//!
//! The main thread deals work items to three workers round-robin through a
//! fan-out, each worker transforms its items, and a fan-in collects the
//! results in completion order until every worker has signed off.
//!
//! Run with: RUST_LOG=debug cargo run --example fan_pipeline

use std::thread;

use teamcomm::inproc::star_topology;
use teamcomm::{new_collective, Collective, Handle, CollectiveType, ImplementationType};

const WORKERS: usize = 3;
const ITEMS: u8 = 9;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Downstream star: main deals work out to the workers.
    let (fanout_root, fanout_leaves) = star_topology(WORKERS + 1);
    // Upstream star: workers stream results back to main.
    let (fanin_root, fanin_leaves) = star_topology(WORKERS + 1);

    let mut workers = Vec::new();
    for (i, (work_rx, mut result_tx)) in fanout_leaves
        .into_iter()
        .zip(fanin_leaves)
        .enumerate()
    {
        workers.push(thread::spawn(move || {
            let rank = i + 1;
            let mut upstream = new_collective(
                CollectiveType::FanOut,
                ImplementationType::Generic,
                vec![work_rx],
                WORKERS + 1,
                false,
                rank,
                1,
            );

            let mut processed = 0u32;
            loop {
                let size = upstream.probe(true).expect("worker probe failed");
                if size == 0 {
                    break;
                }
                let mut item = vec![0u8; size as usize];
                upstream.receive(&mut item).expect("worker receive failed");

                // The "work": square the item.
                let result = [item[0], item[0].wrapping_mul(item[0])];
                result_tx.send(&result).expect("worker send failed");
                processed += 1;
            }

            // Sign off so the collector's group can drain.
            result_tx.close(true, false);
            println!("worker {rank}: processed {processed} items");
        }));
    }

    let emitter = thread::spawn(move || {
        let mut fanout = new_collective(
            CollectiveType::FanOut,
            ImplementationType::Generic,
            fanout_root,
            WORKERS + 1,
            true,
            0,
            1,
        );
        for item in 1..=ITEMS {
            fanout.send(&[item]).expect("emitter send failed");
        }
        fanout.close(true, false);
    });

    let mut fanin = new_collective(
        CollectiveType::FanIn,
        ImplementationType::Generic,
        fanin_root,
        WORKERS + 1,
        true,
        0,
        2,
    );

    let mut results = Vec::new();
    loop {
        let size = fanin.probe(true).expect("collector probe failed");
        if size == 0 {
            break;
        }
        let mut buf = vec![0u8; size as usize];
        fanin.receive(&mut buf).expect("collector receive failed");
        results.push((buf[0], buf[1]));
    }

    emitter.join().expect("emitter panicked");
    for t in workers {
        t.join().expect("worker panicked");
    }

    results.sort_unstable();
    println!("collected {} results:", results.len());
    for (item, square) in &results {
        println!("  {item}^2 = {square}");
    }
    assert_eq!(results.len(), ITEMS as usize);
}
