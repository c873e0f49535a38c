//! Hello-team example — one broadcast across an in-process team.
//!
//! Rank 0 broadcasts a greeting; every other rank prints what it received.
//!
//! Run with: cargo run --example hello_team

use std::thread;

use teamcomm::inproc::star_topology;
use teamcomm::{new_collective, Collective, CollectiveType, ImplementationType};

const N: usize = 4;

fn main() {
    let (root_side, leaf_side) = star_topology(N);

    let mut ranks = Vec::new();
    for (i, h) in leaf_side.into_iter().enumerate() {
        ranks.push(thread::spawn(move || {
            let rank = i + 1;
            let mut bcast = new_collective(
                CollectiveType::Broadcast,
                ImplementationType::Generic,
                vec![h],
                N,
                false,
                rank,
                0,
            );
            let mut recv = [0u8; 32];
            let got = bcast
                .sendrecv(None, Some(&mut recv), 32, 1)
                .expect("broadcast receive failed");
            let text = String::from_utf8_lossy(&recv[..got]);
            println!("rank {rank}: received \"{text}\"");
        }));
    }

    let mut bcast = new_collective(
        CollectiveType::Broadcast,
        ImplementationType::Generic,
        root_side,
        N,
        true,
        0,
        0,
    );
    let greeting = b"hello from rank 0";
    bcast
        .sendrecv(Some(greeting), None, 0, 1)
        .expect("broadcast send failed");
    bcast.close(true, false);
    println!("rank 0: sent \"hello from rank 0\" to {} peers", N - 1);

    for t in ranks {
        t.join().expect("rank panicked");
    }
}
