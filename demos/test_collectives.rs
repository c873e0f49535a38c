//! Integration test for ALL collective operations of the generic family.
//!
//! Exercises broadcast, scatter, gather, allgather, alltoall, fan-in and
//! fan-out across a 4-rank in-process team (one thread per rank), wired
//! through the star topology helper.
//!
//! Each operation is verified with meaningful assertions.
//!
//! Run with: cargo run --example test_collectives

use std::thread;

use teamcomm::inproc::{star_topology, InprocHandle};
use teamcomm::partition::byte_chunks;
use teamcomm::{new_collective, Collective, CollectiveType, ImplementationType};

const N: usize = 4;
const TAG: i32 = 99;

/// Spawn one thread per rank; rank 0 is the root and receives the peer
/// handle vector, every other rank its single handle to the root.
fn run_team<R, F>(root_fn: R, leaf_fn: F)
where
    R: FnOnce(Vec<InprocHandle>) + Send + 'static,
    F: Fn(usize, InprocHandle) + Send + Clone + 'static,
{
    let (root_side, leaf_side) = star_topology(N);

    let root = thread::spawn(move || root_fn(root_side));
    let mut leaves = Vec::new();
    for (i, h) in leaf_side.into_iter().enumerate() {
        let f = leaf_fn.clone();
        leaves.push(thread::spawn(move || f(i + 1, h)));
    }

    root.join().expect("root rank panicked");
    for t in leaves {
        t.join().expect("leaf rank panicked");
    }
}

fn build(
    ctype: CollectiveType,
    participants: Vec<InprocHandle>,
    root: bool,
    rank: usize,
) -> Box<dyn Collective<InprocHandle>> {
    new_collective(ctype, ImplementationType::Generic, participants, N, root, rank, TAG)
}

fn main() {
    // ========================================================================
    // Test 1: broadcast
    // ========================================================================
    {
        let payload = [0xAA_u8, 0xBB, 0xCC];
        run_team(
            move |handles| {
                let mut bcast = build(CollectiveType::Broadcast, handles, true, 0);
                let sent = bcast.sendrecv(Some(&payload), None, 0, 1).expect("broadcast root");
                assert_eq!(sent, 3);
                bcast.close(true, false);
            },
            move |rank, h| {
                let mut bcast = build(CollectiveType::Broadcast, vec![h], false, rank);
                let mut recv = [0u8; 3];
                let got = bcast.sendrecv(None, Some(&mut recv), 3, 1).expect("broadcast leaf");
                assert_eq!(got, 3);
                assert_eq!(recv, [0xAA, 0xBB, 0xCC], "rank {rank}: broadcast mismatch");
            },
        );
        println!("PASS: broadcast");
    }

    // ========================================================================
    // Test 2: scatter (9 elements over 4 ranks: {3, 2, 2, 2})
    // ========================================================================
    {
        let sendbuf: Vec<u8> = (1..=9).collect();
        let chunks = byte_chunks(9, N, 1);
        let expected_chunks = chunks.clone();

        run_team(
            move |handles| {
                let mut scatter = build(CollectiveType::Scatter, handles, true, 0);
                let mut recv = vec![0u8; chunks[0]];
                let len = recv.len();
                let got = scatter
                    .sendrecv(Some(&sendbuf), Some(&mut recv), len, 1)
                    .expect("scatter root");
                assert_eq!(got, 3);
                assert_eq!(recv, vec![1, 2, 3]);
            },
            move |rank, h| {
                let mut scatter = build(CollectiveType::Scatter, vec![h], false, rank);
                let chunk = expected_chunks[rank];
                let mut recv = vec![0u8; chunk];
                let got = scatter.sendrecv(None, Some(&mut recv), chunk, 1).expect("scatter leaf");
                assert_eq!(got, chunk);
                // Rank r's slice starts after the 3 root elements plus the
                // 2-element chunks of the ranks before it.
                let start = 3 + (rank - 1) * 2;
                let expected: Vec<u8> = (start as u8 + 1..start as u8 + 1 + chunk as u8).collect();
                assert_eq!(recv, expected, "rank {rank}: scatter mismatch");
            },
        );
        println!("PASS: scatter");
    }

    // ========================================================================
    // Test 3: gather (each rank contributes rank-stamped bytes)
    // ========================================================================
    {
        let chunks = byte_chunks(9, N, 1);
        let leaf_chunks = chunks.clone();

        run_team(
            move |handles| {
                let mut gather = build(CollectiveType::Gather, handles, true, 0);
                let send = vec![0u8; chunks[0]];
                let mut recv = vec![0xFF_u8; 9];
                let got = gather.sendrecv(Some(&send), Some(&mut recv), 9, 1).expect("gather root");
                assert_eq!(got, chunks[0]);
                let expected = vec![0, 0, 0, 1, 1, 2, 2, 3, 3];
                assert_eq!(recv, expected);
            },
            move |rank, h| {
                let mut gather = build(CollectiveType::Gather, vec![h], false, rank);
                let send = vec![rank as u8; leaf_chunks[rank]];
                let got = gather.sendrecv(Some(&send), None, 9, 1).expect("gather leaf");
                assert_eq!(got, leaf_chunks[rank]);
            },
        );
        println!("PASS: gather");
    }

    // ========================================================================
    // Test 4: allgather (every rank ends with the full concatenation)
    // ========================================================================
    {
        let chunks = byte_chunks(9, N, 1);
        let leaf_chunks = chunks.clone();
        let expected = vec![0u8, 0, 0, 1, 1, 2, 2, 3, 3];
        let root_expected = expected.clone();
        let leaf_expected = expected;

        run_team(
            move |handles| {
                let mut allgather = build(CollectiveType::AllGather, handles, true, 0);
                let send = vec![0u8; chunks[0]];
                let mut recv = vec![0xFF_u8; 9];
                allgather
                    .sendrecv(Some(&send), Some(&mut recv), 9, 1)
                    .expect("allgather root");
                assert_eq!(recv, root_expected);
            },
            move |rank, h| {
                let mut allgather = build(CollectiveType::AllGather, vec![h], false, rank);
                let send = vec![rank as u8; leaf_chunks[rank]];
                let mut recv = vec![0xFF_u8; 9];
                allgather
                    .sendrecv(Some(&send), Some(&mut recv), 9, 1)
                    .expect("allgather leaf");
                assert_eq!(recv, leaf_expected, "rank {rank}: allgather mismatch");
            },
        );
        println!("PASS: allgather");
    }

    // ========================================================================
    // Test 5: alltoall (rank r sends byte r*10+d to destination d)
    // ========================================================================
    {
        run_team(
            move |handles| {
                let mut alltoall = build(CollectiveType::AllToAll, handles, true, 0);
                let send: Vec<u8> = (0..N as u8).collect(); // 0*10 + d
                let mut recv = vec![0xFF_u8; N];
                let got = alltoall
                    .sendrecv(Some(&send), Some(&mut recv), N, 1)
                    .expect("alltoall root");
                assert_eq!(got, N);
                // Destination 0 collects byte r*10 from every rank r.
                assert_eq!(recv, vec![0, 10, 20, 30]);
            },
            move |rank, h| {
                let mut alltoall = build(CollectiveType::AllToAll, vec![h], false, rank);
                let send: Vec<u8> = (0..N as u8).map(|d| rank as u8 * 10 + d).collect();
                let mut recv = vec![0xFF_u8; N];
                let got = alltoall
                    .sendrecv(Some(&send), Some(&mut recv), N, 1)
                    .expect("alltoall leaf");
                assert_eq!(got, N);
                let expected: Vec<u8> = (0..N as u8).map(|r| r * 10 + rank as u8).collect();
                assert_eq!(recv, expected, "rank {rank}: alltoall mismatch");
            },
        );
        println!("PASS: alltoall");
    }

    // ========================================================================
    // Test 6: fan-in (producers stream frames, root drains to group EOS)
    // ========================================================================
    {
        run_team(
            move |handles| {
                let mut fanin = build(CollectiveType::FanIn, handles, true, 0);
                let mut frames = Vec::new();
                loop {
                    let size = fanin.probe(true).expect("fanin probe");
                    if size == 0 {
                        break;
                    }
                    let mut buf = vec![0u8; size as usize];
                    fanin.receive(&mut buf).expect("fanin receive");
                    frames.push(buf);
                }
                frames.sort();
                assert_eq!(frames, vec![vec![1; 4], vec![2; 4], vec![3; 4]]);
            },
            move |rank, mut h| {
                use teamcomm::Handle;
                h.send(&[rank as u8; 4]).expect("producer send");
                let mut fanin = build(CollectiveType::FanIn, vec![h], false, rank);
                fanin.close(true, false); // EOS upstream
            },
        );
        println!("PASS: fan-in");
    }

    // ========================================================================
    // Test 7: fan-out (root deals frames round-robin)
    // ========================================================================
    {
        run_team(
            move |handles| {
                let mut fanout = build(CollectiveType::FanOut, handles, true, 0);
                for frame in 0u8..6 {
                    fanout.send(&[frame]).expect("fanout send");
                }
                fanout.close(true, false);
            },
            move |rank, h| {
                let mut fanout = build(CollectiveType::FanOut, vec![h], false, rank);
                let mut got = Vec::new();
                loop {
                    let size = fanout.probe(true).expect("fanout probe");
                    if size == 0 {
                        break;
                    }
                    let mut buf = vec![0u8; size as usize];
                    fanout.receive(&mut buf).expect("fanout receive");
                    got.extend(buf);
                }
                // Leaf (rank - 1) gets frames (rank - 1) and (rank - 1) + 3.
                let first = (rank - 1) as u8;
                assert_eq!(got, vec![first, first + 3], "rank {rank}: fan-out mismatch");
            },
        );
        println!("PASS: fan-out");
    }

    println!("\n========================================");
    println!("All collective tests passed! (7 tests)");
    println!("========================================");
}
