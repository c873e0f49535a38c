//! Deterministic partitioning of an element count across a team.
//!
//! Given `count` elements and `n` participants, the canonical split is
//! `base = count / n`, `rem = count % n`; rank `r` receives `base + 1`
//! elements if `r < rem`, else `base`. Every byte-level chunk a collective
//! moves is this element partition scaled by the `datasize` stride.
//!
//! The per-rank chunk table is computed up front, before any I/O, so the
//! remainder distribution every variant relies on is pinned in one place.

/// Number of elements rank `rank` receives out of `count` split across
/// `nparticipants` ranks.
///
/// The first `count % nparticipants` ranks get one extra element.
pub fn partition_size(rank: usize, count: usize, nparticipants: usize) -> usize {
    let base = count / nparticipants;
    let rem = count % nparticipants;
    if rank < rem {
        base + 1
    } else {
        base
    }
}

/// Per-rank chunk sizes in bytes for `datacount` elements of `datasize`
/// bytes each, split across `nparticipants` ranks.
///
/// `chunks[r] == partition_size(r, datacount, nparticipants) * datasize`.
pub fn byte_chunks(datacount: usize, nparticipants: usize, datasize: usize) -> Vec<usize> {
    (0..nparticipants)
        .map(|r| partition_size(r, datacount, nparticipants) * datasize)
        .collect()
}

/// Prefix displacements for a chunk table: `offsets[r]` is where rank `r`'s
/// chunk starts in the concatenated buffer.
pub fn offsets(chunks: &[usize]) -> Vec<usize> {
    let mut displ = 0;
    chunks
        .iter()
        .map(|&c| {
            let d = displ;
            displ += c;
            d
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_is_total() {
        // Sum of all partitions must equal the count, for a spread of shapes.
        for &(count, n) in &[(0, 3), (1, 4), (7, 3), (14, 3), (100, 7), (5, 8), (9, 9)] {
            let total: usize = (0..n).map(|r| partition_size(r, count, n)).sum();
            assert_eq!(total, count, "count={count} n={n}");
        }
    }

    #[test]
    fn remainder_goes_to_the_first_ranks() {
        // 7 elements over 3 ranks: base 2, rem 1 -> {3, 2, 2}
        assert_eq!(partition_size(0, 7, 3), 3);
        assert_eq!(partition_size(1, 7, 3), 2);
        assert_eq!(partition_size(2, 7, 3), 2);

        // Exactly `rem` ranks get base+1, and they are ranks [0, rem).
        let (count, n) = (23, 5);
        let base = count / n;
        let rem = count % n;
        for r in 0..n {
            let expected = if r < rem { base + 1 } else { base };
            assert_eq!(partition_size(r, count, n), expected);
        }
    }

    #[test]
    fn byte_chunks_scale_by_stride() {
        // 7 elements of 2 bytes over 3 ranks -> bytes {6, 4, 4}
        assert_eq!(byte_chunks(7, 3, 2), vec![6, 4, 4]);
        // Even split leaves no remainder anywhere.
        assert_eq!(byte_chunks(6, 3, 4), vec![8, 8, 8]);
        // Fewer elements than ranks: trailing ranks get nothing.
        assert_eq!(byte_chunks(2, 4, 1), vec![1, 1, 0, 0]);
    }

    #[test]
    fn offsets_are_prefix_sums() {
        let chunks = byte_chunks(7, 3, 2);
        assert_eq!(offsets(&chunks), vec![0, 6, 10]);
        assert_eq!(offsets(&[]), Vec::<usize>::new());
    }

    #[test]
    fn single_participant_takes_everything() {
        assert_eq!(partition_size(0, 42, 1), 42);
        assert_eq!(byte_chunks(42, 1, 8), vec![336]);
    }
}
