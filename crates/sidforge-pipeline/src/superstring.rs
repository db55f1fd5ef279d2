//! Greedy superstring merge.
//!
//! Used twice: to fold all songs' wavetables into one shared table, and to
//! overlay packed patterns placed in the same blob region. The classic
//! greedy loop merges the pair with the largest suffix/prefix overlap until
//! one string remains; inputs contained in another are absorbed outright.
//!
//! Every input's offset inside the result is reported so callers can
//! reindex (instrument wave triples, pattern pointers).

/// Position of `needle` inside `haystack`, if contained.
fn find_sub(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&at| &haystack[at..at + needle.len()] == needle)
}

/// Longest proper overlap between a suffix of `a` and a prefix of `b`.
fn overlap(a: &[u8], b: &[u8]) -> usize {
    let max = a.len().min(b.len());
    (1..=max)
        .rev()
        .find(|&k| a[a.len() - k..] == b[..k])
        .unwrap_or(0)
}

/// One merged fragment and the inputs it absorbed.
#[derive(Debug, Clone)]
struct Fragment {
    bytes: Vec<u8>,
    /// `(input index, offset inside bytes)`.
    members: Vec<(usize, usize)>,
}

/// Merge byte strings by greedy maximum overlap.
///
/// Returns the merged string and, per input, its offset inside it.
pub fn greedy_superstring(inputs: &[Vec<u8>]) -> (Vec<u8>, Vec<usize>) {
    let mut fragments: Vec<Fragment> = Vec::new();

    // Absorb containments up front, longest inputs first for determinism.
    let mut order: Vec<usize> = (0..inputs.len()).collect();
    order.sort_by_key(|&i| (std::cmp::Reverse(inputs[i].len()), i));
    'inputs: for &index in &order {
        let bytes = &inputs[index];
        for fragment in &mut fragments {
            if let Some(at) = find_sub(&fragment.bytes, bytes) {
                fragment.members.push((index, at));
                continue 'inputs;
            }
        }
        fragments.push(Fragment {
            bytes: bytes.clone(),
            members: vec![(index, 0)],
        });
    }

    // Greedy pairwise merge by maximum overlap; ties to the lowest pair.
    while fragments.len() > 1 {
        let mut best: Option<(usize, usize, usize)> = None;
        for i in 0..fragments.len() {
            for j in 0..fragments.len() {
                if i == j {
                    continue;
                }
                let k = overlap(&fragments[i].bytes, &fragments[j].bytes);
                if best.map(|(bk, _, _)| k > bk).unwrap_or(true) {
                    best = Some((k, i, j));
                }
            }
        }
        let (k, i, j) = best.expect("two or more fragments");
        let (lo, hi) = (i.min(j), i.max(j));
        let second = fragments.remove(hi);
        let first = std::mem::replace(
            &mut fragments[lo],
            Fragment {
                bytes: Vec::new(),
                members: Vec::new(),
            },
        );
        let (mut head, tail) = if lo == i { (first, second) } else { (second, first) };
        let base = head.bytes.len() - k;
        head.bytes.extend_from_slice(&tail.bytes[k..]);
        head.members
            .extend(tail.members.into_iter().map(|(index, at)| (index, base + at)));
        fragments[lo] = head;
    }

    let merged = fragments.pop().unwrap_or(Fragment {
        bytes: Vec::new(),
        members: Vec::new(),
    });
    let mut offsets = vec![0usize; inputs.len()];
    for (index, at) in merged.members {
        offsets[index] = at;
    }
    (merged.bytes, offsets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_offsets(inputs: &[Vec<u8>], merged: &[u8], offsets: &[usize]) {
        for (input, &at) in inputs.iter().zip(offsets) {
            assert_eq!(&merged[at..at + input.len()], &input[..], "offset {at}");
        }
    }

    #[test]
    fn overlapping_strings_share_bytes() {
        let inputs = vec![vec![1, 2, 3, 4], vec![3, 4, 5, 6], vec![5, 6, 7]];
        let (merged, offsets) = greedy_superstring(&inputs);
        assert_eq!(merged, vec![1, 2, 3, 4, 5, 6, 7]);
        check_offsets(&inputs, &merged, &offsets);
    }

    #[test]
    fn contained_string_is_absorbed() {
        let inputs = vec![vec![9, 8, 7, 6, 5], vec![8, 7, 6]];
        let (merged, offsets) = greedy_superstring(&inputs);
        assert_eq!(merged, vec![9, 8, 7, 6, 5]);
        assert_eq!(offsets[1], 1);
        check_offsets(&inputs, &merged, &offsets);
    }

    #[test]
    fn disjoint_strings_concatenate() {
        let inputs = vec![vec![1, 1], vec![2, 2]];
        let (merged, offsets) = greedy_superstring(&inputs);
        assert_eq!(merged.len(), 4);
        check_offsets(&inputs, &merged, &offsets);
    }

    #[test]
    fn empty_input_set() {
        let (merged, offsets) = greedy_superstring(&[]);
        assert!(merged.is_empty());
        assert!(offsets.is_empty());
    }
}
