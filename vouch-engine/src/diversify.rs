//! Diversification of a ranked list

/// Reorder `items` so that no two neighbours share a key while an item with
/// a different key is still available.
///
/// Picks greedily in rank order: the best remaining item whose key differs
/// from the previous pick, or the best remaining item if none does. Returns at
/// most `limit` items; lists shorter than two come back unchanged.
pub fn diversify_by_key<T, K, F>(items: Vec<T>, limit: usize, key: F) -> Vec<T>
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    if items.len() < 2 {
        return items;
    }
    let limit = limit.min(items.len());
    let keys: Vec<K> = items.iter().map(&key).collect();
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut picked = Vec::with_capacity(limit);
    let mut previous: Option<usize> = None;

    for _ in 0..limit {
        let mut first_free = None;
        let mut diverse = None;
        for (index, slot) in slots.iter().enumerate() {
            if slot.is_none() {
                continue;
            }
            first_free.get_or_insert(index);
            if previous.map_or(true, |p| keys[p] != keys[index]) {
                diverse = Some(index);
                break;
            }
        }
        let Some(index) = diverse.or(first_free) else {
            break;
        };
        if let Some(item) = slots[index].take() {
            picked.push(item);
        }
        previous = Some(index);
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_interleaves_keys() {
        let items = vec![(1, 'a'), (2, 'a'), (3, 'a'), (4, 'b'), (5, 'b')];
        let result = diversify_by_key(items, 10, |i| i.1);
        let ids: Vec<u32> = result.iter().map(|i| i.0).collect();
        assert_eq!(ids, vec![1, 4, 2, 5, 3]);
    }

    #[test]
    fn test_limit_and_forward_progress() {
        let items = vec![(1, 'a'), (2, 'a'), (3, 'a')];
        let result = diversify_by_key(items, 2, |i| i.1);
        assert_eq!(result, vec![(1, 'a'), (2, 'a')]);
        assert_eq!(diversify_by_key(vec![(9, 'z')], 0, |i| i.1), vec![(9, 'z')]);
    }

    #[test]
    fn test_no_avoidable_neighbours() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let len = rng.gen_range(0..30);
            let items: Vec<(usize, u8)> = (0..len).map(|i| (i, rng.gen_range(0..4))).collect();
            let limit = rng.gen_range(1..40);
            let result = diversify_by_key(items.clone(), limit, |i| i.1);

            assert_eq!(result.len(), limit.min(len));
            for i in 1..result.len() {
                if result[i].1 != result[i - 1].1 {
                    continue;
                }
                // Only allowed when everything not yet placed shares the key.
                let placed: Vec<usize> = result[..i].iter().map(|p| p.0).collect();
                assert!(items
                    .iter()
                    .filter(|item| !placed.contains(&item.0))
                    .all(|item| item.1 == result[i].1));
            }
        }
    }
}
