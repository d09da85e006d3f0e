/**
 * LatentReco
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Result type used to find the top-k most similar entities via a binary heap
#[derive(PartialEq,Debug,Clone)]
pub struct ScoredItem {
    pub item: u32,
    pub score: f64,
}

/// Ordering for our max-heap, not that we must use a special implementation here as there is no
/// total order on floating point numbers. The ordering is reversed, so that the heap's top is the
/// lowest scored item, which is the one to evict.
fn cmp_reverse(scored_item_a: &ScoredItem, scored_item_b: &ScoredItem) -> Ordering {
    match scored_item_a.score.partial_cmp(&scored_item_b.score) {
        Some(Ordering::Less) => Ordering::Greater,
        Some(Ordering::Greater) => Ordering::Less,
        Some(Ordering::Equal) => Ordering::Equal,
        None => Ordering::Equal
    }
}

impl Eq for ScoredItem {}

impl Ord for ScoredItem {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_reverse(self, other)
    }
}

impl PartialOrd for ScoredItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(cmp_reverse(self, other))
    }
}

/// Keeps the `k` highest scored items, returned in descending order of score.
pub fn top_k<I>(scored_items: I, k: usize) -> Vec<ScoredItem>
    where I: Iterator<Item=ScoredItem> {

    if k == 0 {
        return Vec::new();
    }

    let mut heap = BinaryHeap::with_capacity(k);

    for scored_item in scored_items {
        if heap.len() < k {
            heap.push(scored_item);
        } else if let Some(mut top) = heap.peek_mut() {
            if scored_item < *top {
                *top = scored_item;
            }
        }
    }

    heap.into_sorted_vec()
}

#[cfg(test)]
mod tests {

    use std::f64::EPSILON;
    use crate::scored::{self, ScoredItem};

    #[test]
    fn scored_item_ordering_reversed() {
        let item_a = ScoredItem { item: 1, score: 0.5 };
        let item_b = ScoredItem { item: 2, score: 1.5 };
        let item_c = ScoredItem { item: 3, score: 0.3 };

        assert!(item_a > item_b);
        assert!(item_a < item_c);
        assert!(item_b < item_c);
    }

    fn within_epsilon(value: f64, expected: f64) -> bool {
        (value - expected).abs() < EPSILON
    }

    #[test]
    fn topk() {

        let items = vec![
            ScoredItem { item: 1, score: 0.5 },
            ScoredItem { item: 2, score: 1.5 },
            ScoredItem { item: 3, score: 0.3 },
            ScoredItem { item: 4, score: 3.5 },
            ScoredItem { item: 5, score: 2.5 },
        ];

        let top_k = scored::top_k(items.into_iter(), 3);

        assert_eq!(top_k.len(), 3);

        assert_eq!(top_k[0].item, 4);
        assert!(within_epsilon(top_k[0].score, 3.5));

        assert_eq!(top_k[1].item, 5);
        assert!(within_epsilon(top_k[1].score, 2.5));

        assert_eq!(top_k[2].item, 2);
        assert!(within_epsilon(top_k[2].score, 1.5));
    }

    #[test]
    fn topk_with_fewer_items_than_k() {
        let items = vec![ScoredItem { item: 9, score: 0.1 }];
        assert_eq!(scored::top_k(items.clone().into_iter(), 5).len(), 1);
        assert!(scored::top_k(items.into_iter(), 0).is_empty());
    }
}
