// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::item::{Item, Partition};

/// Number of partitions actually used for `item_count` items
pub fn partition_count(item_count: usize, parallelism: usize) -> usize {
    parallelism.max(1).min(item_count)
}

/// Split `items` into `min(parallelism, items.len())` contiguous partitions.
///
/// Every partition but the last gets `floor(N / K)` items; the last one
/// absorbs the remainder. Input order is preserved, so concatenating the
/// partitions in index order yields `items` again.
pub fn split_items(items: &[Item], parallelism: usize) -> Vec<Partition> {
    let count = partition_count(items.len(), parallelism);
    if count == 0 {
        return Vec::new();
    }

    let chunk = items.len() / count;
    (0..count)
        .map(|index| {
            let start = index * chunk;
            let end = if index + 1 == count {
                items.len()
            } else {
                start + chunk
            };
            Partition {
                index,
                items: items[start..end].to_vec(),
            }
        })
        .collect()
}
