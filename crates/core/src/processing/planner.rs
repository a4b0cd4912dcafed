//! Grouping of candidate products into tasks.

use std::collections::HashSet;

use crate::store::{Product, ProductStatus};

use super::claims::ClaimTable;
use super::types::{ClaimedTask, Task};

/// A contiguous run of candidates sharing one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetGroup<'a> {
    pub target: &'a str,
    pub products: &'a [Product],
}

impl TargetGroup<'_> {
    /// Every member is on disk and unprocessed.
    pub fn is_ready(&self) -> bool {
        self.products
            .iter()
            .all(|p| p.status == ProductStatus::Retrieved)
    }

    /// Some member is still queued and every queued member can be
    /// downloaded, so the group becomes ready once downloads catch up.
    ///
    /// A queued member without a download URL never arrives, and neither
    /// does a group with a consumed member.
    pub fn awaits_downloads(&self) -> bool {
        let mut queued = self
            .products
            .iter()
            .filter(|p| p.status == ProductStatus::Queued)
            .peekable();
        queued.peek().is_some()
            && queued.all(|p| p.download_url.is_some())
            && !self
                .products
                .iter()
                .any(|p| p.status == ProductStatus::Consumed)
    }

    /// Queued members that no download will ever bring back.
    pub fn unreachable_members(&self) -> impl Iterator<Item = &Product> + '_ {
        self.products
            .iter()
            .filter(|p| p.status == ProductStatus::Queued && p.download_url.is_none())
    }

    pub fn to_task(&self) -> Task {
        Task {
            target: self.target.to_string(),
            product_ids: self.products.iter().map(|p| p.id.clone()).collect(),
        }
    }
}

/// Split candidates, already ordered by target, into per-target groups.
pub fn group_by_target(candidates: &[Product]) -> Vec<TargetGroup<'_>> {
    candidates
        .chunk_by(|a, b| a.target == b.target)
        .map(|products| TargetGroup {
            target: &products[0].target,
            products,
        })
        .collect()
}

/// Claim and return the first ready group whose target is neither claimed
/// nor in `excluded`.
pub fn next_task(
    candidates: &[Product],
    claims: &ClaimTable,
    excluded: &HashSet<String>,
) -> Option<ClaimedTask> {
    group_by_target(candidates)
        .into_iter()
        .filter(|group| group.is_ready() && !excluded.contains(group.target))
        .find_map(|group| {
            claims.try_claim(group.target).map(|guard| ClaimedTask {
                task: group.to_task(),
                guard,
            })
        })
}
