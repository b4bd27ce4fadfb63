//! Top-down propagation of one bad top-tier hash through every region and zone

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    CallGuard, ChainClient, ClientPool, Hash, Header, HierarchyError, Level, Result,
    TerminusResolver, TerminusVector,
};

/// Replacement hash per chain: the first block past each terminus
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadHashes {
    pub top: Hash,
    pub regions: Vec<Hash>,
    pub zones: Vec<Vec<Hash>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Propagation {
    pub bad_hashes: BadHashes,
    pub top_termini: TerminusVector,
    pub region_termini: Vec<TerminusVector>,
}

pub struct HierarchyWalker<'a, C> {
    pool: &'a ClientPool<C>,
    resolver: TerminusResolver,
    guard: CallGuard,
}

impl<'a, C: ChainClient> HierarchyWalker<'a, C> {
    pub fn new(pool: &'a ClientPool<C>, genesis: Hash, max_steps: usize) -> Self {
        Self {
            pool,
            resolver: TerminusResolver::new(genesis, pool.branching(), max_steps),
            guard: CallGuard::unbounded(),
        }
    }

    pub fn with_guard(mut self, guard: CallGuard) -> Self {
        self.resolver = self.resolver.with_guard(guard.clone());
        self.guard = guard;
        self
    }

    /// Cascade `bad` down the hierarchy.
    ///
    /// Tiers run strictly top-down; siblings within a tier run concurrently and
    /// the first failure aborts the whole walk.
    pub async fn propagate(&self, bad: Hash) -> Result<Propagation> {
        let top = self.pool.top()?;
        let bad_header = self.fetch(top, Level::Top, bad).await?;
        let seed = bad_header.parent_hash(Level::Top);
        info!(%bad, %seed, "walker: resolving top termini");

        let top_termini = self.resolver.resolve(top, Level::Top, seed).await?;
        debug!(termini = ?top_termini, "walker: top termini");

        let r = self.pool.branching();
        let regions = try_join_all((0..r).map(|i| self.walk_region(i, &top_termini))).await?;
        let (region_termini, region_bad): (Vec<TerminusVector>, Vec<Hash>) =
            regions.into_iter().unzip();

        let zone_bad = try_join_all((0..r).map(|i| {
            let termini = &region_termini[i];
            try_join_all((0..r).map(move |j| async move {
                let client = self.pool.zone(i, j)?;
                let anchor = termini
                    .branch(j)
                    .ok_or_else(|| HierarchyError::Shape(format!("region {i} termini lack zone {j}")))?;
                let next = self.next_after(client, Level::Zone, anchor).await?;
                debug!(region = i, zone = j, %anchor, %next, "walker: zone resolved");
                Ok::<Hash, HierarchyError>(next)
            }))
        }))
        .await?;

        info!(%bad, "walker: propagation complete");
        Ok(Propagation {
            bad_hashes: BadHashes {
                top: bad,
                regions: region_bad,
                zones: zone_bad,
            },
            top_termini,
            region_termini,
        })
    }

    /// Region `i`: its own termini (seeds the zone tier) and its replacement hash
    async fn walk_region(&self, i: usize, top_termini: &TerminusVector) -> Result<(TerminusVector, Hash)> {
        let client = self.pool.region(i)?;
        let anchor = top_termini
            .branch(i)
            .ok_or_else(|| HierarchyError::Shape(format!("top termini lack region {i}")))?;

        let (termini, next) = tokio::try_join!(
            self.resolver.resolve(client, Level::Region, anchor),
            self.next_after(client, Level::Region, anchor),
        )?;
        debug!(region = i, %anchor, %next, termini = ?termini, "walker: region resolved");
        Ok((termini, next))
    }

    /// Hash of the block one height past `terminus` on `client`'s chain
    async fn next_after(&self, client: &C, level: Level, terminus: Hash) -> Result<Hash> {
        let header = self.fetch(client, level, terminus).await?;
        let height = header
            .number(level)
            .checked_add(1)
            .ok_or_else(|| HierarchyError::Decode(format!("{level} height overflow at {terminus}")))?;

        let next = self
            .guard
            .call(
                || format!("{level} height {height} from {}", client.endpoint()),
                client.header_by_number(height),
            )
            .await?;
        Ok(next.hash())
    }

    async fn fetch(&self, client: &C, level: Level, hash: Hash) -> Result<Header> {
        self.guard
            .call(
                || format!("{level} header {hash} from {}", client.endpoint()),
                client.header_by_hash(hash),
            )
            .await
    }
}
