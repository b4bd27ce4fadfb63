//! Terminus resolution: nearest ancestor on every sibling branch

use tracing::debug;

use crate::{CallGuard, ChainClient, Hash, Header, HierarchyError, Level, Result, TerminusVector};

pub struct TerminusResolver {
    genesis: Hash,
    branching: usize,
    max_steps: usize,
    guard: CallGuard,
}

impl TerminusResolver {
    pub fn new(genesis: Hash, branching: usize, max_steps: usize) -> Self {
        Self {
            genesis,
            branching,
            max_steps,
            guard: CallGuard::unbounded(),
        }
    }

    pub fn with_guard(mut self, guard: CallGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Walk back from `reference` along `level`'s parent pointers, recording the
    /// first hash seen on each sibling branch. Stops when every slot is filled
    /// or genesis is reached; genesis fills whatever is left.
    pub async fn resolve<C>(&self, client: &C, level: Level, reference: Hash) -> Result<TerminusVector>
    where
        C: ChainClient + ?Sized,
    {
        let mut termini = TerminusVector::new(self.branching, reference);
        if level == Level::Zone {
            return Ok(termini);
        }

        let mut header = self.fetch(client, level, reference).await?;
        let slot = self.branch_of(&header, level)?;
        termini.fill_if_empty(slot, reference);

        let mut steps = 0usize;
        loop {
            if termini.is_complete() {
                break;
            }
            if header.hash() == self.genesis {
                termini.fill_remaining(self.genesis);
                debug!(%level, %reference, steps, "termini: reached genesis");
                break;
            }
            if steps >= self.max_steps {
                return Err(HierarchyError::StuckWalk {
                    level,
                    reference,
                    steps,
                    filled: termini.filled(),
                });
            }
            steps += 1;

            let parent = self.fetch(client, level, header.parent_hash(level)).await?;
            let slot = self.branch_of(&parent, level)?;
            if termini.fill_if_empty(slot, parent.hash()) {
                debug!(%level, slot, hash = %parent.hash(), "termini: branch resolved");
            }
            header = parent;
        }

        Ok(termini)
    }

    async fn fetch<C>(&self, client: &C, level: Level, hash: Hash) -> Result<Header>
    where
        C: ChainClient + ?Sized,
    {
        self.guard
            .call(
                || format!("{level} header {hash} from {}", client.endpoint()),
                client.header_by_hash(hash),
            )
            .await
    }

    fn branch_of(&self, header: &Header, level: Level) -> Result<usize> {
        let Some(index) = header.location().branch_at(level) else {
            return Err(HierarchyError::Shape(format!(
                "{level} blocks have no sibling branches (header {})",
                header.hash()
            )));
        };
        if index >= self.branching {
            return Err(HierarchyError::LocationOutOfRange {
                level,
                index,
                branching: self.branching,
                hash: header.hash(),
            });
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Coordinate;

    fn header(location: Coordinate) -> Header {
        Header {
            hash: Hash([5; 32]),
            parent_hashes: [Hash::ZERO; 3],
            numbers: [1; 3],
            location,
        }
    }

    #[test]
    fn test_branch_of_uses_the_walked_tier() {
        let resolver = TerminusResolver::new(Hash([1; 32]), 3, 10);
        let h = header(Coordinate::new(2, 1));
        assert_eq!(resolver.branch_of(&h, Level::Top).unwrap(), 2);
        assert_eq!(resolver.branch_of(&h, Level::Region).unwrap(), 1);
    }

    #[test]
    fn test_branch_of_rejects_zone_tier() {
        let resolver = TerminusResolver::new(Hash([1; 32]), 3, 10);
        let h = header(Coordinate::new(0, 0));
        assert!(matches!(resolver.branch_of(&h, Level::Zone), Err(HierarchyError::Shape(_))));
    }
}
