//! # Halo Richness
//!
//! Occupation number of every halo: how many galaxies name it as their host.
//! The lookup is a join on id value, not on position, so `halo_ids` may be
//! unsorted and may contain ids that no galaxy references (richness 0).

/// Sorted unique host ids with their multiplicities.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostCounts {
    ids: Vec<i64>,
    counts: Vec<u32>,
}

impl HostCounts {
    /// Count occurrences of every distinct id in `host_ids`.
    pub fn from_host_ids(host_ids: &[i64]) -> Self {
        let mut sorted = host_ids.to_vec();
        sorted.sort_unstable();
        Self::from_sorted(&sorted)
    }

    /// Same as [`HostCounts::from_host_ids`] for input already sorted ascending.
    pub fn from_sorted(sorted: &[i64]) -> Self {
        let mut ids = Vec::new();
        let mut counts: Vec<u32> = Vec::new();
        for &id in sorted {
            match ids.last() {
                Some(&last) if last == id => {
                    if let Some(c) = counts.last_mut() {
                        *c += 1;
                    }
                }
                _ => {
                    ids.push(id);
                    counts.push(1);
                }
            }
        }
        Self { ids, counts }
    }

    /// Number of distinct hosts
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Position of `id` among the distinct hosts
    #[inline]
    pub fn position(&self, id: i64) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }

    /// Occupation of `id`, 0 when no galaxy references it
    #[inline]
    pub fn count_of(&self, id: i64) -> u32 {
        self.position(id).map_or(0, |pos| self.counts[pos])
    }
}

/// Richness of every halo in `halo_ids`, counted from the galaxies' `host_ids`.
pub fn compute_richness(halo_ids: &[i64], host_ids: &[i64]) -> Vec<u32> {
    let counts = HostCounts::from_host_ids(host_ids);
    halo_ids.iter().map(|&id| counts.count_of(id)).collect()
}
