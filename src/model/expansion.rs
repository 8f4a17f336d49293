//! # Galaxy Expansion
//!
//! ## Role
//! Turn one selected source halo into the galaxies it hosts.
//!
//! ## Precondition
//! The galaxy table must be ordered by host halo id so the residents of a
//! halo form one contiguous run. [`HostSortedGalaxies`] carries that
//! guarantee in its type: it either sorts the host ids itself (remembering
//! the permutation back to the caller's rows) or checks the caller's claim.
//!
//! ## Kernel
//! [`expand_to_galaxies`] walks `(first, count)` pairs in selection order and
//! emits `first..first + count` for each. Order is preserved exactly, so a
//! parallel [`repeat_ids`] over the same counts stays in lockstep.

use crate::error::{GalsamplerError, Result};
use crate::model::richness::HostCounts;

/// Emit the contiguous galaxy run of every selection, in order.
///
/// Output length is `Σ counts`.
pub fn expand_to_galaxies(first: &[usize], counts: &[u32]) -> Result<Vec<usize>> {
    GalsamplerError::check_len("counts", counts.len(), "first", first.len())?;
    let total: usize = counts.iter().map(|&c| c as usize).sum();
    let mut out = Vec::with_capacity(total);
    for (&start, &n) in first.iter().zip(counts) {
        out.extend(start..start + n as usize);
    }
    Ok(out)
}

/// Repeat `values[i]` `counts[i]` times, in order.
pub fn repeat_ids<T: Copy>(values: &[T], counts: &[u32]) -> Result<Vec<T>> {
    GalsamplerError::check_len("counts", counts.len(), "values", values.len())?;
    let total: usize = counts.iter().map(|&c| c as usize).sum();
    let mut out = Vec::with_capacity(total);
    for (&v, &n) in values.iter().zip(counts) {
        out.extend(std::iter::repeat(v).take(n as usize));
    }
    Ok(out)
}

/// Galaxy host ids in ascending order, with the first row of every host.
#[derive(Clone, Debug)]
pub struct HostSortedGalaxies {
    /// Host id of every galaxy, ascending
    host_ids: Vec<i64>,
    /// `order[k]` is the caller's row of the galaxy at sorted position `k`
    order: Vec<usize>,
    hosts: HostCounts,
    /// Sorted position of the first galaxy of every distinct host
    first: Vec<usize>,
}

impl HostSortedGalaxies {
    /// Stable sort of the caller's galaxies by host id.
    pub fn from_unsorted(host_ids: &[i64]) -> Self {
        let mut order: Vec<usize> = (0..host_ids.len()).collect();
        order.sort_by_key(|&row| host_ids[row]);
        let sorted: Vec<i64> = order.iter().map(|&row| host_ids[row]).collect();
        Self::build(sorted, order)
    }

    /// Wrap host ids the caller claims are already ascending.
    pub fn from_sorted(host_ids: Vec<i64>) -> Result<Self> {
        if let Some(pos) = host_ids.windows(2).position(|w| w[1] < w[0]) {
            return Err(GalsamplerError::invalid_data(format!(
                "galaxies are not sorted by host halo id: row {} has host {} after host {}",
                pos + 1,
                host_ids[pos + 1],
                host_ids[pos]
            )));
        }
        let order = (0..host_ids.len()).collect();
        Ok(Self::build(host_ids, order))
    }

    fn build(host_ids: Vec<i64>, order: Vec<usize>) -> Self {
        let hosts = HostCounts::from_sorted(&host_ids);
        let mut first = Vec::with_capacity(hosts.len());
        let mut pos = 0usize;
        for &n in hosts.counts() {
            first.push(pos);
            pos += n as usize;
        }
        Self {
            host_ids,
            order,
            hosts,
            first,
        }
    }

    pub fn len(&self) -> usize {
        self.host_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host_ids.is_empty()
    }

    pub fn host_ids(&self) -> &[i64] {
        &self.host_ids
    }

    pub fn hosts(&self) -> &HostCounts {
        &self.hosts
    }

    /// Caller's row of the galaxy at sorted position `pos`
    #[inline]
    pub fn original_row(&self, pos: usize) -> usize {
        self.order[pos]
    }

    /// Sorted position of the first galaxy hosted by `halo_id`
    pub fn first_index(&self, halo_id: i64) -> Option<usize> {
        self.hosts.position(halo_id).map(|p| self.first[p])
    }

    /// Galaxies hosted by `halo_id`
    pub fn richness(&self, halo_id: i64) -> u32 {
        self.hosts.count_of(halo_id)
    }
}
