//! # Halo Tables and Binning Schemes
//!
//! ## Role
//! Flat, column-oriented halo tables as handed over by the catalog layer, the
//! named bin-edge sequences used to grid them, and the name mapping between
//! source and target schemas.
//!
//! Tables are Structure-of-Arrays: one `halo_id` column plus any number of
//! `f64` property columns, all of the same length.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::cell::GridShape;
use crate::error::{GalsamplerError, Result};

/// Bin edges for one named halo property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyBins {
    pub name: String,
    pub edges: Vec<f64>,
}

impl PropertyBins {
    /// Create validated bins: non-empty, finite, non-decreasing edges.
    pub fn new(name: impl Into<String>, edges: Vec<f64>) -> Result<Self> {
        let bins = Self {
            name: name.into(),
            edges,
        };
        bins.validate()?;
        Ok(bins)
    }

    pub fn validate(&self) -> Result<()> {
        if self.edges.is_empty() {
            return Err(GalsamplerError::invalid_bins(format!(
                "property `{}` has no bin edges",
                self.name
            )));
        }
        if self.edges.iter().any(|e| !e.is_finite()) {
            return Err(GalsamplerError::invalid_bins(format!(
                "property `{}` has non-finite bin edges",
                self.name
            )));
        }
        if self.edges.windows(2).any(|w| w[1] < w[0]) {
            return Err(GalsamplerError::invalid_bins(format!(
                "bin edges of property `{}` are not sorted",
                self.name
            )));
        }
        Ok(())
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len()
    }
}

/// Ordered list of binned properties; the order fixes the cell-id layout.
#[derive(Clone, Debug, PartialEq)]
pub struct BinningScheme {
    properties: Vec<PropertyBins>,
    grid: GridShape,
}

impl BinningScheme {
    pub fn new(properties: Vec<PropertyBins>) -> Result<Self> {
        for bins in &properties {
            bins.validate()?;
        }
        for (i, bins) in properties.iter().enumerate() {
            if properties[..i].iter().any(|b| b.name == bins.name) {
                return Err(GalsamplerError::invalid_bins(format!(
                    "property `{}` is binned twice",
                    bins.name
                )));
            }
        }
        let grid = GridShape::new(properties.iter().map(PropertyBins::n_bins).collect())?;
        Ok(Self { properties, grid })
    }

    pub fn properties(&self) -> &[PropertyBins] {
        &self.properties
    }

    pub fn grid(&self) -> &GridShape {
        &self.grid
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }
}

/// A halo table: identifiers plus named numeric property columns.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyTable {
    pub halo_id: Vec<i64>,
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<f64>>,
}

impl PropertyTable {
    pub fn new(halo_id: Vec<i64>) -> Self {
        Self {
            halo_id,
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style column insertion
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.properties.insert(name.into(), values);
        self
    }

    pub fn len(&self) -> usize {
        self.halo_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.halo_id.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Look up a property column, failing with a schema error naming `label`.
    pub fn column(&self, name: &str, label: &str) -> Result<&[f64]> {
        self.properties
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                GalsamplerError::schema(format!("no `{}` column in {}", name, label))
            })
    }

    /// Check that every column matches the id column in length.
    pub fn validate(&self, label: &str) -> Result<()> {
        for (name, values) in &self.properties {
            if values.len() != self.halo_id.len() {
                return Err(GalsamplerError::shape(format!(
                    "column `{}` of {} has {} rows but there are {} halo ids",
                    name,
                    label,
                    values.len(),
                    self.halo_id.len()
                )));
            }
        }
        Ok(())
    }
}

/// Mapping from source-table property names to target-table property names.
///
/// Names absent from the map are looked up unchanged in the target table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCorrespondence(BTreeMap<String, String>);

impl KeyCorrespondence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source_name: impl Into<String>, target_name: impl Into<String>) -> Self {
        self.0.insert(source_name.into(), target_name.into());
        self
    }

    /// Target-table name for a source-table property
    pub fn target_name<'a>(&'a self, source_name: &'a str) -> &'a str {
        self.0.get(source_name).map(String::as_str).unwrap_or(source_name)
    }

    pub fn is_mapped(&self, source_name: &str) -> bool {
        self.0.contains_key(source_name)
    }
}

impl FromIterator<(String, String)> for KeyCorrespondence {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Verify that every binned property can be found in both tables.
pub fn enforce_key_correspondence(
    source: &PropertyTable,
    target: &PropertyTable,
    scheme: &BinningScheme,
    correspondence: &KeyCorrespondence,
) -> Result<()> {
    for name in scheme.names() {
        if !source.has_column(name) {
            return Err(GalsamplerError::schema(format!(
                "`{}` is a binning property but not in the source halos",
                name
            )));
        }
        if correspondence.is_mapped(name) {
            let target_name = correspondence.target_name(name);
            if !target.has_column(target_name) {
                return Err(GalsamplerError::schema(format!(
                    "according to the key correspondence, there should be a `{}` column \
                     in the target halos standing in for source property `{}`",
                    target_name, name
                )));
            }
        } else if !target.has_column(name) {
            return Err(GalsamplerError::schema(format!(
                "`{}` is in the source halos but not in the target halos nor the key correspondence",
                name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme(names: &[&str]) -> BinningScheme {
        BinningScheme::new(
            names
                .iter()
                .map(|n| PropertyBins::new(*n, vec![0.0, 1.0]).unwrap())
                .collect(),
        )
        .unwrap()
    }

    fn table(names: &[&str]) -> PropertyTable {
        names
            .iter()
            .fold(PropertyTable::new(vec![1]), |t, n| t.with_column(*n, vec![0.5]))
    }

    #[test]
    fn test_all_keys_present() {
        let result = enforce_key_correspondence(
            &table(&["x"]),
            &table(&["x"]),
            &scheme(&["x"]),
            &KeyCorrespondence::new(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_from_source() {
        let err = enforce_key_correspondence(
            &table(&["x"]),
            &table(&["x"]),
            &scheme(&["x", "y"]),
            &KeyCorrespondence::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not in the source halos"));
    }

    #[test]
    fn test_missing_from_target() {
        let err = enforce_key_correspondence(
            &table(&["x", "y"]),
            &table(&["x"]),
            &scheme(&["x", "y"]),
            &KeyCorrespondence::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("nor the key correspondence"));
    }

    #[test]
    fn test_bad_correspondence() {
        let err = enforce_key_correspondence(
            &table(&["x", "y"]),
            &table(&["x", "z"]),
            &scheme(&["x", "y"]),
            &KeyCorrespondence::new().with("y", "t"),
        )
        .unwrap_err();
        assert!(matches!(err, GalsamplerError::Schema { .. }));
        assert!(err.to_string().contains("`t`"));
    }

    #[test]
    fn test_good_correspondence() {
        let result = enforce_key_correspondence(
            &table(&["x", "y"]),
            &table(&["x", "z"]),
            &scheme(&["x", "y"]),
            &KeyCorrespondence::new().with("y", "z"),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_unsorted_edges_rejected() {
        assert!(PropertyBins::new("mass", vec![1.0, 0.5]).is_err());
        assert!(PropertyBins::new("mass", vec![]).is_err());
        assert!(PropertyBins::new("mass", vec![0.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let bins = PropertyBins::new("mass", vec![0.0, 1.0]).unwrap();
        assert!(BinningScheme::new(vec![bins.clone(), bins]).is_err());
    }

    #[test]
    fn test_table_validate() {
        let t = PropertyTable::new(vec![1, 2]).with_column("mass", vec![1.0]);
        assert!(matches!(
            t.validate("target halos"),
            Err(GalsamplerError::Shape { .. })
        ));
    }
}
