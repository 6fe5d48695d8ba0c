use std::collections::{BTreeMap, BTreeSet};

use anyhow::bail;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize, Serializer};

use crate::sparse::{SparseMatrix, SparseVector};
use crate::transform::{check_columns, not_fitted, FeatureTransform};
use crate::utils::FloatOps;

const NAME: &str = "ColumnSelectorTransform";

/// Fitted state of a [`ColumnSelectorTransform`]: an injective map from
/// source columns to dense output columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ColumnSelectionParts")]
pub struct ColumnSelection {
    /// Source column index -> dense output column index.
    #[serde(serialize_with = "serialize_index_pairs")]
    selected_cols: BTreeMap<usize, usize>,
    /// One past the largest output index, zero when nothing was selected.
    n_cols_selected: usize,
    /// Column count of the matrix the selection was fitted on.
    n_cols_source: usize,
}

/// The index map travels as `[source, target]` pairs; JSON object keys are
/// strings and do not survive the tagged `Transform` enum as integers.
#[derive(Deserialize)]
struct ColumnSelectionParts {
    selected_cols: Vec<(usize, usize)>,
    n_cols_selected: usize,
    n_cols_source: usize,
}

fn serialize_index_pairs<S: Serializer>(map: &BTreeMap<usize, usize>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(map.iter())
}

impl TryFrom<ColumnSelectionParts> for ColumnSelection {
    type Error = anyhow::Error;

    fn try_from(parts: ColumnSelectionParts) -> anyhow::Result<Self> {
        let n_pairs = parts.selected_cols.len();
        let selected_cols: BTreeMap<usize, usize> = parts.selected_cols.into_iter().collect();
        if selected_cols.len() != n_pairs {
            bail!("{}: a source column is mapped more than once", NAME);
        }
        ColumnSelection::new(selected_cols, parts.n_cols_selected, parts.n_cols_source)
    }
}

impl ColumnSelection {
    /// Checks that every source lies below `n_cols_source`, every target
    /// below `n_cols_selected`, and that no two sources share a target.
    pub fn new(
        selected_cols: BTreeMap<usize, usize>,
        n_cols_selected: usize,
        n_cols_source: usize,
    ) -> anyhow::Result<Self> {
        let mut targets = BTreeSet::new();
        for (&source, &target) in &selected_cols {
            if source >= n_cols_source {
                bail!(
                    "{}: source column {} is outside the {} fitted columns",
                    NAME,
                    source,
                    n_cols_source
                );
            }
            if target >= n_cols_selected {
                bail!(
                    "{}: target column {} is outside the {} selected columns",
                    NAME,
                    target,
                    n_cols_selected
                );
            }
            if !targets.insert(target) {
                bail!("{}: target column {} is shared by several sources", NAME, target);
            }
        }
        Ok(ColumnSelection {
            selected_cols,
            n_cols_selected,
            n_cols_source,
        })
    }

    pub fn selected_cols(&self) -> &BTreeMap<usize, usize> {
        &self.selected_cols
    }

    pub fn n_cols_selected(&self) -> usize {
        self.n_cols_selected
    }

    pub fn n_cols_source(&self) -> usize {
        self.n_cols_source
    }
}

/// Drops columns with fewer than `min_nonzero_count` stored entries (and
/// columns with none at all), then renumbers the surviving columns densely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSelectorTransform {
    min_nonzero_count: usize,
    selection: Option<ColumnSelection>,
}

impl ColumnSelectorTransform {
    pub fn new(min_nonzero_count: usize) -> Self {
        ColumnSelectorTransform {
            min_nonzero_count,
            selection: None,
        }
    }

    pub fn min_nonzero_count(&self) -> usize {
        self.min_nonzero_count
    }

    pub fn selection(&self) -> Option<&ColumnSelection> {
        self.selection.as_ref()
    }

    fn fitted(&self) -> anyhow::Result<&ColumnSelection> {
        self.selection().ok_or_else(|| not_fitted(NAME))
    }
}

impl<T: FloatOps> FeatureTransform<T> for ColumnSelectorTransform {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_fitted(&self) -> bool {
        self.selection.is_some()
    }

    fn fit_transform(&mut self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()> {
        let selected_cols = matrix.select_cols(self.min_nonzero_count)?;
        let n_cols_selected = selected_cols.values().max().map_or(0, |&max| max + 1);
        debug!(
            "{}: kept {} of {} columns with at least {} stored entries",
            NAME,
            n_cols_selected,
            matrix.ncols(),
            self.min_nonzero_count
        );
        self.selection = Some(ColumnSelection {
            selected_cols,
            n_cols_selected,
            n_cols_source: matrix.ncols(),
        });
        self.transform(matrix)
    }

    fn transform(&self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()> {
        let selection = self.fitted()?;
        check_columns(NAME, matrix, selection.n_cols_source)?;
        trace!("{}: transforming {}x{} matrix", NAME, matrix.nrows(), matrix.ncols());
        matrix.apply_col_selector(&selection.selected_cols, selection.n_cols_selected)
    }

    fn transform_vector(&self, vector: &mut SparseVector<T>) -> anyhow::Result<()> {
        if vector.is_empty() {
            // Still move an empty row into the output space so it can sit in a
            // selected matrix, but never fail on it.
            if let Some(selection) = &self.selection {
                vector.apply_index_selector(&selection.selected_cols, selection.n_cols_selected)?;
            }
            return Ok(());
        }
        let selection = self.fitted()?;
        if vector.dim() != selection.n_cols_source {
            bail!(
                "{} was fitted on {} columns but the vector has dimension {}",
                NAME,
                selection.n_cols_source,
                vector.dim()
            );
        }
        vector.apply_index_selector(&selection.selected_cols, selection.n_cols_selected)
    }

    /// Output has one slot per selected column. A slot no source column maps
    /// to stays an empty string.
    fn remap_feature_names(&self, names: Vec<String>) -> anyhow::Result<Vec<String>> {
        let selection = self.fitted()?;
        if names.len() != selection.n_cols_source {
            warn!(
                "{}: got {} feature names for {} fitted columns",
                NAME,
                names.len(),
                selection.n_cols_source
            );
        }
        let mut selected = vec![String::new(); selection.selected_cols.len()];
        for (source, name) in names.into_iter().enumerate() {
            if let Some(slot) = selection
                .selected_cols
                .get(&source)
                .and_then(|&target| selected.get_mut(target))
            {
                *slot = name;
            }
        }
        Ok(selected)
    }
}
