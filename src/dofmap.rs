//! Global DoF ordering and per-element index tables

use crate::dof::{Dof, DofKey};
use crate::elements::Element;
use log::debug;
use std::collections::{HashMap, HashSet};

/// Per-element mapping from local DoF positions to global indices.
///
/// `entries` is sorted ascending by global index, which lets the assembler
/// stop scanning as soon as it reaches the fixed block and keeps the
/// column-oriented scatter aligned with the upper-triangle storage.
/// `globals` keeps the plain local order for gathering the element's current
/// DoF values.
#[derive(Debug, Clone)]
pub struct IndexTable {
    entries: Vec<(usize, usize)>,
    globals: Vec<usize>,
}

impl IndexTable {
    fn new(globals: Vec<usize>) -> Self {
        let mut entries: Vec<(usize, usize)> = globals
            .iter()
            .enumerate()
            .map(|(local, &global)| (local, global))
            .collect();
        entries.sort_by_key(|&(_, global)| global);
        Self { entries, globals }
    }

    /// `(local, global)` pairs sorted ascending by global index.
    pub fn entries(&self) -> &[(usize, usize)] {
        &self.entries
    }

    /// Number of local DoFs.
    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }

    /// Collect the element's DoFs in local order from the global store.
    pub fn gather(&self, dofs: &[Dof]) -> Vec<Dof> {
        self.globals.iter().map(|&global| dofs[global]).collect()
    }
}

/// Global DoF ordering: free DoFs first, then fixed DoFs.
///
/// Built once from the element list and immutable in structure afterwards;
/// only the DoF values mutate, and only through the Newton driver. The
/// fixed flag of each DoF is snapshotted here — flipping it later has no
/// effect on the ordering.
#[derive(Debug)]
pub struct DofMap {
    dofs: Vec<Dof>,
    index: HashMap<DofKey, usize>,
    tables: Vec<IndexTable>,
    n_free: usize,
}

impl DofMap {
    /// Scan the elements in input order and build the global ordering.
    ///
    /// Each element's DoF list is queried exactly once. DoFs are
    /// deduplicated by identity key; the first occurrence wins and later
    /// mentions of the same key map to the same global index.
    pub fn build(elements: &[Box<dyn Element>]) -> Self {
        let dof_lists: Vec<Vec<Dof>> = elements.iter().map(|e| e.dofs()).collect();

        let mut free_dofs: Vec<Dof> = Vec::new();
        let mut fixed_dofs: Vec<Dof> = Vec::new();
        let mut seen: HashSet<DofKey> = HashSet::new();

        for dofs in &dof_lists {
            for dof in dofs {
                if seen.insert(dof.key) {
                    if dof.fixed {
                        fixed_dofs.push(*dof);
                    } else {
                        free_dofs.push(*dof);
                    }
                }
            }
        }

        let n_free = free_dofs.len();
        let mut all = free_dofs;
        all.append(&mut fixed_dofs);

        let index: HashMap<DofKey, usize> = all
            .iter()
            .enumerate()
            .map(|(i, dof)| (dof.key, i))
            .collect();

        let tables: Vec<IndexTable> = dof_lists
            .iter()
            .map(|dofs| IndexTable::new(dofs.iter().map(|dof| index[&dof.key]).collect()))
            .collect();

        debug!(
            "indexed {} dofs ({} free, {} fixed) across {} elements",
            all.len(),
            n_free,
            all.len() - n_free,
            elements.len()
        );

        Self {
            dofs: all,
            index,
            tables,
            n_free,
        }
    }

    /// Total DoF count `N`.
    pub fn len(&self) -> usize {
        self.dofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dofs.is_empty()
    }

    /// Free DoF count `F`; free DoFs occupy global indices `[0, F)`.
    pub fn n_free(&self) -> usize {
        self.n_free
    }

    /// The global DoF vector, free block first.
    pub fn dofs(&self) -> &[Dof] {
        &self.dofs
    }

    pub fn dof_mut(&mut self, index: usize) -> &mut Dof {
        &mut self.dofs[index]
    }

    /// Global index of a DoF by identity key.
    pub fn index_of(&self, key: DofKey) -> Option<usize> {
        self.index.get(&key).copied()
    }

    /// Per-element index tables, one per input element.
    pub fn tables(&self) -> &[IndexTable] {
        &self.tables
    }
}
