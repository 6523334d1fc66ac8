//! Orientation-free facet keys and the per-partition facet table.
//!
//! Two cells on different ranks share a facet exactly when the sorted global
//! IDs of the facet's points agree, so the key is that sorted list. No
//! coordinates are compared.

use std::fmt;

use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshGhostError;
use crate::overlap::perf::{FastMap, map_with_capacity};

/// Globally unique point identifier (`vtkIdType`-compatible).
pub type GlobalId = i64;

/// Sorted global point IDs of a facet (or a whole cell).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceKey(Box<[GlobalId]>);

impl FaceKey {
    pub fn from_ids<I: IntoIterator<Item = GlobalId>>(ids: I) -> Self {
        let mut v: Vec<GlobalId> = ids.into_iter().collect();
        v.sort_unstable();
        FaceKey(v.into_boxed_slice())
    }

    pub fn ids(&self) -> &[GlobalId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Dotted form, e.g. `3.7.9.`.
impl fmt::Display for FaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.0.iter() {
            write!(f, "{id}.")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FaceKey").field(&self.to_string()).finish()
    }
}

/// Cells adjacent to one facet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FacetAdjacency {
    /// Local point indices of the facet, in the first cell's orientation.
    pub points: Box<[usize]>,
    cells: [usize; 2],
    count: u8,
}

impl FacetAdjacency {
    pub fn cells(&self) -> &[usize] {
        &self.cells[..self.count as usize]
    }

    /// A facet seen by exactly one cell lies on the partition surface.
    pub fn is_boundary(&self) -> bool {
        self.count == 1
    }
}

/// Facet key → adjacent cells, for one mesh.
#[derive(Clone, Debug, Default)]
pub struct FacetTable {
    facets: FastMap<FaceKey, FacetAdjacency>,
}

type CellFacets = Vec<(FaceKey, Box<[usize]>)>;

fn cell_facets(mesh: &UnstructuredMesh, global_ids: &[GlobalId], c: usize) -> CellFacets {
    let ct = mesh.cell_type(c);
    let pts = mesh.cell_points(c);
    let mut local = Vec::with_capacity(4);
    (0..ct.num_facets())
        .map(|f| {
            ct.facet_local_points(f, &mut local);
            let facet_pts: Box<[usize]> = local.iter().map(|&l| pts[l]).collect();
            let key = FaceKey::from_ids(facet_pts.iter().map(|&p| global_ids[p]));
            (key, facet_pts)
        })
        .collect()
}

impl FacetTable {
    /// Key every facet of every cell and record up to two adjacent cells.
    ///
    /// `global_ids` must hold one ID per mesh point. A facet claimed by a third
    /// cell is a [`MeshGhostError::NonManifoldFace`].
    pub fn build(mesh: &UnstructuredMesh, global_ids: &[GlobalId]) -> Result<Self, MeshGhostError> {
        if global_ids.len() != mesh.num_points() {
            return Err(MeshGhostError::InvalidGlobalIds {
                name: "<facet table>".into(),
                reason: format!("{} ids for {} points", global_ids.len(), mesh.num_points()),
            });
        }

        #[cfg(feature = "rayon")]
        let per_cell: Vec<CellFacets> = {
            use rayon::prelude::*;
            (0..mesh.num_cells())
                .into_par_iter()
                .map(|c| cell_facets(mesh, global_ids, c))
                .collect()
        };
        #[cfg(not(feature = "rayon"))]
        let per_cell: Vec<CellFacets> = (0..mesh.num_cells())
            .map(|c| cell_facets(mesh, global_ids, c))
            .collect();

        let mut facets: FastMap<FaceKey, FacetAdjacency> = map_with_capacity(mesh.num_cells() * 4);
        for (c, list) in per_cell.into_iter().enumerate() {
            for (key, points) in list {
                match facets.get_mut(&key) {
                    None => {
                        facets.insert(
                            key,
                            FacetAdjacency {
                                points,
                                cells: [c, usize::MAX],
                                count: 1,
                            },
                        );
                    }
                    Some(adj) if adj.count == 1 => {
                        adj.cells[1] = c;
                        adj.count = 2;
                    }
                    Some(adj) => {
                        let mut cells = adj.cells().to_vec();
                        cells.push(c);
                        return Err(MeshGhostError::NonManifoldFace {
                            face: key.to_string(),
                            cells,
                        });
                    }
                }
            }
        }
        Ok(Self { facets })
    }

    pub fn len(&self) -> usize {
        self.facets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }

    pub fn get(&self, key: &FaceKey) -> Option<&FacetAdjacency> {
        self.facets.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FaceKey, &FacetAdjacency)> {
        self.facets.iter()
    }

    /// Facets with exactly one adjacent cell.
    pub fn boundary_facets(&self) -> impl Iterator<Item = (&FaceKey, &FacetAdjacency)> {
        self.facets.iter().filter(|(_, adj)| adj.is_boundary())
    }
}
