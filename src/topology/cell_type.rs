//! Cell type metadata and facet tables for mesh cells.
//!
//! Facets are the codimension-1 entities of a cell: the end points of a
//! segment, the edges of a 2D cell and the faces of a 3D cell. Local point
//! orderings follow the legacy VTK conventions so meshes written with
//! [`crate::io::vtk`] round-trip through standard viewers.

use serde::{Deserialize, Serialize};

/// Common cell types for mesh elements.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum CellType {
    /// 0D vertex.
    Vertex,
    /// 1D segment/edge.
    Segment,
    /// 2D simplex (triangle).
    Triangle,
    /// 2D tensor-product cell (quad).
    Quadrilateral,
    /// 2D polygon with `n` vertices.
    Polygon(u8),
    /// 3D simplex (tet).
    Tetrahedron,
    /// 3D tensor-product cell (hex).
    Hexahedron,
    /// 3D wedge/prism.
    Prism,
    /// 3D pyramid.
    Pyramid,
}

impl Default for CellType {
    fn default() -> Self {
        CellType::Vertex
    }
}

const SEGMENT_FACETS: &[&[usize]] = &[&[0], &[1]];
const TRIANGLE_FACETS: &[&[usize]] = &[&[0, 1], &[1, 2], &[2, 0]];
const QUAD_FACETS: &[&[usize]] = &[&[0, 1], &[1, 2], &[2, 3], &[3, 0]];
const TET_FACETS: &[&[usize]] = &[&[0, 1, 3], &[1, 2, 3], &[2, 0, 3], &[0, 2, 1]];
const HEX_FACETS: &[&[usize]] = &[
    &[0, 4, 7, 3],
    &[1, 2, 6, 5],
    &[0, 1, 5, 4],
    &[3, 7, 6, 2],
    &[0, 3, 2, 1],
    &[4, 5, 6, 7],
];
const PRISM_FACETS: &[&[usize]] = &[
    &[0, 1, 2],
    &[3, 5, 4],
    &[0, 3, 4, 1],
    &[1, 4, 5, 2],
    &[2, 5, 3, 0],
];
const PYRAMID_FACETS: &[&[usize]] = &[
    &[0, 3, 2, 1],
    &[0, 1, 4],
    &[1, 2, 4],
    &[2, 3, 4],
    &[3, 0, 4],
];

impl CellType {
    /// Returns the topological dimension of the cell.
    pub fn dimension(self) -> u8 {
        match self {
            CellType::Vertex => 0,
            CellType::Segment => 1,
            CellType::Triangle | CellType::Quadrilateral | CellType::Polygon(_) => 2,
            CellType::Tetrahedron | CellType::Hexahedron | CellType::Prism | CellType::Pyramid => 3,
        }
    }

    /// Number of points a cell of this type references.
    pub fn num_points(self) -> usize {
        match self {
            CellType::Vertex => 1,
            CellType::Segment => 2,
            CellType::Triangle => 3,
            CellType::Quadrilateral => 4,
            CellType::Polygon(n) => n as usize,
            CellType::Tetrahedron => 4,
            CellType::Hexahedron => 8,
            CellType::Prism => 6,
            CellType::Pyramid => 5,
        }
    }

    /// Number of facets (codimension-1 entities).
    pub fn num_facets(self) -> usize {
        match self {
            CellType::Polygon(n) => n as usize,
            other => other.fixed_facets().len(),
        }
    }

    fn fixed_facets(self) -> &'static [&'static [usize]] {
        match self {
            CellType::Vertex | CellType::Polygon(_) => &[],
            CellType::Segment => SEGMENT_FACETS,
            CellType::Triangle => TRIANGLE_FACETS,
            CellType::Quadrilateral => QUAD_FACETS,
            CellType::Tetrahedron => TET_FACETS,
            CellType::Hexahedron => HEX_FACETS,
            CellType::Prism => PRISM_FACETS,
            CellType::Pyramid => PYRAMID_FACETS,
        }
    }

    /// Writes the local point indices of facet `facet` into `out`.
    ///
    /// `out` is cleared first. Facets out of range leave `out` empty.
    pub fn facet_local_points(self, facet: usize, out: &mut Vec<usize>) {
        out.clear();
        match self {
            CellType::Polygon(n) => {
                let n = n as usize;
                if facet < n {
                    out.push(facet);
                    out.push((facet + 1) % n);
                }
            }
            other => {
                if let Some(local) = other.fixed_facets().get(facet) {
                    out.extend_from_slice(local);
                }
            }
        }
    }

    /// Legacy VTK cell type identifier.
    pub fn vtk_id(self) -> u8 {
        match self {
            CellType::Vertex => 1,
            CellType::Segment => 3,
            CellType::Triangle => 5,
            CellType::Polygon(_) => 7,
            CellType::Quadrilateral => 9,
            CellType::Tetrahedron => 10,
            CellType::Hexahedron => 12,
            CellType::Prism => 13,
            CellType::Pyramid => 14,
        }
    }

    /// Inverse of [`vtk_id`](Self::vtk_id); polygons need their point count.
    pub fn from_vtk_id(id: u8, num_points: usize) -> Option<Self> {
        Some(match id {
            1 => CellType::Vertex,
            3 => CellType::Segment,
            5 => CellType::Triangle,
            7 => CellType::Polygon(u8::try_from(num_points).ok()?),
            9 => CellType::Quadrilateral,
            10 => CellType::Tetrahedron,
            12 => CellType::Hexahedron,
            13 => CellType::Prism,
            14 => CellType::Pyramid,
            _ => return None,
        })
    }
}
