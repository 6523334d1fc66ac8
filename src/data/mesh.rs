//! `UnstructuredMesh`: points, typed cells in CSR layout, and field data.
//!
//! This is the per-rank mesh the ghost machinery consumes and produces. Cells
//! reference points by local index; global point IDs live in a one-component
//! `i64` point-data array whose name is configurable (`GlobalID` by default).

use crate::data::bounds::BoundingBox;
use crate::data::field::{FieldArray, FieldData};
use crate::mesh_error::MeshGhostError;
use crate::overlap::perf::set_with_capacity;
use crate::topology::cell_type::CellType;
use crate::topology::face_key::{FaceKey, GlobalId};

#[derive(Clone, Debug, PartialEq)]
pub struct UnstructuredMesh {
    points: Vec<[f64; 3]>,
    cell_types: Vec<CellType>,
    offsets: Vec<usize>,
    connectivity: Vec<usize>,
    point_data: FieldData,
    cell_data: FieldData,
}

impl Default for UnstructuredMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl UnstructuredMesh {
    pub fn new() -> Self {
        Self::with_capacity(0, 0)
    }

    pub fn with_capacity(num_points: usize, num_cells: usize) -> Self {
        let mut offsets = Vec::with_capacity(num_cells + 1);
        offsets.push(0);
        Self {
            points: Vec::with_capacity(num_points),
            cell_types: Vec::with_capacity(num_cells),
            offsets,
            connectivity: Vec::with_capacity(num_cells * 4),
            point_data: FieldData::new(),
            cell_data: FieldData::new(),
        }
    }

    pub fn add_point(&mut self, p: [f64; 3]) -> usize {
        self.points.push(p);
        self.points.len() - 1
    }

    /// Append a cell and return its index.
    ///
    /// Fails if the point count does not match `cell_type` or a point index
    /// is out of range; the mesh is left unchanged on error.
    pub fn add_cell(&mut self, cell_type: CellType, pts: &[usize]) -> Result<usize, MeshGhostError> {
        let cell = self.cell_types.len();
        let expected = cell_type.num_points();
        let arity_ok = match cell_type {
            CellType::Polygon(n) => n >= 3 && pts.len() == expected,
            _ => pts.len() == expected,
        };
        if !arity_ok {
            return Err(MeshGhostError::CellArity {
                cell,
                cell_type,
                expected,
                found: pts.len(),
            });
        }
        if let Some(&bad) = pts.iter().find(|&&p| p >= self.points.len()) {
            return Err(MeshGhostError::PointOutOfRange {
                cell,
                point: bad,
                num_points: self.points.len(),
            });
        }
        self.cell_types.push(cell_type);
        self.connectivity.extend_from_slice(pts);
        self.offsets.push(self.connectivity.len());
        Ok(cell)
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cell_types.len()
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    pub fn point(&self, i: usize) -> [f64; 3] {
        self.points[i]
    }

    pub fn cell_type(&self, c: usize) -> CellType {
        self.cell_types[c]
    }

    pub fn cell_points(&self, c: usize) -> &[usize] {
        &self.connectivity[self.offsets[c]..self.offsets[c + 1]]
    }

    /// Iterate `(cell_type, points)` for every cell in order.
    pub fn cells(&self) -> impl Iterator<Item = (CellType, &[usize])> + '_ {
        (0..self.num_cells()).map(move |c| (self.cell_types[c], self.cell_points(c)))
    }

    /// Length of the connectivity array (sum of cell sizes).
    pub fn connectivity_len(&self) -> usize {
        self.connectivity.len()
    }

    pub fn point_data(&self) -> &FieldData {
        &self.point_data
    }

    pub fn point_data_mut(&mut self) -> &mut FieldData {
        &mut self.point_data
    }

    pub fn cell_data(&self) -> &FieldData {
        &self.cell_data
    }

    pub fn cell_data_mut(&mut self) -> &mut FieldData {
        &mut self.cell_data
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(&self.points)
    }

    /// Same points and cells, no field data.
    pub fn copy_structure(&self) -> Self {
        Self {
            points: self.points.clone(),
            cell_types: self.cell_types.clone(),
            offsets: self.offsets.clone(),
            connectivity: self.connectivity.clone(),
            point_data: FieldData::new(),
            cell_data: FieldData::new(),
        }
    }

    /// Attach global point IDs under `name`.
    pub fn set_global_ids(&mut self, name: &str, ids: Vec<GlobalId>) -> Result<(), MeshGhostError> {
        if ids.len() != self.num_points() {
            return Err(MeshGhostError::InvalidGlobalIds {
                name: name.to_string(),
                reason: format!("{} ids for {} points", ids.len(), self.num_points()),
            });
        }
        self.point_data.insert(FieldArray::from_vec(name, 1, ids)?);
        Ok(())
    }

    /// The validated global point IDs stored under `name`: one `i64` per
    /// point, non-negative and pairwise distinct.
    pub fn global_ids(&self, name: &str) -> Result<&[GlobalId], MeshGhostError> {
        let array = self
            .point_data
            .get(name)
            .ok_or_else(|| MeshGhostError::MissingGlobalIds(name.to_string()))?;
        let invalid = |reason: String| MeshGhostError::InvalidGlobalIds {
            name: name.to_string(),
            reason,
        };
        if array.components() != 1 {
            return Err(invalid(format!("{} components, expected 1", array.components())));
        }
        let ids = array
            .as_slice::<GlobalId>()
            .ok_or_else(|| invalid(format!("scalar type {:?}, expected I64", array.scalar_type())))?;
        if ids.len() != self.num_points() {
            return Err(invalid(format!("{} ids for {} points", ids.len(), self.num_points())));
        }
        if let Some(neg) = ids.iter().find(|&&g| g < 0) {
            return Err(invalid(format!("negative global id {neg}")));
        }
        let mut seen = set_with_capacity(ids.len());
        if let Some((p, dup)) = ids.iter().enumerate().find(|&(_, g)| !seen.insert(*g)) {
            return Err(invalid(format!("global id {dup} of point {p} is used twice")));
        }
        Ok(ids)
    }

    /// Key of cell `c` built from the global IDs of all its points.
    pub fn cell_key(&self, c: usize, global_ids: &[GlobalId]) -> FaceKey {
        FaceKey::from_ids(self.cell_points(c).iter().map(|&p| global_ids[p]))
    }

    /// Check field arrays against the point and cell counts.
    pub fn validate_fields(&self) -> Result<(), MeshGhostError> {
        self.point_data.validate_tuples(self.num_points())?;
        self.cell_data.validate_tuples(self.num_cells())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> UnstructuredMesh {
        let mut m = UnstructuredMesh::new();
        for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]] {
            m.add_point(p);
        }
        m
    }

    #[test]
    fn add_cell_checks_arity_and_range() {
        let mut m = unit_square();
        assert_eq!(m.add_cell(CellType::Quadrilateral, &[0, 1, 2, 3]).unwrap(), 0);
        assert!(matches!(
            m.add_cell(CellType::Triangle, &[0, 1]),
            Err(MeshGhostError::CellArity { expected: 3, found: 2, .. })
        ));
        assert!(matches!(
            m.add_cell(CellType::Triangle, &[0, 1, 9]),
            Err(MeshGhostError::PointOutOfRange { point: 9, .. })
        ));
        assert!(m.add_cell(CellType::Polygon(2), &[0, 1]).is_err());
        assert_eq!(m.num_cells(), 1);
        assert_eq!(m.cell_points(0), &[0, 1, 2, 3]);
    }

    #[test]
    fn global_ids_are_validated() {
        let mut m = unit_square();
        assert!(matches!(
            m.global_ids("GlobalID"),
            Err(MeshGhostError::MissingGlobalIds(_))
        ));
        m.set_global_ids("GlobalID", vec![5, 6, 7, 8]).unwrap();
        assert_eq!(m.global_ids("GlobalID").unwrap(), &[5, 6, 7, 8]);
        m.point_data_mut()
            .insert(FieldArray::from_vec("GlobalID", 1, vec![1i64, -2, 3, 4]).unwrap());
        assert!(matches!(
            m.global_ids("GlobalID"),
            Err(MeshGhostError::InvalidGlobalIds { .. })
        ));
        m.point_data_mut()
            .insert(FieldArray::from_vec("GlobalID", 1, vec![1.0f64, 2.0, 3.0, 4.0]).unwrap());
        assert!(m.global_ids("GlobalID").is_err());
    }

    #[test]
    fn duplicate_global_ids_are_rejected() {
        let mut m = unit_square();
        m.set_global_ids("GlobalID", vec![4, 9, 4, 7]).unwrap();
        let err = m.global_ids("GlobalID").unwrap_err();
        assert!(matches!(err, MeshGhostError::InvalidGlobalIds { .. }));
        assert!(err.to_string().contains("point 2"));
    }

    #[test]
    fn copy_structure_drops_fields() {
        let mut m = unit_square();
        m.add_cell(CellType::Quadrilateral, &[0, 1, 2, 3]).unwrap();
        m.set_global_ids("GlobalID", vec![0, 1, 2, 3]).unwrap();
        let s = m.copy_structure();
        assert_eq!(s.num_cells(), 1);
        assert!(s.point_data().is_empty());
        assert_eq!(m.bounds().to_array(), [0.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
    }
}
