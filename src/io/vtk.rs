//! Legacy VTK (`.vtk`) writer for unstructured meshes.
//!
//! Writes ASCII `UNSTRUCTURED_GRID` files with every point and cell array as
//! `FIELD` data, which is enough to inspect boundary and ghosted meshes in a
//! standard viewer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use itertools::Itertools;

use crate::data::field::{FieldArray, FieldData, FieldValues};
use crate::data::mesh::UnstructuredMesh;
use crate::mesh_error::MeshGhostError;

#[derive(Debug, Clone)]
pub struct VtkWriter {
    title: String,
}

impl Default for VtkWriter {
    fn default() -> Self {
        Self {
            title: "mesh-ghost".to_string(),
        }
    }
}

fn data_type(values: &FieldValues) -> &'static str {
    match values {
        FieldValues::F64(_) => "double",
        FieldValues::F32(_) => "float",
        FieldValues::I64(_) => "vtkIdType",
        FieldValues::I32(_) => "int",
        FieldValues::U8(_) => "unsigned_char",
    }
}

fn value_strings(values: &FieldValues) -> Vec<String> {
    match values {
        FieldValues::F64(v) => v.iter().map(|x| x.to_string()).collect(),
        FieldValues::F32(v) => v.iter().map(|x| x.to_string()).collect(),
        FieldValues::I64(v) => v.iter().map(|x| x.to_string()).collect(),
        FieldValues::I32(v) => v.iter().map(|x| x.to_string()).collect(),
        FieldValues::U8(v) => v.iter().map(|x| x.to_string()).collect(),
    }
}

impl VtkWriter {
    /// Set the free-form title line (newlines are replaced by spaces).
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into().replace('\n', " ");
        self
    }

    fn write_field_array<W: Write>(writer: &mut W, array: &FieldArray) -> Result<(), MeshGhostError> {
        let name = array.name().replace(char::is_whitespace, "_");
        writeln!(
            writer,
            "{name} {} {} {}",
            array.components(),
            array.num_tuples(),
            data_type(array.values())
        )?;
        let mut line_len = 0usize;
        for value in value_strings(array.values()) {
            if line_len + value.len() + 1 > 70 {
                writeln!(writer)?;
                line_len = 0;
            }
            if line_len > 0 {
                write!(writer, " ")?;
                line_len += 1;
            }
            write!(writer, "{value}")?;
            line_len += value.len();
        }
        writeln!(writer)?;
        Ok(())
    }

    fn write_field_data<W: Write>(
        writer: &mut W,
        section: &str,
        count: usize,
        fd: &FieldData,
    ) -> Result<(), MeshGhostError> {
        if fd.is_empty() {
            return Ok(());
        }
        writeln!(writer, "{section} {count}")?;
        writeln!(writer, "FIELD FieldData {}", fd.len())?;
        for a in fd {
            Self::write_field_array(writer, a)?;
        }
        Ok(())
    }

    pub fn write<W: Write>(&self, mesh: &UnstructuredMesh, mut writer: W) -> Result<(), MeshGhostError> {
        mesh.validate_fields()?;
        writeln!(writer, "# vtk DataFile Version 3.0")?;
        writeln!(writer, "{}", self.title)?;
        writeln!(writer, "ASCII")?;
        writeln!(writer, "DATASET UNSTRUCTURED_GRID")?;

        writeln!(writer, "POINTS {} double", mesh.num_points())?;
        for p in mesh.points() {
            writeln!(writer, "{} {} {}", p[0], p[1], p[2])?;
        }

        writeln!(
            writer,
            "CELLS {} {}",
            mesh.num_cells(),
            mesh.num_cells() + mesh.connectivity_len()
        )?;
        for (_, pts) in mesh.cells() {
            writeln!(writer, "{} {}", pts.len(), pts.iter().join(" "))?;
        }
        writeln!(writer, "CELL_TYPES {}", mesh.num_cells())?;
        for (ct, _) in mesh.cells() {
            writeln!(writer, "{}", ct.vtk_id())?;
        }

        Self::write_field_data(&mut writer, "POINT_DATA", mesh.num_points(), mesh.point_data())?;
        Self::write_field_data(&mut writer, "CELL_DATA", mesh.num_cells(), mesh.cell_data())?;
        writer.flush()?;
        Ok(())
    }
}

/// Write `mesh` to `path` with the default writer.
pub fn write_vtk<P: AsRef<Path>>(mesh: &UnstructuredMesh, path: P) -> Result<(), MeshGhostError> {
    let file = File::create(path)?;
    VtkWriter::default().write(mesh, BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh_generation::structured_rect;

    #[test]
    fn writes_sections_in_order() {
        let mut m = structured_rect(2, 1, [0.0, 0.0], [2.0, 1.0], true, "GlobalID").unwrap();
        m.cell_data_mut()
            .insert(FieldArray::from_vec("GHOSTCELL", 1, vec![0u8, 0, 1, 1]).unwrap());
        let mut out = Vec::new();
        VtkWriter::default().with_title("t").write(&m, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let idx = |s: &str| text.find(s).unwrap_or_else(|| panic!("missing {s}"));
        assert!(idx("POINTS 6 double") < idx("CELLS 4 16"));
        assert!(idx("CELL_TYPES 4") < idx("POINT_DATA 6"));
        assert!(text.contains("GlobalID 1 6 vtkIdType"));
        assert!(text.contains("GHOSTCELL 1 4 unsigned_char\n0 0 1 1\n"));
    }
}
