//! Fixed, versioned, little-endian wire format for ghost-zone messages.
//!
//! Every payload starts with a [`WireHdr`]; the body is written with
//! [`WireWriter`] and read back with [`WireReader`], which checks every length
//! before touching the buffer and reports truncation as
//! [`MeshGhostError::WireDecode`].

use bytemuck::{Pod, Zeroable};
use bytes::{Buf, BufMut, BytesMut};
use static_assertions::{assert_eq_align, assert_eq_size};

use crate::data::field::{FieldArray, FieldData, FieldValues, ScalarType};
use crate::mesh_error::MeshGhostError;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Record kind of a serialised boundary mesh.
pub const KIND_BOUNDARY_MESH: u16 = 1;
/// Record kind of a ghost-update packet.
pub const KIND_GHOST_UPDATE: u16 = 2;
/// Record kind of an in-band control message on the update tag.
pub const KIND_UPDATE_CONTROL: u16 = 3;

/// All multi-byte integers are stored pre-LE with `.to_le()`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub reserved_le: u32,
}

impl WireHdr {
    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
}

/// Count of following records, used by the size-exchange phase.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u64,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.n_le) as usize
    }
}

assert_eq_size!(WireHdr, [u8; 8]);
assert_eq_size!(WireCount, u64);
assert_eq_align!(WireCount, u64);

/// Record kind of `buf`, or `None` if it is too short to hold a header.
pub fn peek_kind(buf: &[u8]) -> Option<u16> {
    let n = size_of::<WireHdr>();
    (buf.len() >= n).then(|| bytemuck::pod_read_unaligned::<WireHdr>(&buf[..n]).kind())
}

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Growable message body.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    pub fn new(kind: u16) -> Self {
        Self::with_capacity(kind, 64)
    }

    pub fn with_capacity(kind: u16, cap: usize) -> Self {
        let mut buf = BytesMut::with_capacity(cap + size_of::<WireHdr>());
        buf.put_slice(bytemuck::bytes_of(&WireHdr::new(kind)));
        Self { buf }
    }

    pub fn put_count(&mut self, n: usize) {
        self.buf.put_u64_le(n as u64);
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_i64s(&mut self, vals: impl IntoIterator<Item = i64>) {
        for v in vals {
            self.buf.put_i64_le(v);
        }
    }

    pub fn put_indices(&mut self, vals: impl IntoIterator<Item = usize>) {
        for v in vals {
            self.buf.put_u64_le(v as u64);
        }
    }

    pub fn put_f64s(&mut self, vals: impl IntoIterator<Item = f64>) {
        for v in vals {
            self.buf.put_f64_le(v);
        }
    }

    pub fn put_str(&mut self, s: &str) {
        self.buf.put_u32_le(s.len() as u32);
        self.buf.put_slice(s.as_bytes());
    }

    pub fn put_values(&mut self, values: &FieldValues) {
        match values {
            FieldValues::F64(v) => v.iter().for_each(|&x| self.buf.put_f64_le(x)),
            FieldValues::F32(v) => v.iter().for_each(|&x| self.buf.put_f32_le(x)),
            FieldValues::I64(v) => v.iter().for_each(|&x| self.buf.put_i64_le(x)),
            FieldValues::I32(v) => v.iter().for_each(|&x| self.buf.put_i32_le(x)),
            FieldValues::U8(v) => self.buf.put_slice(v),
        }
    }

    /// Arrays as `count, (name, type, components, tuples, values)*`.
    pub fn put_field_data(&mut self, fd: &FieldData) {
        self.put_count(fd.len());
        for a in fd {
            self.put_field_array(a);
        }
    }

    pub fn put_field_array(&mut self, a: &FieldArray) {
        self.put_str(a.name());
        self.buf.put_u8(a.scalar_type().wire_tag());
        self.buf.put_u32_le(a.components() as u32);
        self.put_count(a.num_tuples());
        self.put_values(a.values());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len() <= size_of::<WireHdr>()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Bounds-checked reader over a received payload.
pub struct WireReader<'a> {
    buf: &'a [u8],
}

fn truncated(what: &str, need: usize, have: usize) -> MeshGhostError {
    MeshGhostError::WireDecode(format!("truncated {what}: need {need} bytes, have {have}"))
}

impl<'a> WireReader<'a> {
    /// Validate the header and position the reader on the body.
    pub fn open(buf: &'a [u8], kind: u16) -> Result<Self, MeshGhostError> {
        let n = size_of::<WireHdr>();
        if buf.len() < n {
            return Err(truncated("header", n, buf.len()));
        }
        let hdr: WireHdr = bytemuck::pod_read_unaligned(&buf[..n]);
        if hdr.version() != WIRE_VERSION {
            return Err(MeshGhostError::WireVersion {
                found: hdr.version(),
                expected: WIRE_VERSION,
            });
        }
        if hdr.kind() != kind {
            return Err(MeshGhostError::WireKind {
                found: hdr.kind(),
                expected: kind,
            });
        }
        Ok(Self { buf: &buf[n..] })
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, what: &str, n: usize) -> Result<(), MeshGhostError> {
        if self.buf.remaining() < n {
            Err(truncated(what, n, self.buf.remaining()))
        } else {
            Ok(())
        }
    }

    /// `n` items of `width` bytes, guarding against overflow in `n * width`.
    fn need_items(&self, what: &str, n: usize, width: usize) -> Result<(), MeshGhostError> {
        let bytes = n
            .checked_mul(width)
            .ok_or_else(|| MeshGhostError::WireDecode(format!("{what}: count {n} overflows")))?;
        self.need(what, bytes)
    }

    pub fn get_count(&mut self) -> Result<usize, MeshGhostError> {
        self.need("count", 8)?;
        usize::try_from(self.buf.get_u64_le())
            .map_err(|_| MeshGhostError::WireDecode("count does not fit in usize".into()))
    }

    pub fn get_u8(&mut self) -> Result<u8, MeshGhostError> {
        self.need("byte", 1)?;
        Ok(self.buf.get_u8())
    }

    pub fn get_i64s(&mut self, n: usize) -> Result<Vec<i64>, MeshGhostError> {
        self.need_items("i64 block", n, 8)?;
        Ok((0..n).map(|_| self.buf.get_i64_le()).collect())
    }

    pub fn get_indices(&mut self, n: usize) -> Result<Vec<usize>, MeshGhostError> {
        self.need_items("index block", n, 8)?;
        (0..n)
            .map(|_| {
                usize::try_from(self.buf.get_u64_le())
                    .map_err(|_| MeshGhostError::WireDecode("index does not fit in usize".into()))
            })
            .collect()
    }

    pub fn get_f64s(&mut self, n: usize) -> Result<Vec<f64>, MeshGhostError> {
        self.need_items("f64 block", n, 8)?;
        Ok((0..n).map(|_| self.buf.get_f64_le()).collect())
    }

    pub fn get_str(&mut self) -> Result<String, MeshGhostError> {
        self.need("string length", 4)?;
        let n = self.buf.get_u32_le() as usize;
        self.need("string", n)?;
        let s = std::str::from_utf8(&self.buf[..n])
            .map_err(|e| MeshGhostError::WireDecode(format!("field name: {e}")))?
            .to_owned();
        self.buf.advance(n);
        Ok(s)
    }

    pub fn get_values(&mut self, ty: ScalarType, n: usize) -> Result<FieldValues, MeshGhostError> {
        self.need_items("field values", n, ty.size_of())?;
        let b = &mut self.buf;
        Ok(match ty {
            ScalarType::F64 => FieldValues::F64((0..n).map(|_| b.get_f64_le()).collect()),
            ScalarType::F32 => FieldValues::F32((0..n).map(|_| b.get_f32_le()).collect()),
            ScalarType::I64 => FieldValues::I64((0..n).map(|_| b.get_i64_le()).collect()),
            ScalarType::I32 => FieldValues::I32((0..n).map(|_| b.get_i32_le()).collect()),
            ScalarType::U8 => {
                let v = b[..n].to_vec();
                b.advance(n);
                FieldValues::U8(v)
            }
        })
    }

    pub fn get_field_array(&mut self) -> Result<FieldArray, MeshGhostError> {
        let name = self.get_str()?;
        let tag = self.get_u8()?;
        let ty = ScalarType::from_wire_tag(tag)
            .ok_or_else(|| MeshGhostError::WireDecode(format!("unknown scalar tag {tag}")))?;
        self.need("components", 4)?;
        let components = self.buf.get_u32_le() as usize;
        let tuples = self.get_count()?;
        let n = tuples
            .checked_mul(components)
            .ok_or_else(|| MeshGhostError::WireDecode(format!("field `{name}` size overflows")))?;
        let values = self.get_values(ty, n)?;
        FieldArray::new(name, components, values)
    }

    pub fn get_field_data(&mut self) -> Result<FieldData, MeshGhostError> {
        let n = self.get_count()?;
        let mut fd = FieldData::new();
        for _ in 0..n {
            fd.insert(self.get_field_array()?);
        }
        Ok(fd)
    }

    /// Fail unless every byte was consumed.
    pub fn finish(self) -> Result<(), MeshGhostError> {
        if self.buf.has_remaining() {
            Err(MeshGhostError::WireDecode(format!(
                "{} trailing bytes",
                self.buf.remaining()
            )))
        } else {
            Ok(())
        }
    }
}
