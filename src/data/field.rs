//! Named, typed field arrays attached to mesh points or cells.
//!
//! A [`FieldArray`] stores `num_tuples * components` scalars of a single
//! [`ScalarType`]. [`FieldData`] is an ordered collection of arrays with unique
//! names. Tuple copy, gather and fuse operations are what the ghost-zone
//! machinery needs to move values between the local mesh, the ghosted mesh and
//! the wire.

use bytemuck::Pod;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::mesh_error::MeshGhostError;
use crate::overlap::delta::GhostDelta;

/// Scalar type tag of a field array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    F64,
    F32,
    I64,
    I32,
    U8,
}

impl ScalarType {
    /// Size of one scalar in bytes.
    pub fn size_of(self) -> usize {
        match self {
            ScalarType::F64 | ScalarType::I64 => 8,
            ScalarType::F32 | ScalarType::I32 => 4,
            ScalarType::U8 => 1,
        }
    }

    pub fn wire_tag(self) -> u8 {
        match self {
            ScalarType::F64 => 1,
            ScalarType::F32 => 2,
            ScalarType::I64 => 3,
            ScalarType::I32 => 4,
            ScalarType::U8 => 5,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => ScalarType::F64,
            2 => ScalarType::F32,
            3 => ScalarType::I64,
            4 => ScalarType::I32,
            5 => ScalarType::U8,
            _ => return None,
        })
    }
}

/// Storage of a field array, one variant per scalar type.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValues {
    F64(Vec<f64>),
    F32(Vec<f32>),
    I64(Vec<i64>),
    I32(Vec<i32>),
    U8(Vec<u8>),
}

macro_rules! with_values {
    ($values:expr, $v:ident => $body:expr) => {
        match $values {
            FieldValues::F64($v) => $body,
            FieldValues::F32($v) => $body,
            FieldValues::I64($v) => $body,
            FieldValues::I32($v) => $body,
            FieldValues::U8($v) => $body,
        }
    };
}

/// Scalars that can live in a [`FieldArray`].
pub trait FieldScalar:
    Pod + Default + PartialEq + ToPrimitive + Send + Sync + 'static
{
    const TYPE: ScalarType;
    /// `self + other`; integer types saturate at their bounds instead of
    /// overflowing.
    fn accumulate(self, other: Self) -> Self;
    fn slice(values: &FieldValues) -> Option<&[Self]>;
    fn slice_mut(values: &mut FieldValues) -> Option<&mut [Self]>;
    fn wrap(values: Vec<Self>) -> FieldValues;
}

macro_rules! impl_field_scalar {
    ($t:ty, $variant:ident, |$a:ident, $b:ident| $sum:expr) => {
        impl FieldScalar for $t {
            const TYPE: ScalarType = ScalarType::$variant;
            #[inline]
            fn accumulate(self, other: Self) -> Self {
                let ($a, $b) = (self, other);
                $sum
            }
            #[inline]
            fn slice(values: &FieldValues) -> Option<&[Self]> {
                match values {
                    FieldValues::$variant(v) => Some(v),
                    _ => None,
                }
            }
            #[inline]
            fn slice_mut(values: &mut FieldValues) -> Option<&mut [Self]> {
                match values {
                    FieldValues::$variant(v) => Some(v),
                    _ => None,
                }
            }
            #[inline]
            fn wrap(values: Vec<Self>) -> FieldValues {
                FieldValues::$variant(values)
            }
        }
    };
}

impl_field_scalar!(f64, F64, |a, b| a + b);
impl_field_scalar!(f32, F32, |a, b| a + b);
impl_field_scalar!(i64, I64, |a, b| a.saturating_add(b));
impl_field_scalar!(i32, I32, |a, b| a.saturating_add(b));
impl_field_scalar!(u8, U8, |a, b| a.saturating_add(b));

impl FieldValues {
    /// `n` zero scalars of the given type.
    pub fn zeros(ty: ScalarType, n: usize) -> Self {
        match ty {
            ScalarType::F64 => FieldValues::F64(vec![0.0; n]),
            ScalarType::F32 => FieldValues::F32(vec![0.0; n]),
            ScalarType::I64 => FieldValues::I64(vec![0; n]),
            ScalarType::I32 => FieldValues::I32(vec![0; n]),
            ScalarType::U8 => FieldValues::U8(vec![0; n]),
        }
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            FieldValues::F64(_) => ScalarType::F64,
            FieldValues::F32(_) => ScalarType::F32,
            FieldValues::I64(_) => ScalarType::I64,
            FieldValues::I32(_) => ScalarType::I32,
            FieldValues::U8(_) => ScalarType::U8,
        }
    }

    pub fn len(&self) -> usize {
        with_values!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow or shrink to `n` scalars, zero-filling new slots.
    pub fn resize(&mut self, n: usize) {
        with_values!(self, v => v.resize(n, Default::default()))
    }

    /// Value `i` converted to `f64`, if in range.
    pub fn get_f64(&self, i: usize) -> Option<f64> {
        with_values!(self, v => v.get(i).and_then(|x| x.to_f64()))
    }
}

/// A named array of `components`-wide tuples.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldArray {
    name: String,
    components: usize,
    values: FieldValues,
}

impl FieldArray {
    /// Wrap `values`; their length must be a multiple of `components`.
    pub fn new(
        name: impl Into<String>,
        components: usize,
        values: FieldValues,
    ) -> Result<Self, MeshGhostError> {
        let name = name.into();
        if components == 0 {
            return Err(MeshGhostError::FieldMismatch {
                name,
                reason: "component count must be at least 1".into(),
            });
        }
        if values.len() % components != 0 {
            let expected = values.len().div_ceil(components) * components;
            return Err(MeshGhostError::FieldLength {
                name,
                expected,
                found: values.len(),
            });
        }
        Ok(Self {
            name,
            components,
            values,
        })
    }

    /// Typed convenience constructor.
    pub fn from_vec<T: FieldScalar>(
        name: impl Into<String>,
        components: usize,
        values: Vec<T>,
    ) -> Result<Self, MeshGhostError> {
        Self::new(name, components, T::wrap(values))
    }

    /// A zero-filled array with `num_tuples` tuples.
    pub fn zeros(
        name: impl Into<String>,
        ty: ScalarType,
        components: usize,
        num_tuples: usize,
    ) -> Self {
        Self {
            name: name.into(),
            components: components.max(1),
            values: FieldValues::zeros(ty, num_tuples * components.max(1)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.values.scalar_type()
    }

    pub fn num_tuples(&self) -> usize {
        self.values.len() / self.components
    }

    pub fn values(&self) -> &FieldValues {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut FieldValues {
        &mut self.values
    }

    /// Typed view, `None` if `T` is not this array's scalar type.
    pub fn as_slice<T: FieldScalar>(&self) -> Option<&[T]> {
        T::slice(&self.values)
    }

    pub fn as_slice_mut<T: FieldScalar>(&mut self) -> Option<&mut [T]> {
        T::slice_mut(&mut self.values)
    }

    /// Tuple `t` converted to `f64`.
    pub fn tuple_f64(&self, t: usize) -> Option<Vec<f64>> {
        if t >= self.num_tuples() {
            return None;
        }
        (0..self.components)
            .map(|c| self.values.get_f64(t * self.components + c))
            .collect()
    }

    /// Resize to `n` tuples, zero-filling new tuples.
    pub fn resize_tuples(&mut self, n: usize) {
        self.values.resize(n * self.components);
    }

    /// True if `other` has the same scalar type and component count.
    pub fn is_compatible(&self, other: &FieldArray) -> bool {
        self.components == other.components && self.scalar_type() == other.scalar_type()
    }

    fn check_compatible(&self, other: &FieldArray) -> Result<(), MeshGhostError> {
        if self.is_compatible(other) {
            Ok(())
        } else {
            Err(MeshGhostError::FieldMismatch {
                name: self.name.clone(),
                reason: format!(
                    "{:?}x{} vs {:?}x{}",
                    self.scalar_type(),
                    self.components,
                    other.scalar_type(),
                    other.components
                ),
            })
        }
    }

    fn check_tuple(&self, t: usize) -> Result<(), MeshGhostError> {
        if t < self.num_tuples() {
            Ok(())
        } else {
            Err(MeshGhostError::TupleOutOfRange {
                name: self.name.clone(),
                tuple: t,
                num_tuples: self.num_tuples(),
            })
        }
    }

    /// Overwrite tuple `dst` with tuple `src_tuple` of `src`.
    pub fn copy_tuple_from(
        &mut self,
        dst: usize,
        src: &FieldArray,
        src_tuple: usize,
    ) -> Result<(), MeshGhostError> {
        self.fuse_tuple_from::<crate::overlap::delta::CopyDelta>(dst, src, src_tuple)
    }

    /// Fuse tuple `src_tuple` of `src` into tuple `dst` with rule `D`.
    pub fn fuse_tuple_from<D: GhostDelta>(
        &mut self,
        dst: usize,
        src: &FieldArray,
        src_tuple: usize,
    ) -> Result<(), MeshGhostError> {
        self.check_compatible(src)?;
        self.check_tuple(dst)?;
        src.check_tuple(src_tuple)?;
        let nc = self.components;
        let (d, s) = (dst * nc, src_tuple * nc);
        match (&mut self.values, &src.values) {
            (FieldValues::F64(a), FieldValues::F64(b)) => D::fuse(&mut a[d..d + nc], &b[s..s + nc]),
            (FieldValues::F32(a), FieldValues::F32(b)) => D::fuse(&mut a[d..d + nc], &b[s..s + nc]),
            (FieldValues::I64(a), FieldValues::I64(b)) => D::fuse(&mut a[d..d + nc], &b[s..s + nc]),
            (FieldValues::I32(a), FieldValues::I32(b)) => D::fuse(&mut a[d..d + nc], &b[s..s + nc]),
            (FieldValues::U8(a), FieldValues::U8(b)) => D::fuse(&mut a[d..d + nc], &b[s..s + nc]),
            _ => unreachable!("compatibility checked above"),
        }
        Ok(())
    }

    /// Copy the first `n` tuples of `src` over the first `n` tuples of `self`.
    pub fn copy_prefix_from(&mut self, src: &FieldArray, n: usize) -> Result<(), MeshGhostError> {
        self.check_compatible(src)?;
        if n > self.num_tuples() || n > src.num_tuples() {
            return Err(MeshGhostError::TupleOutOfRange {
                name: self.name.clone(),
                tuple: n,
                num_tuples: self.num_tuples().min(src.num_tuples()),
            });
        }
        let len = n * self.components;
        match (&mut self.values, &src.values) {
            (FieldValues::F64(a), FieldValues::F64(b)) => a[..len].copy_from_slice(&b[..len]),
            (FieldValues::F32(a), FieldValues::F32(b)) => a[..len].copy_from_slice(&b[..len]),
            (FieldValues::I64(a), FieldValues::I64(b)) => a[..len].copy_from_slice(&b[..len]),
            (FieldValues::I32(a), FieldValues::I32(b)) => a[..len].copy_from_slice(&b[..len]),
            (FieldValues::U8(a), FieldValues::U8(b)) => a[..len].copy_from_slice(&b[..len]),
            _ => unreachable!("compatibility checked above"),
        }
        Ok(())
    }

    /// New array holding the selected tuples, in order.
    pub fn gather(&self, tuples: &[usize]) -> Result<FieldArray, MeshGhostError> {
        for &t in tuples {
            self.check_tuple(t)?;
        }
        let nc = self.components;
        let values = with_values!(&self.values, v => {
            let mut out = Vec::with_capacity(tuples.len() * nc);
            for &t in tuples {
                out.extend_from_slice(&v[t * nc..(t + 1) * nc]);
            }
            FieldScalar::wrap(out)
        });
        Ok(FieldArray {
            name: self.name.clone(),
            components: nc,
            values,
        })
    }

    /// An empty array with the same name, type and components.
    pub fn empty_like(&self, num_tuples: usize) -> FieldArray {
        FieldArray::zeros(self.name.clone(), self.scalar_type(), self.components, num_tuples)
    }
}

/// Ordered collection of uniquely named field arrays.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldData {
    arrays: Vec<FieldArray>,
}

impl FieldData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldArray> {
        self.arrays.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, FieldArray> {
        self.arrays.iter_mut()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.arrays.iter().map(|a| a.name())
    }

    pub fn has_array(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&FieldArray> {
        self.arrays.iter().find(|a| a.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldArray> {
        self.arrays.iter_mut().find(|a| a.name == name)
    }

    /// Insert `array`, replacing (and returning) any array with the same name.
    pub fn insert(&mut self, array: FieldArray) -> Option<FieldArray> {
        match self.arrays.iter_mut().find(|a| a.name == array.name) {
            Some(slot) => Some(std::mem::replace(slot, array)),
            None => {
                self.arrays.push(array);
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldArray> {
        let pos = self.arrays.iter().position(|a| a.name == name)?;
        Some(self.arrays.remove(pos))
    }

    /// Check that every array has exactly `num_tuples` tuples.
    pub fn validate_tuples(&self, num_tuples: usize) -> Result<(), MeshGhostError> {
        for a in &self.arrays {
            if a.num_tuples() != num_tuples {
                return Err(MeshGhostError::FieldLength {
                    name: a.name.clone(),
                    expected: num_tuples * a.components,
                    found: a.values.len(),
                });
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a FieldData {
    type Item = &'a FieldArray;
    type IntoIter = std::slice::Iter<'a, FieldArray>;
    fn into_iter(self) -> Self::IntoIter {
        self.arrays.iter()
    }
}
