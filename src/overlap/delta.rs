//! GhostDelta trait: rules for fusing received ghost values into local slots

use crate::data::field::FieldScalar;

/// *GhostDelta* decides how an incoming tuple is merged into a ghost tuple.
pub trait GhostDelta: Send + Sync + 'static {
    /// Merge `incoming` into `local`; both hold one tuple.
    fn fuse<T: FieldScalar>(local: &mut [T], incoming: &[T]);
}

/// Copy-overwrites-local. This is what ghost refreshes use by default.
#[derive(Copy, Clone, Debug, Default)]
pub struct CopyDelta;

impl GhostDelta for CopyDelta {
    #[inline]
    fn fuse<T: FieldScalar>(local: &mut [T], incoming: &[T]) {
        local.copy_from_slice(incoming);
    }
}

/// Additive delta for accumulating contributions from several neighbours.
/// Integer fields saturate rather than wrap.
#[derive(Copy, Clone, Debug, Default)]
pub struct AddDelta;

impl GhostDelta for AddDelta {
    #[inline]
    fn fuse<T: FieldScalar>(local: &mut [T], incoming: &[T]) {
        for (l, &i) in local.iter_mut().zip(incoming) {
            *l = l.accumulate(i);
        }
    }
}
