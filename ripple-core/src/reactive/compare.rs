//! Change detection shared by containers and watchers.

use std::any::TypeId;

/// Whether `value` differs from `old`.
///
/// Plain `PartialEq` inequality, except that a NaN float never counts as
/// changed relative to another NaN. Signed zeros compare equal. Composite
/// values are compared with `==` only, so a write of a different composite
/// is never dropped.
///
/// ```rust
/// use ripple_core::has_changed;
///
/// assert!(has_changed(&1, &2));
/// assert!(!has_changed(&f64::NAN, &f64::NAN));
/// assert!(!has_changed(&0.0_f64, &-0.0_f64));
/// assert!(has_changed(&vec![f64::NAN, 1.0], &vec![f64::NAN, 2.0]));
/// ```
#[allow(clippy::eq_op)]
pub fn has_changed<T: PartialEq + ?Sized + 'static>(value: &T, old: &T) -> bool {
    if value == old {
        return false;
    }
    !(is_float::<T>() && value != value && old != old)
}

/// Only scalar floats may be unequal to themselves and still hold the same
/// value.
fn is_float<T: ?Sized + 'static>() -> bool {
    let id = TypeId::of::<T>();
    id == TypeId::of::<f64>() || id == TypeId::of::<f32>()
}
