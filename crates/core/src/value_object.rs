//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are compared by their attributes
/// (e.g. `Thresholds { low_stock: 10, reorder_point: 5, max_stock: 1000 }`).
/// They are immutable: "changing" one means replacing it with a new value.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
