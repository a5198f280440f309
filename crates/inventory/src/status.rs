//! Lifecycle/stock status, thresholds and counter snapshots.

use serde::{Deserialize, Serialize};

use stockledger_core::{InventoryError, InventoryResult, ValueObject};

/// Operator-controlled lifecycle of a ledger entry.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    #[default]
    Active,
    Inactive,
    Discontinued,
    Backorder,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Active => "active",
            LifecycleStatus::Inactive => "inactive",
            LifecycleStatus::Discontinued => "discontinued",
            LifecycleStatus::Backorder => "backorder",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleStatus::Active)
    }
}

impl core::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived sellability of a ledger entry. Never set directly.
///
/// `Backorder` is part of the persisted vocabulary but the derivation rule
/// never produces it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
    Backorder,
}

impl StockStatus {
    /// The one place stock status is computed.
    pub fn derive(lifecycle: LifecycleStatus, available: i64, low_stock: i64) -> Self {
        if !lifecycle.is_active() || available <= 0 {
            StockStatus::OutOfStock
        } else if available <= low_stock {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::Backorder => "backorder",
        }
    }
}

impl core::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stock thresholds, always ordered `0 <= reorder_point <= low_stock <= max_stock`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Thresholds {
    low_stock: i64,
    reorder_point: i64,
    max_stock: i64,
}

impl Thresholds {
    pub const DEFAULT_LOW_STOCK: i64 = 10;
    pub const DEFAULT_REORDER_POINT: i64 = 5;
    pub const DEFAULT_MAX_STOCK: i64 = 1000;

    pub fn new(low_stock: i64, reorder_point: i64, max_stock: i64) -> InventoryResult<Self> {
        if low_stock < 0 || reorder_point < 0 || max_stock < 0 {
            return Err(InventoryError::invalid_thresholds(
                "thresholds cannot be negative",
            ));
        }
        if reorder_point > low_stock {
            return Err(InventoryError::invalid_thresholds(format!(
                "reorder point ({reorder_point}) cannot exceed low stock threshold ({low_stock})"
            )));
        }
        if max_stock < low_stock {
            return Err(InventoryError::invalid_thresholds(format!(
                "max stock level ({max_stock}) cannot be below low stock threshold ({low_stock})"
            )));
        }
        Ok(Self {
            low_stock,
            reorder_point,
            max_stock,
        })
    }

    pub fn low_stock(&self) -> i64 {
        self.low_stock
    }

    pub fn reorder_point(&self) -> i64 {
        self.reorder_point
    }

    pub fn max_stock(&self) -> i64 {
        self.max_stock
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_stock: Self::DEFAULT_LOW_STOCK,
            reorder_point: Self::DEFAULT_REORDER_POINT,
            max_stock: Self::DEFAULT_MAX_STOCK,
        }
    }
}

impl ValueObject for Thresholds {}

/// Snapshot of an entry's counters, carried by events as before/after pairs.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockLevels {
    pub quantity: i64,
    pub reserved: i64,
    pub available: i64,
}

impl StockLevels {
    pub fn new(quantity: i64, reserved: i64) -> Self {
        Self {
            quantity,
            reserved,
            available: quantity - reserved,
        }
    }
}

impl ValueObject for StockLevels {}
