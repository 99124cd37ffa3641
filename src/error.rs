use derive_more::{Display, Error};

/// Failure taxonomy of a reconciliation run.
#[derive(Debug, Display, Error)]
pub enum ImportError {
    /// Record lacks a name or an identity key. Skipped, not counted as failure.
    #[display("Skipped invalid record: {reason}")]
    Validation { reason: String },
    #[display("Unable to create {product}: {reason}")]
    Creation { product: String, reason: String },
    #[display("Unable to update {product}: {reason}")]
    Update { product: String, reason: String },
    /// Whole feed could not be fetched or parsed; aborts the supplier run.
    #[display("Unable to fetch feed of {supplier}: {reason}")]
    FeedFetch { supplier: String, reason: String },
    #[display("Unable to compute price of {product}: {reason}")]
    PriceComputation { product: String, reason: String },
}

impl ImportError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn creation(product: &str, err: impl std::fmt::Display) -> Self {
        Self::Creation {
            product: product.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn update(product: &str, err: impl std::fmt::Display) -> Self {
        Self::Update {
            product: product.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn price(product: &str, reason: impl Into<String>) -> Self {
        Self::PriceComputation {
            product: product.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
