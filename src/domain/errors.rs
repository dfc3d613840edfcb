use thiserror::Error;

/// Errors raised when a genome disagrees with its schema.
///
/// These are programming errors in the evolution pipeline: operators draw
/// inside bounds and the codec clips, so a violation means a bug upstream.
/// Callers report the offending genome and repair or skip it rather than
/// crashing the cycle.
#[derive(Debug, Error)]
pub enum GenomeError {
    #[error("Gene '{gene}' missing from genome")]
    MissingGene { gene: String },

    #[error("Gene '{gene}' is not declared in the schema")]
    UnknownGene { gene: String },

    #[error("Gene '{gene}' value {value} outside bounds [{min}, {max}]")]
    OutOfBounds {
        gene: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Gene '{gene}' has no category '{value}'")]
    UnknownCategory { gene: String, value: String },

    #[error("Gene '{gene}' value type does not match its declared bounds")]
    TypeMismatch { gene: String },

    #[error("Encoded vector carries {actual} genes, schema declares {expected}")]
    ArityMismatch { expected: usize, actual: usize },
}

/// Errors from the backtest collaborator.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("Backtest venue unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Malformed backtest result: {reason}")]
    Malformed { reason: String },
}

/// Errors from the storage collaborator.
///
/// Treated as fatal by the supervisor: proceeding on an unpersisted
/// generation would break lineage integrity for elitism and audit.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Errors in the fitness calibration surface.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Fitness weights sum to {sum:.4}, expected 1.0")]
    WeightSum { sum: f64 },

    #[error("Normalization bounds for '{metric}' are degenerate: min {min} >= max {max}")]
    DegenerateBounds {
        metric: String,
        min: f64,
        max: f64,
    },
}
