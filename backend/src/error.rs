//! Error types for the SaaS metrics pipeline.
//!
//! Each layer has its own error enum:
//!
//! - [`ParseError`] - Raw file loading (JSON / CSV)
//! - [`CastError`] - A raw value that cannot be cast to its column type
//! - [`WarehouseError`] - Materialized relation storage
//! - [`IngestError`] - Loading raw records into the source relation
//! - [`ForecastError`] - Revenue forecasting
//! - [`ConfigError`] - Environment configuration
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP API errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Parsing Errors
// =============================================================================

/// Errors while reading a raw input file.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Input is not a JSON array of objects.
    #[error("Invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    /// A JSON array element is not an object.
    #[error("Element {index} is not a JSON object")]
    NotAnObject { index: usize },

    /// Invalid CSV content.
    #[error("Line {line}: {message}")]
    Csv { line: usize, message: String },

    /// Empty file.
    #[error("Input file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,
}

// =============================================================================
// Cast Errors
// =============================================================================

/// A raw value could not be converted to the declared column type.
///
/// Aborts the whole staging transform; there is no default substitution.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Row {row}, column '{column}': cannot cast {value} to {target}")]
pub struct CastError {
    /// Zero-based index of the source row.
    pub row: usize,
    pub column: String,
    /// The offending raw value, rendered as JSON.
    pub value: String,
    /// Target SQL type name (INTEGER, DATE, NUMERIC, VARCHAR).
    pub target: &'static str,
}

// =============================================================================
// Warehouse Errors
// =============================================================================

/// Errors from the file-backed warehouse.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// A referenced relation has never been materialized.
    #[error("Relation not found: {0}")]
    RelationNotFound(String),

    /// Stored document does not match the expected row shape.
    #[error("Corrupt relation {relation}: {message}")]
    Corrupt { relation: String, message: String },

    /// IO error.
    #[error("Warehouse IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Warehouse JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Ingest Errors
// =============================================================================

/// Errors while loading records into the raw source relation.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Input file could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// A record does not have the raw table shape.
    #[error("Record {index} rejected: {errors:?}")]
    InvalidRecord { index: usize, errors: Vec<String> },

    /// Primary key is null.
    #[error("Record {index}: customer_id must not be null")]
    NullKey { index: usize },

    /// Primary key does not cast to INTEGER.
    #[error("Record {index}: invalid customer_id: {source}")]
    InvalidKey {
        index: usize,
        #[source]
        source: CastError,
    },

    /// Primary key already present.
    #[error("Record {index}: duplicate customer_id {key}")]
    DuplicateKey { index: usize, key: String },

    /// Warehouse error.
    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),
}

// =============================================================================
// Forecast Errors
// =============================================================================

/// Errors while fitting the revenue forecast.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Fewer usable months than the model needs.
    #[error("Need at least {needed} months of revenue history, found {found}")]
    NotEnoughData { needed: usize, found: usize },

    /// Month arithmetic left the supported calendar range.
    #[error("Month out of range: {0}")]
    MonthOutOfRange(String),

    /// Warehouse error.
    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),
}

// =============================================================================
// Config Errors
// =============================================================================

/// Invalid environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({message})")]
    InvalidValue {
        key: &'static str,
        value: String,
        message: String,
    },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level errors returned by model runs and forecasting.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Type-cast failure in the staging transform.
    #[error("Cast error: {0}")]
    Cast(#[from] CastError),

    /// Warehouse error (including missing referenced relations).
    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    /// Ingest error.
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Forecast error.
    #[error("Forecast error: {0}")]
    Forecast(#[from] ForecastError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Failed to bind or serve.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for warehouse operations.
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Result type for ingest operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Result type for forecast operations.
pub type ForecastResult<T> = Result<T, ForecastError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
