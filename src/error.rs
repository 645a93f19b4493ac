//! Error types.
//!
//! Only `NotFound` is an ordinary, recoverable outcome. Descriptor and
//! size-hint problems stop `Table::create` from producing a table.
//! `ConcurrentAccessViolation` is never returned: it is the message of the
//! panic raised by the access detector.

/// Malformed or inconsistent type metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    /// The key type has no hash function.
    #[error("key type has no hash function")]
    MissingHash,
    /// The key type has no equality function.
    #[error("key type has no equality function")]
    MissingEqual,
    /// The key is too large to live inside a bucket.
    #[error("key of {size} bytes exceeds the inline limit and must be stored indirectly")]
    KeyMustBeIndirect {
        /// Size of the key type in bytes.
        size: usize,
    },
    /// The value is too large to live inside a bucket.
    #[error("value of {size} bytes exceeds the inline limit and must be stored indirectly")]
    ValueMustBeIndirect {
        /// Size of the value type in bytes.
        size: usize,
    },
}

/// Errors returned by `Table::create` and `Table::with_options`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CreateError {
    /// The descriptor failed validation.
    #[error("invalid descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
    /// The size hint does not fit the supported range.
    #[error("size hint {0} out of range")]
    HintOutOfRange(usize),
}

/// The key is not present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("key not found")]
pub struct NotFound;

/// Unsynchronized overlap of a write with another operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConcurrentAccessViolation {
    #[error("concurrent table read and table write")]
    ReadDuringWrite,
    #[error("concurrent table writes")]
    WriteDuringWrite,
    #[error("concurrent table iteration and table write")]
    IterateDuringWrite,
}
