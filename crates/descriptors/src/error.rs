//! Descriptor parse error

use thiserror::Error;

/// The descriptor block is structurally invalid
///
/// There are deliberately no sub-kinds: a bad length field, a wrong type tag
/// and a record running past the end of the buffer all abort the parse the
/// same way. `offset` points at the record where the problem was detected and
/// is only meant for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Malformed descriptor at byte offset {offset}")]
pub struct MalformedDescriptor {
    pub offset: usize,
}

/// Type alias for descriptor parse results
pub type Result<T> = std::result::Result<T, MalformedDescriptor>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MalformedDescriptor { offset: 27 };
        let msg = format!("{}", err);
        assert!(msg.contains("Malformed descriptor"));
        assert!(msg.contains("27"));
    }
}
