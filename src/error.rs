//! Error kinds for every public operation.
//!
//! `Internal` indicates a structural invariant was found violated (a
//! missing collision sibling, a primitive's precondition failing). It is
//! never recovered from internally — the operation aborts without further
//! mutation and the error is surfaced to the caller, who is responsible
//! for treating the region as corrupted.

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("no space left in table")]
    NoSpace,

    #[error("key not found")]
    NotFound,

    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_the_invalid_argument_reason() {
        let err = Error::InvalidArgument("key must not be empty");
        assert_eq!(err.to_string(), "invalid argument: key must not be empty");
    }

    #[test]
    fn fixed_variants_have_stable_messages() {
        assert_eq!(Error::NoSpace.to_string(), "no space left in table");
        assert_eq!(Error::NotFound.to_string(), "key not found");
    }
}
