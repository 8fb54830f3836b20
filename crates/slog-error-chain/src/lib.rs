//! Vendored stand-in for the `slog-error-chain` crate.
//!
//! Only the [`InlineErrorChain`] helper is provided, since that is all the
//! workspace consumes. Its `Display` implementation reproduces the upstream
//! behavior: the error's own `Display`, followed by each source in the
//! `std::error::Error::source` chain, joined with `": "`.

use std::error::Error;
use std::fmt;

/// Formats an error together with its full source chain on a single line.
pub struct InlineErrorChain<'a> {
    error: &'a (dyn Error + 'a),
}

impl<'a> InlineErrorChain<'a> {
    /// Wraps `error` for inline display of its source chain.
    pub fn new(error: &'a (dyn Error + 'a)) -> Self {
        Self { error }
    }
}

impl fmt::Display for InlineErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        let mut source = self.error.source();
        while let Some(err) = source {
            write!(f, ": {err}")?;
            source = err.source();
        }
        Ok(())
    }
}
