//! Session error type.

use thiserror::Error;

use crate::cache::CacheError;
use crate::resolver::ResolveError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}
