// We follow the same approach to error handling as the rest of our crates:
// a public `Error` struct wraps a private `ErrorKind`, so we can rearrange the
// underlying kinds without breaking anybody.
//
// Errors are only ever detected at the host-side boundary of a launch, either
// before the launch (validation, allocation) or after the queue reports
// completion. Kernel bodies have no error path.

use gridreduce_nostd_internal::GeometryError;

/// Convenience alias used throughout the crate
pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

/// The underlying internal error type
#[non_exhaustive]
#[derive(Clone, Debug, thiserror::Error)]
enum ErrorKind {
    /// The accelerator backend reported a launch or runtime failure
    #[error(transparent)]
    BackendExecution(BackendExecutionError),
    /// A device or host buffer couldn't be allocated
    #[error(transparent)]
    ResourceExhausted(ResourceExhaustedError),
    /// The launch geometry couldn't be constructed (a programming error)
    #[error(transparent)]
    InvalidGeometry(InvalidGeometryError),
}

// define constructor methods for Error
impl Error {
    /// produce an error indicating that the `backend` failed to launch or
    /// execute a kernel
    pub(crate) fn backend_execution(backend: &'static str, what: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::BackendExecution(BackendExecutionError {
                backend,
                what: what.into(),
            }),
        }
    }

    /// produce an error indicating that an allocation of `requested_bytes`
    /// failed
    pub(crate) fn resource_exhausted(requested_bytes: usize, limit_bytes: Option<usize>) -> Self {
        Error {
            kind: ErrorKind::ResourceExhausted(ResourceExhaustedError {
                requested_bytes,
                limit_bytes,
            }),
        }
    }

    /// produce an error indicating that the launch geometry is invalid
    pub(crate) fn invalid_geometry(err: GeometryError) -> Self {
        Error {
            kind: ErrorKind::InvalidGeometry(InvalidGeometryError(err)),
        }
    }

    pub fn is_backend_execution(&self) -> bool {
        matches!(self.kind, ErrorKind::BackendExecution(_))
    }

    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self.kind, ErrorKind::ResourceExhausted(_))
    }

    pub fn is_invalid_geometry(&self) -> bool {
        matches!(self.kind, ErrorKind::InvalidGeometry(_))
    }
}

impl From<GeometryError> for Error {
    fn from(err: GeometryError) -> Self {
        Error::invalid_geometry(err)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        self.kind.fmt(f)
    }
}

/// An error that occurs when an accelerator backend fails to launch or
/// execute a kernel
#[derive(Clone, Debug, thiserror::Error)]
#[error("the {backend} backend failed to execute a kernel: {what}")]
struct BackendExecutionError {
    backend: &'static str,
    what: String,
}

/// An error that occurs when a device (or host) buffer can't be allocated
#[derive(Clone, Debug, thiserror::Error)]
#[error("unable to allocate {requested_bytes} bytes{}", describe_limit(.limit_bytes))]
struct ResourceExhaustedError {
    requested_bytes: usize,
    limit_bytes: Option<usize>,
}

fn describe_limit(limit_bytes: &Option<usize>) -> String {
    match limit_bytes {
        Some(limit) => format!(" (the device accepts allocations of at most {limit} bytes)"),
        None => String::new(),
    }
}

/// An error that occurs when the launch geometry can't be constructed
#[derive(Clone, Debug, thiserror::Error)]
#[error("invalid launch geometry: {0}")]
struct InvalidGeometryError(GeometryError);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let err = Error::backend_execution("cpu-serial", "device fault");
        assert!(err.is_backend_execution());
        assert_eq!(
            err.to_string(),
            "the cpu-serial backend failed to execute a kernel: device fault"
        );

        let err = Error::resource_exhausted(4096, Some(1024));
        assert!(err.is_resource_exhausted());
        assert!(err.to_string().contains("at most 1024 bytes"));

        let err: Error = GeometryError::ZeroBlockSize.into();
        assert!(err.is_invalid_geometry());
        assert_eq!(
            err.to_string(),
            "invalid launch geometry: the block size must be positive"
        );
    }
}
