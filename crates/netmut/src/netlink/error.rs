use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong between building a request and reading
/// the kernel's answer.
///
/// Kernel rejections start out as [`Error::KernelRejected`] and gain an
/// operation description through [`Error::with_context`] on the way up.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("allocation failed: {what}")]
    AllocationFailed { what: String },

    /// Malformed address, prefix or MAC literal.
    #[error("parse error: {0}")]
    ParseFailed(String),

    #[error("netlink socket unavailable: {0}")]
    SocketUnavailable(#[source] io::Error),

    #[error("unable to bind netlink socket: {0}")]
    BindFailed(#[source] io::Error),

    #[error("unable to send netlink request: {0}")]
    SendFailed(#[source] io::Error),

    #[error("unable to receive netlink response: {0}")]
    ReceiveFailed(#[source] io::Error),

    /// `errno` is positive; `message` is the OS description of it.
    #[error("kernel error: {message} (errno {errno})")]
    KernelRejected { errno: i32, message: String },

    #[error("{operation}: {message} (errno {errno})")]
    KernelWithContext {
        operation: String,
        errno: i32,
        message: String,
    },

    /// Raised before any nftables message leaves the process.
    #[error("netfilter batching is not supported by the kernel")]
    BatchingUnsupported,

    #[error("unsupported table family: {0}")]
    UnsupportedFamily(String),

    #[error("link not found: {name}")]
    LinkNotFound { name: String },

    #[error("incomplete veth pair: {present} exists but {missing} does not")]
    VethPairIncomplete { present: String, missing: String },

    #[error("unable to allocate netlink cache: {0}")]
    CacheAllocationFailed(#[source] Box<Error>),

    #[error("invalid interface name: {0}")]
    InvalidName(String),

    /// The object cannot do this in its current state, e.g. a deleted link
    /// or a rule without a handle.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),
}

impl Error {
    /// Build from the `error` field of an `NLMSG_ERROR` reply, which the
    /// kernel sends negated.
    pub fn from_errno(raw: i32) -> Self {
        let errno = raw.saturating_abs();
        Self::KernelRejected {
            errno,
            message: io::Error::from_raw_os_error(errno).to_string(),
        }
    }

    /// Name the operation a kernel rejection belongs to. Local errors pass
    /// through untouched.
    pub fn with_context(self, operation: impl Into<String>) -> Self {
        if let Self::KernelRejected { errno, message } = self {
            return Self::KernelWithContext {
                operation: operation.into(),
                errno,
                message,
            };
        }
        self
    }

    /// Kernel errno, looking through cache allocation failures.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::KernelRejected { errno, .. } => Some(*errno),
            Self::KernelWithContext { errno, .. } => Some(*errno),
            Self::CacheAllocationFailed(inner) => inner.errno(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::LinkNotFound { .. })
            || matches!(self.errno(), Some(libc::ENOENT | libc::ENODEV))
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self.errno(), Some(libc::EPERM | libc::EACCES))
    }

    pub fn is_already_exists(&self) -> bool {
        self.errno() == Some(libc::EEXIST)
    }

    pub fn is_busy(&self) -> bool {
        self.errno() == Some(libc::EBUSY)
    }
}
