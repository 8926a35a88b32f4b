use core::fmt;

use crate::sys::OsError;

#[derive(Debug, Clone, Copy)]
///Reason semaphore could not be created
pub enum InitError {
    ///Initial value does not fit into semaphore counter.
    Range,
    ///Failed to create mutex.
    Mutex(OsError),
    ///Failed to create condition variable.
    Cond(OsError),
}

impl PartialEq for InitError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (InitError::Range, InitError::Range) => true,
            (InitError::Mutex(left), InitError::Mutex(right)) => left.raw_code() == right.raw_code(),
            (InitError::Cond(left), InitError::Cond(right)) => left.raw_code() == right.raw_code(),
            _ => false,
        }
    }
}

impl Eq for InitError {}

impl fmt::Display for InitError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Range => fmt.write_str("initial value exceeds counter range"),
            InitError::Mutex(code) => write!(fmt, "unable to create mutex: {}", code),
            InitError::Cond(code) => write!(fmt, "unable to create condition variable: {}", code),
        }
    }
}

#[derive(Debug, Clone, Copy)]
///Semaphore error
pub enum Error {
    ///Semaphore creation failed.
    Init(InitError),
    ///Mutex reported failure.
    ///
    ///Semaphore state cannot be trusted after that.
    Lock(OsError),
    ///Condition variable reported failure.
    ///
    ///Semaphore state cannot be trusted after that.
    Cond(OsError),
    ///Counter would go out of its range.
    Overflow,
    ///Deadline passed before semaphore was signaled.
    Timeout,
    ///Semaphore is already closed.
    Closed,
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::Init(left), Error::Init(right)) => left == right,
            (Error::Lock(left), Error::Lock(right)) => left.raw_code() == right.raw_code(),
            (Error::Cond(left), Error::Cond(right)) => left.raw_code() == right.raw_code(),
            (Error::Overflow, Error::Overflow) => true,
            (Error::Timeout, Error::Timeout) => true,
            (Error::Closed, Error::Closed) => true,
            _ => false,
        }
    }
}

impl Eq for Error {}

impl From<InitError> for Error {
    #[inline(always)]
    fn from(error: InitError) -> Self {
        Error::Init(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Init(error) => write!(fmt, "semaphore init failed: {}", error),
            Error::Lock(code) => write!(fmt, "mutex error: {}", code),
            Error::Cond(code) => write!(fmt, "condition variable error: {}", code),
            Error::Overflow => fmt.write_str("semaphore counter overflow"),
            Error::Timeout => fmt.write_str("semaphore wait timed out"),
            Error::Closed => fmt.write_str("semaphore is closed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InitError {}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
