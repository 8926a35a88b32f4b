//!Counting semaphore built on top of mutex and condition variable
//!
//!Unlike OS semaphores, counter is allowed to go negative: `-k` means `k` threads are currently
//!blocked in `wait`. Every completed `signal` is recorded as pending until some blocked thread
//!claims it, hence single `signal` never lets more than one `wait` to proceed, regardless of
//!spurious wake ups.
//!
//!## Platform implementation
//!
//!#### Windows
//!
//!Uses `SRWLOCK` and `CONDITION_VARIABLE`.
//!
//!#### POSIX
//!
//!All POSIX-compliant systems use `pthread_mutex_t` and `pthread_cond_t`.
//!Timed waits are measured by `CLOCK_MONOTONIC`, except on apple targets where only
//!`CLOCK_REALTIME` is supported by condition variable.
//!
//!POSIX implementation relies on [libc](https://github.com/rust-lang/libc)
//!
//!This includes all `unix` targets and `fuchsia`
//!
//!## Features
//!
//!- `std` - Implements `std::error::Error` for errors.
//!- `log` - Reports failures via [log](https://github.com/rust-lang/log) facade.
//!
//!## Usage
//!
//!```rust
//!use cvsem::Sem;
//!
//!let sem = Sem::new(1).expect("create semaphore");
//!{
//!    let _guard = sem.lock().expect("lock");
//!    assert_eq!(sem.value(), 0);
//!    assert!(sem.try_lock().is_none());
//!}
//!assert_eq!(sem.value(), 1);
//!```

#![no_std]
#![warn(missing_docs)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

#[cfg(not(any(windows, unix, target_os = "fuchsia")))]
compile_error!("Semaphore is not available for your target");

#[cfg(feature = "log")]
macro_rules! diag {
    ($level:ident, $($arg:tt)+) => {
        log::$level!($($arg)+)
    }
}

#[cfg(not(feature = "log"))]
macro_rules! diag {
    ($level:ident, $($arg:tt)+) => {{
        let _ = format_args!($($arg)+);
    }}
}

#[cfg(any(unix, target_os = "fuchsia"))]
#[path = "posix.rs"]
mod sys;
#[cfg(windows)]
#[path = "win32.rs"]
mod sys;

mod error;
mod sem;

pub use error::{Error, InitError};
pub use sem::{Sem, SemGuard, COUNTER_MAX, COUNTER_MIN};
pub use sys::{Deadline, OsError};

#[cold]
#[inline(never)]
fn cold() {}

#[inline(always)]
fn unlikely<T>(val: T) -> T {
    cold();
    val
}
