use core::{fmt, ptr};
use core::cell::UnsafeCell;
use core::convert::TryFrom;
use core::ffi::c_void;

const ERROR_TIMEOUT: i32 = 1460;
const INFINITE: u32 = 0xFFFFFFFF;

///OS error code, as reported by `GetLastError`.
pub type OsError = error_code::SystemError;

extern "system" {
    fn AcquireSRWLockExclusive(lock: *mut *mut c_void);
    fn ReleaseSRWLockExclusive(lock: *mut *mut c_void);
    fn SleepConditionVariableSRW(cond: *mut *mut c_void, lock: *mut *mut c_void, timeout_ms: u32, flags: u32) -> i32;
    fn WakeConditionVariable(cond: *mut *mut c_void);
    fn GetTickCount64() -> u64;
}

///`SRWLOCK` wrapper.
///
///SRW locks have no resources to allocate or release, so every operation succeeds.
pub struct Mutex {
    handle: UnsafeCell<*mut c_void>,
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            handle: UnsafeCell::new(ptr::null_mut()),
        }
    }

    pub unsafe fn init(&self) -> Result<(), OsError> {
        *self.handle.get() = ptr::null_mut();
        Ok(())
    }

    pub unsafe fn lock(&self) -> Result<(), OsError> {
        AcquireSRWLockExclusive(self.handle.get());
        Ok(())
    }

    pub unsafe fn unlock(&self) -> Result<(), OsError> {
        ReleaseSRWLockExclusive(self.handle.get());
        Ok(())
    }

    pub unsafe fn destroy(&self) -> Result<(), OsError> {
        Ok(())
    }
}

///`CONDITION_VARIABLE` wrapper.
pub struct Cond {
    handle: UnsafeCell<*mut c_void>,
}

impl Cond {
    pub const fn new() -> Self {
        Self {
            handle: UnsafeCell::new(ptr::null_mut()),
        }
    }

    pub unsafe fn init(&self) -> Result<(), OsError> {
        *self.handle.get() = ptr::null_mut();
        Ok(())
    }

    unsafe fn sleep(&self, mutex: &Mutex, timeout_ms: u32) -> Result<bool, OsError> {
        match SleepConditionVariableSRW(self.handle.get(), mutex.handle.get(), timeout_ms, 0) {
            0 => {
                let error = OsError::last();
                if error.raw_code() == ERROR_TIMEOUT {
                    Ok(false)
                } else {
                    Err(error)
                }
            },
            _ => Ok(true),
        }
    }

    ///Releases `mutex` and blocks until woken up, re-acquiring `mutex` before returning.
    pub unsafe fn wait(&self, mutex: &Mutex) -> Result<(), OsError> {
        self.sleep(mutex, INFINITE).map(|_| ())
    }

    ///Same as `wait`, but gives up once `deadline` is reached.
    ///
    ///Returns `false` on timeout.
    pub unsafe fn wait_until(&self, mutex: &Mutex, deadline: &Deadline) -> Result<bool, OsError> {
        loop {
            //INFINITE is reserved, hence far deadlines take several sleeps
            let remaining = u32::try_from(deadline.remaining_ms()).unwrap_or(INFINITE - 1).min(INFINITE - 1);

            match self.sleep(mutex, remaining)? {
                false if !deadline.has_passed() => continue,
                woken => break Ok(woken),
            }
        }
    }

    pub unsafe fn notify_one(&self) -> Result<(), OsError> {
        WakeConditionVariable(self.handle.get());
        Ok(())
    }

    pub unsafe fn destroy(&self) -> Result<(), OsError> {
        Ok(())
    }
}

#[derive(Clone, Copy)]
///Point in time to wait until.
///
///Millisecond precision, measured by system tick count.
pub struct Deadline {
    tick_ms: u64,
}

impl Deadline {
    ///Returns current time.
    pub fn now() -> Self {
        Self {
            tick_ms: unsafe {
                GetTickCount64()
            }
        }
    }

    ///Returns deadline that is `timeout` away from now.
    ///
    ///Saturates at the maximum representable time.
    pub fn after(timeout: core::time::Duration) -> Self {
        let timeout = u64::try_from(timeout.as_millis()).unwrap_or(u64::max_value());
        Self {
            tick_ms: Self::now().tick_ms.saturating_add(timeout),
        }
    }

    #[inline]
    fn remaining_ms(&self) -> u64 {
        self.tick_ms.saturating_sub(Self::now().tick_ms)
    }

    ///Returns whether deadline is already reached.
    pub fn has_passed(&self) -> bool {
        Self::now().tick_ms >= self.tick_ms
    }
}

impl fmt::Debug for Deadline {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Deadline").field("tick_ms", &self.tick_ms).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn far_deadline_needs_several_sleeps() {
        let deadline = Deadline::after(core::time::Duration::from_secs(60 * 24 * 60 * 60));
        assert!(deadline.remaining_ms() > u64::from(INFINITE));
        assert!(!deadline.has_passed());
    }

    #[test]
    fn passed_deadline_times_out() {
        let mutex = Mutex::new();
        let cond = Cond::new();
        unsafe {
            mutex.init().unwrap();
            cond.init().unwrap();
            mutex.lock().unwrap();
            assert!(!cond.wait_until(&mutex, &Deadline::now()).unwrap());
            mutex.unlock().unwrap();
        }
    }
}
