use core::{fmt, mem, ptr};
use core::cell::UnsafeCell;
use core::convert::TryFrom;


#[cfg(not(any(target_os = "macos", target_os = "ios")))]
const CLOCK: libc::clockid_t = libc::CLOCK_MONOTONIC;
//No pthread_condattr_setclock on apple targets
#[cfg(any(target_os = "macos", target_os = "ios"))]
const CLOCK: libc::clockid_t = libc::CLOCK_REALTIME;

///OS error code, as returned by pthread functions.
pub type OsError = error_code::PosixError;

#[inline]
fn result(code: libc::c_int) -> Result<(), OsError> {
    match code {
        0 => Ok(()),
        code => Err(OsError::new(code)),
    }
}

///`pthread_mutex_t` wrapper.
///
///All methods except `new` require successful `init` and it must not be moved after that.
pub struct Mutex {
    handle: UnsafeCell<mem::MaybeUninit<libc::pthread_mutex_t>>,
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            handle: UnsafeCell::new(mem::MaybeUninit::uninit()),
        }
    }

    #[inline(always)]
    fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.handle.get() as _
    }

    pub unsafe fn init(&self) -> Result<(), OsError> {
        result(libc::pthread_mutex_init(self.raw(), ptr::null()))
    }

    pub unsafe fn lock(&self) -> Result<(), OsError> {
        result(libc::pthread_mutex_lock(self.raw()))
    }

    pub unsafe fn unlock(&self) -> Result<(), OsError> {
        result(libc::pthread_mutex_unlock(self.raw()))
    }

    pub unsafe fn destroy(&self) -> Result<(), OsError> {
        result(libc::pthread_mutex_destroy(self.raw()))
    }
}

///`pthread_cond_t` wrapper, measuring time with the same clock as `Deadline`.
pub struct Cond {
    handle: UnsafeCell<mem::MaybeUninit<libc::pthread_cond_t>>,
}

impl Cond {
    pub const fn new() -> Self {
        Self {
            handle: UnsafeCell::new(mem::MaybeUninit::uninit()),
        }
    }

    #[inline(always)]
    fn raw(&self) -> *mut libc::pthread_cond_t {
        self.handle.get() as _
    }

    pub unsafe fn init(&self) -> Result<(), OsError> {
        let mut attr = mem::MaybeUninit::<libc::pthread_condattr_t>::uninit();
        result(libc::pthread_condattr_init(attr.as_mut_ptr()))?;

        #[cfg(not(any(target_os = "macos", target_os = "ios")))]
        {
            if let Err(error) = result(libc::pthread_condattr_setclock(attr.as_mut_ptr(), CLOCK)) {
                libc::pthread_condattr_destroy(attr.as_mut_ptr());
                return Err(error);
            }
        }

        let res = result(libc::pthread_cond_init(self.raw(), attr.as_ptr()));
        libc::pthread_condattr_destroy(attr.as_mut_ptr());
        res
    }

    ///Releases `mutex` and blocks until woken up, re-acquiring `mutex` before returning.
    pub unsafe fn wait(&self, mutex: &Mutex) -> Result<(), OsError> {
        result(libc::pthread_cond_wait(self.raw(), mutex.raw()))
    }

    ///Same as `wait`, but gives up once `deadline` is reached.
    ///
    ///Returns `false` on timeout.
    pub unsafe fn wait_until(&self, mutex: &Mutex, deadline: &Deadline) -> Result<bool, OsError> {
        match libc::pthread_cond_timedwait(self.raw(), mutex.raw(), &deadline.time) {
            0 => Ok(true),
            libc::ETIMEDOUT => Ok(false),
            code => Err(OsError::new(code)),
        }
    }

    pub unsafe fn notify_one(&self) -> Result<(), OsError> {
        result(libc::pthread_cond_signal(self.raw()))
    }

    pub unsafe fn destroy(&self) -> Result<(), OsError> {
        result(libc::pthread_cond_destroy(self.raw()))
    }
}

#[derive(Clone, Copy)]
///Point in time to wait until.
///
///Uses monotonic clock where condition variable supports it, and realtime clock otherwise.
pub struct Deadline {
    time: libc::timespec,
}

impl Deadline {
    ///Returns current time.
    ///
    ///# Panics
    ///
    ///If system clock is not available.
    pub fn now() -> Self {
        let mut time = mem::MaybeUninit::uninit();
        if unsafe { libc::clock_gettime(CLOCK, time.as_mut_ptr()) } == -1 {
            panic!("Failed to get current time");
        }

        Self {
            time: unsafe {
                time.assume_init()
            }
        }
    }

    ///Returns deadline that is `timeout` away from now.
    ///
    ///Saturates at the maximum representable time.
    pub fn after(timeout: core::time::Duration) -> Self {
        let mut deadline = Self::now();
        let secs = libc::time_t::try_from(timeout.as_secs()).unwrap_or(libc::time_t::max_value());

        deadline.time.tv_sec = deadline.time.tv_sec.saturating_add(secs);
        deadline.time.tv_nsec += timeout.subsec_nanos() as libc::c_long;
        if deadline.time.tv_nsec >= 1_000_000_000 {
            deadline.time.tv_nsec -= 1_000_000_000;
            deadline.time.tv_sec = deadline.time.tv_sec.saturating_add(1);
        }

        deadline
    }

    ///Returns whether deadline is already reached.
    pub fn has_passed(&self) -> bool {
        let now = Self::now().time;
        (now.tv_sec, now.tv_nsec) >= (self.time.tv_sec, self.time.tv_nsec)
    }
}

impl fmt::Debug for Deadline {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Deadline")
           .field("tv_sec", &self.time.tv_sec)
           .field("tv_nsec", &self.time.tv_nsec)
           .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    #[test]
    fn deadline_keeps_nanos_normalized() {
        for millis in [0u64, 1, 999, 1000, 1500, 1999].iter() {
            let deadline = Deadline::after(Duration::from_millis(*millis));
            assert!(deadline.time.tv_nsec >= 0);
            assert!(deadline.time.tv_nsec < 1_000_000_000);
        }

        let before = Deadline::now();
        let deadline = Deadline::after(Duration::from_millis(1999));
        assert!(deadline.time.tv_sec >= before.time.tv_sec + 1);
        assert!(!deadline.has_passed());
    }
}
