use core::{fmt, mem};
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicI32, AtomicU8, Ordering};

use alloc::boxed::Box;

use crate::sys::{Cond, Deadline, Mutex};
use crate::{unlikely, Error, InitError};

///Maximum value of semaphore counter.
pub const COUNTER_MAX: i32 = i32::max_value();
///Minimum value of semaphore counter.
///
///Negative counter `-k` means `k` threads are blocked in `wait`.
pub const COUNTER_MIN: i32 = i32::min_value();

const MUTEX_INITED: u8 = 0b01;
const COND_INITED: u8 = 0b10;
const INITED: u8 = MUTEX_INITED | COND_INITED;

struct Inner {
    mutex: Mutex,
    cond: Cond,
    //Written only while holding `mutex`
    counter: AtomicI32,
    //Signals that are not yet claimed by blocked waiters.
    pending: UnsafeCell<u32>,
}

///Holds `Inner::mutex`, releasing it on drop.
struct Locked<'a> {
    inner: &'a Inner,
}

impl<'a> Locked<'a> {
    fn new(inner: &'a Inner) -> Result<Self, Error> {
        match unsafe { inner.mutex.lock() } {
            Ok(()) => Ok(Self { inner }),
            Err(code) => unlikely(Err(Error::Lock(code))),
        }
    }

    #[inline(always)]
    fn counter(&self) -> i32 {
        self.inner.counter.load(Ordering::Relaxed)
    }

    #[inline(always)]
    fn set_counter(&mut self, value: i32) {
        self.inner.counter.store(value, Ordering::Relaxed)
    }

    #[inline(always)]
    fn pending(&mut self) -> &mut u32 {
        unsafe {
            &mut *self.inner.pending.get()
        }
    }

    fn wait(&mut self) -> Result<(), Error> {
        unsafe {
            self.inner.cond.wait(&self.inner.mutex).map_err(Error::Cond)
        }
    }

    fn wait_until(&mut self, deadline: &Deadline) -> Result<bool, Error> {
        unsafe {
            self.inner.cond.wait_until(&self.inner.mutex, deadline).map_err(Error::Cond)
        }
    }

    fn notify_one(&mut self) -> Result<(), Error> {
        unsafe {
            self.inner.cond.notify_one().map_err(Error::Cond)
        }
    }

    ///Blocks until there is pending signal to claim.
    ///
    ///Caller must have already decremented counter.
    ///On failure the decrement is reverted, unless signal got claimed anyway.
    fn block(&mut self, deadline: Option<&Deadline>) -> Result<(), Error> {
        loop {
            let woken = match deadline {
                Some(deadline) => self.wait_until(deadline),
                None => self.wait().map(|_| true),
            };

            //Waking up alone is not enough, there must be signal for us.
            if *self.pending() > 0 {
                *self.pending() -= 1;
                return Ok(());
            }

            let error = match woken {
                Ok(true) => continue,
                Ok(false) => Error::Timeout,
                Err(error) => error,
            };

            let counter = self.counter();
            self.set_counter(counter + 1);
            diag!(trace, "wait aborted ({}), counter restored to {}", error, counter + 1);
            break Err(error);
        }
    }

    fn unlock(self) -> Result<(), Error> {
        let inner = self.inner;
        mem::forget(self);

        unsafe {
            inner.mutex.unlock().map_err(Error::Lock)
        }
    }
}

impl Drop for Locked<'_> {
    fn drop(&mut self) {
        let _ = unsafe {
            self.inner.mutex.unlock()
        };
    }
}

///Counting semaphore built on top of mutex and condition variable.
///
///Counter may become negative, in which case its absolute value is number of threads blocked in
///`wait`. Each successful `signal` lets exactly one `wait` to proceed.
///
///Which of blocked threads is woken up is unspecified.
pub struct Sem {
    inner: Box<Inner>,
    state: AtomicU8,
}

impl Sem {
    ///Creates new instance, initializing it with `init`
    ///
    ///Fails if `init` is greater than `COUNTER_MAX` or when OS is unable to provide mutex or
    ///condition variable.
    pub fn new(init: u32) -> Result<Self, Error> {
        if init > COUNTER_MAX as u32 {
            diag!(warn, "Semaphore initial value {} is out of range", init);
            return unlikely(Err(InitError::Range.into()));
        }

        let result = Self::uninit(init as i32);

        if let Err(code) = unsafe { result.inner.mutex.init() } {
            diag!(warn, "Unable to create semaphore mutex: {}", code);
            return unlikely(Err(InitError::Mutex(code).into()));
        }
        result.state.fetch_or(MUTEX_INITED, Ordering::Release);

        //On failure `result` is dropped, destroying mutex created above.
        if let Err(code) = unsafe { result.inner.cond.init() } {
            diag!(warn, "Unable to create semaphore condition variable: {}", code);
            return unlikely(Err(InitError::Cond(code).into()));
        }
        result.state.fetch_or(COND_INITED, Ordering::Release);

        Ok(result)
    }

    //Nothing is constructed yet, hence dropping it is no-op.
    fn uninit(init: i32) -> Self {
        Self {
            inner: Box::new(Inner {
                mutex: Mutex::new(),
                cond: Cond::new(),
                counter: AtomicI32::new(init),
                pending: UnsafeCell::new(0),
            }),
            state: AtomicU8::new(0),
        }
    }

    #[inline(always)]
    ///Returns whether semaphore is initialized and not yet closed.
    pub fn is_init(&self) -> bool {
        self.state.load(Ordering::Acquire) == INITED
    }

    #[inline]
    fn locked(&self) -> Result<Locked<'_>, Error> {
        match self.is_init() {
            true => Locked::new(&self.inner),
            false => unlikely(Err(Error::Closed)),
        }
    }

    fn acquire(&self, deadline: Option<&Deadline>) -> Result<(), Error> {
        let mut locked = self.locked()?;

        let counter = locked.counter();
        if counter == COUNTER_MIN {
            diag!(debug, "Semaphore counter underflow on wait");
            return unlikely(Err(Error::Overflow));
        }
        locked.set_counter(counter - 1);

        if counter <= 0 {
            locked.block(deadline)?;
        }

        locked.unlock()
    }

    #[inline]
    ///Decrements self, returning immediately if it was positive.
    ///
    ///Otherwise awaits for signal.
    pub fn wait(&self) -> Result<(), Error> {
        self.acquire(None)
    }

    #[inline]
    ///Decrements self, awaiting for signal at most until `deadline`.
    ///
    ///Returns `Error::Timeout` if `deadline` is reached without signal, leaving counter as it was
    ///before the call.
    pub fn wait_until(&self, deadline: Deadline) -> Result<(), Error> {
        self.acquire(Some(&deadline))
    }

    #[inline]
    ///Decrements self, awaiting for signal at most `timeout`.
    ///
    ///Refer to `wait_until` for details.
    pub fn wait_timeout(&self, timeout: core::time::Duration) -> Result<(), Error> {
        self.wait_until(Deadline::after(timeout))
    }

    ///Attempts to decrement self, returning whether self was positive or not.
    ///
    ///Never blocks on signal.
    pub fn try_wait(&self) -> Result<bool, Error> {
        let mut locked = self.locked()?;

        let counter = locked.counter();
        let result = counter > 0;
        if result {
            locked.set_counter(counter - 1);
        }

        locked.unlock().map(|_| result)
    }

    ///Increments self, waking one awaiting thread if there is any.
    pub fn signal(&self) -> Result<(), Error> {
        let mut locked = self.locked()?;

        let counter = locked.counter();
        if counter == COUNTER_MAX {
            diag!(debug, "Semaphore counter overflow on signal");
            return unlikely(Err(Error::Overflow));
        }

        //Negative counter means someone awaits
        if counter < 0 {
            let pending = *locked.pending();
            if pending == u32::max_value() {
                diag!(debug, "Semaphore pending signals overflow");
                return unlikely(Err(Error::Overflow));
            }

            locked.notify_one()?;
            *locked.pending() = pending + 1;
        }
        locked.set_counter(counter + 1);

        locked.unlock()
    }

    #[inline]
    ///Returns snapshot of the counter.
    ///
    ///It might be already outdated by the time it is returned.
    pub fn value(&self) -> i32 {
        self.inner.counter.load(Ordering::Relaxed)
    }

    ///Decrements self, returning guard that increments it back on drop.
    pub fn lock(&self) -> Result<SemGuard<'_>, Error> {
        self.wait().map(|_| SemGuard::new(self))
    }

    ///Attempts to decrement self, returning guard that increments it back on drop.
    ///
    ///Returns `None` if self is not positive or on error.
    pub fn try_lock(&self) -> Option<SemGuard<'_>> {
        match self.try_wait() {
            Ok(true) => Some(SemGuard::new(self)),
            _ => None,
        }
    }

    ///Performs deinitialization.
    ///
    ///Every constructed resource is destroyed even if destruction of other one fails, in which
    ///case the first error is returned.
    ///Calling it on closed semaphore does nothing.
    pub fn close(&mut self) -> Result<(), Error> {
        let state = self.state.swap(0, Ordering::AcqRel);
        let mut result = Ok(());

        if state & MUTEX_INITED == MUTEX_INITED {
            if let Err(code) = unsafe { self.inner.mutex.destroy() } {
                result = Err(Error::Lock(code));
            }
        }

        if state & COND_INITED == COND_INITED {
            if let Err(code) = unsafe { self.inner.cond.destroy() } {
                if result.is_ok() {
                    result = Err(Error::Cond(code));
                }
            }
        }

        if let Err(error) = &result {
            diag!(warn, "Semaphore close failed: {}", error);
        }

        result
    }
}

impl fmt::Debug for Sem {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Sem")
           .field("value", &self.value())
           .field("init", &self.is_init())
           .finish()
    }
}

impl Drop for Sem {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            diag!(warn, "Semaphore close on drop failed: {}", error);
        }
    }
}

unsafe impl Send for Sem {}
unsafe impl Sync for Sem {}

///Unit of semaphore, acquired by `Sem::lock`.
///
///Signals semaphore on drop.
pub struct SemGuard<'a> {
    sem: &'a Sem,
}

impl<'a> SemGuard<'a> {
    #[inline(always)]
    fn new(sem: &'a Sem) -> Self {
        Self {
            sem
        }
    }

    ///Releases unit, reporting error if signal fails.
    pub fn release(self) -> Result<(), Error> {
        let sem = self.sem;
        mem::forget(self);
        sem.signal()
    }
}

impl Drop for SemGuard<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.sem.signal() {
            diag!(warn, "Semaphore guard release failed: {}", error);
        }
    }
}
