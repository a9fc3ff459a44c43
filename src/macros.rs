#![allow(unused_macros)]

/// Helper macro for locking items
///
/// A poisoned mutex is reported as [`crate::Error::LockError`].
///
/// ```rust, ignore
///  let mut data = lock!(my_mutex)?;
///  data.insert(rect);
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().map_err(|_| crate::Error::LockError)
    };
}

/// Helper macro for taking the value out of a mutex that is no longer shared
///
/// ```rust, ignore
///  let region = into_inner!(self.deferred)?;
/// ```
macro_rules! into_inner {
    ($lock:expr) => {
        $lock.into_inner().map_err(|_| crate::Error::LockError)
    };
}
