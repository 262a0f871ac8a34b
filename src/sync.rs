pub use std::sync::Arc;

#[cfg(feature = "parking_lot")]
pub mod parking_lot {
    /// A mutex backed by `parking_lot`.
    #[repr(transparent)]
    #[derive(Debug, Default)]
    pub struct Mutex<T: ?Sized>(pub parking_lot::Mutex<T>);

    impl<T> Mutex<T> {
        #[must_use]
        pub fn new(value: T) -> Self {
            Self(parking_lot::Mutex::new(value))
        }
    }

    impl<T: ?Sized> Mutex<T> {
        pub fn lock(&self) -> parking_lot::MutexGuard<T> {
            self.0.lock()
        }

        pub fn try_lock(&self) -> Option<parking_lot::MutexGuard<T>> {
            self.0.try_lock()
        }
    }
}

#[cfg(not(feature = "parking_lot"))]
pub mod default {
    /// A mutex backed by `std::sync::Mutex`.
    ///
    /// Poisoning is not recovered from: a panic while holding a cache lock
    /// already means the simulation state is broken.
    #[repr(transparent)]
    #[derive(Debug, Default)]
    pub struct Mutex<T: ?Sized>(pub std::sync::Mutex<T>);

    impl<T> Mutex<T> {
        #[must_use]
        pub fn new(value: T) -> Self {
            Self(std::sync::Mutex::new(value))
        }
    }

    impl<T: ?Sized> Mutex<T> {
        pub fn lock(&self) -> std::sync::MutexGuard<T> {
            self.0.lock().unwrap()
        }

        pub fn try_lock(&self) -> Option<std::sync::MutexGuard<T>> {
            self.0.try_lock().ok()
        }
    }
}

#[cfg(feature = "parking_lot")]
pub use self::parking_lot::Mutex;

#[cfg(not(feature = "parking_lot"))]
pub use default::Mutex;
