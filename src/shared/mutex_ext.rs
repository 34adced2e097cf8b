//! Usage: `Mutex` extension that recovers from poisoning instead of propagating a panic.

use std::sync::{Mutex, MutexGuard};

pub(crate) trait MutexExt<T> {
    /// Lock, recovering the inner value (and logging the call site) if a holder panicked.
    fn lock_or_recover(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[track_caller]
    fn lock_or_recover(&self) -> MutexGuard<'_, T> {
        match self.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    mutex_type = std::any::type_name::<T>(),
                    file = loc.file(),
                    line = loc.line(),
                    "session state mutex poisoned; recovered inner value, state may be stale"
                );
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn lock_or_recover_returns_value() {
        let mutex = Mutex::new(3u32);
        assert_eq!(*mutex.lock_or_recover(), 3);
    }

    #[test]
    fn lock_or_recover_survives_poisoned_counter() {
        let counter = Arc::new(Mutex::new(0u32));
        let counter_clone = Arc::clone(&counter);

        let _ = std::thread::spawn(move || {
            let mut guard = counter_clone.lock().unwrap();
            *guard = 2;
            panic!("poison the failure counter");
        })
        .join();

        assert_eq!(*counter.lock_or_recover(), 2);
    }
}
