//! Run a provider call under an optional deadline.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::provider::ProviderError;

/// Call `f`, giving up after `timeout`. Without a timeout the call runs on the
/// current thread. A call that times out keeps running on its worker thread;
/// its result is dropped.
pub fn call_with_timeout<T, F>(timeout: Option<Duration>, f: F) -> Result<T, ProviderError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ProviderError> + Send + 'static,
{
    let Some(limit) = timeout else {
        return f();
    };
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(f());
    });
    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(ProviderError::Timeout {
            ms: limit.as_millis() as u64,
        }),
        Err(RecvTimeoutError::Disconnected) => Err(ProviderError::Unavailable(
            "provider call panicked".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_results_through() {
        assert_eq!(call_with_timeout(None, || Ok(3)), Ok(3));
        assert_eq!(
            call_with_timeout(Some(Duration::from_secs(5)), || Ok(4)),
            Ok(4)
        );
    }

    #[test]
    fn slow_calls_time_out() {
        let r: Result<(), _> = call_with_timeout(Some(Duration::from_millis(10)), || {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        });
        assert_eq!(r, Err(ProviderError::Timeout { ms: 10 }));
    }

    #[test]
    fn panics_become_failures() {
        let r: Result<(), _> =
            call_with_timeout(Some(Duration::from_secs(5)), || panic!("boom"));
        assert!(matches!(r, Err(ProviderError::Unavailable(_))));
    }
}
