/*!
    Ordered teardown of acquired resources.
*/

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::MuxError;

type CloseFn = Box<dyn FnOnce() -> Result<(), MuxError> + Send>;

/**
    A stack of cleanup actions, executed in reverse registration order.

    Teardown is best-effort: a failing action never prevents the remaining
    ones from running, and every failure is collected into a single
    [`MuxError::Cleanup`].
*/
pub struct Closer {
    actions: Mutex<Vec<CloseFn>>,
    closed: AtomicBool,
}

impl Closer {
    pub fn new() -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /**
        Register a cleanup action.

        Actions added after [`Closer::close`] has run are executed immediately.
    */
    pub fn add<F>(&self, action: F)
    where
        F: FnOnce() -> Result<(), MuxError> + Send + 'static,
    {
        {
            let mut actions = self.actions.lock();
            if !self.closed.load(Ordering::Acquire) {
                actions.push(Box::new(action));
                return;
            }
        }

        if let Err(e) = action() {
            tracing::warn!(error = %e, "cleanup action added after close failed");
        }
    }

    /**
        Number of actions waiting to run.
    */
    pub fn len(&self) -> usize {
        self.actions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /**
        Run every registered action, last registered first.

        Only the first call does any work; later calls return `Ok(())`.
    */
    pub fn close(&self) -> Result<(), MuxError> {
        let actions = {
            let mut actions = self.actions.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            std::mem::take(&mut *actions)
        };

        let total = actions.len();
        let mut errors = Vec::new();
        for action in actions.into_iter().rev() {
            if let Err(e) = action() {
                errors.push(e);
            }
        }

        tracing::debug!(actions = total, failed = errors.len(), "closer finished");

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MuxError::Cleanup(errors))
        }
    }
}

impl Default for Closer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Closer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "cleanup on drop failed");
        }
    }
}

impl std::fmt::Debug for Closer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Closer")
            .field("pending", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn recorder() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn runs_in_reverse_order() {
        let order = recorder();
        let closer = Closer::new();
        for name in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            closer.add(move || {
                order.lock().push(name);
                Ok(())
            });
        }

        assert!(closer.close().is_ok());
        assert_eq!(*order.lock(), vec!["c", "b", "a"]);
    }

    #[test]
    fn failure_does_not_stop_remaining_actions() {
        let order = recorder();
        let closer = Closer::new();

        let o = Arc::clone(&order);
        closer.add(move || {
            o.lock().push("a");
            Ok(())
        });
        let o = Arc::clone(&order);
        closer.add(move || {
            o.lock().push("b");
            Err(MuxError::InvalidConfig("b failed".into()))
        });
        let o = Arc::clone(&order);
        closer.add(move || {
            o.lock().push("c");
            Ok(())
        });

        match closer.close() {
            Err(MuxError::Cleanup(errors)) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].to_string().contains("b failed"));
            }
            other => panic!("expected cleanup error, got {other:?}"),
        }
        assert_eq!(*order.lock(), vec!["c", "b", "a"]);
    }

    #[test]
    fn close_runs_once() {
        let order = recorder();
        let closer = Closer::new();
        let o = Arc::clone(&order);
        closer.add(move || {
            o.lock().push("a");
            Ok(())
        });

        assert!(closer.close().is_ok());
        assert!(closer.close().is_ok());
        assert_eq!(order.lock().len(), 1);
        assert!(closer.is_closed());
    }

    #[test]
    fn add_after_close_runs_immediately() {
        let order = recorder();
        let closer = Closer::new();
        closer.close().unwrap();

        let o = Arc::clone(&order);
        closer.add(move || {
            o.lock().push("late");
            Ok(())
        });
        assert_eq!(*order.lock(), vec!["late"]);
        assert!(closer.is_empty());
    }

    #[test]
    fn drop_closes() {
        let order = recorder();
        {
            let closer = Closer::new();
            let o = Arc::clone(&order);
            closer.add(move || {
                o.lock().push("dropped");
                Ok(())
            });
        }
        assert_eq!(*order.lock(), vec!["dropped"]);
    }
}
