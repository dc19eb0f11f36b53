//! Single-flight coordination for cache fills.
//!
//! The first caller for a key becomes the leader and runs the work; callers
//! arriving while it runs register as waiters and receive a copy of the
//! leader's outcome. If the leader is dropped before finishing, its entry is
//! removed, waiters observe a closed channel and retry, one of them becoming
//! the new leader.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::error::Result;

type Waiters<T> = Vec<oneshot::Sender<Result<T>>>;

pub struct SingleFlight<T> {
    calls: Mutex<HashMap<String, Waiters<T>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` unless a call for `key` is already in flight, in which
    /// case waits for that call's result.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        loop {
            let waiter = {
                let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
                match calls.get_mut(key) {
                    Some(waiters) => {
                        let (tx, rx) = oneshot::channel();
                        waiters.push(tx);
                        Some(rx)
                    }
                    None => {
                        calls.insert(key.to_string(), Vec::new());
                        None
                    }
                }
            };

            match waiter {
                Some(rx) => match rx.await {
                    Ok(result) => return result,
                    Err(_) => {
                        tracing::debug!(key, "in-flight call abandoned, retrying");
                        continue;
                    }
                },
                None => break,
            }
        }

        let mut leader = Leader {
            flight: self,
            key,
            done: false,
        };

        let result = work().await;
        leader.publish(&result);
        result
    }

    /// Number of keys currently in flight.
    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

struct Leader<'a, T> {
    flight: &'a SingleFlight<T>,
    key: &'a str,
    done: bool,
}

impl<T: Clone> Leader<'_, T> {
    fn publish(&mut self, result: &Result<T>) {
        let waiters = self
            .flight
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.key)
            .unwrap_or_default();
        self.done = true;

        for tx in waiters {
            let copy = match result {
                Ok(value) => Ok(value.clone()),
                Err(e) => Err(e.replicate()),
            };
            let _ = tx.send(copy);
        }
    }
}

impl<T> Drop for Leader<'_, T> {
    fn drop(&mut self) {
        if !self.done {
            // Dropping the senders wakes waiters so one of them takes over.
            self.flight
                .calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_calls_share_one_execution() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = flight.clone();
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run("key", || async {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn waiters_receive_the_leader_error() {
        let flight = Arc::new(SingleFlight::<u32>::new());

        let leader = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run("key", || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err(AppError::NotFound("nothing".into()))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let waiter = flight.run("key", || async { Ok(1) }).await;

        assert!(matches!(waiter, Err(AppError::NotFound(_))));
        assert!(matches!(leader.await.unwrap(), Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn abandoned_leader_hands_over() {
        let flight = Arc::new(SingleFlight::<u32>::new());

        let leader = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run("key", || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(1)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let waiter = {
            let flight = flight.clone();
            tokio::spawn(async move { flight.run("key", || async { Ok(2) }).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        leader.abort();

        assert_eq!(waiter.await.unwrap().unwrap(), 2);
        assert_eq!(flight.in_flight(), 0);
    }
}
