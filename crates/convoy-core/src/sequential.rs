//! Ordered reduction over asynchronous steps.
//!
//! This is the one primitive used wherever "one thing at a time" must hold:
//! module processing, transformer pipelines, additional-component setup.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;

/// One unary asynchronous step.
pub type Step<'a, T, E> = Box<dyn FnOnce(T) -> BoxFuture<'a, Result<T, E>> + Send + 'a>;

/// Sequential executor.
pub struct Sequential;

impl Sequential {
    /// Box a closure into a [`Step`].
    pub fn step<'a, T, E, F, Fut>(f: F) -> Step<'a, T, E>
    where
        F: FnOnce(T) -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, E>> + Send + 'a,
    {
        Box::new(move |value| f(value).boxed())
    }

    /// Run `steps` strictly in order, threading each result into the next.
    ///
    /// `steps[0]` receives `seed`. Resolves with the last result, or with
    /// `seed` when there are no steps. The first error stops the chain;
    /// later steps are never invoked.
    pub async fn all<'a, T, E>(steps: Vec<Step<'a, T, E>>, seed: T) -> Result<T, E> {
        let mut value = seed;
        for step in steps {
            value = step(value).await?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_empty_resolves_with_seed() {
        let result: Result<i32, String> = Sequential::all(vec![], 7).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_steps_receive_previous_result_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let steps: Vec<Step<'_, i32, String>> = (1..=4)
            .map(|i| {
                let seen = seen.clone();
                Sequential::step(move |prev: i32| async move {
                    seen.lock().unwrap().push((i, prev));
                    Ok(prev * 10 + i)
                })
            })
            .collect();

        let result = Sequential::all(steps, 0).await;
        assert_eq!(result, Ok(1234));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(1, 0), (2, 1), (3, 12), (4, 123)]
        );
    }

    #[tokio::test]
    async fn test_first_failure_short_circuits() {
        let invoked = Arc::new(Mutex::new(Vec::new()));

        let steps: Vec<Step<'_, u32, String>> = (0..5)
            .map(|i| {
                let invoked = invoked.clone();
                Sequential::step(move |prev: u32| async move {
                    invoked.lock().unwrap().push(i);
                    if i == 2 {
                        Err(format!("step {i} failed"))
                    } else {
                        Ok(prev + 1)
                    }
                })
            })
            .collect();

        let result = Sequential::all(steps, 0).await;
        assert_eq!(result, Err("step 2 failed".to_string()));
        assert_eq!(*invoked.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_slow_step_finishes_before_next_starts() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (log.clone(), log.clone());

        let steps: Vec<Step<'_, (), String>> = vec![
            Sequential::step(move |_| async move {
                tokio::time::sleep(std::time::Duration::from_millis(15)).await;
                a.lock().unwrap().push("slow");
                Ok(())
            }),
            Sequential::step(move |_| async move {
                b.lock().unwrap().push("fast");
                Ok(())
            }),
        ];

        Sequential::all(steps, ()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["slow", "fast"]);
    }
}
