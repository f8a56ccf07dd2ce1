use std::{future::Future, time::Duration};

#[cfg(feature = "redis-tokio")]
pub(crate) async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[cfg(all(feature = "redis-smol", not(feature = "redis-tokio")))]
pub(crate) async fn sleep(duration: Duration) {
    smol::Timer::after(duration).await;
}

// No timer without a runtime; retries run back to back.
#[cfg(not(any(feature = "redis-tokio", feature = "redis-smol")))]
pub(crate) async fn sleep(_duration: Duration) {}

/// Run `fut` to completion, or return `None` once `duration` elapses.
#[cfg(feature = "redis-tokio")]
pub(crate) async fn timeout<F, T>(duration: Duration, fut: F) -> Option<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut).await.ok()
}

#[cfg(all(feature = "redis-smol", not(feature = "redis-tokio")))]
pub(crate) async fn timeout<F, T>(duration: Duration, fut: F) -> Option<T>
where
    F: Future<Output = T>,
{
    smol::future::or(async { Some(fut.await) }, async {
        smol::Timer::after(duration).await;
        None
    })
    .await
}

#[cfg(not(any(feature = "redis-tokio", feature = "redis-smol")))]
pub(crate) async fn timeout<F, T>(_duration: Duration, fut: F) -> Option<T>
where
    F: Future<Output = T>,
{
    Some(fut.await)
}
