use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// 以最多 `max_concurrent` 的并发度执行一组future，结果顺序与输入一致
pub async fn do_parallel_with_limit<F, T>(futures: Vec<F>, max_concurrent: usize) -> Vec<T>
where
    F: Future<Output = T>,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

    let limited = futures.into_iter().map(|fut| {
        let semaphore = semaphore.clone();
        async move {
            // 信号量不会被关闭
            let _permit = semaphore.acquire().await;
            fut.await
        }
    });

    join_all(limited).await
}
