//! Timeout wrapper applied to every call into an external collaborator.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Await `fut` for at most `limit`.
///
/// Both the collaborator's own error and an elapsed deadline come back as a
/// message string; the caller maps it into the stage's error category.
pub(crate) async fn guarded<T, E, F>(limit: Duration, operation: &str, fut: F) -> Result<T, String>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!(
            "{} timed out after {} ms",
            operation,
            limit.as_millis()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_through_success() {
        let result = guarded(Duration::from_secs(1), "op", async { Ok::<_, String>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_passes_through_error() {
        let result: Result<(), String> =
            guarded(Duration::from_secs(1), "op", async { Err("nope") }).await;
        assert_eq!(result, Err("nope".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let result: Result<(), String> = guarded(Duration::from_millis(50), "history load", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, String>(())
        })
        .await;
        assert_eq!(
            result,
            Err("history load timed out after 50 ms".to_string())
        );
    }
}
