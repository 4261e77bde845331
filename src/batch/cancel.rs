//! Cancellation of in-flight sub-requests.
//!
//! A [`Cancellation`] is owned by the inbound request handler. Cancelling it,
//! or dropping it because the client went away, wakes every [`CancelToken`]
//! handed to the dispatcher.

use tokio::sync::watch;

/// Owning side of a cancellation signal. Cancels on drop.
#[derive(Debug)]
pub struct Cancellation {
    tx: watch::Sender<bool>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// A token observing this cancellation.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Cancellation {
    fn drop(&mut self) {
        self.tx.send_replace(true);
    }
}

/// Observing side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Sender gone without cancelling: this token can no longer fire.
                if *self.rx.borrow() {
                    return;
                }
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_tokens() {
        let cancellation = Cancellation::new();
        let mut token = cancellation.token();
        assert!(!token.is_cancelled());

        let waiter = tokio::spawn(async move { token.cancelled().await });
        cancellation.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("token should fire")
            .unwrap();
    }

    #[tokio::test]
    async fn drop_cancels() {
        let cancellation = Cancellation::new();
        let mut token = cancellation.token();
        drop(cancellation);
        assert!(token.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("dropped cancellation should fire");
    }

    #[tokio::test]
    async fn never_token_stays_pending() {
        let mut token = CancelToken::never();
        let res = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
        assert!(res.is_err());
    }
}
