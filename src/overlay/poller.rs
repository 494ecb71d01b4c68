//! 起動直後の定期再スキャン
//!
//! 挿入通知を出さずに内容を差し替えるホストへの保険。決まった回数だけ
//! 実行して自動的に停止する。

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{
    Instant,
    MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

/// 回数制限付きのポーリングタスク
pub struct BoundedPoller {
    /// 停止要求
    cancel: CancellationToken,
    /// 実行した回数を返すタスク
    handle: JoinHandle<u32>,
}

impl BoundedPoller {
    /// `interval` ごとに `tick` を最大 `iterations` 回呼び出すタスクを起動する
    ///
    /// 最初の呼び出しは `interval` 経過後。`iterations` が 0 の場合は何もせずに終了する。
    #[must_use]
    pub fn spawn<F>(interval: Duration, iterations: u32, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            if iterations == 0 || interval.is_zero() {
                return 0;
            }

            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut completed = 0;
            while completed < iterations {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        tracing::debug!(completed, "Poller cancelled");
                        return completed;
                    }
                    _ = ticker.tick() => {
                        tick();
                        completed += 1;
                    }
                }
            }
            tracing::debug!(completed, "Poller finished");
            completed
        });

        Self { cancel, handle }
    }

    /// 残りの実行を取り消す
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 終了を待ち、実行済みの回数を返す
    pub async fn join(self) -> u32 {
        match self.handle.await {
            Ok(completed) => completed,
            Err(e) => {
                tracing::warn!("Poller task failed: {e}");
                0
            }
        }
    }
}

impl std::fmt::Debug for BoundedPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedPoller")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}
