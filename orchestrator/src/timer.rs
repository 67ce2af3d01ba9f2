//! Timer
use endorser::TchanS;
use log::debug;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use std::time::Duration;

/// Cancellable timer. Each fired timer sends its tag to `notifier`.
pub(crate) struct DefaultTimer<T> {
    stop_ch: tokio::sync::broadcast::Sender<()>,
    notifier: TchanS<T>,
    cnt: Arc<AtomicU32>,
}

impl<T: Send + 'static> DefaultTimer<T> {
    pub(crate) fn new(notifier: TchanS<T>) -> Self {
        let (stop_ch, _) = tokio::sync::broadcast::channel(1);

        Self {
            stop_ch,
            notifier,
            cnt: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Start new timer.
    pub(crate) fn start(&self, tag: T, dur: Duration) {
        let mut end_ch = self.stop_ch.subscribe();
        let s = self.notifier.clone();
        let cnt = self.cnt.clone();
        cnt.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(dur) => {
                    if s.send(tag).await.is_err() {
                        debug!("timer fired after its receiver closed");
                    }
                },
                _ = end_ch.recv() => {},
            };
            cnt.fetch_sub(1, Ordering::SeqCst);
        });
    }

    pub(crate) fn stop_all_timer(&self) {
        // No receiver means no running timer.
        if self.stop_ch.send(()).is_err() {
            debug!("no timer to stop");
        }
    }

    #[cfg(test)]
    pub(crate) fn num_running_timer(&self) -> u32 {
        self.cnt.load(Ordering::SeqCst)
    }
}

impl<T> Drop for DefaultTimer<T> {
    fn drop(&mut self) {
        let _ = self.stop_ch.send(());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn paused_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_close_all_timer() {
        let (notifier, mut recvr) = tokio::sync::mpsc::channel(2);
        let t = DefaultTimer::new(notifier);

        let num = paused_runtime().block_on(async move {
            t.start(0u32, Duration::from_secs(30));
            t.start(1u32, Duration::from_secs(30));

            tokio::time::sleep(Duration::from_secs(2)).await;
            assert_eq!(t.num_running_timer(), 2);
            t.stop_all_timer();
            tokio::time::sleep(Duration::from_secs(60)).await;
            assert!(recvr.try_recv().is_err());
            t.num_running_timer()
        });

        assert_eq!(num, 0);
    }

    #[test]
    fn test_timer_fires_once() {
        let (notifier, mut recvr) = tokio::sync::mpsc::channel(1);
        let t = DefaultTimer::new(notifier);

        paused_runtime().block_on(async move {
            let start = tokio::time::Instant::now();
            t.start("deadline", Duration::from_secs(5));

            assert_eq!(recvr.recv().await, Some("deadline"));
            assert!(start.elapsed() >= Duration::from_secs(5));
            tokio::task::yield_now().await;
            assert_eq!(t.num_running_timer(), 0);
        });
    }
}
