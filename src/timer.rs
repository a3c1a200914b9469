// Elapsed-time ticker shown while recording

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

pub struct Timer {
    elapsed: Arc<watch::Sender<u64>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    pub fn new() -> Self {
        let (elapsed, _) = watch::channel(0);
        Self {
            elapsed: Arc::new(elapsed),
            task: Mutex::new(None),
        }
    }

    /// Reset to zero and count whole seconds
    pub fn start(&self) {
        let mut task = self.task.lock();
        if let Some(previous) = task.take() {
            previous.abort();
        }

        self.elapsed.send_replace(0);
        let elapsed = Arc::clone(&self.elapsed);
        *task = Some(tokio::spawn(async move {
            let mut ticker = time::interval(Duration::from_secs(1));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                elapsed.send_modify(|secs| *secs += 1);
            }
        }));
    }

    /// Stop counting; the elapsed value is kept
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    pub fn elapsed_secs(&self) -> u64 {
        *self.elapsed.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.elapsed.subscribe()
    }

    pub fn formatted(&self) -> String {
        format_elapsed(self.elapsed_secs())
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `MM:SS`, or `H:MM:SS` from one hour on
pub fn format_elapsed(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
