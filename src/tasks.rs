use log::debug;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Handle to a background loop: a stop signal plus the task itself.
#[derive(Debug)]
pub struct TaskControl {
    name: &'static str,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TaskControl {
    pub fn new(name: &'static str, stop: oneshot::Sender<()>, handle: JoinHandle<()>) -> TaskControl {
        TaskControl { name, stop, handle }
    }

    /// Spawns `body` with a fresh stop receiver and returns its control handle.
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> TaskControl
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (stop, stopped) = oneshot::channel();
        let handle = tokio::spawn(body(stopped));
        TaskControl::new(name, stop, handle)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn stop(self) {
        debug!("stopping {}", self.name);
        if !self.handle.is_finished() && self.stop.send(()).is_ok() {
            let _ = self.handle.await;
        }
    }

    pub async fn wait(self) {
        let _ = self.handle.await;
    }
}
