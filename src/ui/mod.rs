//! UI dispatch queue and the widget surface the engine renders into.
//!
//! Widgets live on a single cooperative UI context. Every widget mutation is
//! posted as a [`UiTask`] through a [`UiDispatchQueue`] and executed in FIFO
//! order by the [`UiLoop`].

use crate::binding::WidgetView;
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Unit of work executed on the UI context.
pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

/// Capability to run work on the UI context.
pub trait UiDispatchQueue: Send + Sync {
    /// Run `task` on the UI context at some later point, FIFO relative to
    /// other scheduled tasks.
    fn schedule(&self, task: UiTask);
}

/// Rendering surface for one control.
///
/// Implementations own layout and theming; they only receive fully computed
/// views and the enabled flag.
pub trait Widget: Send {
    fn render(&mut self, view: &WidgetView);
    fn set_enabled(&mut self, enabled: bool);
}

/// Widget reference shared between its owner and the engine.
pub type SharedWidget = Arc<Mutex<dyn Widget>>;

/// Sending side of the UI queue. Cheap to clone.
#[derive(Clone)]
pub struct UiQueue {
    tx: mpsc::UnboundedSender<UiTask>,
}

impl UiDispatchQueue for UiQueue {
    fn schedule(&self, task: UiTask) {
        if self.tx.send(task).is_err() {
            debug!("[UI] Loop is gone, dropping task");
        }
    }
}

/// Receiving side of the UI queue; whoever drives it is the UI context.
pub struct UiLoop {
    rx: mpsc::UnboundedReceiver<UiTask>,
}

impl UiLoop {
    /// Run tasks until every [`UiQueue`] has been dropped.
    pub async fn run(mut self) {
        while let Some(task) = self.rx.recv().await {
            task();
        }
        debug!("[UI] Loop finished");
    }

    /// Run every task queued so far without waiting. Returns the number run.
    pub fn run_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            count += 1;
        }
        count
    }
}

/// Create a connected queue/loop pair.
pub fn channel() -> (UiQueue, UiLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UiQueue { tx }, UiLoop { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_run_in_fifo_order() {
        let (queue, mut ui) = channel();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let seen = seen.clone();
            queue.schedule(Box::new(move || seen.lock().push(i)));
        }
        assert!(seen.lock().is_empty());

        assert_eq!(ui.run_pending(), 5);
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_tasks_scheduled_from_other_threads() {
        let (queue, mut ui) = channel();
        let seen = Arc::new(Mutex::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                let seen = seen.clone();
                std::thread::spawn(move || {
                    queue.schedule(Box::new(move || *seen.lock() += 1));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        ui.run_pending();
        assert_eq!(*seen.lock(), 4);
    }

    #[tokio::test]
    async fn test_run_ends_when_queues_dropped() {
        let (queue, ui) = channel();
        let seen = Arc::new(Mutex::new(false));
        let flag = seen.clone();
        queue.schedule(Box::new(move || *flag.lock() = true));
        drop(queue);

        ui.run().await;
        assert!(*seen.lock());
    }
}
