/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Single-slot serial executor (spec.md §4.7, §5). Re-architected per the
//! Design Notes §9 guidance as a dedicated worker owning a bounded FIFO,
//! rather than transliterating the teacher's synchronous chained-future
//! sync loop — grounded instead on the `tokio` + `async-trait` shape the
//! teacher's own `fairy-bridge`/`viaduct` HTTP backends use for suspension
//! points.

use std::pin::Pin;
use std::future::Future;

use tokio::sync::{mpsc, oneshot};

type BoxedTask = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

enum Item {
    Task(BoxedTask),
    Flush(oneshot::Sender<()>),
}

/// Tasks execute strictly in submission order; a failing task is logged and
/// does not break the chain. No two tasks ever run concurrently.
pub struct TaskQueue {
    sender: mpsc::Sender<Item>,
    worker: Option<tokio::task::JoinHandle<()>>,
}

impl TaskQueue {
    pub fn start(capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Item>(capacity);
        let worker = tokio::spawn(async move {
            while let Some(item) = receiver.recv().await {
                match item {
                    Item::Task(task) => {
                        if let Err(err) = task.await {
                            log::warn!("scheduled task failed: {:#}", err);
                        }
                    }
                    Item::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });
        Self { sender, worker: Some(worker) }
    }

    /// Enqueues a task. May be called concurrently from any number of
    /// producers; `mpsc::Sender` serializes delivery on its own.
    pub async fn submit<F>(&self, fut: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.sender.send(Item::Task(Box::pin(fut))).await.is_err() {
            log::warn!("task queue is shut down, dropping scheduled task");
        }
    }

    /// Resolves once every task submitted before this call has finished.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.sender.send(Item::Flush(ack_tx)).await.is_err() {
            return;
        }
        let _ = ack_rx.await;
    }

    /// Stops accepting new tasks and waits for the worker to drain and exit.
    pub async fn shutdown(mut self) {
        drop(self.sender);
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }
}
