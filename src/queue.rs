use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

enum Slot<T> {
    Item(T),
    Wake,
}

/// 多生产者、单消费者的 FIFO 任务队列。
///
/// 任何线程都可以 `push`，永远不会阻塞；消费者通过 `pop` 有时限地等待。
/// `wake` 会让正在等待的消费者立即返回 `None`，用于让关闭请求尽快被观察到。
pub struct EventQueue<T> {
    tx: Sender<Slot<T>>,
    rx: Receiver<Slot<T>>,
}

impl<T> EventQueue<T> {
    /// 创建一个空队列。
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// 将一个条目追加到队尾，并唤醒一个等待中的消费者。
    pub fn push(&self, item: T) {
        // 发送端和接收端都由 self 持有，通道不会断开。
        let _ = self.tx.send(Slot::Item(item));
    }

    /// 唤醒一个等待中的消费者，不携带任何条目。
    pub fn wake(&self) {
        let _ = self.tx.send(Slot::Wake);
    }

    /// 等待队首条目，最多等待 `timeout`。
    ///
    /// 超时或被 `wake` 唤醒时返回 `None`。
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(Slot::Item(item)) => Some(item),
            Ok(Slot::Wake) => None,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// 丢弃队列中所有尚未执行的条目，返回丢弃的数量。
    pub fn clear(&self) -> usize {
        self.rx
            .try_iter()
            .filter(|slot| matches!(slot, Slot::Item(_)))
            .count()
    }

    /// 队列中当前的条目数（包括唤醒标记）。
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// 队列是否为空。
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
