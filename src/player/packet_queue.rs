use crate::core::Packet;
use log::debug;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// 包队列 - 阶段独占的线程安全阻塞队列
///
/// - 阻塞模式：队列为空时 take() 等待；达到容量时 put() 等待（背压）
/// - 非阻塞模式：take() 立即返回，put() 不再等待，用于停止 / 销毁
///
/// 队列有自己的锁，与阶段的暂停锁相互独立。
pub struct PacketQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
}

struct QueueState {
    packets: VecDeque<Packet>,
    blocking: bool,
    capacity: usize,   // 0 = 不限
    threshold: usize,
    // clear() 每次加一，唤醒在 put() 中等待的生产者
    generation: u64,
}

impl QueueState {
    fn is_full(&self) -> bool {
        self.capacity > 0 && self.packets.len() >= self.capacity
    }
}

impl PacketQueue {
    pub fn new(capacity: usize, threshold: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                packets: VecDeque::new(),
                blocking: true,
                capacity,
                threshold,
                generation: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// 切换阻塞模式；关闭时释放所有在 take()/put() 中等待的线程
    pub fn set_blocking(&self, blocking: bool) {
        let mut state = self.state.lock();
        if state.blocking == blocking {
            return;
        }
        state.blocking = blocking;
        if !blocking {
            debug!("包队列切换为非阻塞模式，唤醒所有等待线程");
            self.not_empty.notify_all();
            self.not_full.notify_all();
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.state.lock().blocking
    }

    /// 丢弃所有包
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.packets.clear();
        state.generation = state.generation.wrapping_add(1);
        self.not_full.notify_all();
    }

    /// 入队。阻塞模式下队列满时等待，直到有空位、被清空或关闭阻塞
    pub fn put(&self, packet: Packet) {
        let mut state = self.state.lock();
        let generation = state.generation;
        while state.blocking && state.is_full() && state.generation == generation {
            self.not_full.wait(&mut state);
        }
        state.packets.push_back(packet);
        self.not_empty.notify_one();
    }

    /// 出队。阻塞模式下队列为空时一直等待；非阻塞模式下为空返回 None
    pub fn take(&self) -> Option<Packet> {
        let mut state = self.state.lock();
        loop {
            if let Some(packet) = state.packets.pop_front() {
                self.not_full.notify_one();
                return Some(packet);
            }
            if !state.blocking {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// 带超时的 take()，超时返回 None
    pub fn take_timeout(&self, timeout: Duration) -> Option<Packet> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(packet) = state.packets.pop_front() {
                self.not_full.notify_one();
                return Some(packet);
            }
            if !state.blocking {
                return None;
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                return state.packets.pop_front().inspect(|_| {
                    self.not_full.notify_one();
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().packets.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.state.lock().is_full()
    }

    /// 缓冲是否足够（达到阈值）
    pub fn is_enough(&self) -> bool {
        let state = self.state.lock();
        state.packets.len() >= state.threshold
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    pub fn set_capacity(&self, capacity: usize) {
        let mut state = self.state.lock();
        state.capacity = capacity;
        self.not_full.notify_all();
    }

    pub fn threshold(&self) -> usize {
        self.state.lock().threshold
    }

    pub fn set_threshold(&self, threshold: usize) {
        self.state.lock().threshold = threshold;
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    fn packet(pts: i64) -> Packet {
        Packet::new(pts, vec![0u8; 4])
    }

    #[test]
    fn test_fifo_order_and_counts() {
        let queue = PacketQueue::new(0, 2);
        queue.put(packet(1));
        assert!(!queue.is_enough());
        queue.put(packet(2));
        assert!(queue.is_enough());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.take().map(|p| p.pts), Some(1));
        assert_eq!(queue.take().map(|p| p.pts), Some(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_non_blocking_take_on_empty_returns_none() {
        let queue = PacketQueue::default();
        queue.set_blocking(false);
        assert!(queue.take().is_none());
    }

    #[test]
    fn test_disabling_blocking_releases_waiting_consumer() {
        let queue = Arc::new(PacketQueue::default());
        let (tx, rx) = mpsc::channel();
        let q = queue.clone();
        let consumer = thread::spawn(move || {
            tx.send(q.take()).unwrap();
        });

        thread::sleep(Duration::from_millis(30));
        assert!(rx.try_recv().is_err(), "take() 应在空队列上阻塞");

        queue.set_blocking(false);
        let result = rx.recv_timeout(Duration::from_secs(2)).expect("take() 未被释放");
        assert!(result.is_none());
        consumer.join().unwrap();
    }

    #[test]
    fn test_blocked_take_receives_pushed_packet() {
        let queue = Arc::new(PacketQueue::default());
        let q = queue.clone();
        let consumer = thread::spawn(move || q.take());
        thread::sleep(Duration::from_millis(20));
        queue.put(packet(42));
        assert_eq!(consumer.join().unwrap().map(|p| p.pts), Some(42));
    }

    #[test]
    fn test_full_queue_blocks_producer_until_take() {
        let queue = Arc::new(PacketQueue::new(1, 1));
        queue.put(packet(1));
        assert!(queue.is_full());

        let (tx, rx) = mpsc::channel();
        let q = queue.clone();
        let producer = thread::spawn(move || {
            q.put(packet(2));
            tx.send(()).unwrap();
        });

        thread::sleep(Duration::from_millis(30));
        assert!(rx.try_recv().is_err(), "队列满时 put() 应阻塞");
        assert_eq!(queue.take().map(|p| p.pts), Some(1));
        rx.recv_timeout(Duration::from_secs(2)).expect("put() 未被释放");
        producer.join().unwrap();
        assert_eq!(queue.take().map(|p| p.pts), Some(2));
    }

    #[test]
    fn test_clear_releases_blocked_producer() {
        let queue = Arc::new(PacketQueue::new(1, 1));
        queue.put(packet(1));
        let q = queue.clone();
        let producer = thread::spawn(move || q.put(packet(2)));
        thread::sleep(Duration::from_millis(20));
        queue.clear();
        producer.join().unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_raising_capacity_releases_blocked_producer() {
        let queue = Arc::new(PacketQueue::new(1, 1));
        queue.put(packet(1));
        let (tx, rx) = mpsc::channel();
        let q = queue.clone();
        let producer = thread::spawn(move || {
            q.put(packet(2));
            tx.send(()).unwrap();
        });

        thread::sleep(Duration::from_millis(30));
        assert!(rx.try_recv().is_err());
        queue.set_capacity(2);
        rx.recv_timeout(Duration::from_secs(2)).expect("扩容后 put() 未被释放");
        producer.join().unwrap();
        assert_eq!(queue.len(), 2);
        assert!(queue.is_full());
    }

    #[test]
    fn test_take_timeout_expires_on_empty_queue() {
        let queue = PacketQueue::default();
        let started = Instant::now();
        assert!(queue.take_timeout(Duration::from_millis(20)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
