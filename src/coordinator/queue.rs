//! 优先级任务队列
//!
//! 按 (优先级降序, 入队序号升序) 出队：高优先级先服务，同优先级先进先出。

use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct Entry<T> {
    priority: i32,
    sequence: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap 是大顶堆：序号越小越"大"
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// 待调度任务队列
pub struct TaskQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    next_sequence: u64,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// 入队并分配新的序号
    ///
    /// # 返回
    /// 返回分配给该任务的序号，重试时用它保持原有的排队位置
    pub fn push(&mut self, priority: i32, item: T) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Entry {
            priority,
            sequence,
            item,
        });
        sequence
    }

    /// 以既有序号重新入队（用于重试）
    pub fn push_with_sequence(&mut self, priority: i32, sequence: u64, item: T) {
        self.heap.push(Entry {
            priority,
            sequence,
            item,
        });
    }

    /// 取出优先级最高、同优先级中最早入队的任务
    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|entry| entry.item)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
