//! 跨线程只读监视
//!
//! 引擎在每次 step / reset / inject 之后把计数、停机标志与 tick 数发布到
//! 原子变量中（Release 写、Acquire 读），进度显示等观察者线程据此读取。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::arena::StationId;

#[derive(Debug)]
struct Shared {
    counts: Vec<AtomicU64>,
    halted: AtomicBool,
    ticks: AtomicU64,
}

/// 引擎状态的只读句柄（Send + Sync，可克隆）
#[derive(Debug, Clone)]
pub struct Monitor {
    shared: Arc<Shared>,
}

impl Monitor {
    pub(crate) fn new(stations: usize) -> Self {
        Monitor {
            shared: Arc::new(Shared {
                counts: (0..stations).map(|_| AtomicU64::new(0)).collect(),
                halted: AtomicBool::new(false),
                ticks: AtomicU64::new(0),
            }),
        }
    }

    /// 发布一次快照；tick 数最后写入，读到新 tick 即可看到对应计数
    pub(crate) fn publish(&self, counts: &[u64], halted: bool, ticks: u64) {
        for (slot, &count) in self.shared.counts.iter().zip(counts) {
            slot.store(count, Ordering::Release);
        }
        self.shared.halted.store(halted, Ordering::Release);
        self.shared.ticks.store(ticks, Ordering::Release);
    }

    pub fn count(&self, station: StationId) -> Option<u64> {
        self.shared
            .counts
            .get(station as usize)
            .map(|c| c.load(Ordering::Acquire))
    }

    pub fn counts(&self) -> Vec<u64> {
        self.shared
            .counts
            .iter()
            .map(|c| c.load(Ordering::Acquire))
            .collect()
    }

    pub fn is_halted(&self) -> bool {
        self.shared.halted.load(Ordering::Acquire)
    }

    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.shared.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_visible_from_other_thread() {
        let monitor = Monitor::new(3);
        monitor.publish(&[1, 2, 3], true, 7);

        let observer = monitor.clone();
        let handle = std::thread::spawn(move || {
            (observer.counts(), observer.is_halted(), observer.ticks())
        });
        let (counts, halted, ticks) = handle.join().unwrap();

        assert_eq!(counts, vec![1, 2, 3]);
        assert!(halted);
        assert_eq!(ticks, 7);
        assert_eq!(monitor.count(1), Some(2));
        assert_eq!(monitor.count(3), None);
    }
}
