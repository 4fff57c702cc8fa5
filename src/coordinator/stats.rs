//! 协调器统计信息

use serde::Serialize;
use std::fmt;

/// 协调器运行统计快照
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoordinatorStats {
    /// 排队中的任务数
    pub queue_length: usize,
    /// 正在执行的任务数
    pub active_requests: usize,
    /// 累计派发次数（每次尝试计一次）
    pub total_requests: u64,
    /// 调用方上报的累计费用
    pub total_cost: f64,
    /// 平均每次请求费用，没有请求时为 0
    pub average_cost_per_request: f64,
}

impl CoordinatorStats {
    pub fn new(
        queue_length: usize,
        active_requests: usize,
        total_requests: u64,
        total_cost: f64,
    ) -> Self {
        let average_cost_per_request = if total_requests == 0 {
            0.0
        } else {
            total_cost / total_requests as f64
        };

        Self {
            queue_length,
            active_requests,
            total_requests,
            total_cost,
            average_cost_per_request,
        }
    }
}

impl fmt::Display for CoordinatorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "排队 {} | 执行中 {} | 累计请求 {} | 累计费用 ${:.4} | 平均 ${:.4}/次",
            self.queue_length,
            self.active_requests,
            self.total_requests,
            self.total_cost,
            self.average_cost_per_request
        )
    }
}
