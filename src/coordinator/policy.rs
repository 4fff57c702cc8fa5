//! 协调器配置与退避策略

use std::time::Duration;

use crate::error::ConfigError;

/// 请求协调器配置
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// 同时执行的任务上限
    pub max_concurrent: usize,
    /// 相邻两批派发之间的最小间隔
    pub min_delay: Duration,
    /// 可重试失败后的最大重试次数
    pub max_retries: u32,
    /// 指数退避倍数
    pub backoff_multiplier: f64,
    /// 第一次重试前的等待时间
    pub base_delay: Duration,
    /// 单次退避等待的上限
    pub max_backoff: Duration,
    /// 单次尝试的超时时间，`None` 表示不限制
    pub task_timeout: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            min_delay: Duration::from_millis(1000),
            max_retries: 3,
            backoff_multiplier: 2.0,
            base_delay: Duration::from_millis(1000),
            max_backoff: Duration::from_secs(60),
            task_timeout: None,
        }
    }
}

impl CoordinatorConfig {
    /// 计算第 `retry` 次重试（从 0 开始）前的等待时间
    ///
    /// `base_delay × backoff_multiplier^retry`，不超过 `max_backoff`
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_backoff.as_secs_f64());
        if capped.is_finite() {
            Duration::from_secs_f64(capped)
        } else {
            self.max_backoff
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue {
                name: "max_concurrent".to_string(),
                value: self.max_concurrent.to_string(),
                reason: "至少为 1".to_string(),
            });
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                name: "backoff_multiplier".to_string(),
                value: self.backoff_multiplier.to_string(),
                reason: "必须是不小于 1 的有限数".to_string(),
            });
        }

        if self.task_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidValue {
                name: "task_timeout".to_string(),
                value: "0".to_string(),
                reason: "超时时间必须大于 0".to_string(),
            });
        }

        Ok(())
    }
}
