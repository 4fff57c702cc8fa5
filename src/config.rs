use std::str::FromStr;
use std::time::Duration;

use crate::coordinator::CoordinatorConfig;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    // --- 请求协调器 ---
    /// 同时在途的 AI / OCR 请求数量
    pub max_concurrent_requests: usize,
    /// 相邻两批请求的最小间隔（毫秒）
    pub min_dispatch_delay_ms: u64,
    /// 限流等可重试失败的最大重试次数
    pub max_retries: u32,
    /// 指数退避倍数
    pub backoff_multiplier: f64,
    /// 第一次重试前的等待时间（毫秒）
    pub base_retry_delay_ms: u64,
    /// 单次退避等待上限（毫秒）
    pub max_backoff_ms: u64,
    /// 单次请求超时（秒），0 表示不限制
    pub request_timeout_secs: u64,
    // --- 文件 ---
    /// 试卷 TOML 文件存放目录
    pub exam_folder: String,
    /// 评分结果输出目录
    pub output_folder: String,
    /// 需人工复核的题目列表
    pub review_file: String,
    /// 运行日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub ocr_model_name: String,
    /// 每千个输入 token 的价格（美元）
    pub input_price_per_1k: f64,
    /// 每千个输出 token 的价格（美元）
    pub output_price_per_1k: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 5,
            min_dispatch_delay_ms: 1000,
            max_retries: 3,
            backoff_multiplier: 2.0,
            base_retry_delay_ms: 1000,
            max_backoff_ms: 60_000,
            request_timeout_secs: 0,
            exam_folder: "exams".to_string(),
            output_folder: "results".to_string(),
            review_file: "review.txt".to_string(),
            output_log_file: "marking_log.txt".to_string(),
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            ocr_model_name: "gpt-4o".to_string(),
            input_price_per_1k: 0.00015,
            output_price_per_1k: 0.0006,
        }
    }
}

/// 无法解析、已被默认值替代的环境变量
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedEnv {
    pub name: String,
    pub value: String,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 无法解析的值使用默认值，并在第二个返回值中列出，
    /// 由调用方在日志初始化之后输出警告
    pub fn from_env() -> (Self, Vec<RejectedEnv>) {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 从任意键值来源加载配置
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> (Self, Vec<RejectedEnv>) {
        let default = Self::default();
        let mut env = EnvReader {
            lookup,
            rejected: Vec::new(),
        };

        let config = Self {
            max_concurrent_requests: env.parse("MAX_CONCURRENT_REQUESTS", default.max_concurrent_requests),
            min_dispatch_delay_ms: env.parse("MIN_DISPATCH_DELAY_MS", default.min_dispatch_delay_ms),
            max_retries: env.parse("MAX_RETRIES", default.max_retries),
            backoff_multiplier: env.parse("BACKOFF_MULTIPLIER", default.backoff_multiplier),
            base_retry_delay_ms: env.parse("BASE_RETRY_DELAY_MS", default.base_retry_delay_ms),
            max_backoff_ms: env.parse("MAX_BACKOFF_MS", default.max_backoff_ms),
            request_timeout_secs: env.parse("REQUEST_TIMEOUT_SECS", default.request_timeout_secs),
            exam_folder: env.string("EXAM_FOLDER", default.exam_folder),
            output_folder: env.string("OUTPUT_FOLDER", default.output_folder),
            review_file: env.string("REVIEW_FILE", default.review_file),
            output_log_file: env.string("OUTPUT_LOG_FILE", default.output_log_file),
            verbose_logging: env.parse("VERBOSE_LOGGING", default.verbose_logging),
            llm_api_key: env.string("LLM_API_KEY", default.llm_api_key),
            llm_api_base_url: env.string("LLM_API_BASE_URL", default.llm_api_base_url),
            llm_model_name: env.string("LLM_MODEL_NAME", default.llm_model_name),
            ocr_model_name: env.string("OCR_MODEL_NAME", default.ocr_model_name),
            input_price_per_1k: env.parse("INPUT_PRICE_PER_1K", default.input_price_per_1k),
            output_price_per_1k: env.parse("OUTPUT_PRICE_PER_1K", default.output_price_per_1k),
        };

        (config, env.rejected)
    }

    /// 转换为请求协调器配置
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_concurrent: self.max_concurrent_requests,
            min_delay: Duration::from_millis(self.min_dispatch_delay_ms),
            max_retries: self.max_retries,
            backoff_multiplier: self.backoff_multiplier,
            base_delay: Duration::from_millis(self.base_retry_delay_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            task_timeout: (self.request_timeout_secs > 0)
                .then(|| Duration::from_secs(self.request_timeout_secs)),
        }
    }
}

struct EnvReader<F> {
    lookup: F,
    rejected: Vec<RejectedEnv>,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str, default: String) -> String {
        (self.lookup)(name).unwrap_or(default)
    }

    /// 缺失时使用默认值；无法解析时使用默认值并记录
    fn parse<T: FromStr>(&mut self, name: &str, default: T) -> T {
        let Some(value) = (self.lookup)(name) else {
            return default;
        };

        match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                self.rejected.push(RejectedEnv {
                    name: name.to_string(),
                    value,
                });
                default
            }
        }
    }
}
