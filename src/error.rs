use std::sync::LazyLock;

use async_openai::error::OpenAIError;
use regex::Regex;
use thiserror::Error;

use crate::coordinator::{Classify, FailureKind};

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 试卷 / 评分数据错误
    #[error("评分错误: {0}")]
    Grading(#[from] GradingError),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// 请求频率限制
    #[error("LLM请求频率限制 (模型: {model}): {message}")]
    RateLimited { model: String, message: String },
    /// 暂时性故障（超时、连接中断、5xx）
    #[error("LLM服务暂时不可用 (模型: {model}): {message}")]
    Transient { model: String, message: String },
    /// 其他 API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    /// 构建请求失败
    #[error("构建LLM请求失败: {message}")]
    RequestBuildFailed { message: String },
    /// 返回内容为空，`cost` 为本次调用已产生的费用
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String, cost: f64 },
    /// 无法从返回内容中解析分数，`cost` 为本次调用已产生的费用
    #[error("无法解析LLM返回的分数 (响应: {response})")]
    ScoreParseFailed { response: String, cost: f64 },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// JSON 序列化失败
    #[error("JSON序列化失败: {0}")]
    JsonSerializeFailed(#[from] serde_json::Error),
    /// 目录不存在
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置值不合法
    #[error("配置项 {name} 的值 '{value}' 不合法: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

/// 试卷数据错误
#[derive(Debug, Error)]
pub enum GradingError {
    /// 题号重复
    #[error("试卷 {exam} 中题号 {question_id} 重复")]
    DuplicateQuestion { exam: String, question_id: String },
    /// 客观题缺少标准答案
    #[error("试卷 {exam} 中客观题 {question_id} 缺少标准答案")]
    MissingAnswerKey { exam: String, question_id: String },
    /// 判断题标准答案无法识别
    #[error("试卷 {exam} 中判断题 {question_id} 的标准答案 '{answer}' 无法识别")]
    InvalidTrueFalseKey {
        exam: String,
        question_id: String,
        answer: String,
    },
    /// 分值不合法
    #[error("试卷 {exam} 中题目 {question_id} 的分值 {marks} 不合法")]
    InvalidMarks {
        exam: String,
        question_id: String,
        marks: f64,
    },
}

static RATE_LIMIT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:status|http|code)[ :=]*429\b|rate[ _-]?limit|too many requests")
        .expect("rate limit pattern")
});

static TRANSIENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:status|http|code)[ :=]*50[0234]\b|internal server error|bad gateway|service unavailable|gateway time-?out|timed? ?out|connection (reset|refused|closed)|temporarily unavailable|overloaded|error sending request",
    )
    .expect("transient pattern")
});

/// API 错误对象中表示限流的 `type` / `code`
const RATE_LIMIT_KINDS: &[&str] = &["rate_limit_exceeded", "rate_limit_error", "requests", "tokens"];
/// 额度用尽，重试无济于事
const QUOTA_KINDS: &[&str] = &["insufficient_quota"];
/// API 错误对象中表示服务端故障的 `type` / `code`
const SERVER_ERROR_KINDS: &[&str] = &["server_error", "api_error", "overloaded_error", "service_unavailable"];

impl LlmError {
    /// 根据 API 错误信息归类
    ///
    /// 限流与暂时性故障可重试，其余视为请求本身的问题
    pub fn from_api_message(model: impl Into<String>, message: impl Into<String>) -> Self {
        let model = model.into();
        let message = message.into();

        if RATE_LIMIT_PATTERN.is_match(&message) {
            LlmError::RateLimited { model, message }
        } else if TRANSIENT_PATTERN.is_match(&message) {
            LlmError::Transient { model, message }
        } else {
            LlmError::ApiCallFailed { model, message }
        }
    }

    /// 根据 `async-openai` 返回的错误归类
    ///
    /// 优先看结构化字段（错误对象的 `type` / `code`、网络错误种类），
    /// 都没有时才按错误信息匹配
    pub fn from_openai(model: impl Into<String>, error: &OpenAIError) -> Self {
        let model = model.into();
        let message = error.to_string();

        match error {
            OpenAIError::ApiError(api) => {
                let kinds = [api.r#type.as_deref(), api.code.as_deref()];
                let is_kind = |known: &[&str]| kinds.iter().flatten().any(|k| known.contains(k));

                if is_kind(QUOTA_KINDS) {
                    LlmError::ApiCallFailed { model, message }
                } else if is_kind(RATE_LIMIT_KINDS) {
                    LlmError::RateLimited { model, message }
                } else if is_kind(SERVER_ERROR_KINDS) {
                    LlmError::Transient { model, message }
                } else if kinds.iter().all(Option::is_none) {
                    // 5xx 的响应体不是错误对象，只剩原始文本
                    Self::from_api_message(model, message)
                } else {
                    LlmError::ApiCallFailed { model, message }
                }
            }
            OpenAIError::Reqwest(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                LlmError::Transient { model, message }
            }
            OpenAIError::JSONDeserialize(_, content) => Self::from_api_message(model, content.clone()),
            _ => Self::from_api_message(model, message),
        }
    }

    /// 失败前已经产生的费用（美元）
    ///
    /// 只有拿到了模型输出却无法使用时才有费用；限流、网络故障等没有
    pub fn billed_cost(&self) -> f64 {
        match self {
            LlmError::EmptyContent { cost, .. } | LlmError::ScoreParseFailed { cost, .. } => *cost,
            _ => 0.0,
        }
    }
}

impl Classify for LlmError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            LlmError::RateLimited { .. } | LlmError::Transient { .. } => FailureKind::Retryable,
            _ => FailureKind::Terminal,
        }
    }
}

impl AppError {
    /// 失败前已经产生的费用（美元）
    pub fn billed_cost(&self) -> f64 {
        match self {
            AppError::Llm(e) => e.billed_cost(),
            _ => 0.0,
        }
    }
}

impl Classify for AppError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            AppError::Llm(e) => e.failure_kind(),
            _ => FailureKind::Terminal,
        }
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }

    /// 根据 API 错误信息创建 LLM 错误
    pub fn llm_api_failed(model: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Llm(LlmError::from_api_message(model, message))
    }

    /// 根据 `async-openai` 错误创建 LLM 错误
    pub fn llm_openai_failed(model: impl Into<String>, error: &OpenAIError) -> Self {
        AppError::Llm(LlmError::from_openai(model, error))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
