//! LLM 服务 - 业务能力层
//!
//! 只负责"AI 评分"和"OCR 识别"能力，不关心并发、重试和流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）
//!
//! 客户端自身不做重试：限流和服务端故障原样返回，
//! 按 [`LlmError::from_openai`] 分类后由协调器决定是否退避重试

use std::sync::LazyLock;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use backoff::ExponentialBackoffBuilder;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, LlmError};
use crate::models::exam::ExamQuestion;

static SCORE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("score pattern"));

/// 一次 LLM 调用的返回
#[derive(Debug, Clone)]
pub struct LlmReply {
    pub content: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// AI 评分结果
#[derive(Debug, Clone)]
pub struct AiGrade {
    pub score: f64,
    pub feedback: Option<String>,
    /// 本次调用的费用（美元），由调用方上报给协调器
    pub cost: f64,
}

/// OCR 识别结果
#[derive(Debug, Clone)]
pub struct OcrText {
    pub text: String,
    pub cost: f64,
}

#[derive(Debug, Deserialize)]
struct GradeJson {
    score: f64,
    #[serde(default)]
    feedback: Option<String>,
}

/// LLM 服务
///
/// 职责：
/// - 调用 LLM API 对单道主观题评分
/// - 调用视觉模型识别手写作答
/// - 根据 token 用量估算费用
/// - 不出现 Vec<Submission>
/// - 不关心并发与重试（由协调器负责）
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    ocr_model_name: String,
    input_price_per_1k: f64,
    output_price_per_1k: f64,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        // 关闭 async-openai 内置的退避重试，第一次失败就把错误交给协调器
        let no_retry = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();
        let client = Client::with_config(openai_config).with_backoff(no_retry);

        Self {
            client,
            model_name: config.llm_model_name.clone(),
            ocr_model_name: config.ocr_model_name.clone(),
            input_price_per_1k: config.input_price_per_1k,
            output_price_per_1k: config.output_price_per_1k,
        }
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `model`: 模型名称
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    /// - `imgs`: 图片 URL 列表（可选），会追加到用户消息中
    ///
    /// # 返回
    /// 返回 LLM 的响应内容与 token 用量
    pub async fn send_to_llm(
        &self,
        model: &str,
        user_message: &str,
        system_message: Option<&str>,
        imgs: Option<&[String]>,
    ) -> AppResult<LlmReply> {
        debug!("调用 LLM API，模型: {}", model);
        debug!("用户消息长度: {} 字符", user_message.len());

        let build_failed = |e: async_openai::error::OpenAIError| {
            AppError::Llm(LlmError::RequestBuildFailed {
                message: e.to_string(),
            })
        };

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(build_failed)?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        // 构建用户消息内容（支持图片）
        let user_msg = match imgs {
            Some(img_urls) if !img_urls.is_empty() => {
                let mut content_parts = vec![ChatCompletionRequestUserMessageContentPart::Text(
                    ChatCompletionRequestMessageContentPartText {
                        text: user_message.to_string(),
                    },
                )];

                for url in img_urls {
                    content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                        ChatCompletionRequestMessageContentPartImage {
                            image_url: ImageUrl {
                                url: url.clone(),
                                detail: Some(ImageDetail::High),
                            },
                        },
                    ));
                }

                debug!("使用 Vision API，包含 {} 张图片", img_urls.len());

                ChatCompletionRequestUserMessageArgs::default()
                    .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                    .build()
                    .map_err(build_failed)?
            }
            _ => ChatCompletionRequestUserMessageArgs::default()
                .content(user_message)
                .build()
                .map_err(build_failed)?,
        };

        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(0.0)
            .max_tokens(1024u32)
            .build()
            .map_err(build_failed)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::llm_openai_failed(model, &e)
        })?;

        debug!("LLM API 调用成功");

        let (prompt_tokens, completion_tokens) = response
            .usage
            .as_ref()
            .map(|usage| (usage.prompt_tokens as u64, usage.completion_tokens as u64))
            .unwrap_or_default();

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| LlmError::EmptyContent {
                model: model.to_string(),
                cost: self.estimate_cost(prompt_tokens, completion_tokens),
            })?;

        Ok(LlmReply {
            content,
            prompt_tokens,
            completion_tokens,
        })
    }

    /// 对一道主观题的作答评分
    ///
    /// # 返回
    /// 返回分数（已限制在 `[0, 满分]`）、评语和本次调用费用
    pub async fn grade_answer(&self, question: &ExamQuestion, answer_text: &str) -> AppResult<AiGrade> {
        let (user_message, system_message) = build_grading_messages(question, answer_text);

        let reply = self
            .send_to_llm(&self.model_name, &user_message, Some(&system_message), None)
            .await?;

        let cost = self.estimate_cost(reply.prompt_tokens, reply.completion_tokens);
        let (score, feedback) = parse_grade_response(&reply.content, question.marks).ok_or_else(|| {
            warn!("无法解析 LLM 评分响应: '{}'", reply.content);
            LlmError::ScoreParseFailed {
                response: reply.content.clone(),
                cost,
            }
        })?;
        debug!(
            "题目 {} AI 评分: {}/{}",
            question.id, score, question.marks
        );

        Ok(AiGrade {
            score,
            feedback,
            cost,
        })
    }

    /// 识别手写作答图片中的文字
    pub async fn extract_text(&self, image_url: &str) -> AppResult<OcrText> {
        let system_message = "你是一个专业的试卷 OCR 助手。请逐字转写图片中学生的手写作答，\
                              保持原有的换行与符号，不要纠正错别字，不要添加任何解释。";
        let images = [image_url.to_string()];

        let reply = self
            .send_to_llm(
                &self.ocr_model_name,
                "请转写这张答题卡图片中的作答内容。",
                Some(system_message),
                Some(&images),
            )
            .await?;

        Ok(OcrText {
            text: reply.content,
            cost: self.estimate_cost(reply.prompt_tokens, reply.completion_tokens),
        })
    }

    /// 按 token 用量估算费用（美元）
    pub fn estimate_cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        prompt_tokens as f64 / 1000.0 * self.input_price_per_1k
            + completion_tokens as f64 / 1000.0 * self.output_price_per_1k
    }
}

/// 构建 AI 评分的消息
///
/// 返回 (user_message, system_message)
fn build_grading_messages(question: &ExamQuestion, answer_text: &str) -> (String, String) {
    let system_message = "你是一位严谨、公正的阅卷老师。请依据题目、参考答案和评分细则给学生作答打分，\
                          只评价作答内容本身，不因书写格式扣分。"
        .to_string();

    let reference = if question.answer.is_empty() {
        "无".to_string()
    } else {
        question.answer.join("\n")
    };
    let rubric = question.rubric.as_deref().unwrap_or("无");

    let user_message = format!(
        r#"请为下面这道题的学生作答评分。

题目：{}
满分：{}
参考答案：{}
评分细则：{}

学生作答：
{}

只返回一个 JSON 对象，不要返回任何其他内容，格式如下：
{{"score": <0 到 {} 之间的分数>, "feedback": "<一句话评语>"}}"#,
        question.prompt, question.marks, reference, rubric, answer_text, question.marks
    );

    (user_message, system_message)
}

/// 解析 AI 评分响应
///
/// 优先按 JSON 解析，失败时取文本中的第一个数字；分数限制在 `[0, max_marks]`
fn parse_grade_response(response: &str, max_marks: f64) -> Option<(f64, Option<String>)> {
    let response = response.trim();

    let json_slice = match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&response[start..=end]),
        _ => None,
    };

    if let Some(parsed) = json_slice.and_then(|s| serde_json::from_str::<GradeJson>(s).ok()) {
        let feedback = parsed.feedback.filter(|f| !f.trim().is_empty());
        return Some((clamp_score(parsed.score, max_marks), feedback));
    }

    if let Some(score) = SCORE_PATTERN
        .find(response)
        .and_then(|m| m.as_str().parse::<f64>().ok())
    {
        debug!("从响应 '{}' 中提取到分数: {}", response, score);
        return Some((clamp_score(score, max_marks), None));
    }

    None
}

fn clamp_score(score: f64, max_marks: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, max_marks)
    }
}
