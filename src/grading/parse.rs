//! 作答文本解析

/// 规范化文本：去掉首尾空白、合并连续空白，大小写不敏感时转小写
pub fn normalize(text: &str, case_sensitive: bool) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if case_sensitive {
        joined
    } else {
        joined.to_lowercase()
    }
}

/// 解析选择题作答
///
/// 支持 `"A, C"`、`"A;C"`、`"A、C"`、`"A C"` 以及连写的 `"AC"`，
/// 返回去重、排序后的大写选项
pub fn parse_choice_answer(answer: &str) -> Vec<String> {
    let separators = [',', '，', ';', '；', '、', '/', '|'];
    let has_separator = answer
        .chars()
        .any(|c| separators.contains(&c) || c.is_whitespace());

    let mut options: Vec<String> = if has_separator {
        answer
            .split(|c: char| separators.contains(&c) || c.is_whitespace())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_uppercase)
            .collect()
    } else {
        answer
            .trim()
            .chars()
            .map(|c| c.to_uppercase().collect::<String>())
            .collect()
    };

    options.sort();
    options.dedup();
    options
}

/// 解析判断题作答，无法识别时返回 `None`
pub fn parse_true_false(answer: &str) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "对" | "正确" | "是" | "√" | "✓" => Some(true),
        "false" | "f" | "no" | "n" | "0" | "错" | "错误" | "否" | "×" | "✗" => Some(false),
        _ => None,
    }
}

/// 拆分多空填空题的作答，各空以 `|` 分隔
pub fn split_blanks(answer: &str) -> Vec<String> {
    answer.split('|').map(|s| s.trim().to_string()).collect()
}
