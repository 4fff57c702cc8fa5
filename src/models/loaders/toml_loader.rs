use crate::error::{AppError, AppResult, FileError};
use crate::models::exam::Exam;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 TOML 文件加载试卷
pub async fn load_exam(toml_file_path: &Path) -> AppResult<Exam> {
    let path_display = toml_file_path.display().to_string();

    let content = fs::read_to_string(toml_file_path)
        .await
        .map_err(|e| AppError::file_read_failed(&path_display, e))?;

    let mut exam = parse_exam(&content, &path_display)?;

    // 设置文件路径
    exam.file_path = Some(toml_file_path.to_string_lossy().to_string());

    Ok(exam)
}

/// 从 TOML 文本解析并校验试卷
pub fn parse_exam(content: &str, path: &str) -> AppResult<Exam> {
    let exam: Exam = toml::from_str(content).map_err(|e| FileError::TomlParseFailed {
        path: path.to_string(),
        source: e,
    })?;

    exam.validate()?;

    Ok(exam)
}

/// 从文件夹中加载所有试卷
///
/// 无法解析或校验失败的文件会被跳过并记录警告，按文件名排序返回
pub async fn load_all_exams(folder_path: &str) -> AppResult<Vec<Exam>> {
    let folder = PathBuf::from(folder_path);

    if !folder.is_dir() {
        return Err(FileError::DirectoryNotFound {
            path: folder_path.to_string(),
        }
        .into());
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .map_err(|e| AppError::file_read_failed(folder_path, e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::file_read_failed(folder_path, e))?
    {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut exams = Vec::new();
    for path in paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_exam(&path).await {
            Ok(exam) => {
                tracing::info!(
                    "成功加载 {} 道题、{} 份答卷",
                    exam.questions.len(),
                    exam.submissions.len()
                );
                exams.push(exam);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(exams)
}
