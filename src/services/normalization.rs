//! 作答归一化与内容哈希
//!
//! 归一化顺序：小写 → 去首尾空白 → 截断到 1000 字符 → 合并空白 → 去结尾标点 → 按题型处理。

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::models::QuestionType;

/// 参与哈希的最大字符数
const MAX_NORMALIZED_CHARS: usize = 1000;

/// 哈希截断后的十六进制长度
const HASH_HEX_LEN: usize = 32;

const TRUE_SYNONYMS: &[&str] = &["true", "yes", "t", "y", "1", "correct", "right"];
const FALSE_SYNONYMS: &[&str] = &["false", "no", "f", "n", "0", "incorrect", "wrong"];

/// 按题型归一化作答文本
pub fn normalize_response(text: &str, question_type: QuestionType) -> Result<String, regex::Error> {
    let lowered = text.to_lowercase();
    let capped: String = lowered.trim().chars().take(MAX_NORMALIZED_CHARS).collect();
    let collapsed = collapse_whitespace(&capped);
    let base = collapsed
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ';' | ',' | ':'))
        .trim_end()
        .to_string();

    match question_type {
        QuestionType::Text => {
            let fillers = Regex::new(
                r"\b(?:um+|uh+|er+|hmm+|like|basically|actually|literally|just|really|very|you know|i mean)\b,?",
            )?;
            Ok(collapse_whitespace(&fillers.replace_all(&base, " ")))
        }
        QuestionType::SingleCorrect => strip_choice_prefix(&base),
        QuestionType::MultipleCorrect => {
            // 多选与顺序无关
            let mut parts = base
                .split(',')
                .map(|part| strip_choice_prefix(part.trim()))
                .collect::<Result<Vec<_>, _>>()?;
            parts.retain(|p| !p.is_empty());
            parts.sort();
            parts.dedup();
            Ok(parts.join(","))
        }
        QuestionType::TrueFalse => {
            if TRUE_SYNONYMS.contains(&base.as_str()) {
                Ok("true".to_string())
            } else if FALSE_SYNONYMS.contains(&base.as_str()) {
                Ok("false".to_string())
            } else {
                Ok(base)
            }
        }
        _ => Ok(base),
    }
}

/// 作答的内容哈希：sha256("<questionId>:<归一化文本>") 截断到 32 位十六进制
///
/// 归一化失败时返回随机摘要，不会与任何已有记录匹配
pub fn response_hash(question_id: i64, text: &str, question_type: QuestionType) -> String {
    match normalize_response(text, question_type) {
        Ok(normalized) => {
            let mut hasher = Sha256::new();
            hasher.update(format!("{}:{}", question_id, normalized).as_bytes());
            let digest = format!("{:x}", hasher.finalize());
            digest[..HASH_HEX_LEN].to_string()
        }
        Err(e) => {
            warn!("⚠️ 题目 {} 作答归一化失败，使用随机摘要: {}", question_id, e);
            format!("{:032x}", rand::random::<u128>())
        }
    }
}

fn strip_choice_prefix(text: &str) -> Result<String, regex::Error> {
    let prefix = Regex::new(r"^(?:option|choice|answer)\b\s*[:\-.)]?\s*")?;
    Ok(prefix.replace(text, "").trim().to_string())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_normalization_drops_fillers_and_punctuation() {
        let normalized =
            normalize_response("  Um, Ownership is   BASICALLY about moves!! ", QuestionType::Text)
                .unwrap();
        assert_eq!(normalized, "ownership is about moves");
    }

    #[test]
    fn test_choice_prefix_and_order() {
        assert_eq!(
            normalize_response("Option A", QuestionType::SingleCorrect).unwrap(),
            "a"
        );
        assert_eq!(
            normalize_response("choice: beta, Alpha", QuestionType::MultipleCorrect).unwrap(),
            normalize_response("alpha, beta", QuestionType::MultipleCorrect).unwrap()
        );
    }

    #[test]
    fn test_true_false_synonyms_collapse() {
        assert_eq!(normalize_response("Yes.", QuestionType::TrueFalse).unwrap(), "true");
        assert_eq!(normalize_response(" 0 ", QuestionType::TrueFalse).unwrap(), "false");
    }

    #[test]
    fn test_hash_is_deterministic_and_sensitive() {
        let a = response_hash(1, "Rust is memory safe.", QuestionType::Text);
        let b = response_hash(1, "  rust is MEMORY safe ", QuestionType::Text);
        let c = response_hash(1, "Rust is fast", QuestionType::Text);
        let d = response_hash(2, "Rust is memory safe.", QuestionType::Text);

        assert_eq!(a.len(), 32);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_normalization_caps_length() {
        let long = "x".repeat(5000);
        let normalized = normalize_response(&long, QuestionType::Url).unwrap();
        assert_eq!(normalized.len(), 1000);
    }
}
