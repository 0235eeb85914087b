//! 作答相似度
//!
//! 选择题 / 判断题：归一化后完全相等；
//! 文本：短文本用 Levenshtein 比率，超过长度阈值的长文本用 Jaccard 词集相似度。

use std::collections::HashSet;

use crate::models::QuestionType;
use crate::services::normalization::normalize_response;

/// 两段作答的相似度（0-1）
pub fn response_similarity(
    current: &str,
    previous: &str,
    question_type: QuestionType,
    long_text_threshold: usize,
) -> f64 {
    let (a, b) = match (
        normalize_response(current, question_type),
        normalize_response(previous, question_type),
    ) {
        (Ok(a), Ok(b)) => (a, b),
        _ => return 0.0,
    };

    match question_type {
        QuestionType::SingleCorrect | QuestionType::MultipleCorrect | QuestionType::TrueFalse => {
            if a == b {
                1.0
            } else {
                0.0
            }
        }
        _ => {
            if a == b {
                return 1.0;
            }
            let longest = a.chars().count().max(b.chars().count());
            if longest > long_text_threshold {
                jaccard_similarity(&a, &b)
            } else {
                levenshtein_ratio(&a, &b)
            }
        }
    }
}

/// 达到阈值时返回相似度，否则返回 None
pub fn similar_response_score(
    current: &str,
    previous: &str,
    question_type: QuestionType,
    threshold: f64,
    long_text_threshold: usize,
) -> Option<f64> {
    let similarity = response_similarity(current, previous, question_type, long_text_threshold);
    (similarity >= threshold).then_some(similarity)
}

/// 1 - 编辑距离 / 较长串长度
pub fn levenshtein_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    // 单行滚动数组
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let cost = if ca == cb { 0 } else { 1 };
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }

    1.0 - row[b.len()] as f64 / longest as f64
}

/// 按空白分词后的 Jaccard 相似度
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    fn random_words(words: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..words)
            .map(|_| {
                (&mut rng)
                    .sample_iter(&Alphanumeric)
                    .take(8)
                    .map(char::from)
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_levenshtein_ratio() {
        assert_eq!(levenshtein_ratio("kitten", "kitten"), 1.0);
        assert!((levenshtein_ratio("kitten", "sitting") - (1.0 - 3.0 / 7.0)).abs() < 1e-9);
        assert_eq!(levenshtein_ratio("", ""), 1.0);
    }

    #[test]
    fn test_identical_text_is_similar() {
        let score = similar_response_score(
            "Borrowing lets you reference data.",
            "borrowing lets you reference data",
            QuestionType::Text,
            0.85,
            500,
        );
        assert_eq!(score, Some(1.0));
    }

    #[test]
    fn test_random_long_texts_are_dissimilar() {
        let a = random_words(120);
        let b = random_words(120);
        assert!(a.len() > 500 && b.len() > 500);
        let similarity = response_similarity(&a, &b, QuestionType::Text, 500);
        assert!(similarity < 0.05, "similarity was {}", similarity);
        assert_eq!(similar_response_score(&a, &b, QuestionType::Text, 0.85, 500), None);
    }

    #[test]
    fn test_choice_similarity_is_exact() {
        assert_eq!(
            response_similarity("Option A", "a", QuestionType::SingleCorrect, 500),
            1.0
        );
        assert_eq!(
            response_similarity("Option A", "Option B", QuestionType::SingleCorrect, 500),
            0.0
        );
    }
}
