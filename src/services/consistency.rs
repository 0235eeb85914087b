//! 一致性检查服务 - 业务能力层
//!
//! 维护每道题最近评分的进程内缓存，把新作答与缓存 / 近 7 天审计记录比对，
//! 发现相似作答得分偏差过大时给出修正建议。本服务的所有失败都由调用方吞掉，
//! 不会影响评分主流程。
//!
//! 缓存键为 `q_<questionId>`；每个键最多保留 100 条记录，超过 24 小时的记录在清理时移除；
//! 键总数超过上限时按键名字典序淘汰（不是按最近使用）。

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clients::DataStore;
use crate::config::ConsistencyConfig;
use crate::error::StoreResult;
use crate::infrastructure::KeyedMutex;
use crate::models::{QuestionType, Rubric, RubricScore};
use crate::services::normalization::response_hash;
use crate::services::similarity::similar_response_score;

/// 缓存中的一条评分记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRecord {
    pub question_id: i64,
    pub response_hash: String,
    pub points: f64,
    pub max_points: f64,
    pub feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric_scores: Option<Vec<RubricScore>>,
    pub timestamp: DateTime<Utc>,
}

/// 命中来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsistencySource {
    Cache,
    Audit,
}

/// 一致性检查结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyCheck {
    pub similar: bool,
    pub similarity: f64,
    pub previous_points: f64,
    pub previous_max_points: f64,
    pub previous_feedback: String,
    /// 作答之间的差异百分比，缓存精确命中时为 0
    pub deviation_percentage: f64,
    pub source: ConsistencySource,
}

/// 修正建议（是否采用由调用方决定）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionSuggestion {
    pub current_points: f64,
    pub suggested_points: f64,
    pub suggested_feedback: String,
    /// 分差占满分的百分比
    pub score_deviation_percentage: f64,
    pub source: ConsistencySource,
}

/// 细则得分校验结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricValidation {
    pub valid: bool,
    /// 数量是否与细则一致
    pub count_matches: bool,
    pub corrected: Vec<RubricScore>,
    pub issues: Vec<String>,
}

impl RubricValidation {
    pub fn corrected_total(&self) -> f64 {
        self.corrected.iter().map(|s| s.points).sum()
    }
}

/// 一次清理的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_records: usize,
    pub evicted_keys: usize,
}

/// 缓存规模
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub question_keys: usize,
    pub total_records: usize,
}

/// 一致性检查服务
///
/// 职责：
/// - 计算作答哈希
/// - 维护有界评分缓存（按键串行写入）
/// - 缓存 / 审计记录两级比对
/// - 校验细则得分
pub struct ConsistencyService {
    config: ConsistencyConfig,
    store: Arc<dyn DataStore>,
    cache: RwLock<HashMap<String, Vec<GradingRecord>>>,
    write_locks: KeyedMutex,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

fn cache_key(question_id: i64) -> String {
    format!("q_{}", question_id)
}

impl ConsistencyService {
    pub fn new(config: ConsistencyConfig, store: Arc<dyn DataStore>) -> Self {
        Self {
            config,
            store,
            cache: RwLock::new(HashMap::new()),
            write_locks: KeyedMutex::new(),
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ConsistencyConfig {
        &self.config
    }

    pub fn hash(&self, question_id: i64, response: &str, question_type: QuestionType) -> String {
        response_hash(question_id, response, question_type)
    }

    /// 比对新作答
    ///
    /// 先查缓存中的精确哈希命中（相似度 1，偏差 0，不读存储），
    /// 再查近 `lookback_days` 天的审计记录，取相似度最高且达到阈值的一条
    pub async fn check_consistency(
        &self,
        question_id: i64,
        hash: &str,
        raw_response: &str,
        question_type: QuestionType,
    ) -> StoreResult<Option<ConsistencyCheck>> {
        if let Some(record) = self.find_cached(question_id, hash).await {
            debug!("题目 {} 一致性检查命中缓存", question_id);
            return Ok(Some(ConsistencyCheck {
                similar: true,
                similarity: 1.0,
                previous_points: record.points,
                previous_max_points: record.max_points,
                previous_feedback: record.feedback,
                deviation_percentage: 0.0,
                source: ConsistencySource::Cache,
            }));
        }

        let since = Utc::now() - ChronoDuration::days(self.config.lookback_days);
        let rows = self
            .store
            .find_recent_audit_records(question_id, since, self.config.audit_sample_size)
            .await?;

        let mut best: Option<ConsistencyCheck> = None;
        for row in &rows {
            let (Some(previous), Some(points)) = (row.learner_response(), row.total_points()) else {
                continue;
            };
            let Some(similarity) = similar_response_score(
                raw_response,
                previous,
                question_type,
                self.config.similarity_threshold,
                self.config.long_text_threshold,
            ) else {
                continue;
            };
            if best.as_ref().map_or(true, |b| similarity > b.similarity) {
                best = Some(ConsistencyCheck {
                    similar: true,
                    similarity,
                    previous_points: points,
                    previous_max_points: row.max_points().unwrap_or(0.0),
                    previous_feedback: row.feedback_text(),
                    deviation_percentage: (1.0 - similarity) * 100.0,
                    source: ConsistencySource::Audit,
                });
            }
        }

        if best.is_some() {
            debug!("题目 {} 一致性检查命中审计记录 ({} 条样本)", question_id, rows.len());
        }
        Ok(best)
    }

    /// 根据检查结果和当前得分判断是否需要修正
    ///
    /// 分差超过满分的 `deviation_threshold_percent` 时给出建议；
    /// 既往满分不同的按比例换算
    pub fn evaluate(
        &self,
        check: &ConsistencyCheck,
        current_points: f64,
        max_points: f64,
    ) -> Option<CorrectionSuggestion> {
        if !check.similar || max_points <= 0.0 {
            return None;
        }

        let previous = if check.previous_max_points > 0.0
            && (check.previous_max_points - max_points).abs() > f64::EPSILON
        {
            check.previous_points / check.previous_max_points * max_points
        } else {
            check.previous_points
        };

        let deviation = (current_points - previous).abs() / max_points * 100.0;
        if deviation <= self.config.deviation_threshold_percent {
            return None;
        }

        Some(CorrectionSuggestion {
            current_points,
            suggested_points: previous.max(0.0).min(max_points),
            suggested_feedback: check.previous_feedback.clone(),
            score_deviation_percentage: deviation,
            source: check.source,
        })
    }

    /// 写入一条评分记录；同一道题的写入串行执行
    pub async fn record_grading(&self, record: GradingRecord) {
        let key = cache_key(record.question_id);
        let over_capacity = {
            let _guard = self.write_locks.lock(&key).await;
            let mut cache = self.cache.write().await;
            let records = cache.entry(key).or_default();
            records.push(record);
            if records.len() > self.config.max_records_per_question {
                let overflow = records.len() - self.config.max_records_per_question;
                records.drain(..overflow);
            }
            cache.len() > self.config.max_cached_questions
        };

        if over_capacity {
            self.sweep(Utc::now()).await;
        }
    }

    /// 清理过期记录，键数超过上限时按键名字典序淘汰
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let ttl = ChronoDuration::seconds(self.config.record_ttl_secs as i64);
        let mut report = SweepReport::default();
        let mut cache = self.cache.write().await;

        for records in cache.values_mut() {
            let before = records.len();
            records.retain(|r| now - r.timestamp < ttl);
            report.expired_records += before - records.len();
        }
        cache.retain(|_, records| !records.is_empty());

        if cache.len() > self.config.max_cached_questions {
            let mut keys: Vec<String> = cache.keys().cloned().collect();
            keys.sort();
            let excess = cache.len() - self.config.max_cached_questions;
            for key in keys.into_iter().take(excess) {
                cache.remove(&key);
                report.evicted_keys += 1;
            }
        }

        if report.expired_records > 0 || report.evicted_keys > 0 {
            info!(
                "🧹 一致性缓存清理: 过期 {} 条, 淘汰 {} 个题目",
                report.expired_records, report.evicted_keys
            );
        }
        report
    }

    /// 启动定期清理任务（重复调用会替换旧任务）
    pub fn start_sweeper(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = self.config.sweep_interval();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // 第一次 tick 立即返回
            interval.tick().await;
            loop {
                interval.tick().await;
                match weak.upgrade() {
                    Some(service) => {
                        service.sweep(Utc::now()).await;
                    }
                    None => break,
                }
            }
        });

        let mut sweeper = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = sweeper.replace(handle) {
            previous.abort();
        }
    }

    /// 停止定期清理并清空缓存
    pub async fn shutdown(&self) {
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.cache.write().await.clear();
        debug!("一致性服务已关闭");
    }

    pub async fn cache_stats(&self) -> CacheStats {
        let cache = self.cache.read().await;
        CacheStats {
            question_keys: cache.len(),
            total_records: cache.values().map(Vec::len).sum(),
        }
    }

    async fn find_cached(&self, question_id: i64, hash: &str) -> Option<GradingRecord> {
        let cache = self.cache.read().await;
        cache
            .get(&cache_key(question_id))?
            .iter()
            .rev()
            .find(|r| r.response_hash == hash)
            .cloned()
    }
}

impl Drop for ConsistencyService {
    fn drop(&mut self) {
        if let Some(handle) = self
            .sweeper
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

/// 校验细则得分
///
/// 数量必须与细则数一致；每个分值必须是该细则声明的档位之一，
/// 否则改为最接近的档位并记录问题
pub fn validate_rubric_scores(rubrics: &[Rubric], scores: &[RubricScore]) -> RubricValidation {
    let mut issues = Vec::new();
    let count_matches = scores.len() == rubrics.len();
    if !count_matches {
        issues.push(format!(
            "expected {} rubric scores, got {}",
            rubrics.len(),
            scores.len()
        ));
    }

    let mut corrected = Vec::with_capacity(scores.len());
    for score in scores {
        let Some(rubric) = rubrics.get(score.rubric_index) else {
            issues.push(format!("rubric index {} does not exist", score.rubric_index));
            continue;
        };

        let valid_points = rubric.valid_points();
        let closest = valid_points
            .iter()
            .copied()
            .min_by(|a, b| {
                (a - score.points)
                    .abs()
                    .partial_cmp(&(b - score.points).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(0.0);

        let mut fixed = score.clone();
        if (closest - score.points).abs() > 1e-9 {
            issues.push(format!(
                "rubric {} awarded {} which is not a valid value, snapped to {}",
                score.rubric_index, score.points, closest
            ));
            fixed.points = closest;
        }
        corrected.push(fixed);
    }

    if !issues.is_empty() {
        warn!("⚠️ 细则得分校验发现 {} 个问题", issues.len());
    }

    RubricValidation {
        valid: issues.is_empty(),
        count_matches,
        corrected,
        issues,
    }
}
