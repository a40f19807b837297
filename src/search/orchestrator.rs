//! 搜索编排
//!
//! - 单轮：模型生成至多 N 条查询（超时 / 失败 / 拦截 / 空输出时退回原始消息），并发检索，按关键词排序。
//! - 深度：顺序执行多轮单轮搜索，轮间由模型细化查询；空轮立即终止，最后一轮之后不再细化；
//!   结束后先推理、再清理出最终答案，任一阶段被拦截都不会用推理文本代替答案。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;

use crate::config::AppConfig;
use crate::core::{ChatError, GenerationGuard, SearchPhase, SearchSession};
use crate::llm::GenerationRequest;
use crate::memory::Message;
use crate::prompts::{self, tasks, QUERIES_MARKER};
use crate::search::ranking::{dedupe_by_url, format_context, rank_by_keywords};
use crate::search::{RetrievalProvider, SearchResult};

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub max_iterations: usize,
    pub results_per_query: usize,
    pub max_queries: usize,
    /// 查询使用的语言
    pub language: String,
    /// 生成查询时参考的历史条数
    pub history_messages: usize,
    pub query_timeout: Duration,
    pub dedupe_by_url: bool,
    /// 0 表示不限
    pub max_accumulated_results: usize,
}

impl SearchSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_iterations: cfg.search.max_iterations,
            results_per_query: cfg.search.results_per_query,
            max_queries: cfg.search.max_queries,
            language: cfg.search.language.clone(),
            history_messages: cfg.memory.search_context_messages,
            query_timeout: cfg.llm.timeouts.query_generation(),
            dedupe_by_url: cfg.search.dedupe_by_url,
            max_accumulated_results: cfg.search.max_accumulated_results,
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// 单轮搜索输出
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRound {
    pub queries: Vec<String>,
    pub results: Vec<SearchResult>,
    pub context: String,
}

/// 深度搜索结果
#[derive(Debug, Clone, PartialEq)]
pub enum DeepSearchOutcome {
    Done {
        answer: String,
        rounds: usize,
        results: usize,
    },
    NoResults {
        rounds: usize,
    },
    Failed {
        error: ChatError,
        rounds: usize,
    },
}

impl DeepSearchOutcome {
    pub fn phase(&self) -> SearchPhase {
        match self {
            DeepSearchOutcome::Done { .. } => SearchPhase::Done,
            DeepSearchOutcome::NoResults { .. } => SearchPhase::AbortedEmpty,
            DeepSearchOutcome::Failed { .. } => SearchPhase::AbortedError,
        }
    }

    pub fn rounds(&self) -> usize {
        match self {
            DeepSearchOutcome::Done { rounds, .. }
            | DeepSearchOutcome::NoResults { rounds }
            | DeepSearchOutcome::Failed { rounds, .. } => *rounds,
        }
    }
}

pub struct SearchOrchestrator {
    guard: Arc<GenerationGuard>,
    provider: RetrievalProvider,
    settings: SearchSettings,
}

impl SearchOrchestrator {
    pub fn new(
        guard: Arc<GenerationGuard>,
        provider: RetrievalProvider,
        settings: SearchSettings,
    ) -> Self {
        Self {
            guard,
            provider,
            settings,
        }
    }

    /// 单轮搜索；结果为空也是合法输出
    pub async fn single_round(&self, message: &str, history: &[Message]) -> SearchRound {
        let queries = self.generate_queries(message, history).await;
        let results: Vec<SearchResult> = self
            .provider
            .search_all(&queries, self.settings.results_per_query)
            .await
            .into_iter()
            .flatten()
            .collect();
        let results = rank_by_keywords(results, message);
        tracing::info!(
            queries = queries.len(),
            results = results.len(),
            "Search round completed"
        );
        let context = format_context(&results);
        SearchRound {
            queries,
            results,
            context,
        }
    }

    async fn generate_queries(&self, message: &str, history: &[Message]) -> Vec<String> {
        let history_text = format_history(history, self.settings.history_messages);
        let prompt = prompts::query_generation(
            &history_text,
            message,
            self.settings.max_queries,
            &self.settings.language,
        );
        let request = GenerationRequest::new(prompt);
        let queries = match self
            .guard
            .generate(tasks::QUERY_GENERATION, &request, self.settings.query_timeout)
            .await
        {
            Ok(text) => parse_query_lines(&text, self.settings.max_queries),
            Err(e) => {
                tracing::warn!(error = %e, "Query generation failed, using the raw message");
                Vec::new()
            }
        };
        if queries.is_empty() {
            vec![message.to_string()]
        } else {
            tracing::debug!(?queries, "Generated search queries");
            queries
        }
    }

    /// 深度搜索，查询语言同时作为回答语言
    pub async fn deep_search(&self, query: &str, history: &[Message]) -> DeepSearchOutcome {
        let language = self.settings.language.clone();
        self.deep_search_in(query, history, &language).await
    }

    /// 深度搜索，回答使用 `reply_language`
    pub async fn deep_search_in(
        &self,
        query: &str,
        history: &[Message],
        reply_language: &str,
    ) -> DeepSearchOutcome {
        let max_iterations = self.settings.max_iterations.max(1);
        let mut session = SearchSession::new(query);
        tracing::info!(session = %session.id, query, max_iterations, "Deep search started");

        loop {
            let iteration = session.begin_round();
            let round = self.single_round(&session.current_query, history).await;
            if round.results.is_empty() {
                session.transition(SearchPhase::AbortedEmpty);
                tracing::info!(session = %session.id, iteration, "Deep search found no results");
                return DeepSearchOutcome::NoResults { rounds: iteration };
            }
            session.accumulated_results.extend(round.results);

            if iteration >= max_iterations {
                break;
            }

            session.transition(SearchPhase::Refining(iteration));
            match self.refine(&session, &round.context).await {
                Some(refined) => session.current_query = refined.join(" "),
                None => break,
            }
        }

        session.transition(SearchPhase::Synthesizing);
        let rounds = session.iteration;
        let results = self.prepare_for_synthesis(std::mem::take(&mut session.accumulated_results));
        let result_count = results.len();

        match self
            .synthesize(&session.original_query, &results, reply_language)
            .await
        {
            Ok(answer) => {
                session.transition(SearchPhase::Done);
                tracing::info!(
                    session = %session.id,
                    rounds,
                    results = result_count,
                    "Deep search completed"
                );
                DeepSearchOutcome::Done {
                    answer,
                    rounds,
                    results: result_count,
                }
            }
            Err(error) => {
                session.transition(SearchPhase::AbortedError);
                tracing::error!(session = %session.id, rounds, error = %error, "Deep search synthesis failed");
                DeepSearchOutcome::Failed { error, rounds }
            }
        }
    }

    /// 细化查询；没有可用查询或调用失败时返回 None（正常结束迭代）
    async fn refine(&self, session: &SearchSession, round_context: &str) -> Option<Vec<String>> {
        let prompt = prompts::refinement(
            &session.original_query,
            &session.current_query,
            session.iteration,
            round_context,
            self.settings.max_queries,
            &self.settings.language,
        );
        let request = GenerationRequest::new(prompt);
        match self
            .guard
            .generate(tasks::REFINEMENT, &request, self.settings.query_timeout)
            .await
        {
            Ok(text) => {
                let refined = parse_refined_queries(&text, self.settings.max_queries);
                if refined.is_empty() {
                    tracing::info!(session = %session.id, "No refined queries, stopping iteration");
                    None
                } else {
                    tracing::debug!(session = %session.id, ?refined, "Refined queries");
                    Some(refined)
                }
            }
            Err(e) => {
                tracing::warn!(session = %session.id, error = %e, "Refinement failed, stopping iteration");
                None
            }
        }
    }

    fn prepare_for_synthesis(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        let mut results = if self.settings.dedupe_by_url {
            dedupe_by_url(results)
        } else {
            results
        };
        if self.settings.max_accumulated_results > 0 {
            results.truncate(self.settings.max_accumulated_results);
        }
        results
    }

    async fn synthesize(
        &self,
        query: &str,
        results: &[SearchResult],
        language: &str,
    ) -> Result<String, ChatError> {
        let context = format_context(results);
        let reasoning = self
            .guard
            .text(
                tasks::REASONING,
                prompts::research_reasoning(query, &context, language),
            )
            .await?;
        if reasoning.trim().is_empty() {
            return Err(ChatError::EmptyResponse);
        }

        let answer = self
            .guard
            .text(
                tasks::FINAL_ANSWER,
                prompts::research_answer(query, &reasoning, language),
            )
            .await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(ChatError::EmptyResponse);
        }
        Ok(answer.to_string())
    }
}

/// 最近 n 条历史，格式同对话上下文
fn format_history(history: &[Message], n: usize) -> String {
    history[history.len().saturating_sub(n)..]
        .iter()
        .map(|m| format!("{}: {}", m.role().label(), m.content()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn list_marker() -> Option<&'static Regex> {
    static LIST_MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    LIST_MARKER
        .get_or_init(|| Regex::new(r"^\s*(?:[-*•]+|\d+[.)])\s*").ok())
        .as_ref()
}

/// 去掉列表符号、编号与引号
fn clean_query_line(line: &str) -> String {
    let line = line.trim();
    let line = match list_marker() {
        Some(re) => re.replace(line, "").into_owned(),
        None => line.to_string(),
    };
    line.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}

/// 每行一条查询：去空行，清理后取前 `max` 条
pub fn parse_query_lines(text: &str, max: usize) -> Vec<String> {
    text.lines()
        .map(clean_query_line)
        .filter(|q| !q.is_empty())
        .take(max)
        .collect()
}

/// 细化输出：只取最后一个 `QUERIES:` 标记之后的行；没有标记时取最后 `max` 个非空行
pub fn parse_refined_queries(text: &str, max: usize) -> Vec<String> {
    let lowered = text.to_ascii_lowercase();
    let marker = QUERIES_MARKER.to_ascii_lowercase();
    if let Some(pos) = lowered.rfind(&marker) {
        return parse_query_lines(&text[pos + marker.len()..], max);
    }

    let lines: Vec<String> = text
        .lines()
        .map(clean_query_line)
        .filter(|q| !q.is_empty())
        .collect();
    lines[lines.len().saturating_sub(max)..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_lines_strips_markers() {
        let text = "1. rust async runtime\n\n- \"tokio vs async-std\"\n* smol executor\n4) extra";
        assert_eq!(
            parse_query_lines(text, 3),
            vec!["rust async runtime", "tokio vs async-std", "smol executor"]
        );
    }

    #[test]
    fn test_parse_query_lines_empty() {
        assert!(parse_query_lines("  \n\n", 3).is_empty());
    }

    #[test]
    fn test_parse_refined_uses_last_marker() {
        let text = "Step 1: the results mention QUERIES: in passing\nStep 2: gaps\nqueries:\n- first\n- second\n";
        assert_eq!(parse_refined_queries(text, 3), vec!["first", "second"]);
    }

    #[test]
    fn test_parse_refined_marker_inline() {
        assert_eq!(
            parse_refined_queries("reasoning\nQUERIES: only one", 3),
            vec!["only one"]
        );
    }

    #[test]
    fn test_parse_refined_without_marker_takes_tail() {
        let text = "thinking a\nthinking b\nq1\nq2\nq3";
        assert_eq!(parse_refined_queries(text, 3), vec!["q1", "q2", "q3"]);
    }

    #[test]
    fn test_parse_refined_marker_with_nothing_after() {
        assert!(parse_refined_queries("analysis\nQUERIES:\n", 3).is_empty());
    }

    #[test]
    fn test_format_history_takes_tail() {
        let history = vec![
            Message::user("a"),
            Message::assistant("b"),
            Message::user("c"),
        ];
        assert_eq!(format_history(&history, 2), "Assistant: b\nUser: c");
        assert_eq!(format_history(&history, 0), "");
    }

    #[test]
    fn test_outcome_phase() {
        assert_eq!(
            DeepSearchOutcome::NoResults { rounds: 1 }.phase(),
            SearchPhase::AbortedEmpty
        );
        assert_eq!(
            DeepSearchOutcome::Failed {
                error: ChatError::EmptyResponse,
                rounds: 2
            }
            .rounds(),
            2
        );
    }
}
