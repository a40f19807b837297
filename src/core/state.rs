//! 深度搜索会话状态
//!
//! Init → Searching(i) → Refining(i) → [Searching(i+1) | Synthesizing] → Done | AbortedEmpty | AbortedError

use serde::Serialize;
use uuid::Uuid;

use crate::search::SearchResult;

/// 深度搜索阶段；轮次从 1 开始
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SearchPhase {
    Init,
    Searching(usize),
    Refining(usize),
    Synthesizing,
    Done,
    AbortedEmpty,
    AbortedError,
}

impl SearchPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SearchPhase::Done | SearchPhase::AbortedEmpty | SearchPhase::AbortedError
        )
    }
}

/// 一次深度搜索的临时状态
#[derive(Clone, Debug)]
pub struct SearchSession {
    pub id: Uuid,
    pub original_query: String,
    pub current_query: String,
    pub iteration: usize,
    phase: SearchPhase,
    pub accumulated_results: Vec<SearchResult>,
}

impl SearchSession {
    pub fn new(query: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_query: query.to_string(),
            current_query: query.to_string(),
            iteration: 0,
            phase: SearchPhase::Init,
            accumulated_results: Vec::new(),
        }
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    /// 切换阶段并记录日志
    pub fn transition(&mut self, next: SearchPhase) {
        tracing::debug!(
            session = %self.id,
            from = ?self.phase,
            to = ?next,
            "Search phase transition"
        );
        self.phase = next;
    }

    /// 进入下一轮搜索
    pub fn begin_round(&mut self) -> usize {
        self.iteration += 1;
        self.transition(SearchPhase::Searching(self.iteration));
        self.iteration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_rounds() {
        let mut s = SearchSession::new("rust async");
        assert_eq!(s.phase(), SearchPhase::Init);
        assert_eq!(s.begin_round(), 1);
        assert_eq!(s.phase(), SearchPhase::Searching(1));
        s.transition(SearchPhase::Refining(1));
        assert_eq!(s.begin_round(), 2);
        s.transition(SearchPhase::Done);
        assert!(s.phase().is_terminal());
        assert_eq!(s.original_query, "rust async");
    }
}
