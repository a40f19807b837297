//! Prompt 模板
//!
//! 每个 prompt 首行带任务标记（见 [`tasks`]），便于日志检索与测试中按任务编排 Mock 响应。
//! 人格上下文包含用户时区下的当地时间、星期、季节与时段。

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;

use crate::memory::UserProfile;

/// 任务标记
pub mod tasks {
    pub const QUERY_GENERATION: &str = "[task:query-generation]";
    pub const REFINEMENT: &str = "[task:query-refinement]";
    pub const REASONING: &str = "[task:research-reasoning]";
    pub const FINAL_ANSWER: &str = "[task:research-answer]";
    pub const CHAT_REASONING: &str = "[task:chat-reasoning]";
    pub const CHAT_ANSWER: &str = "[task:chat-answer]";
    pub const DECORATION: &str = "[task:decoration]";
    pub const MEDIA: &str = "[task:media-analysis]";
}

/// 细化查询输出中查询列表的起始标记
pub const QUERIES_MARKER: &str = "QUERIES:";

pub fn query_generation(history: &str, message: &str, max_queries: usize, language: &str) -> String {
    format!(
        "{marker}
Generate at most {max_queries} short web search queries that would find information for the user's latest message.
Use the conversation history only to resolve references.
Write the queries in {language}. Output one query per line and nothing else.

Conversation history:
{history}

User message:
{message}",
        marker = tasks::QUERY_GENERATION,
    )
}

pub fn refinement(
    original_query: &str,
    current_query: &str,
    iteration: usize,
    results_context: &str,
    max_queries: usize,
    language: &str,
) -> String {
    format!(
        "{marker}
You are refining a web research session. Think step by step:
1. Identify the key points and themes in the results.
2. Find gaps or missing details.
3. Decide which directions need deeper research given the original question.
4. Propose up to {max_queries} more specific queries in {language}.

Original question: \"{original_query}\"
Current query (round {iteration}): \"{current_query}\"

Results:
{results_context}

Show your reasoning, then finish with a line containing only {queries_marker} followed by one query per line.",
        marker = tasks::REFINEMENT,
        queries_marker = QUERIES_MARKER,
    )
}

pub fn research_reasoning(query: &str, results_context: &str, language: &str) -> String {
    format!(
        "{marker}
Analyse the accumulated web search results for the question below. Think step by step:
1. Extract the main themes.
2. Assess the credibility of each source.
3. Resolve conflicting information and note what stays uncertain.
4. Outline a comprehensive answer.
Work in {language}.

Question: \"{query}\"

Results:
{results_context}",
        marker = tasks::REASONING,
    )
}

pub fn research_answer(query: &str, reasoning: &str, language: &str) -> String {
    format!(
        "{marker}
Using only the analysis below, write the final answer to the question in {language}.
Do not show the analysis steps. Cite sources inline where the analysis names them.

Question: \"{query}\"

Analysis:
{reasoning}",
        marker = tasks::FINAL_ANSWER,
    )
}

pub fn chat_reasoning(
    persona: &str,
    history: &str,
    search_context: &str,
    message: &str,
    language: &str,
) -> String {
    format!(
        "{marker}
{persona}

Reply language: {language}

Conversation history:
{history}

Web search results:
{search_context}

Think through the user's message step by step, using the history and search results where they help, then draft a reply.

User message:
{message}",
        marker = tasks::CHAT_REASONING,
    )
}

pub fn chat_answer(message: &str, reasoning: &str, language: &str) -> String {
    format!(
        "{marker}
Rewrite the draft below as the final reply to the user in {language}.
Remove all reasoning steps and meta commentary; keep only the answer.

User message:
{message}

Draft:
{reasoning}",
        marker = tasks::CHAT_ANSWER,
    )
}

pub fn decoration(text: &str) -> String {
    format!(
        "{marker}
Suggest between 0 and 3 emojis that fit the message below. Output only the emojis, or nothing.

Message:
{text}",
        marker = tasks::DECORATION,
    )
}

pub fn media_analysis(persona: &str, caption: &str, is_video: bool, language: &str) -> String {
    let subject = if is_video { "video" } else { "image" };
    let request = if caption.trim().is_empty() {
        format!("Describe this {subject} in detail and point out anything notable.")
    } else {
        caption.to_string()
    };
    format!(
        "{marker}
{persona}

Reply language: {language}

The user sent an {subject}. Request:
{request}",
        marker = tasks::MEDIA,
    )
}

/// 人格与时间上下文；无法识别的时区按 UTC 处理
pub fn persona_context(profile: &UserProfile, now: DateTime<Utc>) -> String {
    let tz: Tz = profile.preferences.timezone.parse().unwrap_or(chrono_tz::UTC);
    let local = now.with_timezone(&tz);
    let personality = profile.personality.resolved();
    let interests = if personality.interests.is_empty() {
        String::new()
    } else {
        format!("\nUser interests: {}", personality.interests.join(", "))
    };

    format!(
        "You are Scout, a curious research companion. Tone: {tone}. Detail level: {verbosity}. Humor: {humor}.
Local time for the user: {time} ({weekday}, {period}, {season}), timezone {tz}.{interests}",
        tone = personality.tone,
        verbosity = personality.verbosity,
        humor = if personality.humor { "welcome" } else { "avoid" },
        time = local.format("%Y-%m-%d %H:%M"),
        weekday = local.weekday(),
        period = day_period(local.hour()),
        season = season(local.month()),
        tz = tz.name(),
    )
}

pub fn season(month: u32) -> &'static str {
    match month {
        3..=5 => "spring",
        6..=8 => "summer",
        9..=11 => "autumn",
        _ => "winter",
    }
}

pub fn day_period(hour: u32) -> &'static str {
    match hour {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=20 => "evening",
        _ => "night",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_markers_lead_prompts() {
        assert!(query_generation("", "hi", 3, "English").starts_with(tasks::QUERY_GENERATION));
        assert!(refinement("a", "b", 1, "", 3, "English").contains(QUERIES_MARKER));
        assert!(chat_answer("m", "r", "en").starts_with(tasks::CHAT_ANSWER));
    }

    #[test]
    fn test_media_default_prompt() {
        let p = media_analysis("persona", "  ", true, "en");
        assert!(p.contains("Describe this video"));
        let p = media_analysis("persona", "what breed is this?", false, "en");
        assert!(p.contains("what breed is this?"));
    }

    #[test]
    fn test_persona_uses_timezone() {
        let mut profile = UserProfile::new("tr", "Europe/Istanbul");
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 6, 30, 0).unwrap();
        let ctx = persona_context(&profile, now);
        assert!(ctx.contains("2024-01-15 09:30"));
        assert!(ctx.contains("morning"));
        assert!(ctx.contains("winter"));
        assert!(ctx.contains("Mon"));

        profile.preferences.timezone = "Not/AZone".into();
        assert!(persona_context(&profile, now).contains("06:30"));
    }

    #[test]
    fn test_season_and_period() {
        assert_eq!(season(7), "summer");
        assert_eq!(season(12), "winter");
        assert_eq!(day_period(23), "night");
        assert_eq!(day_period(13), "afternoon");
    }
}
