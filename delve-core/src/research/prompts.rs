//! Prompt texts sent to the completion service.

use crate::types::Query;

/// Final user turn of the completeness check.
pub const VERDICT_QUESTION: &str =
    "Does this information fully satisfy the goal? Answer Yes or No only.";

pub fn clarify_prompt(topic: &str, count: usize) -> String {
    format!(
        "Ask {count} numbered clarifying questions to the user about the topic: {topic}.\n\
         The goal of the questions is to understand the intended purpose of the research.\n\
         Reply only with the questions."
    )
}

pub fn plan_prompt(topic: &str, questions: &[String], answers: &[String], count: usize) -> String {
    format!(
        "Using the user answers {answers:?} to the questions {questions:?}, write a goal sentence \
         and {count} web search queries for the research about {topic}.\n\
         Output: a JSON object with the goal and the {count} web search queries that will reach it.\n\
         Format: {{\"goal\": \"...\", \"queries\": [\"q1\", ...]}}"
    )
}

pub fn search_prompt(query: &str) -> String {
    format!("search: {query}")
}

pub fn goal_turn(goal: &str) -> String {
    format!("Research goal: {goal}")
}

pub fn current_data_turn(collected_json: &str) -> String {
    format!("Current data: {collected_json}")
}

pub fn expansion_request(goal: &str, count: usize) -> String {
    format!(
        "This has not met the goal: {goal}. Write {count} other web searches to achieve the goal.\n\
         Reply only with a JSON array of strings."
    )
}

pub fn report_instruction(goal: &str) -> String {
    format!(
        "Write a complete and detailed report about research goal: {goal}\n\
         Cite sources inline using [n] and append a reference list mapping [n] to url."
    )
}

/// Render a batch for logs and progress lines.
pub fn batch_preview(batch: &[Query]) -> String {
    batch
        .iter()
        .map(|q| format!("\"{q}\""))
        .collect::<Vec<_>>()
        .join(", ")
}
