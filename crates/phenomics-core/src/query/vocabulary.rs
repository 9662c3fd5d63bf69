//! Query text conveniences
//!
//! Generated queries may write Biolink labels as `biolink_Gene` since the
//! colon in `biolink:Gene` needs backtick quoting in Cypher. The rewrite
//! restores the real label before execution and in anything shown to users.

use std::sync::LazyLock;

use regex::Regex;

static BIOLINK_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"biolink_([a-zA-Z0-9_]+)").expect("biolink label pattern compiles")
});

const CYPHER_KEYWORDS: [&str; 9] = [
    "MATCH", "OPTIONAL", "RETURN", "WITH", "UNWIND", "CALL", "WHERE", "ORDER", "LIMIT",
];

/// Rewrite `biolink_Name` to `` `biolink:Name` ``
pub fn fix_biolink_labels(query: &str) -> String {
    BIOLINK_LABEL
        .replace_all(query, "`biolink:$1`")
        .into_owned()
}

/// Pull a query out of a model reply
///
/// Takes the first fenced block when present (any language tag is
/// skipped), otherwise the lines that start with a Cypher clause keyword.
/// Returns `None` when nothing resembling a query is found.
pub fn extract_cypher(reply: &str) -> Option<String> {
    let trimmed = reply.trim();

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let code_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        if let Some(end) = after_fence[code_start..].find("```") {
            let code = after_fence[code_start..code_start + end].trim();
            return (!code.is_empty()).then(|| code.to_string());
        }
    }

    let lines: Vec<&str> = trimmed
        .lines()
        .map(str::trim)
        .filter(|line| {
            let upper = line.to_uppercase();
            CYPHER_KEYWORDS.iter().any(|kw| upper.starts_with(kw))
        })
        .collect();

    (!lines.is_empty()).then(|| lines.join("\n"))
}
