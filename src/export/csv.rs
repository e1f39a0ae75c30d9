//! Plain-text deck import: one card per line, `question,answer[,explanation]`.
//! Semicolons work as separators too.

use log::warn;

/// Card content parsed from an import file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedCard {
    pub question: String,
    pub answer: String,
    pub explanation: Option<String>,
}

fn clean_field(field: &str) -> &str {
    let field = field.trim();
    let field = field.strip_prefix('"').unwrap_or(field);
    field.strip_suffix('"').unwrap_or(field)
}

/// Parses deck content, skipping malformed lines.
pub fn parse_csv_deck(content: &str) -> Vec<ImportedCard> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(index, line)| {
            let parts: Vec<&str> = line.split([',', ';']).map(clean_field).collect();
            if parts.len() < 2 {
                warn!("Skipping malformed CSV line {}: {}", index + 1, line);
                return None;
            }
            let (question, answer) = (parts[0], parts[1]);
            if question.is_empty() || answer.is_empty() {
                return None;
            }
            let explanation = parts
                .get(2)
                .filter(|e| !e.is_empty())
                .map(|e| e.to_string());
            Some(ImportedCard {
                question: question.to_string(),
                answer: answer.to_string(),
                explanation,
            })
        })
        .collect()
}
