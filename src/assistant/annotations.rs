use super::types::{MessageContent, Role, TextContent, ThreadMessage};

/// Paired delimiter wrapped around quoted excerpts in answer text.
pub const QUOTE_MARKER: &str = "```";

const FILE_CITATION: &str = "file_citation";

/// Render one text part, resolving citation placeholders.
///
/// A `file_citation` placeholder is replaced by its quote wrapped in
/// [`QUOTE_MARKER`] when the backend supplied one, otherwise it is removed.
/// Other annotation kinds are left untouched.
pub fn render_text(content: &TextContent) -> String {
    let mut text = content.value.clone();
    for annotation in &content.annotations {
        if annotation.kind != FILE_CITATION || annotation.text.is_empty() {
            continue;
        }
        let replacement = annotation
            .file_citation
            .as_ref()
            .and_then(|c| c.quote.as_deref())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("{QUOTE_MARKER}{q}{QUOTE_MARKER}"))
            .unwrap_or_default();
        text = text.replace(&annotation.text, &replacement);
    }
    text
}

/// Extract the answer texts from assistant-authored messages, in order.
///
/// One entry per non-empty text part; user messages and non-text parts are skipped.
pub fn answer_texts(messages: &[ThreadMessage]) -> Vec<String> {
    messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .flat_map(|m| m.content.iter())
        .filter_map(|part| match part {
            MessageContent::Text { text } => Some(render_text(text)),
            MessageContent::Other => None,
        })
        .filter(|t| !t.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::types::{Annotation, FileCitation};

    fn citation(text: &str, quote: Option<&str>) -> Annotation {
        Annotation {
            kind: FILE_CITATION.to_string(),
            text: text.to_string(),
            file_citation: Some(FileCitation {
                file_id: "file_1".to_string(),
                quote: quote.map(|q| q.to_string()),
            }),
        }
    }

    fn assistant_message(id: &str, value: &str, annotations: Vec<Annotation>) -> ThreadMessage {
        ThreadMessage {
            id: id.to_string(),
            role: Role::Assistant,
            content: vec![MessageContent::Text {
                text: TextContent {
                    value: value.to_string(),
                    annotations,
                },
            }],
        }
    }

    #[test]
    fn test_citation_without_quote_is_removed() {
        let content = TextContent {
            value: "Notice is two weeks【4:0†source】.".to_string(),
            annotations: vec![citation("【4:0†source】", None)],
        };
        assert_eq!(render_text(&content), "Notice is two weeks.");
    }

    #[test]
    fn test_citation_with_quote_is_fenced() {
        let content = TextContent {
            value: "See【1:2†source】".to_string(),
            annotations: vec![citation("【1:2†source】", Some("  Article 100 \n"))],
        };
        assert_eq!(render_text(&content), "See```Article 100```");
    }

    #[test]
    fn test_other_annotation_kinds_untouched() {
        let content = TextContent {
            value: "Download sandbox:/file.csv".to_string(),
            annotations: vec![Annotation {
                kind: "file_path".to_string(),
                text: "sandbox:/file.csv".to_string(),
                file_citation: None,
            }],
        };
        assert_eq!(render_text(&content), "Download sandbox:/file.csv");
    }

    #[test]
    fn test_answer_texts_skips_user_and_empty_parts() {
        let user = ThreadMessage {
            id: "msg_u".to_string(),
            role: Role::User,
            content: vec![MessageContent::Text {
                text: TextContent {
                    value: "question".to_string(),
                    annotations: vec![],
                },
            }],
        };
        let messages = vec![
            user,
            assistant_message("msg_1", "first", vec![]),
            assistant_message("msg_2", "【0†source】", vec![citation("【0†source】", None)]),
            assistant_message("msg_3", "second", vec![]),
        ];
        assert_eq!(answer_texts(&messages), vec!["first", "second"]);
    }
}
