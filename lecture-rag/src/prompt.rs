//! Prompt assembly for grounded answers.

use std::fmt::Write as _;

use crate::document::SearchResult;
use crate::error::{RagError, Result};

const CONTEXT_PLACEHOLDER: &str = "{context}";
const QUESTION_PLACEHOLDER: &str = "{question}";

/// The instruction used when no template is configured.
pub const DEFAULT_TEMPLATE: &str = "\
You are a helpful assistant for students of this course.
Answer based ONLY on the following context provided.
If the answer is not in the context, say \"I don't know based on the documents\".

<context>
{context}
</context>

Question: {question}
Answer:";

/// A prompt template with `{context}` and `{question}` placeholders.
///
/// Retrieved chunks are rendered into `{context}` one `<document>` element
/// each, in retrieval order, tagged with their source file and page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Context,
    Question,
}

/// Split `template` at its placeholders, left to right.
fn parse(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = template;
    loop {
        let next = [(CONTEXT_PLACEHOLDER, Segment::Context), (QUESTION_PLACEHOLDER, Segment::Question)]
            .into_iter()
            .filter_map(|(placeholder, segment)| {
                rest.find(placeholder).map(|at| (at, placeholder, segment))
            })
            .min_by_key(|(at, _, _)| *at);
        match next {
            Some((at, placeholder, segment)) => {
                if at > 0 {
                    segments.push(Segment::Text(rest[..at].to_string()));
                }
                segments.push(segment);
                rest = &rest[at + placeholder.len()..];
            }
            None => {
                if !rest.is_empty() {
                    segments.push(Segment::Text(rest.to_string()));
                }
                return segments;
            }
        }
    }
}

impl PromptTemplate {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] unless both placeholders appear.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(RagError::ConfigError(format!(
                    "prompt template must contain the {placeholder} placeholder"
                )));
            }
        }
        let segments = parse(&template);
        Ok(Self { template, segments })
    }

    /// The raw template text.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Render the prompt for `question` over the retrieved `context`.
    ///
    /// Substituted text is never scanned for placeholders.
    pub fn render(&self, question: &str, context: &[SearchResult]) -> String {
        let mut documents = String::new();
        for (i, result) in context.iter().enumerate() {
            if i > 0 {
                documents.push('\n');
            }
            let chunk = &result.chunk;
            // Writing to a String cannot fail.
            let _ = write!(
                documents,
                "<document source=\"{}\" page=\"{}\">\n{}\n</document>",
                chunk.source, chunk.page, chunk.text
            );
        }

        let mut rendered = String::with_capacity(self.template.len() + documents.len() + question.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Context => rendered.push_str(&documents),
                Segment::Question => rendered.push_str(question),
            }
        }
        rendered
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { template: DEFAULT_TEMPLATE.to_string(), segments: parse(DEFAULT_TEMPLATE) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;

    fn result(source: &str, page: u32, text: &str) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: format!("{source}#p{page}_0"),
                text: text.into(),
                source: source.into(),
                page,
                offset: 0,
            },
            score: 0.5,
        }
    }

    #[test]
    fn default_template_is_valid() {
        assert!(PromptTemplate::new(DEFAULT_TEMPLATE).is_ok());
    }

    #[test]
    fn missing_placeholders_are_rejected() {
        assert!(PromptTemplate::new("Answer: {question}").is_err());
        assert!(PromptTemplate::new("{context} only").is_err());
    }

    #[test]
    fn renders_context_in_order_with_sources() {
        let prompt = PromptTemplate::default().render(
            "What is self-attention?",
            &[result("Lecture01.pdf", 3, "self-attention relates tokens"), result("Lecture02.pdf", 1, "MLP")],
        );
        let first = prompt.find("Lecture01.pdf").unwrap();
        let second = prompt.find("Lecture02.pdf").unwrap();
        assert!(first < second);
        assert!(prompt.contains("page=\"3\""));
        assert!(prompt.contains("Question: What is self-attention?"));
        assert!(prompt.contains("I don't know based on the documents"));
    }

    #[test]
    fn question_text_is_not_reinterpreted() {
        let template = PromptTemplate::new("{context}|{question}").unwrap();
        assert_eq!(template.render("{context}?", &[]), "|{context}?");
    }

    #[test]
    fn placeholders_inside_chunks_stay_literal() {
        let chunk = result(
            "Lecture07.pdf",
            12,
            "prompt = PromptTemplate.from_template(\"Answer {question} using {context}\")",
        );
        let prompt = PromptTemplate::default().render("What is RAG?", &[chunk]);

        assert!(prompt.contains("from_template(\"Answer {question} using {context}\")"));
        assert_eq!(prompt.matches("What is RAG?").count(), 1);
        assert!(prompt.ends_with("Question: What is RAG?\nAnswer:"));
    }

    #[test]
    fn repeated_placeholders_are_all_filled() {
        let template = PromptTemplate::new("Q: {question}\n{context}\nAgain: {question}").unwrap();
        assert_eq!(template.render("why?", &[]), "Q: why?\n\nAgain: why?");
    }
}
