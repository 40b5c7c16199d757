use docgraph_core::types::CodeComponent;
use docgraph_core::Result;
use docgraph_llm::{GenerationConfig, LlmProvider, Message};
use regex::Regex;

use crate::memory::AgentMemory;

const SYSTEM_PROMPT: &str = "\
You are the Verifier agent in a documentation-generation pipeline.

Analyze the generated docstring against the component's source and the context by:
1. Checking every factual claim in the docstring against the source code.
2. Checking the docstring against the required section layout for its kind.
3. Checking that referenced collaborators are used consistently with the context.

Verify against these criteria: accuracy, completeness of required sections, and clarity.

Respond with your analysis, then end with, in strict order:

<NEED_REVISION>true|false</NEED_REVISION>
[if true]
<MORE_CONTEXT>true|false</MORE_CONTEXT>
[if MORE_CONTEXT=true]  <SUGGESTION_CONTEXT>what additional context is needed</SUGGESTION_CONTEXT>
[if MORE_CONTEXT=false] <SUGGESTION>how to rewrite the docstring</SUGGESTION>
";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifierResponse {
    pub need_revision: bool,
    pub need_context: bool,
    pub context_suggestion: String,
    pub suggestion: String,
}

pub struct Verifier<'a> {
    llm: &'a dyn LlmProvider,
}

impl<'a> Verifier<'a> {
    pub fn new(llm: &'a dyn LlmProvider) -> Self {
        Self { llm }
    }

    /// Always starts from a clean memory: a verifier that remembered its own
    /// prior rejection would anchor on it instead of re-judging the new draft.
    pub async fn verify(
        &self,
        component: &CodeComponent,
        docstring: &str,
        context_xml: &str,
    ) -> Result<VerifierResponse> {
        let mut memory = AgentMemory::new();
        memory.push(Message::system(SYSTEM_PROMPT));
        let task = format!(
            "<context>{context_xml}</context>\n<component>{}</component>\n<docstring>{docstring}</docstring>",
            component.source_text
        );
        memory.push(Message::user(task));

        let response = self
            .llm
            .generate_chat(memory.messages(), &GenerationConfig::default())
            .await
            .map_err(|e| docgraph_core::DocgraphError::Llm(e.to_string()))?;

        Ok(parse_verifier_response(&response.content))
    }
}

fn extract_tag(haystack: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(r"(?s)<{name}>(.*?)</{name}>")).ok()?;
    re.captures(haystack).map(|c| c[1].trim().to_string())
}

fn parse_verifier_response(text: &str) -> VerifierResponse {
    let need_revision = extract_tag(text, "NEED_REVISION")
        .map(|s| s.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if !need_revision {
        return VerifierResponse::default();
    }

    let need_context = extract_tag(text, "MORE_CONTEXT")
        .map(|s| s.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if need_context {
        VerifierResponse {
            need_revision,
            need_context,
            context_suggestion: extract_tag(text, "SUGGESTION_CONTEXT").unwrap_or_default(),
            suggestion: String::new(),
        }
    } else {
        VerifierResponse {
            need_revision,
            need_context,
            context_suggestion: String::new(),
            suggestion: extract_tag(text, "SUGGESTION").unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_when_need_revision_is_false() {
        let response = parse_verifier_response("looks good\n<NEED_REVISION>false</NEED_REVISION>");
        assert_eq!(response, VerifierResponse::default());
    }

    #[test]
    fn requests_more_context() {
        let text = "\
<NEED_REVISION>true</NEED_REVISION>\n\
<MORE_CONTEXT>true</MORE_CONTEXT>\n\
<SUGGESTION_CONTEXT>needs the caller's usage</SUGGESTION_CONTEXT>\n";
        let response = parse_verifier_response(text);
        assert!(response.need_revision);
        assert!(response.need_context);
        assert_eq!(response.context_suggestion, "needs the caller's usage");
    }

    #[test]
    fn requests_a_rewrite() {
        let text = "\
<NEED_REVISION>true</NEED_REVISION>\n\
<MORE_CONTEXT>false</MORE_CONTEXT>\n\
<SUGGESTION>tighten the summary line</SUGGESTION>\n";
        let response = parse_verifier_response(text);
        assert!(response.need_revision);
        assert!(!response.need_context);
        assert_eq!(response.suggestion, "tighten the summary line");
    }

    #[test]
    fn missing_blocks_default_to_false() {
        let response = parse_verifier_response("no tags at all here");
        assert!(!response.need_revision);
    }
}
