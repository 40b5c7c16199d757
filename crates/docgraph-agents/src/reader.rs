use docgraph_core::types::CodeComponent;
use docgraph_core::Result;
use docgraph_llm::{GenerationConfig, LlmProvider, Message};
use regex::Regex;

use crate::memory::AgentMemory;

const SYSTEM_PROMPT: &str = "\
You are the Reader agent in a documentation-generation pipeline. Given a \
component's source code and any context already gathered, decide whether you \
need more information to write an accurate docstring.

Respond with your analysis, then end your response with exactly one block:

<INFO_NEED>true|false</INFO_NEED>

If true, follow it with:

<REQUEST>
  <INTERNAL>
    <CALLS>
      <CLASS>comma,separated,names</CLASS>
      <FUNCTION>comma,separated,names</FUNCTION>
      <METHOD>comma,separated,names</METHOD>
    </CALLS>
    <CALL_BY>true|false</CALL_BY>
  </INTERNAL>
  <RETRIEVAL>
    <QUERY>comma,separated,questions</QUERY>
  </RETRIEVAL>
</REQUEST>

Use receiver notation for methods (self.x, instance.y, Class.z). Reserve \
external queries for novel, named algorithms only. Only first-level \
references are addressable.
";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoRequest {
    pub classes: Vec<String>,
    pub functions: Vec<String>,
    pub methods: Vec<String>,
    pub call_by: bool,
    pub queries: Vec<String>,
}

impl InfoRequest {
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
            && self.functions.is_empty()
            && self.methods.is_empty()
            && !self.call_by
            && self.queries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ReaderResponse {
    pub info_need: bool,
    pub request: InfoRequest,
}

pub struct Reader<'a> {
    llm: &'a dyn LlmProvider,
}

impl<'a> Reader<'a> {
    pub fn new(llm: &'a dyn LlmProvider) -> Self {
        Self { llm }
    }

    pub async fn analyze(
        &self,
        memory: &mut AgentMemory,
        component: &CodeComponent,
        context_xml: &str,
    ) -> Result<ReaderResponse> {
        if memory.messages().is_empty() {
            memory.push(Message::system(SYSTEM_PROMPT));
        }
        let task = format!(
            "<context>{context_xml}</context>\n<component>{}</component>",
            component.source_text
        );
        memory.push(Message::user(task));

        let response = self
            .llm
            .generate_chat(memory.messages(), &GenerationConfig::default())
            .await
            .map_err(|e| docgraph_core::DocgraphError::Llm(e.to_string()))?;
        memory.push(Message::assistant(response.content.clone()));

        Ok(parse_reader_response(&response.content))
    }
}

fn parse_reader_response(text: &str) -> ReaderResponse {
    let info_need_re = Regex::new(r"(?s)<INFO_NEED>\s*(true|false)\s*</INFO_NEED>").unwrap();
    let info_need = info_need_re
        .captures(text)
        .map(|c| &c[1] == "true")
        .unwrap_or(false);

    if !info_need {
        return ReaderResponse {
            info_need: false,
            request: InfoRequest::default(),
        };
    }

    let request = extract_request(text).unwrap_or_default();
    ReaderResponse { info_need, request }
}

fn extract_request(text: &str) -> Option<InfoRequest> {
    let tag = |name: &str, haystack: &str| -> Option<String> {
        let re = Regex::new(&format!(r"(?s)<{name}>(.*?)</{name}>")).ok()?;
        re.captures(haystack).map(|c| c[1].trim().to_string())
    };

    let classes = tag("CLASS", text).map(|s| parse_comma_list(&s)).unwrap_or_default();
    let functions = tag("FUNCTION", text).map(|s| parse_comma_list(&s)).unwrap_or_default();
    let methods = tag("METHOD", text).map(|s| parse_comma_list(&s)).unwrap_or_default();
    let call_by = tag("CALL_BY", text)
        .map(|s| s.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let queries = tag("QUERY", text).map(|s| parse_comma_list(&s)).unwrap_or_default();

    Some(InfoRequest {
        classes,
        functions,
        methods,
        call_by,
        queries,
    })
}

fn parse_comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_need_when_info_need_is_false() {
        let response = parse_reader_response("analysis...\n<INFO_NEED>false</INFO_NEED>");
        assert!(!response.info_need);
        assert!(response.request.is_empty());
    }

    #[test]
    fn parses_a_full_request_block() {
        let text = "\
reasoning\n\
<INFO_NEED>true</INFO_NEED>\n\
<REQUEST>\n\
  <INTERNAL>\n\
    <CALLS>\n\
      <CLASS>Greeter</CLASS>\n\
      <FUNCTION>helper, other</FUNCTION>\n\
      <METHOD>self.greet</METHOD>\n\
    </CALLS>\n\
    <CALL_BY>true</CALL_BY>\n\
  </INTERNAL>\n\
  <RETRIEVAL>\n\
    <QUERY>what is dijkstra</QUERY>\n\
  </RETRIEVAL>\n\
</REQUEST>\n";
        let response = parse_reader_response(text);
        assert!(response.info_need);
        assert_eq!(response.request.classes, vec!["Greeter"]);
        assert_eq!(response.request.functions, vec!["helper", "other"]);
        assert_eq!(response.request.methods, vec!["self.greet"]);
        assert!(response.request.call_by);
        assert_eq!(response.request.queries, vec!["what is dijkstra"]);
    }

    #[test]
    fn malformed_block_yields_empty_request() {
        let response = parse_reader_response("<INFO_NEED>true</INFO_NEED>\nno request here");
        assert!(response.info_need);
        assert!(response.request.is_empty());
    }
}
