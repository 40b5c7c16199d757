use docgraph_core::types::CodeComponent;
use docgraph_core::Result;
use docgraph_llm::{GenerationConfig, LlmProvider, Message};

use crate::memory::AgentMemory;

const BASE_PROMPT: &str = "\
You are the Writer agent in a documentation-generation pipeline.

1. Use only the component's source code and the supplied context; never invent behavior.
2. Write in the third person, present tense, describing what the component does.
3. Keep the Summary to one line.
4. Reference collaborators by name when the context explains their behavior.
5. Do not restate the component's name in the Summary line.
";

const CLASS_PROMPT: &str = "\
This component is a class. The docstring must include Summary and Description \
always. Include Parameters iff the constructor takes at least one parameter \
beyond the receiver. Include Attributes iff the class defines a class-level \
assignment, an `__init__` that assigns to `self.*`, or inherits from an \
enumeration base. Include Examples unless the class name begins with an underscore.
";

const FUNCTION_PROMPT: &str = "\
This component is a function or method. The docstring must include Summary and \
Description always. Include Args iff parameters beyond the receiver exist. \
Include Returns iff the body returns a non-None value or yields. Include Raises \
iff the body raises an exception that escapes any enclosing handler. Include \
Examples unless the name begins with an underscore.
";

const OUTPUT_INSTRUCTION: &str = "\
Wrap the final docstring text in <DOCSTRING>...</DOCSTRING> with no surrounding \
triple-quote markers.
";

fn is_class_component(source_text: &str) -> bool {
    source_text
        .lines()
        .next()
        .map(|line| line.trim_start().starts_with("class "))
        .unwrap_or(false)
}

pub struct Writer<'a> {
    llm: &'a dyn LlmProvider,
}

impl<'a> Writer<'a> {
    pub fn new(llm: &'a dyn LlmProvider) -> Self {
        Self { llm }
    }

    pub async fn write(
        &self,
        memory: &mut AgentMemory,
        component: &CodeComponent,
        context_xml: &str,
    ) -> Result<String> {
        if memory.messages().is_empty() {
            let specialised = if is_class_component(&component.source_text) {
                CLASS_PROMPT
            } else {
                FUNCTION_PROMPT
            };
            memory.push(Message::system(format!(
                "{BASE_PROMPT}\n{specialised}\n{OUTPUT_INSTRUCTION}"
            )));
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

        Ok(extract_docstring(&response.content))
    }
}

fn extract_docstring(response: &str) -> String {
    match (response.find("<DOCSTRING>"), response.find("</DOCSTRING>")) {
        (Some(start), Some(end)) if start < end => {
            response[start + "<DOCSTRING>".len()..end].trim().to_string()
        }
        _ => {
            tracing::warn!("writer response missing <DOCSTRING> wrapper; using raw response");
            response.trim().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_class_component() {
        assert!(is_class_component("class Foo:\n    pass"));
        assert!(!is_class_component("def foo():\n    pass"));
    }

    #[test]
    fn extracts_wrapped_docstring() {
        let response = "some reasoning\n<DOCSTRING>Summary: does a thing.</DOCSTRING>";
        assert_eq!(extract_docstring(response), "Summary: does a thing.");
    }

    #[test]
    fn falls_back_to_raw_response_when_unwrapped() {
        let response = "just a plain summary, no wrapper";
        assert_eq!(extract_docstring(response), response);
    }
}
