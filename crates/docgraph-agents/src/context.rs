use docgraph_llm::estimate_tokens;

/// The five named, append-only slots of the shared per-component context.
/// Presence of all five sections in the rendered XML is an invariant the
/// budgeter relies on — even an empty section still renders its tag pair.
#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    class: String,
    function: String,
    method: String,
    call_by: String,
    external: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Class,
    Function,
    Method,
    CallBy,
    External,
}

const SENTINEL_NEVER_CALLED: &str = "This component is never called by any other component.";

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_class(&mut self, name: &str, snippet: &str) {
        self.class
            .push_str(&format!("<{name}>{snippet}</{name}>\n"));
    }

    pub fn append_function(&mut self, name: &str, snippet: &str) {
        self.function
            .push_str(&format!("<{name}>{snippet}</{name}>\n"));
    }

    pub fn append_method(&mut self, name: &str, snippet: &str) {
        self.method
            .push_str(&format!("<{name}>{snippet}</{name}>\n"));
    }

    pub fn append_call_by(&mut self, snippets: &[String]) {
        if snippets.is_empty() {
            self.call_by.push_str(SENTINEL_NEVER_CALLED);
            self.call_by.push('\n');
            return;
        }
        for snippet in snippets {
            self.call_by.push_str(snippet);
            self.call_by.push('\n');
        }
    }

    pub fn append_external(&mut self, query: &str, answer: &str) {
        self.external
            .push_str(&format!("<QUERY>{query}</QUERY><r>{answer}</r>\n"));
    }

    /// The full XML skeleton passed to Reader, Writer and Verifier prompts.
    pub fn render(&self) -> String {
        format!(
            "<CONTEXT><INTERNAL_INFO><CLASS>{}</CLASS><FUNCTION>{}</FUNCTION><METHOD>{}</METHOD><CALL_BY>{}</CALL_BY></INTERNAL_INFO><EXTERNAL_RETRIEVAL_INFO>{}</EXTERNAL_RETRIEVAL_INFO></CONTEXT>",
            self.class, self.function, self.method, self.call_by, self.external
        )
    }

    pub fn token_count(&self) -> usize {
        estimate_tokens(&self.render())
    }

    fn sections_mut(&mut self) -> [(Section, &mut String); 5] {
        [
            (Section::Class, &mut self.class),
            (Section::Function, &mut self.function),
            (Section::Method, &mut self.method),
            (Section::CallBy, &mut self.call_by),
            (Section::External, &mut self.external),
        ]
    }

    /// If `context_tokens + focal_tokens` exceeds `budget`, truncates the
    /// single largest section's tail by the overflow amount (converted back to
    /// characters via the same ~4-chars-per-token approximation used to count
    /// them). Never rearranges sections, never recurses.
    pub fn enforce_budget(&mut self, focal_tokens: usize, budget: usize) {
        let context_tokens = self.token_count();
        let total = context_tokens + focal_tokens;
        if total <= budget {
            return;
        }
        let excess_tokens = total - budget;
        let excess_chars = excess_tokens * 4;

        let mut sections = self.sections_mut();
        let largest = sections
            .iter_mut()
            .max_by_key(|(_, s)| s.len())
            .expect("exactly five sections always present");

        let (_, content) = largest;
        if excess_chars >= content.len() {
            content.clear();
        } else {
            let cut_at = content.len() - excess_chars;
            let mut boundary = cut_at;
            while boundary > 0 && !content.is_char_boundary(boundary) {
                boundary -= 1;
            }
            content.truncate(boundary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_always_includes_all_five_tags() {
        let ctx = ContextStore::new();
        let xml = ctx.render();
        for tag in ["CLASS", "FUNCTION", "METHOD", "CALL_BY", "EXTERNAL_RETRIEVAL_INFO"] {
            assert!(xml.contains(&format!("<{tag}>")));
            assert!(xml.contains(&format!("</{tag}>")));
        }
    }

    #[test]
    fn empty_call_by_renders_sentinel() {
        let mut ctx = ContextStore::new();
        ctx.append_call_by(&[]);
        assert!(ctx.render().contains(super::SENTINEL_NEVER_CALLED));
    }

    #[test]
    fn truncates_largest_section_when_over_budget() {
        let mut ctx = ContextStore::new();
        ctx.append_function("big_one", &"x".repeat(2000));
        ctx.append_class("small", "y");
        let budget = 10;
        ctx.enforce_budget(0, budget);
        assert!(ctx.token_count() <= budget + 5);
        assert_eq!(ctx.class, "<small>y</small>\n");
    }

    #[test]
    fn under_budget_is_left_untouched() {
        let mut ctx = ContextStore::new();
        ctx.append_function("f", "short");
        let before = ctx.render();
        ctx.enforce_budget(0, 10_000);
        assert_eq!(ctx.render(), before);
    }
}
