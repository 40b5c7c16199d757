/// Approximates token count without pulling in a tokenizer/model asset: about
/// 4 characters per token for English-and-code text, which is close enough for
/// budget and rate-limit accounting. Not exact — never used for anything that
/// requires matching a provider's real tokenizer.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    (chars / 4).max(if text.is_empty() { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn scales_roughly_with_length() {
        let short = estimate_tokens("hello");
        let long = estimate_tokens(&"hello ".repeat(100));
        assert!(long > short * 50);
    }
}
