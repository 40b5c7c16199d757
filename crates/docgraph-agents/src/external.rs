use async_trait::async_trait;

/// Reference-answering collaborator the Searcher consults for `<RETRIEVAL>`
/// queries. The actual web-backed implementation is out of scope for this
/// crate; only the interface and a conservative offline stub live here.
#[async_trait]
pub trait ExternalRetrieval: Send + Sync {
    async fn answer(&self, query: &str) -> Result<String, String>;
}

/// Always reports failure, matching the "external queries are rare and the
/// Searcher degrades gracefully" design: with no network-backed provider
/// configured, every query comes back as a recorded error string rather than
/// aborting the run.
pub struct UnavailableExternalRetrieval;

#[async_trait]
impl ExternalRetrieval for UnavailableExternalRetrieval {
    async fn answer(&self, query: &str) -> Result<String, String> {
        Err(format!("external retrieval is not configured (query: {query})"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_provider_always_errors() {
        let provider = UnavailableExternalRetrieval;
        assert!(provider.answer("what is quicksort").await.is_err());
    }
}
