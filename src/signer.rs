use crate::content_store::ContentStore;
use crate::error::{PaygenError, Result};
use crate::types::SignerResult;
use serde_json::Value;

/// Reads one signer result blob and parses it.
#[derive(Debug, Clone)]
pub struct SignerResultFetcher<S> {
    store: S,
}

impl<S> SignerResultFetcher<S>
where
    S: ContentStore,
{
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Fetch the result stored at `result_url`.
    ///
    /// Returns `Ok(None)` while the blob does not exist.
    ///
    /// # Errors
    /// Returns `PaygenError::MalformedResult` when the blob exists but is not
    /// JSON (signers may expose partially written results), or the content
    /// store error when the read itself fails.
    pub async fn fetch(&self, result_url: &str) -> Result<Option<SignerResult>> {
        let Some(body) = self.store.cat(result_url).await? else {
            return Ok(None);
        };

        serde_json::from_slice::<Value>(&body)
            .map(|document| Some(SignerResult::from_value(&document)))
            .map_err(|err| PaygenError::MalformedResult {
                url: result_url.to_string(),
                reason: err.to_string(),
            })
    }
}
