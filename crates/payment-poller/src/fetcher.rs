//! Listing every message under a label, page by page.

use std::collections::HashSet;

use payment_types::MailMessage;

use crate::error::PollerResult;

/// One page of a message listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<String>,
    /// Continuation token; `None` on the last page
    pub next_page_token: Option<String>,
}

/// The mail provider operations a pass needs.
///
/// Implemented by [`crate::gmail_client::GmailClient`]; tests use an
/// in-memory provider.
#[allow(async_fn_in_trait)]
pub trait MailProvider {
    /// Map a label display name to the provider's label id (case-insensitive)
    async fn resolve_label(&self, name: &str) -> PollerResult<Option<String>>;

    /// Fetch one page of message ids carrying `label_id`
    async fn list_page(
        &self,
        label_id: &str,
        query: Option<&str>,
        page_token: Option<&str>,
    ) -> PollerResult<MessagePage>;

    /// Fetch a full message with its body decoded
    async fn get_message(&self, id: &str) -> PollerResult<MailMessage>;
}

/// All message ids under `label`, in provider order, across every page.
///
/// An unknown label or an empty label both yield an empty list.
pub async fn fetch_labeled_ids<P: MailProvider>(
    provider: &P,
    label: &str,
    query: Option<&str>,
) -> PollerResult<Vec<String>> {
    let Some(label_id) = provider.resolve_label(label).await? else {
        tracing::warn!("Label '{}' not found in mailbox", label);
        return Ok(Vec::new());
    };

    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = provider
            .list_page(&label_id, query, page_token.as_deref())
            .await?;
        pages += 1;

        for id in page.ids {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }

        match page.next_page_token {
            Some(next) if !next.is_empty() => {
                tracing::debug!("Fetched {} message id(s), getting next page...", ids.len());
                page_token = Some(next);
            }
            _ => break,
        }
    }

    tracing::info!(
        "Found {} total email(s) in '{}' label ({} page(s))",
        ids.len(),
        label,
        pages
    );
    Ok(ids)
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory provider that serves a fixed mailbox in fixed-size pages.

    use super::*;
    use crate::error::PollerError;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::time::Duration;

    pub struct FakeProvider {
        pub label_id: Option<String>,
        pub ids: Vec<String>,
        pub bodies: HashMap<String, String>,
        pub page_size: usize,
        pub list_calls: Cell<usize>,
        pub get_calls: RefCell<Vec<String>>,
        pub fail_listing: Cell<bool>,
        pub failing_ids: RefCell<HashSet<String>>,
        pub seen_queries: RefCell<Vec<Option<String>>>,
        /// Simulated round-trip time for each message fetch
        pub fetch_delay: Cell<Option<Duration>>,
    }

    impl FakeProvider {
        pub fn new(messages: &[(&str, &str)], page_size: usize) -> Self {
            Self {
                label_id: Some("Label_42".to_string()),
                ids: messages.iter().map(|(id, _)| id.to_string()).collect(),
                bodies: messages
                    .iter()
                    .map(|(id, body)| (id.to_string(), body.to_string()))
                    .collect(),
                page_size,
                list_calls: Cell::new(0),
                get_calls: RefCell::new(Vec::new()),
                fail_listing: Cell::new(false),
                failing_ids: RefCell::new(HashSet::new()),
                seen_queries: RefCell::new(Vec::new()),
                fetch_delay: Cell::new(None),
            }
        }
    }

    impl MailProvider for FakeProvider {
        async fn resolve_label(&self, name: &str) -> PollerResult<Option<String>> {
            Ok(if name.eq_ignore_ascii_case("venmo") {
                self.label_id.clone()
            } else {
                None
            })
        }

        async fn list_page(
            &self,
            label_id: &str,
            query: Option<&str>,
            page_token: Option<&str>,
        ) -> PollerResult<MessagePage> {
            assert_eq!(Some(label_id), self.label_id.as_deref());
            self.list_calls.set(self.list_calls.get() + 1);
            self.seen_queries.borrow_mut().push(query.map(str::to_string));
            if self.fail_listing.get() {
                return Err(PollerError::fetch("list messages", "connection reset"));
            }

            let start: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
            let end = (start + self.page_size).min(self.ids.len());
            Ok(MessagePage {
                ids: self.ids[start..end].to_vec(),
                next_page_token: (end < self.ids.len()).then(|| end.to_string()),
            })
        }

        async fn get_message(&self, id: &str) -> PollerResult<MailMessage> {
            self.get_calls.borrow_mut().push(id.to_string());
            if let Some(delay) = self.fetch_delay.get() {
                tokio::time::sleep(delay).await;
            }
            if self.failing_ids.borrow().contains(id) {
                return Err(PollerError::fetch("get message", "500"));
            }
            let body = self.bodies.get(id).cloned().unwrap_or_default();
            Ok(MailMessage::new(id, body))
        }
    }
}
