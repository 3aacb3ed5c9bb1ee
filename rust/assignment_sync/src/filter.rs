//! Search/filter controller.
//!
//! Free-text search is debounced and length-gated before it reaches the
//! store; the category selector is applied immediately.

use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::types::AssignableItem;

/// Quiet period after the last keystroke before a search term takes effect.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Shorter (trimmed) terms are treated as "no filter".
pub const MIN_SEARCH_LEN: usize = 3;

/// Gate a raw search term: trimmed, and empty unless at least `min_len` chars.
pub fn effective_term(raw: &str, min_len: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() >= min_len {
        trimmed.to_string()
    } else {
        String::new()
    }
}

/// The active filter predicate over the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    category: Option<String>,
    /// Lowercased effective term; empty means no text filter.
    needle: String,
}

impl SearchFilter {
    pub fn new(category: Option<&str>, effective_term: &str) -> Self {
        Self {
            category: category.map(str::to_string),
            needle: effective_term.to_lowercase(),
        }
    }

    /// Item passes if it is in the selected category (when one is set) and
    /// any display field contains the term case-insensitively (when set).
    pub fn matches(&self, item: &AssignableItem) -> bool {
        if let Some(category) = &self.category {
            if item.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        self.needle.is_empty()
            || item
                .display_fields()
                .any(|field| field.to_lowercase().contains(&self.needle))
    }

    pub fn is_unfiltered(&self) -> bool {
        self.category.is_none() && self.needle.is_empty()
    }
}

// =============================================================================
// Debounce
// =============================================================================

/// Trailing-edge debounce state machine for raw search text.
///
/// Time is passed in explicitly so the state machine runs without a
/// runtime; [`SearchController`] drives it from a tokio task.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<(String, Instant)>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Record a keystroke. Restarts the quiet period.
    pub fn push(&mut self, raw: impl Into<String>, now: Instant) {
        self.pending = Some((raw.into(), now + self.delay));
    }

    /// Take the pending text if its quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        match &self.pending {
            Some((_, deadline)) if *deadline <= now => self.pending.take().map(|(raw, _)| raw),
            _ => None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }
}

/// Async driver turning a stream of keystrokes into effective search terms.
pub struct SearchController {
    debouncer: Debouncer,
    min_len: usize,
    last_applied: Option<String>,
}

impl SearchController {
    pub fn new(delay: Duration, min_len: usize) -> Self {
        Self {
            debouncer: Debouncer::new(delay),
            min_len,
            last_applied: None,
        }
    }

    /// Consume raw search text until the sender is dropped, calling `apply`
    /// with each new effective term once input has been quiet for the
    /// debounce delay. Repeated identical terms are applied once.
    ///
    /// Text still pending when the channel closes is discarded.
    pub async fn run<F>(mut self, mut input: mpsc::Receiver<String>, mut apply: F)
    where
        F: FnMut(String),
    {
        loop {
            let deadline = self.debouncer.deadline();
            tokio::select! {
                raw = input.recv() => match raw {
                    Some(raw) => self.debouncer.push(raw, Instant::now()),
                    None => {
                        debug!("search input closed");
                        return;
                    }
                },
                _ = wait_for(deadline) => {
                    if let Some(raw) = self.debouncer.poll(Instant::now()) {
                        let term = effective_term(&raw, self.min_len);
                        if self.last_applied.as_deref() != Some(term.as_str()) {
                            debug!("effective search term: {:?}", term);
                            self.last_applied = Some(term.clone());
                            apply(term);
                        }
                    }
                }
            }
        }
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    fn catalog() -> Vec<AssignableItem> {
        vec![
            AssignableItem::new("1", Some("Users"), "Read"),
            AssignableItem::new("2", Some("Roles"), "Write"),
        ]
    }

    fn filtered(filter: &SearchFilter) -> Vec<String> {
        catalog()
            .into_iter()
            .filter(|item| filter.matches(item))
            .map(|item| item.id)
            .collect()
    }

    #[test]
    fn test_short_term_is_no_filter() {
        let term = effective_term("us", MIN_SEARCH_LEN);
        assert_eq!(term, "");
        assert_eq!(filtered(&SearchFilter::new(None, &term)), vec!["1", "2"]);
    }

    #[test]
    fn test_three_chars_filter_case_insensitively() {
        let term = effective_term("Use", MIN_SEARCH_LEN);
        assert_eq!(filtered(&SearchFilter::new(None, &term)), vec!["1"]);

        let term = effective_term("wRi", MIN_SEARCH_LEN);
        assert_eq!(filtered(&SearchFilter::new(None, &term)), vec!["2"]);
    }

    #[test]
    fn test_term_is_trimmed_before_gating() {
        assert_eq!(effective_term("  us  ", MIN_SEARCH_LEN), "");
        assert_eq!(effective_term("  use ", MIN_SEARCH_LEN), "use");
    }

    #[test]
    fn test_description_is_searched() {
        let item = AssignableItem::new("9", Some("Sales"), "Export").with_description("Download CSV");
        assert!(SearchFilter::new(None, "csv").matches(&item));
        assert!(!SearchFilter::new(None, "pdf").matches(&item));
    }

    #[test]
    fn test_category_selector_combines_with_term() {
        assert_eq!(filtered(&SearchFilter::new(Some("Roles"), "")), vec!["2"]);
        assert!(filtered(&SearchFilter::new(Some("Roles"), "read")).is_empty());
        assert!(SearchFilter::new(None, "").is_unfiltered());
    }

    #[test]
    fn test_debouncer_restarts_on_keystroke() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(SEARCH_DEBOUNCE);
        debouncer.push("us", start);
        debouncer.push("use", start + Duration::from_millis(200));

        assert_eq!(debouncer.poll(start + Duration::from_millis(300)), None);
        assert_eq!(
            debouncer.poll(start + Duration::from_millis(500)),
            Some("use".to_string())
        );
        assert_eq!(debouncer.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_applies_after_quiet_period() {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let sink = applied.clone();
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(
            SearchController::new(SEARCH_DEBOUNCE, MIN_SEARCH_LEN)
                .run(rx, move |term| sink.lock().unwrap().push(term)),
        );

        tx.send("u".to_string()).await.unwrap();
        tx.send("us".to_string()).await.unwrap();
        tx.send("use".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(applied.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(*applied.lock().unwrap(), vec!["use".to_string()]);

        // Same effective term again is not re-applied.
        tx.send(" use ".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(applied.lock().unwrap().len(), 1);

        drop(tx);
        handle.await.unwrap();
    }

    proptest! {
        #[test]
        fn prop_short_terms_never_filter(raw in "[a-zA-Z ]{0,2}") {
            let term = effective_term(&raw, MIN_SEARCH_LEN);
            prop_assert_eq!(filtered(&SearchFilter::new(None, &term)).len(), 2);
        }
    }
}
