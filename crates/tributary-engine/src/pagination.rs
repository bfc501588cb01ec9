//! Pagination
//!
//! One driver covers the three paging styles sources declare: a cursor URL
//! embedded in each response, an offset query parameter, or a 1-based page
//! number. The driver is a small state machine: ask it for the parameters
//! of the next request, hand it each response, and it says whether and how
//! to continue.
//!
//! Stop signals, strongest first: a reported total that has been reached,
//! a missing cursor, a short or empty page.

use serde_json::Value;

use tributary_core::descriptor::PaginationConfig;
use tributary_core::value::get_path;

/// What to do after a page has been consumed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Request the next page with fresh [`PaginationDriver::params`]
    NextParams,
    /// Request this cursor URL next
    NextUrl(String),
    /// Pagination is complete
    Done,
}

/// Tracks paging progress for one API source
pub struct PaginationDriver {
    config: PaginationConfig,
    page: u64,
    fetched: u64,
    last_cursor: Option<String>,
}

impl PaginationDriver {
    /// Driver for a source's pagination config; `None` means single-page
    pub fn new(config: Option<PaginationConfig>) -> Self {
        Self {
            config: config.unwrap_or_default(),
            page: 1,
            fetched: 0,
            last_cursor: None,
        }
    }

    /// Records fetched so far
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    /// Query parameters for the next request
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(param) = &self.config.page_num_param {
            params.push((param.clone(), self.page.to_string()));
        }
        if let Some(param) = &self.config.skip_records_param {
            let offset = self.config.initial_offset + self.fetched;
            params.push((param.clone(), offset.to_string()));
        }
        params
    }

    /// Consume one response and decide how to continue.
    ///
    /// `batch_len` is the number of records the page yielded after
    /// records_path extraction.
    pub fn advance(&mut self, body: &Value, batch_len: u64) -> Advance {
        self.fetched += batch_len;
        self.page += 1;

        // A reported total is authoritative over every other signal.
        if let Some(path) = &self.config.total_records_key {
            if let Some(total) = get_path(body, path).and_then(as_count) {
                if self.fetched >= total {
                    return Advance::Done;
                }
                if self.config.next_page_url.is_none() && !self.config.uses_params() {
                    // Total says more exists but nothing tells us how to
                    // ask for it; treat as single-page rather than loop.
                    return Advance::Done;
                }
            }
        }

        // Cursor mode continues even through an empty page; the server
        // owns the stop signal. A cursor identical to the last one is a
        // loop, not a next page.
        if let Some(path) = &self.config.next_page_url {
            return match get_path(body, path).and_then(Value::as_str) {
                Some(url) if !url.is_empty() => {
                    if self.last_cursor.as_deref() == Some(url) {
                        Advance::Done
                    } else {
                        self.last_cursor = Some(url.to_string());
                        Advance::NextUrl(url.to_string())
                    }
                }
                _ => Advance::Done,
            };
        }

        if self.config.uses_params() {
            // An empty or short page ends offset/page-number pagination;
            // there is no other stop signal in these modes.
            if batch_len == 0 {
                return Advance::Done;
            }
            if let Some(batch_size) = self.config.batch_size {
                if batch_len < batch_size {
                    return Advance::Done;
                }
            }
            return Advance::NextParams;
        }

        Advance::Done
    }
}

/// Totals arrive as numbers or numeric strings depending on the API.
fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
