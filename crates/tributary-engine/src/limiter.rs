//! Rate limiting
//!
//! Each source gets a rolling one-minute request budget, and a 429 with a
//! retry-after header parks the limiter until the server's deadline passes.
//! Sources configured with the same `shared_limit_key` draw on one limiter,
//! for providers that meter a whole API key rather than each endpoint.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use tributary_core::SourceDescriptor;

const WINDOW: Duration = Duration::from_secs(60);

struct State {
    // Send instants inside the rolling window, oldest first.
    window: VecDeque<Instant>,
    cooldown_until: Option<Instant>,
}

/// A rolling-window request limiter with server-signaled cooldowns
pub struct RateLimiter {
    capacity: u32,
    state: Mutex<State>,
}

impl RateLimiter {
    /// Limiter allowing `requests_per_minute` sends per rolling minute
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            capacity: requests_per_minute.max(1),
            state: Mutex::new(State {
                window: VecDeque::new(),
                cooldown_until: None,
            }),
        }
    }

    /// Wait until a request may be sent, then record the send.
    ///
    /// Blocks while a cooldown is active or the window is full; never
    /// drops or rejects.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                if let Some(until) = state.cooldown_until {
                    if now < until {
                        Some(until - now)
                    } else {
                        state.cooldown_until = None;
                        None
                    }
                } else {
                    None
                }
                .or_else(|| {
                    while let Some(front) = state.window.front() {
                        if now.duration_since(*front) >= WINDOW {
                            state.window.pop_front();
                        } else {
                            break;
                        }
                    }
                    match state.window.front() {
                        Some(oldest) if state.window.len() >= self.capacity as usize => {
                            Some(WINDOW - now.duration_since(*oldest))
                        }
                        _ => {
                            state.window.push_back(now);
                            None
                        }
                    }
                })
            };

            match wait {
                None => return,
                // Sleep outside the lock so other sources sharing the
                // limiter can observe and extend the cooldown.
                Some(delay) => tokio::time::sleep(delay).await,
            }
        }
    }

    /// Park the limiter for a server-requested delay.
    ///
    /// A longer cooldown already in place wins.
    pub async fn cooldown(&self, delay: Duration) {
        let mut state = self.state.lock().await;
        let until = Instant::now() + delay;
        state.cooldown_until = Some(match state.cooldown_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }
}

/// Hands out per-source limiters, sharing them across sources that name
/// the same `shared_limit_key`
#[derive(Default)]
pub struct LimiterRegistry {
    shared: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl LimiterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The limiter for a source, honoring its shared key if present
    pub async fn limiter_for(&self, descriptor: &SourceDescriptor) -> Arc<RateLimiter> {
        let rpm = descriptor.rate_limit.requests_per_minute;
        match &descriptor.rate_limit.shared_limit_key {
            None => Arc::new(RateLimiter::new(rpm)),
            Some(key) => {
                let mut shared = self.shared.lock().await;
                shared
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(RateLimiter::new(rpm)))
                    .clone()
            }
        }
    }
}
