use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::RateLimitConfig;

/// A provider-facing rate limiter: something the LLM layer can ask "may I send
/// this request" and "account for these tokens" without caring how limits are
/// enforced underneath.
pub trait RateLimiter: Send + Sync {
    /// Blocks (synchronously sleeping the calling thread) until a request of
    /// `estimated_input_tokens` would fit within the current window.
    fn wait_if_needed(&self, estimated_input_tokens: u32);

    /// Records a completed request's actual token usage.
    fn record_request(&self, input_tokens: u32, output_tokens: u32);
}

struct Window {
    timestamps: VecDeque<Instant>,
    input_tokens: VecDeque<(Instant, u32)>,
    output_tokens: VecDeque<(Instant, u32)>,
}

impl Window {
    fn new() -> Self {
        Self {
            timestamps: VecDeque::new(),
            input_tokens: VecDeque::new(),
            output_tokens: VecDeque::new(),
        }
    }
}

/// A 60-second sliding-window limiter over request count, input tokens and
/// output tokens, each reduced by `buffer_percentage` to leave headroom for
/// estimation error. One instance is held per configured provider.
pub struct SlidingWindowRateLimiter {
    requests_per_minute: u32,
    input_tokens_per_minute: u32,
    output_tokens_per_minute: u32,
    window: Mutex<Window>,
}

const WINDOW: Duration = Duration::from_secs(60);

impl SlidingWindowRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let shrink = |n: u32| -> u32 {
            let reduced = (n as f64) * (1.0 - config.buffer_percentage);
            reduced.max(1.0) as u32
        };
        Self {
            requests_per_minute: shrink(config.requests_per_minute),
            input_tokens_per_minute: shrink(config.input_tokens_per_minute),
            output_tokens_per_minute: shrink(config.output_tokens_per_minute),
            window: Mutex::new(Window::new()),
        }
    }

    fn clean_old_entries(window: &mut Window, now: Instant) {
        while window
            .timestamps
            .front()
            .is_some_and(|t| now.duration_since(*t) > WINDOW)
        {
            window.timestamps.pop_front();
        }
        while window
            .input_tokens
            .front()
            .is_some_and(|(t, _)| now.duration_since(*t) > WINDOW)
        {
            window.input_tokens.pop_front();
        }
        while window
            .output_tokens
            .front()
            .is_some_and(|(t, _)| now.duration_since(*t) > WINDOW)
        {
            window.output_tokens.pop_front();
        }
    }

    fn usage_count(entries: &VecDeque<(Instant, u32)>) -> u32 {
        entries.iter().map(|(_, n)| n).sum()
    }
}

impl RateLimiter for SlidingWindowRateLimiter {
    fn wait_if_needed(&self, estimated_input_tokens: u32) {
        loop {
            let now = Instant::now();
            let wait_for = {
                let mut window = self.window.lock();
                Self::clean_old_entries(&mut window, now);

                let requests_ok = (window.timestamps.len() as u32) < self.requests_per_minute;
                let input_ok = Self::usage_count(&window.input_tokens) + estimated_input_tokens
                    <= self.input_tokens_per_minute;
                let output_ok =
                    Self::usage_count(&window.output_tokens) <= self.output_tokens_per_minute;

                if requests_ok && input_ok && output_ok {
                    None
                } else {
                    let oldest = [
                        window.timestamps.front().copied(),
                        window.input_tokens.front().map(|(t, _)| *t),
                        window.output_tokens.front().map(|(t, _)| *t),
                    ]
                    .into_iter()
                    .flatten()
                    .min();
                    oldest.map(|t| WINDOW.saturating_sub(now.duration_since(t)))
                }
            };

            match wait_for {
                None => return,
                Some(d) if d.is_zero() => return,
                Some(d) => {
                    tracing::debug!(wait_ms = d.as_millis(), "rate limiter backing off");
                    std::thread::sleep(d);
                }
            }
        }
    }

    fn record_request(&self, input_tokens: u32, output_tokens: u32) {
        let now = Instant::now();
        let mut window = self.window.lock();
        window.timestamps.push_back(now);
        window.input_tokens.push_back((now, input_tokens));
        window.output_tokens.push_back((now, output_tokens));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: 10,
            input_tokens_per_minute: 1_000,
            output_tokens_per_minute: 1_000,
            buffer_percentage: 0.0,
            input_price_per_million: 0.0,
            output_price_per_million: 0.0,
        }
    }

    #[test]
    fn allows_requests_under_budget() {
        let limiter = SlidingWindowRateLimiter::new(&config());
        for _ in 0..5 {
            limiter.wait_if_needed(10);
            limiter.record_request(10, 10);
        }
    }

    #[test]
    fn does_not_block_when_window_has_room() {
        let limiter = SlidingWindowRateLimiter::new(&config());
        let start = Instant::now();
        limiter.wait_if_needed(5);
        limiter.record_request(5, 5);
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
