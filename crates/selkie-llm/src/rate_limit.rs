//! Client-side provider rate limiting
//!
//! TigerStyle: Explicit capacity, no unbounded bursts.
//!
//! One token bucket per provider. Callers either take a token immediately or
//! learn how long to wait; the pipeline sleeps through its `TimeProvider`,
//! so simulated time works.

use std::sync::Arc;
use std::sync::Mutex;

use selkie_core::TimeProvider;

/// Token bucket rate limiter
#[derive(Debug)]
pub struct TokenBucket {
    /// Maximum tokens the bucket can hold
    capacity: f64,
    /// Tokens added per second
    refill_per_sec: f64,
    state: Mutex<BucketState>,
    time: Arc<dyn TimeProvider>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill_ms: u64,
}

impl TokenBucket {
    /// Create a bucket starting full
    pub fn new(capacity: u32, refill_per_sec: f64, time: Arc<dyn TimeProvider>) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        assert!(refill_per_sec > 0.0, "refill rate must be positive");

        let now = time.now_ms();
        Self {
            capacity: f64::from(capacity),
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill_ms: now,
            }),
            time,
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = self.time.now_ms();
        let elapsed_ms = now.saturating_sub(state.last_refill_ms);
        if elapsed_ms > 0 {
            let added = (elapsed_ms as f64 / 1000.0) * self.refill_per_sec;
            state.tokens = (state.tokens + added).min(self.capacity);
            state.last_refill_ms = now;
        }
    }

    /// Try to take one token; returns `true` when admitted
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().expect("bucket lock poisoned");
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Milliseconds until one token will be available, 0 when admitted now
    pub fn wait_ms(&self) -> u64 {
        let mut state = self.state.lock().expect("bucket lock poisoned");
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            return 0;
        }
        let deficit = 1.0 - state.tokens;
        ((deficit / self.refill_per_sec) * 1000.0).ceil() as u64
    }

    /// Take one token, sleeping until one is available
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire() {
                return;
            }
            let wait = self.wait_ms().max(1);
            self.time.sleep_ms(wait).await;
        }
    }
}

/// Provider decorator that takes a bucket token before every call
///
/// Wraps either provider kind; the bucket is per wrapped provider, matching
/// the one-bucket-per-provider policy.
pub struct RateLimited<P> {
    inner: P,
    bucket: TokenBucket,
}

impl<P> RateLimited<P> {
    /// Wrap a provider with the given bucket
    pub fn new(inner: P, bucket: TokenBucket) -> Self {
        Self { inner, bucket }
    }
}

#[async_trait::async_trait]
impl<P: crate::provider::EmbeddingProvider> crate::provider::EmbeddingProvider for RateLimited<P> {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn embed_batch(&self, texts: &[&str]) -> selkie_core::Result<Vec<Vec<f32>>> {
        self.bucket.acquire().await;
        self.inner.embed_batch(texts).await
    }
}

#[async_trait::async_trait]
impl<P: crate::provider::GenerationProvider> crate::provider::GenerationProvider for RateLimited<P> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
    ) -> selkie_core::Result<String> {
        self.bucket.acquire().await;
        self.inner.generate(prompt, model, max_tokens).await
    }

    async fn classify(
        &self,
        text: &str,
        taxonomy: &[String],
        top_k: usize,
    ) -> selkie_core::Result<Vec<String>> {
        self.bucket.acquire().await;
        self.inner.classify(text, taxonomy, top_k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selkie_core::ManualClock;

    #[test]
    fn test_starts_full() {
        let clock = Arc::new(ManualClock::new(0));
        let bucket = TokenBucket::new(3, 1.0, clock);

        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_refills_over_time() {
        let clock = Arc::new(ManualClock::new(0));
        let bucket = TokenBucket::new(1, 2.0, clock.clone());

        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        // 2 tokens/sec: 500ms buys one token back.
        clock.advance_ms(500);
        assert!(bucket.try_acquire());
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let clock = Arc::new(ManualClock::new(0));
        let bucket = TokenBucket::new(2, 10.0, clock.clone());

        clock.advance_ms(60_000);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_wait_ms() {
        let clock = Arc::new(ManualClock::new(0));
        let bucket = TokenBucket::new(1, 1.0, clock);

        assert_eq!(bucket.wait_ms(), 0);
        assert!(bucket.try_acquire());
        let wait = bucket.wait_ms();
        assert!(wait > 0 && wait <= 1000, "wait was {}ms", wait);
    }

    #[tokio::test]
    async fn test_acquire_sleeps_until_token() {
        let clock = Arc::new(ManualClock::new(0));
        let bucket = TokenBucket::new(1, 1.0, clock.clone());

        bucket.acquire().await;
        bucket.acquire().await; // advances the manual clock while sleeping
        assert!(clock.now_ms() >= 1000);
    }

    #[tokio::test]
    async fn test_rate_limited_provider_waits_for_tokens() {
        use crate::provider::EmbeddingProvider;
        use crate::sim::SimEmbeddingProvider;

        let clock = Arc::new(ManualClock::new(0));
        let bucket = TokenBucket::new(1, 1.0, clock.clone());
        let provider = RateLimited::new(SimEmbeddingProvider::new(8), bucket);

        // First call spends the bucket; the second waits ~1s of sim time.
        provider.embed("one").await.unwrap();
        provider.embed("two").await.unwrap();
        assert!(clock.now_ms() >= 1000);
        assert_eq!(provider.dimension(), 8);
    }
}
