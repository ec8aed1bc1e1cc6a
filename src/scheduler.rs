use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Whether a post is due at `now`.
///
/// Never posted means due. Otherwise a delay in `[min_delay, max_delay]` minutes
/// is drawn on every call, so near the boundary the answer may flip between calls.
pub fn is_due<R: Rng + ?Sized>(
    rng: &mut R,
    now: DateTime<Utc>,
    last_post_time: Option<DateTime<Utc>>,
    min_delay: u32,
    max_delay: u32,
) -> bool {
    let last = match last_post_time {
        Some(t) => t,
        None => return true,
    };

    let (lo, hi) = if min_delay <= max_delay {
        (min_delay, max_delay)
    } else {
        (max_delay, min_delay)
    };
    let delay = rng.gen_range(lo..=hi);

    now >= last + Duration::minutes(i64::from(delay))
}

#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    last_post_time: Option<DateTime<Utc>>,
}

impl Scheduler {
    pub fn new(last_post_time: Option<DateTime<Utc>>) -> Self {
        Self { last_post_time }
    }

    pub fn last_post_time(&self) -> Option<DateTime<Utc>> {
        self.last_post_time
    }

    pub fn is_due<R: Rng + ?Sized>(&self, rng: &mut R, now: DateTime<Utc>, min_delay: u32, max_delay: u32) -> bool {
        is_due(rng, now, self.last_post_time, min_delay, max_delay)
    }

    /// Only call after a confirmed successful delivery.
    pub fn mark_posted(&mut self, at: DateTime<Utc>) {
        self.last_post_time = Some(at);
    }
}
