//! Reconnection backoff strategies for use with [`crate::config::TrackerConfig::with_backoff`].
//!
//! Three strategies are provided:
//!
//! 1. Constant
//! 2. Linear (the tracker default, `1s × attempt`)
//! 3. Exponential
//!
//! each of which can optionally be modified with a random [`Jitter`] and clamped from below with
//! [`BackoffStrategy::with_min`].
//!
//! # Example
//!
//! ```
//! # use jobstream::prelude::*;
//! # use chrono::TimeDelta;
//! let strategy = BackoffStrategy::linear(TimeDelta::seconds(1))
//!     .with_max(TimeDelta::seconds(5))
//!     .with_jitter(Jitter::Absolute(TimeDelta::milliseconds(250)));
//!
//! assert!(strategy.backoff(2) >= TimeDelta::milliseconds(1750));
//! assert!(strategy.backoff(2) <= TimeDelta::milliseconds(2250));
//! // The max is applied before the jitter
//! assert!(strategy.backoff(10) <= TimeDelta::milliseconds(5250));
//! ```

use chrono::TimeDelta;
use rand::Rng;

/// Type that can be used to implement a reconnection backoff.
pub trait Strategy {
    /// Given the 1-indexed reconnection attempt returns the [`TimeDelta`] to wait before the
    /// channel is opened again.
    fn backoff(&self, attempt: u16) -> TimeDelta;
}

/// Constant backoff strategy.
///
/// __Note:__ This type cannot be constructed directly, instead [`BackoffStrategy::constant`]
/// should be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constant {
    delay: TimeDelta,
}

impl Strategy for Constant {
    fn backoff(&self, _attempt: u16) -> TimeDelta {
        self.delay
    }
}

/// Linear backoff strategy: `factor × attempt`.
///
/// __Note:__ This type cannot be constructed directly, instead [`BackoffStrategy::linear`]
/// should be used.
///
/// # Example
///
/// ```
/// # use jobstream::prelude::*;
/// # use chrono::TimeDelta;
/// let strategy = BackoffStrategy::linear(TimeDelta::seconds(1));
///
/// assert_eq!(strategy.backoff(1), TimeDelta::seconds(1));
/// assert_eq!(strategy.backoff(2), TimeDelta::seconds(2));
/// assert_eq!(strategy.backoff(3), TimeDelta::seconds(3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Linear {
    factor: TimeDelta,
    max: Option<TimeDelta>,
}

impl Strategy for Linear {
    fn backoff(&self, attempt: u16) -> TimeDelta {
        let mut backoff = self.factor * i32::from(attempt);
        if let Some(max) = self.max {
            backoff = backoff.min(max);
        }
        backoff
    }
}

/// Exponential backoff strategy: `base × 2^(attempt - 1)`.
///
/// It is advisable to set a maximum with [`BackoffStrategy::with_max`].
///
/// __Note:__ This type cannot be constructed directly, instead [`BackoffStrategy::exponential`]
/// should be used.
///
/// # Example
///
/// ```
/// # use jobstream::prelude::*;
/// # use chrono::TimeDelta;
/// let strategy =
///     BackoffStrategy::exponential(TimeDelta::seconds(1)).with_max(TimeDelta::seconds(10));
///
/// assert_eq!(strategy.backoff(1), TimeDelta::seconds(1));
/// assert_eq!(strategy.backoff(2), TimeDelta::seconds(2));
/// assert_eq!(strategy.backoff(3), TimeDelta::seconds(4));
/// assert_eq!(strategy.backoff(4), TimeDelta::seconds(8));
/// assert_eq!(strategy.backoff(5), TimeDelta::seconds(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exponential {
    base: TimeDelta,
    max: Option<TimeDelta>,
}

impl Exponential {
    const MAX_EXPONENT: u16 = 30;
}

impl Strategy for Exponential {
    fn backoff(&self, attempt: u16) -> TimeDelta {
        let exponent = attempt.saturating_sub(1).min(Self::MAX_EXPONENT);
        let mut backoff = self.base * (1_i32 << exponent);
        if let Some(max) = self.max {
            backoff = backoff.min(max);
        }
        backoff
    }
}

/// A random jitter to be applied to a given backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// A random jitter in the range `-delta..=delta`.
    Absolute(TimeDelta),
    /// A random jitter as a proportion of the current backoff.
    Relative(f64),
}

impl Jitter {
    fn apply_jitter(&self, value: TimeDelta) -> TimeDelta {
        let milliseconds = match self {
            Self::Absolute(delta) => delta.num_milliseconds(),
            Self::Relative(ratio) => (value.num_milliseconds() as f64 * ratio).round() as i64,
        }
        .abs();
        let jitter = rand::thread_rng().gen_range(-milliseconds..=milliseconds);
        value + TimeDelta::milliseconds(jitter)
    }
}

/// A reconnection backoff made of a base [`Strategy`] and optional jitter and minimum.
///
/// All of the constructors and configuration functions are `const` so a strategy can be held in
/// a constant, see [`crate::config::DEFAULT_BACKOFF_STRATEGY`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffStrategy<T: Strategy> {
    strategy: T,
    jitter: Option<Jitter>,
    min: TimeDelta,
}

impl BackoffStrategy<Constant> {
    /// Creates a [`BackoffStrategy`] that always waits `delay`.
    pub const fn constant(delay: TimeDelta) -> Self {
        Self::new(Constant { delay })
    }
}

impl BackoffStrategy<Linear> {
    /// Creates a [`BackoffStrategy`] growing linearly with each reconnection attempt.
    pub const fn linear(factor: TimeDelta) -> Self {
        Self::new(Linear { factor, max: None })
    }

    /// Clamps the value returned by [`Strategy::backoff`] to at most `max_delay`.
    pub const fn with_max(mut self, max_delay: TimeDelta) -> Self {
        self.strategy.max = Some(max_delay);
        self
    }
}

impl BackoffStrategy<Exponential> {
    /// Creates a [`BackoffStrategy`] doubling with each reconnection attempt.
    pub const fn exponential(base: TimeDelta) -> Self {
        Self::new(Exponential { base, max: None })
    }

    /// Clamps the value returned by [`Strategy::backoff`] to at most `max_delay`.
    pub const fn with_max(mut self, max_delay: TimeDelta) -> Self {
        self.strategy.max = Some(max_delay);
        self
    }
}

impl<T> BackoffStrategy<T>
where
    T: Strategy,
{
    /// Creates a [`BackoffStrategy`] from a custom [`Strategy`].
    ///
    /// More commonly this is constructed via [`BackoffStrategy::constant`],
    /// [`BackoffStrategy::linear`] or [`BackoffStrategy::exponential`].
    pub const fn new(strategy: T) -> Self {
        Self {
            strategy,
            jitter: None,
            min: TimeDelta::zero(),
        }
    }

    /// Add a random jitter, see [`Jitter`].
    pub const fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Never wait less than `min`, even after jitter.
    pub const fn with_min(mut self, min: TimeDelta) -> Self {
        self.min = min;
        self
    }
}

impl<T> Strategy for BackoffStrategy<T>
where
    T: Strategy,
{
    fn backoff(&self, attempt: u16) -> TimeDelta {
        let mut backoff = self.strategy.backoff(attempt);

        if let Some(jitter) = self.jitter {
            backoff = jitter.apply_jitter(backoff);
        }

        backoff.max(self.min)
    }
}
