//! Named rate limiter enforcing a ceiling over a persisted window.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use super::timestamp::{normalize, TimestampInput};
use super::window::{Snapshot, Window};
use crate::config::{LimiterConfig, WindowConfig};
use crate::error::{BucketgateError, Result, ValidationError};
use crate::store::Store;

/// Whether a limiter owns its window yet.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowState {
    /// Constructed, nothing loaded or recorded.
    Uninitialized,
    /// Owns a window; it is only ever mutated in place from here on.
    Hydrated(Window),
}

impl WindowState {
    /// The owned window, if any.
    pub fn window(&self) -> Option<&Window> {
        match self {
            WindowState::Hydrated(window) => Some(window),
            WindowState::Uninitialized => None,
        }
    }

    /// Borrow the window, building a fresh one from `config` on first use.
    fn get_or_build(&mut self, config: &WindowConfig) -> std::result::Result<&mut Window, ValidationError> {
        match self {
            WindowState::Hydrated(window) => Ok(window),
            WindowState::Uninitialized => {
                let window = Window::from_config(config)?;
                debug!(
                    unit = %config.unit,
                    size = config.size,
                    width = config.width,
                    "Creating new window"
                );
                *self = WindowState::Hydrated(window);
                // Hydrated now, so this takes the first arm.
                self.get_or_build(config)
            }
        }
    }
}

/// A named limiter admitting costs while the window aggregate stays within `max`.
///
/// The check-then-record sequence in [`RateLimiter::update`] is not atomic
/// with respect to the store. Two limiters sharing a name and a store can
/// both admit against the same aggregate; callers needing exactness must
/// serialize access per name.
pub struct RateLimiter {
    name: String,
    max: f64,
    window_config: WindowConfig,
    store: Arc<dyn Store>,
    state: WindowState,
}

impl RateLimiter {
    /// Create a limiter from validated configuration. No window is built yet.
    pub fn new(config: LimiterConfig) -> std::result::Result<Self, ValidationError> {
        config.validate()?;

        let store = config.store.ok_or(ValidationError::MissingStore)?;
        let window_config = config.window.ok_or(ValidationError::MissingWindow)?;

        Ok(Self {
            name: config.name,
            max: config.max,
            window_config,
            store,
            state: WindowState::Uninitialized,
        })
    }

    /// Create a limiter and hydrate it from whatever the store holds under its name.
    pub async fn load(config: LimiterConfig) -> Result<Self> {
        let name = config.name.clone();
        Self::load_from_store(config)
            .await
            .map_err(|e| BucketgateError::load(&name, e))
    }

    async fn load_from_store(config: LimiterConfig) -> Result<Self> {
        if config.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        let store = config.store.clone().ok_or(ValidationError::MissingStore)?;

        let snapshot = store.get(&config.name).await?;
        debug!(
            limiter = %config.name,
            found = snapshot.is_some(),
            "Loaded window snapshot"
        );

        let mut limiter = Self::new(config)?;
        limiter.set(snapshot)?;
        Ok(limiter)
    }

    /// Hydrate the limiter from `snapshot`, or fresh from configuration if
    /// there is none. Does nothing once a window is owned.
    pub fn set(&mut self, snapshot: Option<Snapshot>) -> std::result::Result<(), ValidationError> {
        if let WindowState::Hydrated(_) = self.state {
            trace!(limiter = %self.name, "Window already hydrated, ignoring snapshot");
            return Ok(());
        }

        let window = match snapshot {
            Some(snapshot) => Window::from_snapshot(snapshot)?,
            None => Window::from_config(&self.window_config)?,
        };
        debug!(
            limiter = %self.name,
            aggregate = window.value_of(),
            "Hydrated window"
        );
        self.state = WindowState::Hydrated(window);
        Ok(())
    }

    /// Admit `value` at `timestamp` if the aggregate stays within `max`.
    ///
    /// Returns `Ok(false)` when the cost is rejected; nothing is recorded or
    /// persisted in that case. Errors are reserved for invalid input and for
    /// failures building the window or persisting it.
    pub async fn update(&mut self, value: f64, timestamp: impl Into<TimestampInput>) -> Result<bool> {
        if !value.is_finite() {
            return Err(ValidationError::NotANumber.into());
        }
        if value <= 0.0 {
            return Err(ValidationError::NonPositiveCost(value).into());
        }
        let timestamp = normalize(timestamp)?;

        let name = &self.name;
        let window = self
            .state
            .get_or_build(&self.window_config)
            .map_err(|e| BucketgateError::update(name, e))?;

        let aggregate = window.value_of();
        trace!(
            limiter = %name,
            value = value,
            aggregate = aggregate,
            max = self.max,
            "Checking rate limit"
        );

        if aggregate + value > self.max {
            debug!(
                limiter = %name,
                value = value,
                aggregate = aggregate,
                max = self.max,
                "Rate limit exceeded"
            );
            return Ok(false);
        }

        window.update(value, timestamp)?;
        let snapshot = window.to_snapshot();
        self.store
            .set(name, &snapshot)
            .await
            .map_err(|e| BucketgateError::update(name, e))?;

        Ok(true)
    }

    /// Rotate the window to `timestamp` without recording a cost, then persist it.
    pub async fn update_time(&mut self, timestamp: impl Into<TimestampInput>) -> Result<()> {
        let timestamp = normalize(timestamp)?;

        let name = &self.name;
        let window = self
            .state
            .get_or_build(&self.window_config)
            .map_err(|e| BucketgateError::update(name, e))?;

        let shifted = window.advance(timestamp)?;
        trace!(limiter = %name, shifted = shifted, "Advanced window");

        let snapshot = window.to_snapshot();
        self.store
            .set(name, &snapshot)
            .await
            .map_err(|e| BucketgateError::update(name, e))
    }

    /// Current aggregate, or `None` if no window has been built yet.
    pub fn value_of(&self) -> Option<f64> {
        self.state.window().map(Window::value_of)
    }

    /// Capacity left before `max`, or `None` if no window has been built yet.
    pub fn remaining(&self) -> Option<f64> {
        self.value_of().map(|v| (self.max - v).max(0.0))
    }

    /// Key the window state is persisted under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ceiling on the window aggregate.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Shape used when a fresh window is built.
    pub fn window_config(&self) -> &WindowConfig {
        &self.window_config
    }

    /// Whether a window is owned yet.
    pub fn state(&self) -> &WindowState {
        &self.state
    }

    /// The owned window, or `None` before the first hydration.
    pub fn window(&self) -> Option<&Window> {
        self.state.window()
    }

    /// `true` once a window has been loaded, set or built.
    pub fn is_hydrated(&self) -> bool {
        matches!(self.state, WindowState::Hydrated(_))
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("max", &self.max)
            .field("window_config", &self.window_config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
