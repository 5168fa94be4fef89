use crate::config::AfkConfig;
use crate::math::{approach, frame_scaled_fraction};

const ALPHA_SNAP_EPSILON: f32 = 1e-3;

/// Where the current AFK start timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfkSinceSource {
    Server,
    LocalClock,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AfkState {
    afk: bool,
    since_ms: Option<f64>,
    source: Option<AfkSinceSource>,
    premium: bool,
}

impl AfkState {
    pub fn is_afk(&self) -> bool {
        self.afk
    }

    pub fn since_ms(&self) -> Option<f64> {
        self.since_ms
    }

    pub fn source(&self) -> Option<AfkSinceSource> {
        self.source
    }

    pub fn is_premium(&self) -> bool {
        self.premium
    }

    pub fn set_premium(&mut self, premium: bool) {
        self.premium = premium;
    }

    /// Applies an AFK flag update. A non-zero server timestamp always wins;
    /// otherwise the first `true` captures `now_ms`. Returns whether the flag
    /// flipped.
    pub fn apply(&mut self, afk: bool, server_since_ms: Option<f64>, now_ms: f64) -> bool {
        let changed = self.afk != afk;
        self.afk = afk;
        if !afk {
            self.since_ms = None;
            self.source = None;
            return changed;
        }

        let server_since = server_since_ms.filter(|since| since.is_finite() && *since != 0.0);
        match server_since {
            Some(since) => {
                self.since_ms = Some(since);
                self.source = Some(AfkSinceSource::Server);
            }
            None if changed || self.since_ms.is_none() => {
                self.since_ms = Some(now_ms);
                self.source = Some(AfkSinceSource::LocalClock);
            }
            None => {}
        }
        changed
    }

    pub fn elapsed_ms(&self, now_ms: f64) -> Option<f64> {
        if !self.afk {
            return None;
        }
        self.since_ms.map(|since| (now_ms - since).max(0.0))
    }

    /// AFK long enough that callers should drop the entity from interaction lists.
    pub fn is_ghosted(&self, config: &AfkConfig, now_ms: f64) -> bool {
        self.elapsed_ms(now_ms)
            .map(|elapsed| elapsed > config.ghost_delay_ms)
            .unwrap_or(false)
    }

    pub fn window_ms(&self, config: &AfkConfig) -> f64 {
        if self.premium {
            config.premium_window_ms
        } else {
            config.standard_window_ms
        }
    }

    pub fn remaining_ms(&self, config: &AfkConfig, now_ms: f64) -> Option<f64> {
        self.elapsed_ms(now_ms)
            .map(|elapsed| (self.window_ms(config) - elapsed).max(0.0))
    }

    pub fn countdown(&self, config: &AfkConfig, now_ms: f64) -> Option<String> {
        self.remaining_ms(config, now_ms).map(format_countdown)
    }

    pub fn target_alpha(&self, config: &AfkConfig) -> f32 {
        if self.afk {
            config.afk_alpha
        } else {
            1.0
        }
    }
}

/// `m:ss`, whole seconds, never negative.
pub fn format_countdown(remaining_ms: f64) -> String {
    let total_seconds = if remaining_ms.is_finite() {
        (remaining_ms.max(0.0) / 1000.0).floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// One tick of the opacity approach toward `target`.
pub fn fade_alpha(config: &AfkConfig, current: f32, target: f32, dt_ms: f64) -> f32 {
    let fraction = if config.fade_per_tick_unscaled {
        config.fade_fraction_per_tick
    } else {
        frame_scaled_fraction(config.fade_fraction_per_tick, dt_ms, config.reference_tick_ms)
    };
    let next = approach(current, target, fraction);
    if (next - target).abs() < ALPHA_SNAP_EPSILON {
        target
    } else {
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_reads_remaining_standard_window() {
        let config = AfkConfig::default();
        let now = 1_000_000.0;
        let mut state = AfkState::default();
        state.apply(true, Some(now - 130_000.0), now);

        assert!(state.is_ghosted(&config, now));
        assert_eq!(state.countdown(&config, now).as_deref(), Some("1:50"));
    }

    #[test]
    fn premium_window_is_longer() {
        let config = AfkConfig::default();
        let mut state = AfkState::default();
        state.set_premium(true);
        state.apply(true, Some(1.0), 1.0);
        assert_eq!(state.countdown(&config, 1.0).as_deref(), Some("15:00"));
    }

    #[test]
    fn countdown_floors_at_zero() {
        assert_eq!(format_countdown(-5_000.0), "0:00");
        assert_eq!(format_countdown(59_999.0), "0:59");
        assert_eq!(format_countdown(61_000.0), "1:01");
    }

    #[test]
    fn ghosting_starts_after_delay() {
        let config = AfkConfig::default();
        let mut state = AfkState::default();
        state.apply(true, None, 0.0);
        assert_eq!(state.source(), Some(AfkSinceSource::LocalClock));
        assert!(!state.is_ghosted(&config, 60_000.0));
        assert!(state.is_ghosted(&config, 60_001.0));

        state.apply(false, None, 70_000.0);
        assert!(!state.is_ghosted(&config, 70_000.0));
        assert_eq!(state.countdown(&config, 70_000.0), None);
    }

    #[test]
    fn zero_server_timestamp_falls_back_to_local_clock() {
        let mut state = AfkState::default();
        state.apply(true, Some(0.0), 5_000.0);
        assert_eq!(state.since_ms(), Some(5_000.0));
        assert_eq!(state.source(), Some(AfkSinceSource::LocalClock));
    }

    #[test]
    fn later_server_timestamp_corrects_local_fallback() {
        let mut state = AfkState::default();
        assert!(state.apply(true, None, 9_000.0));
        assert!(!state.apply(true, Some(4_000.0), 9_500.0));
        assert_eq!(state.since_ms(), Some(4_000.0));
        assert_eq!(state.source(), Some(AfkSinceSource::Server));

        // Repeated flag without a timestamp keeps what we have.
        assert!(!state.apply(true, None, 12_000.0));
        assert_eq!(state.since_ms(), Some(4_000.0));
    }

    #[test]
    fn fade_matches_per_tick_rule_at_reference_rate() {
        let config = AfkConfig::default();
        let scaled = fade_alpha(&config, 1.0, 0.4, config.reference_tick_ms);
        assert!((scaled - (1.0 - 0.6 * 0.05)).abs() < 1e-5);

        let unscaled = AfkConfig {
            fade_per_tick_unscaled: true,
            ..AfkConfig::default()
        };
        let slow_tick = fade_alpha(&unscaled, 1.0, 0.4, 100.0);
        assert!((slow_tick - (1.0 - 0.6 * 0.05)).abs() < 1e-5);
    }

    #[test]
    fn fade_is_framerate_independent_when_scaled() {
        let config = AfkConfig::default();
        let mut at_60 = 1.0f32;
        for _ in 0..60 {
            at_60 = fade_alpha(&config, at_60, 0.4, 1000.0 / 60.0);
        }
        let mut at_30 = 1.0f32;
        for _ in 0..30 {
            at_30 = fade_alpha(&config, at_30, 0.4, 1000.0 / 30.0);
        }
        assert!((at_60 - at_30).abs() < 1e-3);
    }

    #[test]
    fn fade_snaps_when_close() {
        let config = AfkConfig::default();
        let mut alpha = 1.0f32;
        for _ in 0..1_000 {
            alpha = fade_alpha(&config, alpha, 0.4, 16.0);
        }
        assert_eq!(alpha, 0.4);
    }
}
