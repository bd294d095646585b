//! Frame loop and resolution governor
//!
//! The host calls [`EventLoop::advance`] once per display frame with a
//! monotonic timestamp. Each frame yields an fps sample for the
//! [`FrameGovernor`]; loop callbacks run at most `target_fps` times per
//! second and not at all while paused.

use slotmap::{new_key_type, SlotMap};
use stagecraft_core::{Cancellable, ReactiveGraph};

use crate::config::{EventLoopConfig, GovernorConfig};

new_key_type! {
    /// Handle to a registered loop callback
    pub struct LoopId;
}

type LoopCallback = Box<dyn FnMut(&mut ReactiveGraph, f32)>;

struct LoopEntry {
    callback: LoopCallback,
    token: Cancellable,
}

struct TimerEntry {
    callback: LoopCallback,
    token: Cancellable,
    interval_ms: f64,
    last_fired: Option<f64>,
    remaining: Option<u32>,
}

/// Median-fps resolution governor
///
/// Collects one fps sample per frame. When `window` samples are in, the
/// window's median is compared with `min_fps`; a slow window asks for the
/// pixel ratio to be multiplied by `scale_factor`. The window then starts
/// over whatever the outcome.
#[derive(Debug, Clone)]
pub struct FrameGovernor {
    config: GovernorConfig,
    samples: Vec<f32>,
}

/// Decision at the end of a full governor window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GovernorDecision {
    pub median_fps: f32,
    /// Factor to apply to the pixel ratio, if the window was slow
    pub scale: Option<f32>,
}

impl FrameGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            samples: Vec::with_capacity(config.window),
            config,
        }
    }

    /// Record a sample; returns the decision when the window completes
    pub fn push(&mut self, fps: f32) -> Option<GovernorDecision> {
        if !fps.is_finite() {
            return None;
        }
        self.samples.push(fps);
        if self.samples.len() < self.config.window {
            return None;
        }

        let median_fps = median(&mut self.samples);
        self.samples.clear();

        let scale = (median_fps < self.config.min_fps).then_some(self.config.scale_factor);
        if scale.is_some() {
            tracing::info!(
                median_fps,
                min_fps = self.config.min_fps,
                "frame rate low, reducing resolution"
            );
        }
        Some(GovernorDecision { median_fps, scale })
    }

    /// Samples collected in the current window
    pub fn pending(&self) -> usize {
        self.samples.len()
    }
}

fn median(samples: &mut [f32]) -> f32 {
    samples.sort_by(|a, b| b.total_cmp(a));
    samples[samples.len() / 2]
}

/// What one call to [`EventLoop::advance`] did
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameOutcome {
    /// Instantaneous fps, absent on the first frame
    pub fps: Option<f32>,
    /// Milliseconds since the previous frame
    pub delta_ms: f32,
    /// Milliseconds since callbacks last ran, when they ran this frame
    pub elapsed_ms: Option<f32>,
    pub governor: Option<GovernorDecision>,
    /// Loop callbacks ran this frame
    pub ran_callbacks: bool,
}

/// Loop callback registry with frame skipping
pub struct EventLoop {
    governor: FrameGovernor,
    target_fps: f32,
    previous: Option<f64>,
    last_run: Option<f64>,
    skipped: u32,
    loops: SlotMap<LoopId, LoopEntry>,
    timers: SlotMap<LoopId, TimerEntry>,
}

impl EventLoop {
    pub fn new(governor: GovernorConfig, config: &EventLoopConfig) -> Self {
        Self {
            governor: FrameGovernor::new(governor),
            target_fps: config.target_fps,
            previous: None,
            last_run: None,
            skipped: 0,
            loops: SlotMap::with_key(),
            timers: SlotMap::with_key(),
        }
    }

    /// Run `callback` every unskipped frame with the ms elapsed since its
    /// previous run
    ///
    /// Cancel the returned token to remove the callback.
    pub fn add_loop<F>(&mut self, callback: F) -> Cancellable
    where
        F: FnMut(&mut ReactiveGraph, f32) + 'static,
    {
        let token = Cancellable::new();
        self.loops.insert(LoopEntry {
            callback: Box::new(callback),
            token: token.clone(),
        });
        token
    }

    /// Run `callback` every `interval_ms`, `repeat` times (forever if `None`)
    ///
    /// Timers do not fire while paused; time spent paused still counts
    /// towards the interval.
    pub fn add_timer<F>(&mut self, interval_ms: f64, repeat: Option<u32>, callback: F) -> Cancellable
    where
        F: FnMut(&mut ReactiveGraph, f32) + 'static,
    {
        let token = Cancellable::new();
        if repeat == Some(0) {
            token.cancel();
            return token;
        }
        self.timers.insert(TimerEntry {
            callback: Box::new(callback),
            token: token.clone(),
            interval_ms,
            last_fired: None,
            remaining: repeat,
        });
        token
    }

    /// Number of live loop callbacks and timers
    pub fn len(&self) -> usize {
        self.loops.values().filter(|e| !e.token.is_done()).count()
            + self.timers.values().filter(|e| !e.token.is_done()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn governor(&self) -> &FrameGovernor {
        &self.governor
    }

    /// Advance one display frame
    pub fn advance(&mut self, now_ms: f64, paused: bool, graph: &mut ReactiveGraph) -> FrameOutcome {
        let delta_ms = self.previous.map_or(0.0, |prev| (now_ms - prev).max(0.0));
        self.previous = Some(now_ms);

        let mut outcome = FrameOutcome {
            delta_ms: delta_ms as f32,
            ..Default::default()
        };
        if delta_ms > 0.0 {
            let fps = (1000.0 / delta_ms) as f32;
            outcome.fps = Some(fps);
            outcome.governor = self.governor.push(fps);
        }

        self.loops.retain(|_, e| !e.token.is_done());
        self.timers.retain(|_, e| !e.token.is_done());

        if paused {
            return outcome;
        }
        self.fire_timers(now_ms, graph);

        // Faster displays skip frames so callbacks run near the target rate
        let every = outcome
            .fps
            .map_or(1, |fps| (fps / self.target_fps).round().max(1.0) as u32);
        self.skipped += 1;
        if self.skipped < every {
            return outcome;
        }
        self.skipped = 0;

        let elapsed = self.last_run.map_or(0.0, |last| (now_ms - last).max(0.0)) as f32;
        self.last_run = Some(now_ms);

        let ids: Vec<LoopId> = self.loops.keys().collect();
        for id in ids {
            if let Some(entry) = self.loops.get_mut(id) {
                if !entry.token.is_done() {
                    (entry.callback)(graph, elapsed);
                }
            }
        }
        outcome.elapsed_ms = Some(elapsed);
        outcome.ran_callbacks = true;
        outcome
    }

    fn fire_timers(&mut self, now_ms: f64, graph: &mut ReactiveGraph) {
        let ids: Vec<LoopId> = self.timers.keys().collect();
        for id in ids {
            let Some(timer) = self.timers.get_mut(id) else {
                continue;
            };
            let last = *timer.last_fired.get_or_insert(now_ms);
            if now_ms - last < timer.interval_ms || timer.token.is_done() {
                continue;
            }

            timer.last_fired = Some(now_ms);
            (timer.callback)(graph, (now_ms - last) as f32);
            if let Some(remaining) = timer.remaining.as_mut() {
                *remaining -= 1;
                if *remaining == 0 {
                    timer.token.cancel();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn governor() -> FrameGovernor {
        FrameGovernor::new(GovernorConfig::default())
    }

    #[test]
    fn test_slow_window_scales_once_and_resets() {
        let mut governor = governor();
        for _ in 0..59 {
            assert_eq!(governor.push(20.0), None);
        }
        let decision = governor.push(20.0).unwrap();
        assert_eq!(decision.scale, Some(0.75));
        assert_eq!(governor.pending(), 0);
    }

    #[test]
    fn test_median_ignores_outliers() {
        let mut governor = governor();
        let mut decision = None;
        for i in 0..60 {
            let fps = if i % 5 == 0 { 5.0 } else { 58.0 };
            decision = governor.push(fps);
        }
        let decision = decision.unwrap();
        assert_eq!(decision.median_fps, 58.0);
        assert_eq!(decision.scale, None);
    }

    #[test]
    fn test_callbacks_throttled_on_fast_display() {
        let mut event_loop = EventLoop::new(GovernorConfig::default(), &EventLoopConfig::default());
        let mut graph = ReactiveGraph::new();
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        event_loop.add_loop(move |_, _| counter.set(counter.get() + 1));

        // 120 Hz display with a 60 fps target: every other frame
        let frame = 1000.0 / 120.0;
        for i in 0..=10 {
            event_loop.advance(i as f64 * frame, false, &mut graph);
        }
        assert_eq!(runs.get(), 6);
    }

    #[test]
    fn test_paused_frames_still_sample() {
        let mut event_loop = EventLoop::new(GovernorConfig::default(), &EventLoopConfig::default());
        let mut graph = ReactiveGraph::new();
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        event_loop.add_loop(move |_, _| counter.set(counter.get() + 1));

        event_loop.advance(0.0, true, &mut graph);
        let outcome = event_loop.advance(16.0, true, &mut graph);
        assert_eq!(runs.get(), 0);
        assert!(!outcome.ran_callbacks);
        assert_eq!(event_loop.governor().pending(), 1);
    }

    #[test]
    fn test_cancelled_loop_is_removed() {
        let mut event_loop = EventLoop::new(GovernorConfig::default(), &EventLoopConfig::default());
        let mut graph = ReactiveGraph::new();
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let handle = event_loop.add_loop(move |_, _| counter.set(counter.get() + 1));

        event_loop.advance(0.0, false, &mut graph);
        handle.cancel();
        event_loop.advance(16.0, false, &mut graph);
        assert_eq!(runs.get(), 1);
        assert!(event_loop.is_empty());
    }

    #[test]
    fn test_timer_repeats_then_expires() {
        let mut event_loop = EventLoop::new(GovernorConfig::default(), &EventLoopConfig::default());
        let mut graph = ReactiveGraph::new();
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        let handle = event_loop.add_timer(100.0, Some(2), move |_, _| counter.set(counter.get() + 1));

        for i in 0..=20 {
            event_loop.advance(i as f64 * 25.0, false, &mut graph);
        }
        assert_eq!(fired.get(), 2);
        assert!(handle.is_done());
    }
}
