//! Periodic glitch trigger and shutdown coordination
//!
//! The scheduler is a two-state machine:
//!
//! - **Idle**: nothing runs, surfaces hold their own values.
//! - **Active**: a tick loop task rolls the trigger chance every
//!   `check_interval` and spawns a [`GlitchEffect`] task on success.
//!
//! The tick loop owns a `JoinSet` of effect tasks and never waits on them
//! between ticks. A single `watch` flag signals shutdown to the loop and to
//! every effect. [`GlitchScheduler::stop`] raises it, joins the loop (which
//! drains its effects), and then restores the snapshot unconditionally.
//!
//! Effects may overlap: a later effect can overwrite an earlier one's
//! restore, so a surface can stay glitched longer than one duration.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::settings::GlitchConfig;
use crate::surface::SurfaceArena;
use crate::telemetry::GlitchStats;

use super::effect::{shutdown_signalled, EffectOutcome, GlitchEffect};
use super::error::GlitchError;
use super::snapshot::{RestoreReport, SurfaceSnapshot};

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Not watching; no tasks running
    Idle,
    /// Tick loop running
    Active,
}

/// Roll the trigger chance once
pub fn should_glitch<R: Rng + ?Sized>(chance: f32, rng: &mut R) -> bool {
    rng.random::<f32>() < chance
}

/// Resources owned while Active
struct ActiveLoop {
    snapshot: Arc<SurfaceSnapshot>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Randomized glitch controller for a set of surfaces
pub struct GlitchScheduler {
    surfaces: SurfaceArena,
    config: GlitchConfig,
    stats: Arc<GlitchStats>,
    active: Option<ActiveLoop>,
}

impl GlitchScheduler {
    /// Create an idle scheduler
    pub fn new(surfaces: SurfaceArena, config: GlitchConfig) -> Self {
        Self {
            surfaces,
            config,
            stats: Arc::new(GlitchStats::new()),
            active: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.active.is_some() {
            SchedulerState::Active
        } else {
            SchedulerState::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn config(&self) -> &GlitchConfig {
        &self.config
    }

    /// Replace the config; takes effect on the next `start()`
    pub fn set_config(&mut self, config: GlitchConfig) -> Result<(), GlitchError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn surfaces(&self) -> &SurfaceArena {
        &self.surfaces
    }

    /// Baseline captured by the current `start()`, if Active
    pub fn snapshot(&self) -> Option<&Arc<SurfaceSnapshot>> {
        self.active.as_ref().map(|a| &a.snapshot)
    }

    /// Shared activity counters
    pub fn stats(&self) -> Arc<GlitchStats> {
        self.stats.clone()
    }

    /// Idle → Active
    ///
    /// Validates the config, captures the baseline and spawns the tick loop
    /// on the current tokio runtime. Calling `start()` while already Active
    /// does nothing: the existing loop and snapshot are kept, since a fresh
    /// capture could record glitched values as the baseline.
    pub fn start(&mut self) -> Result<(), GlitchError> {
        if self.active.is_some() {
            tracing::debug!("Glitch scheduler already active; start ignored");
            return Ok(());
        }

        self.config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| GlitchError::NoRuntime)?;
        let snapshot = Arc::new(SurfaceSnapshot::capture(&self.surfaces)?);

        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tick_loop = TickLoop {
            snapshot: snapshot.clone(),
            config: self.config.clone(),
            rng,
            stats: self.stats.clone(),
            shutdown: shutdown_rx,
        };
        let task = runtime.spawn(tick_loop.run());

        tracing::info!(
            surfaces = snapshot.len(),
            chance = self.config.chance,
            check_interval = self.config.check_interval,
            "Glitch scheduler started"
        );

        self.active = Some(ActiveLoop {
            snapshot,
            shutdown_tx,
            task,
        });
        Ok(())
    }

    /// Active → Idle
    ///
    /// Cancels the tick loop and every in-flight glitch, waits for them to
    /// finish, then restores the baseline. When this returns every tracked
    /// surface holds its captured values. Does nothing while Idle.
    pub async fn stop(&mut self) -> RestoreReport {
        let Some(active) = self.active.take() else {
            return RestoreReport::default();
        };

        let _ = active.shutdown_tx.send(true);
        if let Err(e) = active.task.await {
            log_join_error("tick loop", &e);
        }

        let report = active.snapshot.restore_all();
        self.stats.record_restore(&report);

        let counters = self.stats.counters();
        tracing::info!(
            triggers = counters.triggers,
            completed = counters.completed,
            cancelled = counters.cancelled,
            restored = report.restored,
            failed = report.failed.len(),
            "Glitch scheduler stopped"
        );
        report
    }
}

impl Drop for GlitchScheduler {
    fn drop(&mut self) {
        // Best effort: effects see the flag and restore on their own, and the
        // baseline is written once more here in case none is left to do it.
        if let Some(active) = self.active.take() {
            let _ = active.shutdown_tx.send(true);
            let report = active.snapshot.restore_all();
            self.stats.record_restore(&report);
            tracing::debug!("Glitch scheduler dropped while active; baseline restored");
        }
    }
}

fn log_join_error(what: &str, e: &JoinError) {
    if e.is_panic() {
        tracing::error!("Glitch {} panicked: {}", what, e);
    } else {
        tracing::warn!("Glitch {} was cancelled: {}", what, e);
    }
}

/// State moved into the tick loop task
struct TickLoop {
    snapshot: Arc<SurfaceSnapshot>,
    config: GlitchConfig,
    rng: StdRng,
    stats: Arc<GlitchStats>,
    shutdown: watch::Receiver<bool>,
}

enum Wake {
    Tick,
    Shutdown,
    Joined(Result<EffectOutcome, JoinError>),
}

impl TickLoop {
    async fn run(self) {
        let TickLoop {
            snapshot,
            config,
            mut rng,
            stats,
            mut shutdown,
        } = self;
        let interval = config.check_interval_duration();
        let mut effects: JoinSet<EffectOutcome> = JoinSet::new();

        'ticking: loop {
            if *shutdown.borrow() {
                break;
            }

            stats.record_tick();
            if should_glitch(config.chance, &mut rng) {
                let effect = GlitchEffect::roll(snapshot.clone(), &config, &mut rng).with_stats(stats.clone());
                stats.record_trigger();
                tracing::debug!(
                    duration_ms = effect.duration().as_millis() as u64,
                    in_flight = effects.len() + 1,
                    "Glitch triggered"
                );
                effects.spawn(effect.run(shutdown.clone()));
            }

            let pause = pause_for(interval);
            tokio::pin!(pause);
            loop {
                let wake = tokio::select! {
                    _ = shutdown_signalled(&mut shutdown) => Wake::Shutdown,
                    _ = &mut pause => Wake::Tick,
                    Some(joined) = effects.join_next(), if !effects.is_empty() => Wake::Joined(joined),
                };
                match wake {
                    Wake::Tick => break,
                    Wake::Shutdown => break 'ticking,
                    Wake::Joined(joined) => record_joined(&stats, joined),
                }
            }
        }

        // Every effect saw the same flag; wait for their restores
        while let Some(joined) = effects.join_next().await {
            record_joined(&stats, joined);
        }
    }
}

/// Sleep for one check interval; a zero interval only yields
async fn pause_for(interval: Duration) {
    if interval.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(interval).await;
    }
}

fn record_joined(stats: &GlitchStats, joined: Result<EffectOutcome, JoinError>) {
    match joined {
        Ok(outcome) => {
            tracing::debug!(
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                cancelled = outcome.cancelled,
                "Glitch finished"
            );
            stats.record_finished(outcome.cancelled, &outcome.report);
        }
        Err(e) => {
            log_join_error("effect", &e);
            stats.record_panicked();
        }
    }
}
