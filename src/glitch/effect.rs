//! A single glitch: randomized overrides held for a random duration
//!
//! [`GlitchEffect::roll`] draws everything up front; [`GlitchEffect::run`]
//! applies the values, waits, and restores the snapshot. Restoration happens
//! exactly once however the run ends: natural expiry, a shutdown signal, or
//! the future being dropped mid-wait.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::settings::{seconds_to_duration, GlitchConfig};
use crate::telemetry::GlitchStats;

use super::snapshot::{ParameterSet, RestoreReport, SurfaceSnapshot};

/// Resolves once the shutdown flag is raised or its sender is gone
pub(crate) async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// One randomized glitch bound to a snapshot
#[derive(Debug, Clone)]
pub struct GlitchEffect {
    snapshot: Arc<SurfaceSnapshot>,
    duration: Duration,
    /// Indexed by `SurfaceId::index()`
    overrides: Vec<ParameterSet>,
    stats: Option<Arc<GlitchStats>>,
}

impl GlitchEffect {
    /// Draw a duration and an independent set of overrides per surface
    pub fn roll<R: Rng + ?Sized>(snapshot: Arc<SurfaceSnapshot>, config: &GlitchConfig, rng: &mut R) -> Self {
        let duration = seconds_to_duration(config.duration.sample(rng));

        let overrides = (0..snapshot.len())
            .map(|_| ParameterSet {
                transparency: config.transparency.sample(rng),
                cutout_threshold: config.cutout_threshold,
                amplitude: config.amplitude.sample(rng),
                speed: config.speed.sample(rng),
                amount: config.amount,
            })
            .collect();

        Self {
            snapshot,
            duration,
            overrides,
            stats: None,
        }
    }

    /// Count restore failures from the drop guard in `stats`
    ///
    /// Reports returned by [`ActiveGlitch::revert`] and [`GlitchEffect::run`]
    /// are left to the caller.
    pub fn with_stats(mut self, stats: Arc<GlitchStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// How long the overrides are held
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Drawn overrides, one per tracked surface
    pub fn overrides(&self) -> &[ParameterSet] {
        &self.overrides
    }

    pub fn snapshot(&self) -> &Arc<SurfaceSnapshot> {
        &self.snapshot
    }

    /// Write the overrides onto every surface
    ///
    /// The returned guard restores the snapshot when reverted or dropped.
    pub fn apply(&self) -> ActiveGlitch {
        for ((id, _), values) in self.snapshot.iter().zip(self.overrides.iter()) {
            if let Err(e) = self.snapshot.apply(id, values) {
                tracing::warn!("Failed to apply glitch: {}", e);
            }
        }
        ActiveGlitch {
            snapshot: Some(self.snapshot.clone()),
            stats: self.stats.clone(),
        }
    }

    /// Restore the snapshot
    pub fn revert(&self) -> RestoreReport {
        self.snapshot.restore_all()
    }

    /// Apply, hold for the drawn duration, then restore
    ///
    /// Raising the shutdown flag cuts the wait short; the restore still runs.
    /// If the flag is already raised nothing is applied.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> EffectOutcome {
        let running = RunningEffect {
            duration: self.duration,
            started_at: Instant::now(),
        };

        if *shutdown.borrow() {
            return running.finish(true, self.revert());
        }

        let active = self.apply();
        let cancelled = tokio::select! {
            _ = tokio::time::sleep(self.duration) => false,
            _ = shutdown_signalled(&mut shutdown) => true,
        };
        running.finish(cancelled, active.revert())
    }
}

/// Guard for applied overrides; restores the snapshot exactly once
#[must_use = "dropping the guard restores the surfaces immediately"]
#[derive(Debug)]
pub struct ActiveGlitch {
    snapshot: Option<Arc<SurfaceSnapshot>>,
    stats: Option<Arc<GlitchStats>>,
}

impl ActiveGlitch {
    /// Restore now and disarm the guard
    pub fn revert(mut self) -> RestoreReport {
        self.snapshot
            .take()
            .map(|snapshot| snapshot.restore_all())
            .unwrap_or_default()
    }
}

impl Drop for ActiveGlitch {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            let report = snapshot.restore_all();
            if let Some(stats) = &self.stats {
                stats.record_restore(&report);
            }
        }
    }
}

/// Bookkeeping for one in-flight run
#[derive(Debug, Clone, Copy)]
struct RunningEffect {
    duration: Duration,
    started_at: Instant,
}

impl RunningEffect {
    fn finish(self, cancelled: bool, report: RestoreReport) -> EffectOutcome {
        EffectOutcome {
            duration: self.duration,
            elapsed: self.started_at.elapsed(),
            cancelled,
            report,
        }
    }
}

/// Result of a finished [`GlitchEffect::run`]
#[derive(Debug, Clone)]
pub struct EffectOutcome {
    /// Drawn duration
    pub duration: Duration,
    /// Time actually spent before restoring
    pub elapsed: Duration,
    /// Whether a shutdown cut the run short
    pub cancelled: bool,
    /// Result of the final restore
    pub report: RestoreReport,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ValueRange;
    use crate::surface::{MaterialSurface, SurfaceArena};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scenario_config() -> GlitchConfig {
        GlitchConfig {
            chance: 1.0,
            check_interval: 0.1,
            duration: ValueRange::fixed(0.2),
            transparency: ValueRange::new(0.1, 0.25),
            amplitude: ValueRange::new(15.0, 30.0),
            speed: ValueRange::new(20.0, 40.0),
            cutout_threshold: 0.45,
            amount: 1.0,
            seed: Some(1),
        }
    }

    fn setup(count: usize) -> (Vec<Arc<MaterialSurface>>, Arc<SurfaceSnapshot>) {
        let surfaces: Vec<_> = (0..count)
            .map(|i| Arc::new(MaterialSurface::glitch_ready(format!("quad-{}", i))))
            .collect();
        let mut arena = SurfaceArena::new();
        for surface in &surfaces {
            arena.insert(surface.clone());
        }
        let snapshot = Arc::new(SurfaceSnapshot::capture(&arena).unwrap());
        (surfaces, snapshot)
    }

    fn read(surface: &MaterialSurface) -> ParameterSet {
        ParameterSet::read_from(surface).unwrap()
    }

    fn assert_in_ranges(values: &ParameterSet, config: &GlitchConfig) {
        assert!(config.transparency.contains(values.transparency));
        assert!(config.amplitude.contains(values.amplitude));
        assert!(config.speed.contains(values.speed));
        assert_eq!(values.cutout_threshold, config.cutout_threshold);
        assert_eq!(values.amount, config.amount);
    }

    #[test]
    fn test_roll_stays_in_ranges() {
        let (_surfaces, snapshot) = setup(3);
        let config = GlitchConfig {
            duration: ValueRange::new(0.05, 0.25),
            ..scenario_config()
        };
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..1_000 {
            let effect = GlitchEffect::roll(snapshot.clone(), &config, &mut rng);
            let seconds = effect.duration().as_secs_f32();
            assert!(seconds >= 0.05 - 1e-6 && seconds <= 0.25 + 1e-6);
            assert_eq!(effect.overrides().len(), 3);
            for values in effect.overrides() {
                assert_in_ranges(values, &config);
            }
        }
    }

    #[test]
    fn test_roll_duration_is_exact() {
        let (_surfaces, snapshot) = setup(1);
        let mut rng = StdRng::seed_from_u64(1);
        let effect = GlitchEffect::roll(snapshot.clone(), &scenario_config(), &mut rng);
        assert_eq!(effect.duration(), Duration::from_millis(200));

        // Too large for a Duration: hold forever rather than not at all
        let config = GlitchConfig {
            duration: ValueRange::fixed(1e20),
            ..scenario_config()
        };
        assert!(config.validate().is_ok());
        let effect = GlitchEffect::roll(snapshot, &config, &mut rng);
        assert_eq!(effect.duration(), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_duration_holds_until_shutdown() {
        let (surfaces, snapshot) = setup(1);
        let config = GlitchConfig {
            duration: ValueRange::fixed(1e20),
            ..scenario_config()
        };
        let mut rng = StdRng::seed_from_u64(6);
        let effect = GlitchEffect::roll(snapshot, &config, &mut rng);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(effect.run(shutdown_rx));
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_in_ranges(&read(&surfaces[0]), &config);

        shutdown_tx.send(true).unwrap();
        assert!(task.await.unwrap().cancelled);
        assert_eq!(read(&surfaces[0]), ParameterSet::default());
    }

    #[test]
    fn test_surfaces_draw_independently() {
        let (_surfaces, snapshot) = setup(4);
        let mut rng = StdRng::seed_from_u64(5);
        let effect = GlitchEffect::roll(snapshot, &scenario_config(), &mut rng);

        let first = effect.overrides()[0];
        assert!(effect.overrides()[1..].iter().any(|v| v.amplitude != first.amplitude));
    }

    #[test]
    fn test_apply_then_revert() {
        let (surfaces, snapshot) = setup(2);
        let config = scenario_config();
        let mut rng = StdRng::seed_from_u64(3);
        let effect = GlitchEffect::roll(snapshot, &config, &mut rng);

        let active = effect.apply();
        for (surface, expected) in surfaces.iter().zip(effect.overrides()) {
            assert_eq!(read(surface), *expected);
            assert_in_ranges(&read(surface), &config);
        }

        assert!(active.revert().is_complete());
        for surface in &surfaces {
            assert_eq!(read(surface), ParameterSet::default());
        }
    }

    #[test]
    fn test_dropping_guard_restores() {
        let (surfaces, snapshot) = setup(1);
        let mut rng = StdRng::seed_from_u64(3);
        let effect = GlitchEffect::roll(snapshot, &scenario_config(), &mut rng);

        {
            let _active = effect.apply();
            assert_ne!(read(&surfaces[0]), ParameterSet::default());
        }
        assert_eq!(read(&surfaces[0]), ParameterSet::default());
    }

    #[test]
    fn test_dropped_guard_counts_restore_failures() {
        let (surfaces, snapshot) = setup(2);
        let stats = Arc::new(GlitchStats::new());
        let mut rng = StdRng::seed_from_u64(3);
        let effect = GlitchEffect::roll(snapshot, &scenario_config(), &mut rng).with_stats(stats.clone());

        let active = effect.apply();
        surfaces[0].destroy();
        drop(active);

        assert_eq!(stats.counters().restore_failures, 1);
        assert_eq!(read(&surfaces[1]), ParameterSet::default());

        // An explicit revert hands the report back instead
        let active = effect.apply();
        let report = active.revert();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(stats.counters().restore_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_restores_after_duration() {
        let (surfaces, snapshot) = setup(1);
        let config = scenario_config();
        let mut rng = StdRng::seed_from_u64(21);
        let effect = GlitchEffect::roll(snapshot, &config, &mut rng);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(effect.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_in_ranges(&read(&surfaces[0]), &config);

        tokio::time::sleep(Duration::from_millis(198)).await;
        assert_in_ranges(&read(&surfaces[0]), &config);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(read(&surfaces[0]), ParameterSet::default());

        let outcome = task.await.unwrap();
        assert!(!outcome.cancelled);
        assert_eq!(outcome.duration, Duration::from_millis(200));
        assert!(outcome.report.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_wait_restores() {
        let (surfaces, snapshot) = setup(2);
        let config = GlitchConfig {
            duration: ValueRange::fixed(10.0),
            ..scenario_config()
        };
        let mut rng = StdRng::seed_from_u64(2);
        let effect = GlitchEffect::roll(snapshot, &config, &mut rng);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(effect.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_ne!(read(&surfaces[0]), ParameterSet::default());

        shutdown_tx.send(true).unwrap();
        let outcome = task.await.unwrap();

        assert!(outcome.cancelled);
        assert!(outcome.elapsed < Duration::from_secs(10));
        for surface in &surfaces {
            assert_eq!(read(surface), ParameterSet::default());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_apply_still_restores() {
        let (surfaces, snapshot) = setup(1);
        // Leave the surface dirty to prove the restore ran
        surfaces[0].define("_Speed", 99.0);

        let mut rng = StdRng::seed_from_u64(2);
        let effect = GlitchEffect::roll(snapshot, &scenario_config(), &mut rng);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let outcome = effect.run(shutdown_rx).await;
        assert!(outcome.cancelled);
        assert_eq!(read(&surfaces[0]), ParameterSet::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_run_restores() {
        let (surfaces, snapshot) = setup(1);
        let config = GlitchConfig {
            duration: ValueRange::fixed(10.0),
            ..scenario_config()
        };
        let mut rng = StdRng::seed_from_u64(8);
        let effect = GlitchEffect::roll(snapshot, &config, &mut rng);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(effect.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_ne!(read(&surfaces[0]), ParameterSet::default());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(read(&surfaces[0]), ParameterSet::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_counts_as_shutdown() {
        let (surfaces, snapshot) = setup(1);
        let config = GlitchConfig {
            duration: ValueRange::fixed(10.0),
            ..scenario_config()
        };
        let mut rng = StdRng::seed_from_u64(4);
        let effect = GlitchEffect::roll(snapshot, &config, &mut rng);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(effect.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(shutdown_tx);

        let outcome = task.await.unwrap();
        assert!(outcome.cancelled);
        assert_eq!(read(&surfaces[0]), ParameterSet::default());
    }
}
