//! Baseline capture and restoration
//!
//! A [`SurfaceSnapshot`] records the glitch parameters of every tracked
//! surface before any glitch runs. Restoring is idempotent: the stored
//! values never change after capture, so repeated or concurrent restores
//! all converge on the same state.

use crate::surface::{ParameterName, Surface, SurfaceArena, SurfaceError, SurfaceId};

use super::error::GlitchError;

/// Values of the five glitch parameters on one surface
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParameterSet {
    pub transparency: f32,
    pub cutout_threshold: f32,
    pub amplitude: f32,
    pub speed: f32,
    pub amount: f32,
}

impl ParameterSet {
    /// Get a parameter by name
    pub fn get(&self, name: ParameterName) -> f32 {
        match name {
            ParameterName::Transparency => self.transparency,
            ParameterName::CutoutThreshold => self.cutout_threshold,
            ParameterName::Amplitude => self.amplitude,
            ParameterName::Speed => self.speed,
            ParameterName::Amount => self.amount,
        }
    }

    /// Set a parameter by name
    pub fn set(&mut self, name: ParameterName, value: f32) {
        match name {
            ParameterName::Transparency => self.transparency = value,
            ParameterName::CutoutThreshold => self.cutout_threshold = value,
            ParameterName::Amplitude => self.amplitude = value,
            ParameterName::Speed => self.speed = value,
            ParameterName::Amount => self.amount = value,
        }
    }

    /// Iterate over `(name, value)` pairs in capture order
    pub fn iter(&self) -> impl Iterator<Item = (ParameterName, f32)> + '_ {
        ParameterName::ALL.into_iter().map(move |name| (name, self.get(name)))
    }

    /// Read all five parameters from a surface
    pub fn read_from(surface: &dyn Surface) -> Result<Self, (ParameterName, SurfaceError)> {
        let mut set = ParameterSet::default();
        for name in ParameterName::ALL {
            let value = surface
                .get_parameter(name.property_name())
                .map_err(|e| (name, e))?;
            set.set(name, value);
        }
        Ok(set)
    }

    /// Write all five parameters to a surface, one write each
    ///
    /// Every parameter is attempted even after a failure; the first error is
    /// returned once all writes have been tried.
    pub fn write_to(&self, surface: &dyn Surface) -> Result<(), (ParameterName, SurfaceError)> {
        let mut first_error = None;
        for (name, value) in self.iter() {
            if let Err(e) = surface.set_parameter(name.property_name(), value) {
                first_error.get_or_insert((name, e));
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Outcome of a [`SurfaceSnapshot::restore_all`] pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    /// Surfaces written back successfully
    pub restored: usize,
    /// Surfaces that could not be written, with the reason
    pub failed: Vec<(SurfaceId, SurfaceError)>,
}

impl RestoreReport {
    /// True when every tracked surface was restored
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Baseline parameter values for every tracked surface
#[derive(Debug, Clone)]
pub struct SurfaceSnapshot {
    surfaces: SurfaceArena,
    /// Indexed by `SurfaceId::index()`
    baseline: Vec<ParameterSet>,
}

impl SurfaceSnapshot {
    /// Capture the current parameter values of every surface in the arena
    pub fn capture(surfaces: &SurfaceArena) -> Result<Self, GlitchError> {
        let mut baseline = Vec::with_capacity(surfaces.len());
        for (id, surface) in surfaces.iter() {
            let set = ParameterSet::read_from(surface.as_ref())
                .map_err(|(parameter, e)| surface_error(id, parameter, e))?;
            baseline.push(set);
        }

        tracing::debug!(surfaces = baseline.len(), "Captured glitch baseline");

        Ok(Self {
            surfaces: surfaces.clone(),
            baseline,
        })
    }

    pub fn len(&self) -> usize {
        self.baseline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baseline.is_empty()
    }

    /// Baseline values for one surface
    pub fn get(&self, id: SurfaceId) -> Option<&ParameterSet> {
        self.baseline.get(id.index())
    }

    /// The surfaces this snapshot restores
    pub fn surfaces(&self) -> &SurfaceArena {
        &self.surfaces
    }

    /// Iterate over `(id, baseline)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (SurfaceId, &ParameterSet)> {
        self.surfaces.iter().map(|(id, _)| id).zip(self.baseline.iter())
    }

    /// Write an arbitrary parameter set onto one tracked surface
    pub fn apply(&self, id: SurfaceId, values: &ParameterSet) -> Result<(), GlitchError> {
        let surface = self
            .surfaces
            .get(id)
            .ok_or(GlitchError::SurfaceUnavailable { surface: id })?;
        values
            .write_to(surface.as_ref())
            .map_err(|(parameter, e)| surface_error(id, parameter, e))
    }

    /// Write every baseline back onto its surface
    ///
    /// A surface that fails is logged and reported; the remaining surfaces
    /// are still restored.
    pub fn restore_all(&self) -> RestoreReport {
        let mut report = RestoreReport::default();
        for ((id, surface), baseline) in self.surfaces.iter().zip(self.baseline.iter()) {
            match baseline.write_to(surface.as_ref()) {
                Ok(()) => report.restored += 1,
                Err((parameter, e)) => {
                    tracing::warn!(
                        surface = %id,
                        label = surface.label(),
                        parameter = parameter.display_name(),
                        "Failed to restore glitch baseline: {}",
                        e
                    );
                    report.failed.push((id, e));
                }
            }
        }
        report
    }
}

fn surface_error(surface: SurfaceId, parameter: ParameterName, e: SurfaceError) -> GlitchError {
    match e {
        SurfaceError::MissingParameter { .. } => GlitchError::MissingParameter { surface, parameter },
        SurfaceError::Unavailable => GlitchError::SurfaceUnavailable { surface },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MaterialSurface;
    use std::sync::Arc;

    fn surface_with(label: &str, values: ParameterSet) -> Arc<MaterialSurface> {
        let surface = MaterialSurface::new(label);
        for (name, value) in values.iter() {
            surface.define(name.property_name(), value);
        }
        Arc::new(surface)
    }

    fn baseline() -> ParameterSet {
        ParameterSet {
            transparency: 0.0,
            cutout_threshold: 0.1,
            amplitude: 2.0,
            speed: 3.0,
            amount: 0.5,
        }
    }

    fn glitched() -> ParameterSet {
        ParameterSet {
            transparency: 0.2,
            cutout_threshold: 0.45,
            amplitude: 20.0,
            speed: 30.0,
            amount: 1.0,
        }
    }

    #[test]
    fn test_capture_reads_every_parameter() {
        let surface = surface_with("a", baseline());
        let mut arena = SurfaceArena::new();
        let id = arena.insert(surface);

        let snapshot = SurfaceSnapshot::capture(&arena).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(id), Some(&baseline()));
    }

    #[test]
    fn test_capture_missing_parameter() {
        let complete = surface_with("complete", baseline());
        let partial = MaterialSurface::new("partial");
        partial.define("_Transparency", 0.0);
        partial.define("_CutoutThresh", 0.0);

        let mut arena = SurfaceArena::new();
        arena.insert(complete);
        let partial_id = arena.insert(Arc::new(partial));

        let err = SurfaceSnapshot::capture(&arena).unwrap_err();
        assert_eq!(
            err,
            GlitchError::MissingParameter {
                surface: partial_id,
                parameter: ParameterName::Amplitude,
            }
        );
    }

    #[test]
    fn test_restore_is_idempotent() {
        let surface = surface_with("a", baseline());
        let mut arena = SurfaceArena::new();
        let id = arena.insert(surface.clone());
        let snapshot = SurfaceSnapshot::capture(&arena).unwrap();

        snapshot.apply(id, &glitched()).unwrap();
        assert_eq!(ParameterSet::read_from(&*surface).unwrap(), glitched());

        for _ in 0..3 {
            let report = snapshot.restore_all();
            assert!(report.is_complete());
            assert_eq!(report.restored, 1);
            assert_eq!(ParameterSet::read_from(&*surface).unwrap(), baseline());
        }

        // apply / restore interleavings ending in restore always land on baseline
        snapshot.apply(id, &glitched()).unwrap();
        snapshot.apply(id, &glitched()).unwrap();
        let _ = snapshot.restore_all();
        snapshot.apply(id, &glitched()).unwrap();
        let _ = snapshot.restore_all();
        assert_eq!(ParameterSet::read_from(&*surface).unwrap(), baseline());
    }

    #[test]
    fn test_restore_writes_once_per_parameter() {
        let surface = surface_with("a", baseline());
        let mut arena = SurfaceArena::new();
        arena.insert(surface.clone());
        let snapshot = SurfaceSnapshot::capture(&arena).unwrap();

        let _ = snapshot.restore_all();
        assert_eq!(surface.write_count(), ParameterName::ALL.len());
    }

    #[test]
    fn test_restore_continues_past_unavailable_surface() {
        let first = surface_with("first", baseline());
        let broken = surface_with("broken", baseline());
        let last = surface_with("last", baseline());

        let mut arena = SurfaceArena::new();
        let first_id = arena.insert(first.clone());
        let broken_id = arena.insert(broken.clone());
        let last_id = arena.insert(last.clone());
        let snapshot = SurfaceSnapshot::capture(&arena).unwrap();

        snapshot.apply(first_id, &glitched()).unwrap();
        snapshot.apply(last_id, &glitched()).unwrap();
        broken.destroy();

        let report = snapshot.restore_all();
        assert_eq!(report.restored, 2);
        assert_eq!(report.failed, vec![(broken_id, SurfaceError::Unavailable)]);
        assert_eq!(ParameterSet::read_from(&*first).unwrap(), baseline());
        assert_eq!(ParameterSet::read_from(&*last).unwrap(), baseline());
    }

    #[test]
    fn test_restore_writes_past_missing_parameter() {
        let surface = surface_with("a", baseline());
        let mut arena = SurfaceArena::new();
        let id = arena.insert(surface.clone());
        let snapshot = SurfaceSnapshot::capture(&arena).unwrap();

        snapshot.apply(id, &glitched()).unwrap();
        surface.remove("_Amplitude");

        let report = snapshot.restore_all();
        assert_eq!(
            report.failed,
            vec![(
                id,
                SurfaceError::MissingParameter {
                    name: "_Amplitude".to_string()
                }
            )]
        );
        assert_eq!(report.restored, 0);
        // Parameters after the missing one are still written back
        assert_eq!(surface.parameter(ParameterName::Speed), Some(baseline().speed));
        assert_eq!(surface.parameter(ParameterName::Amount), Some(baseline().amount));
        assert_eq!(surface.parameter(ParameterName::Transparency), Some(baseline().transparency));
        assert_eq!(surface.parameter(ParameterName::Amplitude), None);
    }

    #[test]
    fn test_apply_reports_missing_parameter() {
        let surface = surface_with("a", baseline());
        let mut arena = SurfaceArena::new();
        let id = arena.insert(surface.clone());
        let snapshot = SurfaceSnapshot::capture(&arena).unwrap();

        surface.remove("_Speed");
        assert_eq!(
            snapshot.apply(id, &glitched()),
            Err(GlitchError::MissingParameter {
                surface: id,
                parameter: ParameterName::Speed,
            })
        );
        assert_eq!(surface.parameter(ParameterName::Amount), Some(glitched().amount));

        surface.destroy();
        assert_eq!(
            snapshot.apply(id, &glitched()),
            Err(GlitchError::SurfaceUnavailable { surface: id })
        );
    }

    #[test]
    fn test_concurrent_restores_converge() {
        let surface = surface_with("a", baseline());
        let mut arena = SurfaceArena::new();
        let id = arena.insert(surface.clone());
        let snapshot = Arc::new(SurfaceSnapshot::capture(&arena).unwrap());
        snapshot.apply(id, &glitched()).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let snapshot = snapshot.clone();
                std::thread::spawn(move || snapshot.restore_all())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_complete());
        }

        assert_eq!(ParameterSet::read_from(&*surface).unwrap(), baseline());
    }
}
