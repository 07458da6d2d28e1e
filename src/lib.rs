//! Surface Glitch Library
//!
//! A randomized, time-bounded glitch controller. While active it rolls a
//! trigger chance at a fixed interval; each hit overrides the glitch shader
//! parameters of every tracked surface for a random short duration and then
//! puts the captured baseline back.

pub mod glitch;
pub mod settings;
pub mod surface;
pub mod telemetry;

pub use glitch::{EffectOutcome, GlitchEffect, GlitchError, GlitchScheduler, ParameterSet, RestoreReport, SchedulerState, SurfaceSnapshot};
pub use settings::{ConfigError, GlitchConfig, SettingsError, ValueRange};
pub use surface::{MaterialSurface, ParameterName, Surface, SurfaceArena, SurfaceError, SurfaceId};
pub use telemetry::{GlitchCounters, GlitchStats};
