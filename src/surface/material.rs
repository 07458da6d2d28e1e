//! In-memory material surface
//!
//! Stores named float properties the way a GPU material does, without any
//! rendering. Used by the demo host and by tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{ParameterName, Surface, SurfaceError};

/// A surface backed by a property map
#[derive(Debug)]
pub struct MaterialSurface {
    label: String,
    properties: RwLock<HashMap<String, f32>>,
    destroyed: AtomicBool,
    writes: AtomicUsize,
}

impl MaterialSurface {
    /// Create a surface with no properties
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            properties: RwLock::new(HashMap::new()),
            destroyed: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// Create a surface exposing every glitch parameter, all set to 0.0
    pub fn glitch_ready(label: impl Into<String>) -> Self {
        let surface = Self::new(label);
        for name in ParameterName::ALL {
            surface.define(name.property_name(), 0.0);
        }
        surface
    }

    /// Define or overwrite a property without counting it as a write
    pub fn define(&self, name: &str, value: f32) {
        if let Ok(mut props) = self.properties.write() {
            props.insert(name.to_string(), value);
        }
    }

    /// Remove a property, as when a material is swapped for one without it
    pub fn remove(&self, name: &str) -> Option<f32> {
        self.properties.write().ok()?.remove(name)
    }

    /// Read a property directly, ignoring the destroyed flag
    pub fn property(&self, name: &str) -> Option<f32> {
        self.properties.read().ok()?.get(name).copied()
    }

    /// Read one of the glitch parameters directly
    pub fn parameter(&self, name: ParameterName) -> Option<f32> {
        self.property(name.property_name())
    }

    /// Mark the surface as destroyed; later reads and writes fail
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Number of successful parameter writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Surface for MaterialSurface {
    fn label(&self) -> &str {
        &self.label
    }

    fn get_parameter(&self, name: &str) -> Result<f32, SurfaceError> {
        if self.is_destroyed() {
            return Err(SurfaceError::Unavailable);
        }
        let props = self.properties.read().map_err(|_| SurfaceError::Unavailable)?;
        props.get(name).copied().ok_or_else(|| SurfaceError::MissingParameter {
            name: name.to_string(),
        })
    }

    fn set_parameter(&self, name: &str, value: f32) -> Result<(), SurfaceError> {
        if self.is_destroyed() {
            return Err(SurfaceError::Unavailable);
        }
        let mut props = self.properties.write().map_err(|_| SurfaceError::Unavailable)?;
        match props.get_mut(name) {
            Some(slot) => {
                *slot = value;
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(SurfaceError::MissingParameter { name: name.to_string() }),
        }
    }
}
