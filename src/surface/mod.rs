//! Drawable surfaces and their glitch parameters
//!
//! The controller never renders anything itself. It reads and writes the
//! glitch shader's named float properties through the [`Surface`] trait and
//! keeps every tracked surface in a [`SurfaceArena`], addressed by a stable
//! [`SurfaceId`] rather than by object identity.

mod material;

pub use material::MaterialSurface;

use std::fmt;
use std::sync::Arc;

/// The material properties driven by the glitch shader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterName {
    /// Overall surface transparency
    Transparency,
    /// Alpha cutout threshold
    CutoutThreshold,
    /// Displacement amplitude
    Amplitude,
    /// Displacement speed
    Speed,
    /// Glitch blend amount
    Amount,
}

impl ParameterName {
    /// Every parameter, in capture/restore order
    pub const ALL: [ParameterName; 5] = [
        ParameterName::Transparency,
        ParameterName::CutoutThreshold,
        ParameterName::Amplitude,
        ParameterName::Speed,
        ParameterName::Amount,
    ];

    /// Property name as exposed by the material
    pub fn property_name(&self) -> &'static str {
        match self {
            ParameterName::Transparency => "_Transparency",
            ParameterName::CutoutThreshold => "_CutoutThresh",
            ParameterName::Amplitude => "_Amplitude",
            ParameterName::Speed => "_Speed",
            ParameterName::Amount => "_Amount",
        }
    }

    /// Get display name for logs
    pub fn display_name(&self) -> &'static str {
        match self {
            ParameterName::Transparency => "transparency",
            ParameterName::CutoutThreshold => "cutout threshold",
            ParameterName::Amplitude => "amplitude",
            ParameterName::Speed => "speed",
            ParameterName::Amount => "amount",
        }
    }
}

impl fmt::Display for ParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.property_name())
    }
}

/// Errors reported by a surface implementation
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceError {
    /// The material does not expose the named property
    MissingParameter { name: String },
    /// The surface has been destroyed or can no longer be written
    Unavailable,
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceError::MissingParameter { name } => write!(f, "material has no property '{}'", name),
            SurfaceError::Unavailable => write!(f, "surface is no longer available"),
        }
    }
}

impl std::error::Error for SurfaceError {}

/// A drawable object exposing named float parameters
///
/// Implementations use interior mutability: the snapshot and every running
/// effect hold shared references to the same surface.
pub trait Surface: Send + Sync {
    /// Human-readable label used in log output
    fn label(&self) -> &str {
        "surface"
    }

    /// Read a named float property
    fn get_parameter(&self, name: &str) -> Result<f32, SurfaceError>;

    /// Write a named float property
    fn set_parameter(&self, name: &str, value: f32) -> Result<(), SurfaceError>;
}

/// Stable index of a surface inside a [`SurfaceArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(usize);

impl SurfaceId {
    /// Position of the surface in its arena
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Indexed table of tracked surfaces
///
/// Ids are assigned in insertion order and never reused. Cloning the arena
/// shares the underlying surfaces.
#[derive(Clone, Default)]
pub struct SurfaceArena {
    surfaces: Vec<Arc<dyn Surface>>,
}

impl SurfaceArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a surface, returning its id
    ///
    /// Inserting a surface that is already tracked returns the existing id.
    pub fn insert(&mut self, surface: Arc<dyn Surface>) -> SurfaceId {
        if let Some(id) = self.position(&surface) {
            return id;
        }
        self.surfaces.push(surface);
        SurfaceId(self.surfaces.len() - 1)
    }

    /// Find the id of an already tracked surface
    pub fn position(&self, surface: &Arc<dyn Surface>) -> Option<SurfaceId> {
        let wanted = Arc::as_ptr(surface) as *const ();
        self.surfaces
            .iter()
            .position(|s| Arc::as_ptr(s) as *const () == wanted)
            .map(SurfaceId)
    }

    /// Get a tracked surface by id
    pub fn get(&self, id: SurfaceId) -> Option<&Arc<dyn Surface>> {
        self.surfaces.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// Iterate over surfaces with their ids
    pub fn iter(&self) -> impl Iterator<Item = (SurfaceId, &Arc<dyn Surface>)> {
        self.surfaces.iter().enumerate().map(|(i, s)| (SurfaceId(i), s))
    }
}

impl fmt::Debug for SurfaceArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.surfaces.iter().map(|s| s.label()))
            .finish()
    }
}

impl FromIterator<Arc<dyn Surface>> for SurfaceArena {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Surface>>>(iter: I) -> Self {
        let mut arena = SurfaceArena::new();
        for surface in iter {
            arena.insert(surface);
        }
        arena
    }
}
