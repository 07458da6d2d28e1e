//! Glitch controller
//!
//! Randomly perturbs the glitch parameters of a set of surfaces for short
//! bursts and always puts the original values back.
//!
//! # Architecture
//!
//! - **Snapshot** (`snapshot.rs`): baseline capture and idempotent restore
//! - **Effect** (`effect.rs`): one randomized glitch with a cancellable wait
//! - **Scheduler** (`scheduler.rs`): Idle/Active state machine, tick loop and
//!   the set of in-flight effects
//!
//! # Usage
//!
//! ```ignore
//! let mut arena = SurfaceArena::new();
//! arena.insert(Arc::new(MaterialSurface::glitch_ready("hologram")));
//!
//! let mut scheduler = GlitchScheduler::new(arena, GlitchConfig::load());
//! scheduler.start()?;
//! // ... later, before the surfaces go away
//! scheduler.stop().await;
//! ```

mod effect;
mod error;
mod scheduler;
mod snapshot;

pub use effect::*;
pub use error::*;
pub use scheduler::*;
pub use snapshot::*;
