//! Selection geometry and masked compositing.
//!
//! * [`geometry`] - stencils, outlines, regions and the boundary tracer that
//!   converts between them, plus boolean outline combining.
//! * [`selection`] - the base / continuation / transform selection state.
//! * [`masked`] - pixels lifted out from under a mask and drawn back through
//!   an affine transform.
//! * [`history`], [`io`], [`settings`], [`logger`] - undo, persistence,
//!   configuration and the session log.

pub mod logger;

pub mod cli;
pub mod error;
pub mod geometry;
pub mod history;
pub mod io;
pub mod masked;
pub mod selection;
pub mod settings;

pub use error::{Error, Result};
pub use geometry::{Affine, CombineMode, FillRule, Outline, Point, PointF, Rect, RectF, Region};
pub use masked::{MaskedBuffer, Sampling};
pub use selection::{Selection, SelectionData};
