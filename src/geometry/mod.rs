//! Selection geometry: stencils, outlines, regions and the conversions
//! between them.

pub mod combine;
pub mod matrix;
pub mod outline;
pub mod rect;
pub mod region;
pub mod stencil;
pub mod tracer;

pub use combine::{combine, combine_regions, CombineMode};
pub use matrix::{Affine, MatrixOrder};
pub use outline::{FillRule, Outline, OutlineData};
pub use rect::{Point, PointF, Rect, RectF, Scanline};
pub use region::{Operand, Region};
pub use stencil::BitMatrix;
pub use tracer::{polygon_scans, rasterize, rasterize_into, trace, trace_polygons};
