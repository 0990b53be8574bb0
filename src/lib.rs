//! Software rasterization renderer: a geometric kernel, per-triangle scan
//! conversion behind a programmable shader contract, and a multi-pass
//! pipeline (shadow, geometry, lighting, supersampling resolve).

pub mod buffer;
pub mod geometry;
pub mod pipeline;
pub mod raster;
pub mod scene;
pub mod shader;
