/**
 * The GPU pass programs of the frame pipeline: the geometry raster pipeline
 * and the two compute passes (procedural sky, tonemap) that bracket it.
 */
pub mod geometry;
pub mod sky;
pub mod tonemap;
