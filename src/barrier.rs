//! Explicit synchronization declarations for the frame pipeline.
//!
//! wgpu resolves the actual GPU hazards at pass boundaries, but the frame
//! pipeline still *declares* every cross-pass dependency it relies on: which
//! stage produced data and which stage consumes it next. The declarations are
//! recorded in submission order into a [`BarrierTimeline`] while the frame is
//! encoded, and [`BarrierTimeline::validate`] checks that each pass was
//! preceded by the transitions it needs. Debug builds assert this every
//! frame; tests observe the timeline directly.

use crate::gbuffer::TargetImage;
use crate::resources::allocator::DeviceAddress;

/// Pipeline stages that appear as barrier endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transfer,
    VertexShader,
    FragmentShader,
    ColorAttachment,
    ComputeShader,
    AllGraphics,
}

/// Image layouts the render targets move between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLayout {
    /// Readable/writable by compute (storage) access.
    General,
    /// Bound as a color attachment of a raster pass.
    ColorAttachment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Barrier {
    /// Make `src`-stage accesses of one buffer complete before `dst`-stage
    /// accesses begin.
    Buffer {
        buffer: DeviceAddress,
        src: Stage,
        dst: Stage,
    },
    /// Transition a render target between layouts.
    Image {
        image: TargetImage,
        from: ImageLayout,
        to: ImageLayout,
    },
    /// Global execution + memory dependency.
    Memory { src: Stage, dst: Stage },
}

/// The work items the frame pipeline encodes, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    UniformWrite,
    Sky,
    Geometry,
    Tonemap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPoint {
    Barrier(Barrier),
    Pass(Pass),
}

/// Ordered record of one frame's declared synchronization.
#[derive(Debug, Default)]
pub struct BarrierTimeline {
    points: Vec<SyncPoint>,
}

impl BarrierTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_frame(&mut self) {
        self.points.clear();
    }

    pub fn record_barrier(&mut self, barrier: Barrier) {
        self.points.push(SyncPoint::Barrier(barrier));
    }

    pub fn record_pass(&mut self, pass: Pass) {
        self.points.push(SyncPoint::Pass(pass));
    }

    pub fn points(&self) -> &[SyncPoint] {
        &self.points
    }

    fn position_of(&self, pass: Pass) -> Option<usize> {
        self.points
            .iter()
            .position(|p| *p == SyncPoint::Pass(pass))
    }

    /// Check the recorded frame against the ordering contract:
    ///
    /// 1. The uniform write is fenced on both sides (shading reads of the
    ///    previous frame drained before the write, the write made visible to
    ///    shading reads after).
    /// 2. The geometry pass only begins after the rendered target moved to
    ///    the color-attachment layout, and after the sky pass if one ran.
    /// 3. The tonemap pass only reads the rendered target after the geometry
    ///    pass released it back to the general layout.
    /// 4. The tonemapped result is made visible past the compute stage.
    pub fn validate(&self) -> Result<(), String> {
        let uniform = self
            .position_of(Pass::UniformWrite)
            .ok_or("frame recorded no uniform write")?;
        let before_ok = uniform > 0
            && matches!(
                self.points[uniform - 1],
                SyncPoint::Barrier(Barrier::Buffer { dst: Stage::Transfer, .. })
            );
        if !before_ok {
            return Err("uniform write without a preceding read-drain barrier".into());
        }
        let after_ok = matches!(
            self.points.get(uniform + 1),
            Some(SyncPoint::Barrier(Barrier::Buffer {
                src: Stage::Transfer,
                dst: Stage::FragmentShader,
                ..
            }))
        );
        if !after_ok {
            return Err("uniform write not made visible to shading reads".into());
        }

        let geometry = self
            .position_of(Pass::Geometry)
            .ok_or("frame recorded no geometry pass")?;
        let to_attachment = self.points[..geometry].iter().rposition(|p| {
            matches!(
                p,
                SyncPoint::Barrier(Barrier::Image {
                    image: TargetImage::Rendered,
                    to: ImageLayout::ColorAttachment,
                    ..
                })
            )
        });
        let Some(to_attachment) = to_attachment else {
            return Err("geometry pass began without an attachment-layout transition".into());
        };
        if let Some(sky) = self.position_of(Pass::Sky) {
            if sky > to_attachment {
                return Err("sky output not transitioned before the geometry pass".into());
            }
        }

        if let Some(tonemap) = self.position_of(Pass::Tonemap) {
            let released = self.points[geometry..tonemap].iter().any(|p| {
                matches!(
                    p,
                    SyncPoint::Barrier(Barrier::Image {
                        image: TargetImage::Rendered,
                        from: ImageLayout::ColorAttachment,
                        to: ImageLayout::General,
                    })
                )
            });
            if !released {
                return Err(
                    "tonemap dispatched before the geometry write-barrier was recorded".into(),
                );
            }
            let displayed = self.points[tonemap..].iter().any(|p| {
                matches!(
                    p,
                    SyncPoint::Barrier(Barrier::Memory {
                        src: Stage::ComputeShader,
                        ..
                    })
                )
            });
            if !displayed {
                return Err("tonemap result not made visible past the compute stage".into());
            }
        }
        Ok(())
    }

    /// Debug-build assertion used by the frame pipeline after encoding.
    pub fn debug_validate(&self) {
        if cfg!(debug_assertions) {
            if let Err(msg) = self.validate() {
                panic!("barrier timeline violation: {msg}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_info() -> DeviceAddress {
        DeviceAddress(0x0001_0000_0000_0007)
    }

    fn well_formed(with_sky: bool) -> BarrierTimeline {
        let mut t = BarrierTimeline::new();
        t.record_barrier(Barrier::Buffer {
            buffer: scene_info(),
            src: Stage::FragmentShader,
            dst: Stage::Transfer,
        });
        t.record_pass(Pass::UniformWrite);
        t.record_barrier(Barrier::Buffer {
            buffer: scene_info(),
            src: Stage::Transfer,
            dst: Stage::FragmentShader,
        });
        if with_sky {
            t.record_pass(Pass::Sky);
        }
        t.record_barrier(Barrier::Image {
            image: TargetImage::Rendered,
            from: ImageLayout::General,
            to: ImageLayout::ColorAttachment,
        });
        t.record_pass(Pass::Geometry);
        t.record_barrier(Barrier::Image {
            image: TargetImage::Rendered,
            from: ImageLayout::ColorAttachment,
            to: ImageLayout::General,
        });
        t.record_pass(Pass::Tonemap);
        t.record_barrier(Barrier::Memory {
            src: Stage::ComputeShader,
            dst: Stage::AllGraphics,
        });
        t
    }

    #[test]
    fn accepts_a_well_formed_frame() {
        well_formed(false).validate().unwrap();
        well_formed(true).validate().unwrap();
    }

    #[test]
    fn rejects_uniform_write_without_drain() {
        let mut t = BarrierTimeline::new();
        t.record_pass(Pass::UniformWrite);
        assert!(t.validate().is_err());
    }

    #[test]
    fn rejects_tonemap_before_geometry_release() {
        let mut t = BarrierTimeline::new();
        t.record_barrier(Barrier::Buffer {
            buffer: scene_info(),
            src: Stage::FragmentShader,
            dst: Stage::Transfer,
        });
        t.record_pass(Pass::UniformWrite);
        t.record_barrier(Barrier::Buffer {
            buffer: scene_info(),
            src: Stage::Transfer,
            dst: Stage::FragmentShader,
        });
        t.record_barrier(Barrier::Image {
            image: TargetImage::Rendered,
            from: ImageLayout::General,
            to: ImageLayout::ColorAttachment,
        });
        t.record_pass(Pass::Geometry);
        // Missing ColorAttachment -> General release before the dispatch.
        t.record_pass(Pass::Tonemap);
        t.record_barrier(Barrier::Memory {
            src: Stage::ComputeShader,
            dst: Stage::AllGraphics,
        });
        assert!(t.validate().is_err());
    }

    #[test]
    fn rejects_sky_after_attachment_transition() {
        let mut t = BarrierTimeline::new();
        t.record_barrier(Barrier::Buffer {
            buffer: scene_info(),
            src: Stage::FragmentShader,
            dst: Stage::Transfer,
        });
        t.record_pass(Pass::UniformWrite);
        t.record_barrier(Barrier::Buffer {
            buffer: scene_info(),
            src: Stage::Transfer,
            dst: Stage::FragmentShader,
        });
        t.record_barrier(Barrier::Image {
            image: TargetImage::Rendered,
            from: ImageLayout::General,
            to: ImageLayout::ColorAttachment,
        });
        t.record_pass(Pass::Sky);
        t.record_pass(Pass::Geometry);
        assert!(t.validate().is_err());
    }

    #[test]
    fn begin_frame_clears_previous_records() {
        let mut t = well_formed(true);
        t.begin_frame();
        assert!(t.points().is_empty());
    }
}
