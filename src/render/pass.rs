// render/pass.rs
//! Draws render lists with one material pass at a time.

use std::sync::Arc;

use crate::gpu::RenderBackend;
use crate::material::{FrameContext, MaterialPass, PassType};
use crate::math::LightBounds;

use super::item::{ItemId, RenderItemArena};

/// Draws every item in `list` that has `pass_type`, binding each distinct pass once.
/// Returns the number of draw calls issued.
pub fn render_pass(
    ctx: &mut dyn RenderBackend,
    frame: &FrameContext<'_>,
    pass_type: PassType,
    arena: &RenderItemArena,
    list: &[ItemId],
) -> usize {
    render_pass_filtered(ctx, frame, pass_type, arena, list, None)
}

/// Like [`render_pass`], but skips items outside `bounds` and items whose material does not
/// accept the frame's light.
pub fn render_pass_in_bounds(
    ctx: &mut dyn RenderBackend,
    frame: &FrameContext<'_>,
    pass_type: PassType,
    arena: &RenderItemArena,
    list: &[ItemId],
    bounds: &LightBounds,
) -> usize {
    render_pass_filtered(ctx, frame, pass_type, arena, list, Some(bounds))
}

fn render_pass_filtered(
    ctx: &mut dyn RenderBackend,
    frame: &FrameContext<'_>,
    pass_type: PassType,
    arena: &RenderItemArena,
    list: &[ItemId],
    bounds: Option<&LightBounds>,
) -> usize {
    let mut bound: Option<&Arc<dyn MaterialPass>> = None;
    // false when the bound pass refused to draw
    let mut bound_ok = false;
    let mut draws = 0;

    for item in arena.resolve(list) {
        let Some(pass) = item.material.pass(pass_type) else {
            continue;
        };
        if let Some(light) = frame.light {
            if !item.material.accepts_light(light.entity) {
                continue;
            }
        }
        if let Some(bounds) = bounds {
            if !bounds.intersects_aabb(&item.world_bounds) {
                continue;
            }
        }

        let same_pass = bound.is_some_and(|current| Arc::ptr_eq(current, pass));
        if !same_pass {
            bound = Some(pass);
            bound_ok = pass.update_pass_render_state(ctx, frame);
            if !bound_ok {
                log::trace!("Pass '{}' not ready, skipping its items", pass.label());
            }
        }
        if !bound_ok {
            continue;
        }

        pass.update_instance_render_state(ctx, frame.camera, item, frame.light);
        ctx.draw_mesh(item.mesh);
        draws += 1;
    }
    draws
}
