/// Per-frame counters, reset at the start of every [`Renderer::render`](super::Renderer::render).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RendererStats {
    pub opaque_items: u32,
    pub transparent_items: u32,
    pub light_count: u32,
    pub shadow_draw_calls: u32,
    pub normal_depth_draw_calls: u32,
    pub depth_prepass_draw_calls: u32,
    pub opaque_draw_calls: u32,
    pub transparent_draw_calls: u32,
    pub effect_draw_calls: u32,
    pub composite_draw_calls: u32,
}

impl RendererStats {
    pub fn total_draw_calls(&self) -> u32 {
        self.shadow_draw_calls
            + self.normal_depth_draw_calls
            + self.depth_prepass_draw_calls
            + self.opaque_draw_calls
            + self.transparent_draw_calls
            + self.effect_draw_calls
            + self.composite_draw_calls
    }
}
