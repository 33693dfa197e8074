pub mod pass;
pub mod shader;
pub mod standard;
pub mod uniforms;

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::gpu::RenderBackend;

pub use pass::{FrameContext, MaterialPass, PassType};
pub use shader::Shader;
pub use standard::{ShaderPass, StandardMaterial, SurfaceParams};

/// A pass table plus the flags the collector aggregates per frame.
pub struct Material {
    name: String,
    passes: [Option<Arc<dyn MaterialPass>>; PassType::COUNT],
    transparent: bool,
    needs_backbuffer: bool,
    needs_normal_depth: bool,
    needs_gbuffer: bool,
    // Written by the light assignment queue between frames.
    fixed_lights: RwLock<Option<Vec<hecs::Entity>>>,
}

impl fmt::Debug for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let passes: Vec<PassType> = PassType::ALL
            .iter()
            .copied()
            .filter(|pass| self.has_pass(*pass))
            .collect();
        f.debug_struct("Material")
            .field("name", &self.name)
            .field("passes", &passes)
            .field("transparent", &self.transparent)
            .finish()
    }
}

impl Material {
    pub fn builder(name: impl Into<String>) -> MaterialBuilder {
        MaterialBuilder {
            material: Material {
                name: name.into(),
                passes: Default::default(),
                transparent: false,
                needs_backbuffer: false,
                needs_normal_depth: false,
                needs_gbuffer: false,
                fixed_lights: RwLock::new(None),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_pass(&self, pass_type: PassType) -> bool {
        self.passes[pass_type.index()].is_some()
    }

    pub fn pass(&self, pass_type: PassType) -> Option<&Arc<dyn MaterialPass>> {
        self.passes[pass_type.index()].as_ref()
    }

    pub fn has_lit_pass(&self) -> bool {
        PassType::LIT.iter().any(|pass| self.has_pass(*pass))
    }

    /// The pass a collected item is tagged with: base if present, otherwise the first lit pass.
    pub fn primary_pass(&self) -> Option<PassType> {
        if self.has_pass(PassType::Base) {
            return Some(PassType::Base);
        }
        PassType::LIT.iter().copied().find(|pass| self.has_pass(*pass))
    }

    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    pub fn needs_backbuffer(&self) -> bool {
        self.needs_backbuffer
    }

    pub fn needs_normal_depth(&self) -> bool {
        self.needs_normal_depth
    }

    pub fn needs_gbuffer(&self) -> bool {
        self.needs_gbuffer
    }

    /// Restricts lighting to the given lights. `None` accepts every light.
    pub fn set_fixed_lights(&self, lights: Option<Vec<hecs::Entity>>) {
        *self.fixed_lights.write() = lights;
    }

    pub fn fixed_lights(&self) -> Option<Vec<hecs::Entity>> {
        self.fixed_lights.read().clone()
    }

    pub fn accepts_light(&self, light: hecs::Entity) -> bool {
        match &*self.fixed_lights.read() {
            Some(lights) => lights.contains(&light),
            None => true,
        }
    }

    pub fn dispose(&self, ctx: &mut dyn RenderBackend) {
        for pass in self.passes.iter().flatten() {
            pass.dispose(ctx);
        }
    }
}

pub struct MaterialBuilder {
    material: Material,
}

impl MaterialBuilder {
    pub fn with_pass(mut self, pass_type: PassType, pass: Arc<dyn MaterialPass>) -> Self {
        self.material.passes[pass_type.index()] = Some(pass);
        self
    }

    pub fn transparent(mut self, transparent: bool) -> Self {
        self.material.transparent = transparent;
        self
    }

    pub fn needs_backbuffer(mut self, value: bool) -> Self {
        self.material.needs_backbuffer = value;
        self
    }

    pub fn needs_normal_depth(mut self, value: bool) -> Self {
        self.material.needs_normal_depth = value;
        self
    }

    pub fn needs_gbuffer(mut self, value: bool) -> Self {
        self.material.needs_gbuffer = value;
        self
    }

    pub fn build(self) -> Material {
        self.material
    }
}
