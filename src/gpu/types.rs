use std::borrow::Cow;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::handle::Handle;

pub struct GpuTexture;
pub struct GpuDepthBuffer;
pub struct GpuFrameBuffer;
pub struct GpuProgram;
pub struct GpuMesh;

pub type TextureHandle = Handle<GpuTexture>;
pub type DepthBufferHandle = Handle<GpuDepthBuffer>;
pub type FrameBufferHandle = Handle<GpuFrameBuffer>;
pub type ProgramHandle = Handle<GpuProgram>;
pub type MeshHandle = Handle<GpuMesh>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
    R32Float,
    Rg32Float,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm | TextureFormat::R32Float => 4,
            TextureFormat::Rgba16Float | TextureFormat::Rg32Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }

    pub fn is_float(self) -> bool {
        !matches!(self, TextureFormat::Rgba8Unorm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Nearest,
    Bilinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapMode {
    Clamp,
    Repeat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub label: Cow<'static, str>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub filter: TextureFilter,
    pub wrap: WrapMode,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const ALL = Self::COLOR.bits() | Self::DEPTH.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Alpha,
    Additive,
    Multiply,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);
    // normal/depth clear: furthest depth in blue and alpha
    pub const BLUE: Self = Self::new(0.0, 0.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// The presentation target supplied by the host.
    Output,
    FrameBuffer(FrameBufferHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub float_render_targets: bool,
    pub float32_filterable: bool,
    pub max_texture_size: u32,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            float_render_targets: true,
            float32_filterable: true,
            max_texture_size: 8192,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformScope {
    Pass,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    Mesh,
    Fullscreen,
}

/// A WGSL module plus the entry points that form one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSource {
    pub label: Cow<'static, str>,
    pub source: Cow<'static, str>,
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
    pub layout: VertexLayout,
}

impl ProgramSource {
    pub fn mesh(
        label: impl Into<Cow<'static, str>>,
        source: impl Into<Cow<'static, str>>,
        fragment_entry: &'static str,
    ) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
            vertex_entry: "vs_main",
            fragment_entry,
            layout: VertexLayout::Mesh,
        }
    }

    pub fn fullscreen(
        label: impl Into<Cow<'static, str>>,
        source: impl Into<Cow<'static, str>>,
        fragment_entry: &'static str,
    ) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
            vertex_entry: "vs_fullscreen",
            fragment_entry,
            layout: VertexLayout::Fullscreen,
        }
    }

    /// First entry point with no matching `fn` in the source.
    pub fn missing_entry_point(&self) -> Option<&'static str> {
        [self.vertex_entry, self.fragment_entry]
            .into_iter()
            .find(|entry| !self.source.contains(&format!("fn {entry}(")))
    }
}
