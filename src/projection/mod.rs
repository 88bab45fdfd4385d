pub mod build;
pub mod render;

pub use build::{
    apply_embed_overrides, apply_field_overrides, build_default_projection, with_render_fields, ProjectionConfig,
};
pub use render::Renderer;
