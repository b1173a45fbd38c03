use serde::Serialize;

/// Which color channels a draw writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColorWrite {
    None,
    Rgb,
    Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DepthTest {
    Less,
    LessEqual,
    Equal,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BlendMode {
    /// `src * a + dst * (1 - a)`.
    Alpha,
}

/// Face removed by culling. Front faces wind counter-clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CullFace {
    Back,
    Front,
}

/// Fixed-function state for one draw.
///
/// `depth_test: None` disables testing entirely; depth writes are still
/// governed by `depth_write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RenderState {
    pub color_write: ColorWrite,
    pub depth_write: bool,
    pub depth_test: Option<DepthTest>,
    pub blend: Option<BlendMode>,
    pub cull: Option<CullFace>,
}

impl RenderState {
    /// Opaque geometry: RGBA + depth write, depth less, back faces culled.
    pub const OPAQUE: RenderState = RenderState {
        color_write: ColorWrite::Rgba,
        depth_write: true,
        depth_test: Some(DepthTest::Less),
        blend: None,
        cull: Some(CullFace::Back),
    };

    /// Fullscreen blit: color only, no depth, no culling.
    pub const FULLSCREEN: RenderState = RenderState {
        color_write: ColorWrite::Rgb,
        depth_write: false,
        depth_test: None,
        blend: None,
        cull: None,
    };

    pub fn with_blend(mut self, blend: Option<BlendMode>) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_cull(mut self, cull: Option<CullFace>) -> Self {
        self.cull = cull;
        self
    }

    pub fn writes_depth(&self) -> bool {
        self.depth_write
    }
}

impl Default for RenderState {
    fn default() -> Self {
        Self::OPAQUE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_defaults() {
        let s = RenderState::default();
        assert!(s.depth_write);
        assert_eq!(s.depth_test, Some(DepthTest::Less));
        assert_eq!(s.cull, Some(CullFace::Back));
        assert!(s.blend.is_none());
    }

    #[test]
    fn fullscreen_never_touches_depth() {
        let s = RenderState::FULLSCREEN;
        assert!(!s.writes_depth());
        assert!(s.depth_test.is_none());
        assert_eq!(s.color_write, ColorWrite::Rgb);
    }

    #[test]
    fn builders_override_fields() {
        let s = RenderState::OPAQUE
            .with_blend(Some(BlendMode::Alpha))
            .with_cull(None);
        assert_eq!(s.blend, Some(BlendMode::Alpha));
        assert!(s.cull.is_none());
        assert!(s.depth_write);
    }
}
