use prism_common::DebugBuffer;
use prism_render::TextureFormat;

/// Geometry buffer attachments. The ordinal is the attachment index that
/// later passes sample by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GBufferAttachment {
    DiffuseRoughness = 0,
    /// Octahedral encoded normal.
    Normal = 1,
    FresnelMetallic = 2,
    EmissiveOcclusion = 3,
    Depth = 4,
}

impl GBufferAttachment {
    pub const COUNT: usize = 5;

    pub const COLORS: [GBufferAttachment; 4] = [
        GBufferAttachment::DiffuseRoughness,
        GBufferAttachment::Normal,
        GBufferAttachment::FresnelMetallic,
        GBufferAttachment::EmissiveOcclusion,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn format(self) -> TextureFormat {
        match self {
            GBufferAttachment::Normal => TextureFormat::Rg16F,
            GBufferAttachment::Depth => TextureFormat::Depth32F,
            _ => TextureFormat::Rgba8,
        }
    }

    /// Attachment shown for a debug selection; `None` means the shaded image.
    pub fn for_debug(buffer: DebugBuffer) -> Option<GBufferAttachment> {
        match buffer {
            DebugBuffer::None => None,
            DebugBuffer::DiffuseRoughness => Some(GBufferAttachment::DiffuseRoughness),
            DebugBuffer::Normal => Some(GBufferAttachment::Normal),
            DebugBuffer::FresnelMetallic => Some(GBufferAttachment::FresnelMetallic),
            DebugBuffer::EmissiveOcclusion => Some(GBufferAttachment::EmissiveOcclusion),
            DebugBuffer::Depth => Some(GBufferAttachment::Depth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_are_fixed() {
        assert_eq!(GBufferAttachment::DiffuseRoughness.index(), 0);
        assert_eq!(GBufferAttachment::Normal.index(), 1);
        assert_eq!(GBufferAttachment::FresnelMetallic.index(), 2);
        assert_eq!(GBufferAttachment::EmissiveOcclusion.index(), 3);
        assert_eq!(GBufferAttachment::Depth.index(), 4);
    }

    #[test]
    fn only_depth_is_a_depth_format() {
        for a in GBufferAttachment::COLORS {
            assert!(!a.format().is_depth());
        }
        assert!(GBufferAttachment::Depth.format().is_depth());
    }

    #[test]
    fn every_debug_channel_maps_to_an_attachment() {
        assert_eq!(GBufferAttachment::for_debug(DebugBuffer::None), None);
        let mapped: Vec<_> = DebugBuffer::ALL[1..]
            .iter()
            .filter_map(|b| GBufferAttachment::for_debug(*b))
            .collect();
        assert_eq!(mapped.len(), GBufferAttachment::COUNT);
    }
}
