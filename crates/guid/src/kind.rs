//! Closed classification enums for nodes, edges, and importers.

use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumString;

/// The broad category of an asset, derived from its file extension and its
/// importer kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AssetKind {
    Texture,
    Model,
    Script,
    Scene,
    Prefab,
    Material,
    Shader,
    Audio,
    Animation,
    AnimatorController,
    Font,
    Video,
    ShaderGraph,
    ScriptableObject,
    Native,
    Unknown,
}

impl AssetKind {
    /// Classifies an asset by its (lowercased, dot-free) file extension.
    ///
    /// `.asset` files default to [`AssetKind::ScriptableObject`]; the importer
    /// kind from the side-car meta can refine this via
    /// [`ImporterKind::asset_kind_hint`].
    #[must_use]
    pub fn from_extension(extension: &str) -> Self {
        match extension {
            "png" | "jpg" | "jpeg" | "tga" | "psd" | "tif" | "tiff" | "bmp" | "exr" | "hdr" | "gif" => Self::Texture,
            "fbx" | "obj" | "blend" | "dae" | "3ds" | "max" => Self::Model,
            "cs" => Self::Script,
            "unity" | "scene" => Self::Scene,
            "prefab" => Self::Prefab,
            "mat" => Self::Material,
            "shader" | "cginc" | "hlsl" | "compute" => Self::Shader,
            "wav" | "mp3" | "ogg" | "aiff" | "flac" => Self::Audio,
            "anim" => Self::Animation,
            "controller" | "overridecontroller" => Self::AnimatorController,
            "ttf" | "otf" | "fontsettings" => Self::Font,
            "mp4" | "mov" | "webm" | "avi" => Self::Video,
            "shadergraph" | "shadersubgraph" => Self::ShaderGraph,
            "asset" => Self::ScriptableObject,
            "dll" | "so" | "dylib" | "a" | "aar" | "jar" => Self::Native,
            _ => Self::Unknown,
        }
    }
}

/// The typed context of a dependency edge: what the reference *is* to the
/// referencing document, not what the target file happens to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DependencyKind {
    Script,
    Material,
    Texture,
    Mesh,
    Audio,
    Animation,
    PrefabInstance,
    SceneInstance,
    Shader,
    ScriptableObject,
    PathReference,
    Indirect,
}

/// How strongly a reference binds its source to its target.
///
/// The ordering is total and meaningful: queries filter on
/// `strength >= min_strength`, and break-edge selection prefers the weakest
/// edge in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReferenceStrength {
    Weak,
    Medium,
    Strong,
    Important,
    Critical,
}

/// The top-level importer key of a `.meta` file, naming the Unity subsystem
/// that ingests the asset.
///
/// Variant names serialize exactly as Unity spells them; anything outside the
/// enumerated set maps to [`ImporterKind::Unknown`] with a warning at parse
/// time rather than a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum ImporterKind {
    TextureImporter,
    ModelImporter,
    MonoImporter,
    NativeFormatImporter,
    DefaultImporter,
    PluginImporter,
    AssemblyDefinitionImporter,
    PackageManifestImporter,
    FontImporter,
    VideoClipImporter,
    ShaderImporter,
    ComputeShaderImporter,
    SpeedTreeImporter,
    SubstanceImporter,
    Unknown,
}

impl ImporterKind {
    /// The asset kind this importer implies, when it implies one.
    ///
    /// Extension-based classification wins when it is more specific; the hint
    /// resolves ambiguous extensions such as `.asset`.
    #[must_use]
    pub fn asset_kind_hint(self) -> Option<AssetKind> {
        match self {
            Self::TextureImporter => Some(AssetKind::Texture),
            Self::ModelImporter | Self::SpeedTreeImporter => Some(AssetKind::Model),
            Self::MonoImporter => Some(AssetKind::Script),
            Self::PluginImporter => Some(AssetKind::Native),
            Self::FontImporter => Some(AssetKind::Font),
            Self::VideoClipImporter => Some(AssetKind::Video),
            Self::ShaderImporter | Self::ComputeShaderImporter => Some(AssetKind::Shader),
            Self::SubstanceImporter => Some(AssetKind::Texture),
            Self::NativeFormatImporter
            | Self::DefaultImporter
            | Self::AssemblyDefinitionImporter
            | Self::PackageManifestImporter
            | Self::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_asset_kind_from_extension() {
        assert_eq!(AssetKind::from_extension("prefab"), AssetKind::Prefab);
        assert_eq!(AssetKind::from_extension("unity"), AssetKind::Scene);
        assert_eq!(AssetKind::from_extension("mat"), AssetKind::Material);
        assert_eq!(AssetKind::from_extension("asset"), AssetKind::ScriptableObject);
        assert_eq!(AssetKind::from_extension("weird"), AssetKind::Unknown);
    }

    #[test]
    fn test_asset_kind_round_trips_through_strings() {
        assert_eq!(AssetKind::AnimatorController.to_string(), "animator_controller");
        assert_eq!(AssetKind::from_str("animator_controller").unwrap(), AssetKind::AnimatorController);
    }

    #[test]
    fn test_strength_is_ordered() {
        assert!(ReferenceStrength::Weak < ReferenceStrength::Medium);
        assert!(ReferenceStrength::Medium < ReferenceStrength::Strong);
        assert!(ReferenceStrength::Strong < ReferenceStrength::Important);
        assert!(ReferenceStrength::Important < ReferenceStrength::Critical);
    }

    #[test]
    fn test_importer_kind_uses_unity_spelling() {
        assert_eq!(ImporterKind::from_str("TextureImporter").unwrap(), ImporterKind::TextureImporter);
        assert_eq!(ImporterKind::NativeFormatImporter.to_string(), "NativeFormatImporter");
        assert!(ImporterKind::from_str("FancyNewImporter").is_err());
    }
}
