//! The fixed rule table mapping a reference's syntactic context to a typed,
//! strength-graded dependency.

use uref_guid::DependencyKind;
use uref_guid::ReferenceStrength;

/// Human-readable names for the Unity class ids that matter to reference
/// typing and context reporting. Unknown ids are reported numerically.
#[must_use]
pub fn class_name(class_id: i64) -> Option<&'static str> {
    Some(match class_id {
        1 => "GameObject",
        2 => "Component",
        4 => "Transform",
        20 => "Camera",
        21 => "Material",
        23 => "MeshRenderer",
        28 => "Texture2D",
        33 => "MeshFilter",
        43 => "Mesh",
        48 => "Shader",
        54 => "Rigidbody",
        64 => "MeshCollider",
        65 => "BoxCollider",
        74 => "AnimationClip",
        81 => "AudioListener",
        82 => "AudioSource",
        83 => "AudioClip",
        90 => "Avatar",
        91 => "AnimatorController",
        95 => "Animator",
        108 => "Light",
        114 => "MonoBehaviour",
        115 => "MonoScript",
        128 => "Font",
        137 => "SkinnedMeshRenderer",
        198 => "ParticleSystem",
        212 => "SpriteRenderer",
        213 => "Sprite",
        224 => "RectTransform",
        1001 => "PrefabInstance",
        1660057539 => "SceneRoots",
        _ => return None,
    })
}

/// Types one reference from its owning class id and property context.
///
/// The table is keyed on the property chain first (the property a reference
/// sits under says more than the component holding it), then on the class id.
/// Anything unmatched is an `indirect`/`weak` edge, which keeps unknown Unity
/// constructs visible in the graph without overstating their importance.
#[must_use]
pub fn classify(
    class_id: i64,
    context_path: Option<&str>,
    property_name: Option<&str>,
) -> (DependencyKind, ReferenceStrength) {
    let property = property_name.unwrap_or("");
    let context = context_path.unwrap_or("");

    if property == "m_Script" {
        return (DependencyKind::Script, ReferenceStrength::Critical);
    }

    if property == "m_Shader" {
        return (DependencyKind::Shader, ReferenceStrength::Important);
    }

    if context.contains("m_Materials") || context.contains("m_SharedMaterial") || property == "m_Material" {
        return (DependencyKind::Material, ReferenceStrength::Strong);
    }

    if property == "m_Mesh" || property == "m_SharedMesh" {
        return (DependencyKind::Mesh, ReferenceStrength::Strong);
    }

    if property == "m_Sprite" || property == "m_MainTex" || property.contains("Texture") || context.contains("m_Textures")
    {
        return (DependencyKind::Texture, ReferenceStrength::Medium);
    }

    if property == "m_AudioClip" || (class_id == 82 && property.ends_with("Clip")) {
        return (DependencyKind::Audio, ReferenceStrength::Medium);
    }

    if property == "m_Controller" || property == "m_AnimatorController" {
        return (DependencyKind::Animation, ReferenceStrength::Strong);
    }

    if property == "m_Motion" || context.contains("m_Motions") || context.contains("m_AnimationClips") {
        return (DependencyKind::Animation, ReferenceStrength::Medium);
    }

    if class_id == 1001 && (property == "m_SourcePrefab" || property == "m_ParentPrefab") {
        return (DependencyKind::PrefabInstance, ReferenceStrength::Important);
    }

    if property == "m_SceneAsset" || context.contains("m_Scenes") {
        return (DependencyKind::SceneInstance, ReferenceStrength::Important);
    }

    if property == "m_Font" {
        return (DependencyKind::Indirect, ReferenceStrength::Medium);
    }

    // A MonoBehaviour field that is none of the above is almost always a
    // serialized ScriptableObject slot.
    if class_id == 114 {
        return (DependencyKind::ScriptableObject, ReferenceStrength::Medium);
    }

    (DependencyKind::Indirect, ReferenceStrength::Weak)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_slot_on_renderer() {
        assert_eq!(
            classify(23, Some("MeshRenderer.m_Materials[0]"), Some("m_Materials")),
            (DependencyKind::Material, ReferenceStrength::Strong)
        );
    }

    #[test]
    fn test_shader_slot_on_material() {
        assert_eq!(
            classify(21, Some("Material.m_Shader"), Some("m_Shader")),
            (DependencyKind::Shader, ReferenceStrength::Important)
        );
    }

    #[test]
    fn test_script_slot_is_critical() {
        assert_eq!(
            classify(114, Some("MonoBehaviour.m_Script"), Some("m_Script")),
            (DependencyKind::Script, ReferenceStrength::Critical)
        );
    }

    #[test]
    fn test_unmatched_context_defaults_to_indirect_weak() {
        assert_eq!(
            classify(4, Some("Transform.m_Father"), Some("m_Father")),
            (DependencyKind::Indirect, ReferenceStrength::Weak)
        );
    }

    #[test]
    fn test_class_names() {
        assert_eq!(class_name(21), Some("Material"));
        assert_eq!(class_name(1001), Some("PrefabInstance"));
        assert_eq!(class_name(999_999), None);
    }
}
