use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown animation: {name}")]
    UnknownAnimation { name: String },

    #[error("unknown skin: {name}")]
    UnknownSkin { name: String },

    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    #[error("unsupported Spine version '{value}' (only 3.8.x exports are supported)")]
    UnsupportedVersion { value: String },

    #[cfg(feature = "json")]
    #[error("failed to parse Spine JSON: {message}")]
    JsonParse { message: String },

    #[cfg(feature = "binary")]
    #[error("failed to parse Spine binary: {message}")]
    BinaryParse { message: String },

    #[error("failed to parse Spine atlas: {message}")]
    AtlasParse { message: String },

    #[error("invalid color '{value}' for {context}")]
    InvalidColor { context: String, value: String },

    #[error("invalid curve for {context}: {message}")]
    InvalidCurve { context: String, message: String },

    #[error("unknown parent bone '{parent}' for bone '{bone}'")]
    UnknownBoneParent { bone: String, parent: String },

    #[error("bone '{bone}' must be declared after its parent")]
    BoneOrder { bone: String },

    #[error("unknown bone '{bone}' referenced by {context}")]
    UnknownBone { context: String, bone: String },

    #[error("unknown slot '{slot}' referenced by {context}")]
    UnknownSlot { context: String, slot: String },

    #[error("unknown skin '{skin}' referenced by {context}")]
    UnknownSkinReference { context: String, skin: String },

    #[error("unknown event '{event}' referenced by {context}")]
    UnknownEvent { context: String, event: String },

    #[error("unknown {kind} constraint '{constraint}' referenced by {context}")]
    UnknownConstraint {
        context: String,
        kind: &'static str,
        constraint: String,
    },

    #[error(
        "unknown attachment '{attachment}' (skin '{skin}', slot '{slot}') referenced by {context}"
    )]
    UnknownAttachment {
        context: String,
        skin: String,
        slot: String,
        attachment: String,
    },

    #[error("unsupported {field} '{value}' for {context}")]
    UnsupportedValue {
        context: String,
        field: &'static str,
        value: String,
    },

    #[error(
        "invalid vertex data for skin '{skin}', slot '{slot}', attachment '{attachment}': {message}"
    )]
    InvalidVertexData {
        skin: String,
        slot: String,
        attachment: String,
        message: String,
    },

    #[error(
        "linked mesh '{attachment}' (skin '{skin}', slot '{slot}') has no parent mesh '{parent}'"
    )]
    LinkedMeshParent {
        skin: String,
        slot: String,
        attachment: String,
        parent: String,
    },

    #[error("invalid draw order for animation '{animation}': {message}")]
    InvalidDrawOrder { animation: String, message: String },

    #[error("atlas has no region '{region}' for attachment '{attachment}'")]
    MissingAtlasRegion { attachment: String, region: String },
}
