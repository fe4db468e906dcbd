//! Attribute type tags and the dynamically-typed value union

use serde::{Deserialize, Serialize};

pub type TypeId = u32;

/// Attribute type tag as stored in LSF `typeAndLength` words and LSX
/// `type` attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum AttrType {
    None = 0,
    Byte = 1,
    Short = 2,
    UShort = 3,
    Int = 4,
    UInt = 5,
    Float = 6,
    Double = 7,
    IVec2 = 8,
    IVec3 = 9,
    IVec4 = 10,
    Vec2 = 11,
    Vec3 = 12,
    Vec4 = 13,
    Mat2 = 14,
    Mat3 = 15,
    Mat3x4 = 16,
    Mat4x3 = 17,
    Mat4 = 18,
    Bool = 19,
    String = 20,
    Path = 21,
    FixedString = 22,
    LSString = 23,
    ULongLong = 24,
    ScratchBuffer = 25,
    Long = 26,
    Int8 = 27,
    TranslatedString = 28,
    WString = 29,
    LSWString = 30,
    Uuid = 31,
    Int64 = 32,
    TranslatedFSString = 33,
}

impl AttrType {
    pub const MAX_ID: TypeId = 33;

    #[must_use]
    pub fn from_id(id: TypeId) -> Option<Self> {
        Some(match id {
            0 => Self::None,
            1 => Self::Byte,
            2 => Self::Short,
            3 => Self::UShort,
            4 => Self::Int,
            5 => Self::UInt,
            6 => Self::Float,
            7 => Self::Double,
            8 => Self::IVec2,
            9 => Self::IVec3,
            10 => Self::IVec4,
            11 => Self::Vec2,
            12 => Self::Vec3,
            13 => Self::Vec4,
            14 => Self::Mat2,
            15 => Self::Mat3,
            16 => Self::Mat3x4,
            17 => Self::Mat4x3,
            18 => Self::Mat4,
            19 => Self::Bool,
            20 => Self::String,
            21 => Self::Path,
            22 => Self::FixedString,
            23 => Self::LSString,
            24 => Self::ULongLong,
            25 => Self::ScratchBuffer,
            26 => Self::Long,
            27 => Self::Int8,
            28 => Self::TranslatedString,
            29 => Self::WString,
            30 => Self::LSWString,
            31 => Self::Uuid,
            32 => Self::Int64,
            33 => Self::TranslatedFSString,
            _ => return None,
        })
    }

    #[must_use]
    pub fn id(self) -> TypeId {
        self as TypeId
    }

    /// Human-readable name, as used for the LSX `type` attribute.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Byte => "Byte",
            Self::Short => "Short",
            Self::UShort => "UShort",
            Self::Int => "Int",
            Self::UInt => "UInt",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::IVec2 => "IVec2",
            Self::IVec3 => "IVec3",
            Self::IVec4 => "IVec4",
            Self::Vec2 => "Vec2",
            Self::Vec3 => "Vec3",
            Self::Vec4 => "Vec4",
            Self::Mat2 => "Mat2",
            Self::Mat3 => "Mat3",
            Self::Mat3x4 => "Mat3x4",
            Self::Mat4x3 => "Mat4x3",
            Self::Mat4 => "Mat4",
            Self::Bool => "Bool",
            Self::String => "String",
            Self::Path => "Path",
            Self::FixedString => "FixedString",
            Self::LSString => "LSString",
            Self::ULongLong => "ULongLong",
            Self::ScratchBuffer => "ScratchBuffer",
            Self::Long => "Long",
            Self::Int8 => "Int8",
            Self::TranslatedString => "TranslatedString",
            Self::WString => "WString",
            Self::LSWString => "LSWString",
            Self::Uuid => "UUID",
            Self::Int64 => "Int64",
            Self::TranslatedFSString => "TranslatedFSString",
        }
    }

    /// Resolve an LSX `type` attribute: numeric id or type name. Unknown
    /// names map to `String`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if let Ok(id) = s.parse::<TypeId>() {
            return Self::from_id(id).unwrap_or(Self::String);
        }
        match s {
            "None" => Self::None,
            "Byte" | "uint8" => Self::Byte,
            "Short" | "int16" => Self::Short,
            "UShort" | "uint16" => Self::UShort,
            "Int" | "int32" | "int" => Self::Int,
            "UInt" | "uint32" => Self::UInt,
            "Float" | "float" => Self::Float,
            "Double" | "double" => Self::Double,
            "IVec2" | "ivec2" => Self::IVec2,
            "IVec3" | "ivec3" => Self::IVec3,
            "IVec4" | "ivec4" => Self::IVec4,
            "Vec2" | "fvec2" => Self::Vec2,
            "Vec3" | "fvec3" => Self::Vec3,
            "Vec4" | "fvec4" => Self::Vec4,
            "Mat2" | "mat2x2" => Self::Mat2,
            "Mat3" | "mat3x3" => Self::Mat3,
            "Mat3x4" | "mat3x4" => Self::Mat3x4,
            "Mat4x3" | "mat4x3" => Self::Mat4x3,
            "Mat4" | "mat4x4" => Self::Mat4,
            "Bool" | "bool" => Self::Bool,
            "Path" | "path" => Self::Path,
            "FixedString" => Self::FixedString,
            "LSString" => Self::LSString,
            "ULongLong" | "uint64" => Self::ULongLong,
            "ScratchBuffer" => Self::ScratchBuffer,
            "Long" | "old_int64" => Self::Long,
            "Int8" | "int8" => Self::Int8,
            "TranslatedString" => Self::TranslatedString,
            "WString" => Self::WString,
            "LSWString" => Self::LSWString,
            "UUID" | "guid" => Self::Uuid,
            "Int64" | "int64" => Self::Int64,
            "TranslatedFSString" => Self::TranslatedFSString,
            _ => Self::String,
        }
    }

    /// Number of scalar components for vector and matrix types.
    #[must_use]
    pub fn components(self) -> Option<usize> {
        match self {
            Self::IVec2 | Self::Vec2 => Some(2),
            Self::IVec3 | Self::Vec3 => Some(3),
            Self::IVec4 | Self::Vec4 | Self::Mat2 => Some(4),
            Self::Mat3 => Some(9),
            Self::Mat3x4 | Self::Mat4x3 => Some(12),
            Self::Mat4 => Some(16),
            _ => None,
        }
    }

    /// Types rendered as numeric tokens in LSX.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Byte
                | Self::Short
                | Self::UShort
                | Self::Int
                | Self::UInt
                | Self::Float
                | Self::Double
                | Self::ULongLong
                | Self::Long
                | Self::Int8
                | Self::Int64
        )
    }
}

/// Localized string: a plain value plus a localization handle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslatedString {
    pub value: String,
    pub handle: String,
}

/// Localized format string with recursive argument substitutions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslatedFsString {
    pub value: String,
    pub handle: String,
    pub arguments: Vec<FsStringArgument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FsStringArgument {
    pub key: String,
    pub value: String,
    pub string: Option<Box<TranslatedFsString>>,
}

/// Dynamically-typed attribute value. Codecs branch on [`AttrType`] and
/// expect the matching variant here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    None,
    Byte(u8),
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Float(f32),
    Double(f64),
    /// IVec2..IVec4 components.
    IVec(Vec<i32>),
    /// Vec2..Vec4 and Mat2..Mat4 components, row-major for matrices.
    Vec(Vec<f32>),
    Bool(bool),
    Int8(i8),
    /// All plain string flavors (String, Path, FixedString, LSString,
    /// WString, LSWString).
    String(String),
    /// Canonical `8-4-4-4-12` hex form.
    Uuid(String),
    /// ScratchBuffer payload, base64-encoded.
    Blob(String),
    Long(i64),
    ULongLong(u64),
    TranslatedString(TranslatedString),
    TranslatedFsString(TranslatedFsString),
}

impl AttrValue {
    /// Default value for a freshly-declared attribute of the given type.
    #[must_use]
    pub fn default_for(ty: AttrType) -> Self {
        match ty {
            AttrType::None => Self::None,
            AttrType::Byte => Self::Byte(0),
            AttrType::Short => Self::Short(0),
            AttrType::UShort => Self::UShort(0),
            AttrType::Int => Self::Int(0),
            AttrType::UInt => Self::UInt(0),
            AttrType::Float => Self::Float(0.0),
            AttrType::Double => Self::Double(0.0),
            AttrType::IVec2 | AttrType::IVec3 | AttrType::IVec4 => {
                Self::IVec(vec![0; ty.components().unwrap_or(0)])
            }
            AttrType::Vec2
            | AttrType::Vec3
            | AttrType::Vec4
            | AttrType::Mat2
            | AttrType::Mat3
            | AttrType::Mat3x4
            | AttrType::Mat4x3
            | AttrType::Mat4 => Self::Vec(vec![0.0; ty.components().unwrap_or(0)]),
            AttrType::Bool => Self::Bool(false),
            AttrType::String
            | AttrType::Path
            | AttrType::FixedString
            | AttrType::LSString
            | AttrType::WString
            | AttrType::LSWString => Self::String(String::new()),
            AttrType::ULongLong => Self::ULongLong(0),
            AttrType::ScratchBuffer => Self::Blob(String::new()),
            AttrType::Long | AttrType::Int64 => Self::Long(0),
            AttrType::Int8 => Self::Int8(0),
            AttrType::TranslatedString => Self::TranslatedString(TranslatedString::default()),
            AttrType::Uuid => Self::Uuid("00000000-0000-0000-0000-000000000000".to_string()),
            AttrType::TranslatedFSString => {
                Self::TranslatedFsString(TranslatedFsString::default())
            }
        }
    }
}
