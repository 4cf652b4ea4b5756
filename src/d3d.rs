//! Wire-level enumerations and record layouts of the legacy instruction
//! stream and its state tables.
//!
//! Numeric values are part of the binary interface: instruction streams are
//! caller-built byte buffers, so every enumeration here decodes with a
//! `from_*` returning `Option` and unknown values degrade to logged no-ops
//! at the point of use rather than failing the stream.

use bytemuck::{Pod, Zeroable};

/// One instruction record header: opcode, element byte-size, element count.
/// `count` elements of `size` bytes follow immediately; the interpreter
/// always advances exactly `4 + count * size` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct InsnHeader {
    pub opcode: u8,
    pub size: u8,
    pub count: u16,
}

pub const INSN_HEADER_LEN: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Point = 1,
    Line = 2,
    Triangle = 3,
    MatrixLoad = 4,
    MatrixMultiply = 5,
    StateTransform = 6,
    StateLight = 7,
    StateRender = 8,
    ProcessVertices = 9,
    TextureLoad = 10,
    Exit = 11,
    BranchForward = 12,
    Span = 13,
    SetStatus = 14,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Point,
            2 => Self::Line,
            3 => Self::Triangle,
            4 => Self::MatrixLoad,
            5 => Self::MatrixMultiply,
            6 => Self::StateTransform,
            7 => Self::StateLight,
            8 => Self::StateRender,
            9 => Self::ProcessVertices,
            10 => Self::TextureLoad,
            11 => Self::Exit,
            12 => Self::BranchForward,
            13 => Self::Span,
            14 => Self::SetStatus,
            _ => return None,
        })
    }
}

/// Three indices into the pre-transformed vertex array plus an edge/strip
/// flag word that is accepted but not acted upon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TriangleRecord {
    pub v1: u16,
    pub v2: u16,
    pub v3: u16,
    pub flags: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct PointRecord {
    pub count: u16,
    pub first: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct LineRecord {
    pub v1: u16,
    pub v2: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct SpanRecord {
    pub count: u16,
    pub first: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct MatrixLoadRecord {
    pub dest: u32,
    pub src: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct MatrixMultiplyRecord {
    pub dest: u32,
    pub src1: u32,
    pub src2: u32,
}

/// STATETRANSFORM / STATELIGHT / STATERENDER all share this shape; `kind`
/// selects within the table named by the opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct StateRecord {
    pub kind: u32,
    pub value: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ProcessVerticesRecord {
    pub flags: u32,
    pub start: u16,
    pub dest: u16,
    pub count: u32,
    pub reserved: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TextureLoadRecord {
    pub dest: u32,
    pub src: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct BranchRecord {
    pub mask: u32,
    pub value: u32,
    pub negate: u32,
    pub offset: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct D3dRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// Status block written by SETSTATUS and consulted by BRANCHFORWARD.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct StatusRecord {
    pub flags: u32,
    pub status: u32,
    pub extent: D3dRect,
}

/// Low three bits of a PROCESSVERTICES record's flag word.
pub const PROCESS_OP_MASK: u32 = 0x0000_0007;
pub const PROCESS_TRANSFORM_LIGHT: u32 = 0x0000_0000;
pub const PROCESS_TRANSFORM: u32 = 0x0000_0001;
pub const PROCESS_COPY: u32 = 0x0000_0002;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessOp {
    TransformLight,
    Transform,
    Copy,
}

impl ProcessOp {
    pub fn from_flags(flags: u32) -> Option<Self> {
        Some(match flags & PROCESS_OP_MASK {
            PROCESS_TRANSFORM_LIGHT => Self::TransformLight,
            PROCESS_TRANSFORM => Self::Transform,
            PROCESS_COPY => Self::Copy,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum TransformStateType {
    World = 1,
    View = 2,
    Projection = 3,
}

impl TransformStateType {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::World,
            2 => Self::View,
            3 => Self::Projection,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum LightStateType {
    Material = 1,
    Ambient = 2,
    ColorModel = 3,
    FogMode = 4,
    FogStart = 5,
    FogEnd = 6,
    FogDensity = 7,
}

impl LightStateType {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::Material,
            2 => Self::Ambient,
            3 => Self::ColorModel,
            4 => Self::FogMode,
            5 => Self::FogStart,
            6 => Self::FogEnd,
            7 => Self::FogDensity,
            _ => return None,
        })
    }
}

/// Render-state selectors the translator recognizes. The full legacy table
/// is much larger; selectors outside this set fall through to a logged
/// no-op, which is the documented forward-compatibility behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum RenderStateType {
    TextureHandle = 1,
    Antialias = 2,
    ZEnable = 7,
    FillMode = 8,
    ShadeMode = 9,
    ZWriteEnable = 14,
    AlphaTestEnable = 15,
    TextureMag = 17,
    TextureMin = 18,
    SrcBlend = 19,
    DestBlend = 20,
    TextureMapBlend = 21,
    CullMode = 22,
    ZFunc = 23,
    AlphaRef = 24,
    AlphaFunc = 25,
    DitherEnable = 26,
    AlphaBlendEnable = 27,
    FogEnable = 28,
    SpecularEnable = 29,
    StippledAlpha = 33,
    FogColor = 34,
    StippleEnable = 39,
    ColorKeyEnable = 41,
}

impl RenderStateType {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::TextureHandle,
            2 => Self::Antialias,
            7 => Self::ZEnable,
            8 => Self::FillMode,
            9 => Self::ShadeMode,
            14 => Self::ZWriteEnable,
            15 => Self::AlphaTestEnable,
            17 => Self::TextureMag,
            18 => Self::TextureMin,
            19 => Self::SrcBlend,
            20 => Self::DestBlend,
            21 => Self::TextureMapBlend,
            22 => Self::CullMode,
            23 => Self::ZFunc,
            24 => Self::AlphaRef,
            25 => Self::AlphaFunc,
            26 => Self::DitherEnable,
            27 => Self::AlphaBlendEnable,
            28 => Self::FogEnable,
            29 => Self::SpecularEnable,
            33 => Self::StippledAlpha,
            34 => Self::FogColor,
            39 => Self::StippleEnable,
            41 => Self::ColorKeyEnable,
            _ => return None,
        })
    }
}

/// The 32 stipple-pattern rows occupy a contiguous selector range of their
/// own; they are acknowledged and logged, never applied.
pub const RENDER_STATE_STIPPLE_PATTERN_FIRST: u32 = 64;
pub const RENDER_STATE_STIPPLE_PATTERN_LAST: u32 = 95;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum FillMode {
    Point = 1,
    Wireframe = 2,
    Solid = 3,
}

impl FillMode {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::Point,
            2 => Self::Wireframe,
            3 => Self::Solid,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ShadeMode {
    Flat = 1,
    Gouraud = 2,
    Phong = 3,
}

impl ShadeMode {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::Flat,
            2 => Self::Gouraud,
            3 => Self::Phong,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum CullMode {
    None = 1,
    Cw = 2,
    Ccw = 3,
}

impl CullMode {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::None,
            2 => Self::Cw,
            3 => Self::Ccw,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum CmpFunc {
    Never = 1,
    Less = 2,
    Equal = 3,
    LessEqual = 4,
    Greater = 5,
    NotEqual = 6,
    GreaterEqual = 7,
    Always = 8,
}

impl CmpFunc {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::Never,
            2 => Self::Less,
            3 => Self::Equal,
            4 => Self::LessEqual,
            5 => Self::Greater,
            6 => Self::NotEqual,
            7 => Self::GreaterEqual,
            8 => Self::Always,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum BlendMode {
    Zero = 1,
    One = 2,
    SrcColor = 3,
    InvSrcColor = 4,
    SrcAlpha = 5,
    InvSrcAlpha = 6,
    DestAlpha = 7,
    InvDestAlpha = 8,
    DestColor = 9,
    InvDestColor = 10,
    SrcAlphaSat = 11,
}

impl BlendMode {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::Zero,
            2 => Self::One,
            3 => Self::SrcColor,
            4 => Self::InvSrcColor,
            5 => Self::SrcAlpha,
            6 => Self::InvSrcAlpha,
            7 => Self::DestAlpha,
            8 => Self::InvDestAlpha,
            9 => Self::DestColor,
            10 => Self::InvDestColor,
            11 => Self::SrcAlphaSat,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum TextureFilter {
    Nearest = 1,
    Linear = 2,
    MipNearest = 3,
    MipLinear = 4,
    LinearMipNearest = 5,
    LinearMipLinear = 6,
}

impl TextureFilter {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::Nearest,
            2 => Self::Linear,
            3 => Self::MipNearest,
            4 => Self::MipLinear,
            5 => Self::LinearMipNearest,
            6 => Self::LinearMipLinear,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum PrimitiveType {
    PointList = 1,
    LineList = 2,
    LineStrip = 3,
    TriangleList = 4,
    TriangleStrip = 5,
    TriangleFan = 6,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum LightKind {
    Point = 1,
    Spot = 2,
    Directional = 3,
    ParallelPoint = 4,
}

impl LightKind {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::Point,
            2 => Self::Spot,
            3 => Self::Directional,
            4 => Self::ParallelPoint,
            _ => return None,
        })
    }
}

/// Traversal directions accepted by the NextLight / NextViewport walks.
pub const NEXT_NEXT: u32 = 0x01;
pub const NEXT_HEAD: u32 = 0x02;
pub const NEXT_TAIL: u32 = 0x04;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ClearFlags: u32 {
        const TARGET = 0x1;
        const ZBUFFER = 0x2;
    }
}
