//! Builder for conforming instruction streams.
//!
//! Consecutive records of the same opcode and element size merge under one
//! header by bumping the header's count, which is how hand-built legacy
//! streams batch their triangles. `finish` returns the bytes to place in
//! an execute buffer.

use crate::d3d::{
    BranchRecord, LightStateType, LineRecord, MatrixLoadRecord, MatrixMultiplyRecord, Opcode,
    PointRecord, ProcessVerticesRecord, SpanRecord, StateRecord, StatusRecord,
    TextureLoadRecord, TransformStateType, TriangleRecord,
};

#[derive(Clone, Copy, Debug)]
struct OpenHeader {
    opcode: u8,
    size: u8,
    count_at: usize,
}

#[derive(Debug, Default)]
pub struct ExecuteEncoder {
    bytes: Vec<u8>,
    open: Option<OpenHeader>,
}

impl ExecuteEncoder {
    pub fn new() -> Self {
        ExecuteEncoder::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }

    /// Appends a record with an explicit opcode/size, merging into the
    /// open header when opcode and size match. Also the escape hatch for
    /// exercising unknown opcodes and odd element sizes.
    pub fn raw(&mut self, opcode: u8, size: u8, payload: &[u8]) {
        match self.open {
            Some(open)
                if open.opcode == opcode
                    && open.size == size
                    && self.current_count(open.count_at) < u16::MAX =>
            {
                let count = self.current_count(open.count_at) + 1;
                self.bytes[open.count_at..open.count_at + 2]
                    .copy_from_slice(&count.to_le_bytes());
            }
            _ => {
                self.bytes.push(opcode);
                self.bytes.push(size);
                let count_at = self.bytes.len();
                self.bytes.extend_from_slice(&1u16.to_le_bytes());
                self.open = Some(OpenHeader { opcode, size, count_at });
            }
        }
        self.bytes.extend_from_slice(payload);
    }

    fn current_count(&self, count_at: usize) -> u16 {
        u16::from_le_bytes([self.bytes[count_at], self.bytes[count_at + 1]])
    }

    fn record<T: bytemuck::Pod>(&mut self, opcode: Opcode, record: &T) {
        self.raw(
            opcode as u8,
            std::mem::size_of::<T>() as u8,
            bytemuck::bytes_of(record),
        );
    }

    pub fn point(&mut self, count: u16, first: u16) {
        self.record(Opcode::Point, &PointRecord { count, first });
    }

    pub fn line(&mut self, v1: u16, v2: u16) {
        self.record(Opcode::Line, &LineRecord { v1, v2 });
    }

    pub fn span(&mut self, count: u16, first: u16) {
        self.record(Opcode::Span, &SpanRecord { count, first });
    }

    pub fn triangle(&mut self, v1: u16, v2: u16, v3: u16, flags: u16) {
        self.record(Opcode::Triangle, &TriangleRecord { v1, v2, v3, flags });
    }

    pub fn matrix_load(&mut self, dest: u32, src: u32) {
        self.record(Opcode::MatrixLoad, &MatrixLoadRecord { dest, src });
    }

    pub fn matrix_multiply(&mut self, dest: u32, src1: u32, src2: u32) {
        self.record(Opcode::MatrixMultiply, &MatrixMultiplyRecord { dest, src1, src2 });
    }

    pub fn state_transform(&mut self, kind: TransformStateType, handle: u32) {
        self.record(
            Opcode::StateTransform,
            &StateRecord { kind: kind as u32, value: handle },
        );
    }

    pub fn state_light(&mut self, kind: LightStateType, value: u32) {
        self.record(
            Opcode::StateLight,
            &StateRecord { kind: kind as u32, value },
        );
    }

    pub fn state_render(&mut self, kind: u32, value: u32) {
        self.record(Opcode::StateRender, &StateRecord { kind, value });
    }

    pub fn process_vertices(&mut self, flags: u32, start: u16, dest: u16, count: u32) {
        self.record(
            Opcode::ProcessVertices,
            &ProcessVerticesRecord { flags, start, dest, count, reserved: 0 },
        );
    }

    pub fn texture_load(&mut self, dest: u32, src: u32) {
        self.record(Opcode::TextureLoad, &TextureLoadRecord { dest, src });
    }

    pub fn branch_forward(&mut self, mask: u32, value: u32, negate: bool, offset: u32) {
        self.record(
            Opcode::BranchForward,
            &BranchRecord { mask, value, negate: negate as u32, offset },
        );
    }

    pub fn set_status(&mut self, status: &StatusRecord) {
        self.record(Opcode::SetStatus, status);
    }

    pub fn exit(&mut self) {
        self.raw(Opcode::Exit as u8, 0, &[]);
    }
}
