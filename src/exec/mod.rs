//! The execute buffer and its bytecode interpreter.
//!
//! An execute buffer is a flat caller-built instruction stream: a sequence
//! of records, each a four-byte header (opcode, element size, element
//! count) followed by `count` elements of `size` bytes. The interpreter
//! walks the stream from the declared offset for the declared length,
//! dispatching per opcode and advancing exactly `4 + count * size` bytes
//! per record, so unknown future opcodes skip cleanly instead of
//! corrupting the walk.
//!
//! Alongside the instruction bytes the buffer owns a parallel array of
//! pre-transformed vertices. PROCESSVERTICES fills it (and tags which of
//! the three vertex shapes it holds); TRIANGLE indexes into it.

pub mod encode;

use crate::d3d::{
    BranchRecord, InsnHeader, LightStateType, MatrixLoadRecord, MatrixMultiplyRecord, Opcode,
    ProcessOp, ProcessVerticesRecord, StateRecord, StatusRecord, TransformStateType,
    TriangleRecord, INSN_HEADER_LEN,
};
use crate::color::PackedColor;
use crate::device::{Device, IndexSource, TransformSet};
use crate::error::D3dError;
use crate::gl::{MatrixMode, Topology};
use crate::math::Matrix4;
use crate::vertex::{LitVertex, Vertex, VertexType, VERTEX_STRIDE};
use crate::viewport::Viewport;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

/// Upper bound on the vertex count a single execute descriptor may
/// declare.
pub const MAX_EXECUTE_VERTICES: u32 = 1 << 20;

/// Region declaration for one execute invocation: where the raw source
/// vertices and the instruction stream live inside the buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecuteData {
    pub vertex_offset: u32,
    pub vertex_count: u32,
    pub instruction_offset: u32,
    pub instruction_length: u32,
}

pub struct ExecuteBuffer {
    data: Vec<u8>,
    desc: ExecuteData,
    vertices: Vec<u8>,
    vertex_type: Option<VertexType>,
    transform: [u32; 3],
    status: StatusRecord,
}

impl ExecuteBuffer {
    /// Self-allocated buffer of `size` zeroed bytes.
    pub fn new(size: usize) -> Self {
        ExecuteBuffer::from_bytes(vec![0; size])
    }

    /// Caller-supplied instruction bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        ExecuteBuffer {
            data,
            desc: ExecuteData::default(),
            vertices: Vec::new(),
            vertex_type: None,
            transform: [0; 3],
            status: StatusRecord::default(),
        }
    }

    /// Hands back the raw bytes for the caller to fill. There is no real
    /// locking; this is bookkeeping-compatible pass-through.
    pub fn lock(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn unlock(&mut self) {}

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Declares the buffer regions for the next execute. The parallel
    /// vertex array is reallocated, zeroed, to the declared vertex count.
    pub fn set_execute_data(&mut self, desc: &ExecuteData) -> Result<(), D3dError> {
        if desc.vertex_count > MAX_EXECUTE_VERTICES {
            return Err(D3dError::InvalidParams);
        }
        self.desc = *desc;
        self.vertices = vec![0; desc.vertex_count as usize * VERTEX_STRIDE];
        Ok(())
    }

    pub fn execute_data(&self) -> ExecuteData {
        self.desc
    }

    /// The status block written by SETSTATUS.
    pub fn status(&self) -> StatusRecord {
        self.status
    }

    /// Which vertex shape the parallel array currently holds, as tagged by
    /// the last PROCESSVERTICES.
    pub fn vertex_type(&self) -> Option<VertexType> {
        self.vertex_type
    }

    /// Raw view of the parallel pre-transformed vertex array.
    pub fn vertices(&self) -> &[u8] {
        &self.vertices
    }
}

impl Device {
    /// Runs an execute buffer's instruction stream against this device.
    /// The given viewport's lights are (re)activated first, as binding it
    /// for the duration of the batch.
    pub fn execute(
        &mut self,
        buffer: &mut ExecuteBuffer,
        viewport: &Rc<RefCell<Viewport>>,
    ) -> Result<(), D3dError> {
        viewport.borrow_mut().activate(&mut self.gl);

        let desc = buffer.desc;
        let end = desc
            .instruction_offset
            .checked_add(desc.instruction_length)
            .map(|e| e as usize)
            .filter(|&e| e <= buffer.data.len())
            .ok_or(D3dError::InvalidParams)?;
        let start = desc.instruction_offset as usize;

        let mut ip = start;
        while ip + INSN_HEADER_LEN <= end {
            let header: InsnHeader =
                bytemuck::pod_read_unaligned(&buffer.data[ip..ip + INSN_HEADER_LEN]);
            ip += INSN_HEADER_LEN;
            let payload_len = header.count as usize * header.size as usize;
            if ip + payload_len > end {
                warn!(
                    opcode = header.opcode,
                    count = header.count,
                    size = header.size,
                    "instruction payload overruns the declared length, stopping"
                );
                return Ok(());
            }
            let payload = ip..ip + payload_len;
            ip += payload_len;

            match Opcode::from_u8(header.opcode) {
                Some(Opcode::Point) | Some(Opcode::Line) | Some(Opcode::Span) => {
                    debug!(opcode = ?Opcode::from_u8(header.opcode), count = header.count,
                           "only triangles are rasterized, records skipped");
                }
                Some(Opcode::TextureLoad) => {
                    debug!(count = header.count, "in-stream texture load not implemented");
                }
                Some(Opcode::Triangle) => {
                    self.op_triangle(buffer, &header, payload);
                }
                Some(Opcode::MatrixLoad) => {
                    for record in read_records::<MatrixLoadRecord>(&buffer.data[payload], &header) {
                        let value = self.resolve_matrix(record.src);
                        if self.set_matrix(record.dest, &value).is_err() {
                            debug!(dest = record.dest, "matrix load into unknown handle skipped");
                        }
                    }
                }
                Some(Opcode::MatrixMultiply) => {
                    for record in
                        read_records::<MatrixMultiplyRecord>(&buffer.data[payload], &header)
                    {
                        self.op_matrix_multiply(&record);
                    }
                }
                Some(Opcode::StateTransform) => {
                    for record in read_records::<StateRecord>(&buffer.data[payload], &header) {
                        match TransformStateType::from_u32(record.kind) {
                            Some(kind) => {
                                buffer.transform[kind as usize - 1] = record.value;
                            }
                            None => debug!(kind = record.kind, "unhandled transform state"),
                        }
                    }
                }
                Some(Opcode::StateLight) => {
                    for record in read_records::<StateRecord>(&buffer.data[payload], &header) {
                        self.op_state_light(&record);
                    }
                }
                Some(Opcode::StateRender) => {
                    for record in read_records::<StateRecord>(&buffer.data[payload], &header) {
                        self.set_render_state(record.kind, record.value);
                    }
                }
                Some(Opcode::ProcessVertices) => {
                    for record in
                        read_records::<ProcessVerticesRecord>(&buffer.data[payload], &header)
                    {
                        self.op_process_vertices(buffer, &record);
                    }
                }
                Some(Opcode::Exit) => {
                    return Ok(());
                }
                Some(Opcode::BranchForward) => {
                    for record in read_records::<BranchRecord>(&buffer.data[payload], &header) {
                        let mut taken = (buffer.status.status & record.mask) == record.value;
                        if record.negate != 0 {
                            taken = !taken;
                        }
                        if taken {
                            // Conditional execution is acknowledged but not
                            // honored; the walk always continues linearly.
                            debug!(offset = record.offset, "branch condition met, not taken");
                        }
                    }
                }
                Some(Opcode::SetStatus) => {
                    for record in read_records::<StatusRecord>(&buffer.data[payload], &header) {
                        buffer.status = record;
                    }
                }
                None => {
                    debug!(
                        opcode = header.opcode,
                        count = header.count,
                        size = header.size,
                        "unknown opcode, payload skipped"
                    );
                }
            }
        }
        warn!("instruction stream ended without an EXIT opcode");
        Ok(())
    }

    fn op_triangle(
        &mut self,
        buffer: &ExecuteBuffer,
        header: &InsnHeader,
        payload: std::ops::Range<usize>,
    ) {
        let Some(vertex_type) = buffer.vertex_type else {
            warn!("triangles before any vertex processing, records skipped");
            return;
        };
        let records = read_records::<TriangleRecord>(&buffer.data[payload], header);

        let view = self.resolve_matrix(buffer.transform[TransformStateType::View as usize - 1]);
        let proj =
            self.resolve_matrix(buffer.transform[TransformStateType::Projection as usize - 1]);
        if vertex_type != VertexType::TlVertex {
            // The world transform is already baked into the processed
            // vertices; clip space is the stored projection and view over
            // the fixed Z inversion.
            self.gl.matrix_mode(MatrixMode::ModelView);
            self.gl.load_identity();
            self.gl.matrix_mode(MatrixMode::Projection);
            self.gl.load_matrix(&Matrix4::INVERT_Z);
            self.gl.mult_matrix(&proj);
            self.gl.mult_matrix(&view);
        }
        let transforms = TransformSet {
            world: Matrix4::IDENTITY,
            view,
            proj: proj * Matrix4::INVERT_Z,
        };
        self.emit_primitives(
            Topology::Triangles,
            vertex_type,
            &buffer.vertices,
            IndexSource::Triangles(&records),
            &transforms,
        );
    }

    fn op_matrix_multiply(&mut self, record: &MatrixMultiplyRecord) {
        let (Ok(src1), Ok(src2)) = (self.get_matrix(record.src1), self.get_matrix(record.src2))
        else {
            debug!(src1 = record.src1, src2 = record.src2, "matrix multiply with unknown source");
            return;
        };
        // The projection stack doubles as the multiplier: push, load,
        // multiply, read back, pop. No rendering side effect.
        self.gl.matrix_mode(MatrixMode::Projection);
        self.gl.push_matrix();
        self.gl.load_matrix(&src2);
        self.gl.mult_matrix(&src1);
        let product = self.gl.current_matrix(MatrixMode::Projection);
        self.gl.pop_matrix();
        if self.set_matrix(record.dest, &product).is_err() {
            debug!(dest = record.dest, "matrix multiply into unknown handle skipped");
        }
    }

    fn op_state_light(&mut self, record: &StateRecord) {
        match LightStateType::from_u32(record.kind) {
            Some(LightStateType::Material) => {
                let Some(at) = record.value.checked_sub(1) else {
                    debug!("material state with a null handle");
                    return;
                };
                match self.materials.get(at as usize).cloned() {
                    Some(material) => material.borrow().activate(&mut self.gl),
                    None => debug!(handle = record.value, "unknown material handle"),
                }
            }
            Some(LightStateType::Ambient) => {
                let rgba = PackedColor(record.value).to_rgba_f();
                self.gl.light_model_ambient(rgba);
            }
            Some(kind) => {
                debug!(?kind, value = record.value, "light state accepted but not applied");
            }
            None => debug!(kind = record.kind, "unhandled light state"),
        }
    }

    fn op_process_vertices(&mut self, buffer: &mut ExecuteBuffer, record: &ProcessVerticesRecord) {
        let desc = buffer.desc;
        let count = record.count as usize;
        let src_start = record.start as usize;
        let dst_start = record.dest as usize;

        let src_at = desc.vertex_offset as usize + src_start * VERTEX_STRIDE;
        let src_end = src_at + count * VERTEX_STRIDE;
        let dst_at = dst_start * VERTEX_STRIDE;
        let dst_end = dst_at + count * VERTEX_STRIDE;
        if src_end > buffer.data.len() || dst_end > buffer.vertices.len() {
            warn!(
                start = record.start,
                dest = record.dest,
                count = record.count,
                "vertex run out of bounds, record skipped"
            );
            return;
        }

        match ProcessOp::from_flags(record.flags) {
            Some(ProcessOp::TransformLight) => {
                let world =
                    self.resolve_matrix(buffer.transform[TransformStateType::World as usize - 1]);
                for i in 0..count {
                    let src = &buffer.data[src_at + i * VERTEX_STRIDE..][..VERTEX_STRIDE];
                    let mut v: Vertex = bytemuck::pod_read_unaligned(src);
                    let p = world.transform_point([v.x, v.y, v.z]);
                    v.x = p[0];
                    v.y = p[1];
                    v.z = p[2];
                    // Lighting is deferred to rasterization; the normal and
                    // texture coordinate pass through untouched.
                    let dst = &mut buffer.vertices[dst_at + i * VERTEX_STRIDE..][..VERTEX_STRIDE];
                    dst.copy_from_slice(bytemuck::bytes_of(&v));
                }
                buffer.vertex_type = Some(VertexType::Vertex);
            }
            Some(ProcessOp::Transform) => {
                let world =
                    self.resolve_matrix(buffer.transform[TransformStateType::World as usize - 1]);
                for i in 0..count {
                    let src = &buffer.data[src_at + i * VERTEX_STRIDE..][..VERTEX_STRIDE];
                    let mut v: LitVertex = bytemuck::pod_read_unaligned(src);
                    let p = world.transform_point([v.x, v.y, v.z]);
                    v.x = p[0];
                    v.y = p[1];
                    v.z = p[2];
                    let dst = &mut buffer.vertices[dst_at + i * VERTEX_STRIDE..][..VERTEX_STRIDE];
                    dst.copy_from_slice(bytemuck::bytes_of(&v));
                }
                buffer.vertex_type = Some(VertexType::LitVertex);
            }
            Some(ProcessOp::Copy) => {
                let (src, dst) = (src_at..src_end, dst_at..dst_end);
                buffer.vertices[dst].copy_from_slice(&buffer.data[src]);
                buffer.vertex_type = Some(VertexType::TlVertex);
            }
            None => {
                debug!(flags = record.flags, "unhandled vertex processing mode");
            }
        }
    }
}

/// Decodes `count` records at the header's declared stride. A stride
/// smaller than the record layout skips the whole instruction; oversized
/// strides read the leading bytes of each element.
fn read_records<T: bytemuck::Pod>(payload: &[u8], header: &InsnHeader) -> Vec<T> {
    let stride = header.size as usize;
    let want = std::mem::size_of::<T>();
    if stride < want {
        warn!(
            opcode = header.opcode,
            stride,
            want,
            "element size too small for this opcode, instruction skipped"
        );
        return Vec::new();
    }
    (0..header.count as usize)
        .map(|i| bytemuck::pod_read_unaligned(&payload[i * stride..i * stride + want]))
        .collect()
}
