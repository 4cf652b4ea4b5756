//! 4x4 matrices in the row-vector convention the legacy pipeline uses:
//! a point transforms as `v' = v * M` with an implicit w of 1. Composing
//! `a * b` therefore applies `a` first, then `b`.

use bytemuck::{Pod, Zeroable};
use std::ops::Mul;

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Matrix4(pub [[f32; 4]; 4]);

impl Matrix4 {
    pub const IDENTITY: Matrix4 = Matrix4([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    /// Negates the Z axis. Loaded under the projection before the stored
    /// projection and view matrices to convert the left-handed clip space of
    /// the instruction stream into the context's right-handed one.
    pub const INVERT_Z: Matrix4 = Matrix4([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, -1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    pub fn translation(x: f32, y: f32, z: f32) -> Matrix4 {
        let mut m = Matrix4::IDENTITY;
        m.0[3][0] = x;
        m.0[3][1] = y;
        m.0[3][2] = z;
        m
    }

    pub fn scaling(x: f32, y: f32, z: f32) -> Matrix4 {
        let mut m = Matrix4::IDENTITY;
        m.0[0][0] = x;
        m.0[1][1] = y;
        m.0[2][2] = z;
        m
    }

    /// Orthographic projection with the same clip conventions as the
    /// context's `ortho` entry point (Z mapped to [-1, 1]).
    pub fn ortho(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Matrix4 {
        let rl = right - left;
        let tb = top - bottom;
        let fne = far - near;
        Matrix4([
            [2.0 / rl, 0.0, 0.0, 0.0],
            [0.0, 2.0 / tb, 0.0, 0.0],
            [0.0, 0.0, -2.0 / fne, 0.0],
            [
                -(right + left) / rl,
                -(top + bottom) / tb,
                -(far + near) / fne,
                1.0,
            ],
        ])
    }

    /// Transform a point with an implicit w of 1; returns the full
    /// homogeneous result.
    pub fn transform_point(&self, p: [f32; 3]) -> [f32; 4] {
        self.transform([p[0], p[1], p[2], 1.0])
    }

    pub fn transform(&self, v: [f32; 4]) -> [f32; 4] {
        let m = &self.0;
        let mut out = [0.0f32; 4];
        for (c, item) in out.iter_mut().enumerate() {
            *item = v[0] * m[0][c] + v[1] * m[1][c] + v[2] * m[2][c] + v[3] * m[3][c];
        }
        out
    }
}

impl Mul for Matrix4 {
    type Output = Matrix4;

    fn mul(self, rhs: Matrix4) -> Matrix4 {
        let a = &self.0;
        let b = &rhs.0;
        let mut out = [[0.0f32; 4]; 4];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, item) in row.iter_mut().enumerate() {
                *item = a[r][0] * b[0][c] + a[r][1] * b[1][c] + a[r][2] * b[2][c] + a[r][3] * b[3][c];
            }
        }
        Matrix4(out)
    }
}

#[cfg(test)]
mod tests {
    use super::Matrix4;

    #[test]
    fn row_vector_translation() {
        let m = Matrix4::translation(10.0, -2.0, 0.5);
        assert_eq!(m.transform_point([1.0, 2.0, 3.0]), [11.0, 0.0, 3.5, 1.0]);
    }

    #[test]
    fn multiply_applies_left_operand_first() {
        let scale = Matrix4::scaling(2.0, 2.0, 2.0);
        let translate = Matrix4::translation(1.0, 0.0, 0.0);
        // Scale then translate: (1,0,0) -> (2,0,0) -> (3,0,0).
        let m = scale * translate;
        assert_eq!(m.transform_point([1.0, 0.0, 0.0])[0], 3.0);
        // Translate then scale: (1,0,0) -> (2,0,0) -> (4,0,0).
        let m = translate * scale;
        assert_eq!(m.transform_point([1.0, 0.0, 0.0])[0], 4.0);
    }

    #[test]
    fn invert_z_negates_only_z() {
        let v = Matrix4::INVERT_Z.transform([1.0, 2.0, 3.0, 1.0]);
        assert_eq!(v, [1.0, 2.0, -3.0, 1.0]);
    }
}
