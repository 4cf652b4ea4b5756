//! Software transform-light-rasterize stage behind `begin`/`end`.
//!
//! Vertices are transformed by the current modelview and projection tops,
//! lit per-vertex when lighting is enabled, clipped trivially against
//! w <= 0, mapped to window coordinates and filled with interpolated
//! depth, color and texture coordinates.

use super::{
    BlendFactor, DepthFunc, EmitVertex, GlContext, LightParams, MaterialParams, RasterInputs,
    ShadeModel, TexFilter, TextureObject, Topology, Winding, MAX_LIGHTS,
};

/// Vertices with a post-projection w below this are dropped; there is no
/// near-plane clipping in the software stage.
const MIN_CLIP_W: f32 = 1e-6;

#[derive(Clone, Copy, Debug)]
struct ScreenVertex {
    x: f32,
    y: f32,
    z: f32,
    ndc: [f32; 2],
    color: [f32; 4],
    texcoord: [f32; 2],
}

struct Frame<'a> {
    width: i32,
    height: i32,
    color: &'a mut [u8],
    depth: &'a mut [f32],
}

struct PixelState<'a> {
    depth_test: bool,
    depth_write: bool,
    depth_fn: DepthFunc,
    blend_on: bool,
    blend: (BlendFactor, BlendFactor),
    texture: Option<&'a TextureObject>,
}

impl GlContext {
    pub(crate) fn flush_batch(&mut self, topology: Topology) {
        let verts = std::mem::take(&mut self.pending);
        if verts.is_empty() {
            return;
        }
        let inputs = self.raster_inputs();
        let mv = self.current_matrix(super::MatrixMode::ModelView);
        let pr = self.current_matrix(super::MatrixMode::Projection);
        let width = self.width as i32;
        let height = self.height as i32;

        let transformed: Vec<Option<ScreenVertex>> = verts
            .iter()
            .map(|v| transform_vertex(v, &mv, &pr, &inputs, width, height))
            .collect();

        let texture = if inputs.texturing && inputs.bound != 0 {
            self.textures.get(&inputs.bound).filter(|t| !t.rgba.is_empty())
        } else {
            None
        };
        let state = PixelState {
            depth_test: inputs.depth_test,
            depth_write: inputs.depth_write,
            depth_fn: inputs.depth_fn,
            blend_on: inputs.blend_on,
            blend: inputs.blend,
            texture,
        };
        let mut frame = Frame {
            width,
            height,
            color: &mut self.color_buf,
            depth: &mut self.depth_buf,
        };

        let mut triangles = 0u64;
        match topology {
            Topology::Triangles | Topology::TriangleStrip | Topology::TriangleFan => {
                let n = transformed.len();
                let tris: Vec<[usize; 3]> = match topology {
                    Topology::Triangles => (0..n / 3).map(|i| [3 * i, 3 * i + 1, 3 * i + 2]).collect(),
                    Topology::TriangleStrip => (2..n)
                        // Winding alternates along the strip.
                        .map(|i| if i % 2 == 0 { [i - 2, i - 1, i] } else { [i - 1, i - 2, i] })
                        .collect(),
                    _ => (2..n).map(|i| [0, i - 1, i]).collect(),
                };
                for [a, b, c] in tris {
                    let (Some(va), Some(vb), Some(vc)) =
                        (transformed[a], transformed[b], transformed[c])
                    else {
                        continue;
                    };
                    if culled(&va, &vb, &vc, inputs.cull_on, inputs.front) {
                        continue;
                    }
                    triangles += 1;
                    fill_triangle(&mut frame, &state, inputs.shade, &va, &vb, &vc);
                }
            }
            Topology::Lines => {
                for pair in transformed.chunks_exact(2) {
                    if let (Some(a), Some(b)) = (pair[0], pair[1]) {
                        draw_line(&mut frame, &state, inputs.shade, &a, &b);
                    }
                }
            }
            Topology::LineStrip => {
                for i in 1..transformed.len() {
                    if let (Some(a), Some(b)) = (transformed[i - 1], transformed[i]) {
                        draw_line(&mut frame, &state, inputs.shade, &a, &b);
                    }
                }
            }
            Topology::Points => {
                for v in transformed.iter().flatten() {
                    plot(&mut frame, &state, v.x as i32, v.y as i32, v.z, v.color, v.texcoord);
                }
            }
        }

        self.stats.triangles_rasterized += triangles;
        self.stats.draw_calls += 1;
    }
}

fn transform_vertex(
    v: &EmitVertex,
    mv: &crate::math::Matrix4,
    pr: &crate::math::Matrix4,
    inputs: &RasterInputs,
    width: i32,
    height: i32,
) -> Option<ScreenVertex> {
    let eye = mv.transform(v.pos);
    let color = if inputs.lighting {
        let m = &mv.0;
        let n = v.normal;
        let eye_normal = [
            n[0] * m[0][0] + n[1] * m[1][0] + n[2] * m[2][0],
            n[0] * m[0][1] + n[1] * m[1][1] + n[2] * m[2][1],
            n[0] * m[0][2] + n[1] * m[1][2] + n[2] * m[2][2],
        ];
        light_vertex(
            &inputs.material,
            inputs.ambient_model,
            &inputs.lights,
            eye,
            eye_normal,
        )
    } else {
        v.color
    };
    let clip = pr.transform(eye);
    if clip[3] <= MIN_CLIP_W {
        return None;
    }
    let inv_w = 1.0 / clip[3];
    let ndc = [clip[0] * inv_w, clip[1] * inv_w, clip[2] * inv_w];
    Some(ScreenVertex {
        x: (ndc[0] * 0.5 + 0.5) * width as f32,
        y: (0.5 - ndc[1] * 0.5) * height as f32,
        z: (ndc[2] * 0.5 + 0.5).clamp(0.0, 1.0),
        ndc: [ndc[0], ndc[1]],
        color,
        texcoord: v.texcoord,
    })
}

fn light_vertex(
    material: &MaterialParams,
    ambient_model: [f32; 4],
    lights: &[(bool, LightParams); MAX_LIGHTS],
    eye: [f32; 4],
    normal: [f32; 3],
) -> [f32; 4] {
    let n = normalize(normal);
    let mut out = [
        material.emissive[0] + material.ambient[0] * ambient_model[0],
        material.emissive[1] + material.ambient[1] * ambient_model[1],
        material.emissive[2] + material.ambient[2] * ambient_model[2],
        material.diffuse[3],
    ];
    for (enabled, light) in lights.iter() {
        if !enabled {
            continue;
        }
        let to_light = if light.position[3] == 0.0 {
            // w == 0 signals an infinitely distant light; the position is
            // the direction toward it.
            [light.position[0], light.position[1], light.position[2]]
        } else {
            [
                light.position[0] - eye[0],
                light.position[1] - eye[1],
                light.position[2] - eye[2],
            ]
        };
        let l = normalize(to_light);
        let ndotl = (n[0] * l[0] + n[1] * l[1] + n[2] * l[2]).max(0.0);
        if ndotl > 0.0 {
            out[0] += material.diffuse[0] * light.diffuse[0] * ndotl;
            out[1] += material.diffuse[1] * light.diffuse[1] * ndotl;
            out[2] += material.diffuse[2] * light.diffuse[2] * ndotl;
        }
    }
    [
        out[0].clamp(0.0, 1.0),
        out[1].clamp(0.0, 1.0),
        out[2].clamp(0.0, 1.0),
        out[3].clamp(0.0, 1.0),
    ]
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len <= 0.0 {
        return [0.0, 0.0, 0.0];
    }
    [v[0] / len, v[1] / len, v[2] / len]
}

/// Signed double area in NDC; positive means counter-clockwise.
fn ndc_area(a: &ScreenVertex, b: &ScreenVertex, c: &ScreenVertex) -> f32 {
    (b.ndc[0] - a.ndc[0]) * (c.ndc[1] - a.ndc[1])
        - (b.ndc[1] - a.ndc[1]) * (c.ndc[0] - a.ndc[0])
}

fn culled(a: &ScreenVertex, b: &ScreenVertex, c: &ScreenVertex, cull_on: bool, front: Winding) -> bool {
    if !cull_on {
        return false;
    }
    let area = ndc_area(a, b, c);
    let front_facing = match front {
        Winding::Ccw => area > 0.0,
        Winding::Cw => area < 0.0,
    };
    !front_facing
}

fn fill_triangle(
    frame: &mut Frame<'_>,
    state: &PixelState<'_>,
    shade: ShadeModel,
    a: &ScreenVertex,
    b: &ScreenVertex,
    c: &ScreenVertex,
) {
    let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as i32;
    let max_x = (a.x.max(b.x).max(c.x).ceil() as i32).min(frame.width);
    let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as i32;
    let max_y = (a.y.max(b.y).max(c.y).ceil() as i32).min(frame.height);
    if min_x >= max_x || min_y >= max_y {
        return;
    }

    let area = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
    if area == 0.0 {
        return;
    }
    let inv_area = 1.0 / area;

    for py in min_y..max_y {
        for px in min_x..max_x {
            let fx = px as f32 + 0.5;
            let fy = py as f32 + 0.5;
            let w0 = ((c.x - b.x) * (fy - b.y) - (c.y - b.y) * (fx - b.x)) * inv_area;
            let w1 = ((a.x - c.x) * (fy - c.y) - (a.y - c.y) * (fx - c.x)) * inv_area;
            let w2 = 1.0 - w0 - w1;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let z = w0 * a.z + w1 * b.z + w2 * c.z;
            let color = match shade {
                // The last vertex provokes flat-shaded primitives.
                ShadeModel::Flat => c.color,
                ShadeModel::Smooth => [
                    w0 * a.color[0] + w1 * b.color[0] + w2 * c.color[0],
                    w0 * a.color[1] + w1 * b.color[1] + w2 * c.color[1],
                    w0 * a.color[2] + w1 * b.color[2] + w2 * c.color[2],
                    w0 * a.color[3] + w1 * b.color[3] + w2 * c.color[3],
                ],
            };
            let texcoord = [
                w0 * a.texcoord[0] + w1 * b.texcoord[0] + w2 * c.texcoord[0],
                w0 * a.texcoord[1] + w1 * b.texcoord[1] + w2 * c.texcoord[1],
            ];
            plot(frame, state, px, py, z, color, texcoord);
        }
    }
}

fn draw_line(
    frame: &mut Frame<'_>,
    state: &PixelState<'_>,
    shade: ShadeModel,
    a: &ScreenVertex,
    b: &ScreenVertex,
) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0);
    let n = steps as i32;
    for i in 0..=n {
        let t = i as f32 / steps;
        let x = a.x + dx * t;
        let y = a.y + dy * t;
        let z = a.z + (b.z - a.z) * t;
        let color = match shade {
            ShadeModel::Flat => b.color,
            ShadeModel::Smooth => [
                a.color[0] + (b.color[0] - a.color[0]) * t,
                a.color[1] + (b.color[1] - a.color[1]) * t,
                a.color[2] + (b.color[2] - a.color[2]) * t,
                a.color[3] + (b.color[3] - a.color[3]) * t,
            ],
        };
        plot(frame, state, x as i32, y as i32, z, color, a.texcoord);
    }
}

fn plot(
    frame: &mut Frame<'_>,
    state: &PixelState<'_>,
    x: i32,
    y: i32,
    z: f32,
    color: [f32; 4],
    texcoord: [f32; 2],
) {
    if x < 0 || y < 0 || x >= frame.width || y >= frame.height {
        return;
    }
    let idx = (y * frame.width + x) as usize;

    if state.depth_test && !depth_passes(state.depth_fn, z, frame.depth[idx]) {
        return;
    }

    let mut rgba = color;
    if let Some(tex) = state.texture {
        let texel = sample(tex, texcoord);
        rgba = [
            rgba[0] * texel[0],
            rgba[1] * texel[1],
            rgba[2] * texel[2],
            rgba[3] * texel[3],
        ];
    }

    if state.blend_on {
        let at = idx * 4;
        let dst = [
            frame.color[at] as f32 / 255.0,
            frame.color[at + 1] as f32 / 255.0,
            frame.color[at + 2] as f32 / 255.0,
            frame.color[at + 3] as f32 / 255.0,
        ];
        let sf = factor(state.blend.0, rgba[3]);
        let df = factor(state.blend.1, rgba[3]);
        for ch in 0..4 {
            rgba[ch] = rgba[ch] * sf + dst[ch] * df;
        }
    }

    let at = idx * 4;
    frame.color[at] = (rgba[0].clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
    frame.color[at + 1] = (rgba[1].clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
    frame.color[at + 2] = (rgba[2].clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
    frame.color[at + 3] = (rgba[3].clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
    if state.depth_write {
        frame.depth[idx] = z;
    }
}

fn depth_passes(func: DepthFunc, new: f32, old: f32) -> bool {
    match func {
        DepthFunc::Never => false,
        DepthFunc::Less => new < old,
        DepthFunc::Equal => new == old,
        DepthFunc::LessEqual => new <= old,
        DepthFunc::Greater => new > old,
        DepthFunc::NotEqual => new != old,
        DepthFunc::GreaterEqual => new >= old,
        DepthFunc::Always => true,
    }
}

fn factor(f: BlendFactor, src_alpha: f32) -> f32 {
    match f {
        BlendFactor::Zero => 0.0,
        BlendFactor::One => 1.0,
        BlendFactor::SrcAlpha => src_alpha,
        BlendFactor::InvSrcAlpha => 1.0 - src_alpha,
    }
}

fn sample(tex: &TextureObject, texcoord: [f32; 2]) -> [f32; 4] {
    let (w, h) = (tex.width as f32, tex.height as f32);
    if w == 0.0 || h == 0.0 {
        return [1.0, 1.0, 1.0, 1.0];
    }
    let wrap = |v: f32| v - v.floor();
    match tex.mag_filter {
        TexFilter::Nearest => {
            let tx = (wrap(texcoord[0]) * w) as u32 % tex.width;
            let ty = (wrap(texcoord[1]) * h) as u32 % tex.height;
            texel(tex, tx, ty)
        }
        TexFilter::Linear => {
            let fx = wrap(texcoord[0]) * w - 0.5;
            let fy = wrap(texcoord[1]) * h - 0.5;
            let x0 = fx.floor();
            let y0 = fy.floor();
            let tx = fx - x0;
            let ty = fy - y0;
            let x0 = x0.rem_euclid(w) as u32;
            let y0 = y0.rem_euclid(h) as u32;
            let x1 = (x0 + 1) % tex.width;
            let y1 = (y0 + 1) % tex.height;
            let c00 = texel(tex, x0, y0);
            let c10 = texel(tex, x1, y0);
            let c01 = texel(tex, x0, y1);
            let c11 = texel(tex, x1, y1);
            let mut out = [0.0f32; 4];
            for ch in 0..4 {
                let top = c00[ch] * (1.0 - tx) + c10[ch] * tx;
                let bot = c01[ch] * (1.0 - tx) + c11[ch] * tx;
                out[ch] = top * (1.0 - ty) + bot * ty;
            }
            out
        }
    }
}

fn texel(tex: &TextureObject, x: u32, y: u32) -> [f32; 4] {
    let at = ((y * tex.width + x) * 4) as usize;
    [
        tex.rgba[at] as f32 / 255.0,
        tex.rgba[at + 1] as f32 / 255.0,
        tex.rgba[at + 2] as f32 / 255.0,
        tex.rgba[at + 3] as f32 / 255.0,
    ]
}
