//! Textures correlate a surface's pixel buffer with a context texture
//! object and keep the two in sync through format-specific upload paths.
//!
//! The surface stays the single source of truth for pixel data. The
//! context object is allocated lazily, exactly once, on the first handle
//! request or load. A color-key change re-runs the upload so keyed
//! transparency lands in the context object.

use crate::error::D3dError;
use crate::gl::{GlContext, TexImage};
use crate::surface::{ColorKey, PaletteEntry, PixelFormatFlags, Surface};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

pub struct Texture {
    surface: Rc<RefCell<Surface>>,
    tex_name: u32,
    alloc_on_load: bool,
}

impl Texture {
    pub fn new(surface: Rc<RefCell<Surface>>) -> Self {
        Texture {
            surface,
            tex_name: 0,
            alloc_on_load: true,
        }
    }

    pub fn surface(&self) -> &Rc<RefCell<Surface>> {
        &self.surface
    }

    /// Context texture object name; zero means not yet allocated.
    pub fn tex_name(&self) -> u32 {
        self.tex_name
    }

    /// True until the first load gives the surface real content.
    pub fn alloc_on_load(&self) -> bool {
        self.alloc_on_load
    }

    /// Allocates the context object on first use. Idempotent.
    pub(crate) fn ensure_allocated(&mut self, gl: &mut GlContext) -> u32 {
        if self.tex_name == 0 {
            self.tex_name = gl.gen_texture();
        }
        self.tex_name
    }

    /// Copies the source texture's pixels into this texture's surface and
    /// uploads them into the context object. The only hard failure is a
    /// dimension mismatch; unhandled formats leave the context object
    /// stale and report success.
    pub fn load(&mut self, gl: &mut GlContext, src: &Texture) -> Result<(), D3dError> {
        let (src_width, src_height) = {
            let s = src.surface.borrow();
            (s.width(), s.height())
        };
        {
            let dst = self.surface.borrow();
            if (dst.width(), dst.height()) != (src_width, src_height) {
                return Err(D3dError::TextureLoadFailed {
                    src_width,
                    src_height,
                    dst_width: dst.width(),
                    dst_height: dst.height(),
                });
            }
        }
        {
            let src_surf = src.surface.borrow();
            let mut dst = self.surface.borrow_mut();
            let n = src_surf.pixels().len().min(dst.pixels_mut().len());
            dst.pixels_mut()[..n].copy_from_slice(&src_surf.pixels()[..n]);
            if let Some(palette) = src_surf.palette() {
                dst.set_palette(*palette);
            }
            dst.set_color_key(src_surf.color_key());
        }
        self.alloc_on_load = false;
        self.ensure_allocated(gl);
        self.upload(gl);
        Ok(())
    }

    /// Changes the surface's color-key range and re-runs the upload so the
    /// keyed alpha lands in the context object.
    pub fn set_color_key(&mut self, gl: &mut GlContext, key: Option<ColorKey>) {
        self.surface.borrow_mut().set_color_key(key);
        if self.tex_name != 0 {
            self.upload(gl);
        }
    }

    /// Palette updates do not propagate to already-uploaded textures.
    pub fn palette_changed(&mut self, start: u32, count: u32) {
        warn!(start, count, "palette change propagation not implemented");
    }

    pub fn unload(&mut self) {
        warn!("texture unload not implemented");
    }

    pub(crate) fn upload(&mut self, gl: &mut GlContext) {
        let surface = self.surface.borrow();
        let format = *surface.format();
        let (width, height) = (surface.width(), surface.height());
        let pixels = surface.pixels();
        let key = surface.color_key();

        gl.bind_texture(self.tex_name);
        let paletted = format.flags.contains(PixelFormatFlags::PALETTEINDEXED8);
        let rgb = format.flags.contains(PixelFormatFlags::RGB);
        match (paletted, rgb, format.bit_count) {
            (true, _, 8) => match surface.palette() {
                Some(palette) => {
                    let lut = palette_lut(palette, key);
                    gl.tex_image_2d(width, height, TexImage::Indexed { lut: &lut, indices: pixels });
                }
                None => debug!("paletted surface has no palette, texture left stale"),
            },
            (false, true, 8) => {
                gl.tex_image_2d(width, height, TexImage::Rgb332(pixels));
            }
            (false, true, 16) => match format.a_mask {
                0 => {
                    if let Some(key) = key {
                        // The native 16-bit format carries no alpha, so the
                        // keyed range is expressed by repacking into a
                        // one-bit-alpha layout.
                        let repacked = repack_565_color_key(pixels, key);
                        gl.tex_image_2d(width, height, TexImage::Rgba5551(&repacked));
                    } else {
                        gl.tex_image_2d(width, height, TexImage::Rgb565(pixels));
                    }
                }
                0x8000 => gl.tex_image_2d(width, height, TexImage::Argb1555(pixels)),
                0xF000 => gl.tex_image_2d(width, height, TexImage::Argb4444(pixels)),
                mask => debug!(a_mask = mask, "unhandled 16-bit alpha layout, texture left stale"),
            },
            (false, true, 24) => {
                gl.tex_image_2d(width, height, TexImage::Rgb888(pixels));
            }
            (false, true, 32) => {
                if format.a_mask != 0 {
                    gl.tex_image_2d(width, height, TexImage::Argb8888(pixels));
                } else {
                    gl.tex_image_2d(width, height, TexImage::Xrgb8888(pixels));
                }
            }
            (_, _, bits) => {
                debug!(bits, flags = ?format.flags, "unhandled pixel format, texture left stale");
            }
        }
    }
}

/// Builds the 256-entry RGBA lookup table for a paletted upload. Entries
/// whose index falls in the color-key range become fully transparent.
pub(crate) fn palette_lut(
    palette: &[PaletteEntry; 256],
    key: Option<ColorKey>,
) -> [[u8; 4]; 256] {
    let mut lut = [[0u8; 4]; 256];
    for (i, (dst, entry)) in lut.iter_mut().zip(palette.iter()).enumerate() {
        let alpha = match key {
            Some(key) if key.contains(i as u32) => 0x00,
            _ => 0xFF,
        };
        *dst = [entry.red, entry.green, entry.blue, alpha];
    }
    lut
}

/// Synthesizes a one-bit alpha channel over packed 5-6-5 pixels: values
/// inside the key range come out transparent, everything else opaque. Red
/// and the top five green bits are preserved in place; blue shifts up one
/// bit to make room for the alpha bit.
pub(crate) fn repack_565_color_key(pixels: &[u8], key: ColorKey) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len());
    for chunk in pixels.chunks_exact(2) {
        let color = u16::from_le_bytes([chunk[0], chunk[1]]);
        let mut repacked = (color & 0xFFC0) | ((color & 0x001F) << 1);
        if !key.contains(color as u32) {
            repacked |= 0x0001;
        }
        out.extend_from_slice(&repacked.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repack_preserves_red_and_truncates_green() {
        let key = ColorKey { low: 0xF800, high: 0xF800 };
        // 0x07FF: green and blue saturated, outside the key range.
        let out = repack_565_color_key(&0x07FFu16.to_le_bytes(), key);
        let v = u16::from_le_bytes([out[0], out[1]]);
        assert_eq!(v & 0x0001, 0x0001, "outside the key range stays opaque");
        assert_eq!(v >> 11, 0x00, "red preserved");
        assert_eq!((v >> 6) & 0x1F, 0x1F, "green keeps its top five bits");
        assert_eq!((v >> 1) & 0x1F, 0x1F, "blue shifts up intact");
    }

    #[test]
    fn repack_clears_alpha_inside_key_range() {
        let key = ColorKey { low: 0x1234, high: 0x1240 };
        let out = repack_565_color_key(&0x1238u16.to_le_bytes(), key);
        let v = u16::from_le_bytes([out[0], out[1]]);
        assert_eq!(v & 0x0001, 0x0000);
    }

    #[test]
    fn palette_lut_marks_keyed_indices_transparent() {
        let mut palette = [PaletteEntry::default(); 256];
        palette[5] = PaletteEntry { red: 10, green: 20, blue: 30 };
        let lut = palette_lut(&palette, Some(ColorKey { low: 5, high: 6 }));
        assert_eq!(lut[5], [10, 20, 30, 0x00]);
        assert_eq!(lut[7], [0, 0, 0, 0xFF]);
    }
}
