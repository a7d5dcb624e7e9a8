use std::{fmt, rc::Rc};

use chip8::{constants::*, Chip8DisplayBuffer};
use glow::{Context as GlowContext, HasContext};

use crate::error::AppError;

/// Colour of a lit pixel.
const FOREGROUND: [u8; 4] = [0xE6, 0xE6, 0xD2, 0xFF];
/// Colour of a dark pixel.
const BACKGROUND: [u8; 4] = [0x1D, 0x21, 0x28, 0xFF];

/// Draws the VM display buffer into the window.
///
/// The display is uploaded to a texture attached to a framebuffer,
/// which is blitted onto the window scaled up with nearest filtering.
pub struct Render {
    /// The interface to the loaded OpenGL function.
    gl: Rc<GlowContext>,
    info: OpenGLInfo,
    texture: glow::Texture,
    framebuffer: glow::Framebuffer,
    /// Staging buffer for the RGBA expanded display.
    pixels: Vec<u8>,
}

impl Render {
    pub fn new(gl: Rc<GlowContext>) -> Result<Self, AppError> {
        let info = OpenGLInfo::new(&gl);
        let (width, height) = (DISPLAY_WIDTH as i32, DISPLAY_HEIGHT as i32);

        let (texture, framebuffer) = unsafe {
            let texture = gl.create_texture().map_err(AppError::graphics)?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA8 as i32,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                None,
            );
            gl.bind_texture(glow::TEXTURE_2D, None);

            let framebuffer = gl.create_framebuffer().map_err(AppError::graphics)?;
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(framebuffer));
            gl.framebuffer_texture_2d(
                glow::READ_FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            );
            let status = gl.check_framebuffer_status(glow::READ_FRAMEBUFFER);
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);

            if status != glow::FRAMEBUFFER_COMPLETE {
                return Err(AppError::graphics(format!(
                    "display framebuffer is incomplete: 0x{status:X}"
                )));
            }

            (texture, framebuffer)
        };

        Ok(Self {
            gl,
            info,
            texture,
            framebuffer,
            pixels: vec![0; DISPLAY_BUFFER_SIZE * 4],
        })
    }

    pub fn clear_window(&mut self, red: f32, green: f32, blue: f32, alpha: f32) {
        unsafe {
            self.gl.clear_color(red, green, blue, alpha);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    /// Draw the display buffer, letterboxed to keep the 2:1 aspect ratio.
    pub fn draw_display(&mut self, display: Chip8DisplayBuffer, viewport: (u32, u32)) {
        for (px, out) in display.iter().zip(self.pixels.chunks_exact_mut(4)) {
            let colour = if *px == PIXEL_OFF {
                &BACKGROUND
            } else {
                &FOREGROUND
            };
            out.copy_from_slice(colour);
        }

        let (x0, y0, x1, y1) = letterbox(viewport);

        unsafe {
            let gl = &self.gl;

            gl.bind_texture(glow::TEXTURE_2D, Some(self.texture));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA8 as i32,
                DISPLAY_WIDTH as i32,
                DISPLAY_HEIGHT as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                Some(&self.pixels),
            );
            gl.bind_texture(glow::TEXTURE_2D, None);

            gl.viewport(0, 0, viewport.0 as i32, viewport.1 as i32);
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(self.framebuffer));
            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, None);

            // Display row 0 is the top of the screen, but the bottom of the
            // texture, so the destination rectangle is flipped vertically.
            gl.blit_framebuffer(
                0,
                0,
                DISPLAY_WIDTH as i32,
                DISPLAY_HEIGHT as i32,
                x0,
                y1,
                x1,
                y0,
                glow::COLOR_BUFFER_BIT,
                glow::NEAREST,
            );
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);
        }
    }

    pub fn opengl_info(&self) -> &OpenGLInfo {
        &self.info
    }
}

impl Drop for Render {
    fn drop(&mut self) {
        unsafe {
            self.gl.delete_framebuffer(self.framebuffer);
            self.gl.delete_texture(self.texture);
        }
    }
}

/// Largest rectangle with the display's aspect ratio, centered in the viewport.
///
/// Returns `(x0, y0, x1, y1)` in window pixels.
fn letterbox((width, height): (u32, u32)) -> (i32, i32, i32, i32) {
    let scale = (width as f32 / DISPLAY_WIDTH as f32).min(height as f32 / DISPLAY_HEIGHT as f32);
    let w = (DISPLAY_WIDTH as f32 * scale) as i32;
    let h = (DISPLAY_HEIGHT as f32 * scale) as i32;
    let x0 = (width as i32 - w) / 2;
    let y0 = (height as i32 - h) / 2;
    (x0, y0, x0 + w, y0 + h)
}

pub struct OpenGLInfo {
    pub version: String,
    pub renderer: String,
    pub vendor: String,
    pub shading_lang: String,
}

impl OpenGLInfo {
    pub fn new(gl: &GlowContext) -> Self {
        unsafe {
            Self {
                version: gl.get_parameter_string(glow::VERSION),
                renderer: gl.get_parameter_string(glow::RENDERER),
                vendor: gl.get_parameter_string(glow::VENDOR),
                shading_lang: gl.get_parameter_string(glow::SHADING_LANGUAGE_VERSION),
            }
        }
    }
}

impl fmt::Display for OpenGLInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Self {
            version,
            renderer,
            vendor,
            shading_lang,
        } = self;
        writeln!(f, "OpenGL Version: {version}")?;
        writeln!(f, "Renderer: {renderer}")?;
        writeln!(f, "Vendor: {vendor}")?;
        writeln!(f, "Shading Language: {shading_lang}")?;
        Ok(())
    }
}
