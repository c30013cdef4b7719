// demos/common/mod.rs
//
// Shared wiring for the demos: window/context creation, OpenGL convenience
// wrappers, and the stand-in "media engine" thread that drives rendering
// through the callback bridge the way a native decoder would.

#![allow(dead_code)]

use baton::{BindableContext, EngineBridge, Error};

use euclid::default::Size2D;
use gl::types::{GLenum, GLint, GLuint, GLvoid};
use glutin::config::ConfigTemplateBuilder;
use glutin::context::{ContextApi, ContextAttributesBuilder};
use glutin::context::{NotCurrentContext, PossiblyCurrentContext};
use glutin::display::GetGlDisplay;
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use glutin_winit::DisplayBuilder;
use log::{debug, error, warn};
use raw_window_handle::HasRawWindowHandle;
use std::ffi::CString;
use std::mem;
use std::num::NonZeroU32;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use winit::dpi::PhysicalSize;
use winit::event_loop::EventLoop;
use winit::window::{Window, WindowBuilder};

/// A glutin context/surface pair, movable between threads through the
/// hand-off.
///
/// glutin's `PossiblyCurrentContext` is deliberately `!Send`: a context that
/// is current is bound to its thread. The hand-off restores the property the
/// type system can't see here: the pair only travels while detached, and
/// while it is current, only the guard-holding thread touches it. EGL, GLX
/// and WGL all permit binding a context from any thread as long as it is
/// bound to at most one at a time, which is exactly the invariant the
/// hand-off enforces.
pub struct WindowContext {
    surface: Surface<WindowSurface>,
    state: ContextState,
}

enum ContextState {
    Current(PossiblyCurrentContext),
    Detached(NotCurrentContext),
    // make-current/detach failed underneath and took the context with it.
    Lost,
}

unsafe impl Send for WindowContext {}

impl WindowContext {
    /// Resizes the underlying surface. Only meaningful while current.
    pub fn resize_surface(&self, size: PhysicalSize<u32>) {
        if let ContextState::Current(ref context) = self.state {
            if let (Some(width), Some(height)) =
                (NonZeroU32::new(size.width), NonZeroU32::new(size.height))
            {
                self.surface.resize(context, width, height);
            }
        }
    }

    /// Requests v-sync on the surface. Only meaningful while current.
    pub fn enable_vsync(&self) {
        if let ContextState::Current(ref context) = self.state {
            if let Err(err) = self
                .surface
                .set_swap_interval(context, SwapInterval::Wait(NonZeroU32::new(1).unwrap()))
            {
                debug!("v-sync not available: {}", err);
            }
        }
    }
}

impl BindableContext for WindowContext {
    fn make_current(&mut self) -> Result<(), Error> {
        match mem::replace(&mut self.state, ContextState::Lost) {
            ContextState::Detached(context) => match context.make_current(&self.surface) {
                Ok(context) => {
                    self.state = ContextState::Current(context);
                    Ok(())
                }
                Err(err) => {
                    error!("could not make the context current: {}", err);
                    Err(Error::ContextOperationFailed)
                }
            },
            ContextState::Current(context) => match context.make_current(&self.surface) {
                Ok(()) => {
                    self.state = ContextState::Current(context);
                    Ok(())
                }
                Err(err) => {
                    self.state = ContextState::Current(context);
                    error!("could not re-bind the current context: {}", err);
                    Err(Error::ContextOperationFailed)
                }
            },
            ContextState::Lost => Err(Error::ContextOperationFailed),
        }
    }

    fn make_not_current(&mut self) -> Result<(), Error> {
        match mem::replace(&mut self.state, ContextState::Lost) {
            ContextState::Current(context) => match context.make_not_current() {
                Ok(context) => {
                    self.state = ContextState::Detached(context);
                    Ok(())
                }
                Err(err) => {
                    error!("could not detach the context: {}", err);
                    Err(Error::ContextOperationFailed)
                }
            },
            ContextState::Detached(context) => {
                self.state = ContextState::Detached(context);
                Ok(())
            }
            ContextState::Lost => Err(Error::ContextOperationFailed),
        }
    }

    fn swap_buffers(&mut self) -> Result<(), Error> {
        match self.state {
            ContextState::Current(ref context) => {
                self.surface.swap_buffers(context).map_err(|err| {
                    error!("buffer swap failed: {}", err);
                    Error::ContextOperationFailed
                })
            }
            _ => {
                warn!("swap_buffers without a current context");
                Err(Error::ContextOperationFailed)
            }
        }
    }
}

/// Creates the window, picks a GL config and builds a detached context for
/// it, the way the glutin/winit pairing wants it done.
pub fn create_window_context<T>(
    event_loop: &EventLoop<T>,
    title: &str,
    size: PhysicalSize<u32>,
) -> (Window, glutin::display::Display, WindowContext) {
    let window_builder = WindowBuilder::new()
        .with_title(title)
        .with_inner_size(size);
    let template = ConfigTemplateBuilder::new();
    let display_builder = DisplayBuilder::new().with_window_builder(Some(window_builder));

    let (window, gl_config) = display_builder
        .build(event_loop, template, |mut configs| {
            configs.next().expect("no suitable GL configurations")
        })
        .expect("failed to create the window");
    let window = window.expect("failed to create the window");

    let raw_window_handle = window.raw_window_handle();
    let gl_display = gl_config.display();

    // Try for 3.3 core (the default), fall back to GLES on mobile-class
    // drivers.
    let context_attributes = ContextAttributesBuilder::new().build(Some(raw_window_handle));
    let fallback_context_attributes = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::Gles(None))
        .build(Some(raw_window_handle));
    let context = unsafe {
        gl_display
            .create_context(&gl_config, &context_attributes)
            .unwrap_or_else(|_| {
                gl_display
                    .create_context(&gl_config, &fallback_context_attributes)
                    .expect("failed to create a GL context")
            })
    };

    let (width, height): (u32, u32) = window.inner_size().into();
    let attributes = SurfaceAttributesBuilder::<WindowSurface>::new().build(
        raw_window_handle,
        NonZeroU32::new(width).expect("zero-width window"),
        NonZeroU32::new(height).expect("zero-height window"),
    );
    let surface = unsafe {
        gl_display
            .create_window_surface(&gl_config, &attributes)
            .expect("failed to create the window surface")
    };

    let window_context = WindowContext {
        surface,
        state: ContextState::Detached(context),
    };
    (window, gl_display, window_context)
}

/// Builds the GL symbol loader the bridge hands to the engine.
pub fn symbol_loader(gl_display: glutin::display::Display) -> baton::SymbolLoader {
    Box::new(move |name| {
        let name = CString::new(name).unwrap();
        gl_display.get_proc_address(&name)
    })
}

pub fn ck() {
    unsafe {
        debug_assert_eq!(gl::GetError(), gl::NO_ERROR);
    }
}

pub struct Program {
    pub object: GLuint,
    #[allow(dead_code)]
    vertex_shader: Shader,
    #[allow(dead_code)]
    fragment_shader: Shader,
}

impl Program {
    pub fn new(vertex_shader: Shader, fragment_shader: Shader) -> Program {
        unsafe {
            let program = gl::CreateProgram();
            ck();
            gl::AttachShader(program, vertex_shader.object);
            ck();
            gl::AttachShader(program, fragment_shader.object);
            ck();
            gl::LinkProgram(program);
            ck();
            let mut linked = 0;
            gl::GetProgramiv(program, gl::LINK_STATUS, &mut linked);
            assert_ne!(linked, 0, "program did not link");
            Program {
                object: program,
                vertex_shader,
                fragment_shader,
            }
        }
    }
}

pub struct Shader {
    object: GLuint,
}

#[derive(Clone, Copy)]
pub enum ShaderKind {
    Vertex,
    Fragment,
}

impl Shader {
    pub fn new(kind: ShaderKind, source: &str) -> Shader {
        let kind = match kind {
            ShaderKind::Vertex => gl::VERTEX_SHADER,
            ShaderKind::Fragment => gl::FRAGMENT_SHADER,
        };
        unsafe {
            let shader = gl::CreateShader(kind);
            ck();
            gl::ShaderSource(
                shader,
                1,
                &(source.as_ptr() as *const i8),
                &(source.len() as GLint),
            );
            ck();
            gl::CompileShader(shader);
            let mut compiled = 0;
            gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut compiled);
            if compiled == 0 {
                let mut buffer = vec![0u8; 4096];
                let mut length = 0;
                gl::GetShaderInfoLog(
                    shader,
                    buffer.len() as GLint,
                    &mut length,
                    buffer.as_mut_ptr() as *mut i8,
                );
                panic!(
                    "shader did not compile: {}",
                    String::from_utf8_lossy(&buffer[..length as usize])
                );
            }
            Shader { object: shader }
        }
    }
}

pub struct Buffer {
    pub object: GLuint,
}

impl Buffer {
    pub fn from_data(target: GLenum, data: &[u8]) -> Buffer {
        unsafe {
            let mut buffer = 0;
            gl::GenBuffers(1, &mut buffer);
            ck();
            gl::BindBuffer(target, buffer);
            ck();
            gl::BufferData(
                target,
                data.len() as isize,
                data.as_ptr() as *const GLvoid,
                gl::STATIC_DRAW,
            );
            ck();
            Buffer { object: buffer }
        }
    }
}

/// The streaming RGBA texture the decoded frames land in.
pub struct VideoTexture {
    pub object: GLuint,
    pub size: Size2D<u32>,
}

impl VideoTexture {
    pub fn new(size: Size2D<u32>) -> VideoTexture {
        unsafe {
            let mut texture = 0;
            gl::GenTextures(1, &mut texture);
            ck();
            gl::BindTexture(gl::TEXTURE_2D, texture);
            ck();
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGBA8 as GLint,
                size.width as GLint,
                size.height as GLint,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                ptr::null(),
            );
            ck();
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as GLint);
            ck();
            VideoTexture {
                object: texture,
                size,
            }
        }
    }

    pub fn upload(&self, pixels: &[u8]) {
        assert_eq!(pixels.len(), self.size.width as usize * self.size.height as usize * 4);
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, self.object);
            gl::TexSubImage2D(
                gl::TEXTURE_2D,
                0,
                0,
                0,
                self.size.width as GLint,
                self.size.height as GLint,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                pixels.as_ptr() as *const GLvoid,
            );
            ck();
        }
    }
}

/// Synthetic frame source standing in for the native decoder: animated
/// color bars with a moving sweep, one frame per call.
pub struct TestPattern {
    size: Size2D<u32>,
    frame: u64,
    pixels: Vec<u8>,
}

// Rough SMPTE bar colors, RGBA.
static BAR_COLORS: [[u8; 4]; 8] = [
    [235, 235, 235, 255],
    [235, 235, 16, 255],
    [16, 235, 235, 255],
    [16, 235, 16, 255],
    [235, 16, 235, 255],
    [235, 16, 16, 255],
    [16, 16, 235, 255],
    [16, 16, 16, 255],
];

impl TestPattern {
    pub fn new(size: Size2D<u32>) -> TestPattern {
        TestPattern {
            size,
            frame: 0,
            pixels: vec![0; size.width as usize * size.height as usize * 4],
        }
    }

    pub fn size(&self) -> Size2D<u32> {
        self.size
    }

    pub fn advance(&mut self) -> &[u8] {
        let (width, height) = (self.size.width as usize, self.size.height as usize);
        let bar_width = (width / BAR_COLORS.len()).max(1);
        let sweep = (self.frame as usize * 2) % width;
        for y in 0..height {
            for x in 0..width {
                let mut color = BAR_COLORS[(x / bar_width).min(BAR_COLORS.len() - 1)];
                // A brighter column sweeping left to right makes motion (and
                // a stalled feed) obvious.
                if x.abs_diff(sweep) < 4 {
                    color = [255, 255, 255, 255];
                }
                // Darken the lower third a little so orientation mistakes
                // show up too.
                if y * 3 > height * 2 {
                    color = [color[0] / 2, color[1] / 2, color[2] / 2, 255];
                }
                let offset = (y * width + x) * 4;
                self.pixels[offset..offset + 4].copy_from_slice(&color);
            }
        }
        self.frame += 1;
        &self.pixels
    }
}

/// What a demo renders once the engine has entered a render section.
pub trait FrameRenderer {
    /// One-time GL setup, called inside the first render section, after GL
    /// symbols have been resolved through the bridge.
    fn setup(&mut self, pattern_size: Size2D<u32>);

    /// Draws one frame of `pixels` into an output of `output_size`.
    fn render(&mut self, pixels: &[u8], output_size: Size2D<u32>);
}

/// Shared run/pause switches for the engine thread.
#[derive(Clone)]
pub struct EngineControls {
    pub running: Arc<AtomicBool>,
    pub paused: Arc<AtomicBool>,
}

impl EngineControls {
    pub fn new() -> EngineControls {
        EngineControls {
            running: Arc::new(AtomicBool::new(true)),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn toggle_paused(&self) {
        self.paused.fetch_xor(true, Ordering::Relaxed);
    }
}

/// The engine thread body: the callback sequence a native video engine
/// performs per frame, driven here by a synthetic source at a fixed rate.
pub fn run_engine<R>(
    bridge: Arc<EngineBridge<WindowContext>>,
    controls: EngineControls,
    mut pattern: TestPattern,
    fps: u32,
    initial_output_size: Size2D<u32>,
    mut renderer: R,
) where
    R: FrameRenderer,
{
    let frame_duration = Duration::from_millis(1000 / u64::from(fps.max(1)));

    // The engine learns about output size changes through the size report.
    let output_size = Arc::new(Mutex::new(initial_output_size));
    {
        let output_size = output_size.clone();
        bridge.size_report().set_callback(move |size| {
            *output_size.lock().unwrap() = size;
        });
    }

    let mut initialized = false;
    while controls.running.load(Ordering::Relaxed) {
        if controls.paused.load(Ordering::Relaxed) {
            thread::sleep(frame_duration);
            continue;
        }

        if !bridge.enter_render() {
            // Shut down or contended; come back on the next cycle.
            thread::sleep(frame_duration);
            continue;
        }
        if !initialized {
            gl::load_with(|name| bridge.resolve(name) as *const _);
            renderer.setup(pattern.size());
            initialized = true;
        }
        let current_output_size = *output_size.lock().unwrap();
        let pixels = pattern.advance();
        renderer.render(pixels, current_output_size);
        bridge.present();
        bridge.leave_render();

        thread::sleep(frame_duration);
    }

    bridge.size_report().clear_callback();
}

/// The application thread's brief need for the context: update the surface
/// and viewport for a new window size, then hand it straight back.
///
/// This path is bounded so a stuck render callback cannot hang the event
/// loop; on timeout the resize is simply skipped and the next one catches
/// up. Either way the engine is told the new output size afterwards.
pub fn handle_resize(
    handoff: &baton::ContextHandoff<WindowContext>,
    bridge: &EngineBridge<WindowContext>,
    new_size: PhysicalSize<u32>,
) {
    match handoff.acquire_timeout(Duration::from_secs(1)) {
        Ok(guard) => match guard.make_current() {
            Ok(current) => {
                current.resize_surface(new_size);
                unsafe {
                    gl::Viewport(0, 0, new_size.width as i32, new_size.height as i32);
                }
            }
            Err(err) => warn!("resize skipped: {:?}", err),
        },
        Err(Error::WaitTimedOut) => debug!("resize skipped: context busy"),
        Err(err) => debug!("resize skipped: {:?}", err),
    }

    bridge
        .size_report()
        .report(Size2D::new(new_size.width, new_size.height));
}

/// Parses a `WIDTHxHEIGHT` argument.
pub fn parse_size(value: &str) -> Size2D<u32> {
    let mut parts = value.splitn(2, 'x');
    let parse = |part: Option<&str>| {
        part.and_then(|part| part.parse().ok())
            .expect("size must look like 640x360")
    };
    Size2D::new(parse(parts.next()), parse(parts.next()))
}
