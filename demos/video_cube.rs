// demos/video_cube.rs
//
// The same callback-driven rendering as `video_quad`, with the synthetic
// video feed textured onto a spinning cube instead of a flat surface. The
// fixed-function cube of old has been modernized to buffer objects and
// shaders; the hand-off protocol is identical either way.
//
// ESC quits, SPACE pauses the feed.

use crate::common::{
    ck, Buffer, EngineControls, FrameRenderer, Program, Shader, ShaderKind, TestPattern,
    VideoTexture,
};

use baton::{BindableContext, ContextHandoff, EngineBridge};
use clap::{App, Arg};
use euclid::default::Transform3D;
use euclid::{Angle, default::Size2D};
use gl::types::{GLchar, GLint, GLuint, GLvoid};
use std::ffi::CString;
use std::mem;
use std::slice;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};

use glutin::display::GlDisplay;

mod common;

const WINDOW_WIDTH: u32 = 800;
const WINDOW_HEIGHT: u32 = 600;

const NEAR_PLANE: f32 = 0.1;
const FAR_PLANE: f32 = 20.0;
const FIELD_OF_VIEW: f32 = 0.9; // radians

const PITCH_PER_FRAME: f32 = 0.007;
const YAW_PER_FRAME: f32 = 0.011;

// Per face: four corners of position (x, y, z) and texture coordinate
// (u, v), video upright on every face.
#[rustfmt::skip]
static CUBE_VERTICES: [f32; 120] = [
    // Front
    -1.0, -1.0,  1.0, 0.0, 1.0,
     1.0, -1.0,  1.0, 1.0, 1.0,
     1.0,  1.0,  1.0, 1.0, 0.0,
    -1.0,  1.0,  1.0, 0.0, 0.0,
    // Back
     1.0, -1.0, -1.0, 0.0, 1.0,
    -1.0, -1.0, -1.0, 1.0, 1.0,
    -1.0,  1.0, -1.0, 1.0, 0.0,
     1.0,  1.0, -1.0, 0.0, 0.0,
    // Left
    -1.0, -1.0, -1.0, 0.0, 1.0,
    -1.0, -1.0,  1.0, 1.0, 1.0,
    -1.0,  1.0,  1.0, 1.0, 0.0,
    -1.0,  1.0, -1.0, 0.0, 0.0,
    // Right
     1.0, -1.0,  1.0, 0.0, 1.0,
     1.0, -1.0, -1.0, 1.0, 1.0,
     1.0,  1.0, -1.0, 1.0, 0.0,
     1.0,  1.0,  1.0, 0.0, 0.0,
    // Top
    -1.0,  1.0,  1.0, 0.0, 1.0,
     1.0,  1.0,  1.0, 1.0, 1.0,
     1.0,  1.0, -1.0, 1.0, 0.0,
    -1.0,  1.0, -1.0, 0.0, 0.0,
    // Bottom
    -1.0, -1.0, -1.0, 0.0, 1.0,
     1.0, -1.0, -1.0, 1.0, 1.0,
     1.0, -1.0,  1.0, 1.0, 0.0,
    -1.0, -1.0,  1.0, 0.0, 0.0,
];

#[rustfmt::skip]
static CUBE_INDICES: [u16; 36] = [
     0,  1,  2,  0,  2,  3,
     4,  5,  6,  4,  6,  7,
     8,  9, 10,  8, 10, 11,
    12, 13, 14, 12, 14, 15,
    16, 17, 18, 16, 18, 19,
    20, 21, 22, 20, 22, 23,
];

static CUBE_VERTEX_SHADER: &str = "
#version 330
layout(location = 0) in vec3 aPosition;
layout(location = 1) in vec2 aTexCoord;
uniform mat4 uTransform;
out vec2 vTexCoord;
void main() {
    vTexCoord = aTexCoord;
    gl_Position = uTransform * vec4(aPosition, 1.0);
}
";

static CUBE_FRAGMENT_SHADER: &str = "
#version 330
uniform sampler2D uVideo;
in vec2 vTexCoord;
out vec4 oFragColor;
void main() {
    oFragColor = texture(uVideo, vTexCoord);
}
";

fn main() {
    env_logger::init();

    let matches = App::new("video_cube")
        .about("Renders a synthetic video feed on the faces of a spinning cube")
        .arg(
            Arg::with_name("video-size")
                .long("video-size")
                .takes_value(true)
                .help("Size of the synthetic video feed, e.g. 640x360"),
        )
        .arg(
            Arg::with_name("fps")
                .long("fps")
                .takes_value(true)
                .help("Frame rate of the synthetic video feed"),
        )
        .get_matches();

    let video_size = matches
        .value_of("video-size")
        .map(common::parse_size)
        .unwrap_or(Size2D::new(640, 360));
    let fps: u32 = matches
        .value_of("fps")
        .map(|fps| fps.parse().expect("--fps must be an integer"))
        .unwrap_or(60);

    let event_loop = EventLoop::new();
    let (window, gl_display, mut context) = common::create_window_context(
        &event_loop,
        "baton OpenGL video cube",
        PhysicalSize::new(WINDOW_WIDTH, WINDOW_HEIGHT),
    );

    context
        .make_current()
        .expect("failed to make the new context current");
    gl::load_with(|name| {
        let name = CString::new(name).unwrap();
        gl_display.get_proc_address(&name)
    });
    context.enable_vsync();
    unsafe {
        gl::ClearColor(0.05, 0.05, 0.08, 1.0);
    }
    context
        .make_not_current()
        .expect("failed to detach the context after setup");

    let handoff = ContextHandoff::new();
    handoff.deposit(context);

    let bridge = Arc::new(EngineBridge::new(
        handoff.clone(),
        common::symbol_loader(gl_display),
    ));
    let controls = EngineControls::new();

    let initial_size = window.inner_size();
    let engine = {
        let bridge = bridge.clone();
        let controls = controls.clone();
        thread::spawn(move || {
            common::run_engine(
                bridge,
                controls,
                TestPattern::new(video_size),
                fps,
                Size2D::new(initial_size.width, initial_size.height),
                CubeRenderer::new(),
            );
        })
    };
    let mut engine = Some(engine);

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;
        match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => *control_flow = ControlFlow::Exit,
                WindowEvent::KeyboardInput { input, .. } => {
                    match (input.virtual_keycode, input.state) {
                        (Some(VirtualKeyCode::Escape), ElementState::Released) => {
                            *control_flow = ControlFlow::Exit
                        }
                        (Some(VirtualKeyCode::Space), ElementState::Released) => {
                            controls.toggle_paused()
                        }
                        _ => {}
                    }
                }
                WindowEvent::Resized(new_size) => {
                    common::handle_resize(&handoff, &bridge, new_size)
                }
                _ => {}
            },
            Event::LoopDestroyed => {
                controls.running.store(false, Ordering::Relaxed);
                handoff.shut_down();
                if let Some(engine) = engine.take() {
                    let _ = engine.join();
                }
            }
            _ => {}
        }
    });
}

struct CubeRenderer {
    pitch: f32,
    yaw: f32,
    gl_state: Option<CubeGl>,
}

struct CubeGl {
    program: Program,
    vertex_array: GLuint,
    #[allow(dead_code)]
    vertex_buffer: Buffer,
    #[allow(dead_code)]
    index_buffer: Buffer,
    texture: VideoTexture,
    transform_uniform: GLint,
}

impl CubeRenderer {
    fn new() -> CubeRenderer {
        CubeRenderer {
            pitch: 0.4,
            yaw: 0.2,
            gl_state: None,
        }
    }
}

impl FrameRenderer for CubeRenderer {
    fn setup(&mut self, pattern_size: Size2D<u32>) {
        let program = Program::new(
            Shader::new(ShaderKind::Vertex, CUBE_VERTEX_SHADER),
            Shader::new(ShaderKind::Fragment, CUBE_FRAGMENT_SHADER),
        );
        let vertex_data = unsafe {
            slice::from_raw_parts(
                CUBE_VERTICES.as_ptr() as *const u8,
                mem::size_of_val(&CUBE_VERTICES),
            )
        };
        let index_data = unsafe {
            slice::from_raw_parts(
                CUBE_INDICES.as_ptr() as *const u8,
                mem::size_of_val(&CUBE_INDICES),
            )
        };
        let vertex_buffer = Buffer::from_data(gl::ARRAY_BUFFER, vertex_data);
        let texture = VideoTexture::new(pattern_size);
        unsafe {
            let mut vertex_array = 0;
            gl::GenVertexArrays(1, &mut vertex_array);
            ck();
            gl::BindVertexArray(vertex_array);
            gl::BindBuffer(gl::ARRAY_BUFFER, vertex_buffer.object);
            // The element buffer binding is VAO state, so create it bound.
            let index_buffer = Buffer::from_data(gl::ELEMENT_ARRAY_BUFFER, index_data);

            let stride = (5 * mem::size_of::<f32>()) as GLint;
            gl::VertexAttribPointer(0, 3, gl::FLOAT, gl::FALSE, stride, std::ptr::null());
            gl::EnableVertexAttribArray(0);
            gl::VertexAttribPointer(
                1,
                2,
                gl::FLOAT,
                gl::FALSE,
                stride,
                (3 * mem::size_of::<f32>()) as *const GLvoid,
            );
            gl::EnableVertexAttribArray(1);
            ck();

            gl::UseProgram(program.object);
            let video_uniform =
                gl::GetUniformLocation(program.object, b"uVideo\0".as_ptr() as *const GLchar);
            gl::Uniform1i(video_uniform, 0);
            let transform_uniform =
                gl::GetUniformLocation(program.object, b"uTransform\0".as_ptr() as *const GLchar);
            ck();

            gl::Enable(gl::DEPTH_TEST);
            ck();

            self.gl_state = Some(CubeGl {
                program,
                vertex_array,
                vertex_buffer,
                index_buffer,
                texture,
                transform_uniform,
            });
        }
    }

    fn render(&mut self, pixels: &[u8], output_size: Size2D<u32>) {
        self.pitch += PITCH_PER_FRAME;
        self.yaw += YAW_PER_FRAME;

        let aspect = output_size.width.max(1) as f32 / output_size.height.max(1) as f32;
        let transform = Transform3D::rotation(1.0, 0.0, 0.0, Angle::radians(self.pitch))
            .then(&Transform3D::rotation(0.0, 1.0, 0.0, Angle::radians(self.yaw)))
            .then(&Transform3D::translation(0.0, 0.0, -5.0))
            .then(&perspective(aspect));
        let matrix = transform.to_array();

        let gl_state = self.gl_state.as_ref().unwrap();
        gl_state.texture.upload(pixels);
        unsafe {
            gl::Viewport(0, 0, output_size.width as i32, output_size.height as i32);
            gl::Clear(gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT);

            gl::UseProgram(gl_state.program.object);
            gl::BindVertexArray(gl_state.vertex_array);
            gl::ActiveTexture(gl::TEXTURE0);
            gl::BindTexture(gl::TEXTURE_2D, gl_state.texture.object);
            gl::UniformMatrix4fv(gl_state.transform_uniform, 1, gl::FALSE, matrix.as_ptr());
            gl::DrawElements(
                gl::TRIANGLES,
                CUBE_INDICES.len() as GLint,
                gl::UNSIGNED_SHORT,
                std::ptr::null(),
            );
            ck();
        }
    }
}

/// Right-handed perspective projection, written for euclid's row-vector
/// convention so the array uploads to GL untransposed.
fn perspective(aspect: f32) -> Transform3D<f32> {
    let focal = 1.0 / (FIELD_OF_VIEW * 0.5).tan();
    let depth = NEAR_PLANE - FAR_PLANE;
    Transform3D::new(
        focal / aspect, 0.0, 0.0, 0.0,
        0.0, focal, 0.0, 0.0,
        0.0, 0.0, (FAR_PLANE + NEAR_PLANE) / depth, -1.0,
        0.0, 0.0, (2.0 * FAR_PLANE * NEAR_PLANE) / depth, 0.0,
    )
}
