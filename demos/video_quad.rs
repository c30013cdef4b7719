// demos/video_quad.rs
//
// Renders a synthetic video feed on a full-window quad. An "engine" thread
// stands in for a native decoder and drives rendering through the callback
// bridge: enter the render section, upload and draw the frame, present,
// leave. The application thread owns the window and the event loop, and
// takes the bounded-acquire path when the window is resized.
//
// ESC quits, SPACE pauses the feed.

use crate::common::{
    ck, Buffer, EngineControls, FrameRenderer, Program, Shader, ShaderKind, TestPattern,
    VideoTexture,
};

use baton::{BindableContext, ContextHandoff, EngineBridge};
use clap::{App, Arg};
use euclid::default::Size2D;
use gl::types::{GLchar, GLint, GLuint};
use std::ffi::CString;
use std::ptr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};

use glutin::display::GlDisplay;

mod common;

const WINDOW_WIDTH: u32 = 800;
const WINDOW_HEIGHT: u32 = 450;

// Corner positions in {0, 1}; the vertex shader expands them to clip space
// and texture coordinates.
static QUAD_VERTEX_POSITIONS: [u8; 8] = [0, 0, 1, 0, 0, 1, 1, 1];

static QUAD_VERTEX_SHADER: &str = "
#version 330
layout(location = 0) in vec2 aPosition;
out vec2 vTexCoord;
void main() {
    vTexCoord = vec2(aPosition.x, 1.0 - aPosition.y);
    gl_Position = vec4(aPosition * 2.0 - 1.0, 0.0, 1.0);
}
";

static QUAD_FRAGMENT_SHADER: &str = "
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

    let matches = App::new("video_quad")
        .about("Renders a synthetic video feed on a full-window quad")
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
        .arg(
            Arg::with_name("stretch")
                .long("stretch")
                .help("Stretch the video to the window instead of letterboxing"),
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
    let stretch = matches.is_present("stretch");

    let event_loop = EventLoop::new();
    let (window, gl_display, mut context) = common::create_window_context(
        &event_loop,
        "baton OpenGL video rendering",
        PhysicalSize::new(WINDOW_WIDTH, WINDOW_HEIGHT),
    );

    // One-time GL setup happens on this thread; afterwards the context is
    // detached and deposited, and this thread only ever takes the bounded
    // resize path.
    context
        .make_current()
        .expect("failed to make the new context current");
    gl::load_with(|name| {
        let name = CString::new(name).unwrap();
        gl_display.get_proc_address(&name)
    });
    context.enable_vsync();
    unsafe {
        gl::ClearColor(0.0, 0.0, 0.0, 1.0);
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
                QuadRenderer::new(stretch),
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
                // Stop the callbacks before the window goes away.
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

struct QuadRenderer {
    stretch: bool,
    gl_state: Option<QuadGl>,
}

struct QuadGl {
    program: Program,
    vertex_array: GLuint,
    #[allow(dead_code)]
    vertex_buffer: Buffer,
    texture: VideoTexture,
}

impl QuadRenderer {
    fn new(stretch: bool) -> QuadRenderer {
        QuadRenderer {
            stretch,
            gl_state: None,
        }
    }
}

impl FrameRenderer for QuadRenderer {
    fn setup(&mut self, pattern_size: Size2D<u32>) {
        let program = Program::new(
            Shader::new(ShaderKind::Vertex, QUAD_VERTEX_SHADER),
            Shader::new(ShaderKind::Fragment, QUAD_FRAGMENT_SHADER),
        );
        let vertex_buffer = Buffer::from_data(gl::ARRAY_BUFFER, &QUAD_VERTEX_POSITIONS);
        let texture = VideoTexture::new(pattern_size);
        unsafe {
            let mut vertex_array = 0;
            gl::GenVertexArrays(1, &mut vertex_array);
            ck();
            gl::BindVertexArray(vertex_array);
            gl::BindBuffer(gl::ARRAY_BUFFER, vertex_buffer.object);
            gl::VertexAttribPointer(0, 2, gl::UNSIGNED_BYTE, gl::FALSE, 0, ptr::null());
            gl::EnableVertexAttribArray(0);
            ck();

            gl::UseProgram(program.object);
            let video_uniform =
                gl::GetUniformLocation(program.object, b"uVideo\0".as_ptr() as *const GLchar);
            gl::Uniform1i(video_uniform, 0);
            ck();

            self.gl_state = Some(QuadGl {
                program,
                vertex_array,
                vertex_buffer,
                texture,
            });
        }
    }

    fn render(&mut self, pixels: &[u8], output_size: Size2D<u32>) {
        let gl_state = self.gl_state.as_ref().unwrap();
        gl_state.texture.upload(pixels);
        unsafe {
            gl::Viewport(0, 0, output_size.width as i32, output_size.height as i32);
            gl::Clear(gl::COLOR_BUFFER_BIT);

            if !self.stretch {
                let (x, y, width, height) = letterbox(output_size, gl_state.texture.size);
                gl::Viewport(x, y, width, height);
            }
            gl::UseProgram(gl_state.program.object);
            gl::BindVertexArray(gl_state.vertex_array);
            gl::ActiveTexture(gl::TEXTURE0);
            gl::BindTexture(gl::TEXTURE_2D, gl_state.texture.object);
            gl::DrawArrays(gl::TRIANGLE_STRIP, 0, 4);
            ck();
        }
    }
}

/// Largest viewport with the video's aspect ratio that fits the output.
fn letterbox(output: Size2D<u32>, video: Size2D<u32>) -> (GLint, GLint, GLint, GLint) {
    let (output_width, output_height) = (output.width as f32, output.height as f32);
    let (video_width, video_height) = (video.width as f32, video.height as f32);
    let scale = (output_width / video_width).min(output_height / video_height);
    let width = video_width * scale;
    let height = video_height * scale;
    (
        ((output_width - width) * 0.5) as GLint,
        ((output_height - height) * 0.5) as GLint,
        width as GLint,
        height as GLint,
    )
}
