use std::time::Instant;

use chip8::prelude::*;
use log::info;
use winit::{
    event::{Event as EV, WindowEvent as WE},
    event_loop::EventLoopBuilder,
    platform::run_return::EventLoopExtRunReturn,
};

use crate::{
    actions::*, error::AppError, render::Render, window::WindowContext, EventLoop, InputMap,
};

/// Chip8 Application
pub struct Chip8App {
    window: WindowContext,
    render: Render,
    vm: Chip8Vm,
    input_map: InputMap,
    /// Start of the previous frame, used to measure the time step.
    last_frame: Instant,
    /// Whether the buzzer is currently sounding.
    buzzer: bool,
}

impl Chip8App {
    pub fn new(
        event_loop: &EventLoop,
        input_map: InputMap,
        conf: Chip8Conf,
    ) -> Result<Self, AppError> {
        let window = WindowContext::new(event_loop, "chip8")?;

        // Create renderer
        let render = Render::new(window.gl.clone())?;
        log::info!("Created OpenGL renderer:\n{}", render.opengl_info());

        Ok(Self {
            window,
            render,
            vm: Chip8Vm::new(conf),
            input_map,
            last_frame: Instant::now(),
            buzzer: false,
        })
    }

    pub fn create_event_loop() -> EventLoop {
        EventLoopBuilder::new().build()
    }

    /// Load ROM file into VM
    pub fn load_rom(&mut self, filepath: &str) -> Result<(), AppError> {
        info!("load rom: {filepath}");

        let buf = std::fs::read(filepath)?;
        self.vm.load_bytecode(&buf)?;

        Ok(())
    }

    /// Advance the VM by the time elapsed since the previous frame.
    fn update(&mut self) -> Result<(), AppError> {
        // Merge input stream into VM
        for event in self.input_map.drain_events() {
            if let Some(keycode) = event.kind.as_chip8() {
                self.vm.set_key(keycode, event.is_pressed());
            }
        }

        if let Ok(s) = self.vm.dump_keys() {
            if !s.is_empty() {
                log::trace!("{s}");
            }
        }

        let now = Instant::now();
        let delta = now.duration_since(self.last_frame);
        self.last_frame = now;

        let report = self.vm.run_frame(delta)?;

        if self.buzzer != self.vm.sound_active() {
            self.buzzer = self.vm.sound_active();
            log::debug!("buzzer {}", if self.buzzer { "on" } else { "off" });
        }

        if report.redraw {
            self.window.request_redraw();
        }

        Ok(())
    }

    fn draw(&mut self) -> Result<(), AppError> {
        self.window.make_context_current()?;
        self.render
            .clear_window(29.0 / 255.0, 33.0 / 255.0, 40.0 / 255.0, 1.0);
        self.render
            .draw_display(self.vm.display_buffer(), self.window.inner_size());
        self.window.swap_buffers()?;
        Ok(())
    }
}

/// Event Loop.
impl Chip8App {
    pub fn run(&mut self, event_loop: &mut EventLoop) -> Result<(), AppError> {
        let main_window_id = self.window.window_id();
        let mut result = Ok(());

        // Time spent starting up doesn't count towards the first frame.
        self.last_frame = Instant::now();

        event_loop.run_return(|event, _, control_flow| {
            control_flow.set_poll();

            match event {
                EV::MainEventsCleared => {
                    // Frame Update

                    // Checked first so a program waiting on a key can always be quit.
                    if self.input_map.is_action_pressed(EXIT) {
                        log::info!("Exit");
                        control_flow.set_exit();
                        return;
                    }

                    if let Err(err) = self.update() {
                        if let Ok(dump) = self.vm.dump_registers() {
                            log::error!("\n{dump}");
                        }
                        result = Err(err);
                        control_flow.set_exit();
                    }
                }
                EV::RedrawRequested(window_id) if window_id == main_window_id => {
                    // Redraw the application.
                    if let Err(err) = self.draw() {
                        result = Err(err);
                        control_flow.set_exit();
                    }
                }
                EV::WindowEvent { window_id, event } if window_id == main_window_id => {
                    match event {
                        WE::Resized(size) => {
                            // Some platforms like EGL require resizing GL surface to update the size.
                            self.window.resize_surface(size);
                            self.window.request_redraw();
                        }
                        WE::KeyboardInput { input, .. } => {
                            if let Some(virtual_keycode) = input.virtual_keycode {
                                self.input_map.push_key(virtual_keycode, input.state);
                            }
                        }
                        WE::Focused(false) => {
                            // Key release events are lost while unfocused.
                            self.input_map.clear_state();
                            self.vm.clear_keys();
                        }
                        WE::CloseRequested => {
                            control_flow.set_exit();
                        }
                        _ => { /* blank */ }
                    }
                }
                _ => { /* blank */ }
            }
        });

        result
    }
}
