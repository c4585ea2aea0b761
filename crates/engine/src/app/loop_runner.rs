use std::sync::Arc;

use pixels::{Error as PixelsError, Pixels, SurfaceTexture};
use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowBuilder};

use super::entity::GameState;
use super::host::{EventQueue, Platform, QueuedFrames, SystemClock};
use super::input::{key, InputTracker, RawInputEvent};
use super::rendering::PixelBuffer;
use super::runtime::{boot, Runtime, RuntimeError};
use super::scheduler::LoopConfig;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("failed to present frame: {0}")]
    Present(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

/// Boots the runtime against a desktop window and runs until the window
/// closes or a frame fails. `setup` binds keys and registers scenes before
/// the first frame.
pub fn run_app<F>(config: LoopConfig, initial_state: GameState, setup: F) -> Result<(), AppError>
where
    F: FnOnce(&mut Runtime<PixelBuffer>) -> Result<(), RuntimeError>,
{
    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let size = window.inner_size();
    let mut pixels = build_pixels(Arc::clone(&window), size.width, size.height)
        .map_err(AppError::CreateRenderer)?;

    let frames = QueuedFrames::new();
    let events = EventQueue::new();
    let platform = Platform {
        surface: PixelBuffer::new(size.width, size.height),
        clock: Box::new(SystemClock::new()),
        frames: Box::new(frames.clone()),
        input: Box::new(events.clone()),
    };
    let mut runtime = boot(platform, &config, initial_state)?;
    setup(&mut runtime)?;
    runtime.resize(size.width, size.height);

    info!(
        width = size.width,
        height = size.height,
        timestep = ?config.timestep,
        max_steps_per_frame = config.max_steps_per_frame,
        metrics_log_interval_ms = config.metrics_log_interval.as_millis() as u64,
        "loop_config"
    );

    event_loop.set_control_flow(ControlFlow::Poll);
    runtime.start();

    let mut failure: Option<AppError> = None;
    let mut cursor = (0.0f32, 0.0f32);

    event_loop
        .run(|event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => {
                    info!(reason = "window_close", "shutdown_requested");
                    window_target.exit();
                }
                WindowEvent::Resized(new_size) => {
                    if new_size.width == 0 || new_size.height == 0 {
                        return;
                    }
                    match build_pixels(Arc::clone(&window), new_size.width, new_size.height) {
                        Ok(rebuilt) => pixels = rebuilt,
                        Err(error) => {
                            warn!(error = %error, "renderer_resize_failed");
                            failure = Some(AppError::CreateRenderer(error));
                            window_target.exit();
                            return;
                        }
                    }
                    runtime
                        .surface_mut()
                        .resize(new_size.width, new_size.height);
                    runtime.resize(new_size.width, new_size.height);
                }
                WindowEvent::CursorMoved { position, .. } => {
                    cursor = (position.x as f32, position.y as f32);
                    events.push(RawInputEvent::PointerMove {
                        x: cursor.0,
                        y: cursor.1,
                    });
                }
                WindowEvent::MouseInput { state, button, .. } => {
                    if let Some(button) = pointer_button(button) {
                        let (x, y) = cursor;
                        events.push(match state {
                            ElementState::Pressed => RawInputEvent::PointerDown { button, x, y },
                            ElementState::Released => RawInputEvent::PointerUp { button, x, y },
                        });
                    }
                }
                WindowEvent::MouseWheel { delta, .. } => {
                    let delta = wheel_delta(delta);
                    if delta != 0.0 {
                        events.push(RawInputEvent::Wheel { delta });
                    }
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if escape_requests_exit(
                        &config,
                        runtime.input(),
                        event.state,
                        event.physical_key,
                    ) {
                        info!(reason = "escape_key", "shutdown_requested");
                        window_target.exit();
                        return;
                    }
                    let PhysicalKey::Code(code) = event.physical_key else {
                        return;
                    };
                    if let Some(code) = dom_key_code(code) {
                        events.push(match event.state {
                            ElementState::Pressed => RawInputEvent::KeyDown { code },
                            ElementState::Released => RawInputEvent::KeyUp { code },
                        });
                    }
                }
                WindowEvent::RedrawRequested => {
                    let Some(request) = frames.take_pending() else {
                        return;
                    };
                    if let Err(error) = runtime.frame(request) {
                        warn!(error = %error, "frame_failed");
                        failure = Some(error.into());
                        window_target.exit();
                        return;
                    }
                    if !runtime.surface().copy_into(pixels.frame_mut()) {
                        // The window was resized after the frame was drawn.
                        return;
                    }
                    if let Err(error) = pixels.render() {
                        warn!(error = %error, "renderer_draw_failed");
                        failure = Some(AppError::Present(error));
                        window_target.exit();
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                window.request_redraw();
            }
            Event::LoopExiting => {
                runtime.stop();
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)?;

    match failure {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn build_pixels(
    window: Arc<Window>,
    width: u32,
    height: u32,
) -> Result<Pixels<'static>, PixelsError> {
    let surface = SurfaceTexture::new(width, height, window);
    Pixels::new(width, height, surface)
}

/// Escape closes the window unless the game bound it to an action.
fn escape_requests_exit(
    config: &LoopConfig,
    input: &InputTracker,
    state: ElementState,
    physical_key: PhysicalKey,
) -> bool {
    config.exit_on_escape
        && state == ElementState::Pressed
        && physical_key == PhysicalKey::Code(KeyCode::Escape)
        && input.binding(key::ESC).is_none()
}

fn pointer_button(button: MouseButton) -> Option<u8> {
    match button {
        MouseButton::Left => Some(0),
        MouseButton::Middle => Some(1),
        MouseButton::Right => Some(2),
        _ => None,
    }
}

/// Positive means scrolling up, matching the browser's `wheelDelta`.
fn wheel_delta(delta: MouseScrollDelta) -> f32 {
    match delta {
        MouseScrollDelta::LineDelta(_, y) => y,
        MouseScrollDelta::PixelDelta(position) => position.y as f32,
    }
}

/// Maps a physical key to the DOM `keyCode` games bind against.
pub fn dom_key_code(code: KeyCode) -> Option<i32> {
    let mapped = match code {
        KeyCode::Backspace => 8,
        KeyCode::Tab => 9,
        KeyCode::Enter | KeyCode::NumpadEnter => 13,
        KeyCode::ShiftLeft | KeyCode::ShiftRight => 16,
        KeyCode::ControlLeft | KeyCode::ControlRight => 17,
        KeyCode::AltLeft | KeyCode::AltRight => 18,
        KeyCode::Escape => 27,
        KeyCode::Space => 32,
        KeyCode::ArrowLeft => 37,
        KeyCode::ArrowUp => 38,
        KeyCode::ArrowRight => 39,
        KeyCode::ArrowDown => 40,
        KeyCode::Digit0 => 48,
        KeyCode::Digit1 => 49,
        KeyCode::Digit2 => 50,
        KeyCode::Digit3 => 51,
        KeyCode::Digit4 => 52,
        KeyCode::Digit5 => 53,
        KeyCode::Digit6 => 54,
        KeyCode::Digit7 => 55,
        KeyCode::Digit8 => 56,
        KeyCode::Digit9 => 57,
        KeyCode::KeyA => 65,
        KeyCode::KeyB => 66,
        KeyCode::KeyC => 67,
        KeyCode::KeyD => 68,
        KeyCode::KeyE => 69,
        KeyCode::KeyF => 70,
        KeyCode::KeyG => 71,
        KeyCode::KeyH => 72,
        KeyCode::KeyI => 73,
        KeyCode::KeyJ => 74,
        KeyCode::KeyK => 75,
        KeyCode::KeyL => 76,
        KeyCode::KeyM => 77,
        KeyCode::KeyN => 78,
        KeyCode::KeyO => 79,
        KeyCode::KeyP => 80,
        KeyCode::KeyQ => 81,
        KeyCode::KeyR => 82,
        KeyCode::KeyS => 83,
        KeyCode::KeyT => 84,
        KeyCode::KeyU => 85,
        KeyCode::KeyV => 86,
        KeyCode::KeyW => 87,
        KeyCode::KeyX => 88,
        KeyCode::KeyY => 89,
        KeyCode::KeyZ => 90,
        KeyCode::F1 => 112,
        KeyCode::F2 => 113,
        KeyCode::F3 => 114,
        KeyCode::F4 => 115,
        KeyCode::F5 => 116,
        KeyCode::F6 => 117,
        KeyCode::F7 => 118,
        KeyCode::F8 => 119,
        KeyCode::F9 => 120,
        KeyCode::F10 => 121,
        KeyCode::F11 => 122,
        KeyCode::F12 => 123,
        _ => return None,
    };
    Some(mapped)
}
