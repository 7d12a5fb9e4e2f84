// ============================================================================
// CRATE CONFIGURATION & IMPORTS
// ============================================================================

// External crate imports
use bon::Builder;
use log::debug;
use pixels::{Pixels, SurfaceTexture};
use thiserror::Error;

// Standard library imports
use std::f64::consts::{FRAC_PI_2, TAU};
use std::time::{Duration, Instant};

// Window management imports
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

// ============================================================================
// COLOR CONFIGURATION
// ============================================================================

/// Color representation for gauge elements
#[derive(Debug, Clone, Copy)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn as_tuple(self) -> (u8, u8, u8) {
        (self.r, self.g, self.b)
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors produced by the curve-building core.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GaugeError {
    /// A spline segment connects two neighboring samples, so a dataset of
    /// fewer than two samples has no curve at all.
    #[error("cannot plot a curve from {count} samples (need at least 2)")]
    InsufficientSamples { count: usize },
}

// ============================================================================
// PUBLIC API - MAIN INTERFACE
// ============================================================================

/// Main gauge struct - the primary public interface
#[derive(Debug, Clone)]
pub struct Gauge {
    config: GaugeConfig,
    state: GaugeState,
}

#[derive(Debug, Clone, Builder)]
pub struct GaugeConfig {
    #[builder(default = "Gauge".to_string())]
    pub title: String,

    // Window configuration
    #[builder(default = 640)]
    pub window_width: usize,
    #[builder(default = 480)]
    pub window_height: usize,
    #[builder(default = 60.0)]
    pub max_framerate: f64,

    // Circle geometry
    #[builder(default = 100.0)]
    pub base_radius: f64,
    #[builder(default = 40.0)]
    pub spectrum_width: f64,
    #[builder(default = 10.0)]
    pub handle_radius: f64,

    // Dataset
    #[builder(default = 60)]
    pub sample_count: u32,
    #[builder(default = 0.45)]
    pub initial_value: f64,

    // Curve shape. The tension and the wrap threshold are empirically
    // tuned; both stay configurable rather than hard-coded.
    #[builder(default = 1.0)]
    pub tension: f64,
    #[builder(default = 0.9)]
    pub wrap_threshold: f64,
    #[builder(default = 16)]
    pub curve_steps: usize,

    // Intro animation timing (milliseconds)
    #[builder(default = 2000)]
    pub intro_delay_ms: u64,
    #[builder(default = 16)]
    pub tick_interval_ms: u64,
    #[builder(default = 0.02)]
    pub tick_increment: f64,

    // Colors
    #[builder(default = Color::new(0xff, 0xff, 0xff))]
    pub background_color: Color,
    #[builder(default = Color::new(0xad, 0xd8, 0xe6))]
    pub spectrum_color: Color,
    #[builder(default = Color::new(0x00, 0x00, 0x00))]
    pub plot_stroke_color: Color,
    #[builder(default = Color::new(0x00, 0x00, 0x00))]
    pub plot_fill_color: Color,
    #[builder(default = 0.3)]
    pub plot_fill_alpha: f64,
    #[builder(default = Color::new(0x00, 0x00, 0x00))]
    pub circle_color: Color,
    #[builder(default = Color::new(0x80, 0x00, 0x80))]
    pub value_arc_color: Color,
    #[builder(default = Color::new(0xff, 0x00, 0x00))]
    pub handle_color: Color,

    // Stroke widths
    #[builder(default = 1.0)]
    pub plot_stroke_width: f32,
    #[builder(default = 2.0)]
    pub circle_width: f32,
    #[builder(default = 10.0)]
    pub value_arc_width: f32,
}

#[derive(Debug, Clone)]
struct GaugeState {
    curve: Option<PlottedCurve>,
    value: f64,
}

impl Gauge {
    pub fn new(config: GaugeConfig) -> Self {
        let state = GaugeState {
            curve: None,
            value: config.initial_value.clamp(0.0, 1.0),
        };

        Self { config, state }
    }

    /// Plot a fresh dataset. A failed build leaves the gauge without a
    /// curve; it never keeps a stale or partial one.
    pub fn set_samples(&mut self, samples: &[f64]) -> Result<(), GaugeError> {
        self.state.curve = None;
        self.state.curve = Some(PlottedCurve::build(samples, self.config.tension)?);
        Ok(())
    }

    pub fn set_value(&mut self, value: f64) {
        self.state.value = value.clamp(0.0, 1.0);
    }

    pub fn value(&self) -> f64 {
        self.state.value
    }

    pub fn curve(&self) -> Option<&PlottedCurve> {
        self.state.curve.as_ref()
    }

    /// Open the gauge window and run until it is closed. Generates a random
    /// dataset first if none was supplied via [`Gauge::set_samples`].
    pub fn show(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.state.curve.is_none() {
            let samples = generate_samples(self.config.sample_count);
            self.state.curve = Some(PlottedCurve::build(&samples, self.config.tension)?);
        }

        self.run_window()
    }

    fn run_window(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let config = self.config.clone();
        let curve = self.state.curve.clone();
        let state = &mut self.state;

        let logical_width: usize = config.window_width;
        let logical_height: usize = config.window_height;

        let event_loop = EventLoop::new()?;
        let window = WindowBuilder::new()
            .with_title(&config.title)
            .with_inner_size(LogicalSize::new(
                logical_width as f64,
                logical_height as f64,
            ))
            .build(&event_loop)?;

        let window = std::sync::Arc::new(window);

        let window_clone = window.clone();
        let size = window.inner_size();
        let mut fb_width = size.width as usize;
        let mut fb_height = size.height as usize;
        let surface_texture = SurfaceTexture::new(size.width, size.height, &window);
        let mut pixels = Pixels::new(size.width, size.height, surface_texture)?;

        let mut geometry = Geometry::new(fb_width, fb_height, &config);
        let mut input = ControlInput::new(state.value, config.wrap_threshold);
        let mut animator = Animator::new(
            Duration::from_millis(config.intro_delay_ms),
            Duration::from_millis(config.tick_interval_ms),
            config.tick_increment,
        );

        let target_fps = config.max_framerate;
        let frame_duration = Duration::from_secs_f64(1.0 / target_fps);
        let mut last_frame = Instant::now();
        let mut last_tick = Instant::now();
        let mut pointer = (0.0f64, 0.0f64);
        let mut dirty = true;

        event_loop.run(move |event, window_target| {
            window_target.set_control_flow(ControlFlow::Poll);
            match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => {
                        window_target.exit();
                    }
                    WindowEvent::Resized(new_size) => {
                        fb_width = new_size.width as usize;
                        fb_height = new_size.height as usize;
                        let _ = pixels.resize_buffer(new_size.width, new_size.height);
                        let _ = pixels.resize_surface(new_size.width, new_size.height);
                        geometry = Geometry::new(fb_width, fb_height, &config);
                        dirty = true;
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        pointer = (position.x, position.y);
                        if input.drag(pointer, &geometry) {
                            state.value = input.value();
                            dirty = true;
                        }
                    }
                    WindowEvent::MouseInput {
                        state: element_state,
                        button: MouseButton::Left,
                        ..
                    } => match element_state {
                        ElementState::Pressed => {
                            input.press(pointer, &geometry);
                        }
                        ElementState::Released => {
                            input.release();
                        }
                    },
                    WindowEvent::CursorLeft { .. } => {
                        input.release();
                    }
                    WindowEvent::RedrawRequested => {
                        let frame = pixels.frame_mut();
                        let mut canvas = Canvas::new(frame, fb_width, fb_height);
                        render_gauge(
                            &mut canvas,
                            curve.as_ref(),
                            input.value(),
                            animator.progress(),
                            &geometry,
                            &config,
                        );
                        let _ = pixels.render();
                    }
                    _ => {}
                },
                Event::AboutToWait => {
                    let now = Instant::now();
                    if animator.tick(now - last_tick) {
                        dirty = true;
                    }
                    last_tick = now;
                    if dirty && last_frame.elapsed() >= frame_duration {
                        dirty = false;
                        window_clone.request_redraw();
                        last_frame = now;
                    }
                }
                _ => {}
            }
        })?;

        Ok(())
    }
}

// ============================================================================
// SAMPLE SOURCE
// ============================================================================

/// Draw `count` independent uniform values in `[0, 1)`.
pub fn generate_samples(count: u32) -> Vec<f64> {
    use rand::Rng;

    let mut rng = rand::rng();
    (0..count).map(|_| rng.random_range(0.0..1.0)).collect()
}

// ============================================================================
// CURVE MODEL & SPLINE BUILDER
// ============================================================================

/// A point of the plot in normalized space: `progress` is the position
/// around the circle in `[0, 1]`, `amplitude` the radial displacement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub progress: f64,
    pub amplitude: f64,
}

/// One cubic Bezier span connecting two neighboring samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BezierSegment {
    pub start: CurvePoint,
    pub cp1: CurvePoint,
    pub cp2: CurvePoint,
    pub end: CurvePoint,
}

/// A closed piecewise-cubic curve through every sample. The path is closed
/// by a straight segment back to `start` at render time rather than by a
/// true periodic spline.
#[derive(Debug, Clone, PartialEq)]
pub struct PlottedCurve {
    pub start: CurvePoint,
    pub segments: Vec<BezierSegment>,
}

impl PlottedCurve {
    /// Build the curve through `samples` with a uniform Catmull-Rom tangent
    /// rule. Neighbors are clamped (not wrapped) at both ends of the
    /// sequence, which flattens the tangents there; the renderer relies on
    /// that exact shape.
    pub fn build(samples: &[f64], tension: f64) -> Result<Self, GaugeError> {
        if samples.len() < 2 {
            return Err(GaugeError::InsufficientSamples {
                count: samples.len(),
            });
        }

        let n = samples.len();
        let last = n - 2;
        let points: Vec<CurvePoint> = samples
            .iter()
            .enumerate()
            .map(|(i, &amplitude)| CurvePoint {
                progress: i as f64 / (n - 1) as f64,
                amplitude,
            })
            .collect();

        let mut segments = Vec::with_capacity(n - 1);
        for i in 0..n - 1 {
            let p0 = if i > 0 { points[i - 1] } else { points[i] };
            let p1 = points[i];
            let p2 = points[i + 1];
            let p3 = if i != last { points[i + 2] } else { points[i + 1] };

            let cp1 = CurvePoint {
                progress: p1.progress + tension * (p2.progress - p0.progress) / 6.0,
                amplitude: p1.amplitude + tension * (p2.amplitude - p0.amplitude) / 6.0,
            };
            let cp2 = CurvePoint {
                progress: p2.progress - tension * (p3.progress - p1.progress) / 6.0,
                amplitude: p2.amplitude - tension * (p3.amplitude - p1.amplitude) / 6.0,
            };

            segments.push(BezierSegment {
                start: p1,
                cp1,
                cp2,
                end: p2,
            });
        }

        debug!("plotted {} segments from {} samples", segments.len(), n);
        Ok(Self {
            start: points[0],
            segments,
        })
    }
}

// ============================================================================
// GEOMETRY & POLAR MAPPING
// ============================================================================

/// Render-space geometry of the gauge. Recomputed from the framebuffer size
/// whenever the window is resized; the radii come from the config.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub cx: f64,
    pub cy: f64,
    pub base_radius: f64,
    pub spectrum_width: f64,
    pub handle_radius: f64,
}

impl Geometry {
    pub fn new(width: usize, height: usize, config: &GaugeConfig) -> Self {
        Self {
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
            base_radius: config.base_radius,
            spectrum_width: config.spectrum_width,
            handle_radius: config.handle_radius,
        }
    }

    /// Angle of a normalized progress value: 0 maps to the top of the
    /// circle, increasing clockwise.
    fn angle_of(progress: f64) -> f64 {
        -FRAC_PI_2 + TAU * progress
    }

    /// Map a normalized curve point into render space. `animation` scales
    /// the amplitude-driven excursion from the base circle, so at 0 the
    /// whole plot collapses onto the circle and at 1 it reaches full
    /// amplitude.
    pub fn to_render(&self, point: CurvePoint, animation: f64) -> (f64, f64) {
        let angle = Self::angle_of(point.progress);
        let radius = self.base_radius + self.spectrum_width * point.amplitude * animation;
        (
            self.cx + radius * angle.cos(),
            self.cy + radius * angle.sin(),
        )
    }

    /// Render position of the drag handle for a control value.
    pub fn handle_position(&self, value: f64) -> (f64, f64) {
        let angle = Self::angle_of(value);
        (
            self.cx + self.base_radius * angle.cos(),
            self.cy + self.base_radius * angle.sin(),
        )
    }

    /// Hit-test a pointer against the handle at `value`. The comparison is
    /// strictly less-than: a pointer exactly on the rim does not qualify.
    pub fn is_on_handle(&self, pointer: (f64, f64), value: f64) -> bool {
        let (hx, hy) = self.handle_position(value);
        let dx = pointer.0 - hx;
        let dy = pointer.1 - hy;
        (dx * dx + dy * dy).sqrt() < self.handle_radius
    }
}

// ============================================================================
// ANGULAR INPUT MODEL
// ============================================================================

/// Drag-handle input state machine: idle until a press lands on the handle,
/// dragging until the next release or cursor-leave. The control value only
/// changes while dragging.
#[derive(Debug, Clone)]
pub struct ControlInput {
    value: f64,
    dragging: bool,
    wrap_threshold: f64,
}

impl ControlInput {
    pub fn new(initial: f64, wrap_threshold: f64) -> Self {
        Self {
            value: initial.clamp(0.0, 1.0),
            dragging: false,
            wrap_threshold,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Press transition. Starts a drag only when the pointer is on the
    /// handle; pressing anywhere else leaves the model idle.
    pub fn press(&mut self, pointer: (f64, f64), geometry: &Geometry) -> bool {
        if !self.dragging && geometry.is_on_handle(pointer, self.value) {
            self.dragging = true;
            debug!("drag started at value {:.3}", self.value);
        }
        self.dragging
    }

    /// Pointer-move transition. Returns true when the control value changed,
    /// i.e. only during an active drag.
    pub fn drag(&mut self, pointer: (f64, f64), geometry: &Geometry) -> bool {
        if !self.dragging {
            return false;
        }
        let candidate = pointer_value(pointer, (geometry.cx, geometry.cy));
        self.value = snap_across_seam(candidate, self.value, self.wrap_threshold);
        true
    }

    /// Release or cursor-leave transition.
    pub fn release(&mut self) {
        if self.dragging {
            self.dragging = false;
            debug!("drag released at value {:.3}", self.value);
        }
    }
}

/// Convert a pointer position into a control value in `[0, 1)`: the raw
/// atan2 angle rotated so that 0 sits at the top of the circle.
fn pointer_value(pointer: (f64, f64), center: (f64, f64)) -> f64 {
    let raw = (pointer.1 - center.1).atan2(pointer.0 - center.0);
    let mut rotated = raw + FRAC_PI_2;
    if rotated < 0.0 {
        rotated += TAU;
    }
    rotated / TAU
}

/// Wrap-around snapping at the 0/1 seam. A jump of `threshold` or more in
/// one frame is read as the pointer crossing the seam and pins the value to
/// the nearer end. Known limitation: an intended single-frame jump of that
/// size is indistinguishable from a wrap and gets pinned too.
fn snap_across_seam(candidate: f64, previous: f64, threshold: f64) -> f64 {
    if candidate - previous >= threshold {
        0.0
    } else if previous - candidate >= threshold {
        1.0
    } else {
        candidate
    }
}

// ============================================================================
// EASING ANIMATOR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnimatorPhase {
    NotStarted,
    Running,
    Completed,
}

/// Fixed-step intro animation driver. Sits idle for `delay`, then advances
/// the counter by `increment` every `interval` and eases it into the
/// progress value read by the renderer. Runs once; there is no restart.
#[derive(Debug, Clone)]
pub struct Animator {
    phase: AnimatorPhase,
    delay: Duration,
    interval: Duration,
    increment: f64,
    pending: Duration,
    counter: f64,
    progress: f64,
}

impl Animator {
    pub fn new(delay: Duration, interval: Duration, increment: f64) -> Self {
        debug_assert!(increment > 0.0);
        debug_assert!(interval > Duration::ZERO);
        Self {
            phase: AnimatorPhase::NotStarted,
            delay,
            interval,
            increment,
            pending: Duration::ZERO,
            counter: 0.0,
            progress: 0.0,
        }
    }

    /// Current animation progress in `[0, 1]`. Monotonically non-decreasing,
    /// pinned to exactly 1 once the run completes.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn is_complete(&self) -> bool {
        self.phase == AnimatorPhase::Completed
    }

    /// Feed elapsed wall-clock time. Consumes whole tick intervals and
    /// returns true when the progress changed, so the caller knows a redraw
    /// is due; the completing step is the final one.
    pub fn tick(&mut self, elapsed: Duration) -> bool {
        if self.phase == AnimatorPhase::Completed {
            return false;
        }
        self.pending += elapsed;

        if self.phase == AnimatorPhase::NotStarted {
            if self.pending < self.delay {
                return false;
            }
            self.pending -= self.delay;
            self.phase = AnimatorPhase::Running;
        }

        let mut advanced = false;
        while self.phase == AnimatorPhase::Running && self.pending >= self.interval {
            self.pending -= self.interval;
            self.counter += self.increment;
            if self.counter >= 1.0 {
                self.progress = 1.0;
                self.phase = AnimatorPhase::Completed;
                debug!("intro animation complete");
            } else {
                self.progress = ease_in_out(self.counter);
            }
            advanced = true;
        }
        advanced
    }
}

/// Cubic ease-in/ease-out. Both branches meet at `t = 0.5`.
pub fn ease_in_out(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        (t - 1.0) * (2.0 * t - 2.0) * (2.0 * t - 2.0) + 1.0
    }
}

// ============================================================================
// RETAINED MODE ABSTRACTIONS
// ============================================================================

#[derive(Clone, Debug)]
enum DrawCommand {
    Clear((u8, u8, u8)),
    Disc {
        cx: f64,
        cy: f64,
        radius: f64,
        color: (u8, u8, u8),
    },
    Ring {
        cx: f64,
        cy: f64,
        radius: f64,
        width: f32,
        start_angle: f64,
        arc_span: f64,
        color: (u8, u8, u8),
    },
    ClosedPath {
        points: Vec<(f64, f64)>,
        stroke_width: f32,
        stroke: (u8, u8, u8),
        fill: (u8, u8, u8),
        fill_alpha: f32,
    },
}

struct Scene {
    commands: Vec<DrawCommand>,
}

impl Scene {
    fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    fn add_command(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    fn render(&self, canvas: &mut Canvas) {
        for command in &self.commands {
            match command {
                DrawCommand::Clear(color) => {
                    canvas.clear(*color);
                }
                DrawCommand::Disc {
                    cx,
                    cy,
                    radius,
                    color,
                } => {
                    draw_disc(canvas, *cx, *cy, *radius, *color);
                }
                DrawCommand::Ring {
                    cx,
                    cy,
                    radius,
                    width,
                    start_angle,
                    arc_span,
                    color,
                } => {
                    draw_ring(
                        canvas,
                        *cx,
                        *cy,
                        *radius,
                        *width,
                        *start_angle,
                        *arc_span,
                        *color,
                    );
                }
                DrawCommand::ClosedPath {
                    points,
                    stroke_width,
                    stroke,
                    fill,
                    fill_alpha,
                } => {
                    // Stroke first, then the translucent wash over the
                    // outline, matching the plot's paint order.
                    for i in 0..points.len() {
                        let (x0, y0) = points[i];
                        let (x1, y1) = points[(i + 1) % points.len()];
                        draw_thick_line_aa(
                            canvas.frame,
                            canvas.width,
                            x0.round() as i32,
                            y0.round() as i32,
                            x1.round() as i32,
                            y1.round() as i32,
                            *stroke_width,
                            stroke.0,
                            stroke.1,
                            stroke.2,
                        );
                    }
                    fill_polygon(canvas, points, *fill, *fill_alpha);
                }
            }
        }
    }
}

// ============================================================================
// CORE RENDER TYPES
// ============================================================================

struct Canvas<'a> {
    frame: &'a mut [u8],
    width: usize,
    height: usize,
}

impl<'a> Canvas<'a> {
    fn new(frame: &'a mut [u8], width: usize, height: usize) -> Self {
        Self {
            frame,
            width,
            height,
        }
    }

    fn clear(&mut self, color: (u8, u8, u8)) {
        for chunk in self.frame.chunks_exact_mut(4) {
            chunk.copy_from_slice(&[color.0, color.1, color.2, 0xff]);
        }
    }
}

// ============================================================================
// RENDERING
// ============================================================================

fn render_gauge(
    canvas: &mut Canvas,
    curve: Option<&PlottedCurve>,
    value: f64,
    animation: f64,
    geometry: &Geometry,
    config: &GaugeConfig,
) {
    let mut scene = Scene::new();
    scene.add_command(DrawCommand::Clear(config.background_color.as_tuple()));

    // Spectrum background disc
    scene.add_command(DrawCommand::Disc {
        cx: geometry.cx,
        cy: geometry.cy,
        radius: geometry.base_radius + geometry.spectrum_width,
        color: config.spectrum_color.as_tuple(),
    });

    // Animated plot
    if let Some(curve) = curve {
        let points = flatten_curve(curve, geometry, animation, config.curve_steps);
        scene.add_command(DrawCommand::ClosedPath {
            points,
            stroke_width: config.plot_stroke_width,
            stroke: config.plot_stroke_color.as_tuple(),
            fill: config.plot_fill_color.as_tuple(),
            fill_alpha: config.plot_fill_alpha as f32,
        });
    }

    // Base circle
    scene.add_command(DrawCommand::Ring {
        cx: geometry.cx,
        cy: geometry.cy,
        radius: geometry.base_radius,
        width: config.circle_width,
        start_angle: -FRAC_PI_2,
        arc_span: TAU,
        color: config.circle_color.as_tuple(),
    });

    // Value arc from the top of the circle to the handle
    scene.add_command(DrawCommand::Ring {
        cx: geometry.cx,
        cy: geometry.cy,
        radius: geometry.base_radius,
        width: config.value_arc_width,
        start_angle: -FRAC_PI_2,
        arc_span: value * TAU,
        color: config.value_arc_color.as_tuple(),
    });

    // Handle
    let (hx, hy) = geometry.handle_position(value);
    scene.add_command(DrawCommand::Disc {
        cx: hx,
        cy: hy,
        radius: geometry.handle_radius,
        color: config.handle_color.as_tuple(),
    });

    scene.render(canvas);
}

/// Map the whole curve into render space and flatten each Bezier span into
/// `steps` line segments. The control points go through the polar transform
/// individually, every frame, because `animation` varies over time while
/// the curve does not.
fn flatten_curve(
    curve: &PlottedCurve,
    geometry: &Geometry,
    animation: f64,
    steps: usize,
) -> Vec<(f64, f64)> {
    let steps = steps.max(1);
    let mut points = Vec::with_capacity(curve.segments.len() * steps + 1);
    let mut previous = geometry.to_render(curve.start, animation);
    points.push(previous);

    for segment in &curve.segments {
        let cp1 = geometry.to_render(segment.cp1, animation);
        let cp2 = geometry.to_render(segment.cp2, animation);
        let end = geometry.to_render(segment.end, animation);
        for j in 1..=steps {
            let t = j as f64 / steps as f64;
            points.push(eval_cubic(previous, cp1, cp2, end, t));
        }
        previous = end;
    }

    points
}

/// Evaluate a cubic Bezier in Bernstein form.
fn eval_cubic(
    p0: (f64, f64),
    p1: (f64, f64),
    p2: (f64, f64),
    p3: (f64, f64),
    t: f64,
) -> (f64, f64) {
    let u = 1.0 - t;
    let b0 = u * u * u;
    let b1 = 3.0 * u * u * t;
    let b2 = 3.0 * u * t * t;
    let b3 = t * t * t;
    (
        b0 * p0.0 + b1 * p1.0 + b2 * p2.0 + b3 * p3.0,
        b0 * p0.1 + b1 * p1.1 + b2 * p2.1 + b3 * p3.1,
    )
}

// ============================================================================
// DRAWING PRIMITIVES
// ============================================================================

fn set_pixel(frame: &mut [u8], width: usize, x: usize, y: usize, r: u8, g: u8, b: u8, alpha: f32) {
    if x < width && y < frame.len() / (width * 4) {
        let idx = (y * width + x) * 4;
        let src = [r as f32, g as f32, b as f32, 255.0 * alpha];
        let dst = [
            frame[idx] as f32,
            frame[idx + 1] as f32,
            frame[idx + 2] as f32,
            frame[idx + 3] as f32,
        ];
        let a = src[3] / 255.0;
        let out = [
            (src[0] * a + dst[0] * (1.0 - a)).round() as u8,
            (src[1] * a + dst[1] * (1.0 - a)).round() as u8,
            (src[2] * a + dst[2] * (1.0 - a)).round() as u8,
            0xff,
        ];
        frame[idx..idx + 4].copy_from_slice(&out);
    }
}

fn draw_thick_line_aa(
    frame: &mut [u8],
    width: usize,
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    thickness: f32,
    r: u8,
    g: u8,
    b: u8,
) {
    let min_x = x0.min(x1) - thickness.ceil() as i32 - 1;
    let max_x = x0.max(x1) + thickness.ceil() as i32 + 1;
    let min_y = y0.min(y1) - thickness.ceil() as i32 - 1;
    let max_y = y0.max(y1) + thickness.ceil() as i32 + 1;
    let dx = (x1 - x0) as f32;
    let dy = (y1 - y0) as f32;
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f32::EPSILON {
        return;
    }
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            if x < 0 || y < 0 {
                continue;
            }
            let px = x as f32 - x0 as f32;
            let py = y as f32 - y0 as f32;
            let t = ((px * dx + py * dy) / len_sq).clamp(0.0, 1.0);
            let lx = x0 as f32 + t * dx;
            let ly = y0 as f32 + t * dy;
            let dist = ((lx - x as f32).powi(2) + (ly - y as f32).powi(2)).sqrt();
            let aa = (1.0 - (dist - thickness / 2.0).clamp(0.0, 1.0)).clamp(0.0, 1.0);
            if aa > 0.01 {
                set_pixel(frame, width, x as usize, y as usize, r, g, b, aa);
            }
        }
    }
}

fn draw_disc(canvas: &mut Canvas, cx: f64, cy: f64, radius: f64, color: (u8, u8, u8)) {
    let min_x = (cx - radius - 1.0).floor() as i32;
    let max_x = (cx + radius + 1.0).ceil() as i32;
    let min_y = (cy - radius - 1.0).floor() as i32;
    let max_y = (cy + radius + 1.0).ceil() as i32;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            if x < 0 || y < 0 || x as usize >= canvas.width || y as usize >= canvas.height {
                continue;
            }
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            let dist = (dx * dx + dy * dy).sqrt();
            let aa = if dist > radius {
                1.0 - (dist - radius).min(1.0)
            } else {
                1.0
            };
            if aa > 0.0 {
                set_pixel(
                    canvas.frame,
                    canvas.width,
                    x as usize,
                    y as usize,
                    color.0,
                    color.1,
                    color.2,
                    aa as f32,
                );
            }
        }
    }
}

fn draw_ring(
    canvas: &mut Canvas,
    cx: f64,
    cy: f64,
    radius: f64,
    width: f32,
    start_angle: f64,
    arc_span: f64,
    color: (u8, u8, u8),
) {
    if arc_span <= 0.0 {
        return;
    }
    let half_width = width as f64 / 2.0;
    let inner = radius - half_width;
    let outer = radius + half_width;
    let start = start_angle.rem_euclid(TAU);

    let min_x = (cx - outer - 1.0).floor() as i32;
    let max_x = (cx + outer + 1.0).ceil() as i32;
    let min_y = (cy - outer - 1.0).floor() as i32;
    let max_y = (cy + outer + 1.0).ceil() as i32;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            if x < 0 || y < 0 || x as usize >= canvas.width || y as usize >= canvas.height {
                continue;
            }
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            let dist = (dx * dx + dy * dy).sqrt();
            if dist < inner - 1.0 || dist > outer + 1.0 {
                continue;
            }
            let angle = dy.atan2(dx).rem_euclid(TAU);
            let in_arc = arc_span >= TAU || (angle - start).rem_euclid(TAU) <= arc_span;
            if !in_arc {
                continue;
            }
            let aa = if dist > outer {
                1.0 - (dist - outer).min(1.0)
            } else if dist < inner {
                1.0 - (inner - dist).min(1.0)
            } else {
                1.0
            };
            if aa > 0.0 {
                set_pixel(
                    canvas.frame,
                    canvas.width,
                    x as usize,
                    y as usize,
                    color.0,
                    color.1,
                    color.2,
                    aa as f32,
                );
            }
        }
    }
}

/// Even-odd scanline fill of a closed polygon with a translucent wash.
fn fill_polygon(canvas: &mut Canvas, points: &[(f64, f64)], color: (u8, u8, u8), alpha: f32) {
    if points.len() < 3 || alpha <= 0.0 {
        return;
    }
    let min_y = points
        .iter()
        .map(|p| p.1)
        .fold(f64::INFINITY, f64::min)
        .floor()
        .max(0.0) as i32;
    let max_y = points
        .iter()
        .map(|p| p.1)
        .fold(f64::NEG_INFINITY, f64::max)
        .ceil()
        .min(canvas.height as f64 - 1.0) as i32;

    let mut crossings: Vec<f64> = Vec::new();
    for y in min_y..=max_y {
        let scan = y as f64 + 0.5;
        crossings.clear();
        for i in 0..points.len() {
            let (x0, y0) = points[i];
            let (x1, y1) = points[(i + 1) % points.len()];
            if (y0 <= scan) != (y1 <= scan) {
                let t = (scan - y0) / (y1 - y0);
                crossings.push(x0 + t * (x1 - x0));
            }
        }
        crossings.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        for pair in crossings.chunks_exact(2) {
            let x_start = pair[0].round().max(0.0) as i32;
            let x_end = pair[1].round().min(canvas.width as f64 - 1.0) as i32;
            for x in x_start..=x_end {
                set_pixel(
                    canvas.frame,
                    canvas.width,
                    x as usize,
                    y as usize,
                    color.0,
                    color.1,
                    color.2,
                    alpha,
                );
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use pretty_assertions::assert_eq;

    fn square_wave() -> Vec<f64> {
        vec![0.0, 1.0, 0.0, 1.0]
    }

    fn test_geometry() -> Geometry {
        Geometry {
            cx: 200.0,
            cy: 150.0,
            base_radius: 100.0,
            spectrum_width: 40.0,
            handle_radius: 10.0,
        }
    }

    /// Place the pointer on the base circle at the angle a control value
    /// maps to.
    fn pointer_at(geometry: &Geometry, value: f64) -> (f64, f64) {
        let angle = -FRAC_PI_2 + TAU * value;
        (
            geometry.cx + geometry.base_radius * angle.cos(),
            geometry.cy + geometry.base_radius * angle.sin(),
        )
    }

    #[test]
    fn build_yields_one_segment_per_sample_pair() {
        let samples = [0.1, 0.7, 0.3, 0.9, 0.5];
        let curve = PlottedCurve::build(&samples, 1.0).unwrap();

        assert_eq!(curve.segments.len(), samples.len() - 1);
        assert_eq!(curve.start, curve.segments[0].start);
        for (i, segment) in curve.segments.iter().enumerate() {
            let n = samples.len() as f64 - 1.0;
            assert_approx_eq!(segment.start.progress, i as f64 / n);
            assert_approx_eq!(segment.start.amplitude, samples[i]);
            assert_approx_eq!(segment.end.progress, (i + 1) as f64 / n);
            assert_approx_eq!(segment.end.amplitude, samples[i + 1]);
        }
    }

    #[test]
    fn build_segments_are_continuous() {
        let curve = PlottedCurve::build(&square_wave(), 1.0).unwrap();
        for pair in curve.segments.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn build_rejects_short_input() {
        assert_eq!(
            PlottedCurve::build(&[], 1.0),
            Err(GaugeError::InsufficientSamples { count: 0 })
        );
        assert_eq!(
            PlottedCurve::build(&[0.5], 1.0),
            Err(GaugeError::InsufficientSamples { count: 1 })
        );
    }

    #[test]
    fn build_two_samples_is_the_minimal_curve() {
        let curve = PlottedCurve::build(&[0.2, 0.8], 1.0).unwrap();
        assert_eq!(curve.segments.len(), 1);
        assert_approx_eq!(curve.segments[0].start.amplitude, 0.2);
        assert_approx_eq!(curve.segments[0].end.progress, 1.0);
    }

    #[test]
    fn endpoint_tangents_use_clamped_neighbors() {
        // For [0, 1, 0, 1] the first segment has no left neighbor and the
        // last has no right neighbor; both fall back to the segment's own
        // endpoint, flattening the tangent.
        let curve = PlottedCurve::build(&square_wave(), 1.0).unwrap();
        let third = 1.0 / 3.0;

        // cp1 of segment 0 with p0 = p1 = (0, 0) and p2 = (1/3, 1)
        let first = &curve.segments[0];
        assert_approx_eq!(first.cp1.progress, third / 6.0);
        assert_approx_eq!(first.cp1.amplitude, 1.0 / 6.0);

        // cp2 of segment 2 with p3 = p2 = (1, 1) and p1 = (2/3, 0)
        let last = &curve.segments[2];
        assert_approx_eq!(last.cp2.progress, 1.0 - third / 6.0);
        assert_approx_eq!(last.cp2.amplitude, 1.0 - 1.0 / 6.0);
    }

    #[test]
    fn interior_tangents_use_real_neighbors() {
        // The middle segment of [0, 1, 0, 1] sees p0 = (0, 0) and
        // p3 = (1, 1): no degeneracy on either side.
        let curve = PlottedCurve::build(&square_wave(), 1.0).unwrap();
        let third = 1.0 / 3.0;
        let middle = &curve.segments[1];

        assert_approx_eq!(middle.cp1.progress, third + (2.0 * third) / 6.0);
        assert_approx_eq!(middle.cp1.amplitude, 1.0);
        assert_approx_eq!(middle.cp2.progress, 2.0 * third - (1.0 - third) / 6.0);
        assert_approx_eq!(middle.cp2.amplitude, 0.0);
    }

    #[test]
    fn mapper_is_deterministic() {
        let geometry = test_geometry();
        let point = CurvePoint {
            progress: 0.37,
            amplitude: 0.81,
        };
        assert_eq!(
            geometry.to_render(point, 0.5),
            geometry.to_render(point, 0.5)
        );
    }

    #[test]
    fn mapper_collapses_onto_base_circle_at_zero_animation() {
        let geometry = test_geometry();
        for (progress, amplitude) in [(0.0, 0.0), (0.2, 1.0), (0.5, 0.3), (0.9, 12.0)] {
            let (x, y) = geometry.to_render(
                CurvePoint {
                    progress,
                    amplitude,
                },
                0.0,
            );
            let dist = ((x - geometry.cx).powi(2) + (y - geometry.cy).powi(2)).sqrt();
            assert_approx_eq!(dist, geometry.base_radius);
        }
    }

    #[test]
    fn mapper_reaches_full_amplitude_at_one() {
        let geometry = test_geometry();
        let (x, y) = geometry.to_render(
            CurvePoint {
                progress: 0.25,
                amplitude: 1.0,
            },
            1.0,
        );
        let dist = ((x - geometry.cx).powi(2) + (y - geometry.cy).powi(2)).sqrt();
        assert_approx_eq!(dist, geometry.base_radius + geometry.spectrum_width);
    }

    #[test]
    fn mapper_puts_zero_progress_at_the_top() {
        let geometry = test_geometry();
        let (x, y) = geometry.to_render(
            CurvePoint {
                progress: 0.0,
                amplitude: 0.0,
            },
            1.0,
        );
        assert_approx_eq!(x, geometry.cx);
        assert_approx_eq!(y, geometry.cy - geometry.base_radius);
    }

    #[test]
    fn pointer_value_round_trips_handle_angles() {
        let geometry = test_geometry();
        for value in [0.0, 0.1, 0.25, 0.5, 0.75, 0.99] {
            let pointer = pointer_at(&geometry, value);
            assert_approx_eq!(
                pointer_value(pointer, (geometry.cx, geometry.cy)),
                value,
                1e-9
            );
        }
    }

    #[test]
    fn seam_snap_pins_forward_cross_to_one() {
        // Dragging clockwise past the top from a value near 1 would yield a
        // candidate near 0; the value pins at the high end instead.
        assert_eq!(snap_across_seam(0.02, 0.95, 0.9), 1.0);
    }

    #[test]
    fn seam_snap_pins_backward_cross_to_zero() {
        // The mirror case: counterclockwise past the top from a value near
        // 0 pins at the low end.
        assert_eq!(snap_across_seam(0.96, 0.02, 0.9), 0.0);
    }

    #[test]
    fn seam_snap_passes_small_moves_through() {
        assert_approx_eq!(snap_across_seam(0.5, 0.45, 0.9), 0.5);
        assert_approx_eq!(snap_across_seam(0.45, 0.5, 0.9), 0.45);
    }

    #[test]
    fn drag_across_the_seam_pins_at_the_stop() {
        let geometry = test_geometry();
        let mut input = ControlInput::new(0.95, 0.9);
        assert!(input.press(pointer_at(&geometry, 0.95), &geometry));

        // One frame later the pointer sits just past the top; instead of
        // jumping across the circle the value pins at the seam.
        assert!(input.drag(pointer_at(&geometry, 0.02), &geometry));
        assert_eq!(input.value(), 1.0);

        // Dragging back off the seam resumes normal tracking.
        assert!(input.drag(pointer_at(&geometry, 0.93), &geometry));
        assert_approx_eq!(input.value(), 0.93, 1e-9);
    }

    #[test]
    fn press_off_the_handle_stays_idle() {
        let geometry = test_geometry();
        let mut input = ControlInput::new(0.45, 0.9);

        assert!(!input.press((geometry.cx, geometry.cy), &geometry));
        assert!(!input.is_dragging());
        assert!(!input.drag(pointer_at(&geometry, 0.7), &geometry));
        assert_approx_eq!(input.value(), 0.45);
    }

    #[test]
    fn hit_test_is_strictly_less_than() {
        // Value 0.25 puts the handle at angle 0, i.e. exactly at
        // (cx + base_radius, cy), so the rim distance is exact.
        let geometry = test_geometry();
        let (hx, hy) = geometry.handle_position(0.25);
        assert_eq!((hx, hy), (geometry.cx + geometry.base_radius, geometry.cy));

        assert!(geometry.is_on_handle((hx + geometry.handle_radius - 0.5, hy), 0.25));
        assert!(!geometry.is_on_handle((hx + geometry.handle_radius, hy), 0.25));
    }

    #[test]
    fn release_and_leave_end_the_drag() {
        let geometry = test_geometry();
        let mut input = ControlInput::new(0.45, 0.9);
        input.press(pointer_at(&geometry, 0.45), &geometry);
        assert!(input.is_dragging());

        input.release();
        assert!(!input.is_dragging());
        assert!(!input.drag(pointer_at(&geometry, 0.7), &geometry));
        assert_approx_eq!(input.value(), 0.45);
    }

    #[test]
    fn easing_starts_at_zero() {
        assert_eq!(ease_in_out(0.0), 0.0);
    }

    #[test]
    fn easing_branches_agree_at_the_boundary() {
        let t: f64 = 0.5;
        assert_approx_eq!(4.0 * t * t * t, 0.5);
        assert_approx_eq!((t - 1.0) * (2.0 * t - 2.0) * (2.0 * t - 2.0) + 1.0, 0.5);
        assert_approx_eq!(ease_in_out(0.5), 0.5);
    }

    #[test]
    fn animator_waits_out_the_delay() {
        let mut animator = Animator::new(
            Duration::from_millis(2000),
            Duration::from_millis(16),
            0.02,
        );
        assert!(!animator.tick(Duration::from_millis(1999)));
        assert_eq!(animator.progress(), 0.0);

        // Crossing the delay alone does not produce a step yet.
        assert!(!animator.tick(Duration::from_millis(1)));
        assert_eq!(animator.progress(), 0.0);

        assert!(animator.tick(Duration::from_millis(16)));
        assert_approx_eq!(animator.progress(), ease_in_out(0.02));
    }

    #[test]
    fn animator_completes_once_and_stops() {
        let mut animator = Animator::new(
            Duration::from_millis(0),
            Duration::from_millis(16),
            0.02,
        );
        let mut ticks = 0;
        while !animator.is_complete() {
            animator.tick(Duration::from_millis(16));
            ticks += 1;
            assert!(ticks <= 100, "animator never completed");
        }

        // 50 increments of 0.02 reach the counter's end.
        assert_eq!(ticks, 50);
        assert_eq!(animator.progress(), 1.0);
        assert!(!animator.tick(Duration::from_secs(10)));
        assert_eq!(animator.progress(), 1.0);
    }

    #[test]
    fn animator_progress_is_monotonic() {
        let mut animator = Animator::new(
            Duration::from_millis(0),
            Duration::from_millis(16),
            0.02,
        );
        let mut previous = animator.progress();
        while !animator.is_complete() {
            animator.tick(Duration::from_millis(16));
            assert!(animator.progress() >= previous);
            previous = animator.progress();
        }
    }

    #[test]
    fn generated_samples_are_normalized() {
        let samples = generate_samples(60);
        assert_eq!(samples.len(), 60);
        assert!(samples.iter().all(|&s| (0.0..1.0).contains(&s)));
    }

    #[test]
    fn gauge_clamps_values_and_keeps_no_failed_curve() {
        let mut gauge = Gauge::new(GaugeConfig::builder().build());
        gauge.set_value(1.5);
        assert_eq!(gauge.value(), 1.0);
        gauge.set_value(-0.2);
        assert_eq!(gauge.value(), 0.0);

        gauge.set_samples(&square_wave()).unwrap();
        assert!(gauge.curve().is_some());

        assert_eq!(
            gauge.set_samples(&[0.5]),
            Err(GaugeError::InsufficientSamples { count: 1 })
        );
        assert!(gauge.curve().is_none());
    }

    #[test]
    fn flattened_plot_follows_the_curve_endpoints() {
        let geometry = test_geometry();
        let curve = PlottedCurve::build(&square_wave(), 1.0).unwrap();
        let steps = 8;
        let points = flatten_curve(&curve, &geometry, 1.0, steps);

        assert_eq!(points.len(), curve.segments.len() * steps + 1);
        assert_eq!(points[0], geometry.to_render(curve.start, 1.0));
        for (i, segment) in curve.segments.iter().enumerate() {
            let at_end = points[(i + 1) * steps];
            let expected = geometry.to_render(segment.end, 1.0);
            assert_approx_eq!(at_end.0, expected.0);
            assert_approx_eq!(at_end.1, expected.1);
        }
    }
}
