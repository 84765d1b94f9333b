//! Windowed playback loop.
//!
//! One control thread owns the playback state and the display surface. Each
//! tick polls the keyboard queue, the duration timer, catalog updates, loader
//! results, and the outstanding video delegate (at most one). Images are
//! rendered as a letterboxed fullscreen quad; videos black the surface while
//! the external delegate owns the screen.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel as xchan;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wgpu::SurfaceError;
use wgpu::util::DeviceExt;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes, WindowId},
};

use crate::catalog::MediaKind;
use crate::config::{Configuration, OrientationProfile};
use crate::events::{CatalogRefreshed, RescanRequest};
use crate::playback::{Phase, PlaybackState};
use crate::render::loader::{LoaderMsg, LoaderResult, spawn_loader};
use crate::video::{Delegate, spawn_delegate};

#[derive(Debug)]
enum PlayerEvent {
    Cancelled,
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    pos: [f32; 2],
    uv: [f32; 2],
}

const QUAD: [Vertex; 4] = [
    Vertex {
        pos: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    Vertex {
        pos: [1.0, -1.0],
        uv: [1.0, 1.0],
    },
    Vertex {
        pos: [-1.0, 1.0],
        uv: [0.0, 0.0],
    },
    Vertex {
        pos: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
];

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    scale: [f32; 4],
    background: [f32; 4],
}

struct Tex {
    view: wgpu::TextureView,
    w: u32,
    h: u32,
}

struct Gpu {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    vbuf: wgpu::Buffer,
    params_buf: wgpu::Buffer,
    tex: Tex,
}

struct PlayerApp {
    cfg: Configuration,
    duration_override: Option<Duration>,
    cancel: CancellationToken,
    catalog_rx: mpsc::Receiver<CatalogRefreshed>,
    rescan_tx: mpsc::Sender<RescanRequest>,

    state: PlaybackState,
    profile: Option<OrientationProfile>,
    catalog_seen: bool,
    warned_empty: bool,
    decode_failures: FailureStreak,

    window: Option<Arc<Window>>,
    gpu: Option<Gpu>,
    pending_redraw: bool,

    loader_tx: xchan::Sender<LoaderMsg>,
    loader_rx: xchan::Receiver<LoaderResult>,

    delegate: Option<Delegate>,
}

impl PlayerApp {
    fn new(
        cfg: Configuration,
        duration_override: Option<Duration>,
        cancel: CancellationToken,
        catalog_rx: mpsc::Receiver<CatalogRefreshed>,
        rescan_tx: mpsc::Sender<RescanRequest>,
    ) -> Self {
        let (loader_tx, req_rx) = xchan::unbounded::<LoaderMsg>();
        let (res_tx, loader_rx) = xchan::unbounded::<LoaderResult>();
        spawn_loader(req_rx, res_tx);

        Self {
            cfg,
            duration_override,
            cancel,
            catalog_rx,
            rescan_tx,
            state: PlaybackState::new(Vec::new()),
            profile: None,
            catalog_seen: false,
            warned_empty: false,
            decode_failures: FailureStreak::default(),
            window: None,
            gpu: None,
            pending_redraw: false,
            loader_tx,
            loader_rx,
            delegate: None,
        }
    }

    fn item_duration(&self) -> Duration {
        if let Some(over) = self.duration_override {
            return over;
        }
        self.profile.map_or_else(
            || Duration::from_secs_f64(self.cfg.display_duration),
            |p| p.display_duration,
        )
    }

    fn background_color(&self) -> [f32; 4] {
        let [r, g, b] = self.cfg.background_color;
        [
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
            1.0,
        ]
    }

    fn decode_target(&self) -> (u32, u32) {
        if let Some(gpu) = &self.gpu {
            return (gpu.config.width, gpu.config.height);
        }
        if let Some(window) = &self.window {
            let PhysicalSize { width, height } = window.inner_size();
            if width > 0 && height > 0 {
                return (width, height);
            }
        }
        self.profile
            .map_or((1920, 1080), |p| p.resolution)
    }

    /// Kick off the current catalog item: queue an image decode or launch a
    /// video delegate. Items whose delegate cannot launch are skipped, at
    /// most once around the catalog.
    fn begin_current_item(&mut self) {
        // At most one delegate outstanding; Drop terminates the old one.
        self.delegate = None;
        let now = Instant::now();
        let mut attempts = 0usize;
        loop {
            let Some(item) = self.state.current().cloned() else {
                self.enter_idle();
                return;
            };
            self.warned_empty = false;
            match item.kind {
                MediaKind::Image => {
                    debug!(path = %item.path.display(), "displaying image");
                    let target = self.decode_target();
                    let _ = self.loader_tx.send(LoaderMsg::Decode {
                        path: item.path,
                        target,
                    });
                    self.state.mark_displayed(now);
                    return;
                }
                MediaKind::Video => {
                    // Background fill while the delegate owns the screen.
                    self.clear_frame();
                    match spawn_delegate(&self.cfg, &item.path) {
                        Ok(delegate) => {
                            self.delegate = Some(delegate);
                            self.state.mark_displayed(now);
                            return;
                        }
                        Err(err) => {
                            warn!(path = %item.path.display(), "skipping video: {err:#}");
                            attempts += 1;
                            if attempts >= self.state.len().max(1) {
                                // Nothing playable right now; wait out one
                                // display period before retrying the catalog.
                                self.state.mark_displayed(now);
                                return;
                            }
                            self.state.skip();
                        }
                    }
                }
            }
        }
    }

    fn enter_idle(&mut self) {
        if self.catalog_seen && self.state.phase() == Phase::Idle && !self.warned_empty {
            warn!(
                dir = %self.cfg.ads_directory.display(),
                "no playable media found; idling until reload"
            );
            self.warned_empty = true;
        }
        self.clear_frame();
    }

    /// Reset the surface to the background color (1x1 fill texture).
    fn clear_frame(&mut self) {
        let background = self.background_color();
        if let Some(gpu) = &mut self.gpu {
            let pixel = background.map(|c| (c * 255.0) as u8);
            gpu.tex = upload_texture(&gpu.device, &gpu.queue, &pixel, 1, 1);
            let params = Params {
                scale: [1.0, 1.0, 0.0, 0.0],
                background,
            };
            gpu.queue
                .write_buffer(&gpu.params_buf, 0, bytemuck::bytes_of(&params));
            rebuild_bind_group(gpu);
        }
        self.request_redraw();
    }

    fn show_frame(&mut self, pixels: &[u8], width: u32, height: u32) {
        let background = self.background_color();
        if let Some(gpu) = &mut self.gpu {
            gpu.tex = upload_texture(&gpu.device, &gpu.queue, pixels, width, height);
            let params = Params {
                scale: letterbox_scale(gpu.config.width, gpu.config.height, width, height),
                background,
            };
            gpu.queue
                .write_buffer(&gpu.params_buf, 0, bytemuck::bytes_of(&params));
            rebuild_bind_group(gpu);
        }
        self.request_redraw();
    }

    fn finish_item(&mut self) {
        if let Some(mut delegate) = self.delegate.take() {
            delegate.terminate();
        }
        self.state.advance();
        self.begin_current_item();
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, code: KeyCode) {
        match code {
            KeyCode::Escape | KeyCode::KeyQ => {
                info!("quit requested");
                self.shutdown(event_loop);
            }
            KeyCode::Space => {
                debug!("skip requested");
                self.state.skip();
                self.begin_current_item();
            }
            KeyCode::KeyR => {
                debug!("reload requested");
                if self.rescan_tx.try_send(RescanRequest).is_err() {
                    warn!("catalog task unavailable; reload ignored");
                }
            }
            KeyCode::KeyS => {
                debug!("shuffle requested");
                let mut rng = rand::rng();
                self.state.shuffle(&mut rng);
            }
            // Unrecognized keys are ignored silently.
            _ => {}
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.state.stop();
        if let Some(mut delegate) = self.delegate.take() {
            delegate.terminate();
        }
        let _ = self.loader_tx.send(LoaderMsg::Quit);
        self.cancel.cancel();
        event_loop.exit();
    }

    fn tick(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() || self.state.is_stopped() {
            self.shutdown(event_loop);
            return;
        }

        // Fresh catalog from the scanner; playback position resets.
        while let Ok(CatalogRefreshed(items)) = self.catalog_rx.try_recv() {
            info!(count = items.len(), "catalog refreshed");
            self.catalog_seen = true;
            self.decode_failures.reset();
            self.state.reload(items);
            self.begin_current_item();
        }

        // Decoded frames (or failures) from the loader thread.
        while let Ok(result) = self.loader_rx.try_recv() {
            match result {
                LoaderResult::Frame(frame) => {
                    let is_current = self
                        .state
                        .current()
                        .is_some_and(|item| item.path == frame.path);
                    if is_current {
                        self.decode_failures.reset();
                        self.show_frame(&frame.pixels, frame.width, frame.height);
                    }
                }
                LoaderResult::Failed(path) => {
                    let is_current = self
                        .state
                        .current()
                        .is_some_and(|item| item.path == path);
                    if is_current {
                        // Already logged by the loader. After a full lap of
                        // failures the item was already marked displayed when
                        // its decode was queued, so leaving it in place waits
                        // out one display period before the next attempt.
                        if self.decode_failures.record(self.state.len()) {
                            warn!(
                                "every catalog item failed to decode; retrying after the display period"
                            );
                        } else {
                            self.state.skip();
                            self.begin_current_item();
                        }
                    }
                }
            }
        }

        // The video delegate ends the item on natural exit or the duration
        // ceiling, whichever occurs first.
        if let Some(delegate) = self.delegate.as_mut() {
            match delegate.try_finished() {
                Ok(Some(status)) => {
                    if status.success() {
                        debug!(program = delegate.program(), "video delegate finished");
                    } else {
                        warn!(
                            program = delegate.program(),
                            %status,
                            "video delegate exited abnormally; skipping"
                        );
                    }
                    self.delegate = None;
                    self.state.advance();
                    self.begin_current_item();
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("video delegate poll failed: {err}");
                    self.finish_item();
                }
            }
        }

        let now = Instant::now();
        if self.state.due(now, self.item_duration()) {
            self.finish_item();
        }

        // Wake for the next deadline, bounded by the poll cadence so channel
        // and delegate polling stays responsive.
        let poll = self.cfg.poll_interval();
        let mut wake = now + poll;
        if let Phase::Waiting { since } = self.state.phase() {
            let deadline = since + self.item_duration();
            wake = wake.min(deadline.max(now));
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(wake));

        if self.pending_redraw {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
        }
    }

    fn request_redraw(&mut self) {
        self.pending_redraw = true;
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn init_gpu(&mut self, window: Arc<Window>) -> Result<()> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to acquire GPU adapter")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|fmt| fmt.is_srgb())
            .unwrap_or(caps.formats[0]);

        let limits = adapter.limits();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("player-device"),
            required_features: wgpu::Features::empty(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        }))
        .context("failed to acquire GPU device")?;

        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        info!(
            width = config.width,
            height = config.height,
            format = ?config.format,
            "player surface configured",
        );

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("frame-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/frame.wgsl").into()),
        });

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("frame-pipeline-layout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });

        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
        };

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("frame-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[vertex_layout],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("frame-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let vbuf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("frame-quad"),
            contents: bytemuck::cast_slice(&QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let background = self.background_color();
        let params = Params {
            scale: [1.0, 1.0, 0.0, 0.0],
            background,
        };
        let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("frame-params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let pixel = background.map(|c| (c * 255.0) as u8);
        let tex = upload_texture(&device, &queue, &pixel, 1, 1);

        let bind_group = make_bind_group(&device, &bind_layout, &tex, &sampler, &params_buf);

        self.gpu = Some(Gpu {
            surface,
            device,
            queue,
            config,
            pipeline,
            bind_layout,
            bind_group,
            sampler,
            vbuf,
            params_buf,
            tex,
        });
        Ok(())
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        let background = self.background_color();
        let mut reconfigured = false;
        if let Some(gpu) = &mut self.gpu {
            gpu.config.width = new_size.width.max(1);
            gpu.config.height = new_size.height.max(1);
            gpu.surface.configure(&gpu.device, &gpu.config);
            let params = Params {
                scale: letterbox_scale(gpu.config.width, gpu.config.height, gpu.tex.w, gpu.tex.h),
                background,
            };
            gpu.queue
                .write_buffer(&gpu.params_buf, 0, bytemuck::bytes_of(&params));
            reconfigured = true;
        }
        // Re-request the current image at the new surface size.
        if reconfigured {
            if let Some(item) = self.state.current() {
                if item.kind == MediaKind::Image {
                    let path = item.path.clone();
                    let target = self.decode_target();
                    let _ = self.loader_tx.send(LoaderMsg::Decode { path, target });
                }
            }
        }
        self.request_redraw();
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = self.window.clone() else {
            return;
        };
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };

        let frame = match gpu.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(SurfaceError::Outdated | SurfaceError::Lost) => {
                info!("player surface lost; reconfiguring");
                let size = window.inner_size();
                self.handle_resize(size);
                return;
            }
            Err(SurfaceError::OutOfMemory) => {
                error!("player surface out of memory; exiting event loop");
                self.shutdown(event_loop);
                return;
            }
            Err(err) => {
                warn!("player surface acquisition failed: {err}");
                return;
            }
        };

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("player-encoder"),
            });
        {
            let [r, g, b] = self.cfg.background_color;
            let background = wgpu::Color {
                r: f64::from(r) / 255.0,
                g: f64::from(g) / 255.0,
                b: f64::from(b) / 255.0,
                a: 1.0,
            };
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("player-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(background),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rpass.set_pipeline(&gpu.pipeline);
            rpass.set_bind_group(0, &gpu.bind_group, &[]);
            rpass.set_vertex_buffer(0, gpu.vbuf.slice(..));
            rpass.draw(0..4, 0..1);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        self.pending_redraw = false;
    }
}

impl ApplicationHandler<PlayerEvent> for PlayerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }
        if self.window.is_some() {
            return;
        }

        let attrs = WindowAttributes::default().with_title("signage player");
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                error!(error = %err, "failed to create player window");
                event_loop.exit();
                return;
            }
        };
        if self.cfg.fullscreen {
            window.set_fullscreen(Some(Fullscreen::Borderless(window.current_monitor())));
            window.set_cursor_visible(false);
        }
        self.window = Some(window.clone());

        let PhysicalSize { width, height } = window.inner_size();
        let orientation = self.cfg.orientation_for(width, height);
        let profile = self.cfg.profile(orientation);
        info!(
            width,
            height,
            orientation = %orientation,
            duration_secs = profile.display_duration.as_secs_f64(),
            "display profile selected"
        );
        self.profile = Some(profile);

        if let Err(err) = self.init_gpu(window) {
            error!(error = ?err, "failed to initialize GPU state");
            event_loop.exit();
            return;
        }

        self.begin_current_item();
        self.request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("player window close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed && !event.repeat {
                    if let PhysicalKey::Code(code) = event.physical_key {
                        self.handle_key(event_loop, code);
                    }
                }
            }
            WindowEvent::Resized(new_size) => {
                self.handle_resize(new_size);
            }
            WindowEvent::ScaleFactorChanged {
                mut inner_size_writer,
                ..
            } => {
                let size = window.inner_size();
                let _ = inner_size_writer.request_inner_size(size);
                self.handle_resize(size);
            }
            WindowEvent::RedrawRequested => {
                self.draw(event_loop);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        self.tick(event_loop);
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: PlayerEvent) {
        match event {
            PlayerEvent::Cancelled => {
                info!("player received cancellation event");
                self.shutdown(event_loop);
            }
        }
    }
}

/// Run the playback loop on the calling (main) thread until quit or
/// cancellation. Returns once the window closes and the delegate, if any,
/// has been terminated.
pub fn run_windowed(
    cfg: Configuration,
    duration_override: Option<Duration>,
    catalog_rx: mpsc::Receiver<CatalogRefreshed>,
    rescan_tx: mpsc::Sender<RescanRequest>,
    cancel: CancellationToken,
) -> Result<()> {
    let event_loop = EventLoop::<PlayerEvent>::with_user_event()
        .build()
        .context("failed to build player event loop")?;
    let proxy = event_loop.create_proxy();

    let cancel_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = proxy.send_event(PlayerEvent::Cancelled);
        })
    };

    let mut app = PlayerApp::new(cfg, duration_override, cancel, catalog_rx, rescan_tx);
    let run_result = event_loop.run_app(&mut app);
    cancel_task.abort();

    run_result.context("player event loop failed")
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    pixels: &[u8],
    w: u32,
    h: u32,
) -> Tex {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("frame"),
        size: wgpu::Extent3d {
            width: w,
            height: h,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        texture.as_image_copy(),
        pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * w),
            rows_per_image: Some(h),
        },
        wgpu::Extent3d {
            width: w,
            height: h,
            depth_or_array_layers: 1,
        },
    );
    Tex {
        view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
        w,
        h,
    }
}

fn make_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    tex: &Tex,
    sampler: &wgpu::Sampler,
    params_buf: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("frame-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&tex.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: params_buf.as_entire_binding(),
            },
        ],
    })
}

fn rebuild_bind_group(gpu: &mut Gpu) {
    gpu.bind_group = make_bind_group(
        &gpu.device,
        &gpu.bind_layout,
        &gpu.tex,
        &gpu.sampler,
        &gpu.params_buf,
    );
}

/// Consecutive decode failures across distinct catalog items. One full lap
/// of failures means nothing currently decodes and the loop should wait out
/// a display period instead of spinning skip/decode/fail at the poll rate.
#[derive(Debug, Default)]
struct FailureStreak {
    count: usize,
}

impl FailureStreak {
    /// Record one failure. Returns true when the streak has covered every
    /// catalog item, and resets so the next lap counts fresh.
    fn record(&mut self, catalog_len: usize) -> bool {
        self.count += 1;
        if self.count >= catalog_len.max(1) {
            self.count = 0;
            return true;
        }
        false
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// UV scale that letterboxes (fit-within, centered) a `img_w`x`img_h` frame
/// onto a `win_w`x`win_h` surface. The scaled axis exceeds 1.0 and the
/// shader paints the out-of-range band with the background color.
#[allow(clippy::cast_precision_loss)]
fn letterbox_scale(win_w: u32, win_h: u32, img_w: u32, img_h: u32) -> [f32; 4] {
    let ww = win_w as f32;
    let wh = win_h as f32;
    let iw = img_w as f32;
    let ih = img_h as f32;

    if ww <= 0.0 || wh <= 0.0 || iw <= 0.0 || ih <= 0.0 {
        return [1.0, 1.0, 0.0, 0.0];
    }

    let win_ar = ww / wh;
    let img_ar = iw / ih;

    if img_ar > win_ar {
        // Image wider than the surface: bars above and below.
        [1.0, img_ar / win_ar, 0.0, 0.0]
    } else {
        // Image taller than the surface: bars left and right.
        [win_ar / img_ar, 1.0, 0.0, 0.0]
    }
}
