//! Windowed editor loop.
//!
//! [`run_editor`] opens a window, rigs a [`CameraView`] into the scene the
//! caller built, and then records and replays a frame per redraw: the
//! window camera clears the surface, the view paints into it, and the
//! recorded commands go to the [`WgpuExecutor`].

use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::backend::{CommandRecorder, WgpuExecutor};
use crate::camera::Camera;
use crate::camera_view::CameraView;
use crate::config::EngineConfig;
use crate::error::{Result, RigError};
use crate::gpu::GpuContext;
use crate::input::InputTranslator;
use crate::journal::RecordingJournal;
use crate::library::Library;
use crate::renderer::RenderContext;
use crate::scene::SceneGraph;

/// Builds the scene before the window opens. The recorder is the backend
/// the editor will draw with, so framebuffers created here (shadow maps)
/// are replayed on the first frame.
pub type SetupFn = dyn FnOnce(&mut SceneGraph, &mut Library, &mut CommandRecorder) -> Result<()>;

/// Runs the editor until its window closes.
///
/// # Example
///
/// ```no_run
/// use scenerig::{EngineConfig, MeshData, run_editor};
/// use scenerig::scene::Component;
/// use scenerig::geometry::Geometry;
///
/// fn main() -> scenerig::Result<()> {
///     run_editor(EngineConfig::new().title("Layout"), |scene, library, _| {
///         let cube = library.add_mesh(MeshData::cube(100.0));
///         let entity = scene.spawn_child(scene.root(), "cube")?;
///         scene.add_component(entity, Component::Geometry(Geometry::model(cube)))?;
///         Ok(())
///     })
/// }
/// ```
pub fn run_editor<F>(config: EngineConfig, setup: F) -> Result<()>
where
    F: FnOnce(&mut SceneGraph, &mut Library, &mut CommandRecorder) -> Result<()> + 'static,
{
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = EditorApp::Pending {
        config,
        setup: Some(Box::new(setup)),
    };
    event_loop.run_app(&mut app)?;

    if let EditorApp::Failed(err) = app {
        return Err(err);
    }
    Ok(())
}

enum EditorApp {
    Pending {
        config: EngineConfig,
        setup: Option<Box<SetupFn>>,
    },
    Running(Box<Editor>),
    Failed(RigError),
}

struct Editor {
    window: Arc<Window>,
    gpu: GpuContext,
    executor: WgpuExecutor,
    recorder: CommandRecorder,
    context: RenderContext,

    scene: SceneGraph,
    library: Library,
    view: CameraView,
    window_camera: Camera,

    input: InputTranslator,
    journal: RecordingJournal,
}

impl Editor {
    fn new(
        event_loop: &ActiveEventLoop,
        config: EngineConfig,
        setup: Box<SetupFn>,
    ) -> Result<Self> {
        let attributes = WindowAttributes::default()
            .with_title(config.title.clone())
            .with_inner_size(LogicalSize::new(config.width, config.height));
        let window = Arc::new(event_loop.create_window(attributes)?);

        let gpu = GpuContext::new(window.clone())?;
        let executor = WgpuExecutor::new(&gpu.device, &gpu.queue, gpu.config.format);

        let mut recorder = CommandRecorder::new();
        let mut scene = SceneGraph::new();
        let mut library = Library::new();
        setup(&mut scene, &mut library, &mut recorder)?;

        // the window may come up at a different size than requested
        let config = EngineConfig {
            width: gpu.width(),
            height: gpu.height(),
            ..config
        };
        let view = CameraView::new(&mut scene, &mut recorder, &config)?;

        let mut window_camera = Camera::orthographic(
            0.0,
            0.0,
            config.width as f32,
            config.height as f32,
            -1.0,
            1.0,
        );
        window_camera.set_viewport(0.0, 0.0, config.width as f32, config.height as f32);
        window_camera.set_background_color(config.background);

        log::info!(
            "editor ready: {}x{} view, {} entities",
            config.width,
            config.height,
            scene.len()
        );

        Ok(Self {
            window,
            gpu,
            executor,
            recorder,
            context: RenderContext::new(),
            scene,
            library,
            view,
            window_camera,
            input: InputTranslator::new(),
            journal: RecordingJournal::new(),
        })
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.gpu.resize(width, height);
        let (w, h) = (width as f32, height as f32);
        self.window_camera.set_orthographic_coordinates(0.0, 0.0, w, h);
        self.window_camera.set_viewport(0.0, 0.0, w, h);
        self.view.set_size(&mut self.scene, w, h)
    }

    fn redraw(&mut self) -> Result<()> {
        self.context
            .flush_camera(&mut self.recorder, &self.window_camera);
        let painted = self
            .view
            .paint(&mut self.context, &self.scene, &mut self.recorder);
        self.context.end_frame();
        painted?;

        let commands = self.recorder.take_commands();
        let output = match self.gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let (width, height) = (self.gpu.width(), self.gpu.height());
                self.gpu.resize(width, height);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let surface = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.executor.execute(
            &self.gpu.device,
            &self.gpu.queue,
            &self.library,
            commands,
            &surface,
            (self.gpu.width(), self.gpu.height()),
        );
        self.window.pre_present_notify();
        output.present();
        Ok(())
    }
}

impl ApplicationHandler for EditorApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let EditorApp::Pending { config, setup } = self else {
            return;
        };
        let Some(setup) = setup.take() else {
            return;
        };
        match Editor::new(event_loop, config.clone(), setup) {
            Ok(editor) => {
                editor.window.request_redraw();
                *self = EditorApp::Running(Box::new(editor));
            }
            Err(err) => {
                log::error!("failed to start editor: {err}");
                *self = EditorApp::Failed(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let EditorApp::Running(editor) = self else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                log::info!("closing with {} journal entries", editor.journal.len());
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Err(err) = editor.resize(size.width, size.height) {
                    log::warn!("resize failed: {err}");
                }
                editor.window.request_redraw();
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = editor.redraw() {
                    log::warn!("frame failed: {err}");
                }
            }
            other => {
                if let Some(input) = editor.input.translate(&other) {
                    editor.view.handle_input(
                        &input,
                        &mut editor.scene,
                        &editor.library,
                        &mut editor.journal,
                    );
                    editor.window.request_redraw();
                }
            }
        }
    }
}
