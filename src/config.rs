use crate::color::Color;

/// Configuration for the editor window and its camera view.
///
/// # Example
/// ```
/// use scenerig::EngineConfig;
///
/// let config = EngineConfig::new()
///     .title("Layout")
///     .size(1280, 720)
///     .device_size(480.0, 800.0)
///     .depth_of_field(false);
/// assert_eq!(config.device_width, 480.0);
/// assert!(!config.enable_dof);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,

    /// Size of the emulated device screen in scene units.
    pub device_width: f32,
    pub device_height: f32,

    pub enable_dof: bool,
    /// Eye-space distance that is perfectly in focus.
    pub focal_distance: f32,
    /// Depth range over which the blur ramps up.
    pub depth_of_field: f32,

    /// Keep a line primitive for the last pick ray and draw it.
    pub debug_pick_ray: bool,
    pub play_mode: bool,
    /// Hide editor tools and only show the device screen.
    pub device_mode: bool,

    /// Vertical field of view of the view camera in degrees.
    pub fov_y: f32,
    pub z_near: f32,
    pub z_far: f32,
    /// Eye-space depth of the plane that maps 1:1 onto view pixels.
    pub z_2d: f32,

    pub background: Color,
    pub shadow_map_size: u32,

    pub grid_size: f32,
    pub grid_spacing: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Scenerig".to_string(),
            width: 800,
            height: 600,
            device_width: 800.0,
            device_height: 600.0,
            enable_dof: true,
            focal_distance: 30.0,
            depth_of_field: 3.0,
            debug_pick_ray: false,
            play_mode: false,
            device_mode: false,
            fov_y: 10.0,
            z_near: 10.0,
            z_far: 100.0,
            z_2d: 30.0,
            background: Color::grey(0.22),
            shadow_map_size: 512,
            grid_size: 1000.0,
            grid_spacing: 50.0,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn device_size(mut self, width: f32, height: f32) -> Self {
        self.device_width = width;
        self.device_height = height;
        self
    }

    pub fn depth_of_field(mut self, enabled: bool) -> Self {
        self.enable_dof = enabled;
        self
    }

    pub fn focus(mut self, focal_distance: f32, depth_of_field: f32) -> Self {
        self.focal_distance = focal_distance;
        self.depth_of_field = depth_of_field;
        self
    }

    pub fn debug_pick_ray(mut self, enabled: bool) -> Self {
        self.debug_pick_ray = enabled;
        self
    }

    pub fn play_mode(mut self, enabled: bool) -> Self {
        self.play_mode = enabled;
        self
    }

    pub fn device_mode(mut self, enabled: bool) -> Self {
        self.device_mode = enabled;
        self
    }

    /// Projection of the view camera and the depth of its 2D plane.
    pub fn projection(mut self, fov_y: f32, z_near: f32, z_far: f32, z_2d: f32) -> Self {
        self.fov_y = fov_y;
        self.z_near = z_near;
        self.z_far = z_far;
        self.z_2d = z_2d;
        self
    }

    pub fn background(mut self, color: Color) -> Self {
        self.background = color;
        self
    }

    pub fn shadow_map_size(mut self, size: u32) -> Self {
        self.shadow_map_size = size.max(1);
        self
    }

    pub fn grid(mut self, size: f32, spacing: f32) -> Self {
        self.grid_size = size;
        self.grid_spacing = spacing;
        self
    }
}
